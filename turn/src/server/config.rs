use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use util::Conn;

use crate::allocation::AllocationInfo;
use crate::auth::AuthHandler;
use crate::error::*;
use crate::relay::RelayAddressGenerator;

/// The protocols a listening TURN [`super::Server`] accepts clients on.
pub struct ConnConfig {
    /// The connection the server relays Allocate/Refresh/CreatePermission/
    /// ChannelBind/Send/ChannelData traffic over.
    pub conn: Arc<dyn Conn + Send + Sync>,

    /// Generates the relayed transport address for each new allocation
    /// accepted on `conn`.
    pub relay_addr_generator: Box<dyn RelayAddressGenerator + Send + Sync>,
}

/// A bag of config params for `Server`.
pub struct ServerConfig {
    /// `conn_configs` are a list of all the turn listeners.
    /// Each listener can have a different set of `RelayAddressGenerator`s.
    pub conn_configs: Vec<ConnConfig>,

    /// `realm` sets the realm for this server.
    pub realm: String,

    /// `auth_handler` is a callback used to handle incoming auth requests,
    /// allowing users to customize their credential mechanism.
    pub auth_handler: Arc<dyn AuthHandler + Send + Sync>,

    /// The lifetime assigned to a `ChannelBind` by default. Will be set to
    /// 10 minutes if `0`.
    pub channel_bind_timeout: Duration,

    /// Notified with an [`AllocationInfo`] whenever an allocation this
    /// server manages closes.
    pub alloc_close_notify: Option<mpsc::Sender<AllocationInfo>>,
}

pub(crate) fn validate_server_config(config: &ServerConfig) -> Result<()> {
    if config.conn_configs.is_empty() {
        return Err(Error::ErrNoAvailableConns);
    }
    Ok(())
}
