pub mod relay_none;
pub mod relay_static;

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use util::Conn;

use crate::error::Result;

/// `RelayAddressGenerator` is used to generate a relay address when creating
/// an allocation.
#[async_trait]
pub trait RelayAddressGenerator {
    /// Validates if `Server` can allocate a `RelayAddressGenerator` in
    /// this method.
    async fn validate(&self) -> Result<()>;

    /// Allocates a `Conn` and the first return value is the listening
    /// address of the relay.
    async fn allocate_conn(
        &self,
        use_ipv4: bool,
        requested_port: u16,
    ) -> Result<(Arc<dyn Conn + Send + Sync>, SocketAddr)>;
}
