use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use async_trait::async_trait;
use util::vnet::net::Net;
use util::Conn;

use super::RelayAddressGenerator;
use crate::error::*;

/// `RelayAddressGeneratorNone` returns the listening address directly,
/// performing no relaying of its own. This is useful when a `Server` is only
/// acting as a STUN server and never grants TURN allocations.
pub struct RelayAddressGeneratorNone {
    /// The address to listen for connections on.
    pub address: String,

    /// The net.Net instance that is responsible for this Net.
    pub net: Arc<Net>,
}

#[async_trait]
impl RelayAddressGenerator for RelayAddressGeneratorNone {
    async fn validate(&self) -> Result<()> {
        if self.address.is_empty() {
            Err(Error::ErrListeningAddressInvalid)
        } else {
            Ok(())
        }
    }

    async fn allocate_conn(
        &self,
        use_ipv4: bool,
        requested_port: u16,
    ) -> Result<(Arc<dyn Conn + Send + Sync>, SocketAddr)> {
        let ip_addr: IpAddr = if use_ipv4 {
            "0.0.0.0".parse()?
        } else {
            "::".parse()?
        };
        let addr = if self.address.is_empty() {
            ip_addr
        } else {
            self.address.parse().unwrap_or(ip_addr)
        };

        let conn = self
            .net
            .bind(SocketAddr::new(addr, requested_port))
            .await?;
        let relay_addr = conn.local_addr()?;

        Ok((Arc::new(conn), relay_addr))
    }
}
