use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use async_trait::async_trait;
use util::vnet::net::Net;
use util::Conn;

use super::RelayAddressGenerator;
use crate::error::*;

/// `RelayAddressGeneratorStatic` can be used to return static IP address each
/// time a relay is created. This can be used when deployed behind a 1:1 NAT
/// (a static relay address, unrelated to the allocation's actual listening
/// address).
pub struct RelayAddressGeneratorStatic {
    /// The public IP address that is used for the relay address.
    pub relay_address: IpAddr,

    /// The address to listen for connection/Allocations on.
    pub address: String,

    /// The net.Net instance that is responsible for this Net.
    pub net: Arc<Net>,
}

#[async_trait]
impl RelayAddressGenerator for RelayAddressGeneratorStatic {
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
        let mut relay_addr = conn.local_addr()?;
        relay_addr.set_ip(self.relay_address);

        Ok((Arc::new(conn), relay_addr))
    }
}
