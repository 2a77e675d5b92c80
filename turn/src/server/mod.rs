pub mod config;
mod request;

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use util::Conn;

pub use self::config::{ConnConfig, ServerConfig};
use self::config::validate_server_config;
use crate::allocation::allocation_manager::{Manager, ManagerConfig};
use crate::allocation::AllocationInfo;
use crate::auth::AuthHandler;
use crate::error::*;
use crate::relay::RelayAddressGenerator;

pub(crate) const INBOUND_MTU: usize = 1500;

/// How long a nonce handed out in a 401/438 challenge stays valid before a
/// client must request a fresh one.
pub(crate) const NONCE_LIFETIME: Duration = Duration::from_secs(60 * 60);

/// Lifetime assigned to a channel bind when [`ServerConfig::channel_bind_timeout`]
/// is left at its zero value.
pub(crate) const DEFAULT_CHANNEL_BIND_TIMEOUT: Duration = Duration::from_secs(10 * 60);

struct Listener {
    conn: Arc<dyn Conn + Send + Sync>,
    manager: Arc<Manager>,
}

/// `Server` is an instance of the TURN server, relaying traffic on behalf of
/// [allocations](crate::allocation::Allocation) it grants to authenticated
/// clients.
pub struct Server {
    realm: String,
    auth_handler: Arc<dyn AuthHandler + Send + Sync>,
    channel_bind_timeout: Duration,
    pub(crate) nonces: Arc<Mutex<HashMap<String, Instant>>>,
    close_notify: CancellationToken,
    listeners: Vec<Arc<Listener>>,
}

impl Server {
    /// Creates the TURN server, starting one read loop per configured
    /// listening connection.
    pub async fn new(config: ServerConfig) -> Result<Self> {
        validate_server_config(&config)?;

        let channel_bind_timeout = if config.channel_bind_timeout == Duration::from_secs(0) {
            DEFAULT_CHANNEL_BIND_TIMEOUT
        } else {
            config.channel_bind_timeout
        };

        let nonces = Arc::new(Mutex::new(HashMap::new()));
        let close_notify = CancellationToken::new();

        let mut listeners = Vec::with_capacity(config.conn_configs.len());
        for conn_config in config.conn_configs {
            let ConnConfig {
                conn,
                relay_addr_generator,
            } = conn_config;

            relay_addr_generator.validate().await?;

            let manager = Arc::new(Manager::new(ManagerConfig {
                relay_addr_generator,
                alloc_close_notify: config.alloc_close_notify.clone(),
            }));

            listeners.push(Arc::new(Listener { conn, manager }));
        }

        let s = Server {
            realm: config.realm,
            auth_handler: config.auth_handler,
            channel_bind_timeout,
            nonces,
            close_notify,
            listeners,
        };

        for listener in &s.listeners {
            s.start_read_loop(Arc::clone(listener));
        }

        Ok(s)
    }

    fn start_read_loop(&self, listener: Arc<Listener>) {
        let realm = self.realm.clone();
        let auth_handler = Arc::clone(&self.auth_handler);
        let nonces = Arc::clone(&self.nonces);
        let channel_bind_timeout = self.channel_bind_timeout;
        let close_notify = self.close_notify.clone();

        tokio::spawn(async move {
            let mut buf = vec![0u8; INBOUND_MTU];
            let wait_cancel = close_notify.cancelled();
            tokio::pin!(wait_cancel);

            loop {
                let (n, src_addr) = tokio::select! {
                    biased;

                    _ = &mut wait_cancel => {
                        log::debug!("exiting turn server read loop");
                        break;
                    }
                    result = listener.conn.recv_from(&mut buf) => match result {
                        Ok((n, src_addr)) => (n, src_addr),
                        Err(err) => {
                            log::debug!("exiting turn server read loop: {}", err);
                            break;
                        }
                    }
                };

                let ctx = request::Request {
                    conn: Arc::clone(&listener.conn),
                    manager: Arc::clone(&listener.manager),
                    src_addr,
                    buff: buf[..n].to_vec(),
                    realm: realm.clone(),
                    auth_handler: Arc::clone(&auth_handler),
                    nonces: Arc::clone(&nonces),
                    channel_bind_timeout,
                };

                if let Err(err) = request::handle_request(ctx).await {
                    log::error!("error when handling datagram from {}: {}", src_addr, err);
                }
            }
        });
    }

    /// Returns the information about the [allocations](AllocationInfo)
    /// currently active on this server, optionally filtered by
    /// [`FiveTuple`](crate::allocation::five_tuple::FiveTuple).
    pub async fn get_allocations_info(
        &self,
        five_tuples: Option<Vec<crate::allocation::five_tuple::FiveTuple>>,
    ) -> HashMap<crate::allocation::five_tuple::FiveTuple, AllocationInfo> {
        let mut infos = HashMap::new();
        for listener in &self.listeners {
            let partial = listener
                .manager
                .get_allocations_info(five_tuples.clone())
                .await;
            infos.extend(partial);
        }
        infos
    }

    /// Closes the server, stopping every read loop and every
    /// [`Allocation`](crate::allocation::Allocation) it was relaying.
    pub async fn close(&self) -> Result<()> {
        self.close_notify.cancel();
        for listener in &self.listeners {
            listener.manager.close().await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod server_test {
    use std::net::{IpAddr, Ipv4Addr};
    use std::str::FromStr;
    use std::time::Duration;

    use util::vnet::net::Net;

    use super::*;
    use crate::relay::relay_static::RelayAddressGeneratorStatic;

    struct TestAuthHandler;

    impl AuthHandler for TestAuthHandler {
        fn auth_handle(
            &self,
            username: &str,
            realm: &str,
            _src_addr: std::net::SocketAddr,
        ) -> Result<Vec<u8>> {
            Ok(crate::auth::generate_auth_key(username, realm, "pass"))
        }
    }

    #[tokio::test]
    async fn server_rejects_empty_conn_configs() {
        let result = Server::new(ServerConfig {
            conn_configs: vec![],
            realm: "webrtc.rs".to_owned(),
            auth_handler: Arc::new(TestAuthHandler),
            channel_bind_timeout: Duration::from_secs(0),
            alloc_close_notify: None,
        })
        .await;

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn server_starts_and_closes_cleanly() {
        let net = Arc::new(Net::new(None));
        let conn = net
            .bind(std::net::SocketAddr::new(
                Ipv4Addr::new(0, 0, 0, 0).into(),
                0,
            ))
            .await
            .unwrap();

        let server = Server::new(ServerConfig {
            conn_configs: vec![ConnConfig {
                conn: Arc::new(conn),
                relay_addr_generator: Box::new(RelayAddressGeneratorStatic {
                    relay_address: IpAddr::from_str("127.0.0.1").unwrap(),
                    address: "0.0.0.0".to_owned(),
                    net,
                }),
            }],
            realm: "webrtc.rs".to_owned(),
            auth_handler: Arc::new(TestAuthHandler),
            channel_bind_timeout: Duration::from_secs(0),
            alloc_close_notify: None,
        })
        .await
        .expect("server should start");

        server.close().await.expect("server should close");
    }
}
