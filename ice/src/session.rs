//! A multi-stream, multi-component ICE session layered on top of the
//! single-component [`crate::agent::Agent`] engine.
//!
//! [`crate::agent::Agent`] drives exactly one datagram flow end to end
//! (gathering, checklist, nomination). A real ICE session usually bundles
//! several such flows under shared per-stream credentials (RTP and RTCP, for
//! instance, are two components of the same stream). [`IceSession`] composes
//! one `Agent` per component and presents the session-level verbs an
//! embedder expects: streams are added and removed, credentials and relay
//! servers are configured before gathering, and remote candidates are fed in
//! as they arrive over the signalling channel.
//!
//! When the session is created in reliable mode, each component also owns a
//! [`ptcp::PseudoTcpSocket`] that rides on top of whatever datagram channel
//! the underlying `Agent` selects, so the embedder gets an ordered byte
//! stream instead of raw datagrams.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{mpsc, Mutex as AsyncMutex, Notify, RwLock};
use tokio::task::JoinHandle;
use util::Conn;

use crate::agent::agent_config::AgentConfig;
use crate::agent::Agent;
use crate::candidate::candidate_base::unmarshal_candidate;
use crate::candidate::{Candidate, CandidatePair};
use crate::network_type::NetworkType;
use crate::state::ComponentState;
use crate::udp_network::UDPNetwork;
use crate::url::{ProtoType, SchemeType, Url};
use crate::Error;
use crate::Result;

/// The pseudo-TCP socket plus the byte queue its `Readable` events feed,
/// shared between the application-facing `send`/`recv` calls and the
/// per-component driver task that pumps datagrams and clock ticks through
/// it. Bundled together (rather than two separate locks) since every access
/// to one typically needs the other in the same critical section: reading
/// bytes out of `readable` and deciding whether to re-`poll_output` happen
/// under the same lock acquisition.
struct ReliableState {
    socket: ptcp::PseudoTcpSocket,
    readable: VecDeque<u8>,
    /// Set once `Event::Closed`/`Event::Aborted` is observed, so a parked
    /// `recv` with an empty FIFO can return instead of waiting forever on a
    /// stream that will never produce another byte.
    closed: bool,
}

/// RFC 5245 caps the number of remote candidates a component accepts per
/// signalling exchange; beyond this the embedder is expected to prune.
const MAX_REMOTE_CANDIDATES_PER_COMPONENT: usize = 25;

/// TURN relay credentials and address for one component, supplied ahead of
/// gathering via [`IceSession::set_relay_info`].
#[derive(Debug, Clone)]
pub struct RelayInfo {
    pub server_host: String,
    pub server_port: u16,
    pub username: String,
    pub password: String,
    pub relay_type: RelayType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayType {
    TurnUdp,
}

struct ComponentSlot {
    id: u16,
    relay: Option<RelayInfo>,
    agent: Option<Arc<Agent>>,
    conn: Option<Arc<dyn Conn + Send + Sync>>,
    state: ComponentState,
    reliable: Option<Arc<AsyncMutex<ReliableState>>>,
    /// Signalled by the driver task every time `reliable.readable` grows, so
    /// `IceSession::recv` can park instead of busy-polling.
    readable_notify: Option<Arc<Notify>>,
    /// The task pumping `conn.recv`/clock ticks through `reliable`. Aborted
    /// on `remove_stream`/restart so it does not outlive its component.
    driver_task: Option<JoinHandle<()>>,
}

impl ComponentSlot {
    fn new(id: u16) -> Self {
        ComponentSlot {
            id,
            relay: None,
            agent: None,
            conn: None,
            state: ComponentState::Disconnected,
            reliable: None,
            readable_notify: None,
            driver_task: None,
        }
    }
}

struct StreamSlot {
    id: u16,
    components: Vec<ComponentSlot>,
    local_ufrag: String,
    local_pwd: String,
    remote_ufrag: String,
    remote_pwd: String,
    restart_candidate: Option<Arc<dyn Candidate + Send + Sync>>,
}

/// Configuration for [`IceSession::new`], mirroring the four knobs an
/// embedder chooses once per session: who nominates, whether the session
/// presents its components as a reliable byte stream, and which transports
/// gathering is allowed to use.
#[derive(Debug, Clone, Copy)]
pub struct IceSessionConfig {
    pub controlling: bool,
    pub reliable: bool,
    pub use_udp: bool,
    pub use_tcp: bool,
}

impl Default for IceSessionConfig {
    fn default() -> Self {
        IceSessionConfig {
            controlling: true,
            reliable: false,
            use_udp: true,
            use_tcp: false,
        }
    }
}

/// Process-wide state for one ICE endpoint, composed of one or more
/// [`StreamSlot`]s, each bundling a fixed number of components.
///
/// Role-conflict resolution and the tie-breaker live inside each component's
/// own [`Agent`] rather than being shared session-wide: this engine composes
/// the teacher's single-component agent rather than replacing it, so a
/// component negotiates its own role independently of its siblings. See
/// `DESIGN.md` for the rationale.
pub struct IceSession {
    config: IceSessionConfig,
    udp_network: UDPNetwork,
    streams: RwLock<HashMap<u16, StreamSlot>>,
    next_stream_id: AtomicU16,
}

impl IceSession {
    pub fn new(config: IceSessionConfig) -> Self {
        IceSession {
            config,
            udp_network: UDPNetwork::Ephemeral(Default::default()),
            streams: RwLock::new(HashMap::new()),
            next_stream_id: AtomicU16::new(1),
        }
    }

    /// Registers a stream of `n_components` components, each starting with
    /// freshly generated short-term credentials. Returns the new stream id
    /// (always non-zero, per the embedder contract).
    pub async fn add_stream(&self, n_components: u16) -> Result<u16> {
        if n_components == 0 {
            return Err(Error::Other("n_components must be at least 1".to_owned()));
        }
        let id = self.next_stream_id.fetch_add(1, Ordering::SeqCst);
        let (local_ufrag, local_pwd) = (crate::rand::generate_ufrag(), crate::rand::generate_pwd());
        let components = (1..=n_components).map(ComponentSlot::new).collect();

        let mut streams = self.streams.write().await;
        streams.insert(
            id,
            StreamSlot {
                id,
                components,
                local_ufrag,
                local_pwd,
                remote_ufrag: String::new(),
                remote_pwd: String::new(),
                restart_candidate: None,
            },
        );
        Ok(id)
    }

    /// Tears down a stream: closes every component's underlying agent,
    /// which in turn cancels its timers and closes its sockets.
    pub async fn remove_stream(&self, stream_id: u16) -> Result<()> {
        let mut streams = self.streams.write().await;
        let stream = streams
            .remove(&stream_id)
            .ok_or(Error::ErrUnknownStreamId)?;
        for component in stream.components {
            if let Some(driver_task) = component.driver_task {
                driver_task.abort();
            }
            if let Some(agent) = component.agent {
                let _ = agent.close().await;
            }
        }
        Ok(())
    }

    pub async fn set_local_credentials(&self, stream_id: u16, ufrag: String, pwd: String) -> Result<()> {
        let mut streams = self.streams.write().await;
        let stream = streams.get_mut(&stream_id).ok_or(Error::ErrUnknownStreamId)?;
        stream.local_ufrag = ufrag;
        stream.local_pwd = pwd;
        Ok(())
    }

    pub async fn get_local_credentials(&self, stream_id: u16) -> Result<(String, String)> {
        let streams = self.streams.read().await;
        let stream = streams.get(&stream_id).ok_or(Error::ErrUnknownStreamId)?;
        Ok((stream.local_ufrag.clone(), stream.local_pwd.clone()))
    }

    /// Records the remote endpoint's credentials. Once both sides know each
    /// other's credentials, and `gather_candidates` has already run,
    /// checking can begin as soon as candidates are exchanged.
    pub async fn set_remote_credentials(&self, stream_id: u16, ufrag: String, pwd: String) -> Result<()> {
        let mut streams = self.streams.write().await;
        let stream = streams.get_mut(&stream_id).ok_or(Error::ErrUnknownStreamId)?;
        stream.remote_ufrag = ufrag;
        stream.remote_pwd = pwd;
        Ok(())
    }

    pub async fn set_relay_info(
        &self,
        stream_id: u16,
        component_id: u16,
        relay: RelayInfo,
    ) -> Result<()> {
        let mut streams = self.streams.write().await;
        let stream = streams.get_mut(&stream_id).ok_or(Error::ErrUnknownStreamId)?;
        let component = component_mut(stream, component_id)?;
        component.relay = Some(relay);
        Ok(())
    }

    /// Drops the relay configuration for one component; a future
    /// `gather_candidates`/restart will not re-allocate it, matching the
    /// embedder-visible effect of `forget_relays` (the allocation itself, if
    /// any, lapses on its next refresh since nothing renews it).
    pub async fn forget_relays(&self, stream_id: u16, component_id: u16) -> Result<()> {
        let mut streams = self.streams.write().await;
        let stream = streams.get_mut(&stream_id).ok_or(Error::ErrUnknownStreamId)?;
        let component = component_mut(stream, component_id)?;
        component.relay = None;
        Ok(())
    }

    /// Starts gathering for every component of `stream_id`: creates its
    /// underlying agent (carrying any TURN/STUN URLs configured via
    /// `set_relay_info`), then kicks off candidate gathering.
    pub async fn gather_candidates(&self, stream_id: u16) -> Result<()> {
        let (local_ufrag, local_pwd, component_ids_and_urls): (String, String, Vec<(u16, Vec<Url>)>) = {
            let streams = self.streams.read().await;
            let stream = streams.get(&stream_id).ok_or(Error::ErrUnknownStreamId)?;
            (
                stream.local_ufrag.clone(),
                stream.local_pwd.clone(),
                stream
                    .components
                    .iter()
                    .map(|c| (c.id, c.relay.as_ref().map(relay_to_url).into_iter().collect()))
                    .collect(),
            )
        };

        let mut network_types = Vec::new();
        if self.config.use_udp {
            network_types.push(NetworkType::Udp4);
            network_types.push(NetworkType::Udp6);
        }
        if self.config.use_tcp {
            network_types.push(NetworkType::Tcp4);
            network_types.push(NetworkType::Tcp6);
        }

        for (component_id, urls) in component_ids_and_urls {
            let agent = Arc::new(
                Agent::new(AgentConfig {
                    urls,
                    udp_network: self.udp_network.clone(),
                    local_ufrag: local_ufrag.clone(),
                    local_pwd: local_pwd.clone(),
                    network_types: network_types.clone(),
                    is_controlling: self.config.controlling,
                    ..Default::default()
                })
                .await?,
            );
            agent.gather_candidates()?;

            let mut streams = self.streams.write().await;
            let stream = streams.get_mut(&stream_id).ok_or(Error::ErrUnknownStreamId)?;
            let component = component_mut(stream, component_id)?;
            component.state = ComponentState::Gathering;
            component.agent = Some(agent);
        }
        Ok(())
    }

    /// Feeds remote candidates learned over the signalling channel into one
    /// component's agent. Accepts candidates up to the configured cap per
    /// component and returns how many were actually added.
    pub async fn set_remote_candidates(
        &self,
        stream_id: u16,
        component_id: u16,
        candidates: &[String],
    ) -> Result<usize> {
        let streams = self.streams.read().await;
        let stream = streams.get(&stream_id).ok_or(Error::ErrUnknownStreamId)?;
        let component = component_ref(stream, component_id)?;
        let agent = component.agent.as_ref().ok_or(Error::Other(
            "gather_candidates must run before remote candidates are accepted".to_owned(),
        ))?;

        let mut added = 0;
        for raw in candidates.iter().take(MAX_REMOTE_CANDIDATES_PER_COMPONENT) {
            if let Ok(c) = unmarshal_candidate(raw) {
                let c: Arc<dyn Candidate + Send + Sync> = Arc::new(c);
                if agent.add_remote_candidate(&c).is_ok() {
                    added += 1;
                }
            }
        }
        Ok(added)
    }

    /// Begins connectivity checks for every component of a stream: the
    /// controlling side dials, the controlled side accepts. Both calls
    /// resolve once a pair has been selected. When the session was created
    /// in reliable mode, this also spins up the component's pseudo-TCP
    /// socket over the resulting connection.
    pub async fn connect(&self, stream_id: u16) -> Result<()> {
        let (remote_ufrag, remote_pwd, agents): (String, String, Vec<(u16, Arc<Agent>)>) = {
            let streams = self.streams.read().await;
            let stream = streams.get(&stream_id).ok_or(Error::ErrUnknownStreamId)?;
            if stream.remote_ufrag.is_empty() {
                return Err(Error::ErrRemoteUfragEmpty);
            }
            (
                stream.remote_ufrag.clone(),
                stream.remote_pwd.clone(),
                stream
                    .components
                    .iter()
                    .filter_map(|c| c.agent.clone().map(|a| (c.id, a)))
                    .collect(),
            )
        };

        for (component_id, agent) in agents {
            let (_cancel_tx, cancel_rx) = mpsc::channel(1);
            let conn: Arc<dyn Conn + Send + Sync> = if self.config.controlling {
                agent.dial(cancel_rx, remote_ufrag.clone(), remote_pwd.clone()).await?
            } else {
                agent.accept(cancel_rx, remote_ufrag.clone(), remote_pwd.clone()).await?
            };

            let mut streams = self.streams.write().await;
            let stream = streams.get_mut(&stream_id).ok_or(Error::ErrUnknownStreamId)?;
            let component = component_mut(stream, component_id)?;
            component.state = ComponentState::Ready;
            if self.config.reliable {
                let conv = ((stream_id as u32) << 16) | component_id as u32;
                let mut socket = ptcp::PseudoTcpSocket::new(conv);
                if self.config.controlling {
                    let _ = socket.connect(Instant::now());
                }
                let reliable = Arc::new(AsyncMutex::new(ReliableState {
                    socket,
                    readable: VecDeque::new(),
                    closed: false,
                }));
                let notify = Arc::new(Notify::new());
                component.driver_task = Some(tokio::spawn(drive_reliable(
                    Arc::clone(&conn),
                    Arc::clone(&reliable),
                    Arc::clone(&notify),
                )));
                component.reliable = Some(reliable);
                component.readable_notify = Some(notify);
            }
            component.conn = Some(conn);
        }
        Ok(())
    }

    pub async fn get_component_state(&self, stream_id: u16, component_id: u16) -> Result<ComponentState> {
        let streams = self.streams.read().await;
        let stream = streams.get(&stream_id).ok_or(Error::ErrUnknownStreamId)?;
        Ok(component_ref(stream, component_id)?.state)
    }

    pub async fn get_selected_pair(
        &self,
        stream_id: u16,
        component_id: u16,
    ) -> Result<Option<Arc<CandidatePair>>> {
        let streams = self.streams.read().await;
        let stream = streams.get(&stream_id).ok_or(Error::ErrUnknownStreamId)?;
        let component = component_ref(stream, component_id)?;
        Ok(component
            .agent
            .as_ref()
            .and_then(|a| a.get_selected_candidate_pair()))
    }

    /// Forces `local_foundation`/`remote_foundation` (as surfaced through
    /// `new_candidate`/`new_remote_candidate`) to become this component's
    /// selected pair, bypassing the connectivity-check state machine.
    /// Mirrors `nice_agent_set_selected_pair`.
    pub async fn set_selected_pair(
        &self,
        stream_id: u16,
        component_id: u16,
        local_foundation: &str,
        remote_foundation: &str,
    ) -> Result<()> {
        let agent = {
            let streams = self.streams.read().await;
            let stream = streams.get(&stream_id).ok_or(Error::ErrUnknownStreamId)?;
            component_ref(stream, component_id)?
                .agent
                .clone()
                .ok_or(Error::Other(
                    "gather_candidates must run before a pair can be selected".to_owned(),
                ))?
        };
        let local = find_candidate_by_foundation(&agent.internal.local_candidates, local_foundation)
            .await
            .ok_or(Error::ErrCandidateIpNotFound)?;
        let remote =
            find_candidate_by_foundation(&agent.internal.remote_candidates, remote_foundation)
                .await
                .ok_or(Error::ErrCandidateIpNotFound)?;
        agent.set_selected_pair(&local, &remote).await
    }

    /// Forces `candidate` (an opaque marshalled candidate, in the same form
    /// `set_remote_candidates` accepts) to become the selected remote
    /// candidate, paired with this component's highest-priority compatible
    /// local candidate. Mirrors `nice_agent_set_selected_remote_candidate`.
    pub async fn set_selected_remote_candidate(
        &self,
        stream_id: u16,
        component_id: u16,
        candidate: &str,
    ) -> Result<()> {
        let agent = {
            let streams = self.streams.read().await;
            let stream = streams.get(&stream_id).ok_or(Error::ErrUnknownStreamId)?;
            component_ref(stream, component_id)?
                .agent
                .clone()
                .ok_or(Error::Other(
                    "gather_candidates must run before a remote candidate can be selected"
                        .to_owned(),
                ))?
        };
        let c = unmarshal_candidate(candidate).map_err(|e| Error::Other(e.to_string()))?;
        let remote: Arc<dyn Candidate + Send + Sync> = Arc::new(c);
        agent.set_selected_remote_candidate(remote).await
    }

    /// Regenerates credentials for every stream, frees every check list and
    /// remote candidate list (remembering the selected pair's remote
    /// candidate so it survives the restart), and returns components to
    /// `CONNECTING`.
    pub async fn restart(&self) -> Result<()> {
        let ids: Vec<u16> = self.streams.read().await.keys().copied().collect();
        for id in ids {
            self.restart_stream(id).await?;
        }
        Ok(())
    }

    pub async fn restart_stream(&self, stream_id: u16) -> Result<()> {
        let (local_ufrag, local_pwd) = (crate::rand::generate_ufrag(), crate::rand::generate_pwd());
        let mut streams = self.streams.write().await;
        let stream = streams.get_mut(&stream_id).ok_or(Error::ErrUnknownStreamId)?;
        stream.local_ufrag = local_ufrag.clone();
        stream.local_pwd = local_pwd.clone();
        for component in &mut stream.components {
            if let Some(pair) = component
                .agent
                .as_ref()
                .and_then(|a| a.get_selected_candidate_pair())
            {
                stream.restart_candidate = Some(pair.remote.clone());
            }
            if let Some(agent) = &component.agent {
                agent.restart(local_ufrag.clone(), local_pwd.clone()).await?;
            }
            component.state = ComponentState::Connecting;
        }
        Ok(())
    }

    /// Writes `bytes` over the selected pair of one component. In reliable
    /// mode this enqueues into the component's pseudo-TCP send FIFO and
    /// returns immediately (possibly with `ErrWouldBlock` if the FIFO is
    /// full); otherwise the bytes are written directly to the underlying
    /// datagram connection.
    pub async fn send(&self, stream_id: u16, component_id: u16, bytes: &[u8]) -> Result<usize> {
        let (conn, reliable) = {
            let streams = self.streams.read().await;
            let stream = streams.get(&stream_id).ok_or(Error::ErrUnknownStreamId)?;
            let component = component_ref(stream, component_id)?;
            (component.conn.clone(), component.reliable.clone())
        };

        if let Some(reliable) = reliable {
            let n = {
                let mut state = reliable.lock().await;
                state
                    .socket
                    .send(bytes, Instant::now())
                    .map_err(|e| Error::Other(e.to_string()))?
            };
            if let Some(conn) = &conn {
                pump_reliable(conn, &reliable).await;
            }
            return Ok(n);
        }

        let conn = conn.ok_or(Error::Other("component has no selected pair yet".to_owned()))?;
        conn.send(bytes).await.map_err(|e| Error::Other(e.to_string()))
    }

    /// Reads bytes delivered to this component, in source order. In
    /// reliable mode this drains the pseudo-TCP socket's receive FIFO
    /// (parking until the driver task has something ready); otherwise it
    /// reads directly off the underlying datagram connection, one inbound
    /// datagram's payload per call, matching `util::Conn::recv`.
    pub async fn recv(&self, stream_id: u16, component_id: u16, buf: &mut [u8]) -> Result<usize> {
        let (conn, reliable, notify) = {
            let streams = self.streams.read().await;
            let stream = streams.get(&stream_id).ok_or(Error::ErrUnknownStreamId)?;
            let component = component_ref(stream, component_id)?;
            (
                component.conn.clone(),
                component.reliable.clone(),
                component.readable_notify.clone(),
            )
        };

        if let Some(reliable) = reliable {
            let notify = notify.ok_or_else(|| {
                Error::Other("reliable component is missing its notify handle".to_owned())
            })?;
            loop {
                {
                    let mut state = reliable.lock().await;
                    if !state.readable.is_empty() {
                        let n = buf.len().min(state.readable.len());
                        for slot in buf.iter_mut().take(n) {
                            *slot = state.readable.pop_front().expect("checked non-empty above");
                        }
                        return Ok(n);
                    }
                    // Nothing buffered and nothing more will ever arrive: report
                    // EOF rather than parking forever.
                    if state.closed {
                        return Ok(0);
                    }
                }
                notify.notified().await;
            }
        }

        let conn = conn.ok_or(Error::Other("component has no selected pair yet".to_owned()))?;
        conn.recv(buf).await.map_err(|e| Error::Other(e.to_string()))
    }
}

/// Drains pending pseudo-TCP output onto the wire. Called after every local
/// mutation of the socket (a send, a clock tick, or an inbound datagram)
/// since the engine never performs I/O itself.
async fn pump_reliable(conn: &Arc<dyn Conn + Send + Sync>, reliable: &Arc<AsyncMutex<ReliableState>>) {
    loop {
        let pkt = {
            let mut state = reliable.lock().await;
            state.socket.poll_output()
        };
        match pkt {
            Some(pkt) => {
                let _ = conn.send(&pkt).await;
            }
            None => break,
        }
    }
}

/// Drives one reliable component's pseudo-TCP socket: the engine itself
/// never performs I/O, so something has to feed it inbound datagrams and
/// wake it on its own clock. Shaped after `agent::agent_transport`'s
/// `dial`/`accept` select loops (await inbound data, or a deadline,
/// whichever comes first) rather than a fixed polling interval, so the
/// handshake and retransmissions fire as promptly as the datagram channel
/// allows.
async fn drive_reliable(
    conn: Arc<dyn Conn + Send + Sync>,
    reliable: Arc<AsyncMutex<ReliableState>>,
    notify: Arc<Notify>,
) {
    let mut buf = vec![0u8; 1500];
    loop {
        let deadline = {
            let state = reliable.lock().await;
            state.socket.get_next_clock(Instant::now())
        };
        let sleep = match deadline {
            Some(d) => tokio::time::sleep(d),
            // No pending timer: still re-check periodically so a clock that
            // only becomes due via a future notify_packet is not missed.
            None => tokio::time::sleep(std::time::Duration::from_secs(1)),
        };
        tokio::pin!(sleep);

        tokio::select! {
            res = conn.recv(&mut buf) => {
                match res {
                    Ok(n) => {
                        {
                            let mut state = reliable.lock().await;
                            if state.socket.notify_packet(&buf[..n], Instant::now()).is_err() {
                                continue;
                            }
                        }
                        drain_events(&reliable, &notify).await;
                        pump_reliable(&conn, &reliable).await;
                    }
                    Err(_) => return,
                }
            }
            _ = &mut sleep => {
                {
                    let mut state = reliable.lock().await;
                    state.socket.notify_clock(Instant::now());
                }
                drain_events(&reliable, &notify).await;
                pump_reliable(&conn, &reliable).await;
            }
        }

        let closed = {
            let state = reliable.lock().await;
            matches!(state.socket.state(), ptcp::State::Closed)
        };
        if closed {
            return;
        }
    }
}

/// Moves bytes the pseudo-TCP socket has reassembled into the FIFO
/// `IceSession::recv` reads from, and wakes any parked reader. `Opened`/
/// `Writable`/`Closed`/`Aborted` have no session-level surface yet beyond
/// unblocking a reader on `Closed`/`Aborted` (a `recv` that is never going
/// to see more bytes should return rather than hang).
async fn drain_events(reliable: &Arc<AsyncMutex<ReliableState>>, notify: &Arc<Notify>) {
    let mut became_readable = false;
    loop {
        let event = {
            let mut state = reliable.lock().await;
            state.socket.poll_event()
        };
        match event {
            Some(ptcp::Event::Readable) => {
                let mut state = reliable.lock().await;
                let mut chunk = [0u8; 1500];
                loop {
                    let n = state.socket.recv(&mut chunk);
                    if n == 0 {
                        break;
                    }
                    state.readable.extend(&chunk[..n]);
                    became_readable = true;
                }
            }
            Some(ptcp::Event::Closed) | Some(ptcp::Event::Aborted) => {
                let mut state = reliable.lock().await;
                state.closed = true;
                became_readable = true;
            }
            Some(_) => {}
            None => break,
        }
    }
    if became_readable {
        notify.notify_one();
    }
}

async fn find_candidate_by_foundation(
    candidates: &AsyncMutex<HashMap<NetworkType, Vec<Arc<dyn Candidate + Send + Sync>>>>,
    foundation: &str,
) -> Option<Arc<dyn Candidate + Send + Sync>> {
    let map = candidates.lock().await;
    map.values().flatten().find(|c| c.foundation() == foundation).cloned()
}

fn component_ref(stream: &StreamSlot, component_id: u16) -> Result<&ComponentSlot> {
    stream
        .components
        .iter()
        .find(|c| c.id == component_id)
        .ok_or(Error::ErrUnknownComponentId)
}

fn component_mut(stream: &mut StreamSlot, component_id: u16) -> Result<&mut ComponentSlot> {
    stream
        .components
        .iter_mut()
        .find(|c| c.id == component_id)
        .ok_or(Error::ErrUnknownComponentId)
}

fn relay_to_url(relay: &RelayInfo) -> Url {
    Url {
        scheme: SchemeType::Turn,
        host: relay.server_host.clone(),
        port: relay.server_port,
        username: relay.username.clone(),
        password: relay.password.clone(),
        proto: match relay.relay_type {
            RelayType::TurnUdp => ProtoType::Udp,
        },
    }
}

#[cfg(test)]
mod session_test {
    use super::*;

    #[tokio::test]
    async fn add_stream_assigns_distinct_nonzero_ids() {
        let session = IceSession::new(IceSessionConfig::default());
        let a = session.add_stream(1).await.unwrap();
        let b = session.add_stream(2).await.unwrap();
        assert_ne!(a, b);
        assert_ne!(a, 0);
        assert_ne!(b, 0);
    }

    #[tokio::test]
    async fn zero_components_is_rejected() {
        let session = IceSession::new(IceSessionConfig::default());
        assert!(session.add_stream(0).await.is_err());
    }

    #[tokio::test]
    async fn unknown_stream_id_is_a_typed_error() {
        let session = IceSession::new(IceSessionConfig::default());
        let err = session.get_component_state(999, 1).await.unwrap_err();
        assert_eq!(err, Error::ErrUnknownStreamId);
    }

    #[tokio::test]
    async fn unknown_component_id_is_a_typed_error() {
        let session = IceSession::new(IceSessionConfig::default());
        let stream_id = session.add_stream(1).await.unwrap();
        let err = session.get_component_state(stream_id, 99).await.unwrap_err();
        assert_eq!(err, Error::ErrUnknownComponentId);
    }

    #[tokio::test]
    async fn credentials_round_trip_through_the_stream() {
        let session = IceSession::new(IceSessionConfig::default());
        let stream_id = session.add_stream(1).await.unwrap();
        session
            .set_local_credentials(stream_id, "ufrag1234".to_owned(), "password1234567890123".to_owned())
            .await
            .unwrap();
        let (ufrag, pwd) = session.get_local_credentials(stream_id).await.unwrap();
        assert_eq!(ufrag, "ufrag1234");
        assert_eq!(pwd, "password1234567890123");
    }

    #[tokio::test]
    async fn connect_before_remote_credentials_fails() {
        let session = IceSession::new(IceSessionConfig::default());
        let stream_id = session.add_stream(1).await.unwrap();
        let err = session.connect(stream_id).await.unwrap_err();
        assert_eq!(err, Error::ErrRemoteUfragEmpty);
    }
}
