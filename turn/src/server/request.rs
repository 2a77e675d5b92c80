use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use rand::Rng;
use stun::agent::TransactionId;
use stun::attributes::*;
use stun::error_code::*;
use stun::fingerprint::FINGERPRINT;
use stun::integrity::MessageIntegrity;
use stun::message::*;
use stun::textattrs::{Nonce, Realm, Username};
use tokio::sync::Mutex;
use tokio::time::{Duration, Instant};
use util::Conn;

use super::NONCE_LIFETIME;
use crate::allocation::allocation_manager::Manager;
use crate::allocation::channel_bind::ChannelBind;
use crate::allocation::five_tuple::FiveTuple;
use crate::allocation::permission::Permission;
use crate::auth::AuthHandler;
use crate::error::{Error, Result};
use crate::proto::chandata::{ChannelData, MAX_CHANNEL_NUMBER, MIN_CHANNEL_NUMBER};
use crate::proto::channum::ChannelNumber;
use crate::proto::data::Data;
use crate::proto::evenport::EvenPort;
use crate::proto::lifetime::{Lifetime, DEFAULT_LIFETIME};
use crate::proto::peeraddr::PeerAddress;
use crate::proto::relayaddr::RelayedAddress;
use crate::proto::reqtrans::RequestedTransport;
use crate::proto::reservation_token::ReservationToken;
use crate::proto::PROTO_UDP;

/// Inbound datagram and the plumbing its handler needs: which listener it
/// arrived on, who to ask about credentials, and the shared nonce/allocation
/// state for that listener.
pub(crate) struct Request {
    pub(crate) conn: Arc<dyn Conn + Send + Sync>,
    pub(crate) manager: Arc<Manager>,
    pub(crate) src_addr: SocketAddr,
    pub(crate) buff: Vec<u8>,
    pub(crate) realm: String,
    pub(crate) auth_handler: Arc<dyn AuthHandler + Send + Sync>,
    pub(crate) nonces: Arc<Mutex<HashMap<String, Instant>>>,
    pub(crate) channel_bind_timeout: Duration,
}

pub(crate) async fn handle_request(r: Request) -> Result<()> {
    if ChannelData::is_channel_data(&r.buff) {
        return handle_data_packet(r).await;
    }

    if !is_message(&r.buff) {
        log::debug!("unhandled packet from {}, discarding", r.src_addr);
        return Ok(());
    }

    let mut msg = Message::new();
    msg.raw = r.buff.clone();
    msg.decode()?;

    handle_stun_message(r, msg).await
}

async fn handle_data_packet(r: Request) -> Result<()> {
    let mut cd = ChannelData {
        raw: r.buff.clone(),
        ..Default::default()
    };
    cd.decode()?;

    let five_tuple = FiveTuple {
        protocol: PROTO_UDP,
        src_addr: r.src_addr,
        dst_addr: r.conn.local_addr()?,
    };

    let a = match r.manager.get_allocation(&five_tuple).await {
        Some(a) => a,
        None => return Err(Error::ErrNoAllocationFound),
    };

    let peer = match a.get_channel_addr(&cd.number).await {
        Some(p) => p,
        None => return Err(Error::ErrNoSuchChannelBind),
    };

    a.relay_socket.send_to(&cd.data, peer).await?;

    Ok(())
}

async fn handle_stun_message(r: Request, mut msg: Message) -> Result<()> {
    if msg.typ.class == CLASS_REQUEST {
        match msg.typ.method {
            METHOD_BINDING => handle_binding_request(r, msg).await,
            METHOD_ALLOCATE => handle_allocate_request(r, &mut msg).await,
            METHOD_REFRESH => handle_refresh_request(r, &mut msg).await,
            METHOD_CREATE_PERMISSION => handle_create_permission_request(r, &mut msg).await,
            METHOD_CHANNEL_BIND => handle_channel_bind_request(r, &mut msg).await,
            _ => Err(Error::ErrUnexpectedMethod),
        }
    } else if msg.typ.class == CLASS_INDICATION && msg.typ.method == METHOD_SEND {
        handle_send_indication(r, &msg).await
    } else {
        Err(Error::ErrUnexpectedClass)
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn generate_nonce() -> String {
    let mut buf = [0u8; 16];
    rand::thread_rng().fill(&mut buf);
    hex_encode(&buf)
}

async fn new_nonce(nonces: &Mutex<HashMap<String, Instant>>) -> String {
    let nonce = generate_nonce();
    let mut guarded = nonces.lock().await;
    guarded.insert(nonce.clone(), Instant::now() + NONCE_LIFETIME);
    nonce
}

async fn take_nonce_if_fresh(nonces: &Mutex<HashMap<String, Instant>>, nonce: &str) -> bool {
    let mut guarded = nonces.lock().await;
    match guarded.get(nonce) {
        Some(expiry) if *expiry > Instant::now() => true,
        _ => {
            guarded.remove(nonce);
            false
        }
    }
}

async fn send_message(r: &Request, msg: &Message) -> Result<()> {
    r.conn.send_to(&msg.raw, r.src_addr).await?;
    Ok(())
}

fn build_success_response(
    transaction_id: TransactionId,
    method: Method,
    mut attrs: Vec<Box<dyn Setter>>,
    integrity: &MessageIntegrity,
) -> Result<Message> {
    let mut setters: Vec<Box<dyn Setter>> = vec![
        Box::new(transaction_id),
        Box::new(MessageType::new(method, CLASS_SUCCESS_RESPONSE)),
    ];
    setters.append(&mut attrs);
    setters.push(Box::new(integrity.clone()));
    setters.push(Box::new(FINGERPRINT));

    let mut msg = Message::new();
    msg.build(&setters)?;
    Ok(msg)
}

fn build_error_response(
    transaction_id: TransactionId,
    method: Method,
    code: ErrorCode,
    mut extra: Vec<Box<dyn Setter>>,
) -> Result<Message> {
    let mut setters: Vec<Box<dyn Setter>> = vec![
        Box::new(transaction_id),
        Box::new(MessageType::new(method, CLASS_ERROR_RESPONSE)),
        Box::new(code),
    ];
    setters.append(&mut extra);
    setters.push(Box::new(FINGERPRINT));

    let mut msg = Message::new();
    msg.build(&setters)?;
    Ok(msg)
}

/// Sends the `REALM`+`NONCE` challenge used both for a first-time
/// unauthenticated request (401) and for a request carrying a nonce the
/// server no longer recognizes (438).
async fn send_challenge(r: &Request, transaction_id: TransactionId, method: Method) -> Result<()> {
    let nonce = new_nonce(&r.nonces).await;
    let resp = build_error_response(
        transaction_id,
        method,
        CODE_UNAUTHORIZED,
        vec![
            Box::new(Realm::new(ATTR_REALM, r.realm.clone())),
            Box::new(Nonce::new(ATTR_NONCE, nonce)),
        ],
    )?;
    send_message(r, &resp).await
}

async fn send_stale_nonce(r: &Request, transaction_id: TransactionId, method: Method) -> Result<()> {
    let nonce = new_nonce(&r.nonces).await;
    let resp = build_error_response(
        transaction_id,
        method,
        CODE_STALE_NONCE,
        vec![
            Box::new(Realm::new(ATTR_REALM, r.realm.clone())),
            Box::new(Nonce::new(ATTR_NONCE, nonce)),
        ],
    )?;
    send_message(r, &resp).await
}

/// Authenticates a request using the long-term credential mechanism
/// (RFC 5389 §10.2). Returns the verified username and a ready-to-use
/// `MessageIntegrity` on success. On any authentication failure, this sends
/// the appropriate challenge/error response itself and returns `Ok(None)` so
/// the caller can simply return.
async fn authenticate_request(
    r: &Request,
    m: &mut Message,
    method: Method,
) -> Result<Option<(String, MessageIntegrity)>> {
    let username = match Username::get_from_as(m, ATTR_USERNAME) {
        Ok(u) => u.text,
        Err(_) => {
            send_challenge(r, m.transaction_id, method).await?;
            return Ok(None);
        }
    };

    let nonce = match Nonce::get_from_as(m, ATTR_NONCE) {
        Ok(n) => n.text,
        Err(_) => {
            send_challenge(r, m.transaction_id, method).await?;
            return Ok(None);
        }
    };

    if !take_nonce_if_fresh(&r.nonces, &nonce).await {
        send_stale_nonce(r, m.transaction_id, method).await?;
        return Ok(None);
    }

    let key = match r.auth_handler.auth_handle(&username, &r.realm, r.src_addr) {
        Ok(key) => key,
        Err(_) => {
            send_challenge(r, m.transaction_id, method).await?;
            return Ok(None);
        }
    };

    let integrity = MessageIntegrity(key);
    if integrity.check(m).is_err() {
        send_challenge(r, m.transaction_id, method).await?;
        return Ok(None);
    }

    Ok(Some((username, integrity)))
}

async fn handle_binding_request(r: Request, msg: Message) -> Result<()> {
    let xor_addr = stun::xoraddr::XorMappedAddress {
        ip: r.src_addr.ip(),
        port: r.src_addr.port(),
    };

    let setters: Vec<Box<dyn Setter>> = vec![
        Box::new(msg.transaction_id),
        Box::new(MessageType::new(METHOD_BINDING, CLASS_SUCCESS_RESPONSE)),
        Box::new(xor_addr),
        Box::new(FINGERPRINT),
    ];

    let mut resp = Message::new();
    resp.build(&setters)?;

    send_message(&r, &resp).await
}

async fn handle_allocate_request(r: Request, msg: &mut Message) -> Result<()> {
    let (username, integrity) = match authenticate_request(&r, msg, METHOD_ALLOCATE).await? {
        Some(v) => v,
        None => return Ok(()),
    };

    let five_tuple = FiveTuple {
        protocol: PROTO_UDP,
        src_addr: r.src_addr,
        dst_addr: r.conn.local_addr()?,
    };

    if r.manager.get_allocation(&five_tuple).await.is_some() {
        let resp = build_error_response(
            msg.transaction_id,
            METHOD_ALLOCATE,
            CODE_ALLOC_MISMATCH,
            vec![],
        )?;
        return send_message(&r, &resp).await;
    }

    let mut requested_transport = RequestedTransport::default();
    requested_transport.get_from(msg)?;
    if requested_transport.protocol != PROTO_UDP {
        let resp = build_error_response(
            msg.transaction_id,
            METHOD_ALLOCATE,
            CODE_UNSUPPORTED_TRANS_PROTO,
            vec![],
        )?;
        return send_message(&r, &resp).await;
    }

    if msg.get(ATTR_DONT_FRAGMENT).is_ok() {
        let resp = build_error_response(
            msg.transaction_id,
            METHOD_ALLOCATE,
            CODE_UNSUPPORTED_TRANS_PROTO,
            vec![],
        )?;
        return send_message(&r, &resp).await;
    }

    let mut reservation_token = ReservationToken::default();
    let has_reservation_token = reservation_token.get_from(msg).is_ok();

    let mut even_port = EvenPort::default();
    let has_even_port = even_port.get_from(msg).is_ok();

    if has_reservation_token && has_even_port {
        let resp = build_error_response(
            msg.transaction_id,
            METHOD_ALLOCATE,
            CODE_BAD_REQUEST,
            vec![],
        )?;
        return send_message(&r, &resp).await;
    }

    let mut lifetime_attr = Lifetime::default();
    let lifetime = if lifetime_attr.get_from(msg).is_ok() && lifetime_attr.0 > Duration::from_secs(0) {
        std::cmp::min(lifetime_attr.0, DEFAULT_LIFETIME)
    } else {
        DEFAULT_LIFETIME
    };

    let requested_port = if has_reservation_token {
        let key = hex_encode(&reservation_token.0);
        r.manager.get_reservation(&key).await.unwrap_or(0)
    } else {
        0
    };

    let turn_socket = Arc::clone(&r.conn);
    let result = r
        .manager
        .create_allocation(
            five_tuple,
            turn_socket,
            requested_port,
            lifetime,
            Username::new(ATTR_USERNAME, username),
            true,
        )
        .await;

    let a = match result {
        Ok(a) => a,
        Err(_) => {
            let resp = build_error_response(
                msg.transaction_id,
                METHOD_ALLOCATE,
                CODE_INSUFFICIENT_CAPACITY,
                vec![],
            )?;
            return send_message(&r, &resp).await;
        }
    };

    let mut extra_attrs: Vec<Box<dyn Setter>> = Vec::new();
    if has_even_port && even_port.requested_port_props {
        let mut token_bytes = [0u8; 8];
        rand::thread_rng().fill(&mut token_bytes);
        r.manager
            .create_reservation(hex_encode(&token_bytes), a.relay_addr.port())
            .await;
        extra_attrs.push(Box::new(ReservationToken(token_bytes.to_vec())));
    }

    let relayed_address = RelayedAddress {
        ip: a.relay_addr.ip(),
        port: a.relay_addr.port(),
    };
    let mapped_address = stun::xoraddr::XorMappedAddress {
        ip: r.src_addr.ip(),
        port: r.src_addr.port(),
    };

    let mut attrs: Vec<Box<dyn Setter>> = vec![
        Box::new(relayed_address),
        Box::new(Lifetime(lifetime)),
        Box::new(mapped_address),
    ];
    attrs.append(&mut extra_attrs);

    let resp = build_success_response(msg.transaction_id, METHOD_ALLOCATE, attrs, &integrity)?;

    send_message(&r, &resp).await
}

async fn handle_refresh_request(r: Request, msg: &mut Message) -> Result<()> {
    let (_username, integrity) = match authenticate_request(&r, msg, METHOD_REFRESH).await? {
        Some(v) => v,
        None => return Ok(()),
    };

    let five_tuple = FiveTuple {
        protocol: PROTO_UDP,
        src_addr: r.src_addr,
        dst_addr: r.conn.local_addr()?,
    };

    let mut lifetime_attr = Lifetime::default();
    let lifetime = if lifetime_attr.get_from(msg).is_ok() {
        std::cmp::min(lifetime_attr.0, DEFAULT_LIFETIME)
    } else {
        DEFAULT_LIFETIME
    };

    if lifetime == Duration::from_secs(0) {
        r.manager.delete_allocation(&five_tuple).await;
    } else {
        match r.manager.get_allocation(&five_tuple).await {
            Some(a) => a.refresh(lifetime).await,
            None => {
                let resp = build_error_response(
                    msg.transaction_id,
                    METHOD_REFRESH,
                    CODE_ALLOC_MISMATCH,
                    vec![],
                )?;
                return send_message(&r, &resp).await;
            }
        }
    }

    let resp = build_success_response(
        msg.transaction_id,
        METHOD_REFRESH,
        vec![Box::new(Lifetime(lifetime))],
        &integrity,
    )?;

    send_message(&r, &resp).await
}

async fn handle_create_permission_request(r: Request, msg: &mut Message) -> Result<()> {
    let (_username, integrity) =
        match authenticate_request(&r, msg, METHOD_CREATE_PERMISSION).await? {
            Some(v) => v,
            None => return Ok(()),
        };

    let five_tuple = FiveTuple {
        protocol: PROTO_UDP,
        src_addr: r.src_addr,
        dst_addr: r.conn.local_addr()?,
    };

    let a = match r.manager.get_allocation(&five_tuple).await {
        Some(a) => a,
        None => {
            let resp = build_error_response(
                msg.transaction_id,
                METHOD_CREATE_PERMISSION,
                CODE_ALLOC_MISMATCH,
                vec![],
            )?;
            return send_message(&r, &resp).await;
        }
    };

    let mut peer_address = PeerAddress::default();
    if peer_address.get_from(msg).is_err() {
        let resp = build_error_response(
            msg.transaction_id,
            METHOD_CREATE_PERMISSION,
            CODE_BAD_REQUEST,
            vec![],
        )?;
        return send_message(&r, &resp).await;
    }

    a.add_permission(Permission::new(SocketAddr::new(
        peer_address.ip,
        peer_address.port,
    )))
    .await;

    let resp = build_success_response(msg.transaction_id, METHOD_CREATE_PERMISSION, vec![], &integrity)?;
    send_message(&r, &resp).await
}

async fn handle_channel_bind_request(r: Request, msg: &mut Message) -> Result<()> {
    let (_username, integrity) = match authenticate_request(&r, msg, METHOD_CHANNEL_BIND).await? {
        Some(v) => v,
        None => return Ok(()),
    };

    let five_tuple = FiveTuple {
        protocol: PROTO_UDP,
        src_addr: r.src_addr,
        dst_addr: r.conn.local_addr()?,
    };

    let a = match r.manager.get_allocation(&five_tuple).await {
        Some(a) => a,
        None => {
            let resp = build_error_response(
                msg.transaction_id,
                METHOD_CHANNEL_BIND,
                CODE_ALLOC_MISMATCH,
                vec![],
            )?;
            return send_message(&r, &resp).await;
        }
    };

    let mut channel_number = ChannelNumber::default();
    let mut peer_address = PeerAddress::default();
    if channel_number.get_from(msg).is_err() || peer_address.get_from(msg).is_err() {
        let resp = build_error_response(
            msg.transaction_id,
            METHOD_CHANNEL_BIND,
            CODE_BAD_REQUEST,
            vec![],
        )?;
        return send_message(&r, &resp).await;
    }

    if !(MIN_CHANNEL_NUMBER..=MAX_CHANNEL_NUMBER).contains(&channel_number.0) {
        let resp = build_error_response(
            msg.transaction_id,
            METHOD_CHANNEL_BIND,
            CODE_BAD_REQUEST,
            vec![],
        )?;
        return send_message(&r, &resp).await;
    }

    let peer = SocketAddr::new(peer_address.ip, peer_address.port);
    if let Err(_err) = a
        .add_channel_bind(
            ChannelBind::new(channel_number, peer),
            r.channel_bind_timeout,
        )
        .await
    {
        let resp = build_error_response(
            msg.transaction_id,
            METHOD_CHANNEL_BIND,
            CODE_BAD_REQUEST,
            vec![],
        )?;
        return send_message(&r, &resp).await;
    }

    let resp = build_success_response(msg.transaction_id, METHOD_CHANNEL_BIND, vec![], &integrity)?;
    send_message(&r, &resp).await
}

async fn handle_send_indication(r: Request, msg: &Message) -> Result<()> {
    let five_tuple = FiveTuple {
        protocol: PROTO_UDP,
        src_addr: r.src_addr,
        dst_addr: r.conn.local_addr()?,
    };

    let a = match r.manager.get_allocation(&five_tuple).await {
        Some(a) => a,
        None => return Err(Error::ErrNoAllocationFound),
    };

    let mut peer_address = PeerAddress::default();
    peer_address.get_from(msg)?;

    let mut data = Data::default();
    data.get_from(msg)?;

    let peer = SocketAddr::new(peer_address.ip, peer_address.port);
    if !a.has_permission(&peer).await {
        return Err(Error::ErrNoPermission);
    }

    a.relay_socket.send_to(&data.0, peer).await?;

    Ok(())
}
