use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::congestion::CongestionControl;
use crate::error::{Error, Result};
use crate::header::{Flags, Header, HEADER_SIZE};
use crate::options::ConnectOptions;
use crate::rto::RtoEstimator;
use crate::segment::Segment;

/// Default maximum segment size, absent a negotiated value.
pub const DEFAULT_MSS: u16 = 1400;

const DEFAULT_RCV_WND: u32 = 64 * 1024;
const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(4);
const TIME_WAIT_TIMEOUT: Duration = Duration::from_millis(1);
const CLOSED_TIMEOUT: Duration = Duration::from_secs(60);

/// Connection state, named after RFC 793 §3.2 with the RFC 793 §3.5
/// close-sequence states split out explicitly (this engine never collapses
/// FIN_WAIT_1/FIN_WAIT_2/CLOSING into one "closing" bucket the way some
/// implementations do, since the spec the peer negotiated FIN-ACK support
/// determines which of those states is even reachable).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum State {
    Listen,
    SynSent,
    SynReceived,
    Established,
    FinWait1,
    FinWait2,
    Closing,
    TimeWait,
    CloseWait,
    LastAck,
    Closed,
}

/// Events the embedder would otherwise have received via the
/// `PseudoTcpOpened`/`Readable`/`Writable`/`Closed` callbacks. Drained with
/// [`PseudoTcpSocket::poll_event`] instead of invoked inline, so the engine
/// is never re-entered from inside one of its own calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Opened,
    Readable,
    Writable,
    Closed,
    /// The peer sent RST, or the handshake never completed.
    Aborted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ShutdownMode {
    None,
    Graceful,
}

/// A single-flow reliable byte stream layered over an unreliable datagram
/// channel. The socket never performs I/O itself: inbound bytes are handed
/// to [`notify_packet`](Self::notify_packet), outbound bytes are drained
/// with [`poll_output`](Self::poll_output), and the caller's clock is driven
/// by [`get_next_clock`](Self::get_next_clock) / [`notify_clock`](Self::notify_clock).
pub struct PseudoTcpSocket {
    conv: u32,
    state: State,

    local_opts: ConnectOptions,
    negotiated: Option<ConnectOptions>,
    mss: u32,

    snd_una: u32,
    snd_nxt: u32,
    snd_wnd: u32,
    send_buffer: VecDeque<u8>,
    send_queue: VecDeque<Segment>,

    rcv_nxt: u32,
    rcv_wnd: u32,
    recv_buffer: VecDeque<u8>,
    reassembly: Vec<Segment>,

    rto: RtoEstimator,
    cc: CongestionControl,
    rto_deadline: Option<Instant>,
    ack_deadline: Option<Instant>,
    keepalive_deadline: Option<Instant>,
    time_wait_deadline: Option<Instant>,
    closed_deadline: Option<Instant>,

    ack_delay: Duration,
    last_ack_sent: u32,

    fin_sent: bool,
    fin_seq: Option<u32>,
    shutdown: ShutdownMode,

    events: VecDeque<Event>,
    outbox: VecDeque<Vec<u8>>,

    clock_seq: u32,
}

impl PseudoTcpSocket {
    /// Creates a socket for `conversation` in `LISTEN`, the initial state of
    /// both sides (there is no distinct client/server role at this layer:
    /// whichever side calls [`connect`](Self::connect) first drives the
    /// handshake).
    pub fn new(conv: u32) -> Self {
        PseudoTcpSocket {
            conv,
            state: State::Listen,
            local_opts: ConnectOptions::default(),
            negotiated: None,
            mss: DEFAULT_MSS as u32,
            snd_una: 0,
            snd_nxt: 0,
            snd_wnd: DEFAULT_MSS as u32,
            send_buffer: VecDeque::new(),
            send_queue: VecDeque::new(),
            rcv_nxt: 0,
            rcv_wnd: DEFAULT_RCV_WND,
            recv_buffer: VecDeque::new(),
            reassembly: Vec::new(),
            rto: RtoEstimator::default(),
            cc: CongestionControl::new(DEFAULT_MSS as u32),
            rto_deadline: None,
            ack_deadline: None,
            keepalive_deadline: None,
            time_wait_deadline: None,
            closed_deadline: None,
            ack_delay: Duration::ZERO,
            last_ack_sent: 0,
            fin_sent: false,
            fin_seq: None,
            shutdown: ShutdownMode::None,
            events: VecDeque::new(),
            outbox: VecDeque::new(),
            clock_seq: 0,
        }
    }

    /// Sets the delayed-ack policy (zero disables delaying: every segment
    /// is acked immediately).
    pub fn set_ack_delay(&mut self, delay: Duration) {
        self.ack_delay = delay;
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// Drains one queued event, oldest first.
    pub fn poll_event(&mut self) -> Option<Event> {
        self.events.pop_front()
    }

    /// Drains one outbound datagram, oldest first. The caller is the
    /// `WritePacket` callback of the original design: hand this to the
    /// unreliable channel and move on, non-blocking.
    pub fn poll_output(&mut self) -> Option<Vec<u8>> {
        self.outbox.pop_front()
    }

    /// Initiates the handshake: only valid from `LISTEN`.
    pub fn connect(&mut self, now: Instant) -> Result<()> {
        if self.state != State::Listen {
            return Err(Error::ErrNotListening);
        }
        self.state = State::SynSent;
        self.send_ctl(self.local_opts.encode(), now);
        self.arm_rto(now);
        Ok(())
    }

    /// Enqueues `data` for transmission. Returns the number of bytes
    /// accepted (all of it, or zero if the send FIFO has no room and the
    /// caller should wait for [`Event::Writable`]).
    pub fn send(&mut self, data: &[u8], now: Instant) -> Result<usize> {
        match self.state {
            State::Established | State::CloseWait => {}
            State::Closed | State::TimeWait | State::LastAck | State::Closing => {
                return Err(Error::ErrClosed)
            }
            _ => return Err(Error::ErrNotConnected),
        }
        const MAX_BUFFERED: usize = 1024 * 1024;
        if self.send_buffer.len() >= MAX_BUFFERED {
            return Err(Error::ErrWouldBlock);
        }
        self.send_buffer.extend(data.iter().copied());
        self.flush_send(now);
        Ok(data.len())
    }

    /// Copies as many bytes as are ready into `buf`, in order, returning the
    /// count copied.
    pub fn recv(&mut self, buf: &mut [u8]) -> usize {
        let n = buf.len().min(self.recv_buffer.len());
        for slot in buf.iter_mut().take(n) {
            *slot = self.recv_buffer.pop_front().unwrap();
        }
        n
    }

    /// `close(graceful=true)` walks the RFC 793 §3.5 shutdown sequence if
    /// FIN-ACK was negotiated; `close(graceful=false)` sends RST and jumps
    /// straight to `CLOSED`. If FIN-ACK was never negotiated, a graceful
    /// close just flushes locally and reports closed (there is no peer
    /// cooperation to wait for).
    pub fn close(&mut self, graceful: bool, now: Instant) {
        if self.state == State::Closed {
            return;
        }
        if !graceful {
            self.send_ctl_flagged(Flags::Rst, Vec::new(), now);
            self.enter_closed(now);
            return;
        }

        let fin_ack = self.negotiated.map(|o| o.supports_fin_ack).unwrap_or(false);
        if !fin_ack {
            self.enter_closed(now);
            return;
        }

        self.shutdown = ShutdownMode::Graceful;
        match self.state {
            State::Established => {
                self.send_fin(now);
                self.state = State::FinWait1;
            }
            State::CloseWait => {
                self.send_fin(now);
                self.state = State::LastAck;
            }
            _ => {}
        }
    }

    /// Earliest of {RTO deadline, delayed-ack deadline, keepalive default
    /// 4s, closed-timeout 60s} relative to `now`, or `None` if the socket is
    /// fully idle (`LISTEN`/`CLOSED` with nothing scheduled).
    pub fn get_next_clock(&self, now: Instant) -> Option<Duration> {
        [
            self.rto_deadline,
            self.ack_deadline,
            self.keepalive_deadline,
            self.time_wait_deadline,
            self.closed_deadline,
        ]
        .into_iter()
        .flatten()
        .min()
        .map(|d| d.saturating_duration_since(now))
    }

    /// Called when the caller's clock fires. Advances whichever deadlines
    /// have passed.
    pub fn notify_clock(&mut self, now: Instant) {
        if let Some(d) = self.rto_deadline {
            if now >= d {
                self.on_rto(now);
            }
        }
        if let Some(d) = self.ack_deadline {
            if now >= d {
                self.ack_deadline = None;
                self.send_pure_ack(now);
            }
        }
        if let Some(d) = self.keepalive_deadline {
            if now >= d && self.state == State::Established {
                self.send_pure_ack(now);
                self.keepalive_deadline = Some(now + KEEPALIVE_INTERVAL);
            }
        }
        if let Some(d) = self.time_wait_deadline {
            if now >= d {
                self.enter_closed(now);
            }
        }
        if let Some(d) = self.closed_deadline {
            if now >= d {
                self.closed_deadline = None;
            }
        }
    }

    /// Feeds one inbound datagram (the `recv_datagram_callback` path in the
    /// enclosing ICE component).
    pub fn notify_packet(&mut self, buf: &[u8], now: Instant) -> Result<()> {
        if self.state == State::Closed {
            return Ok(());
        }
        let header = Header::from_bytes(buf)?;
        if header.conv != self.conv {
            return Ok(());
        }
        let payload = &buf[HEADER_SIZE..];

        self.snd_wnd = header.window as u32;
        self.last_recv_time(now);

        match header.flags {
            Flags::Rst => {
                self.events.push_back(Event::Aborted);
                self.enter_closed(now);
                return Ok(());
            }
            Flags::Ctl => self.on_ctl(payload, now)?,
            Flags::Fin | Flags::None => self.on_data_segment(&header, payload, now),
        }

        self.process_ack(header.ack, now);
        Ok(())
    }

    // -- internal --

    fn last_recv_time(&mut self, now: Instant) {
        self.keepalive_deadline = Some(now + KEEPALIVE_INTERVAL);
    }

    fn on_ctl(&mut self, payload: &[u8], now: Instant) -> Result<()> {
        match self.state {
            State::Listen => {
                let remote = ConnectOptions::decode(payload)?;
                self.negotiated = Some(ConnectOptions::negotiate(&self.local_opts, &remote));
                self.apply_negotiated();
                self.state = State::SynReceived;
                self.send_ctl(self.local_opts.encode(), now);
                self.arm_rto(now);
            }
            State::SynSent => {
                let remote = ConnectOptions::decode(payload)?;
                self.negotiated = Some(ConnectOptions::negotiate(&self.local_opts, &remote));
                self.apply_negotiated();
                self.state = State::Established;
                self.disarm_rto();
                self.events.push_back(Event::Opened);
                self.keepalive_deadline = Some(now + KEEPALIVE_INTERVAL);
                // Completes the three-way handshake: the passive side is
                // still in SYN_RECEIVED and only leaves it on receiving a
                // segment, same as a data segment would.
                self.send_pure_ack(now);
            }
            State::SynReceived => {
                // Retransmitted CONNECT from a peer that hasn't seen our
                // reply yet: reply again, no state change.
                self.send_ctl(self.local_opts.encode(), now);
            }
            _ => {
                self.state = State::Established;
                self.events.push_back(Event::Opened);
            }
        }
        Ok(())
    }

    fn apply_negotiated(&mut self) {
        if let Some(opts) = self.negotiated {
            self.mss = opts.mss as u32;
            self.cc = CongestionControl::new(self.mss);
        }
    }

    fn on_data_segment(&mut self, header: &Header, payload: &[u8], now: Instant) {
        if self.state == State::SynReceived {
            self.state = State::Established;
            self.disarm_rto();
            self.events.push_back(Event::Opened);
            self.keepalive_deadline = Some(now + KEEPALIVE_INTERVAL);
        }

        let seg = Segment {
            seq: header.seq,
            flags: header.flags,
            data: payload.to_vec(),
            xmit: 1,
            sent_at: None,
        };

        if seg.end_seq().wrapping_sub(self.rcv_nxt) as i32 <= 0 && !seg.is_empty() {
            // Entirely before rcv_nxt: duplicate, ack and drop.
            self.schedule_ack(now, true);
            return;
        }

        let in_order = seg.seq == self.rcv_nxt;
        if in_order {
            self.deliver(seg, now);
            self.drain_reassembly(now);
            self.schedule_ack(now, self.ack_delay.is_zero());
        } else {
            self.insert_reassembly(seg);
            // Any out-of-order arrival triggers an immediate ack.
            self.schedule_ack(now, true);
        }
    }

    fn deliver(&mut self, seg: Segment, now: Instant) {
        self.recv_buffer.extend(seg.data.iter().copied());
        self.rcv_nxt = self.rcv_nxt.wrapping_add(seg.len());
        if seg.flags == Flags::Fin {
            self.on_fin_received(now);
        }
        if !self.recv_buffer.is_empty() {
            self.events.push_back(Event::Readable);
        }
    }

    fn on_fin_received(&mut self, now: Instant) {
        match self.state {
            State::Established => self.state = State::CloseWait,
            State::FinWait1 => self.state = State::Closing,
            State::FinWait2 => {
                self.state = State::TimeWait;
                self.time_wait_deadline = Some(now + TIME_WAIT_TIMEOUT);
            }
            _ => {}
        }
    }

    fn insert_reassembly(&mut self, seg: Segment) {
        if self.reassembly.iter().any(|s| s.seq == seg.seq) {
            return;
        }
        let pos = self.reassembly.partition_point(|s| s.seq < seg.seq);
        self.reassembly.insert(pos, seg);
    }

    fn drain_reassembly(&mut self, now: Instant) {
        loop {
            match self.reassembly.first() {
                Some(front) if front.seq == self.rcv_nxt => {
                    let seg = self.reassembly.remove(0);
                    self.deliver(seg, now);
                }
                _ => break,
            }
        }
    }

    fn schedule_ack(&mut self, now: Instant, immediate: bool) {
        if immediate || self.ack_delay.is_zero() {
            self.send_pure_ack(now);
        } else {
            self.ack_deadline.get_or_insert(now + self.ack_delay);
        }
    }

    fn process_ack(&mut self, ack: u32, now: Instant) {
        let advanced = ack.wrapping_sub(self.snd_una) as i32 > 0;
        if advanced {
            let acked_bytes = ack.wrapping_sub(self.snd_una);
            self.snd_una = ack;

            let mut sampled = false;
            while let Some(front) = self.send_queue.front() {
                if front.end_seq().wrapping_sub(ack) as i32 > 0 {
                    break;
                }
                let seg = self.send_queue.pop_front().unwrap();
                // Karn's algorithm: only a segment that was never
                // retransmitted yields a trustworthy RTT sample.
                if seg.xmit == 1 && !sampled {
                    if let Some(sent_at) = seg.sent_at {
                        self.rto.sample(now.saturating_duration_since(sent_at));
                        sampled = true;
                    }
                }
            }

            self.cc.on_new_ack(acked_bytes, self.snd_una);
            if self.send_queue.is_empty() {
                self.disarm_rto();
            } else {
                self.arm_rto(now);
            }
            self.events.push_back(Event::Writable);
            self.flush_send(now);

            if self.shutdown == ShutdownMode::Graceful && self.fin_sent {
                self.maybe_advance_close_after_ack(ack, now);
            }
        } else if ack == self.last_ack_sent && !self.send_queue.is_empty() {
            let in_flight = self.snd_nxt.wrapping_sub(self.snd_una);
            if self.cc.on_duplicate_ack(in_flight, self.snd_nxt) {
                self.retransmit_head(now);
            }
        }
        self.last_ack_sent = ack;
    }

    fn maybe_advance_close_after_ack(&mut self, ack: u32, now: Instant) {
        if let Some(fin_seq) = self.fin_seq {
            if ack.wrapping_sub(fin_seq) as i32 > 0 || ack == fin_seq.wrapping_add(1) {
                match self.state {
                    State::FinWait1 => self.state = State::FinWait2,
                    State::Closing => {
                        self.state = State::TimeWait;
                        self.time_wait_deadline = Some(now + TIME_WAIT_TIMEOUT);
                    }
                    State::LastAck => self.enter_closed(now),
                    _ => {}
                }
            }
        }
    }

    fn on_rto(&mut self, now: Instant) {
        self.rto.back_off();
        let in_flight = self.snd_nxt.wrapping_sub(self.snd_una);
        self.cc.on_rto(in_flight);
        self.retransmit_head(now);
        self.arm_rto(now);
    }

    fn retransmit_head(&mut self, now: Instant) {
        if let Some(seg) = self.send_queue.front_mut() {
            seg.xmit += 1;
            seg.sent_at = Some(now);
            let header = self.build_header(seg.seq, seg.flags, now);
            self.emit(header, &seg.data);
        }
    }

    fn arm_rto(&mut self, now: Instant) {
        self.rto_deadline = Some(now + self.rto.rto());
    }

    fn disarm_rto(&mut self) {
        self.rto_deadline = None;
    }

    /// Chunks `send_buffer` into MSS-sized segments and transmits as many
    /// as the congestion/receive window allows. Nagle: a sub-MSS chunk is
    /// held back while there is unacked data in flight, unless the buffer
    /// holds no more than one chunk's worth (nothing more is coming soon).
    fn flush_send(&mut self, now: Instant) {
        if self.state != State::Established && self.state != State::CloseWait {
            return;
        }
        loop {
            if self.send_buffer.is_empty() {
                break;
            }
            let in_flight = self.snd_nxt.wrapping_sub(self.snd_una);
            let window = self.cc.usable_window(self.snd_wnd.max(self.mss));
            if in_flight >= window {
                break;
            }
            let budget = (window - in_flight).min(self.mss) as usize;
            let chunk_len = self.send_buffer.len().min(budget);
            if chunk_len == 0 {
                break;
            }
            let nagle_hold = chunk_len < self.mss as usize
                && in_flight > 0
                && self.send_buffer.len() > chunk_len;
            if nagle_hold {
                break;
            }

            let data: Vec<u8> = self.send_buffer.drain(..chunk_len).collect();
            let seq = self.snd_nxt;
            let seg = Segment {
                seq,
                flags: Flags::None,
                data: data.clone(),
                xmit: 1,
                sent_at: Some(now),
            };
            self.snd_nxt = self.snd_nxt.wrapping_add(seg.len());
            let header = self.build_header(seq, Flags::None, now);
            self.emit(header, &data);
            self.send_queue.push_back(seg);
            if self.rto_deadline.is_none() {
                self.arm_rto(now);
            }
        }
    }

    fn send_fin(&mut self, now: Instant) {
        let seq = self.snd_nxt;
        self.snd_nxt = self.snd_nxt.wrapping_add(1);
        let seg = Segment {
            seq,
            flags: Flags::Fin,
            data: Vec::new(),
            xmit: 1,
            sent_at: Some(now),
        };
        self.fin_seq = Some(seq);
        self.fin_sent = true;
        let header = self.build_header(seq, Flags::Fin, now);
        self.emit(header, &[]);
        self.send_queue.push_back(seg);
        if self.rto_deadline.is_none() {
            self.arm_rto(now);
        }
    }

    fn send_ctl(&mut self, payload: Vec<u8>, now: Instant) {
        let header = self.build_header(self.snd_nxt, Flags::Ctl, now);
        self.emit(header, &payload);
    }

    fn send_ctl_flagged(&mut self, flags: Flags, payload: Vec<u8>, now: Instant) {
        let header = self.build_header(self.snd_nxt, flags, now);
        self.emit(header, &payload);
    }

    fn send_pure_ack(&mut self, now: Instant) {
        let header = self.build_header(self.snd_nxt, Flags::None, now);
        self.emit(header, &[]);
    }

    fn build_header(&mut self, seq: u32, flags: Flags, _now: Instant) -> Header {
        self.clock_seq = self.clock_seq.wrapping_add(1);
        Header {
            conv: self.conv,
            seq,
            ack: self.rcv_nxt,
            flags,
            window: self.rcv_wnd.min(u16::MAX as u32) as u16,
            tsval: self.clock_seq,
            tsecr: 0,
        }
    }

    fn emit(&mut self, header: Header, payload: &[u8]) {
        let mut buf = Vec::with_capacity(HEADER_SIZE + payload.len());
        buf.extend_from_slice(&header.to_bytes());
        buf.extend_from_slice(payload);
        self.outbox.push_back(buf);
    }

    fn enter_closed(&mut self, now: Instant) {
        self.state = State::Closed;
        self.rto_deadline = None;
        self.ack_deadline = None;
        self.keepalive_deadline = None;
        self.time_wait_deadline = None;
        self.closed_deadline = Some(now + CLOSED_TIMEOUT);
        self.events.push_back(Event::Closed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Shuttles every pending datagram from `from` to `to` until `from` has
    /// nothing left to say, mimicking a lossless unreliable channel.
    fn pump(from: &mut PseudoTcpSocket, to: &mut PseudoTcpSocket, now: Instant) {
        while let Some(pkt) = from.poll_output() {
            to.notify_packet(&pkt, now).unwrap();
        }
    }

    fn drain_events(sock: &mut PseudoTcpSocket) -> Vec<Event> {
        let mut out = Vec::new();
        while let Some(ev) = sock.poll_event() {
            out.push(ev);
        }
        out
    }

    #[test]
    fn handshake_reaches_established_on_both_sides() {
        let now = Instant::now();
        let mut a = PseudoTcpSocket::new(1);
        let mut b = PseudoTcpSocket::new(1);

        a.connect(now).unwrap();
        pump(&mut a, &mut b, now);
        pump(&mut b, &mut a, now);
        pump(&mut a, &mut b, now);

        assert_eq!(a.state(), State::Established);
        assert_eq!(b.state(), State::Established);
        assert!(drain_events(&mut a).contains(&Event::Opened));
        assert!(drain_events(&mut b).contains(&Event::Opened));
    }

    #[test]
    fn data_written_on_one_side_is_read_on_the_other() {
        let now = Instant::now();
        let mut a = PseudoTcpSocket::new(7);
        let mut b = PseudoTcpSocket::new(7);

        a.connect(now).unwrap();
        pump(&mut a, &mut b, now);
        pump(&mut b, &mut a, now);
        pump(&mut a, &mut b, now);

        a.send(b"hello pseudo-tcp", now).unwrap();
        pump(&mut a, &mut b, now);
        pump(&mut b, &mut a, now);

        let mut buf = [0u8; 64];
        let n = b.recv(&mut buf);
        assert_eq!(&buf[..n], b"hello pseudo-tcp");
    }

    #[test]
    fn graceful_close_walks_fin_wait_to_closed_on_the_active_side() {
        let now = Instant::now();
        let mut a = PseudoTcpSocket::new(3);
        let mut b = PseudoTcpSocket::new(3);

        a.connect(now).unwrap();
        pump(&mut a, &mut b, now);
        pump(&mut b, &mut a, now);
        pump(&mut a, &mut b, now);

        a.close(true, now);
        assert_eq!(a.state(), State::FinWait1);
        pump(&mut a, &mut b, now);
        assert_eq!(b.state(), State::CloseWait);
        pump(&mut b, &mut a, now);
        assert_eq!(a.state(), State::FinWait2);

        b.close(true, now);
        assert_eq!(b.state(), State::LastAck);
        pump(&mut b, &mut a, now);
        assert_eq!(a.state(), State::TimeWait);
        pump(&mut a, &mut b, now);
        assert_eq!(b.state(), State::Closed);
    }

    #[test]
    fn send_before_established_is_rejected() {
        let now = Instant::now();
        let mut a = PseudoTcpSocket::new(9);
        assert_eq!(a.send(b"too soon", now), Err(Error::ErrNotConnected));
    }

    #[test]
    fn get_next_clock_is_none_for_an_idle_listening_socket() {
        let now = Instant::now();
        let a = PseudoTcpSocket::new(2);
        assert_eq!(a.get_next_clock(now), None);
    }
}
