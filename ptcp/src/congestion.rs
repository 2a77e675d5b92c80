/// Congestion window state: slow start / congestion avoidance plus fast
/// retransmit, driven externally by the socket on each incoming ack.
///
/// `recover` is the send-sequence snapshot taken when fast-retransmit is
/// entered; an ack for a sequence `>= recover` is what ends the recovery
/// episode (RFC 5681 NewReno-style fast recovery).
#[derive(Debug, Clone)]
pub struct CongestionControl {
    pub cwnd: u32,
    pub ssthresh: u32,
    mss: u32,
    dup_acks: u32,
    recover: u32,
    in_recovery: bool,
}

impl CongestionControl {
    pub fn new(mss: u32) -> Self {
        CongestionControl {
            cwnd: mss,
            ssthresh: u32::MAX,
            mss,
            dup_acks: 0,
            recover: 0,
            in_recovery: false,
        }
    }

    /// A fresh (non-duplicate) ack advancing `rcv_nxt`/`snd_una`. Grows the
    /// window by slow start below `ssthresh`, by one segment per RTT
    /// (approximated as one MSS per ack) above it; exits recovery once the
    /// ack covers everything that was in flight when recovery began.
    pub fn on_new_ack(&mut self, acked_bytes: u32, snd_una: u32) {
        if self.in_recovery {
            if snd_una >= self.recover {
                self.in_recovery = false;
                self.dup_acks = 0;
                self.cwnd = self.ssthresh;
            }
            return;
        }
        if self.cwnd < self.ssthresh {
            self.cwnd = self.cwnd.saturating_add(acked_bytes);
        } else {
            self.cwnd = self
                .cwnd
                .saturating_add(self.mss * self.mss / self.cwnd.max(1));
        }
    }

    /// A duplicate ack. Returns `true` the moment the third duplicate fires
    /// fast retransmit.
    pub fn on_duplicate_ack(&mut self, in_flight: u32, snd_nxt: u32) -> bool {
        if self.in_recovery {
            self.cwnd = self.cwnd.saturating_add(self.mss);
            return false;
        }
        self.dup_acks += 1;
        if self.dup_acks == 3 {
            self.ssthresh = (in_flight / 2).max(2 * self.mss);
            self.cwnd = self.ssthresh + 3 * self.mss;
            self.recover = snd_nxt;
            self.in_recovery = true;
            return true;
        }
        false
    }

    /// Retransmission timeout: collapse the window per RFC 5681 §3.1.
    pub fn on_rto(&mut self, in_flight: u32) {
        self.ssthresh = (in_flight / 2).max(2 * self.mss);
        self.cwnd = self.mss;
        self.dup_acks = 0;
        self.in_recovery = false;
    }

    pub fn usable_window(&self, snd_wnd: u32) -> u32 {
        self.cwnd.min(snd_wnd)
    }
}
