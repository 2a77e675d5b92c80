
use std::time::{Duration, Instant};

/// Outcome of advancing a [`RetransmissionTimer`] past its current deadline.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum RetransmissionOutcome {
    /// The deadline has not yet passed; nothing to do.
    Success,
    /// The deadline passed and retries remain; the delay has been doubled
    /// and a new deadline set. The caller must resend the buffered message.
    Retransmit,
    /// The deadline passed and no retries remain. The transaction is done.
    Timeout,
}

/// Exponential-backoff retransmission clock with a terminal timeout.
///
/// Mirrors the STUN usage timer of RFC 5389 Appendix B: each retransmission
/// doubles the previous delay, and after `max_retrans` retransmissions the
/// timer reports [`RetransmissionOutcome::Timeout`] instead of retransmitting
/// again. A caller drives the timer by calling [`RetransmissionTimer::refresh`]
/// whenever its clock fires.
#[derive(Debug, Clone)]
pub struct RetransmissionTimer {
    deadline: Instant,
    delay: Duration,
    count: u32,
    max_retrans: u32,
}

impl RetransmissionTimer {
    /// Initialises the timer with `delay = initial_delay` and
    /// `deadline = now + initial_delay`.
    pub fn start(initial_delay: Duration, max_retrans: u32) -> Self {
        RetransmissionTimer {
            deadline: Instant::now() + initial_delay,
            delay: initial_delay,
            count: 0,
            max_retrans,
        }
    }

    /// A variant used for transactions that must not be retransmitted (for
    /// example over a reliable transport): `max_retrans` is zero and the
    /// initial delay is the caller-supplied timeout. Expiry is reported
    /// immediately as [`RetransmissionOutcome::Timeout`], with no
    /// intermediate retransmit.
    pub fn start_reliable(timeout: Duration) -> Self {
        RetransmissionTimer {
            deadline: Instant::now() + timeout,
            delay: timeout,
            count: 0,
            max_retrans: 0,
        }
    }

    /// Advances the timer against the current time.
    pub fn refresh(&mut self) -> RetransmissionOutcome {
        let now = Instant::now();
        if now < self.deadline {
            return RetransmissionOutcome::Success;
        }

        if self.count >= self.max_retrans {
            return RetransmissionOutcome::Timeout;
        }

        self.count += 1;
        self.delay *= 2;
        self.deadline = now + self.delay;
        RetransmissionOutcome::Retransmit
    }

    /// Number of retransmissions sent so far.
    pub fn retransmit_count(&self) -> u32 {
        self.count
    }

    /// The deadline this timer is currently waiting on.
    pub fn deadline(&self) -> Instant {
        self.deadline
    }
}
