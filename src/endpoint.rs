//! Per-side counters: sequence/ack bookkeeping, outstanding counts, and the
//! RTT/interval smoothing in SPEC_FULL.md §4.1.
//!
//! An `Endpoint` is exclusively mutated by the one thread that owns it
//! (master or worker); see `Channel`'s `UnsafeCell` wrapping in `channel.rs`
//! for how that discipline is enforced without a lock.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::message::Role;

/// Applies the fixed-point EMA from §4.1: `new = (old + (ialpha-1)*sample) / ialpha`.
pub fn ema_update(old: u64, sample: u64, ialpha: u64) -> u64 {
    (old + (ialpha - 1) * sample) / ialpha
}

/// One side of a channel.
///
/// `ack` is an atomic for one reason only: the §9 "possibly-buggy source
/// behavior" note requires the *other* thread to read it once, for the
/// worker's lag-threshold check in `send_reply`. Every other field here is
/// touched only by the thread that owns this endpoint.
#[derive(Debug)]
pub struct Endpoint {
    pub role: Role,
    /// Monotonic count of messages sent on this endpoint's outbound lane.
    pub sequence: u64,
    /// Highest sequence observed from the peer.
    pub ack: AtomicU64,
    /// Mirror of the peer endpoint's own `ack`, refreshed from message
    /// framing (`msg.ack`) or control-record `ack` fields rather than by
    /// reading the peer's memory directly (§5). This is what the signal
    /// elision heuristic (§4.6) calls `peer.ack`.
    pub peer_ack: u64,
    /// Sent-but-unanswered (master) / received-but-unreplied (worker).
    pub num_outstanding: u64,
    /// `sequence` the last time a data-ready signal was sent to the peer.
    pub sequence_at_last_signal: u64,
    /// Monotonic nanosecond timestamps.
    pub last_write: u64,
    pub last_read_other: u64,
    pub last_sent_signal: u64,
    /// Exponentially smoothed inter-message interval.
    pub message_interval: u64,
    pub num_signals: u64,
    pub num_resignals: u64,
    pub num_kevents: u64,
}

impl Endpoint {
    pub fn new(role: Role) -> Endpoint {
        Endpoint {
            role,
            sequence: 0,
            ack: AtomicU64::new(0),
            peer_ack: 0,
            num_outstanding: 0,
            sequence_at_last_signal: 0,
            last_write: 0,
            last_read_other: 0,
            last_sent_signal: 0,
            message_interval: 0,
            num_signals: 0,
            num_resignals: 0,
            num_kevents: 0,
        }
    }

    /// Records a successful send at time `when`, updating the smoothed
    /// interval (§4.1) and advancing `last_write` (§3 invariant 3: must never
    /// go backwards).
    pub fn record_send(&mut self, when: u64, ialpha: u64) {
        if self.last_write > 0 {
            let sample = when.saturating_sub(self.last_write);
            self.message_interval = ema_update(self.message_interval, sample, ialpha);
        }
        debug_assert!(when >= self.last_write, "send timestamps must be monotonic");
        self.last_write = when;
    }

    pub fn ack(&self) -> u64 {
        self.ack.load(Ordering::Relaxed)
    }

    pub fn set_ack(&self, value: u64) {
        self.ack.store(value, Ordering::Relaxed);
    }
}

/// A point-in-time copy of an endpoint's counters, for observability and
/// tests — taking this snapshot never requires `unsafe`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndpointSnapshot {
    pub sequence: u64,
    pub ack: u64,
    pub num_outstanding: u64,
    pub message_interval: u64,
    pub num_signals: u64,
    pub num_resignals: u64,
    pub num_kevents: u64,
}

impl From<&Endpoint> for EndpointSnapshot {
    fn from(e: &Endpoint) -> EndpointSnapshot {
        EndpointSnapshot {
            sequence: e.sequence,
            ack: e.ack(),
            num_outstanding: e.num_outstanding,
            message_interval: e.message_interval,
            num_signals: e.num_signals,
            num_resignals: e.num_resignals,
            num_kevents: e.num_kevents,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ema_converges_towards_steady_sample() {
        let mut interval = 0u64;
        for _ in 0..200 {
            interval = ema_update(interval, 1000, 8);
        }
        // Should settle very close to the steady-state sample.
        assert!(interval >= 990 && interval <= 1000, "interval = {interval}");
    }

    #[test]
    fn record_send_tracks_last_write_and_interval() {
        let mut e = Endpoint::new(Role::ToWorker);
        e.record_send(100, 8);
        assert_eq!(e.last_write, 100);
        assert_eq!(e.message_interval, 0); // first sample has no prior write
        e.record_send(300, 8);
        assert_eq!(e.last_write, 300);
        assert_eq!(e.message_interval, ema_update(0, 200, 8));
    }
}
