//! Tunables. See SPEC_FULL.md §6.

/// The four tunables this crate exposes. `Default` matches the values named
/// in the specification; most callers never need to construct this.
#[derive(Debug, Clone, Copy)]
pub struct Config {
    /// Minimum gap, in nanoseconds, below which a signal is elided unless a
    /// mandatory condition applies. Default 1,000,000 ns (1 ms).
    pub signal_interval: u64,
    /// Outstanding-ack lag above which a signal is always sent. Default 1000.
    pub lag_threshold: u64,
    /// Inverse alpha for the EMA smoothing in §4.1. Default 8.
    pub ialpha: u64,
    /// Bulk lane capacity, rounded up to a power of two. Default 1024.
    pub queue_capacity: usize,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            signal_interval: 1_000_000,
            lag_threshold: 1000,
            ialpha: 8,
            queue_capacity: 1024,
        }
    }
}
