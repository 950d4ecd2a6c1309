//! Error types. Overload is *not* represented here — it's threaded through
//! [`crate::channel::SendStatus`] instead, since it's an expected, frequent
//! outcome rather than an exceptional one. See SPEC_FULL.md §7.

use thiserror::Error;

/// Errors a channel operation can surface to its caller.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// The control lane rejected a record (it was full, or its backing
    /// eventfd write failed). Propagated verbatim; the channel does not
    /// retry internally.
    #[error("control lane send failed: {0}")]
    ControlSend(#[from] nix::errno::Errno),

    /// A control record carried a signal byte `service_control` didn't
    /// recognise. Surfaced as `Event::Error`, not a panic.
    ///
    /// Structurally unreachable today: `ControlSignal` (see `message.rs`) is
    /// a closed Rust enum and `translate` matches it exhaustively, so there's
    /// no invalid-byte path once a record is in memory. Kept because
    /// `ControlRecord` is the shape a future wire-format decoder would
    /// produce, and that decoder would need exactly this variant for bytes
    /// it can't map to a `ControlSignal`.
    #[error("unknown control signal: {0}")]
    UnknownSignal(u8),
}
