//! The framing carried alongside every payload, and the control records sent
//! over the control lane. See SPEC_FULL.md §3.

/// Which side of a channel an endpoint is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    ToWorker,
    FromWorker,
}

/// A message handle passed through a bulk lane.
///
/// The channel only ever touches `sequence`, `ack`, `when`, `processing_time`,
/// and `cpu_time`; `payload` is opaque to it.
#[derive(Debug, Clone)]
pub struct Message<T> {
    pub payload: T,
    /// Set by the channel when the message is sent.
    pub sequence: u64,
    /// The sender's `ack` at the time of sending.
    pub ack: u64,
    /// Monotonic send timestamp, in nanoseconds since some fixed epoch.
    pub when: u64,
    /// Reply-only: time the worker spent processing this request's sibling,
    /// smoothed into the channel's `processing_time`.
    pub processing_time: u64,
    /// Reply-only: time the worker spent processing, overwritten (not
    /// smoothed) into the channel's `cpu_time`.
    pub cpu_time: u64,
}

impl<T> Message<T> {
    /// Wraps a fresh payload with zeroed framing; the channel fills in
    /// `sequence`/`ack` on send.
    pub fn new(payload: T, when: u64) -> Message<T> {
        Message {
            payload,
            sequence: 0,
            ack: 0,
            when,
            processing_time: 0,
            cpu_time: 0,
        }
    }
}

/// The control-lane signal kinds, see SPEC_FULL.md §4.8.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlSignal {
    Error,
    DataToWorker,
    DataFromWorker,
    Open,
    /// Carries the role of the side that issued the close.
    Close(Role),
    DataDoneWorker,
    WorkerSleeping,
}

/// A fixed-size record copied by value through the control lane.
#[derive(Debug, Clone, Copy)]
pub struct ControlRecord {
    pub signal: ControlSignal,
    pub ack: u64,
    /// Opaque channel identifier; never dereferenced from here (see
    /// DESIGN.md's "cyclic references" note). A host-side table maps this
    /// back to the `Arc<Channel<T>>` it names.
    pub channel_id: u64,
}
