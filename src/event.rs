//! Host-facing events, and the pure part of the control-lane translation
//! table (§4.8). The re-signal side effect for `DataDoneWorker` /
//! `WorkerSleeping` lives on `Channel` itself (see `channel.rs`), since it
//! needs to mutate endpoint state and push onto the peer's control lane.

use crate::message::{ControlSignal, Role};

/// Events the control lane can surface to a host event loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// The control lane had nothing pending.
    Empty,
    /// An unrecognised or explicitly erroring control signal was popped.
    Error,
    /// Data is ready for the worker side to consume.
    DataReadyWorker,
    /// Data is ready for the master (receiver) side to consume.
    DataReadyReceiver,
    Open,
    Close(Role),
    /// Something happened, but it doesn't require the host to act.
    Noop,
}

/// The signal → event half of §4.8's table. Pure; no side effects.
pub fn translate(signal: ControlSignal) -> Event {
    match signal {
        ControlSignal::Error => Event::Error,
        ControlSignal::DataToWorker => Event::DataReadyWorker,
        ControlSignal::DataFromWorker => Event::DataReadyReceiver,
        ControlSignal::Open => Event::Open,
        ControlSignal::Close(role) => Event::Close(role),
        ControlSignal::DataDoneWorker => Event::DataReadyReceiver,
        ControlSignal::WorkerSleeping => Event::Noop,
    }
}
