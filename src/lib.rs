//! A low-overhead, bidirectional request/reply channel between a master
//! thread and a worker thread.
//!
//! Each side of a [`Channel`] pushes fixed-size message handles onto a
//! bounded, lock-free bulk lane and lets its peer know via a thread-local,
//! `eventfd`-backed control lane whose coalescing-wakeup semantics mean a
//! burst of sends never costs more than one wakeup syscall for however many
//! messages the peer was already busy processing.
//!
//! ```no_run
//! use corelink::{Channel, Config, Control, Message};
//! use std::sync::Arc;
//!
//! let master_inbox = Arc::new(Control::new(1024).unwrap());
//! let worker_inbox = Arc::new(Control::new(1024).unwrap());
//! let channel: Arc<Channel<u64>> = Channel::new(1, Config::default(), master_inbox, worker_inbox);
//! channel.open().unwrap();
//! ```
//!
//! See [`Channel`] for the full protocol: opening, sending, replying,
//! closing, and the signal-elision heuristic that decides when a wakeup can
//! be skipped.

pub mod channel;
pub mod config;
pub mod control;
pub mod endpoint;
pub mod error;
pub mod event;
pub mod message;
pub mod queue;

pub use channel::{Channel, SendStatus};
pub use config::Config;
pub use control::Control;
pub use endpoint::EndpointSnapshot;
pub use error::ChannelError;
pub use event::Event;
pub use message::{ControlRecord, ControlSignal, Message, Role};
pub use queue::BoundedQueue;
