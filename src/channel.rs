//! `Channel<T>`: the bidirectional request/reply channel itself. Owns both
//! endpoints, the two bulk lanes, and the open/close protocol. See
//! SPEC_FULL.md §4.2–§4.9.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use log::{debug, trace, warn};

use crate::config::Config;
use crate::control::Control;
use crate::endpoint::{ema_update, Endpoint, EndpointSnapshot};
use crate::error::ChannelError;
use crate::event::{translate, Event};
use crate::message::{ControlRecord, ControlSignal, Message, Role};
use crate::queue::BoundedQueue;

/// The outcome of a send operation. Overload is an expected, frequent
/// outcome (§7) — not an `Err` — matching the teacher's `enqueue`/`send`
/// returning `Option<Box<T>>` rather than a `Result`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendStatus {
    Sent,
    /// The bulk lane was full; the message was not queued.
    Overload,
}

/// A bidirectional request/reply channel between one master thread and one
/// worker thread.
///
/// Shared via `Arc` between the two threads. Every method is documented as
/// master-thread-only or worker-thread-only; calling a method from the wrong
/// thread violates the single-writer discipline in SPEC_FULL.md §5 and is a
/// caller bug, not a condition the channel detects at runtime (consistent
/// with §7: protocol violations are a debug-only assertion, not a recoverable
/// error).
pub struct Channel<T> {
    id: u64,
    config: Config,
    master: UnsafeCell<Endpoint>,
    worker: UnsafeCell<Endpoint>,
    to_worker: BoundedQueue<Message<T>>,
    from_worker: BoundedQueue<Message<T>>,
    /// The master thread's own control lane; the worker signals into this.
    master_inbox: Arc<Control>,
    /// The worker thread's own control lane; the master signals into this.
    worker_inbox: Arc<Control>,
    active: AtomicBool,
    opened: AtomicBool,
    worker_ready: AtomicBool,
    cpu_time: AtomicU64,
    processing_time: AtomicU64,
}

unsafe impl<T: Send> Send for Channel<T> {}
unsafe impl<T: Send> Sync for Channel<T> {}

impl<T: Send> Channel<T> {
    /// Creates a new, unopened channel. `master_inbox`/`worker_inbox` are the
    /// thread-global control lanes of the two threads that will own this
    /// channel's endpoints — typically shared across every channel that
    /// thread participates in, not allocated one-per-channel.
    pub fn new(
        id: u64,
        config: Config,
        master_inbox: Arc<Control>,
        worker_inbox: Arc<Control>,
    ) -> Arc<Channel<T>> {
        Arc::new(Channel {
            id,
            config,
            master: UnsafeCell::new(Endpoint::new(Role::ToWorker)),
            worker: UnsafeCell::new(Endpoint::new(Role::FromWorker)),
            to_worker: BoundedQueue::with_capacity(config.queue_capacity),
            from_worker: BoundedQueue::with_capacity(config.queue_capacity),
            master_inbox,
            worker_inbox,
            active: AtomicBool::new(true),
            opened: AtomicBool::new(false),
            worker_ready: AtomicBool::new(false),
            cpu_time: AtomicU64::new(0),
            processing_time: AtomicU64::new(0),
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub fn is_worker_ready(&self) -> bool {
        self.worker_ready.load(Ordering::Acquire)
    }

    pub fn cpu_time(&self) -> u64 {
        self.cpu_time.load(Ordering::Relaxed)
    }

    pub fn processing_time(&self) -> u64 {
        self.processing_time.load(Ordering::Relaxed)
    }

    pub fn master_snapshot(&self) -> EndpointSnapshot {
        EndpointSnapshot::from(unsafe { self.master_ref() })
    }

    pub fn worker_snapshot(&self) -> EndpointSnapshot {
        EndpointSnapshot::from(unsafe { self.worker_ref() })
    }

    // SAFETY: caller must be the thread that owns the master endpoint (the
    // master thread); see the single-writer discipline in SPEC_FULL.md §5.
    #[allow(clippy::mut_from_ref)]
    unsafe fn master_mut(&self) -> &mut Endpoint {
        &mut *self.master.get()
    }

    unsafe fn master_ref(&self) -> &Endpoint {
        &*self.master.get()
    }

    // SAFETY: caller must be the worker thread.
    #[allow(clippy::mut_from_ref)]
    unsafe fn worker_mut(&self) -> &mut Endpoint {
        &mut *self.worker.get()
    }

    unsafe fn worker_ref(&self) -> &Endpoint {
        &*self.worker.get()
    }

    // ---- Open/close protocol (§4.9) ----------------------------------

    /// Master-thread-only. Sends the initial `OPEN` record to the worker.
    /// Attempting this twice on the same channel is a caller bug (§4.9); in
    /// debug builds it's an assertion failure, in release it's a silent
    /// no-op (§7: protocol violations are undefined in release, not
    /// recoverable).
    pub fn open(&self) -> Result<(), ChannelError> {
        if self.opened.swap(true, Ordering::AcqRel) {
            debug_assert!(false, "channel {} OPENed twice", self.id);
            return Ok(());
        }
        debug!("channel {}: sending OPEN", self.id);
        self.worker_inbox
            .signal(ControlRecord {
                signal: ControlSignal::Open,
                ack: 0,
                channel_id: self.id,
            })
            .map_err(ChannelError::from)
    }

    /// Worker-thread-only. Marks the channel ready for `recv_request`/
    /// `send_reply` once `service_worker_control` has observed `OPEN`.
    fn mark_worker_ready(&self) {
        self.worker_ready.store(true, Ordering::Release);
        debug!("channel {}: worker accepted OPEN", self.id);
    }

    /// Master-thread-only. Begins the close handshake: marks the channel
    /// inactive and tells the worker. The worker is expected to finish
    /// in-flight work, then call [`Channel::worker_ack_close`].
    pub fn signal_worker_close(&self) -> Result<(), ChannelError> {
        self.active.store(false, Ordering::Release);
        let ack = unsafe { self.master_ref() }.ack();
        debug!("channel {}: master closing", self.id);
        self.worker_inbox
            .signal(ControlRecord {
                signal: ControlSignal::Close(Role::ToWorker),
                ack,
                channel_id: self.id,
            })
            .map_err(ChannelError::from)
    }

    /// Worker-thread-only. Mirrors the close back to the master once the
    /// worker has processed whatever was in flight.
    pub fn worker_ack_close(&self) -> Result<(), ChannelError> {
        self.active.store(false, Ordering::Release);
        let ack = unsafe { self.worker_ref() }.ack();
        debug!("channel {}: worker acked close", self.id);
        self.master_inbox
            .signal(ControlRecord {
                signal: ControlSignal::Close(Role::FromWorker),
                ack,
                channel_id: self.id,
            })
            .map_err(ChannelError::from)
    }

    // ---- Master-side operations (§4.2, §4.3) -------------------------

    /// Master-thread-only. See SPEC_FULL.md §4.2.
    pub fn send_request(&self, mut msg: Message<T>) -> (SendStatus, Option<Message<T>>) {
        debug_assert!(self.is_active(), "send_request on inactive channel");
        {
            let master = unsafe { self.master_ref() };
            msg.sequence = master.sequence + 1;
            msg.ack = master.ack();
        }
        let when = msg.when;

        if let Err(_rejected) = self.to_worker.push(msg) {
            warn!("channel {}: to_worker queue full, overload", self.id);
            let reply = self.recv_reply();
            return (SendStatus::Overload, reply);
        }

        // Scoped tightly: must not overlap with `recv_reply`'s own borrow of
        // `master` below, since both go through the same `UnsafeCell`.
        let (first_send, outstanding) = {
            let master = unsafe { self.master_mut() };
            master.sequence += 1;
            master.record_send(when, self.config.ialpha);
            master.num_outstanding += 1;
            trace!(
                "channel {}: sent request seq={} outstanding={}",
                self.id,
                master.sequence,
                master.num_outstanding
            );
            (master.num_outstanding == 1, master.num_outstanding)
        };

        let drained = if outstanding > 1 {
            self.recv_reply()
        } else {
            None
        };

        if self.should_signal_worker(first_send, when) {
            self.signal_worker(when);
        }
        (SendStatus::Sent, drained)
    }

    /// Master-thread-only. See SPEC_FULL.md §4.3.
    pub fn recv_reply(&self) -> Option<Message<T>> {
        let master = unsafe { self.master_mut() };
        let msg = self.from_worker.pop()?;
        debug_assert!(msg.sequence > master.ack(), "reply sequence must advance");
        debug_assert!(msg.sequence <= master.sequence, "reply cannot outrun requests");
        debug_assert_eq!(
            msg.sequence,
            master.ack() + 1,
            "reply sequence must be previous_ack + 1"
        );

        self.processing_time.store(
            ema_update(
                self.processing_time.load(Ordering::Relaxed),
                msg.processing_time,
                self.config.ialpha,
            ),
            Ordering::Relaxed,
        );
        self.cpu_time.store(msg.cpu_time, Ordering::Relaxed);

        master.num_outstanding = master.num_outstanding.saturating_sub(1);
        master.set_ack(msg.sequence);
        master.peer_ack = msg.ack;
        debug_assert!(msg.when >= master.last_read_other, "reply timestamps must be monotonic");
        master.last_read_other = msg.when;
        trace!(
            "channel {}: received reply seq={} outstanding={}",
            self.id,
            msg.sequence,
            master.num_outstanding
        );
        Some(msg)
    }

    fn should_signal_worker(&self, first_send: bool, now: u64) -> bool {
        let master = unsafe { self.master_ref() };
        if first_send {
            return true;
        }
        let lag = master.sequence.saturating_sub(master.peer_ack);
        if lag > self.config.lag_threshold {
            return true;
        }
        #[cfg(feature = "coalescing-wakeups")]
        if master.sequence_at_last_signal > master.peer_ack {
            return false;
        }
        let recently_heard = now.saturating_sub(master.last_read_other) < self.config.signal_interval;
        let recently_signalled =
            now.saturating_sub(master.last_sent_signal) < self.config.signal_interval;
        !(recently_heard || recently_signalled)
    }

    fn signal_worker(&self, now: u64) {
        let master = unsafe { self.master_mut() };
        master.last_sent_signal = now;
        master.num_signals += 1;
        master.sequence_at_last_signal = master.sequence;
        let ack = master.ack();
        if let Err(e) = self.worker_inbox.signal(ControlRecord {
            signal: ControlSignal::DataToWorker,
            ack,
            channel_id: self.id,
        }) {
            warn!("channel {}: failed to signal worker: {}", self.id, e);
        } else {
            debug!("channel {}: signalled worker (seq={})", self.id, master.sequence);
        }
    }

    // ---- Worker-side operations (§4.4, §4.5, §4.7) -------------------

    /// Worker-thread-only. See SPEC_FULL.md §4.4.
    pub fn recv_request(&self) -> Option<Message<T>> {
        debug_assert!(
            self.is_worker_ready(),
            "recv_request before worker accepted OPEN"
        );
        let worker = unsafe { self.worker_mut() };
        let msg = self.to_worker.pop()?;
        debug_assert!(msg.sequence > worker.ack(), "request sequence must advance");
        debug_assert!(
            msg.sequence >= worker.sequence,
            "worker must not have replied to more than it has seen"
        );
        worker.num_outstanding += 1;
        worker.set_ack(msg.sequence);
        worker.peer_ack = msg.ack;
        debug_assert!(
            msg.when >= worker.last_read_other,
            "request timestamps must be monotonic"
        );
        worker.last_read_other = msg.when;
        trace!(
            "channel {}: received request seq={} outstanding={}",
            self.id,
            msg.sequence,
            worker.num_outstanding
        );
        Some(msg)
    }

    /// Worker-thread-only. See SPEC_FULL.md §4.5.
    pub fn send_reply(&self, mut msg: Message<T>) -> (SendStatus, Option<Message<T>>) {
        debug_assert!(self.is_active(), "send_reply on inactive channel");
        debug_assert!(
            self.is_worker_ready(),
            "send_reply before worker accepted OPEN"
        );
        {
            let worker = unsafe { self.worker_ref() };
            msg.sequence = worker.sequence + 1;
            msg.ack = worker.ack();
        }
        let when = msg.when;

        if let Err(_rejected) = self.from_worker.push(msg) {
            warn!("channel {}: from_worker queue full, overload", self.id);
            let req = self.recv_request();
            return (SendStatus::Overload, req);
        }

        // Scoped tightly: must not overlap with `recv_request`'s own borrow
        // of `worker` below, since both go through the same `UnsafeCell`.
        {
            let worker = unsafe { self.worker_mut() };
            worker.sequence += 1;
            worker.record_send(when, self.config.ialpha);
            worker.num_outstanding = worker.num_outstanding.saturating_sub(1);
            trace!(
                "channel {}: sent reply seq={} outstanding={}",
                self.id,
                worker.sequence,
                worker.num_outstanding
            );
        }

        let drained = self.recv_request();

        if self.should_signal_master(when) {
            self.signal_master(when);
        }
        (SendStatus::Sent, drained)
    }

    fn should_signal_master(&self, now: u64) -> bool {
        let worker = unsafe { self.worker_ref() };
        if worker.num_outstanding == 0 {
            return true;
        }
        // NOTE (SPEC_FULL.md §9): preserved verbatim from the source this
        // design was distilled from — the lag threshold here is computed
        // against the *master's* ack, not `worker.peer_ack` as the general
        // rule in §4.6 would suggest. Flagged for review, not "fixed".
        let master_ack = unsafe { self.master_ref() }.ack();
        let lag = worker.sequence.saturating_sub(master_ack);
        if lag > self.config.lag_threshold {
            return true;
        }
        #[cfg(feature = "coalescing-wakeups")]
        if worker.sequence_at_last_signal > worker.peer_ack {
            return false;
        }
        let recently_heard = now.saturating_sub(worker.last_read_other) < self.config.signal_interval;
        let recently_signalled =
            now.saturating_sub(worker.last_sent_signal) < self.config.signal_interval;
        !(recently_heard || recently_signalled)
    }

    fn signal_master(&self, now: u64) {
        let worker = unsafe { self.worker_mut() };
        worker.last_sent_signal = now;
        worker.num_signals += 1;
        worker.sequence_at_last_signal = worker.sequence;
        let ack = worker.ack();
        if let Err(e) = self.master_inbox.signal(ControlRecord {
            signal: ControlSignal::DataFromWorker,
            ack,
            channel_id: self.id,
        }) {
            warn!("channel {}: failed to signal master: {}", self.id, e);
        } else {
            debug!("channel {}: signalled master (seq={})", self.id, worker.sequence);
        }
    }

    /// Worker-thread-only. See SPEC_FULL.md §4.7. Called from the worker's
    /// idle loop just before it blocks.
    pub fn worker_sleeping(&self) -> Result<(), ChannelError> {
        let worker = unsafe { self.worker_ref() };
        if worker.num_outstanding == 0 {
            trace!("channel {}: worker idle with no work, not signalling", self.id);
            return Ok(());
        }
        let ack = worker.ack();
        self.master_inbox
            .signal(ControlRecord {
                signal: ControlSignal::WorkerSleeping,
                ack,
                channel_id: self.id,
            })
            .map_err(ChannelError::from)
    }

    // ---- Control-lane service (§4.8) ----------------------------------

    /// Master-thread-only. Drains one record from the master's own control
    /// lane and translates it into a host-facing event, applying the §4.8
    /// re-signal side effect for `DATA_DONE_WORKER`/`WORKER_SLEEPING`.
    pub fn service_master_control(&self) -> Event {
        match self.master_inbox.drain_one() {
            None => Event::Empty,
            Some(rec) => {
                unsafe { self.master_mut() }.num_kevents += 1;
                let event = translate(rec.signal);
                if matches!(
                    rec.signal,
                    ControlSignal::DataDoneWorker | ControlSignal::WorkerSleeping
                ) {
                    self.maybe_resignal_worker(rec.ack);
                }
                event
            }
        }
    }

    fn maybe_resignal_worker(&self, worker_ack: u64) {
        let master = unsafe { self.master_mut() };
        if worker_ack < master.sequence {
            master.num_resignals += 1;
            let ack = master.ack();
            match self.worker_inbox.signal(ControlRecord {
                signal: ControlSignal::DataToWorker,
                ack,
                channel_id: self.id,
            }) {
                Ok(()) => debug!(
                    "channel {}: re-signalled worker (ack {} < seq {})",
                    self.id, worker_ack, master.sequence
                ),
                Err(e) => warn!("channel {}: failed to re-signal worker: {}", self.id, e),
            }
        }
    }

    /// Worker-thread-only. Drains one record from the worker's own control
    /// lane. On `OPEN`, installs the worker's readiness so `recv_request`/
    /// `send_reply` are considered part of the live protocol (§3 Lifecycle).
    pub fn service_worker_control(&self) -> Event {
        match self.worker_inbox.drain_one() {
            None => Event::Empty,
            Some(rec) => {
                unsafe { self.worker_mut() }.num_kevents += 1;
                if matches!(rec.signal, ControlSignal::Open) {
                    self.mark_worker_ready();
                }
                translate(rec.signal)
            }
        }
    }
}
