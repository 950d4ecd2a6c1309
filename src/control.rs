//! The control lane: a bounded queue of [`ControlRecord`]s plus the
//! `eventfd`-backed wakeup primitive that coalesces repeated signals into a
//! single pending wake. See SPEC_FULL.md §4.11/§6.
//!
//! This generalizes the teacher's `Sender`/`Receiver` eventfd handling (wake
//! *all* sleeping workers with one `write()`) down to "wake one peer,
//! coalescing repeat signals," which is exactly what `EFD_SEMAPHORE` mode
//! gives you: each `write()` adds to the eventfd's counter, and each
//! `read()` (in semaphore mode) consumes exactly one unit, so n signals sent
//! while the reader is busy are n pending wakeups rather than n syscalls the
//! reader must each separately wait on.

use byteorder::{NativeEndian, WriteBytesExt};
use nix::errno::Errno;
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use nix::sys::eventfd::{EfdFlags, EventFd};
use nix::unistd::{read, write};
use std::os::fd::{AsFd, AsRawFd};

use crate::message::ControlRecord;
use crate::queue::BoundedQueue;

/// One thread's control lane: the bounded record queue every channel whose
/// "read" side lives on this thread shares, plus the eventfd that wakes this
/// thread when a record is waiting. The control lane is single-consumer
/// (this thread drains it) but may be multi-producer (§5): any number of
/// peer threads may call [`Control::signal`].
pub struct Control {
    records: BoundedQueue<ControlRecord>,
    eventfd: EventFd,
}

impl Control {
    /// Creates a fresh control lane with room for `capacity` pending
    /// records (rounded up to a power of two).
    pub fn new(capacity: usize) -> Result<Control, Errno> {
        let eventfd = EventFd::from_value_and_flags(0, EfdFlags::EFD_SEMAPHORE)?;
        Ok(Control {
            records: BoundedQueue::with_capacity(capacity),
            eventfd,
        })
    }

    /// Enqueues `record` and triggers one unit of wakeup. Safe to call from
    /// any thread. Does not block.
    pub fn signal(&self, record: ControlRecord) -> Result<(), Errno> {
        self.records
            .push(record)
            .map_err(|_| Errno::ENOBUFS)?;
        let mut buf = [0u8; 8];
        (&mut buf[..]).write_u64::<NativeEndian>(1).unwrap();
        write(&self.eventfd, &buf)?;
        Ok(())
    }

    /// Pops one pending record without blocking, or `None` if the queue is
    /// currently empty.
    pub fn drain_one(&self) -> Option<ControlRecord> {
        self.records.pop()
    }

    /// Blocks the calling thread (this thread must be the lane's consumer)
    /// until at least one signal has arrived, or `timeout_ms` elapses.
    /// `None` means wait indefinitely. Consumes exactly one unit of the
    /// eventfd's counter per genuine wakeup, matching `EFD_SEMAPHORE`
    /// coalescing semantics: concurrent signallers never lose a wakeup to
    /// this thread being busy.
    pub fn wait(&self, timeout_ms: Option<u16>) -> Result<(), Errno> {
        let mut fds = [PollFd::new(self.eventfd.as_fd(), PollFlags::POLLIN)];
        let timeout = match timeout_ms {
            Some(ms) => PollTimeout::from(ms),
            None => PollTimeout::NONE,
        };
        poll(&mut fds, timeout)?;
        let mut buf = [0u8; 8];
        match read(self.eventfd.as_raw_fd(), &mut buf) {
            Ok(_) => Ok(()),
            Err(Errno::EAGAIN) => Ok(()), // spurious: someone else drained it first
            Err(e) => Err(e),
        }
    }
}
