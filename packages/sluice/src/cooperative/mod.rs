//! Single-threaded cooperative execution context.
//!
//! Scheduling onto a [`CooperativeContext`] runs nothing. Starting a schedule operation only links
//! a continuation into the context's list of pending continuations, and the continuations run when
//! the owner of the context calls [`drain`](CooperativeContext::drain). The most recently scheduled
//! continuation runs first.

mod slab;

use self::slab::Slab;
use crate::{
    callback::{Invocable, RoutedCallback, ReceiverCallback},
    receiver::Receiver,
    scheduler::Scheduler,
    sender::{Sender, SenderTo, OperationState},
};
use std::{
    cell::RefCell,
    fmt::{self, Debug, Formatter},
    pin::Pin,
    rc::{Rc, Weak},
};


// suspended continuation.
type Resume = Box<dyn FnOnce()>;

/// Execution context which runs scheduled work on whichever thread drains it, most recent first
///
/// Dropping the context drops its pending continuations, which signals their receivers done.
pub struct CooperativeContext {
    pending: Rc<RefCell<Slab<Resume>>>,
}

impl CooperativeContext {
    /// Construct with nothing pending.
    pub fn new() -> Self {
        CooperativeContext { pending: Rc::new(RefCell::new(Slab::new())) }
    }

    /// Get a scheduler for the context.
    pub fn scheduler(&self) -> CooperativeScheduler {
        CooperativeScheduler { pending: Rc::downgrade(&self.pending) }
    }

    /// Number of pending continuations.
    pub fn len(&self) -> usize {
        self.pending.borrow().len()
    }

    /// Whether no continuations are pending.
    pub fn is_empty(&self) -> bool {
        self.pending.borrow().is_empty()
    }

    /// Resume pending continuations, most recently scheduled first, until none are left
    ///
    /// Continuations scheduled by continuations resumed here are resumed too, before older ones.
    /// Returns the number of continuations resumed.
    pub fn drain(&self) -> usize {
        let mut resumed = 0;
        loop {
            // the borrow must end before resuming, which may schedule more work
            let next = self.pending.borrow_mut().pop_front();
            let Some(resume) = next else { break };
            resume();
            resumed += 1;
        }
        trace!(resumed, "cooperative context drained");
        resumed
    }
}

impl Default for CooperativeContext {
    fn default() -> Self {
        Self::new()
    }
}

impl Debug for CooperativeContext {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.debug_struct("CooperativeContext")
            .field("pending", &self.len())
            .finish()
    }
}

/// [`Scheduler`] handle to a [`CooperativeContext`]
///
/// Scheduling onto a context which has been dropped completes with done. Handles compare equal if
/// they refer to the same context.
#[derive(Clone)]
pub struct CooperativeScheduler {
    pending: Weak<RefCell<Slab<Resume>>>,
}

impl PartialEq for CooperativeScheduler {
    fn eq(&self, other: &Self) -> bool {
        self.pending.ptr_eq(&other.pending)
    }
}

impl Eq for CooperativeScheduler {}

impl Debug for CooperativeScheduler {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.write_str("CooperativeScheduler")
    }
}

impl Scheduler for CooperativeScheduler {
    type Target = CooperativeScheduler;
    type ScheduleSender = ScheduleCooperative;

    fn schedule(&self) -> ScheduleCooperative {
        ScheduleCooperative { scheduler: self.clone() }
    }
}

/// Sender produced by [`CooperativeScheduler`]
#[derive(Debug, Clone)]
pub struct ScheduleCooperative {
    scheduler: CooperativeScheduler,
}

impl Sender for ScheduleCooperative {
    type Output = CooperativeScheduler;
}

impl<R> SenderTo<R> for ScheduleCooperative
where
    R: Receiver<CooperativeScheduler> + 'static,
{
    type Operation = CooperativeOperation<R>;

    fn connect(self, receiver: R) -> anyhow::Result<Self::Operation> {
        Ok(CooperativeOperation {
            scheduler: self.scheduler,
            receiver: Some(receiver),
        })
    }
}

/// Operation state for [`ScheduleCooperative`]
pub struct CooperativeOperation<R> {
    scheduler: CooperativeScheduler,
    receiver: Option<R>,
}

// nothing is structurally pinned.
impl<R> Unpin for CooperativeOperation<R> {}

impl<R> OperationState for CooperativeOperation<R>
where
    R: Receiver<CooperativeScheduler> + 'static,
{
    fn start(self: Pin<&mut Self>) {
        let this = self.get_mut();
        let receiver = this.receiver.take().expect("operation state started more than once");
        let Some(pending) = this.scheduler.pending.upgrade() else {
            trace!("cooperative context gone, signalling done");
            receiver.set_done();
            return;
        };
        let work = RoutedCallback::new(ReceiverCallback::new(receiver, this.scheduler.clone()));
        pending.borrow_mut().push_front(Box::new(move || {
            // routed callbacks deliver their own failures
            let _ = work.invoke();
        }));
    }
}
