//! Schedulers: handles to execution contexts which can produce senders.
//!
//! A scheduler's `schedule()` returns a sender whose value is again a scheduler, so code receiving
//! that value can keep scheduling. Whether something is a scheduler is decided by implementing the
//! trait, not by inspecting what `schedule()` returns, so checking it never recurses through the
//! chain of `Target` types and needs no bound on how many hops that chain may take.
//!
//! Every [`Executor`] is a scheduler whose `schedule()` is a clone of itself.

use crate::{
    executor::Executor,
    sender::Sender,
};


/// Execution context handle with a `schedule()` operation
pub trait Scheduler: Clone {
    /// Scheduler delivered by [`Self::ScheduleSender`]. Often `Self`.
    type Target: Scheduler;

    /// Sender produced by `schedule()`.
    type ScheduleSender: Sender<Output = Self::Target>;

    /// Produce a sender which, once connected and started, completes from an execution agent of
    /// this context.
    fn schedule(&self) -> Self::ScheduleSender;
}

impl<E: Executor> Scheduler for E {
    type Target = E;
    type ScheduleSender = E;

    fn schedule(&self) -> E {
        self.clone()
    }
}

/// Schedule onto a scheduler.
pub fn schedule<S: Scheduler>(scheduler: &S) -> S::ScheduleSender {
    scheduler.schedule()
}
