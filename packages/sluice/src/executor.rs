//! Executors, the oneway half of the protocol.

use crate::{
    callback::{Invocable, RoutedCallback, ReceiverCallback},
    fatal::{FatalHandler, Abort, SharedFatalHandler, run_unobserved},
    receiver::Receiver,
    sender::{Sender, SenderTo, OperationState},
};
use std::{
    fmt::{self, Debug, Formatter},
    pin::Pin,
    sync::Arc,
    thread,
};


/// Execution context handle which runs [`Invocable`]s, fire-and-forget
///
/// Every executor is also a [`Sender`] of itself and a [`Scheduler`](crate::Scheduler) whose
/// `schedule()` is itself: connecting it to a receiver and starting the operation completes the
/// receiver with the executor, from an execution agent of that executor.
pub trait Executor: Clone + Send + Sync + 'static {
    /// Hand work to the execution context.
    ///
    /// Errors if the context refused the work, in which case the work has been dropped without
    /// being invoked. Whether a failure of the work itself reaches the caller depends on the
    /// executor: inline execution returns it, other executors escalate it through their fatal
    /// handler. To have failures routed somewhere else, execute a
    /// [`RoutedCallback`](crate::RoutedCallback).
    fn execute<F>(&self, work: F) -> anyhow::Result<()>
    where
        F: Invocable + Send + 'static;

    /// Call `op(i, &state)` for every `i` in `0..n` and then `continuation(state)`, where `state`
    /// is built by `state_factory`.
    ///
    /// The continuation observes the state only after all `n` calls have completed. The provided
    /// implementation does all of this within a single execution agent, calling `op` with
    /// ascending indices. Executors with a native way to fan work out override it.
    fn bulk_execute<St, Op, SF, C>(
        &self,
        op: Op,
        n: usize,
        state_factory: SF,
        continuation: C,
    ) -> anyhow::Result<()>
    where
        St: Send + Sync + 'static,
        Op: Fn(usize, &St) + Send + Sync + 'static,
        SF: FnOnce() -> St + Send + 'static,
        C: FnOnce(St) + Send + 'static,
    {
        self.execute(move || {
            let state = state_factory();
            for i in 0..n {
                op(i, &state);
            }
            continuation(state);
            anyhow::Ok(())
        })
    }
}

/// Hand work to an executor.
pub fn execute<E, F>(executor: &E, work: F) -> anyhow::Result<()>
where
    E: Executor,
    F: Invocable + Send + 'static,
{
    executor.execute(work)
}

/// Fan work out over an executor. See [`Executor::bulk_execute`].
pub fn bulk_execute<E, St, Op, SF, C>(
    executor: &E,
    op: Op,
    n: usize,
    state_factory: SF,
    continuation: C,
) -> anyhow::Result<()>
where
    E: Executor,
    St: Send + Sync + 'static,
    Op: Fn(usize, &St) + Send + Sync + 'static,
    SF: FnOnce() -> St + Send + 'static,
    C: FnOnce(St) + Send + 'static,
{
    executor.bulk_execute(op, n, state_factory, continuation)
}


// ==== executors as senders ====


impl<E: Executor> Sender for E {
    type Output = E;
}

impl<E, R> SenderTo<R> for E
where
    E: Executor,
    R: Receiver<E> + Send + 'static,
{
    type Operation = ExecuteOperation<E, E, R>;

    fn connect(self, receiver: R) -> anyhow::Result<Self::Operation> {
        Ok(ExecuteOperation::new(self.clone(), self, receiver))
    }
}

/// Operation state which completes its receiver with a value from an execution agent of an
/// executor
///
/// If the executor refuses the work, the receiver is signalled done.
pub struct ExecuteOperation<E, V, R> {
    executor: E,
    inner: Option<(V, R)>,
}

impl<E, V, R> ExecuteOperation<E, V, R> {
    pub(crate) fn new(executor: E, value: V, receiver: R) -> Self {
        ExecuteOperation { executor, inner: Some((value, receiver)) }
    }
}

// nothing is structurally pinned.
impl<E, V, R> Unpin for ExecuteOperation<E, V, R> {}

impl<E, V, R> OperationState for ExecuteOperation<E, V, R>
where
    E: Executor,
    V: Send + 'static,
    R: Receiver<V> + Send + 'static,
{
    fn start(self: Pin<&mut Self>) {
        let this = self.get_mut();
        let (value, receiver) = this.inner.take()
            .expect("operation state started more than once");
        // on refusal, dropping the routed callback signals done.
        let work = RoutedCallback::new(ReceiverCallback::new(receiver, value));
        if let Err(e) = this.executor.execute(work) {
            trace!(error = %e, "executor refused scheduled operation");
        }
    }
}


// ==== inline executor ====


/// Executor which runs work immediately on the calling thread
///
/// Failures of the work are returned from `execute`.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Hash)]
pub struct InlineExecutor;

impl Executor for InlineExecutor {
    fn execute<F>(&self, work: F) -> anyhow::Result<()>
    where
        F: Invocable + Send + 'static,
    {
        work.invoke()
    }
}


// ==== new thread executor ====


/// Executor which spawns a new, detached OS thread for every piece of work
///
/// Failures of plain invocables have no caller to go to, so they are escalated through the fatal
/// handler, which by default aborts the process.
#[derive(Clone)]
pub struct NewThreadExecutor {
    fatal_handler: SharedFatalHandler,
}

impl NewThreadExecutor {
    /// Construct with the default, aborting, fatal handler.
    pub fn new() -> Self {
        Self::with_fatal_handler(Abort)
    }

    /// Construct with a custom fatal handler.
    pub fn with_fatal_handler<H>(handler: H) -> Self
    where
        H: FatalHandler + Send + Sync + 'static,
    {
        NewThreadExecutor { fatal_handler: Arc::new(handler) }
    }
}

impl Default for NewThreadExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl Debug for NewThreadExecutor {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.write_str("NewThreadExecutor")
    }
}

impl Executor for NewThreadExecutor {
    fn execute<F>(&self, work: F) -> anyhow::Result<()>
    where
        F: Invocable + Send + 'static,
    {
        let handler = Arc::clone(&self.fatal_handler);
        thread::Builder::new()
            .name("sluice-new-thread".to_owned())
            .spawn(move || run_unobserved(move || work.invoke(), &*handler))?;
        Ok(())
    }
}
