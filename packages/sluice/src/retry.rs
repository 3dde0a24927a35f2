//! The retry combinator.
//!
//! A retry operation owns a slot holding one nested operation at a time. When the nested operation
//! fails, it is destroyed and a fresh one is connected into the same slot and started. Value and
//! done pass straight through to the outer receiver.
//!
//! The nested operation's failure may be delivered in two ways:
//!
//! - synchronously, from within the nested operation's `start`. the retry is then performed by the
//!   loop that called `start` once `start` returns, so that a sender which keeps failing inline
//!   retries in a loop rather than recursing.
//! - asynchronously, from some other execution agent after `start` has returned. the agent
//!   delivering the failure then performs the retry itself.
//!
//! `phase` tells the two apart. It is `STARTING` exactly while a nested `start` call is running.

use crate::{
    receiver::{Receiver, Completion},
    sender::{Sender, SenderTo, OperationState},
};
use std::{
    fmt::{self, Debug, Formatter},
    marker::PhantomData,
    pin::Pin,
    sync::{
        atomic::{
            AtomicU8,
            Ordering::{AcqRel, Acquire, Release},
        },
        Arc,
        Mutex,
        Weak,
    },
};


// possible values for RetryShared.phase

// no nested start is in progress.
const IDLE: u8 = 0;
// a nested start is in progress.
const STARTING: u8 = 1;
// a nested start is in progress, and the nested operation has already failed.
const RETRY_PENDING: u8 = 2;


/// Sender which re-runs another sender until it produces something other than an error. See
/// [`retry`] and [`retry_local`].
///
/// `P` is [`AnyThread`] or [`SameThread`], and decides which threads attempts may complete on.
pub struct Retry<S, P = AnyThread> {
    sender: S,
    _sharing: PhantomData<fn() -> P>,
}

impl<S: Clone, P> Clone for Retry<S, P> {
    fn clone(&self) -> Self {
        Retry { sender: self.sender.clone(), _sharing: PhantomData }
    }
}

impl<S: Debug, P> Debug for Retry<S, P> {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.debug_struct("Retry").field("sender", &self.sender).finish()
    }
}

/// Retry `sender` for as long as it fails
///
/// Every attempt connects a fresh copy of `sender` to a fresh receiver, so the sender must tolerate
/// being connected and started repeatedly. Errors of failed attempts are discarded. There is no
/// limit on the number of attempts. If connecting a fresh copy fails, that failure is delivered to
/// the outer receiver and retrying stops.
///
/// The first copy is connected eagerly when the retry sender itself is connected, and failure to
/// connect it is returned from that connect.
///
/// Attempts may complete on any thread, so the sender, its operation, and the outer receiver must
/// be `Send`. For senders which are not, see [`retry_local`].
pub fn retry<S: Sender + Clone>(sender: S) -> Retry<S> {
    Retry { sender, _sharing: PhantomData }
}

/// Like [`retry`], for senders which complete on the thread that started them
///
/// Nothing has to be `Send`, which makes this usable with a
/// [`CooperativeScheduler`](crate::CooperativeScheduler). The resulting receivers are not `Send`
/// either.
pub fn retry_local<S: Sender + Clone>(sender: S) -> Retry<S, SameThread> {
    Retry { sender, _sharing: PhantomData }
}

impl<S: Sender, P> Sender for Retry<S, P> {
    type Output = S::Output;
}

impl<S, R, P> SenderTo<R> for Retry<S, P>
where
    S: SenderTo<RetryReceiver<<S as Sender>::Output, P>> + Clone + 'static,
    S::Output: 'static,
    R: Receiver<S::Output> + 'static,
    P: Sharing<S::Output> + Erase<RetryShared<S, R, P>, S::Output>,
{
    type Operation = RetryOperation<S, R, P>;

    fn connect(self, receiver: R) -> anyhow::Result<Self::Operation> {
        let shared = Arc::new_cyclic(|this: &Weak<RetryShared<S, R, P>>| RetryShared {
            this: P::erase(this.clone()),
            receiver: Mutex::new(Some(receiver)),
            nested: Mutex::new(Nested {
                sender: self.sender,
                operation: None,
            }),
            phase: AtomicU8::new(IDLE),
        });
        {
            let mut nested = shared.nested.lock().unwrap();
            let operation = nested.sender.clone().connect(shared.receiver())?;
            nested.operation = Some(Box::pin(operation));
        }
        Ok(RetryOperation { shared, started: false })
    }
}

/// Operation state for [`Retry`]
pub struct RetryOperation<S, R, P>
where
    S: SenderTo<RetryReceiver<<S as Sender>::Output, P>>,
    P: Sharing<S::Output>,
{
    shared: Arc<RetryShared<S, R, P>>,
    started: bool,
}

impl<S, R, P> OperationState for RetryOperation<S, R, P>
where
    S: SenderTo<RetryReceiver<<S as Sender>::Output, P>> + Clone + 'static,
    S::Output: 'static,
    R: Receiver<S::Output> + 'static,
    P: Sharing<S::Output>,
{
    fn start(self: Pin<&mut Self>) {
        let this = self.get_mut();
        assert!(!this.started, "operation state started more than once");
        this.started = true;
        RetryShared::drive(&this.shared, false);
    }
}

// retry operation shared state. the nested operation's receiver holds a weak reference to it.
#[doc(hidden)]
pub struct RetryShared<S, R, P>
where
    S: SenderTo<RetryReceiver<<S as Sender>::Output, P>>,
    P: Sharing<S::Output>,
{
    // what receivers of attempts point to.
    this: Weak<P::Erased>,
    // taken when the outer receiver is completed.
    receiver: Mutex<Option<R>>,
    // locked for the whole of each connect-and-start attempt.
    nested: Mutex<Nested<S, P>>,
    // one of IDLE, STARTING, or RETRY_PENDING.
    phase: AtomicU8,
}

// the sender to copy for each attempt, and the slot for the current attempt's operation.
struct Nested<S, P>
where
    S: SenderTo<RetryReceiver<<S as Sender>::Output, P>>,
    P: Sharing<S::Output>,
{
    sender: S,
    operation: Option<Pin<Box<S::Operation>>>,
}

mod sealed {
    use super::{Completion, Arc, Weak};

    // the retry operation, as seen by the nested operation's receiver.
    pub trait Retrying<T> {
        // complete the outer receiver.
        fn complete(&self, completion: Completion<T>);

        // the nested operation failed.
        fn nested_failed(self: Arc<Self>, error: anyhow::Error);
    }

    // which type-erased form of the shared state receivers point to.
    pub trait Sharing<T>: 'static {
        type Erased: ?Sized + Retrying<T>;
    }

    // erasing a concrete shared state into the form chosen by the sharing marker.
    pub trait Erase<X, T>: Sharing<T> {
        fn erase(shared: Weak<X>) -> Weak<Self::Erased>;
    }
}

use self::sealed::{Retrying, Sharing, Erase};

/// Retry sharing for attempts which may complete on any thread. The default.
#[derive(Debug)]
pub enum AnyThread {}

/// Retry sharing for attempts which complete on the thread that started them. See
/// [`retry_local`].
#[derive(Debug)]
pub enum SameThread {}

impl<T: 'static> Sharing<T> for AnyThread {
    type Erased = dyn Retrying<T> + Send + Sync;
}

impl<T, X> Erase<X, T> for AnyThread
where
    T: 'static,
    X: Retrying<T> + Send + Sync + 'static,
{
    fn erase(shared: Weak<X>) -> Weak<dyn Retrying<T> + Send + Sync> {
        shared
    }
}

impl<T: 'static> Sharing<T> for SameThread {
    type Erased = dyn Retrying<T>;
}

impl<T, X> Erase<X, T> for SameThread
where
    T: 'static,
    X: Retrying<T> + 'static,
{
    fn erase(shared: Weak<X>) -> Weak<dyn Retrying<T>> {
        shared
    }
}

impl<S, R, P> RetryShared<S, R, P>
where
    S: SenderTo<RetryReceiver<<S as Sender>::Output, P>> + Clone + 'static,
    S::Output: 'static,
    R: Receiver<S::Output> + 'static,
    P: Sharing<S::Output>,
{
    // construct a receiver for a nested operation.
    fn receiver(&self) -> RetryReceiver<S::Output, P> {
        RetryReceiver { shared: self.this.clone(), _value: PhantomData }
    }

    // start the nested operation, first replacing it with a freshly connected one if `reconnect`,
    // and keep doing so for as long as it fails synchronously.
    fn drive(this: &Arc<Self>, mut reconnect: bool) {
        let mut nested = this.nested.lock().unwrap();
        loop {
            if reconnect {
                // destroy the failed attempt before connecting its replacement
                nested.operation = None;
                match nested.sender.clone().connect(this.receiver()) {
                    Ok(operation) => nested.operation = Some(Box::pin(operation)),
                    Err(e) => {
                        drop(nested);
                        debug!(
                            error = %format_args!("{:#}", e),
                            "retry reconnect failed, giving up",
                        );
                        this.complete(Completion::Error(e));
                        return;
                    }
                }
            }

            this.phase.store(STARTING, Release);
            nested.operation.as_mut()
                .expect("retry operation has no nested operation")
                .as_mut()
                .start();

            if this.phase.compare_exchange(STARTING, IDLE, AcqRel, Acquire).is_ok() {
                return;
            }
            // failed from within start
            trace!("nested operation failed synchronously, reconnecting");
            reconnect = true;
        }
    }
}

impl<S, R, P> Retrying<S::Output> for RetryShared<S, R, P>
where
    S: SenderTo<RetryReceiver<<S as Sender>::Output, P>> + Clone + 'static,
    S::Output: 'static,
    R: Receiver<S::Output> + 'static,
    P: Sharing<S::Output>,
{
    fn complete(&self, completion: Completion<S::Output>) {
        let receiver = self.receiver.lock().unwrap().take()
            .expect("retry operation completed more than once");
        completion.deliver(receiver);
    }

    fn nested_failed(self: Arc<Self>, error: anyhow::Error) {
        trace!(error = %format_args!("{:#}", error), "discarding error of failed attempt");
        if self.phase.compare_exchange(STARTING, RETRY_PENDING, AcqRel, Acquire).is_err() {
            // start has already returned, so nobody else will retry
            Self::drive(&self, true);
        }
    }
}

/// Receiver which [`Retry`] connects each attempt to
pub struct RetryReceiver<T, P: Sharing<T> = AnyThread> {
    shared: Weak<P::Erased>,
    _value: PhantomData<fn(T)>,
}

impl<T, P: Sharing<T>> RetryReceiver<T, P> {
    fn upgrade(&self) -> Option<Arc<P::Erased>> {
        let shared = self.shared.upgrade();
        if shared.is_none() {
            error!("retry operation dropped before its nested operation completed");
        }
        shared
    }
}

impl<T, P: Sharing<T>> Receiver<T> for RetryReceiver<T, P> {
    fn set_value(self, value: T) {
        if let Some(shared) = self.upgrade() {
            shared.complete(Completion::Value(value));
        }
    }

    fn set_error(self, error: anyhow::Error) {
        if let Some(shared) = self.upgrade() {
            shared.nested_failed(error);
        }
    }

    fn set_done(self) {
        if let Some(shared) = self.upgrade() {
            shared.complete(Completion::Done);
        }
    }
}
