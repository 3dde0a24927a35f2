//! Senders and operation states.

use crate::{
    callback::{Callback, invoke_callback},
    error::SubmitError,
    receiver::Receiver,
    submit::SubmitNative,
};
use std::pin::Pin;


/// Cold description of asynchronous work which completes with a `Self::Output`
///
/// Constructing a sender does no work. Work begins only when the sender is [connected](SenderTo)
/// to a receiver and the resulting operation state is [started](OperationState::start).
pub trait Sender {
    /// Type delivered through the value channel.
    type Output;
}

/// Sender which can be connected to receivers of type `R`
pub trait SenderTo<R>: Sender
where
    R: Receiver<Self::Output>,
{
    /// Operation state produced by connecting.
    type Operation: OperationState;

    /// Bind this sender to a receiver, producing an operation state. Must not start any work.
    ///
    /// Errors if the operation state could not be established, in which case the receiver is
    /// dropped without being signalled.
    fn connect(self, receiver: R) -> anyhow::Result<Self::Operation>;
}

/// One in-flight asynchronous operation, bound to a single sender and receiver
///
/// Once started, an operation state must stay where it is and be kept alive by its owner until one
/// of its receiver's completion channels has been invoked. Starting it more than once is a contract
/// violation and panics.
///
/// When a completion channel is invoked, the receiver may drop the operation state, so an
/// implementation must not touch itself after handing its receiver a completion.
pub trait OperationState {
    /// Begin the operation.
    fn start(self: Pin<&mut Self>);
}

/// Connect a sender to a receiver.
pub fn connect<S, R>(sender: S, receiver: R) -> anyhow::Result<S::Operation>
where
    S: SenderTo<R>,
    R: Receiver<S::Output>,
{
    sender.connect(receiver)
}

/// Start an operation state that the caller has pinned.
pub fn start<O: OperationState + ?Sized>(operation: Pin<&mut O>) {
    operation.start()
}


// ==== just ====


/// Sender which completes inline with a clone of a value
#[derive(Debug, Clone)]
pub struct Just<T>(T);

/// Create a sender which completes inline with `value`.
pub fn just<T>(value: T) -> Just<T> {
    Just(value)
}

impl<T> Sender for Just<T> {
    type Output = T;
}

impl<T, R: Receiver<T>> SenderTo<R> for Just<T> {
    type Operation = JustOperation<T, R>;

    fn connect(self, receiver: R) -> anyhow::Result<Self::Operation> {
        Ok(JustOperation(Some((self.0, receiver))))
    }
}

impl<T, C: Callback<T>> SubmitNative<C> for Just<T> {
    fn submit_native(self, callback: C) -> Result<(), SubmitError<C>> {
        invoke_callback(callback, self.0);
        Ok(())
    }
}

/// Operation state for [`Just`]
pub struct JustOperation<T, R>(Option<(T, R)>);

// neither the value nor the receiver is structurally pinned.
impl<T, R> Unpin for JustOperation<T, R> {}

impl<T, R: Receiver<T>> OperationState for JustOperation<T, R> {
    fn start(self: Pin<&mut Self>) {
        let (value, receiver) = self.get_mut().0.take()
            .expect("operation state started more than once");
        receiver.set_value(value);
    }
}
