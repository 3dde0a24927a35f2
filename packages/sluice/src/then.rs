//! Transforming the value of a sender.

use crate::{
    error::PanickedError,
    receiver::Receiver,
    sender::{Sender, SenderTo},
};
use std::panic::{catch_unwind, AssertUnwindSafe};


/// Sender which applies a function to the value of another sender. See [`then`].
#[derive(Debug, Clone)]
pub struct Then<S, F> {
    sender: S,
    f: F,
}

/// Apply `f` to the value `sender` completes with
///
/// Errors and done pass through untouched. If `f` panics, the panic is delivered as a
/// [`PanickedError`] through the error channel.
pub fn then<S, F, U>(sender: S, f: F) -> Then<S, F>
where
    S: Sender,
    F: FnOnce(S::Output) -> U,
{
    Then { sender, f }
}

impl<S, F, U> Sender for Then<S, F>
where
    S: Sender,
    F: FnOnce(S::Output) -> U,
{
    type Output = U;
}

impl<S, F, U, R> SenderTo<R> for Then<S, F>
where
    S: SenderTo<ThenReceiver<F, R>>,
    F: FnOnce(S::Output) -> U,
    R: Receiver<U>,
{
    type Operation = S::Operation;

    fn connect(self, receiver: R) -> anyhow::Result<Self::Operation> {
        self.sender.connect(ThenReceiver { f: self.f, receiver })
    }
}

/// Receiver which [`Then`] connects its inner sender to
pub struct ThenReceiver<F, R> {
    f: F,
    receiver: R,
}

impl<T, U, F, R> Receiver<T> for ThenReceiver<F, R>
where
    F: FnOnce(T) -> U,
    R: Receiver<U>,
{
    fn set_value(self, value: T) {
        let ThenReceiver { f, receiver } = self;
        match catch_unwind(AssertUnwindSafe(move || f(value))) {
            Ok(mapped) => receiver.set_value(mapped),
            Err(payload) => receiver.set_error(PanickedError::from_payload(payload).into()),
        }
    }

    fn set_error(self, error: anyhow::Error) {
        self.receiver.set_error(error);
    }

    fn set_done(self) {
        self.receiver.set_done();
    }
}
