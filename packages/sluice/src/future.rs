//! Bridge from senders to Rust futures.

use crate::{
    receiver::Completion,
    sender::{SenderTo, OperationState},
};
use std::{
    future::Future,
    mem,
    pin::Pin,
    task::{Context, Poll},
};
use tokio::sync::oneshot;


/// Future which starts a sender's operation on first poll and resolves when it completes
///
/// Resolves to `Ok(Some)` for a value, `Ok(None)` for done, and `Err` for an error, a failure to
/// connect, or an operation that dropped its receiver without completing
/// ([`AbandonedError`](crate::error::AbandonedError)). Dropping the future before it resolves drops the
/// operation state, so only do so for operations which tolerate that.
pub struct SenderFuture<O, T> {
    state: State<O>,
    recv: oneshot::Receiver<Completion<T>>,
}

enum State<O> {
    Unstarted(Pin<Box<O>>),
    Running(Pin<Box<O>>),
    ConnectFailed(anyhow::Error),
    Terminated,
}

/// Convert a sender into a [`Future`]
///
/// The sender is connected immediately, but its operation is not started until the future is first
/// polled.
pub fn into_future<S, T>(sender: S) -> SenderFuture<S::Operation, T>
where
    S: SenderTo<oneshot::Sender<Completion<T>>, Output = T>,
{
    let (send, recv) = oneshot::channel();
    let state = match sender.connect(send) {
        Ok(operation) => State::Unstarted(Box::pin(operation)),
        Err(e) => State::ConnectFailed(e),
    };
    SenderFuture { state, recv }
}

// the operation is boxed, so the future itself can move.
impl<O, T> Unpin for SenderFuture<O, T> {}

impl<O: OperationState, T> Future for SenderFuture<O, T> {
    type Output = anyhow::Result<Option<T>>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match mem::replace(&mut this.state, State::Terminated) {
            State::Unstarted(mut operation) => {
                operation.as_mut().start();
                this.state = State::Running(operation);
            }
            state @ State::Running(_) => this.state = state,
            State::ConnectFailed(e) => return Poll::Ready(Err(e)),
            State::Terminated => panic!("SenderFuture polled after already resolved"),
        }
        match Pin::new(&mut this.recv).poll(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(result) => {
                // completed, so the operation may now be dropped
                this.state = State::Terminated;
                Poll::Ready(Completion::from(result.ok()).into_result())
            }
        }
    }
}

#[cfg(feature = "futures")]
impl<O: OperationState, T> futures::future::FusedFuture for SenderFuture<O, T> {
    fn is_terminated(&self) -> bool {
        matches!(self.state, State::Terminated)
    }
}
