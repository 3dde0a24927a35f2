//! Blocking on a sender from synchronous code.

use crate::{
    error::AbandonedError,
    receiver::{Receiver, Completion},
    sender::{SenderTo, OperationState},
};
use std::{
    pin::pin,
    sync::{Arc, Condvar, Mutex},
};


// completion slot shared between the waiting thread and the receiver.
struct Signal<T> {
    state: Mutex<Option<Completion<T>>>,
    cond: Condvar,
}

impl<T> Signal<T> {
    fn complete(&self, completion: Completion<T>) {
        let mut lock = self.state.lock().unwrap();
        debug_assert!(lock.is_none(), "sync_wait receiver completed more than once");
        *lock = Some(completion);
        drop(lock);
        self.cond.notify_one();
    }

    fn wait(&self) -> Completion<T> {
        let lock = self.state.lock().unwrap();
        let mut lock = self.cond.wait_while(lock, |state| state.is_none()).unwrap();
        lock.take().expect("woke without completion")
    }
}

/// Receiver used by [`sync_wait`]
///
/// If it is dropped without any channel having been invoked, the waiting thread is woken with an
/// [`AbandonedError`] rather than blocking forever.
pub struct SyncWaitReceiver<T> {
    signal: Option<Arc<Signal<T>>>,
}

impl<T> SyncWaitReceiver<T> {
    fn complete(mut self, completion: Completion<T>) {
        if let Some(signal) = self.signal.take() {
            signal.complete(completion);
        }
    }
}

impl<T> Receiver<T> for SyncWaitReceiver<T> {
    fn set_value(self, value: T) {
        self.complete(Completion::Value(value));
    }

    fn set_error(self, error: anyhow::Error) {
        self.complete(Completion::Error(error));
    }

    fn set_done(self) {
        self.complete(Completion::Done);
    }
}

impl<T> Drop for SyncWaitReceiver<T> {
    fn drop(&mut self) {
        if let Some(signal) = self.signal.take() {
            signal.complete(Completion::Error(AbandonedError.into()));
        }
    }
}

/// Connect and start a sender, then block the calling thread until it completes
///
/// Returns `Ok(Some)` for a value, `Ok(None)` for done, and `Err` for an error or a failure to
/// connect.
///
/// The operation runs wherever the sender puts it. A sender which completes inline completes
/// before this even begins blocking.
pub fn sync_wait<S, T>(sender: S) -> anyhow::Result<Option<T>>
where
    S: SenderTo<SyncWaitReceiver<T>, Output = T>,
{
    let signal = Arc::new(Signal {
        state: Mutex::new(None),
        cond: Condvar::new(),
    });
    let receiver = SyncWaitReceiver { signal: Some(Arc::clone(&signal)) };
    let mut operation = pin!(sender.connect(receiver)?);
    operation.as_mut().start();
    signal.wait().into_result()
}
