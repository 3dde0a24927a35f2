//! Receivers, the consuming end of an operation.

use crate::fatal::{FatalHandler, Abort};
use crate::error::AbandonedError;
use tokio::sync::oneshot;


/// Consumer of the result of an asynchronous operation
///
/// A receiver has three completion channels. Exactly one of them is invoked, exactly once. All of
/// them take `self` by value, so a second completion is rejected by the compiler rather than
/// detected at runtime.
pub trait Receiver<T> {
    /// The operation produced a value.
    fn set_value(self, value: T);

    /// The operation failed.
    fn set_error(self, error: anyhow::Error);

    /// The operation finished without producing a value, for example because the work it
    /// described was never run.
    fn set_done(self);
}

/// Which completion channel an operation finished through, with its payload
#[derive(Debug)]
pub enum Completion<T> {
    /// `set_value` was invoked
    Value(T),
    /// `set_error` was invoked
    Error(anyhow::Error),
    /// `set_done` was invoked
    Done,
}

impl<T> Completion<T> {
    /// Invoke the corresponding channel on the given receiver.
    pub fn deliver<R: Receiver<T>>(self, receiver: R) {
        match self {
            Completion::Value(value) => receiver.set_value(value),
            Completion::Error(error) => receiver.set_error(error),
            Completion::Done => receiver.set_done(),
        }
    }

    /// Convert to the conventional blocking result: `Ok(Some)` for a value, `Ok(None)` for done.
    pub fn into_result(self) -> anyhow::Result<Option<T>> {
        match self {
            Completion::Value(value) => Ok(Some(value)),
            Completion::Error(error) => Err(error),
            Completion::Done => Ok(None),
        }
    }

    /// Whether this is `Completion::Value`.
    pub fn is_value(&self) -> bool {
        matches!(self, Completion::Value(_))
    }

    /// Whether this is `Completion::Error`.
    pub fn is_error(&self) -> bool {
        matches!(self, Completion::Error(_))
    }

    /// Whether this is `Completion::Done`.
    pub fn is_done(&self) -> bool {
        matches!(self, Completion::Done)
    }
}

impl<T> From<Option<Completion<T>>> for Completion<T> {
    // a missing completion means the receiver was dropped unsignalled.
    fn from(opt: Option<Completion<T>>) -> Self {
        opt.unwrap_or_else(|| Completion::Error(AbandonedError.into()))
    }
}

// a oneshot sender is a receiver which forwards the completion to the other half.
impl<T> Receiver<T> for oneshot::Sender<Completion<T>> {
    fn set_value(self, value: T) {
        let _ = self.send(Completion::Value(value));
    }

    fn set_error(self, error: anyhow::Error) {
        let _ = self.send(Completion::Error(error));
    }

    fn set_done(self) {
        let _ = self.send(Completion::Done);
    }
}

/// Terminal receiver at the end of a chain
///
/// Values are discarded and done is ignored. An error reaching the sink has nobody left to observe
/// it, so it is escalated through the fatal handler, which by default aborts the process.
///
/// Done is not escalated because it is how refused and discarded work completes, for example when
/// a pool stops with work still queued. Nothing has failed in that case.
#[derive(Debug, Copy, Clone, Default)]
pub struct Sink<H = Abort> {
    handler: H,
}

impl Sink {
    /// Construct with the default, aborting, fatal handler.
    pub fn new() -> Self {
        Sink { handler: Abort }
    }
}

impl<H: FatalHandler> Sink<H> {
    /// Construct with a custom fatal handler.
    pub fn with_fatal_handler(handler: H) -> Self {
        Sink { handler }
    }
}

impl<T, H: FatalHandler> Receiver<T> for Sink<H> {
    fn set_value(self, _value: T) {}

    fn set_error(self, error: anyhow::Error) {
        self.handler.fatal(error);
    }

    fn set_done(self) {
        trace!("sink received done");
    }
}
