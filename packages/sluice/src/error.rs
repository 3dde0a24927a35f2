//! Error types.
//!
//! Everything that travels through an error channel is an [`anyhow::Error`]. The types here are
//! the ones this crate itself puts into those channels, so callers can `downcast_ref` to tell them
//! apart.

use std::{
    any::Any,
    error::Error as StdError,
    fmt::{self, Debug, Formatter},
};
use thiserror::Error;


/// Error delivered to a callback's error channel when invoking the callback failed
///
/// The original failure is kept as the [`source`](StdError::source) of this error.
#[derive(Error, Debug)]
#[error("callback invocation failed")]
pub struct CallbackInvocationError {
    #[source]
    cause: Box<dyn StdError + Send + Sync + 'static>,
}

impl CallbackInvocationError {
    /// Wrap the failure that occurred while invoking a callback
    pub fn new(cause: anyhow::Error) -> Self {
        CallbackInvocationError { cause: cause.into() }
    }

    /// The failure that occurred while invoking the callback
    pub fn cause(&self) -> &(dyn StdError + Send + Sync + 'static) {
        &*self.cause
    }
}

/// Error standing in for a panic that was caught while running some work
#[derive(Error, Debug, Clone, Eq, PartialEq)]
#[error("panicked: {message}")]
pub struct PanickedError {
    /// The panic message, if the payload was a string
    pub message: String,
}

impl PanickedError {
    /// Convert a payload obtained from [`std::panic::catch_unwind`].
    pub fn from_payload(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&'static str>() {
            s.to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "<non-string panic payload>".to_owned()
        };
        PanickedError { message }
    }
}

/// Error for trying to hand work to an execution context which no longer accepts work
#[derive(Error, Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[error("execution context is no longer accepting work")]
pub struct StoppedError;

/// Error for an operation whose receiver was dropped without any completion channel having been
/// invoked
#[derive(Error, Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[error("operation was abandoned without completing")]
pub struct AbandonedError;

/// Error for a native submit which failed before the callback could be run
///
/// Gives the callback back so that the failure can still be delivered to it.
#[derive(Error)]
#[error("submit failed: {cause}")]
pub struct SubmitError<C> {
    /// The callback that was not run
    pub callback: C,
    /// The reason the submit failed
    pub cause: anyhow::Error,
}

impl<C> SubmitError<C> {
    /// Construct from the callback and the cause.
    pub fn new(callback: C, cause: anyhow::Error) -> Self {
        SubmitError { callback, cause }
    }
}

impl<C> Debug for SubmitError<C> {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.debug_struct("SubmitError")
            .field("callback", &std::any::type_name::<C>())
            .field("cause", &self.cause)
            .finish()
    }
}
