//! Escalation of failures nobody is left to observe.

use crate::error::PanickedError;
use std::{
    panic::{catch_unwind, AssertUnwindSafe},
    process,
    sync::Arc,
};


/// Handler for an error which reached a point where there is no receiver left to deliver it to
///
/// The default, [`Abort`], logs the error and aborts the process. Tests substitute a handler that
/// records the error instead.
pub trait FatalHandler {
    /// Handle the unobservable error.
    fn fatal(&self, error: anyhow::Error);
}

/// Fatal handler which logs and then aborts the process
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub struct Abort;

impl FatalHandler for Abort {
    fn fatal(&self, error: anyhow::Error) {
        error!(error = %format_args!("{:#}", error), "unhandled error, aborting");
        process::abort();
    }
}

impl<F: Fn(anyhow::Error)> FatalHandler for F {
    fn fatal(&self, error: anyhow::Error) {
        self(error)
    }
}

// shared, type-erased fatal handler, as held by execution contexts.
pub(crate) type SharedFatalHandler = Arc<dyn FatalHandler + Send + Sync>;

// run a type-erased job on an execution agent that has no caller to report to. errors and panics
// are escalated through the handler.
pub(crate) fn run_unobserved<J>(job: J, handler: &dyn FatalHandler)
where
    J: FnOnce() -> anyhow::Result<()>,
{
    match catch_unwind(AssertUnwindSafe(job)) {
        Ok(Ok(())) => (),
        Ok(Err(e)) => handler.fatal(e),
        Err(payload) => handler.fatal(PanickedError::from_payload(payload).into()),
    }
}
