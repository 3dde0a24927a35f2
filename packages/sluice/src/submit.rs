//! Submitting callbacks to senders and executors alike.
//!
//! [`submit`] hands a callback to anything that knows how to run one, picking the route from the
//! pair of types involved:
//!
//! - a type with a native submit ([`SubmitNative`]) uses it. If that fails, the failure is
//!   delivered to the callback's error channel.
//! - an executor given a nullary callback executes it.
//! - an executor given a callback expecting the executor itself executes a composition which
//!   passes the executor in.
//!
//! The route is selected by the marker types in [`via`], which the compiler infers. Callers never
//! name them.

use crate::{
    callback::{Callback, CallbackSignal, RoutedCallback, compose_callback},
    error::{CallbackInvocationError, SubmitError},
    executor::Executor,
};


/// Marker types naming the route [`submit`] takes
pub mod via {
    /// Through [`SubmitNative`](super::SubmitNative).
    #[derive(Debug)]
    pub enum Native {}

    /// Through [`Executor::execute`](crate::Executor::execute) of a nullary callback.
    #[derive(Debug)]
    pub enum Execute {}

    /// Through [`Executor::execute`](crate::Executor::execute) of a callback expecting the
    /// executor.
    #[derive(Debug)]
    pub enum ExecuteWith {}
}

/// Type with its own way of running a callback
pub trait SubmitNative<C> {
    /// Arrange for the callback to run.
    ///
    /// On failure, the callback is given back without having been run.
    fn submit_native(self, callback: C) -> Result<(), SubmitError<C>>;
}

/// Type which `C` can be submitted to through the route `Via`
pub trait Submit<C, Via> {
    /// Submit the callback. Never fails: failures are delivered to the callback.
    fn submit(self, callback: C);
}

impl<S, C> Submit<C, via::Native> for S
where
    S: SubmitNative<C>,
    C: CallbackSignal,
{
    fn submit(self, callback: C) {
        if let Err(SubmitError { callback, cause }) = self.submit_native(callback) {
            callback.error(CallbackInvocationError::new(cause).into());
        }
    }
}

impl<E, C> Submit<C, via::Execute> for E
where
    E: Executor,
    C: Callback + Send + 'static,
{
    fn submit(self, callback: C) {
        // a refused callback is dropped, which signals it done.
        if let Err(e) = self.execute(RoutedCallback::new(callback)) {
            trace!(error = %e, "executor refused submitted callback");
        }
    }
}

impl<E, C> Submit<C, via::ExecuteWith> for E
where
    E: Executor,
    C: Callback<E> + Send + 'static,
{
    fn submit(self, callback: C) {
        let executor = self.clone();
        let composed = compose_callback(callback, move || executor);
        Submit::<_, via::Execute>::submit(self, composed);
    }
}

/// Submit a callback to a sender or executor.
pub fn submit<S, C, Via>(target: S, callback: C)
where
    S: Submit<C, Via>,
{
    target.submit(callback)
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        callback::{ReceiverCallback, callback, callback_with},
        executor::InlineExecutor,
        sender::just,
        testing::tap,
    };
    use anyhow::anyhow;
    use std::sync::{Arc, Mutex};

    // submit target whose native submit always fails.
    struct Refuses;

    impl<C> SubmitNative<C> for Refuses {
        fn submit_native(self, callback: C) -> Result<(), SubmitError<C>> {
            Err(SubmitError::new(callback, anyhow!("queue full")))
        }
    }

    #[test]
    fn native_route() {
        let seen = Arc::new(Mutex::new(None));
        let seen_2 = Arc::clone(&seen);
        submit(just("native"), callback_with(move |s: &str| {
            *seen_2.lock().unwrap() = Some(s.to_owned());
            anyhow::Ok(())
        }));
        assert_eq!(seen.lock().unwrap().as_deref(), Some("native"));
    }

    #[test]
    fn native_failure_reaches_callback() {
        let fatal = Arc::new(Mutex::new(Vec::new()));
        let fatal_2 = Arc::clone(&fatal);
        let cb = callback(|| anyhow::Ok(()))
            .with_fatal_handler(move |e: anyhow::Error| {
                assert!(e.downcast_ref::<CallbackInvocationError>().is_some());
                fatal_2.lock().unwrap().push(format!("{:#}", e));
            });
        submit(Refuses, cb);
        assert_eq!(
            *fatal.lock().unwrap(),
            vec!["callback invocation failed: queue full".to_owned()],
        );
    }

    #[test]
    fn execute_route() {
        let (receiver, log) = tap::<u32>();
        submit(InlineExecutor, ReceiverCallback::new(receiver, 5));
        assert_eq!(log.values(), vec![5]);
    }

    #[test]
    fn execute_with_route() {
        let seen = Arc::new(Mutex::new(None));
        let seen_2 = Arc::clone(&seen);
        submit(InlineExecutor, callback_with(move |executor: InlineExecutor| {
            *seen_2.lock().unwrap() = Some(executor);
            anyhow::Ok(())
        }));
        assert_eq!(*seen.lock().unwrap(), Some(InlineExecutor));
    }

    #[test]
    fn execute_route_catches_callback_failure() {
        let fatal = Arc::new(Mutex::new(Vec::new()));
        let fatal_2 = Arc::clone(&fatal);
        let cb = callback(|| -> anyhow::Result<()> { panic!("inside callback") })
            .with_fatal_handler(move |e: anyhow::Error| {
                fatal_2.lock().unwrap().push(format!("{:#}", e))
            });
        submit(InlineExecutor, cb);
        assert_eq!(
            *fatal.lock().unwrap(),
            vec!["callback invocation failed: panicked: inside callback".to_owned()],
        );
    }
}
