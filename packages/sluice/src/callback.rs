//! Invocables, callbacks, and the policy for routing callback failures.
//!
//! An [`Invocable`] is plain work: if it fails, the failure goes back to whoever invoked it. A
//! [`Callback`] is work which also carries `error` and `done` channels: if invoking it fails, the
//! failure is caught and delivered to its own `error` channel instead, by [`invoke_callback`].
//!
//! Executors only ever see [`Invocable`]s. A callback becomes one by being wrapped in a
//! [`RoutedCallback`], whose `invoke` applies the routing policy. This way an executor author
//! writes a single `work.invoke()` and gets the right behavior for both kinds of work.

use crate::{
    error::{CallbackInvocationError, PanickedError},
    fatal::{FatalHandler, Abort},
    receiver::Receiver,
};
use std::panic::{catch_unwind, AssertUnwindSafe};
use anyhow::anyhow;


/// Work that can be run once, with no completion signal
///
/// Implemented for every `FnOnce() -> anyhow::Result<()>`. A failure is reported to whoever
/// invokes it.
pub trait Invocable {
    /// Run the work.
    fn invoke(self) -> anyhow::Result<()>;
}

impl<F> Invocable for F
where
    F: FnOnce() -> anyhow::Result<()>,
{
    fn invoke(self) -> anyhow::Result<()> {
        self()
    }
}

/// The terminal `error` and `done` channels of a callback
///
/// Neither channel may fail.
pub trait CallbackSignal {
    /// Deliver an error.
    fn error(self, error: anyhow::Error);

    /// Signal that the callback will never be called.
    fn done(self);
}

/// Invocable which takes an argument of type `A` and also has a [`CallbackSignal`]
pub trait Callback<A = ()>: CallbackSignal {
    /// Invoke the callback.
    ///
    /// This takes `&mut self` so that, if it fails, the callback is still around to receive the
    /// failure through its error channel.
    fn call(&mut self, arg: A) -> anyhow::Result<()>;
}

/// Invoke a callback inline, sending any failure to its error channel
///
/// Both returned errors and panics count as failures. They are delivered wrapped in a
/// [`CallbackInvocationError`], so the original cause remains retrievable as its source.
pub fn invoke_callback<C: Callback<A>, A>(mut callback: C, arg: A) {
    let cause = match catch_unwind(AssertUnwindSafe(|| callback.call(arg))) {
        Ok(Ok(())) => return,
        Ok(Err(e)) => e,
        Err(payload) => PanickedError::from_payload(payload).into(),
    };
    callback.error(CallbackInvocationError::new(cause).into());
}


// ==== adaptors ====


/// Nullary callback adapted into an [`Invocable`] which applies [`invoke_callback`]
///
/// Its `invoke` never fails. If it is dropped without having been invoked, for example because an
/// executor refused or discarded it, the callback is signalled `done`.
pub struct RoutedCallback<C: CallbackSignal> {
    callback: Option<C>,
}

impl<C: CallbackSignal> RoutedCallback<C> {
    /// Wrap a callback.
    pub fn new(callback: C) -> Self {
        RoutedCallback { callback: Some(callback) }
    }
}

impl<C: Callback> Invocable for RoutedCallback<C> {
    fn invoke(mut self) -> anyhow::Result<()> {
        if let Some(callback) = self.callback.take() {
            invoke_callback(callback, ());
        }
        Ok(())
    }
}

impl<C: CallbackSignal> Drop for RoutedCallback<C> {
    fn drop(&mut self) {
        if let Some(callback) = self.callback.take() {
            trace!("callback dropped without being invoked, signalling done");
            callback.done();
        }
    }
}

/// Nullary callback which completes a receiver with a fixed value
///
/// This is how operation states hand their receiver to an executor: calling it invokes
/// `set_value`, and its error and done channels forward to `set_error` and `set_done`.
///
/// A receiver which itself fails in `set_value` has no channel left to report that on, so the
/// failure is resumed as a panic out of [`invoke_callback`].
pub struct ReceiverCallback<R, V> {
    inner: Option<(R, V)>,
}

impl<R: Receiver<V>, V> ReceiverCallback<R, V> {
    /// Construct from the receiver and the value it is to be completed with.
    pub fn new(receiver: R, value: V) -> Self {
        ReceiverCallback { inner: Some((receiver, value)) }
    }
}

impl<R: Receiver<V>, V> CallbackSignal for ReceiverCallback<R, V> {
    fn error(mut self, error: anyhow::Error) {
        match self.inner.take() {
            Some((receiver, _)) => receiver.set_error(error),
            // set_value itself failed, after the receiver was already consumed. this unwinds out
            // of the executor's job, which escalates it like any other unobserved failure.
            None => {
                error!(
                    error = %format_args!("{:#}", error),
                    "receiver failed while receiving its value",
                );
                panic!("receiver failed while receiving its value: {:#}", error);
            }
        }
    }

    fn done(mut self) {
        if let Some((receiver, _)) = self.inner.take() {
            receiver.set_done();
        }
    }
}

impl<R: Receiver<V>, V> Callback for ReceiverCallback<R, V> {
    fn call(&mut self, (): ()) -> anyhow::Result<()> {
        let (receiver, value) = self.inner.take()
            .ok_or_else(|| anyhow!("receiver callback invoked more than once"))?;
        receiver.set_value(value);
        Ok(())
    }
}

/// Nullary callback which calls `f` and passes its result to an inner callback
///
/// See [`compose_callback`].
pub struct Composed<C, F> {
    callback: C,
    f: Option<F>,
}

/// Compose a callback expecting a `T` with a function producing one
///
/// The result is a nullary callback. Its error and done channels forward to `callback`.
pub fn compose_callback<C, F, T>(callback: C, f: F) -> Composed<C, F>
where
    C: Callback<T>,
    F: FnOnce() -> T,
{
    Composed { callback, f: Some(f) }
}

impl<C: CallbackSignal, F> CallbackSignal for Composed<C, F> {
    fn error(self, error: anyhow::Error) {
        self.callback.error(error);
    }

    fn done(self) {
        self.callback.done();
    }
}

impl<C, F, T> Callback for Composed<C, F>
where
    C: Callback<T>,
    F: FnOnce() -> T,
{
    fn call(&mut self, (): ()) -> anyhow::Result<()> {
        let f = self.f.take().ok_or_else(|| anyhow!("composed callback invoked more than once"))?;
        self.callback.call(f())
    }
}


// ==== callbacks from closures ====


/// Nullary callback built from a closure. See [`callback`].
pub struct FnCallback<F, H = Abort> {
    f: Option<F>,
    handler: H,
}

/// Build a nullary callback from a closure
///
/// Errors delivered to it have nobody to go to, so they are escalated through a fatal handler,
/// which by default aborts the process. Done is ignored.
pub fn callback<F>(f: F) -> FnCallback<F>
where
    F: FnOnce() -> anyhow::Result<()>,
{
    FnCallback { f: Some(f), handler: Abort }
}

impl<F> FnCallback<F> {
    /// Replace the fatal handler.
    pub fn with_fatal_handler<H: FatalHandler>(self, handler: H) -> FnCallback<F, H> {
        FnCallback { f: self.f, handler }
    }
}

impl<F, H: FatalHandler> CallbackSignal for FnCallback<F, H> {
    fn error(self, error: anyhow::Error) {
        self.handler.fatal(error);
    }

    fn done(self) {}
}

impl<F, H> Callback for FnCallback<F, H>
where
    F: FnOnce() -> anyhow::Result<()>,
    H: FatalHandler,
{
    fn call(&mut self, (): ()) -> anyhow::Result<()> {
        let f = self.f.take().ok_or_else(|| anyhow!("callback invoked more than once"))?;
        f()
    }
}

/// Unary callback built from a closure. See [`callback_with`].
pub struct FnCallbackWith<F, H = Abort> {
    f: Option<F>,
    handler: H,
}

/// Build a callback taking one argument from a closure
///
/// Otherwise the same as [`callback`].
pub fn callback_with<F, A>(f: F) -> FnCallbackWith<F>
where
    F: FnOnce(A) -> anyhow::Result<()>,
{
    FnCallbackWith { f: Some(f), handler: Abort }
}

impl<F> FnCallbackWith<F> {
    /// Replace the fatal handler.
    pub fn with_fatal_handler<H: FatalHandler>(self, handler: H) -> FnCallbackWith<F, H> {
        FnCallbackWith { f: self.f, handler }
    }
}

impl<F, H: FatalHandler> CallbackSignal for FnCallbackWith<F, H> {
    fn error(self, error: anyhow::Error) {
        self.handler.fatal(error);
    }

    fn done(self) {}
}

impl<F, H, A> Callback<A> for FnCallbackWith<F, H>
where
    F: FnOnce(A) -> anyhow::Result<()>,
    H: FatalHandler,
{
    fn call(&mut self, arg: A) -> anyhow::Result<()> {
        let f = self.f.take().ok_or_else(|| anyhow!("callback invoked more than once"))?;
        f(arg)
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::tap;
    use std::sync::{Arc, Mutex};

    // callback which records what happened to it.
    struct Recorder {
        log: Arc<Mutex<Vec<String>>>,
        fail_with: Option<&'static str>,
    }

    impl CallbackSignal for Recorder {
        fn error(self, error: anyhow::Error) {
            let cause = error.downcast_ref::<CallbackInvocationError>()
                .map(|e| e.cause().to_string())
                .unwrap_or_default();
            self.log.lock().unwrap().push(format!("error({})", cause));
        }

        fn done(self) {
            self.log.lock().unwrap().push("done".to_owned());
        }
    }

    impl Callback<i32> for Recorder {
        fn call(&mut self, arg: i32) -> anyhow::Result<()> {
            if let Some(msg) = self.fail_with {
                if msg == "panic" {
                    panic!("callback panicked");
                }
                return Err(anyhow!(msg));
            }
            self.log.lock().unwrap().push(format!("call({})", arg));
            Ok(())
        }
    }

    impl Callback for Recorder {
        fn call(&mut self, (): ()) -> anyhow::Result<()> {
            Callback::<i32>::call(self, 0)
        }
    }

    fn recorder(fail_with: Option<&'static str>) -> (Recorder, Arc<Mutex<Vec<String>>>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        (Recorder { log: Arc::clone(&log), fail_with }, log)
    }

    #[test]
    fn invoke_callback_success() {
        let (cb, log) = recorder(None);
        invoke_callback(cb, 5);
        assert_eq!(*log.lock().unwrap(), vec!["call(5)"]);
    }

    #[test]
    fn invoke_callback_routes_errors_and_panics() {
        let (cb, log) = recorder(Some("bad input"));
        invoke_callback(cb, 5);
        assert_eq!(*log.lock().unwrap(), vec!["error(bad input)"]);

        let (cb, log) = recorder(Some("panic"));
        invoke_callback(cb, 5);
        assert_eq!(*log.lock().unwrap(), vec!["error(panicked: callback panicked)"]);
    }

    #[test]
    fn plain_invocable_failures_propagate() {
        let failing = || -> anyhow::Result<()> { Err(anyhow!("plain failure")) };
        let err = failing.invoke().unwrap_err();
        assert_eq!(err.to_string(), "plain failure");
        assert!(err.downcast_ref::<CallbackInvocationError>().is_none());
    }

    #[test]
    fn routed_callback_never_fails() {
        let (cb, log) = recorder(Some("nope"));
        RoutedCallback::new(cb).invoke().unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["error(nope)"]);
    }

    #[test]
    fn dropped_routed_callback_signals_done() {
        let (cb, log) = recorder(None);
        drop(RoutedCallback::new(cb));
        assert_eq!(*log.lock().unwrap(), vec!["done"]);
    }

    #[test]
    fn receiver_callback_channels() {
        let (receiver, tap_log) = tap::<&str>();
        RoutedCallback::new(ReceiverCallback::new(receiver, "v")).invoke().unwrap();
        assert_eq!(tap_log.values(), vec!["v"]);

        let (receiver, tap_log) = tap::<&str>();
        drop(RoutedCallback::new(ReceiverCallback::new(receiver, "v")));
        assert_eq!(tap_log.dones(), 1);
        assert_eq!(tap_log.len(), 1);

        let (receiver, tap_log) = tap::<&str>();
        ReceiverCallback::new(receiver, "v").error(anyhow!("e"));
        assert_eq!(tap_log.errors(), vec!["e"]);
    }

    // receiver which panics when given a value.
    struct RejectsValue;

    impl Receiver<i32> for RejectsValue {
        fn set_value(self, _: i32) {
            panic!("value rejected");
        }

        fn set_error(self, _: anyhow::Error) {
            unreachable!()
        }

        fn set_done(self) {
            unreachable!()
        }
    }

    #[test]
    #[should_panic(expected = "value rejected")]
    fn receiver_failing_on_value_unwinds() {
        let _ = RoutedCallback::new(ReceiverCallback::new(RejectsValue, 1)).invoke();
    }

    #[test]
    fn composed_callback_feeds_inner() {
        let (cb, log) = recorder(None);
        invoke_callback(compose_callback(cb, || 40 + 2), ());
        assert_eq!(*log.lock().unwrap(), vec!["call(42)"]);

        let (cb, log) = recorder(None);
        compose_callback(cb, || 1).done();
        assert_eq!(*log.lock().unwrap(), vec!["done"]);
    }

    #[test]
    fn closure_callbacks_escalate_errors() {
        let fatal = Arc::new(Mutex::new(Vec::new()));
        let fatal_2 = Arc::clone(&fatal);
        let cb = callback(|| Err(anyhow!("unwanted")))
            .with_fatal_handler(move |e: anyhow::Error| {
                fatal_2.lock().unwrap().push(format!("{:#}", e))
            });
        invoke_callback(cb, ());
        assert_eq!(
            *fatal.lock().unwrap(),
            vec!["callback invocation failed: unwanted".to_owned()],
        );

        let seen = Arc::new(Mutex::new(None));
        let seen_2 = Arc::clone(&seen);
        invoke_callback(callback_with(move |n: u32| {
            *seen_2.lock().unwrap() = Some(n);
            anyhow::Ok(())
        }), 8);
        assert_eq!(*seen.lock().unwrap(), Some(8));
    }
}
