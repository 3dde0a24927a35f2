// test utilities.

use crate::{
    executor::{Executor, InlineExecutor},
    receiver::{Receiver, Completion},
    sender::{Sender, SenderTo, OperationState},
};
use std::{
    marker::PhantomData,
    pin::Pin,
    sync::{
        atomic::{AtomicUsize, Ordering::SeqCst},
        Arc,
        Mutex,
    },
};
use anyhow::{anyhow, bail};


// receiver which records every completion it sees into a shared log.
pub(crate) struct Tap<T>(Arc<Mutex<Vec<Completion<T>>>>);

// the other end of a tap.
#[derive(Clone)]
pub(crate) struct TapLog<T>(Arc<Mutex<Vec<Completion<T>>>>);

pub(crate) fn tap<T>() -> (Tap<T>, TapLog<T>) {
    let log = Arc::new(Mutex::new(Vec::new()));
    (Tap(Arc::clone(&log)), TapLog(log))
}

impl<T> Tap<T> {
    // another tap recording into the same log.
    pub(crate) fn share(&self) -> Tap<T> {
        Tap(Arc::clone(&self.0))
    }
}

impl<T> Receiver<T> for Tap<T> {
    fn set_value(self, value: T) {
        self.0.lock().unwrap().push(Completion::Value(value));
    }

    fn set_error(self, error: anyhow::Error) {
        self.0.lock().unwrap().push(Completion::Error(error));
    }

    fn set_done(self) {
        self.0.lock().unwrap().push(Completion::Done);
    }
}

impl<T> TapLog<T> {
    pub(crate) fn len(&self) -> usize {
        self.0.lock().unwrap().len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn take(&self) -> Vec<Completion<T>> {
        std::mem::take(&mut *self.0.lock().unwrap())
    }

    pub(crate) fn values(&self) -> Vec<T> where T: Clone {
        self.0.lock().unwrap().iter()
            .filter_map(|c| match c {
                Completion::Value(v) => Some(v.clone()),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn errors(&self) -> Vec<String> {
        self.0.lock().unwrap().iter()
            .filter_map(|c| match c {
                Completion::Error(e) => Some(format!("{:#}", e)),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn dones(&self) -> usize {
        self.0.lock().unwrap().iter().filter(|c| c.is_done()).count()
    }
}


// sender which fails the first `failures` times it is started and then completes with the number
// of times it has been started. clones share their counters. completions are delivered through
// the executor.
#[derive(Clone)]
pub(crate) struct Flaky<E = InlineExecutor> {
    starts: Arc<AtomicUsize>,
    connects: Arc<AtomicUsize>,
    failures: usize,
    fail_connect_at: Option<usize>,
    executor: E,
}

impl Flaky {
    pub(crate) fn new(failures: usize) -> Self {
        Flaky {
            starts: Arc::new(AtomicUsize::new(0)),
            connects: Arc::new(AtomicUsize::new(0)),
            failures,
            fail_connect_at: None,
            executor: InlineExecutor,
        }
    }
}

impl<E> Flaky<E> {
    // deliver completions through a different executor.
    pub(crate) fn on<E2>(self, executor: E2) -> Flaky<E2> {
        Flaky {
            starts: self.starts,
            connects: self.connects,
            failures: self.failures,
            fail_connect_at: self.fail_connect_at,
            executor,
        }
    }

    // make the nth connect, counting from 1, fail.
    pub(crate) fn fail_connect_at(mut self, n: usize) -> Self {
        self.fail_connect_at = Some(n);
        self
    }

    pub(crate) fn starts(&self) -> usize {
        self.starts.load(SeqCst)
    }

    pub(crate) fn connects(&self) -> usize {
        self.connects.load(SeqCst)
    }
}

impl<E> Sender for Flaky<E> {
    type Output = usize;
}

impl<E, R> SenderTo<R> for Flaky<E>
where
    E: Executor,
    R: Receiver<usize> + Send + 'static,
{
    type Operation = FlakyOperation<E, R>;

    fn connect(self, receiver: R) -> anyhow::Result<Self::Operation> {
        let n = self.connects.fetch_add(1, SeqCst) + 1;
        if self.fail_connect_at == Some(n) {
            bail!("connect {} failed", n);
        }
        Ok(FlakyOperation { sender: self, receiver: Some(receiver) })
    }
}

pub(crate) struct FlakyOperation<E, R> {
    sender: Flaky<E>,
    receiver: Option<R>,
}

impl<E, R> Unpin for FlakyOperation<E, R> {}

impl<E, R> OperationState for FlakyOperation<E, R>
where
    E: Executor,
    R: Receiver<usize> + Send + 'static,
{
    fn start(self: Pin<&mut Self>) {
        let this = self.get_mut();
        let receiver = this.receiver.take().expect("operation state started more than once");
        let n = this.sender.starts.fetch_add(1, SeqCst) + 1;
        let failures = this.sender.failures;
        this.sender.executor
            .execute(move || {
                if n <= failures {
                    receiver.set_error(anyhow!("flaky failure {}", n));
                } else {
                    receiver.set_value(n);
                }
                anyhow::Ok(())
            })
            .expect("flaky sender's executor refused work");
    }
}

// sender which completes inline with done.
pub(crate) struct Nothing<T>(PhantomData<fn() -> T>);

impl<T> Nothing<T> {
    pub(crate) fn new() -> Self {
        Nothing(PhantomData)
    }
}

impl<T> Clone for Nothing<T> {
    fn clone(&self) -> Self {
        Nothing::new()
    }
}

impl<T> Sender for Nothing<T> {
    type Output = T;
}

impl<T, R: Receiver<T>> SenderTo<R> for Nothing<T> {
    type Operation = NothingOperation<T, R>;

    fn connect(self, receiver: R) -> anyhow::Result<Self::Operation> {
        Ok(NothingOperation(Some(receiver), PhantomData))
    }
}

pub(crate) struct NothingOperation<T, R>(Option<R>, PhantomData<fn() -> T>);

impl<T, R> Unpin for NothingOperation<T, R> {}

impl<T, R: Receiver<T>> OperationState for NothingOperation<T, R> {
    fn start(self: Pin<&mut Self>) {
        let receiver = self.get_mut().0.take().expect("operation state started more than once");
        receiver.set_done();
    }
}
