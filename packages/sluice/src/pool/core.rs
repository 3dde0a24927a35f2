// minimal safe core of the worker pool: the queue, its state machine, and the worker loop. the
// exposed API is a convenience wrapper around this.

use crate::fatal::{SharedFatalHandler, run_unobserved};
use std::{
    collections::VecDeque,
    mem::take,
    sync::{Arc, Condvar, Mutex, MutexGuard},
};


// type-erased unit of work in the queue.
pub(crate) type Job = Box<dyn FnOnce() -> anyhow::Result<()> + Send>;

// handle to a pool's shared state.
#[derive(Clone)]
pub(crate) struct Pool(Arc<Shared>);

// pool shared state.
struct Shared {
    // mutex around lockable state.
    lockable: Mutex<Lockable>,
    // notified when a job is enqueued, when the state changes, and when the pool goes idle with a
    // join requested.
    cond: Condvar,
    // where failures of jobs go.
    fatal_handler: SharedFatalHandler,
    // number of threads spawned for the pool, at least 1. fixed at construction.
    parallelism: usize,
}

// pool lockable state.
struct Lockable {
    // jobs waiting to run, in the order they were enqueued.
    jobs: VecDeque<Job>,
    // begins as State::Accepting. may eventually change to State::Draining and then to
    // State::Stopped, and never changes back.
    state: State,
    // whether somebody is waiting for the workers to run out of work and exit.
    join_requested: bool,
    // number of jobs currently running.
    active: usize,
    // number of threads spawned or attached which have not yet exited the worker loop.
    workers: usize,
}

// possible values for Lockable.state
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub(crate) enum State {
    // new jobs are accepted.
    Accepting,
    // new jobs are refused. the queue is empty and stays empty. workers exit once they finish the
    // job they are running, if any.
    Draining,
    // draining, and every worker has exited.
    Stopped,
}

impl Lockable {
    // whether a worker which finds the queue empty should exit rather than wait.
    fn should_exit(&self) -> bool {
        self.state != State::Accepting || (self.join_requested && self.active == 0)
    }

    // begin draining, or go straight to stopped if there are no workers to exit.
    fn drain(&mut self) {
        self.state = if self.workers == 0 { State::Stopped } else { State::Draining };
    }
}

impl Pool {
    // construct in the accepting state with no jobs, counting `num_threads` workers which are
    // about to be spawned.
    pub(crate) fn new(fatal_handler: SharedFatalHandler, num_threads: usize) -> Self {
        Pool(Arc::new(Shared {
            lockable: Mutex::new(Lockable {
                jobs: VecDeque::new(),
                state: State::Accepting,
                join_requested: false,
                active: 0,
                workers: num_threads,
            }),
            cond: Condvar::new(),
            fatal_handler,
            parallelism: num_threads.max(1),
        }))
    }

    fn lock(&self) -> MutexGuard<'_, Lockable> {
        self.0.lockable.lock().unwrap()
    }

    // whether both handles refer to the same pool.
    pub(crate) fn ptr_eq(&self, other: &Pool) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn parallelism(&self) -> usize {
        self.0.parallelism
    }

    pub(crate) fn state(&self) -> State {
        self.lock().state
    }

    // push a job to the back of the queue, or give it back if the pool is not accepting.
    //
    // a job given back must be dropped by the caller, outside of any lock.
    pub(crate) fn enqueue(&self, job: Job) -> Result<(), Job> {
        self.enqueue_with(move || job).map_err(|make_job| make_job())
    }

    // like enqueue, but the job is only built once it is known to be accepted. a refused
    // `make_job` is given back unused.
    pub(crate) fn enqueue_with<F>(&self, make_job: F) -> Result<(), F>
    where
        F: FnOnce() -> Job,
    {
        let mut lock = self.lock();
        if lock.state != State::Accepting {
            return Err(make_job);
        }
        lock.jobs.push_back(make_job());
        drop(lock);
        self.0.cond.notify_one();
        Ok(())
    }

    // begin draining. jobs still in the queue are dropped without running. does not wait for
    // running jobs to finish.
    pub(crate) fn stop(&self) {
        let discarded = {
            let mut lock = self.lock();
            if lock.state != State::Accepting {
                return;
            }
            lock.drain();
            take(&mut lock.jobs)
        };
        self.0.cond.notify_all();
        debug!(discarded = discarded.len(), "thread pool stopping");
        // dropping jobs may run arbitrary code, so this happens outside the lock
        drop(discarded);
    }

    // ask the workers to exit once the queue is empty and no job is running. the pool keeps
    // accepting jobs until then.
    pub(crate) fn request_join(&self) {
        self.lock().join_requested = true;
        self.0.cond.notify_all();
    }

    // count the current thread as a worker, then run the worker loop on it.
    pub(crate) fn attach(&self) {
        self.lock().workers += 1;
        self.run_worker();
    }

    // run jobs on the current thread until told to exit. the current thread must already be
    // counted as a worker.
    pub(crate) fn run_worker(&self) {
        let shared = &*self.0;
        let mut lock = self.lock();
        loop {
            lock = shared.cond
                .wait_while(lock, |lock| lock.jobs.is_empty() && !lock.should_exit())
                .unwrap();
            if lock.state != State::Accepting {
                break;
            }
            let job = match lock.jobs.pop_front() {
                Some(job) => job,
                None => {
                    // idle with a join requested. nobody is left to run further jobs, so stop
                    // accepting them.
                    lock.state = State::Draining;
                    shared.cond.notify_all();
                    break;
                }
            };

            lock.active += 1;
            drop(lock);
            trace!("running job");
            run_unobserved(job, &*shared.fatal_handler);
            lock = self.lock();
            lock.active -= 1;

            if lock.active == 0 && lock.jobs.is_empty() && lock.join_requested {
                shared.cond.notify_all();
            }
        }
        lock.workers -= 1;
        if lock.workers == 0 {
            lock.state = State::Stopped;
        }
        drop(lock);
        debug!("worker exiting");
    }
}
