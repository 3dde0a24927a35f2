// exposed API of the worker pool.

use super::{
    config::ThreadPoolConfig,
    core::{self, Job},
};
use crate::{
    callback::Invocable,
    error::StoppedError,
    executor::{Executor, ExecuteOperation},
    receiver::Receiver,
    scheduler::Scheduler,
    sender::{Sender, SenderTo},
};
use std::{
    cmp::min,
    fmt::{self, Debug, Formatter},
    mem::take,
    sync::{Arc, Mutex, PoisonError},
    thread::{self, JoinHandle, ThreadId},
};
use anyhow::Context as _;
use smallvec::SmallVec;


/// Execution context backed by a fixed set of worker threads sharing one FIFO queue
///
/// The pool starts out accepting work. [`stop`](Self::stop) makes it refuse new work and discard
/// queued work, and [`wait`](Self::wait) blocks until the workers have exited. Dropping the pool
/// does both.
///
/// Work refused or discarded by the pool is dropped without running. For work submitted as a
/// callback or through a scheduler, that means the callback or receiver is signalled done.
pub struct ThreadPool {
    pool: core::Pool,
    // taken by whoever joins the workers.
    handles: Mutex<SmallVec<[JoinHandle<()>; 8]>>,
    worker_ids: SmallVec<[ThreadId; 8]>,
}

impl ThreadPool {
    /// Spawn a pool with `num_threads` workers and otherwise default configuration.
    pub fn new(num_threads: usize) -> anyhow::Result<Self> {
        ThreadPoolConfig::default().num_threads(num_threads).build()
    }

    pub(super) fn spawn(config: ThreadPoolConfig) -> anyhow::Result<Self> {
        let pool = core::Pool::new(config.fatal_handler, config.num_threads);
        let mut handles = SmallVec::new();
        let mut worker_ids = SmallVec::new();
        for i in 0..config.num_threads {
            let mut builder = thread::Builder::new()
                .name(format!("{}-{}", config.thread_name, i));
            if let Some(stack_size) = config.stack_size {
                builder = builder.stack_size(stack_size);
            }
            let worker_pool = pool.clone();
            let spawned = builder
                .spawn(move || worker_pool.run_worker())
                .with_context(|| format!("failed to spawn worker thread {}", i));
            match spawned {
                Ok(handle) => {
                    worker_ids.push(handle.thread().id());
                    handles.push(handle);
                }
                Err(e) => {
                    pool.stop();
                    for handle in handles {
                        let _ = JoinHandle::join(handle);
                    }
                    return Err(e);
                }
            }
        }
        debug!(num_threads = config.num_threads, "thread pool started");
        Ok(ThreadPool {
            pool,
            handles: Mutex::new(handles),
            worker_ids,
        })
    }

    /// Number of worker threads the pool was built with.
    pub fn num_threads(&self) -> usize {
        self.worker_ids.len()
    }

    /// Run the worker loop on the calling thread, returning once the pool stops or runs out of
    /// work after a [`wait`](Self::wait).
    pub fn attach(&self) {
        trace!("thread attaching to thread pool");
        self.pool.attach();
    }

    /// Stop accepting work and discard queued work
    ///
    /// Does not block. Work already running finishes. Has no effect if already stopped.
    pub fn stop(&self) {
        self.pool.stop();
    }

    /// Block until all worker threads have exited
    ///
    /// If the pool has not been stopped, it keeps accepting work until the queue is empty and no
    /// work is running, so work may enqueue follow-up work. At that point the workers exit and the
    /// pool stops accepting work.
    ///
    /// Called from one of the pool's own workers, this cannot join and only logs a warning.
    pub fn wait(&self) {
        self.pool.request_join();
        let current = thread::current().id();
        if self.worker_ids.contains(&current) {
            warn!("thread pool waited on from one of its own workers, not joining");
            return;
        }
        // held while joining, so that concurrent waits also return only once workers have exited
        let mut handles = self.handles.lock().unwrap();
        for handle in take(&mut *handles) {
            if handle.join().is_err() {
                error!("thread pool worker panicked");
            }
        }
    }

    /// Get an executor for the pool.
    pub fn executor(&self) -> ThreadPoolExecutor {
        ThreadPoolExecutor { pool: self.pool.clone() }
    }

    /// Get a scheduler for the pool.
    pub fn scheduler(&self) -> ThreadPoolScheduler {
        ThreadPoolScheduler { executor: self.executor() }
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        self.stop();
        self.wait();
    }
}

impl Debug for ThreadPool {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.debug_struct("ThreadPool")
            .field("num_threads", &self.num_threads())
            .field("state", &self.pool.state())
            .finish()
    }
}


// ==== executor ====


/// [`Executor`] handle to a [`ThreadPool`]
///
/// Refused work is reported as [`StoppedError`]. Handles compare equal if they refer to the same
/// pool.
#[derive(Clone)]
pub struct ThreadPoolExecutor {
    pool: core::Pool,
}

impl Executor for ThreadPoolExecutor {
    fn execute<F>(&self, work: F) -> anyhow::Result<()>
    where
        F: Invocable + Send + 'static,
    {
        let job: Job = Box::new(move || work.invoke());
        self.pool.enqueue(job).map_err(|job| {
            drop(job);
            StoppedError.into()
        })
    }

    // splits the range into one chunk per worker thread. the chunks share an Arc which the last one
    // to finish unwraps for the continuation. the fan-out job and the chunks run inline wherever
    // the pool discards them, so once accepted, the continuation always runs.
    fn bulk_execute<St, Op, SF, C>(
        &self,
        op: Op,
        n: usize,
        state_factory: SF,
        continuation: C,
    ) -> anyhow::Result<()>
    where
        St: Send + Sync + 'static,
        Op: Fn(usize, &St) + Send + Sync + 'static,
        SF: FnOnce() -> St + Send + 'static,
        C: FnOnce(St) + Send + 'static,
    {
        let pool = self.pool.clone();
        let fan_out = move || {
            if n == 0 {
                continuation(state_factory());
                return;
            }
            let chunks = min(pool.parallelism(), n);
            let bulk = Arc::new(Bulk {
                op,
                state: state_factory(),
                continuation: Mutex::new(continuation),
            });
            trace!(n, chunks, "fanning out bulk execution");

            let jobs = (0..chunks)
                .map(|chunk| {
                    let range = chunk * n / chunks..(chunk + 1) * n / chunks;
                    let bulk = Arc::clone(&bulk);
                    RunOnDrop::job(move || {
                        for i in range {
                            (bulk.op)(i, &bulk.state);
                        }
                        if let Some(bulk) = Arc::into_inner(bulk) {
                            let continuation = bulk.continuation
                                .into_inner()
                                .unwrap_or_else(PoisonError::into_inner);
                            continuation(bulk.state);
                        }
                    })
                })
                .collect::<SmallVec<[Job; 8]>>();
            // only the chunks may hold the Arc from here on
            drop(bulk);

            for job in jobs {
                // refused chunks run inline as they are dropped
                if let Err(job) = pool.enqueue(job) {
                    drop(job);
                }
            }
        };
        self.pool.enqueue_with(move || RunOnDrop::job(fan_out)).map_err(|make_job| {
            drop(make_job);
            StoppedError.into()
        })
    }
}

// bulk execution state shared by its chunks.
struct Bulk<St, Op, C> {
    op: Op,
    state: St,
    // never locked. makes the continuation shareable between threads.
    continuation: Mutex<C>,
}

// work which runs when invoked, or else when dropped.
struct RunOnDrop<F: FnOnce()>(Option<F>);

impl<F: FnOnce() + Send + 'static> RunOnDrop<F> {
    // wrap into a job for the pool's queue.
    fn job(f: F) -> Job {
        let mut work = RunOnDrop(Some(f));
        Box::new(move || {
            if let Some(f) = work.0.take() {
                f();
            }
            anyhow::Ok(())
        })
    }
}

impl<F: FnOnce()> Drop for RunOnDrop<F> {
    fn drop(&mut self) {
        if let Some(f) = self.0.take() {
            trace!("pool discarded bulk work, running it inline");
            f();
        }
    }
}

impl PartialEq for ThreadPoolExecutor {
    fn eq(&self, other: &Self) -> bool {
        self.pool.ptr_eq(&other.pool)
    }
}

impl Eq for ThreadPoolExecutor {}

impl Debug for ThreadPoolExecutor {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.write_str("ThreadPoolExecutor")
    }
}


// ==== scheduler ====


/// [`Scheduler`] handle to a [`ThreadPool`]
///
/// Its schedule sender completes with the scheduler itself from one of the pool's workers, or with
/// done if the pool has stopped. Handles compare equal if they refer to the same pool.
#[derive(Clone, PartialEq, Eq)]
pub struct ThreadPoolScheduler {
    executor: ThreadPoolExecutor,
}

impl ThreadPoolScheduler {
    /// Get an executor for the same pool.
    pub fn executor(&self) -> ThreadPoolExecutor {
        self.executor.clone()
    }
}

impl Debug for ThreadPoolScheduler {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.write_str("ThreadPoolScheduler")
    }
}

impl Scheduler for ThreadPoolScheduler {
    type Target = ThreadPoolScheduler;
    type ScheduleSender = ScheduleOnPool;

    fn schedule(&self) -> ScheduleOnPool {
        ScheduleOnPool { scheduler: self.clone() }
    }
}

/// Sender produced by [`ThreadPoolScheduler`]
#[derive(Debug, Clone)]
pub struct ScheduleOnPool {
    scheduler: ThreadPoolScheduler,
}

impl Sender for ScheduleOnPool {
    type Output = ThreadPoolScheduler;
}

impl<R> SenderTo<R> for ScheduleOnPool
where
    R: Receiver<ThreadPoolScheduler> + Send + 'static,
{
    type Operation = ExecuteOperation<ThreadPoolExecutor, ThreadPoolScheduler, R>;

    fn connect(self, receiver: R) -> anyhow::Result<Self::Operation> {
        Ok(ExecuteOperation::new(self.scheduler.executor(), self.scheduler, receiver))
    }
}
