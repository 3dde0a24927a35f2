// thread pool configuration.

use super::api::ThreadPool;
use crate::fatal::{FatalHandler, Abort, SharedFatalHandler};
use std::{
    fmt::{self, Debug, Formatter},
    num::NonZeroUsize,
    sync::Arc,
    thread,
};


/// Configuration for building a [`ThreadPool`]
///
/// ```
/// let pool = sluice::ThreadPoolConfig::default()
///     .num_threads(2)
///     .thread_name("my-worker")
///     .build()
///     .unwrap();
/// # drop(pool);
/// ```
#[derive(Clone)]
pub struct ThreadPoolConfig {
    pub(super) num_threads: usize,
    pub(super) thread_name: String,
    pub(super) stack_size: Option<usize>,
    pub(super) fatal_handler: SharedFatalHandler,
}

impl Default for ThreadPoolConfig {
    fn default() -> Self {
        ThreadPoolConfig {
            num_threads: thread::available_parallelism().map(NonZeroUsize::get).unwrap_or(1),
            thread_name: "sluice-worker".to_owned(),
            stack_size: None,
            fatal_handler: Arc::new(Abort),
        }
    }
}

impl ThreadPoolConfig {
    /// Number of worker threads to spawn.
    ///
    /// Defaults to the machine's available parallelism. Zero is allowed, in which case work only
    /// runs on threads that [attach](ThreadPool::attach) to the pool.
    pub fn num_threads(mut self, num_threads: usize) -> Self {
        self.num_threads = num_threads;
        self
    }

    /// Prefix for worker thread names. Each worker is named `{prefix}-{index}`.
    pub fn thread_name<N: Into<String>>(mut self, thread_name: N) -> Self {
        self.thread_name = thread_name.into();
        self
    }

    /// Stack size for worker threads. Defaults to the standard library's default.
    pub fn stack_size(mut self, stack_size: usize) -> Self {
        self.stack_size = Some(stack_size);
        self
    }

    /// Where failures of plain invocables running on the pool go. Defaults to [`Abort`].
    pub fn fatal_handler<H>(mut self, handler: H) -> Self
    where
        H: FatalHandler + Send + Sync + 'static,
    {
        self.fatal_handler = Arc::new(handler);
        self
    }

    /// Spawn the pool's threads.
    pub fn build(self) -> anyhow::Result<ThreadPool> {
        ThreadPool::spawn(self)
    }
}

impl Debug for ThreadPoolConfig {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.debug_struct("ThreadPoolConfig")
            .field("num_threads", &self.num_threads)
            .field("thread_name", &self.thread_name)
            .field("stack_size", &self.stack_size)
            .finish_non_exhaustive()
    }
}
