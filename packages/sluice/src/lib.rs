//! Composable asynchronous operations on top of pluggable execution contexts.
//!
//! A [`Sender`] is a cold description of work. [Connecting](SenderTo::connect) it to a [`Receiver`]
//! produces an [`OperationState`], and [starting](OperationState::start) that runs the work, which
//! finishes by invoking exactly one of the receiver's three completion channels: value, error, or
//! done.
//!
//! Work runs on execution contexts. An [`Executor`] runs fire-and-forget [`Invocable`]s, and a
//! [`Scheduler`] produces senders which complete from within its context. Provided contexts are a
//! [`ThreadPool`], a single-threaded [`CooperativeContext`], [`InlineExecutor`], and
//! [`NewThreadExecutor`].
//!
//! ```
//! use sluice::{ThreadPool, Scheduler, retry, sync_wait, then};
//!
//! let pool = ThreadPool::new(2).unwrap();
//! let on_pool = then(pool.scheduler().schedule(), |_| 6 * 7);
//! assert_eq!(sync_wait(retry(on_pool)).unwrap(), Some(42));
//! ```

#[macro_use]
extern crate tracing;

pub mod error;
pub mod future;

mod callback;
mod cooperative;
mod executor;
mod fatal;
mod pool;
mod receiver;
mod retry;
mod scheduler;
mod sender;
mod submit;
mod sync_wait;
mod then;

#[cfg(test)]
mod testing;

pub use crate::{
    callback::*,
    cooperative::*,
    executor::*,
    fatal::{FatalHandler, Abort},
    future::into_future,
    pool::{api::*, config::*},
    receiver::*,
    retry::*,
    scheduler::*,
    sender::*,
    submit::*,
    sync_wait::*,
    then::*,
};
