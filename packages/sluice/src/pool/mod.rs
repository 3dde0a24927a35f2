// implementation of the worker pool.
//
// the architecture is as such:
//
// pool handles wrap around Arc<shared state>
//                               |
//          /--------------------/
//          v
//       shared state
//          |
//          |------ a mutex around the lockable state, which holds the FIFO queue of type-erased
//          |       jobs, the Accepting/Draining/Stopped state, the join-requested flag, the count
//          |       of jobs currently running, and the count of workers not yet exited
//          |
//          \------ a condvar which workers wait on while the queue is empty and they have no
//                  reason to exit
//
// the organization of these modules is as such:
//
//      core: the queue, its state machine, and the worker loop. knows nothing of executors.
//        ^
//        |
//      api: the ThreadPool owning the worker threads, and the executor and scheduler handles
//           which adapt the core into the rest of the crate. the crate re-exports this API
//           publically.
//
// there is also the config module, which builds a ThreadPool and is also re-exported publically.

pub(crate) mod api;
pub(crate) mod config;

mod core;
