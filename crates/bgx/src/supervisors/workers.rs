//! 🧵 Workers: the ones who actually do the work while the Supervisor takes all
//! the credit in the sprint retro.
//!
//! 🚀 Three kinds, one per stage of the pipeline:
//! - `ListerWorker` pages the bucket and feeds batches into the input queue
//! - `InvokeWorker` (a pool of them) turns batches into results
//! - `SinkWorker` drains the output queue onto the console
//!
//! ⚠️ "If you're reading this, the code review went poorly." 🦆

use anyhow::Result;
use tokio::task::JoinHandle;

mod invoke_worker;
mod lister;
mod sink_worker;

pub(super) use invoke_worker::start_pool;
pub(super) use lister::ListerWorker;
pub(super) use sink_worker::SinkWorker;

/// 🏗️ A background worker, that does work. duh.
///
/// "What's the DEAL with lifetime annotations? You borrow something,
///  you give it back. It's not that hard, Jerry!" — Seinfeld, on Rust
pub(crate) trait Worker {
    /// 📦 what the worker hands back when it is done
    type Output: Send + 'static;

    /// 🚀 Start the worker. Returns a JoinHandle because we trust
    /// but verify. Mostly verify.
    fn start(self) -> JoinHandle<Result<Self::Output>>;
}
