// ai
//! 🔎 bgx — grep for buckets.
//!
//! 🎬 *[narrator voice]* "Somewhere in a bucket, one log line knows why prod went down."
//!
//! The library behind the `bgx` binary. A client lists a bucket, cuts the keys into
//! batches, and fans them out to a pool of remote batch workers, which stream every
//! object, keep the JSON records the expression likes, and send them home. The same
//! crate holds both halves: [`run`] drives a search, [`handler::serve`] is the worker.
//!
//! 🦆 The duck asked if we had considered just downloading everything. We had not.

pub mod app_config;
pub mod backends;
pub mod common;
pub mod error;
pub mod filter;
pub mod handler;
pub mod object_reader;
pub mod region_cache;
pub mod role;
pub mod scanner;
pub mod summary;
mod supervisors;

use tracing::info;

use crate::app_config::{AppConfig, InvokerMode};
use crate::backends::{
    InvokerBackend, LambdaInvoker, LocalInvoker, S3Store, SinkBackend, StoreBackend,
    StoreProvider, console::StdioSink,
};
use crate::handler::BatchWorker;
use crate::region_cache::load_sdk_config;
use crate::supervisors::Supervisor;

pub use crate::error::RunError;
pub use crate::filter::{Filter, FilterError};
pub use crate::summary::RunSummary;

/// 🚀 Search the bucket the config names, writing matches to stdout and
/// everything else to stderr.
///
/// 💀 Returns the first fatal error. Per-object trouble is not fatal; it is in the summary.
pub async fn run(app_config: AppConfig) -> Result<RunSummary, RunError> {
    let store = StoreBackend::S3(S3Store::from_sdk_config(
        &load_sdk_config(app_config.search.region.clone()).await,
    ));

    let invoker = match app_config.invoker.mode {
        InvokerMode::Lambda => {
            let invoker = LambdaInvoker::connect(
                &app_config.invoker.function_name,
                &app_config.invoker.function_region,
            )
            .await;
            info!(
                "λ dispatching to '{}' in {}",
                invoker.function_name(),
                app_config.invoker.function_region
            );
            InvokerBackend::Lambda(invoker)
        }
        InvokerMode::Local => {
            info!("🏠 scanning in-process, no function involved");
            InvokerBackend::Local(LocalInvoker::new(BatchWorker::new(
                StoreProvider::per_region(),
                app_config.handler.result_limit_bytes,
            )))
        }
    };

    let sink = SinkBackend::Console(StdioSink::stdio());
    Supervisor::new(app_config, store, invoker, sink).run().await
}
