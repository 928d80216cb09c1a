// ai
//! 🛠️ BatchWorker — the remote half. One invocation, one batch, one result.
//!
//! 🎬 *[somewhere in a Lambda sandbox, a cold start finishes. a batch arrives.]*
//! *[it has fifty keys and an expression. it has fifteen minutes, tops.]*
//!
//! The worker never fails the invocation. Unreadable objects, broken JSON, a record
//! that makes the filter cry: all of it becomes a line in the result's error list,
//! and the worker moves on to the next key. An expression that will not compile is
//! the one whole-batch failure, recorded as the result's only error.
//!
//! The response has a hard size cap (6 MiB for Lambda). Before each key the worker
//! checks how big its matches have gotten; once they reach the configured ceiling it
//! stops, and the result says exactly which keys it skipped. Skipped, not dropped. 🦆

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::{Result, anyhow};
use lambda_runtime::{LambdaEvent, service_fn};
use tracing::{debug, info, warn};

use crate::app_config::HandlerConfig;
use crate::backends::StoreProvider;
use crate::common::{Batch, MatchEncoding, ScanResult};
use crate::filter::Filter;
use crate::object_reader::{self, ObjectStream};
use crate::scanner::{MatchSink, RecordScanner, ScanReport};

/// 🛠️ Scans every key of a batch and folds the outcome into one [`ScanResult`].
#[derive(Debug, Clone)]
pub struct BatchWorker {
    stores: StoreProvider,
    result_limit_bytes: usize,
}

impl BatchWorker {
    pub fn new(stores: StoreProvider, result_limit_bytes: usize) -> Self {
        Self {
            stores,
            result_limit_bytes,
        }
    }

    pub async fn handle(&self, batch: Batch) -> ScanResult {
        debug!(
            "📦 handling batch {} ({} keys in {})",
            batch.index,
            batch.keys.len(),
            batch.bucket
        );
        let mut result = ScanResult::for_batch(&batch);

        let filter = match Filter::compile(&batch.expr) {
            Ok(filter) => Arc::new(filter),
            Err(e) => {
                warn!("🧱 batch {} carries a broken expression: {e}", batch.index);
                result
                    .errors
                    .push(format!("error evaluating expression '{}': {e}", batch.expr));
                return result;
            }
        };

        let store = self.stores.store_for(&batch.region).await;
        let sink = Arc::new(Mutex::new(MatchSink::new(batch.encoding)));

        for (position, key) in batch.keys.iter().enumerate() {
            if lock(&sink).wire_len() >= self.result_limit_bytes {
                let note = format!("skipping {}", batch.keys[position..].join(","));
                warn!("✂️ batch {} hit the response ceiling, {note}", batch.index);
                result.truncated = Some(note);
                break;
            }

            debug!("🔬 scanning object at {}/{key}", batch.bucket);
            let stream = match object_reader::open(store.as_ref(), &batch.bucket, key).await {
                Ok(stream) => stream,
                Err(e) => {
                    result.errors.push(format!("error reading object {key}: {e:#}"));
                    continue;
                }
            };

            match scan_off_runtime(Arc::clone(&filter), stream, Arc::clone(&sink)).await {
                Ok(report) => {
                    result.records_scanned += report.scanned;
                    if let Some(e) = report.error {
                        result.errors.push(format!("error scanning object {key}: {e}"));
                    }
                }
                Err(e) => result.errors.push(format!("error scanning object {key}: {e:#}")),
            }
        }

        if let Err(e) = take_sink(sink, batch.encoding).finish_into(&mut result) {
            result.errors.push(format!("error encoding matches: {e}"));
        }
        result
    }
}

/// 🧵 Reading an object body may block, so the scan runs on the blocking pool.
async fn scan_off_runtime(
    filter: Arc<Filter>,
    stream: ObjectStream,
    sink: Arc<Mutex<MatchSink>>,
) -> Result<ScanReport> {
    tokio::task::spawn_blocking(move || {
        let mut sink = lock(&sink);
        RecordScanner::new(&filter).scan(stream, &mut sink)
    })
    .await
    .map_err(|e| anyhow!("💀 scanner task died: {e}"))
}

// -- a panicked scan poisons the mutex but leaves earlier matches intact; keep them
fn lock(sink: &Mutex<MatchSink>) -> MutexGuard<'_, MatchSink> {
    sink.lock().unwrap_or_else(PoisonError::into_inner)
}

fn take_sink(shared: Arc<Mutex<MatchSink>>, encoding: MatchEncoding) -> MatchSink {
    match Arc::try_unwrap(shared) {
        Ok(mutex) => mutex.into_inner().unwrap_or_else(PoisonError::into_inner),
        Err(shared) => std::mem::replace(&mut *lock(&shared), MatchSink::new(encoding)),
    }
}

/// λ Register the batch worker with the Lambda runtime and serve until the sandbox dies.
///
/// Each batch names its own region; stores are built per region from a shared
/// cache of AWS configs, so a warm sandbox loads each region's config once.
pub async fn serve(config: HandlerConfig) -> Result<()> {
    let worker = Arc::new(BatchWorker::new(
        StoreProvider::per_region(),
        config.result_limit_bytes,
    ));
    info!(
        "λ batch worker ready, response ceiling {} bytes",
        config.result_limit_bytes
    );

    lambda_runtime::run(service_fn(move |event: LambdaEvent<Batch>| {
        let worker = Arc::clone(&worker);
        async move { Ok::<ScanResult, lambda_runtime::Error>(worker.handle(event.payload).await) }
    }))
    .await
    .map_err(|e| anyhow!("💀 Lambda runtime stopped: {e}"))
}
