//! 🎬 *[camera pans across a dimly lit server room]*
//! 🎬 "In a world where fifty Lambdas wait by the phone..."
//! 🎬 "One supervisor dared to dial them all."
//! 🎬 *[record scratch]* 🦆
//!
//! 📦 The Supervisor wires the pipeline together and takes it apart again:
//!
//! ```text
//!   ListerWorker ──batches──▶ InvokeWorker × N ──results──▶ SinkWorker
//! ```
//!
//! 🛑 Shutdown is two-phase, and the order is load-bearing:
//! 1. the lister finishes and drops the input queue's only sender
//! 2. every invoke worker drains the input queue and goes home
//! 3. only then is the output queue closed
//! 4. the sink worker drains what is left and hands the sink back to be closed
//!
//! Close the output queue any earlier and a worker somewhere is holding a result
//! with nowhere to put it.
//!
//! ⚠️ DO NOT MAKE THE WORKERS PUB EVER
//! 💀 WORKERS ARE SUPERVISORS PRIVATE LITTLE MINIONS WHOM THE WORLD FORGOT ABOUT

mod workers;

use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Instant;

use anyhow::{Context, Result};
use futures::future::join_all;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use self::workers::{ListerWorker, SinkWorker, Worker, start_pool};
use crate::app_config::{AppConfig, validate};
use crate::backends::{InvokerBackend, Sink, SinkBackend, StoreBackend};
use crate::error::RunError;
use crate::filter::Filter;
use crate::summary::RunSummary;

/// 📦 Owns one run: the config plus the three backends the workers will borrow.
#[derive(Debug)]
pub(crate) struct Supervisor {
    app_config: AppConfig,
    store: StoreBackend,
    invoker: InvokerBackend,
    sink: SinkBackend,
}

impl Supervisor {
    pub(crate) fn new(
        app_config: AppConfig,
        store: StoreBackend,
        invoker: InvokerBackend,
        sink: SinkBackend,
    ) -> Self {
        Self {
            app_config,
            store,
            invoker,
            sink,
        }
    }

    /// 🚀 Run the search to completion, or to the first fatal error.
    ///
    /// Nothing is dispatched until the config validates and the expression compiles.
    /// When several things fail at once, the invocation failure wins over the listing
    /// failure, which wins over the sink failure: the first is usually the cause of
    /// the others.
    pub(crate) async fn run(self) -> Result<RunSummary, RunError> {
        let started = Instant::now();
        let Supervisor {
            app_config,
            store,
            invoker,
            sink,
        } = self;

        validate(&app_config).map_err(RunError::Config)?;
        let filter = Filter::compile(&app_config.search.expr)
            .with_context(|| {
                format!(
                    "💀 The expression '{}' does not compile. Nothing was dispatched.",
                    app_config.search.expr
                )
            })
            .map_err(RunError::Config)?;
        debug!("🔍 expression compiled: {}", filter.source());

        let runtime = &app_config.runtime;
        let (batch_tx, batch_rx) = async_channel::bounded(runtime.queue_capacity);
        let (result_tx, result_rx) = async_channel::bounded(runtime.queue_capacity);
        let abort = Arc::new(AtomicBool::new(false));

        info!(
            "🚀 searching s3://{}/{} with {} workers, {} keys per batch",
            app_config.search.bucket,
            app_config.search.prefix.as_deref().unwrap_or(""),
            runtime.workers,
            runtime.batch_size
        );

        // -- consumers first, so the producers never wait on nobody
        let sink_handle = SinkWorker::new(result_rx, sink).start();
        let pool = start_pool(
            runtime.workers,
            batch_rx,
            result_tx.clone(),
            invoker,
            Arc::clone(&abort),
        );
        let lister_handle = ListerWorker::new(
            Arc::new(store),
            app_config.search.clone(),
            runtime.batch_size,
            batch_tx,
            Arc::clone(&abort),
        )
        .start();

        let listing = join("lister", lister_handle).await;

        let mut invocation_failure = None;
        let pool = pool.into_iter().map(|handle| join("invoke worker", handle));
        for outcome in join_all(pool).await {
            if let Err(e) = outcome {
                invocation_failure.get_or_insert(e);
            }
        }

        // -- 🚧 every worker is home; nothing can be sent anymore
        result_tx.close();
        let drained = join("sink worker", sink_handle).await;

        if let Some(e) = invocation_failure {
            return Err(RunError::Invocation(e));
        }
        let stats = listing.map_err(RunError::Listing)?;
        let (mut sink, mut summary) = drained.map_err(RunError::Sink)?;
        if stats.cut_short {
            warn!("🛑 the listing was cut short after {} keys", stats.keys);
        }

        summary.keys = stats.keys;
        summary.batches = stats.batches;
        summary.elapsed = started.elapsed();
        sink.close(&summary)
            .await
            .context("💀 Failed to close the result sink")
            .map_err(RunError::Sink)?;

        info!("🏁 {summary}");
        Ok(summary)
    }
}

/// 🤝 Await a worker, turning a panic into an ordinary error.
async fn join<T>(who: &str, handle: JoinHandle<Result<T>>) -> Result<T> {
    handle
        .await
        .with_context(|| format!("💀 {who} task panicked. It did not leave a note."))?
}
