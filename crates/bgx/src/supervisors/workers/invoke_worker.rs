//! 📡 The dispatcher pool: N workers, one input queue, one output queue.
//!
//! 🎬 *[fifty workers stand at fifty phones. a batch comes down the chute.]*
//! *[whoever is free picks it up, dials the function, and waits.]*
//!
//! Each worker loops: take a batch, serialize it, invoke, decode the result (inflating
//! gzip matches back into plain ones), stamp
//! the round-trip time on it, pass it on. It stops when the input queue is closed and
//! drained. A failed invocation is fatal to the run: the worker raises the shared abort
//! flag and closes the input queue, so the lister stops producing and the other workers
//! stop taking new batches once their current call comes back. Nobody is interrupted
//! mid-call. Nobody retries. 🦆

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use anyhow::{Context, Result, ensure};
use async_channel::{Receiver, Sender};
use tokio::task::JoinHandle;
use tracing::{debug, error};

use super::Worker;
use crate::backends::{Invoker, InvokerBackend, inflate_matches};
use crate::common::{Batch, ScanResult};

#[derive(Debug)]
pub(crate) struct InvokeWorker {
    id: usize,
    rx: Receiver<Batch>,
    tx: Sender<ScanResult>,
    invoker: InvokerBackend,
    abort: Arc<AtomicBool>,
}

impl InvokeWorker {
    pub(crate) fn new(
        id: usize,
        rx: Receiver<Batch>,
        tx: Sender<ScanResult>,
        invoker: InvokerBackend,
        abort: Arc<AtomicBool>,
    ) -> Self {
        Self {
            id,
            rx,
            tx,
            invoker,
            abort,
        }
    }

    fn aborted(&self) -> bool {
        self.abort.load(Ordering::SeqCst)
    }

    fn raise_abort(&self) {
        self.abort.store(true, Ordering::SeqCst);
        self.rx.close();
    }

    /// 📡 One round trip: batch out, result back, timing stamped.
    async fn dispatch(&self, batch: &Batch) -> Result<ScanResult> {
        let payload = serde_json::to_vec(batch).context("💀 Failed to serialize batch")?;
        let started = Instant::now();
        let response = self.invoker.invoke(payload).await?;
        let mut result: ScanResult = serde_json::from_slice(&response).with_context(|| {
            format!(
                "💀 Malformed result: {}",
                String::from_utf8_lossy(&response[..response.len().min(256)])
            )
        })?;
        ensure!(
            result.index == batch.index,
            "💀 Sent batch {} but got a result for batch {}",
            batch.index,
            result.index
        );
        // -- a compressed payload that will not inflate is as malformed as bad JSON
        if !result.gzip_matches.is_empty() {
            let inflated = inflate_matches(&result.gzip_matches).with_context(|| {
                format!(
                    "💀 Malformed result: gzip matches for batch {} do not inflate",
                    batch.index
                )
            })?;
            result.matches.extend(inflated);
            result.gzip_matches.clear();
        }
        result.took = Some(started.elapsed());
        Ok(result)
    }
}

impl Worker for InvokeWorker {
    /// 🔢 batches this worker carried to completion
    type Output = usize;

    fn start(self) -> JoinHandle<Result<usize>> {
        tokio::spawn(async move {
            let mut handled = 0;
            loop {
                if self.aborted() {
                    break;
                }
                let Ok(batch) = self.rx.recv().await else {
                    // -- input queue closed and empty
                    break;
                };
                if self.aborted() {
                    break;
                }

                debug!("📡 worker {} invoking batch {}", self.id, batch.index);
                let result = match self.dispatch(&batch).await {
                    Ok(result) => result,
                    Err(e) => {
                        error!("💀 worker {} failed on batch {}: {e:#}", self.id, batch.index);
                        self.raise_abort();
                        return Err(e.context(format!("batch {} failed to invoke", batch.index)));
                    }
                };
                handled += 1;

                if self.tx.send(result).await.is_err() {
                    // -- the sink is gone; nobody will read what we produce
                    self.raise_abort();
                    break;
                }
            }
            debug!("🏁 worker {} done after {handled} batches", self.id);
            Ok(handled)
        })
    }
}

/// 🧵 Spawn `size` invoke workers. Each gets its own clone of the invoker.
pub(crate) fn start_pool(
    size: usize,
    rx: Receiver<Batch>,
    tx: Sender<ScanResult>,
    invoker: InvokerBackend,
    abort: Arc<AtomicBool>,
) -> Vec<JoinHandle<Result<usize>>> {
    (0..size.max(1))
        .map(|id| {
            InvokeWorker::new(id, rx.clone(), tx.clone(), invoker.clone(), Arc::clone(&abort))
                .start()
        })
        .collect()
}
