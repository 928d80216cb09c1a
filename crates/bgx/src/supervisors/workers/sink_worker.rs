//! 🎬 *[a channel fills with results. somewhere, a terminal waits.]*
//! *[the clock on the wall reads 2:47am. someone is grepping prod logs.]*
//!
//! 🗑️ The SinkWorker — patient, tireless, and deeply unbothered by the chaos
//! upstream. It receives results. It sinks results. It keeps score.
//! It does NOT close the sink: the supervisor does that, once it knows the final
//! numbers, so the summary can include what the lister saw. 🦆

use anyhow::{Context, Result};
use async_channel::Receiver;
use tokio::task::JoinHandle;
use tracing::debug;

use super::Worker;
use crate::backends::{Sink, SinkBackend};
use crate::common::ScanResult;
use crate::summary::RunSummary;

#[derive(Debug)]
pub(crate) struct SinkWorker {
    rx: Receiver<ScanResult>,
    sink: SinkBackend,
}

impl SinkWorker {
    pub(crate) fn new(rx: Receiver<ScanResult>, sink: SinkBackend) -> Self {
        Self { rx, sink }
    }
}

impl Worker for SinkWorker {
    /// 🚰 the sink, still open, and the tally of everything it wrote
    type Output = (SinkBackend, RunSummary);

    fn start(mut self) -> JoinHandle<Result<Self::Output>> {
        tokio::spawn(async move {
            debug!("📥 SinkWorker started draining results...");
            let mut tally = RunSummary::default();
            while let Ok(result) = self.rx.recv().await {
                debug!(
                    "🪣 SinkWorker received batch {} ({} errors)",
                    result.index,
                    result.errors.len()
                );
                tally.absorb(&result);
                let index = result.index;
                match self.sink.receive(result).await {
                    Ok(written) => tally.matches += written,
                    Err(e) => {
                        // -- 🛑 stop the producers: nothing they send can be written anymore
                        self.rx.close();
                        return Err(e).with_context(|| {
                            format!("💀 SinkWorker failed to write result {index}")
                        });
                    }
                }
            }
            debug!("🏁 SinkWorker: channel closed. Handing back the sink.");
            Ok((self.sink, tally))
        })
    }
}
