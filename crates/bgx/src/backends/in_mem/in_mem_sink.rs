use std::sync::Arc;

use anyhow::{Result, bail};
use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::backends::{Sink, inflate_matches};
use crate::common::ScanResult;
use crate::summary::RunSummary;

/// 📦 A sink that never forgets.
///
/// Clone-able because tests need to peek inside after handing `self` off to the
/// pipeline. The `Arc`s mean every clone shares the same evidence locker.
#[derive(Debug, Default, Clone)]
pub struct InMemorySink {
    /// 📬 every result, as received
    pub received: Arc<Mutex<Vec<ScanResult>>>,
    /// 📜 every match line that would have gone to stdout, gzip already inflated
    pub lines: Arc<Mutex<Vec<String>>>,
    /// 🏁 the summary handed to `close`, once it has been called
    pub closed_with: Arc<Mutex<Option<RunSummary>>>,
    /// 💥 refuse every result after this many
    fail_after: Option<usize>,
}

impl InMemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_after(results: usize) -> Self {
        Self {
            fail_after: Some(results),
            ..Self::default()
        }
    }
}

#[async_trait]
impl Sink for InMemorySink {
    async fn receive(&mut self, result: ScanResult) -> Result<usize> {
        let mut received = self.received.lock().await;
        if let Some(limit) = self.fail_after.filter(|limit| received.len() >= *limit) {
            bail!("💀 simulated sink failure after {limit} results");
        }

        let mut matches = result.matches.clone();
        matches.extend(inflate_matches(&result.gzip_matches)?);
        let written = matches.len();
        self.lines.lock().await.extend(matches);
        received.push(result);
        Ok(written)
    }

    async fn close(&mut self, summary: &RunSummary) -> Result<()> {
        *self.closed_with.lock().await = Some(summary.clone());
        Ok(())
    }
}
