//! 🖥️ ConsoleSink — matches to stdout, everything else to stderr.
//!
//! One match per line on standard output, flushed after every result so matches
//! stream while the search is still running. Errors and truncation notices go to
//! standard error, interleaved as they arrive. The summary table goes to standard
//! error on close. Pipe stdout into `jq` and nothing else will get in the way. 🦆

use std::fmt::Debug;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter, Stderr, Stdout};

use crate::backends::{Sink, inflate_matches};
use crate::common::ScanResult;
use crate::summary::RunSummary;

/// 🖥️ The sink the binary actually uses.
pub type StdioSink = ConsoleSink<BufWriter<Stdout>, Stderr>;

#[derive(Debug)]
pub struct ConsoleSink<O, E> {
    out: O,
    err: E,
}

impl StdioSink {
    pub fn stdio() -> Self {
        ConsoleSink::new(BufWriter::new(tokio::io::stdout()), tokio::io::stderr())
    }
}

impl<O, E> ConsoleSink<O, E> {
    pub fn new(out: O, err: E) -> Self {
        Self { out, err }
    }

    pub fn into_parts(self) -> (O, E) {
        (self.out, self.err)
    }
}

#[async_trait]
impl<O, E> Sink for ConsoleSink<O, E>
where
    O: AsyncWrite + Unpin + Send + Debug,
    E: AsyncWrite + Unpin + Send + Debug,
{
    async fn receive(&mut self, result: ScanResult) -> Result<usize> {
        let mut written = 0;
        for line in result.matches.iter().chain(inflate_matches(&result.gzip_matches)?.iter()) {
            self.out.write_all(line.as_bytes()).await.context("💀 stdout refused a match")?;
            self.out.write_all(b"\n").await.context("💀 stdout refused a newline")?;
            written += 1;
        }
        self.out.flush().await.context("💀 Failed to flush stdout")?;

        for error in &result.errors {
            self.err
                .write_all(format!("search error: {error}\n").as_bytes())
                .await
                .context("💀 stderr refused an error line")?;
        }
        if let Some(note) = &result.truncated {
            self.err
                .write_all(format!("truncated results: {note}\n").as_bytes())
                .await
                .context("💀 stderr refused a truncation notice")?;
        }
        self.err.flush().await.context("💀 Failed to flush stderr")?;
        Ok(written)
    }

    async fn close(&mut self, summary: &RunSummary) -> Result<()> {
        self.out.flush().await.context("💀 Failed to flush stdout")?;
        self.err
            .write_all(format!("{}\n", summary.render()).as_bytes())
            .await
            .context("💀 stderr refused the summary")?;
        self.err.flush().await.context("💀 Failed to flush stderr")?;
        Ok(())
    }
}
