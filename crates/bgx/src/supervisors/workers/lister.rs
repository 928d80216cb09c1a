//! 📜 The lister: pages through the bucket, batches the keys, feeds the pool.
//!
//! 🎬 *[a listing API returns 1000 keys at a time. the batcher wants 50.]*
//! *[nobody at the meeting has the same number in mind. the batcher wins.]*
//!
//! The batching itself is a plain struct with no I/O, so its partition rules can be
//! tested with nothing but keys. The worker around it does the paging and the
//! sending. A full input queue blocks the send, which is the backpressure: the
//! lister never gets more than a queue's worth ahead of the workers.

use std::mem;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use anyhow::{Context, Result};
use async_channel::Sender;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::Worker;
use crate::app_config::SearchConfig;
use crate::backends::{ObjectStore, StoreBackend};
use crate::common::Batch;

/// 📦 Accumulates keys and cuts a [`Batch`] every `batch_size` of them.
#[derive(Debug)]
pub(crate) struct Batcher {
    search: SearchConfig,
    batch_size: usize,
    buffer: Vec<String>,
    next_index: usize,
}

impl Batcher {
    pub(crate) fn new(search: SearchConfig, batch_size: usize) -> Self {
        let batch_size = batch_size.max(1);
        Self {
            search,
            batch_size,
            buffer: Vec::with_capacity(batch_size),
            next_index: 0,
        }
    }

    /// ➕ Add a key. Returns a batch when that key filled one up.
    pub(crate) fn push(&mut self, key: String) -> Option<Batch> {
        self.buffer.push(key);
        (self.buffer.len() >= self.batch_size).then(|| self.cut())
    }

    /// 🏁 The listing is over. Whatever is left, however few, goes out as the last batch.
    pub(crate) fn finish(&mut self) -> Option<Batch> {
        (!self.buffer.is_empty()).then(|| self.cut())
    }

    pub(crate) fn batches_cut(&self) -> usize {
        self.next_index
    }

    fn cut(&mut self) -> Batch {
        let keys = mem::replace(&mut self.buffer, Vec::with_capacity(self.batch_size));
        let index = self.next_index;
        self.next_index += 1;
        Batch {
            index,
            bucket: self.search.bucket.clone(),
            region: self.search.region.clone(),
            keys,
            expr: self.search.expr.clone(),
            encoding: self.search.match_encoding,
        }
    }
}

/// 📊 What the lister saw.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct ListingStats {
    pub(crate) keys: usize,
    pub(crate) batches: usize,
    /// 🛑 the input queue closed under us because the run was aborted elsewhere
    pub(crate) cut_short: bool,
}

#[derive(Debug)]
pub(crate) struct ListerWorker {
    store: Arc<StoreBackend>,
    batcher: Batcher,
    bucket: String,
    prefix: Option<String>,
    tx: Sender<Batch>,
    abort: Arc<AtomicBool>,
}

impl ListerWorker {
    pub(crate) fn new(
        store: Arc<StoreBackend>,
        search: SearchConfig,
        batch_size: usize,
        tx: Sender<Batch>,
        abort: Arc<AtomicBool>,
    ) -> Self {
        Self {
            store,
            bucket: search.bucket.clone(),
            prefix: search.prefix.clone(),
            batcher: Batcher::new(search, batch_size),
            tx,
            abort,
        }
    }

    /// 📮 `false` means the queue is closed and nobody is listening anymore.
    async fn send(&self, batch: Batch) -> bool {
        debug!("📮 queueing batch {} ({} keys)", batch.index, batch.keys.len());
        self.tx.send(batch).await.is_ok()
    }

    async fn list_and_batch(&mut self) -> Result<ListingStats> {
        let started = Instant::now();
        let mut stats = ListingStats::default();
        let mut continuation = None;

        loop {
            let page = self
                .store
                .list_page(&self.bucket, self.prefix.as_deref(), continuation)
                .await
                .with_context(|| format!("💀 Listing died after {} keys", stats.keys))?;
            stats.keys += page.keys.len();

            for key in page.keys {
                if let Some(batch) = self.batcher.push(key) {
                    if !self.send(batch).await {
                        stats.cut_short = true;
                        stats.batches = self.batcher.batches_cut();
                        return Ok(stats);
                    }
                }
            }

            continuation = page.next_token;
            if continuation.is_none() {
                break;
            }
        }

        if let Some(batch) = self.batcher.finish() {
            stats.cut_short = !self.send(batch).await;
        }
        stats.batches = self.batcher.batches_cut();
        info!(
            "📜 listed {} keys into {} batches in {:.2?}",
            stats.keys,
            stats.batches,
            started.elapsed()
        );
        Ok(stats)
    }
}

impl Worker for ListerWorker {
    type Output = ListingStats;

    fn start(mut self) -> JoinHandle<Result<ListingStats>> {
        tokio::spawn(async move {
            let outcome = self.list_and_batch().await;
            if outcome.is_err() {
                // -- 🛑 no new work after a fatal listing error; workers stop at their next receive
                self.abort.store(true, Ordering::SeqCst);
                self.tx.close();
            }
            outcome
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::InMemoryStore;
    use proptest::prelude::*;

    fn a_search() -> SearchConfig {
        SearchConfig {
            bucket: "logs".into(),
            expr: "level == 'error'".into(),
            ..SearchConfig::default()
        }
    }

    fn batch_everything(keys: &[String], batch_size: usize) -> Vec<Batch> {
        let mut the_batcher = Batcher::new(a_search(), batch_size);
        let mut the_batches: Vec<Batch> = keys
            .iter()
            .filter_map(|k| the_batcher.push(k.clone()))
            .collect();
        the_batches.extend(the_batcher.finish());
        the_batches
    }

    proptest! {
        #[test]
        fn the_one_where_every_key_lands_in_exactly_one_batch(
            the_key_count in 0usize..300,
            the_batch_size in 1usize..40,
        ) {
            let the_keys: Vec<String> = (0..the_key_count).map(|i| format!("key-{i:05}")).collect();
            let the_batches = batch_everything(&the_keys, the_batch_size);

            prop_assert_eq!(the_batches.len(), the_key_count.div_ceil(the_batch_size));
            for (i, batch) in the_batches.iter().enumerate() {
                prop_assert_eq!(batch.index, i);
                prop_assert!(!batch.keys.is_empty());
                prop_assert!(batch.keys.len() <= the_batch_size);
            }
            let the_flattened: Vec<String> =
                the_batches.into_iter().flat_map(|b| b.keys).collect();
            prop_assert_eq!(the_flattened, the_keys);
        }
    }

    #[test]
    fn the_one_where_batches_carry_the_search_with_them() {
        let the_batches = batch_everything(&["a".to_string(), "b".to_string(), "c".to_string()], 2);
        assert_eq!(the_batches.len(), 2);
        assert_eq!(the_batches[1].keys, vec!["c"]);
        assert_eq!(the_batches[1].bucket, "logs");
        assert_eq!(the_batches[1].region, "us-east-1");
        assert_eq!(the_batches[1].expr, "level == 'error'");
    }

    #[test]
    fn the_one_where_no_keys_means_no_batches() {
        assert!(batch_everything(&[], 5).is_empty());
    }

    fn a_store(keys: usize, page_size: usize) -> InMemoryStore {
        (0..keys)
            .fold(InMemoryStore::new(), |s, i| s.with_object(format!("k{i:03}"), "{}"))
            .with_page_size(page_size)
    }

    #[tokio::test]
    async fn the_one_where_batches_span_page_boundaries() {
        let (the_tx, the_rx) = async_channel::unbounded();
        let the_lister = ListerWorker::new(
            Arc::new(StoreBackend::InMemory(a_store(7, 3))),
            a_search(),
            2,
            the_tx,
            Arc::new(AtomicBool::new(false)),
        );
        let the_stats = the_lister.start().await.unwrap().unwrap();
        assert_eq!(the_stats, ListingStats { keys: 7, batches: 4, cut_short: false });

        let mut the_sizes = Vec::new();
        while let Ok(batch) = the_rx.recv().await {
            the_sizes.push(batch.keys.len());
        }
        assert_eq!(the_sizes, vec![2, 2, 2, 1]);
    }

    #[tokio::test]
    async fn the_one_where_a_broken_listing_raises_the_alarm() {
        let (the_tx, the_rx) = async_channel::unbounded();
        let the_abort = Arc::new(AtomicBool::new(false));
        let the_lister = ListerWorker::new(
            Arc::new(StoreBackend::InMemory(a_store(10, 2).with_listing_broken_after(2))),
            a_search(),
            3,
            the_tx,
            Arc::clone(&the_abort),
        );
        let the_outcome = the_lister.start().await.unwrap();
        assert!(the_outcome.is_err());
        assert!(the_abort.load(Ordering::SeqCst));
        assert!(the_rx.is_closed());
    }

    #[tokio::test]
    async fn the_one_where_a_closed_queue_stops_the_lister_quietly() {
        let (the_tx, the_rx) = async_channel::bounded(1);
        the_rx.close();
        let the_lister = ListerWorker::new(
            Arc::new(StoreBackend::InMemory(a_store(5, 10))),
            a_search(),
            1,
            the_tx,
            Arc::new(AtomicBool::new(false)),
        );
        let the_stats = the_lister.start().await.unwrap().unwrap();
        assert!(the_stats.cut_short);
    }
}
