//! 🔌 Backends — where the real I/O happens.
//!
//! 🪣 Stores list and open objects. 📡 Invokers carry a batch to a worker and bring
//! the result home. 🚰 Sinks take results and put them in front of a human.
//!
//! 🎭 Each concern is a trait plus an enum that dispatches to the concrete thing,
//! so the supervisor never learns whether it is talking to S3 or a BTreeMap,
//! to Lambda or to a function call two stack frames away. Ignorance is a feature.
//! It's called "abstraction."
//!
//! 🦆 The duck is here because every file must have one. This is law.

use std::fmt::Debug;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use crate::common::ScanResult;
use crate::object_reader::ObjectBody;
use crate::region_cache::{RegionCache, load_sdk_config};
use crate::summary::RunSummary;

pub mod console;
pub mod in_mem;
pub mod lambda;
pub mod local;
pub mod s3;

pub use console::ConsoleSink;
pub use in_mem::{InMemorySink, InMemoryStore};
pub use lambda::LambdaInvoker;
pub use local::LocalInvoker;
pub use s3::S3Store;

// ===== Store Trait and Backend Enum =====

/// 📜 One page of a bucket listing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KeyPage {
    pub keys: Vec<String>,
    /// 🔖 `Some` while there is more to list. Feed it back in to get the next page.
    pub next_token: Option<String>,
}

/// 🪣 An object store: something with a paginated listing and readable objects.
///
/// # Contract
/// - `list_page` with `continuation: None` starts at the beginning. Keys come back in
///   listing order. A page may be empty and still have a `next_token`.
/// - `get_object` hands over an owned, blocking body. Dropping it closes it.
///   Reading it may block, so read it off the async runtime.
#[async_trait]
pub trait ObjectStore: Debug + Send + Sync {
    async fn list_page(
        &self,
        bucket: &str,
        prefix: Option<&str>,
        continuation: Option<String>,
    ) -> Result<KeyPage>;

    async fn get_object(&self, bucket: &str, key: &str) -> Result<ObjectBody>;
}

#[derive(Debug, Clone)]
pub enum StoreBackend {
    S3(S3Store),
    InMemory(InMemoryStore),
}

#[async_trait]
impl ObjectStore for StoreBackend {
    async fn list_page(
        &self,
        bucket: &str,
        prefix: Option<&str>,
        continuation: Option<String>,
    ) -> Result<KeyPage> {
        match self {
            StoreBackend::S3(s) => s.list_page(bucket, prefix, continuation).await,
            StoreBackend::InMemory(m) => m.list_page(bucket, prefix, continuation).await,
        }
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<ObjectBody> {
        match self {
            StoreBackend::S3(s) => s.get_object(bucket, key).await,
            StoreBackend::InMemory(m) => m.get_object(bucket, key).await,
        }
    }
}

/// 🗺️ Hands a batch worker the store for a batch's region.
///
/// `PerRegion` builds an S3 client from the cached per-region AWS config.
/// `Fixed` always returns the same store, whatever the region says.
#[derive(Debug, Clone)]
pub enum StoreProvider {
    PerRegion(Arc<RegionCache<aws_config::SdkConfig>>),
    Fixed(Arc<StoreBackend>),
}

impl StoreProvider {
    pub fn per_region() -> Self {
        StoreProvider::PerRegion(Arc::new(RegionCache::new()))
    }

    pub fn fixed(store: StoreBackend) -> Self {
        StoreProvider::Fixed(Arc::new(store))
    }

    pub async fn store_for(&self, region: &str) -> Arc<StoreBackend> {
        match self {
            StoreProvider::PerRegion(cache) => {
                let sdk_config = cache.get_or_load(region, load_sdk_config).await;
                Arc::new(StoreBackend::S3(S3Store::from_sdk_config(&sdk_config)))
            }
            StoreProvider::Fixed(store) => Arc::clone(store),
        }
    }
}

// ===== Invoker Trait and Backend Enum =====

/// 📡 Carries a serialized batch to a batch worker and returns the serialized result.
///
/// # Contract
/// - Any `Err` is a transport failure: fatal to the run, never retried.
/// - A worker that ran but failed also comes back as `Err`.
#[async_trait]
pub trait Invoker: Debug + Send + Sync {
    async fn invoke(&self, payload: Vec<u8>) -> Result<Vec<u8>>;
}

/// 🎭 Every dispatcher worker gets its own clone. The clients inside are cheap to clone.
#[derive(Debug, Clone)]
pub enum InvokerBackend {
    Lambda(LambdaInvoker),
    Local(LocalInvoker),
}

#[async_trait]
impl Invoker for InvokerBackend {
    async fn invoke(&self, payload: Vec<u8>) -> Result<Vec<u8>> {
        match self {
            InvokerBackend::Lambda(l) => l.invoke(payload).await,
            InvokerBackend::Local(l) => l.invoke(payload).await,
        }
    }
}

// ===== Sink Trait and Backend Enum =====

/// 🕳️ A sink that consumes results.
///
/// # Contract
/// - `receive` writes the result's matches, errors and truncation note, and returns
///   how many matches it wrote.
/// - `close` gets the final summary, flushes, and bids the data farewell. MUST be called.
#[async_trait]
pub trait Sink: Debug + Send {
    async fn receive(&mut self, result: ScanResult) -> Result<usize>;
    async fn close(&mut self, summary: &RunSummary) -> Result<()>;
}

#[derive(Debug)]
pub enum SinkBackend {
    Console(console::StdioSink),
    InMemory(InMemorySink),
}

#[async_trait]
impl Sink for SinkBackend {
    async fn receive(&mut self, result: ScanResult) -> Result<usize> {
        match self {
            SinkBackend::Console(sink) => sink.receive(result).await,
            SinkBackend::InMemory(sink) => sink.receive(result).await,
        }
    }

    async fn close(&mut self, summary: &RunSummary) -> Result<()> {
        match self {
            SinkBackend::Console(sink) => sink.close(summary).await,
            SinkBackend::InMemory(sink) => sink.close(summary).await,
        }
    }
}

/// 🗜️ Inflate gzip-encoded matches back into their lines.
pub(crate) fn inflate_matches(compressed: &[u8]) -> Result<Vec<String>> {
    use anyhow::Context;
    use std::io::Read;

    if compressed.is_empty() {
        return Ok(Vec::new());
    }
    let mut text = String::new();
    flate2::read::MultiGzDecoder::new(compressed)
        .read_to_string(&mut text)
        .context("💀 Could not inflate gzip matches. The worker sent us a compressed mystery.")?;
    Ok(text.lines().map(str::to_string).collect())
}
