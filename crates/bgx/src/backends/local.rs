//! 🏠 LocalInvoker — the "remote" worker is a function call away.
//!
//! Same wire format as the real thing: serialize the batch, hand it to a
//! [`BatchWorker`], serialize the result, deserialize it on the way back.
//! Good for running without a deployed function, and for tests that want the
//! whole pipeline without the cloud bill.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;

use crate::backends::Invoker;
use crate::common::Batch;
use crate::handler::BatchWorker;

#[derive(Debug, Clone)]
pub struct LocalInvoker {
    worker: Arc<BatchWorker>,
}

impl LocalInvoker {
    pub fn new(worker: BatchWorker) -> Self {
        Self {
            worker: Arc::new(worker),
        }
    }
}

#[async_trait]
impl Invoker for LocalInvoker {
    async fn invoke(&self, payload: Vec<u8>) -> Result<Vec<u8>> {
        let batch: Batch = serde_json::from_slice(&payload)
            .context("💀 Local worker could not read the batch. The envelope arrived soggy.")?;
        let result = self.worker.handle(batch).await;
        serde_json::to_vec(&result).context("💀 Local worker could not serialize its result")
    }
}
