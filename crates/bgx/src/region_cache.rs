// ai
//! 🗺️ RegionCache — build an expensive per-region thing once, hand out clones forever.
//!
//! Loading AWS config walks env vars, profile files, and sometimes the instance
//! metadata service. Doing that once per batch is how you turn a grep into a nap.
//! This cache is keyed by region, populated lazily, and safe to hit from every
//! worker at once: concurrent first callers for the same region wait on the same
//! `OnceCell` instead of racing to load it twice.
//!
//! 🦆 The duck has been to every region. It did not enjoy ap-southeast-4.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};

use tokio::sync::OnceCell;

#[derive(Debug)]
pub struct RegionCache<T> {
    cells: Mutex<HashMap<String, Arc<OnceCell<T>>>>,
}

impl<T> Default for RegionCache<T> {
    fn default() -> Self {
        Self {
            cells: Mutex::new(HashMap::new()),
        }
    }
}

impl<T: Clone> RegionCache<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// 🔑 Return the cached value for `region`, running `load` only if nobody has yet.
    pub async fn get_or_load<F, Fut>(&self, region: &str, load: F) -> T
    where
        F: FnOnce(String) -> Fut,
        Fut: Future<Output = T>,
    {
        let cell = {
            // -- 🔒 the std lock is held only long enough to find or plant the cell, never across an await
            let mut cells = match self.cells.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            Arc::clone(cells.entry(region.to_string()).or_default())
        };
        cell.get_or_init(|| load(region.to_string())).await.clone()
    }

    pub fn len(&self) -> usize {
        match self.cells.lock() {
            Ok(guard) => guard.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// ☁️ Load the standard AWS provider chain, pinned to one region.
pub async fn load_sdk_config(region: String) -> aws_config::SdkConfig {
    aws_config::defaults(aws_config::BehaviorVersion::latest())
        .region(aws_config::Region::new(region))
        .load()
        .await
}
