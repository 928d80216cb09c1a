use std::collections::{BTreeMap, BTreeSet};
use std::io::Cursor;
use std::ops::Bound;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::{Result, bail};
use async_trait::async_trait;

use crate::backends::{KeyPage, ObjectStore};
use crate::object_reader::ObjectBody;

/// 🪣 A bucket that lives in RAM. Every bucket name points at the same objects.
///
/// The continuation token is the last key of the previous page, which is exactly
/// what a BTreeMap range wants to hear.
#[derive(Debug, Clone)]
pub struct InMemoryStore {
    objects: Arc<BTreeMap<String, Vec<u8>>>,
    unreadable: Arc<BTreeSet<String>>,
    page_size: usize,
    /// 💥 fail every listing call after this many pages have been served
    listing_breaks_after: Option<usize>,
    pages_served: Arc<AtomicUsize>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self {
            objects: Arc::default(),
            unreadable: Arc::default(),
            page_size: 1000,
            listing_breaks_after: None,
            pages_served: Arc::default(),
        }
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_object(mut self, key: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        Arc::make_mut(&mut self.objects).insert(key.into(), body.into());
        self
    }

    /// 🚫 The key shows up in listings but refuses to open. Access denied, very realistic.
    pub fn with_unreadable(mut self, key: impl Into<String>) -> Self {
        let key = key.into();
        Arc::make_mut(&mut self.objects).entry(key.clone()).or_default();
        Arc::make_mut(&mut self.unreadable).insert(key);
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn with_listing_broken_after(mut self, pages: usize) -> Self {
        self.listing_breaks_after = Some(pages);
        self
    }

    pub fn pages_served(&self) -> usize {
        self.pages_served.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ObjectStore for InMemoryStore {
    async fn list_page(
        &self,
        _bucket: &str,
        prefix: Option<&str>,
        continuation: Option<String>,
    ) -> Result<KeyPage> {
        let served = self.pages_served.fetch_add(1, Ordering::SeqCst);
        if let Some(limit) = self.listing_breaks_after.filter(|limit| served >= *limit) {
            bail!("💀 simulated listing failure after {limit} pages");
        }

        let start = match continuation {
            Some(token) => Bound::Excluded(token),
            None => Bound::Unbounded,
        };
        let prefix = prefix.unwrap_or("");
        let mut remaining = self
            .objects
            .range((start, Bound::Unbounded))
            .map(|(key, _)| key)
            .filter(|key| key.starts_with(prefix));

        let keys: Vec<String> = remaining.by_ref().take(self.page_size).cloned().collect();
        let next_token = match remaining.next() {
            Some(_) => keys.last().cloned(),
            None => None,
        };
        Ok(KeyPage { keys, next_token })
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<ObjectBody> {
        if self.unreadable.contains(key) {
            bail!("💀 access denied to {bucket}/{key}");
        }
        match self.objects.get(key) {
            Some(body) => Ok(Box::new(Cursor::new(body.clone()))),
            None => bail!("💀 no such key: {bucket}/{key}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn a_store_with(keys: &[&str]) -> InMemoryStore {
        keys.iter()
            .fold(InMemoryStore::new(), |store, key| store.with_object(*key, b"{}".to_vec()))
    }

    #[tokio::test]
    async fn the_one_where_pages_chain_together_in_order() {
        let the_store = a_store_with(&["a", "b", "c", "d", "e"]).with_page_size(2);
        let mut the_keys = Vec::new();
        let mut the_token = None;
        loop {
            let the_page = the_store.list_page("b", None, the_token).await.unwrap();
            the_keys.extend(the_page.keys);
            the_token = the_page.next_token;
            if the_token.is_none() {
                break;
            }
        }
        assert_eq!(the_keys, vec!["a", "b", "c", "d", "e"]);
        assert_eq!(the_store.pages_served(), 3);
    }

    #[tokio::test]
    async fn the_one_where_the_prefix_narrows_things_down() {
        let the_store = a_store_with(&["2023/x", "2024/a", "2024/b", "2025/z"]);
        let the_page = the_store.list_page("b", Some("2024/"), None).await.unwrap();
        assert_eq!(the_page.keys, vec!["2024/a", "2024/b"]);
        assert!(the_page.next_token.is_none());
    }

    #[tokio::test]
    async fn the_one_where_the_listing_breaks_on_cue() {
        let the_store = a_store_with(&["a", "b", "c"])
            .with_page_size(1)
            .with_listing_broken_after(1);
        assert!(the_store.list_page("b", None, None).await.is_ok());
        assert!(the_store.list_page("b", None, Some("a".into())).await.is_err());
    }

    #[tokio::test]
    async fn the_one_where_unreadable_keys_are_listed_but_locked() {
        let the_store = a_store_with(&["open"]).with_unreadable("locked");
        let the_page = the_store.list_page("b", None, None).await.unwrap();
        assert_eq!(the_page.keys, vec!["locked", "open"]);
        assert!(the_store.get_object("b", "locked").await.is_err());
        assert!(the_store.get_object("b", "open").await.is_ok());
    }
}
