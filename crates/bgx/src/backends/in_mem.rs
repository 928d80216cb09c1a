//! # Previously, on bgx...
//!
//! 🎬 The logs were trapped in a bucket nobody could reach from a unit test.
//! Someone had to build a bucket so small it fits in a BTreeMap, and a terminal
//! so quiet it only talks to a Vec. That someone was this module.
//!
//! `in_mem` provides an in-memory [`InMemoryStore`] and [`InMemorySink`] for tests
//! and local runs. The store lists and serves whatever objects you hand it, in
//! pages as small as you like, and can be told to fail on cue. The sink collects
//! every result behind an `Arc<Mutex<...>>` so callers can inspect what arrived.
//!
//! 🦆
//!
//! ⚠️ This is NOT for production. No network calls. No disk I/O. Just heap memory.

mod in_mem_sink;
mod in_mem_store;

pub use in_mem_sink::InMemorySink;
pub use in_mem_store::InMemoryStore;
