//! 💀 The fatal error taxonomy: the four ways a run ends early.
//!
//! Per-object problems (unreadable objects, broken JSON, a record that trips the
//! filter) never show up here. Those are recovered inside the batch worker and
//! ride home in the result's error list. This enum is for the ones that stop the show.

/// 🚨 A run-ending failure. The binary logs it and exits non-zero.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    /// 🔧 Bad or missing settings, or an expression that will not compile.
    /// Raised before any work is dispatched.
    #[error("💀 configuration error: {0:#}")]
    Config(anyhow::Error),
    /// 📜 Paging through the bucket listing failed mid-run.
    #[error("💀 listing failed: {0:#}")]
    Listing(anyhow::Error),
    /// 📡 A remote invocation could not be made or came back malformed. Not retried.
    #[error("💀 invocation failed: {0:#}")]
    Invocation(anyhow::Error),
    /// 🚰 The result sink could not write (stdout closed, disk full, the usual).
    #[error("💀 result sink failed: {0:#}")]
    Sink(anyhow::Error),
}
