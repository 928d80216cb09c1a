//! 🔧 App Configuration — the sacred layers-to-struct pipeline.
//!
//! 📡 "Config not found: We looked everywhere. Under the couch. Behind the fridge.
//! In the junk drawer. Nothing." — every developer at 3am 🦆
//!
//! 🏗️ Powered by Figment. Layers, lowest to highest precedence:
//!   1. serde defaults
//!   2. `BGX_*` environment variables, nested with `__` (`BGX_SEARCH__BUCKET=logs`)
//!   3. an optional TOML file
//!   4. whatever the command line said
//!
//! The handler role reads only its own `[handler]` section, from `BGX_HANDLER__*`.

use anyhow::{Context, Result, ensure};
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

use crate::common::MatchEncoding;

/// 📏 Keep the response under Lambda's 6 MiB payload cap, with headroom.
pub const DEFAULT_RESULT_LIMIT_BYTES: usize = 5 * 1024 * 1024;

/// 📦 The AppConfig: one struct to rule them all, and in the Figment bind them.
#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
    #[serde(default)]
    pub invoker: InvokerConfig,
    #[serde(default)]
    pub handler: HandlerConfig,
}

/// 🔍 What to search and where.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct SearchConfig {
    /// 🪣 Required. An empty bucket name fails validation.
    #[serde(default)]
    pub bucket: String,
    #[serde(default)]
    pub prefix: Option<String>,
    #[serde(default = "default_expr")]
    pub expr: String,
    #[serde(default = "default_region")]
    pub region: String,
    #[serde(default)]
    pub match_encoding: MatchEncoding,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            bucket: String::new(),
            prefix: None,
            expr: default_expr(),
            region: default_region(),
            match_encoding: MatchEncoding::default(),
        }
    }
}

/// 🧵 How hard to push.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct RuntimeConfig {
    /// 👷 concurrent invocations in flight
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// 📦 keys per batch
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// 🚰 capacity of both hand-off queues
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            batch_size: default_batch_size(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum InvokerMode {
    /// λ invoke the deployed batch worker function
    #[default]
    Lambda,
    /// 🏠 run the batch worker in this process
    Local,
}

/// 📡 Who does the scanning.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct InvokerConfig {
    #[serde(default)]
    pub mode: InvokerMode,
    #[serde(default = "default_function_name")]
    pub function_name: String,
    #[serde(default = "default_region")]
    pub function_region: String,
}

impl Default for InvokerConfig {
    fn default() -> Self {
        Self {
            mode: InvokerMode::default(),
            function_name: default_function_name(),
            function_region: default_region(),
        }
    }
}

/// 🛠️ Knobs for the batch worker, wherever it runs.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct HandlerConfig {
    #[serde(default = "default_result_limit_bytes")]
    pub result_limit_bytes: usize,
}

impl Default for HandlerConfig {
    fn default() -> Self {
        Self {
            result_limit_bytes: default_result_limit_bytes(),
        }
    }
}

fn default_expr() -> String {
    "true".to_string()
}
fn default_region() -> String {
    "us-east-1".to_string()
}
fn default_workers() -> usize {
    50
}
fn default_batch_size() -> usize {
    50
}
fn default_queue_capacity() -> usize {
    1
}
fn default_function_name() -> String {
    "bgx-worker".to_string()
}
fn default_result_limit_bytes() -> usize {
    DEFAULT_RESULT_LIMIT_BYTES
}

// ===== Command-line overrides =====

/// 🎛️ Settings given on the command line. `None` means "not given, keep the layer below".
#[derive(Debug, Default, Clone, Serialize)]
pub struct ConfigOverrides {
    pub search: SearchOverrides,
    pub runtime: RuntimeOverrides,
    pub invoker: InvokerOverrides,
    pub handler: HandlerOverrides,
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct SearchOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bucket: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expr: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub match_encoding: Option<MatchEncoding>,
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct RuntimeOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workers: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_size: Option<usize>,
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct InvokerOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<InvokerMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub function_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub function_region: Option<String>,
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct HandlerOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_limit_bytes: Option<usize>,
}

// ===== Loading =====

/// 🚀 Load the client config: defaults, then env, then the optional file, then the flags.
///
/// 💀 Returns an error if anything is unparseable, or if the result fails [`validate`].
pub fn load_config(config_file_name: Option<&Path>, overrides: ConfigOverrides) -> Result<AppConfig> {
    info!(
        "🔧 Loading configuration: {:#?}",
        config_file_name.unwrap_or(Path::new(""))
    );

    let figment = Figment::from(Serialized::defaults(AppConfig::default()))
        .merge(Env::prefixed("BGX_").split("__"));
    // -- 🎯 Figment shrugs at a missing file; a path someone typed on purpose deserves better
    let figment = match config_file_name {
        Some(file_name) => {
            ensure!(
                file_name.is_file(),
                "💀 Config file '{}' does not exist. It exists in our hearts, but not on disk.",
                file_name.display()
            );
            figment.merge(Toml::file(file_name))
        }
        None => figment,
    };
    let figment = figment.merge(Serialized::defaults(overrides));

    let context_msg = match config_file_name {
        Some(path) => format!(
            "💀 Failed to parse configuration from file '{}', environment variables (BGX_*) and flags.",
            path.display()
        ),
        None => "💀 Failed to parse configuration from environment variables (BGX_*) and flags. \
                 No file was provided, this one's all on the environment."
            .to_string(),
    };

    let config: AppConfig = figment.extract().context(context_msg)?;
    validate(&config)?;
    Ok(config)
}

/// λ Load only what the batch worker needs, from `BGX_HANDLER__*`.
pub fn load_handler_config() -> Result<HandlerConfig> {
    let config: HandlerConfig = Figment::from(Serialized::defaults(HandlerConfig::default()))
        .merge(Env::prefixed("BGX_HANDLER__"))
        .extract()
        .context("💀 Failed to parse handler configuration from BGX_HANDLER__* variables")?;
    ensure!(
        config.result_limit_bytes >= 1,
        "💀 handler.result_limit_bytes must be at least 1"
    );
    Ok(config)
}

/// ✅ The checks serde cannot express.
pub fn validate(config: &AppConfig) -> Result<()> {
    ensure!(
        !config.search.bucket.trim().is_empty(),
        "💀 search.bucket is required. Grepping nothing is fast, but not useful."
    );
    ensure!(config.runtime.workers >= 1, "💀 runtime.workers must be at least 1");
    ensure!(config.runtime.batch_size >= 1, "💀 runtime.batch_size must be at least 1");
    ensure!(
        config.runtime.queue_capacity >= 1,
        "💀 runtime.queue_capacity must be at least 1"
    );
    ensure!(
        config.handler.result_limit_bytes >= 1,
        "💀 handler.result_limit_bytes must be at least 1"
    );
    Ok(())
}
