//! 🚀 bgx-cli — the front door, the bouncer, the maitre d' of bgx.
//!
//! 🎬 *[narrator voice]* "It all started with a simple main() function..."
//! 📦 One binary, two jobs. Inside Lambda it is the batch worker and never looks at
//! its arguments. Everywhere else it parses flags, loads config, and runs a search.
//! Like a manager who is also, secretly, the intern. 🦆

use std::path::PathBuf;

use anyhow::Result;
use bgx::app_config::{
    ConfigOverrides, HandlerOverrides, InvokerMode, InvokerOverrides, RuntimeOverrides,
    SearchOverrides, load_config, load_handler_config,
};
use bgx::common::MatchEncoding;
use bgx::role::Role;
use bgx::{RunError, handler};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// 🔎 grep for buckets: find the JSON records in an S3 prefix that match an expression.
///
/// Matches go to stdout, one per line. Errors, truncation notices and the summary go to stderr.
#[derive(Debug, Parser)]
#[command(name = "bgx", version, about)]
struct Cli {
    /// 🪣 bucket to search
    #[arg(long)]
    bucket: Option<String>,

    /// 📂 only keys starting with this
    #[arg(long)]
    prefix: Option<String>,

    /// 🔍 filter expression, e.g. "level == 'error' && http.status >= 500"
    #[arg(long)]
    expr: Option<String>,

    /// 🌍 region of the bucket
    #[arg(long)]
    region: Option<String>,

    /// 👷 concurrent invocations
    #[arg(long)]
    workers: Option<usize>,

    /// 📦 keys per batch
    #[arg(long, alias = "batchSize")]
    batch_size: Option<usize>,

    /// λ name of the deployed batch worker function
    #[arg(long, alias = "lambdaName")]
    function_name: Option<String>,

    /// λ region of the deployed batch worker function
    #[arg(long, alias = "lambdaRegion")]
    function_region: Option<String>,

    /// 🗜️ ship matches back gzip-compressed, so more of them fit in a response
    #[arg(long)]
    gzip_matches: bool,

    /// 🏠 scan in this process instead of invoking the function
    #[arg(long)]
    local: bool,

    /// 📏 stop a batch once its matches reach this many bytes
    #[arg(long)]
    result_limit_bytes: Option<usize>,

    /// 🔧 TOML config file; flags win over it, it wins over BGX_* env vars
    #[arg(long)]
    config: Option<PathBuf>,
}

impl Cli {
    fn into_overrides(self) -> (Option<PathBuf>, ConfigOverrides) {
        let overrides = ConfigOverrides {
            search: SearchOverrides {
                bucket: self.bucket,
                prefix: self.prefix,
                expr: self.expr,
                region: self.region,
                // -- 🎚️ a bare switch can only turn gzip on; leaving it off defers to the layers below
                match_encoding: self.gzip_matches.then_some(MatchEncoding::Gzip),
            },
            runtime: RuntimeOverrides {
                workers: self.workers,
                batch_size: self.batch_size,
            },
            invoker: InvokerOverrides {
                mode: self.local.then_some(InvokerMode::Local),
                function_name: self.function_name,
                function_region: self.function_region,
            },
            handler: HandlerOverrides {
                result_limit_bytes: self.result_limit_bytes,
            },
        };
        (self.config, overrides)
    }
}

/// 🚀 main() — where it all begins.
///
/// 🔧 Steps:
/// 1. Init tracing, on stderr (stdout belongs to the matches)
/// 2. Figure out who we are (worker or client)
/// 3. Worker: hand ourselves to the Lambda runtime and never come back
/// 4. Client: flags → config → search → exit code
#[tokio::main]
async fn main() -> Result<()> {
    // 📡 Set up tracing — because println! debugging is a lifestyle choice
    // we're trying to move past, like flip phones and cargo shorts
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    match Role::detect() {
        Role::Handler { function_name } => {
            info!("λ running as batch worker for '{function_name}'");
            handler::serve(load_handler_config()?).await
        }
        Role::Client => {
            let (config_file, overrides) = Cli::parse().into_overrides();
            let outcome = match load_config(config_file.as_deref(), overrides) {
                Ok(app_config) => bgx::run(app_config).await,
                Err(e) => Err(RunError::Config(e)),
            };

            // 💀 Error handling: the part where we find out what went wrong
            // and print it in a way that's helpful at 3am
            if let Err(err) = outcome {
                error!("{err}");
                // 🗑️ Exit with prejudice. Process exitus maximus.
                std::process::exit(1);
            }

            // ✅ If we got here, everything worked. Pop the champagne. 🍾
            Ok(())
        }
    }
}
