// ai
//! λ LambdaInvoker — throw a batch over the wall, wait for a result to come back over it.
//!
//! Synchronous (`RequestResponse`) invocation: the call returns when the worker does,
//! carrying the serialized result as its payload. A response flagged with a function
//! error means the worker itself blew up; that is a transport failure as far as the
//! run is concerned, and the body (usually a stack trace in a JSON coat) goes into
//! the error message so the human reading it has something to go on. 🦆

use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use aws_sdk_lambda::error::DisplayErrorContext;
use aws_sdk_lambda::primitives::Blob;
use aws_sdk_lambda::types::InvocationType;
use tracing::trace;

use crate::backends::Invoker;
use crate::region_cache::load_sdk_config;

#[derive(Debug, Clone)]
pub struct LambdaInvoker {
    client: aws_sdk_lambda::Client,
    function_name: String,
}

impl LambdaInvoker {
    pub fn new(client: aws_sdk_lambda::Client, function_name: impl Into<String>) -> Self {
        Self {
            client,
            function_name: function_name.into(),
        }
    }

    /// ☁️ Build a client from the standard provider chain in the function's region.
    pub async fn connect(function_name: &str, region: &str) -> Self {
        let sdk_config = load_sdk_config(region.to_string()).await;
        Self::new(aws_sdk_lambda::Client::new(&sdk_config), function_name)
    }

    pub fn function_name(&self) -> &str {
        &self.function_name
    }
}

#[async_trait]
impl Invoker for LambdaInvoker {
    async fn invoke(&self, payload: Vec<u8>) -> Result<Vec<u8>> {
        trace!("📡 invoking {} with {} bytes", self.function_name, payload.len());
        let output = self
            .client
            .invoke()
            .function_name(&self.function_name)
            .invocation_type(InvocationType::RequestResponse)
            .payload(Blob::new(payload))
            .send()
            .await
            .map_err(|e| anyhow!("{}", DisplayErrorContext(&e)))
            .with_context(|| format!("💀 Failed to invoke function '{}'", self.function_name))?;

        let function_error = output.function_error().map(str::to_string);
        let body = output.payload.map(Blob::into_inner).unwrap_or_default();
        if let Some(kind) = function_error {
            bail!(
                "💀 function '{}' failed ({kind}): {}",
                self.function_name,
                String::from_utf8_lossy(&body)
            );
        }
        Ok(body)
    }
}
