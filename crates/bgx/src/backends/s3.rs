// ai
//! ☁️ S3 — the bucket where logs go to be forgotten, and where we go to un-forget them.
//!
//! Listing is ListObjectsV2, one page per call, continuation token in, continuation
//! token out. Reading hands back the object body bridged from async to blocking,
//! because the scanner is a plain `Read` consumer that runs on a blocking thread.
//!
//! ⚠️ The bridged body blocks on the runtime that opened it. Read it from
//! `spawn_blocking`, never from an async task, or enjoy your deadlock. 🦆

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use aws_sdk_s3::error::DisplayErrorContext;
use tokio_util::io::SyncIoBridge;
use tracing::trace;

use crate::backends::{KeyPage, ObjectStore};
use crate::object_reader::ObjectBody;

#[derive(Debug, Clone)]
pub struct S3Store {
    client: aws_sdk_s3::Client,
}

impl S3Store {
    pub fn new(client: aws_sdk_s3::Client) -> Self {
        Self { client }
    }

    pub fn from_sdk_config(sdk_config: &aws_config::SdkConfig) -> Self {
        Self::new(aws_sdk_s3::Client::new(sdk_config))
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn list_page(
        &self,
        bucket: &str,
        prefix: Option<&str>,
        continuation: Option<String>,
    ) -> Result<KeyPage> {
        let output = self
            .client
            .list_objects_v2()
            .bucket(bucket)
            .set_prefix(prefix.map(str::to_string))
            .set_continuation_token(continuation)
            .send()
            .await
            .map_err(|e| anyhow!("{}", DisplayErrorContext(&e)))
            .with_context(|| {
                format!(
                    "💀 Failed to list s3://{bucket}/{}. The bucket is either empty, private, or imaginary.",
                    prefix.unwrap_or("")
                )
            })?;

        let keys: Vec<String> = output
            .contents()
            .iter()
            .filter_map(|object| object.key().map(str::to_string))
            .collect();
        trace!("📜 listed {} keys from s3://{bucket}", keys.len());

        // -- S3 only hands out a continuation token when the listing is truncated
        Ok(KeyPage {
            keys,
            next_token: output.next_continuation_token().map(str::to_string),
        })
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<ObjectBody> {
        let output = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| anyhow!("{}", DisplayErrorContext(&e)))
            .with_context(|| format!("💀 Failed to open s3://{bucket}/{key}"))?;

        let reader = Box::pin(output.body.into_async_read());
        Ok(Box::new(SyncIoBridge::new(reader)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn a_store_pointed_at(uri: &str) -> S3Store {
        let config = aws_sdk_s3::Config::builder()
            .behavior_version(aws_sdk_s3::config::BehaviorVersion::latest())
            .region(aws_sdk_s3::config::Region::new("us-east-1"))
            .credentials_provider(aws_sdk_s3::config::Credentials::new(
                "test", "test", None, None, "bgx-test",
            ))
            .endpoint_url(uri)
            .force_path_style(true)
            .build();
        S3Store::new(aws_sdk_s3::Client::from_conf(config))
    }

    fn a_listing(keys: &[&str], next_token: Option<&str>) -> String {
        let contents: String = keys
            .iter()
            .map(|k| format!("<Contents><Key>{k}</Key><Size>10</Size></Contents>"))
            .collect();
        let token = next_token
            .map(|t| format!("<NextContinuationToken>{t}</NextContinuationToken>"))
            .unwrap_or_default();
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<ListBucketResult xmlns="http://s3.amazonaws.com/doc/2006-03-01/">
<Name>logs-bucket</Name><Prefix>2024/</Prefix><KeyCount>{}</KeyCount><MaxKeys>1000</MaxKeys>
<IsTruncated>{}</IsTruncated>{token}{contents}
</ListBucketResult>"#,
            keys.len(),
            next_token.is_some()
        )
    }

    #[tokio::test]
    async fn the_one_where_the_listing_follows_the_continuation_token() {
        let the_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/logs-bucket/"))
            .and(query_param("list-type", "2"))
            .and(query_param("prefix", "2024/"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(
                a_listing(&["2024/a.json", "2024/b.json.gz"], Some("page-2")),
                "application/xml",
            ))
            .mount(&the_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/logs-bucket/"))
            .and(query_param("continuation-token", "page-2"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw(a_listing(&["2024/c.json"], None), "application/xml"),
            )
            .with_priority(1)
            .mount(&the_server)
            .await;

        let the_store = a_store_pointed_at(&the_server.uri());
        let the_first_page = the_store
            .list_page("logs-bucket", Some("2024/"), None)
            .await
            .expect("💀 first page");
        assert_eq!(the_first_page.keys, vec!["2024/a.json", "2024/b.json.gz"]);
        assert_eq!(the_first_page.next_token.as_deref(), Some("page-2"));

        let the_last_page = the_store
            .list_page("logs-bucket", Some("2024/"), the_first_page.next_token)
            .await
            .expect("💀 last page");
        assert_eq!(the_last_page.keys, vec!["2024/c.json"]);
        assert!(the_last_page.next_token.is_none());
    }

    #[tokio::test]
    async fn the_one_where_a_listing_failure_names_the_bucket() {
        let the_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(403).set_body_raw(
                "<Error><Code>AccessDenied</Code><Message>nope</Message></Error>",
                "application/xml",
            ))
            .mount(&the_server)
            .await;

        let the_error = a_store_pointed_at(&the_server.uri())
            .list_page("secret-bucket", None, None)
            .await
            .unwrap_err();
        assert!(format!("{the_error:#}").contains("s3://secret-bucket/"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn the_one_where_an_object_body_is_readable_off_the_runtime() {
        let the_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/logs-bucket/2024/a.json"))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw("{\"level\":\"error\"}\n", "application/json"),
            )
            .mount(&the_server)
            .await;

        let the_body = a_store_pointed_at(&the_server.uri())
            .get_object("logs-bucket", "2024/a.json")
            .await
            .expect("💀 object should open");
        let the_text = tokio::task::spawn_blocking(move || {
            let mut body = the_body;
            let mut text = String::new();
            body.read_to_string(&mut text).map(|_| text)
        })
        .await
        .expect("💀 blocking read panicked")
        .expect("💀 body should read");
        assert_eq!(the_text, "{\"level\":\"error\"}\n");
    }

    #[tokio::test]
    async fn the_one_where_a_missing_object_is_an_error_with_its_key() {
        let the_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404).set_body_raw(
                "<Error><Code>NoSuchKey</Code><Message>gone</Message></Error>",
                "application/xml",
            ))
            .mount(&the_server)
            .await;

        let the_error = a_store_pointed_at(&the_server.uri())
            .get_object("logs-bucket", "2024/ghost.json")
            .await
            .err()
            .expect("💀 a 404 should not open");
        assert!(format!("{the_error:#}").contains("2024/ghost.json"));
    }
}
