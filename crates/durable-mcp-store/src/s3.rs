//! Object-store backend: one object per tool call in a tenant-named bucket.
//!
//! The resource ETag *is* the object ETag, so every condition is enforced by
//! the object store itself, atomically with the mutation. Buckets are created
//! lazily: the first put into an unknown tenant sees NoSuchBucket, creates
//! the bucket, and retries once. Expiration is stamped in the stored document
//! and enforced on read (expired objects read as missing).

use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use chrono::Utc;
use durable_mcp_core::{AccessConditions, ToolCall};
use tracing::{debug, info};

use crate::{StoreError, StoreResult, ToolCallStore};

/// S3-compatible tool-call store.
pub struct S3Store {
    client: Client,
    bucket_prefix: String,
}

impl S3Store {
    /// Connect to an S3-compatible endpoint.
    ///
    /// `account`/`key` are the static credentials used with emulator
    /// endpoints (MinIO, localstack); omit both to use the ambient
    /// credential chain.
    pub async fn connect(
        endpoint_url: &str,
        account: Option<&str>,
        key: Option<&str>,
        bucket_prefix: impl Into<String>,
    ) -> Self {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(Region::new("us-east-1"));
        if let (Some(account), Some(key)) = (account, key) {
            loader = loader.credentials_provider(Credentials::new(
                account,
                key,
                None,
                None,
                "durable-mcp-static",
            ));
        }
        let shared = loader.load().await;
        let config = aws_sdk_s3::config::Builder::from(&shared)
            .endpoint_url(endpoint_url)
            .force_path_style(true)
            .build();
        Self {
            client: Client::from_conf(config),
            bucket_prefix: bucket_prefix.into(),
        }
    }

    pub fn from_client(client: Client, bucket_prefix: impl Into<String>) -> Self {
        Self {
            client,
            bucket_prefix: bucket_prefix.into(),
        }
    }

    /// Tenant bucket name: lowercased, underscores folded to dashes.
    fn bucket_for(&self, tenant: &str) -> String {
        let tenant: String = tenant
            .to_ascii_lowercase()
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
            .collect();
        format!("{}-{}", self.bucket_prefix, tenant)
    }

    fn object_key(name: &str, tool_call_id: &str) -> String {
        format!("{name}/{tool_call_id}.json")
    }

    async fn create_bucket(&self, bucket: &str) -> StoreResult<()> {
        info!("creating tenant bucket {}", bucket);
        match self.client.create_bucket().bucket(bucket).send().await {
            Ok(_) => Ok(()),
            Err(err) => match err.raw_response().map(|r| r.status().as_u16()) {
                // Racing creators are fine; the retry will see the bucket.
                Some(409) => Ok(()),
                _ => Err(StoreError::backend(format!(
                    "create bucket {bucket}: {err}"
                ))),
            },
        }
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Vec<u8>,
        conditions: &AccessConditions,
    ) -> Result<String, PutFailure> {
        let result = self
            .client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(ByteStream::from(body))
            .content_type("application/json")
            .set_if_match(conditions.if_match.as_deref().map(quote_etag))
            .set_if_none_match(conditions.if_none_match.as_deref().map(quote_etag))
            .send()
            .await;
        match result {
            Ok(output) => Ok(output
                .e_tag()
                .map(strip_quotes)
                .unwrap_or_default()
                .to_string()),
            Err(err) => {
                let raw = err.raw_response().map(|r| r.status().as_u16());
                match raw {
                    Some(404) => Err(PutFailure::MissingBucket),
                    Some(412) | Some(409) => Err(PutFailure::Store(StoreError::PreconditionFailed)),
                    _ => Err(PutFailure::Store(StoreError::backend(format!(
                        "put {bucket}/{key}: {err}"
                    )))),
                }
            }
        }
    }
}

enum PutFailure {
    MissingBucket,
    Store(StoreError),
}

#[async_trait::async_trait]
impl ToolCallStore for S3Store {
    fn backend_name(&self) -> &'static str {
        "s3"
    }

    async fn get(
        &self,
        tenant: &str,
        name: &str,
        tool_call_id: &str,
        conditions: &AccessConditions,
    ) -> StoreResult<ToolCall> {
        let bucket = self.bucket_for(tenant);
        let key = Self::object_key(name, tool_call_id);
        let result = self
            .client
            .get_object()
            .bucket(&bucket)
            .key(&key)
            .set_if_match(conditions.if_match.as_deref().map(quote_etag))
            .set_if_none_match(conditions.if_none_match.as_deref().map(quote_etag))
            .send()
            .await;

        let output = match result {
            Ok(output) => output,
            Err(err) => {
                return Err(match err.raw_response().map(|r| r.status().as_u16()) {
                    Some(404) => StoreError::NotFound,
                    Some(304) => StoreError::NotModified,
                    Some(412) => StoreError::PreconditionFailed,
                    _ => StoreError::backend(format!("get {bucket}/{key}: {err}")),
                });
            }
        };

        let etag = output
            .e_tag()
            .map(strip_quotes)
            .unwrap_or_default()
            .to_string();
        let bytes = output
            .body
            .collect()
            .await
            .map_err(|err| StoreError::backend(format!("read {bucket}/{key}: {err}")))?
            .into_bytes();
        let mut call: ToolCall = serde_json::from_slice(&bytes)?;
        if call.is_expired(Utc::now()) {
            return Err(StoreError::NotFound);
        }
        call.etag = etag;
        Ok(call)
    }

    async fn put(
        &self,
        tenant: &str,
        tool_call: &ToolCall,
        conditions: &AccessConditions,
    ) -> StoreResult<ToolCall> {
        let bucket = self.bucket_for(tenant);
        let key = Self::object_key(&tool_call.name, &tool_call.tool_call_id);

        let mut stored = tool_call.clone();
        stored.tenant = tenant.to_string();
        stored.modified = Utc::now();
        let body = serde_json::to_vec(&stored)?;

        let etag = match self.put_object(&bucket, &key, body.clone(), conditions).await {
            Ok(etag) => etag,
            Err(PutFailure::MissingBucket) => {
                self.create_bucket(&bucket).await?;
                match self.put_object(&bucket, &key, body, conditions).await {
                    Ok(etag) => etag,
                    Err(PutFailure::MissingBucket) => {
                        return Err(StoreError::backend(format!(
                            "bucket {bucket} still missing after create"
                        )));
                    }
                    Err(PutFailure::Store(err)) => return Err(err),
                }
            }
            Err(PutFailure::Store(err)) => return Err(err),
        };

        debug!("stored {}/{} etag={}", bucket, key, etag);
        stored.etag = etag;
        Ok(stored)
    }

    async fn delete(
        &self,
        tenant: &str,
        name: &str,
        tool_call_id: &str,
        conditions: &AccessConditions,
    ) -> StoreResult<()> {
        let bucket = self.bucket_for(tenant);
        let key = Self::object_key(name, tool_call_id);

        // DeleteObject has no If-Match; verify against the current object
        // first. A lost race surfaces as a no-op delete, which the contract
        // already permits.
        if conditions.if_match.is_some() {
            match self.get(tenant, name, tool_call_id, conditions).await {
                Ok(_) => {}
                Err(StoreError::NotFound) => return Ok(()),
                Err(err) => return Err(err),
            }
        }

        match self
            .client
            .delete_object()
            .bucket(&bucket)
            .key(&key)
            .send()
            .await
        {
            Ok(_) => Ok(()),
            Err(err) => match err.raw_response().map(|r| r.status().as_u16()) {
                Some(404) => Ok(()),
                _ => Err(StoreError::backend(format!(
                    "delete {bucket}/{key}: {err}"
                ))),
            },
        }
    }

    async fn list(&self, tenant: &str, name: &str) -> StoreResult<Vec<ToolCall>> {
        let bucket = self.bucket_for(tenant);
        let prefix = format!("{name}/");
        let mut calls = Vec::new();

        let mut pages = self
            .client
            .list_objects_v2()
            .bucket(&bucket)
            .prefix(&prefix)
            .into_paginator()
            .send();
        loop {
            let page = match pages.next().await {
                Some(Ok(page)) => page,
                Some(Err(err)) => {
                    return match err.raw_response().map(|r| r.status().as_u16()) {
                        // Unknown tenant bucket lists as empty.
                        Some(404) => Ok(Vec::new()),
                        _ => Err(StoreError::backend(format!("list {bucket}: {err}"))),
                    };
                }
                None => break,
            };
            for object in page.contents() {
                let Some(key) = object.key() else { continue };
                let Some(id) = key
                    .strip_prefix(&prefix)
                    .and_then(|rest| rest.strip_suffix(".json"))
                else {
                    continue;
                };
                match self
                    .get(tenant, name, id, &AccessConditions::none())
                    .await
                {
                    Ok(call) => calls.push(call),
                    // Reaped or expired between list and get.
                    Err(StoreError::NotFound) => continue,
                    Err(err) => return Err(err),
                }
            }
        }
        calls.sort_by(|a, b| a.tool_call_id.cmp(&b.tool_call_id));
        Ok(calls)
    }
}

fn quote_etag(etag: &str) -> String {
    if etag == "*" || etag.starts_with('"') {
        etag.to_string()
    } else {
        format!("\"{etag}\"")
    }
}

fn strip_quotes(etag: &str) -> &str {
    etag.trim_matches('"')
}
