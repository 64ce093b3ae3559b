//! # S3 Object Store
//!
//! [`ObjectStore`] over Amazon S3 or any S3-compatible endpoint.
//!
//! ## Client Setup
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  AWS provider chain (env, profile, IMDS/ECS/EKS roles)                 │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  operation timeout = store.request_timeout                             │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  custom endpoint? ──yes──► endpoint_url + path-style addressing        │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  aws_sdk_s3::Client                                                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Missing objects are detected from the typed service error, never from
//! the message text.

use async_trait::async_trait;
use aws_config::timeout::TimeoutConfig;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::error::{DisplayErrorContext, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use bytes::Bytes;
use tracing::{debug, info};

use crate::config::StoreSettings;
use crate::error::{StoreError, StoreResult};
use crate::store::ObjectStore;

/// Region used when neither the settings nor the provider chain name one.
/// S3-compatible servers generally accept any value.
const FALLBACK_REGION: &str = "us-east-1";

/// S3-backed object store bound to one bucket.
#[derive(Debug, Clone)]
pub struct S3ObjectStore {
    client: Client,
    bucket: String,
}

impl S3ObjectStore {
    /// Builds a client from the AWS provider chain and the store settings.
    pub async fn connect(settings: &StoreSettings) -> Self {
        let timeouts = TimeoutConfig::builder()
            .operation_timeout(settings.request_timeout)
            .build();

        let mut loader = aws_config::defaults(BehaviorVersion::latest()).timeout_config(timeouts);
        if let Some(region) = &settings.region {
            loader = loader.region(Region::new(region.clone()));
        }
        let shared = loader.load().await;

        let mut builder = aws_sdk_s3::config::Builder::from(&shared);
        if shared.region().is_none() {
            builder = builder.region(Region::new(FALLBACK_REGION));
        }
        if let Some(endpoint) = settings.endpoint.as_deref().filter(|e| !e.is_empty()) {
            info!(endpoint = %endpoint, "Using custom S3 endpoint");
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }

        S3ObjectStore {
            client: Client::from_conf(builder.build()),
            bucket: settings.bucket.clone(),
        }
    }
}

/// Maps an SDK failure that is not a typed not-found.
fn classify<E, R>(operation: &'static str, key: &str, err: SdkError<E, R>) -> StoreError
where
    E: std::error::Error + 'static,
    R: std::fmt::Debug,
{
    match err {
        SdkError::TimeoutError(_) => StoreError::Timeout {
            operation,
            key: key.to_string(),
        },
        other => StoreError::request(operation, key, DisplayErrorContext(&other)),
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn list(&self, prefix: &str) -> StoreResult<Vec<String>> {
        let mut pages = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(prefix)
            .into_paginator()
            .send();

        let mut keys = Vec::new();
        while let Some(page) = pages.next().await {
            let page = page.map_err(|e| classify("list", prefix, e))?;
            keys.extend(page.contents().iter().filter_map(|o| o.key().map(str::to_string)));
        }

        debug!(bucket = %self.bucket, prefix = %prefix, count = keys.len(), "Listed objects");
        Ok(keys)
    }

    async fn get(&self, key: &str) -> StoreResult<Bytes> {
        let output = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                if e.as_service_error().is_some_and(|se| se.is_no_such_key()) {
                    StoreError::not_found(key)
                } else {
                    classify("get", key, e)
                }
            })?;

        let body = output
            .body
            .collect()
            .await
            .map_err(|e| StoreError::request("get", key, e))?;
        Ok(body.into_bytes())
    }

    async fn put(&self, key: &str, body: Bytes) -> StoreResult<()> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|e| classify("put", key, e))?;
        Ok(())
    }

    async fn head(&self, key: &str) -> StoreResult<bool> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(e) if e.as_service_error().is_some_and(|se| se.is_not_found()) => Ok(false),
            Err(e) => Err(classify("head", key, e)),
        }
    }
}
