//! Object storage for intermediate artifacts and the public data archives.
//!
//! Everything above this module talks to an [`ObjectStore`]; the S3
//! implementation serves both MinIO (static credentials, path-style URLs)
//! and the anonymous public archive buckets. [`MemoryObjectStore`] backs the
//! tests.

use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Mutex,
};

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::{
    config::{Credentials, Region},
    error::DisplayErrorContext,
    primitives::ByteStream,
    Client,
};
use thiserror::Error;
use tracing::{debug, info};

// ---

pub const NOAA_BUCKET: &str = "noaa-data";
pub const OPENAQ_BUCKET: &str = "openaq-data";
pub const MERGED_BUCKET: &str = "merged-data";
pub const MODEL_BUCKET: &str = "models";
pub const IMAGE_BUCKET: &str = "generated-images";

/// Buckets the service writes to; created at startup.
pub const ARTIFACT_BUCKETS: [&str; 5] = [
    NOAA_BUCKET,
    OPENAQ_BUCKET,
    MERGED_BUCKET,
    MODEL_BUCKET,
    IMAGE_BUCKET,
];

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Object {bucket}/{key} not found")]
    NotFound { bucket: String, key: String },

    #[error("Object store error on {bucket}: {message}")]
    Backend { bucket: String, message: String },
}

impl StorageError {
    fn backend(bucket: &str, message: impl Into<String>) -> Self {
        StorageError::Backend {
            bucket: bucket.to_string(),
            message: message.into(),
        }
    }
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StorageError>;

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Vec<u8>,
        content_type: &str,
    ) -> Result<(), StorageError>;

    /// Keys under `prefix`, in lexical order.
    async fn list_objects(&self, bucket: &str, prefix: &str) -> Result<Vec<String>, StorageError>;

    async fn ensure_bucket(&self, bucket: &str) -> Result<(), StorageError>;
}

/// Create every artifact bucket that does not exist yet.
pub async fn ensure_buckets(store: &dyn ObjectStore) -> Result<(), StorageError> {
    // ---
    for bucket in ARTIFACT_BUCKETS {
        store.ensure_bucket(bucket).await?;
    }
    Ok(())
}

pub struct S3ObjectStore {
    client: Client,
}

impl S3ObjectStore {
    /// Client for an S3 compatible store (MinIO) with static credentials.
    pub async fn minio(endpoint: &str, access_key: &str, secret_key: &str, use_ssl: bool) -> Self {
        // ---
        let scheme = if use_ssl { "https" } else { "http" };
        let endpoint_url = format!("{}://{}", scheme, endpoint);
        info!("Using custom S3 endpoint: {}", endpoint_url);

        let credentials = Credentials::new(access_key, secret_key, None, None, "static");
        let shared = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new("us-east-1"))
            .endpoint_url(endpoint_url)
            .credentials_provider(credentials)
            .load()
            .await;

        let config = aws_sdk_s3::config::Builder::from(&shared)
            .force_path_style(true)
            .build();

        Self {
            client: Client::from_conf(config),
        }
    }

    /// Anonymous client for public archive buckets.
    pub async fn public(region: &str) -> Self {
        // ---
        let shared = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(region.to_string()))
            .no_credentials()
            .load()
            .await;

        Self {
            client: Client::new(&shared),
        }
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StorageError> {
        // ---
        debug!("Fetching s3://{}/{}", bucket, key);
        let output = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                if e.as_service_error().is_some_and(|se| se.is_no_such_key()) {
                    StorageError::NotFound {
                        bucket: bucket.to_string(),
                        key: key.to_string(),
                    }
                } else {
                    StorageError::backend(bucket, DisplayErrorContext(&e).to_string())
                }
            })?;

        let body = output
            .body
            .collect()
            .await
            .map_err(|e| StorageError::backend(bucket, e.to_string()))?;

        Ok(body.into_bytes().to_vec())
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Vec<u8>,
        content_type: &str,
    ) -> Result<(), StorageError> {
        // ---
        let size = body.len();
        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(ByteStream::from(body))
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| StorageError::backend(bucket, DisplayErrorContext(&e).to_string()))?;

        info!("Uploaded {} bytes to s3://{}/{}", size, bucket, key);
        Ok(())
    }

    async fn list_objects(&self, bucket: &str, prefix: &str) -> Result<Vec<String>, StorageError> {
        // ---
        let mut pages = self
            .client
            .list_objects_v2()
            .bucket(bucket)
            .prefix(prefix)
            .into_paginator()
            .send();

        let mut keys = Vec::new();
        while let Some(page) = pages.next().await {
            let page =
                page.map_err(|e| StorageError::backend(bucket, DisplayErrorContext(&e).to_string()))?;
            keys.extend(
                page.contents()
                    .iter()
                    .filter_map(|o| o.key().map(str::to_string)),
            );
        }

        keys.sort();
        Ok(keys)
    }

    async fn ensure_bucket(&self, bucket: &str) -> Result<(), StorageError> {
        // ---
        if self.client.head_bucket().bucket(bucket).send().await.is_ok() {
            return Ok(());
        }

        match self.client.create_bucket().bucket(bucket).send().await {
            Ok(_) => {
                info!("Created bucket {}", bucket);
                Ok(())
            }
            Err(e)
                if e.as_service_error()
                    .is_some_and(|se| se.is_bucket_already_owned_by_you()) =>
            {
                Ok(())
            }
            Err(e) => Err(StorageError::backend(
                bucket,
                DisplayErrorContext(&e).to_string(),
            )),
        }
    }
}

/// In-process object store.
#[derive(Default)]
pub struct MemoryObjectStore {
    buckets: Mutex<BTreeSet<String>>,
    objects: Mutex<BTreeMap<(String, String), Vec<u8>>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an object, creating its bucket.
    pub fn insert(&self, bucket: &str, key: &str, body: impl Into<Vec<u8>>) {
        self.lock_buckets().insert(bucket.to_string());
        self.lock_objects()
            .insert((bucket.to_string(), key.to_string()), body.into());
    }

    pub fn contains(&self, bucket: &str, key: &str) -> bool {
        self.lock_objects()
            .contains_key(&(bucket.to_string(), key.to_string()))
    }

    fn lock_buckets(&self) -> std::sync::MutexGuard<'_, BTreeSet<String>> {
        self.buckets.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_objects(&self) -> std::sync::MutexGuard<'_, BTreeMap<(String, String), Vec<u8>>> {
        self.objects.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StorageError> {
        self.lock_objects()
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
            .ok_or_else(|| StorageError::NotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            })
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Vec<u8>,
        _content_type: &str,
    ) -> Result<(), StorageError> {
        // ---
        if !self.lock_buckets().contains(bucket) {
            return Err(StorageError::backend(bucket, "bucket does not exist"));
        }
        self.lock_objects()
            .insert((bucket.to_string(), key.to_string()), body);
        Ok(())
    }

    async fn list_objects(&self, bucket: &str, prefix: &str) -> Result<Vec<String>, StorageError> {
        Ok(self
            .lock_objects()
            .keys()
            .filter(|(b, k)| b == bucket && k.starts_with(prefix))
            .map(|(_, k)| k.clone())
            .collect())
    }

    async fn ensure_bucket(&self, bucket: &str) -> Result<(), StorageError> {
        self.lock_buckets().insert(bucket.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[test]
    fn test_memory_store_requires_bucket_for_writes() {
        // ---
        let store = MemoryObjectStore::new();
        let err = tokio_test::block_on(store.put_object(MERGED_BUCKET, "a.csv", vec![1], "text/csv"))
            .unwrap_err();
        assert!(matches!(err, StorageError::Backend { .. }));

        tokio_test::block_on(ensure_buckets(&store)).unwrap();
        tokio_test::block_on(store.put_object(MERGED_BUCKET, "a.csv", vec![1], "text/csv")).unwrap();
        assert!(store.contains(MERGED_BUCKET, "a.csv"));
    }

    #[test]
    fn test_memory_store_lists_by_prefix() {
        // ---
        let store = MemoryObjectStore::new();
        store.insert("archive", "records/year=2023/b.csv.gz", b"b".to_vec());
        store.insert("archive", "records/year=2023/a.csv.gz", b"a".to_vec());
        store.insert("archive", "records/year=2022/c.csv.gz", b"c".to_vec());

        let keys = tokio_test::block_on(store.list_objects("archive", "records/year=2023/")).unwrap();
        assert_eq!(
            keys,
            vec!["records/year=2023/a.csv.gz", "records/year=2023/b.csv.gz"]
        );
    }

    #[test]
    fn test_memory_store_missing_object() {
        // ---
        let store = MemoryObjectStore::new();
        let err = tokio_test::block_on(store.get_object(NOAA_BUCKET, "nope.csv")).unwrap_err();
        assert_eq!(err.to_string(), "Object noaa-data/nope.csv not found");
    }
}
