//! Object storage client (§6.4): a `reqwest`-based R2/S3-compatible `PUT`/`GET`
//! implementation behind `BaseObjectStorage`, plus an in-memory test double.
//! Presigned-URL / SigV4 signing mechanics are out of scope for the core
//! (§1) — this client assumes a pre-authorized endpoint (e.g. an R2 bucket
//! reachable via a bearer token or IP allowlist) and focuses on the
//! put/get contract the workers rely on.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;

use crate::kernel::traits::BaseObjectStorage;

#[derive(Clone)]
pub struct HttpObjectStorage {
    http: reqwest::Client,
    endpoint: String,
    bucket: String,
    access_key: String,
    secret_key: String,
}

impl HttpObjectStorage {
    pub fn new(endpoint: impl Into<String>, bucket: impl Into<String>, access_key: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: endpoint.into(),
            bucket: bucket.into(),
            access_key: access_key.into(),
            secret_key: secret_key.into(),
        }
    }

    fn object_url(&self, key: &str) -> String {
        format!("{}/{}/{}", self.endpoint, self.bucket, key)
    }
}

#[async_trait]
impl BaseObjectStorage for HttpObjectStorage {
    async fn put_object(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<()> {
        let response = self
            .http
            .put(self.object_url(key))
            .header("content-type", content_type)
            .header("x-access-key", &self.access_key)
            .header("x-secret-key", &self.secret_key)
            .body(bytes)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(anyhow!("object storage put failed: {}", response.status()));
        }
        Ok(())
    }

    async fn get_object_bytes(&self, key: &str) -> Result<Vec<u8>> {
        let response = self
            .http
            .get(self.object_url(key))
            .header("x-access-key", &self.access_key)
            .header("x-secret-key", &self.secret_key)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(anyhow!("object storage get failed: {}", response.status()));
        }
        Ok(response.bytes().await?.to_vec())
    }
}

/// In-memory double for tests, mirroring the teacher's `TestNats` pattern.
#[derive(Default)]
pub struct InMemoryObjectStorage {
    objects: RwLock<HashMap<String, Vec<u8>>>,
}

impl InMemoryObjectStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(&self, key: impl Into<String>, bytes: Vec<u8>) {
        self.objects.write().unwrap().insert(key.into(), bytes);
    }
}

#[async_trait]
impl BaseObjectStorage for InMemoryObjectStorage {
    async fn put_object(&self, key: &str, bytes: Vec<u8>, _content_type: &str) -> Result<()> {
        self.objects.write().unwrap().insert(key.to_string(), bytes);
        Ok(())
    }

    async fn get_object_bytes(&self, key: &str) -> Result<Vec<u8>> {
        self.objects
            .read()
            .unwrap()
            .get(key)
            .cloned()
            .ok_or_else(|| anyhow!("no such object: {key}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn in_memory_round_trips() {
        let storage = InMemoryObjectStorage::new();
        storage.put_object("resumes/a.txt", b"hi".to_vec(), "text/plain").await.unwrap();
        let bytes = storage.get_object_bytes("resumes/a.txt").await.unwrap();
        assert_eq!(bytes, b"hi");
    }

    #[tokio::test]
    async fn in_memory_missing_key_errors() {
        let storage = InMemoryObjectStorage::new();
        assert!(storage.get_object_bytes("nope").await.is_err());
    }
}
