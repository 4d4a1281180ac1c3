// ============================================================================
// Module: core/src/object_store.rs
// Description: S3-backed blob storage adapter (C3)
// ============================================================================

use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use backoff::{backoff::Backoff, ExponentialBackoff};
use chrono::Utc;
use invoice_shared::error::{Error, Result};
use tracing::{info, warn};

const GET_RETRY_ATTEMPTS: u32 = 5;
const GET_CONNECT_TIMEOUT_SECS: u64 = 60;

/// Upload kind segment of the key layout, spec §4.3/§6.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadKind {
    Sales,
    Purchases,
    Mappings,
}

impl UploadKind {
    fn segment(self) -> &'static str {
        match self {
            UploadKind::Sales => "sales",
            UploadKind::Purchases => "purchases",
            UploadKind::Mappings => "mappings",
        }
    }
}

/// Builds the immutable key layout: `{tenant}/{kind}/{YYYYMMDD_HHMMSS}_{name}`.
pub fn build_key(tenant: &str, kind: UploadKind, original_name: &str) -> String {
    let timestamp = Utc::now().format("%Y%m%d_%H%M%S");
    format!("{}/{}/{}_{}", tenant, kind.segment(), timestamp, original_name)
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(&self, bucket: &str, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<()>;
    async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>>;
    async fn delete(&self, bucket: &str, key: &str) -> Result<()>;
    async fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<String>>;
    fn public_url(&self, bucket: &str, key: &str) -> String;
}

/// `aws-sdk-s3`-backed implementation, grounded on the teacher's
/// connection-pool-as-a-struct convention (`shared::database::connection`).
pub struct S3ObjectStore {
    client: Client,
    base_url: String,
}

impl S3ObjectStore {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    pub async fn from_env(base_url: impl Into<String>) -> Self {
        let shared_config = aws_config::load_from_env().await;
        let client = Client::new(&shared_config);
        Self::new(client, base_url)
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn put(&self, bucket: &str, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<()> {
        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(ByteStream::from(bytes))
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| Error::ObjectStore(format!("put {key} failed: {e}")))?;
        Ok(())
    }

    /// Retries with exponential back-off up to `GET_RETRY_ATTEMPTS`, spec
    /// §4.3 ("not-yet-visible" eventual-consistency window).
    async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>> {
        let mut backoff = ExponentialBackoff {
            initial_interval: Duration::from_millis(200),
            max_interval: Duration::from_secs(GET_CONNECT_TIMEOUT_SECS),
            max_elapsed_time: Some(Duration::from_secs(GET_CONNECT_TIMEOUT_SECS)),
            ..ExponentialBackoff::default()
        };

        let mut attempt = 0;
        loop {
            attempt += 1;
            let result = self.client.get_object().bucket(bucket).key(key).send().await;

            match result {
                Ok(output) => {
                    let bytes = output
                        .body
                        .collect()
                        .await
                        .map_err(|e| Error::ObjectStore(format!("read {key} failed: {e}")))?
                        .into_bytes();
                    return Ok(bytes.to_vec());
                }
                Err(e) if attempt < GET_RETRY_ATTEMPTS => {
                    let wait = backoff.next_backoff().unwrap_or(Duration::from_secs(1));
                    warn!(key, attempt, error = %e, "object not yet visible, retrying");
                    tokio::time::sleep(wait).await;
                }
                Err(e) => {
                    return Err(Error::ObjectStore(format!(
                        "get {key} failed after {attempt} attempts: {e}"
                    )));
                }
            }
        }
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| Error::ObjectStore(format!("delete {key} failed: {e}")))?;
        Ok(())
    }

    async fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        let mut continuation_token = None;

        loop {
            let mut request = self.client.list_objects_v2().bucket(bucket).prefix(prefix);
            if let Some(token) = &continuation_token {
                request = request.continuation_token(token);
            }

            let output = request
                .send()
                .await
                .map_err(|e| Error::ObjectStore(format!("list {prefix} failed: {e}")))?;

            for object in output.contents() {
                if let Some(key) = object.key() {
                    keys.push(key.to_string());
                }
            }

            match output.next_continuation_token() {
                Some(token) => continuation_token = Some(token.to_string()),
                None => break,
            }
        }

        info!(prefix, count = keys.len(), "listed objects");
        Ok(keys)
    }

    /// Public URL format per spec §4.3: `{configured_base}/{key}` (bucket
    /// name excluded from the path).
    fn public_url(&self, bucket: &str, key: &str) -> String {
        let _ = bucket;
        format!("{}/{}", self.base_url.trim_end_matches('/'), key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_layout_matches_spec() {
        let key = build_key("acme", UploadKind::Sales, "receipt.jpg");
        assert!(key.starts_with("acme/sales/"));
        assert!(key.ends_with("_receipt.jpg"));
    }

    #[test]
    fn public_url_excludes_bucket_name() {
        struct Dummy;
        #[async_trait]
        impl ObjectStore for Dummy {
            async fn put(&self, _: &str, _: &str, _: Vec<u8>, _: &str) -> Result<()> {
                Ok(())
            }
            async fn get(&self, _: &str, _: &str) -> Result<Vec<u8>> {
                Ok(vec![])
            }
            async fn delete(&self, _: &str, _: &str) -> Result<()> {
                Ok(())
            }
            async fn list(&self, _: &str, _: &str) -> Result<Vec<String>> {
                Ok(vec![])
            }
            fn public_url(&self, _bucket: &str, key: &str) -> String {
                format!("https://cdn.example.com/{key}")
            }
        }

        let store = Dummy;
        let url = store.public_url("some-bucket", "acme/sales/file.jpg");
        assert!(!url.contains("some-bucket"));
        assert_eq!(url, "https://cdn.example.com/acme/sales/file.jpg");
    }
}
