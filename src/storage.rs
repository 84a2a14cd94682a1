//! Object storage: where source PDFs come from and annotated PDFs go.
//!
//! The pipeline only needs two capabilities, fetch and put, expressed by the
//! [`ObjectStore`] trait. Three stores ship with the crate:
//!
//! | Store | Backing | Use |
//! |-------|---------|-----|
//! | [`LocalObjectStore`] | `root/bucket/key` on disk | CLI, local runs |
//! | [`HttpObjectStore`] | `GET`/`PUT {endpoint}/{bucket}/{key}` | S3-compatible gateways, presigned hosts |
//! | [`MemoryObjectStore`] | in-process map | embedding, tests |
//!
//! Stores never retry. A failed call surfaces as
//! [`HighlightError::StorageFailed`] naming the operation and location.

use crate::error::{HighlightError, StorageOperation};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::io::Write;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// A `(bucket, key)` pair identifying one object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectLocation {
    pub bucket: String,
    pub key: String,
}

impl ObjectLocation {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }

    /// Same bucket, key rewritten by [`derive_output_key`].
    pub fn with_suffix(&self, suffix: &str) -> Self {
        Self {
            bucket: self.bucket.clone(),
            key: derive_output_key(&self.key, suffix),
        }
    }
}

impl fmt::Display for ObjectLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.bucket, self.key)
    }
}

/// Bytes plus the content type the store declared, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
}

/// Fetch and persist capabilities used by the pipeline.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn fetch(&self, location: &ObjectLocation) -> Result<StoredObject, HighlightError>;

    async fn put(
        &self,
        location: &ObjectLocation,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), HighlightError>;
}

/// Insert `suffix` before the extension of the final key segment.
///
/// ```rust
/// use edgequake_pdf_highlight::storage::derive_output_key;
///
/// assert_eq!(derive_output_key("docs/a.pdf", "_annotated"), "docs/a_annotated.pdf");
/// assert_eq!(derive_output_key("v1.2/report", "_annotated"), "v1.2/report_annotated");
/// ```
pub fn derive_output_key(key: &str, suffix: &str) -> String {
    let (dir, name) = match key.rfind('/') {
        Some(i) => key.split_at(i + 1),
        None => ("", key),
    };
    match name.rfind('.') {
        // A leading dot is a hidden name, not an extension.
        Some(i) if i > 0 => format!("{dir}{}{suffix}{}", &name[..i], &name[i..]),
        _ => format!("{dir}{name}{suffix}"),
    }
}

fn storage_error(
    operation: StorageOperation,
    location: &ObjectLocation,
    reason: impl fmt::Display,
) -> HighlightError {
    HighlightError::StorageFailed {
        operation,
        location: location.to_string(),
        reason: reason.to_string(),
    }
}

// ── Filesystem ───────────────────────────────────────────────────────────

/// Objects stored as `root/bucket/key` files.
#[derive(Debug, Clone)]
pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a location to a path under `root`. Keys cannot escape it.
    pub fn path_for(
        &self,
        location: &ObjectLocation,
        operation: StorageOperation,
    ) -> Result<PathBuf, HighlightError> {
        let relative = Path::new(&location.bucket).join(&location.key);
        let escapes = location.bucket.is_empty()
            || location.key.is_empty()
            || relative
                .components()
                .any(|c| !matches!(c, Component::Normal(_)));
        if escapes {
            return Err(storage_error(
                operation,
                location,
                "bucket and key must be non-empty relative paths",
            ));
        }
        Ok(self.root.join(relative))
    }
}

/// Content type implied by a file extension.
fn content_type_for(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "pdf" => Some("application/pdf"),
        "json" => Some("application/json"),
        "txt" => Some("text/plain"),
        "md" => Some("text/markdown"),
        "html" | "htm" => Some("text/html"),
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "zip" => Some("application/zip"),
        _ => None,
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn fetch(&self, location: &ObjectLocation) -> Result<StoredObject, HighlightError> {
        let path = self.path_for(location, StorageOperation::Fetch)?;
        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|e| storage_error(StorageOperation::Fetch, location, e))?;
        debug!("Read {} bytes from {}", bytes.len(), path.display());
        Ok(StoredObject {
            bytes,
            content_type: content_type_for(&path).map(str::to_string),
        })
    }

    async fn put(
        &self,
        location: &ObjectLocation,
        bytes: Vec<u8>,
        _content_type: &str,
    ) -> Result<(), HighlightError> {
        let path = self.path_for(location, StorageOperation::Put)?;
        let dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.root.clone());
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| storage_error(StorageOperation::Put, location, e))?;

        // Write to a sibling temp file and rename so readers never see a
        // partial object.
        let target = path.clone();
        let len = bytes.len();
        tokio::task::spawn_blocking(move || -> std::io::Result<()> {
            let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
            tmp.write_all(&bytes)?;
            tmp.as_file().sync_all()?;
            tmp.persist(&target).map_err(|e| e.error)?;
            Ok(())
        })
        .await
        .map_err(|e| HighlightError::Internal(format!("Write task panicked: {}", e)))?
        .map_err(|e| storage_error(StorageOperation::Put, location, e))?;

        info!("Wrote {} bytes to {}", len, path.display());
        Ok(())
    }
}

// ── HTTP ─────────────────────────────────────────────────────────────────

/// Objects addressed as `{endpoint}/{bucket}/{key}` over plain HTTP verbs.
#[derive(Debug, Clone)]
pub struct HttpObjectStore {
    endpoint: reqwest::Url,
    client: reqwest::Client,
}

impl HttpObjectStore {
    /// Default request timeout.
    pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

    pub fn new(endpoint: impl Into<String>) -> Result<Self, HighlightError> {
        Self::with_timeout(endpoint, Duration::from_secs(Self::DEFAULT_TIMEOUT_SECS))
    }

    pub fn with_timeout(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, HighlightError> {
        let endpoint = endpoint.into();
        let endpoint = reqwest::Url::parse(&endpoint)
            .map_err(|e| HighlightError::InvalidConfig(format!("Endpoint '{}': {}", endpoint, e)))?;
        if endpoint.cannot_be_a_base() {
            return Err(HighlightError::InvalidConfig(format!(
                "Endpoint '{}' cannot carry a path",
                endpoint
            )));
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| HighlightError::InvalidConfig(format!("HTTP client: {}", e)))?;
        Ok(Self { endpoint, client })
    }

    /// `{endpoint}/{bucket}/{key}` with every bucket and key segment
    /// percent-encoded, so `#`, `?` and spaces stay part of the path.
    pub fn url_for(&self, location: &ObjectLocation) -> reqwest::Url {
        let mut url = self.endpoint.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .push(&location.bucket)
                .extend(location.key.trim_start_matches('/').split('/'));
        }
        url
    }
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
    async fn fetch(&self, location: &ObjectLocation) -> Result<StoredObject, HighlightError> {
        let url = self.url_for(location);
        info!("Fetching PDF from: {}", url);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| storage_error(StorageOperation::Fetch, location, e))?;

        if !response.status().is_success() {
            return Err(storage_error(
                StorageOperation::Fetch,
                location,
                format!("HTTP {}", response.status()),
            ));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = response
            .bytes()
            .await
            .map_err(|e| storage_error(StorageOperation::Fetch, location, e))?;

        Ok(StoredObject {
            bytes: bytes.to_vec(),
            content_type,
        })
    }

    async fn put(
        &self,
        location: &ObjectLocation,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), HighlightError> {
        let url = self.url_for(location);
        let len = bytes.len();
        let response = self
            .client
            .put(url.clone())
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(bytes)
            .send()
            .await
            .map_err(|e| storage_error(StorageOperation::Put, location, e))?;

        if !response.status().is_success() {
            return Err(storage_error(
                StorageOperation::Put,
                location,
                format!("HTTP {}", response.status()),
            ));
        }
        info!("Uploaded {} bytes to {}", len, url);
        Ok(())
    }
}

// ── In-memory ────────────────────────────────────────────────────────────

/// Objects kept in a process-local map.
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    objects: Mutex<HashMap<ObjectLocation, StoredObject>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(
        &self,
        location: ObjectLocation,
        bytes: impl Into<Vec<u8>>,
        content_type: Option<&str>,
    ) {
        self.objects.lock().await.insert(
            location,
            StoredObject {
                bytes: bytes.into(),
                content_type: content_type.map(str::to_string),
            },
        );
    }

    pub async fn get(&self, location: &ObjectLocation) -> Option<StoredObject> {
        self.objects.lock().await.get(location).cloned()
    }

    pub async fn len(&self) -> usize {
        self.objects.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.objects.lock().await.is_empty()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn fetch(&self, location: &ObjectLocation) -> Result<StoredObject, HighlightError> {
        self.get(location)
            .await
            .ok_or_else(|| storage_error(StorageOperation::Fetch, location, "no such object"))
    }

    async fn put(
        &self,
        location: &ObjectLocation,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), HighlightError> {
        self.insert(location.clone(), bytes, Some(content_type)).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_bytes, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn output_key_inserts_suffix_before_extension() {
        assert_eq!(derive_output_key("docs/a.pdf", "_annotated"), "docs/a_annotated.pdf");
        assert_eq!(derive_output_key("a.pdf", "_x"), "a_x.pdf");
        assert_eq!(derive_output_key("archive.tar.pdf", "_x"), "archive.tar_x.pdf");
    }

    #[test]
    fn output_key_without_extension_appends() {
        assert_eq!(derive_output_key("docs/report", "_annotated"), "docs/report_annotated");
        assert_eq!(derive_output_key("v1.2/report", "_annotated"), "v1.2/report_annotated");
        assert_eq!(derive_output_key("docs/.hidden", "_a"), "docs/.hidden_a");
    }

    #[test]
    fn location_display() {
        let loc = ObjectLocation::new("reports", "q3/summary.pdf");
        assert_eq!(loc.to_string(), "reports/q3/summary.pdf");
        assert_eq!(loc.with_suffix("_annotated").key, "q3/summary_annotated.pdf");
    }

    #[tokio::test]
    async fn local_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalObjectStore::new(dir.path());
        let loc = ObjectLocation::new("bucket", "nested/doc.pdf");

        store.put(&loc, b"%PDF-1.4".to_vec(), "application/pdf").await.unwrap();
        assert!(dir.path().join("bucket/nested/doc.pdf").exists());

        let obj = store.fetch(&loc).await.unwrap();
        assert_eq!(obj.bytes, b"%PDF-1.4");
        assert_eq!(obj.content_type.as_deref(), Some("application/pdf"));
    }

    #[tokio::test]
    async fn local_store_overwrites_existing_object() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalObjectStore::new(dir.path());
        let loc = ObjectLocation::new("b", "doc.pdf");
        store.put(&loc, b"first".to_vec(), "application/pdf").await.unwrap();
        store.put(&loc, b"second".to_vec(), "application/pdf").await.unwrap();
        assert_eq!(store.fetch(&loc).await.unwrap().bytes, b"second");
    }

    #[tokio::test]
    async fn local_store_rejects_escaping_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalObjectStore::new(dir.path());
        let err = store
            .fetch(&ObjectLocation::new("b", "../../etc/passwd"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            HighlightError::StorageFailed {
                operation: StorageOperation::Fetch,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn local_store_missing_object_is_storage_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalObjectStore::new(dir.path());
        let err = store.fetch(&ObjectLocation::new("b", "nope.pdf")).await.unwrap_err();
        assert!(err.is_retryable());
        assert!(err.to_string().contains("b/nope.pdf"));
    }

    #[tokio::test]
    async fn memory_store_keeps_content_type() {
        let store = MemoryObjectStore::new();
        let loc = ObjectLocation::new("b", "k.pdf");
        store.put(&loc, vec![1, 2, 3], "application/pdf").await.unwrap();
        let obj = store.fetch(&loc).await.unwrap();
        assert_eq!(obj.content_type.as_deref(), Some("application/pdf"));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn http_store_fetch_reads_content_type() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/docs/in/a.pdf"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "application/pdf")
                    .set_body_bytes(b"%PDF-1.7".to_vec()),
            )
            .mount(&server)
            .await;

        let store = HttpObjectStore::new(server.uri()).unwrap();
        let obj = store.fetch(&ObjectLocation::new("docs", "in/a.pdf")).await.unwrap();
        assert_eq!(obj.bytes, b"%PDF-1.7");
        assert_eq!(obj.content_type.as_deref(), Some("application/pdf"));
    }

    #[tokio::test]
    async fn http_store_put_sends_body_and_type() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/docs/a_annotated.pdf"))
            .and(header("content-type", "application/pdf"))
            .and(body_bytes(b"%PDF-out".to_vec()))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let store = HttpObjectStore::new(format!("{}/", server.uri())).unwrap();
        store
            .put(
                &ObjectLocation::new("docs", "a_annotated.pdf"),
                b"%PDF-out".to_vec(),
                "application/pdf",
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn http_store_encodes_reserved_characters_in_keys() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/docs/reports/"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"%PDF-WRONG".to_vec()))
            .expect(0)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/docs/reports/%231%3F%20v2.pdf"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"%PDF-RIGHT".to_vec()))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/docs/reports/%231%3F%20v2_annotated.pdf"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let store = HttpObjectStore::new(server.uri()).unwrap();
        let source = ObjectLocation::new("docs", "reports/#1? v2.pdf");
        let obj = store.fetch(&source).await.unwrap();
        assert_eq!(obj.bytes, b"%PDF-RIGHT");

        store
            .put(&source.with_suffix("_annotated"), b"%PDF-out".to_vec(), "application/pdf")
            .await
            .unwrap();
    }

    #[test]
    fn http_store_keeps_endpoint_base_path() {
        let store = HttpObjectStore::new("http://objects.local/base/").unwrap();
        let url = store.url_for(&ObjectLocation::new("my bucket", "/a/b c.pdf"));
        assert_eq!(url.as_str(), "http://objects.local/base/my%20bucket/a/b%20c.pdf");
    }

    #[test]
    fn http_store_rejects_unparseable_endpoint() {
        let err = HttpObjectStore::new("not a url").unwrap_err();
        assert!(matches!(err, HighlightError::InvalidConfig(_)));
    }

    #[tokio::test]
    async fn http_store_error_status_is_storage_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let store = HttpObjectStore::new(server.uri()).unwrap();
        let err = store.fetch(&ObjectLocation::new("b", "k.pdf")).await.unwrap_err();
        match err {
            HighlightError::StorageFailed { operation, reason, .. } => {
                assert_eq!(operation, StorageOperation::Fetch);
                assert!(reason.contains("404"), "got: {reason}");
            }
            other => panic!("expected storage failure, got {other:?}"),
        }
    }
}
