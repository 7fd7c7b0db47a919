//! S3-compatible storage backend.
//!
//! Works against AWS S3 and the usual S3-compatible services (Backblaze B2,
//! Tigris, MinIO). Credentials are passed in explicitly from configuration.
//!
//! Failures are classified so the publisher can tell a transient problem
//! (timeouts, dropped connections, 5xx, throttling) from one that retrying
//! will not fix (403 and friends).

use crate::{
    StorageBackend,
    error::{Error, ErrorKind, Result},
    validate_path,
};
use async_trait::async_trait;
use aws_sdk_s3::{
    Client,
    config::{BehaviorVersion, Credentials, Region, http::HttpResponse, retry::RetryConfig},
    error::{DisplayErrorContext, SdkError},
    primitives::ByteStream,
};
use exn::{OptionExt, ResultExt};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Generous default for concurrent S3 requests.
const DEFAULT_CONCURRENT_REQUESTS: usize = 32;
const CONTENT_TYPE_PDF: &str = "application/pdf";
const CONTENT_TYPE_JSON: &str = "application/json";

/// S3-compatible storage backend.
///
/// Stores objects in a bucket, optionally under a key prefix. All keys are
/// relative to the prefix.
///
/// # Examples
///
/// ```no_run
/// use songbook_storage::backend::S3Backend;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let backend = S3Backend::new(
///     "songbooks",
///     "parish-songbooks",
///     Some("published/".to_string()),
///     "eu-central-1",
///     None::<String>,
///     "access_key_id",
///     "secret_access_key",
/// ).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct S3Backend {
    name: String,
    client: Client,
    bucket: String,
    prefix: Option<String>,
    /// Rate limiter for concurrent S3 requests.
    rate_limiter: Arc<Semaphore>,
}

impl S3Backend {
    /// Create a new S3 storage backend.
    ///
    /// # Arguments
    /// * `name` - A name for this backend (used in logging)
    /// * `bucket` - S3 bucket name
    /// * `prefix` - Optional key prefix (acts as virtual directory)
    /// * `region` - AWS region or provider-specific region
    /// * `endpoint` - Custom endpoint URL for S3-compatible services
    /// * `key_id` - Access key ID
    /// * `key_secret` - Secret access key
    pub async fn new(
        name: impl Into<String>,
        bucket: impl Into<String>,
        prefix: Option<String>,
        region: impl Into<String>,
        endpoint: Option<impl Into<String>>,
        key_id: impl Into<String>,
        key_secret: impl Into<String>,
    ) -> Result<Self> {
        let prefix = prefix.map(validate_path).transpose()?.map(|p| p.to_string_lossy().into_owned());
        let credentials = Credentials::new(key_id, key_secret, None, None, "songbook-config");
        let mut config_builder = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .credentials_provider(credentials)
            .region(Region::new(region.into()))
            // 1 initial attempt + 3 retries with exponential backoff.
            .retry_config(RetryConfig::standard().with_max_attempts(4))
            // Path-style addressing is what S3-compatible services expect.
            .force_path_style(true);
        if let Some(endpoint_url) = endpoint {
            config_builder = config_builder.endpoint_url(endpoint_url);
        }
        Ok(Self {
            name: name.into(),
            client: Client::from_conf(config_builder.build()),
            bucket: bucket.into(),
            prefix,
            rate_limiter: Arc::new(Semaphore::new(DEFAULT_CONCURRENT_REQUESTS)),
        })
    }

    /// Construct the full S3 key from a relative path.
    fn full_key(&self, path: &Path) -> Result<String> {
        let validated = validate_path(path)?;
        let key = validated.to_str().ok_or_raise(|| ErrorKind::InvalidPath(validated.clone()))?;
        Ok(join_key(self.prefix.as_deref(), key))
    }

    /// Acquire a rate limiter permit before making an S3 API call.
    async fn acquire_permit(&self) -> Result<OwnedSemaphorePermit> {
        self.rate_limiter
            .clone()
            .acquire_owned()
            .await
            .or_raise(|| ErrorKind::BackendError("S3 request limiter closed".to_string()))
    }

    /// Sort an SDK failure into the storage error taxonomy.
    fn map_sdk_error<E>(err: SdkError<E, HttpResponse>, path: &Path) -> Error
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        let message = DisplayErrorContext(&err).to_string();
        let kind = match &err {
            SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) | SdkError::ResponseError(_) => {
                ErrorKind::Network(message)
            },
            SdkError::ServiceError(_) => {
                let status = err.raw_response().map(|r| r.status().as_u16());
                classify_status(status, path, message)
            },
            _ => ErrorKind::BackendError(message),
        };
        Error::from(kind)
    }
}

fn join_key(prefix: Option<&str>, key: &str) -> String {
    match prefix {
        Some(prefix) => format!("{}/{}", prefix.trim_end_matches('/'), key),
        None => key.to_string(),
    }
}

fn classify_status(status: Option<u16>, path: &Path, message: String) -> ErrorKind {
    match status {
        Some(401 | 403) => ErrorKind::PermissionDenied(path.to_path_buf()),
        Some(404) => ErrorKind::NotFound(path.to_path_buf()),
        Some(429 | 503) => ErrorKind::Throttled(message),
        Some(s) if s >= 500 => ErrorKind::Network(message),
        _ => ErrorKind::BackendError(message),
    }
}

fn content_type(path: &Path) -> Option<&'static str> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("pdf") => Some(CONTENT_TYPE_PDF),
        Some("json") => Some(CONTENT_TYPE_JSON),
        _ => None,
    }
}

#[async_trait]
impl StorageBackend for S3Backend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn exists(&self, path: &Path) -> Result<bool> {
        let key = self.full_key(path)?;
        let _permit = self.acquire_permit().await?;
        match self.client.head_object().bucket(&self.bucket).key(&key).send().await {
            Ok(_) => Ok(true),
            Err(err) if err.as_service_error().is_some_and(|e| e.is_not_found()) => Ok(false),
            Err(err) => Err(Self::map_sdk_error(err, path)),
        }
    }

    async fn read(&self, path: &Path) -> Result<Vec<u8>> {
        let key = self.full_key(path)?;
        let _permit = self.acquire_permit().await?;
        let output = match self.client.get_object().bucket(&self.bucket).key(&key).send().await {
            Ok(output) => output,
            Err(err) if err.as_service_error().is_some_and(|e| e.is_no_such_key()) => {
                exn::bail!(ErrorKind::NotFound(path.to_path_buf()))
            },
            Err(err) => return Err(Self::map_sdk_error(err, path)),
        };
        let body = output.body.collect().await.or_raise(|| ErrorKind::Network(format!("reading body of {key}")))?;
        Ok(body.into_bytes().to_vec())
    }

    async fn write(&self, path: &Path, data: &[u8]) -> Result<()> {
        let key = self.full_key(path)?;
        let _permit = self.acquire_permit().await?;
        // PutObject is atomic: the object either appears whole or not at all.
        let mut request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(ByteStream::from(data.to_vec()));
        if let Some(content_type) = content_type(path) {
            request = request.content_type(content_type);
        }
        request.send().await.map_err(|err| Self::map_sdk_error(err, path))?;
        tracing::debug!(backend = %self.name, bucket = %self.bucket, key = %key, bytes = data.len(), "Uploaded object");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_key_without_prefix() {
        assert_eq!(join_key(None, "songbooks/ab/ab12.pdf"), "songbooks/ab/ab12.pdf");
    }

    #[test]
    fn test_join_key_with_prefix() {
        assert_eq!(join_key(Some("published"), "ab/ab12.pdf"), "published/ab/ab12.pdf");
        assert_eq!(join_key(Some("published/"), "ab/ab12.pdf"), "published/ab/ab12.pdf");
    }

    #[test]
    fn test_status_classification() {
        let path = Path::new("ab12.pdf");
        assert!(matches!(classify_status(Some(403), path, String::new()), ErrorKind::PermissionDenied(_)));
        assert!(matches!(classify_status(Some(401), path, String::new()), ErrorKind::PermissionDenied(_)));
        assert!(matches!(classify_status(Some(404), path, String::new()), ErrorKind::NotFound(_)));
        assert!(matches!(classify_status(Some(429), path, String::new()), ErrorKind::Throttled(_)));
        assert!(matches!(classify_status(Some(503), path, String::new()), ErrorKind::Throttled(_)));
        assert!(matches!(classify_status(Some(500), path, String::new()), ErrorKind::Network(_)));
        assert!(matches!(classify_status(Some(400), path, String::new()), ErrorKind::BackendError(_)));
        assert!(!classify_status(Some(403), path, String::new()).is_retryable());
        assert!(classify_status(Some(503), path, String::new()).is_retryable());
    }

    #[test]
    fn test_content_types() {
        assert_eq!(content_type(Path::new("a/b.pdf")), Some(CONTENT_TYPE_PDF));
        assert_eq!(content_type(Path::new("a/b.json")), Some(CONTENT_TYPE_JSON));
        assert_eq!(content_type(Path::new("a/b")), None);
    }
}
