//! Raw content retrieval for external references

use async_trait::async_trait;
use reqwest::{Client, Url};
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncReadExt;

/// Failure of a single fetch attempt
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("request timed out")]
    Timeout,

    #[error("HTTP status {0}")]
    Status(u16),

    #[error("connection failed: {0}")]
    Connection(String),

    #[error("read failed: {0}")]
    Io(String),

    #[error("unsupported scheme '{0}'")]
    UnsupportedScheme(String),

    #[error("body exceeds the {limit} byte limit")]
    TooLarge { limit: u64 },
}

impl FetchError {
    /// Whether another attempt may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Timeout | FetchError::Connection(_) => true,
            FetchError::Status(status) => *status == 429 || *status >= 500,
            FetchError::Io(_) | FetchError::UnsupportedScheme(_) | FetchError::TooLarge { .. } => {
                false
            }
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout
        } else if let Some(status) = err.status() {
            FetchError::Status(status.as_u16())
        } else {
            FetchError::Connection(err.to_string())
        }
    }
}

/// Retrieves the text behind a URL (without its fragment)
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &Url) -> Result<String, FetchError>;
}

/// `http`/`https` via reqwest, `file` via tokio
///
/// Bodies are read incrementally and abandoned as soon as they pass
/// `max_bytes`.
pub struct DefaultFetcher {
    client: Client,
    timeout: Duration,
    max_bytes: u64,
}

impl DefaultFetcher {
    pub fn new(timeout: Duration, max_bytes: u64) -> Self {
        Self {
            client: Client::new(),
            timeout,
            max_bytes,
        }
    }

    async fn fetch_http(&self, url: &Url) -> Result<String, FetchError> {
        let mut response = self
            .client
            .get(url.clone())
            .timeout(self.timeout)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }
        if response.content_length().is_some_and(|len| len > self.max_bytes) {
            return Err(self.too_large());
        }

        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            if (body.len() + chunk.len()) as u64 > self.max_bytes {
                return Err(self.too_large());
            }
            body.extend_from_slice(&chunk);
        }
        String::from_utf8(body).map_err(|e| FetchError::Io(format!("{}: {}", url, e)))
    }

    async fn fetch_file(&self, url: &Url) -> Result<String, FetchError> {
        let path = url
            .to_file_path()
            .map_err(|_| FetchError::Io(format!("not a local file URL: {}", url)))?;
        let io_error = |e: std::io::Error| FetchError::Io(format!("{}: {}", path.display(), e));

        let file = tokio::fs::File::open(&path).await.map_err(io_error)?;
        let size = file.metadata().await.map_err(io_error)?.len();
        if size > self.max_bytes {
            return Err(self.too_large());
        }

        // the file may grow between the size check and the read
        let mut body = String::new();
        file.take(self.max_bytes.saturating_add(1))
            .read_to_string(&mut body)
            .await
            .map_err(io_error)?;
        if body.len() as u64 > self.max_bytes {
            return Err(self.too_large());
        }
        Ok(body)
    }

    fn too_large(&self) -> FetchError {
        FetchError::TooLarge {
            limit: self.max_bytes,
        }
    }
}

#[async_trait]
impl Fetcher for DefaultFetcher {
    async fn fetch(&self, url: &Url) -> Result<String, FetchError> {
        match url.scheme() {
            "http" | "https" => self.fetch_http(url).await,
            "file" => self.fetch_file(url).await,
            other => Err(FetchError::UnsupportedScheme(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(FetchError::Timeout.is_transient());
        assert!(FetchError::Connection("reset".into()).is_transient());
        assert!(FetchError::Status(503).is_transient());
        assert!(FetchError::Status(429).is_transient());
        assert!(!FetchError::Status(404).is_transient());
        assert!(!FetchError::Io("missing".into()).is_transient());
        assert!(!FetchError::TooLarge { limit: 16 }.is_transient());
    }

    #[tokio::test]
    async fn test_reads_file_urls() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pet.json");
        std::fs::write(&path, r#"{"type": "object"}"#).unwrap();

        let fetcher = DefaultFetcher::new(Duration::from_secs(1), 1024);
        let url = Url::from_file_path(&path).unwrap();
        let body = fetcher.fetch(&url).await.unwrap();
        assert!(body.contains("object"));

        let missing = Url::from_file_path(dir.path().join("nope.json")).unwrap();
        assert!(matches!(
            fetcher.fetch(&missing).await,
            Err(FetchError::Io(_))
        ));
    }

    #[tokio::test]
    async fn test_rejects_unknown_scheme() {
        let fetcher = DefaultFetcher::new(Duration::from_secs(1), 1024);
        let url = Url::parse("ftp://example.com/spec.json").unwrap();
        assert_eq!(
            fetcher.fetch(&url).await,
            Err(FetchError::UnsupportedScheme("ftp".to_string()))
        );
    }

    #[tokio::test]
    async fn test_file_over_limit_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.json");
        std::fs::write(&path, format!(r#"{{"padding": "{}"}}"#, "x".repeat(4096))).unwrap();

        let fetcher = DefaultFetcher::new(Duration::from_secs(1), 1024);
        let url = Url::from_file_path(&path).unwrap();
        assert_eq!(
            fetcher.fetch(&url).await,
            Err(FetchError::TooLarge { limit: 1024 })
        );
    }
}
