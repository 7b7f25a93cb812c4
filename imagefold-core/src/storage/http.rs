//! Plain HTTP(S) download client
//!
//! Unauthenticated GETs with reqwest, streamed to disk chunk by chunk so
//! archive size does not bound memory.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::error::{ImageFoldError, Result};

/// Configuration for the HTTP client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Connection timeout in seconds
    pub connect_timeout_secs: u64,
    /// Whole-request timeout in seconds
    pub request_timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 10,
            request_timeout_secs: 300,
        }
    }
}

/// What a completed download wrote
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownloadSummary {
    /// Bytes written to disk
    pub bytes: u64,
    /// CRC32C of the written bytes
    pub crc32c: u32,
}

/// HTTP client using reqwest
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    /// Create a new HTTP client
    pub fn new(config: &HttpConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()
            .map_err(|e| ImageFoldError::Internal {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self { client })
    }

    async fn send(&self, url: &str) -> Result<reqwest::Response> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| acquisition_error(url, format!("request failed: {}", e)))?;

        if !resp.status().is_success() {
            return Err(acquisition_error(url, format!("status {}", resp.status())));
        }

        Ok(resp)
    }

    /// Stream a body into `dest`, creating parent directories.
    ///
    /// A failed download leaves whatever was written so far at `dest`.
    pub async fn download_to_file(&self, url: &str, dest: &Path) -> Result<DownloadSummary> {
        let mut resp = self.send(url).await?;

        if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                acquisition_error(url, format!("cannot create {}: {}", parent.display(), e))
            })?;
        }

        let mut file = tokio::fs::File::create(dest).await.map_err(|e| {
            acquisition_error(url, format!("cannot create {}: {}", dest.display(), e))
        })?;

        let mut summary = DownloadSummary { bytes: 0, crc32c: 0 };
        while let Some(chunk) = resp
            .chunk()
            .await
            .map_err(|e| acquisition_error(url, format!("failed to read body: {}", e)))?
        {
            file.write_all(&chunk).await.map_err(|e| {
                acquisition_error(url, format!("write to {} failed: {}", dest.display(), e))
            })?;
            summary.crc32c = crc32c::crc32c_append(summary.crc32c, &chunk);
            summary.bytes += chunk.len() as u64;
        }

        file.flush().await.map_err(|e| {
            acquisition_error(url, format!("flush of {} failed: {}", dest.display(), e))
        })?;

        debug!("Downloaded {} bytes from {} to {}", summary.bytes, url, dest.display());
        Ok(summary)
    }
}

fn acquisition_error(url: &str, message: String) -> ImageFoldError {
    ImageFoldError::Acquisition {
        url: url.into(),
        message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_timeouts() {
        let config = HttpConfig::default();
        assert_eq!(config.connect_timeout_secs, 10);
        assert_eq!(config.request_timeout_secs, 300);
        assert!(HttpClient::new(&config).is_ok());
    }

    #[tokio::test]
    async fn test_unreachable_host_is_acquisition_error() {
        let client = HttpClient::new(&HttpConfig {
            connect_timeout_secs: 1,
            request_timeout_secs: 2,
        })
        .unwrap();

        // Bind then drop to get a port nobody listens on
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let url = format!("http://127.0.0.1:{}/data.zip", port);

        let dir = tempfile::tempdir().unwrap();
        let err = client
            .download_to_file(&url, &dir.path().join("data.zip"))
            .await
            .unwrap_err();
        assert!(matches!(err, ImageFoldError::Acquisition { .. }));
        assert!(!dir.path().join("data.zip").exists());
    }
}
