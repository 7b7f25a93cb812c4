//! Dataset acquisition
//!
//! Download a zip archive, extract it, delete the archive and hand back the
//! extracted dataset directory. Nothing is retried and nothing is rolled
//! back: a failed run leaves the archive and any partial extraction behind,
//! and re-runs are made idempotent with [`acquire_if_missing`].

pub mod archive;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::data::Split;
use crate::error::{ImageFoldError, Result};
use crate::storage::{DownloadSummary, HttpClient, HttpConfig};
use archive::ExtractedArchive;

/// Public fowl image dataset used by the template project
pub const DEFAULT_DOWNLOAD_URL: &str =
    "https://azureopendatastorage.blob.core.windows.net/testpublic/temp/fowl_data.zip";

/// Where to fetch the archive from and where to put it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcquisitionConfig {
    /// Archive URL (HTTP or HTTPS)
    pub download_url: String,
    /// Local path the archive is downloaded to; deleted after extraction
    pub archive_path: PathBuf,
    /// Directory the archive is extracted into; created if absent
    pub extract_dir: PathBuf,
    /// Root folder name inside the archive. When unset the first archive
    /// entry names it.
    pub expected_root: Option<String>,
    /// Expected CRC32C of the archive bytes
    pub expected_crc32c: Option<u32>,
    /// HTTP client settings
    pub http: HttpConfig,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            download_url: DEFAULT_DOWNLOAD_URL.into(),
            archive_path: PathBuf::from("../data/fowl_data.zip"),
            extract_dir: PathBuf::from("../data"),
            expected_root: None,
            expected_crc32c: None,
            http: HttpConfig::default(),
        }
    }
}

impl AcquisitionConfig {
    /// Create a configuration for one archive, other fields defaulted
    pub fn new(
        download_url: impl Into<String>,
        archive_path: impl Into<PathBuf>,
        extract_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            download_url: download_url.into(),
            archive_path: archive_path.into(),
            extract_dir: extract_dir.into(),
            ..Default::default()
        }
    }

    /// Name the root folder instead of relying on the first archive entry
    pub fn with_expected_root(mut self, root: impl Into<String>) -> Self {
        self.expected_root = Some(root.into());
        self
    }

    /// Reject archives whose CRC32C differs
    pub fn with_checksum(mut self, crc32c: u32) -> Self {
        self.expected_crc32c = Some(crc32c);
        self
    }
}

/// Record of a completed acquisition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcquisitionReport {
    /// Extracted dataset directory
    pub dataset_dir: PathBuf,
    /// Size of the downloaded archive
    pub archive_bytes: u64,
    /// CRC32C of the downloaded archive
    pub archive_crc32c: u32,
    /// Entries extracted from the archive
    pub entries: usize,
    /// Completion time
    pub finished_at: DateTime<Utc>,
}

/// Runs the download → extract → delete sequence
pub struct Acquirer {
    client: HttpClient,
    config: AcquisitionConfig,
}

impl Acquirer {
    /// Create a new acquirer
    pub fn new(config: AcquisitionConfig) -> Result<Self> {
        let client = HttpClient::new(&config.http)?;
        Ok(Self { client, config })
    }

    /// Configuration in use
    pub fn config(&self) -> &AcquisitionConfig {
        &self.config
    }

    /// Stream the archive to `archive_path` and verify its checksum if one
    /// is configured
    pub async fn download(&self) -> Result<DownloadSummary> {
        let url = &self.config.download_url;
        info!("Downloading archive file from {}...", url);

        let summary = self
            .client
            .download_to_file(url, &self.config.archive_path)
            .await?;

        info!(
            "Downloaded {} bytes to {} (crc32c={:08x})",
            summary.bytes,
            self.config.archive_path.display(),
            summary.crc32c
        );

        if let Some(expected) = self.config.expected_crc32c {
            if summary.crc32c != expected {
                return Err(ImageFoldError::Acquisition {
                    url: url.clone(),
                    message: format!(
                        "checksum mismatch: expected {:08x}, got {:08x}",
                        expected, summary.crc32c
                    ),
                });
            }
        }

        Ok(summary)
    }

    /// Extract the downloaded archive and resolve the dataset directory
    pub async fn extract(&self) -> Result<(PathBuf, ExtractedArchive)> {
        info!("Extracting files...");

        let archive_path = self.config.archive_path.clone();
        let extract_dir = self.config.extract_dir.clone();
        let extracted = tokio::task::spawn_blocking(move || {
            archive::extract_zip(&archive_path, &extract_dir)
        })
        .await
        .map_err(|e| ImageFoldError::Internal {
            message: format!("extraction task failed: {}", e),
        })??;

        let dataset_dir = archive::resolve_root(
            &self.config.extract_dir,
            &extracted,
            self.config.expected_root.as_deref(),
        )?;

        info!("Finished extracting {} entries!", extracted.entries);
        Ok((dataset_dir, extracted))
    }

    /// Download, extract, delete the archive
    pub async fn acquire(&self) -> Result<AcquisitionReport> {
        let summary = self.download().await?;
        let (dataset_dir, extracted) = self.extract().await?;

        tokio::fs::remove_file(&self.config.archive_path)
            .await
            .map_err(|e| ImageFoldError::io(&self.config.archive_path, e))?;

        info!("Dataset ready at {}", dataset_dir.display());

        Ok(AcquisitionReport {
            dataset_dir,
            archive_bytes: summary.bytes,
            archive_crc32c: summary.crc32c,
            entries: extracted.entries,
            finished_at: Utc::now(),
        })
    }

    /// Dataset directory that `acquire` would produce, if already on disk.
    ///
    /// Only answerable when the root folder is named in the configuration.
    pub fn existing_dataset_dir(&self) -> Option<PathBuf> {
        existing_dataset_dir(&self.config)
    }
}

fn existing_dataset_dir(config: &AcquisitionConfig) -> Option<PathBuf> {
    let root = config.expected_root.as_deref()?;
    let path = config.extract_dir.join(root);
    path.is_dir().then_some(path)
}

/// Download, extract and delete the archive; return the dataset directory
pub async fn acquire(config: &AcquisitionConfig) -> Result<PathBuf> {
    let report = Acquirer::new(config.clone())?.acquire().await?;
    Ok(report.dataset_dir)
}

/// Like [`acquire`], but skip the download when the configured root folder
/// already exists under `extract_dir`
pub async fn acquire_if_missing(config: &AcquisitionConfig) -> Result<PathBuf> {
    if let Some(existing) = existing_dataset_dir(config) {
        info!("Dataset already present at {}, skipping download", existing.display());
        return Ok(existing);
    }
    acquire(config).await
}

/// True when `dataset_dir` has every named split as a subdirectory
pub fn has_splits(dataset_dir: &Path, splits: &[Split]) -> bool {
    splits.iter().all(|s| dataset_dir.join(s.dir_name()).is_dir())
}
