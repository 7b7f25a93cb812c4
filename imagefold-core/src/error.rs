//! Error types for imagefold
//!
//! One taxonomy for the whole preparation path: acquisition, extraction,
//! split loading, lazy image decoding and configuration.

use std::path::PathBuf;
use thiserror::Error;

/// Primary error type for all imagefold operations
#[derive(Debug, Error)]
pub enum ImageFoldError {
    // ========== Acquisition Errors ==========

    /// Download failed (network, non-2xx status, local write, checksum)
    #[error("Download of {url} failed: {message}")]
    Acquisition { url: String, message: String },

    /// Archive could not be opened or extracted
    #[error("Extraction of {} failed: {reason}", .path.display())]
    Extraction { path: PathBuf, reason: String },

    /// Archive does not have the expected root folder
    #[error("Unexpected archive layout: {reason}")]
    ArchiveLayout { reason: String },

    // ========== Loading Errors ==========

    /// Split directory is absent from the dataset directory
    #[error("Missing split '{split}' at {}", .path.display())]
    MissingSplit { split: String, path: PathBuf },

    /// Image file could not be decoded (raised on first read)
    #[error("Corrupt image {}: {reason}", .path.display())]
    CorruptImage { path: PathBuf, reason: String },

    // ========== Configuration Errors ==========

    /// Missing or malformed configuration value
    #[error("Invalid configuration for {key}: {reason}")]
    Config { key: String, reason: String },

    // ========== Runtime Errors ==========

    /// Filesystem failure outside download/extraction
    #[error("I/O error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Internal error
    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Pipeline stage an error originated from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Acquisition,
    Loading,
    Iteration,
    Configuration,
    Runtime,
}

impl ImageFoldError {
    /// Stage of the preparation path that produced this error
    pub fn stage(&self) -> Stage {
        match self {
            ImageFoldError::Acquisition { .. }
            | ImageFoldError::Extraction { .. }
            | ImageFoldError::ArchiveLayout { .. } => Stage::Acquisition,
            ImageFoldError::MissingSplit { .. } => Stage::Loading,
            ImageFoldError::CorruptImage { .. } => Stage::Iteration,
            ImageFoldError::Config { .. } => Stage::Configuration,
            ImageFoldError::Io { .. } | ImageFoldError::Internal { .. } => Stage::Runtime,
        }
    }

    /// Returns true if this error is caused by the dataset contents
    /// rather than the environment
    pub fn is_data_error(&self) -> bool {
        matches!(
            self,
            ImageFoldError::Extraction { .. }
                | ImageFoldError::ArchiveLayout { .. }
                | ImageFoldError::MissingSplit { .. }
                | ImageFoldError::CorruptImage { .. }
        )
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ImageFoldError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result type alias for imagefold operations
pub type Result<T> = std::result::Result<T, ImageFoldError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_classification() {
        let err = ImageFoldError::MissingSplit {
            split: "train".into(),
            path: PathBuf::from("/data/fowl/train"),
        };
        assert_eq!(err.stage(), Stage::Loading);
        assert!(err.is_data_error());

        let err = ImageFoldError::Acquisition {
            url: "http://localhost/x.zip".into(),
            message: "status 404".into(),
        };
        assert_eq!(err.stage(), Stage::Acquisition);
        assert!(!err.is_data_error());
    }

    #[test]
    fn test_display_names_path() {
        let err = ImageFoldError::CorruptImage {
            path: PathBuf::from("train/cat/1.jpg"),
            reason: "bad header".into(),
        };
        assert_eq!(err.to_string(), "Corrupt image train/cat/1.jpg: bad header");
    }
}
