//! Zip extraction and dataset-root resolution
//!
//! The dataset root is taken from the first entry of the archive's central
//! directory: an archive built as `fowl_data/train/...`, `fowl_data/val/...`
//! lists `fowl_data/` first. That is an assumption about how the archive was
//! built, so it is checked after extraction instead of trusted.

use std::collections::BTreeSet;
use std::fs::File;
use std::io::BufReader;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, warn};
use zip::ZipArchive;

use crate::error::{ImageFoldError, Result};

/// Outcome of extracting one archive
#[derive(Debug, Clone)]
pub struct ExtractedArchive {
    /// Leading path component of the first listed entry
    pub first_root: Option<String>,
    /// Distinct leading components across all entries
    pub top_level: BTreeSet<String>,
    /// Number of entries written (files and directories)
    pub entries: usize,
}

/// Extract every entry of a zip archive into `extract_dir`.
///
/// Entries whose names would land outside `extract_dir` are rejected.
/// Already-written entries stay on disk when a later entry fails.
pub fn extract_zip(archive_path: &Path, extract_dir: &Path) -> Result<ExtractedArchive> {
    let file = File::open(archive_path).map_err(|e| extraction_error(archive_path, e))?;
    let mut archive =
        ZipArchive::new(BufReader::new(file)).map_err(|e| extraction_error(archive_path, e))?;

    std::fs::create_dir_all(extract_dir).map_err(|e| extraction_error(extract_dir, e))?;

    let mut first_root = None;
    let mut top_level = BTreeSet::new();

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|e| extraction_error(archive_path, e))?;

        let relative: PathBuf = entry
            .enclosed_name()
            .map(Path::to_path_buf)
            .ok_or_else(|| ImageFoldError::Extraction {
                path: archive_path.to_path_buf(),
                reason: format!("entry '{}' escapes the extraction directory", entry.name()),
            })?;

        if let Some(root) = leading_component(&relative) {
            if i == 0 {
                first_root = Some(root.clone());
            }
            top_level.insert(root);
        }

        let out_path = extract_dir.join(&relative);
        if entry.is_dir() {
            std::fs::create_dir_all(&out_path).map_err(|e| extraction_error(&out_path, e))?;
        } else {
            if let Some(parent) = out_path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| extraction_error(parent, e))?;
            }
            let mut out = File::create(&out_path).map_err(|e| extraction_error(&out_path, e))?;
            std::io::copy(&mut entry, &mut out).map_err(|e| extraction_error(&out_path, e))?;
        }
        debug!("Extracted {}", relative.display());
    }

    Ok(ExtractedArchive {
        first_root,
        top_level,
        entries: archive.len(),
    })
}

/// Pick and validate the dataset directory after extraction.
///
/// `expected_root`, when given, wins over the first-entry rule. Either way
/// the chosen folder must exist under `extract_dir`.
pub fn resolve_root(
    extract_dir: &Path,
    extracted: &ExtractedArchive,
    expected_root: Option<&str>,
) -> Result<PathBuf> {
    if let Some(expected) = expected_root {
        let path = extract_dir.join(expected);
        if !path.is_dir() {
            return Err(ImageFoldError::ArchiveLayout {
                reason: format!(
                    "expected root folder '{}' not found after extraction (archive top level: {:?})",
                    expected, extracted.top_level
                ),
            });
        }
        return Ok(path);
    }

    let root = extracted
        .first_root
        .as_deref()
        .ok_or_else(|| ImageFoldError::ArchiveLayout {
            reason: "archive has no entries".into(),
        })?;

    let path = extract_dir.join(root);
    if !path.is_dir() {
        return Err(ImageFoldError::ArchiveLayout {
            reason: format!("first archive entry '{}' is not a folder", root),
        });
    }

    if extracted.top_level.len() > 1 {
        warn!(
            "Archive has {} top-level entries {:?}; using first listed '{}' as dataset root",
            extracted.top_level.len(),
            extracted.top_level,
            root
        );
    }

    Ok(path)
}

fn leading_component(path: &Path) -> Option<String> {
    path.components().find_map(|c| match c {
        Component::Normal(name) => Some(name.to_string_lossy().into_owned()),
        _ => None,
    })
}

fn extraction_error(path: &Path, e: impl std::fmt::Display) -> ImageFoldError {
    ImageFoldError::Extraction {
        path: path.to_path_buf(),
        reason: e.to_string(),
    }
}
