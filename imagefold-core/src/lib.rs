//! imagefold core - dataset preparation for image classification training
//!
//! This crate provides:
//! - Archive acquisition (download, extract, clean up)
//! - Per-split image-folder loaders with fixed preprocessing pipelines
//! - Environment-backed configuration records
//! - Tensor preview rendering

pub mod acquire;
pub mod config;
pub mod data;
pub mod display;
pub mod error;
pub mod storage;

pub use acquire::{acquire, acquire_if_missing, AcquisitionConfig};
pub use data::{load, load_default, Batch, DataLoader, DataLoaderConfig, LoadedData, Split};
pub use display::display;
pub use error::{ImageFoldError, Result};

/// Default images per batch for both splits
pub const DEFAULT_BATCH_SIZE: usize = 4;

/// Default concurrent image decodes per loader
pub const DEFAULT_NUM_WORKERS: usize = 4;

/// Log filter used when `RUST_LOG` is unset; covers every `imagefold*` target
pub const DEFAULT_LOG_FILTER: &str = "imagefold=info";

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_subscriber::filter::LevelFilter;
    use tracing_subscriber::EnvFilter;

    #[test]
    fn test_default_log_filter_is_single_info_directive() {
        let filter = EnvFilter::try_new(DEFAULT_LOG_FILTER).unwrap();
        assert_eq!(filter.max_level_hint(), Some(LevelFilter::INFO));
        assert_eq!(filter.to_string(), "imagefold=info");
    }
}
