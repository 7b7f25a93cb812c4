//! Dataset preparation binary
//!
//! Fetches the dataset if needed, loads both splits and pulls one
//! validation batch as a smoke test.

use imagefold_core::acquire::{acquire_if_missing, has_splits};
use imagefold_core::config::{
    load_dotenv, DatasetRegistration, PlatformIdentity, PrepareOptions, TrainingEnvironment,
};
use imagefold_core::data::{load, Split};
use imagefold_core::{display, AcquisitionConfig, DataLoaderConfig, DEFAULT_LOG_FILTER};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Starting imagefold-prepare");

    // Load configuration
    load_dotenv(".env")?;
    let acquisition = AcquisitionConfig::from_env()?;
    let loader_config = DataLoaderConfig::from_env()?;
    let options = PrepareOptions::from_env();
    let identity = PlatformIdentity::from_env();
    info!("Platform identity: {:?}", identity);
    info!("Dataset registration: {:?}", DatasetRegistration::from_env()?);
    info!("Training environment: {:?}", TrainingEnvironment::from_env()?);

    let dataset_dir = match options.dataset_dir {
        Some(dir) if has_splits(&dir, &Split::ALL) => {
            info!("Using existing dataset at {}", dir.display());
            dir
        }
        Some(dir) => {
            warn!("DATASET_DIR {} has no train/val splits, acquiring", dir.display());
            acquire_if_missing(&acquisition).await?
        }
        None => acquire_if_missing(&acquisition).await?,
    };

    let mut data = load(&dataset_dir, &Split::ALL, &loader_config)?;
    for split in Split::ALL {
        info!("{}: {} images", split, data.size(split));
    }
    info!("Classes: {:?}", data.class_names);

    let summary = serde_json::json!({
        "dataset_dir": dataset_dir,
        "class_names": data.class_names,
        "train": data.size(Split::Train),
        "val": data.size(Split::Val),
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);

    let Some(val) = data.loader_mut(Split::Val) else {
        return Ok(());
    };
    let mut epoch = val.epoch();
    match epoch.next_batch().await? {
        Some(batch) => {
            info!("First val batch: shape {:?}, labels {:?}", batch.shape(), batch.labels);
            if let Some(preview) = &options.preview_path {
                if let Some(tensor) = batch.image_tensor(0) {
                    display(&tensor, preview)?;
                }
            }
        }
        None => warn!("Validation split is empty"),
    }

    Ok(())
}
