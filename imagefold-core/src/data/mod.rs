//! Dataset loading
//!
//! Scans a `train`/`val` image-folder dataset and builds one lazy batch
//! loader per split, with prefetching on the blocking pool.

pub mod batch;
pub mod folder;
pub mod loader;
pub mod pipeline;
pub mod prefetcher;
pub mod split;
pub mod tensor;
pub mod transform;

pub use batch::{Batch, Sample};
pub use folder::{FolderItem, ImageFolder, IMAGE_EXTENSIONS};
pub use loader::{DataLoader, DataLoaderConfig, Epoch};
pub use pipeline::Pipeline;
pub use split::Split;
pub use tensor::{ImageTensor, CHANNELS};
pub use transform::{Normalize, CROP_SIZE, IMAGENET_MEAN, IMAGENET_STD, RESIZE_SIZE};

use std::collections::BTreeMap;
use std::path::Path;

use tracing::info;

use crate::error::{ImageFoldError, Result};

/// Loaders for the requested splits with their sizes and the shared labels
#[derive(Debug)]
pub struct LoadedData {
    pub loaders: BTreeMap<Split, DataLoader>,
    pub sizes: BTreeMap<Split, usize>,
    /// Sorted `train` class directories; position is the label
    pub class_names: Vec<String>,
}

impl LoadedData {
    pub fn loader(&self, split: Split) -> Option<&DataLoader> {
        self.loaders.get(&split)
    }

    pub fn loader_mut(&mut self, split: Split) -> Option<&mut DataLoader> {
        self.loaders.get_mut(&split)
    }

    /// Move a loader out, e.g. to hand it to a training task
    pub fn take(&mut self, split: Split) -> Option<DataLoader> {
        self.loaders.remove(&split)
    }

    /// Item count of a split, 0 if it was not loaded
    pub fn size(&self, split: Split) -> usize {
        self.sizes.get(&split).copied().unwrap_or(0)
    }
}

/// Build loaders for `splits` of the dataset at `dataset_dir`.
///
/// The `train` directory defines the class list and must exist even when it
/// is not requested. All directories are checked before anything is scanned.
pub fn load(dataset_dir: &Path, splits: &[Split], config: &DataLoaderConfig) -> Result<LoadedData> {
    let mut required: Vec<Split> = vec![Split::Train];
    required.extend(splits.iter().copied().filter(|s| !s.is_train()));
    for split in &required {
        let path = dataset_dir.join(split.dir_name());
        if !path.is_dir() {
            return Err(ImageFoldError::MissingSplit {
                split: split.to_string(),
                path,
            });
        }
    }

    let class_names = ImageFolder::class_names_in(&dataset_dir.join(Split::Train.dir_name()))?;

    let mut loaders = BTreeMap::new();
    let mut sizes = BTreeMap::new();
    for &split in splits {
        if loaders.contains_key(&split) {
            continue;
        }
        let folder = ImageFolder::scan(dataset_dir.join(split.dir_name()), &class_names)?;
        let loader = DataLoader::new(split, folder, config.clone());
        info!(
            "Loaded {} split: {} images, {} batches, pipeline {:?}",
            split,
            loader.len(),
            loader.num_batches(),
            loader.pipeline().describe()
        );
        sizes.insert(split, loader.len());
        loaders.insert(split, loader);
    }

    info!("{} classes: {:?}", class_names.len(), class_names);

    Ok(LoadedData {
        loaders,
        sizes,
        class_names,
    })
}

/// Load `train` and `val` with the default loader configuration
pub fn load_default(dataset_dir: &Path) -> Result<LoadedData> {
    load(dataset_dir, &Split::ALL, &DataLoaderConfig::default())
}
