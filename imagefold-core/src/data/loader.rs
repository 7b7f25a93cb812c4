//! Per-split data loader
//!
//! Main interface for iterating a split in batches. Each call to
//! [`DataLoader::epoch`] starts a fresh pass with its own prefetch task.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

use super::batch::Batch;
use super::folder::ImageFolder;
use super::pipeline::Pipeline;
use super::prefetcher::{PassPlan, Prefetcher};
use super::split::Split;
use crate::error::{ImageFoldError, Result};

/// Configuration for the data loaders
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataLoaderConfig {
    /// Images per batch; the last batch of a pass may be smaller
    pub batch_size: usize,
    /// Concurrent image decodes per pass
    pub num_workers: usize,
    /// Batches buffered ahead of the consumer
    pub prefetch_batches: usize,
    /// Reshuffle the train split on every pass
    pub shuffle_train: bool,
    pub shuffle_val: bool,
    /// Seed for shuffling and random transforms; entropy when unset
    pub seed: Option<u64>,
}

impl Default for DataLoaderConfig {
    fn default() -> Self {
        Self {
            batch_size: crate::DEFAULT_BATCH_SIZE,
            num_workers: crate::DEFAULT_NUM_WORKERS,
            prefetch_batches: 2,
            shuffle_train: true,
            shuffle_val: false,
            seed: None,
        }
    }
}

impl DataLoaderConfig {
    /// Whether passes over `split` are shuffled
    pub fn shuffles(&self, split: Split) -> bool {
        match split {
            Split::Train => self.shuffle_train,
            Split::Val => self.shuffle_val,
        }
    }
}

/// Lazy, restartable batch source over one split
pub struct DataLoader {
    split: Split,
    folder: Arc<ImageFolder>,
    pipeline: Arc<Pipeline>,
    config: DataLoaderConfig,
    /// Drives shuffling and per-item transform seeds across passes
    rng: StdRng,
    epochs_started: u64,
    items_loaded: Arc<AtomicU64>,
}

impl DataLoader {
    /// Create a loader for a scanned split with its fixed pipeline
    pub fn new(split: Split, folder: ImageFolder, config: DataLoaderConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(split.seed_offset())),
            None => StdRng::from_entropy(),
        };

        Self {
            split,
            folder: Arc::new(folder),
            pipeline: Arc::new(Pipeline::for_split(split)),
            config,
            rng,
            epochs_started: 0,
            items_loaded: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Number of images in the split
    pub fn len(&self) -> usize {
        self.folder.len()
    }

    pub fn is_empty(&self) -> bool {
        self.folder.is_empty()
    }

    /// Batches per pass, counting a trailing partial batch
    pub fn num_batches(&self) -> usize {
        self.len().div_ceil(self.config.batch_size.max(1))
    }

    pub fn split(&self) -> Split {
        self.split
    }

    pub fn class_names(&self) -> &[String] {
        self.folder.class_names()
    }

    pub fn folder(&self) -> &ImageFolder {
        &self.folder
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub fn config(&self) -> &DataLoaderConfig {
        &self.config
    }

    /// Images preprocessed across all passes so far
    pub fn items_loaded(&self) -> u64 {
        self.items_loaded.load(Ordering::Relaxed)
    }

    pub fn epochs_started(&self) -> u64 {
        self.epochs_started
    }

    /// Start a new pass over the split.
    ///
    /// Must be called from within a tokio runtime. Shuffled splits get a
    /// fresh permutation each time.
    pub fn epoch(&mut self) -> Epoch {
        let mut order: Vec<usize> = (0..self.folder.len()).collect();
        if self.config.shuffles(self.split) {
            order.shuffle(&mut self.rng);
        }
        let seeds: Vec<u64> = order.iter().map(|_| self.rng.gen()).collect();

        let plan = PassPlan {
            order,
            seeds,
            batch_size: self.config.batch_size.max(1),
        };
        let num_batches = self.num_batches();

        let (sender, receiver) = mpsc::channel(self.config.prefetch_batches.max(1));
        let prefetcher = Prefetcher::new(
            sender,
            self.folder.clone(),
            self.pipeline.clone(),
            plan,
            self.config.num_workers,
            self.items_loaded.clone(),
        );
        let handle = tokio::spawn(prefetcher.run());

        self.epochs_started += 1;
        debug!(
            "{} epoch {} started: {} batches",
            self.split, self.epochs_started, num_batches
        );

        Epoch {
            split: self.split,
            receiver,
            handle,
            num_batches,
            received: 0,
            finished: false,
        }
    }
}

impl std::fmt::Debug for DataLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataLoader")
            .field("split", &self.split)
            .field("len", &self.len())
            .field("config", &self.config)
            .field("epochs_started", &self.epochs_started)
            .finish()
    }
}

/// One pass over a split
///
/// Dropping the pass stops its prefetcher.
pub struct Epoch {
    split: Split,
    /// Channel to receive batches from prefetcher
    receiver: mpsc::Receiver<Result<Batch>>,
    handle: tokio::task::JoinHandle<()>,
    num_batches: usize,
    received: usize,
    finished: bool,
}

impl Epoch {
    /// Next batch of the pass, `Ok(None)` once every item has been yielded.
    ///
    /// A failed batch ends the pass: later calls return `Ok(None)`.
    pub async fn next_batch(&mut self) -> Result<Option<Batch>> {
        if self.finished {
            return Ok(None);
        }
        if self.received == self.num_batches {
            self.finished = true;
            return Ok(None);
        }

        match self.receiver.recv().await {
            Some(Ok(batch)) => {
                self.received += 1;
                Ok(Some(batch))
            }
            Some(Err(e)) => {
                self.finished = true;
                Err(e)
            }
            None => {
                self.finished = true;
                Err(ImageFoldError::Internal {
                    message: format!(
                        "{} prefetcher stopped after {} of {} batches",
                        self.split, self.received, self.num_batches
                    ),
                })
            }
        }
    }

    /// Batches this pass yields in total
    pub fn num_batches(&self) -> usize {
        self.num_batches
    }

    /// Batches yielded so far
    pub fn batches_received(&self) -> usize {
        self.received
    }
}

impl Drop for Epoch {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = DataLoaderConfig::default();
        assert_eq!(config.batch_size, 4);
        assert_eq!(config.num_workers, 4);
        assert!(config.shuffles(Split::Train));
        assert!(!config.shuffles(Split::Val));
    }

    #[tokio::test]
    async fn test_empty_split_yields_no_batches() {
        let tmp = tempfile::tempdir().unwrap();
        let folder = ImageFolder::scan_own_classes(tmp.path()).unwrap();
        let mut loader = DataLoader::new(Split::Train, folder, DataLoaderConfig::default());

        assert!(loader.is_empty());
        assert_eq!(loader.num_batches(), 0);

        let mut epoch = loader.epoch();
        assert!(epoch.next_batch().await.unwrap().is_none());
        assert!(epoch.next_batch().await.unwrap().is_none());
        assert_eq!(loader.epochs_started(), 1);
    }
}
