//! Async batch prefetcher
//!
//! Runs on a separate task, decoding and transforming one pass's batches
//! ahead of consumption.

use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tracing::debug;

use super::batch::{Batch, Sample};
use super::folder::ImageFolder;
use super::pipeline::Pipeline;
use crate::error::{ImageFoldError, Result};

/// Item order and per-item rng seeds for one pass
#[derive(Debug, Clone)]
pub struct PassPlan {
    /// Folder indices in the order they are yielded
    pub order: Vec<usize>,
    /// Seed for each position in `order`
    pub seeds: Vec<u64>,
    /// Items per batch
    pub batch_size: usize,
}

/// Prefetcher that loads one pass's batches ahead of the consumer
pub struct Prefetcher {
    /// Channel to send batches to the pass
    sender: mpsc::Sender<Result<Batch>>,
    folder: Arc<ImageFolder>,
    pipeline: Arc<Pipeline>,
    plan: PassPlan,
    /// Bounds concurrent decodes; `None` decodes a whole batch in one
    /// blocking task
    workers: Option<Arc<Semaphore>>,
    /// Items successfully preprocessed, shared with the loader
    items_loaded: Arc<AtomicU64>,
}

impl Prefetcher {
    /// Create a new prefetcher
    pub fn new(
        sender: mpsc::Sender<Result<Batch>>,
        folder: Arc<ImageFolder>,
        pipeline: Arc<Pipeline>,
        plan: PassPlan,
        num_workers: usize,
        items_loaded: Arc<AtomicU64>,
    ) -> Self {
        let workers = (num_workers > 0).then(|| Arc::new(Semaphore::new(num_workers)));
        Self {
            sender,
            folder,
            pipeline,
            plan,
            workers,
            items_loaded,
        }
    }

    /// Run the prefetcher loop. Stops after the first failed batch or when
    /// the consumer goes away.
    pub async fn run(self) {
        let batch_size = self.plan.batch_size.max(1);
        let total = self.plan.order.len().div_ceil(batch_size);
        debug!("Prefetcher starting with {} batches", total);

        for batch_idx in 0..total {
            let start = batch_idx * batch_size;
            let end = (start + batch_size).min(self.plan.order.len());

            let result = self.load_batch(batch_idx, start, end).await;
            let failed = result.is_err();

            if self.sender.send(result).await.is_err() {
                debug!("Prefetcher: consumer dropped, stopping");
                return;
            }
            if failed {
                debug!("Prefetcher: batch {} failed, stopping", batch_idx);
                return;
            }
        }

        debug!("Prefetcher completed, all batches processed");
    }

    /// Load positions `start..end` of the plan as one batch, in order
    async fn load_batch(&self, batch_idx: usize, start: usize, end: usize) -> Result<Batch> {
        let jobs: Vec<(usize, u64)> = (start..end)
            .map(|pos| (self.plan.order[pos], self.plan.seeds[pos]))
            .collect();

        let samples = match &self.workers {
            Some(workers) => {
                let mut handles = Vec::with_capacity(jobs.len());
                for (index, seed) in jobs {
                    let permit = workers.clone().acquire_owned().await.map_err(|e| {
                        ImageFoldError::Internal {
                            message: format!("worker pool closed: {}", e),
                        }
                    })?;
                    let folder = self.folder.clone();
                    let pipeline = self.pipeline.clone();
                    handles.push(tokio::task::spawn_blocking(move || {
                        let _permit = permit;
                        load_sample(&folder, &pipeline, index, seed)
                    }));
                }

                let mut samples = Vec::with_capacity(handles.len());
                for handle in handles {
                    samples.push(handle.await.map_err(join_error)??);
                }
                samples
            }
            None => {
                let folder = self.folder.clone();
                let pipeline = self.pipeline.clone();
                tokio::task::spawn_blocking(move || {
                    jobs.into_iter()
                        .map(|(index, seed)| load_sample(&folder, &pipeline, index, seed))
                        .collect::<Result<Vec<_>>>()
                })
                .await
                .map_err(join_error)??
            }
        };

        self.items_loaded
            .fetch_add(samples.len() as u64, Ordering::Relaxed);
        debug!("Prefetched batch {} ({} items)", batch_idx, samples.len());

        Ok(Batch::from_samples(batch_idx, samples))
    }
}

/// Decode and preprocess one folder item
pub fn load_sample(
    folder: &ImageFolder,
    pipeline: &Pipeline,
    index: usize,
    seed: u64,
) -> Result<Sample> {
    let item = folder.item(index);
    let img = folder.decode(index)?;
    let mut rng = StdRng::seed_from_u64(seed);
    Ok(Sample {
        image: pipeline.apply(img, &mut rng),
        label: item.label,
        path: item.path.clone(),
    })
}

fn join_error(e: tokio::task::JoinError) -> ImageFoldError {
    ImageFoldError::Internal {
        message: format!("decode task failed: {}", e),
    }
}
