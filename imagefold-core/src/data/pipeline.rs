//! Split-specific preprocessing pipelines
//!
//! Both pipelines end in the same `3 × 224 × 224` tensor normalized with
//! [`IMAGENET_MEAN`](super::IMAGENET_MEAN) and
//! [`IMAGENET_STD`](super::IMAGENET_STD). Those statistics belong to the
//! pretrained backbone downstream: swapping the backbone means changing
//! both pipelines together.

use image::DynamicImage;
use rand::rngs::StdRng;

use super::split::Split;
use super::tensor::ImageTensor;
use super::transform::{
    CenterCrop, ImageTransform, Normalize, RandomHorizontalFlip, RandomResizedCrop, Resize,
    CROP_SIZE, RESIZE_SIZE,
};

/// Ordered image transforms followed by tensor conversion and normalization
pub struct Pipeline {
    transforms: Vec<Box<dyn ImageTransform>>,
    normalize: Normalize,
}

impl Pipeline {
    /// Random crop-and-resize, random flip, tensor, normalize
    pub fn train() -> Self {
        Self {
            transforms: vec![
                Box::new(RandomResizedCrop::new(CROP_SIZE)),
                Box::new(RandomHorizontalFlip::new(0.5)),
            ],
            normalize: Normalize::imagenet(),
        }
    }

    /// Resize shorter side to 256, center crop 224, tensor, normalize
    pub fn eval() -> Self {
        Self {
            transforms: vec![
                Box::new(Resize::new(RESIZE_SIZE)),
                Box::new(CenterCrop::new(CROP_SIZE)),
            ],
            normalize: Normalize::imagenet(),
        }
    }

    /// The fixed pipeline for a split
    pub fn for_split(split: Split) -> Self {
        if split.is_train() {
            Self::train()
        } else {
            Self::eval()
        }
    }

    /// Run the pipeline on a decoded image
    pub fn apply(&self, img: DynamicImage, rng: &mut StdRng) -> ImageTensor {
        let mut rgb = img.to_rgb8();
        for t in &self.transforms {
            rgb = t.apply(rgb, rng);
        }
        self.normalize.apply(ImageTensor::from_rgb(&rgb))
    }

    /// Normalization applied last
    pub fn normalize(&self) -> &Normalize {
        &self.normalize
    }

    /// Transform names in order, for logs
    pub fn describe(&self) -> Vec<&'static str> {
        let mut steps: Vec<&'static str> = self.transforms.iter().map(|t| t.name()).collect();
        steps.extend(["to_tensor", "normalize"]);
        steps
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("steps", &self.describe())
            .field("normalize", &self.normalize)
            .finish()
    }
}
