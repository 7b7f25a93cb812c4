//! Dataset splits

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ImageFoldError;

/// A named subdirectory of the dataset directory
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Split {
    /// Training images; defines the class list. Augmented and shuffled.
    Train,
    /// Validation images; deterministic preprocessing.
    Val,
}

impl Split {
    /// Both splits in canonical order
    pub const ALL: [Split; 2] = [Split::Train, Split::Val];

    /// Directory name under the dataset directory
    pub fn dir_name(&self) -> &'static str {
        match self {
            Split::Train => "train",
            Split::Val => "val",
        }
    }

    /// Whether this split uses the randomized training pipeline
    pub fn is_train(&self) -> bool {
        matches!(self, Split::Train)
    }

    pub(crate) fn seed_offset(&self) -> u64 {
        match self {
            Split::Train => 0,
            Split::Val => 0x9e37_79b9_7f4a_7c15,
        }
    }
}

impl fmt::Display for Split {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

impl FromStr for Split {
    type Err = ImageFoldError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "train" => Ok(Split::Train),
            "val" => Ok(Split::Val),
            other => Err(ImageFoldError::Config {
                key: "split".into(),
                reason: format!("unknown split '{}', expected 'train' or 'val'", other),
            }),
        }
    }
}
