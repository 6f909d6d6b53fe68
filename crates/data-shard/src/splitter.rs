//! Dataset splitting into shard descriptors
//!
//! Produces one epoch of shards at a time so tasks are created lazily as
//! workers request work.

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::dataset::Shard;

/// How the dataset is stored, which decides whether shards carry
/// per-record indices
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageType {
    /// Table storage, shards list their record indices
    Table,

    /// Text/file storage, `(start, end)` is enough
    Text,
}

impl StorageType {
    /// Parse the storage type reported by workers, defaulting to text
    pub fn parse(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "table" => StorageType::Table,
            _ => StorageType::Text,
        }
    }
}

/// Splits `[0, dataset_size)` into `shard_size`-sized shards for each epoch
#[derive(Debug, Clone)]
pub struct DatasetSplitter {
    dataset_name: String,
    dataset_size: u64,
    shard_size: u64,
    num_epochs: u32,
    shuffle: bool,
    storage_type: StorageType,
    base_seed: u64,
    epoch: u32,
}

/// Serializable splitter state for shard checkpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SplitterState {
    pub epoch: u32,
    pub base_seed: u64,
}

impl DatasetSplitter {
    pub fn new(
        dataset_name: impl Into<String>,
        dataset_size: u64,
        shard_size: u64,
        num_epochs: u32,
        shuffle: bool,
        storage_type: StorageType,
    ) -> Self {
        Self {
            dataset_name: dataset_name.into(),
            dataset_size,
            shard_size: shard_size.max(1),
            num_epochs: num_epochs.max(1),
            shuffle,
            storage_type,
            base_seed: rand::random(),
            epoch: 0,
        }
    }

    /// Pin the shuffle seed so reruns reproduce the same shard order
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.base_seed = seed;
        self
    }

    /// Number of epochs generated so far
    pub fn epoch(&self) -> u32 {
        self.epoch
    }

    /// True once every epoch has been generated
    pub fn exhausted(&self) -> bool {
        self.epoch >= self.num_epochs
    }

    /// Number of shards in one epoch
    pub fn shards_per_epoch(&self) -> u64 {
        self.dataset_size.div_ceil(self.shard_size)
    }

    /// Generate the shard list for the next epoch, advancing the epoch
    /// counter. Returns `None` once all epochs are generated.
    pub fn next_epoch_shards(&mut self) -> Option<Vec<Shard>> {
        if self.exhausted() {
            return None;
        }
        let epoch_index = self.epoch;
        self.epoch += 1;

        let mut order: Vec<u64> = (0..self.shards_per_epoch()).collect();
        if self.shuffle {
            let mut rng = ChaCha8Rng::seed_from_u64(self.epoch_seed(epoch_index));
            order.shuffle(&mut rng);
        }

        let shards = order
            .into_iter()
            .map(|index| {
                let start = index * self.shard_size;
                let end = (start + self.shard_size).min(self.dataset_size);
                let record_indices = match self.storage_type {
                    StorageType::Table => (start..end).collect(),
                    StorageType::Text => Vec::new(),
                };
                Shard {
                    name: self.dataset_name.clone(),
                    start,
                    end,
                    record_indices,
                }
            })
            .collect();

        tracing::debug!(
            dataset = %self.dataset_name,
            epoch = self.epoch,
            shards = self.shards_per_epoch(),
            "Generated epoch shards"
        );

        Some(shards)
    }

    pub fn state(&self) -> SplitterState {
        SplitterState {
            epoch: self.epoch,
            base_seed: self.base_seed,
        }
    }

    pub fn restore_state(&mut self, state: &SplitterState) {
        self.epoch = state.epoch;
        self.base_seed = state.base_seed;
    }

    fn epoch_seed(&self, epoch: u32) -> u64 {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};

        let mut hasher = DefaultHasher::new();
        self.base_seed.hash(&mut hasher);
        self.dataset_name.hash(&mut hasher);
        epoch.hash(&mut hasher);
        hasher.finish()
    }
}
