// Copyright 2025 Crrow
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::path::PathBuf;

use snafu::ensure;

use crate::{Result, error::InvalidConfigurationSnafu, excerpt::EXCERPT_OVERHEAD};

/// File prefix used when the builder is not given an explicit name.
pub const DEFAULT_QUEUE_NAME: &str = "chronicleblockingqueue";

/// Data-region byte budget of a single slab.
pub const DEFAULT_SLAB_BLOCK_SIZE: u64 = 64 * 1024 * 1024;

/// Maximum payload bytes of a single excerpt.
pub const DEFAULT_MESSAGE_CAPACITY: u32 = 128 * 1024;

#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Directory holding all files of the queue. Must already exist.
    pub storage_directory: PathBuf,
    /// Prefix for every file of this queue.
    pub name: String,
    /// Upper bound on concurrently live slabs. `None` means unbounded.
    pub max_slabs: Option<u32>,
    /// Byte size of each slab's data file.
    pub slab_block_size: u64,
    /// Maximum payload bytes per excerpt.
    pub message_capacity: u32,
}

impl QueueConfig {
    pub(crate) fn new<P: Into<PathBuf>>(storage_directory: P) -> Self {
        Self {
            storage_directory: storage_directory.into(),
            name: DEFAULT_QUEUE_NAME.to_string(),
            max_slabs: None,
            slab_block_size: DEFAULT_SLAB_BLOCK_SIZE,
            message_capacity: DEFAULT_MESSAGE_CAPACITY,
        }
    }

    pub(crate) fn validate(&self) -> Result<()> {
        ensure!(
            self.storage_directory.is_dir(),
            InvalidConfigurationSnafu {
                message: format!(
                    "storage directory {} is not a path to a directory",
                    self.storage_directory.display()
                ),
            }
        );
        ensure!(
            !self.name.is_empty() && !self.name.contains(['/', '\\']),
            InvalidConfigurationSnafu {
                message: format!("invalid queue name {:?}", self.name),
            }
        );
        if let Some(max) = self.max_slabs {
            ensure!(
                max >= 1,
                InvalidConfigurationSnafu {
                    message: "max_slabs must be at least 1".to_string(),
                }
            );
        }
        // A fresh slab must always admit one maximum-size excerpt, otherwise
        // the rollover retry could never succeed.
        ensure!(
            self.slab_block_size >= EXCERPT_OVERHEAD as u64 + u64::from(self.message_capacity),
            InvalidConfigurationSnafu {
                message: format!(
                    "slab_block_size {} cannot hold one excerpt of message_capacity {}",
                    self.slab_block_size, self.message_capacity
                ),
            }
        );
        Ok(())
    }
}
