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

use serde::{Serialize, de::DeserializeOwned};
use snafu::OptionExt;

use crate::{
    BlockingQueue, QueueConfig, Result,
    codec::{Deserializer, SerdeDeserializer, SerdeSerializer, Serializer},
    error::InvalidConfigurationSnafu,
};

pub struct QueueBuilder<E> {
    config:       QueueConfig,
    serializer:   Option<Box<dyn Serializer<E>>>,
    deserializer: Option<Box<dyn Deserializer<E>>>,
}

impl<E: 'static> QueueBuilder<E> {
    /// Start building a queue over `storage_directory`, which must already
    /// exist.
    pub fn new<P: Into<PathBuf>>(storage_directory: P) -> Self {
        Self {
            config: QueueConfig::new(storage_directory),
            serializer: None,
            deserializer: None,
        }
    }

    /// File prefix for this queue; defaults to
    /// [`DEFAULT_QUEUE_NAME`](crate::config::DEFAULT_QUEUE_NAME).
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.name = name.into();
        self
    }

    /// Cap the number of concurrently live slabs. Once reached, `offer`
    /// returns `false` until the consumer drains a slab.
    pub fn max_slabs(mut self, max: u32) -> Self {
        self.config.max_slabs = Some(max);
        self
    }

    /// Byte size of each slab's data file; drives rollover.
    pub fn slab_block_size(mut self, size: u64) -> Self {
        self.config.slab_block_size = size;
        self
    }

    /// Maximum payload bytes per element.
    pub fn message_capacity(mut self, capacity: u32) -> Self {
        self.config.message_capacity = capacity;
        self
    }

    /// Replace the writer half of the codec.
    pub fn serializer(mut self, serializer: impl Serializer<E> + 'static) -> Self {
        self.serializer = Some(Box::new(serializer));
        self
    }

    /// Replace the reader half of the codec.
    pub fn deserializer(mut self, deserializer: impl Deserializer<E> + 'static) -> Self {
        self.deserializer = Some(Box::new(deserializer));
        self
    }

    /// Build with an explicit codec pair; both halves must have been set.
    ///
    /// Use this for element types without serde support.
    pub fn build_with_codec(self) -> Result<BlockingQueue<E>> {
        let serializer = self.serializer.context(InvalidConfigurationSnafu {
            message: "serializer is required without serde defaults".to_string(),
        })?;
        let deserializer = self.deserializer.context(InvalidConfigurationSnafu {
            message: "deserializer is required without serde defaults".to_string(),
        })?;
        BlockingQueue::open(self.config, serializer, deserializer)
    }
}

impl<E: Serialize + DeserializeOwned + 'static> QueueBuilder<E> {
    /// Build the queue, filling unset codec halves with the serde defaults.
    pub fn build(self) -> Result<BlockingQueue<E>> {
        let serializer = self
            .serializer
            .unwrap_or_else(|| Box::new(SerdeSerializer));
        let deserializer = self
            .deserializer
            .unwrap_or_else(|| Box::new(SerdeDeserializer));
        BlockingQueue::open(self.config, serializer, deserializer)
    }
}
