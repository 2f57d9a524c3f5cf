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

//! Persistent, file-backed blocking FIFO queue.
//!
//! Features:
//! - Elements live in append-only slab file pairs (`<name>-<id>.data` +
//!   `<name>-<id>.index`) under a single storage directory
//! - The consumer's read position is an 8-byte memory-mapped cursor file
//!   updated with atomic 64-bit operations, so progress survives restarts
//!   and is visible across processes
//! - Blocking and timed `put`/`take`/`offer`/`poll` variants with
//!   cooperative cancellation
//! - Fully drained slabs are deleted; an optional cap on live slabs
//!   back-pressures the producer
//! - Pluggable element codecs, defaulting to serde
//!
//! ## Usage
//!
//! ```ignore
//! let queue: BlockingQueue<String> = QueueBuilder::new("/path/to/dir")
//!     .name("events")
//!     .max_slabs(8)
//!     .build()?;
//!
//! queue.put("hello".to_string())?;
//! assert_eq!(queue.take()?, "hello");
//! queue.close()?;
//! ```

mod cursor;
mod excerpt;
mod index;
mod iter;
mod path;
mod queue;
mod slab;

pub mod builder;
pub mod codec;
pub mod config;
pub mod error;

pub use builder::QueueBuilder;
pub use codec::{Deserializer, SerdeDeserializer, SerdeSerializer, Serializer};
pub use config::QueueConfig;
pub use error::{Error, Result};
pub use iter::Iter;
pub use queue::BlockingQueue;
