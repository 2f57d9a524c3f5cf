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

use snafu::Snafu;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(display("IO error"), context(false))]
    Io {
        source: std::io::Error,
        #[snafu(implicit)]
        loc:    snafu::Location,
    },

    #[snafu(display("Mmap operation failed"))]
    MmapFailed {
        source: mmap_io::MmapIoError,
        #[snafu(implicit)]
        loc:    snafu::Location,
    },

    #[snafu(display("Invalid configuration: {message}"))]
    InvalidConfiguration {
        message: String,
        #[snafu(implicit)]
        loc:     snafu::Location,
    },

    #[snafu(display("Queue is full"))]
    QueueFull {
        #[snafu(implicit)]
        loc: snafu::Location,
    },

    #[snafu(display("Queue is empty"))]
    EmptyQueue {
        #[snafu(implicit)]
        loc: snafu::Location,
    },

    #[snafu(display("Queue is closed"))]
    Closed {
        #[snafu(implicit)]
        loc: snafu::Location,
    },

    #[snafu(display("Operation not supported: {operation}"))]
    Unsupported {
        operation: &'static str,
        #[snafu(implicit)]
        loc:       snafu::Location,
    },

    #[snafu(display("Blocking operation cancelled"))]
    Cancelled {
        #[snafu(implicit)]
        loc: snafu::Location,
    },

    #[snafu(display("Corrupt queue state at slab {slab} index {index}: {reason}"))]
    CorruptState {
        slab:   u32,
        index:  i32,
        reason: String,
        #[snafu(implicit)]
        loc:    snafu::Location,
    },

    #[snafu(display("Corrupted excerpt at slab {slab} index {index}"))]
    CorruptExcerpt {
        slab:  u32,
        index: i32,
        #[snafu(implicit)]
        loc:   snafu::Location,
    },

    #[snafu(display("Excerpt of {size} bytes exceeds message capacity of {capacity}"))]
    ExcerptTooLarge {
        size:     usize,
        capacity: u32,
        #[snafu(implicit)]
        loc:      snafu::Location,
    },

    #[snafu(display("Serialization failed: {reason}"))]
    Serialize {
        reason: String,
        #[snafu(implicit)]
        loc:    snafu::Location,
    },
}
