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

//! Excerpt framing inside a slab's data file.
//!
//! Excerpts are stored contiguously:
//!
//! ```text
//! ┌─────────────────┬──────────────────────┬─────────────────┐
//! │  Length (4B)    │   Payload (variable) │   CRC32 (4B)    │
//! │  little-endian  │   raw bytes          │   little-endian │
//! └─────────────────┴──────────────────────┴─────────────────┘
//! ```
//!
//! A zero length prefix marks the end of the committed region — slab data
//! files are created zero-filled at their full size, so the first untouched
//! slot reads as length 0. The length prefix is written last when an excerpt
//! is committed: a reader that observes a non-zero length is guaranteed to
//! find the payload and CRC already in place.
//!
//! The CRC covers the length prefix and the payload.

use bytes::Bytes;
use crc32fast::Hasher;

/// Size of the length prefix in bytes.
pub(crate) const EXCERPT_LENGTH_SIZE: usize = 4;

/// Size of the CRC32 trailer in bytes.
pub(crate) const EXCERPT_CRC_SIZE: usize = 4;

/// Fixed per-excerpt framing overhead.
pub(crate) const EXCERPT_OVERHEAD: usize = EXCERPT_LENGTH_SIZE + EXCERPT_CRC_SIZE;

/// One committed element read back from a slab.
#[derive(Debug, Clone)]
pub(crate) struct Excerpt {
    /// Dense index of the excerpt within its slab, starting at 0.
    pub index:   i32,
    /// The serialized element bytes.
    pub payload: Bytes,
}

/// Total on-disk size of an excerpt with the given payload length.
#[inline]
pub(crate) const fn excerpt_disk_size(payload_len: usize) -> usize {
    EXCERPT_OVERHEAD + payload_len
}

#[inline]
pub(crate) fn excerpt_crc(length: u32, payload: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(&length.to_le_bytes());
    hasher.update(payload);
    hasher.finalize()
}

#[inline]
pub(crate) fn verify_excerpt_crc(length: u32, payload: &[u8], expected: u32) -> bool {
    excerpt_crc(length, payload) == expected
}
