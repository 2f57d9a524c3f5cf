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

//! Append and tail handles over a single slab.
//!
//! A slab is one `.data`/`.index` file pair holding a contiguous run of
//! excerpts. The [`SlabAppender`] owns the write side of the active slab:
//! admission, framing, and the dense index entry per commit. The
//! [`SlabTailer`] is an independent read handle that can seek to the start,
//! seek past a given excerpt index, and walk forward excerpt by excerpt.
//! Both sit on [`SlabData`], the memory-mapped view of the slab's data
//! region, which owns the excerpt framing I/O and its commit ordering.
//!
//! Admission is by reservation: an excerpt is started only if a full
//! `message_capacity` payload would still fit, so commit never runs out of
//! room mid-write. Refusal is the only rollover signal the queue engine acts
//! on.

use std::path::Path;

use bytes::Bytes;
use mmap_io::MemoryMappedFile;
use snafu::{ResultExt, ensure};
use tracing::debug;

use crate::{
    QueueConfig, Result,
    error::{CorruptExcerptSnafu, ExcerptTooLargeSnafu, MmapFailedSnafu},
    excerpt::{
        EXCERPT_CRC_SIZE, EXCERPT_LENGTH_SIZE, EXCERPT_OVERHEAD, Excerpt, excerpt_crc,
        excerpt_disk_size, verify_excerpt_crc,
    },
    index::{IndexReader, IndexWriter},
    path::{slab_data_path, slab_index_path},
};

/// Memory-mapped view of one slab's fixed-size data region.
///
/// The region is created zero-filled at the configured block size and never
/// grows; the zero tail is how readers find the end of the committed run (a
/// zero length prefix means "nothing committed here"). Committing writes the
/// payload and CRC before the length prefix, so a reader that observes a
/// non-zero length always finds a fully written excerpt behind it.
struct SlabData {
    mmap: MemoryMappedFile,
    size: u64,
}

impl SlabData {
    fn create(path: &Path, block_size: u64) -> Result<Self> {
        let mmap = MemoryMappedFile::create_rw(path, block_size).context(MmapFailedSnafu)?;
        Ok(Self {
            mmap,
            size: block_size,
        })
    }

    /// Reopen for appending; the region keeps the size it was created with,
    /// regardless of the current configuration.
    fn open_rw(path: &Path) -> Result<Self> {
        let mmap = MemoryMappedFile::open_rw(path).context(MmapFailedSnafu)?;
        let size = mmap.len();
        Ok(Self { mmap, size })
    }

    fn open_ro(path: &Path) -> Result<Self> {
        let mmap = MemoryMappedFile::open_ro(path).context(MmapFailedSnafu)?;
        let size = mmap.len();
        Ok(Self { mmap, size })
    }

    fn size(&self) -> u64 { self.size }

    /// Length prefix at `offset`; zero means nothing committed there.
    fn read_length(&self, offset: u64) -> Result<u32> {
        let mut buf = [0u8; EXCERPT_LENGTH_SIZE];
        self.mmap.read_into(offset, &mut buf).context(MmapFailedSnafu)?;
        Ok(u32::from_le_bytes(buf))
    }

    /// Frame and publish one excerpt at `offset`.
    ///
    /// The length prefix goes in last: a non-zero length is what makes the
    /// excerpt visible to concurrent tailers.
    fn commit_excerpt(&self, offset: u64, payload: &[u8]) -> Result<()> {
        let length = payload.len() as u32;
        let crc = excerpt_crc(length, payload);

        self.mmap
            .update_region(offset + EXCERPT_LENGTH_SIZE as u64, payload)
            .context(MmapFailedSnafu)?;
        self.mmap
            .update_region(
                offset + (EXCERPT_LENGTH_SIZE + payload.len()) as u64,
                &crc.to_le_bytes(),
            )
            .context(MmapFailedSnafu)?;
        self.mmap
            .update_region(offset, &length.to_le_bytes())
            .context(MmapFailedSnafu)
    }

    /// Payload bytes and stored CRC of the excerpt at `offset`.
    fn read_excerpt(&self, offset: u64, length: u32) -> Result<(Vec<u8>, u32)> {
        let mut payload = vec![0u8; length as usize];
        self.mmap
            .read_into(offset + EXCERPT_LENGTH_SIZE as u64, &mut payload)
            .context(MmapFailedSnafu)?;

        let mut crc_buf = [0u8; EXCERPT_CRC_SIZE];
        self.mmap
            .read_into(
                offset + (EXCERPT_LENGTH_SIZE + length as usize) as u64,
                &mut crc_buf,
            )
            .context(MmapFailedSnafu)?;

        Ok((payload, u32::from_le_bytes(crc_buf)))
    }
}

/// Write handle for the active slab.
pub(crate) struct SlabAppender {
    slab:             u32,
    data:             SlabData,
    index:            IndexWriter,
    write_position:   u64,
    next_index:       i32,
    message_capacity: u32,
}

impl SlabAppender {
    /// Create a fresh slab: a zero-filled data region of `slab_block_size`
    /// bytes plus an empty index.
    pub(crate) fn create(config: &QueueConfig, slab: u32) -> Result<Self> {
        let data_path = slab_data_path(&config.storage_directory, &config.name, slab);
        let data = SlabData::create(&data_path, config.slab_block_size)?;
        let index = IndexWriter::create(slab_index_path(
            &config.storage_directory,
            &config.name,
            slab,
        ))?;

        debug!(slab, path = ?data_path, "created slab");

        Ok(Self {
            slab,
            data,
            index,
            write_position: 0,
            next_index: 0,
            message_capacity: config.message_capacity,
        })
    }

    /// Reopen an existing slab for appending.
    ///
    /// The write position is recovered from the index, then the data region
    /// is walked forward from there so excerpts committed without a visible
    /// index entry (crash between commit and entry) are re-indexed rather
    /// than overwritten.
    pub(crate) fn resume(config: &QueueConfig, slab: u32) -> Result<Self> {
        let data = SlabData::open_rw(&slab_data_path(
            &config.storage_directory,
            &config.name,
            slab,
        ))?;
        let mut index = IndexWriter::open(slab_index_path(
            &config.storage_directory,
            &config.name,
            slab,
        ))?;

        let mut write_position = match index.last_offset()? {
            Some(offset) => offset + excerpt_disk_size(data.read_length(offset)? as usize) as u64,
            None => 0,
        };
        loop {
            if write_position + EXCERPT_LENGTH_SIZE as u64 > data.size() {
                break;
            }
            let length = data.read_length(write_position)?;
            if length == 0 {
                break;
            }
            index.append_entry(write_position)?;
            write_position += excerpt_disk_size(length as usize) as u64;
        }
        let next_index = index.entry_count() as i32;

        debug!(slab, write_position, next_index, "resumed slab");

        Ok(Self {
            slab,
            data,
            index,
            write_position,
            next_index,
            message_capacity: config.message_capacity,
        })
    }

    /// Whether the slab still admits one more excerpt.
    ///
    /// `false` means the slab is full and the engine should roll over.
    pub(crate) fn try_start_excerpt(&self) -> bool {
        let reserved = (EXCERPT_OVERHEAD + self.message_capacity as usize) as u64;
        self.write_position + reserved <= self.data.size()
    }

    /// Commit one serialized element, returning its dense excerpt index.
    pub(crate) fn finish_excerpt(&mut self, payload: &[u8]) -> Result<i32> {
        ensure!(
            payload.len() <= self.message_capacity as usize,
            ExcerptTooLargeSnafu {
                size:     payload.len(),
                capacity: self.message_capacity,
            }
        );

        let position = self.write_position;
        self.data.commit_excerpt(position, payload)?;
        self.index.append_entry(position)?;

        self.write_position += excerpt_disk_size(payload.len()) as u64;
        let committed = self.next_index;
        self.next_index += 1;

        debug!(
            slab = self.slab,
            index = committed,
            length = payload.len(),
            "committed excerpt"
        );

        Ok(committed)
    }

    pub(crate) fn slab_id(&self) -> u32 { self.slab }

    #[cfg(test)]
    pub(crate) fn next_index(&self) -> i32 { self.next_index }
}

/// Read handle over one slab, walking excerpts in commit order.
pub(crate) struct SlabTailer {
    slab:          u32,
    data:          SlabData,
    index:         IndexReader,
    read_position: u64,
    next_index:    i32,
}

impl SlabTailer {
    /// Open a tailer positioned at the start of the slab.
    pub(crate) fn open(config: &QueueConfig, slab: u32) -> Result<Self> {
        let data = SlabData::open_ro(&slab_data_path(
            &config.storage_directory,
            &config.name,
            slab,
        ))?;
        let index = IndexReader::open(slab_index_path(
            &config.storage_directory,
            &config.name,
            slab,
        ))?;

        Ok(Self {
            slab,
            data,
            index,
            read_position: 0,
            next_index: 0,
        })
    }

    pub(crate) fn seek_to_start(&mut self) {
        self.read_position = 0;
        self.next_index = 0;
    }

    /// Position the tailer just past excerpt `index`, so the next
    /// [`advance`](Self::advance) yields excerpt `index + 1`.
    ///
    /// A negative index positions at the start. Returns `false` if no such
    /// excerpt has been committed.
    pub(crate) fn seek(&mut self, index: i32) -> Result<bool> {
        if index < 0 {
            self.seek_to_start();
            return Ok(true);
        }

        if let Some(offset) = self.index.offset_of(index as u32)? {
            let length = self.data.read_length(offset)?;
            if length == 0 {
                return Ok(false);
            }
            self.read_position = offset + excerpt_disk_size(length as usize) as u64;
            self.next_index = index + 1;
            return Ok(true);
        }

        // The excerpt may be committed while its index entry is not yet
        // visible; fall back to walking the data region.
        self.seek_to_start();
        while self.next_index <= index {
            if !self.skip_one()? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Read the next excerpt, or `None` when the committed region is
    /// exhausted.
    pub(crate) fn advance(&mut self) -> Result<Option<Excerpt>> {
        if self.read_position + EXCERPT_LENGTH_SIZE as u64 > self.data.size() {
            return Ok(None);
        }

        let length = self.data.read_length(self.read_position)?;
        if length == 0 {
            return Ok(None);
        }

        let total = excerpt_disk_size(length as usize) as u64;
        ensure!(
            self.read_position + total <= self.data.size(),
            CorruptExcerptSnafu {
                slab:  self.slab,
                index: self.next_index,
            }
        );

        let (payload, stored_crc) = self.data.read_excerpt(self.read_position, length)?;
        ensure!(
            verify_excerpt_crc(length, &payload, stored_crc),
            CorruptExcerptSnafu {
                slab:  self.slab,
                index: self.next_index,
            }
        );

        let excerpt = Excerpt {
            index:   self.next_index,
            payload: Bytes::from(payload),
        };

        self.read_position += total;
        self.next_index += 1;

        Ok(Some(excerpt))
    }

    fn skip_one(&mut self) -> Result<bool> {
        if self.read_position + EXCERPT_LENGTH_SIZE as u64 > self.data.size() {
            return Ok(false);
        }
        let length = self.data.read_length(self.read_position)?;
        if length == 0 {
            return Ok(false);
        }
        self.read_position += excerpt_disk_size(length as usize) as u64;
        self.next_index += 1;
        Ok(true)
    }

    pub(crate) fn slab_id(&self) -> u32 { self.slab }

    /// Index of the excerpt the next [`advance`](Self::advance) would yield.
    pub(crate) fn next_index(&self) -> i32 { self.next_index }
}
