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

//! Dense per-slab excerpt index.
//!
//! Excerpt indexes are dense within a slab, so the index file is simply the
//! table of data-file offsets: entry `i` is the byte offset where excerpt `i`
//! starts. Seeking a tailer to an excerpt index is one table lookup.
//!
//! ## Index File Format
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      Header (16 bytes)                       │
//! ├─────────────────────┬────────────────────────────────────────┤
//! │ entry_count (8B LE) │ reserved (8B)                          │
//! └─────────────────────┴────────────────────────────────────────┘
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      Entries (8B each)                       │
//! ├──────────────────────────────────────────────────────────────┤
//! │ offset of excerpt 0 (8B LE)                                  │
//! │ offset of excerpt 1 (8B LE)                                  │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! The entry is appended before the header count is bumped, so a reader never
//! sees a count pointing past the written entries.

use std::{
    fs::{File, OpenOptions},
    io::{Read, Seek, SeekFrom, Write},
    path::Path,
};

use crate::Result;

/// Size of the index file header in bytes.
const INDEX_HEADER_SIZE: u64 = 16;

/// Size of each index entry in bytes.
const INDEX_ENTRY_SIZE: u64 = 8;

/// Appends offset entries for committed excerpts.
pub(crate) struct IndexWriter {
    file:        File,
    entry_count: u64,
}

impl IndexWriter {
    /// Create a new, empty index file. Truncates anything already there.
    pub(crate) fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path.as_ref())?;

        let header = [0u8; INDEX_HEADER_SIZE as usize];
        file.write_all(&header)?;

        Ok(Self {
            file,
            entry_count: 0,
        })
    }

    /// Open an existing index file, recovering the entry count from the
    /// header.
    pub(crate) fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = OpenOptions::new().read(true).write(true).open(path.as_ref())?;

        let mut header = [0u8; INDEX_HEADER_SIZE as usize];
        file.read_exact(&mut header)?;
        let entry_count = u64::from_le_bytes(header[0..8].try_into().unwrap());

        Ok(Self { file, entry_count })
    }

    /// Record the data-file offset of the next committed excerpt.
    ///
    /// The entry lands before the header count is updated, and the count
    /// update is flushed immediately so a tailer in another process can
    /// trust it.
    pub(crate) fn append_entry(&mut self, offset: u64) -> Result<()> {
        let entry_pos = INDEX_HEADER_SIZE + self.entry_count * INDEX_ENTRY_SIZE;
        self.file.seek(SeekFrom::Start(entry_pos))?;
        self.file.write_all(&offset.to_le_bytes())?;

        self.entry_count += 1;
        self.file.seek(SeekFrom::Start(0))?;
        self.file.write_all(&self.entry_count.to_le_bytes())?;
        self.file.flush()?;

        Ok(())
    }

    /// Number of entries, equal to the number of committed excerpts.
    pub(crate) fn entry_count(&self) -> u64 { self.entry_count }

    /// Offset recorded for the last entry, if any.
    pub(crate) fn last_offset(&mut self) -> Result<Option<u64>> {
        if self.entry_count == 0 {
            return Ok(None);
        }
        let entry_pos = INDEX_HEADER_SIZE + (self.entry_count - 1) * INDEX_ENTRY_SIZE;
        self.file.seek(SeekFrom::Start(entry_pos))?;
        let mut buf = [0u8; INDEX_ENTRY_SIZE as usize];
        self.file.read_exact(&mut buf)?;
        Ok(Some(u64::from_le_bytes(buf)))
    }
}

/// Reads offset entries for excerpt-index → offset lookup.
///
/// Lookups go to the file every time rather than through a loaded snapshot:
/// the index keeps growing while its slab is active, and the current entry
/// count is what makes a lookup trustworthy.
pub(crate) struct IndexReader {
    file: File,
}

impl IndexReader {
    pub(crate) fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self {
            file: File::open(path.as_ref())?,
        })
    }

    /// Current number of committed entries.
    pub(crate) fn entry_count(&mut self) -> Result<u64> {
        self.file.seek(SeekFrom::Start(0))?;
        let mut buf = [0u8; 8];
        self.file.read_exact(&mut buf)?;
        Ok(u64::from_le_bytes(buf))
    }

    /// Data-file offset of excerpt `index`, or `None` if no such entry has
    /// been committed yet.
    pub(crate) fn offset_of(&mut self, index: u32) -> Result<Option<u64>> {
        if u64::from(index) >= self.entry_count()? {
            return Ok(None);
        }
        let entry_pos = INDEX_HEADER_SIZE + u64::from(index) * INDEX_ENTRY_SIZE;
        self.file.seek(SeekFrom::Start(entry_pos))?;
        let mut buf = [0u8; INDEX_ENTRY_SIZE as usize];
        self.file.read_exact(&mut buf)?;
        Ok(Some(u64::from_le_bytes(buf)))
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn test_create_then_reopen_empty() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("slab.index");

        {
            let writer = IndexWriter::create(&path).unwrap();
            assert_eq!(writer.entry_count(), 0);
        }

        let writer = IndexWriter::open(&path).unwrap();
        assert_eq!(writer.entry_count(), 0);
    }

    #[test]
    fn test_append_and_lookup() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("slab.index");

        let mut writer = IndexWriter::create(&path).unwrap();
        for offset in [0u64, 20, 64, 100] {
            writer.append_entry(offset).unwrap();
        }
        assert_eq!(writer.entry_count(), 4);
        assert_eq!(writer.last_offset().unwrap(), Some(100));

        let mut reader = IndexReader::open(&path).unwrap();
        assert_eq!(reader.entry_count().unwrap(), 4);
        assert_eq!(reader.offset_of(0).unwrap(), Some(0));
        assert_eq!(reader.offset_of(2).unwrap(), Some(64));
        assert_eq!(reader.offset_of(4).unwrap(), None);
    }

    #[test]
    fn test_reader_sees_entries_appended_after_open() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("slab.index");

        let mut writer = IndexWriter::create(&path).unwrap();
        writer.append_entry(0).unwrap();

        let mut reader = IndexReader::open(&path).unwrap();
        assert_eq!(reader.offset_of(1).unwrap(), None);

        writer.append_entry(42).unwrap();
        assert_eq!(reader.offset_of(1).unwrap(), Some(42));
    }

    #[test]
    fn test_writer_resumes_count_on_open() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("slab.index");

        {
            let mut writer = IndexWriter::create(&path).unwrap();
            writer.append_entry(0).unwrap();
            writer.append_entry(30).unwrap();
        }

        let mut writer = IndexWriter::open(&path).unwrap();
        assert_eq!(writer.entry_count(), 2);
        writer.append_entry(60).unwrap();

        let mut reader = IndexReader::open(&path).unwrap();
        assert_eq!(reader.offset_of(2).unwrap(), Some(60));
    }
}
