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

//! The durable consumer read position.
//!
//! The position is a single 64-bit word in an 8-byte memory-mapped file,
//! packed as `(slab id << 32) | (last read excerpt index & 0xFFFF_FFFF)`.
//! Packing both halves into one word makes "advance to the next slab and
//! forget the index" a single atomic store, so no torn intermediate state is
//! ever observable — not by the other side of the queue, and not by a process
//! that reopens the file after a crash.
//!
//! The index half is a signed 32-bit value; `-1` means "no excerpt of the
//! current slab has been read yet".

use std::{fs::OpenOptions, path::Path, sync::atomic::{AtomicU64, Ordering}};

use memmap2::{MmapMut, MmapOptions};

use crate::Result;

/// Sentinel index: no excerpt of the cursor's slab has been read.
pub(crate) const INDEX_NONE: i32 = -1;

const POSITION_FILE_SIZE: u64 = 8;

/// The consumer's persistent `(slab, index)` read position.
///
/// All accessors go through a single `AtomicU64` view of the mapping, so a
/// producer and a consumer in different processes observe each other's
/// updates. The mapping is page-aligned, which guarantees the 8-byte
/// alignment platform atomics require.
pub(crate) struct Position {
    mmap: MmapMut,
}

impl Position {
    /// Map the position file, creating it (zero-filled) if absent.
    ///
    /// A fresh file reads as 0; the queue engine is responsible for replacing
    /// that with `(head slab, -1)` on first open.
    pub(crate) fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.as_ref())?;
        file.set_len(POSITION_FILE_SIZE)?;

        let mmap = unsafe {
            MmapOptions::new()
                .len(POSITION_FILE_SIZE as usize)
                .map_mut(&file)?
        };

        Ok(Self { mmap })
    }

    fn cell(&self) -> &AtomicU64 {
        debug_assert_eq!(self.mmap.as_ptr() as usize % 8, 0);
        // Safety: the mapping is exactly 8 bytes and page-aligned, and every
        // access anywhere goes through this atomic view.
        unsafe { &*self.mmap.as_ptr().cast::<AtomicU64>() }
    }

    pub(crate) fn get(&self) -> u64 { self.cell().load(Ordering::Acquire) }

    pub(crate) fn set(&self, value: u64) { self.cell().store(value, Ordering::Release) }

    pub(crate) fn compare_and_swap(&self, expected: u64, next: u64) -> bool {
        self.cell()
            .compare_exchange(expected, next, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Slab id, the high 32 bits.
    pub(crate) fn slab(&self) -> u32 { (self.get() >> 32) as u32 }

    /// Replace the slab id, preserving the index half.
    pub(crate) fn set_slab(&self, slab: u32) {
        let index_half = self.get() & 0xFFFF_FFFF;
        self.set((u64::from(slab) << 32) | index_half);
    }

    /// Last read excerpt index, the low 32 bits. `-1` means none.
    pub(crate) fn index(&self) -> i32 { self.get() as u32 as i32 }

    /// Replace the index, preserving the slab half.
    ///
    /// The value is masked to its low 32 bits so the `-1` sentinel does not
    /// sign-extend into the slab half.
    pub(crate) fn set_index(&self, index: i32) {
        let slab_half = self.get() & 0xFFFF_FFFF_0000_0000;
        self.set(slab_half | u64::from(index as u32));
    }

    /// Move to the next slab with the "nothing read" sentinel, in one atomic
    /// store. Returns the new slab id.
    pub(crate) fn advance_slab(&self) -> u32 {
        let next = self.slab() + 1;
        self.set((u64::from(next) << 32) | u64::from(INDEX_NONE as u32));
        next
    }

    pub(crate) fn flush(&self) -> Result<()> {
        self.mmap.flush()?;
        Ok(())
    }
}
