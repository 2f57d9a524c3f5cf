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

//! Read-only traversal of the unread elements.
//!
//! The iterator captures the cursor at construction and walks forward over
//! its own tailer, crossing slab boundaries until the active slab is
//! exhausted. It never moves the cursor and never deletes slabs, so it can
//! run next to a live consumer.
//!
//! Iteration is weakly consistent: elements appended while iterating may or
//! may not be observed; elements already polled never are.

use snafu::ensure;

use crate::{BlockingQueue, Result, error::CorruptStateSnafu, slab::SlabTailer};

pub struct Iter<'a, E> {
    queue:  &'a BlockingQueue<E>,
    slab:   u32,
    tailer: Option<SlabTailer>,
}

impl<'a, E> Iter<'a, E> {
    pub(crate) fn new(queue: &'a BlockingQueue<E>) -> Result<Self> {
        let (slab, index) = queue.cursor_snapshot();
        let mut tailer = queue.open_tailer(slab)?;
        if index >= 0 {
            let found = tailer.seek(index)?;
            ensure!(
                found,
                CorruptStateSnafu {
                    slab,
                    index,
                    reason: "cursor index not found in slab".to_string(),
                }
            );
        }
        Ok(Self {
            queue,
            slab,
            tailer: Some(tailer),
        })
    }
}

impl<E> Iterator for Iter<'_, E> {
    type Item = Result<E>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let tailer = self.tailer.as_mut()?;
            match tailer.advance() {
                Err(e) => {
                    self.tailer = None;
                    return Some(Err(e));
                }
                Ok(Some(excerpt)) => return Some(self.queue.decode(self.slab, &excerpt)),
                Ok(None) => match self.queue.caught_up(self.slab) {
                    Err(e) => {
                        self.tailer = None;
                        return Some(Err(e));
                    }
                    Ok(true) => {
                        self.tailer = None;
                        return None;
                    }
                    Ok(false) => {
                        self.slab += 1;
                        match self.queue.open_tailer(self.slab) {
                            Ok(tailer) => self.tailer = Some(tailer),
                            Err(e) => {
                                self.tailer = None;
                                return Some(Err(e));
                            }
                        }
                    }
                },
            }
        }
    }
}
