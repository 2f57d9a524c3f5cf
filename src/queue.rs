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

//! The queue engine.
//!
//! [`BlockingQueue`] orchestrates everything the other modules provide:
//! admission and append on the producer side, cursor-driven reads and slab
//! retirement on the consumer side, and the blocking/timed wrappers around
//! both.
//!
//! ## Concurrency model
//!
//! One producer thread and one consumer thread may operate concurrently
//! without external locking; several producers (or several consumers) need
//! external serialization. The producer's cached appender and the consumer's
//! cached tailer live behind separate mutexes, so the two sides never
//! contend. The only state crossing sides is:
//!
//! - the cursor file, updated with atomic 64-bit operations, which also makes
//!   progress visible to a process on the other end of the same directory;
//! - the active slab id, published with a release store on rollover and read
//!   with an acquire load (a stale read merely defers the consumer's slab
//!   switch by one poll);
//! - the slab lock, which covers slab creation, slab deletion and the live
//!   count derived from the directory, preserving the slab cap.
//!
//! Blocking operations wait on a condition variable with a short bounded
//! slice rather than spinning: an in-process peer wakes them immediately,
//! and a peer in another process (which cannot signal this condvar) is
//! picked up at the next slice.

use std::{
    sync::atomic::{AtomicBool, AtomicU32, Ordering},
    time::{Duration, Instant},
};

use parking_lot::{Condvar, Mutex};
use snafu::{OptionExt, ensure};
use tracing::{debug, info, warn};

use crate::{
    QueueConfig, Result,
    codec::{Deserializer, Serializer},
    cursor::{INDEX_NONE, Position},
    error::{
        CancelledSnafu, ClosedSnafu, CorruptStateSnafu, EmptyQueueSnafu, QueueFullSnafu,
        SerializeSnafu, UnsupportedSnafu,
    },
    excerpt::Excerpt,
    iter::Iter,
    path,
    slab::{SlabAppender, SlabTailer},
};

/// Upper bound on one condvar wait; cross-process progress is observed at
/// this granularity.
const WAIT_SLICE: Duration = Duration::from_millis(10);

struct ProducerState {
    appender: Option<SlabAppender>,
    scratch:  Vec<u8>,
}

struct ConsumerState {
    tailer: Option<SlabTailer>,
}

/// A persistent, file-backed blocking FIFO queue.
///
/// Elements are serialized into append-only slab file pairs under the
/// configured storage directory; the consumer's position survives restarts
/// in a memory-mapped cursor file. Fully drained slabs are deleted, and an
/// optional cap on live slabs back-pressures the producer.
pub struct BlockingQueue<E> {
    config:       QueueConfig,
    serializer:   Box<dyn Serializer<E>>,
    deserializer: Box<dyn Deserializer<E>>,
    position:     Position,
    producer:     Mutex<ProducerState>,
    consumer:     Mutex<ConsumerState>,
    /// Id of the slab currently receiving appends, published on rollover.
    active_slab:  AtomicU32,
    /// Covers slab creation and deletion, and the live count derived from
    /// the directory while held.
    slab_lock:    Mutex<()>,
    wait_lock:    Mutex<()>,
    not_empty:    Condvar,
    not_full:     Condvar,
    closed:       AtomicBool,
    cancelled:    AtomicBool,
}

impl<E> BlockingQueue<E> {
    pub(crate) fn open(
        config: QueueConfig,
        serializer: Box<dyn Serializer<E>>,
        deserializer: Box<dyn Deserializer<E>>,
    ) -> Result<Self> {
        config.validate()?;
        let dir = &config.storage_directory;
        let name = &config.name;

        let position = Position::open(path::position_path(dir, name))?;
        let ids = path::live_slab_ids(dir, name)?;

        if position.get() == 0 {
            // Fresh cursor file: point it at the head slab, nothing read.
            let head = ids.first().copied().unwrap_or(1);
            position.set((u64::from(head) << 32) | u64::from(INDEX_NONE as u32));
        }

        // A crash between cursor advance and file deletion leaves slabs the
        // cursor has already moved past; they are unreachable, drop them.
        let cursor_slab = position.slab();
        let mut live = Vec::with_capacity(ids.len());
        for id in ids {
            if id < cursor_slab {
                warn!(slab = id, "removing orphan slab left by an interrupted rollover");
                delete_slab_files(&config, id)?;
            } else {
                live.push(id);
            }
        }

        let appender = match live.last().copied() {
            Some(tail) => SlabAppender::resume(&config, tail)?,
            None => SlabAppender::create(&config, 1)?,
        };
        let active = appender.slab_id();
        let head = live.first().copied().unwrap_or(active);

        ensure!(
            (head..=active).contains(&position.slab()),
            CorruptStateSnafu {
                slab:   position.slab(),
                index:  position.index(),
                reason: "cursor points outside the live slab range".to_string(),
            }
        );

        info!(
            path = ?dir,
            name = %name,
            active_slab = active,
            "queue opened"
        );

        Ok(Self {
            config,
            serializer,
            deserializer,
            position,
            producer: Mutex::new(ProducerState {
                appender: Some(appender),
                scratch:  Vec::new(),
            }),
            consumer: Mutex::new(ConsumerState { tailer: None }),
            active_slab: AtomicU32::new(active),
            slab_lock: Mutex::new(()),
            wait_lock: Mutex::new(()),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            closed: AtomicBool::new(false),
            cancelled: AtomicBool::new(false),
        })
    }

    /// Append an element, returning `false` when the queue is full.
    ///
    /// The queue is full when the active slab refuses the excerpt and the
    /// live slab cap does not allow allocating a successor.
    pub fn offer(&self, element: E) -> Result<bool> { self.try_append(&element) }

    /// Append an element or fail with [`QueueFull`](crate::Error::QueueFull).
    pub fn add(&self, element: E) -> Result<()> {
        ensure!(self.offer(element)?, QueueFullSnafu);
        Ok(())
    }

    /// Append every element of `elements`; fails like [`add`](Self::add).
    pub fn add_all(&self, elements: impl IntoIterator<Item = E>) -> Result<()> {
        for element in elements {
            self.add(element)?;
        }
        Ok(())
    }

    /// Append an element, blocking while the queue is full.
    pub fn put(&self, element: E) -> Result<()> {
        loop {
            if self.try_append(&element)? {
                return Ok(());
            }
            self.check_cancelled()?;
            let mut guard = self.wait_lock.lock();
            let _ = self.not_full.wait_for(&mut guard, WAIT_SLICE);
        }
    }

    /// Append an element, blocking at most `timeout`; `false` when the
    /// deadline passes first.
    pub fn offer_timeout(&self, element: E, timeout: Duration) -> Result<bool> {
        let deadline = Instant::now() + timeout;
        loop {
            if self.try_append(&element)? {
                return Ok(true);
            }
            self.check_cancelled()?;
            let now = Instant::now();
            if now >= deadline {
                return Ok(false);
            }
            let mut guard = self.wait_lock.lock();
            let _ = self.not_full.wait_for(&mut guard, (deadline - now).min(WAIT_SLICE));
        }
    }

    /// Remove and return the next element, or `None` when the consumer has
    /// caught up with the producer.
    ///
    /// Exhausting a non-active slab advances the cursor to its successor in
    /// one atomic store and deletes the drained slab's files.
    pub fn poll(&self) -> Result<Option<E>> {
        self.ensure_open()?;
        let mut consumer = self.consumer.lock();
        let slab = self.position.slab();
        self.position_tailer(&mut consumer, slab)?;

        let tailer = consumer.tailer.as_mut().expect("tailer positioned");
        if let Some(excerpt) = tailer.advance()? {
            let value = self.decode(slab, &excerpt)?;
            self.position.set_index(excerpt.index);
            return Ok(Some(value));
        }

        if self.caught_up(slab)? {
            return Ok(None);
        }

        // The current slab is drained and a successor exists: move the
        // cursor first (single atomic store), open the successor, then drop
        // the drained slab's files.
        let next = self.position.advance_slab();
        consumer.tailer = Some(self.open_tailer(next)?);
        {
            let _guard = self.slab_lock.lock();
            delete_slab_files(&self.config, slab)?;
        }
        debug!(slab, "deleted drained slab");
        self.not_full.notify_one();

        let tailer = consumer.tailer.as_mut().expect("tailer positioned");
        match tailer.advance()? {
            Some(excerpt) => {
                let value = self.decode(next, &excerpt)?;
                self.position.set_index(excerpt.index);
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    /// Remove and return the next element or fail with
    /// [`EmptyQueue`](crate::Error::EmptyQueue).
    pub fn remove(&self) -> Result<E> {
        self.poll()?.context(EmptyQueueSnafu)
    }

    /// Return the next element without consuming it.
    ///
    /// Never moves the cursor and never deletes slabs; when the current slab
    /// is drained but a successor exists, the successor's first excerpt is
    /// read speculatively.
    pub fn peek(&self) -> Result<Option<E>> {
        self.ensure_open()?;
        let mut consumer = self.consumer.lock();
        let slab = self.position.slab();
        self.position_tailer(&mut consumer, slab)?;

        let tailer = consumer.tailer.as_mut().expect("tailer positioned");
        if let Some(excerpt) = tailer.advance()? {
            return self.decode(slab, &excerpt).map(Some);
        }

        if self.caught_up(slab)? {
            return Ok(None);
        }

        let mut next_tailer = self.open_tailer(slab + 1)?;
        match next_tailer.advance()? {
            Some(excerpt) => self.decode(slab + 1, &excerpt).map(Some),
            None => Ok(None),
        }
    }

    /// Like [`peek`](Self::peek) but failing with
    /// [`EmptyQueue`](crate::Error::EmptyQueue) on an empty queue.
    pub fn element(&self) -> Result<E> {
        self.peek()?.context(EmptyQueueSnafu)
    }

    /// Remove and return the next element, blocking until one is available.
    pub fn take(&self) -> Result<E> {
        loop {
            if let Some(value) = self.poll()? {
                return Ok(value);
            }
            self.check_cancelled()?;
            let mut guard = self.wait_lock.lock();
            let _ = self.not_empty.wait_for(&mut guard, WAIT_SLICE);
        }
    }

    /// Remove and return the next element, blocking at most `timeout`;
    /// `None` when the deadline passes first.
    pub fn poll_timeout(&self, timeout: Duration) -> Result<Option<E>> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(value) = self.poll()? {
                return Ok(Some(value));
            }
            self.check_cancelled()?;
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            let mut guard = self.wait_lock.lock();
            let _ = self.not_empty.wait_for(&mut guard, (deadline - now).min(WAIT_SLICE));
        }
    }

    /// Move up to `max_elements` elements into `sink`, returning how many
    /// were transferred. Stops early when the queue runs empty.
    pub fn drain_to(&self, sink: &mut Vec<E>, max_elements: usize) -> Result<usize> {
        let mut transferred = 0;
        while transferred < max_elements {
            match self.poll()? {
                Some(value) => {
                    sink.push(value);
                    transferred += 1;
                }
                None => break,
            }
        }
        Ok(transferred)
    }

    /// Number of elements currently in the queue.
    ///
    /// This walks every live excerpt — O(N) — because per-slab counts are
    /// not persisted anywhere.
    pub fn len(&self) -> Result<usize> {
        let mut count = 0;
        for element in self.iter()? {
            element?;
            count += 1;
        }
        Ok(count)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.peek()?.is_none())
    }

    /// The queue bounds slabs, not elements: element capacity is unbounded.
    pub fn remaining_capacity(&self) -> usize { usize::MAX }

    /// Not supported: slabs are append-only, so elements can only leave
    /// from the head via [`poll`](Self::poll).
    pub fn clear(&self) -> Result<()> {
        UnsupportedSnafu { operation: "clear" }.fail()
    }

    /// A read-only iterator from the cursor forward, across slab boundaries.
    ///
    /// The iterator is weakly consistent: it may observe elements appended
    /// after its creation, and it never observes elements already polled. It
    /// does not move the cursor and does not delete slabs.
    pub fn iter(&self) -> Result<Iter<'_, E>> { Iter::new(self) }

    /// Snapshot of the unread elements, in queue order.
    pub fn to_vec(&self) -> Result<Vec<E>> { self.iter()?.collect() }

    /// Request cancellation of blocking operations.
    ///
    /// The next blocked `put`/`take`/timed call observes the request, clears
    /// it and fails with [`Cancelled`](crate::Error::Cancelled).
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.not_empty.notify_all();
        self.not_full.notify_all();
    }

    /// Close the queue: release the cached slab handles and flush the
    /// cursor. Idempotent; also runs on drop. Subsequent operations fail
    /// with [`Closed`](crate::Error::Closed).
    pub fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.not_empty.notify_all();
        self.not_full.notify_all();
        self.producer.lock().appender = None;
        self.consumer.lock().tailer = None;
        self.position.flush()?;
        info!(name = %self.config.name, "queue closed");
        Ok(())
    }

    pub fn config(&self) -> &QueueConfig { &self.config }

    fn try_append(&self, element: &E) -> Result<bool> {
        self.ensure_open()?;
        let mut producer = self.producer.lock();
        let state = &mut *producer;

        let appender = state.appender.as_mut().context(ClosedSnafu)?;
        if !appender.try_start_excerpt() {
            let _guard = self.slab_lock.lock();
            if let Some(max) = self.config.max_slabs {
                let live =
                    path::live_slab_ids(&self.config.storage_directory, &self.config.name)?.len();
                if live >= max as usize {
                    return Ok(false);
                }
            }
            let next = appender.slab_id() + 1;
            state.appender = Some(SlabAppender::create(&self.config, next)?);
            self.active_slab.store(next, Ordering::Release);
            info!(slab = next, "rolled over to new slab");
        }

        // A freshly created slab always admits one excerpt (checked at
        // configuration time), so no second refusal is possible here.
        let appender = state.appender.as_mut().context(ClosedSnafu)?;
        state.scratch.clear();
        self.serializer.serialize(element, &mut state.scratch)?;
        // A zero-length payload would read back as "nothing committed here".
        ensure!(
            !state.scratch.is_empty(),
            SerializeSnafu {
                reason: "serializer produced no bytes".to_string(),
            }
        );
        appender.finish_excerpt(&state.scratch)?;
        drop(producer);

        self.not_empty.notify_one();
        Ok(true)
    }

    /// Rebuild the cached tailer if the cursor moved to another slab, and
    /// position it so the next advance yields the first unread excerpt.
    fn position_tailer(&self, consumer: &mut ConsumerState, slab: u32) -> Result<()> {
        let rebuild = match &consumer.tailer {
            Some(tailer) => tailer.slab_id() != slab,
            None => true,
        };
        if rebuild {
            consumer.tailer = Some(self.open_tailer(slab)?);
        }

        let tailer = consumer.tailer.as_mut().expect("tailer rebuilt");
        let index = self.position.index();
        if tailer.next_index() != index + 1 {
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
        Ok(())
    }

    pub(crate) fn open_tailer(&self, slab: u32) -> Result<SlabTailer> {
        ensure!(
            path::slab_data_path(&self.config.storage_directory, &self.config.name, slab).is_file(),
            CorruptStateSnafu {
                slab,
                index: self.position.index(),
                reason: "slab not found on disk".to_string(),
            }
        );
        SlabTailer::open(&self.config, slab)
    }

    /// Whether a consumer that drained `slab` has caught up with the
    /// producer.
    ///
    /// The cached active-slab id is authoritative in-process; when the
    /// cursor has reached it, the directory is consulted so slabs rolled by
    /// a producer in another process are still discovered.
    pub(crate) fn caught_up(&self, slab: u32) -> Result<bool> {
        let active = self.active_slab.load(Ordering::Acquire);
        if slab < active {
            return Ok(false);
        }
        let tail = path::tail_slab_id(&self.config.storage_directory, &self.config.name)?;
        Ok(slab >= tail)
    }

    pub(crate) fn decode(&self, slab: u32, excerpt: &Excerpt) -> Result<E> {
        self.deserializer.deserialize(&excerpt.payload).map_err(|e| {
            CorruptStateSnafu {
                slab,
                index: excerpt.index,
                reason: e.to_string(),
            }
            .build()
        })
    }

    pub(crate) fn cursor_snapshot(&self) -> (u32, i32) {
        (self.position.slab(), self.position.index())
    }

    fn ensure_open(&self) -> Result<()> {
        ensure!(!self.closed.load(Ordering::SeqCst), ClosedSnafu);
        Ok(())
    }

    fn check_cancelled(&self) -> Result<()> {
        ensure!(!self.cancelled.swap(false, Ordering::SeqCst), CancelledSnafu);
        Ok(())
    }
}

impl<E: PartialEq> BlockingQueue<E> {
    /// Whether some unread element equals `element`. Linear: every candidate
    /// is deserialized for the comparison.
    pub fn contains(&self, element: &E) -> Result<bool> {
        for candidate in self.iter()? {
            if candidate? == *element {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Whether every element of `elements` is present. Linear per element.
    pub fn contains_all(&self, elements: &[E]) -> Result<bool> {
        for element in elements {
            if !self.contains(element)? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

impl<E> Drop for BlockingQueue<E> {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

fn delete_slab_files(config: &QueueConfig, slab: u32) -> Result<()> {
    std::fs::remove_file(path::slab_index_path(
        &config.storage_directory,
        &config.name,
        slab,
    ))?;
    std::fs::remove_file(path::slab_data_path(
        &config.storage_directory,
        &config.name,
        slab,
    ))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::{Error, QueueBuilder};

    fn small_queue(dir: &std::path::Path) -> BlockingQueue<i32> {
        QueueBuilder::new(dir)
            .name("engine")
            .slab_block_size(512)
            .message_capacity(32)
            .build()
            .unwrap()
    }

    #[test]
    fn test_fifo_order() {
        let temp_dir = TempDir::new().unwrap();
        let queue = small_queue(temp_dir.path());

        for i in 0..10 {
            assert!(queue.offer(i).unwrap());
        }
        for i in 0..10 {
            assert_eq!(queue.poll().unwrap(), Some(i));
        }
        assert_eq!(queue.poll().unwrap(), None);
    }

    #[test]
    fn test_peek_is_idempotent_and_matches_poll() {
        let temp_dir = TempDir::new().unwrap();
        let queue = small_queue(temp_dir.path());

        queue.add_all([1, 2, 3]).unwrap();

        assert_eq!(queue.peek().unwrap(), Some(1));
        assert_eq!(queue.peek().unwrap(), Some(1));
        assert_eq!(queue.poll().unwrap(), Some(1));
        assert_eq!(queue.peek().unwrap(), Some(2));
        assert_eq!(queue.poll().unwrap(), Some(2));
    }

    #[test]
    fn test_remove_and_element_on_empty() {
        let temp_dir = TempDir::new().unwrap();
        let queue = small_queue(temp_dir.path());

        assert!(matches!(queue.remove(), Err(Error::EmptyQueue { .. })));
        assert!(matches!(queue.element(), Err(Error::EmptyQueue { .. })));
    }

    #[test]
    fn test_len_counts_unread() {
        let temp_dir = TempDir::new().unwrap();
        let queue = small_queue(temp_dir.path());

        assert_eq!(queue.len().unwrap(), 0);
        assert!(queue.is_empty().unwrap());

        for i in 0..7 {
            queue.add(i).unwrap();
        }
        assert_eq!(queue.len().unwrap(), 7);

        queue.poll().unwrap();
        queue.poll().unwrap();
        assert_eq!(queue.len().unwrap(), 5);
        assert!(!queue.is_empty().unwrap());
    }

    #[test]
    fn test_contains() {
        let temp_dir = TempDir::new().unwrap();
        let queue = small_queue(temp_dir.path());

        queue.add_all([10, 20, 30]).unwrap();
        assert!(queue.contains(&20).unwrap());
        assert!(!queue.contains(&99).unwrap());
        assert!(queue.contains_all(&[10, 30]).unwrap());
        assert!(!queue.contains_all(&[10, 99]).unwrap());
    }

    #[test]
    fn test_clear_is_unsupported() {
        let temp_dir = TempDir::new().unwrap();
        let queue = small_queue(temp_dir.path());
        assert!(matches!(queue.clear(), Err(Error::Unsupported { .. })));
    }

    #[test]
    fn test_close_is_idempotent_and_final() {
        let temp_dir = TempDir::new().unwrap();
        let queue = small_queue(temp_dir.path());

        queue.add(1).unwrap();
        queue.close().unwrap();
        queue.close().unwrap();
        assert!(matches!(queue.poll(), Err(Error::Closed { .. })));
        assert!(matches!(queue.offer(2), Err(Error::Closed { .. })));
    }

    #[test]
    fn test_cancel_wakes_blocked_take() {
        let temp_dir = TempDir::new().unwrap();
        let queue = std::sync::Arc::new(small_queue(temp_dir.path()));

        let handle = {
            let queue = queue.clone();
            std::thread::spawn(move || queue.take())
        };
        std::thread::sleep(Duration::from_millis(30));
        queue.cancel();

        let result = handle.join().unwrap();
        assert!(matches!(result, Err(Error::Cancelled { .. })));
    }

    #[test]
    fn test_cursor_survives_reopen() {
        let temp_dir = TempDir::new().unwrap();

        {
            let queue = small_queue(temp_dir.path());
            queue.add_all([1, 2, 3, 4]).unwrap();
            assert_eq!(queue.poll().unwrap(), Some(1));
        }

        let queue = small_queue(temp_dir.path());
        assert_eq!(queue.poll().unwrap(), Some(2));
        assert_eq!(queue.to_vec().unwrap(), vec![3, 4]);
    }
}
