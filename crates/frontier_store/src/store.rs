//! The segment store: a durable FIFO log of work items.
//!
//! ## Directory layout
//!
//! ```text
//! <dir>/
//! ├─ lock                    # zero-length ownership marker
//! ├─ 00000000000000000000    # oldest segment (read end)
//! ├─ 00000000000000000001
//! └─ 00000000000000000002    # newest segment (write end)
//! ```
//!
//! Writes always target the newest segment; reads drain the oldest. A chain
//! of length 1 reads and writes the same file. Consumed frames are compacted
//! away immediately, so the first frame of the read segment always starts at
//! offset 0 and a crash never replays consumed items.

use crate::error::{StoreError, StoreResult};
use crate::gate::AdmissionGate;
use crate::segment::{self, Segment, FRAME_HEADER};
use frontier_codec::{decode_item, encode_item, WorkItem};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fs::{self, OpenOptions};
use std::io::ErrorKind;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, trace};

/// Name of the advisory lock file inside a store directory.
pub const LOCK_FILE: &str = "lock";

/// Default segment capacity: 4 MiB.
pub const DEFAULT_SEGMENT_CAPACITY: usize = 4 * 1024 * 1024;

/// Configuration for opening a segment store.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Capacity of newly created segment files in bytes.
    pub segment_capacity: usize,

    /// Whether to sync the mapping after every single `put`.
    ///
    /// Batched puts always sync once at the end of the batch regardless.
    pub flush_each_put: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            segment_capacity: DEFAULT_SEGMENT_CAPACITY,
            flush_each_put: true,
        }
    }
}

impl StoreConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the capacity of newly created segments.
    #[must_use]
    pub const fn segment_capacity(mut self, bytes: usize) -> Self {
        self.segment_capacity = bytes;
        self
    }

    /// Sets whether each single `put` syncs immediately.
    #[must_use]
    pub const fn flush_each_put(mut self, value: bool) -> Self {
        self.flush_each_put = value;
        self
    }
}

struct StoreInner {
    /// Oldest segment at the front, newest at the back.
    chain: VecDeque<Segment>,
    /// Offset of the zero sentinel in the newest segment.
    write_pos: usize,
    /// Sequence number for the next segment file.
    next_seq: u64,
    open: bool,
}

/// A crash-recoverable FIFO store of work items, backed by a chain of
/// memory-mapped segment files.
///
/// # Thread Safety
///
/// All operations are safe to call from multiple threads; one coarse mutex
/// guards both cursors, so at most one mutation is in flight per store.
/// Process-level exclusion is enforced separately by the `lock` file.
pub struct SegmentStore<T: WorkItem> {
    dir: PathBuf,
    config: StoreConfig,
    gate: Option<Arc<dyn AdmissionGate>>,
    inner: Mutex<StoreInner>,
    _item: PhantomData<fn() -> T>,
}

impl<T: WorkItem> SegmentStore<T> {
    /// Opens a store directory, creating it if missing.
    ///
    /// # Errors
    ///
    /// - [`StoreError::AlreadyLocked`] if the lock file exists — another
    ///   process owns the directory, or the previous owner never called
    ///   [`shutdown`](Self::shutdown).
    /// - [`StoreError::NotSafelyShutdown`] if the directory contains any
    ///   entry that is neither a segment file nor the lock file.
    /// - [`StoreError::Corrupted`] if a segment's frames are inconsistent.
    pub fn open(dir: impl AsRef<Path>, config: StoreConfig) -> StoreResult<Self> {
        Self::open_inner(dir.as_ref(), config, None)
    }

    /// Opens a store with a deduplication gate on the put path.
    pub fn open_with_gate(
        dir: impl AsRef<Path>,
        config: StoreConfig,
        gate: Arc<dyn AdmissionGate>,
    ) -> StoreResult<Self> {
        Self::open_inner(dir.as_ref(), config, Some(gate))
    }

    fn open_inner(
        dir: &Path,
        config: StoreConfig,
        gate: Option<Arc<dyn AdmissionGate>>,
    ) -> StoreResult<Self> {
        fs::create_dir_all(dir)?;

        let mut seqs = Vec::new();
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();

            if name == LOCK_FILE {
                return Err(StoreError::AlreadyLocked {
                    path: dir.to_path_buf(),
                });
            }
            let is_file = entry.file_type()?.is_file();
            match segment::parse_file_name(&name) {
                Some(seq) if is_file => seqs.push(seq),
                _ => {
                    return Err(StoreError::NotSafelyShutdown {
                        path: dir.to_path_buf(),
                        entry: name,
                    })
                }
            }
        }
        seqs.sort_unstable();

        let mut chain = VecDeque::with_capacity(seqs.len());
        for &seq in &seqs {
            let path = dir.join(segment::file_name(seq));
            chain.push_back(Segment::open(&path, seq)?);
        }

        let write_pos = match chain.back() {
            Some(newest) => recover_write_pos(newest)?,
            None => 0,
        };
        let next_seq = seqs.last().map_or(0, |last| last + 1);

        // Claimed atomically: a concurrent open loses the create_new race.
        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(dir.join(LOCK_FILE))
        {
            Ok(_) => {}
            Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                return Err(StoreError::AlreadyLocked {
                    path: dir.to_path_buf(),
                });
            }
            Err(err) => return Err(err.into()),
        }

        info!(
            dir = %dir.display(),
            segments = chain.len(),
            "segment store opened"
        );

        Ok(Self {
            dir: dir.to_path_buf(),
            config,
            gate,
            inner: Mutex::new(StoreInner {
                chain,
                write_pos,
                next_seq,
                open: true,
            }),
            _item: PhantomData,
        })
    }

    /// Returns the store directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Appends one item to the write end of the store.
    ///
    /// Returns `false` if the attached gate reported the item's label as
    /// already admitted and `force` was not set (the item is silently
    /// dropped, per the at-most-once admission contract).
    ///
    /// # Errors
    ///
    /// [`StoreError::NoSpaceForPut`] if the framed item exceeds the segment
    /// capacity; this is permanent for the item.
    pub fn put(&self, item: &T, force: bool) -> StoreResult<bool> {
        if !self.admit(item, force) {
            return Ok(false);
        }

        let payload = encode_item(item)?;
        let mut inner = self.inner.lock();
        self.append_locked(&mut inner, &payload)?;
        if self.config.flush_each_put {
            if let Some(seg) = inner.chain.back() {
                seg.flush()?;
            }
        }
        Ok(true)
    }

    /// Appends a batch of items, syncing the mapping once at the end.
    ///
    /// Returns the number of items actually written (gate-dropped items are
    /// not counted).
    pub fn put_batch(&self, items: &[T], force: bool) -> StoreResult<usize> {
        let mut payloads = Vec::with_capacity(items.len());
        for item in items {
            if self.admit(item, force) {
                payloads.push(encode_item(item)?);
            }
        }
        if payloads.is_empty() {
            return Ok(0);
        }

        let mut inner = self.inner.lock();
        for payload in &payloads {
            self.append_locked(&mut inner, payload)?;
        }
        if let Some(seg) = inner.chain.back() {
            seg.flush()?;
        }
        Ok(payloads.len())
    }

    /// Pops the oldest item, or `None` if the store is empty.
    pub fn get(&self) -> StoreResult<Option<T>> {
        let mut inner = self.inner.lock();
        let Some(payload) = self.pop_locked(&mut inner)? else {
            return Ok(None);
        };
        if let Some(seg) = inner.chain.front() {
            seg.flush()?;
        }
        Ok(Some(decode_item(&payload)?))
    }

    /// Pops up to `size` items in FIFO order, syncing once at the end.
    pub fn get_batch(&self, size: usize) -> StoreResult<Vec<T>> {
        let mut inner = self.inner.lock();
        let mut items = Vec::new();
        while items.len() < size {
            match self.pop_locked(&mut inner)? {
                Some(payload) => items.push(decode_item(&payload)?),
                None => break,
            }
        }
        if !items.is_empty() {
            if let Some(seg) = inner.chain.front() {
                seg.flush()?;
            }
        }
        Ok(items)
    }

    /// Syncs every mapped segment to durable storage.
    pub fn flush(&self) -> StoreResult<()> {
        let inner = self.inner.lock();
        if !inner.open {
            return Err(StoreError::Closed);
        }
        for seg in &inner.chain {
            seg.flush()?;
        }
        Ok(())
    }

    /// Returns the number of segment files in the chain.
    #[must_use]
    pub fn segment_count(&self) -> usize {
        self.inner.lock().chain.len()
    }

    /// Counts the frames currently stored across the chain.
    pub fn frame_count(&self) -> StoreResult<usize> {
        let inner = self.inner.lock();
        if !inner.open {
            return Err(StoreError::Closed);
        }
        let mut count = 0;
        for seg in &inner.chain {
            let mut offset = 0;
            loop {
                let len = seg.frame_len_at(offset);
                if len == 0 {
                    break;
                }
                if offset + FRAME_HEADER + len > seg.capacity() {
                    return Err(StoreError::corrupted(format!(
                        "frame at offset {offset} overruns segment {}",
                        seg.seq()
                    )));
                }
                count += 1;
                offset += FRAME_HEADER + len;
            }
        }
        Ok(count)
    }

    /// Returns whether the store holds no items.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        let inner = self.inner.lock();
        inner
            .chain
            .iter()
            .all(|seg| seg.frame_len_at(0) == 0)
    }

    /// Flushes, unmaps every segment, and removes the lock file.
    ///
    /// Idempotent: calling it on an already-closed store is a no-op. Once
    /// closed, all other operations fail with [`StoreError::Closed`].
    pub fn shutdown(&self) -> StoreResult<()> {
        let mut inner = self.inner.lock();
        if !inner.open {
            return Ok(());
        }
        for seg in &inner.chain {
            seg.flush()?;
        }
        inner.chain.clear();
        inner.open = false;

        fs::remove_file(self.dir.join(LOCK_FILE))?;
        info!(dir = %self.dir.display(), "segment store shut down");
        Ok(())
    }

    fn admit(&self, item: &T, force: bool) -> bool {
        if force {
            return true;
        }
        match &self.gate {
            Some(gate) => {
                let label = item.label();
                if gate.check(&label) {
                    trace!(label = %label, "duplicate label dropped");
                    false
                } else {
                    true
                }
            }
            None => true,
        }
    }

    fn append_locked(&self, inner: &mut StoreInner, payload: &[u8]) -> StoreResult<()> {
        if !inner.open {
            return Err(StoreError::Closed);
        }
        let frame_total = FRAME_HEADER + payload.len();
        if frame_total > self.config.segment_capacity {
            return Err(StoreError::NoSpaceForPut {
                size: frame_total,
                capacity: self.config.segment_capacity,
            });
        }

        let fits = inner
            .chain
            .back()
            .map(|seg| inner.write_pos + frame_total <= seg.capacity());
        match fits {
            Some(true) => {}
            Some(false) => {
                // Seal the full segment and rotate to a fresh one.
                if let Some(seg) = inner.chain.back() {
                    seg.flush()?;
                }
                self.push_segment(inner)?;
            }
            None => self.push_segment(inner)?,
        }

        let write_pos = inner.write_pos;
        let seg = inner
            .chain
            .back_mut()
            .ok_or_else(|| StoreError::corrupted("chain empty after rotation"))?;
        seg.write_frame(write_pos, payload);
        inner.write_pos += frame_total;
        Ok(())
    }

    fn push_segment(&self, inner: &mut StoreInner) -> StoreResult<()> {
        let seq = inner.next_seq;
        let seg = Segment::create(&self.dir, seq, self.config.segment_capacity)?;
        debug!(dir = %self.dir.display(), seq, "new write segment");
        inner.chain.push_back(seg);
        inner.next_seq += 1;
        inner.write_pos = 0;
        Ok(())
    }

    fn pop_locked(&self, inner: &mut StoreInner) -> StoreResult<Option<Vec<u8>>> {
        if !inner.open {
            return Err(StoreError::Closed);
        }
        loop {
            let (len, capacity, seq) = match inner.chain.front() {
                None => return Ok(None),
                Some(front) => (front.frame_len_at(0), front.capacity(), front.seq()),
            };

            if len == 0 {
                if inner.chain.len() == 1 {
                    // The lone segment is also the write target; keep it.
                    return Ok(None);
                }
                if let Some(exhausted) = inner.chain.pop_front() {
                    debug!(dir = %self.dir.display(), seq = exhausted.seq(), "segment drained");
                    exhausted.delete()?;
                }
                continue;
            }

            let frame_total = FRAME_HEADER + len;
            if frame_total > capacity {
                return Err(StoreError::corrupted(format!(
                    "frame of {len} bytes overruns segment {seq}"
                )));
            }

            let Some(front) = inner.chain.front_mut() else {
                return Ok(None);
            };
            let payload = front.payload_at(0, len);
            front.consume_front(frame_total);
            if inner.chain.len() == 1 {
                inner.write_pos -= frame_total;
            }
            return Ok(Some(payload));
        }
    }
}

impl<T: WorkItem> std::fmt::Debug for SegmentStore<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SegmentStore")
            .field("dir", &self.dir)
            .field("segment_capacity", &self.config.segment_capacity)
            .field("segments", &self.segment_count())
            .finish_non_exhaustive()
    }
}

/// Walks the newest segment's frames to find the write cursor.
fn recover_write_pos(seg: &Segment) -> StoreResult<usize> {
    let mut offset = 0;
    loop {
        let len = seg.frame_len_at(offset);
        if len == 0 {
            return Ok(offset);
        }
        if offset + FRAME_HEADER + len > seg.capacity() {
            return Err(StoreError::corrupted(format!(
                "frame at offset {offset} overruns segment {}",
                seg.seq()
            )));
        }
        offset += FRAME_HEADER + len;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use tempfile::tempdir;

    fn open_store(dir: &Path) -> SegmentStore<String> {
        SegmentStore::open(dir, StoreConfig::default()).unwrap()
    }

    #[test]
    fn fifo_order() {
        let dir = tempdir().unwrap();
        let store = open_store(dir.path());

        for item in ["a", "b", "c"] {
            assert!(store.put(&item.to_string(), false).unwrap());
        }

        assert_eq!(store.get().unwrap().as_deref(), Some("a"));
        assert_eq!(store.get().unwrap().as_deref(), Some("b"));
        assert_eq!(store.get().unwrap().as_deref(), Some("c"));
        assert_eq!(store.get().unwrap(), None);
    }

    #[test]
    fn get_on_fresh_store_is_empty() {
        let dir = tempdir().unwrap();
        let store = open_store(dir.path());
        assert_eq!(store.get().unwrap(), None);
        assert!(store.is_empty());
        assert_eq!(store.segment_count(), 0);
    }

    #[test]
    fn rotation_creates_second_segment_and_preserves_order() {
        let dir = tempdir().unwrap();
        // Room for exactly one framed small item: 4 (len) + 1 (tag) + 1 (char).
        let config = StoreConfig::new().segment_capacity(6);
        let store: SegmentStore<String> = SegmentStore::open(dir.path(), config).unwrap();

        assert!(store.put(&"x".to_string(), false).unwrap());
        assert!(store.put(&"y".to_string(), false).unwrap());
        assert_eq!(store.segment_count(), 2);

        assert_eq!(store.get().unwrap().as_deref(), Some("x"));
        assert_eq!(store.get().unwrap().as_deref(), Some("y"));
        assert_eq!(store.get().unwrap(), None);
        // The drained older segment was deleted along the way.
        assert_eq!(store.segment_count(), 1);
    }

    #[test]
    fn oversized_item_is_rejected() {
        let dir = tempdir().unwrap();
        let config = StoreConfig::new().segment_capacity(16);
        let store: SegmentStore<String> = SegmentStore::open(dir.path(), config).unwrap();

        let result = store.put(&"a".repeat(64), false);
        assert!(matches!(
            result,
            Err(StoreError::NoSpaceForPut { capacity: 16, .. })
        ));
    }

    #[test]
    fn stray_file_fails_open() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("notes.txt"), b"oops").unwrap();

        let result = SegmentStore::<String>::open(dir.path(), StoreConfig::default());
        assert!(matches!(
            result,
            Err(StoreError::NotSafelyShutdown { ref entry, .. }) if entry == "notes.txt"
        ));

        // Removing the stray entry allows a clean open.
        fs::remove_file(dir.path().join("notes.txt")).unwrap();
        let store = SegmentStore::<String>::open(dir.path(), StoreConfig::default()).unwrap();
        store.shutdown().unwrap();
    }

    #[test]
    fn existing_lock_fails_open() {
        let dir = tempdir().unwrap();
        let first = open_store(dir.path());

        let result = SegmentStore::<String>::open(dir.path(), StoreConfig::default());
        assert!(matches!(result, Err(StoreError::AlreadyLocked { .. })));

        first.shutdown().unwrap();
        let second = SegmentStore::<String>::open(dir.path(), StoreConfig::default()).unwrap();
        second.shutdown().unwrap();
    }

    #[test]
    fn shutdown_is_idempotent() {
        let dir = tempdir().unwrap();
        let store = open_store(dir.path());
        store.shutdown().unwrap();
        store.shutdown().unwrap();
        assert!(matches!(
            store.put(&"a".to_string(), false),
            Err(StoreError::Closed)
        ));
    }

    #[test]
    fn restart_recovers_unread_items() {
        let dir = tempdir().unwrap();
        {
            let store = open_store(dir.path());
            store
                .put_batch(
                    &["one".to_string(), "two".to_string(), "three".to_string()],
                    false,
                )
                .unwrap();
            assert_eq!(store.get().unwrap().as_deref(), Some("one"));
            store.shutdown().unwrap();
        }

        let store = open_store(dir.path());
        assert_eq!(store.frame_count().unwrap(), 2);
        assert_eq!(store.get().unwrap().as_deref(), Some("two"));
        assert_eq!(store.get().unwrap().as_deref(), Some("three"));
        assert_eq!(store.get().unwrap(), None);
    }

    #[test]
    fn restart_appends_after_recovered_cursor() {
        let dir = tempdir().unwrap();
        {
            let store = open_store(dir.path());
            store.put(&"early".to_string(), false).unwrap();
            store.shutdown().unwrap();
        }

        let store = open_store(dir.path());
        store.put(&"late".to_string(), false).unwrap();
        assert_eq!(store.get().unwrap().as_deref(), Some("early"));
        assert_eq!(store.get().unwrap().as_deref(), Some("late"));
    }

    #[test]
    fn get_batch_drains_across_segments() {
        let dir = tempdir().unwrap();
        let config = StoreConfig::new().segment_capacity(32);
        let store: SegmentStore<String> = SegmentStore::open(dir.path(), config).unwrap();

        let items: Vec<String> = (0..10).map(|i| format!("item-{i}")).collect();
        assert_eq!(store.put_batch(&items, false).unwrap(), 10);
        assert!(store.segment_count() > 1);

        let drained = store.get_batch(100).unwrap();
        assert_eq!(drained, items);
        assert_eq!(store.get().unwrap(), None);
    }

    struct RecordingGate {
        seen: Mutex<std::collections::HashSet<String>>,
    }

    impl AdmissionGate for RecordingGate {
        fn check(&self, label: &str) -> bool {
            !self.seen.lock().insert(label.to_owned())
        }
    }

    #[test]
    fn gate_drops_duplicates_unless_forced() {
        let dir = tempdir().unwrap();
        let gate = Arc::new(RecordingGate {
            seen: Mutex::new(std::collections::HashSet::new()),
        });
        let store: SegmentStore<String> =
            SegmentStore::open_with_gate(dir.path(), StoreConfig::default(), gate).unwrap();

        assert!(store.put(&"url".to_string(), false).unwrap());
        assert!(!store.put(&"url".to_string(), false).unwrap());
        assert!(store.put(&"url".to_string(), true).unwrap());

        assert_eq!(store.frame_count().unwrap(), 2);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn puts_drain_in_order(items in proptest::collection::vec("[a-z]{1,24}", 1..40)) {
            let dir = tempdir().unwrap();
            let config = StoreConfig::new().segment_capacity(64).flush_each_put(false);
            let store: SegmentStore<String> = SegmentStore::open(dir.path(), config).unwrap();

            for item in &items {
                prop_assert!(store.put(item, false).unwrap());
            }

            let mut drained = Vec::new();
            while let Some(item) = store.get().unwrap() {
                drained.push(item);
            }
            prop_assert_eq!(drained, items);
        }
    }
}
