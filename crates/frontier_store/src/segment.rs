//! A single fixed-capacity memory-mapped segment file.
//!
//! A segment holds length-prefixed frames packed from offset 0:
//!
//! ```text
//! | len (4, LE) | payload (len) | len (4, LE) | payload | 0x00000000 ... |
//! ```
//!
//! A zero length field marks the live end of the segment's content; the
//! region after it is zero-filled. Frames never straddle the capacity
//! boundary — if fewer than [`FRAME_HEADER`] bytes remain, the segment is
//! full by definition.

use crate::error::{StoreError, StoreResult};
use memmap2::MmapMut;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

/// Size of the length prefix on every frame.
pub const FRAME_HEADER: usize = 4;

/// One memory-mapped segment file in a chain.
pub(crate) struct Segment {
    seq: u64,
    path: PathBuf,
    mmap: MmapMut,
}

impl Segment {
    /// Creates a new zero-filled segment of `capacity` bytes.
    pub(crate) fn create(dir: &Path, seq: u64, capacity: usize) -> StoreResult<Self> {
        let path = dir.join(file_name(seq));
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(&path)?;
        file.set_len(capacity as u64)?;

        // SAFETY: the store holds the only handle to this file for its
        // whole lifetime (directory ownership is enforced by the lock file).
        let mmap = unsafe { MmapMut::map_mut(&file)? };

        Ok(Self { seq, path, mmap })
    }

    /// Opens an existing segment file.
    pub(crate) fn open(path: &Path, seq: u64) -> StoreResult<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let len = file.metadata()?.len();
        if len < FRAME_HEADER as u64 {
            return Err(StoreError::corrupted(format!(
                "segment {} is only {len} bytes",
                path.display()
            )));
        }

        // SAFETY: as in `create`, exclusive file ownership.
        let mmap = unsafe { MmapMut::map_mut(&file)? };

        Ok(Self {
            seq,
            path: path.to_path_buf(),
            mmap,
        })
    }

    pub(crate) fn seq(&self) -> u64 {
        self.seq
    }

    pub(crate) fn capacity(&self) -> usize {
        self.mmap.len()
    }

    /// Reads the length field at `offset`, or 0 if no frame can start there.
    pub(crate) fn frame_len_at(&self, offset: usize) -> usize {
        if offset + FRAME_HEADER > self.capacity() {
            return 0;
        }
        let bytes: [u8; FRAME_HEADER] = self.mmap[offset..offset + FRAME_HEADER]
            .try_into()
            .unwrap_or([0; FRAME_HEADER]);
        u32::from_le_bytes(bytes) as usize
    }

    /// Copies out the payload of the frame starting at `offset`.
    ///
    /// The caller has already validated the length against the capacity.
    pub(crate) fn payload_at(&self, offset: usize, len: usize) -> Vec<u8> {
        let start = offset + FRAME_HEADER;
        self.mmap[start..start + len].to_vec()
    }

    /// Writes a frame at `offset`. The caller has verified it fits.
    pub(crate) fn write_frame(&mut self, offset: usize, payload: &[u8]) {
        let len = payload.len() as u32;
        self.mmap[offset..offset + FRAME_HEADER].copy_from_slice(&len.to_le_bytes());
        self.mmap[offset + FRAME_HEADER..offset + FRAME_HEADER + payload.len()]
            .copy_from_slice(payload);
    }

    /// Removes the leading `frame_total` bytes by shifting the rest of the
    /// segment left and zero-filling the tail.
    ///
    /// Keeps the read cursor pinned at offset 0, so a reopened store never
    /// sees a partially-consumed prefix.
    pub(crate) fn consume_front(&mut self, frame_total: usize) {
        let capacity = self.capacity();
        self.mmap.copy_within(frame_total..capacity, 0);
        self.mmap[capacity - frame_total..].fill(0);
    }

    /// Forces mapped changes to durable storage.
    pub(crate) fn flush(&self) -> StoreResult<()> {
        self.mmap.flush()?;
        Ok(())
    }

    /// Unmaps and deletes the segment file.
    pub(crate) fn delete(self) -> StoreResult<()> {
        let path = self.path.clone();
        drop(self);
        std::fs::remove_file(&path)?;
        Ok(())
    }
}

impl std::fmt::Debug for Segment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Segment")
            .field("seq", &self.seq)
            .field("path", &self.path)
            .field("capacity", &self.capacity())
            .finish()
    }
}

/// Builds a segment file name from a sequence number.
///
/// Zero-padded decimal so lexicographic order equals numeric order.
pub(crate) fn file_name(seq: u64) -> String {
    format!("{seq:020}")
}

/// Parses a directory entry name as a segment sequence number.
pub(crate) fn parse_file_name(name: &str) -> Option<u64> {
    if name.is_empty() || !name.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    name.parse().ok()
}
