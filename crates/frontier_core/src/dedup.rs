//! Probabilistic deduplication gate.
//!
//! A bloom filter keyed by work-item labels. `exist` both queries and
//! records admission, so each distinct label passes the gate at most once
//! per filter lifetime; false positives are bounded by the configured error
//! rate, false negatives cannot occur (bits are only ever set).
//!
//! ## Snapshot format
//!
//! ```text
//! | magic (4) | version (2) | capacity (8) | error_rate (8) | k (4) | m (8) | bits |
//! ```
//!
//! All integers little-endian; `error_rate` is the IEEE-754 bit pattern.
//! The snapshot is written atomically (temp file, fsync, rename, directory
//! fsync). A filter cannot be resized in place: reloading with a larger
//! capacity or a smaller error rate than persisted discards the old bit
//! array and starts fresh.

use crate::error::{CoreError, CoreResult};
use crate::persist::write_atomic;
use frontier_store::AdmissionGate;
use parking_lot::Mutex;
use sha2::{Digest, Sha512};
use std::f64::consts::LN_2;
use std::fs;
use std::path::PathBuf;
use tracing::{debug, info};

/// Magic bytes identifying a dedup snapshot file.
pub const SNAPSHOT_MAGIC: [u8; 4] = *b"FDUP";

/// Current snapshot format version.
pub const SNAPSHOT_VERSION: u16 = 1;

const HEADER_LEN: usize = 4 + 2 + 8 + 8 + 4 + 8;

struct Bloom {
    bits: Vec<u8>,
    /// Bit-array length in bits.
    m: u64,
    /// Number of hash positions per key.
    k: u32,
    capacity: u64,
    error_rate: f64,
}

impl Bloom {
    fn with_params(capacity: u64, error_rate: f64) -> Self {
        // m = ceil(capacity * ln(err) / ln(1 / 2^ln2)), k = ceil(ln2 * m / capacity)
        let denominator = (1.0 / 2f64.powf(LN_2)).ln();
        let m = ((capacity as f64) * error_rate.ln() / denominator).ceil();
        let m = (m as u64).max(64);
        let k = ((LN_2 * m as f64) / (capacity as f64).max(1.0)).ceil();
        let k = (k as u32).max(1);

        Self {
            bits: vec![0u8; ((m + 7) / 8) as usize],
            m,
            k,
            capacity,
            error_rate,
        }
    }

    /// Derives the k bit positions for a key by chunking one SHA-512 digest
    /// into 4-byte words, re-hashing for more words when k exceeds 16.
    fn positions(&self, key: &str) -> Vec<u64> {
        let mut positions = Vec::with_capacity(self.k as usize);
        let mut digest = Sha512::digest(key.as_bytes());

        'outer: loop {
            for chunk in digest.chunks_exact(4) {
                let word = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
                positions.push(u64::from(word) % self.m);
                if positions.len() == self.k as usize {
                    break 'outer;
                }
            }
            digest = Sha512::digest(digest.as_slice());
        }

        positions
    }

    /// Tests and sets every position for `key`; true if all were already set.
    fn check_and_set(&mut self, key: &str) -> bool {
        let mut seen = true;
        for position in self.positions(key) {
            let byte = (position / 8) as usize;
            let mask = 1u8 << (position % 8);
            if self.bits[byte] & mask == 0 {
                seen = false;
                self.bits[byte] |= mask;
            }
        }
        seen
    }

    fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(HEADER_LEN + self.bits.len());
        buf.extend_from_slice(&SNAPSHOT_MAGIC);
        buf.extend_from_slice(&SNAPSHOT_VERSION.to_le_bytes());
        buf.extend_from_slice(&self.capacity.to_le_bytes());
        buf.extend_from_slice(&self.error_rate.to_bits().to_le_bytes());
        buf.extend_from_slice(&self.k.to_le_bytes());
        buf.extend_from_slice(&self.m.to_le_bytes());
        buf.extend_from_slice(&self.bits);
        buf
    }

    fn decode(data: &[u8]) -> CoreResult<Self> {
        if data.len() < HEADER_LEN {
            return Err(CoreError::invalid_snapshot("dedup snapshot truncated"));
        }
        if data[0..4] != SNAPSHOT_MAGIC {
            return Err(CoreError::invalid_snapshot("bad dedup snapshot magic"));
        }
        let version = u16::from_le_bytes([data[4], data[5]]);
        if version != SNAPSHOT_VERSION {
            return Err(CoreError::invalid_snapshot(format!(
                "unsupported dedup snapshot version {version}"
            )));
        }

        let read_u64 = |offset: usize| -> u64 {
            let mut bytes = [0u8; 8];
            bytes.copy_from_slice(&data[offset..offset + 8]);
            u64::from_le_bytes(bytes)
        };

        let capacity = read_u64(6);
        let error_rate = f64::from_bits(read_u64(14));
        let k = u32::from_le_bytes([data[22], data[23], data[24], data[25]]);
        let m = read_u64(26);
        let bits = data[HEADER_LEN..].to_vec();

        if bits.len() as u64 != (m + 7) / 8 {
            return Err(CoreError::invalid_snapshot(format!(
                "dedup snapshot bit array is {} bytes, expected {}",
                bits.len(),
                (m + 7) / 8
            )));
        }

        Ok(Self {
            bits,
            m,
            k,
            capacity,
            error_rate,
        })
    }
}

/// A persisted admission gate over work-item labels.
pub struct DedupGate {
    path: Option<PathBuf>,
    inner: Mutex<Bloom>,
}

impl DedupGate {
    /// Creates an in-memory gate sized for `capacity` labels at the given
    /// false-positive rate.
    #[must_use]
    pub fn new(capacity: u64, error_rate: f64) -> Self {
        Self {
            path: None,
            inner: Mutex::new(Bloom::with_params(capacity, error_rate)),
        }
    }

    /// Opens a persisted gate, reloading its last snapshot if present.
    ///
    /// A bloom filter cannot grow in place: if the requested capacity is
    /// larger or the error rate smaller than what was persisted, the old bit
    /// array is discarded and a fresh filter is built. Otherwise the
    /// persisted filter is reused as-is, keeping its original parameters.
    pub fn open(path: impl Into<PathBuf>, capacity: u64, error_rate: f64) -> CoreResult<Self> {
        let path = path.into();
        let bloom = match fs::read(&path) {
            Ok(data) => {
                let persisted = Bloom::decode(&data)?;
                if capacity > persisted.capacity || error_rate < persisted.error_rate {
                    info!(
                        path = %path.display(),
                        old_capacity = persisted.capacity,
                        new_capacity = capacity,
                        "dedup snapshot parameters too small, rebuilding"
                    );
                    Bloom::with_params(capacity, error_rate)
                } else {
                    debug!(path = %path.display(), "dedup snapshot reloaded");
                    persisted
                }
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Bloom::with_params(capacity, error_rate)
            }
            Err(err) => return Err(err.into()),
        };

        Ok(Self {
            path: Some(path),
            inner: Mutex::new(bloom),
        })
    }

    /// Returns whether `key` had already been admitted, and admits it.
    ///
    /// The first call for a distinct key returns `false` (modulo the
    /// configured false-positive rate); every later call returns `true`.
    pub fn exist(&self, key: &str) -> bool {
        self.inner.lock().check_and_set(key)
    }

    /// Writes the snapshot atomically. No-op for in-memory gates.
    pub fn save(&self) -> CoreResult<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let encoded = self.inner.lock().encode();
        write_atomic(path, &encoded)
    }

    /// Returns the number of labels the filter was sized for.
    #[must_use]
    pub fn capacity(&self) -> u64 {
        self.inner.lock().capacity
    }

    /// Returns the configured false-positive rate.
    #[must_use]
    pub fn error_rate(&self) -> f64 {
        self.inner.lock().error_rate
    }
}

impl AdmissionGate for DedupGate {
    fn check(&self, label: &str) -> bool {
        self.exist(label)
    }
}

impl std::fmt::Debug for DedupGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("DedupGate")
            .field("capacity", &inner.capacity)
            .field("error_rate", &inner.error_rate)
            .field("m", &inner.m)
            .field("k", &inner.k)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn first_call_false_then_true() {
        let gate = DedupGate::new(10, 0.01);
        assert!(!gate.exist("A"));
        assert!(gate.exist("A"));
        assert!(!gate.exist("B"));
        assert!(gate.exist("B"));
    }

    #[test]
    fn no_false_negatives() {
        let gate = DedupGate::new(1000, 0.01);
        let keys: Vec<String> = (0..500).map(|i| format!("https://example.com/{i}")).collect();

        for key in &keys {
            gate.exist(key);
        }
        for key in &keys {
            assert!(gate.exist(key), "admitted key {key} reported unseen");
        }
    }

    #[test]
    fn false_positive_rate_is_bounded() {
        // Sized for the full 20k keys this test pushes through the gate,
        // since probing a novel key also admits it.
        let gate = DedupGate::new(20_000, 0.01);
        for i in 0..10_000 {
            gate.exist(&format!("member-{i}"));
        }

        let false_positives = (0..10_000)
            .filter(|i| gate.exist(&format!("novel-{i}")))
            .count();

        // Allow generous slack over the 1% target.
        assert!(
            false_positives < 300,
            "{false_positives} false positives out of 10000"
        );
    }

    #[test]
    fn snapshot_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("dedup.snapshot");

        {
            let gate = DedupGate::open(&path, 1000, 0.01).unwrap();
            assert!(!gate.exist("persisted-key"));
            gate.save().unwrap();
        }

        let gate = DedupGate::open(&path, 1000, 0.01).unwrap();
        assert!(gate.exist("persisted-key"));
        assert!(!gate.exist("fresh-key"));
    }

    #[test]
    fn larger_capacity_discards_snapshot() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("dedup.snapshot");

        {
            let gate = DedupGate::open(&path, 100, 0.01).unwrap();
            gate.exist("old-key");
            gate.save().unwrap();
        }

        let gate = DedupGate::open(&path, 10_000, 0.01).unwrap();
        assert_eq!(gate.capacity(), 10_000);
        assert!(!gate.exist("old-key"), "rebuilt filter kept old bits");
    }

    #[test]
    fn smaller_error_rate_discards_snapshot() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("dedup.snapshot");

        {
            let gate = DedupGate::open(&path, 100, 0.01).unwrap();
            gate.exist("old-key");
            gate.save().unwrap();
        }

        let gate = DedupGate::open(&path, 100, 0.0001).unwrap();
        assert!(!gate.exist("old-key"));
    }

    #[test]
    fn compatible_reopen_keeps_persisted_parameters() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("dedup.snapshot");

        {
            let gate = DedupGate::open(&path, 1000, 0.01).unwrap();
            gate.save().unwrap();
        }

        // Smaller request fits inside the persisted filter.
        let gate = DedupGate::open(&path, 10, 0.05).unwrap();
        assert_eq!(gate.capacity(), 1000);
    }

    #[test]
    fn corrupt_snapshot_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("dedup.snapshot");
        fs::write(&path, b"not a snapshot").unwrap();

        let result = DedupGate::open(&path, 100, 0.01);
        assert!(matches!(result, Err(CoreError::InvalidSnapshot { .. })));
    }

    #[test]
    fn sizing_follows_configuration() {
        let small = Bloom::with_params(100, 0.01);
        let large = Bloom::with_params(10_000, 0.01);
        assert!(large.m > small.m);

        let loose = Bloom::with_params(1000, 0.1);
        let tight = Bloom::with_params(1000, 0.001);
        assert!(tight.m > loose.m);
        assert!(tight.k > loose.k);
    }
}
