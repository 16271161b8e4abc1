//! Inspect command implementation.

use frontier_store::{SegmentStore, StoreConfig};
use serde::Serialize;
use std::path::Path;

/// Statistics for one store inside a node directory.
#[derive(Debug, Serialize)]
pub struct StoreStats {
    /// Store name (`p0`, `incremental`, `backup_<owner>`).
    pub name: String,
    /// Number of segment files in the chain.
    pub segments: usize,
    /// Number of stored items.
    pub items: usize,
    /// Total bytes on disk across the chain.
    pub bytes: u64,
}

/// Inspection result for a node directory.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// The node data directory.
    pub path: String,
    /// Per-store statistics.
    pub stores: Vec<StoreStats>,
}

/// Runs the inspect command.
pub fn run(path: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    if !path.is_dir() {
        return Err(format!("no node directory at {}", path.display()).into());
    }

    let mut stores = Vec::new();
    let mut names: Vec<String> = std::fs::read_dir(path)?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().is_dir())
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();

    for name in names {
        let store_dir = path.join(&name);
        let store: SegmentStore<String> = SegmentStore::open(&store_dir, StoreConfig::default())?;

        let bytes = std::fs::read_dir(&store_dir)?
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| entry.metadata().ok())
            .map(|meta| meta.len())
            .sum();

        stores.push(StoreStats {
            name,
            segments: store.segment_count(),
            items: store.frame_count()?,
            bytes,
        });
        store.shutdown()?;
    }

    let result = InspectResult {
        path: path.display().to_string(),
        stores,
    };

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&result)?),
        _ => {
            println!("node directory: {}", result.path);
            for store in &result.stores {
                println!(
                    "  {:<24} {:>4} segments  {:>8} items  {:>12} bytes",
                    store.name, store.segments, store.items, store.bytes
                );
            }
            if result.stores.is_empty() {
                println!("  (no stores)");
            }
        }
    }

    Ok(())
}
