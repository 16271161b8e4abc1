//! Drain command implementation.

use frontier_core::{NodeAddr, QueueConfig, QueueNode};
use std::path::Path;

/// Runs the drain command: pops up to `size` items from one priority store
/// and prints them, one per line.
pub fn run(path: &Path, priority: usize, size: usize) -> Result<(), Box<dyn std::error::Error>> {
    let config = QueueConfig::new(path)
        .n_priorities(priority + 1)
        .dedup_capacity(0);
    let node: QueueNode<String> = QueueNode::open(NodeAddr::new("cli:0"), config)?;

    let items = node.get(size, priority)?;
    for item in &items {
        println!("{item}");
    }
    eprintln!("drained {} item(s) from priority {}", items.len(), priority);

    node.shutdown()?;
    Ok(())
}
