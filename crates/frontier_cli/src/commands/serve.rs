//! Serve command implementation.

use frontier_core::{NodeAddr, QueueConfig, QueueNode};
use frontier_server::QueueServer;
use std::path::Path;
use std::sync::Arc;
use tokio::net::TcpListener;

/// Runs a queue node server until interrupted.
pub fn run(
    addr: &str,
    data_dir: &Path,
    n_priorities: usize,
    dedup_capacity: u64,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = QueueConfig::new(data_dir)
        .n_priorities(n_priorities)
        .dedup_capacity(dedup_capacity);
    let node: Arc<QueueNode<String>> =
        Arc::new(QueueNode::open(NodeAddr::new(addr), config)?);

    let runtime = tokio::runtime::Runtime::new()?;
    let result = runtime.block_on(async {
        let listener = TcpListener::bind(addr).await?;
        let server = QueueServer::new(Arc::clone(&node));

        tokio::select! {
            served = server.serve(listener) => served.map_err(Into::into),
            signal = tokio::signal::ctrl_c() => {
                signal?;
                Ok::<(), Box<dyn std::error::Error>>(())
            }
        }
    });

    // Release locks and persist the dedup snapshot on the way out.
    node.shutdown()?;
    result
}
