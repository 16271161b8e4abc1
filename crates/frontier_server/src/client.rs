//! Blocking TCP peer client.

use frontier_codec::{decode_item, encode_item, WorkItem};
use frontier_core::{CoreError, CoreResult, NodeAddr, PeerClient};
use frontier_proto::{read_message, write_message, Request, Response};
use std::net::TcpStream;
use std::time::Duration;
use tracing::debug;

/// A [`PeerClient`] that speaks the framed CBOR protocol over TCP.
///
/// Connects per request: the proxy's batching keeps call volume low, and a
/// connectionless client needs no reconnect state machine. All failures
/// surface as [`CoreError::Remote`]; retry policy belongs to the caller.
#[derive(Debug, Clone, Default)]
pub struct TcpPeer {
    timeout: Option<Duration>,
}

impl TcpPeer {
    /// Creates a client without I/O timeouts.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a client that bounds each read and write.
    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
        }
    }

    fn call(&self, node: &NodeAddr, request: &Request) -> CoreResult<Response> {
        debug!(node = %node, op = request.op(), "peer call");
        let mut stream = TcpStream::connect(node.as_str()).map_err(CoreError::remote)?;
        stream.set_read_timeout(self.timeout).map_err(CoreError::remote)?;
        stream.set_write_timeout(self.timeout).map_err(CoreError::remote)?;

        write_message(&mut stream, request).map_err(CoreError::remote)?;
        let response: Response = read_message(&mut stream).map_err(CoreError::remote)?;

        match response {
            Response::Error { message } => Err(CoreError::Remote { message }),
            other => Ok(other),
        }
    }

    fn expect_accepted(response: Response) -> CoreResult<usize> {
        match response {
            Response::Done { accepted } => Ok(accepted as usize),
            other => Err(CoreError::remote(format!(
                "unexpected response: {other:?}"
            ))),
        }
    }

    fn expect_items<T: WorkItem>(response: Response) -> CoreResult<Vec<T>> {
        match response {
            Response::Items { items } => items
                .iter()
                .map(|payload| decode_item(payload).map_err(Into::into))
                .collect(),
            other => Err(CoreError::remote(format!(
                "unexpected response: {other:?}"
            ))),
        }
    }

    /// Pops replica items held by `node` for `owner`.
    pub fn get_backup<T: WorkItem>(
        &self,
        node: &NodeAddr,
        owner: &NodeAddr,
        size: usize,
    ) -> CoreResult<Vec<T>> {
        let response = self.call(
            node,
            &Request::GetBackup {
                owner: owner.as_str().to_owned(),
                size: size as u32,
            },
        )?;
        Self::expect_items(response)
    }

    /// Pops items from `node`'s incremental lane.
    pub fn get_incremental<T: WorkItem>(
        &self,
        node: &NodeAddr,
        size: usize,
    ) -> CoreResult<Vec<T>> {
        let response = self.call(node, &Request::GetIncremental { size: size as u32 })?;
        Self::expect_items(response)
    }

    /// Asks `node` to sync all of its stores.
    pub fn flush(&self, node: &NodeAddr) -> CoreResult<()> {
        self.call(node, &Request::Flush)?;
        Ok(())
    }
}

impl<T: WorkItem> PeerClient<T> for TcpPeer {
    fn put(
        &self,
        node: &NodeAddr,
        items: &[T],
        force: bool,
        priority: usize,
    ) -> CoreResult<usize> {
        let items = encode_payloads(items)?;
        let response = self.call(
            node,
            &Request::Put {
                items,
                force,
                priority: priority as u32,
            },
        )?;
        Self::expect_accepted(response)
    }

    fn put_backup(
        &self,
        node: &NodeAddr,
        owner: &NodeAddr,
        items: &[T],
        force: bool,
    ) -> CoreResult<usize> {
        let items = encode_payloads(items)?;
        let response = self.call(
            node,
            &Request::PutBackup {
                owner: owner.as_str().to_owned(),
                items,
                force,
            },
        )?;
        Self::expect_accepted(response)
    }

    fn get(&self, node: &NodeAddr, size: usize, priority: usize) -> CoreResult<Vec<T>> {
        let response = self.call(
            node,
            &Request::Get {
                size: size as u32,
                priority: priority as u32,
            },
        )?;
        Self::expect_items(response)
    }
}

fn encode_payloads<T: WorkItem>(items: &[T]) -> CoreResult<Vec<Vec<u8>>> {
    items
        .iter()
        .map(|item| encode_item(item).map_err(Into::into))
        .collect()
}
