//! The per-node TCP server.

use crate::error::ServerResult;
use frontier_codec::{decode_item, encode_item, WorkItem};
use frontier_core::{CoreResult, NodeAddr, QueueNode};
use frontier_proto::{decode, encode, Request, Response, MAX_FRAME};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

/// Serves a local [`QueueNode`] over TCP.
///
/// One connection handles any number of `[u32 LE length][CBOR request]`
/// frames, each answered with one framed [`Response`]. Malformed frames
/// close the connection; node-level failures travel back as
/// [`Response::Error`] and leave the connection open.
pub struct QueueServer<T: WorkItem> {
    node: Arc<QueueNode<T>>,
}

impl<T: WorkItem> QueueServer<T> {
    /// Creates a server over a local node.
    pub fn new(node: Arc<QueueNode<T>>) -> Self {
        Self { node }
    }

    /// Accepts connections until the listener fails.
    pub async fn serve(&self, listener: TcpListener) -> ServerResult<()> {
        info!(addr = %self.node.addr(), "queue node serving");
        loop {
            let (stream, peer) = listener.accept().await?;
            debug!(peer = %peer, "connection accepted");
            let node = Arc::clone(&self.node);
            tokio::spawn(async move {
                if let Err(err) = handle_connection(node, stream).await {
                    warn!(peer = %peer, error = %err, "connection closed with error");
                }
            });
        }
    }

    /// Handles a single request against the local node.
    ///
    /// Exposed so alternative transports can reuse the dispatch.
    pub fn handle(&self, request: Request) -> Response {
        dispatch(&self.node, request)
    }
}

async fn handle_connection<T: WorkItem>(
    node: Arc<QueueNode<T>>,
    mut stream: TcpStream,
) -> ServerResult<()> {
    loop {
        let mut prefix = [0u8; 4];
        match stream.read_exact(&mut prefix).await {
            Ok(_) => {}
            // Peer hung up between requests.
            Err(err) if err.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(()),
            Err(err) => return Err(err.into()),
        }

        let len = u32::from_le_bytes(prefix) as usize;
        if len > MAX_FRAME {
            return Err(frontier_proto::ProtoError::FrameTooLarge {
                size: len,
                max: MAX_FRAME,
            }
            .into());
        }

        let mut body = vec![0u8; len];
        stream.read_exact(&mut body).await?;
        let request: Request = decode(&body)?;
        debug!(op = request.op(), "request received");

        let response = dispatch(&node, request);
        let body = encode(&response)?;
        stream.write_all(&(body.len() as u32).to_le_bytes()).await?;
        stream.write_all(&body).await?;
    }
}

/// The node's dispatch table: one arm per protocol operation.
fn dispatch<T: WorkItem>(node: &QueueNode<T>, request: Request) -> Response {
    let result = match request {
        Request::Put {
            items,
            force,
            priority,
        } => decode_items(&items)
            .and_then(|items| node.put(&items, force, priority as usize))
            .map(done),

        Request::PutBackup {
            owner,
            items,
            force,
        } => decode_items(&items)
            .and_then(|items| node.put_backup(&NodeAddr::new(owner), &items, force))
            .map(done),

        Request::Get { size, priority } => node
            .get(size as usize, priority as usize)
            .and_then(|items| encode_items(&items)),

        Request::GetBackup { owner, size } => node
            .get_backup(&NodeAddr::new(owner), size as usize)
            .and_then(|items| encode_items(&items)),

        Request::GetIncremental { size } => node
            .get_incremental(size as usize)
            .and_then(|items| encode_items(&items)),

        Request::Flush => node.flush().map(|()| Response::Done { accepted: 0 }),
    };

    result.unwrap_or_else(|err| Response::Error {
        message: err.to_string(),
    })
}

fn done(accepted: usize) -> Response {
    Response::Done {
        accepted: accepted as u64,
    }
}

fn decode_items<T: WorkItem>(payloads: &[Vec<u8>]) -> CoreResult<Vec<T>> {
    payloads
        .iter()
        .map(|payload| decode_item(payload).map_err(Into::into))
        .collect()
}

fn encode_items<T: WorkItem>(items: &[T]) -> CoreResult<Response> {
    let items = items
        .iter()
        .map(|item| encode_item(item).map_err(Into::into))
        .collect::<CoreResult<Vec<_>>>()?;
    Ok(Response::Items { items })
}
