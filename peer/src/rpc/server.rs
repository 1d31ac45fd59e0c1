use std::{net::SocketAddr, path::PathBuf};

use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::Framed;
use tracing::{debug, warn};

use crate::{actor::ActorHandle, chunks};

use super::{codec::ServerCodec, RpcRequest, RpcResponse};

/// Accepts inbound connections and dispatches each request either to the
/// actor (election/heartbeat/index calls) or directly against the local
/// filesystem (chunk reads), per section 5: "File I/O for chunk reads is
/// handled by the RPC server task directly against the filesystem,
/// independent of actor state."
pub async fn run(listener: TcpListener, handle: ActorHandle, shared_dir: PathBuf) {
    loop {
        let (stream, peer_addr) = match listener.accept().await {
            Ok(pair) => pair,
            Err(e) => {
                warn!(error = %e, "accept failed");
                continue;
            }
        };
        let handle = handle.clone();
        let shared_dir = shared_dir.clone();
        tokio::spawn(async move {
            if let Err(e) = serve_connection(stream, peer_addr, handle, shared_dir).await {
                debug!(peer = %peer_addr, error = %e, "connection ended with an error");
            }
        });
    }
}

async fn serve_connection(
    stream: TcpStream,
    peer_addr: SocketAddr,
    handle: ActorHandle,
    shared_dir: PathBuf,
) -> Result<(), super::RpcError> {
    let mut framed = Framed::new(stream, ServerCodec::default());
    while let Some(request) = framed.next().await {
        let request = request?;
        let response = dispatch(request, &handle, &shared_dir).await;
        framed.send(response).await?;
    }
    debug!(peer = %peer_addr, "connection closed");
    Ok(())
}

async fn dispatch(request: RpcRequest, handle: &ActorHandle, shared_dir: &PathBuf) -> RpcResponse {
    match request {
        RpcRequest::GetFileSize { name } => {
            let size = chunks::file_size(shared_dir, &name).await;
            if size < 0 {
                handle.notify_file_missing();
            }
            RpcResponse::FileSize(size)
        }
        RpcRequest::RequestFileChunk { name, offset, size } => {
            let chunk = chunks::read_chunk(shared_dir, &name, offset, size).await;
            if chunk.is_none() {
                handle.notify_file_missing();
            }
            RpcResponse::FileChunk(chunk)
        }
        request => handle
            .call_rpc(request)
            .await
            .unwrap_or(RpcResponse::Ack),
    }
}
