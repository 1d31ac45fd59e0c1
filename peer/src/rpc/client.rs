use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::{net::TcpStream, time};
use tokio_util::codec::Framed;

use crate::endpoint::Endpoint;

use super::{codec::ClientCodec, RpcError, RpcRequest, RpcResponse, Result};

/// One-shot client for a single RPC call: dial, send, await reply, drop the
/// connection. Mirrors `p2p::session`'s `Framed` + timeout pattern, but each
/// call is its own short-lived connection rather than a long-lived session,
/// since the protocol here is strictly request/response.
pub struct RpcClient;

impl RpcClient {
    #[tracing::instrument(skip(request))]
    async fn call(
        endpoint: &Endpoint,
        request: RpcRequest,
        timeout: Duration,
    ) -> Result<RpcResponse> {
        let fut = async {
            let addr = endpoint
                .as_str()
                .parse()
                .map_err(|_| RpcError::ConnectionClosed)?;
            let stream = TcpStream::connect(&addr).await?;
            let mut framed = Framed::new(stream, ClientCodec::default());
            framed.send(request).await?;
            framed.next().await.ok_or(RpcError::ConnectionClosed)?
        };
        time::timeout(timeout, fut)
            .await
            .map_err(|_| RpcError::Timeout)?
    }

    pub async fn ping(endpoint: &Endpoint, timeout: Duration) -> Result<bool> {
        match Self::call(endpoint, RpcRequest::Ping, timeout).await? {
            RpcResponse::Pong => Ok(true),
            _ => Err(RpcError::UnexpectedResponse),
        }
    }

    pub async fn request_vote(
        endpoint: &Endpoint,
        candidate_endpoint: Endpoint,
        election_epoch: u64,
        timeout: Duration,
    ) -> Result<bool> {
        let req = RpcRequest::RequestVote {
            candidate_endpoint,
            election_epoch,
        };
        match Self::call(endpoint, req, timeout).await? {
            RpcResponse::VoteGranted(granted) => Ok(granted),
            _ => Err(RpcError::UnexpectedResponse),
        }
    }

    pub async fn receive_heartbeat(
        endpoint: &Endpoint,
        tracker_endpoint: Endpoint,
        tracker_epoch: u64,
        timeout: Duration,
    ) -> Result<()> {
        let req = RpcRequest::ReceiveHeartbeat {
            tracker_endpoint,
            tracker_epoch,
        };
        match Self::call(endpoint, req, timeout).await? {
            RpcResponse::Ack => Ok(()),
            _ => Err(RpcError::UnexpectedResponse),
        }
    }

    pub async fn register_files(
        endpoint: &Endpoint,
        request: RpcRequest,
        timeout: Duration,
    ) -> Result<super::TrackerStatus<super::RegisteredAck>> {
        debug_assert!(matches!(request, RpcRequest::RegisterFiles { .. }));
        match Self::call(endpoint, request, timeout).await? {
            RpcResponse::RegisterFiles(status) => Ok(status),
            _ => Err(RpcError::UnexpectedResponse),
        }
    }

    pub async fn query_file(
        endpoint: &Endpoint,
        name: String,
        peer_epoch: u64,
        timeout: Duration,
    ) -> Result<super::TrackerStatus<super::FileHolders>> {
        let req = RpcRequest::QueryFile { name, peer_epoch };
        match Self::call(endpoint, req, timeout).await? {
            RpcResponse::QueryFile(status) => Ok(status),
            _ => Err(RpcError::UnexpectedResponse),
        }
    }

    pub async fn list_index(
        endpoint: &Endpoint,
        peer_epoch: u64,
        timeout: Duration,
    ) -> Result<super::TrackerStatus<super::FileIndex>> {
        let req = RpcRequest::ListIndex { peer_epoch };
        match Self::call(endpoint, req, timeout).await? {
            RpcResponse::ListIndex(status) => Ok(status),
            _ => Err(RpcError::UnexpectedResponse),
        }
    }

    pub async fn get_file_size(endpoint: &Endpoint, name: String, timeout: Duration) -> Result<i64> {
        match Self::call(endpoint, RpcRequest::GetFileSize { name }, timeout).await? {
            RpcResponse::FileSize(size) => Ok(size),
            _ => Err(RpcError::UnexpectedResponse),
        }
    }

    pub async fn request_file_chunk(
        endpoint: &Endpoint,
        name: String,
        offset: u64,
        size: u32,
        timeout: Duration,
    ) -> Result<Option<Vec<u8>>> {
        let req = RpcRequest::RequestFileChunk { name, offset, size };
        match Self::call(endpoint, req, timeout).await? {
            RpcResponse::FileChunk(chunk) => Ok(chunk),
            _ => Err(RpcError::UnexpectedResponse),
        }
    }
}
