//! Client-side half of 4.9's file transfer: pulling a file a tracker query
//! resolved to a holder, chunk by chunk, directly from that holder's RPC
//! server. The serving half lives in `chunks.rs`/`rpc::server`; this module
//! is the counterpart the CLI's `search` command drives after the tracker
//! names a holder (the "download 10 s" suspension point and
//! `DOWNLOAD_CHUNK_SIZE` constant in section 5/6 only make sense paired with
//! a puller -- this is it).
use std::path::Path;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::{endpoint::Endpoint, rpc::RpcClient};

#[derive(thiserror::Error, Debug)]
pub enum DownloadError {
    #[error("remote does not have the file")]
    NotFound,

    #[error(transparent)]
    Rpc(#[from] crate::rpc::RpcError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("remote returned a short chunk at offset {offset}: expected up to {expected}, got {actual}")]
    ShortChunk {
        offset: u64,
        expected: u32,
        actual: usize,
    },
}

type Result<T> = std::result::Result<T, DownloadError>;

/// Downloads `name` from `source` into `dest_dir/name`, one
/// `chunk_size`-sized `request_file_chunk` call at a time, per the minimal
/// transfer scheme of 4.9: no piece picker, no resume, a single source.
/// Writes to a `.part` sibling and renames on completion so a crash or a
/// cancelled download never leaves a half-written file under the name the
/// local file watch would pick up and reshare.
#[tracing::instrument(skip(dest_dir))]
pub async fn download_file(
    source: &Endpoint,
    name: &str,
    dest_dir: &Path,
    chunk_size: usize,
    timeout: Duration,
) -> Result<u64> {
    let total_size = RpcClient::get_file_size(source, name.to_string(), timeout).await?;
    if total_size < 0 {
        return Err(DownloadError::NotFound);
    }
    let total_size = total_size as u64;

    tokio::fs::create_dir_all(dest_dir).await?;
    let final_path = dest_dir.join(name);
    let part_path = dest_dir.join(format!("{name}.part"));
    let mut file = tokio::fs::File::create(&part_path).await?;

    let mut offset = 0u64;
    while offset < total_size {
        let want = (total_size - offset).min(chunk_size as u64) as u32;
        let chunk = RpcClient::request_file_chunk(source, name.to_string(), offset, want, timeout)
            .await?
            .ok_or(DownloadError::NotFound)?;
        if chunk.is_empty() {
            return Err(DownloadError::ShortChunk {
                offset,
                expected: want,
                actual: 0,
            });
        }
        file.write_all(&chunk).await?;
        offset += chunk.len() as u64;
        debug!(name, offset, total_size, "chunk written");
    }
    file.flush().await?;
    drop(file);

    tokio::fs::rename(&part_path, &final_path).await?;
    info!(name, bytes = total_size, %source, "download complete");
    Ok(total_size)
}

pub fn log_failed_download(name: &str, source: &Endpoint, error: &DownloadError) {
    warn!(name, %source, %error, "download failed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::{RpcRequest, RpcResponse, ServerCodec};
    use futures::{SinkExt, StreamExt};
    use tokio::net::TcpListener;
    use tokio_util::codec::Framed;

    /// A single-shot stand-in for the real RPC server: answers exactly one
    /// `GetFileSize` and then enough `RequestFileChunk`s to serve a small
    /// fixed buffer, mirroring `rpc::server::dispatch`'s chunk path without
    /// pulling in the whole actor.
    async fn serve_once(listener: TcpListener, data: Vec<u8>) {
        let (stream, _) = listener.accept().await.unwrap();
        let mut framed = Framed::new(stream, ServerCodec::default());
        while let Some(Ok(request)) = framed.next().await {
            let response = match request {
                RpcRequest::GetFileSize { .. } => RpcResponse::FileSize(data.len() as i64),
                RpcRequest::RequestFileChunk { offset, size, .. } => {
                    let start = offset as usize;
                    let end = (start + size as usize).min(data.len());
                    RpcResponse::FileChunk(Some(data[start..end].to_vec()))
                }
                _ => unreachable!("test server only handles chunk transfer requests"),
            };
            if framed.send(response).await.is_err() {
                break;
            }
        }
    }

    #[tokio::test]
    async fn downloads_a_file_across_several_chunks() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let data = b"the quick brown fox jumps over the lazy dog".to_vec();
        let server_data = data.clone();
        tokio::spawn(async move { serve_once(listener, server_data).await });

        let dest = tempfile::tempdir().unwrap();
        let endpoint: Endpoint = addr.into();
        let written = download_file(
            &endpoint,
            "fox.txt",
            dest.path(),
            8,
            Duration::from_secs(1),
        )
        .await
        .unwrap();

        assert_eq!(written, data.len() as u64);
        let contents = tokio::fs::read(dest.path().join("fox.txt")).await.unwrap();
        assert_eq!(contents, data);
        assert!(!dest.path().join("fox.txt.part").exists());
    }

    #[tokio::test]
    async fn missing_remote_file_is_reported_as_not_found() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut framed = Framed::new(stream, ServerCodec::default());
            if let Some(Ok(RpcRequest::GetFileSize { .. })) = framed.next().await {
                let _ = framed.send(RpcResponse::FileSize(-1)).await;
            }
        });

        let dest = tempfile::tempdir().unwrap();
        let endpoint: Endpoint = addr.into();
        let err = download_file(&endpoint, "ghost.txt", dest.path(), 8, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, DownloadError::NotFound));
    }
}
