mod client;
mod codec;
mod message;
pub mod server;

pub use client::RpcClient;
pub(crate) use codec::ServerCodec;
pub use message::{FileHolders, FileIndex, RegisteredAck, RpcRequest, RpcResponse, TrackerStatus};

#[derive(thiserror::Error, Debug)]
pub enum RpcError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("request timed out")]
    Timeout,

    #[error("connection closed before a response arrived")]
    ConnectionClosed,

    #[error("malformed frame: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("unexpected response for this request")]
    UnexpectedResponse,
}

pub type Result<T> = std::result::Result<T, RpcError>;
