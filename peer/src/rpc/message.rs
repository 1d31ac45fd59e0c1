use std::collections::{BTreeMap, BTreeSet};

use serde_derive::{Deserialize, Serialize};

use crate::endpoint::{Endpoint, Epoch, PeerId};

/// Tagged response wrapper used by every epoch-gated tracker call (section 9
/// design notes: "the `{status, ...}` dictionary responses are better
/// expressed as sum types").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TrackerStatus<T> {
    Ok(T),
    NotTracker {
        known_tracker_endpoint: Option<Endpoint>,
        known_tracker_epoch: Epoch,
    },
    EpochTooLow {
        current_epoch: Epoch,
    },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RegisteredAck {
    pub registered_at_epoch: Epoch,
}

pub type FileHolders = BTreeSet<(PeerId, Endpoint)>;
pub type FileIndex = BTreeMap<String, FileHolders>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RpcRequest {
    Ping,

    RequestVote {
        candidate_endpoint: Endpoint,
        election_epoch: Epoch,
    },

    ReceiveHeartbeat {
        tracker_endpoint: Endpoint,
        tracker_epoch: Epoch,
    },

    RegisterFiles {
        peer_id: PeerId,
        endpoint: Endpoint,
        files: BTreeSet<String>,
        peer_epoch: Epoch,
        incremental: bool,
    },

    QueryFile {
        name: String,
        peer_epoch: Epoch,
    },

    ListIndex {
        peer_epoch: Epoch,
    },

    RequestFileChunk {
        name: String,
        offset: u64,
        size: u32,
    },

    GetFileSize {
        name: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RpcResponse {
    Pong,
    VoteGranted(bool),
    Ack,
    RegisterFiles(TrackerStatus<RegisteredAck>),
    QueryFile(TrackerStatus<FileHolders>),
    ListIndex(TrackerStatus<FileIndex>),
    FileChunk(Option<Vec<u8>>),
    FileSize(i64),
}
