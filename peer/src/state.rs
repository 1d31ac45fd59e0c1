use std::collections::{BTreeMap, BTreeSet};

use crate::{
    endpoint::{Endpoint, Epoch, PeerId},
    rpc::FileIndex,
};

/// All mutable state for one peer (section 3). Owned exclusively by the
/// actor task; nothing outside `actor` ever sees a `&mut PeerState`.
#[derive(Debug)]
pub struct PeerState {
    pub self_endpoint: Endpoint,
    pub peer_id: PeerId,

    pub is_tracker: bool,
    pub known_tracker_endpoint: Option<Endpoint>,
    pub known_tracker_epoch: Epoch,

    pub voted_in_epoch: BTreeMap<Epoch, Endpoint>,

    pub candidate_active: bool,
    pub candidate_epoch: Epoch,
    pub votes_received: BTreeMap<Epoch, BTreeSet<Endpoint>>,
    pub highest_candidacy_ever: Epoch,

    pub local_files: BTreeSet<String>,

    /// Populated only while `is_tracker` is true; reset on stepping down
    /// (4.4, 4.5).
    pub index: FileIndex,
}

impl PeerState {
    pub fn new(self_endpoint: Endpoint, peer_id: PeerId) -> Self {
        PeerState {
            self_endpoint,
            peer_id,
            is_tracker: false,
            known_tracker_endpoint: None,
            known_tracker_epoch: 0,
            voted_in_epoch: BTreeMap::new(),
            candidate_active: false,
            candidate_epoch: 0,
            votes_received: BTreeMap::new(),
            highest_candidacy_ever: 0,
            local_files: BTreeSet::new(),
            index: FileIndex::new(),
        }
    }

    /// Clears all candidacy bookkeeping without touching `voted_in_epoch`,
    /// which remains authoritative for future vote requests (4.3 tallying).
    pub fn clear_candidacy(&mut self) {
        self.candidate_active = false;
        self.votes_received.remove(&self.candidate_epoch);
    }

    /// Invariant 3: a tracker's own endpoint/epoch always match the epoch it
    /// was elected under.
    pub fn become_tracker(&mut self, epoch: Epoch) {
        self.is_tracker = true;
        self.known_tracker_epoch = epoch;
        self.known_tracker_endpoint = Some(self.self_endpoint.clone());
        self.clear_candidacy();
        self.index.clear();
    }

    pub fn step_down(&mut self) {
        self.is_tracker = false;
        self.known_tracker_endpoint = None;
        self.index.clear();
    }
}
