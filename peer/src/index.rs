use crate::{
    endpoint::{Endpoint, Epoch, PeerId},
    rpc::{FileHolders, FileIndex, RegisteredAck, TrackerStatus},
    state::PeerState,
};

fn not_tracker<T>(state: &PeerState) -> TrackerStatus<T> {
    TrackerStatus::NotTracker {
        known_tracker_endpoint: state.known_tracker_endpoint.clone(),
        known_tracker_epoch: state.known_tracker_epoch,
    }
}

/// `register_files` (4.7). A full sweep (`incremental=false`) first drops
/// every existing entry belonging to `peer_id` before unioning `files`;
/// an incremental update only ever adds.
pub fn register_files(
    state: &mut PeerState,
    peer_id: PeerId,
    endpoint: Endpoint,
    files: impl IntoIterator<Item = String>,
    peer_epoch: Epoch,
    incremental: bool,
) -> TrackerStatus<RegisteredAck> {
    if !state.is_tracker {
        return not_tracker(state);
    }
    if peer_epoch < state.known_tracker_epoch {
        return TrackerStatus::EpochTooLow {
            current_epoch: state.known_tracker_epoch,
        };
    }

    if !incremental {
        for holders in state.index.values_mut() {
            holders.retain(|(pid, _)| pid != &peer_id);
        }
        state.index.retain(|_, holders| !holders.is_empty());
    }

    for name in files {
        state
            .index
            .entry(name)
            .or_default()
            .insert((peer_id.clone(), endpoint.clone()));
    }

    TrackerStatus::Ok(RegisteredAck {
        registered_at_epoch: state.known_tracker_epoch,
    })
}

pub fn query_file(state: &PeerState, name: &str, peer_epoch: Epoch) -> TrackerStatus<FileHolders> {
    if !state.is_tracker {
        return not_tracker(state);
    }
    if peer_epoch < state.known_tracker_epoch {
        return TrackerStatus::EpochTooLow {
            current_epoch: state.known_tracker_epoch,
        };
    }
    TrackerStatus::Ok(state.index.get(name).cloned().unwrap_or_default())
}

pub fn list_index(state: &PeerState, peer_epoch: Epoch) -> TrackerStatus<FileIndex> {
    if !state.is_tracker {
        return not_tracker(state);
    }
    if peer_epoch < state.known_tracker_epoch {
        return TrackerStatus::EpochTooLow {
            current_epoch: state.known_tracker_epoch,
        };
    }
    TrackerStatus::Ok(state.index.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker_state() -> PeerState {
        let mut state = PeerState::new(Endpoint::new("self"), "t".into());
        state.is_tracker = true;
        state.known_tracker_epoch = 1;
        state
    }

    #[test]
    fn non_tracker_rejects_registration() {
        let mut state = PeerState::new(Endpoint::new("self"), "t".into());
        let status = register_files(
            &mut state,
            "p4".into(),
            Endpoint::new("p4-ep"),
            ["a".to_string()],
            1,
            true,
        );
        assert!(matches!(status, TrackerStatus::NotTracker { .. }));
    }

    #[test]
    fn stale_epoch_is_rejected() {
        let mut state = tracker_state();
        let status = register_files(
            &mut state,
            "p4".into(),
            Endpoint::new("p4-ep"),
            ["a".to_string()],
            0,
            true,
        );
        assert!(matches!(status, TrackerStatus::EpochTooLow { current_epoch: 1 }));
    }

    #[test]
    fn incremental_additions_from_two_calls_union() {
        let mut state = tracker_state();
        register_files(
            &mut state,
            "p4".into(),
            Endpoint::new("p4-ep"),
            ["a".to_string()],
            1,
            true,
        );
        register_files(
            &mut state,
            "p4".into(),
            Endpoint::new("p4-ep"),
            ["c".to_string()],
            1,
            true,
        );

        let holders_a = query_file(&state, "a", 1);
        let holders_c = query_file(&state, "c", 1);
        assert!(matches!(holders_a, TrackerStatus::Ok(ref h) if !h.is_empty()));
        assert!(matches!(holders_c, TrackerStatus::Ok(ref h) if !h.is_empty()));
    }

    #[test]
    fn full_sweep_drops_files_no_longer_reported() {
        let mut state = tracker_state();
        register_files(
            &mut state,
            "p4".into(),
            Endpoint::new("p4-ep"),
            ["a".to_string(), "b".to_string()],
            1,
            false,
        );
        register_files(
            &mut state,
            "p4".into(),
            Endpoint::new("p4-ep"),
            ["c".to_string()],
            1,
            true,
        );
        register_files(
            &mut state,
            "p4".into(),
            Endpoint::new("p4-ep"),
            ["a".to_string()],
            1,
            false,
        );

        assert!(matches!(query_file(&state, "b", 1), TrackerStatus::Ok(h) if h.is_empty()));
        assert!(matches!(query_file(&state, "c", 1), TrackerStatus::Ok(h) if h.is_empty()));
        assert!(matches!(query_file(&state, "a", 1), TrackerStatus::Ok(h) if !h.is_empty()));
    }

    #[test]
    fn list_index_mirrors_query_file() {
        let mut state = tracker_state();
        register_files(
            &mut state,
            "p4".into(),
            Endpoint::new("p4-ep"),
            ["a".to_string()],
            1,
            true,
        );
        let TrackerStatus::Ok(index) = list_index(&state, 1) else {
            panic!("expected Ok");
        };
        assert!(index.contains_key("a"));
    }
}
