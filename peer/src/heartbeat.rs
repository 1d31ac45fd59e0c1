use crate::{
    endpoint::{endpoint_less, Endpoint, Epoch},
    state::PeerState,
};

/// What the actor must do in response to a `receive_heartbeat` call, beyond
/// the `PeerState` mutation already applied by `reconcile` (4.6).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeartbeatAction {
    /// Nothing beyond whatever `reconcile` already mutated.
    Ignore,
    /// Self was tracker and must step down, then restart discovery.
    StepDownThenDiscover,
    /// Self was tracker and must step down (split brain, lower endpoint wins).
    StepDown,
    /// Adopt `H` as tracker: cancel any pending candidacy for epoch <= H's,
    /// arm the failure detector, and register against it (first contact or
    /// epoch advance).
    Connect,
    /// Switch the currently accepted tracker to `H` at the same epoch
    /// (lower endpoint wins a same-epoch ambiguity).
    Switch,
    /// A same-epoch heartbeat from a higher-endpoint tracker than the one
    /// already accepted; ignore it but the accepted tracker is still live.
    ResetDetectorOnly,
}

/// Pure reconciliation decision per the receiver-state table (4.6). Mutates
/// `state`'s epoch/tracker/vote bookkeeping in place; returns the side
/// effect the actor must still perform (I/O, timers).
pub fn reconcile(
    state: &mut PeerState,
    heartbeat_endpoint: &Endpoint,
    heartbeat_epoch: Epoch,
) -> HeartbeatAction {
    if state.is_tracker {
        if heartbeat_endpoint == &state.self_endpoint {
            return HeartbeatAction::Ignore;
        }
        if heartbeat_epoch > state.known_tracker_epoch {
            state.step_down();
            return HeartbeatAction::StepDownThenDiscover;
        }
        if heartbeat_epoch == state.known_tracker_epoch
            && endpoint_less(heartbeat_endpoint, &state.self_endpoint)
        {
            state.step_down();
            return HeartbeatAction::StepDown;
        }
        return HeartbeatAction::Ignore;
    }

    if heartbeat_epoch > state.known_tracker_epoch {
        state.voted_in_epoch.retain(|e, _| *e >= heartbeat_epoch);
        state.known_tracker_epoch = heartbeat_epoch;
        state.known_tracker_endpoint = Some(heartbeat_endpoint.clone());
        return HeartbeatAction::Connect;
    }

    if heartbeat_epoch == state.known_tracker_epoch {
        match &state.known_tracker_endpoint {
            None => {
                state.known_tracker_endpoint = Some(heartbeat_endpoint.clone());
                HeartbeatAction::Connect
            }
            Some(known) if known == heartbeat_endpoint => HeartbeatAction::ResetDetectorOnly,
            Some(known) if endpoint_less(heartbeat_endpoint, known) => {
                state.known_tracker_endpoint = Some(heartbeat_endpoint.clone());
                HeartbeatAction::Switch
            }
            Some(_) => HeartbeatAction::ResetDetectorOnly,
        }
    } else {
        HeartbeatAction::Ignore
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn non_tracker(self_ep: &str, known: Option<&str>, epoch: Epoch) -> PeerState {
        let mut state = PeerState::new(Endpoint::new(self_ep), "id".into());
        state.known_tracker_endpoint = known.map(Endpoint::new);
        state.known_tracker_epoch = epoch;
        state
    }

    #[test]
    fn higher_epoch_always_promotes_and_prunes_old_votes() {
        let mut state = non_tracker("self", Some("old-tracker"), 2);
        state.voted_in_epoch.insert(1, Endpoint::new("x"));
        state.voted_in_epoch.insert(3, Endpoint::new("y"));

        let action = reconcile(&mut state, &Endpoint::new("new-tracker"), 3);
        assert_eq!(action, HeartbeatAction::Connect);
        assert_eq!(state.known_tracker_epoch, 3);
        assert_eq!(
            state.known_tracker_endpoint,
            Some(Endpoint::new("new-tracker"))
        );
        assert!(!state.voted_in_epoch.contains_key(&1));
        assert!(state.voted_in_epoch.contains_key(&3));
    }

    #[test]
    fn same_epoch_smaller_endpoint_switches() {
        let mut state = non_tracker("self", Some("z-tracker"), 5);
        let action = reconcile(&mut state, &Endpoint::new("a-tracker"), 5);
        assert_eq!(action, HeartbeatAction::Switch);
        assert_eq!(
            state.known_tracker_endpoint,
            Some(Endpoint::new("a-tracker"))
        );
    }

    #[test]
    fn same_epoch_larger_endpoint_is_ignored_but_resets_detector() {
        let mut state = non_tracker("self", Some("a-tracker"), 5);
        let action = reconcile(&mut state, &Endpoint::new("z-tracker"), 5);
        assert_eq!(action, HeartbeatAction::ResetDetectorOnly);
        assert_eq!(
            state.known_tracker_endpoint,
            Some(Endpoint::new("a-tracker"))
        );
    }

    #[test]
    fn stale_epoch_is_ignored() {
        let mut state = non_tracker("self", Some("tracker"), 5);
        let action = reconcile(&mut state, &Endpoint::new("someone"), 4);
        assert_eq!(action, HeartbeatAction::Ignore);
        assert_eq!(state.known_tracker_epoch, 5);
    }

    #[test]
    fn tracker_steps_down_to_a_higher_epoch() {
        let mut state = non_tracker("self", None, 5);
        state.is_tracker = true;
        state.known_tracker_endpoint = Some(Endpoint::new("self"));
        let action = reconcile(&mut state, &Endpoint::new("other"), 6);
        assert_eq!(action, HeartbeatAction::StepDownThenDiscover);
        assert!(!state.is_tracker);
    }

    #[test]
    fn split_brain_same_epoch_smaller_endpoint_wins() {
        let mut state = non_tracker("z-self", None, 5);
        state.is_tracker = true;
        state.known_tracker_endpoint = Some(Endpoint::new("z-self"));
        let action = reconcile(&mut state, &Endpoint::new("a-other"), 5);
        assert_eq!(action, HeartbeatAction::StepDown);
        assert!(!state.is_tracker);
    }

    #[test]
    fn split_brain_same_epoch_this_tracker_has_smaller_endpoint() {
        let mut state = non_tracker("a-self", None, 5);
        state.is_tracker = true;
        state.known_tracker_endpoint = Some(Endpoint::new("a-self"));
        let action = reconcile(&mut state, &Endpoint::new("z-other"), 5);
        assert_eq!(action, HeartbeatAction::Ignore);
        assert!(state.is_tracker);
    }

    #[test]
    fn tracker_ignores_its_own_echoed_heartbeat() {
        let mut state = non_tracker("self", None, 5);
        state.is_tracker = true;
        state.known_tracker_endpoint = Some(Endpoint::new("self"));
        let action = reconcile(&mut state, &Endpoint::new("self"), 5);
        assert_eq!(action, HeartbeatAction::Ignore);
    }
}
