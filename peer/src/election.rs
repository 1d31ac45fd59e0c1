use std::collections::BTreeSet;

use crate::{
    endpoint::{endpoint_less, Endpoint, Epoch},
    state::PeerState,
};

/// Computes the next candidacy epoch and mutates `state` into the candidate
/// role for it (4.3). Returns `None` if `state` is already an active
/// candidate for that epoch (no-op per spec).
pub fn initiate_election(state: &mut PeerState) -> Option<Epoch> {
    let next_epoch = 1 + state
        .known_tracker_epoch
        .max(state.voted_in_epoch.keys().copied().max().unwrap_or(0))
        .max(state.highest_candidacy_ever);

    if state.candidate_active && state.candidate_epoch == next_epoch {
        return None;
    }

    state.candidate_active = true;
    state.candidate_epoch = next_epoch;
    state.highest_candidacy_ever = next_epoch;
    state
        .votes_received
        .entry(next_epoch)
        .or_default()
        .insert(state.self_endpoint.clone());
    state
        .voted_in_epoch
        .insert(next_epoch, state.self_endpoint.clone());

    Some(next_epoch)
}

/// Outcome of a `request_vote` call, beyond the plain grant/deny boolean
/// returned over RPC: whether the receiver must stop its own failure
/// detector and/or cancel its own candidacy as a side effect of granting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoteOutcome {
    pub granted: bool,
    pub stop_failure_detector: bool,
    pub cancel_own_candidacy: bool,
}

impl VoteOutcome {
    fn deny() -> Self {
        VoteOutcome {
            granted: false,
            stop_failure_detector: false,
            cancel_own_candidacy: false,
        }
    }

    fn grant(stop_failure_detector: bool, cancel_own_candidacy: bool) -> Self {
        VoteOutcome {
            granted: true,
            stop_failure_detector,
            cancel_own_candidacy,
        }
    }
}

/// Evaluates R1-R4 (4.3) against the current state and mutates
/// `voted_in_epoch`/candidacy as the rules require. Does not itself cancel
/// timers or initiate rediscovery; the actor does that based on the
/// returned flags, since those are effects outside `PeerState`.
pub fn evaluate_vote_request(
    state: &mut PeerState,
    candidate: &Endpoint,
    election_epoch: Epoch,
) -> VoteOutcome {
    let known_tracker_epoch = state.known_tracker_epoch;
    let known_tracker_endpoint = state.known_tracker_endpoint.clone();

    // R1: electing for a past epoch while a live tracker is known.
    if election_epoch < known_tracker_epoch && known_tracker_endpoint.is_some() {
        return VoteOutcome::deny();
    }

    // R2: same epoch as the live tracker, different candidate.
    if election_epoch == known_tracker_epoch {
        if let Some(tracker) = &known_tracker_endpoint {
            if candidate != tracker {
                return VoteOutcome::deny();
            }
        }
    }

    if let Some(existing) = state.voted_in_epoch.get(&election_epoch).cloned() {
        // R3a: idempotent confirmation.
        if &existing == candidate {
            return VoteOutcome::grant(false, false);
        }

        // R3b: override a self-vote to a strictly smaller endpoint.
        if existing == state.self_endpoint
            && candidate != &state.self_endpoint
            && endpoint_less(candidate, &state.self_endpoint)
        {
            state
                .voted_in_epoch
                .insert(election_epoch, candidate.clone());
            let was_own_candidacy =
                state.candidate_active && state.candidate_epoch == election_epoch;
            if was_own_candidacy {
                state.clear_candidacy();
            }
            return VoteOutcome::grant(true, was_own_candidacy);
        }

        // R3c: anything else already decided for this epoch is denied.
        return VoteOutcome::deny();
    }

    // R4: first vote seen for this epoch.
    state
        .voted_in_epoch
        .insert(election_epoch, candidate.clone());
    let cancel_own = state.candidate_active
        && state.candidate_epoch <= election_epoch
        && candidate != &state.self_endpoint;
    if cancel_own {
        state.clear_candidacy();
    }
    VoteOutcome::grant(true, cancel_own)
}

/// Tallying at the election deadline (4.3). `voters` is the set of granted
/// votes observed for `state.candidate_epoch`.
pub fn has_quorum(voters: &BTreeSet<Endpoint>, quorum: usize) -> bool {
    voters.len() >= quorum
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state_with_endpoint(s: &str) -> PeerState {
        PeerState::new(Endpoint::new(s), "id".into())
    }

    #[test]
    fn initiate_election_is_idempotent_for_the_same_epoch() {
        let mut state = state_with_endpoint("b");
        let first = initiate_election(&mut state);
        assert_eq!(first, Some(1));
        let second = initiate_election(&mut state);
        assert_eq!(second, None, "already an active candidate for epoch 1");
    }

    #[test]
    fn r3b_overrides_self_vote_only_toward_a_smaller_endpoint() {
        let mut state = state_with_endpoint("z-host");
        initiate_election(&mut state); // self-votes for epoch 1

        let smaller = Endpoint::new("a-host");
        let outcome = evaluate_vote_request(&mut state, &smaller, 1);
        assert!(outcome.granted);
        assert!(outcome.cancel_own_candidacy);
        assert_eq!(state.voted_in_epoch.get(&1), Some(&smaller));
        assert!(!state.candidate_active);
    }

    #[test]
    fn r3b_never_overrides_toward_a_larger_endpoint() {
        let mut state = state_with_endpoint("a-host");
        initiate_election(&mut state);

        let larger = Endpoint::new("z-host");
        let outcome = evaluate_vote_request(&mut state, &larger, 1);
        assert!(!outcome.granted);
        assert_eq!(
            state.voted_in_epoch.get(&1),
            Some(&Endpoint::new("a-host"))
        );
    }

    #[test]
    fn r3a_idempotent_confirmation_does_not_alter_state() {
        let mut state = state_with_endpoint("self");
        let candidate = Endpoint::new("c1");
        evaluate_vote_request(&mut state, &candidate, 5);
        let before = state.voted_in_epoch.clone();
        let outcome = evaluate_vote_request(&mut state, &candidate, 5);
        assert!(outcome.granted);
        assert_eq!(state.voted_in_epoch, before);
    }

    #[test]
    fn r1_denies_a_stale_epoch_while_a_tracker_is_known() {
        let mut state = state_with_endpoint("self");
        state.known_tracker_endpoint = Some(Endpoint::new("tracker"));
        state.known_tracker_epoch = 5;
        let outcome = evaluate_vote_request(&mut state, &Endpoint::new("c1"), 3);
        assert!(!outcome.granted);
    }

    #[test]
    fn r2_denies_a_different_candidate_at_the_live_trackers_epoch() {
        let mut state = state_with_endpoint("self");
        state.known_tracker_endpoint = Some(Endpoint::new("tracker"));
        state.known_tracker_epoch = 5;
        let outcome = evaluate_vote_request(&mut state, &Endpoint::new("someone-else"), 5);
        assert!(!outcome.granted);
    }

    #[test]
    fn quorum_of_three_requires_two_votes() {
        let mut voters = BTreeSet::new();
        voters.insert(Endpoint::new("a"));
        assert!(!has_quorum(&voters, 2));
        voters.insert(Endpoint::new("b"));
        assert!(has_quorum(&voters, 2));
    }
}
