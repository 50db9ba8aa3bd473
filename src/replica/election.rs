use crate::replica::local_state::Term;
use crate::replica::options::TimingConfig;
use crate::replica::peers::ReplicaId;
use std::collections::HashSet;
use std::fmt;
use std::time::Instant;

/// ElectionState tracks which role this replica currently plays and the
/// timer stamps that drive role changes. All timers here are plain
/// wall-clock comparisons made by the event loop; nothing fires on its own.
pub(crate) struct ElectionState {
    state: State,
    timing: TimingConfig,
}

impl ElectionState {
    /// Replicas start life as a follower with no known leader.
    pub fn new_follower(timing: TimingConfig, now: Instant) -> Self {
        ElectionState {
            state: State::Follower(FollowerState::new(None, now)),
            timing,
        }
    }

    pub fn current_leader(&self) -> CurrentLeader {
        match &self.state {
            State::Leader(_) => CurrentLeader::Me,
            State::Candidate(_) => CurrentLeader::Unknown,
            State::Follower(FollowerState { leader_id: None, .. }) => CurrentLeader::Unknown,
            State::Follower(FollowerState {
                leader_id: Some(leader_id),
                ..
            }) => CurrentLeader::Other(leader_id.clone()),
        }
    }

    pub fn is_leader(&self) -> bool {
        matches!(self.state, State::Leader(_))
    }

    pub fn is_candidate(&self) -> bool {
        matches!(self.state, State::Candidate(_))
    }

    /// Stamp receipt of an append-entries as leader liveness.
    pub fn record_heartbeat_received(&mut self, now: Instant) {
        if let State::Follower(fs) = &mut self.state {
            fs.last_heartbeat_received = now;
        }
    }

    /// Adopt the sender of an append-entries as the believed leader.
    pub fn adopt_leader(&mut self, leader_id: ReplicaId) {
        if let State::Follower(fs) = &mut self.state {
            fs.leader_id = Some(leader_id);
        }
    }

    pub fn transition_to_follower(&mut self, leader_id: Option<ReplicaId>, now: Instant) {
        self.state = State::Follower(FollowerState::new(leader_id, now));
    }

    pub fn transition_to_candidate(&mut self, term: Term, self_id: ReplicaId, now: Instant) {
        self.state = State::Candidate(CandidateState::new(term, self_id, now));
    }

    pub fn transition_to_leader(&mut self, now: Instant) {
        if let State::Leader(_) = self.state {
            return;
        }
        // Stamped in the past so the first heartbeat check comes due at
        // once; the winner also sends an immediate heartbeat on transition.
        self.state = State::Leader(LeaderState {
            last_heartbeat_sent: now,
        });
    }

    /// Counts a `vote` message toward the current election, returning the
    /// unique-tally size. Votes arriving outside an election count nothing.
    pub fn add_received_vote_if_candidate(&mut self, vote_from: ReplicaId) -> usize {
        if let State::Candidate(cs) = &mut self.state {
            cs.received_votes_from.insert(vote_from);
            cs.received_votes_from.len()
        } else {
            0
        }
    }

    pub fn candidate_term(&self) -> Option<Term> {
        if let State::Candidate(cs) = &self.state {
            Some(cs.term)
        } else {
            None
        }
    }

    /// True when a follower has outwaited the election timeout, or a
    /// candidate has outwaited its election window.
    pub fn election_due(&self, now: Instant) -> bool {
        match &self.state {
            State::Follower(fs) => {
                now.saturating_duration_since(fs.last_heartbeat_received) > self.timing.election_timeout
            }
            State::Candidate(cs) => now.saturating_duration_since(cs.election_start) > self.timing.election_window,
            State::Leader(_) => false,
        }
    }

    pub fn heartbeat_due(&self, now: Instant) -> bool {
        match &self.state {
            State::Leader(ls) => {
                now.saturating_duration_since(ls.last_heartbeat_sent) > self.timing.heartbeat_interval
            }
            _ => false,
        }
    }

    pub fn mark_heartbeat_sent(&mut self, now: Instant) {
        if let State::Leader(ls) = &mut self.state {
            ls.last_heartbeat_sent = now;
        }
    }

    pub fn consensus_timeout(&self) -> std::time::Duration {
        self.timing.consensus_timeout
    }
}

impl fmt::Debug for ElectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.state {
            State::Leader(_) => write!(f, "Leader"),
            State::Candidate(cs) => write!(f, "Candidate(Term={})", cs.term),
            State::Follower(FollowerState {
                leader_id: Some(leader_id),
                ..
            }) => write!(f, "Follower(Leader={})", leader_id),
            State::Follower(FollowerState { leader_id: None, .. }) => write!(f, "Follower(Leader=None)"),
        }
    }
}

#[derive(Debug, Eq, PartialEq)]
pub(crate) enum CurrentLeader {
    Me,
    Other(ReplicaId),
    Unknown,
}

enum State {
    Follower(FollowerState),
    Candidate(CandidateState),
    Leader(LeaderState),
}

struct FollowerState {
    leader_id: Option<ReplicaId>,
    last_heartbeat_received: Instant,
}

struct CandidateState {
    term: Term,
    received_votes_from: HashSet<ReplicaId>,
    election_start: Instant,
}

struct LeaderState {
    last_heartbeat_sent: Instant,
}

impl FollowerState {
    fn new(leader_id: Option<ReplicaId>, now: Instant) -> Self {
        FollowerState {
            leader_id,
            last_heartbeat_received: now,
        }
    }
}

impl CandidateState {
    fn new(term: Term, self_id: ReplicaId, now: Instant) -> Self {
        // The tally starts at 1: the candidate votes for itself.
        let mut received_votes_from = HashSet::with_capacity(3);
        received_votes_from.insert(self_id);

        CandidateState {
            term,
            received_votes_from,
            election_start: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::replica::options::ReplicaOptions;
    use std::convert::TryFrom;
    use std::time::Duration;

    fn timing() -> TimingConfig {
        TimingConfig::try_from(ReplicaOptions {
            election_timeout: Some(Duration::from_millis(1000)),
            election_window: Some(Duration::from_millis(500)),
            heartbeat_interval: Some(Duration::from_millis(300)),
            consensus_timeout: Some(Duration::from_millis(400)),
        })
        .unwrap()
    }

    #[test]
    fn follower_election_comes_due_without_heartbeats() {
        let start = Instant::now();
        let mut election = ElectionState::new_follower(timing(), start);

        assert!(!election.election_due(start + Duration::from_millis(900)));
        assert!(election.election_due(start + Duration::from_millis(1001)));

        // A heartbeat pushes the deadline out.
        election.record_heartbeat_received(start + Duration::from_millis(800));
        assert!(!election.election_due(start + Duration::from_millis(1500)));
        assert!(election.election_due(start + Duration::from_millis(1801)));
    }

    #[test]
    fn candidate_tally_is_deduplicated() {
        let start = Instant::now();
        let mut election = ElectionState::new_follower(timing(), start);
        election.transition_to_candidate(Term::new(1), ReplicaId::new("0001"), start);

        assert_eq!(election.add_received_vote_if_candidate(ReplicaId::new("0002")), 2);
        assert_eq!(election.add_received_vote_if_candidate(ReplicaId::new("0002")), 2);
        assert_eq!(election.add_received_vote_if_candidate(ReplicaId::new("0003")), 3);
    }

    #[test]
    fn candidate_window_expiry() {
        let start = Instant::now();
        let mut election = ElectionState::new_follower(timing(), start);
        election.transition_to_candidate(Term::new(1), ReplicaId::new("0001"), start);

        assert!(!election.election_due(start + Duration::from_millis(400)));
        assert!(election.election_due(start + Duration::from_millis(501)));
    }

    #[test]
    fn votes_count_nothing_outside_an_election() {
        let start = Instant::now();
        let mut election = ElectionState::new_follower(timing(), start);

        assert_eq!(election.add_received_vote_if_candidate(ReplicaId::new("0002")), 0);
    }

    #[test]
    fn leader_heartbeat_cadence() {
        let start = Instant::now();
        let mut election = ElectionState::new_follower(timing(), start);
        election.transition_to_leader(start);

        assert_eq!(election.current_leader(), CurrentLeader::Me);
        assert!(!election.heartbeat_due(start + Duration::from_millis(200)));
        assert!(election.heartbeat_due(start + Duration::from_millis(301)));

        election.mark_heartbeat_sent(start + Duration::from_millis(301));
        assert!(!election.heartbeat_due(start + Duration::from_millis(600)));
    }

    #[test]
    fn leader_hint_tracks_role() {
        let start = Instant::now();
        let mut election = ElectionState::new_follower(timing(), start);
        assert_eq!(election.current_leader(), CurrentLeader::Unknown);

        election.adopt_leader(ReplicaId::new("0003"));
        assert_eq!(election.current_leader(), CurrentLeader::Other(ReplicaId::new("0003")));

        election.transition_to_candidate(Term::new(1), ReplicaId::new("0001"), start);
        assert_eq!(election.current_leader(), CurrentLeader::Unknown);
    }
}
