use crate::replica::commit_log::{Index, KvLog, LogEntry, TailAppend};
use crate::replica::election::{CurrentLeader, ElectionState};
use crate::replica::local_state::{LocalState, Term};
use crate::replica::options::{ReplicaOptions, TimingConfig};
use crate::replica::peers::{PeerSet, ReplicaId};
use crate::replica::proposals::{ProposalId, ProposalTable};
use crate::replica::state_machine::KvStateMachine;
use crate::wire::{Body, Envelope};
use rand::Rng;
use std::convert::TryFrom;
use std::time::Instant;

pub struct ReplicaConfig<S: LocalState> {
    pub logger: slog::Logger,
    pub peers: PeerSet,
    pub local_state: S,
    pub options: ReplicaOptions,
}

#[derive(Debug, thiserror::Error)]
pub enum ReplicaCreationError {
    #[error("illegal timing options: {0}")]
    IllegalOptions(&'static str),
}

/// Replica is the consensus engine: one logical actor holding the log, the
/// derived key-value map, the election role, and the leader's in-flight
/// proposal table. It is purely synchronous; the event loop feeds it framed
/// messages and the current time, and drains its outbox after each step.
pub struct Replica<S: LocalState> {
    logger: slog::Logger,
    peers: PeerSet,
    local_state: S,
    election: ElectionState,
    log: KvLog,
    state_machine: KvStateMachine,
    proposals: ProposalTable,
    outbox: Vec<Envelope>,
    /// Set when this replica wins an election: its log may hold entries
    /// never applied here (inherited proposals from an earlier leadership),
    /// so the whole log is replayed into the state machine on the next loop
    /// iteration.
    replay_log_scheduled: bool,
}

impl<S: LocalState> Replica<S> {
    pub fn new(config: ReplicaConfig<S>, now: Instant) -> Result<Self, ReplicaCreationError> {
        let timing = TimingConfig::try_from(config.options).map_err(ReplicaCreationError::IllegalOptions)?;

        Ok(Replica {
            logger: config.logger,
            peers: config.peers,
            local_state: config.local_state,
            election: ElectionState::new_follower(timing, now),
            log: KvLog::new(),
            state_machine: KvStateMachine::new(),
            proposals: ProposalTable::new(),
            outbox: Vec::new(),
            replay_log_scheduled: false,
        })
    }

    /// Dispatches one inbound frame.
    pub fn handle_message(&mut self, envelope: Envelope, now: Instant) {
        if envelope.dst != *self.peers.my_id() && !envelope.dst.is_broadcast() {
            slog::debug!(self.logger, "Dropping message not addressed to us"; "dst" => %envelope.dst);
            return;
        }

        let Envelope { src, mid, body, .. } = envelope;

        // Consensus traffic must come from a cluster member.
        match &body {
            Body::RequestVote { .. } | Body::Vote | Body::AppendEntries { .. } | Body::AppendOkay { .. }
                if !self.peers.contains_member(&src) =>
            {
                slog::warn!(self.logger, "Dropping {} from non-member", body.type_tag(); "src" => %src);
                return;
            }
            _ => {}
        }

        match body {
            Body::Get { key } => self.handle_get(src, mid, key),
            Body::Put { key, value } => self.handle_put(src, mid, key, value, now),
            Body::RequestVote {
                term,
                length,
                last_entry,
            } => self.handle_request_vote(src, mid, term, length, last_entry, now),
            Body::Vote => self.handle_vote(src, now),
            Body::AppendEntries {
                updates,
                commit,
                client_id,
                client_mid,
                term,
            } => self.handle_append_entries(src, mid, term, updates, commit, client_id, client_mid, now),
            Body::AppendOkay {
                updates,
                client_id,
                client_mid,
            } => self.handle_append_okay(updates, client_id, client_mid),
            Body::Ok { .. } | Body::Fail | Body::Redirect => {
                slog::debug!(self.logger, "Dropping client-bound {} frame", body.type_tag());
            }
        }
    }

    fn handle_get(&mut self, src: ReplicaId, mid: String, key: String) {
        if !self.election.is_leader() {
            self.reply_not_leader(src, mid);
            return;
        }

        // Served from the locally applied state with no coordination; only
        // what this leader has committed is visible.
        let value = self.state_machine.read(&key).unwrap_or("").to_string();
        self.send(src, mid, Body::Ok { value: Some(value) });
    }

    fn handle_put(&mut self, src: ReplicaId, mid: String, key: String, value: String, now: Instant) {
        if !self.election.is_leader() {
            self.reply_not_leader(src, mid);
            return;
        }

        let term = self.local_state.current_term();
        let entry = LogEntry::new(key, value, term);
        self.log.append(entry.clone());

        let wire = Envelope {
            src: self.peers.my_id().clone(),
            dst: ReplicaId::broadcast(),
            leader: self.leader_hint(),
            mid: new_mid(),
            body: Body::AppendEntries {
                updates: self.log.entries().to_vec(),
                commit: self.log.wire_commit_index(),
                client_id: src.clone(),
                client_mid: mid.clone(),
                term,
            },
        };

        let proposal_id = self.proposals.insert(entry, src, mid, wire.clone(), now);
        slog::debug!(self.logger, "Proposing"; "proposal" => ?proposal_id, "log_len" => self.log.len());

        self.outbox.push(wire);
        // The broadcast doubles as a heartbeat.
        self.election.mark_heartbeat_sent(now);
    }

    fn handle_request_vote(
        &mut self,
        src: ReplicaId,
        mid: String,
        candidate_term: Term,
        candidate_log_len: u64,
        candidate_last_entry: Option<LogEntry>,
        now: Instant,
    ) {
        // A strictly newer term unseats a sitting leader.
        if candidate_term > self.local_state.current_term() {
            self.local_state.store_term_if_increased(candidate_term);
            if self.election.is_leader() {
                slog::info!(self.logger, "Stepping down: vote request at newer term";
                    "candidate" => %src, "term" => %candidate_term);
                self.proposals.clear();
                self.election.transition_to_follower(None, now);
            }
        }

        // Stale-term requests and repeat requests for a term we already
        // voted in get no reply; silence is denial.
        if candidate_term < self.local_state.current_term() {
            return;
        }
        if self.local_state.has_voted(candidate_term) {
            return;
        }
        if !self.candidate_log_up_to_date(candidate_last_entry.as_ref(), candidate_log_len) {
            return;
        }

        self.local_state.record_vote(candidate_term);
        slog::info!(self.logger, "Voting"; "candidate" => %src, "term" => %candidate_term);
        self.send(src, mid, Body::Vote);
    }

    /// Whether the candidate's log is at least as up-to-date as ours,
    /// judged by last-entry term and then claimed length.
    fn candidate_log_up_to_date(&self, candidate_last_entry: Option<&LogEntry>, candidate_log_len: u64) -> bool {
        let my_last_entry = match self.log.last_entry() {
            None => return true,
            Some(entry) => entry,
        };
        let candidate_last_entry = match candidate_last_entry {
            None => return true,
            Some(entry) => entry,
        };

        if candidate_last_entry.term > my_last_entry.term {
            return true;
        }
        if candidate_last_entry.term < my_last_entry.term {
            return false;
        }

        self.log.len() <= candidate_log_len
    }

    fn handle_vote(&mut self, src: ReplicaId, now: Instant) {
        if !self.election.is_candidate() {
            return;
        }

        let votes = self.election.add_received_vote_if_candidate(src) as u32;
        if votes <= self.peers.majority_threshold() {
            return;
        }

        slog::info!(self.logger, "Won election";
            "term" => %self.local_state.current_term(), "votes" => votes);
        self.election.transition_to_leader(now);
        // Our log may carry entries this process never applied; replay it
        // wholesale on the next loop iteration.
        self.replay_log_scheduled = true;
        self.broadcast_heartbeat(now);
    }

    #[allow(clippy::too_many_arguments)]
    fn handle_append_entries(
        &mut self,
        src: ReplicaId,
        mid: String,
        leader_term: Term,
        updates: Vec<LogEntry>,
        leader_commit: i64,
        client_id: ReplicaId,
        client_mid: String,
        now: Instant,
    ) {
        self.election.record_heartbeat_received(now);

        // A candidate yields to any current-or-newer leader.
        if self.election.is_candidate() && leader_term >= self.local_state.current_term() {
            slog::info!(self.logger, "Abandoning candidacy: leader is live"; "leader" => %src);
            self.local_state.store_term_if_increased(leader_term);
            self.election.transition_to_follower(Some(src.clone()), now);
        }

        if self.election.is_leader() {
            if leader_term > self.local_state.current_term() {
                slog::info!(self.logger, "Stepping down: leader at newer term";
                    "leader" => %src, "term" => %leader_term);
                self.local_state.store_term_if_increased(leader_term);
                self.proposals.clear();
                self.election.transition_to_follower(Some(src), now);
            }
            // Dropped in both cases; the newer leader's next broadcast
            // reaches us as a follower.
            return;
        }

        if leader_term < self.local_state.current_term() {
            slog::debug!(self.logger, "Dropping stale append-entries";
                "src" => %src, "term" => %leader_term);
            return;
        }
        self.local_state.store_term_if_increased(leader_term);

        self.election.adopt_leader(src.clone());

        for entry in self.log.advance_commit_index(leader_commit) {
            self.state_machine.apply(&entry);
        }

        if updates.is_empty() {
            return;
        }
        match self.log.offer_tail(&updates) {
            TailAppend::Appended | TailAppend::Duplicate => {
                self.send(
                    src,
                    mid,
                    Body::AppendOkay {
                        updates,
                        client_id,
                        client_mid,
                    },
                );
            }
            TailAppend::Gap => {
                // We've fallen more than one entry behind this leader. No
                // repair path exists; stay silent.
                slog::warn!(self.logger, "Log gap: cannot accept updates";
                    "updates_len" => updates.len(), "log_len" => self.log.len());
            }
        }
    }

    fn handle_append_okay(&mut self, updates: Vec<LogEntry>, _client_id: ReplicaId, _client_mid: String) {
        if !self.election.is_leader() {
            return;
        }

        let newest = match updates.last() {
            Some(newest) => newest,
            None => {
                slog::warn!(self.logger, "Dropping append_okay with no updates");
                return;
            }
        };

        let proposal_id = ProposalId::for_entry(newest);
        let tally = match self.proposals.record_ack(proposal_id) {
            Some(tally) => tally,
            // Unknown or already-committed proposal; late acks land here.
            None => return,
        };

        if tally <= self.peers.majority_threshold() {
            return;
        }

        if let Some(committed) = self.proposals.mark_committed(proposal_id) {
            self.state_machine.apply(&committed.entry);
            self.log.commit_next();
            slog::info!(self.logger, "Committed";
                "key" => %committed.entry.key, "commit_index" => self.log.wire_commit_index());
            self.send(committed.client, committed.client_mid, Body::Ok { value: None });
        }
    }

    /// First step of every event-loop iteration: if this replica just won
    /// an election, rebuild its state machine from the full log.
    pub fn replay_log_if_scheduled(&mut self) {
        if !self.replay_log_scheduled {
            return;
        }
        self.replay_log_scheduled = false;

        slog::debug!(self.logger, "Replaying log into state machine"; "log_len" => self.log.len());
        for entry in self.log.entries() {
            self.state_machine.apply(entry);
        }
        // Everything replayed is now this leadership's responsibility; the
        // watermark follows so later commits broadcast the right index.
        self.log.commit_all();
    }

    /// Timer pass, run once per event-loop iteration: proposal retries,
    /// election deadlines, leader heartbeat.
    pub fn tick(&mut self, now: Instant) {
        if self.election.is_leader() {
            let resends = self.proposals.collect_expired(now, self.election.consensus_timeout());
            if !resends.is_empty() {
                slog::debug!(self.logger, "Retransmitting unacknowledged proposals"; "count" => resends.len());
                self.election.mark_heartbeat_sent(now);
                self.outbox.extend(resends);
            }
        }

        if self.election.election_due(now) {
            self.start_election(now);
        }

        if self.election.heartbeat_due(now) {
            self.broadcast_heartbeat(now);
        }
    }

    fn start_election(&mut self, now: Instant) {
        let term = self.local_state.increment_term_and_vote_for_self();
        slog::info!(self.logger, "Starting election"; "term" => %term);
        self.election
            .transition_to_candidate(term, self.peers.my_id().clone(), now);

        let body = Body::RequestVote {
            term,
            length: self.log.len(),
            last_entry: self.log.last_entry().cloned(),
        };
        self.broadcast(body);
    }

    fn broadcast_heartbeat(&mut self, now: Instant) {
        let body = Body::AppendEntries {
            updates: Vec::new(),
            commit: self.log.wire_commit_index(),
            client_id: ReplicaId::broadcast(),
            client_mid: String::new(),
            term: self.local_state.current_term(),
        };
        self.broadcast(body);
        self.election.mark_heartbeat_sent(now);
    }

    fn reply_not_leader(&mut self, src: ReplicaId, mid: String) {
        // The leader hint in the header tells the client where to retry;
        // it is the unknown sentinel while an election is unresolved.
        self.send(src, mid, Body::Redirect);
    }

    /// Everyone we send to learns our current leader hint from the header.
    fn leader_hint(&self) -> ReplicaId {
        match self.election.current_leader() {
            CurrentLeader::Me => self.peers.my_id().clone(),
            CurrentLeader::Other(leader_id) => leader_id,
            CurrentLeader::Unknown => ReplicaId::broadcast(),
        }
    }

    fn send(&mut self, dst: ReplicaId, mid: String, body: Body) {
        self.outbox.push(Envelope {
            src: self.peers.my_id().clone(),
            dst,
            leader: self.leader_hint(),
            mid,
            body,
        });
    }

    fn broadcast(&mut self, body: Body) {
        self.send(ReplicaId::broadcast(), new_mid(), body);
    }

    /// Drains everything queued for the wire since the last drain.
    pub fn take_outbox(&mut self) -> Vec<Envelope> {
        std::mem::take(&mut self.outbox)
    }

    pub fn is_leader(&self) -> bool {
        self.election.is_leader()
    }

    pub fn current_term(&self) -> Term {
        self.local_state.current_term()
    }

    pub fn commit_index(&self) -> Option<Index> {
        self.log.commit_index()
    }

    pub fn log_entries(&self) -> &[LogEntry] {
        self.log.entries()
    }

    /// The applied value for `key`, if any.
    pub fn read(&self, key: &str) -> Option<&str> {
        self.state_machine.read(key)
    }
}

fn new_mid() -> String {
    format!("{:016x}", rand::thread_rng().gen::<u64>())
}
