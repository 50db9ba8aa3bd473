use crate::replica::commit_log::LogEntry;
use crate::replica::peers::ReplicaId;
use crate::wire::Envelope;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::time::{Duration, Instant};

/// ProposalId correlates quorum acks with an in-flight append. It is a hash
/// of the newest log entry, so retransmissions of equivalent content keep
/// the same id and late acks from the original broadcast still count.
#[derive(Copy, Clone, Hash, Eq, PartialEq)]
pub struct ProposalId(u64);

impl ProposalId {
    pub fn for_entry(entry: &LogEntry) -> Self {
        let mut hasher = DefaultHasher::new();
        entry.hash(&mut hasher);
        ProposalId(hasher.finish())
    }
}

impl fmt::Debug for ProposalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Leader-side record of one append awaiting quorum.
struct PendingProposal {
    /// Ack tally. None is the sentinel meaning "no acks counted yet"; the
    /// first ack sets it to 2 (the leader itself plus that follower).
    tally: Option<u32>,
    /// Set on commit so late acks are ignored.
    committed: bool,
    client: ReplicaId,
    client_mid: String,
    /// The entry this proposal commits.
    entry: LogEntry,
    /// The broadcast verbatim, for retransmission.
    wire: Envelope,
    issued_at: Instant,
}

/// Everything the leader needs to finish a commit: apply the entry, answer
/// the client.
pub struct CommittedProposal {
    pub entry: LogEntry,
    pub client: ReplicaId,
    pub client_mid: String,
}

/// The pending-proposal table. Proposals enter on client puts, leave on
/// commit (after a tombstone interval that absorbs late acks) and are
/// retransmitted wholesale when they outlive the consensus timeout.
pub struct ProposalTable {
    pending: HashMap<ProposalId, PendingProposal>,
}

impl ProposalTable {
    pub fn new() -> Self {
        ProposalTable {
            pending: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn insert(
        &mut self,
        entry: LogEntry,
        client: ReplicaId,
        client_mid: String,
        wire: Envelope,
        now: Instant,
    ) -> ProposalId {
        let id = ProposalId::for_entry(&entry);
        self.pending.insert(
            id,
            PendingProposal {
                tally: None,
                committed: false,
                client,
                client_mid,
                entry,
                wire,
                issued_at: now,
            },
        );
        id
    }

    /// Counts one `append_okay` toward the proposal. Returns the tally after
    /// counting, or None when the id is unknown or already committed.
    pub fn record_ack(&mut self, id: ProposalId) -> Option<u32> {
        let proposal = self.pending.get_mut(&id)?;
        if proposal.committed {
            return None;
        }

        let tally = match proposal.tally {
            // First ack after issue (or after a retry reset): leader + one
            // follower.
            None => 2,
            Some(tally) => tally + 1,
        };
        proposal.tally = Some(tally);
        Some(tally)
    }

    /// Marks the proposal committed and hands back what the caller needs to
    /// apply and reply. The record stays behind as a tombstone so late acks
    /// fall into `record_ack`'s committed branch.
    pub fn mark_committed(&mut self, id: ProposalId) -> Option<CommittedProposal> {
        let proposal = self.pending.get_mut(&id)?;
        if proposal.committed {
            return None;
        }
        proposal.committed = true;

        Some(CommittedProposal {
            entry: proposal.entry.clone(),
            client: proposal.client.clone(),
            client_mid: proposal.client_mid.clone(),
        })
    }

    /// The retry walk. Uncommitted proposals older than `timeout` are
    /// re-stamped, their tally reset to the sentinel, and their broadcast
    /// returned for retransmission. Committed tombstones past the same age
    /// are dropped.
    pub fn collect_expired(&mut self, now: Instant, timeout: Duration) -> Vec<Envelope> {
        let mut retransmit = Vec::new();

        self.pending.retain(|_, proposal| {
            if now.saturating_duration_since(proposal.issued_at) <= timeout {
                return true;
            }
            if proposal.committed {
                return false;
            }

            proposal.tally = None;
            proposal.issued_at = now;
            retransmit.push(proposal.wire.clone());
            true
        });

        retransmit
    }

    /// Dropped wholesale when leadership is lost; unfinished clients re-drive
    /// via their own timeouts.
    pub fn clear(&mut self) {
        self.pending.clear();
    }
}

impl Default for ProposalTable {
    fn default() -> Self {
        Self::new()
    }
}
