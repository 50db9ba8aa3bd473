use crate::replica::local_state::Term;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Index of an entry in the log. The log is indexed from 0.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd)]
pub struct Index(u64);

impl Index {
    pub fn new(index: u64) -> Self {
        Index(index)
    }

    pub fn val(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Index {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One replicated state transition: set `key` to `value`. Tagged with the
/// term of the leader that accepted it. Travels as a `[key, value, term]`
/// triple on the wire.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(from = "(String, String, u64)", into = "(String, String, u64)")]
pub struct LogEntry {
    pub key: String,
    pub value: String,
    pub term: Term,
}

impl LogEntry {
    pub fn new(key: impl Into<String>, value: impl Into<String>, term: Term) -> Self {
        LogEntry {
            key: key.into(),
            value: value.into(),
            term,
        }
    }
}

impl From<(String, String, u64)> for LogEntry {
    fn from((key, value, term): (String, String, u64)) -> Self {
        LogEntry {
            key,
            value,
            term: Term::new(term),
        }
    }
}

impl From<LogEntry> for (String, String, u64) {
    fn from(entry: LogEntry) -> Self {
        (entry.key, entry.value, entry.term.as_u64())
    }
}

/// Outcome of offering a leader's `updates` list to the local log.
#[derive(Debug, Eq, PartialEq)]
pub enum TailAppend {
    /// The single new tail entry was appended.
    Appended,
    /// Retransmission of content already at our tail; nothing appended, but
    /// the sender still deserves an acknowledgement.
    Duplicate,
    /// The updates skip past entries we don't hold. No repair path exists
    /// for multi-entry gaps; stay silent and wait for the log to line up.
    Gap,
}

/// KvLog is the append-only log plus the commit watermark. Entries are never
/// reordered or mutated; commitment only moves forward.
pub struct KvLog {
    entries: Vec<LogEntry>,
    commit_index: Option<Index>,
}

impl KvLog {
    pub fn new() -> Self {
        KvLog {
            entries: Vec::new(),
            commit_index: None,
        }
    }

    pub fn len(&self) -> u64 {
        self.entries.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn last_entry(&self) -> Option<&LogEntry> {
        self.entries.last()
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    /// Commit watermark: all entries at indices 0..=commit_index are
    /// committed. None means nothing is committed (the wire's -1).
    pub fn commit_index(&self) -> Option<Index> {
        self.commit_index
    }

    pub fn wire_commit_index(&self) -> i64 {
        match self.commit_index {
            Some(index) => index.val() as i64,
            None => -1,
        }
    }

    pub fn append(&mut self, entry: LogEntry) -> Index {
        self.entries.push(entry);
        Index::new(self.entries.len() as u64 - 1)
    }

    /// Offers the leader's full `updates` list, of which only the last
    /// element is new this round. Appends it iff the updates extend our log
    /// by exactly one entry; recognizes a verbatim retransmission by length
    /// and identical tail.
    pub fn offer_tail(&mut self, updates: &[LogEntry]) -> TailAppend {
        let newest = match updates.last() {
            Some(newest) => newest,
            None => return TailAppend::Duplicate,
        };

        if updates.len() as u64 == self.len() + 1 {
            self.entries.push(newest.clone());
            return TailAppend::Appended;
        }

        if updates.len() as u64 == self.len() && self.last_entry() == Some(newest) {
            return TailAppend::Duplicate;
        }

        TailAppend::Gap
    }

    /// New-leader catch-up: the winner assumes responsibility for every
    /// entry it holds (including uncommitted proposals inherited from an
    /// earlier leadership), so the watermark moves to the tail. Never moves
    /// backwards.
    pub fn commit_all(&mut self) {
        let tail = self.len() as i64 - 1;
        if tail > self.wire_commit_index() {
            self.commit_index = Some(Index::new(tail as u64));
        }
    }

    /// Leader-side commit: the watermark moves up by exactly one entry.
    pub fn commit_next(&mut self) {
        self.commit_index = Some(match self.commit_index {
            Some(index) => Index::new(index.val() + 1),
            None => Index::new(0),
        });
    }

    /// Follower-side commit advancement. Adopts the leader's watermark and
    /// returns the newly-committed entries we actually hold, in log order,
    /// for application to the state machine. Entries past the end of our log
    /// are not returned; the watermark still advances to the leader's value.
    pub fn advance_commit_index(&mut self, leader_commit: i64) -> Vec<LogEntry> {
        if leader_commit < 0 || leader_commit <= self.wire_commit_index() {
            return Vec::new();
        }

        let first_new = (self.wire_commit_index() + 1) as usize;
        let last_new_exclusive = ((leader_commit + 1) as usize).min(self.entries.len());
        let newly_committed = if first_new < last_new_exclusive {
            self.entries[first_new..last_new_exclusive].to_vec()
        } else {
            Vec::new()
        };

        self.commit_index = Some(Index::new(leader_commit as u64));
        newly_committed
    }
}

impl Default for KvLog {
    fn default() -> Self {
        Self::new()
    }
}
