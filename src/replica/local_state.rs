use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Term labels a leadership epoch. Monotonically non-decreasing per replica.
#[derive(Debug, Copy, Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Term(u64);

impl Term {
    pub fn new(term: u64) -> Self {
        Term(term)
    }

    pub fn next(self) -> Self {
        Term(self.0 + 1)
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// LocalState is the state the protocol requires a replica to consult before
/// acting on a term: the current term and the ledger of terms it has already
/// voted in. A replica votes at most once per term.
///
/// This is a trait seam so a durable implementation could slot in later; the
/// in-memory one below is the only one this crate ships (state does not
/// survive a process restart).
pub trait LocalState {
    fn current_term(&self) -> Term;

    /// Adopts `new_term` if it is strictly greater than the current term.
    /// Returns whether the term advanced.
    fn store_term_if_increased(&mut self, new_term: Term) -> bool;

    /// Starts a new election epoch: bumps the term and spends this replica's
    /// vote for it on itself. Returns the new term.
    fn increment_term_and_vote_for_self(&mut self) -> Term;

    /// Spends this replica's one vote for `term`. Returns false if the vote
    /// for that term was already cast.
    fn record_vote(&mut self, term: Term) -> bool;

    fn has_voted(&self, term: Term) -> bool;
}

pub struct VolatileLocalState {
    current_term: Term,
    voted_terms: HashSet<Term>,
}

impl VolatileLocalState {
    pub fn new() -> Self {
        VolatileLocalState {
            current_term: Term::new(0),
            voted_terms: HashSet::new(),
        }
    }
}

impl Default for VolatileLocalState {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalState for VolatileLocalState {
    fn current_term(&self) -> Term {
        self.current_term
    }

    fn store_term_if_increased(&mut self, new_term: Term) -> bool {
        if new_term <= self.current_term {
            return false;
        }
        self.current_term = new_term;
        true
    }

    fn increment_term_and_vote_for_self(&mut self) -> Term {
        self.current_term = self.current_term.next();
        self.voted_terms.insert(self.current_term);
        self.current_term
    }

    fn record_vote(&mut self, term: Term) -> bool {
        self.voted_terms.insert(term)
    }

    fn has_voted(&self, term: Term) -> bool {
        self.voted_terms.contains(&term)
    }
}
