use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// The well-known id that addresses "all peers" on the substrate. The same
/// string doubles as the "unknown leader" sentinel in message headers.
const BROADCAST_ID: &str = "FFFF";

/// ReplicaId names an entity on the substrate: one of the replicas in the
/// cluster, or a client.
#[derive(Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReplicaId(String);

impl ReplicaId {
    pub fn new(replica_id: impl Into<String>) -> Self {
        ReplicaId(replica_id.into())
    }

    pub fn broadcast() -> Self {
        ReplicaId(BROADCAST_ID.to_string())
    }

    pub fn is_broadcast(&self) -> bool {
        self.0 == BROADCAST_ID
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Debug for ReplicaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for ReplicaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// PeerSet is the fixed cluster membership: this replica's own id plus the
/// ids of every other replica.
pub struct PeerSet {
    my_id: ReplicaId,
    peer_ids: Vec<ReplicaId>,
}

impl PeerSet {
    pub fn new(my_id: ReplicaId, peer_ids: Vec<ReplicaId>) -> Result<Self, InvalidCluster> {
        if my_id.is_broadcast() {
            return Err(InvalidCluster::ReservedId(my_id.into_inner()));
        }

        let mut seen = HashSet::with_capacity(peer_ids.len() + 1);
        seen.insert(my_id.clone());
        for peer_id in &peer_ids {
            if peer_id.is_broadcast() {
                return Err(InvalidCluster::ReservedId(peer_id.clone().into_inner()));
            }
            if !seen.insert(peer_id.clone()) {
                return Err(InvalidCluster::DuplicateReplicaId(peer_id.clone().into_inner()));
            }
        }

        Ok(PeerSet { my_id, peer_ids })
    }

    pub fn my_id(&self) -> &ReplicaId {
        &self.my_id
    }

    pub fn peer_ids(&self) -> &[ReplicaId] {
        &self.peer_ids
    }

    pub fn contains_member(&self, id: &ReplicaId) -> bool {
        *id == self.my_id || self.peer_ids.contains(id)
    }

    /// Votes or acks strictly greater than this threshold constitute a
    /// quorum: floor((1 + peer_count) / 2).
    pub fn majority_threshold(&self) -> u32 {
        ((1 + self.peer_ids.len()) / 2) as u32
    }
}

#[derive(Debug, thiserror::Error)]
pub enum InvalidCluster {
    #[error("duplicate replica '{0}' in cluster config")]
    DuplicateReplicaId(String),
    #[error("replica id '{0}' is reserved for broadcast")]
    ReservedId(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cluster_of_five() -> PeerSet {
        PeerSet::new(
            ReplicaId::new("0001"),
            vec![
                ReplicaId::new("0002"),
                ReplicaId::new("0003"),
                ReplicaId::new("0004"),
                ReplicaId::new("0005"),
            ],
        )
        .unwrap()
    }

    #[test]
    fn majority_threshold_of_five() {
        // floor((1 + 4) / 2) = 2; quorum therefore needs 3.
        assert_eq!(cluster_of_five().majority_threshold(), 2);
    }

    #[test]
    fn membership() {
        let peers = cluster_of_five();
        assert!(peers.contains_member(&ReplicaId::new("0001")));
        assert!(peers.contains_member(&ReplicaId::new("0003")));
        assert!(!peers.contains_member(&ReplicaId::new("C001")));
    }

    #[test]
    fn rejects_duplicates_and_reserved_ids() {
        assert!(matches!(
            PeerSet::new(
                ReplicaId::new("0001"),
                vec![ReplicaId::new("0002"), ReplicaId::new("0002")]
            ),
            Err(InvalidCluster::DuplicateReplicaId(_))
        ));
        assert!(matches!(
            PeerSet::new(ReplicaId::new("0001"), vec![ReplicaId::broadcast()]),
            Err(InvalidCluster::ReservedId(_))
        ));
    }
}
