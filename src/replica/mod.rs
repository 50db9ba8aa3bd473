mod commit_log;
mod election;
mod local_state;
mod options;
mod peers;
mod proposals;
mod replica;
mod state_machine;

pub use commit_log::Index;
pub use commit_log::KvLog;
pub use commit_log::LogEntry;
pub use commit_log::TailAppend;
pub use local_state::LocalState;
pub use local_state::Term;
pub use local_state::VolatileLocalState;
pub use options::ReplicaOptions;
pub use peers::InvalidCluster;
pub use peers::PeerSet;
pub use peers::ReplicaId;
pub use replica::Replica;
pub use replica::ReplicaConfig;
pub use replica::ReplicaCreationError;
