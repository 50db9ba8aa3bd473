mod actor;
mod replica;
mod wire;

pub use actor::ActorError;
pub use actor::ReplicaActor;
pub use replica::Index;
pub use replica::InvalidCluster;
pub use replica::LocalState;
pub use replica::LogEntry;
pub use replica::PeerSet;
pub use replica::Replica;
pub use replica::ReplicaConfig;
pub use replica::ReplicaCreationError;
pub use replica::ReplicaId;
pub use replica::ReplicaOptions;
pub use replica::Term;
pub use replica::VolatileLocalState;
pub use wire::Body;
pub use wire::Envelope;
pub use wire::FrameBuffer;

// The root module only exports; all implementation lives in the child
// modules, and nothing is `pub mod`.
