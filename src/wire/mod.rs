mod framing;
mod message;

pub use framing::decode;
pub use framing::encode;
pub use framing::FrameBuffer;
pub use message::Body;
pub use message::Envelope;
