use crate::wire::message::Envelope;
use bytes::BytesMut;

/// FrameBuffer accumulates raw bytes from the substrate connection and yields
/// complete newline-terminated frames. Partial trailing bytes stay buffered
/// until the next read fills in the rest.
pub struct FrameBuffer {
    buf: BytesMut,
}

impl FrameBuffer {
    pub fn new() -> Self {
        FrameBuffer {
            buf: BytesMut::with_capacity(16 * 1024),
        }
    }

    /// The writable accumulation buffer. The event loop reads socket bytes
    /// directly into this.
    pub fn buf_mut(&mut self) -> &mut BytesMut {
        &mut self.buf
    }

    pub fn extend(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Pops the next complete frame, without its terminating newline. Returns
    /// None once only a partial frame (or nothing) remains.
    pub fn next_frame(&mut self) -> Option<BytesMut> {
        let newline_at = self.buf.iter().position(|b| *b == b'\n')?;
        let mut frame = self.buf.split_to(newline_at + 1);
        frame.truncate(newline_at);
        Some(frame)
    }
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// Serializes one message as a newline-terminated JSON record.
pub fn encode(envelope: &Envelope) -> Result<Vec<u8>, serde_json::Error> {
    let mut wire_bytes = serde_json::to_vec(envelope)?;
    wire_bytes.push(b'\n');
    Ok(wire_bytes)
}

pub fn decode(frame: &[u8]) -> Result<Envelope, serde_json::Error> {
    serde_json::from_slice(frame)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_frame_stays_buffered() {
        let mut frames = FrameBuffer::new();

        frames.extend(b"{\"a\":1}\n{\"b\"");
        assert_eq!(frames.next_frame().unwrap().as_ref(), b"{\"a\":1}");
        assert_eq!(frames.next_frame(), None);

        frames.extend(b":2}\n");
        assert_eq!(frames.next_frame().unwrap().as_ref(), b"{\"b\":2}");
        assert_eq!(frames.next_frame(), None);
    }

    #[test]
    fn multiple_frames_in_one_read() {
        let mut frames = FrameBuffer::new();

        frames.extend(b"one\ntwo\nthree\n");
        assert_eq!(frames.next_frame().unwrap().as_ref(), b"one");
        assert_eq!(frames.next_frame().unwrap().as_ref(), b"two");
        assert_eq!(frames.next_frame().unwrap().as_ref(), b"three");
        assert_eq!(frames.next_frame(), None);
    }

    #[test]
    fn empty_frame_is_yielded() {
        let mut frames = FrameBuffer::new();

        frames.extend(b"\n");
        assert_eq!(frames.next_frame().unwrap().as_ref(), b"");
    }
}
