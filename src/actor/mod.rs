use crate::replica::{LocalState, Replica};
use crate::wire::{self, FrameBuffer};
use std::io;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Bounded socket poll per event-loop iteration. Timer deadlines are checked
/// between polls, so this also caps timer latency.
const POLL_QUANTUM: Duration = Duration::from_millis(10);

#[derive(Debug, thiserror::Error)]
pub enum ActorError {
    #[error("substrate connection failure: {0}")]
    Io(#[from] io::Error),
}

/// ReplicaActor drives one [Replica] against its single substrate
/// connection. Everything runs on one task: read a bounded slice of socket
/// bytes, dispatch whole frames, run the timer pass, flush the outbox. No
/// other execution context ever touches the replica.
pub struct ReplicaActor<T, S>
where
    T: AsyncRead + AsyncWrite + Unpin,
    S: LocalState,
{
    logger: slog::Logger,
    transport: T,
    frames: FrameBuffer,
    replica: Replica<S>,
}

impl<T, S> ReplicaActor<T, S>
where
    T: AsyncRead + AsyncWrite + Unpin,
    S: LocalState,
{
    pub fn new(logger: slog::Logger, transport: T, replica: Replica<S>) -> Self {
        ReplicaActor {
            logger,
            transport,
            frames: FrameBuffer::new(),
            replica,
        }
    }

    /// Runs until the substrate closes the connection (clean exit) or the
    /// socket fails.
    pub async fn run_event_loop(mut self) -> Result<(), ActorError> {
        loop {
            self.replica.replay_log_if_scheduled();

            match tokio::time::timeout(POLL_QUANTUM, self.transport.read_buf(self.frames.buf_mut())).await {
                // Quiet socket; fall through to the timer pass.
                Err(_elapsed) => {}
                Ok(Ok(0)) => {
                    slog::info!(self.logger, "Substrate closed the connection; exiting");
                    return Ok(());
                }
                Ok(Ok(_n)) => self.dispatch_frames(),
                Ok(Err(e)) => return Err(ActorError::Io(e)),
            }

            self.replica.tick(Instant::now());
            self.flush_outbox().await?;
        }
    }

    fn dispatch_frames(&mut self) {
        while let Some(frame) = self.frames.next_frame() {
            match wire::decode(&frame) {
                Ok(envelope) => {
                    slog::debug!(self.logger, "Recv {}", envelope.body.type_tag();
                        "src" => %envelope.src, "MID" => %envelope.mid);
                    self.replica.handle_message(envelope, Instant::now());
                }
                Err(e) => {
                    // Fatal to this frame only.
                    slog::warn!(self.logger, "Dropping unparseable frame: {}", e);
                }
            }
        }
    }

    async fn flush_outbox(&mut self) -> Result<(), ActorError> {
        for envelope in self.replica.take_outbox() {
            slog::debug!(self.logger, "Send {}", envelope.body.type_tag();
                "dst" => %envelope.dst, "MID" => %envelope.mid);
            let wire_bytes = match wire::encode(&envelope) {
                Ok(wire_bytes) => wire_bytes,
                Err(e) => {
                    slog::warn!(self.logger, "Failed to serialize outbound {}: {}", envelope.body.type_tag(), e);
                    continue;
                }
            };
            self.transport.write_all(&wire_bytes).await?;
        }
        Ok(())
    }
}
