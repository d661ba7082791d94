//! In-process channel pair.

use crossbeam_channel::{Receiver, Sender, unbounded};

use crate::error::{ProofreadError, Result};
use crate::protocol::{Channel, Envelope};

/// One end of an in-process pair. Messages travel as JSON text, exactly as
/// they would over a socket.
#[derive(Debug)]
pub struct MemoryChannel {
    sender: Sender<String>,
    receiver: Receiver<String>,
}

impl MemoryChannel {
    /// Create two connected ends.
    pub fn pair() -> (MemoryChannel, MemoryChannel) {
        let (left_tx, left_rx) = unbounded();
        let (right_tx, right_rx) = unbounded();
        (
            MemoryChannel {
                sender: left_tx,
                receiver: right_rx,
            },
            MemoryChannel {
                sender: right_tx,
                receiver: left_rx,
            },
        )
    }
}

impl Channel for MemoryChannel {
    fn send(&mut self, envelope: &Envelope) -> Result<()> {
        self.sender
            .send(envelope.to_json()?)
            .map_err(|_| ProofreadError::ChannelClosed)
    }

    fn recv(&mut self) -> Result<Envelope> {
        let text = self
            .receiver
            .recv()
            .map_err(|_| ProofreadError::ChannelClosed)?;
        Envelope::from_json(&text)
    }
}
