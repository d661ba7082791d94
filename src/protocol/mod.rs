//! Wire messages exchanged between a proofreading session and its client.
//!
//! Every message is an [`Envelope`] `{"type": ..., "data": {...}}` encoded as
//! JSON. Sessions decode envelopes into [`Command`]s; clients decode the
//! lookup table reply with [`LookupTable::from_envelope`].

pub mod memory;
pub mod tcp;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::error::{ProofreadError, Result};

pub use memory::MemoryChannel;
pub use tcp::{TcpBinding, TcpChannel};

/// The only `request` target sessions answer.
pub const LUT_REQUEST: &str = "fragment-segment-lut";

pub const MERGE: &str = "merge";
pub const SEPARATE: &str = "separate";
pub const REQUEST: &str = "request";
pub const STOP: &str = "stop";

/// A typed message with a free-form payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: Value,
}

impl Envelope {
    pub fn new(kind: impl Into<String>, data: Value) -> Self {
        Self {
            kind: kind.into(),
            data,
        }
    }

    pub fn merge(segments: &[u64]) -> Self {
        Self::new(MERGE, json!({ "segments": segments }))
    }

    pub fn separate(f0: u64, f1: u64) -> Self {
        Self::new(SEPARATE, json!({ "segments": [f0, f1] }))
    }

    pub fn request_lut() -> Self {
        Self::new(REQUEST, json!({ "what": LUT_REQUEST }))
    }

    pub fn stop() -> Self {
        Self::new(STOP, json!({}))
    }

    pub fn lut(fragments: &[u64], segments: &[u64]) -> Self {
        Self::new(
            LUT_REQUEST,
            json!({ "fragments": fragments, "segments": segments }),
        )
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text)
            .map_err(|e| ProofreadError::protocol(format!("malformed envelope: {e}")))
    }
}

#[derive(Deserialize)]
struct SegmentsPayload {
    segments: Vec<u64>,
}

#[derive(Deserialize)]
struct RequestPayload {
    what: String,
}

/// A decoded client command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Merge(Vec<u64>),
    Separate(u64, u64),
    Request(String),
    Stop,
    /// A message whose type or payload the session does not understand.
    Unknown(String),
}

impl Command {
    /// Decode an envelope. Never fails: unrecognized types and malformed
    /// payloads become [`Command::Unknown`] with a description.
    pub fn parse(envelope: &Envelope) -> Self {
        match envelope.kind.as_str() {
            MERGE => match serde_json::from_value::<SegmentsPayload>(envelope.data.clone()) {
                Ok(payload) => Command::Merge(payload.segments),
                Err(e) => Command::Unknown(format!("malformed merge payload: {e}")),
            },
            SEPARATE => match serde_json::from_value::<SegmentsPayload>(envelope.data.clone()) {
                Ok(payload) if payload.segments.len() == 2 => {
                    Command::Separate(payload.segments[0], payload.segments[1])
                }
                Ok(payload) => Command::Unknown(format!(
                    "separate needs two fragments, got {}",
                    payload.segments.len()
                )),
                Err(e) => Command::Unknown(format!("malformed separate payload: {e}")),
            },
            REQUEST => match serde_json::from_value::<RequestPayload>(envelope.data.clone()) {
                Ok(payload) => Command::Request(payload.what),
                Err(e) => Command::Unknown(format!("malformed request payload: {e}")),
            },
            STOP => Command::Stop,
            other => Command::Unknown(format!("unknown message type '{other}'")),
        }
    }
}

/// Fragment to segment mapping as returned by a session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LookupTable {
    pub fragments: Vec<u64>,
    pub segments: Vec<u64>,
}

impl LookupTable {
    pub fn new(fragments: Vec<u64>, segments: Vec<u64>) -> Self {
        Self {
            fragments,
            segments,
        }
    }

    pub fn from_envelope(envelope: &Envelope) -> Result<Self> {
        if envelope.kind != LUT_REQUEST {
            return Err(ProofreadError::protocol(format!(
                "expected '{LUT_REQUEST}', got '{}'",
                envelope.kind
            )));
        }
        let table: LookupTable = serde_json::from_value(envelope.data.clone())
            .map_err(|e| ProofreadError::protocol(format!("malformed lookup table: {e}")))?;
        if table.fragments.len() != table.segments.len() {
            return Err(ProofreadError::protocol(format!(
                "lookup table has {} fragments but {} segments",
                table.fragments.len(),
                table.segments.len()
            )));
        }
        Ok(table)
    }

    pub fn to_envelope(&self) -> Envelope {
        Envelope::lut(&self.fragments, &self.segments)
    }

    pub fn len(&self) -> usize {
        self.fragments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    pub fn segment_of(&self, fragment: u64) -> Option<u64> {
        self.fragments
            .iter()
            .position(|&f| f == fragment)
            .map(|i| self.segments[i])
    }

    /// Number of distinct segments.
    pub fn segment_count(&self) -> usize {
        let mut segments = self.segments.clone();
        segments.sort_unstable();
        segments.dedup();
        segments.len()
    }
}

/// One end of an exclusive two-party message channel.
///
/// Messages are delivered in the order sent; `recv` blocks until a message
/// arrives or the peer goes away.
pub trait Channel: Send {
    fn send(&mut self, envelope: &Envelope) -> Result<()>;

    /// Fails with [`ProofreadError::ChannelClosed`] once the peer is gone.
    fn recv(&mut self) -> Result<Envelope>;
}
