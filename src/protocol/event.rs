//! Stream record types.
//!
//! Each line of the response body is one JSON record with a `"type"`
//! discriminator:
//!
//! ```text
//! {"type": "text",  "content": "<token-or-fragment>"}
//! {"type": "audio", "content": "<base64-encoded-audio-bytes>"}
//! {"type": "error", "content": "<human-readable message>"}
//! {"type": "done"}
//! ```
//!
//! Records are parsed into [`StreamEvent`] immediately at the decoder
//! boundary; the discriminator string is matched exactly once, here, and
//! audio payloads are base64-decoded here as well.

use crate::error::{AssistError, Result};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::Deserialize;

/// One decoded record from the answer stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// Incremental text fragment of the answer.
    Text {
        /// The fragment, in stream order.
        content: String,
    },
    /// One audio segment, already base64-decoded.
    Audio {
        /// Encoded audio bytes (container/codec opaque to the protocol).
        payload: Vec<u8>,
    },
    /// Backend-reported failure for this exchange.
    ErrorReport {
        /// Human-readable message from the backend.
        message: String,
    },
    /// Terminal marker: the answer is complete.
    Done,
}

/// Raw wire shape, before payload decoding.
#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum WireRecord {
    Text { content: String },
    Audio { content: String },
    Error { content: String },
    Done,
}

impl StreamEvent {
    /// Parse a single newline-delimited JSON record.
    ///
    /// # Errors
    ///
    /// Returns [`AssistError::Protocol`] for records that are not valid JSON,
    /// carry an unknown `"type"`, or carry an undecodable audio payload.
    pub fn parse(line: &str) -> Result<Self> {
        let record: WireRecord = serde_json::from_str(line)
            .map_err(|e| AssistError::Protocol(format!("undecodable record: {e}")))?;

        Ok(match record {
            WireRecord::Text { content } => Self::Text { content },
            WireRecord::Audio { content } => {
                let payload = BASE64
                    .decode(content.as_bytes())
                    .map_err(|e| AssistError::Protocol(format!("invalid audio payload: {e}")))?;
                Self::Audio { payload }
            }
            WireRecord::Error { content } => Self::ErrorReport { message: content },
            WireRecord::Done => Self::Done,
        })
    }

    /// Whether this record ends the exchange.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::ErrorReport { .. } | Self::Done)
    }
}
