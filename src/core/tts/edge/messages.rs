//! Wire framing for the Edge synthesis WebSocket.
//!
//! Text frames are a header block (`Key:Value` lines separated by CRLF)
//! followed by a blank line and a body. Binary frames start with a 2-byte
//! big-endian header block length, then the header block, then the payload.

use std::collections::HashMap;

use bytes::Bytes;
use serde::Deserialize;
use tracing::debug;

use super::text::unescape;
use crate::core::tts::base::{BoundaryMode, TTSError, TTSResult};

const HEADER_SEPARATOR: &str = "\r\n\r\n";

/// Serializes a header block followed by `body`.
pub fn encode_text_frame(headers: &[(&str, &str)], body: &str) -> String {
    let mut frame = String::with_capacity(body.len() + 128);
    for (key, value) in headers {
        frame.push_str(key);
        frame.push(':');
        frame.push_str(value);
        frame.push_str("\r\n");
    }
    frame.push_str("\r\n");
    frame.push_str(body);
    frame
}

/// Parses a header block. Lines without a colon are skipped.
pub fn parse_headers(block: &[u8]) -> HashMap<String, String> {
    String::from_utf8_lossy(block)
        .split("\r\n")
        .filter_map(|line| line.split_once(':'))
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect()
}

// =============================================================================
// Metadata payload
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct MetadataFrame {
    metadata: Vec<RawMetadata>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawMetadata {
    #[serde(rename = "Type")]
    kind: String,
    #[serde(default)]
    data: Option<RawMetadataData>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct RawMetadataData {
    offset: u64,
    duration: u64,
    // SessionEnd entries carry no text
    #[serde(rename = "text")]
    text: RawMetadataText,
}

#[derive(Debug, Default, Deserialize)]
struct RawMetadataText {
    #[serde(rename = "Text")]
    text: String,
}

/// A boundary entry from an `audio.metadata` frame, offset not yet
/// compensated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataEntry {
    pub kind: BoundaryMode,
    pub offset: u64,
    pub duration: u64,
    pub text: String,
}

fn parse_metadata(body: &str) -> TTSResult<Vec<MetadataEntry>> {
    let frame: MetadataFrame = serde_json::from_str(body)
        .map_err(|e| TTSError::UnexpectedResponse(format!("Invalid metadata payload: {e}")))?;

    let mut entries = Vec::with_capacity(frame.metadata.len());
    for raw in frame.metadata {
        let kind = match raw.kind.as_str() {
            "WordBoundary" => BoundaryMode::WordBoundary,
            "SentenceBoundary" => BoundaryMode::SentenceBoundary,
            "SessionEnd" => continue,
            other => {
                return Err(TTSError::UnknownResponse(format!(
                    "Unknown metadata type: {other}"
                )));
            }
        };
        let data = raw.data.ok_or_else(|| {
            TTSError::UnexpectedResponse(format!("{} metadata without Data", kind.as_str()))
        })?;
        entries.push(MetadataEntry {
            kind,
            offset: data.offset,
            duration: data.duration,
            text: unescape(&data.text.text),
        });
    }
    Ok(entries)
}

// =============================================================================
// Server messages
// =============================================================================

/// A decoded frame from the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerMessage {
    /// Boundary entries of an `audio.metadata` frame
    Metadata(Vec<MetadataEntry>),
    /// End of the current request
    TurnEnd,
    /// MP3 payload of an `audio` frame
    Audio(Bytes),
    /// Frames that carry nothing for the caller (`turn.start`, `response`,
    /// empty audio frames)
    Ignored(Option<String>),
}

impl ServerMessage {
    /// Decodes a text frame.
    pub fn parse_text(text: &str) -> TTSResult<Self> {
        let Some((header_block, body)) = text.split_once(HEADER_SEPARATOR) else {
            debug!("Text frame without header separator ignored");
            return Ok(Self::Ignored(None));
        };

        let mut headers = parse_headers(header_block.as_bytes());
        match headers.get("Path").map(String::as_str) {
            Some("audio.metadata") => Ok(Self::Metadata(parse_metadata(body)?)),
            Some("turn.end") => Ok(Self::TurnEnd),
            _ => Ok(Self::Ignored(headers.remove("Path"))),
        }
    }

    /// Decodes a binary frame.
    pub fn parse_binary(data: Bytes) -> TTSResult<Self> {
        if data.len() < 2 {
            return Err(TTSError::UnexpectedResponse(
                "Received binary message, but it is missing the header length.".to_string(),
            ));
        }

        let header_length = usize::from(u16::from_be_bytes([data[0], data[1]]));
        if header_length > data.len() - 2 {
            return Err(TTSError::UnexpectedResponse(
                "The header length is greater than the length of the data.".to_string(),
            ));
        }

        let headers = parse_headers(&data[2..2 + header_length]);
        let payload = data.slice(2 + header_length..);

        if headers.get("Path").map(String::as_str) != Some("audio") {
            return Err(TTSError::UnexpectedResponse(
                "Received binary message, but the path is not audio.".to_string(),
            ));
        }

        match headers.get("Content-Type").map(String::as_str) {
            None if payload.is_empty() => Ok(Self::Ignored(Some("audio".to_string()))),
            None => Err(TTSError::UnexpectedResponse(
                "Received binary message with no Content-Type, but with data.".to_string(),
            )),
            Some("audio/mpeg") if payload.is_empty() => Err(TTSError::UnexpectedResponse(
                "Received binary message, but it is missing the audio data.".to_string(),
            )),
            Some("audio/mpeg") => Ok(Self::Audio(payload)),
            Some(other) => Err(TTSError::UnexpectedResponse(format!(
                "Received binary message with unexpected Content-Type: {other}"
            ))),
        }
    }
}
