//! Shared types for the speech synthesis client: the error enum, the event
//! union produced by a synthesis stream, and the boundary mode selector.

use std::fmt;
use std::str::FromStr;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::subtitles::SubtitleError;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur while configuring or running a synthesis stream.
#[derive(Debug, Error)]
pub enum TTSError {
    /// Malformed configuration value, or text that cannot be segmented
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Server date missing or unparseable while recovering from a rejection
    #[error("Clock skew adjustment failed: {0}")]
    SkewAdjustment(String),

    /// Connection failure unrelated to the signature rejection path
    #[error("Transport error: {0}")]
    Transport(String),

    /// Protocol or content violation in a frame received from the service
    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    /// Metadata entry with an unrecognized type
    #[error("Unknown response: {0}")]
    UnknownResponse(String),

    /// A chunk completed without a single audio frame
    #[error("No audio was received. Please verify that your parameters are correct.")]
    NoAudioReceived,

    /// `Communicate::stream` was invoked a second time
    #[error("stream can only be called once")]
    StreamAlreadyConsumed,

    /// Boundary events that cannot be turned into subtitles
    #[error("Subtitle error: {0}")]
    Subtitles(#[from] SubtitleError),

    /// Local file error from the save helpers
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type TTSResult<T> = Result<T, TTSError>;

// =============================================================================
// Boundary Mode
// =============================================================================

/// Which boundary metadata the service is asked to emit.
///
/// Exactly one kind is requested per synthesis configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum BoundaryMode {
    WordBoundary,
    #[default]
    SentenceBoundary,
}

impl BoundaryMode {
    /// Wire name, also used as the metadata `Type` value.
    #[inline]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::WordBoundary => "WordBoundary",
            Self::SentenceBoundary => "SentenceBoundary",
        }
    }
}

impl fmt::Display for BoundaryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BoundaryMode {
    type Err = TTSError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "wordboundary" | "word" => Ok(Self::WordBoundary),
            "sentenceboundary" | "sentence" => Ok(Self::SentenceBoundary),
            other => Err(TTSError::InvalidConfiguration(format!(
                "Unknown boundary mode '{other}'. Expected WordBoundary or SentenceBoundary"
            ))),
        }
    }
}

// =============================================================================
// Events
// =============================================================================

/// One item of a synthesis stream.
///
/// Offsets and durations are in ticks (100 ns units). Offsets are already
/// shifted onto the timeline of the whole stream when emitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TtsEvent {
    /// A chunk of MP3 audio
    Audio(Bytes),
    /// Start and length of a spoken word
    WordBoundary {
        offset: u64,
        duration: u64,
        text: String,
    },
    /// Start and length of a spoken sentence
    SentenceBoundary {
        offset: u64,
        duration: u64,
        text: String,
    },
}

impl TtsEvent {
    pub(crate) fn boundary(mode: BoundaryMode, offset: u64, duration: u64, text: String) -> Self {
        match mode {
            BoundaryMode::WordBoundary => Self::WordBoundary {
                offset,
                duration,
                text,
            },
            BoundaryMode::SentenceBoundary => Self::SentenceBoundary {
                offset,
                duration,
                text,
            },
        }
    }

    /// Boundary kind of this event, `None` for audio.
    pub fn boundary_mode(&self) -> Option<BoundaryMode> {
        match self {
            Self::Audio(_) => None,
            Self::WordBoundary { .. } => Some(BoundaryMode::WordBoundary),
            Self::SentenceBoundary { .. } => Some(BoundaryMode::SentenceBoundary),
        }
    }

    /// Offset in ticks, `None` for audio.
    pub fn offset(&self) -> Option<u64> {
        match self {
            Self::Audio(_) => None,
            Self::WordBoundary { offset, .. } | Self::SentenceBoundary { offset, .. } => {
                Some(*offset)
            }
        }
    }

    pub fn is_audio(&self) -> bool {
        matches!(self, Self::Audio(_))
    }
}
