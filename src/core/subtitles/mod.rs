//! Subtitle generation from synthesis boundary events.
//!
//! [`SubMaker`] collects the word or sentence boundaries of a stream and
//! renders them as SRT.
//!
//! # Example
//!
//! ```rust,ignore
//! let mut submaker = SubMaker::new();
//! while let Some(event) = stream.next().await {
//!     let event = event?;
//!     if !event.is_audio() {
//!         submaker.feed(&event)?;
//!     }
//! }
//! std::fs::write("out.srt", submaker.get_srt())?;
//! ```

pub mod srt;

use std::time::Duration;

use thiserror::Error;

use crate::core::tts::base::{BoundaryMode, TtsEvent};
use srt::{Subtitle, compose};

/// Ticks (100 ns) per microsecond.
const TICKS_PER_MICROSECOND: u64 = 10;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SubtitleError {
    /// Audio events carry no timing
    #[error("Invalid event type, expected WordBoundary or SentenceBoundary")]
    UnsupportedEvent,

    #[error("Expected {expected} events, got {got}")]
    MixedBoundaryTypes {
        expected: BoundaryMode,
        got: BoundaryMode,
    },
}

pub type SubtitleResult<T> = Result<T, SubtitleError>;

/// Collects boundary events into subtitle cues.
#[derive(Debug, Clone, Default)]
pub struct SubMaker {
    cues: Vec<Subtitle>,
    kind: Option<BoundaryMode>,
}

impl SubMaker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one boundary event as a cue.
    ///
    /// All events fed to one instance must be of the same boundary type.
    pub fn feed(&mut self, event: &TtsEvent) -> SubtitleResult<()> {
        let (kind, offset, duration, text) = match event {
            TtsEvent::Audio(_) => return Err(SubtitleError::UnsupportedEvent),
            TtsEvent::WordBoundary {
                offset,
                duration,
                text,
            } => (BoundaryMode::WordBoundary, *offset, *duration, text),
            TtsEvent::SentenceBoundary {
                offset,
                duration,
                text,
            } => (BoundaryMode::SentenceBoundary, *offset, *duration, text),
        };

        match self.kind {
            Some(expected) if expected != kind => {
                return Err(SubtitleError::MixedBoundaryTypes {
                    expected,
                    got: kind,
                });
            }
            Some(_) => {}
            None => self.kind = Some(kind),
        }

        self.cues.push(Subtitle::new(
            self.cues.len() + 1,
            Duration::from_micros(offset / TICKS_PER_MICROSECOND),
            Duration::from_micros(offset.saturating_add(duration) / TICKS_PER_MICROSECOND),
            text.clone(),
        ));
        Ok(())
    }

    pub fn cues(&self) -> &[Subtitle] {
        &self.cues
    }

    /// SRT document of all cues fed so far.
    pub fn get_srt(&self) -> String {
        compose(&self.cues, true, 1, "\n")
    }
}
