//! Synthesis configuration for the Edge read-aloud service.
//!
//! All values are validated when the configuration is built; a short voice
//! name such as `en-US-AriaNeural` is expanded to the long service name.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use super::{DEFAULT_PITCH, DEFAULT_RATE, DEFAULT_VOICE, DEFAULT_VOLUME};
use crate::core::tts::base::{BoundaryMode, TTSError, TTSResult};

static SHORT_VOICE_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([a-z]{2,})-([A-Z]{2,})-(.+Neural)$").expect("valid short voice regex")
});

static LONG_VOICE_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^Microsoft Server Speech Text to Speech Voice \(.+,.+\)$")
        .expect("valid long voice regex")
});

static PERCENT_VALUE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[+-]\d+%$").expect("valid percent regex"));

static HERTZ_VALUE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[+-]\d+Hz$").expect("valid hertz regex"));

/// Validated voice and prosody settings for one synthesis stream.
///
/// Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SynthesisConfig {
    voice: String,
    rate: String,
    volume: String,
    pitch: String,
    boundary: BoundaryMode,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            voice: canonical_voice_name(DEFAULT_VOICE),
            rate: DEFAULT_RATE.to_string(),
            volume: DEFAULT_VOLUME.to_string(),
            pitch: DEFAULT_PITCH.to_string(),
            boundary: BoundaryMode::default(),
        }
    }
}

impl SynthesisConfig {
    /// Builds and validates a configuration.
    ///
    /// # Errors
    ///
    /// Returns [`TTSError::InvalidConfiguration`] when the voice does not
    /// resolve to a service voice name, or when rate/volume are not of the
    /// form `+N%`/`-N%`, or pitch is not `+NHz`/`-NHz`.
    pub fn new(
        voice: &str,
        rate: &str,
        volume: &str,
        pitch: &str,
        boundary: BoundaryMode,
    ) -> TTSResult<Self> {
        let config = Self {
            voice: canonical_voice_name(voice),
            rate: rate.to_string(),
            volume: volume.to_string(),
            pitch: pitch.to_string(),
            boundary,
        };
        config.validate()?;
        Ok(config)
    }

    /// Default prosody with the given voice.
    pub fn for_voice(voice: &str) -> TTSResult<Self> {
        Self::new(
            voice,
            DEFAULT_RATE,
            DEFAULT_VOLUME,
            DEFAULT_PITCH,
            BoundaryMode::default(),
        )
    }

    fn validate(&self) -> TTSResult<()> {
        if !LONG_VOICE_NAME.is_match(&self.voice) {
            return Err(TTSError::InvalidConfiguration(format!(
                "Invalid voice '{}'",
                self.voice
            )));
        }
        if !PERCENT_VALUE.is_match(&self.rate) {
            return Err(TTSError::InvalidConfiguration(format!(
                "Invalid rate '{}'. Expected a signed percentage such as '+10%'",
                self.rate
            )));
        }
        if !PERCENT_VALUE.is_match(&self.volume) {
            return Err(TTSError::InvalidConfiguration(format!(
                "Invalid volume '{}'. Expected a signed percentage such as '-20%'",
                self.volume
            )));
        }
        if !HERTZ_VALUE.is_match(&self.pitch) {
            return Err(TTSError::InvalidConfiguration(format!(
                "Invalid pitch '{}'. Expected a signed frequency such as '+5Hz'",
                self.pitch
            )));
        }
        Ok(())
    }

    /// Long service voice name.
    pub fn voice(&self) -> &str {
        &self.voice
    }

    pub fn rate(&self) -> &str {
        &self.rate
    }

    pub fn volume(&self) -> &str {
        &self.volume
    }

    pub fn pitch(&self) -> &str {
        &self.pitch
    }

    pub fn boundary(&self) -> BoundaryMode {
        self.boundary
    }
}

/// Expands `lang-REGION-NameNeural` to the long service voice name.
///
/// A dash inside the name part moves its prefix into the region, so
/// `zh-CN-liaoning-XiaobeiNeural` becomes `(zh-CN-liaoning, XiaobeiNeural)`.
/// Names that are not in short form are returned unchanged.
fn canonical_voice_name(voice: &str) -> String {
    let Some(captures) = SHORT_VOICE_NAME.captures(voice) else {
        return voice.to_string();
    };

    let lang = &captures[1];
    let mut region = captures[2].to_string();
    let mut name = &captures[3];
    if let Some((prefix, rest)) = name.split_once('-') {
        region = format!("{region}-{prefix}");
        name = rest;
    }

    format!("Microsoft Server Speech Text to Speech Voice ({lang}-{region}, {name})")
}
