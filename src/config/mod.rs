//! Configuration module for the Edge TTS client
//!
//! Settings come from three sources. Priority: YAML > ENV vars > .env values > defaults.
//! The `.env` file is loaded by the binary at startup, so by the time this module
//! runs its values are ordinary environment variables.
//!
//! # Environment variables
//! - `EDGE_TTS_VOICE`, `EDGE_TTS_RATE`, `EDGE_TTS_VOLUME`, `EDGE_TTS_PITCH`
//! - `EDGE_TTS_BOUNDARY` (`WordBoundary`/`word` or `SentenceBoundary`/`sentence`)
//! - `EDGE_TTS_PROXY` (`http://` only)
//! - `EDGE_TTS_WSS_URL`, `EDGE_TTS_VOICE_LIST_URL`
//!
//! # Example
//! ```rust,no_run
//! use waav_edge_tts::config::ClientConfig;
//! use std::path::PathBuf;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ClientConfig::from_file(&PathBuf::from("edge-tts.yaml"))?;
//! let client = config.build_client()?;
//! let synthesis = config.synthesis_config()?;
//! # Ok(())
//! # }
//! ```

use std::env;
use std::path::PathBuf;

use url::Url;

use crate::core::tts::base::{BoundaryMode, TTSResult};
use crate::core::tts::edge::{
    DEFAULT_PITCH, DEFAULT_RATE, DEFAULT_VOICE, DEFAULT_VOLUME, EdgeTtsClient, SynthesisConfig,
    VOICE_LIST_URL, WSS_URL,
};

mod yaml;

pub use yaml::{NetworkYaml, SynthesisYaml, YamlConfig};

/// Resolved client configuration
///
/// Holds the raw synthesis values; [`ClientConfig::synthesis_config`] turns
/// them into a validated [`SynthesisConfig`].
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    // Synthesis settings
    pub voice: String,
    pub rate: String,
    pub volume: String,
    pub pitch: String,
    pub boundary: BoundaryMode,

    // Network settings
    pub proxy: Option<String>,
    pub wss_url: String,
    pub voice_list_url: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            voice: DEFAULT_VOICE.to_string(),
            rate: DEFAULT_RATE.to_string(),
            volume: DEFAULT_VOLUME.to_string(),
            pitch: DEFAULT_PITCH.to_string(),
            boundary: BoundaryMode::default(),
            proxy: None,
            wss_url: WSS_URL.to_string(),
            voice_list_url: VOICE_LIST_URL.to_string(),
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables, falling back to defaults
    ///
    /// # Errors
    /// Returns an error if a variable has an invalid format or the resulting
    /// configuration fails validation.
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        let config = Self::env_base()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML file with environment variable base
    ///
    /// Priority order (highest to lowest):
    /// 1. YAML file values
    /// 2. Environment variables (actual ENV vars override .env values)
    /// 3. .env file values
    /// 4. Default values
    ///
    /// # Errors
    /// Returns an error if:
    /// - The YAML file cannot be read or is malformed
    /// - Environment variables have invalid formats
    /// - Configuration validation fails
    pub fn from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        let yaml_config = YamlConfig::from_file(path)?;

        let mut config = Self::env_base()?;
        config.apply_yaml(yaml_config)?;
        config.validate()?;

        Ok(config)
    }

    fn env_base() -> Result<Self, Box<dyn std::error::Error>> {
        let defaults = Self::default();

        let boundary = match env_var("EDGE_TTS_BOUNDARY") {
            Some(value) => value
                .parse::<BoundaryMode>()
                .map_err(|e| format!("Invalid EDGE_TTS_BOUNDARY: {e}"))?,
            None => defaults.boundary,
        };

        Ok(Self {
            voice: env_var("EDGE_TTS_VOICE").unwrap_or(defaults.voice),
            rate: env_var("EDGE_TTS_RATE").unwrap_or(defaults.rate),
            volume: env_var("EDGE_TTS_VOLUME").unwrap_or(defaults.volume),
            pitch: env_var("EDGE_TTS_PITCH").unwrap_or(defaults.pitch),
            boundary,
            proxy: env_var("EDGE_TTS_PROXY"),
            wss_url: env_var("EDGE_TTS_WSS_URL").unwrap_or(defaults.wss_url),
            voice_list_url: env_var("EDGE_TTS_VOICE_LIST_URL").unwrap_or(defaults.voice_list_url),
        })
    }

    fn apply_yaml(&mut self, yaml: YamlConfig) -> Result<(), Box<dyn std::error::Error>> {
        if let Some(synthesis) = yaml.synthesis {
            if let Some(voice) = synthesis.voice {
                self.voice = voice;
            }
            if let Some(rate) = synthesis.rate {
                self.rate = rate;
            }
            if let Some(volume) = synthesis.volume {
                self.volume = volume;
            }
            if let Some(pitch) = synthesis.pitch {
                self.pitch = pitch;
            }
            if let Some(boundary) = synthesis.boundary {
                self.boundary = boundary
                    .parse()
                    .map_err(|e| format!("Invalid synthesis.boundary: {e}"))?;
            }
        }

        if let Some(network) = yaml.network {
            if network.proxy.is_some() {
                self.proxy = network.proxy;
            }
            if let Some(wss_url) = network.wss_url {
                self.wss_url = wss_url;
            }
            if let Some(voice_list_url) = network.voice_list_url {
                self.voice_list_url = voice_list_url;
            }
        }

        Ok(())
    }

    /// Checks the synthesis values, the endpoints and the proxy.
    pub fn validate(&self) -> Result<(), Box<dyn std::error::Error>> {
        self.synthesis_config()?;

        let wss_url = Url::parse(&self.wss_url)
            .map_err(|e| format!("Invalid wss_url '{}': {e}", self.wss_url))?;
        if !matches!(wss_url.scheme(), "ws" | "wss") {
            return Err(format!("wss_url must use ws:// or wss://, got '{}'", self.wss_url).into());
        }

        let voice_list_url = Url::parse(&self.voice_list_url)
            .map_err(|e| format!("Invalid voice_list_url '{}': {e}", self.voice_list_url))?;
        if !matches!(voice_list_url.scheme(), "http" | "https") {
            return Err(format!(
                "voice_list_url must use http:// or https://, got '{}'",
                self.voice_list_url
            )
            .into());
        }

        if let Some(proxy) = &self.proxy {
            EdgeTtsClient::new().with_proxy(proxy)?;
        }

        Ok(())
    }

    pub fn synthesis_config(&self) -> TTSResult<SynthesisConfig> {
        SynthesisConfig::new(
            &self.voice,
            &self.rate,
            &self.volume,
            &self.pitch,
            self.boundary,
        )
    }

    /// Client pointed at the configured endpoints and proxy.
    pub fn build_client(&self) -> TTSResult<EdgeTtsClient> {
        let client =
            EdgeTtsClient::new().with_endpoints(self.wss_url.clone(), self.voice_list_url.clone());
        match &self.proxy {
            Some(proxy) => client.with_proxy(proxy),
            None => Ok(client),
        }
    }
}

/// Non-empty environment variable
fn env_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.trim().is_empty())
}
