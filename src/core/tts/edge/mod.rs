//! Edge read-aloud TTS provider implementation.
//!
//! This module talks to the speech service used by the Edge browser's
//! "Read aloud" feature. The service is reached over a WebSocket and accepts
//! SSML requests from clients that present a browser-like fingerprint and a
//! time-windowed `Sec-MS-GEC` signature.
//!
//! # Features
//!
//! - **Streaming**: MP3 audio chunks and word/sentence boundary events as a lazy stream
//! - **Long text**: input is split into request-sized chunks, timestamps stay continuous
//! - **Clock skew recovery**: a rejected handshake corrects the signature clock and retries
//! - **Voice catalog**: voice listing and attribute lookup
//!
//! # Example
//!
//! ```rust,ignore
//! use futures::StreamExt;
//! use waav_edge_tts::core::tts::edge::{EdgeTtsClient, SynthesisConfig};
//!
//! let client = EdgeTtsClient::new();
//! let config = SynthesisConfig::for_voice("en-US-AriaNeural")?;
//! let mut communicate = client.communicate("Hello, world!", config)?;
//! let stream = communicate.stream()?;
//! futures::pin_mut!(stream);
//! while let Some(event) = stream.next().await {
//!     println!("{:?}", event?);
//! }
//! ```
//!
//! # API Reference
//!
//! - Synthesis: `wss://speech.platform.bing.com/consumer/speech/synthesize/readaloud/edge/v1`
//! - Voice List: `GET https://speech.platform.bing.com/consumer/speech/synthesize/readaloud/voices/list`

pub mod client;
pub mod communicate;
pub mod config;
pub mod drm;
pub mod messages;
pub mod session;
pub mod ssml;
pub mod text;
pub mod transport;
pub mod voices;


pub use client::EdgeTtsClient;
pub use communicate::Communicate;
pub use config::SynthesisConfig;
pub use drm::{Clock, Drm, SystemClock};
pub use messages::{MetadataEntry, ServerMessage};
pub use session::{ConnectOutcome, SessionPhase, SessionState, SynthesisSession};
pub use voices::{Voice, VoiceFilter, VoiceTag, VoicesManager, list_voices};

use http::{HeaderMap, HeaderName, HeaderValue};

// =============================================================================
// API Constants
// =============================================================================

/// Host and path shared by the synthesis and voice list endpoints.
pub const BASE_URL: &str = "speech.platform.bing.com/consumer/speech/synthesize/readaloud";

/// Client token embedded in the Edge browser.
pub const TRUSTED_CLIENT_TOKEN: &str = "6A5AA1D4EAFF4E9FB37E23D68491D6F4";

/// WebSocket synthesis endpoint, without per-connection parameters.
pub const WSS_URL: &str = "wss://speech.platform.bing.com/consumer/speech/synthesize/readaloud/edge/v1?TrustedClientToken=6A5AA1D4EAFF4E9FB37E23D68491D6F4";

/// Voice catalog endpoint, without signature parameters.
pub const VOICE_LIST_URL: &str = "https://speech.platform.bing.com/consumer/speech/synthesize/readaloud/voices/list?trustedclienttoken=6A5AA1D4EAFF4E9FB37E23D68491D6F4";

/// Browser build the fingerprint imitates.
pub const CHROMIUM_FULL_VERSION: &str = "130.0.2849.68";

/// Major version of [`CHROMIUM_FULL_VERSION`].
pub const CHROMIUM_MAJOR_VERSION: &str = "130";

/// Value of the `Sec-MS-GEC-Version` query parameter.
pub const SEC_MS_GEC_VERSION: &str = "1-130.0.2849.68";

// =============================================================================
// Limits and Defaults
// =============================================================================

/// Voice used when none is configured.
pub const DEFAULT_VOICE: &str = "en-US-EmmaMultilingualNeural";

pub const DEFAULT_RATE: &str = "+0%";
pub const DEFAULT_VOLUME: &str = "+0%";
pub const DEFAULT_PITCH: &str = "+0Hz";

/// Maximum number of bytes of escaped text sent in one SSML request.
pub const MAX_MESSAGE_SIZE: usize = 4096;

/// Audio format requested from the service.
pub const OUTPUT_FORMAT: &str = "audio-24khz-48kbitrate-mono-mp3";

/// Tick gap the service leaves between consecutive requests.
///
/// Added on top of the end of the last boundary event when a turn ends so
/// the next chunk's offsets continue the timeline.
pub const TURN_GAP_TICKS: u64 = 8_750_000;

// =============================================================================
// Browser Fingerprint Headers
// =============================================================================

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/130.0.0.0 Safari/537.36 Edg/130.0.0.0";

const EXTENSION_ORIGIN: &str = "chrome-extension://jdiccldimpdaibmpdkjnbmckianbfold";

const SEC_CH_UA: &str = "\" Not;A Brand\";v=\"99\", \"Microsoft Edge\";v=\"130\", \"Chromium\";v=\"130\"";

fn base_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(http::header::USER_AGENT, HeaderValue::from_static(USER_AGENT));
    headers.insert(
        http::header::ACCEPT_LANGUAGE,
        HeaderValue::from_static("en-US,en;q=0.9"),
    );
    headers.insert(http::header::PRAGMA, HeaderValue::from_static("no-cache"));
    headers.insert(
        http::header::CACHE_CONTROL,
        HeaderValue::from_static("no-cache"),
    );
    headers.insert(http::header::ORIGIN, HeaderValue::from_static(EXTENSION_ORIGIN));
    headers
}

/// Headers sent with the WebSocket handshake.
pub fn wss_headers() -> HeaderMap {
    let mut headers = base_headers();
    headers.insert(
        http::header::ACCEPT_ENCODING,
        HeaderValue::from_static("gzip, deflate, br"),
    );
    headers
}

/// Headers sent with the voice list request.
pub fn voice_headers() -> HeaderMap {
    let mut headers = base_headers();
    headers.insert(
        HeaderName::from_static("authority"),
        HeaderValue::from_static("speech.platform.bing.com"),
    );
    headers.insert(
        HeaderName::from_static("sec-ch-ua"),
        HeaderValue::from_static(SEC_CH_UA),
    );
    headers.insert(
        HeaderName::from_static("sec-ch-ua-mobile"),
        HeaderValue::from_static("?0"),
    );
    headers.insert(http::header::ACCEPT, HeaderValue::from_static("*/*"));
    headers.insert(
        HeaderName::from_static("sec-fetch-site"),
        HeaderValue::from_static("none"),
    );
    headers.insert(
        HeaderName::from_static("sec-fetch-mode"),
        HeaderValue::from_static("cors"),
    );
    headers.insert(
        HeaderName::from_static("sec-fetch-dest"),
        HeaderValue::from_static("empty"),
    );
    headers
}
