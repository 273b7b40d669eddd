//! SSML document and outbound control frames.

use serde::Serialize;
use time::OffsetDateTime;
use time::macros::format_description;
use uuid::Uuid;

use super::OUTPUT_FORMAT;
use super::config::SynthesisConfig;
use super::messages::encode_text_frame;
use crate::core::tts::base::BoundaryMode;

/// Renders the SSML document for one chunk of already escaped text.
pub fn mkssml(config: &SynthesisConfig, escaped_text: &str) -> String {
    format!(
        "<speak version='1.0' xmlns='http://www.w3.org/2001/10/synthesis' xml:lang='en-US'>\
         <voice name='{}'><prosody pitch='{}' rate='{}' volume='{}'>{}</prosody></voice></speak>",
        config.voice(),
        config.pitch(),
        config.rate(),
        config.volume(),
        escaped_text
    )
}

/// JavaScript-style UTC date string used in `X-Timestamp` headers.
pub fn date_to_string() -> String {
    format_timestamp(OffsetDateTime::now_utc())
}

fn format_timestamp(now: OffsetDateTime) -> String {
    let format = format_description!(
        "[weekday repr:short] [month repr:short] [day] [year] [hour]:[minute]:[second]"
    );
    let formatted = now.format(format).unwrap_or_default();
    format!("{formatted} GMT+0000 (Coordinated Universal Time)")
}

/// Random identifier without dashes, used for connections and requests.
pub fn connect_id() -> String {
    Uuid::new_v4().simple().to_string()
}

// =============================================================================
// speech.config
// =============================================================================

#[derive(Serialize)]
struct SpeechConfig {
    context: SpeechContext,
}

#[derive(Serialize)]
struct SpeechContext {
    synthesis: SynthesisSection,
}

#[derive(Serialize)]
struct SynthesisSection {
    audio: AudioSection,
}

#[derive(Serialize)]
struct AudioSection {
    metadataoptions: MetadataOptions,
    #[serde(rename = "outputFormat")]
    output_format: &'static str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MetadataOptions {
    sentence_boundary_enabled: &'static str,
    word_boundary_enabled: &'static str,
}

fn speech_config_body(boundary: BoundaryMode) -> String {
    let (sentence, word) = match boundary {
        BoundaryMode::WordBoundary => ("false", "true"),
        BoundaryMode::SentenceBoundary => ("true", "false"),
    };
    let body = SpeechConfig {
        context: SpeechContext {
            synthesis: SynthesisSection {
                audio: AudioSection {
                    metadataoptions: MetadataOptions {
                        sentence_boundary_enabled: sentence,
                        word_boundary_enabled: word,
                    },
                    output_format: OUTPUT_FORMAT,
                },
            },
        },
    };
    // Plain structs of string fields always serialize.
    serde_json::to_string(&body).unwrap_or_default()
}

/// The `speech.config` frame sent first on every connection.
pub fn speech_config_frame(boundary: BoundaryMode, timestamp: &str) -> String {
    let body = format!("{}\r\n", speech_config_body(boundary));
    encode_text_frame(
        &[
            ("X-Timestamp", timestamp),
            ("Content-Type", "application/json; charset=utf-8"),
            ("Path", "speech.config"),
        ],
        &body,
    )
}

/// The `ssml` request frame carrying the SSML document.
pub fn ssml_request_frame(request_id: &str, timestamp: &str, ssml: &str) -> String {
    let timestamp = format!("{timestamp}Z");
    encode_text_frame(
        &[
            ("X-RequestId", request_id),
            ("Content-Type", "application/ssml+xml"),
            ("X-Timestamp", &timestamp),
            ("Path", "ssml"),
        ],
        ssml,
    )
}
