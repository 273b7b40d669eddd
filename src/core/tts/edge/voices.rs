//! Voice catalog of the Edge read-aloud service.
//!
//! The list is fetched with the same signature and cookie as a synthesis
//! connection, and a 403 is retried once after correcting the clock skew.

use serde::{Deserialize, Deserializer, Serialize};
use tracing::{debug, info, warn};

use super::client::EdgeTtsClient;
use super::drm::Drm;
use super::{SEC_MS_GEC_VERSION, voice_headers};
use crate::core::tts::base::{TTSError, TTSResult};

// =============================================================================
// Catalog records
// =============================================================================

/// Tags attached to a voice. Both lists are empty when the service omits
/// them or sends `null`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct VoiceTag {
    #[serde(deserialize_with = "null_as_default")]
    pub content_categories: Vec<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub voice_personalities: Vec<String>,
}

/// One entry of the voice list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Voice {
    /// Full voice name, e.g., "Microsoft Server Speech Text to Speech Voice (en-US, AriaNeural)"
    pub name: String,
    /// Short name, e.g., "en-US-AriaNeural"
    pub short_name: String,
    pub gender: String,
    pub locale: String,
    pub suggested_codec: String,
    pub friendly_name: String,
    pub status: String,
    #[serde(deserialize_with = "null_as_default")]
    pub voice_tag: VoiceTag,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

// =============================================================================
// Fetching
// =============================================================================

enum VoiceListResponse {
    Voices(Vec<Voice>),
    Rejected(Option<String>),
}

/// Fetches the voice catalog through `client`.
///
/// # Errors
///
/// - [`TTSError::SkewAdjustment`] if a 403 carries no usable `Date` header
/// - [`TTSError::Transport`] for connection failures and error statuses,
///   including a second 403
/// - [`TTSError::UnexpectedResponse`] if the body is not a voice list
pub async fn list_voices(client: &EdgeTtsClient) -> TTSResult<Vec<Voice>> {
    let mut builder = reqwest::Client::builder();
    if let Some(proxy) = client.proxy() {
        let proxy = reqwest::Proxy::all(proxy.as_str())
            .map_err(|e| TTSError::InvalidConfiguration(format!("Invalid proxy: {e}")))?;
        builder = builder.proxy(proxy);
    }
    let http = builder
        .build()
        .map_err(|e| TTSError::Transport(format!("Failed to create HTTP client: {e}")))?;

    let voices = match fetch_voices(&http, client).await? {
        VoiceListResponse::Voices(voices) => voices,
        VoiceListResponse::Rejected(server_date) => {
            warn!("Voice list request rejected (403), correcting clock skew");
            client.drm().correct_skew(server_date.as_deref())?;
            match fetch_voices(&http, client).await? {
                VoiceListResponse::Voices(voices) => voices,
                VoiceListResponse::Rejected(_) => {
                    return Err(TTSError::Transport(
                        "Voice list request rejected (403) after clock skew correction"
                            .to_string(),
                    ));
                }
            }
        }
    };

    info!("Fetched {} Edge TTS voices", voices.len());
    Ok(voices)
}

async fn fetch_voices(
    http: &reqwest::Client,
    client: &EdgeTtsClient,
) -> TTSResult<VoiceListResponse> {
    let url = format!(
        "{}&Sec-MS-GEC={}&Sec-MS-GEC-Version={}",
        client.voice_list_url(),
        client.drm().generate_sec_ms_gec(),
        SEC_MS_GEC_VERSION
    );
    let headers = Drm::headers_with_muid(voice_headers())?;

    debug!("Fetching voice list");
    let response = http
        .get(&url)
        .headers(headers)
        .send()
        .await
        .map_err(|e| TTSError::Transport(format!("Voice list request failed: {e}")))?;

    let status = response.status();
    if status == reqwest::StatusCode::FORBIDDEN {
        let server_date = response
            .headers()
            .get(reqwest::header::DATE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);
        return Ok(VoiceListResponse::Rejected(server_date));
    }
    if !status.is_success() {
        let error_body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        return Err(TTSError::Transport(format!(
            "Voice list API error ({status}): {error_body}"
        )));
    }

    let voices: Vec<Voice> = response
        .json()
        .await
        .map_err(|e| TTSError::UnexpectedResponse(format!("Invalid voice list: {e}")))?;
    Ok(VoiceListResponse::Voices(voices))
}

// =============================================================================
// VoicesManager
// =============================================================================

/// A voice together with its primary language subtag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManagedVoice {
    #[serde(flatten)]
    pub voice: Voice,
    /// Primary language subtag of the locale, e.g., "en" for "en-US"
    pub language: String,
}

/// Exact-match criteria for [`VoicesManager::find`]. Unset fields match
/// every voice.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VoiceFilter {
    pub gender: Option<String>,
    pub locale: Option<String>,
    pub language: Option<String>,
}

impl VoiceFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn gender(mut self, gender: impl Into<String>) -> Self {
        self.gender = Some(gender.into());
        self
    }

    pub fn locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = Some(locale.into());
        self
    }

    pub fn language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    fn matches(&self, voice: &ManagedVoice) -> bool {
        self.gender.as_deref().is_none_or(|g| g == voice.voice.gender)
            && self.locale.as_deref().is_none_or(|l| l == voice.voice.locale)
            && self.language.as_deref().is_none_or(|l| l == voice.language)
    }
}

/// In-memory voice catalog with attribute lookup.
#[derive(Debug, Clone, Default)]
pub struct VoicesManager {
    voices: Vec<ManagedVoice>,
}

impl VoicesManager {
    /// Loads the catalog once, from `custom_voices` if given, otherwise from
    /// the service.
    pub async fn create(
        client: &EdgeTtsClient,
        custom_voices: Option<Vec<Voice>>,
    ) -> TTSResult<Self> {
        let voices = match custom_voices {
            Some(voices) => voices,
            None => list_voices(client).await?,
        };
        Ok(Self::from_voices(voices))
    }

    pub fn from_voices(voices: Vec<Voice>) -> Self {
        let voices = voices
            .into_iter()
            .map(|voice| {
                let language = voice
                    .locale
                    .split('-')
                    .next()
                    .unwrap_or_default()
                    .to_string();
                ManagedVoice { voice, language }
            })
            .collect();
        Self { voices }
    }

    pub fn voices(&self) -> &[ManagedVoice] {
        &self.voices
    }

    /// Every voice matching all set fields of `filter`.
    pub fn find(&self, filter: &VoiceFilter) -> Vec<&ManagedVoice> {
        self.voices
            .iter()
            .filter(|voice| filter.matches(voice))
            .collect()
    }
}
