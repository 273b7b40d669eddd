//! Client handle shared by synthesis streams and voice listing.

use std::sync::Arc;

use tracing::info;
use url::Url;

use super::communicate::Communicate;
use super::config::SynthesisConfig;
use super::drm::Drm;
use super::voices::{Voice, VoicesManager, list_voices};
use super::{VOICE_LIST_URL, WSS_URL};
use crate::core::tts::base::{TTSError, TTSResult};

/// Endpoints, proxy and request signer of one client.
///
/// Clones share the same [`Drm`], so a clock skew learned by one stream
/// applies to every stream and voice request made through the client.
#[derive(Debug, Clone)]
pub struct EdgeTtsClient {
    drm: Arc<Drm>,
    wss_url: String,
    voice_list_url: String,
    proxy: Option<Url>,
}

impl Default for EdgeTtsClient {
    fn default() -> Self {
        Self::new()
    }
}

impl EdgeTtsClient {
    pub fn new() -> Self {
        Self {
            drm: Arc::new(Drm::new()),
            wss_url: WSS_URL.to_string(),
            voice_list_url: VOICE_LIST_URL.to_string(),
            proxy: None,
        }
    }

    /// Uses `drm` for signing instead of a private instance.
    pub fn with_drm(mut self, drm: Arc<Drm>) -> Self {
        self.drm = drm;
        self
    }

    /// Routes every request through an `http://` proxy.
    pub fn with_proxy(mut self, proxy: &str) -> TTSResult<Self> {
        let url = Url::parse(proxy)
            .map_err(|e| TTSError::InvalidConfiguration(format!("Invalid proxy URL: {e}")))?;
        if url.scheme() != "http" {
            return Err(TTSError::InvalidConfiguration(format!(
                "Unsupported proxy scheme '{}'. Only http:// proxies are supported",
                url.scheme()
            )));
        }
        if url.host_str().is_none() {
            return Err(TTSError::InvalidConfiguration(
                "Proxy URL has no host".to_string(),
            ));
        }
        info!("Using proxy {}", url.host_str().unwrap_or_default());
        self.proxy = Some(url);
        Ok(self)
    }

    /// Overrides the synthesis and voice list endpoints.
    ///
    /// `wss_url` must already carry a query string; connection parameters
    /// are appended with `&`.
    pub fn with_endpoints(
        mut self,
        wss_url: impl Into<String>,
        voice_list_url: impl Into<String>,
    ) -> Self {
        self.wss_url = wss_url.into();
        self.voice_list_url = voice_list_url.into();
        self
    }

    pub fn drm(&self) -> &Arc<Drm> {
        &self.drm
    }

    pub fn wss_url(&self) -> &str {
        &self.wss_url
    }

    pub fn voice_list_url(&self) -> &str {
        &self.voice_list_url
    }

    pub fn proxy(&self) -> Option<&Url> {
        self.proxy.as_ref()
    }

    /// Prepares a synthesis stream for `text`.
    pub fn communicate(&self, text: &str, config: SynthesisConfig) -> TTSResult<Communicate> {
        Communicate::with_client(self.clone(), text, config)
    }

    /// Fetches the voice catalog.
    pub async fn list_voices(&self) -> TTSResult<Vec<Voice>> {
        list_voices(self).await
    }

    /// Fetches the voice catalog into a [`VoicesManager`].
    pub async fn voices_manager(&self) -> TTSResult<VoicesManager> {
        VoicesManager::create(self, None).await
    }
}
