//! Public entry point: one synthesis stream over any amount of text.
//!
//! The text is cleaned, escaped and split into request-sized chunks up
//! front. [`Communicate::stream`] then runs one [`SynthesisSession`] per
//! chunk, strictly one after another, and yields their events as a single
//! stream whose boundary offsets continue across chunks.

use std::path::Path;

use async_stream::try_stream;
use futures::{Stream, StreamExt};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use super::MAX_MESSAGE_SIZE;
use super::client::EdgeTtsClient;
use super::config::SynthesisConfig;
use super::session::{ConnectOutcome, SessionState, SynthesisSession};
use super::text::{escape, remove_incompatible_characters, split_text_by_byte_length};
use crate::core::subtitles::SubMaker;
use crate::core::tts::base::{TTSError, TTSResult, TtsEvent};

#[derive(Debug)]
pub struct Communicate {
    client: EdgeTtsClient,
    config: SynthesisConfig,
    texts: Vec<String>,
    state: SessionState,
}

impl Communicate {
    /// Prepares a stream using a private [`EdgeTtsClient`].
    ///
    /// # Errors
    ///
    /// Returns [`TTSError::InvalidConfiguration`] if the text cannot be split
    /// into chunks that fit a request.
    pub fn new(text: &str, config: SynthesisConfig) -> TTSResult<Self> {
        Self::with_client(EdgeTtsClient::new(), text, config)
    }

    pub(crate) fn with_client(
        client: EdgeTtsClient,
        text: &str,
        config: SynthesisConfig,
    ) -> TTSResult<Self> {
        let escaped = escape(&remove_incompatible_characters(text));
        let texts = split_text_by_byte_length(&escaped, MAX_MESSAGE_SIZE)
            .map(|chunk| chunk.map(str::to_owned))
            .collect::<TTSResult<Vec<_>>>()?;

        debug!(
            chunks = texts.len(),
            voice = config.voice(),
            "Prepared Edge TTS request"
        );

        Ok(Self {
            client,
            config,
            texts,
            state: SessionState::default(),
        })
    }

    /// Escaped text of each request, in order.
    pub fn chunks(&self) -> &[String] {
        &self.texts
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Streams audio and boundary events for the whole text.
    ///
    /// A handshake rejected because of clock skew is retried until it
    /// succeeds; any other error ends the stream. Dropping the stream closes
    /// the active connection and skips the remaining chunks.
    ///
    /// # Errors
    ///
    /// Returns [`TTSError::StreamAlreadyConsumed`] when called more than once.
    pub fn stream(&mut self) -> TTSResult<impl Stream<Item = TTSResult<TtsEvent>> + '_> {
        if self.state.stream_was_called {
            return Err(TTSError::StreamAlreadyConsumed);
        }
        self.state.stream_was_called = true;

        let Self {
            client,
            config,
            texts,
            state,
        } = self;

        Ok(try_stream! {
            for (index, chunk) in texts.iter().enumerate() {
                let mut session = loop {
                    match SynthesisSession::connect(client, config, chunk).await? {
                        ConnectOutcome::Connected(session) => break session,
                        ConnectOutcome::Rejected => {
                            warn!(chunk = index, "Retrying Edge TTS connection with corrected clock");
                        }
                    }
                };

                while let Some(event) = session.next_event(state).await? {
                    yield event;
                }
                session.close().await;

                info!(
                    chunk = index + 1,
                    total = texts.len(),
                    offset_compensation = state.offset_compensation,
                    "Edge TTS chunk complete"
                );
            }
        })
    }

    /// Writes the audio to `media_path` and, if given, SRT subtitles built
    /// from the boundary events to `subtitles_path`.
    pub async fn save(
        &mut self,
        media_path: impl AsRef<Path>,
        subtitles_path: Option<&Path>,
    ) -> TTSResult<()> {
        let mut media = tokio::fs::File::create(media_path.as_ref()).await?;
        let mut submaker = SubMaker::new();

        let stream = self.stream()?;
        futures::pin_mut!(stream);
        while let Some(event) = stream.next().await {
            match event? {
                TtsEvent::Audio(data) => media.write_all(&data).await?,
                boundary => {
                    if subtitles_path.is_some() {
                        submaker.feed(&boundary)?;
                    }
                }
            }
        }
        media.flush().await?;

        if let Some(path) = subtitles_path {
            tokio::fs::write(path, submaker.get_srt()).await?;
        }
        Ok(())
    }
}
