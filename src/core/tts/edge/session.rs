//! One WebSocket synthesis session per text chunk.
//!
//! A session connects with a freshly signed URL, sends `speech.config`
//! followed by the SSML request, then turns the incoming frames into
//! [`TtsEvent`]s. Frames are forwarded by a reader task through a bounded
//! channel and drained in arrival order.

use std::collections::VecDeque;
use std::time::Duration;

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use http::StatusCode;
use http::header::DATE;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Error as WsError;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::protocol::Message;
use tracing::{debug, error, warn};

use super::client::EdgeTtsClient;
use super::config::SynthesisConfig;
use super::drm::Drm;
use super::messages::ServerMessage;
use super::ssml::{connect_id, date_to_string, mkssml, speech_config_frame, ssml_request_frame};
use super::transport::{WsStream, connect_websocket};
use super::{SEC_MS_GEC_VERSION, TURN_GAP_TICKS, wss_headers};
use crate::core::tts::base::{TTSError, TTSResult, TtsEvent};

/// Frames buffered between the reader task and the consumer.
const FRAME_QUEUE_CAPACITY: usize = 64;

/// How long `close` waits for the reader task.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

// =============================================================================
// State
// =============================================================================

/// Lifecycle of a [`SynthesisSession`].
///
/// Connecting and sending the request happen inside
/// [`SynthesisSession::connect`], so a session value starts out awaiting
/// frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Request sent, frames still expected
    Awaiting,
    /// A frame violated the protocol; no further events
    Failed,
    /// turn.end seen, the connection dropped, or the session was closed
    Closed,
}

/// Timeline bookkeeping carried across the chunks of one stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    /// Ticks added to every raw offset of the current chunk
    pub offset_compensation: u64,
    /// End of the most recent boundary event, in stream ticks
    pub last_duration_offset: u64,
    pub stream_was_called: bool,
}

/// Result of a connection attempt that did not fail fatally.
#[derive(Debug)]
pub enum ConnectOutcome {
    /// The session is open and the request has been sent
    Connected(SynthesisSession),
    /// The handshake was rejected with 403; the clock skew has been
    /// corrected and the attempt can be repeated
    Rejected,
}

#[derive(Debug)]
enum InboundFrame {
    Text(String),
    Binary(Bytes),
}

// =============================================================================
// Session
// =============================================================================

#[derive(Debug)]
pub struct SynthesisSession {
    phase: SessionPhase,
    frame_rx: mpsc::Receiver<TTSResult<InboundFrame>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    reader_handle: Option<JoinHandle<()>>,
    pending: VecDeque<TtsEvent>,
    audio_received: bool,
}

impl SynthesisSession {
    /// Connects and sends the request for `chunk`.
    ///
    /// # Errors
    ///
    /// A handshake rejected with 403 is not an error: the skew is corrected
    /// and [`ConnectOutcome::Rejected`] is returned. A missing or invalid
    /// `Date` on that response is [`TTSError::SkewAdjustment`]; any other
    /// connection failure is [`TTSError::Transport`].
    pub async fn connect(
        client: &EdgeTtsClient,
        config: &SynthesisConfig,
        chunk: &str,
    ) -> TTSResult<ConnectOutcome> {
        let drm = client.drm();
        let url = format!(
            "{}&ConnectionId={}&Sec-MS-GEC={}&Sec-MS-GEC-Version={}",
            client.wss_url(),
            connect_id(),
            drm.generate_sec_ms_gec(),
            SEC_MS_GEC_VERSION
        );

        let mut request = url.as_str().into_client_request().map_err(|e| {
            TTSError::InvalidConfiguration(format!("Failed to create WebSocket request: {e}"))
        })?;
        request
            .headers_mut()
            .extend(Drm::headers_with_muid(wss_headers())?);

        debug!("Connecting to Edge TTS");
        let mut ws_stream = match connect_websocket(request, client.proxy()).await {
            Ok(ws_stream) => ws_stream,
            Err(WsError::Http(response)) if response.status() == StatusCode::FORBIDDEN => {
                let server_date = response
                    .headers()
                    .get(DATE)
                    .and_then(|value| value.to_str().ok());
                warn!("Edge TTS rejected the handshake (403), correcting clock skew");
                drm.correct_skew(server_date)?;
                return Ok(ConnectOutcome::Rejected);
            }
            Err(e) => {
                let tts_error = TTSError::Transport(format!("Failed to connect to Edge TTS: {e}"));
                error!("{}", tts_error);
                return Err(tts_error);
            }
        };

        debug!("Sending speech.config and SSML");
        let timestamp = date_to_string();
        let ssml = mkssml(config, chunk);
        let frames = [
            speech_config_frame(config.boundary(), &timestamp),
            ssml_request_frame(&connect_id(), &timestamp, &ssml),
        ];
        for frame in frames {
            if let Err(e) = ws_stream.send(Message::Text(frame.into())).await {
                let _ = ws_stream.close(None).await;
                return Err(TTSError::Transport(format!(
                    "Failed to send request to Edge TTS: {e}"
                )));
            }
        }

        let (frame_tx, frame_rx) = mpsc::channel(FRAME_QUEUE_CAPACITY);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let reader_handle = tokio::spawn(read_frames(ws_stream, frame_tx, shutdown_rx));

        let mut session = Self::from_channel(frame_rx);
        session.shutdown_tx = Some(shutdown_tx);
        session.reader_handle = Some(reader_handle);
        Ok(ConnectOutcome::Connected(session))
    }

    fn from_channel(frame_rx: mpsc::Receiver<TTSResult<InboundFrame>>) -> Self {
        Self {
            phase: SessionPhase::Awaiting,
            frame_rx,
            shutdown_tx: None,
            reader_handle: None,
            pending: VecDeque::new(),
            audio_received: false,
        }
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    /// Next event of this chunk, `None` once the turn has ended.
    ///
    /// Boundary offsets are shifted by `state.offset_compensation`, and
    /// `state` is updated as boundary events and the end of the turn arrive.
    pub async fn next_event(&mut self, state: &mut SessionState) -> TTSResult<Option<TtsEvent>> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Ok(Some(event));
            }

            match self.phase {
                SessionPhase::Awaiting => {}
                SessionPhase::Failed => return Ok(None),
                _ => return self.finish(),
            }

            let Some(frame) = self.frame_rx.recv().await else {
                debug!("Edge TTS connection closed before turn.end");
                self.shutdown(SessionPhase::Closed);
                return self.finish();
            };

            let message = match frame.and_then(|frame| match frame {
                InboundFrame::Text(text) => ServerMessage::parse_text(&text),
                InboundFrame::Binary(data) => ServerMessage::parse_binary(data),
            }) {
                Ok(message) => message,
                Err(e) => return Err(self.fail(e)),
            };

            match message {
                ServerMessage::Audio(data) => {
                    self.audio_received = true;
                    return Ok(Some(TtsEvent::Audio(data)));
                }
                ServerMessage::Metadata(entries) => {
                    for entry in entries {
                        let offset = entry.offset.checked_add(state.offset_compensation);
                        let end = offset.and_then(|offset| offset.checked_add(entry.duration));
                        let (Some(offset), Some(end)) = (offset, end) else {
                            return Err(self.fail(TTSError::UnexpectedResponse(format!(
                                "Boundary offset {} with duration {} overflows the timeline",
                                entry.offset, entry.duration
                            ))));
                        };
                        state.last_duration_offset = end;
                        self.pending.push_back(TtsEvent::boundary(
                            entry.kind,
                            offset,
                            entry.duration,
                            entry.text,
                        ));
                    }
                }
                ServerMessage::TurnEnd => {
                    let Some(compensation) =
                        state.last_duration_offset.checked_add(TURN_GAP_TICKS)
                    else {
                        return Err(self.fail(TTSError::UnexpectedResponse(
                            "Turn end overflows the timeline".to_string(),
                        )));
                    };
                    state.offset_compensation = compensation;
                    debug!(
                        offset_compensation = state.offset_compensation,
                        "turn.end received"
                    );
                    self.shutdown(SessionPhase::Closed);
                    return self.finish();
                }
                ServerMessage::Ignored(path) => {
                    debug!("Ignoring Edge TTS frame with path {:?}", path);
                }
            }
        }
    }

    /// Closes the connection and waits for the reader task to finish.
    pub async fn close(mut self) {
        if self.phase == SessionPhase::Awaiting {
            self.shutdown(SessionPhase::Closed);
        }
        if let Some(handle) = self.reader_handle.take()
            && timeout(CLOSE_TIMEOUT, handle).await.is_err()
        {
            warn!("Timed out waiting for the Edge TTS connection to close");
        }
    }

    fn fail(&mut self, e: TTSError) -> TTSError {
        error!("Edge TTS session failed: {}", e);
        self.shutdown(SessionPhase::Failed);
        e
    }

    fn finish(&self) -> TTSResult<Option<TtsEvent>> {
        if self.audio_received {
            Ok(None)
        } else {
            Err(TTSError::NoAudioReceived)
        }
    }

    /// Stops the reader task, which closes the WebSocket.
    fn shutdown(&mut self, phase: SessionPhase) {
        self.phase = phase;
        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            let _ = shutdown_tx.send(());
        }
        self.frame_rx.close();
    }
}

impl Drop for SynthesisSession {
    fn drop(&mut self) {
        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            let _ = shutdown_tx.send(());
        }
    }
}

/// Forwards frames from the socket until it closes, the consumer goes away,
/// or shutdown is requested.
async fn read_frames(
    ws_stream: WsStream,
    frame_tx: mpsc::Sender<TTSResult<InboundFrame>>,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    let (mut ws_sink, mut ws_stream) = ws_stream.split();

    loop {
        tokio::select! {
            _ = &mut shutdown_rx => {
                let _ = ws_sink.send(Message::Close(None)).await;
                break;
            }

            message = ws_stream.next() => {
                let frame = match message {
                    Some(Ok(Message::Text(text))) => Ok(InboundFrame::Text(text.as_str().to_owned())),
                    Some(Ok(Message::Binary(data))) => Ok(InboundFrame::Binary(data)),
                    Some(Ok(Message::Close(frame))) => {
                        debug!("Edge TTS closed the connection: {:?}", frame);
                        break;
                    }
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => Err(TTSError::Transport(format!("WebSocket error: {e}"))),
                    None => break,
                };

                let failed = frame.is_err();
                if frame_tx.send(frame).await.is_err() || failed {
                    break;
                }
            }
        }
    }

    debug!("Edge TTS reader task finished");
}
