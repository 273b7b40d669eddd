//! WebSocket Mock Server for the Edge read-aloud service
//!
//! Accepts synthesis connections, records handshakes and client frames, and
//! answers each SSML request according to a [`EdgeMockBehavior`]. Handshakes
//! can be rejected with 403 to exercise clock skew recovery.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::json;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::{HeaderMap, StatusCode};

/// Tick offset of the first word of every request.
pub const FIRST_WORD_OFFSET: u64 = 1_000_000;
/// Tick distance between consecutive words.
pub const WORD_STRIDE: u64 = 5_000_000;
/// Tick duration of every word.
pub const WORD_DURATION: u64 = 3_000_000;

/// How the mock answers an SSML request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeMockBehavior {
    /// One audio frame and one WordBoundary per word, then turn.end
    Speak,
    /// turn.start and turn.end only
    NoAudio,
    /// An audio frame with an unsupported content type
    BadContentType,
    /// One audio frame, then the connection is closed without turn.end
    CloseBeforeTurnEnd,
}

/// Handshake as seen by the mock
#[derive(Debug, Clone)]
pub struct RecordedHandshake {
    pub uri: String,
    pub headers: HeaderMap,
}

impl RecordedHandshake {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }

    pub fn query_param(&self, name: &str) -> Option<String> {
        let query = self.uri.split_once('?')?.1;
        query
            .split('&')
            .filter_map(|pair| pair.split_once('='))
            .find(|(key, _)| *key == name)
            .map(|(_, value)| value.to_string())
    }
}

struct EdgeMockState {
    behavior: EdgeMockBehavior,
    rejections_left: AtomicUsize,
    rejection_date: Mutex<Option<String>>,
    handshakes: Mutex<Vec<RecordedHandshake>>,
    frames: Mutex<Vec<String>>,
}

/// Edge TTS mock bound to a random local port
pub struct EdgeMockServer {
    addr: SocketAddr,
    state: Arc<EdgeMockState>,
    handle: JoinHandle<()>,
}

impl EdgeMockServer {
    pub async fn start(behavior: EdgeMockBehavior) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let state = Arc::new(EdgeMockState {
            behavior,
            rejections_left: AtomicUsize::new(0),
            rejection_date: Mutex::new(None),
            handshakes: Mutex::new(Vec::new()),
            frames: Mutex::new(Vec::new()),
        });

        let accept_state = state.clone();
        let handle = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let state = accept_state.clone();
                tokio::spawn(async move {
                    let _ = handle_connection(stream, state).await;
                });
            }
        });

        Self {
            addr,
            state,
            handle,
        }
    }

    /// Endpoint to pass to `EdgeTtsClient::with_endpoints`.
    pub fn wss_url(&self) -> String {
        format!("ws://{}/edge/v1?TrustedClientToken=mock-token", self.addr)
    }

    /// Rejects the next `count` handshakes with 403 and the given `Date`.
    pub fn reject_next(&self, count: usize, date: Option<&str>) {
        *self.state.rejection_date.lock() = date.map(str::to_string);
        self.state.rejections_left.store(count, Ordering::SeqCst);
    }

    pub fn handshakes(&self) -> Vec<RecordedHandshake> {
        self.state.handshakes.lock().clone()
    }

    /// Text frames received from clients, in arrival order.
    pub fn frames(&self) -> Vec<String> {
        self.state.frames.lock().clone()
    }
}

impl Drop for EdgeMockServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn handle_connection(
    stream: TcpStream,
    state: Arc<EdgeMockState>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let callback_state = state.clone();
    let callback = move |request: &Request, response: Response| {
        callback_state.handshakes.lock().push(RecordedHandshake {
            uri: request.uri().to_string(),
            headers: request.headers().clone(),
        });

        let reject = callback_state
            .rejections_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if !reject {
            return Ok(response);
        }

        let mut rejection = ErrorResponse::new(Some("Forbidden".to_string()));
        *rejection.status_mut() = StatusCode::FORBIDDEN;
        if let Some(date) = callback_state.rejection_date.lock().as_deref() {
            rejection
                .headers_mut()
                .insert("Date", date.parse().unwrap());
        }
        Err(rejection)
    };

    let ws_stream = accept_hdr_async(stream, callback).await?;
    let (mut write, mut read) = ws_stream.split();

    while let Some(message) = read.next().await {
        let text = match message? {
            Message::Text(text) => text.as_str().to_owned(),
            Message::Close(_) => break,
            _ => continue,
        };
        state.frames.lock().push(text.clone());

        if !text.contains("Path:ssml") {
            continue;
        }
        let request_id = header_value(&text, "X-RequestId").unwrap_or_default();

        write
            .send(Message::Text(
                text_frame(&request_id, "turn.start", "{}").into(),
            ))
            .await?;

        match state.behavior {
            EdgeMockBehavior::Speak => {
                for (index, word) in spoken_words(&text).iter().enumerate() {
                    write
                        .send(Message::Binary(
                            audio_frame(&request_id, "audio/mpeg", word.as_bytes()).into(),
                        ))
                        .await?;
                    let offset = FIRST_WORD_OFFSET + index as u64 * WORD_STRIDE;
                    write
                        .send(Message::Text(
                            word_boundary_frame(&request_id, offset, word).into(),
                        ))
                        .await?;
                }
            }
            EdgeMockBehavior::NoAudio => {}
            EdgeMockBehavior::BadContentType => {
                write
                    .send(Message::Binary(
                        audio_frame(&request_id, "audio/ogg", b"OggS").into(),
                    ))
                    .await?;
            }
            EdgeMockBehavior::CloseBeforeTurnEnd => {
                write
                    .send(Message::Binary(
                        audio_frame(&request_id, "audio/mpeg", b"partial").into(),
                    ))
                    .await?;
                write.send(Message::Close(None)).await?;
                return Ok(());
            }
        }

        write
            .send(Message::Text(
                text_frame(&request_id, "turn.end", "{}").into(),
            ))
            .await?;
    }

    Ok(())
}

fn header_value(frame: &str, name: &str) -> Option<String> {
    let (headers, _) = frame.split_once("\r\n\r\n")?;
    headers
        .split("\r\n")
        .filter_map(|line| line.split_once(':'))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.to_string())
}

/// Words inside the `<prosody>` element of an SSML request frame.
fn spoken_words(frame: &str) -> Vec<String> {
    let Some(start) = frame.find("<prosody") else {
        return Vec::new();
    };
    let rest = &frame[start..];
    let (Some(open_end), Some(close)) = (rest.find('>'), rest.find("</prosody>")) else {
        return Vec::new();
    };
    rest[open_end + 1..close]
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

fn text_frame(request_id: &str, path: &str, body: &str) -> String {
    format!(
        "X-RequestId:{request_id}\r\nContent-Type:application/json; charset=utf-8\r\nPath:{path}\r\n\r\n{body}"
    )
}

fn word_boundary_frame(request_id: &str, offset: u64, word: &str) -> String {
    let body = json!({
        "Metadata": [{
            "Type": "WordBoundary",
            "Data": {
                "Offset": offset,
                "Duration": WORD_DURATION,
                "text": {
                    "Text": word,
                    "Length": word.len(),
                    "BoundaryType": "WordBoundary"
                }
            }
        }]
    });
    text_frame(request_id, "audio.metadata", &body.to_string())
}

fn audio_frame(request_id: &str, content_type: &str, payload: &[u8]) -> Vec<u8> {
    let header =
        format!("X-RequestId:{request_id}\r\nContent-Type:{content_type}\r\nPath:audio\r\n");
    let mut data = (header.len() as u16).to_be_bytes().to_vec();
    data.extend_from_slice(header.as_bytes());
    data.extend_from_slice(payload);
    data
}
