//! WebSocket connection setup, optionally through an HTTP proxy.

use std::io;
use std::sync::Once;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Error as WsError;
use tokio_tungstenite::tungstenite::http::Request;
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, client_async_tls_with_config, connect_async,
};
use tracing::debug;
use url::Url;

pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Upper bound on the proxy's reply to `CONNECT`.
const MAX_PROXY_RESPONSE_BYTES: usize = 8192;

static CRYPTO_PROVIDER: Once = Once::new();

/// Installs the ring crypto provider unless the application already did.
pub(crate) fn ensure_crypto_provider() {
    CRYPTO_PROVIDER.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}

/// Opens the WebSocket described by `request`.
///
/// Handshake failures are returned untouched so callers can inspect the
/// HTTP response of a rejected upgrade.
pub async fn connect_websocket(
    request: Request<()>,
    proxy: Option<&Url>,
) -> Result<WsStream, WsError> {
    ensure_crypto_provider();

    let Some(proxy) = proxy else {
        let (ws_stream, _response) = connect_async(request).await?;
        return Ok(ws_stream);
    };

    let uri = request.uri();
    let host = uri
        .host()
        .ok_or_else(|| WsError::Url(tokio_tungstenite::tungstenite::error::UrlError::NoHostName))?
        .to_string();
    let port = uri
        .port_u16()
        .unwrap_or(if uri.scheme_str() == Some("wss") { 443 } else { 80 });

    let stream = tunnel_through_proxy(proxy, &host, port).await?;
    let (ws_stream, _response) = client_async_tls_with_config(request, stream, None, None).await?;
    Ok(ws_stream)
}

/// Establishes an HTTP `CONNECT` tunnel to `host:port`.
async fn tunnel_through_proxy(proxy: &Url, host: &str, port: u16) -> io::Result<TcpStream> {
    let proxy_host = proxy
        .host_str()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "proxy URL has no host"))?;
    let proxy_port = proxy.port_or_known_default().unwrap_or(80);

    debug!("Tunnelling to {host}:{port} through proxy {proxy_host}:{proxy_port}");
    let mut stream = TcpStream::connect((proxy_host, proxy_port)).await?;

    let mut connect = format!("CONNECT {host}:{port} HTTP/1.1\r\nHost: {host}:{port}\r\n");
    if !proxy.username().is_empty() {
        use base64::Engine;
        let credentials = format!(
            "{}:{}",
            proxy.username(),
            proxy.password().unwrap_or_default()
        );
        let encoded = base64::engine::general_purpose::STANDARD.encode(credentials);
        connect.push_str(&format!("Proxy-Authorization: Basic {encoded}\r\n"));
    }
    connect.push_str("\r\n");
    stream.write_all(connect.as_bytes()).await?;

    // Read byte by byte so nothing past the proxy's reply is consumed.
    let mut response = Vec::with_capacity(256);
    let mut byte = [0u8; 1];
    while !response.ends_with(b"\r\n\r\n") {
        if response.len() >= MAX_PROXY_RESPONSE_BYTES {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "proxy response headers too large",
            ));
        }
        if stream.read(&mut byte).await? == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "proxy closed the connection during CONNECT",
            ));
        }
        response.push(byte[0]);
    }

    let response = String::from_utf8_lossy(&response);
    let status_line = response.lines().next().unwrap_or_default();
    let accepted = status_line
        .split_whitespace()
        .nth(1)
        .is_some_and(|code| code == "200");
    if !accepted {
        return Err(io::Error::other(format!(
            "proxy refused CONNECT: {status_line}"
        )));
    }

    Ok(stream)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncBufReadExt;
    use tokio::net::TcpListener;

    async fn proxy_replying(reply: &'static str) -> (Url, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let mut reader = tokio::io::BufReader::new(socket);
            let mut request = String::new();
            loop {
                let mut line = String::new();
                reader.read_line(&mut line).await.unwrap();
                request.push_str(&line);
                if line == "\r\n" || line.is_empty() {
                    break;
                }
            }
            reader.get_mut().write_all(reply.as_bytes()).await.unwrap();
            request
        });
        let url = Url::parse(&format!("http://user:secret@{addr}")).unwrap();
        (url, handle)
    }

    #[tokio::test]
    async fn test_tunnel_sends_connect_with_credentials() {
        let (proxy, handle) = proxy_replying("HTTP/1.1 200 Connection established\r\n\r\n").await;

        tunnel_through_proxy(&proxy, "speech.example.com", 443)
            .await
            .unwrap();

        let request = handle.await.unwrap();
        assert!(request.starts_with("CONNECT speech.example.com:443 HTTP/1.1\r\n"));
        assert!(request.contains("Host: speech.example.com:443\r\n"));
        // base64("user:secret")
        assert!(request.contains("Proxy-Authorization: Basic dXNlcjpzZWNyZXQ=\r\n"));
    }

    #[tokio::test]
    async fn test_tunnel_rejected_by_proxy() {
        let (proxy, _handle) =
            proxy_replying("HTTP/1.1 407 Proxy Authentication Required\r\n\r\n").await;

        let err = tunnel_through_proxy(&proxy, "speech.example.com", 443)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("407"));
    }
}
