//! Integration tests for the voice catalog against a wiremock server.

use serde_json::{Value, json};
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use waav_edge_tts::core::tts::edge::SEC_MS_GEC_VERSION;
use waav_edge_tts::{EdgeTtsClient, TTSError, VoiceFilter};

const SERVER_DATE: &str = "Sat, 01 Jan 2022 00:00:00 GMT";

fn voices_json() -> Value {
    json!([
        {
            "Name": "Microsoft Server Speech Text to Speech Voice (en-US, AriaNeural)",
            "ShortName": "en-US-AriaNeural",
            "Gender": "Female",
            "Locale": "en-US",
            "SuggestedCodec": "audio-24khz-48kbitrate-mono-mp3",
            "FriendlyName": "Microsoft Aria Online (Natural) - English (United States)",
            "Status": "GA",
            "VoiceTag": {
                "ContentCategories": ["News", "Novel"],
                "VoicePersonalities": ["Positive", "Confident"]
            }
        },
        {
            "Name": "Microsoft Server Speech Text to Speech Voice (en-GB, RyanNeural)",
            "ShortName": "en-GB-RyanNeural",
            "Gender": "Male",
            "Locale": "en-GB",
            "SuggestedCodec": "audio-24khz-48kbitrate-mono-mp3",
            "FriendlyName": "Microsoft Ryan Online (Natural) - English (United Kingdom)",
            "Status": "GA",
            "VoiceTag": { "ContentCategories": ["General"] }
        }
    ])
}

fn client_for(server: &MockServer) -> EdgeTtsClient {
    EdgeTtsClient::new().with_endpoints(
        "ws://127.0.0.1:9/edge/v1?TrustedClientToken=mock",
        format!("{}/voices/list?trustedclienttoken=mock", server.uri()),
    )
}

#[tokio::test]
async fn test_list_voices() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/voices/list"))
        .and(query_param("trustedclienttoken", "mock"))
        .and(query_param("Sec-MS-GEC-Version", SEC_MS_GEC_VERSION))
        .and(header(
            "Origin",
            "chrome-extension://jdiccldimpdaibmpdkjnbmckianbfold",
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(voices_json()))
        .expect(1)
        .mount(&server)
        .await;

    let voices = client_for(&server).list_voices().await.unwrap();

    assert_eq!(voices.len(), 2);
    assert_eq!(voices[0].short_name, "en-US-AriaNeural");
    assert_eq!(
        voices[0].voice_tag.voice_personalities,
        vec!["Positive", "Confident"]
    );
    assert!(voices[1].voice_tag.voice_personalities.is_empty());

    let requests = server.received_requests().await.unwrap();
    let signature = requests[0]
        .url
        .query_pairs()
        .find(|(key, _)| key == "Sec-MS-GEC")
        .map(|(_, value)| value.into_owned())
        .unwrap();
    assert_eq!(signature.len(), 64);
    let cookie = requests[0].headers.get("Cookie").unwrap().to_str().unwrap();
    assert!(cookie.starts_with("muid="));
}

#[tokio::test]
async fn test_list_voices_retries_once_after_403() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/voices/list"))
        .respond_with(ResponseTemplate::new(403).insert_header("Date", SERVER_DATE))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/voices/list"))
        .respond_with(ResponseTemplate::new(200).set_body_json(voices_json()))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let voices = client.list_voices().await.unwrap();

    assert_eq!(voices.len(), 2);
    assert!(client.drm().clock_skew_seconds() < -1.0e6);
    assert_eq!(server.received_requests().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_list_voices_second_403_is_transport_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/voices/list"))
        .respond_with(ResponseTemplate::new(403).insert_header("Date", SERVER_DATE))
        .expect(2)
        .mount(&server)
        .await;

    let result = client_for(&server).list_voices().await;

    assert!(matches!(result, Err(TTSError::Transport(_))));
}

#[tokio::test]
async fn test_list_voices_server_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/voices/list"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let result = client_for(&server).list_voices().await;

    match result {
        Err(TTSError::Transport(msg)) => {
            assert!(msg.contains("500"));
            assert!(msg.contains("boom"));
        }
        other => panic!("expected transport error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_list_voices_invalid_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/voices/list"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html></html>"))
        .mount(&server)
        .await;

    let result = client_for(&server).list_voices().await;

    assert!(matches!(result, Err(TTSError::UnexpectedResponse(_))));
}

#[tokio::test]
async fn test_voices_manager_find() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/voices/list"))
        .respond_with(ResponseTemplate::new(200).set_body_json(voices_json()))
        .expect(1)
        .mount(&server)
        .await;

    let manager = client_for(&server).voices_manager().await.unwrap();

    let male = manager.find(&VoiceFilter::new().gender("Male").language("en"));
    assert_eq!(male.len(), 1);
    assert_eq!(male[0].voice.short_name, "en-GB-RyanNeural");
    assert_eq!(male[0].language, "en");

    assert!(manager.find(&VoiceFilter::new().locale("fr-FR")).is_empty());
}
