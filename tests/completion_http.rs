use serde_json::json;
use std::time::Duration;
use tokio::net::TcpListener;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use querycut::agent::segment_resolver::{
    ChatCompletionClient, CompletionBackend, ConversationRange, ResolutionError, SegmentResolver,
};
use querycut::agent::transcription::TranscriptSegment;
use querycut::config::LlmConfig;

fn config(api_url: String, timeout_secs: u64) -> LlmConfig {
    LlmConfig {
        api_url,
        api_key: Some("secret-key".into()),
        timeout_secs,
        ..LlmConfig::default()
    }
}

fn completion(content: &str) -> serde_json::Value {
    json!({"choices": [{"message": {"role": "assistant", "content": content}}]})
}

#[tokio::test]
async fn test_chat_completion_round_trip() {
    let server = MockServer::start().await;
    let content = "Sure, here you go:\n{ \"conversations\": [{\"start\": \"5\", \"end\": \"12\"}] }";
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer secret-key"))
        .and(body_partial_json(json!({"stream": false})))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion(content)))
        .expect(1)
        .mount(&server)
        .await;

    let client = ChatCompletionClient::new(&config(format!("{}/v1", server.uri()), 5)).unwrap();
    let resolver = SegmentResolver::new(client);
    let transcript = vec![
        TranscriptSegment::new(0.0, 5.0, "intro"),
        TranscriptSegment::new(5.0, 12.0, "topic A discussion"),
        TranscriptSegment::new(12.0, 15.0, "outro"),
    ];

    let parsed = resolver.resolve(&transcript, "topic A").await.unwrap();
    assert_eq!(parsed.ranges, vec![ConversationRange::new(5.0, 12.0)]);

    let requests = server.received_requests().await.unwrap();
    let body = String::from_utf8_lossy(&requests[0].body);
    assert!(body.contains("topic A discussion"));
}

#[tokio::test]
async fn test_non_success_status_is_api_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(429).set_body_string(r#"{"error":"rate limited"}"#))
        .mount(&server)
        .await;

    let client = ChatCompletionClient::new(&config(format!("{}/v1", server.uri()), 5)).unwrap();
    let err = client.complete("anything").await.unwrap_err();

    match err {
        ResolutionError::Api { status, body } => {
            assert_eq!(status, 429);
            assert!(body.contains("rate limited"));
        }
        other => panic!("expected API error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_blank_content_is_empty_reply() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("")))
        .mount(&server)
        .await;

    let client = ChatCompletionClient::new(&config(format!("{}/v1", server.uri()), 5)).unwrap();
    let err = client.complete("anything").await.unwrap_err();
    assert!(matches!(err, ResolutionError::EmptyReply));
}

#[tokio::test]
async fn test_slow_endpoint_times_out_without_retry() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(completion(r#"{"conversations": []}"#))
                .set_delay(Duration::from_secs(5)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = ChatCompletionClient::new(&config(format!("{}/v1", server.uri()), 1)).unwrap();
    let err = client.complete("anything").await.unwrap_err();
    assert!(matches!(err, ResolutionError::Timeout(1)));
}

#[tokio::test]
async fn test_unreachable_endpoint_is_transport_error() {
    // Bind then drop to get a port nobody listens on
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}/v1", listener.local_addr().unwrap());
    drop(listener);

    let client = ChatCompletionClient::new(&config(url, 5)).unwrap();
    let err = client.complete("anything").await.unwrap_err();
    assert!(matches!(err, ResolutionError::Transport(_)));
}
