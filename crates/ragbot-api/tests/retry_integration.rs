//! Integration tests for retry/backoff in the chat and embedding clients.
//!
//! A raw TCP test server replays canned HTTP responses, one per connection,
//! so retries can be observed by counting accepted connections.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use ragbot_api::{OpenAiChatModel, OpenAiClient, OpenAiEmbedder, RetryConfig};
use ragbot_types::{ApiError, ChatMessage, ChatModel, Credential, Embedder};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

fn http_response(status_line: &str, extra_headers: &str, body: &str) -> String {
    format!(
        "HTTP/1.1 {status_line}\r\n\
         Content-Type: application/json\r\n\
         {extra_headers}\
         Content-Length: {}\r\n\
         Connection: close\r\n\
         \r\n\
         {body}",
        body.len()
    )
}

fn completion_ok(text: &str) -> String {
    let body = serde_json::json!({
        "id": "chatcmpl-test",
        "object": "chat.completion",
        "choices": [{"index": 0, "message": {"role": "assistant", "content": text}, "finish_reason": "stop"}]
    })
    .to_string();
    http_response("200 OK", "", &body)
}

fn embeddings_ok(vectors: &[[f32; 2]]) -> String {
    let data: Vec<_> = vectors
        .iter()
        .enumerate()
        .map(|(i, v)| serde_json::json!({"object": "embedding", "index": i, "embedding": v}))
        .collect();
    let body = serde_json::json!({"object": "list", "data": data}).to_string();
    http_response("200 OK", "", &body)
}

fn rate_limited() -> String {
    http_response(
        "429 Too Many Requests",
        "Retry-After: 0.01\r\n",
        r#"{"error":{"message":"rate limited"}}"#,
    )
}

fn server_error() -> String {
    http_response(
        "500 Internal Server Error",
        "",
        r#"{"error":{"message":"internal error"}}"#,
    )
}

fn unauthorized() -> String {
    http_response(
        "401 Unauthorized",
        "",
        r#"{"error":{"message":"Incorrect API key provided"}}"#,
    )
}

/// Start a TCP server that answers connection N with `responses[N]`.
async fn start_test_server(responses: Vec<String>) -> (String, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let counter = Arc::new(AtomicUsize::new(0));
    let counter_clone = Arc::clone(&counter);

    tokio::spawn(async move {
        let responses = Arc::new(responses);
        loop {
            let (mut socket, _) = match listener.accept().await {
                Ok(conn) => conn,
                Err(_) => break,
            };
            let idx = counter_clone.fetch_add(1, Ordering::SeqCst);
            let responses = Arc::clone(&responses);

            tokio::spawn(async move {
                let mut buf = vec![0u8; 16 * 1024];
                let _ = socket.read(&mut buf).await;
                if let Some(response) = responses.get(idx) {
                    let _ = socket.write_all(response.as_bytes()).await;
                    let _ = socket.flush().await;
                }
                let _ = socket.shutdown().await;
            });
        }
    });

    (format!("http://{addr}"), counter)
}

fn make_client(base_url: &str) -> OpenAiClient {
    OpenAiClient::new(&Credential::new("test-key"), base_url)
        .unwrap()
        .with_retry_config(RetryConfig {
            max_retries: 2,
            initial_delay_ms: 10,
            max_delay_ms: 100,
            backoff_factor: 2.0,
        })
}

fn prompt() -> Vec<ChatMessage> {
    vec![ChatMessage::system("be brief"), ChatMessage::user("hello")]
}

#[tokio::test]
async fn chat_retries_after_rate_limit() {
    let (url, counter) = start_test_server(vec![rate_limited(), completion_ok("Retried OK")]).await;
    let llm = OpenAiChatModel::new(make_client(&url), "gpt-4o", 0.6);

    let answer = llm.complete(&prompt()).await.unwrap();

    assert_eq!(answer, "Retried OK");
    assert_eq!(counter.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn chat_retries_server_errors_until_success() {
    let (url, counter) = start_test_server(vec![
        server_error(),
        server_error(),
        completion_ok("third time"),
    ])
    .await;
    let llm = OpenAiChatModel::new(make_client(&url), "gpt-4o", 0.6);

    let answer = llm.complete(&prompt()).await.unwrap();

    assert_eq!(answer, "third time");
    assert_eq!(counter.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn chat_gives_up_after_max_retries() {
    let (url, counter) =
        start_test_server(vec![server_error(), server_error(), server_error()]).await;
    let llm = OpenAiChatModel::new(make_client(&url), "gpt-4o", 0.6);

    let err = llm.complete(&prompt()).await.unwrap_err();

    assert!(matches!(err, ApiError::Server { status: 500, .. }), "{err:?}");
    assert_eq!(counter.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn chat_does_not_retry_auth_failure() {
    let (url, counter) = start_test_server(vec![unauthorized(), completion_ok("unused")]).await;
    let llm = OpenAiChatModel::new(make_client(&url), "gpt-4o", 0.6);

    let err = llm.complete(&prompt()).await.unwrap_err();

    match err {
        ApiError::Auth { message } => assert_eq!(message, "Incorrect API key provided"),
        other => panic!("Expected Auth, got {other:?}"),
    }
    assert_eq!(counter.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn embeddings_are_batched() {
    let (url, counter) = start_test_server(vec![
        embeddings_ok(&[[1.0, 0.0], [0.0, 1.0]]),
        embeddings_ok(&[[0.5, 0.5]]),
    ])
    .await;
    let embedder = OpenAiEmbedder::new(make_client(&url), "text-embedding-ada-002").with_batch_size(2);
    let texts = vec!["a".to_string(), "b".to_string(), "c".to_string()];

    let vectors = embedder.embed_documents(&texts).await.unwrap();

    assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![0.5, 0.5]]);
    assert_eq!(counter.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn connection_refused_is_a_network_error() {
    // Bind then drop to get a port nothing listens on.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = OpenAiClient::new(&Credential::new("k"), format!("http://{addr}"))
        .unwrap()
        .with_retry_config(RetryConfig::disabled());
    let embedder = OpenAiEmbedder::new(client, "text-embedding-ada-002");

    let err = embedder.embed_query("hello").await.unwrap_err();
    assert!(matches!(err, ApiError::Network(_)), "{err:?}");
}
