//! The blocking client against a wiremock server.
//!
//! Blocking calls run on `spawn_blocking` threads so the mock server keeps
//! serving on the runtime.

use nemati::blocking::Client;
use nemati::resources::{ChatMessage, ChatRequest, Template};
use nemati::{Error, ErrorKind, TransportErrorKind};
use serde_json::json;
use std::net::TcpListener;
use std::time::{Duration, Instant};
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_client(uri: &str) -> Client {
    Client::builder()
        .api_key("nai_test_key")
        .base_url(uri)
        .backoff_base(Duration::from_millis(5))
        .backoff_max(Duration::from_millis(20))
        .build()
        .unwrap()
}

async fn blocking<T, F>(f: F) -> T
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await.unwrap()
}

#[tokio::test(flavor = "multi_thread")]
async fn test_blocking_create_with_retry() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("authorization", "Bearer nai_test_key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "content": "Machine learning is...",
            "usage": {"total_tokens": 42}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let uri = server.uri();
    let completion = blocking(move || {
        let client = test_client(&uri);
        client.chat().create(&ChatRequest::new(vec![
            ChatMessage::system("You are a helpful assistant."),
            ChatMessage::user("What is machine learning?"),
        ]))
    })
    .await
    .unwrap();

    assert_eq!(completion.usage.total(), 42);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_blocking_stream() {
    let server = MockServer::start().await;

    let body = "data: {\"content\":\"Lines \"}\n\n: keep-alive\n\ndata: {\"content\":\"of code\"}\n\ndata: [DONE]\n\n";
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("accept", "text/event-stream"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .mount(&server)
        .await;

    let uri = server.uri();
    let text = blocking(move || {
        let client = test_client(&uri);
        let request = ChatRequest::new(vec![ChatMessage::user("Write a haiku about coding.")]);
        client
            .chat()
            .create_stream(&request)?
            .map(|chunk| chunk.map(|c| c.content))
            .collect::<nemati::Result<String>>()
    })
    .await
    .unwrap();

    assert_eq!(text, "Lines of code");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_blocking_pagination() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/writer/templates"))
        .and(query_param("cursor", "next"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{"id": "t3", "name": "Newsletter"}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/writer/templates"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{"id": "t1", "name": "Blog intro"}, {"id": "t2", "name": "Tweet"}],
            "next_cursor": "next"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let uri = server.uri();
    let templates = blocking(move || {
        let client = test_client(&uri);
        client
            .writer()
            .templates()
            .list()?
            .into_items()
            .collect::<nemati::Result<Vec<Template>>>()
    })
    .await
    .unwrap();

    let names: Vec<_> = templates.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, ["Blog intro", "Tweet", "Newsletter"]);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_blocking_errors_match_async() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/market/crypto/BTC"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({"message": "unknown coin"})))
        .expect(1)
        .mount(&server)
        .await;

    let uri = server.uri();
    let err = blocking(move || test_client(&uri).market().crypto().get("BTC"))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert!(err.to_string().contains("unknown coin"));
}

#[test]
fn test_blocking_stream_times_out_waiting_for_headers() {
    // Accepts connections through the kernel backlog but never answers.
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();

    let client = Client::builder()
        .api_key("nai_test_key")
        .base_url(format!("http://{addr}"))
        .timeout(Duration::from_millis(300))
        .max_retries(1)
        .build()
        .unwrap();

    let started = Instant::now();
    let err = client
        .chat()
        .create_stream(&ChatRequest::new(vec![ChatMessage::user("Hi")]))
        .unwrap_err();

    assert!(
        started.elapsed() < Duration::from_secs(5),
        "stream open took {:?}",
        started.elapsed()
    );
    let Error::RetryExhausted { source, .. } = err else {
        panic!("expected exhaustion, got {err:?}");
    };
    assert!(matches!(
        *source,
        Error::Transport {
            kind: TransportErrorKind::Timeout,
            ..
        }
    ));
    drop(listener);
}
