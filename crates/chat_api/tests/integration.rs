use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc,
};

use chat_api::{ChatApiClient, ChatApiConfig, ChatApiError, PayloadMessage};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Duration};

fn allow_local_integration() -> bool {
    std::env::var("CHAT_API_ALLOW_LOCAL_INTEGRATION")
        .map(|value| matches!(value.as_str(), "1" | "true" | "TRUE" | "yes" | "YES"))
        .unwrap_or(false)
}

#[derive(Clone)]
struct ResponseChunk {
    delay_ms: u64,
    bytes: Vec<u8>,
}

#[derive(Clone)]
struct ScriptedResponse {
    status: u16,
    content_type: &'static str,
    chunks: Vec<ResponseChunk>,
}

struct ScriptedServer {
    base_url: String,
    request_count: Arc<AtomicUsize>,
    handle: JoinHandle<()>,
}

impl ScriptedServer {
    async fn new(scripts: Vec<ScriptedResponse>) -> Self {
        let scripts = Arc::new(scripts);
        let request_count = Arc::new(AtomicUsize::new(0));
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("local TCP listener should bind");
        let addr = listener
            .local_addr()
            .expect("resolved local listener address");
        let base_url = format!("http://{addr}");

        let handle = tokio::spawn({
            let scripts = Arc::clone(&scripts);
            let request_count = Arc::clone(&request_count);

            async move {
                loop {
                    let (socket, _) = match listener.accept().await {
                        Ok(pair) => pair,
                        Err(_) => break,
                    };
                    let scripts = Arc::clone(&scripts);
                    let request_count = Arc::clone(&request_count);
                    tokio::spawn(async move {
                        serve_one(socket, scripts, request_count).await;
                    });
                }
            }
        });

        Self {
            base_url,
            request_count,
            handle,
        }
    }

    fn request_count(&self) -> usize {
        self.request_count.load(Ordering::Acquire)
    }

    fn shutdown(&self) {
        self.handle.abort();
    }
}

fn response_sse(status: u16, frames: &[&str]) -> ScriptedResponse {
    ScriptedResponse {
        status,
        content_type: "text/event-stream",
        chunks: vec![ResponseChunk {
            delay_ms: 0,
            bytes: sse_frames(frames),
        }],
    }
}

fn response_json(status: u16, body: &str) -> ScriptedResponse {
    ScriptedResponse {
        status,
        content_type: "application/json",
        chunks: vec![ResponseChunk {
            delay_ms: 0,
            bytes: body.as_bytes().to_vec(),
        }],
    }
}

fn sse_frames(frames: &[&str]) -> Vec<u8> {
    let mut body = String::new();

    for frame in frames {
        body.push_str("data: ");
        body.push_str(frame);
        body.push_str("\n\n");
    }

    body.into_bytes()
}

fn client_for(server: &ScriptedServer) -> ChatApiClient {
    let config = ChatApiConfig::new("sk-test", "gpt-4o-mini").with_base_url(&server.base_url);
    ChatApiClient::new(config).expect("client")
}

fn history() -> Vec<PayloadMessage> {
    vec![PayloadMessage::new("user", "hi")]
}

#[tokio::test]
async fn complete_integration_accumulates_visible_text() {
    if !allow_local_integration() {
        return;
    }

    let server = ScriptedServer::new(vec![response_sse(
        200,
        &[
            r##"{"choices":[{"delta":{"content":"Hello"}}]}"##,
            r##"{"choices":[{"delta":{"content":" world"}}]}"##,
            "[DONE]",
        ],
    )])
    .await;

    let client = client_for(&server);
    let mut progress = Vec::new();
    let result = client
        .complete(&history(), None, |text| progress.push(text.to_string()))
        .await
        .expect("completion should succeed");

    assert_eq!(result, "Hello world");
    assert_eq!(progress, vec!["Hello".to_string(), "Hello world".to_string()]);
    assert_eq!(server.request_count(), 1);

    server.shutdown();
}

#[tokio::test]
async fn complete_integration_demarcates_reasoning_inline() {
    if !allow_local_integration() {
        return;
    }

    let server = ScriptedServer::new(vec![response_sse(
        200,
        &[
            r##"{"choices":[{"delta":{"reasoning_content":""}}]}"##,
            r##"{"choices":[{"delta":{"reasoning_content":"plan"}}]}"##,
            r##"{"choices":[{"delta":{"reasoning_content":null,"content":"answer"}}]}"##,
            "[DONE]",
        ],
    )])
    .await;

    let client = client_for(&server);
    let result = client
        .complete(&history(), None, |_| {})
        .await
        .expect("completion should succeed");

    assert_eq!(result, "<think>plan</think>answer");

    server.shutdown();
}

#[tokio::test]
async fn complete_integration_connection_close_without_sentinel_is_normal_end() {
    if !allow_local_integration() {
        return;
    }

    let server = ScriptedServer::new(vec![response_sse(
        200,
        &[r##"{"choices":[{"delta":{"content":"partial"}}]}"##],
    )])
    .await;

    let client = client_for(&server);
    let result = client
        .complete(&history(), None, |_| {})
        .await
        .expect("peer closure should not be an error");

    assert_eq!(result, "partial");

    server.shutdown();
}

#[tokio::test]
async fn complete_integration_non_success_status_is_classified() {
    if !allow_local_integration() {
        return;
    }

    let server = ScriptedServer::new(vec![response_json(
        401,
        r##"{"error":{"message":"invalid api key"}}"##,
    )])
    .await;

    let client = client_for(&server);
    let err = client
        .complete(&history(), None, |_| {})
        .await
        .expect_err("401 should fail");

    match err {
        ChatApiError::Status(status, body) => {
            assert_eq!(status.as_u16(), 401);
            assert!(body.contains("invalid api key"));
        }
        other => panic!("expected status error, got {other:?}"),
    }

    server.shutdown();
}

#[tokio::test]
async fn complete_integration_in_band_error_event_aborts_stream() {
    if !allow_local_integration() {
        return;
    }

    let server = ScriptedServer::new(vec![response_sse(
        200,
        &[
            r##"{"choices":[{"delta":{"content":"before"}}]}"##,
            r##"{"error":{"message":"overloaded","type":"server_error"}}"##,
        ],
    )])
    .await;

    let client = client_for(&server);
    let err = client
        .complete(&history(), None, |_| {})
        .await
        .expect_err("in-band error should fail the stream");

    assert!(matches!(err, ChatApiError::Provider { ref payload } if payload.contains("overloaded")));

    server.shutdown();
}

#[tokio::test]
async fn complete_integration_unframed_error_body_with_success_status() {
    if !allow_local_integration() {
        return;
    }

    // Some gateways return 200 with a bare JSON error document instead of an
    // event stream.
    let server = ScriptedServer::new(vec![ScriptedResponse {
        status: 200,
        content_type: "application/json",
        chunks: vec![ResponseChunk {
            delay_ms: 0,
            bytes: br##"{"error":{"message":"model not found"}}"##.to_vec(),
        }],
    }])
    .await;

    let client = client_for(&server);
    let err = client
        .complete(&history(), None, |_| {})
        .await
        .expect_err("plain error body should fail");

    assert!(matches!(err, ChatApiError::Provider { ref payload } if payload.contains("model not found")));

    server.shutdown();
}

#[tokio::test]
async fn complete_integration_cancellation_during_stream() {
    if !allow_local_integration() {
        return;
    }

    let server = ScriptedServer::new(vec![ScriptedResponse {
        status: 200,
        content_type: "text/event-stream",
        chunks: vec![
            ResponseChunk {
                delay_ms: 0,
                bytes: sse_frames(&[r##"{"choices":[{"delta":{"content":"stream"}}]}"##]),
            },
            ResponseChunk {
                delay_ms: 400,
                bytes: sse_frames(&[r##"{"choices":[{"delta":{"content":" more"}}]}"##, "[DONE]"]),
            },
        ],
    }])
    .await;

    let client = Arc::new(client_for(&server));
    let cancellation = Arc::new(AtomicBool::new(false));

    let stream_task = tokio::spawn({
        let client = Arc::clone(&client);
        let cancellation = Arc::clone(&cancellation);
        async move {
            let mut progress = Vec::new();
            let result = client
                .complete(&history(), Some(&cancellation), |text| {
                    progress.push(text.to_string());
                })
                .await;
            (result, progress)
        }
    });

    sleep(Duration::from_millis(120)).await;
    cancellation.store(true, Ordering::Release);

    let (result, progress) = timeout(Duration::from_secs(5), stream_task)
        .await
        .expect("stream task should resolve")
        .expect("join handle should resolve");

    assert!(matches!(result, Err(ChatApiError::Cancelled)));
    // Text delivered before the cancel survives via the progress callbacks.
    assert_eq!(progress.last().map(String::as_str), Some("stream"));

    server.shutdown();
}

#[tokio::test]
async fn list_models_integration_parses_model_ids() {
    if !allow_local_integration() {
        return;
    }

    let server = ScriptedServer::new(vec![response_json(
        200,
        r##"{"object":"list","data":[{"id":"gpt-4o-mini"},{"id":"gpt-4o","root":"gpt-4o"}]}"##,
    )])
    .await;

    let client = client_for(&server);
    let models = client.list_models().await.expect("model list");

    assert_eq!(models.len(), 2);
    assert_eq!(models[0].id, "gpt-4o-mini");
    assert_eq!(models[1].root.as_deref(), Some("gpt-4o"));

    server.shutdown();
}

#[tokio::test]
async fn list_models_integration_missing_data_is_a_provider_error() {
    if !allow_local_integration() {
        return;
    }

    let server = ScriptedServer::new(vec![response_json(
        200,
        r##"{"message":"listing disabled"}"##,
    )])
    .await;

    let client = client_for(&server);
    let err = client.list_models().await.expect_err("missing data field");

    assert!(matches!(err, ChatApiError::Provider { ref payload } if payload.contains("listing disabled")));

    server.shutdown();
}

fn status_reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        401 => "Unauthorized",
        429 => "Too Many Requests",
        503 => "Service Unavailable",
        _ => "Error",
    }
}

async fn serve_one(
    mut socket: TcpStream,
    scripts: Arc<Vec<ScriptedResponse>>,
    request_count: Arc<AtomicUsize>,
) {
    if read_request_headers(&mut socket).await.is_err() {
        return;
    }

    let index = request_count.fetch_add(1, Ordering::AcqRel);
    let response = scripts
        .get(index)
        .cloned()
        .unwrap_or_else(|| response_json(500, r##"{"error":"unexpected request"}"##));

    let headers = format!(
        "HTTP/1.1 {status} {reason}\r\nContent-Type: {content_type}\r\nTransfer-Encoding: chunked\r\nConnection: close\r\n\r\n",
        status = response.status,
        reason = status_reason(response.status),
        content_type = response.content_type,
    );

    if socket.write_all(headers.as_bytes()).await.is_err() {
        return;
    }

    for chunk in response.chunks {
        if chunk.delay_ms > 0 {
            sleep(Duration::from_millis(chunk.delay_ms)).await;
        }
        let prefix = format!("{:X}\r\n", chunk.bytes.len());
        if socket.write_all(prefix.as_bytes()).await.is_err() {
            return;
        }
        if socket.write_all(&chunk.bytes).await.is_err() {
            return;
        }
        if socket.write_all(b"\r\n").await.is_err() {
            return;
        }
    }

    let _ = socket.write_all(b"0\r\n\r\n").await;
    let _ = socket.shutdown().await;
}

async fn read_request_headers(socket: &mut TcpStream) -> std::io::Result<()> {
    let mut request = Vec::new();
    let mut buffer = [0_u8; 2048];

    loop {
        let n = socket.read(&mut buffer).await?;
        if n == 0 {
            return Ok(());
        }
        request.extend_from_slice(&buffer[..n]);
        if request.windows(4).any(|window| window == b"\r\n\r\n") {
            return Ok(());
        }
    }
}
