//! Rotation and retry scenarios driven by a scripted client.

use ai_lib_dispatch::client::{ClientFactory, ClientHandle, ModelClient};
use ai_lib_dispatch::credentials::Credential;
use ai_lib_dispatch::feedback::InMemoryEventSink;
use ai_lib_dispatch::types::{CallConfig, GenerateContentResponse, GenerateRequest, Part};
use ai_lib_dispatch::{
    CallOptions, DispatchConfig, Dispatcher, DispatcherBuilder, Error, ErrorContext, Result,
    StandardErrorCode,
};
use async_trait::async_trait;
use serde_json::json;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

#[derive(Clone, Debug)]
enum Reply {
    Text(&'static str),
    RateLimited,
    Overloaded,
    BadRequest,
    Blocked,
    NoText,
    Truncated(&'static str),
    Hang(Duration),
}

impl Reply {
    fn into_result(self) -> Result<GenerateContentResponse> {
        let value = match self {
            Reply::Text(t) => json!({
                "candidates": [{ "content": { "parts": [{ "text": t }] }, "finishReason": "STOP" }]
            }),
            Reply::Truncated(t) => json!({
                "candidates": [{ "content": { "parts": [{ "text": t }] }, "finishReason": "MAX_TOKENS" }]
            }),
            Reply::NoText => json!({ "candidates": [{ "finishReason": "STOP" }] }),
            Reply::Blocked => json!({ "promptFeedback": { "blockReason": "SAFETY" } }),
            Reply::RateLimited => return Err(remote(429, "RESOURCE_EXHAUSTED")),
            Reply::Overloaded => return Err(remote(503, "UNAVAILABLE")),
            Reply::BadRequest => return Err(remote(400, "INVALID_ARGUMENT")),
            Reply::Hang(_) => unreachable!("handled by the client"),
        };
        Ok(serde_json::from_value(value).unwrap())
    }
}

fn remote(status: u16, rpc: &str) -> Error {
    Error::Remote {
        status,
        code: StandardErrorCode::resolve(status, Some(rpc)),
        rpc_status: Some(rpc.to_string()),
        message: format!("scripted {}", rpc),
        retry_after_ms: None,
        context: ErrorContext::new(),
    }
}

/// Per-key reply queues plus a log of which key served each attempt.
#[derive(Default)]
struct Script {
    replies: Mutex<HashMap<String, VecDeque<Reply>>>,
    fallback: Mutex<Option<Reply>>,
    calls: Mutex<Vec<String>>,
}

impl Script {
    fn on(self: &Arc<Self>, key: &str, replies: impl IntoIterator<Item = Reply>) -> Arc<Self> {
        self.replies
            .lock()
            .unwrap()
            .entry(key.to_string())
            .or_default()
            .extend(replies);
        self.clone()
    }

    fn otherwise(self: &Arc<Self>, reply: Reply) -> Arc<Self> {
        *self.fallback.lock().unwrap() = Some(reply);
        self.clone()
    }

    fn next(&self, key: &str) -> Reply {
        self.calls.lock().unwrap().push(key.to_string());
        self.replies
            .lock()
            .unwrap()
            .get_mut(key)
            .and_then(VecDeque::pop_front)
            .or_else(|| self.fallback.lock().unwrap().clone())
            .unwrap_or(Reply::RateLimited)
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

struct ScriptedClient {
    key: String,
    script: Arc<Script>,
}

#[async_trait]
impl ModelClient for ScriptedClient {
    async fn generate_content(&self, _: &GenerateRequest) -> Result<GenerateContentResponse> {
        match self.script.next(&self.key) {
            Reply::Hang(d) => {
                tokio::time::sleep(d).await;
                Reply::Text("too late").into_result()
            }
            other => other.into_result(),
        }
    }
}

fn factory(script: Arc<Script>) -> Arc<dyn ClientFactory> {
    Arc::new(move |c: &Credential| -> Result<ClientHandle> {
        if c.expose() == "broken" {
            return Err(Error::initialization_with_context(
                "malformed key",
                ErrorContext::new(),
            ));
        }
        Ok(Arc::new(ScriptedClient {
            key: c.expose().to_string(),
            script: script.clone(),
        }) as ClientHandle)
    })
}

fn dispatcher(keys: &[&str], script: &Arc<Script>, sink: &Arc<InMemoryEventSink>) -> Dispatcher {
    let mut d = DispatcherBuilder::with_config(DispatchConfig::default())
        .credentials(keys.iter().copied())
        .client_factory(factory(script.clone()))
        .event_sink(sink.clone())
        .sleep_on_retry(Duration::ZERO)
        .timeout(Duration::from_secs(5))
        .build()
        .unwrap();
    d.startup().unwrap();
    d
}

fn prompt() -> Vec<Part> {
    vec![Part::text("hello")]
}

#[tokio::test]
async fn rotates_until_a_credential_succeeds() {
    let script = Arc::new(Script::default())
        .on("A", [Reply::RateLimited])
        .on("B", [Reply::RateLimited])
        .on("C", [Reply::Text("ok")]);
    let sink = Arc::new(InMemoryEventSink::new());
    let mut d = dispatcher(&["A", "B", "C"], &script, &sink);

    let resp = d
        .execute_detailed("gemini-2.5-pro", prompt(), CallConfig::Default, CallOptions::new())
        .await
        .unwrap();

    assert_eq!(resp.text, "ok");
    assert_eq!(resp.attempts, 3);
    assert_eq!(resp.credential_index, 2);
    assert_eq!(d.current_index(), 2);
    assert_eq!(script.calls(), vec!["A", "B", "C"]);
    assert_eq!(sink.count("rotated"), 2);
    assert_eq!(sink.count("succeeded"), 1);
    assert_eq!(sink.count("cycle_completed"), 0);
}

#[tokio::test]
async fn always_rate_limited_stops_after_one_attempt_per_credential() {
    let script = Arc::new(Script::default()).otherwise(Reply::RateLimited);
    let sink = Arc::new(InMemoryEventSink::new());
    let mut d = dispatcher(&["A", "B", "C", "D"], &script, &sink);

    let err = d
        .execute("gemini-2.5-pro", prompt(), CallConfig::Default)
        .await
        .unwrap_err();

    match &err {
        Error::CycleExhausted { tried, source } => {
            assert_eq!(*tried, 4);
            assert!(matches!(**source, Error::Remote { status: 429, .. }));
        }
        other => panic!("expected CycleExhausted, got {other}"),
    }
    assert_eq!(err.standard_code(), Some(StandardErrorCode::QuotaExhausted));
    assert_eq!(script.calls(), vec!["A", "B", "C", "D"]);
    assert_eq!(d.current_index(), 0);
    assert_eq!(sink.count("cycle_completed"), 1);
    assert_eq!(sink.count("failed"), 1);
}

#[tokio::test]
async fn transient_server_errors_rotate_too() {
    let script = Arc::new(Script::default())
        .on("A", [Reply::Overloaded])
        .on("B", [Reply::Text("recovered")]);
    let sink = Arc::new(InMemoryEventSink::new());
    let mut d = dispatcher(&["A", "B"], &script, &sink);

    let text = d
        .execute("gemini-2.5-pro", prompt(), CallConfig::Default)
        .await
        .unwrap();
    assert_eq!(text, "recovered");
    assert_eq!(d.current_index(), 1);
}

#[tokio::test]
async fn single_credential_reraises_original_error() {
    let script = Arc::new(Script::default()).otherwise(Reply::RateLimited);
    let sink = Arc::new(InMemoryEventSink::new());
    let mut d = dispatcher(&["A"], &script, &sink);

    let err = d
        .execute("gemini-2.5-pro", prompt(), CallConfig::Default)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Remote { status: 429, .. }));
    assert_eq!(err.context().and_then(|c| c.credential_index), Some(0));
    assert_eq!(script.calls().len(), 1);
    assert_eq!(d.current_index(), 0);
    assert_eq!(sink.count("rotated"), 0);
    assert_eq!(sink.count("retry_scheduled"), 0);
}

#[tokio::test]
async fn textless_response_yields_empty_string() {
    let script = Arc::new(Script::default()).on("A", [Reply::NoText]);
    let sink = Arc::new(InMemoryEventSink::new());
    let mut d = dispatcher(&["A", "B"], &script, &sink);

    let text = d
        .execute("gemini-2.5-pro", prompt(), CallConfig::Default)
        .await
        .unwrap();
    assert_eq!(text, "");
    assert_eq!(d.current_index(), 0);
}

#[tokio::test]
async fn blocked_prompt_is_not_retried() {
    let script = Arc::new(Script::default())
        .on("A", [Reply::Blocked])
        .on("B", [Reply::Text("should not be reached")]);
    let sink = Arc::new(InMemoryEventSink::new());
    let mut d = dispatcher(&["A", "B"], &script, &sink);

    let err = d
        .execute("gemini-2.5-pro", prompt(), CallConfig::Default)
        .await
        .unwrap_err();

    match &err {
        Error::Blocked { reason, .. } => assert_eq!(reason, "SAFETY"),
        other => panic!("expected Blocked, got {other}"),
    }
    assert_eq!(script.calls(), vec!["A"]);
    assert_eq!(d.current_index(), 0);
    assert_eq!(sink.count("rotated"), 0);
}

#[tokio::test]
async fn timeout_is_terminal_and_prompt() {
    let script = Arc::new(Script::default())
        .on("A", [Reply::Hang(Duration::from_secs(5))])
        .on("B", [Reply::Text("should not be reached")]);
    let sink = Arc::new(InMemoryEventSink::new());
    let mut d = dispatcher(&["A", "B"], &script, &sink);

    let start = Instant::now();
    let err = d
        .execute_detailed(
            "gemini-2.5-pro",
            prompt(),
            CallConfig::Default,
            CallOptions::new().with_timeout(Duration::from_millis(100)),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Timeout { .. }));
    assert!(start.elapsed() < Duration::from_secs(2));
    assert_eq!(script.calls(), vec!["A"]);
    assert_eq!(d.current_index(), 0);

    // The slot is free again for the next call.
    script.on("A", [Reply::Text("after timeout")]);
    let text = d
        .execute("gemini-2.5-pro", prompt(), CallConfig::Default)
        .await
        .unwrap();
    assert_eq!(text, "after timeout");
}

#[tokio::test]
async fn non_retryable_remote_error_propagates_unchanged() {
    let script = Arc::new(Script::default()).on("A", [Reply::BadRequest]);
    let sink = Arc::new(InMemoryEventSink::new());
    let mut d = dispatcher(&["A", "B"], &script, &sink);

    let err = d
        .execute("gemini-2.5-pro", prompt(), CallConfig::Default)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Remote {
            status: 400,
            code: StandardErrorCode::InvalidRequest,
            ..
        }
    ));
    assert_eq!(script.calls().len(), 1);
    assert_eq!(d.current_index(), 0);
}

#[tokio::test]
async fn next_call_starts_from_the_last_working_credential() {
    let script = Arc::new(Script::default())
        .on("A", [Reply::RateLimited])
        .on("B", [Reply::Text("first"), Reply::Text("second")]);
    let sink = Arc::new(InMemoryEventSink::new());
    let mut d = dispatcher(&["A", "B", "C"], &script, &sink);

    assert_eq!(
        d.execute("m", prompt(), CallConfig::Default).await.unwrap(),
        "first"
    );
    assert_eq!(
        d.execute("m", prompt(), CallConfig::Default).await.unwrap(),
        "second"
    );
    assert_eq!(script.calls(), vec!["A", "B", "B"]);
    assert_eq!(d.current_index(), 1);
}

#[tokio::test]
async fn cycle_is_detected_from_a_mid_pool_start() {
    let script = Arc::new(Script::default())
        .on("A", [Reply::RateLimited])
        .on("B", [Reply::Text("warm-up")])
        .otherwise(Reply::RateLimited);
    let sink = Arc::new(InMemoryEventSink::new());
    let mut d = dispatcher(&["A", "B", "C"], &script, &sink);
    d.execute("m", prompt(), CallConfig::Default).await.unwrap();
    assert_eq!(d.current_index(), 1);

    let err = d
        .execute("m", prompt(), CallConfig::Default)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::CycleExhausted { tried: 3, .. }));
    assert_eq!(script.calls(), vec!["A", "B", "B", "C", "A"]);
    assert_eq!(d.current_index(), 1);
}

#[tokio::test]
async fn max_tokens_is_success_but_flagged() {
    let script = Arc::new(Script::default()).on("A", [Reply::Truncated("partial")]);
    let sink = Arc::new(InMemoryEventSink::new());
    let mut d = dispatcher(&["A"], &script, &sink);

    let resp = d
        .execute_detailed("m", prompt(), CallConfig::Default, CallOptions::new())
        .await
        .unwrap();
    assert_eq!(resp.text, "partial");
    assert!(resp.truncated);
    assert_eq!(sink.count("truncated"), 1);
}

#[tokio::test]
async fn invalid_untyped_config_fails_before_dispatch() {
    let script = Arc::new(Script::default()).otherwise(Reply::Text("unused"));
    let sink = Arc::new(InMemoryEventSink::new());
    let mut d = dispatcher(&["A"], &script, &sink);

    let mut map = serde_json::Map::new();
    map.insert("temperature".into(), json!(0.3));
    map.insert("no_such_option".into(), json!(true));

    let err = d.execute("m", prompt(), map).await.unwrap_err();
    assert!(matches!(err, Error::Validation { .. }));
    assert!(script.calls().is_empty());
}

#[tokio::test]
async fn valid_untyped_config_is_accepted() {
    let script = Arc::new(Script::default()).otherwise(Reply::Text("fine"));
    let sink = Arc::new(InMemoryEventSink::new());
    let mut d = dispatcher(&["A"], &script, &sink);

    let mut map = serde_json::Map::new();
    map.insert("temperature".into(), json!(0.3));
    map.insert("max_output_tokens".into(), json!(256));

    assert_eq!(d.execute("m", prompt(), map).await.unwrap(), "fine");
}

#[tokio::test]
async fn initialization_failure_propagates() {
    let script = Arc::new(Script::default()).otherwise(Reply::RateLimited);
    let sink = Arc::new(InMemoryEventSink::new());
    let mut d = DispatcherBuilder::with_config(DispatchConfig::default())
        .credentials(["A", "broken"])
        .client_factory(factory(script.clone()))
        .event_sink(sink.clone())
        .sleep_on_retry(Duration::ZERO)
        .build()
        .unwrap();
    d.startup().unwrap();

    let err = d
        .execute("m", prompt(), CallConfig::Default)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Initialization { .. }));
    assert_eq!(err.context().and_then(|c| c.credential_index), Some(1));
    // No rollback: the store stays on the key that failed to initialize.
    assert_eq!(d.current_index(), 1);
}

#[tokio::test]
async fn retry_sleep_is_honoured() {
    let script = Arc::new(Script::default())
        .on("A", [Reply::RateLimited])
        .on("B", [Reply::Text("ok")]);
    let sink = Arc::new(InMemoryEventSink::new());
    let mut d = dispatcher(&["A", "B"], &script, &sink);

    let start = Instant::now();
    d.execute_detailed(
        "m",
        prompt(),
        CallConfig::Default,
        CallOptions::new().with_sleep_on_retry(Duration::from_millis(60)),
    )
    .await
    .unwrap();
    assert!(start.elapsed() >= Duration::from_millis(60));
    assert_eq!(sink.count("retry_scheduled"), 1);
}

#[tokio::test]
async fn events_share_one_request_id_per_call() {
    let script = Arc::new(Script::default())
        .on("A", [Reply::RateLimited])
        .on("B", [Reply::Text("ok")]);
    let sink = Arc::new(InMemoryEventSink::new());
    let mut d = dispatcher(&["A", "B"], &script, &sink);

    let resp = d
        .execute_detailed("m", prompt(), CallConfig::Default, CallOptions::new())
        .await
        .unwrap();
    assert_eq!(
        sink.names(),
        vec![
            "attempt_started",
            "retry_scheduled",
            "rotated",
            "attempt_started",
            "succeeded"
        ]
    );
    assert!(sink
        .events()
        .iter()
        .all(|e| e.request_id() == resp.request_id));
}
