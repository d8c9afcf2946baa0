//! End-to-end scenarios driving the session service through registered
//! envelopes with stub collaborators.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Duration;
use serde_json::{json, Map, Value};

use harmonic_core::chat::ChatService;
use harmonic_core::error::EngineError;
use harmonic_core::store::SessionStore;
use harmonic_core::tool::{Tool, ToolRegistry};
use harmonic_core::types::{ChatEntry, CiMap, RecordStatus, Session, SessionStatus};
use harmonic_runtime::{ExecuteOptions, SessionService};
use harmonic_stores::{InMemoryLockProvider, InMemoryScriptStore, InMemorySessionStore};

struct StaticChat {
    reply: String,
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl ChatService for StaticChat {
    async fn assistant_reply(&self, _history: &[ChatEntry]) -> Result<String, EngineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.reply.clone())
    }
}

struct CountingTool {
    recipient: &'static str,
    result: Value,
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl Tool for CountingTool {
    fn recipient(&self) -> &str {
        self.recipient
    }

    async fn invoke(&self, args: &Map<String, Value>) -> Result<Value, EngineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut result = self.result.clone();
        if let Some(object) = result.as_object_mut() {
            object.insert("args".to_string(), Value::Object(args.clone()));
        }
        Ok(result)
    }
}

struct Harness {
    service: SessionService,
    sessions: Arc<InMemorySessionStore>,
    registry: Arc<ToolRegistry>,
    chat_calls: Arc<AtomicUsize>,
    tool_calls: Arc<AtomicUsize>,
}

fn harness() -> Harness {
    let chat_calls = Arc::new(AtomicUsize::new(0));
    let tool_calls = Arc::new(AtomicUsize::new(0));
    let registry = Arc::new(ToolRegistry::new());
    let sessions = Arc::new(InMemorySessionStore::new());

    let service = SessionService::new(
        Arc::new(InMemoryScriptStore::new()),
        sessions.clone(),
        sessions.clone(),
        Arc::new(InMemoryLockProvider::new()),
        Arc::new(StaticChat {
            reply: "Final answer from LLM.".to_string(),
            calls: chat_calls.clone(),
        }),
        registry.clone(),
        registry.clone(),
    );

    Harness {
        service,
        sessions,
        registry,
        chat_calls,
        tool_calls,
    }
}

impl Harness {
    async fn register_tool(&self, recipient: &'static str, result: Value) {
        self.registry
            .register(Arc::new(CountingTool {
                recipient,
                result,
                calls: self.tool_calls.clone(),
            }))
            .await;
    }
}

const CONTEXT_ONLY_WIRE: &str =
    "<|start|>system<|message|>You are Harmony MVP. Follow HRF.<|end|>";

fn script_wire(script_json: &str) -> String {
    format!(
        "<|start|>system<|message|>You are Harmony MVP. Follow HRF.<|end|>\
         <|start|>user<|message|>Run the script.<|end|>\
         <|start|>assistant <|channel|>commentary to=demo.router <|constrain|>harmony-script<|message|>{}<|end|>",
        script_json
    )
}

// Scenario 1: a single context message advances the pointer and feeds the
// transcript.
#[tokio::test]
async fn context_only_advance() {
    let harness = harness();
    let script_id = harness
        .service
        .register_script(Some("script-ctx".to_string()), CONTEXT_ONLY_WIRE)
        .await
        .unwrap();
    let session = harness
        .service
        .start_session(&script_id, CiMap::new())
        .await
        .unwrap();

    let outcome = harness
        .service
        .execute_next(&session.session_id, ExecuteOptions::default())
        .await
        .unwrap();

    assert_eq!(outcome.executed_index, 0);
    assert_eq!(outcome.record.status, RecordStatus::Succeeded);
    assert_eq!(outcome.next_index, 1);
    assert_eq!(outcome.session.current_index, 1);
    assert_eq!(outcome.session.history.len(), 1);
    assert_eq!(outcome.session.transcript.len(), 1);
    assert_eq!(outcome.session.transcript[0].role, "system");
    assert_eq!(
        outcome.session.transcript[0].content,
        "You are Harmony MVP. Follow HRF."
    );

    let artifact = outcome.record.output("message").unwrap();
    assert_eq!(
        artifact.content_text(),
        Some("You are Harmony MVP. Follow HRF.")
    );
}

// Scenario 2: happy-path script with one tool call and a delegated final
// reply.
#[tokio::test]
async fn happy_path_script() {
    let harness = harness();
    harness.register_tool("demo.echo", json!({"echoed": true})).await;

    let wire = script_wire(
        r#"{"steps":[
            {"type":"tool-call","recipient":"demo.echo","channel":"commentary",
             "args":{"text":"hello from tool"},"save_as":"toolResult"},
            {"type":"assistant-message","channel":"final","content":"."}
        ]}"#,
    );
    let script_id = harness
        .service
        .register_script(Some("script-happy".to_string()), &wire)
        .await
        .unwrap();
    let session = harness
        .service
        .start_session(&script_id, CiMap::new())
        .await
        .unwrap();

    let mut last = None;
    for _ in 0..3 {
        last = Some(
            harness
                .service
                .execute_next(&session.session_id, ExecuteOptions::default())
                .await
                .unwrap(),
        );
    }
    let outcome = last.unwrap();

    assert_eq!(outcome.session.status, SessionStatus::Completed);
    assert!(outcome.session.vars.get("toolResult").is_some());
    let final_artifact = outcome.session.artifacts.get("final").unwrap();
    assert_eq!(final_artifact.content_text(), Some("Final answer from LLM."));
    assert!(outcome
        .session
        .transcript
        .iter()
        .any(|entry| entry.role == "assistant" && entry.content == "Final answer from LLM."));
    assert_eq!(harness.chat_calls.load(Ordering::SeqCst), 1);
    assert_eq!(harness.tool_calls.load(Ordering::SeqCst), 1);
}

// Scenario 3: missing tools block the script message and pin the pointer.
#[tokio::test]
async fn blocked_preflight() {
    let harness = harness();
    // demo.search is never registered; availability denies it

    let wire = script_wire(
        r#"{"steps":[
            {"type":"tool-call","recipient":"demo.search","channel":"commentary",
             "args":{"query":"tides"},"save_as":"results"}
        ]}"#,
    );
    let script_id = harness
        .service
        .register_script(Some("script-blocked".to_string()), &wire)
        .await
        .unwrap();
    let session = harness
        .service
        .start_session(&script_id, CiMap::new())
        .await
        .unwrap();

    let mut last = None;
    for _ in 0..3 {
        last = Some(
            harness
                .service
                .execute_next(&session.session_id, ExecuteOptions::default())
                .await
                .unwrap(),
        );
    }
    let outcome = last.unwrap();

    assert_eq!(outcome.session.status, SessionStatus::Blocked);
    assert_eq!(outcome.session.current_index, 2);
    assert_eq!(outcome.record.status, RecordStatus::Blocked);
    assert!(outcome
        .session
        .transcript
        .iter()
        .any(|entry| entry.content.starts_with("[preflight] blocked")));
    let preflight = outcome.record.output("preflight").unwrap();
    assert_eq!(preflight.content["missingRecipients"][0], json!("demo.search"));

    // neither collaborator was touched
    assert_eq!(harness.tool_calls.load(Ordering::SeqCst), 0);
    assert_eq!(harness.chat_calls.load(Ordering::SeqCst), 0);
}

// A blocked session re-runs the same message once the tool appears.
#[tokio::test]
async fn blocked_session_recovers_when_tool_arrives() {
    let harness = harness();
    let wire = script_wire(
        r#"{"steps":[
            {"type":"tool-call","recipient":"demo.search","channel":"commentary",
             "args":{"query":"tides"},"save_as":"results"},
            {"type":"assistant-message","channel":"final","content":"found it"}
        ]}"#,
    );
    let script_id = harness
        .service
        .register_script(Some("script-recover".to_string()), &wire)
        .await
        .unwrap();
    let session = harness
        .service
        .start_session(&script_id, CiMap::new())
        .await
        .unwrap();

    for _ in 0..3 {
        harness
            .service
            .execute_next(&session.session_id, ExecuteOptions::default())
            .await
            .unwrap();
    }
    let blocked = harness.service.get_session(&session.session_id).await.unwrap();
    assert_eq!(blocked.status, SessionStatus::Blocked);
    assert_eq!(blocked.current_index, 2);

    harness.register_tool("demo.search", json!({"found": 3})).await;

    let outcome = harness
        .service
        .execute_next(&session.session_id, ExecuteOptions::default())
        .await
        .unwrap();
    assert_eq!(outcome.session.status, SessionStatus::Completed);
    assert_eq!(outcome.record.status, RecordStatus::Succeeded);
    assert_eq!(outcome.session.vars.get("results").unwrap()["found"], json!(3));
}

// Scenario 4: retries with the same execution id replay the stored record.
#[tokio::test]
async fn idempotent_retry() {
    let harness = harness();
    let wire = script_wire(
        r#"{"steps":[
            {"type":"assistant-message","channel":"final","content":"All done."}
        ]}"#,
    );
    let script_id = harness
        .service
        .register_script(Some("script-idem".to_string()), &wire)
        .await
        .unwrap();
    let session = harness
        .service
        .start_session(&script_id, CiMap::new())
        .await
        .unwrap();
    for _ in 0..2 {
        harness
            .service
            .execute_next(&session.session_id, ExecuteOptions::default())
            .await
            .unwrap();
    }

    let options = || ExecuteOptions::default().with_execution_id("exec-123");
    let first = harness
        .service
        .execute_message(&session.session_id, 2, options())
        .await
        .unwrap();
    let second = harness
        .service
        .execute_message(&session.session_id, 2, options())
        .await
        .unwrap();

    assert_eq!(second.record, first.record);
    assert_eq!(
        second.session.history.len(),
        first.session.history.len(),
        "replay must not grow history"
    );
    assert_eq!(harness.tool_calls.load(Ordering::SeqCst), 0);
    // the chat collaborator ran once, not twice
    assert_eq!(harness.chat_calls.load(Ordering::SeqCst), 0);
}

// Scenario 5: tool traces land on the record, the session, and the
// transcript.
#[tokio::test]
async fn tool_trace_and_transcript_summary() {
    let harness = harness();
    harness.register_tool("demo.lookup", json!({"found": true})).await;

    let wire = script_wire(
        r#"{"steps":[
            {"type":"tool-call","recipient":"demo.lookup","channel":"commentary",
             "args":{"query":"hello"},"save_as":"toolResult"},
            {"type":"assistant-message","channel":"final","content":"done"}
        ]}"#,
    );
    let script_id = harness
        .service
        .register_script(Some("script-trace".to_string()), &wire)
        .await
        .unwrap();
    let session = harness
        .service
        .start_session(&script_id, CiMap::new())
        .await
        .unwrap();

    let mut last = None;
    for _ in 0..3 {
        last = Some(
            harness
                .service
                .execute_next(&session.session_id, ExecuteOptions::default())
                .await
                .unwrap(),
        );
    }
    let outcome = last.unwrap();

    let trace = outcome.record.output("tool:demo.lookup").unwrap();
    assert_eq!(trace.content["succeeded"], json!(true));
    assert_eq!(trace.content["args"]["query"], json!("hello"));
    assert!(outcome.session.artifacts.get("last_tool_trace").is_some());
    assert!(outcome
        .session
        .transcript
        .iter()
        .any(|entry| entry.content.starts_with("[tool:demo.lookup] ok")));
    assert_eq!(
        outcome.session.vars.get("toolResult").unwrap()["found"],
        json!(true)
    );
}

// Scenario 6: paging is ordered by updated_at desc with id tie-break, and
// the final page carries no continuation token.
#[tokio::test]
async fn paging_order() {
    let harness = harness();

    let base = chrono::Utc::now();
    for (id, offset) in [("s1", 3), ("s2", 1), ("s3", 2)] {
        let mut session = Session::new("script-A", CiMap::new());
        session.session_id = id.to_string();
        session.updated_at = base + Duration::seconds(offset);
        harness.sessions.save(&session).await.unwrap();
    }

    let first = harness
        .service
        .list_sessions(Some("script-A"), Some(2), None)
        .await
        .unwrap();
    assert_eq!(first.session_ids, vec!["s1", "s3"]);
    let token = first.continuation_token.expect("expected a second page");

    let second = harness
        .service
        .list_sessions(Some("script-A"), Some(2), Some(&token))
        .await
        .unwrap();
    assert_eq!(second.session_ids, vec!["s2"]);
    assert!(second.continuation_token.is_none());

    // unparseable tokens degrade to the first page
    let degraded = harness
        .service
        .list_sessions(Some("script-A"), Some(2), Some("not-a-token"))
        .await
        .unwrap();
    assert_eq!(degraded.session_ids, vec!["s1", "s3"]);
}

// Terminal sessions freeze vars, artifacts, and the pointer; further
// executes only append skipped markers.
#[tokio::test]
async fn terminal_status_freezes_state() {
    let harness = harness();
    harness.register_tool("demo.echo", json!({"echoed": true})).await;

    let wire = script_wire(
        r#"{"steps":[
            {"type":"tool-call","recipient":"demo.echo","channel":"commentary",
             "args":{"text":"x"},"save_as":"toolResult"},
            {"type":"assistant-message","channel":"final","content":"finished"}
        ]}"#,
    );
    let script_id = harness
        .service
        .register_script(Some("script-term".to_string()), &wire)
        .await
        .unwrap();
    let session = harness
        .service
        .start_session(&script_id, CiMap::new())
        .await
        .unwrap();
    for _ in 0..3 {
        harness
            .service
            .execute_next(&session.session_id, ExecuteOptions::default())
            .await
            .unwrap();
    }

    let completed = harness.service.get_session(&session.session_id).await.unwrap();
    assert_eq!(completed.status, SessionStatus::Completed);
    let frozen_vars = completed.vars.clone();
    let frozen_index = completed.current_index;
    let frozen_artifacts = completed.artifacts.len();
    let tool_calls_before = harness.tool_calls.load(Ordering::SeqCst);

    let outcome = harness
        .service
        .execute_next(&session.session_id, ExecuteOptions::default())
        .await
        .unwrap();

    assert_eq!(outcome.record.status, RecordStatus::Skipped);
    assert_eq!(outcome.session.status, SessionStatus::Completed);
    assert_eq!(outcome.session.vars, frozen_vars);
    assert_eq!(outcome.session.current_index, frozen_index);
    assert_eq!(outcome.session.artifacts.len(), frozen_artifacts);
    assert_eq!(outcome.session.history.len(), completed.history.len() + 1);
    assert_eq!(harness.tool_calls.load(Ordering::SeqCst), tool_calls_before);
}

// A failing tool marks the record and the session Failed, and the trace
// is still attached.
#[tokio::test]
async fn tool_failure_marks_session_failed() {
    struct FailingTool;

    #[async_trait]
    impl Tool for FailingTool {
        fn recipient(&self) -> &str {
            "demo.fragile"
        }

        async fn invoke(&self, _args: &Map<String, Value>) -> Result<Value, EngineError> {
            Err(EngineError::execution("InvalidOperation", "backend exploded"))
        }
    }

    let harness = harness();
    harness.registry.register(Arc::new(FailingTool)).await;

    let wire = script_wire(
        r#"{"steps":[
            {"type":"tool-call","recipient":"demo.fragile","channel":"commentary",
             "args":{},"save_as":"x"}
        ]}"#,
    );
    let script_id = harness
        .service
        .register_script(Some("script-fail".to_string()), &wire)
        .await
        .unwrap();
    let session = harness
        .service
        .start_session(&script_id, CiMap::new())
        .await
        .unwrap();

    let mut last = None;
    for _ in 0..3 {
        last = Some(
            harness
                .service
                .execute_next(&session.session_id, ExecuteOptions::default())
                .await
                .unwrap(),
        );
    }
    let outcome = last.unwrap();

    assert_eq!(outcome.session.status, SessionStatus::Failed);
    assert_eq!(outcome.record.status, RecordStatus::Failed);
    let error = outcome.record.error.as_ref().unwrap();
    assert_eq!(error.code, "HRF_EXECUTION_ERROR");
    assert!(error.message.contains("backend exploded"));
    let trace = outcome.record.output("tool:demo.fragile").unwrap();
    assert_eq!(trace.content["succeeded"], json!(false));
    assert!(outcome
        .session
        .transcript
        .iter()
        .any(|entry| entry.content.starts_with("[tool:demo.fragile] failed")));
}

// Registration rejects malformed wire text and invalid embedded scripts.
#[tokio::test]
async fn registration_validates_wire_and_script() {
    let harness = harness();

    let parse_err = harness
        .service
        .register_script(None, "<|start|>system<|message|>no terminator")
        .await
        .unwrap_err();
    assert_eq!(parse_err.code(), "HRF_PARSE_MISSING_TERMINATOR");

    let script_err = harness
        .service
        .register_script(None, &script_wire(r#"{"steps":[{"type":"teleport"}]}"#))
        .await
        .unwrap_err();
    assert_eq!(script_err.code(), "HRF_SCHEMA_SCRIPT_FAILED");
}

// Driving past the end of the envelope completes the session.
#[tokio::test]
async fn out_of_range_completes() {
    let harness = harness();
    let script_id = harness
        .service
        .register_script(Some("script-end".to_string()), CONTEXT_ONLY_WIRE)
        .await
        .unwrap();
    let session = harness
        .service
        .start_session(&script_id, CiMap::new())
        .await
        .unwrap();

    harness
        .service
        .execute_next(&session.session_id, ExecuteOptions::default())
        .await
        .unwrap();
    let outcome = harness
        .service
        .execute_next(&session.session_id, ExecuteOptions::default())
        .await
        .unwrap();

    assert_eq!(outcome.record.status, RecordStatus::Skipped);
    assert_eq!(outcome.session.status, SessionStatus::Completed);
}

// Cancelling a session is terminal: further executes skip and state
// stays frozen.
#[tokio::test]
async fn cancelled_session_is_terminal() {
    let harness = harness();
    let script_id = harness
        .service
        .register_script(Some("script-cancel".to_string()), CONTEXT_ONLY_WIRE)
        .await
        .unwrap();
    let session = harness
        .service
        .start_session(&script_id, CiMap::new())
        .await
        .unwrap();
    harness
        .service
        .execute_next(&session.session_id, ExecuteOptions::default())
        .await
        .unwrap();

    let cancelled = harness
        .service
        .cancel_session(&session.session_id)
        .await
        .unwrap();
    assert_eq!(cancelled.status, SessionStatus::Cancelled);

    let outcome = harness
        .service
        .execute_next(&session.session_id, ExecuteOptions::default())
        .await
        .unwrap();
    assert_eq!(outcome.record.status, RecordStatus::Skipped);
    assert_eq!(outcome.session.status, SessionStatus::Cancelled);
    assert_eq!(outcome.session.current_index, cancelled.current_index);

    // cancelling again is a no-op
    let again = harness
        .service
        .cancel_session(&session.session_id)
        .await
        .unwrap();
    assert_eq!(again.status, SessionStatus::Cancelled);
}

// History only ever grows.
#[tokio::test]
async fn history_is_append_only() {
    let harness = harness();
    let script_id = harness
        .service
        .register_script(Some("script-hist".to_string()), CONTEXT_ONLY_WIRE)
        .await
        .unwrap();
    let session = harness
        .service
        .start_session(&script_id, CiMap::new())
        .await
        .unwrap();

    let mut previous = 0;
    for _ in 0..5 {
        let outcome = harness
            .service
            .execute_next(&session.session_id, ExecuteOptions::default())
            .await
            .unwrap();
        assert!(outcome.session.history.len() >= previous);
        previous = outcome.session.history.len();
    }
    assert_eq!(previous, 5);
}
