//! Session service
//!
//! Drives message-by-message execution of registered envelopes:
//! per-session locking, idempotent execution records, preflight gating,
//! artifact and transcript bookkeeping, status transitions, and paging.

use std::sync::Arc;

use serde_json::{json, Map, Value};
use tokio_util::sync::CancellationToken;

use harmonic_core::canonical::{self, DefaultSchemaValidator, SchemaValidator};
use harmonic_core::chat::ChatService;
use harmonic_core::error::{EngineError, ErrorInfo};
use harmonic_core::interpreter::StepInterpreter;
use harmonic_core::preflight;
use harmonic_core::store::{LockProvider, ScriptStore, SessionIndexStore, SessionStore};
use harmonic_core::tool::{
    CollectingTraceSink, RecordingToolService, ToolAvailability, ToolService,
};
use harmonic_core::transcript::{normalize_role, preflight_blocked_summary, tool_summary};
use harmonic_core::types::{
    Artifact, ChatEntry, CiMap, ContentType, Envelope, Message, MessageExecutionRecord,
    RecordStatus, Script, Session, SessionStatus,
};
use harmonic_core::wire;

use crate::config::SessionServiceConfig;

/// Options for a single execute call
#[derive(Debug, Clone, Default)]
pub struct ExecuteOptions {
    /// Caller-supplied idempotency key
    pub execution_id: Option<String>,
    /// Per-call input bag merged over session vars in the evaluator input
    pub input: Map<String, Value>,
    /// Cooperative cancellation
    pub cancellation: CancellationToken,
}

impl ExecuteOptions {
    pub fn with_execution_id(mut self, execution_id: impl Into<String>) -> Self {
        self.execution_id = Some(execution_id.into());
        self
    }

    pub fn with_input(mut self, input: Map<String, Value>) -> Self {
        self.input = input;
        self
    }

    pub fn with_cancellation(mut self, cancellation: CancellationToken) -> Self {
        self.cancellation = cancellation;
        self
    }
}

/// Result of one execute call, before DTO projection
#[derive(Debug, Clone)]
pub struct ExecutionOutcome {
    /// Session snapshot after the call
    pub session: Session,
    /// The record this call appended (or replayed)
    pub record: MessageExecutionRecord,
    pub executed_index: usize,
    pub next_index: usize,
}

/// One page of session ids
#[derive(Debug, Clone, PartialEq)]
pub struct SessionPage {
    pub session_ids: Vec<String>,
    /// `None` marks the final page
    pub continuation_token: Option<String>,
}

enum MessageClass {
    Context,
    Script,
    Other,
}

/// The session execution engine
pub struct SessionService {
    scripts: Arc<dyn ScriptStore>,
    sessions: Arc<dyn SessionStore>,
    index: Arc<dyn SessionIndexStore>,
    locks: Arc<dyn LockProvider>,
    chat: Arc<dyn ChatService>,
    tools: Arc<dyn ToolService>,
    availability: Arc<dyn ToolAvailability>,
    validator: Arc<dyn SchemaValidator>,
    config: SessionServiceConfig,
}

impl SessionService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        scripts: Arc<dyn ScriptStore>,
        sessions: Arc<dyn SessionStore>,
        index: Arc<dyn SessionIndexStore>,
        locks: Arc<dyn LockProvider>,
        chat: Arc<dyn ChatService>,
        tools: Arc<dyn ToolService>,
        availability: Arc<dyn ToolAvailability>,
    ) -> Self {
        Self {
            scripts,
            sessions,
            index,
            locks,
            chat,
            tools,
            availability,
            validator: Arc::new(DefaultSchemaValidator),
            config: SessionServiceConfig::default(),
        }
    }

    /// Replace the schema validator
    pub fn with_validator(mut self, validator: Arc<dyn SchemaValidator>) -> Self {
        self.validator = validator;
        self
    }

    pub fn with_config(mut self, config: SessionServiceConfig) -> Self {
        self.config = config;
        self
    }

    // ============ Script lifecycle ============

    /// Parse, canonicalize, validate, and store wire text under a script
    /// id. Registering under an existing id replaces the envelope.
    pub async fn register_script(
        &self,
        script_id: Option<String>,
        wire_text: &str,
    ) -> Result<String, EngineError> {
        let envelope = wire::parse_envelope(wire_text)?;
        self.register_envelope(script_id, &envelope).await
    }

    /// Canonicalize, validate, and store an already-parsed envelope.
    pub async fn register_envelope(
        &self,
        script_id: Option<String>,
        envelope: &Envelope,
    ) -> Result<String, EngineError> {
        let envelope = canonical::canonicalize(envelope)?;
        let document = canonical::to_canonical_json(&envelope);
        if let Some(violation) = self.validator.validate_envelope(&document) {
            return Err(EngineError::EnvelopeSchema(violation));
        }
        for message in &envelope.messages {
            if message.content_type == Some(ContentType::HarmonyScript) {
                if let Some(violation) = self.validator.validate_script(&message.content) {
                    return Err(EngineError::ScriptSchema(violation));
                }
            }
        }

        let script_id = script_id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        self.scripts.save(&script_id, &envelope).await?;
        tracing::info!(
            script_id = %script_id,
            messages = envelope.messages.len(),
            "script registered"
        );
        Ok(script_id)
    }

    pub async fn delete_script(&self, script_id: &str) -> Result<bool, EngineError> {
        Ok(self.scripts.delete(script_id).await?)
    }

    // ============ Session lifecycle ============

    pub async fn start_session(
        &self,
        script_id: &str,
        metadata: CiMap<String>,
    ) -> Result<Session, EngineError> {
        if self.scripts.load(script_id).await?.is_none() {
            return Err(EngineError::NotFound(format!("script '{}'", script_id)));
        }
        let session = Session::new(script_id, metadata);
        self.sessions.save(&session).await?;
        tracing::info!(
            session_id = %session.session_id,
            script_id = %script_id,
            "session started"
        );
        Ok(session)
    }

    /// Execute the message at the session's current index.
    pub async fn execute_next(
        &self,
        session_id: &str,
        options: ExecuteOptions,
    ) -> Result<ExecutionOutcome, EngineError> {
        self.execute_internal(session_id, None, options).await
    }

    /// Execute the message at an explicit envelope index.
    pub async fn execute_message(
        &self,
        session_id: &str,
        index: usize,
        options: ExecuteOptions,
    ) -> Result<ExecutionOutcome, EngineError> {
        self.execute_internal(session_id, Some(index), options).await
    }

    /// Load a session snapshot.
    pub async fn get_session(&self, session_id: &str) -> Result<Session, EngineError> {
        let _guard = self.locks.acquire(session_id).await?;
        self.sessions
            .load(session_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("session '{}'", session_id)))
    }

    pub async fn delete_session(&self, session_id: &str) -> Result<bool, EngineError> {
        let _guard = self.locks.acquire(session_id).await?;
        Ok(self.sessions.delete(session_id).await?)
    }

    /// Administratively cancel a session. Terminal sessions are returned
    /// unchanged; cancellation itself is terminal.
    pub async fn cancel_session(&self, session_id: &str) -> Result<Session, EngineError> {
        let _guard = self.locks.acquire(session_id).await?;
        let mut session = self
            .sessions
            .load(session_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("session '{}'", session_id)))?;
        if session.status.is_terminal() {
            return Ok(session);
        }
        session.set_status(SessionStatus::Cancelled);
        self.sessions.save(&session).await?;
        tracing::info!(session_id = %session_id, "session cancelled");
        Ok(session)
    }

    /// Page through sessions ordered by `updated_at` descending,
    /// `session_id` ascending. The continuation token is opaque; this
    /// implementation encodes a zero-based offset.
    pub async fn list_sessions(
        &self,
        script_id: Option<&str>,
        limit: Option<usize>,
        continuation_token: Option<&str>,
    ) -> Result<SessionPage, EngineError> {
        let limit = limit
            .unwrap_or(self.config.default_page_size)
            .clamp(1, self.config.max_page_size);
        let offset = parse_continuation(continuation_token);

        let ids = self.index.list_ids(script_id).await?;
        let session_ids: Vec<String> = ids.iter().skip(offset).take(limit).cloned().collect();
        let next = offset + session_ids.len();
        let continuation_token = if next < ids.len() {
            Some(format!("offset:{}", next))
        } else {
            None
        };
        Ok(SessionPage {
            session_ids,
            continuation_token,
        })
    }

    // ============ Driving algorithm ============

    async fn execute_internal(
        &self,
        session_id: &str,
        index: Option<usize>,
        options: ExecuteOptions,
    ) -> Result<ExecutionOutcome, EngineError> {
        let _guard = tokio::select! {
            _ = options.cancellation.cancelled() => return Err(EngineError::Cancelled),
            guard = self.locks.acquire(session_id) => guard?,
        };

        let mut session = self
            .sessions
            .load(session_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("session '{}'", session_id)))?;
        let envelope = self
            .scripts
            .load(&session.script_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("script '{}'", session.script_id)))?;

        let target = index.unwrap_or(session.current_index);

        // idempotent replay: return the prior record before touching any
        // collaborator or appending anything, terminal or not
        if let Some(execution_id) = options.execution_id.as_deref() {
            if let Some(&position) = session.execution_id_index.get(execution_id) {
                if let Some(record) = session.history.get(position) {
                    if record.index == target {
                        tracing::debug!(
                            session_id = %session_id,
                            execution_id = %execution_id,
                            index = target,
                            "idempotent replay"
                        );
                        let record = record.clone();
                        let next_index = session.current_index;
                        return Ok(ExecutionOutcome {
                            record,
                            executed_index: target,
                            next_index,
                            session,
                        });
                    }
                }
            }
        }

        // terminal sessions only collect skipped markers
        if session.status.is_terminal() {
            let mut record =
                MessageExecutionRecord::begin(session.current_index, options.execution_id.clone());
            record.push_log(format!(
                "session is terminal ({}); skipping",
                session.status.as_str()
            ));
            record.complete(RecordStatus::Skipped);
            let executed_index = session.current_index;
            return self.finish(session, record, &options, executed_index).await;
        }

        // past the envelope end: the session is complete
        if target >= envelope.messages.len() {
            session.set_status(SessionStatus::Completed);
            let mut record = MessageExecutionRecord::begin(target, options.execution_id.clone());
            record.push_log("message index out of range; envelope complete".to_string());
            record.complete(RecordStatus::Skipped);
            return self.finish(session, record, &options, target).await;
        }

        let message = envelope.messages[target].clone();
        let mut record = MessageExecutionRecord::begin(target, options.execution_id.clone());
        record.inputs = json!({
            "varKeys": session.vars.keys().collect::<Vec<_>>(),
            "inputKeys": options.input.keys().collect::<Vec<_>>(),
        });

        match classify(&message) {
            MessageClass::Context => {
                self.execute_context(&mut session, &message, target, &mut record)
            }
            MessageClass::Script => {
                self.execute_script(&mut session, &envelope, &message, target, &mut record, &options)
                    .await?
            }
            MessageClass::Other => {
                record.push_log("unsupported message shape; skipping".to_string());
                record.complete(RecordStatus::Skipped);
                session.current_index = target + 1;
            }
        }

        self.finish(session, record, &options, target).await
    }

    /// Context-only messages feed the transcript and advance the pointer.
    fn execute_context(
        &self,
        session: &mut Session,
        message: &Message,
        index: usize,
        record: &mut MessageExecutionRecord,
    ) {
        let role = normalize_role(&message.role);
        let text = message
            .content
            .as_str()
            .unwrap_or_default()
            .trim_matches(|c| c == '\r' || c == '\n')
            .to_string();

        let mut entry = ChatEntry::new(role, text.clone()).with_source_index(index);
        entry.channel = message.channel;
        session.transcript.push(entry);

        record.push_output(Artifact::text("message", text));
        record.complete(RecordStatus::Succeeded);
        session.current_index = index + 1;
        if session.status == SessionStatus::Created || session.status == SessionStatus::Blocked {
            session.set_status(SessionStatus::Running);
        }
    }

    /// Harmony-script messages run preflight, then the step interpreter.
    async fn execute_script(
        &self,
        session: &mut Session,
        envelope: &Envelope,
        message: &Message,
        index: usize,
        record: &mut MessageExecutionRecord,
        options: &ExecuteOptions,
    ) -> Result<(), EngineError> {
        let report = preflight::analyze(envelope, self.availability.as_ref()).await;
        if !report.is_ready {
            let line = preflight_blocked_summary(report.missing_recipients.len());
            session
                .transcript
                .push(ChatEntry::new("system", line.clone()).with_source_index(index));
            record.push_output(Artifact::preflight(
                "preflight",
                serde_json::to_value(&report).unwrap_or(Value::Null),
            ));
            record.push_log(line);
            record.error = Some(ErrorInfo::from(&EngineError::MissingTools(
                report.missing_recipients.clone(),
            )));
            record.complete(RecordStatus::Blocked);
            // pointer stays pinned to the blocking message for retry
            session.set_status(SessionStatus::Blocked);
            tracing::warn!(
                session_id = %session.session_id,
                index,
                missing = report.missing_recipients.len(),
                "preflight blocked"
            );
            return Ok(());
        }

        if session.status == SessionStatus::Created || session.status == SessionStatus::Blocked {
            session.set_status(SessionStatus::Running);
        }

        let script = match Script::from_value(&message.content) {
            Ok(script) => script,
            Err(err) => {
                self.fail(session, record, err);
                return Ok(());
            }
        };

        // chat history from the durable transcript, chronological,
        // non-empty content only
        let history: Vec<ChatEntry> = session
            .transcript
            .iter()
            .filter(|entry| !entry.content.trim().is_empty())
            .cloned()
            .collect();

        // evaluator input: session vars with the per-call input merged
        // over them
        let mut input = CiMap::new();
        for (key, value) in session.vars.iter() {
            input.insert(key, value.clone());
        }
        for (key, value) in &options.input {
            input.insert(key.clone(), value.clone());
        }

        let sink = Arc::new(CollectingTraceSink::new());
        let recording = Arc::new(RecordingToolService::new(self.tools.clone(), sink.clone()));
        let interpreter = StepInterpreter::new(self.chat.clone(), recording);

        let result = interpreter
            .run(&script, &session.vars, &input, history, &options.cancellation)
            .await;

        // traces are attached whether the run succeeded or not
        for trace in sink.drain() {
            let summary = tool_summary(&trace.recipient, trace.succeeded, Some(trace.duration_ms()));
            if trace.succeeded {
                tracing::info!(
                    session_id = %session.session_id,
                    recipient = %trace.recipient,
                    "tool invocation succeeded"
                );
            } else {
                tracing::warn!(
                    session_id = %session.session_id,
                    recipient = %trace.recipient,
                    "tool invocation failed"
                );
            }
            let artifact = Artifact::tool_trace(
                format!("tool:{}", trace.recipient),
                serde_json::to_value(&trace).unwrap_or(Value::Null),
            )
            .with_producer(trace.recipient.clone());
            record.push_output(artifact.clone());
            session.artifacts.insert("last_tool_trace", artifact);
            record.push_log(summary.clone());
            session
                .transcript
                .push(ChatEntry::new("system", summary).with_source_index(index));
        }

        match result {
            Ok(outcome) => {
                session.vars = outcome.vars;
                if let Some(final_text) = outcome.final_text.filter(|text| !text.is_empty()) {
                    let artifact = Artifact::text("final", final_text.clone());
                    record.push_output(artifact.clone());
                    session.artifacts.insert("final", artifact);
                    session
                        .transcript
                        .push(ChatEntry::new("assistant", final_text).with_source_index(index));
                }
                record.complete(RecordStatus::Succeeded);
                session.current_index = index + 1;
                // one script per session; completion is atomic
                session.set_status(SessionStatus::Completed);
                tracing::info!(session_id = %session.session_id, index, "script completed");
            }
            Err(EngineError::Cancelled) => return Err(EngineError::Cancelled),
            Err(err) => self.fail(session, record, err),
        }
        Ok(())
    }

    fn fail(&self, session: &mut Session, record: &mut MessageExecutionRecord, err: EngineError) {
        tracing::error!(
            session_id = %session.session_id,
            code = err.code(),
            error = %err,
            "script execution failed"
        );
        record.push_log(err.to_string());
        record.error = Some(ErrorInfo::from(&err));
        record.complete(RecordStatus::Failed);
        session.set_status(SessionStatus::Failed);
    }

    /// Append the record, register the idempotency key, and persist.
    async fn finish(
        &self,
        mut session: Session,
        mut record: MessageExecutionRecord,
        options: &ExecuteOptions,
        executed_index: usize,
    ) -> Result<ExecutionOutcome, EngineError> {
        if record.completed_at.is_none() {
            record.complete(record.status);
        }
        if let Some(execution_id) = &record.execution_id {
            session
                .execution_id_index
                .insert(execution_id.clone(), session.history.len());
        }
        session.history.push(record.clone());
        session.touch();

        // never persist state mutated after a cancellation
        if options.cancellation.is_cancelled() {
            return Err(EngineError::Cancelled);
        }
        self.sessions.save(&session).await?;

        let next_index = session.current_index;
        Ok(ExecutionOutcome {
            record,
            executed_index,
            next_index,
            session,
        })
    }
}

fn classify(message: &Message) -> MessageClass {
    if message.content_type == Some(ContentType::HarmonyScript) && message.content.is_object() {
        return MessageClass::Script;
    }
    let text_like = matches!(message.content_type, None | Some(ContentType::Text));
    if message.termination.is_none() && text_like && message.content.is_string() {
        return MessageClass::Context;
    }
    MessageClass::Other
}

fn parse_continuation(token: Option<&str>) -> usize {
    token
        .and_then(|t| t.strip_prefix("offset:"))
        .and_then(|n| n.parse().ok())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_continuation_degrades_to_zero() {
        assert_eq!(parse_continuation(None), 0);
        assert_eq!(parse_continuation(Some("offset:7")), 7);
        assert_eq!(parse_continuation(Some("garbage")), 0);
        assert_eq!(parse_continuation(Some("offset:notanumber")), 0);
    }

    #[test]
    fn test_classify_message_shapes() {
        let context = Message::text("system", "hello");
        assert!(matches!(classify(&context), MessageClass::Context));

        let script = Message::json(
            "assistant",
            ContentType::HarmonyScript,
            json!({ "steps": [] }),
        );
        assert!(matches!(classify(&script), MessageClass::Script));

        let tool_return = Message::json("demo.echo", ContentType::Json, json!({ "ok": true }));
        assert!(matches!(classify(&tool_return), MessageClass::Other));
    }
}
