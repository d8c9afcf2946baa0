//! Step interpreter
//!
//! Runs a harmony script's steps sequentially against an evaluation
//! context, invoking the chat and tool collaborators at the seams. The
//! interpreter is stateless between runs; all state lives in the
//! per-run `RunState`.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;

use crate::chat::{default_history_filter, ChatService};
use crate::error::EngineError;
use crate::eval::EvalContext;
use crate::tool::ToolService;
use crate::types::{Channel, ChatEntry, CiMap, Script, Step};

/// Instruction appended when a script finishes without producing final
/// text.
const SUMMARIZE_INSTRUCTION: &str =
    "Summarize the results of the executed steps for the user.";

/// Outcome of running one script to termination.
#[derive(Debug, Clone)]
pub struct ScriptOutcome {
    /// Variable bag after execution (defaults, session vars, and step
    /// writes merged)
    pub vars: CiMap<Value>,
    /// User-visible reply, when one was produced
    pub final_text: Option<String>,
    /// True when a halt step terminated the loop
    pub halted: bool,
}

/// Sequential step interpreter bound to chat and tool collaborators.
pub struct StepInterpreter {
    chat: Arc<dyn ChatService>,
    tools: Arc<dyn ToolService>,
}

struct RunState {
    eval: EvalContext,
    history: Vec<ChatEntry>,
    final_text: Option<String>,
}

impl StepInterpreter {
    pub fn new(chat: Arc<dyn ChatService>, tools: Arc<dyn ToolService>) -> Self {
        Self { chat, tools }
    }

    /// Run a script to termination.
    ///
    /// The evaluation context is seeded from the script's default vars
    /// with `session_vars` merged over them; `input` is the per-call
    /// input bag.
    pub async fn run(
        &self,
        script: &Script,
        session_vars: &CiMap<Value>,
        input: &CiMap<Value>,
        history: Vec<ChatEntry>,
        cancellation: &CancellationToken,
    ) -> Result<ScriptOutcome, EngineError> {
        if script.steps.is_empty() {
            return Err(EngineError::NoSteps);
        }

        let mut vars = CiMap::new();
        for (name, value) in &script.vars {
            vars.insert(name.clone(), value.clone());
        }
        for (name, value) in session_vars.iter() {
            vars.insert(name, value.clone());
        }

        let mut state = RunState {
            eval: EvalContext::new(vars, input.clone()),
            history,
            final_text: None,
        };

        let halted = self
            .execute_steps(&script.steps, &mut state, cancellation)
            .await?;

        if state.final_text.is_none() && !halted {
            state
                .history
                .push(ChatEntry::new("system", SUMMARIZE_INSTRUCTION));
            let reply = self.request_reply(&state.history, cancellation).await?;
            state.final_text = Some(reply);
        }

        Ok(ScriptOutcome {
            vars: state.eval.vars,
            final_text: state.final_text,
            halted,
        })
    }

    /// Execute a step list; returns true when a halt step fired.
    ///
    /// Boxed for async recursion into if branches.
    fn execute_steps<'a>(
        &'a self,
        steps: &'a [Step],
        state: &'a mut RunState,
        cancellation: &'a CancellationToken,
    ) -> Pin<Box<dyn Future<Output = Result<bool, EngineError>> + Send + 'a>> {
        Box::pin(async move {
            for step in steps {
                if cancellation.is_cancelled() {
                    return Err(EngineError::Cancelled);
                }
                match step {
                    Step::ExtractInput { vars } => self.run_extract(vars, state)?,
                    Step::ToolCall {
                        recipient,
                        channel,
                        args,
                        save_as,
                    } => {
                        self.run_tool_call(recipient, channel, args, save_as, state)
                            .await?
                    }
                    Step::If {
                        condition,
                        then,
                        otherwise,
                    } => {
                        if !EvalContext::is_valid_expression(condition) {
                            return Err(EngineError::invalid_expression());
                        }
                        let branch = if state.eval.evaluate_bool(condition)? {
                            then
                        } else {
                            otherwise
                        };
                        if self.execute_steps(branch, state, cancellation).await? {
                            return Ok(true);
                        }
                    }
                    Step::AssistantMessage {
                        channel,
                        content,
                        content_template,
                    } => {
                        self.run_assistant_message(
                            channel,
                            content.as_deref(),
                            content_template.as_deref(),
                            state,
                            cancellation,
                        )
                        .await?
                    }
                    Step::Halt => return Ok(true),
                }
            }
            Ok(false)
        })
    }

    fn run_extract(
        &self,
        assignments: &Map<String, Value>,
        state: &mut RunState,
    ) -> Result<(), EngineError> {
        for (name, expr) in assignments {
            let expr = expr.as_str().ok_or_else(|| {
                EngineError::execution(
                    "FormatError",
                    format!("extract-input expression for '{}' must be a string", name),
                )
            })?;
            if !EvalContext::is_valid_expression(expr) {
                return Err(EngineError::invalid_expression());
            }
            let value = state.eval.evaluate(expr)?;
            state.eval.vars.insert(name.clone(), value);
        }
        Ok(())
    }

    async fn run_tool_call(
        &self,
        recipient: &str,
        channel: &str,
        args: &Map<String, Value>,
        save_as: &str,
        state: &mut RunState,
    ) -> Result<(), EngineError> {
        if channel != Channel::Commentary.as_str() {
            return Err(EngineError::execution(
                "InvalidOperation",
                format!("tool-call channel must be commentary, got '{}'", channel),
            ));
        }

        let mut resolved = Map::new();
        for (key, value) in args {
            let resolved_value = match value.as_str() {
                Some(text) if text.starts_with('$') => state.eval.evaluate(text)?,
                _ => value.clone(),
            };
            resolved.insert(key.clone(), resolved_value);
        }

        tracing::debug!(recipient = %recipient, save_as = %save_as, "invoking tool");
        let result = self.tools.invoke(recipient, &resolved).await?;
        state.eval.vars.insert(save_as.to_string(), result);
        Ok(())
    }

    async fn run_assistant_message(
        &self,
        channel: &str,
        content: Option<&str>,
        content_template: Option<&str>,
        state: &mut RunState,
        cancellation: &CancellationToken,
    ) -> Result<(), EngineError> {
        let channel = Channel::parse(channel).filter(|c| *c != Channel::Commentary);
        let Some(channel) = channel else {
            return Err(EngineError::execution(
                "InvalidOperation",
                "assistant-message channel must be analysis or final",
            ));
        };

        let rendered = match content_template {
            Some(template) => state.eval.render_template(template),
            None => content.unwrap_or_default().to_string(),
        };

        if channel == Channel::Analysis {
            state.history.push(
                ChatEntry::new("assistant", rendered).with_channel(Channel::Analysis),
            );
            return Ok(());
        }

        // final: use the rendered text unless it is empty or the "."
        // delegate-to-model marker
        let text = if !rendered.is_empty() && rendered != "." {
            rendered
        } else {
            self.request_reply(&state.history, cancellation).await?
        };
        state.final_text = Some(text);
        Ok(())
    }

    async fn request_reply(
        &self,
        history: &[ChatEntry],
        cancellation: &CancellationToken,
    ) -> Result<String, EngineError> {
        if cancellation.is_cancelled() {
            return Err(EngineError::Cancelled);
        }
        let filtered = default_history_filter(history);
        self.chat.assistant_reply(&filtered).await
    }
}
