//! Basic usage example for Harmonic
//!
//! This example demonstrates:
//! - Registering an envelope from its wire form
//! - Wiring a chat stub and a tool into the engine
//! - Driving a session message by message
//! - Inspecting vars, artifacts, and the transcript

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use harmonic_core::prelude::*;
use harmonic_runtime::{EngineAppBuilder, ExecuteOptions};

/// A chat stub that always produces the same reply
struct StaticChat;

#[async_trait]
impl ChatService for StaticChat {
    async fn assistant_reply(&self, history: &[ChatEntry]) -> Result<String, EngineError> {
        Ok(format!(
            "Summarized {} transcript entries.",
            history.len()
        ))
    }
}

/// A tool that echoes its arguments back
struct EchoTool;

#[async_trait]
impl Tool for EchoTool {
    fn recipient(&self) -> &str {
        "demo.echo"
    }

    async fn invoke(&self, args: &Map<String, Value>) -> Result<Value, EngineError> {
        Ok(json!({ "echoed": args }))
    }
}

const WIRE: &str = "<|start|>system<|message|>You are Harmony MVP. Follow HRF.<|end|>\
    <|start|>user<|message|>Please echo something.<|end|>\
    <|start|>assistant <|channel|>commentary to=demo.echo <|constrain|>harmony-script<|message|>\
    {\"steps\":[\
    {\"type\":\"extract-input\",\"vars\":{\"text\":\"$input.text\"}},\
    {\"type\":\"tool-call\",\"recipient\":\"demo.echo\",\"channel\":\"commentary\",\
    \"args\":{\"text\":\"$vars.text\"},\"save_as\":\"toolResult\"},\
    {\"type\":\"assistant-message\",\"channel\":\"final\",\
    \"contentTemplate\":\"The tool said: {{vars.toolResult}}\"}\
    ]}<|end|>";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== Harmonic Basic Usage Example ===\n");

    // Assemble an engine with in-memory stores and the default registry
    let app = EngineAppBuilder::new(Arc::new(StaticChat)).build();
    let registry = app.tools.as_ref().expect("default registry");
    registry.register(Arc::new(EchoTool)).await;

    // Register the envelope from its wire form
    let script_id = app
        .service
        .register_script(Some("demo-script".to_string()), WIRE)
        .await?;
    println!("Registered script: {}", script_id);

    // Start a session
    let session = app.service.start_session(&script_id, CiMap::new()).await?;
    println!("Started session: {}\n", session.session_id);

    // Drive the two context messages
    for _ in 0..2 {
        let outcome = app
            .service
            .execute_next(&session.session_id, ExecuteOptions::default())
            .await?;
        println!(
            "Executed message {} -> {:?}",
            outcome.executed_index, outcome.record.status
        );
    }

    // Execute the script with per-call input
    let mut input = Map::new();
    input.insert("text".to_string(), json!("hello from the example"));
    let outcome = app
        .service
        .execute_next(
            &session.session_id,
            ExecuteOptions::default().with_input(input),
        )
        .await?;

    println!(
        "Executed message {} -> {:?} (session {:?})\n",
        outcome.executed_index, outcome.record.status, outcome.session.status
    );

    if let Some(artifact) = outcome.session.artifacts.get("final") {
        println!("Final reply: {}", artifact.content);
    }
    if let Some(result) = outcome.session.vars.get("toolResult") {
        println!("Tool result var: {}", result);
    }

    println!("\n--- Transcript ---");
    for entry in &outcome.session.transcript {
        println!("[{}] {}", entry.role, entry.content);
    }

    println!("\n=== Example Complete ===");
    Ok(())
}
