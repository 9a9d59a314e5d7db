use std::fs;
use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Value};
use vitrine_agent::assembly::build_runtime;
use vitrine_agent::dispatcher::TurnContext;
use vitrine_agent::tools::RawToolCall;
use vitrine_core::config::{AppConfig, LlmProvider, LoadOptions};
use vitrine_core::domain::conversation::ConversationId;
use vitrine_db::InMemoryStateStore;

use crate::commands::{block_on_runtime, CommandResult};

/// A scripted conversation. Each turn is either a free-text `message`
/// (planned by the keyword planner) or an explicit list of `calls`.
#[derive(Debug, Deserialize)]
pub struct ReplayScript {
    #[serde(default = "default_conversation_id")]
    pub conversation_id: String,
    #[serde(default)]
    pub zipcode: Option<String>,
    #[serde(default)]
    pub adult_confirmed: bool,
    pub turns: Vec<ScriptedTurn>,
}

#[derive(Debug, Deserialize)]
pub struct ScriptedTurn {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub calls: Vec<ScriptedCall>,
    /// Overrides the script-level flag from this turn on.
    #[serde(default)]
    pub adult_confirmed: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct ScriptedCall {
    pub name: String,
    #[serde(default)]
    pub arguments: Value,
}

impl ScriptedCall {
    fn to_raw(&self) -> RawToolCall {
        match &self.arguments {
            Value::String(encoded) => RawToolCall::from_encoded(self.name.clone(), encoded),
            Value::Null => RawToolCall::new(self.name.clone(), json!({})),
            arguments => RawToolCall::new(self.name.clone(), arguments.clone()),
        }
    }
}

fn default_conversation_id() -> String {
    "replay".to_string()
}

pub fn run(script_path: &Path) -> CommandResult {
    let raw = match fs::read_to_string(script_path) {
        Ok(raw) => raw,
        Err(error) => {
            return CommandResult::failure(
                "replay",
                "script_read",
                format!("could not read `{}`: {error}", script_path.display()),
                6,
            );
        }
    };
    let script: ReplayScript = match serde_json::from_str(&raw) {
        Ok(script) => script,
        Err(error) => {
            return CommandResult::failure("replay", "script_parse", format!("invalid replay script: {error}"), 6);
        }
    };

    let mut config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "replay",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };
    // Replays are deterministic: no model and no live payment provider.
    config.llm.provider = LlmProvider::Offline;
    config.llm.jailbreak_screen = false;
    config.payment.access_token = None;

    let runtime = match block_on_runtime("replay") {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };

    match runtime.block_on(replay(&config, &script)) {
        Ok(transcript) => CommandResult::success_with_data(
            "replay",
            format!("replayed {} turns for `{}`", script.turns.len(), script.conversation_id),
            Some(transcript),
        ),
        Err(failure) => failure,
    }
}

async fn replay(config: &AppConfig, script: &ReplayScript) -> Result<Value, CommandResult> {
    let agent = build_runtime(config, Arc::new(InMemoryStateStore::default()))
        .map_err(|error| CommandResult::failure("replay", "runtime_assembly", error.to_string(), 7))?;

    let id = ConversationId(script.conversation_id.clone());
    let mut context = TurnContext { zipcode: script.zipcode.clone(), adult_confirmed: script.adult_confirmed };
    let mut turns = Vec::with_capacity(script.turns.len());

    for turn in &script.turns {
        if let Some(adult_confirmed) = turn.adult_confirmed {
            context.adult_confirmed = adult_confirmed;
        }

        let (input, reply) = match &turn.message {
            Some(message) => (json!({"message": message}), agent.handle_turn(message, &id, &context).await),
            None => {
                let calls: Vec<RawToolCall> = turn.calls.iter().map(ScriptedCall::to_raw).collect();
                let input = json!({"calls": calls});
                (input, agent.dispatch(&id, &calls, &context).await)
            }
        };
        turns.push(json!({
            "input": input,
            "outcome": reply.outcome,
            "fragments": reply.fragments,
        }));
    }

    let cart = agent
        .dispatcher()
        .cart()
        .get_summary(&id)
        .await
        .map_err(|error| CommandResult::failure("replay", "state_store", error.to_string(), 4))?;

    Ok(json!({
        "conversation_id": script.conversation_id,
        "turns": turns,
        "final_cart": cart,
    }))
}
