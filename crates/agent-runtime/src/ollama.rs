//! Ollama Model
//!
//! Local inference through `ollama-rs`. Ollama chat has no native function
//! calling here, so tools use a text protocol: the catalog is rendered into
//! the system prompt and the model answers with blocks fenced as `tool`,
//! each holding one JSON object:
//!
//! ```json
//! {"tool": "get_client_history", "arguments": {"clientId": "ABC123"}}
//! ```

use std::fmt::Write as _;

use agent_core::{
    error::{AgentError, Result},
    message::{Message, Role},
    provider::{Completion, FinishReason, GenerationOptions, Model, ModelRequest, TokenUsage},
    tool::{ToolCall, ToolSchema},
};
use async_trait::async_trait;
use ollama_rs::{
    Ollama,
    generation::chat::{ChatMessage, ChatMessageResponse, MessageRole, request::ChatMessageRequest},
    models::ModelOptions as OllamaOptions,
};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::config::OllamaConfig;

const TOOL_FENCE: &str = "```tool";
const FENCE: &str = "```";

/// Connection to an Ollama server
#[derive(Clone)]
pub struct OllamaBackend {
    client: Ollama,
    config: OllamaConfig,
}

impl OllamaBackend {
    /// Create from configuration
    pub fn from_config(config: OllamaConfig) -> Self {
        Self {
            client: Ollama::new(&config.host, config.port),
            config,
        }
    }

    /// Create with default localhost settings
    pub fn localhost() -> Self {
        Self::from_config(OllamaConfig::default())
    }

    pub fn default_model(&self) -> &str {
        &self.config.default_model
    }

    pub fn model(&self, name: &str) -> OllamaModel {
        OllamaModel {
            client: self.client.clone(),
            model: name.to_owned(),
        }
    }
}

impl std::fmt::Debug for OllamaBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OllamaBackend")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// A named model on an Ollama server
#[derive(Clone)]
pub struct OllamaModel {
    client: Ollama,
    model: String,
}

impl OllamaModel {
    /// Build Ollama generation options
    fn build_options(opts: &GenerationOptions) -> OllamaOptions {
        OllamaOptions::default()
            .temperature(opts.temperature)
            .top_p(opts.top_p)
            .num_predict(i32::try_from(opts.max_tokens).unwrap_or(i32::MAX))
    }
}

#[async_trait]
impl Model for OllamaModel {
    fn name(&self) -> &str {
        &self.model
    }

    async fn respond(&self, request: &ModelRequest) -> Result<Completion> {
        let messages = convert_messages(request);
        let chat = ChatMessageRequest::new(self.model.clone(), messages)
            .options(Self::build_options(&request.options));

        tracing::debug!(model = %self.model, tools = request.tools.len(), "sending ollama chat");

        let response = self
            .client
            .send_chat_messages(chat)
            .await
            .map_err(|e| AgentError::ProviderUnavailable(format!("ollama: {e}")))?;

        Ok(convert_completion(response, &self.model))
    }
}

/// Convert a request to Ollama messages, folding tools into plain text
fn convert_messages(request: &ModelRequest) -> Vec<ChatMessage> {
    let mut preamble = String::new();
    if !request.tools.is_empty() {
        preamble.push_str(&tool_prompt_section(&request.tools));
    }
    if let Some(format) = &request.response_format {
        let _ = write!(
            preamble,
            "## Output Format\n\nRespond only with a JSON object matching this schema:\n{}\n",
            format.schema
        );
    }

    let mut converted = Vec::with_capacity(request.messages.len() + 1);
    let mut preamble_placed = preamble.is_empty();

    for m in &request.messages {
        let message = match m.role {
            Role::System if !preamble_placed => {
                preamble_placed = true;
                ChatMessage::new(MessageRole::System, format!("{}\n\n{}", m.content, preamble))
            }
            Role::System => ChatMessage::new(MessageRole::System, m.content.clone()),
            Role::User => ChatMessage::new(MessageRole::User, m.content.clone()),
            Role::Assistant => ChatMessage::new(MessageRole::Assistant, render_assistant(m)),
            // Tools appear as user context
            Role::Tool => ChatMessage::new(
                MessageRole::User,
                format!(
                    "[Tool '{}' returned]\n{}",
                    m.name.as_deref().unwrap_or("tool"),
                    m.content
                ),
            ),
        };
        converted.push(message);
    }

    if !preamble_placed {
        converted.insert(0, ChatMessage::new(MessageRole::System, preamble));
    }
    converted
}

fn render_assistant(message: &Message) -> String {
    let mut text = message.content.clone();
    for call in &message.tool_calls {
        if !text.is_empty() {
            text.push('\n');
        }
        let block = json!({ "tool": call.name, "arguments": call.arguments });
        let _ = write!(text, "{TOOL_FENCE}\n{block}\n{FENCE}");
    }
    text
}

/// Describe the tool catalog and the call syntax for the system prompt
pub fn tool_prompt_section(tools: &[ToolSchema]) -> String {
    let mut prompt = String::from("## Available Tools\n\n");
    prompt.push_str("You can use the following tools by responding with a JSON block:\n\n");
    prompt.push_str(
        "```tool\n{\"tool\": \"tool_name\", \"arguments\": {\"arg\": \"value\"}}\n```\n\n",
    );
    prompt.push_str(
        "Use one block per call. Answer in plain text once you have what you need.\n\n",
    );

    for schema in tools {
        let _ = writeln!(prompt, "### {}", schema.name);
        let _ = writeln!(prompt, "{}", schema.description);

        if let Some(properties) = schema.parameters["properties"].as_object() {
            if !properties.is_empty() {
                prompt.push_str("**Parameters:**\n");
                let required = schema.parameters["required"].as_array();
                for (name, property) in properties {
                    let is_required =
                        required.is_some_and(|r| r.iter().any(|v| v == name.as_str()));
                    let _ = writeln!(
                        prompt,
                        "- `{}` ({}){}: {}",
                        name,
                        property["type"].as_str().unwrap_or("any"),
                        if is_required { " (required)" } else { "" },
                        property["description"].as_str().unwrap_or_default()
                    );
                }
            }
        }
        prompt.push('\n');
    }

    prompt
}

#[derive(Deserialize)]
struct TextToolCall {
    #[serde(alias = "name")]
    tool: String,
    #[serde(default)]
    arguments: Value,
}

/// Split model text into prose and fenced tool calls
pub fn parse_tool_calls(content: &str) -> (String, Vec<ToolCall>) {
    let mut prose = String::new();
    let mut calls = Vec::new();
    let mut rest = content;

    while let Some(start) = rest.find(TOOL_FENCE) {
        let after_marker = &rest[start + TOOL_FENCE.len()..];
        let Some(end) = after_marker.find(FENCE) else {
            break;
        };

        let json_str = after_marker[..end].trim();
        match serde_json::from_str::<TextToolCall>(json_str) {
            Ok(call) => {
                prose.push_str(&rest[..start]);
                let arguments = if call.arguments.is_null() { json!({}) } else { call.arguments };
                calls.push(ToolCall::new(call.tool, arguments));
            }
            // Not a call; keep the block as text
            Err(_) => prose.push_str(&rest[..start + TOOL_FENCE.len() + end + FENCE.len()]),
        }
        rest = &after_marker[end + FENCE.len()..];
    }
    prose.push_str(rest);

    (prose.trim().to_owned(), calls)
}

/// Convert Ollama response to agent completion
fn convert_completion(response: ChatMessageResponse, model: &str) -> Completion {
    let (content, tool_calls) = parse_tool_calls(&response.message.content);
    let finish_reason = if tool_calls.is_empty() {
        FinishReason::Stop
    } else {
        FinishReason::ToolUse
    };

    Completion {
        content,
        tool_calls,
        model: model.to_owned(),
        usage: response.final_data.as_ref().map(|d| {
            let prompt = u32::try_from(d.prompt_eval_count).unwrap_or(u32::MAX);
            let completion = u32::try_from(d.eval_count).unwrap_or(u32::MAX);
            TokenUsage {
                prompt_tokens: prompt,
                completion_tokens: completion,
                total_tokens: prompt.saturating_add(completion),
            }
        }),
        finish_reason: Some(finish_reason),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agent_core::tool::ParameterSchema;

    fn history_schema() -> ToolSchema {
        ToolSchema::object(
            "get_client_history",
            "Return historical data about the client",
            vec![ParameterSchema::string("clientId", "Client identifier").required()],
        )
    }

    #[test]
    fn test_config_defaults() {
        let backend = OllamaBackend::localhost();
        assert_eq!(backend.default_model(), "llama3.2");
        assert_eq!(backend.model("mistral").name(), "mistral");
    }

    #[test]
    fn test_prompt_section_lists_tools() {
        let section = tool_prompt_section(&[history_schema()]);
        assert!(section.contains("### get_client_history"));
        assert!(section.contains("- `clientId` (string) (required): Client identifier"));
    }

    #[test]
    fn test_parse_fenced_calls() {
        let text = concat!(
            "Let me check.\n",
            "```tool\n",
            r#"{"tool": "get_client_history", "arguments": {"clientId": "ABC123"}}"#,
            "\n```\n",
            "```tool\n",
            r#"{"name": "greeting_agent", "arguments": {"input": "hi"}}"#,
            "\n```",
        );
        let (prose, calls) = parse_tool_calls(text);
        assert_eq!(prose, "Let me check.");
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].name, "get_client_history");
        assert_eq!(calls[0].arguments, json!({"clientId": "ABC123"}));
        assert_eq!(calls[1].name, "greeting_agent");
        assert!(!calls[0].id.is_empty());
    }

    #[test]
    fn test_plain_text_has_no_calls() {
        let (prose, calls) = parse_tool_calls("Hello Barry! How can I help?");
        assert_eq!(prose, "Hello Barry! How can I help?");
        assert!(calls.is_empty());

        let (prose, calls) = parse_tool_calls("```tool\nnot json\n```");
        assert!(calls.is_empty());
        assert!(prose.contains("not json"));
    }

    #[test]
    fn test_message_conversion() {
        let mut request = ModelRequest::new(vec![
            Message::system("You are helpful."),
            Message::user("Hello"),
            Message::assistant_tool_calls(
                "",
                vec![ToolCall::new("get_client_history", json!({"clientId": "A"}))],
            ),
            Message::tool("summary", Some("call_1".into())).with_name("get_client_history"),
        ]);
        request.tools = vec![history_schema()];

        let converted = convert_messages(&request);
        assert_eq!(converted.len(), 4);
        assert!(converted[0].content.contains("## Available Tools"));
        assert!(converted[2].content.starts_with("```tool"));
        assert!(converted[3].content.starts_with("[Tool 'get_client_history' returned]"));
    }
}
