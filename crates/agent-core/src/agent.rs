//! Agent Definitions
//!
//! An [`Agent`] is pure configuration: instructions, tools, input guardrails
//! and an optional output schema. It is built once, never mutated by a run,
//! and shared freely across concurrent runs.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::context::RunContext;
use crate::error::{AgentError, Result};
use crate::guardrail::Guardrail;
use crate::provider::{GenerationOptions, ResponseFormat};
use crate::schema::CompiledSchema;
use crate::tool::{ParameterSchema, Tool, ToolOutput, ToolRegistry, ToolSchema};

/// Structured-result contract for an agent's final answer
#[derive(Clone, Debug)]
pub struct OutputSchema {
    name: String,
    schema: CompiledSchema,
}

impl OutputSchema {
    pub fn new(name: impl Into<String>, schema: Value) -> Result<Self> {
        let name = name.into();
        let schema = CompiledSchema::compile(schema)
            .map_err(|e| AgentError::Config(format!("output schema '{name}': {e}")))?;
        Ok(Self { name, schema })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The format sent to the model
    pub fn response_format(&self) -> ResponseFormat {
        ResponseFormat {
            name: self.name.clone(),
            schema: self.schema.source().clone(),
        }
    }

    /// Parse a final answer and check it against the schema.
    ///
    /// A surrounding markdown code fence is tolerated.
    pub fn parse(&self, content: &str) -> Result<Value> {
        let body = strip_code_fence(content);
        let value: Value = serde_json::from_str(body).map_err(|e| {
            AgentError::OutputValidation(format!(
                "'{}' expects JSON output: {}",
                self.name, e
            ))
        })?;

        self.schema.validate(&value).map_err(|reason| {
            AgentError::OutputValidation(format!("'{}': {}", self.name, reason))
        })?;

        Ok(value)
    }
}

fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop an optional language tag on the opening fence
    let rest = match rest.split_once('\n') {
        Some((tag, body)) if !tag.trim_start().starts_with(['{', '[']) => body,
        Some(_) => rest,
        None => rest.trim_start_matches(|c: char| c.is_ascii_alphanumeric()),
    };
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}

/// A named bundle of instructions, tools and guardrails
pub struct Agent<C> {
    name: String,
    instructions: String,
    tools: ToolRegistry<C>,
    input_guardrails: Vec<Arc<dyn Guardrail<C>>>,
    output_schema: Option<OutputSchema>,
    model: Option<String>,
    generation: GenerationOptions,
}

impl<C: Send + Sync + 'static> Agent<C> {
    pub fn builder(name: impl Into<String>) -> AgentBuilder<C> {
        AgentBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn instructions(&self) -> &str {
        &self.instructions
    }

    /// Get the tool registry
    pub fn tools(&self) -> &ToolRegistry<C> {
        &self.tools
    }

    pub fn input_guardrails(&self) -> &[Arc<dyn Guardrail<C>>] {
        &self.input_guardrails
    }

    pub fn output_schema(&self) -> Option<&OutputSchema> {
        self.output_schema.as_ref()
    }

    /// Model-name hint passed to the provider
    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    pub fn generation(&self) -> &GenerationOptions {
        &self.generation
    }

    /// Expose this agent as a tool of another agent.
    ///
    /// The tool's name and description are chosen by the caller and are
    /// independent of this agent's own name.
    pub fn as_tool(
        self: &Arc<Self>,
        tool_name: impl Into<String>,
        tool_description: impl Into<String>,
    ) -> AgentTool<C> {
        AgentTool {
            name: tool_name.into(),
            description: tool_description.into(),
            agent: Arc::clone(self),
        }
    }
}

impl<C> std::fmt::Debug for Agent<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("name", &self.name)
            .field("tools", &self.tools.len())
            .field("input_guardrails", &self.input_guardrails.len())
            .field("output_schema", &self.output_schema.as_ref().map(OutputSchema::name))
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

/// A whole agent invoked as a tool.
///
/// Executing it runs the wrapped agent nested under the caller's runner with
/// the same shared context. Failures of the nested run, including guardrail
/// rejections, surface as tool errors, never as an empty result.
pub struct AgentTool<C> {
    name: String,
    description: String,
    agent: Arc<Agent<C>>,
}

#[async_trait]
impl<C: Send + Sync + 'static> Tool<C> for AgentTool<C> {
    fn schema(&self) -> ToolSchema {
        ToolSchema::object(
            self.name.clone(),
            self.description.clone(),
            vec![ParameterSchema::string("input", "The request to hand to this agent").required()],
        )
    }

    async fn execute(&self, arguments: Value, ctx: &RunContext<C>) -> Result<ToolOutput> {
        let input = arguments
            .get("input")
            .and_then(Value::as_str)
            .ok_or_else(|| AgentError::ToolValidation("Missing input".into()))?;

        tracing::debug!(tool = %self.name, agent = %self.agent.name(), "delegating to agent");

        let result = ctx.runner().run_nested(&self.agent, input, ctx).await?;
        Ok(ToolOutput::Text(result.final_output.to_string()))
    }
}

/// Builder for Agent configuration
pub struct AgentBuilder<C> {
    name: String,
    instructions: String,
    tools: Vec<Arc<dyn Tool<C>>>,
    input_guardrails: Vec<Arc<dyn Guardrail<C>>>,
    output_schema: Option<(String, Value)>,
    model: Option<String>,
    generation: GenerationOptions,
}

impl<C: Send + Sync + 'static> AgentBuilder<C> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            instructions: String::new(),
            tools: Vec::new(),
            input_guardrails: Vec::new(),
            output_schema: None,
            model: None,
            generation: GenerationOptions::default(),
        }
    }

    #[must_use]
    pub fn instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = instructions.into();
        self
    }

    #[must_use]
    pub fn tool<T: Tool<C> + 'static>(mut self, tool: T) -> Self {
        self.tools.push(Arc::new(tool));
        self
    }

    #[must_use]
    pub fn shared_tool(mut self, tool: Arc<dyn Tool<C>>) -> Self {
        self.tools.push(tool);
        self
    }

    /// Add another agent as a tool
    #[must_use]
    pub fn agent_tool(
        self,
        agent: &Arc<Agent<C>>,
        tool_name: impl Into<String>,
        tool_description: impl Into<String>,
    ) -> Self {
        self.tool(agent.as_tool(tool_name, tool_description))
    }

    #[must_use]
    pub fn guardrail<G: Guardrail<C> + 'static>(mut self, guardrail: G) -> Self {
        self.input_guardrails.push(Arc::new(guardrail));
        self
    }

    #[must_use]
    pub fn shared_guardrail(mut self, guardrail: Arc<dyn Guardrail<C>>) -> Self {
        self.input_guardrails.push(guardrail);
        self
    }

    #[must_use]
    pub fn output_schema(mut self, name: impl Into<String>, schema: Value) -> Self {
        self.output_schema = Some((name.into(), schema));
        self
    }

    #[must_use]
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    #[must_use]
    pub fn temperature(mut self, temp: f32) -> Self {
        self.generation.temperature = temp;
        self
    }

    #[must_use]
    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.generation.max_tokens = max_tokens;
        self
    }

    /// Validate and build. Duplicate tool or guardrail names are rejected.
    pub fn build(self) -> Result<Agent<C>> {
        if self.name.trim().is_empty() {
            return Err(AgentError::Config("agent name must not be empty".into()));
        }

        let mut tools = ToolRegistry::new();
        for tool in self.tools {
            tools
                .register_arc(tool)
                .map_err(|e| AgentError::Config(format!("agent '{}': {}", self.name, e)))?;
        }

        let mut seen = HashSet::new();
        for guardrail in &self.input_guardrails {
            if !seen.insert(guardrail.name().to_owned()) {
                return Err(AgentError::Config(format!(
                    "agent '{}': duplicate guardrail name: {}",
                    self.name,
                    guardrail.name()
                )));
            }
        }

        let output_schema = self
            .output_schema
            .map(|(name, schema)| OutputSchema::new(name, schema))
            .transpose()?;

        Ok(Agent {
            name: self.name,
            instructions: self.instructions,
            tools,
            input_guardrails: self.input_guardrails,
            output_schema,
            model: self.model,
            generation: self.generation,
        })
    }
}

/// Output schema used by classifier agents that return `{flag, reasoning}`
pub fn verdict_schema(flag: &str) -> Value {
    json!({
        "type": "object",
        "properties": {
            flag: { "type": "boolean" },
            "reasoning": { "type": "string" }
        },
        "required": [flag, "reasoning"]
    })
}
