//! Tool System
//!
//! Extensible tool framework for agent capabilities.
//! Tools are registered on an agent at construction time and invoked by the
//! run loop when the model asks for them. Arguments are validated against the
//! tool's JSON schema before [`Tool::execute`] is ever reached.

use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::context::RunContext;
use crate::error::{AgentError, ErrorKind, Result};
use crate::schema::CompiledSchema;

/// Tool call request from the model
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Call ID for correlating the result
    #[serde(default)]
    pub id: String,

    /// Tool identifier
    pub name: String,

    /// Arguments as a JSON value
    #[serde(default = "empty_arguments")]
    pub arguments: Value,
}

fn empty_arguments() -> Value {
    Value::Object(Map::new())
}

impl ToolCall {
    /// Create a call with a freshly generated ID
    pub fn new(name: impl Into<String>, arguments: Value) -> Self {
        Self {
            id: new_call_id(),
            name: name.into(),
            arguments,
        }
    }

    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }
}

/// Generate a tool-call ID for backends that do not supply one
pub fn new_call_id() -> String {
    format!("call_{}", uuid::Uuid::new_v4().simple())
}

/// What a tool hands back on success
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ToolOutput {
    Text(String),
    Structured(Value),
}

impl ToolOutput {
    /// Render for the model's message history
    pub fn into_content(self) -> String {
        match self {
            Self::Text(text) => text,
            Self::Structured(value) => value.to_string(),
        }
    }
}

impl From<String> for ToolOutput {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<&str> for ToolOutput {
    fn from(text: &str) -> Self {
        Self::Text(text.to_owned())
    }
}

impl From<Value> for ToolOutput {
    fn from(value: Value) -> Self {
        Self::Structured(value)
    }
}

/// Result from tool execution, as fed back to the model
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolResult {
    /// Tool that was called
    pub name: String,

    /// Call ID (if provided in request)
    pub id: Option<String>,

    /// Whether execution succeeded
    pub success: bool,

    /// Output (success message or error)
    pub output: String,

    /// Structured data (if applicable)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,

    /// Error class when `success` is false
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
}

impl ToolResult {
    pub fn success(name: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id: None,
            success: true,
            output: output.into(),
            data: None,
            error_kind: None,
        }
    }

    pub fn failure(name: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id: None,
            success: false,
            output: error.into(),
            data: None,
            error_kind: Some(ErrorKind::ToolExecutionError),
        }
    }

    /// Failure carrying the class of the underlying error
    pub fn from_error(name: impl Into<String>, error: &AgentError) -> Self {
        let mut result = Self::failure(name, error.to_string());
        result.error_kind = Some(error.kind());
        result
    }

    /// Success built from a tool's output
    pub fn from_output(name: impl Into<String>, output: ToolOutput) -> Self {
        match output {
            ToolOutput::Text(text) => Self::success(name, text),
            ToolOutput::Structured(value) => {
                Self::success(name, value.to_string()).with_data(value)
            }
        }
    }

    #[must_use]
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Text placed in the tool message of the conversation
    pub fn feedback(&self) -> String {
        if self.success {
            self.output.clone()
        } else {
            format!("Error: tool '{}' failed: {}", self.name, self.output)
        }
    }
}

/// Parameter definition, used to build a tool's JSON schema
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ParameterSchema {
    /// Parameter name
    pub name: String,

    /// JSON Schema type (string, number, boolean, object, array)
    #[serde(rename = "type")]
    pub param_type: String,

    /// Human-readable description
    pub description: String,

    /// Whether this parameter is required
    #[serde(default)]
    pub required: bool,

    /// Default value if not provided
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,

    /// Enum of allowed values
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<Value>>,
}

impl ParameterSchema {
    pub fn new(
        name: impl Into<String>,
        param_type: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            param_type: param_type.into(),
            description: description.into(),
            required: false,
            default: None,
            enum_values: None,
        }
    }

    pub fn string(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(name, "string", description)
    }

    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    #[must_use]
    pub fn default_value(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    #[must_use]
    pub fn one_of(mut self, values: Vec<Value>) -> Self {
        self.enum_values = Some(values);
        self
    }

    fn to_property(&self) -> Value {
        let mut property = json!({
            "type": self.param_type,
            "description": self.description,
        });
        if let Some(default) = &self.default {
            property["default"] = default.clone();
        }
        if let Some(values) = &self.enum_values {
            property["enum"] = Value::Array(values.clone());
        }
        property
    }
}

/// Tool definition schema (for model function calling)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolSchema {
    /// Unique tool identifier
    pub name: String,

    /// Human-readable description (shown to the model)
    pub description: String,

    /// JSON schema for the arguments object
    pub parameters: Value,
}

impl ToolSchema {
    /// Object schema built from parameter definitions.
    /// Unknown properties are rejected.
    pub fn object(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: Vec<ParameterSchema>,
    ) -> Self {
        let properties: Map<String, Value> = parameters
            .iter()
            .map(|p| (p.name.clone(), p.to_property()))
            .collect();
        let required: Vec<&str> = parameters
            .iter()
            .filter(|p| p.required)
            .map(|p| p.name.as_str())
            .collect();

        Self {
            name: name.into(),
            description: description.into(),
            parameters: json!({
                "type": "object",
                "properties": properties,
                "required": required,
                "additionalProperties": false,
            }),
        }
    }

    /// Schema from a raw JSON schema value
    pub fn with_parameters(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: Value,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }
}

/// Tool trait - implement to add new capabilities
///
/// `C` is the run's shared context type.
#[async_trait]
pub trait Tool<C>: Send + Sync {
    /// Get the tool's schema for model function calling
    fn schema(&self) -> ToolSchema;

    /// Execute the tool with arguments already validated against the schema
    async fn execute(&self, arguments: Value, ctx: &RunContext<C>) -> Result<ToolOutput>;
}

/// A tool backed by an async closure
pub struct FunctionTool<C, F> {
    schema: ToolSchema,
    handler: F,
    _context: PhantomData<fn(C)>,
}

impl<C, F, Fut> FunctionTool<C, F>
where
    F: Fn(Value, RunContext<C>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<ToolOutput>> + Send,
{
    pub fn new(schema: ToolSchema, handler: F) -> Self {
        Self {
            schema,
            handler,
            _context: PhantomData,
        }
    }
}

#[async_trait]
impl<C, F, Fut> Tool<C> for FunctionTool<C, F>
where
    C: Send + Sync + 'static,
    F: Fn(Value, RunContext<C>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<ToolOutput>> + Send + 'static,
{
    fn schema(&self) -> ToolSchema {
        self.schema.clone()
    }

    async fn execute(&self, arguments: Value, ctx: &RunContext<C>) -> Result<ToolOutput> {
        (self.handler)(arguments, ctx.clone()).await
    }
}

struct RegisteredTool<C> {
    schema: ToolSchema,
    validator: CompiledSchema,
    tool: Arc<dyn Tool<C>>,
}

impl<C> Clone for RegisteredTool<C> {
    fn clone(&self) -> Self {
        Self {
            schema: self.schema.clone(),
            validator: self.validator.clone(),
            tool: Arc::clone(&self.tool),
        }
    }
}

/// Ordered registry of an agent's tools, unique by name
pub struct ToolRegistry<C> {
    tools: Vec<RegisteredTool<C>>,
}

impl<C> Default for ToolRegistry<C> {
    fn default() -> Self {
        Self { tools: Vec::new() }
    }
}

impl<C> Clone for ToolRegistry<C> {
    fn clone(&self) -> Self {
        Self {
            tools: self.tools.clone(),
        }
    }
}

impl<C> ToolRegistry<C> {
    /// All tool schemas, in registration order
    pub fn schemas(&self) -> Vec<ToolSchema> {
        self.tools.iter().map(|t| t.schema.clone()).collect()
    }

    /// Get tool names
    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.schema.name.as_str()).collect()
    }

    /// Number of registered tools
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl<C: Send + Sync + 'static> ToolRegistry<C> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new tool
    pub fn register<T: Tool<C> + 'static>(&mut self, tool: T) -> Result<()> {
        self.register_arc(Arc::new(tool))
    }

    /// Register a shared tool.
    ///
    /// Fails on a duplicate name or a parameter schema that does not compile.
    pub fn register_arc(&mut self, tool: Arc<dyn Tool<C>>) -> Result<()> {
        let schema = tool.schema();

        if schema.name.trim().is_empty() {
            return Err(AgentError::Config("tool name must not be empty".into()));
        }
        if self.tools.iter().any(|t| t.schema.name == schema.name) {
            return Err(AgentError::Config(format!(
                "duplicate tool name: {}",
                schema.name
            )));
        }

        let validator = CompiledSchema::compile(schema.parameters.clone()).map_err(|e| {
            AgentError::Config(format!("tool '{}': {}", schema.name, e))
        })?;

        self.tools.push(RegisteredTool {
            schema,
            validator,
            tool,
        });
        Ok(())
    }

    /// Get a tool by name
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool<C>>> {
        self.find(name).map(|t| Arc::clone(&t.tool))
    }

    fn find(&self, name: &str) -> Option<&RegisteredTool<C>> {
        self.tools.iter().find(|t| t.schema.name == name)
    }

    /// Check a call's arguments against the tool's schema
    pub fn validate(&self, call: &ToolCall) -> Result<()> {
        let registered = self
            .find(&call.name)
            .ok_or_else(|| AgentError::ToolNotFound(call.name.clone()))?;

        registered.validator.validate(&call.arguments).map_err(|reason| {
            AgentError::ToolValidation(format!(
                "invalid arguments for '{}': {}",
                call.name, reason
            ))
        })
    }

    /// Execute a tool call. Invalid arguments never reach the tool.
    pub async fn execute(&self, call: &ToolCall, ctx: &RunContext<C>) -> Result<ToolOutput> {
        let tool = self
            .get(&call.name)
            .ok_or_else(|| AgentError::ToolNotFound(call.name.clone()))?;

        // Validate first
        self.validate(call)?;

        // Execute
        tool.execute(call.arguments.clone(), ctx).await
    }
}
