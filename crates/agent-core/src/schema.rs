//! JSON Schema helpers shared by tool-argument and output validation.

use std::sync::Arc;

use jsonschema::{Draft, JSONSchema};
use serde_json::Value;

use crate::error::{AgentError, Result};

/// A compiled JSON schema, cheap to clone
#[derive(Clone)]
pub struct CompiledSchema {
    source: Value,
    compiled: Arc<JSONSchema>,
}

impl CompiledSchema {
    /// Compile a Draft 7 schema. An invalid schema is a configuration error.
    pub fn compile(source: Value) -> Result<Self> {
        let compiled = JSONSchema::options()
            .with_draft(Draft::Draft7)
            .compile(&source)
            .map_err(|e| AgentError::Config(format!("invalid JSON schema: {e}")))?;

        Ok(Self {
            source,
            compiled: Arc::new(compiled),
        })
    }

    /// The schema as written
    pub fn source(&self) -> &Value {
        &self.source
    }

    /// Validate an instance, rendering every violation.
    ///
    /// Messages are sorted so the same instance always yields the same text.
    pub fn validate(&self, instance: &Value) -> std::result::Result<(), String> {
        let result = self.compiled.validate(instance);
        let Err(errors) = result else {
            return Ok(());
        };

        let mut messages: Vec<String> = errors
            .map(|e| {
                let path = e.instance_path.to_string();
                if path.is_empty() {
                    e.to_string()
                } else {
                    format!("{path}: {e}")
                }
            })
            .collect();
        messages.sort();
        messages.dedup();

        Err(messages.join("; "))
    }
}

impl std::fmt::Debug for CompiledSchema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledSchema")
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}
