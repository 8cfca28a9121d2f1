use serde::{Deserialize, Serialize};

/// Per-request context shared by every agent, tool and guardrail of a run
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserContext {
    pub client_id: String,
}

impl UserContext {
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
        }
    }
}
