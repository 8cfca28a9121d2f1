//! Demo History
//!
//! For testing and demo purposes. Every client resolves to the same profile.

use async_trait::async_trait;

use super::{ClientHistory, ClientSummary};
use crate::error::{AssistError, Result};

/// Static history source
#[derive(Clone, Debug)]
pub struct DemoHistory {
    profile: ClientSummary,
}

impl Default for DemoHistory {
    fn default() -> Self {
        Self::new()
    }
}

impl DemoHistory {
    pub fn new() -> Self {
        Self {
            profile: ClientSummary {
                name: "Barry Doe".into(),
                age: 30,
                gender: "Male".into(),
                occupation: "Software Engineer".into(),
                family: "2 children".into(),
                previous_interactions:
                    "2 weeks ago about needing help with stress management and anxiety.".into(),
            },
        }
    }

    /// Serve a different profile
    pub fn with_profile(profile: ClientSummary) -> Self {
        Self { profile }
    }
}

#[async_trait]
impl ClientHistory for DemoHistory {
    async fn summary(&self, client_id: &str) -> Result<ClientSummary> {
        if client_id.trim().is_empty() {
            return Err(AssistError::UnknownClient(client_id.to_owned()));
        }
        Ok(self.profile.clone())
    }

    fn name(&self) -> &str {
        "demo"
    }
}
