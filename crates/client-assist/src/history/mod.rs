//! Client History
//!
//! Sources of what is known about a client from previous interactions.

mod demo;

pub use demo::DemoHistory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Summary of a client, as handed to the model
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientSummary {
    pub name: String,
    pub age: u32,
    pub gender: String,
    pub occupation: String,
    pub family: String,
    pub previous_interactions: String,
}

impl std::fmt::Display for ClientSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Name: {}", self.name)?;
        writeln!(f, "Age: {}", self.age)?;
        writeln!(f, "Gender: {}", self.gender)?;
        writeln!(f, "Occupation: {}", self.occupation)?;
        writeln!(f, "Family: {}", self.family)?;
        write!(f, "Previous interactions: {}", self.previous_interactions)
    }
}

/// Client history source (Strategy pattern)
///
/// Implement this for each backing store: CRM, database, summarizing model.
#[async_trait]
pub trait ClientHistory: Send + Sync {
    /// Look up the summary for a client
    async fn summary(&self, client_id: &str) -> Result<ClientSummary>;

    /// Source name
    fn name(&self) -> &str;
}
