//! Generation oracle port - interface for the text-generation backend.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::errors::OracleError;

/// Which role an oracle request is made for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Drafts, improves and fixes requirements
    Drafting,
    /// Checks requirements against the source documents
    Verifying,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Drafting => "drafting",
            Self::Verifying => "verifying",
        }
    }
}

/// A single request to the oracle.
#[derive(Debug, Clone, PartialEq)]
pub struct OracleRequest {
    pub role: Role,
    /// Standing instructions for the role
    pub role_instructions: String,
    /// Task-specific content
    pub payload: String,
    pub temperature: f32,
    /// Ask for a JSON object reply
    pub json_reply: bool,
}

impl OracleRequest {
    pub fn json(role: Role, role_instructions: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            role,
            role_instructions: role_instructions.into(),
            payload: payload.into(),
            temperature: 0.1,
            json_reply: true,
        }
    }

    pub const fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }
}

/// A text-generation backend.
///
/// In JSON reply mode the reply is the parsed object; otherwise it is a JSON
/// string holding the raw text.
#[async_trait]
pub trait GenerationOracle: Send + Sync {
    /// Get the oracle name for logging.
    fn name(&self) -> &'static str;

    /// Submit one request.
    async fn submit(&self, request: &OracleRequest) -> Result<serde_json::Value, OracleError>;
}
