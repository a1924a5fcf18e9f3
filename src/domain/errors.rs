//! Domain errors for the reqforge pipeline.

use thiserror::Error;

use crate::domain::models::requirement::{RequirementSet, SetStatus};

/// Domain-level errors that can occur while building a requirement set.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Invalid pipeline stage: {0} (must be between 1 and 6)")]
    InvalidStage(u8),

    #[error("Invalid status transition from {from} to {to}")]
    InvalidStatusTransition { from: SetStatus, to: SetStatus },

    #[error("Iteration count cannot move from {current} to {requested}")]
    IterationRegression { current: u32, requested: u32 },

    #[error("Iteration {requested} exceeds the configured maximum of {max}")]
    IterationLimit { requested: u32, max: u32 },

    #[error(transparent)]
    Document(#[from] DocumentError),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Operation cancelled")]
    Cancelled,
}

pub type DomainResult<T> = Result<T, DomainError>;

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        Self::SerializationError(err.to_string())
    }
}

/// Failures reported by a generation oracle.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum OracleError {
    /// Network trouble, timeouts, rate limiting or server-side failures.
    #[error("Transient oracle failure: {0}")]
    Transient(String),

    /// The oracle rejected the credentials.
    #[error("Oracle authentication failed: {0}")]
    Auth(String),

    /// The reply could not be parsed or did not match the expected schema.
    #[error("Malformed oracle reply: {0}")]
    Malformed(String),
}

impl OracleError {
    /// Whether the failure may succeed on a later attempt.
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    /// Whether retrying is pointless.
    pub const fn is_permanent(&self) -> bool {
        !self.is_transient()
    }
}

/// Outcome of an oracle call routed through the gateway.
#[derive(Debug, Error)]
pub enum OracleCallError {
    #[error(transparent)]
    Oracle(#[from] OracleError),

    #[error("Oracle call cancelled")]
    Cancelled,
}

/// Failures while turning input files into text.
#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("Unsupported document format: {0}")]
    UnsupportedFormat(String),

    #[error("Failed to parse {name}: {reason}")]
    ParseFailure { name: String, reason: String },

    #[error("Document not found: {0}")]
    NotFound(String),
}

/// A subscriber could not accept an event.
#[derive(Debug, Error)]
#[error("Event delivery failed: {0}")]
pub struct DeliveryError(pub String);

/// Fatal outcome of a pipeline run. Both variants carry the aggregate as it
/// stood when the run stopped, with its status set to `error`.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Pipeline failed during {stage}: {source}")]
    Fatal {
        stage: String,
        #[source]
        source: DomainError,
        requirement_set: Box<RequirementSet>,
    },

    #[error("Pipeline cancelled during {stage}")]
    Cancelled {
        stage: String,
        requirement_set: Box<RequirementSet>,
    },
}

impl PipelineError {
    /// The requirement set snapshot taken when the run stopped.
    pub fn requirement_set(&self) -> &RequirementSet {
        match self {
            Self::Fatal {
                requirement_set, ..
            }
            | Self::Cancelled {
                requirement_set, ..
            } => requirement_set,
        }
    }

    /// Progress step that was running when the run stopped.
    pub fn stage(&self) -> &str {
        match self {
            Self::Fatal { stage, .. } | Self::Cancelled { stage, .. } => stage,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_oracle_error_classification() {
        assert!(OracleError::Transient("503".into()).is_transient());
        assert!(OracleError::Auth("bad key".into()).is_permanent());
        assert!(OracleError::Malformed("not json".into()).is_permanent());
    }

    #[test]
    fn test_pipeline_error_exposes_snapshot() {
        let set = RequirementSet::new(Some("rfp".into()), None, vec![]);
        let err = PipelineError::Cancelled {
            stage: "stage2".into(),
            requirement_set: Box::new(set),
        };
        assert_eq!(err.requirement_set().name, "rfp");
        assert_eq!(err.stage(), "stage2");
        assert_eq!(err.to_string(), "Pipeline cancelled during stage2");
    }
}
