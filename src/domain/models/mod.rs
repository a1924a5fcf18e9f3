pub mod config;
pub mod progress;
pub mod requirement;

pub use config::{
    Config, DocumentConfig, LoggingConfig, OracleConfig, PipelineConfig, PromptConfig,
    RetryConfig, StageTimeouts,
};
pub use progress::{
    default_pipeline_steps, CompletionSummary, ErrorReport, PipelineProgress, PipelineStep,
    ProgressEvent, ProgressPayload, ProgressSnapshot, SessionId, StepSnapshot, StepStatus,
    StepUpdate,
};
pub use requirement::{
    AcceptanceCriterion, BusinessRequirement, Citation, CoverageMetrics, ErrorType,
    HypothesisRequirement, PipelineStage, Priority, RequirementSet, RequirementType, SetStatus,
    Severity, SourceLocation, VerificationIssue,
};
