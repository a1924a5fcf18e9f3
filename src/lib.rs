//! reqforge - business requirement extraction with a verification loop
//!
//! A drafting role proposes requirements from source documents, a verifying
//! role checks them against the text, and a controller iterates between the
//! two until the set converges or the iteration budget runs out. Progress
//! of every run is published per session to any number of subscribers.
//!
//! # Architecture
//!
//! This crate follows Clean Architecture / Hexagonal Architecture principles:
//!
//! - **Domain Layer** (`domain`): Requirement and progress models, errors, port traits
//! - **Service Layer** (`services`): Roles, verification loop, stage orchestrator, event hub
//! - **Adapters** (`adapters`): Reference oracle and document source implementations
//! - **Infrastructure Layer** (`infrastructure`): Configuration loading and logging
//! - **CLI Layer** (`cli`): Command-line interface
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use reqforge::adapters::{documents::FsDocumentSource, oracle::OpenAiOracle};
//! use reqforge::services::{DocumentInput, EventBroadcastHub, PipelineRequest, StageOrchestrator};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = reqforge::ConfigLoader::load()?;
//!     let orchestrator = Arc::new(StageOrchestrator::new(
//!         Arc::new(OpenAiOracle::new(config.oracle.clone())?),
//!         Arc::new(FsDocumentSource::new()),
//!         Arc::new(EventBroadcastHub::new()),
//!         &config,
//!         Default::default(),
//!     ));
//!     let request = PipelineRequest::new(DocumentInput::Paths(vec!["brief.md".into()]));
//!     let (handle, _cancel) = orchestrator.spawn_session(request, Default::default());
//!     let set = handle.await??;
//!     println!("{} requirements, {}", set.requirements.len(), set.status());
//!     Ok(())
//! }
//! ```

pub mod adapters;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export commonly used types for convenience
pub use domain::errors::{DomainError, OracleError, PipelineError};
pub use domain::models::{
    BusinessRequirement, Config, HypothesisRequirement, PipelineProgress, ProgressEvent,
    RequirementSet, SessionId, SetStatus, VerificationIssue,
};
pub use domain::ports::{DocumentSource, EventSubscriber, GenerationOracle, ReviewHook};
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use services::{EventBroadcastHub, PipelineRequest, StageOrchestrator};
