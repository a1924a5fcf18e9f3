//! Port trait definitions (Hexagonal Architecture)
//!
//! Async trait interfaces the pipeline depends on:
//! - GenerationOracle: text generation for the drafting and verifying roles
//! - DocumentSource: text extraction from input files
//! - EventSubscriber: delivery of progress events to a client
//! - ReviewHook: optional stage 4 review

pub mod document_source;
pub mod oracle;
pub mod review;
pub mod subscriber;

pub use document_source::{DocumentSet, DocumentSource};
pub use oracle::{GenerationOracle, OracleRequest, Role};
pub use review::{NoopReview, ReviewHook};
pub use subscriber::EventSubscriber;
