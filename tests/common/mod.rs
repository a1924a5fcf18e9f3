//! Common test utilities for integration tests
//!
//! Provides shared fixtures, helpers, and test utilities used across
//! multiple integration test files.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};

use reqforge::adapters::documents::FsDocumentSource;
use reqforge::adapters::oracle::ScriptedOracle;
use reqforge::domain::errors::DeliveryError;
use reqforge::domain::models::{Config, ProgressEvent, ProgressPayload};
use reqforge::domain::ports::{DocumentSet, EventSubscriber};
use reqforge::services::{EventBroadcastHub, RoleInstructions, StageOrchestrator};

pub const BRIEF: &str = "brief.md";
pub const BRIEF_TEXT: &str = "# Portal\n\
Customers must be able to reset their password from the login page.\n\
Support staff review flagged accounts every morning.\n";
pub const QUOTE: &str = "Customers must be able to reset their password from the login page.";

/// Setup test logging
///
/// Initializes tracing subscriber for test output.
pub fn setup_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// The single-document corpus used by most scenarios.
pub fn documents() -> DocumentSet {
    let mut docs = DocumentSet::new();
    docs.insert(BRIEF.to_string(), BRIEF_TEXT.to_string());
    docs
}

/// A requirement entry that passes every deterministic check.
pub fn cited_requirement() -> Value {
    json!({
        "title": "Password reset",
        "description": "Customers can reset their password from the login page",
        "type": "functional",
        "priority": "high",
        "stakeholders": ["Customer"],
        "citations": [{ "text": QUOTE, "document": BRIEF }]
    })
}

/// A requirement entry with no citation, which always fails traceability.
pub fn uncited_requirement() -> Value {
    json!({
        "title": "Account review",
        "description": "Support staff review flagged accounts",
        "stakeholders": ["Support"]
    })
}

/// A reply usable both as a draft reply and as a fix reply.
pub fn drafting_reply(requirement: Value) -> Value {
    json!({
        "requirements": [requirement.clone()],
        "hypotheses": [],
        "requirement": requirement
    })
}

/// A verifying reply reporting one critical semantic finding and nothing
/// else.
pub fn critical_semantic_reply() -> Value {
    json!({
        "semantic_issues": [{
            "severity": "critical",
            "description": "The citation does not support the requirement"
        }],
        "atomicity_issues": [],
        "numerical_issues": []
    })
}

pub fn config(max_iterations: u32, acceptance_threshold: u32) -> Config {
    let mut config = Config::default();
    config.pipeline.max_iterations = max_iterations;
    config.pipeline.acceptance_threshold = acceptance_threshold;
    config.retry.max_attempts = 1;
    config
}

pub fn orchestrator(
    oracle: Arc<ScriptedOracle>,
    hub: Arc<EventBroadcastHub>,
    config: &Config,
) -> StageOrchestrator {
    StageOrchestrator::new(
        oracle,
        Arc::new(FsDocumentSource::new()),
        hub,
        config,
        RoleInstructions::default(),
    )
}

/// Subscriber that records every event it receives.
#[derive(Default)]
pub struct Recorder {
    events: Mutex<Vec<ProgressEvent>>,
}

impl Recorder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn kinds(&self) -> Vec<&'static str> {
        self.events().iter().map(ProgressEvent::kind).collect()
    }

    /// `overall_progress` of every `progress_update`, in order.
    pub fn overall_progress(&self) -> Vec<u8> {
        self.events()
            .into_iter()
            .filter_map(|e| match e.payload {
                ProgressPayload::ProgressUpdate(p) => Some(p.overall_progress),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl EventSubscriber for Recorder {
    async fn deliver(&self, event: &ProgressEvent) -> Result<(), DeliveryError> {
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}

/// Subscriber whose deliveries always fail.
pub struct Broken;

#[async_trait]
impl EventSubscriber for Broken {
    async fn deliver(&self, _event: &ProgressEvent) -> Result<(), DeliveryError> {
        Err(DeliveryError("connection reset".to_string()))
    }
}
