//! Configuration files driving real runs.

mod common;

use std::io::Write;
use std::sync::Arc;

use tempfile::NamedTempFile;
use tokio_util::sync::CancellationToken;

use common::*;
use reqforge::adapters::oracle::ScriptedOracle;
use reqforge::domain::models::{SessionId, SetStatus};
use reqforge::domain::ports::Role;
use reqforge::infrastructure::logging::{LogConfig, LogFormat};
use reqforge::services::{DocumentInput, EventBroadcastHub, PipelineRequest};
use reqforge::ConfigLoader;

fn config_file(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[tokio::test]
async fn test_iteration_budget_from_file_bounds_the_loop() {
    let file = config_file(
        "pipeline:\n  max_iterations: 2\n  acceptance_threshold: 2\nretry:\n  max_attempts: 1\n",
    );
    let config = temp_env::with_vars_unset(["REQFORGE_PIPELINE__MAX_ITERATIONS"], || {
        ConfigLoader::load_from_file(file.path()).unwrap()
    });

    let oracle = Arc::new(
        ScriptedOracle::new()
            .with_fallback(Role::Drafting, Ok(drafting_reply(uncited_requirement()))),
    );
    let orchestrator = orchestrator(
        Arc::clone(&oracle),
        Arc::new(EventBroadcastHub::new()),
        &config,
    );
    let set = orchestrator
        .run(
            PipelineRequest::new(DocumentInput::Texts(documents())),
            SessionId::new(),
            CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(set.iteration_count(), 2);
    assert_eq!(set.status(), SetStatus::Rejected);
    assert_eq!(oracle.calls_for(Role::Drafting), 3);
}

#[test]
fn test_environment_supplies_api_key() {
    let file = config_file("oracle:\n  model: gpt-4o\n");
    temp_env::with_vars([("REQFORGE_ORACLE__API_KEY", Some("sk-test"))], || {
        let config = ConfigLoader::load_from_file(file.path()).unwrap();
        assert_eq!(config.oracle.model, "gpt-4o");
        assert_eq!(config.oracle.api_key.as_deref(), Some("sk-test"));
    });
}

#[test]
fn test_invalid_environment_override_is_rejected() {
    let file = config_file("pipeline:\n  max_iterations: 4\n");
    temp_env::with_vars([("REQFORGE_PIPELINE__MAX_ITERATIONS", Some("0"))], || {
        let err = ConfigLoader::load_from_file(file.path()).unwrap_err();
        assert!(err.to_string().contains("max_iterations"));
    });
}

#[test]
fn test_logging_section_maps_to_log_config() {
    let file = config_file("logging:\n  level: warn\n  format: json\n  rotation: hourly\n");
    let config = ConfigLoader::load_from_file(file.path()).unwrap();
    let log_config = LogConfig::from(&config.logging);

    assert_eq!(log_config.level, "warn");
    assert_eq!(log_config.format, LogFormat::Json);
}
