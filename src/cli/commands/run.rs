//! Implementation of the `reqforge run` command.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use tracing::{info, warn};

use crate::adapters::documents::FsDocumentSource;
use crate::adapters::oracle::OpenAiOracle;
use crate::cli::output::{output, CommandOutput, TableFormatter, TerminalProgress};
use crate::domain::models::{Config, RequirementSet, SessionId};
use crate::services::{
    DocumentInput, EventBroadcastHub, PipelineRequest, RoleInstructions, StageOrchestrator,
};

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Documents to extract requirements from (.txt, .md)
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// Name of the requirement set
    #[arg(short, long)]
    pub name: Option<String>,

    /// Description of the requirement set
    #[arg(short, long)]
    pub description: Option<String>,

    /// Write the finished requirement set as JSON to this path
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
pub struct RunOutput {
    pub session_id: SessionId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_path: Option<PathBuf>,
    pub requirement_set: RequirementSet,
}

impl CommandOutput for RunOutput {
    fn to_human(&self) -> String {
        let set = &self.requirement_set;
        let formatter = TableFormatter::new();
        let mut lines = vec![
            format!("{} ({})", set.name, set.id),
            format!(
                "Status: {}  Iterations: {}  Requirements: {}  Hypotheses: {}",
                set.status(),
                set.iteration_count(),
                set.requirements.len(),
                set.hypotheses.len()
            ),
        ];
        if let Some(metrics) = &set.metrics {
            lines.push(format!(
                "Precision: {:.2}  Recall: {:.2}  Traceability: {:.2}  Completion: {:.2}",
                metrics.precision,
                metrics.recall,
                metrics.traceability_score,
                metrics.completion_rate
            ));
        }
        if !set.requirements.is_empty() {
            lines.push(String::new());
            lines.push(formatter.format_requirements(&set.requirements));
        }
        if !set.verification_issues.is_empty() {
            lines.push(String::new());
            lines.push(format!(
                "{} open issue(s):",
                set.verification_issues.len()
            ));
            lines.push(formatter.format_issues(&set.verification_issues));
        }
        if let Some(path) = &self.output_path {
            lines.push(String::new());
            lines.push(format!("Requirement set written to {}", path.display()));
        }
        lines.join("\n")
    }
}

pub async fn execute(args: RunArgs, config: &Config, json_mode: bool) -> Result<()> {
    let oracle = OpenAiOracle::new(config.oracle.clone())
        .context("Failed to create the generation oracle client")?;
    if !oracle.has_api_key() {
        anyhow::bail!("No API key configured. Set OPENAI_API_KEY or oracle.api_key.");
    }

    let hub = Arc::new(EventBroadcastHub::new());
    let session_id = SessionId::new();
    if !json_mode {
        hub.connect(session_id, Arc::new(TerminalProgress::new()))
            .await;
    }

    let orchestrator = Arc::new(StageOrchestrator::new(
        Arc::new(oracle),
        Arc::new(FsDocumentSource::new()),
        Arc::clone(&hub),
        config,
        RoleInstructions::load(&config.prompts),
    ));

    let mut request = PipelineRequest::new(DocumentInput::Paths(args.files));
    request.name = args.name;
    request.description = args.description;

    info!(session_id = %session_id, "starting pipeline session");
    let (mut handle, cancel) = orchestrator.spawn_session(request, session_id);
    let joined = tokio::select! {
        joined = &mut handle => joined,
        _ = tokio::signal::ctrl_c() => {
            warn!(session_id = %session_id, "interrupt received, cancelling session");
            cancel.cancel();
            handle.await
        }
    };
    let result = joined.context("Pipeline task failed to complete")?;

    match result {
        Ok(set) => {
            if let Some(path) = &args.output {
                write_set(path, &set).await?;
            }
            output(
                &RunOutput {
                    session_id,
                    output_path: args.output,
                    requirement_set: set,
                },
                json_mode,
            );
            Ok(())
        }
        Err(err) => {
            if let Some(path) = &args.output {
                write_set(path, err.requirement_set()).await?;
            }
            Err(err.into())
        }
    }
}

async fn write_set(path: &Path, set: &RequirementSet) -> Result<()> {
    let json = serde_json::to_string_pretty(set).context("Failed to serialize requirement set")?;
    tokio::fs::write(path, json)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))
}
