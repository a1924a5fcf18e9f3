//! Stage orchestrator.
//!
//! Runs one session through the fixed stage sequence: document resolution,
//! drafting (1), self-improvement (2), the verification loop (3 to 5) and
//! the final decision (6). Every stage works on the same aggregate; a
//! failure that no role fallback absorbs ends the run with status `error`.

use std::path::PathBuf;
use std::sync::Arc;

use serde_json::json;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use crate::domain::errors::{DomainError, DomainResult, PipelineError};
use crate::domain::models::{
    CompletionSummary, Config, PipelineConfig, PipelineStage, RequirementSet, SessionId,
    SetStatus, StepStatus, StepUpdate,
};
use crate::domain::ports::{DocumentSet, DocumentSource, GenerationOracle, ReviewHook};
use crate::services::broadcast_hub::EventBroadcastHub;
use crate::services::drafting::{Draft, DraftingRole};
use crate::services::oracle_gateway::OracleGateway;
use crate::services::progress_tracker::ProgressTracker;
use crate::services::prompts::RoleInstructions;
use crate::services::retry::RetryPolicy;
use crate::services::verification_loop::{LoopOutcome, VerificationLoop, LOOP_STEP};
use crate::services::verifying::VerifyingRole;

/// Step ids reported by the orchestrator, in run order.
pub const DOC_PARSING_STEP: &str = "doc_parsing";
pub const DRAFTING_STEP: &str = "stage1";
pub const IMPROVEMENT_STEP: &str = "stage2";
pub const DECISION_STEP: &str = "stage6";
pub const COMPLETION_STEP: &str = "completion";

/// Where a run's documents come from.
#[derive(Debug, Clone)]
pub enum DocumentInput {
    /// Files resolved through the configured document source
    Paths(Vec<PathBuf>),
    /// Texts already extracted, keyed by document name
    Texts(DocumentSet),
}

/// Input of one pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineRequest {
    pub documents: DocumentInput,
    pub name: Option<String>,
    pub description: Option<String>,
}

impl PipelineRequest {
    /// Request with no name or description; the set gets a timestamped name.
    pub const fn new(documents: DocumentInput) -> Self {
        Self {
            documents,
            name: None,
            description: None,
        }
    }

    /// Name given to the resulting set.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Free-text description stored on the set.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Final status for a set whose verification is done.
pub fn decide(set: &RequirementSet) -> SetStatus {
    if set.critical_error_count() == 0 {
        SetStatus::Accepted
    } else {
        SetStatus::Rejected
    }
}

/// A stage error tagged with the progress step it happened in.
struct StageFailure {
    step: &'static str,
    error: DomainError,
}

fn at(step: &'static str) -> impl FnOnce(DomainError) -> StageFailure {
    move |error| StageFailure { step, error }
}

fn ensure_active(cancel: &CancellationToken, step: &'static str) -> Result<(), StageFailure> {
    if cancel.is_cancelled() {
        Err(StageFailure {
            step,
            error: DomainError::Cancelled,
        })
    } else {
        Ok(())
    }
}

/// Sequences the stages of a run and reports progress through the hub.
pub struct StageOrchestrator {
    source: Arc<dyn DocumentSource>,
    drafting: Arc<DraftingRole>,
    verification_loop: VerificationLoop,
    hub: Arc<EventBroadcastHub>,
    pipeline: PipelineConfig,
}

impl StageOrchestrator {
    /// Wire the roles, gateway and loop from configuration.
    pub fn new(
        oracle: Arc<dyn GenerationOracle>,
        source: Arc<dyn DocumentSource>,
        hub: Arc<EventBroadcastHub>,
        config: &Config,
        instructions: RoleInstructions,
    ) -> Self {
        let gateway = Arc::new(
            OracleGateway::new(oracle, RetryPolicy::from_config(&config.retry))
                .with_stage_timeouts(config.pipeline.stage_timeouts.clone()),
        );
        let drafting = Arc::new(
            DraftingRole::new(Arc::clone(&gateway), instructions.drafting)
                .with_excerpt_chars(config.documents.excerpt_chars)
                .with_temperature(config.oracle.temperature),
        );
        let verifying = Arc::new(
            VerifyingRole::new(gateway, instructions.verifying)
                .with_temperature(config.oracle.temperature),
        );
        Self::from_roles(source, drafting, verifying, hub, config.pipeline.clone())
    }

    /// Assemble an orchestrator from prebuilt roles.
    ///
    /// Stage 4 is enabled according to `pipeline.enable_stage4_review`,
    /// with the no-op hook until [`with_review`](Self::with_review) installs
    /// another one.
    ///
    /// # Arguments
    ///
    /// * `source` - Resolves document paths
    /// * `drafting` - Stages 1, 2 and 5
    /// * `verifying` - Stage 3
    /// * `hub` - Receives every progress event
    /// * `pipeline` - Iteration budget, threshold and review flag
    pub fn from_roles(
        source: Arc<dyn DocumentSource>,
        drafting: Arc<DraftingRole>,
        verifying: Arc<VerifyingRole>,
        hub: Arc<EventBroadcastHub>,
        pipeline: PipelineConfig,
    ) -> Self {
        let verification_loop = VerificationLoop::new(
            Arc::clone(&drafting),
            verifying,
            pipeline.max_iterations,
            pipeline.acceptance_threshold,
        )
        .with_review_enabled(pipeline.enable_stage4_review);
        Self {
            source,
            drafting,
            verification_loop,
            hub,
            pipeline,
        }
    }

    /// Install a stage 4 review hook in place of the no-op default. It
    /// only runs when `enable_stage4_review` is set.
    pub fn with_review(mut self, review: Arc<dyn ReviewHook>) -> Self {
        self.verification_loop = self.verification_loop.with_review(review);
        self
    }

    /// Run one session to completion.
    ///
    /// On success the set is `accepted` or `rejected`. On failure the error
    /// carries the set with status `error`, and an `error` event has been
    /// published for the session.
    ///
    /// # Arguments
    ///
    /// * `request` - Documents plus optional name and description
    /// * `session_id` - Session the progress events are addressed to
    /// * `cancel` - Stops the run at its next suspension point
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Document resolution fails ([`PipelineError::Fatal`])
    /// - `cancel` fires ([`PipelineError::Cancelled`])
    /// - A stage fails in a way no role fallback absorbs
    #[instrument(skip(self, request, cancel), fields(session_id = %session_id))]
    pub async fn run(
        &self,
        request: PipelineRequest,
        session_id: SessionId,
        cancel: CancellationToken,
    ) -> Result<RequirementSet, PipelineError> {
        let tracker = ProgressTracker::new(
            session_id,
            Arc::clone(&self.hub),
            self.pipeline.max_iterations,
        );
        tracker.start().await;

        let mut set = RequirementSet::new(request.name, request.description, Vec::new());
        info!(set_id = %set.id, name = %set.name, "pipeline started");

        match self
            .run_stages(request.documents, &mut set, &tracker, &cancel)
            .await
        {
            Ok(outcome) => {
                tracker
                    .complete(CompletionSummary {
                        success: true,
                        requirements_count: set.requirements.len(),
                        hypotheses_count: set.hypotheses.len(),
                        status: set.status(),
                        iterations: outcome.iterations,
                    })
                    .await;
                info!(
                    set_id = %set.id,
                    status = %set.status(),
                    requirements = set.requirements.len(),
                    hypotheses = set.hypotheses.len(),
                    iterations = outcome.iterations,
                    "pipeline finished"
                );
                Ok(set)
            }
            Err(failure) => Err(Self::fail(set, failure, &tracker).await),
        }
    }

    /// Run the session on the runtime. Cancelling the returned token stops
    /// the run at its next suspension point.
    pub fn spawn_session(
        self: &Arc<Self>,
        request: PipelineRequest,
        session_id: SessionId,
    ) -> (
        JoinHandle<Result<RequirementSet, PipelineError>>,
        CancellationToken,
    ) {
        let cancel = CancellationToken::new();
        let orchestrator = Arc::clone(self);
        let token = cancel.clone();
        let handle =
            tokio::spawn(async move { orchestrator.run(request, session_id, token).await });
        (handle, cancel)
    }

    async fn run_stages(
        &self,
        input: DocumentInput,
        set: &mut RequirementSet,
        tracker: &ProgressTracker,
        cancel: &CancellationToken,
    ) -> Result<LoopOutcome, StageFailure> {
        // Document resolution
        ensure_active(cancel, DOC_PARSING_STEP)?;
        tracker
            .update_step(
                DOC_PARSING_STEP,
                StepUpdate::new(StepStatus::InProgress)
                    .percent(25)
                    .message("Resolving documents"),
            )
            .await;
        let documents = self
            .resolve_documents(input, cancel)
            .await
            .map_err(at(DOC_PARSING_STEP))?;
        set.source_documents = documents.keys().cloned().collect();
        set.touch();
        tracker
            .update_step(
                DOC_PARSING_STEP,
                StepUpdate::new(StepStatus::Completed)
                    .percent(100)
                    .message(format!("{} document(s) resolved", documents.len()))
                    .details(json!({ "documents": set.source_documents })),
            )
            .await;

        // Stage 1
        ensure_active(cancel, DRAFTING_STEP)?;
        set.enter_stage(PipelineStage::DRAFTING);
        tracker
            .update_step(
                DRAFTING_STEP,
                StepUpdate::new(StepStatus::InProgress)
                    .percent(25)
                    .message("Drafting requirements"),
            )
            .await;
        let draft = self
            .drafting
            .draft(&documents, cancel)
            .await
            .map_err(at(DRAFTING_STEP))?;
        tracker
            .update_step(
                DRAFTING_STEP,
                StepUpdate::new(StepStatus::InProgress)
                    .percent(75)
                    .message("Recording draft"),
            )
            .await;
        set.requirements = draft.requirements;
        set.hypotheses = draft.hypotheses;
        set.touch();
        tracker
            .update_step(DRAFTING_STEP, Self::counts_update(set, "Draft ready"))
            .await;

        // Stage 2
        ensure_active(cancel, IMPROVEMENT_STEP)?;
        set.enter_stage(PipelineStage::SELF_IMPROVEMENT);
        tracker
            .update_step(
                IMPROVEMENT_STEP,
                StepUpdate::new(StepStatus::InProgress)
                    .percent(25)
                    .message("Improving requirements"),
            )
            .await;
        let current = Draft {
            requirements: std::mem::take(&mut set.requirements),
            hypotheses: std::mem::take(&mut set.hypotheses),
        };
        let improved = self
            .drafting
            .improve(current, &documents, cancel)
            .await
            .map_err(at(IMPROVEMENT_STEP))?;
        tracker
            .update_step(
                IMPROVEMENT_STEP,
                StepUpdate::new(StepStatus::InProgress)
                    .percent(75)
                    .message("Recording improvements"),
            )
            .await;
        set.requirements = improved.requirements;
        set.hypotheses = improved.hypotheses;
        set.touch();
        tracker
            .update_step(IMPROVEMENT_STEP, Self::counts_update(set, "Improvement done"))
            .await;

        // Stages 3 to 5
        ensure_active(cancel, LOOP_STEP)?;
        let outcome = self
            .verification_loop
            .run(set, &documents, tracker, cancel)
            .await
            .map_err(at(LOOP_STEP))?;
        tracker
            .update_step(
                LOOP_STEP,
                StepUpdate::new(StepStatus::Completed)
                    .percent(100)
                    .message(format!(
                        "Loop {:?} after {} iteration(s)",
                        outcome.state, outcome.iterations
                    ))
                    .details(json!({
                        "state": outcome.state,
                        "iterations": outcome.iterations,
                        "consecutive_passes": outcome.consecutive_passes,
                    })),
            )
            .await;

        // Stage 6
        ensure_active(cancel, DECISION_STEP)?;
        set.enter_stage(PipelineStage::DECISION);
        tracker
            .update_step(
                DECISION_STEP,
                StepUpdate::new(StepStatus::InProgress)
                    .percent(25)
                    .message("Deciding"),
            )
            .await;
        let status = decide(set);
        set.transition_to(status).map_err(at(DECISION_STEP))?;
        tracker
            .update_step(
                DECISION_STEP,
                StepUpdate::new(StepStatus::Completed)
                    .percent(100)
                    .message(format!("Set {status}"))
                    .details(json!({ "critical_errors": set.critical_error_count() })),
            )
            .await;

        tracker
            .update_step(
                COMPLETION_STEP,
                StepUpdate::new(StepStatus::Completed)
                    .percent(100)
                    .message("Pipeline complete"),
            )
            .await;
        Ok(outcome)
    }

    async fn resolve_documents(
        &self,
        input: DocumentInput,
        cancel: &CancellationToken,
    ) -> DomainResult<DocumentSet> {
        match input {
            DocumentInput::Texts(texts) => Ok(texts),
            DocumentInput::Paths(paths) => {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => Err(DomainError::Cancelled),
                    resolved = self.source.resolve(&paths) => Ok(resolved?),
                }
            }
        }
    }

    fn counts_update(set: &RequirementSet, message: &str) -> StepUpdate {
        StepUpdate::new(StepStatus::Completed)
            .percent(100)
            .message(message)
            .details(json!({
                "requirements": set.requirements.len(),
                "hypotheses": set.hypotheses.len(),
            }))
    }

    async fn fail(
        mut set: RequirementSet,
        failure: StageFailure,
        tracker: &ProgressTracker,
    ) -> PipelineError {
        if let Err(err) = set.transition_to(SetStatus::Error) {
            warn!(error = %err, "could not mark set as failed");
        }
        let message = failure.error.to_string();
        error!(
            set_id = %set.id,
            stage = failure.step,
            error = %message,
            "pipeline failed"
        );
        tracker.fail(failure.step, &message).await;

        let stage = failure.step.to_string();
        let requirement_set = Box::new(set);
        match failure.error {
            DomainError::Cancelled => PipelineError::Cancelled {
                stage,
                requirement_set,
            },
            source => PipelineError::Fatal {
                stage,
                source,
                requirement_set,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::documents::FsDocumentSource;
    use crate::adapters::oracle::ScriptedOracle;
    use crate::domain::models::VerificationIssue;
    use crate::domain::ports::Role;
    use crate::services::broadcast_hub::ChannelSubscriber;
    use serde_json::json;

    fn orchestrator(oracle: ScriptedOracle) -> StageOrchestrator {
        let mut config = Config::default();
        config.retry.max_attempts = 1;
        StageOrchestrator::new(
            Arc::new(oracle),
            Arc::new(FsDocumentSource::new()),
            Arc::new(EventBroadcastHub::new()),
            &config,
            RoleInstructions::default(),
        )
    }

    fn texts() -> DocumentInput {
        let mut docs = DocumentSet::new();
        docs.insert(
            "brief.md".to_string(),
            "Users must be able to reset their password.".to_string(),
        );
        DocumentInput::Texts(docs)
    }

    fn cited_requirement() -> serde_json::Value {
        json!({
            "title": "Password reset",
            "description": "Users can reset their password",
            "stakeholders": ["User"],
            "citations": [{
                "text": "Users must be able to reset their password.",
                "document": "brief.md"
            }]
        })
    }

    #[test]
    fn test_decide() {
        let mut set = RequirementSet::new(None, None, Vec::new());
        assert_eq!(decide(&set), SetStatus::Accepted);
        set.verification_issues
            .push(VerificationIssue::critical("BR_1", "uncited"));
        assert_eq!(decide(&set), SetStatus::Rejected);
    }

    #[tokio::test]
    async fn test_clean_run_is_accepted() {
        let oracle = ScriptedOracle::new();
        oracle.push(Role::Drafting, Ok(json!({ "requirements": [cited_requirement()] })));
        oracle.push(Role::Drafting, Ok(json!({ "requirements": [cited_requirement()] })));

        let set = orchestrator(oracle)
            .run(
                PipelineRequest::new(texts()).with_name("Reset"),
                SessionId::new(),
                CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(set.name, "Reset");
        assert_eq!(set.status(), SetStatus::Accepted);
        assert_eq!(set.requirements.len(), 1);
        assert_eq!(set.iteration_count(), 3);
        assert_eq!(set.pipeline_stage(), PipelineStage::DECISION);
        assert_eq!(set.source_documents, vec!["brief.md".to_string()]);
    }

    #[tokio::test]
    async fn test_missing_document_is_fatal() {
        let hub = Arc::new(EventBroadcastHub::new());
        let session = SessionId::new();
        let (subscriber, mut rx) = ChannelSubscriber::new(64);
        hub.connect(session, Arc::new(subscriber)).await;

        let orchestrator = StageOrchestrator::new(
            Arc::new(ScriptedOracle::new()),
            Arc::new(FsDocumentSource::new()),
            Arc::clone(&hub),
            &Config::default(),
            RoleInstructions::default(),
        );
        let err = orchestrator
            .run(
                PipelineRequest::new(DocumentInput::Paths(vec![PathBuf::from(
                    "/nonexistent/brief.md",
                )])),
                session,
                CancellationToken::new(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::Fatal { .. }));
        assert_eq!(err.stage(), DOC_PARSING_STEP);
        assert_eq!(err.requirement_set().status(), SetStatus::Error);

        let mut kinds = Vec::new();
        while let Ok(event) = rx.try_recv() {
            kinds.push(event.kind());
        }
        assert_eq!(kinds.last(), Some(&"error"));
        assert!(!kinds.contains(&"complete"));
    }

    /// Replaces every finding with a single justification gap and records
    /// the stage the set was in when it ran.
    struct Downgrade {
        stages: std::sync::Mutex<Vec<PipelineStage>>,
    }

    #[async_trait::async_trait]
    impl ReviewHook for Downgrade {
        async fn review(&self, set: &RequirementSet) -> DomainResult<Vec<VerificationIssue>> {
            self.stages.lock().unwrap().push(set.pipeline_stage());
            Ok(set
                .requirements
                .iter()
                .map(|r| {
                    VerificationIssue::gap(
                        &r.id,
                        crate::domain::models::Severity::Medium,
                        "Reviewer asks for the reset channel",
                    )
                })
                .collect())
        }
    }

    fn uncited_requirement() -> serde_json::Value {
        json!({
            "title": "Account review",
            "description": "Support reviews flagged accounts",
            "stakeholders": ["Support"]
        })
    }

    fn review_config(enabled: bool) -> Config {
        let mut config = Config::default();
        config.retry.max_attempts = 1;
        config.pipeline.max_iterations = 2;
        config.pipeline.acceptance_threshold = 1;
        config.pipeline.enable_stage4_review = enabled;
        config
    }

    #[test]
    fn test_review_flag_reaches_the_loop() {
        for enabled in [true, false] {
            let orchestrator = StageOrchestrator::new(
                Arc::new(ScriptedOracle::new()),
                Arc::new(FsDocumentSource::new()),
                Arc::new(EventBroadcastHub::new()),
                &review_config(enabled),
                RoleInstructions::default(),
            );
            assert_eq!(orchestrator.verification_loop.review_enabled(), enabled);
        }
    }

    #[tokio::test]
    async fn test_review_hook_rewrites_issues_before_fixing() {
        let oracle = Arc::new(ScriptedOracle::new().with_fallback(
            Role::Drafting,
            Ok(json!({
                "requirements": [uncited_requirement()],
                "requirement": uncited_requirement()
            })),
        ));
        let hook = Arc::new(Downgrade {
            stages: std::sync::Mutex::new(Vec::new()),
        });

        let set = StageOrchestrator::new(
            oracle.clone(),
            Arc::new(FsDocumentSource::new()),
            Arc::new(EventBroadcastHub::new()),
            &review_config(true),
            RoleInstructions::default(),
        )
        .with_review(hook.clone())
        .run(PipelineRequest::new(texts()), SessionId::new(), CancellationToken::new())
        .await
        .unwrap();

        assert_eq!(*hook.stages.lock().unwrap(), vec![PipelineStage::REVIEW]);
        assert_eq!(set.status(), SetStatus::Rejected);

        // draft, improve, then one gap fix built from the reviewed list
        let fixes: Vec<_> = oracle
            .requests()
            .into_iter()
            .filter(|r| r.role == Role::Drafting)
            .skip(2)
            .collect();
        assert_eq!(fixes.len(), 1);
        assert!(fixes[0].payload.contains("Reviewer asks for the reset channel"));
        assert!(fixes[0].payload.contains("weak justification"));
        assert!(!fixes[0].payload.contains("no citations"));
    }

    #[tokio::test]
    async fn test_review_hook_is_skipped_when_disabled() {
        let oracle = Arc::new(ScriptedOracle::new().with_fallback(
            Role::Drafting,
            Ok(json!({
                "requirements": [uncited_requirement()],
                "requirement": uncited_requirement()
            })),
        ));
        let hook = Arc::new(Downgrade {
            stages: std::sync::Mutex::new(Vec::new()),
        });

        StageOrchestrator::new(
            oracle.clone(),
            Arc::new(FsDocumentSource::new()),
            Arc::new(EventBroadcastHub::new()),
            &review_config(false),
            RoleInstructions::default(),
        )
        .with_review(hook.clone())
        .run(PipelineRequest::new(texts()), SessionId::new(), CancellationToken::new())
        .await
        .unwrap();

        assert!(hook.stages.lock().unwrap().is_empty());
        let fix = oracle
            .requests()
            .into_iter()
            .filter(|r| r.role == Role::Drafting)
            .nth(2)
            .expect("critical fix request");
        assert!(fix.payload.contains("no citations"));
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = orchestrator(ScriptedOracle::new())
            .run(PipelineRequest::new(texts()), SessionId::new(), cancel)
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::Cancelled { .. }));
        assert_eq!(err.requirement_set().status(), SetStatus::Error);
    }
}
