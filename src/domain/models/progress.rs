//! Per-session progress model and the events published to subscribers.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::requirement::SetStatus;

/// Identifier of one pipeline session, chosen by the caller that starts it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for SessionId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Status of a single progress step (also used for the run as a whole).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Failed,
    Skipped,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }
}

/// One user-visible step of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineStep {
    pub step_id: String,
    pub name: String,
    pub description: String,
    pub status: StepStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub progress_percent: u8,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PipelineStep {
    pub fn new(
        step_id: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            step_id: step_id.into(),
            name: name.into(),
            description: description.into(),
            status: StepStatus::Pending,
            started_at: None,
            completed_at: None,
            progress_percent: 0,
            message: String::new(),
            details: None,
            error: None,
        }
    }

    /// Apply an update, stamping start/completion times on status changes.
    fn apply(&mut self, update: StepUpdate, now: DateTime<Utc>) {
        if update.status == StepStatus::InProgress && self.started_at.is_none() {
            self.started_at = Some(now);
        }
        if matches!(update.status, StepStatus::Completed | StepStatus::Failed)
            && self.completed_at.is_none()
        {
            self.completed_at = Some(now);
        }
        self.status = update.status;
        if let Some(percent) = update.percent {
            self.progress_percent = percent.min(100);
        }
        if let Some(message) = update.message {
            self.message = message;
        }
        if update.details.is_some() {
            self.details = update.details;
        }
        if update.error.is_some() {
            self.error = update.error;
        }
    }
}

/// Changes to apply to one step.
#[derive(Debug, Clone, PartialEq)]
pub struct StepUpdate {
    pub status: StepStatus,
    pub percent: Option<u8>,
    pub message: Option<String>,
    pub details: Option<serde_json::Value>,
    pub error: Option<String>,
}

impl StepUpdate {
    pub const fn new(status: StepStatus) -> Self {
        Self {
            status,
            percent: None,
            message: None,
            details: None,
            error: None,
        }
    }

    pub const fn percent(mut self, percent: u8) -> Self {
        self.percent = Some(percent);
        self
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

/// Snapshot of a session's progress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineProgress {
    pub session_id: SessionId,
    pub total_steps: usize,
    /// 1-based index of the step being worked on
    pub current_step: usize,
    pub overall_progress: u8,
    pub status: StepStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
    pub steps: Vec<PipelineStep>,
    pub current_iteration: u32,
    pub max_iterations: u32,
}

impl PipelineProgress {
    pub fn new(session_id: SessionId, steps: Vec<PipelineStep>, max_iterations: u32) -> Self {
        Self {
            session_id,
            total_steps: steps.len(),
            current_step: 0,
            overall_progress: 0,
            status: StepStatus::Pending,
            started_at: None,
            updated_at: Utc::now(),
            steps,
            current_iteration: 0,
            max_iterations,
        }
    }

    pub fn step(&self, step_id: &str) -> Option<&PipelineStep> {
        self.steps.iter().find(|s| s.step_id == step_id)
    }

    /// Update one step and recompute the derived fields. Returns `false` when
    /// the step id is unknown, in which case nothing changes.
    pub fn update_step(&mut self, step_id: &str, update: StepUpdate) -> bool {
        let now = Utc::now();
        let Some(step) = self.steps.iter_mut().find(|s| s.step_id == step_id) else {
            return false;
        };
        step.apply(update, now);
        self.updated_at = now;
        self.recalculate();
        true
    }

    /// Recompute overall percent and the current step index.
    pub fn recalculate(&mut self) {
        if self.steps.is_empty() {
            return;
        }
        let sum: usize = self
            .steps
            .iter()
            .map(|s| usize::from(s.progress_percent))
            .sum();
        let overall = (sum / self.steps.len()).min(100);
        self.overall_progress = u8::try_from(overall).unwrap_or(100);

        if let Some(index) = self
            .steps
            .iter()
            .position(|s| s.status == StepStatus::InProgress)
        {
            self.current_step = index + 1;
        } else if self
            .steps
            .iter()
            .all(|s| s.status == StepStatus::Completed)
        {
            self.current_step = self.steps.len();
            self.status = StepStatus::Completed;
        }
    }

    pub fn summary(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            total_steps: self.total_steps,
            current_step: self.current_step,
            overall_progress: self.overall_progress,
            status: self.status,
            current_iteration: self.current_iteration,
            max_iterations: self.max_iterations,
        }
    }
}

// ============================================================================
// Events
// ============================================================================

/// Step fields carried by a `step_update` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepSnapshot {
    pub step_id: String,
    pub name: String,
    pub status: StepStatus,
    pub progress_percent: u8,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&PipelineStep> for StepSnapshot {
    fn from(step: &PipelineStep) -> Self {
        Self {
            step_id: step.step_id.clone(),
            name: step.name.clone(),
            status: step.status,
            progress_percent: step.progress_percent,
            message: step.message.clone(),
            details: step.details.clone(),
            error: step.error.clone(),
        }
    }
}

/// Run-level fields carried by a `progress_update` event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub total_steps: usize,
    pub current_step: usize,
    pub overall_progress: u8,
    pub status: StepStatus,
    pub current_iteration: u32,
    pub max_iterations: u32,
}

/// Final summary carried by a `complete` event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionSummary {
    pub success: bool,
    pub requirements_count: usize,
    pub hypotheses_count: usize,
    pub status: SetStatus,
    pub iterations: u32,
}

/// Failure description carried by an `error` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorReport {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,
}

/// Event payloads, tagged by `type` with their fields under `data`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ProgressPayload {
    StepUpdate(StepSnapshot),
    ProgressUpdate(ProgressSnapshot),
    Complete(CompletionSummary),
    Error(ErrorReport),
}

impl ProgressPayload {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::StepUpdate(_) => "step_update",
            Self::ProgressUpdate(_) => "progress_update",
            Self::Complete(_) => "complete",
            Self::Error(_) => "error",
        }
    }
}

/// An event addressed to one session.
///
/// Serializes as `{"type": ..., "session_id": ..., "timestamp": ..., "data": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressEvent {
    pub session_id: SessionId,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub payload: ProgressPayload,
}

impl ProgressEvent {
    pub fn new(session_id: SessionId, payload: ProgressPayload) -> Self {
        Self {
            session_id,
            timestamp: Utc::now(),
            payload,
        }
    }

    pub fn step_update(session_id: SessionId, step: &PipelineStep) -> Self {
        Self::new(session_id, ProgressPayload::StepUpdate(step.into()))
    }

    pub fn progress_update(progress: &PipelineProgress) -> Self {
        Self::new(
            progress.session_id,
            ProgressPayload::ProgressUpdate(progress.summary()),
        )
    }

    pub fn complete(session_id: SessionId, summary: CompletionSummary) -> Self {
        Self::new(session_id, ProgressPayload::Complete(summary))
    }

    pub fn error(session_id: SessionId, error: impl Into<String>, stage: Option<String>) -> Self {
        Self::new(
            session_id,
            ProgressPayload::Error(ErrorReport {
                error: error.into(),
                stage,
            }),
        )
    }

    pub fn kind(&self) -> &'static str {
        self.payload.kind()
    }

    /// The same event addressed to another session.
    pub fn readdressed(&self, session_id: SessionId) -> Self {
        Self {
            session_id,
            ..self.clone()
        }
    }
}

/// The fixed steps every run reports, in order.
pub fn default_pipeline_steps() -> Vec<PipelineStep> {
    vec![
        PipelineStep::new(
            "doc_parsing",
            "Document parsing",
            "Resolve input documents to text",
        ),
        PipelineStep::new(
            "stage1",
            "Initial drafting",
            "Draft requirements and hypotheses from the documents",
        ),
        PipelineStep::new(
            "stage2",
            "Self-improvement",
            "Refine the draft requirements",
        ),
        PipelineStep::new(
            "verification_loop",
            "Verification loop",
            "Verify requirements and fix reported issues",
        ),
        PipelineStep::new("stage6", "Final decision", "Accept or reject the set"),
        PipelineStep::new("completion", "Completion", "Publish the final result"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn progress() -> PipelineProgress {
        PipelineProgress::new(SessionId::new(), default_pipeline_steps(), 5)
    }

    #[test]
    fn test_new_steps_start_pending() {
        assert_eq!(StepStatus::default(), StepStatus::Pending);
        let progress = progress();
        assert!(progress.steps.iter().all(|s| s.status == StepStatus::Pending));
        assert_eq!(progress.status, StepStatus::Pending);
    }

    #[test]
    fn test_update_step_recalculates_overall_and_current() {
        let mut p = progress();
        assert!(p.update_step("doc_parsing", StepUpdate::new(StepStatus::Completed).percent(100)));
        assert!(p.update_step("stage1", StepUpdate::new(StepStatus::InProgress).percent(25)));

        // (100 + 25) / 6
        assert_eq!(p.overall_progress, 20);
        assert_eq!(p.current_step, 2);
        assert!(p.step("stage1").unwrap().started_at.is_some());
        assert!(p.step("doc_parsing").unwrap().completed_at.is_some());
    }

    #[test]
    fn test_all_completed_marks_progress_completed() {
        let mut p = progress();
        let ids: Vec<String> = p.steps.iter().map(|s| s.step_id.clone()).collect();
        for id in &ids {
            p.update_step(id, StepUpdate::new(StepStatus::Completed).percent(100));
        }
        assert_eq!(p.overall_progress, 100);
        assert_eq!(p.current_step, 6);
        assert_eq!(p.status, StepStatus::Completed);
    }

    #[test]
    fn test_unknown_step_is_ignored() {
        let mut p = progress();
        let before = p.clone();
        assert!(!p.update_step("stage9", StepUpdate::new(StepStatus::Completed).percent(100)));
        assert_eq!(p.overall_progress, before.overall_progress);
        assert_eq!(p.current_step, before.current_step);
    }

    #[test]
    fn test_started_at_is_kept_on_later_updates() {
        let mut p = progress();
        p.update_step("stage1", StepUpdate::new(StepStatus::InProgress).percent(25));
        let started = p.step("stage1").unwrap().started_at;
        p.update_step("stage1", StepUpdate::new(StepStatus::InProgress).percent(75));
        assert_eq!(p.step("stage1").unwrap().started_at, started);
    }

    #[test]
    fn test_event_json_shape() {
        let p = progress();
        let event = ProgressEvent::step_update(p.session_id, &p.steps[0]);
        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["type"], "step_update");
        assert_eq!(json["session_id"], p.session_id.to_string());
        assert!(json["timestamp"].is_string());
        assert_eq!(json["data"]["step_id"], "doc_parsing");
        assert_eq!(json["data"]["status"], "pending");
    }

    #[test]
    fn test_complete_event_json_shape() {
        let event = ProgressEvent::complete(
            SessionId::new(),
            CompletionSummary {
                success: true,
                requirements_count: 4,
                hypotheses_count: 1,
                status: SetStatus::Accepted,
                iterations: 3,
            },
        );
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "complete");
        assert_eq!(json["data"]["status"], "accepted");
        assert_eq!(json["data"]["iterations"], 3);
    }

    #[test]
    fn test_readdressed_keeps_payload() {
        let event = ProgressEvent::error(SessionId::new(), "boom", Some("stage1".into()));
        let other = SessionId::new();
        let moved = event.readdressed(other);
        assert_eq!(moved.session_id, other);
        assert_eq!(moved.payload, event.payload);
        assert_eq!(moved.kind(), "error");
    }
}
