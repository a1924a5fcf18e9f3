//! Per-session progress bookkeeping.
//!
//! Every mutation recomputes the derived fields and builds the outgoing
//! event under one lock, so no observer sees a percent and a current step
//! from different updates. Events are sent after the lock is released.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::debug;

use crate::domain::models::{
    default_pipeline_steps, CompletionSummary, PipelineProgress, PipelineStep, ProgressEvent,
    SessionId, StepStatus, StepUpdate,
};
use crate::services::broadcast_hub::EventBroadcastHub;

struct TrackerState {
    progress: PipelineProgress,
    /// Highest overall percent published so far
    high_water: u8,
}

impl TrackerState {
    /// Keep overall progress from moving backward.
    fn clamp_overall(&mut self) {
        let overall = self.progress.overall_progress.max(self.high_water);
        self.progress.overall_progress = overall;
        self.high_water = overall;
    }
}

/// Tracks one session's steps and publishes changes through the hub.
pub struct ProgressTracker {
    session_id: SessionId,
    hub: Arc<EventBroadcastHub>,
    state: Mutex<TrackerState>,
}

impl ProgressTracker {
    /// Tracker with the standard pipeline steps.
    pub fn new(session_id: SessionId, hub: Arc<EventBroadcastHub>, max_iterations: u32) -> Self {
        Self::with_steps(session_id, hub, default_pipeline_steps(), max_iterations)
    }

    /// Tracker over a custom step list.
    pub fn with_steps(
        session_id: SessionId,
        hub: Arc<EventBroadcastHub>,
        steps: Vec<PipelineStep>,
        max_iterations: u32,
    ) -> Self {
        Self {
            session_id,
            hub,
            state: Mutex::new(TrackerState {
                progress: PipelineProgress::new(session_id, steps, max_iterations),
                high_water: 0,
            }),
        }
    }

    /// Session every event is addressed to.
    pub const fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// Mark the run as started and publish the initial progress.
    pub async fn start(&self) {
        let event = {
            let mut state = self.state.lock().await;
            let now = Utc::now();
            state.progress.status = StepStatus::InProgress;
            state.progress.started_at = Some(now);
            state.progress.updated_at = now;
            ProgressEvent::progress_update(&state.progress)
        };
        self.hub.send(self.session_id, &event).await;
    }

    /// Update one step and publish a `step_update`. Unknown ids are ignored.
    pub async fn update_step(&self, step_id: &str, update: StepUpdate) {
        let event = {
            let mut state = self.state.lock().await;
            if !state.progress.update_step(step_id, update) {
                debug!(session_id = %self.session_id, step_id, "ignoring update for unknown step");
                return;
            }
            state.clamp_overall();
            state
                .progress
                .step(step_id)
                .map(|step| ProgressEvent::step_update(self.session_id, step))
        };
        if let Some(event) = event {
            self.hub.send(self.session_id, &event).await;
        }
    }

    /// Record the current verification iteration.
    pub async fn set_iteration(&self, iteration: u32) {
        let mut state = self.state.lock().await;
        state.progress.current_iteration = iteration;
        state.progress.updated_at = Utc::now();
    }

    /// Publish a `progress_update` with the current run-level fields.
    pub async fn publish_progress(&self) {
        let event = {
            let state = self.state.lock().await;
            ProgressEvent::progress_update(&state.progress)
        };
        self.hub.send(self.session_id, &event).await;
    }

    /// Mark the run failed and publish an `error` event.
    pub async fn fail(&self, stage: &str, error: &str) {
        let (failure, progress) = {
            let mut state = self.state.lock().await;
            state.progress.update_step(
                stage,
                StepUpdate::new(StepStatus::Failed).error(error).message("Failed"),
            );
            state.clamp_overall();
            state.progress.status = StepStatus::Failed;
            (
                state
                    .progress
                    .step(stage)
                    .map(|step| ProgressEvent::step_update(self.session_id, step)),
                ProgressEvent::progress_update(&state.progress),
            )
        };
        if let Some(failure) = failure {
            self.hub.send(self.session_id, &failure).await;
        }
        self.hub.send(self.session_id, &progress).await;
        self.hub
            .send(
                self.session_id,
                &ProgressEvent::error(self.session_id, error, Some(stage.to_string())),
            )
            .await;
    }

    /// Publish the final progress and the `complete` event.
    pub async fn complete(&self, summary: CompletionSummary) {
        self.publish_progress().await;
        self.hub
            .send(self.session_id, &ProgressEvent::complete(self.session_id, summary))
            .await;
    }

    /// Copy of the current progress.
    pub async fn snapshot(&self) -> PipelineProgress {
        self.state.lock().await.progress.clone()
    }
}
