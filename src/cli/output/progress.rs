//! Terminal progress display using indicatif.
//!
//! [`TerminalProgress`] is an event subscriber: connect it to a session on
//! the hub and it renders that session's events as a single progress bar.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

use crate::domain::errors::DeliveryError;
use crate::domain::models::{ProgressEvent, ProgressPayload, StepStatus};
use crate::domain::ports::EventSubscriber;

/// Style template for the run progress bar
const PROGRESS_TEMPLATE: &str = "[{elapsed_precise}] {bar:40.cyan/blue} {pos:>3}% {msg}";

/// Progress bar characters for visual effect
const PROGRESS_CHARS: &str = "█▓▒░ ";

/// Create the bar used for a pipeline run (0 to 100 percent).
pub fn create_run_progress_bar() -> ProgressBar {
    let pb = ProgressBar::new(100);
    let style = ProgressStyle::with_template(PROGRESS_TEMPLATE)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars(PROGRESS_CHARS);
    pb.set_style(style);
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

/// Extension trait for ProgressBar to add common utility methods
pub trait ProgressBarExt {
    /// Finish with a success message (green checkmark)
    fn finish_success(&self, message: impl Into<String>);

    /// Finish with an error message (red X)
    fn finish_error(&self, message: impl Into<String>);
}

impl ProgressBarExt for ProgressBar {
    fn finish_success(&self, message: impl Into<String>) {
        self.finish_with_message(format!("✓ {}", message.into()));
    }

    fn finish_error(&self, message: impl Into<String>) {
        self.abandon_with_message(format!("✗ {}", message.into()));
    }
}

#[derive(Default)]
struct StepPercents {
    percents: HashMap<String, u8>,
    total_steps: usize,
}

impl StepPercents {
    /// Mean step percent; the bar never moves backward.
    fn overall(&self) -> u64 {
        let total = self.total_steps.max(self.percents.len()).max(1);
        let sum: usize = self.percents.values().map(|p| usize::from(*p)).sum();
        u64::try_from((sum / total).min(100)).unwrap_or(100)
    }
}

/// Renders one session's progress on the terminal.
pub struct TerminalProgress {
    bar: ProgressBar,
    steps: Mutex<StepPercents>,
}

impl TerminalProgress {
    pub fn new() -> Self {
        Self::with_bar(create_run_progress_bar())
    }

    /// A progress display that draws nothing (for testing)
    pub fn hidden() -> Self {
        let bar = ProgressBar::with_draw_target(Some(100), ProgressDrawTarget::hidden());
        Self::with_bar(bar)
    }

    fn with_bar(bar: ProgressBar) -> Self {
        Self {
            bar,
            steps: Mutex::new(StepPercents {
                percents: HashMap::new(),
                total_steps: 6,
            }),
        }
    }

    fn steps(&self) -> MutexGuard<'_, StepPercents> {
        self.steps.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn advance_to(&self, position: u64) {
        if position > self.bar.position() {
            self.bar.set_position(position);
        }
    }

    pub fn position(&self) -> u64 {
        self.bar.position()
    }

    pub fn is_finished(&self) -> bool {
        self.bar.is_finished()
    }

    fn render(&self, event: &ProgressEvent) {
        match &event.payload {
            ProgressPayload::StepUpdate(step) => {
                let overall = {
                    let mut steps = self.steps();
                    steps
                        .percents
                        .insert(step.step_id.clone(), step.progress_percent);
                    steps.overall()
                };
                self.advance_to(overall);
                let message = if step.message.is_empty() {
                    step.name.clone()
                } else {
                    format!("{}: {}", step.name, step.message)
                };
                match step.status {
                    StepStatus::Failed => self.bar.println(format!("✗ {message}")),
                    StepStatus::Completed => self.bar.println(format!("✓ {message}")),
                    _ => {}
                }
                self.bar.set_message(message);
            }
            ProgressPayload::ProgressUpdate(progress) => {
                self.steps().total_steps = progress.total_steps;
                self.advance_to(u64::from(progress.overall_progress));
                if progress.current_iteration > 0 {
                    self.bar.set_message(format!(
                        "Verification iteration {}/{}",
                        progress.current_iteration, progress.max_iterations
                    ));
                }
            }
            ProgressPayload::Complete(summary) => {
                self.advance_to(100);
                self.bar.finish_success(format!(
                    "{} requirement(s), {} hypothesis(es), {} after {} iteration(s)",
                    summary.requirements_count,
                    summary.hypotheses_count,
                    summary.status,
                    summary.iterations
                ));
            }
            ProgressPayload::Error(report) => {
                let stage = report.stage.as_deref().unwrap_or("pipeline");
                self.bar
                    .finish_error(format!("{stage} failed: {}", report.error));
            }
        }
    }
}

impl Default for TerminalProgress {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventSubscriber for TerminalProgress {
    async fn deliver(&self, event: &ProgressEvent) -> Result<(), DeliveryError> {
        self.render(event);
        Ok(())
    }
}
