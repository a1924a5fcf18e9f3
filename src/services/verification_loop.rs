//! Verification loop controller (stages 3 to 5).
//!
//! [`LoopState`] is the pure transition function: each verification pass is
//! observed right after it finishes, and the threshold check happens before
//! any fix step. [`VerificationLoop`] drives the roles around it.

use std::sync::Arc;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{PipelineStage, RequirementSet, StepStatus, StepUpdate};
use crate::domain::ports::{DocumentSet, NoopReview, ReviewHook};
use crate::services::drafting::DraftingRole;
use crate::services::progress_tracker::ProgressTracker;
use crate::services::verifying::VerifyingRole;

/// Progress step the loop reports under.
pub const LOOP_STEP: &str = "verification_loop";

/// Share of the loop step spread over iteration starts.
const ITERATION_SPAN: u32 = 80;
const CLEAN_PASS_BONUS: u8 = 10;
const FAILING_PASS_BONUS: u8 = 5;

// ============================================================================
// Pure state machine
// ============================================================================

/// Where the loop stands between two transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopPhase {
    /// An iteration has started and its verification pass is pending
    Verifying,
    /// The last pass asked for fixes
    Fixing,
    /// Enough consecutive clean passes were observed
    Converged,
    /// The iteration budget ran out without converging
    Exhausted,
}

impl LoopPhase {
    /// `Converged` and `Exhausted` end the loop.
    pub const fn is_final(self) -> bool {
        matches!(self, Self::Converged | Self::Exhausted)
    }
}

/// What to do after a verification pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopDecision {
    Converged,
    Fix,
    Exhausted,
}

/// Final state of a loop run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LoopOutcome {
    pub state: LoopPhase,
    pub iterations: u32,
    pub consecutive_passes: u32,
}

/// Iteration counter and clean-pass streak of one loop run.
///
/// Callers alternate [`begin_iteration`](Self::begin_iteration) and
/// [`observe`](Self::observe) until `begin_iteration` returns `None` or
/// `observe` returns something other than [`LoopDecision::Fix`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopState {
    max_iterations: u32,
    acceptance_threshold: u32,
    iteration: u32,
    consecutive_passes: u32,
    phase: LoopPhase,
}

impl LoopState {
    /// Create a loop state.
    ///
    /// # Arguments
    ///
    /// * `max_iterations` - Upper bound on verification passes
    /// * `acceptance_threshold` - Consecutive clean passes needed to converge,
    ///   raised to 1 when given as 0
    pub fn new(max_iterations: u32, acceptance_threshold: u32) -> Self {
        Self {
            max_iterations,
            acceptance_threshold: acceptance_threshold.max(1),
            iteration: 0,
            consecutive_passes: 0,
            phase: LoopPhase::Verifying,
        }
    }

    /// Start the next iteration, returning its 1-based number, or `None`
    /// once the loop is over.
    pub fn begin_iteration(&mut self) -> Option<u32> {
        if self.phase.is_final() {
            return None;
        }
        if self.iteration >= self.max_iterations {
            self.phase = LoopPhase::Exhausted;
            return None;
        }
        self.iteration += 1;
        self.phase = LoopPhase::Verifying;
        Some(self.iteration)
    }

    /// Record the critical error count of the pass that just finished.
    ///
    /// No fix is requested after the last iteration since nothing would
    /// verify it.
    pub fn observe(&mut self, critical_count: usize) -> LoopDecision {
        if critical_count == 0 {
            self.consecutive_passes += 1;
            if self.consecutive_passes >= self.acceptance_threshold {
                self.phase = LoopPhase::Converged;
                return LoopDecision::Converged;
            }
        } else {
            self.consecutive_passes = 0;
        }

        if self.iteration >= self.max_iterations {
            self.phase = LoopPhase::Exhausted;
            LoopDecision::Exhausted
        } else {
            self.phase = LoopPhase::Fixing;
            LoopDecision::Fix
        }
    }

    /// 1-based number of the current iteration, 0 before the first.
    pub const fn iteration(&self) -> u32 {
        self.iteration
    }

    /// Clean passes observed since the last critical one.
    pub const fn consecutive_passes(&self) -> u32 {
        self.consecutive_passes
    }

    /// Phase after the latest transition.
    pub const fn phase(&self) -> LoopPhase {
        self.phase
    }

    /// Snapshot of the state as a [`LoopOutcome`].
    pub const fn outcome(&self) -> LoopOutcome {
        LoopOutcome {
            state: self.phase,
            iterations: self.iteration,
            consecutive_passes: self.consecutive_passes,
        }
    }

    /// Loop step percent at the start of `iteration`.
    fn iteration_floor(&self, iteration: u32) -> u8 {
        let max = self.max_iterations.max(1);
        let floor = (iteration.saturating_sub(1) * ITERATION_SPAN) / max;
        u8::try_from(floor.min(100)).unwrap_or(100)
    }
}

// ============================================================================
// Driver
// ============================================================================

/// Runs verification, optional review and fixing until the set converges
/// or the iteration budget runs out.
pub struct VerificationLoop {
    drafting: Arc<DraftingRole>,
    verifying: Arc<VerifyingRole>,
    review: Arc<dyn ReviewHook>,
    max_iterations: u32,
    acceptance_threshold: u32,
    enable_review: bool,
}

impl VerificationLoop {
    /// Create a loop with review disabled and the no-op hook installed.
    ///
    /// # Arguments
    ///
    /// * `drafting` - Role used for stage 5 fixes
    /// * `verifying` - Role used for stage 3 passes
    /// * `max_iterations` - Iteration budget
    /// * `acceptance_threshold` - Consecutive clean passes needed to converge
    pub fn new(
        drafting: Arc<DraftingRole>,
        verifying: Arc<VerifyingRole>,
        max_iterations: u32,
        acceptance_threshold: u32,
    ) -> Self {
        Self {
            drafting,
            verifying,
            review: Arc::new(NoopReview),
            max_iterations,
            acceptance_threshold,
            enable_review: false,
        }
    }

    /// Replace the stage 4 hook. It only runs once review is enabled.
    pub fn with_review(mut self, review: Arc<dyn ReviewHook>) -> Self {
        self.review = review;
        self
    }

    /// Turn stage 4 on or off.
    pub const fn with_review_enabled(mut self, enabled: bool) -> Self {
        self.enable_review = enabled;
        self
    }

    /// Whether stage 4 runs between verification and fixing.
    pub const fn review_enabled(&self) -> bool {
        self.enable_review
    }

    /// Iterate verification, optional review and fixing on `set`.
    ///
    /// Each pass replaces the set's issues and metrics. The threshold check
    /// happens right after the pass, so a converging pass is never followed
    /// by a fix. Loop sub-progress is reported on the `verification_loop`
    /// step of `tracker`.
    ///
    /// # Arguments
    ///
    /// * `set` - The aggregate, updated in place
    /// * `documents` - Source texts the roles check against
    /// * `tracker` - Progress of the running session
    /// * `cancel` - Checked at the start of every iteration and by every oracle call
    ///
    /// # Returns
    ///
    /// The final [`LoopOutcome`]. Exhaustion is an outcome, not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The run is cancelled ([`DomainError::Cancelled`])
    /// - The review hook fails
    /// - The iteration count cannot be recorded on the set
    pub async fn run(
        &self,
        set: &mut RequirementSet,
        documents: &DocumentSet,
        tracker: &ProgressTracker,
        cancel: &CancellationToken,
    ) -> DomainResult<LoopOutcome> {
        let mut state = LoopState::new(self.max_iterations, self.acceptance_threshold);

        while let Some(iteration) = state.begin_iteration() {
            if cancel.is_cancelled() {
                return Err(DomainError::Cancelled);
            }
            set.set_iteration(iteration, self.max_iterations)?;
            tracker.set_iteration(iteration).await;

            let floor = state.iteration_floor(iteration);
            tracker
                .update_step(
                    LOOP_STEP,
                    StepUpdate::new(StepStatus::InProgress)
                        .percent(floor)
                        .message(format!(
                            "Iteration {iteration}/{}: verifying",
                            self.max_iterations
                        )),
                )
                .await;
            tracker.publish_progress().await;

            set.enter_stage(PipelineStage::VERIFICATION);
            let verification = self
                .verifying
                .verify(&set.requirements, documents, cancel)
                .await?;
            let critical = verification.critical_count();
            set.verification_issues = verification.issues;
            set.metrics = Some(verification.metrics);
            set.touch();

            let decision = state.observe(critical);
            info!(
                iteration,
                critical,
                issues = set.verification_issues.len(),
                consecutive_passes = state.consecutive_passes(),
                decision = ?decision,
                "verification pass observed"
            );

            let bonus = if critical == 0 {
                CLEAN_PASS_BONUS
            } else {
                FAILING_PASS_BONUS
            };
            tracker
                .update_step(
                    LOOP_STEP,
                    StepUpdate::new(StepStatus::InProgress)
                        .percent(floor.saturating_add(bonus))
                        .message(format!(
                            "Iteration {iteration}/{}: {critical} critical error(s)",
                            self.max_iterations
                        )),
                )
                .await;

            if decision != LoopDecision::Fix {
                break;
            }

            if self.enable_review {
                set.enter_stage(PipelineStage::REVIEW);
                set.verification_issues = self.review.review(set).await?;
                debug!(iteration, issues = set.verification_issues.len(), "review finished");
            }

            set.enter_stage(PipelineStage::FIXING);
            if set.verification_issues.is_empty() {
                debug!(iteration, "nothing to fix");
                continue;
            }
            let requirements = std::mem::take(&mut set.requirements);
            set.requirements = self
                .drafting
                .fix_issues(requirements, &set.verification_issues, documents, cancel)
                .await?;
            set.touch();
        }

        let outcome = state.outcome();
        match outcome.state {
            LoopPhase::Converged => info!(
                iterations = outcome.iterations,
                consecutive_passes = outcome.consecutive_passes,
                "verification loop converged"
            ),
            _ => warn!(
                iterations = outcome.iterations,
                consecutive_passes = outcome.consecutive_passes,
                "verification loop exhausted its iterations"
            ),
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn run_pure(max: u32, threshold: u32, criticals: &[usize]) -> LoopState {
        let mut state = LoopState::new(max, threshold);
        let mut passes = criticals.iter().copied();
        while state.begin_iteration().is_some() {
            let critical = passes.next().unwrap_or(0);
            if state.observe(critical) != LoopDecision::Fix {
                break;
            }
        }
        state
    }

    #[test]
    fn test_converges_after_threshold_clean_passes() {
        let state = run_pure(5, 3, &[2, 1, 0, 0, 0]);
        assert_eq!(state.phase(), LoopPhase::Converged);
        assert_eq!(state.iteration(), 5);
        assert_eq!(state.consecutive_passes(), 3);
    }

    #[test]
    fn test_threshold_one_stops_after_first_clean_pass() {
        let state = run_pure(5, 1, &[0]);
        assert_eq!(state.phase(), LoopPhase::Converged);
        assert_eq!(state.iteration(), 1);
    }

    #[test]
    fn test_always_critical_exhausts() {
        let state = run_pure(5, 3, &[1, 1, 1, 1, 1]);
        assert_eq!(state.phase(), LoopPhase::Exhausted);
        assert_eq!(state.iteration(), 5);
        assert_eq!(state.consecutive_passes(), 0);
    }

    #[test]
    fn test_critical_pass_resets_streak() {
        let mut state = LoopState::new(10, 3);
        state.begin_iteration();
        assert_eq!(state.observe(0), LoopDecision::Fix);
        state.begin_iteration();
        assert_eq!(state.observe(0), LoopDecision::Fix);
        assert_eq!(state.consecutive_passes(), 2);
        state.begin_iteration();
        assert_eq!(state.observe(4), LoopDecision::Fix);
        assert_eq!(state.consecutive_passes(), 0);
    }

    #[test]
    fn test_convergence_wins_on_last_iteration() {
        let mut state = LoopState::new(1, 1);
        assert_eq!(state.begin_iteration(), Some(1));
        assert_eq!(state.observe(0), LoopDecision::Converged);
        assert_eq!(state.begin_iteration(), None);
    }

    #[test]
    fn test_zero_budget_is_exhausted_immediately() {
        let mut state = LoopState::new(0, 3);
        assert_eq!(state.begin_iteration(), None);
        assert_eq!(state.outcome().state, LoopPhase::Exhausted);
        assert_eq!(state.outcome().iterations, 0);
    }

    #[test]
    fn test_iteration_floor() {
        let state = LoopState::new(5, 3);
        assert_eq!(state.iteration_floor(1), 0);
        assert_eq!(state.iteration_floor(2), 16);
        assert_eq!(state.iteration_floor(5), 64);
    }

    proptest! {
        #[test]
        fn prop_loop_terminates_within_budget(
            max in 1u32..=10,
            threshold in 1u32..=5,
            criticals in proptest::collection::vec(0usize..3, 0..20),
        ) {
            let state = run_pure(max, threshold, &criticals);
            prop_assert!(state.phase().is_final());
            prop_assert!(state.iteration() <= max);
            prop_assert!(state.iteration() >= 1);
        }

        #[test]
        fn prop_streak_resets_on_critical(
            criticals in proptest::collection::vec(0usize..3, 1..10),
        ) {
            let mut state = LoopState::new(10, 5);
            for critical in criticals {
                if state.begin_iteration().is_none() {
                    break;
                }
                let before = state.consecutive_passes();
                state.observe(critical);
                if critical > 0 {
                    prop_assert_eq!(state.consecutive_passes(), 0);
                } else {
                    prop_assert_eq!(state.consecutive_passes(), before + 1);
                }
                if state.phase().is_final() {
                    break;
                }
            }
        }
    }
}
