//! Review hook port - the optional stage 4 between verification and fixing.

use async_trait::async_trait;

use crate::domain::errors::DomainResult;
use crate::domain::models::{RequirementSet, VerificationIssue};

/// Inspects a verified set and may amend its issue list before fixing.
#[async_trait]
pub trait ReviewHook: Send + Sync {
    /// Return the issue list the fix step should work from.
    ///
    /// # Errors
    ///
    /// A failing review ends the run as fatal.
    async fn review(&self, set: &RequirementSet) -> DomainResult<Vec<VerificationIssue>>;
}

/// Review hook that leaves the issues untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopReview;

#[async_trait]
impl ReviewHook for NoopReview {
    async fn review(&self, set: &RequirementSet) -> DomainResult<Vec<VerificationIssue>> {
        Ok(set.verification_issues.clone())
    }
}
