//! Verifying role: checks requirements against their sources.
//!
//! Deterministic checks always run:
//! - traceability: citations exist, name a known document, quote it verbatim
//! - schema: title, description and stakeholders are present
//!
//! Oracle sub-checks add semantic, atomicity and numeric findings. A failed
//! sub-check contributes nothing, except atomicity which falls back to a
//! local heuristic.

use std::collections::HashSet;
use std::sync::Arc;

use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::domain::errors::{DomainError, DomainResult, OracleCallError};
use crate::domain::models::requirement::clamp_ratio;
use crate::domain::models::{
    BusinessRequirement, CoverageMetrics, PipelineStage, Severity, VerificationIssue,
};
use crate::domain::ports::{DocumentSet, OracleRequest, Role};
use crate::services::oracle_gateway::OracleGateway;
use crate::services::prompts;

/// Supplies the recall figure of the coverage metrics.
pub trait RecallEstimator: Send + Sync {
    fn estimate(&self, requirements: &[BusinessRequirement], documents: &DocumentSet) -> f64;
}

/// Recall estimator returning a constant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FixedRecall(pub f64);

impl Default for FixedRecall {
    fn default() -> Self {
        Self(0.85)
    }
}

impl RecallEstimator for FixedRecall {
    fn estimate(&self, _requirements: &[BusinessRequirement], _documents: &DocumentSet) -> f64 {
        self.0
    }
}

/// Result of one verification pass.
#[derive(Debug, Clone, PartialEq)]
pub struct Verification {
    pub issues: Vec<VerificationIssue>,
    pub metrics: CoverageMetrics,
}

impl Verification {
    /// Number of critical errors in the pass.
    pub fn critical_count(&self) -> usize {
        self.issues.iter().filter(|i| i.is_critical()).count()
    }
}

// ============================================================================
// Reply schemas
// ============================================================================

#[derive(Debug, Deserialize)]
struct IssueItem {
    #[serde(default)]
    severity: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    suggested_fix: Option<String>,
}

/// Reply of the semantic sub-check: `{"semantic_issues": [...]}`.
#[derive(Debug, Deserialize)]
pub struct SemanticReply {
    semantic_issues: Vec<IssueItem>,
}

/// Reply of the atomicity sub-check: `{"atomicity_issues": [...]}`.
#[derive(Debug, Deserialize)]
pub struct AtomicityReply {
    atomicity_issues: Vec<IssueItem>,
}

/// Reply of the numeric sub-check: `{"numerical_issues": [...]}`.
#[derive(Debug, Deserialize)]
pub struct NumericReply {
    numerical_issues: Vec<IssueItem>,
}

/// How an oracle finding maps onto an issue.
#[derive(Debug, Clone, Copy)]
enum Finding {
    /// Critical severity becomes a critical error, anything else a gap
    BySeverity,
    /// Always a justification gap
    GapOnly,
}

fn to_issue(requirement_id: &str, item: IssueItem, label: &str, finding: Finding) -> VerificationIssue {
    let severity = item
        .severity
        .as_deref()
        .map(Severity::from_label)
        .unwrap_or_default();
    let description = format!(
        "{label}: {}",
        item.description
            .filter(|d| !d.trim().is_empty())
            .unwrap_or_else(|| "issue reported without details".to_string())
    );
    let mut issue = match finding {
        Finding::BySeverity if severity == Severity::Critical => {
            VerificationIssue::critical(requirement_id, description)
        }
        _ => VerificationIssue::gap(requirement_id, severity, description),
    };
    issue.suggested_fix = item.suggested_fix.filter(|f| !f.trim().is_empty());
    issue
}

// ============================================================================
// Deterministic checks
// ============================================================================

/// Citation presence and literal traceability into the source documents.
pub fn check_traceability(
    requirement: &BusinessRequirement,
    documents: &DocumentSet,
) -> Vec<VerificationIssue> {
    if requirement.citations.is_empty() {
        return vec![VerificationIssue::critical(
            &requirement.id,
            "Requirement has no citations to support it",
        )
        .with_suggested_fix("Quote the source text that states this requirement")];
    }

    let mut issues = Vec::new();
    for citation in &requirement.citations {
        let document = &citation.location.document;
        match documents.get(document) {
            None => issues.push(
                VerificationIssue::critical(
                    &requirement.id,
                    format!("Cited document '{document}' is not among the source documents"),
                )
                .with_location(citation.location.clone())
                .with_citation_issue(format!("Document '{document}' not found")),
            ),
            Some(text) if citation.text.is_empty() || !text.contains(&citation.text) => {
                let quoted: String = citation.text.chars().take(100).collect();
                issues.push(
                    VerificationIssue::critical(
                        &requirement.id,
                        "Cited text does not appear in the source document",
                    )
                    .with_location(citation.location.clone())
                    .with_citation_issue(format!("Text '{quoted}' not found in {document}")),
                );
            }
            Some(_) => {}
        }

        if citation.location.line_number.is_some_and(|line| line < 0) {
            issues.push(
                VerificationIssue::gap(
                    &requirement.id,
                    Severity::Medium,
                    "Citation has an invalid line number",
                )
                .with_location(citation.location.clone()),
            );
        }
    }
    issues
}

/// Required fields.
pub fn check_schema(requirement: &BusinessRequirement) -> Vec<VerificationIssue> {
    let mut issues = Vec::new();
    if requirement.title.trim().is_empty() {
        issues.push(VerificationIssue::gap(
            &requirement.id,
            Severity::Medium,
            "Requirement has no title",
        ));
    }
    if requirement.description.trim().is_empty() {
        issues.push(VerificationIssue::critical(
            &requirement.id,
            "Requirement has no description",
        ));
    }
    if requirement.stakeholders.is_empty() {
        issues.push(VerificationIssue::gap(
            &requirement.id,
            Severity::Low,
            "Requirement names no stakeholders",
        ));
    }
    issues
}

const MODAL_VERBS: [&str; 4] = ["must", "should", "shall", "will"];

/// Local stand-in for the atomicity sub-check.
pub fn atomicity_heuristic(requirement: &BusinessRequirement) -> Vec<VerificationIssue> {
    let lower = requirement.description.to_lowercase();
    let mut issues = Vec::new();

    if lower.matches(" and ").count() > 2 {
        issues.push(
            VerificationIssue::gap(
                &requirement.id,
                Severity::Medium,
                "Atomicity: description chains several clauses with 'and'",
            )
            .with_suggested_fix("Split it into separate requirements"),
        );
    }

    let modals = lower
        .split(|c: char| !c.is_alphanumeric())
        .filter(|word| MODAL_VERBS.contains(word))
        .count();
    if modals > 1 {
        issues.push(
            VerificationIssue::gap(
                &requirement.id,
                Severity::Medium,
                "Atomicity: description contains several obligations",
            )
            .with_suggested_fix("Keep one obligation per requirement"),
        );
    }
    issues
}

/// Coverage metrics for one pass.
pub fn compute_metrics(
    requirements: &[BusinessRequirement],
    issues: &[VerificationIssue],
    recall: f64,
) -> CoverageMetrics {
    let total = requirements.len();
    #[allow(clippy::cast_precision_loss)]
    let ratio = |count: usize| count as f64 / total.max(1) as f64;

    let critical = issues.iter().filter(|i| i.is_critical()).count();
    let cited = requirements.iter().filter(|r| r.has_citations()).count();
    let with_issues: HashSet<&str> = issues.iter().map(|i| i.requirement_id.as_str()).collect();
    let clean = total.saturating_sub(with_issues.len());

    CoverageMetrics {
        total_requirements: total,
        precision: clamp_ratio(ratio(total.saturating_sub(critical))),
        recall: clamp_ratio(recall),
        misinterpretation_rate: clamp_ratio(ratio(critical)),
        traceability_score: clamp_ratio(ratio(cited)),
        completion_rate: clamp_ratio(ratio(clean)),
    }
}

// ============================================================================
// Role
// ============================================================================

/// The verifying role adapter.
pub struct VerifyingRole {
    gateway: Arc<OracleGateway>,
    instructions: String,
    recall: Arc<dyn RecallEstimator>,
    temperature: f32,
}

impl VerifyingRole {
    /// Create the role with [`FixedRecall`] and temperature 0.1.
    pub fn new(gateway: Arc<OracleGateway>, instructions: impl Into<String>) -> Self {
        Self {
            gateway,
            instructions: instructions.into(),
            recall: Arc::new(FixedRecall::default()),
            temperature: 0.1,
        }
    }

    /// Replace the recall estimator. Its figure is clamped into `[0, 1]`.
    pub fn with_recall_estimator(mut self, recall: Arc<dyn RecallEstimator>) -> Self {
        self.recall = recall;
        self
    }

    /// Sampling temperature sent with every sub-check request.
    pub const fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Stage 3: verify every requirement and compute metrics.
    ///
    /// Deterministic checks always run. Oracle sub-checks fail open, so a
    /// flaky oracle only makes the pass more lenient.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::Cancelled`] when `cancel` fires.
    pub async fn verify(
        &self,
        requirements: &[BusinessRequirement],
        documents: &DocumentSet,
        cancel: &CancellationToken,
    ) -> DomainResult<Verification> {
        let mut issues = Vec::new();
        for requirement in requirements {
            issues.extend(self.verify_requirement(requirement, documents, cancel).await?);
        }

        let recall = self.recall.estimate(requirements, documents);
        let metrics = compute_metrics(requirements, &issues, recall);
        let verification = Verification { issues, metrics };

        info!(
            requirements = requirements.len(),
            issues = verification.issues.len(),
            critical = verification.critical_count(),
            precision = verification.metrics.precision,
            "verification pass finished"
        );
        Ok(verification)
    }

    async fn verify_requirement(
        &self,
        requirement: &BusinessRequirement,
        documents: &DocumentSet,
        cancel: &CancellationToken,
    ) -> DomainResult<Vec<VerificationIssue>> {
        let mut issues = check_traceability(requirement, documents);
        issues.extend(check_schema(requirement));

        if requirement.has_citations() {
            let payload = prompts::semantic_payload(requirement, documents);
            if let Some(reply) = self.sub_check::<SemanticReply>(payload, "semantic", cancel).await? {
                issues.extend(reply.semantic_issues.into_iter().map(|item| {
                    to_issue(&requirement.id, item, "Semantic", Finding::BySeverity)
                }));
            }
        }

        let payload = prompts::atomicity_payload(requirement);
        match self.sub_check::<AtomicityReply>(payload, "atomicity", cancel).await? {
            Some(reply) => issues.extend(
                reply
                    .atomicity_issues
                    .into_iter()
                    .map(|item| to_issue(&requirement.id, item, "Atomicity", Finding::GapOnly)),
            ),
            None => issues.extend(atomicity_heuristic(requirement)),
        }

        let numbers = prompts::extract_numbers(&requirement.description);
        if !numbers.is_empty() {
            let payload = prompts::numeric_payload(requirement, &numbers, documents);
            if let Some(reply) = self.sub_check::<NumericReply>(payload, "numeric", cancel).await? {
                issues.extend(reply.numerical_issues.into_iter().map(|item| {
                    to_issue(&requirement.id, item, "Numeric", Finding::BySeverity)
                }));
            }
        }

        debug!(requirement_id = %requirement.id, issues = issues.len(), "requirement verified");
        Ok(issues)
    }

    /// Run one oracle sub-check; `Ok(None)` when the oracle failed.
    async fn sub_check<T: serde::de::DeserializeOwned>(
        &self,
        payload: String,
        check: &'static str,
        cancel: &CancellationToken,
    ) -> DomainResult<Option<T>> {
        let request = OracleRequest::json(Role::Verifying, self.instructions.clone(), payload)
            .with_temperature(self.temperature);
        match self
            .gateway
            .request(PipelineStage::VERIFICATION, request, cancel)
            .await
        {
            Ok(reply) => Ok(Some(reply)),
            Err(OracleCallError::Cancelled) => Err(DomainError::Cancelled),
            Err(OracleCallError::Oracle(err)) => {
                warn!(check, error = %err, "verification sub-check failed");
                Ok(None)
            }
        }
    }
}
