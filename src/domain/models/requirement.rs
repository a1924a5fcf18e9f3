//! Requirement artifact model.
//!
//! A [`RequirementSet`] is the aggregate produced by one pipeline run. It is
//! created with a fresh id when a run starts, mutated in place by each stage,
//! and handed back to the caller when the run ends.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};

/// Short random identifier with a prefix, e.g. `BR_1a2b3c4d`.
fn short_id(prefix: &str, len: usize) -> String {
    let hex = Uuid::new_v4().simple().to_string();
    format!("{prefix}_{}", &hex[..len])
}

/// Kind of business requirement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RequirementType {
    #[default]
    Functional,
    NonFunctional,
    BusinessRule,
    Constraint,
    Assumption,
    Dependency,
}

impl RequirementType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Functional => "functional",
            Self::NonFunctional => "non_functional",
            Self::BusinessRule => "business_rule",
            Self::Constraint => "constraint",
            Self::Assumption => "assumption",
            Self::Dependency => "dependency",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().replace(['-', ' '], "_").as_str() {
            "functional" => Some(Self::Functional),
            "non_functional" | "nonfunctional" => Some(Self::NonFunctional),
            "business_rule" => Some(Self::BusinessRule),
            "constraint" => Some(Self::Constraint),
            "assumption" => Some(Self::Assumption),
            "dependency" => Some(Self::Dependency),
            _ => None,
        }
    }
}

/// Priority of a business requirement.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low = 1,
    #[default]
    Medium = 2,
    High = 3,
    Critical = 4,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    /// Interpret free-form priority text from an oracle reply.
    ///
    /// Anything that does not mention a known level is treated as medium.
    pub fn from_label(label: &str) -> Self {
        let lower = label.to_lowercase();
        if lower.contains("critical") || lower.contains("중요") {
            Self::Critical
        } else if lower.contains("high") || lower.contains("높음") {
            Self::High
        } else if lower.contains("low") || lower.contains("낮음") {
            Self::Low
        } else {
            Self::Medium
        }
    }
}

/// Where a quoted citation was found.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLocation {
    /// Document name as registered in the document set
    pub document: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_number: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_number: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paragraph: Option<String>,
}

impl SourceLocation {
    pub fn in_document(document: impl Into<String>) -> Self {
        Self {
            document: document.into(),
            ..Self::default()
        }
    }
}

/// Exact quote from a source document backing a requirement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    pub text: String,
    pub location: SourceLocation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

impl Citation {
    pub fn new(text: impl Into<String>, location: SourceLocation) -> Self {
        Self {
            text: text.into(),
            location,
            context: None,
        }
    }
}

/// A single acceptance criterion of a requirement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcceptanceCriterion {
    pub id: String,
    pub description: String,
    #[serde(default = "default_testable")]
    pub testable: bool,
}

const fn default_testable() -> bool {
    true
}

impl AcceptanceCriterion {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            id: short_id("AC", 6),
            description: description.into(),
            testable: true,
        }
    }
}

/// A business requirement backed by citations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusinessRequirement {
    pub id: String,
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub requirement_type: RequirementType,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub citations: Vec<Citation>,
    #[serde(default)]
    pub stakeholders: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub business_value: Option<String>,
    #[serde(default)]
    pub acceptance_criteria: Vec<AcceptanceCriterion>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub conflicts: Vec<String>,
    #[serde(default)]
    pub assumptions: Vec<String>,
    #[serde(default)]
    pub constraints: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BusinessRequirement {
    /// Create a functional, medium-priority requirement with a fresh id.
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Self::generate_id(),
            title: title.into(),
            description: description.into(),
            requirement_type: RequirementType::default(),
            priority: Priority::default(),
            citations: Vec::new(),
            stakeholders: Vec::new(),
            business_value: None,
            acceptance_criteria: Vec::new(),
            tags: Vec::new(),
            dependencies: Vec::new(),
            conflicts: Vec::new(),
            assumptions: Vec::new(),
            constraints: Vec::new(),
            notes: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Generate an id of the form `BR_<8 hex>`.
    pub fn generate_id() -> String {
        short_id("BR", 8)
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_type(mut self, requirement_type: RequirementType) -> Self {
        self.requirement_type = requirement_type;
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_citation(mut self, citation: Citation) -> Self {
        self.citations.push(citation);
        self
    }

    pub fn with_stakeholder(mut self, stakeholder: impl Into<String>) -> Self {
        self.stakeholders.push(stakeholder.into());
        self
    }

    pub fn with_acceptance_criterion(mut self, description: impl Into<String>) -> Self {
        self.acceptance_criteria
            .push(AcceptanceCriterion::new(description));
        self
    }

    pub fn has_citations(&self) -> bool {
        !self.citations.is_empty()
    }
}

/// An inferred requirement that lacks direct evidence.
///
/// Hypotheses never count toward acceptance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HypothesisRequirement {
    pub id: String,
    pub description: String,
    pub rationale: String,
    pub confidence: f64,
    #[serde(default)]
    pub evidence_needed: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl HypothesisRequirement {
    /// Create a hypothesis; confidence is clamped into `[0, 1]`.
    pub fn new(description: impl Into<String>, rationale: impl Into<String>, confidence: f64) -> Self {
        Self {
            id: Self::generate_id(),
            description: description.into(),
            rationale: rationale.into(),
            confidence: clamp_ratio(confidence),
            evidence_needed: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// Generate an id of the form `HYP_<8 hex>`.
    pub fn generate_id() -> String {
        short_id("HYP", 8)
    }
}

/// How bad a verification issue is for acceptance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorType {
    /// Blocks acceptance of the whole set
    CriticalError,
    /// Weak or incomplete justification, does not block acceptance
    JustificationGap,
}

/// Severity attached to a verification issue.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    /// Interpret a severity label; unknown labels map to medium.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_lowercase().as_str() {
            "low" => Self::Low,
            "high" => Self::High,
            "critical" => Self::Critical,
            _ => Self::Medium,
        }
    }
}

/// A problem the verifying role found with one requirement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationIssue {
    pub id: String,
    pub requirement_id: String,
    pub error_type: ErrorType,
    pub severity: Severity,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<SourceLocation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub citation_issue: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_fix: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl VerificationIssue {
    pub fn new(
        requirement_id: impl Into<String>,
        error_type: ErrorType,
        severity: Severity,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            requirement_id: requirement_id.into(),
            error_type,
            severity,
            description: description.into(),
            location: None,
            citation_issue: None,
            suggested_fix: None,
            created_at: Utc::now(),
        }
    }

    /// A critical error with critical severity.
    pub fn critical(requirement_id: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(
            requirement_id,
            ErrorType::CriticalError,
            Severity::Critical,
            description,
        )
    }

    /// A justification gap with the given severity.
    pub fn gap(
        requirement_id: impl Into<String>,
        severity: Severity,
        description: impl Into<String>,
    ) -> Self {
        Self::new(
            requirement_id,
            ErrorType::JustificationGap,
            severity,
            description,
        )
    }

    pub fn with_location(mut self, location: SourceLocation) -> Self {
        self.location = Some(location);
        self
    }

    pub fn with_citation_issue(mut self, citation_issue: impl Into<String>) -> Self {
        self.citation_issue = Some(citation_issue.into());
        self
    }

    pub fn with_suggested_fix(mut self, suggested_fix: impl Into<String>) -> Self {
        self.suggested_fix = Some(suggested_fix.into());
        self
    }

    pub fn is_critical(&self) -> bool {
        self.error_type == ErrorType::CriticalError
    }
}

/// Quality metrics computed once per verification pass. All ratios are in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CoverageMetrics {
    pub total_requirements: usize,
    pub precision: f64,
    pub recall: f64,
    pub misinterpretation_rate: f64,
    pub traceability_score: f64,
    pub completion_rate: f64,
}

/// Clamp a ratio into `[0, 1]`, mapping NaN to 0.
pub fn clamp_ratio(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Stage of the six-stage pipeline. Only values 1 through 6 can be constructed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct PipelineStage(u8);

impl PipelineStage {
    pub const DRAFTING: Self = Self(1);
    pub const SELF_IMPROVEMENT: Self = Self(2);
    pub const VERIFICATION: Self = Self(3);
    pub const REVIEW: Self = Self(4);
    pub const FIXING: Self = Self(5);
    pub const DECISION: Self = Self(6);

    pub fn new(stage: u8) -> DomainResult<Self> {
        if (1..=6).contains(&stage) {
            Ok(Self(stage))
        } else {
            Err(DomainError::InvalidStage(stage))
        }
    }

    pub const fn get(self) -> u8 {
        self.0
    }

    pub const fn name(self) -> &'static str {
        match self.0 {
            1 => "drafting",
            2 => "self_improvement",
            3 => "verification",
            4 => "review",
            5 => "fixing",
            _ => "decision",
        }
    }
}

impl Default for PipelineStage {
    fn default() -> Self {
        Self::DRAFTING
    }
}

impl TryFrom<u8> for PipelineStage {
    type Error = DomainError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<PipelineStage> for u8 {
    fn from(stage: PipelineStage) -> Self {
        stage.0
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stage {} ({})", self.0, self.name())
    }
}

/// Lifecycle status of a requirement set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SetStatus {
    #[default]
    InProgress,
    Accepted,
    Rejected,
    Error,
}

impl SetStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InProgress => "in_progress",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
            Self::Error => "error",
        }
    }

    /// Only `in_progress` can move, and only to a terminal status.
    pub fn can_transition_to(&self, new_status: Self) -> bool {
        matches!(
            (self, new_status),
            (Self::InProgress, Self::Accepted | Self::Rejected | Self::Error)
        )
    }
}

impl fmt::Display for SetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Aggregate root of one pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequirementSet {
    pub id: Uuid,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub requirements: Vec<BusinessRequirement>,
    pub hypotheses: Vec<HypothesisRequirement>,
    pub verification_issues: Vec<VerificationIssue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<CoverageMetrics>,
    pipeline_stage: PipelineStage,
    iteration_count: u32,
    status: SetStatus,
    pub source_documents: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RequirementSet {
    /// Create an empty in-progress set. Without a name, one is derived from
    /// the current time as `Requirements_<YYYYMMDD_HHMMSS>`.
    pub fn new(
        name: Option<String>,
        description: Option<String>,
        source_documents: Vec<String>,
    ) -> Self {
        let now = Utc::now();
        let name = name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| format!("Requirements_{}", now.format("%Y%m%d_%H%M%S")));
        Self {
            id: Uuid::new_v4(),
            name,
            description,
            requirements: Vec::new(),
            hypotheses: Vec::new(),
            verification_issues: Vec::new(),
            metrics: None,
            pipeline_stage: PipelineStage::DRAFTING,
            iteration_count: 0,
            status: SetStatus::InProgress,
            source_documents,
            created_at: now,
            updated_at: now,
        }
    }

    pub const fn pipeline_stage(&self) -> PipelineStage {
        self.pipeline_stage
    }

    pub const fn iteration_count(&self) -> u32 {
        self.iteration_count
    }

    pub const fn status(&self) -> SetStatus {
        self.status
    }

    pub fn enter_stage(&mut self, stage: PipelineStage) {
        self.pipeline_stage = stage;
        self.touch();
    }

    /// Record the current loop iteration. The count never goes backward and
    /// never exceeds `max_iterations`.
    pub fn set_iteration(&mut self, iteration: u32, max_iterations: u32) -> DomainResult<()> {
        if iteration < self.iteration_count {
            return Err(DomainError::IterationRegression {
                current: self.iteration_count,
                requested: iteration,
            });
        }
        if iteration > max_iterations {
            return Err(DomainError::IterationLimit {
                requested: iteration,
                max: max_iterations,
            });
        }
        self.iteration_count = iteration;
        self.touch();
        Ok(())
    }

    /// Move to a terminal status.
    pub fn transition_to(&mut self, status: SetStatus) -> DomainResult<()> {
        if !self.status.can_transition_to(status) {
            return Err(DomainError::InvalidStatusTransition {
                from: self.status,
                to: status,
            });
        }
        self.status = status;
        self.touch();
        Ok(())
    }

    pub fn critical_issues(&self) -> impl Iterator<Item = &VerificationIssue> {
        self.verification_issues.iter().filter(|i| i.is_critical())
    }

    pub fn critical_error_count(&self) -> usize {
        self.critical_issues().count()
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enum_defaults() {
        assert_eq!(RequirementType::default(), RequirementType::Functional);
        assert_eq!(Priority::default(), Priority::Medium);
        assert_eq!(Severity::default(), Severity::Medium);
        assert_eq!(SetStatus::default(), SetStatus::InProgress);
    }

    #[test]
    fn test_pipeline_stage_bounds() {
        assert!(PipelineStage::new(0).is_err());
        assert!(PipelineStage::new(7).is_err());
        for stage in 1..=6 {
            assert_eq!(PipelineStage::new(stage).unwrap().get(), stage);
        }
    }

    #[test]
    fn test_pipeline_stage_serde_rejects_out_of_range() {
        let stage: PipelineStage = serde_json::from_str("3").unwrap();
        assert_eq!(stage, PipelineStage::VERIFICATION);
        assert!(serde_json::from_str::<PipelineStage>("9").is_err());
        assert_eq!(serde_json::to_string(&PipelineStage::DECISION).unwrap(), "6");
    }

    #[test]
    fn test_status_transitions_are_one_way() {
        let mut set = RequirementSet::new(None, None, vec![]);
        assert_eq!(set.status(), SetStatus::InProgress);
        set.transition_to(SetStatus::Accepted).unwrap();

        let err = set.transition_to(SetStatus::InProgress).unwrap_err();
        assert!(matches!(
            err,
            DomainError::InvalidStatusTransition {
                from: SetStatus::Accepted,
                to: SetStatus::InProgress
            }
        ));
        assert!(set.transition_to(SetStatus::Error).is_err());
        assert_eq!(set.status(), SetStatus::Accepted);
    }

    #[test]
    fn test_iteration_is_monotonic_and_bounded() {
        let mut set = RequirementSet::new(None, None, vec![]);
        set.set_iteration(1, 5).unwrap();
        set.set_iteration(3, 5).unwrap();
        assert!(matches!(
            set.set_iteration(2, 5),
            Err(DomainError::IterationRegression { current: 3, requested: 2 })
        ));
        assert!(matches!(
            set.set_iteration(6, 5),
            Err(DomainError::IterationLimit { requested: 6, max: 5 })
        ));
        assert_eq!(set.iteration_count(), 3);
    }

    #[test]
    fn test_default_name_uses_timestamp() {
        let set = RequirementSet::new(None, None, vec![]);
        assert!(set.name.starts_with("Requirements_"));
        // Requirements_YYYYMMDD_HHMMSS
        assert_eq!(set.name.len(), "Requirements_".len() + 15);

        let named = RequirementSet::new(Some("Billing".into()), None, vec![]);
        assert_eq!(named.name, "Billing");
    }

    #[test]
    fn test_generated_ids_have_expected_shape() {
        let br = BusinessRequirement::generate_id();
        assert!(br.starts_with("BR_"));
        assert_eq!(br.len(), 11);

        let hyp = HypothesisRequirement::generate_id();
        assert!(hyp.starts_with("HYP_"));
        assert_eq!(hyp.len(), 12);

        let ac = AcceptanceCriterion::new("exports csv");
        assert!(ac.id.starts_with("AC_"));
        assert_eq!(ac.id.len(), 9);
    }

    #[test]
    fn test_priority_from_label() {
        assert_eq!(Priority::from_label("High"), Priority::High);
        assert_eq!(Priority::from_label("높음"), Priority::High);
        assert_eq!(Priority::from_label("낮음"), Priority::Low);
        assert_eq!(Priority::from_label("매우 중요"), Priority::Critical);
        assert_eq!(Priority::from_label("soon"), Priority::Medium);
    }

    #[test]
    fn test_hypothesis_confidence_is_clamped() {
        assert!((HypothesisRequirement::new("d", "r", 1.7).confidence - 1.0).abs() < f64::EPSILON);
        assert!(HypothesisRequirement::new("d", "r", -0.2).confidence.abs() < f64::EPSILON);
        assert!(HypothesisRequirement::new("d", "r", f64::NAN).confidence.abs() < f64::EPSILON);
    }

    #[test]
    fn test_critical_error_count() {
        let mut set = RequirementSet::new(None, None, vec![]);
        set.verification_issues.push(VerificationIssue::critical("BR_1", "no citation"));
        set.verification_issues
            .push(VerificationIssue::gap("BR_1", Severity::Low, "no stakeholders"));
        assert_eq!(set.critical_error_count(), 1);
    }
}
