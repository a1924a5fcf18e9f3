//! Drafting role: produces, improves and fixes requirements.
//!
//! Oracle replies are decoded into explicit reply schemas. Requirement
//! entries are ingested leniently: canonical English keys and the Korean
//! field names used by earlier deployments are both accepted, and entries
//! that cannot be read are skipped with a warning.
//!
//! Fallbacks when the oracle fails:
//! - draft: one placeholder requirement explaining the failure
//! - improve: the input draft, unchanged
//! - fix: requirements with critical errors are dropped, others kept

use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::domain::errors::{DomainError, DomainResult, OracleCallError, OracleError};
use crate::domain::models::{
    AcceptanceCriterion, BusinessRequirement, Citation, HypothesisRequirement, PipelineStage,
    Priority, RequirementType, SourceLocation, VerificationIssue,
};
use crate::domain::ports::{DocumentSet, OracleRequest, Role};
use crate::services::oracle_gateway::OracleGateway;
use crate::services::prompts;

/// Requirements and hypotheses produced by the drafting role.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Draft {
    pub requirements: Vec<BusinessRequirement>,
    pub hypotheses: Vec<HypothesisRequirement>,
}

// ============================================================================
// Reply schemas
// ============================================================================

/// Reply to a draft or improve request. The lists may sit at the top level
/// or under `data`; at least a requirements list must be present.
#[derive(Debug, Deserialize)]
pub struct DraftReply {
    #[serde(default)]
    data: Option<DraftLists>,
    #[serde(default)]
    requirements: Option<Vec<Value>>,
    #[serde(default)]
    hypotheses: Option<Vec<Value>>,
}

#[derive(Debug, Deserialize)]
struct DraftLists {
    requirements: Vec<Value>,
    #[serde(default)]
    hypotheses: Vec<Value>,
}

impl DraftReply {
    fn into_lists(self) -> Result<(Vec<Value>, Vec<Value>), OracleError> {
        match (self.requirements, self.data) {
            (Some(requirements), _) => Ok((requirements, self.hypotheses.unwrap_or_default())),
            (None, Some(data)) => {
                let mut hypotheses = data.hypotheses;
                hypotheses.extend(self.hypotheses.unwrap_or_default());
                Ok((data.requirements, hypotheses))
            }
            (None, None) => Err(OracleError::Malformed(
                "reply has no requirements list".to_string(),
            )),
        }
    }
}

/// Reply to a fix request; `null` means the requirement cannot be fixed.
#[derive(Debug, Deserialize)]
pub struct FixReply {
    requirement: Option<Value>,
}

/// Text that may arrive as one string or a list of strings.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TextOrList {
    Text(String),
    List(Vec<String>),
}

impl TextOrList {
    fn into_vec(self) -> Vec<String> {
        match self {
            Self::Text(text) if text.trim().is_empty() => Vec::new(),
            Self::Text(text) => vec![text],
            Self::List(items) => items.into_iter().filter(|s| !s.trim().is_empty()).collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct CitationEntry {
    #[serde(default, alias = "quote")]
    text: String,
    #[serde(default, alias = "doc_id")]
    document: Option<String>,
    #[serde(default, alias = "loc")]
    section: Option<String>,
    #[serde(default)]
    line_number: Option<i64>,
    #[serde(default)]
    page_number: Option<u32>,
    #[serde(default)]
    paragraph: Option<String>,
    #[serde(default)]
    location: Option<SourceLocation>,
    #[serde(default)]
    context: Option<String>,
}

impl From<CitationEntry> for Citation {
    fn from(entry: CitationEntry) -> Self {
        let mut location = entry.location.unwrap_or_default();
        if let Some(document) = entry.document {
            location.document = document;
        }
        location.section = entry.section.or(location.section);
        location.line_number = entry.line_number.or(location.line_number);
        location.page_number = entry.page_number.or(location.page_number);
        location.paragraph = entry.paragraph.or(location.paragraph);
        Self {
            text: entry.text,
            location,
            context: entry.context,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CriterionEntry {
    Text(String),
    Full {
        #[serde(default)]
        id: Option<String>,
        description: String,
        #[serde(default)]
        testable: Option<bool>,
    },
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CriteriaEntry {
    One(CriterionEntry),
    Many(Vec<CriterionEntry>),
}

impl CriteriaEntry {
    fn into_criteria(self) -> Vec<AcceptanceCriterion> {
        let entries = match self {
            Self::One(entry) => vec![entry],
            Self::Many(entries) => entries,
        };
        entries
            .into_iter()
            .filter_map(|entry| match entry {
                CriterionEntry::Text(text) if text.trim().is_empty() => None,
                CriterionEntry::Text(text) => Some(AcceptanceCriterion::new(text)),
                CriterionEntry::Full {
                    id,
                    description,
                    testable,
                } => {
                    let mut criterion = AcceptanceCriterion::new(description);
                    if let Some(id) = id.filter(|id| !id.is_empty()) {
                        criterion.id = id;
                    }
                    criterion.testable = testable.unwrap_or(true);
                    Some(criterion)
                }
            })
            .collect()
    }
}

#[derive(Debug, Deserialize)]
struct RequirementEntry {
    #[serde(default, alias = "br_id", alias = "요구사항 ID")]
    id: Option<String>,
    #[serde(default, alias = "요구사항명")]
    title: Option<String>,
    #[serde(default, alias = "고객 요구사항 상세 내용")]
    description: Option<String>,
    #[serde(default, alias = "type")]
    requirement_type: Option<String>,
    #[serde(default, alias = "우선순위")]
    priority: Option<String>,
    #[serde(default, alias = "근거인용")]
    citations: Option<Vec<CitationEntry>>,
    #[serde(default, alias = "이해관계자")]
    stakeholders: Option<TextOrList>,
    #[serde(default, alias = "가치/효익(초안)")]
    business_value: Option<String>,
    #[serde(default, alias = "수용기준(초안)")]
    acceptance_criteria: Option<CriteriaEntry>,
    #[serde(default, alias = "별칭/동의어")]
    tags: Option<TextOrList>,
    #[serde(default, alias = "중복병합근거")]
    dependencies: Option<TextOrList>,
    #[serde(default)]
    conflicts: Option<TextOrList>,
    #[serde(default)]
    assumptions: Option<TextOrList>,
    #[serde(default, alias = "제약사항")]
    constraints: Option<TextOrList>,
    #[serde(default, alias = "비고")]
    notes: Option<String>,
}

impl From<RequirementEntry> for BusinessRequirement {
    fn from(entry: RequirementEntry) -> Self {
        let list = |field: Option<TextOrList>| field.map(TextOrList::into_vec).unwrap_or_default();

        let mut requirement = Self::new(
            entry
                .title
                .filter(|t| !t.trim().is_empty())
                .unwrap_or_else(|| "Untitled Requirement".to_string()),
            entry.description.unwrap_or_default(),
        );
        if let Some(id) = entry.id.filter(|id| !id.trim().is_empty()) {
            requirement.id = id;
        }
        requirement.requirement_type = entry
            .requirement_type
            .as_deref()
            .and_then(RequirementType::from_str)
            .unwrap_or_default();
        requirement.priority = entry
            .priority
            .as_deref()
            .map(Priority::from_label)
            .unwrap_or_default();
        requirement.citations = entry
            .citations
            .unwrap_or_default()
            .into_iter()
            .map(Citation::from)
            .collect();
        requirement.stakeholders = list(entry.stakeholders);
        requirement.business_value = entry.business_value.filter(|v| !v.trim().is_empty());
        requirement.acceptance_criteria = entry
            .acceptance_criteria
            .map(CriteriaEntry::into_criteria)
            .unwrap_or_default();
        requirement.tags = list(entry.tags);
        requirement.dependencies = list(entry.dependencies);
        requirement.conflicts = list(entry.conflicts);
        requirement.assumptions = list(entry.assumptions);
        requirement.constraints = list(entry.constraints);
        requirement.notes = entry.notes.filter(|n| !n.trim().is_empty());
        requirement
    }
}

#[derive(Debug, Deserialize)]
struct HypothesisEntry {
    #[serde(default, alias = "hypothesis_id")]
    id: Option<String>,
    description: String,
    #[serde(default)]
    rationale: String,
    #[serde(default, alias = "confidence_level")]
    confidence: Option<f64>,
    #[serde(default)]
    evidence_needed: Option<TextOrList>,
}

impl From<HypothesisEntry> for HypothesisRequirement {
    fn from(entry: HypothesisEntry) -> Self {
        let mut hypothesis =
            Self::new(entry.description, entry.rationale, entry.confidence.unwrap_or(0.5));
        if let Some(id) = entry.id.filter(|id| !id.trim().is_empty()) {
            hypothesis.id = id;
        }
        hypothesis.evidence_needed = entry
            .evidence_needed
            .map(TextOrList::into_vec)
            .unwrap_or_default();
        hypothesis
    }
}

/// Read one requirement entry, or `None` if it is not a usable object.
pub fn parse_requirement(value: Value) -> Option<BusinessRequirement> {
    match serde_json::from_value::<RequirementEntry>(value) {
        Ok(entry) => Some(entry.into()),
        Err(e) => {
            warn!(error = %e, "skipping unreadable requirement entry");
            None
        }
    }
}

fn parse_hypothesis(value: Value) -> Option<HypothesisRequirement> {
    match serde_json::from_value::<HypothesisEntry>(value) {
        Ok(entry) => Some(entry.into()),
        Err(e) => {
            warn!(error = %e, "skipping unreadable hypothesis entry");
            None
        }
    }
}

fn ingest(requirements: Vec<Value>, hypotheses: Vec<Value>) -> Draft {
    Draft {
        requirements: requirements.into_iter().filter_map(parse_requirement).collect(),
        hypotheses: hypotheses.into_iter().filter_map(parse_hypothesis).collect(),
    }
}

/// Map a gateway failure into the value the fallback should use, keeping
/// cancellation fatal.
fn oracle_failure(err: OracleCallError) -> DomainResult<OracleError> {
    match err {
        OracleCallError::Cancelled => Err(DomainError::Cancelled),
        OracleCallError::Oracle(e) => Ok(e),
    }
}

/// Placeholder requirement used when the first draft cannot be produced.
pub fn placeholder_requirement(document: &str, err: &OracleError) -> BusinessRequirement {
    BusinessRequirement::new(
        "Draft unavailable",
        format!(
            "Requirements could not be extracted from {document}: {err}. \
             Check the oracle configuration and run the pipeline again."
        ),
    )
    .with_citation(Citation::new(
        "requirement extraction unavailable",
        SourceLocation::in_document(document),
    ))
    .with_stakeholder("System")
}

// ============================================================================
// Role
// ============================================================================

/// The drafting role adapter.
pub struct DraftingRole {
    gateway: Arc<OracleGateway>,
    instructions: String,
    excerpt_chars: usize,
    temperature: f32,
}

impl DraftingRole {
    /// Create the role with a 2000 character excerpt budget per document
    /// and temperature 0.1.
    ///
    /// # Arguments
    ///
    /// * `gateway` - Shared gateway carrying retry, timeouts and cancellation
    /// * `instructions` - Standing instructions sent with every request
    pub fn new(gateway: Arc<OracleGateway>, instructions: impl Into<String>) -> Self {
        Self {
            gateway,
            instructions: instructions.into(),
            excerpt_chars: 2000,
            temperature: 0.1,
        }
    }

    /// Characters of each document included in drafting payloads.
    pub const fn with_excerpt_chars(mut self, excerpt_chars: usize) -> Self {
        self.excerpt_chars = excerpt_chars;
        self
    }

    /// Sampling temperature sent with every drafting request.
    pub const fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    fn request(&self, payload: String) -> OracleRequest {
        OracleRequest::json(Role::Drafting, self.instructions.clone(), payload)
            .with_temperature(self.temperature)
    }

    async fn ask_for_draft(
        &self,
        stage: PipelineStage,
        payload: String,
        cancel: &CancellationToken,
    ) -> Result<Draft, OracleCallError> {
        let reply: DraftReply = self
            .gateway
            .request(stage, self.request(payload), cancel)
            .await?;
        let (requirements, hypotheses) = reply.into_lists()?;
        Ok(ingest(requirements, hypotheses))
    }

    /// Stage 1: produce a first draft from the documents.
    ///
    /// Any oracle failure yields a single placeholder requirement naming
    /// the first document and the failure.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::Cancelled`] when `cancel` fires. Oracle
    /// failures never surface.
    pub async fn draft(
        &self,
        documents: &DocumentSet,
        cancel: &CancellationToken,
    ) -> DomainResult<Draft> {
        let payload = prompts::draft_payload(documents, self.excerpt_chars);
        match self
            .ask_for_draft(PipelineStage::DRAFTING, payload, cancel)
            .await
        {
            Ok(draft) => {
                info!(
                    requirements = draft.requirements.len(),
                    hypotheses = draft.hypotheses.len(),
                    "initial draft produced"
                );
                Ok(draft)
            }
            Err(err) => {
                let err = oracle_failure(err)?;
                warn!(error = %err, "drafting failed, using placeholder");
                let requirements = documents
                    .keys()
                    .next()
                    .map(|first| vec![placeholder_requirement(first, &err)])
                    .unwrap_or_default();
                Ok(Draft {
                    requirements,
                    hypotheses: Vec::new(),
                })
            }
        }
    }

    /// Stage 2: refine a draft. On failure the input comes back unchanged.
    pub async fn improve(
        &self,
        draft: Draft,
        documents: &DocumentSet,
        cancel: &CancellationToken,
    ) -> DomainResult<Draft> {
        let payload = prompts::improve_payload(
            &draft.requirements,
            &draft.hypotheses,
            documents,
            self.excerpt_chars,
        );
        match self
            .ask_for_draft(PipelineStage::SELF_IMPROVEMENT, payload, cancel)
            .await
        {
            Ok(improved) => {
                info!(
                    before = draft.requirements.len(),
                    after = improved.requirements.len(),
                    hypotheses = improved.hypotheses.len(),
                    "draft improved"
                );
                Ok(improved)
            }
            Err(err) => {
                let err = oracle_failure(err)?;
                warn!(error = %err, "self-improvement failed, keeping current draft");
                Ok(draft)
            }
        }
    }

    /// Stage 5: address verification issues requirement by requirement.
    ///
    /// Requirements with critical errors that cannot be corrected are dropped.
    /// Requirements with only justification gaps are kept, improved when
    /// possible. Requirements without issues pass through.
    ///
    /// # Arguments
    ///
    /// * `requirements` - Current requirements, consumed
    /// * `issues` - Findings of the last pass, matched by requirement id
    /// * `documents` - Source texts quoted into the fix payloads
    /// * `cancel` - Cancellation of the running session
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::Cancelled`] when `cancel` fires.
    pub async fn fix_issues(
        &self,
        requirements: Vec<BusinessRequirement>,
        issues: &[VerificationIssue],
        documents: &DocumentSet,
        cancel: &CancellationToken,
    ) -> DomainResult<Vec<BusinessRequirement>> {
        let mut fixed = Vec::with_capacity(requirements.len());
        let mut dropped = 0usize;

        for requirement in requirements {
            let own: Vec<&VerificationIssue> = issues
                .iter()
                .filter(|i| i.requirement_id == requirement.id)
                .collect();
            if own.is_empty() {
                fixed.push(requirement);
                continue;
            }

            let critical: Vec<&VerificationIssue> =
                own.iter().copied().filter(|i| i.is_critical()).collect();

            if critical.is_empty() {
                let payload =
                    prompts::fix_gap_payload(&requirement, &own, documents, self.excerpt_chars);
                match self.ask_for_fix(payload, &requirement.id, cancel).await? {
                    Some(improved) => fixed.push(improved),
                    None => fixed.push(requirement),
                }
            } else {
                let payload = prompts::fix_critical_payload(
                    &requirement,
                    &critical,
                    documents,
                    self.excerpt_chars,
                );
                match self.ask_for_fix(payload, &requirement.id, cancel).await? {
                    Some(corrected) => fixed.push(corrected),
                    None => {
                        debug!(requirement_id = %requirement.id, "dropping unfixable requirement");
                        dropped += 1;
                    }
                }
            }
        }

        info!(kept = fixed.len(), dropped, "fix step finished");
        Ok(fixed)
    }

    /// Ask for a replacement requirement. `Ok(None)` covers oracle failure,
    /// an explicit `null`, and an unreadable entry; the replacement keeps the
    /// original id so issues stay traceable.
    async fn ask_for_fix(
        &self,
        payload: String,
        requirement_id: &str,
        cancel: &CancellationToken,
    ) -> DomainResult<Option<BusinessRequirement>> {
        let reply: FixReply = match self
            .gateway
            .request(PipelineStage::FIXING, self.request(payload), cancel)
            .await
        {
            Ok(reply) => reply,
            Err(err) => {
                let err = oracle_failure(err)?;
                warn!(requirement_id, error = %err, "fix request failed");
                return Ok(None);
            }
        };

        Ok(reply
            .requirement
            .filter(|v| !v.is_null())
            .and_then(parse_requirement)
            .map(|r| r.with_id(requirement_id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::oracle::ScriptedOracle;
    use crate::services::retry::RetryPolicy;
    use serde_json::json;

    fn documents() -> DocumentSet {
        let mut docs = DocumentSet::new();
        docs.insert(
            "rfp.md".into(),
            "The system shall export monthly reports.".into(),
        );
        docs
    }

    fn role(oracle: Arc<ScriptedOracle>) -> DraftingRole {
        let gateway = Arc::new(OracleGateway::new(oracle, RetryPolicy::immediate(1)));
        DraftingRole::new(gateway, "draft")
    }

    #[test]
    fn test_parse_korean_entry() {
        let value = json!({
            "요구사항 ID": "BR_001",
            "요구사항명": "월간 보고서",
            "고객 요구사항 상세 내용": "시스템은 월간 보고서를 내보내야 한다",
            "우선순위": "높음",
            "근거인용": [{"quote": "월간 보고서", "doc_id": "rfp.md", "loc": "2.1"}],
            "이해관계자": ["재무팀"],
            "수용기준(초안)": "CSV 다운로드 가능",
            "제약사항": "온프레미스",
            "비고": "확인 필요"
        });

        let req = parse_requirement(value).unwrap();
        assert_eq!(req.id, "BR_001");
        assert_eq!(req.title, "월간 보고서");
        assert_eq!(req.priority, Priority::High);
        assert_eq!(req.citations[0].text, "월간 보고서");
        assert_eq!(req.citations[0].location.document, "rfp.md");
        assert_eq!(req.citations[0].location.section.as_deref(), Some("2.1"));
        assert_eq!(req.stakeholders, vec!["재무팀"]);
        assert_eq!(req.acceptance_criteria.len(), 1);
        assert!(req.acceptance_criteria[0].id.starts_with("AC_"));
        assert_eq!(req.constraints, vec!["온프레미스"]);
        assert_eq!(req.notes.as_deref(), Some("확인 필요"));
    }

    #[test]
    fn test_parse_english_entry_with_defaults() {
        let req = parse_requirement(json!({
            "description": "Export reports",
            "requirement_type": "non-functional",
            "citations": [{"text": "export", "location": {"document": "rfp.md", "line_number": 4}}]
        }))
        .unwrap();
        assert!(req.id.starts_with("BR_"));
        assert_eq!(req.title, "Untitled Requirement");
        assert_eq!(req.requirement_type, RequirementType::NonFunctional);
        assert_eq!(req.priority, Priority::Medium);
        assert_eq!(req.citations[0].location.line_number, Some(4));
    }

    #[test]
    fn test_non_object_entries_are_skipped() {
        let draft = ingest(
            vec![json!("just text"), json!({"title": "Kept"}), json!(42)],
            vec![json!({"description": "Maybe", "confidence": 3.0}), json!(null)],
        );
        assert_eq!(draft.requirements.len(), 1);
        assert_eq!(draft.requirements[0].title, "Kept");
        assert_eq!(draft.hypotheses.len(), 1);
        assert!((draft.hypotheses[0].confidence - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_draft_reply_accepts_nested_data() {
        let reply: DraftReply = serde_json::from_value(json!({
            "data": {"requirements": [{"title": "A"}]},
            "hypotheses": [{"description": "H"}]
        }))
        .unwrap();
        let (reqs, hyps) = reply.into_lists().unwrap();
        assert_eq!(reqs.len(), 1);
        assert_eq!(hyps.len(), 1);

        let empty: DraftReply = serde_json::from_value(json!({"summary": "none"})).unwrap();
        assert!(matches!(empty.into_lists(), Err(OracleError::Malformed(_))));
    }

    #[tokio::test]
    async fn test_draft_failure_yields_single_placeholder() {
        let oracle = Arc::new(ScriptedOracle::new());
        oracle.push(
            Role::Drafting,
            Err(OracleError::Malformed("not json".into())),
        );

        let draft = role(oracle)
            .draft(&documents(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(draft.requirements.len(), 1);
        assert!(draft.hypotheses.is_empty());
        let placeholder = &draft.requirements[0];
        assert_eq!(placeholder.title, "Draft unavailable");
        assert!(placeholder.description.contains("rfp.md"));
        assert_eq!(placeholder.citations[0].location.document, "rfp.md");
    }

    #[tokio::test]
    async fn test_draft_failure_without_documents_is_empty() {
        let oracle = Arc::new(ScriptedOracle::new());
        let draft = role(oracle)
            .draft(&DocumentSet::new(), &CancellationToken::new())
            .await
            .unwrap();
        assert!(draft.requirements.is_empty());
    }

    #[tokio::test]
    async fn test_improve_failure_returns_input() {
        let oracle = Arc::new(ScriptedOracle::new());
        oracle.push(Role::Drafting, Err(OracleError::Auth("401".into())));
        let input = Draft {
            requirements: vec![BusinessRequirement::new("Export", "Export reports")],
            hypotheses: vec![],
        };

        let output = role(oracle)
            .improve(input.clone(), &documents(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(output, input);
    }

    #[tokio::test]
    async fn test_fix_drops_unfixable_and_keeps_gaps() {
        let oracle = Arc::new(ScriptedOracle::new());
        // critical requirement: explicit null
        oracle.push(Role::Drafting, Ok(json!({"requirement": null})));
        // gap-only requirement: oracle failure
        oracle.push(Role::Drafting, Err(OracleError::Transient("503".into())));

        let broken = BusinessRequirement::new("Broken", "No source");
        let weak = BusinessRequirement::new("Weak", "Thin citation");
        let clean = BusinessRequirement::new("Clean", "Fine");
        let issues = vec![
            VerificationIssue::critical(&broken.id, "citation not found"),
            VerificationIssue::gap(&weak.id, crate::domain::models::Severity::Low, "no stakeholders"),
        ];

        let fixed = role(oracle.clone())
            .fix_issues(
                vec![broken, weak.clone(), clean.clone()],
                &issues,
                &documents(),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(fixed, vec![weak, clean]);
        assert_eq!(oracle.calls_for(Role::Drafting), 2);
    }

    #[tokio::test]
    async fn test_fix_replacement_keeps_original_id() {
        let oracle = Arc::new(ScriptedOracle::new());
        oracle.push(
            Role::Drafting,
            Ok(json!({"requirement": {"id": "BR_other", "title": "Fixed", "description": "Now cited"}})),
        );
        let broken = BusinessRequirement::new("Broken", "No source");
        let issues = vec![VerificationIssue::critical(&broken.id, "no citations")];

        let fixed = role(oracle)
            .fix_issues(vec![broken.clone()], &issues, &documents(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(fixed.len(), 1);
        assert_eq!(fixed[0].id, broken.id);
        assert_eq!(fixed[0].title, "Fixed");
    }

    #[tokio::test]
    async fn test_cancellation_is_not_swallowed_by_fallback() {
        let oracle = Arc::new(ScriptedOracle::new());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = role(oracle).draft(&documents(), &cancel).await;
        assert!(matches!(result, Err(DomainError::Cancelled)));
    }
}
