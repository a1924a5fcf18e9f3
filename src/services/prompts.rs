//! Role instructions and task payload builders.
//!
//! Instructions default to built-in text and can be overridden per role with
//! `drafting_prompt.txt` / `verifying_prompt.txt` in the configured prompts
//! directory. Lines starting with `#` in those files are dropped.

use std::fmt::Write as _;
use std::path::Path;

use tracing::{debug, warn};

use crate::domain::models::{BusinessRequirement, HypothesisRequirement, PromptConfig, VerificationIssue};
use crate::domain::ports::DocumentSet;

/// File names looked up in the configured prompts directory.
pub const DRAFTING_PROMPT_FILE: &str = "drafting_prompt.txt";
pub const VERIFYING_PROMPT_FILE: &str = "verifying_prompt.txt";

/// Characters of context taken on each side of a citation for semantic checks.
pub const SEMANTIC_CONTEXT_CHARS: usize = 200;
/// Characters of context taken on each side of a citation for numeric checks.
pub const NUMERIC_CONTEXT_CHARS: usize = 300;

const DEFAULT_DRAFTING_INSTRUCTIONS: &str = "\
You are a business analyst extracting business requirements from RFP and project documents.
Every requirement must be backed by at least one citation quoting the source text exactly,
together with the document name it came from. Keep each requirement atomic, clear, consistent
and verifiable. When the documents do not give enough evidence for a requirement, record it as a
hypothesis with a rationale and a confidence between 0 and 1 instead.

Requirement objects use these fields: id, title, description, requirement_type (functional,
non_functional, business_rule, constraint, assumption, dependency), priority (critical, high,
medium, low), citations [{text, document, section, line_number}], stakeholders, business_value,
acceptance_criteria, tags, dependencies, constraints, notes.
Hypothesis objects use: id, description, rationale, confidence, evidence_needed.
Always reply with a single JSON object.";

const DEFAULT_VERIFYING_INSTRUCTIONS: &str = "\
You are a strict requirements reviewer. You check business requirements against the source text
they cite. Report only concrete problems: statements the citations do not support, distorted or
over-generalised readings, compound requirements that should be split, and numbers, units or
thresholds that differ from the source. Each problem has a severity (low, medium, high,
critical), a description and a suggested_fix. Always reply with a single JSON object.";

/// Instructions given to each role with every request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleInstructions {
    /// Standing instructions of the drafting role
    pub drafting: String,
    /// Standing instructions of the verifying role
    pub verifying: String,
}

impl Default for RoleInstructions {
    fn default() -> Self {
        Self {
            drafting: DEFAULT_DRAFTING_INSTRUCTIONS.to_string(),
            verifying: DEFAULT_VERIFYING_INSTRUCTIONS.to_string(),
        }
    }
}

impl RoleInstructions {
    /// Load instructions, falling back to the built-in text for any role
    /// without a readable, non-empty override file.
    ///
    /// # Arguments
    ///
    /// * `config` - The `prompts` config section; without a directory the
    ///   built-in text is used for both roles
    pub fn load(config: &PromptConfig) -> Self {
        let defaults = Self::default();
        let Some(dir) = config.directory.as_deref() else {
            return defaults;
        };
        Self {
            drafting: load_override(dir, DRAFTING_PROMPT_FILE).unwrap_or(defaults.drafting),
            verifying: load_override(dir, VERIFYING_PROMPT_FILE).unwrap_or(defaults.verifying),
        }
    }
}

fn load_override(dir: &Path, file: &str) -> Option<String> {
    let path = dir.join(file);
    match std::fs::read_to_string(&path) {
        Ok(raw) => {
            let text = strip_comment_lines(&raw);
            if text.is_empty() {
                warn!(path = %path.display(), "prompt override is empty, using built-in instructions");
                None
            } else {
                debug!(path = %path.display(), "loaded prompt override");
                Some(ensure_json_hint(&text))
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to read prompt override");
            None
        }
    }
}

/// Drop lines whose first non-blank character is `#`.
pub fn strip_comment_lines(raw: &str) -> String {
    raw.lines()
        .filter(|line| !line.trim_start().starts_with('#'))
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

/// Append a JSON reply reminder unless the text already mentions JSON.
pub fn ensure_json_hint(instructions: &str) -> String {
    if instructions.to_lowercase().contains("json") {
        instructions.to_string()
    } else {
        format!("{instructions}\n\nReply with a single valid JSON object.")
    }
}

/// First `max_chars` characters of `text`.
pub fn excerpt(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte, _)) => &text[..byte],
        None => text,
    }
}

/// The first occurrence of `quote` in `text` with up to `radius` characters
/// on each side, or `None` when the quote does not occur.
pub fn citation_window<'a>(text: &'a str, quote: &str, radius: usize) -> Option<&'a str> {
    if quote.is_empty() {
        return None;
    }
    let start = text.find(quote)?;
    let end = start + quote.len();

    let from = if radius == 0 {
        start
    } else {
        text[..start]
            .char_indices()
            .rev()
            .take(radius)
            .last()
            .map_or(start, |(i, _)| i)
    };
    let to = text[end..]
        .char_indices()
        .nth(radius)
        .map_or(text.len(), |(i, _)| end + i);

    Some(&text[from..to])
}

/// Numeric tokens in `text`, e.g. `99.9` and `24` in "99.9% within 24 hours".
pub fn extract_numbers(text: &str) -> Vec<String> {
    let mut numbers = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if c.is_ascii_digit() {
            current.push(c);
        } else if c == '.'
            && !current.is_empty()
            && !current.contains('.')
            && chars.peek().is_some_and(char::is_ascii_digit)
        {
            current.push(c);
        } else if !current.is_empty() {
            numbers.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        numbers.push(current);
    }
    numbers
}

fn to_json<T: serde::Serialize>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| "[]".to_string())
}

fn push_documents(payload: &mut String, documents: &DocumentSet, excerpt_chars: usize) {
    for (name, text) in documents {
        let shown = excerpt(text, excerpt_chars);
        let _ = write!(payload, "\n--- {name} ---\n{shown}");
        if shown.len() < text.len() {
            payload.push_str("\n[truncated]");
        }
        payload.push('\n');
    }
}

fn push_citation_context(
    payload: &mut String,
    requirement: &BusinessRequirement,
    documents: &DocumentSet,
    radius: usize,
) {
    for citation in &requirement.citations {
        let window = documents
            .get(&citation.location.document)
            .and_then(|text| citation_window(text, &citation.text, radius));
        if let Some(window) = window {
            let _ = write!(
                payload,
                "\n--- Citation from {} ---\n{window}\n",
                citation.location.document
            );
        }
    }
}

fn push_requirement_header(payload: &mut String, requirement: &BusinessRequirement) {
    let _ = write!(
        payload,
        "Requirement ID: {}\nTitle: {}\nDescription: {}\n",
        requirement.id, requirement.title, requirement.description
    );
}

/// Stage 1: extract requirements from the documents.
pub fn draft_payload(documents: &DocumentSet, excerpt_chars: usize) -> String {
    let mut payload = String::from(
        "Extract business requirements from the documents below.\n\
         For each requirement:\n\
         1. Quote the supporting source text exactly and name the document it came from.\n\
         2. Keep it clear, complete, consistent and verifiable.\n\
         3. If evidence is insufficient, add it to hypotheses instead.\n\n\
         Reply as {\"requirements\": [...], \"hypotheses\": [...]}.\n\nDocuments:\n",
    );
    push_documents(&mut payload, documents, excerpt_chars);
    payload
}

/// Stage 2: improve an existing draft.
pub fn improve_payload(
    requirements: &[BusinessRequirement],
    hypotheses: &[HypothesisRequirement],
    documents: &DocumentSet,
    excerpt_chars: usize,
) -> String {
    let mut payload = format!(
        "Improve the requirements draft below:\n\
         1. Add missing requirements and remove duplicates or ambiguous ones.\n\
         2. Scan the documents section by section (strategy, services, data, regulation, constraints).\n\
         3. Split compound requirements into atomic ones.\n\
         4. Strengthen citations and traceability.\n\n\
         Current requirements: {} items\nCurrent hypotheses: {} items\n\n\
         Reply with the complete improved set as {{\"requirements\": [...], \"hypotheses\": [...]}}.\n\n\
         Requirements:\n{}\n\nHypotheses:\n{}\n\nDocuments:\n",
        requirements.len(),
        hypotheses.len(),
        to_json(&requirements),
        to_json(&hypotheses),
    );
    push_documents(&mut payload, documents, excerpt_chars);
    payload
}

/// Stage 5: correct a requirement with critical errors.
pub fn fix_critical_payload(
    requirement: &BusinessRequirement,
    issues: &[&VerificationIssue],
    documents: &DocumentSet,
    excerpt_chars: usize,
) -> String {
    let mut payload = String::from(
        "The business requirement below has critical errors. Correct it using the source \
         documents. If it cannot be supported by the documents, reply {\"requirement\": null}.\n\
         Otherwise reply {\"requirement\": {...}} with the corrected requirement.\n\n",
    );
    push_fix_body(&mut payload, requirement, issues, documents, excerpt_chars);
    payload
}

/// Stage 5: strengthen a requirement with justification gaps.
pub fn fix_gap_payload(
    requirement: &BusinessRequirement,
    issues: &[&VerificationIssue],
    documents: &DocumentSet,
    excerpt_chars: usize,
) -> String {
    let mut payload = String::from(
        "The business requirement below has weak justification. Improve its citations, \
         stakeholders and wording using the source documents.\n\
         Reply {\"requirement\": {...}} with the improved requirement.\n\n",
    );
    push_fix_body(&mut payload, requirement, issues, documents, excerpt_chars);
    payload
}

fn push_fix_body(
    payload: &mut String,
    requirement: &BusinessRequirement,
    issues: &[&VerificationIssue],
    documents: &DocumentSet,
    excerpt_chars: usize,
) {
    let _ = write!(payload, "Requirement:\n{}\n\nIssues found:\n", to_json(requirement));
    for issue in issues {
        let _ = writeln!(payload, "- {}", issue.description);
        if let Some(fix) = &issue.suggested_fix {
            let _ = writeln!(payload, "  suggested fix: {fix}");
        }
    }
    payload.push_str("\nDocuments:\n");
    push_documents(payload, documents, excerpt_chars);
}

/// Semantic consistency check of one requirement against its citations.
pub fn semantic_payload(requirement: &BusinessRequirement, documents: &DocumentSet) -> String {
    let mut payload = String::from("Check the semantic consistency of this business requirement.\n\n");
    push_requirement_header(&mut payload, requirement);
    payload.push_str("\nCited context:\n");
    push_citation_context(&mut payload, requirement, documents, SEMANTIC_CONTEXT_CHARS);
    payload.push_str(
        "\nCheck:\n\
         1. Does the description mean the same as the cited text?\n\
         2. Does it reflect the intent of the source document?\n\
         3. Does it add interpretation the citations do not support?\n\
         4. Does it distort or over-generalise the cited text?\n\n\
         Reply {\"semantic_issues\": [{\"severity\": \"low|medium|high|critical\", \
         \"description\": \"...\", \"suggested_fix\": \"...\"}]} or {\"semantic_issues\": []}.",
    );
    payload
}

/// Atomicity check of one requirement.
pub fn atomicity_payload(requirement: &BusinessRequirement) -> String {
    let mut payload = String::from("Check whether this business requirement is atomic.\n\n");
    push_requirement_header(&mut payload, requirement);
    payload.push_str(
        "\nCheck:\n\
         1. Does it describe exactly one capability or constraint?\n\
         2. Are several independent requirements merged into one?\n\
         3. Are requirements chained with conjunctions such as \"and\" or \"as well as\"?\n\
         4. Does it mix different stakeholders or system areas?\n\n\
         Reply {\"atomicity_issues\": [{\"severity\": \"low|medium|high\", \
         \"description\": \"...\", \"suggested_fix\": \"...\"}]} or {\"atomicity_issues\": []}.",
    );
    payload
}

/// Numeric accuracy check of one requirement against its citations.
pub fn numeric_payload(
    requirement: &BusinessRequirement,
    numbers: &[String],
    documents: &DocumentSet,
) -> String {
    let mut payload = String::from("Check the numeric accuracy of this business requirement.\n\n");
    push_requirement_header(&mut payload, requirement);
    let _ = write!(payload, "\nNumbers in the requirement: {}\n", numbers.join(", "));
    payload.push_str("\nSource context:\n");
    push_citation_context(&mut payload, requirement, documents, NUMERIC_CONTEXT_CHARS);
    payload.push_str(
        "\nCheck:\n\
         1. Do all values match the source exactly?\n\
         2. Are conditions attached to the numbers preserved?\n\
         3. Are units and measurement bases correct?\n\
         4. Do ranges and thresholds match the source?\n\n\
         Reply {\"numerical_issues\": [{\"severity\": \"low|medium|high|critical\", \
         \"description\": \"...\", \"suggested_fix\": \"...\"}]} or {\"numerical_issues\": []}.",
    );
    payload
}
