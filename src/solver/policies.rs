//! Loop and ambiguity heuristics as standalone, testable policy functions.
//!
//! These are deliberately literal pattern checks carried over from the
//! production behavior of the source system. Do not widen them without
//! product input: the ambiguity rule is precision-first (a vague query that
//! slips through still gets answered; a blocked legitimate query is worse),
//! and the oscillation rule matches exactly one four-step pattern.

use crate::tools::ToolKind;

/// Content-free phrasings that suggest the user has not asked anything yet.
const VAGUE_PATTERNS: &[&str] = &[
    "what does this mean",
    "what is this",
    "explain this",
    "help me understand",
    "i don't get it",
    "what happened",
    "huh",
    "???",
];

/// Domain terms whose presence marks a query as answerable regardless of
/// length or phrasing.
const CRM_KEYWORDS: &[&str] = &[
    "lead",
    "contact",
    "account",
    "opportunity",
    "deal",
    "pipeline",
    "revenue",
    "sales",
    "activity",
    "campaign",
    "top",
    "show",
    "list",
    "find",
    "get",
    "what",
    "how many",
    "total",
    "count",
    "amount",
];

/// Conservative vagueness check: flags a query only if it is very short
/// (< 5 words) AND matches a vague pattern AND contains no domain keyword.
pub fn is_vague_query(query: &str) -> bool {
    let query_lower = query.to_lowercase();
    let query_lower = query_lower.trim();

    let is_short = query.split_whitespace().count() < 5;
    let matches_vague = VAGUE_PATTERNS.iter().any(|p| query_lower.contains(p));
    let has_crm_keyword = CRM_KEYWORDS.iter().any(|kw| query_lower.contains(kw));

    matches_vague && is_short && !has_crm_keyword
}

/// Forced stop: once a read succeeded and a reasoning pass succeeded and we
/// are at step two or later, further iteration rarely adds anything.
pub fn should_force_stop(has_read_data: bool, has_reasoned: bool, step_count: usize) -> bool {
    has_read_data && has_reasoned && step_count >= 2
}

/// Oscillation guard: the last four tool selections exactly match the
/// read/reason/read/reason alternation that marks a stuck loop.
pub fn is_read_reason_oscillation(recent_kinds: &[ToolKind]) -> bool {
    recent_kinds.len() >= 4
        && recent_kinds[recent_kinds.len() - 4..]
            == [
                ToolKind::Read,
                ToolKind::Reasoning,
                ToolKind::Read,
                ToolKind::Reasoning,
            ]
}
