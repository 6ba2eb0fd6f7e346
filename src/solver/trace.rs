//! Reasoning trace entries for observability.
//!
//! The trace is returned to callers verbatim and rendered by the UI; the
//! solver never consults it for control decisions.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// One entry in the ordered reasoning trace.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReasoningStep {
    /// Initial query analysis
    Analysis {
        step: usize,
        content: String,
        timestamp: DateTime<Utc>,
    },
    /// Ambiguity short-circuit
    Clarification {
        step: usize,
        content: String,
        timestamp: DateTime<Utc>,
    },
    /// Tool/goal selection for one iteration
    Planning {
        step: usize,
        context: String,
        sub_goal: String,
        tool: Option<String>,
        timestamp: DateTime<Utc>,
    },
    /// Raw command synthesis for the selected tool
    CommandGeneration {
        step: usize,
        analysis: String,
        explanation: String,
        command: String,
        timestamp: DateTime<Utc>,
    },
    /// Tool invocation outcome
    Execution {
        step: usize,
        tool: String,
        success: bool,
        result_count: usize,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
        timestamp: DateTime<Utc>,
    },
    /// Verifier STOP/CONTINUE verdict
    Verification {
        step: usize,
        analysis: String,
        conclusion: String,
        timestamp: DateTime<Utc>,
    },
    /// Escalated tool-selection failure
    Fallback {
        step: usize,
        content: String,
        reason: String,
        timestamp: DateTime<Utc>,
    },
    /// Final synthesis
    FinalOutput {
        step: usize,
        detailed_solution: String,
        direct_answer: String,
        timestamp: DateTime<Utc>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_type_tag() {
        let step = ReasoningStep::Execution {
            step: 2,
            tool: "CRM_Database_Query".to_string(),
            success: true,
            result_count: 5,
            error: None,
            timestamp: Utc::now(),
        };
        let json = serde_json::to_value(&step).unwrap();
        assert_eq!(json["type"], "execution");
        assert_eq!(json["result_count"], 5);
        assert!(json.get("error").is_none());
    }
}
