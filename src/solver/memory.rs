//! Solve-scoped action memory.
//!
//! An append-only log of executed actions plus the original query. The
//! orchestrator owns and mutates one `Memory` per solve; the planner,
//! executor and verifier only read its bounded projection.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::tools::ToolResult;
use crate::util::clip_with_ellipsis;

/// Character budget for each rendered result in `context_summary`.
const RESULT_CLIP: usize = 200;
/// Character budget for each rendered command in `context_summary`.
const COMMAND_CLIP: usize = 100;

/// One logged step: tool, goal, command, result, timestamp.
///
/// The tool name may be one that is not in the registry when selection
/// failed; the failure result records why.
#[derive(Debug, Clone, Serialize)]
pub struct ActionRecord {
    pub step: usize,
    pub tool: String,
    pub sub_goal: String,
    pub command: String,
    pub result: ToolResult,
    pub timestamp: DateTime<Utc>,
}

/// Append-only log of executed actions for one solve invocation.
#[derive(Debug, Default)]
pub struct Memory {
    query: Option<String>,
    actions: Vec<ActionRecord>,
}

impl Memory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store the original query.
    pub fn set_query(&mut self, query: impl Into<String>) {
        self.query = Some(query.into());
    }

    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    /// Append an executed action. Steps must arrive in order; the orchestrator
    /// numbers them 1..N with no gaps.
    pub fn add_action(
        &mut self,
        step: usize,
        tool: impl Into<String>,
        sub_goal: impl Into<String>,
        command: impl Into<String>,
        result: ToolResult,
    ) {
        debug_assert_eq!(step, self.actions.len() + 1, "step indices must be 1..N");
        self.actions.push(ActionRecord {
            step,
            tool: tool.into(),
            sub_goal: sub_goal.into(),
            command: command.into(),
            result,
            timestamp: Utc::now(),
        });
    }

    pub fn actions(&self) -> &[ActionRecord] {
        &self.actions
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Reset to empty. Called at the start of every solve.
    pub fn clear(&mut self) {
        self.query = None;
        self.actions.clear();
    }

    /// Successful results, in execution order. Final synthesis draws only
    /// from these.
    pub fn successful_results(&self) -> Vec<&ToolResult> {
        self.actions
            .iter()
            .filter(|a| a.result.is_success())
            .map(|a| &a.result)
            .collect()
    }

    /// Rows from the most recent successful action that returned any, used
    /// to give the reasoning tool data context when the model forgot to
    /// embed one.
    pub fn last_successful_rows(&self) -> Option<&[Value]> {
        self.actions
            .iter()
            .rev()
            .filter(|a| a.result.is_success())
            .map(|a| a.result.row_values())
            .find(|rows| !rows.is_empty())
    }

    /// Bounded textual projection for prompt construction. Each result is
    /// clipped to a fixed character budget so prompts cannot grow without
    /// bound.
    pub fn context_summary(&self) -> String {
        if self.actions.is_empty() {
            return "No previous actions.".to_string();
        }

        let mut parts = Vec::new();
        for action in &self.actions {
            parts.push(format!("Step {}: {}", action.step, action.tool));
            parts.push(format!("  Goal: {}", action.sub_goal));
            parts.push(format!(
                "  Command: {}",
                clip_with_ellipsis(&action.command, COMMAND_CLIP)
            ));
            let result_str =
                serde_json::to_string(&action.result).unwrap_or_else(|_| "<unrenderable>".into());
            parts.push(format!(
                "  Result: {}",
                clip_with_ellipsis(&result_str, RESULT_CLIP)
            ));
        }
        parts.join("\n")
    }
}
