//! Tool system for the CRM solver.
//!
//! Tools are the solver's only way to touch data: a read-only SQL query tool,
//! a precomputed analytics tool, and a generation-backed reasoning tool. Each
//! tool owns its command sub-grammar and validates its own input; the registry
//! performs no interpretation. New tools can be added without touching the
//! Planner or Executor as long as they honor this contract.

mod analytics;
mod database;
mod reasoning;

pub use analytics::{AnalyticsMetric, CrmAnalytics};
pub use database::CrmDatabaseQuery;
pub use reasoning::{CrmReasoning, ReasoningTask};

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Maximum rows a tool result carries back to the caller.
pub const MAX_RESULT_ROWS: usize = 100;

/// Broad capability class of a tool.
///
/// The solver's forced-stop and oscillation policies reason about kinds, not
/// concrete tool names, so replacing a tool does not change loop behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    /// Retrieves raw records from the store
    Read,
    /// Computes a precomputed metric
    Metric,
    /// Free-text reasoning over prior results
    Reasoning,
}

/// Static metadata describing a callable tool.
#[derive(Debug, Clone, Serialize)]
pub struct ToolDescriptor {
    /// Unique registry key
    pub name: &'static str,
    /// Human description, shown to the planner
    pub description: &'static str,
    /// Example command strings
    pub demo_commands: &'static [&'static str],
    /// Declared input shape, shown to the command generator
    pub input_shape: &'static str,
    /// Declared output shape
    pub output_shape: &'static str,
    /// Extra schema/metadata text embedded into prompts
    pub metadata: &'static str,
    /// Capability class
    pub kind: ToolKind,
    /// Whether executing this tool calls the generation capability
    pub requires_generation: bool,
}

/// Structured outcome of one tool invocation.
///
/// Never crosses the tool boundary as an error: tools convert every internal
/// failure into `ToolResult::Failure`, which always carries a non-empty
/// error message.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ToolResult {
    Success {
        /// Total matching results (may exceed `rows.len()` when capped)
        result_count: usize,
        /// Result rows, capped at `MAX_RESULT_ROWS`
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        rows: Vec<Value>,
        /// Reasoning text, for reasoning-kind tools
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reasoning: Option<String>,
        /// Metric value, for metric-kind tools
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<Value>,
    },
    Failure {
        /// What went wrong; never empty
        error: String,
        /// The offending command, when known
        #[serde(default, skip_serializing_if = "Option::is_none")]
        command: Option<String>,
    },
}

impl ToolResult {
    /// Successful row retrieval. `rows` is capped at `MAX_RESULT_ROWS`.
    pub fn rows(result_count: usize, mut rows: Vec<Value>) -> Self {
        rows.truncate(MAX_RESULT_ROWS);
        Self::Success {
            result_count,
            rows,
            reasoning: None,
            value: None,
        }
    }

    /// Successful reasoning output.
    pub fn reasoning(text: impl Into<String>) -> Self {
        Self::Success {
            result_count: 1,
            rows: Vec::new(),
            reasoning: Some(text.into()),
            value: None,
        }
    }

    /// Successful metric computation.
    pub fn metric(value: Value) -> Self {
        Self::Success {
            result_count: 1,
            rows: Vec::new(),
            reasoning: None,
            value: Some(value),
        }
    }

    /// Failure with an error message.
    pub fn failure(error: impl Into<String>) -> Self {
        let error = error.into();
        debug_assert!(!error.is_empty());
        Self::Failure {
            error,
            command: None,
        }
    }

    /// Failure carrying the offending command.
    pub fn failure_with_command(error: impl Into<String>, command: impl Into<String>) -> Self {
        let error = error.into();
        debug_assert!(!error.is_empty());
        Self::Failure {
            error,
            command: Some(command.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    pub fn result_count(&self) -> usize {
        match self {
            Self::Success { result_count, .. } => *result_count,
            Self::Failure { .. } => 0,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Success { .. } => None,
            Self::Failure { error, .. } => Some(error),
        }
    }

    /// Result rows, if any.
    pub fn row_values(&self) -> &[Value] {
        match self {
            Self::Success { rows, .. } => rows,
            Self::Failure { .. } => &[],
        }
    }
}

/// Trait for implementing tools.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Static metadata for this tool.
    fn descriptor(&self) -> &ToolDescriptor;

    /// Execute a sanitized command.
    ///
    /// The command grammar is tool-specific; implementations validate and
    /// reject malformed input via `ToolResult::Failure` instead of erroring.
    async fn execute(&self, command: &str) -> ToolResult;
}

/// Fixed name -> tool mapping, constructed once at startup and shared
/// read-only by the Planner and Executor.
#[derive(Default)]
pub struct ToolRegistry {
    tools: BTreeMap<&'static str, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool under its descriptor name.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.descriptor().name, tool);
    }

    /// Look up a tool by exact name.
    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.get(name)
    }

    /// Registered tool names, in stable order.
    pub fn names(&self) -> Vec<&'static str> {
        self.tools.keys().copied().collect()
    }

    /// Descriptors of all registered tools, in stable order.
    pub fn descriptors(&self) -> Vec<&ToolDescriptor> {
        self.tools.values().map(|t| t.descriptor()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_are_capped() {
        let rows: Vec<Value> = (0..250).map(|i| Value::from(i)).collect();
        let result = ToolResult::rows(250, rows);
        match &result {
            ToolResult::Success {
                result_count, rows, ..
            } => {
                assert_eq!(*result_count, 250);
                assert_eq!(rows.len(), MAX_RESULT_ROWS);
            }
            _ => panic!("expected success"),
        }
    }

    #[test]
    fn failure_always_has_error_text() {
        let result = ToolResult::failure_with_command("bad command", "DROP TABLE leads");
        assert!(!result.is_success());
        assert_eq!(result.error(), Some("bad command"));
        assert_eq!(result.result_count(), 0);
    }
}
