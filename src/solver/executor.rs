//! Executor: turns a planned goal into a sanitized tool command and runs it.
//!
//! Model-generated commands arrive wrapped in whatever the model felt like
//! today: code fences, call envelopes, escaped quotes, prose before the
//! statement. Sanitization is per tool kind and best-effort; anything that
//! cannot be salvaged becomes a failure `ToolResult`, never an error.

use std::sync::Arc;

use regex::Regex;

use crate::llm::{GenerationClient, LlmError};
use crate::tools::{ToolKind, ToolRegistry, ToolResult};
use crate::util::clip;

use super::memory::Memory;

/// Parsed ANALYSIS/EXPLANATION/COMMAND response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandFields {
    pub analysis: String,
    pub explanation: String,
    pub command: String,
}

pub struct Executor {
    generation: Arc<dyn GenerationClient>,
    registry: Arc<ToolRegistry>,
}

impl Executor {
    pub fn new(generation: Arc<dyn GenerationClient>, registry: Arc<ToolRegistry>) -> Self {
        Self {
            generation,
            registry,
        }
    }

    /// Ask the generation capability for a raw command for `tool_name`.
    pub async fn generate_command(
        &self,
        query: &str,
        context: &str,
        sub_goal: &str,
        tool_name: &str,
        step_count: usize,
    ) -> Result<String, LlmError> {
        let descriptor = self.registry.get(tool_name).map(|t| t.descriptor());

        let command_instruction = match descriptor.map(|d| d.kind) {
            Some(ToolKind::Read) => {
                "Provide ONLY the raw SQL SELECT statement. Do NOT wrap it in a function call. \
                 Just output the SQL directly.\n\
                 Example: SELECT * FROM opportunities ORDER BY amount DESC LIMIT 10"
            }
            Some(ToolKind::Metric) => {
                "Provide ONLY the metric name.\n\
                 Available metrics: pipeline_value, lead_conversion_rate, win_rate\n\
                 Example: pipeline_value"
            }
            _ => "Provide the command parameters directly.",
        };

        let (description, metadata) = descriptor
            .map(|d| (d.description, d.metadata))
            .unwrap_or(("", ""));

        let prompt = format!(
            "Generate a command for the {tool} tool.\n\n\
             Original Query: {query}\n\
             Current Context: {context}\n\
             Sub-Goal: {sub_goal}\n\
             Current Step: {step}\n\n\
             Tool Information:\n\
             - Name: {tool}\n\
             - Description: {description}\n\
             - Schema/Metadata: {metadata}\n\n\
             IMPORTANT: {instruction}\n\n\
             Output in this format:\n\
             ANALYSIS: <analyze what data is needed>\n\
             EXPLANATION: <explain the command>\n\
             COMMAND: <the raw command - SQL for database queries, metric name for analytics>",
            tool = tool_name,
            query = query,
            context = context,
            sub_goal = sub_goal,
            step = step_count,
            description = description,
            metadata = metadata,
            instruction = command_instruction,
        );

        self.generation.generate(&prompt, None, 600).await
    }

    /// Extract labeled fields from a command-generation response.
    ///
    /// The COMMAND field may continue across unlabeled lines until the next
    /// labeled field or end of text; continuation lines are joined with a
    /// single space.
    pub fn extract_command(raw: &str) -> CommandFields {
        let mut fields = CommandFields::default();
        let lines: Vec<&str> = raw.lines().collect();

        let mut i = 0;
        while i < lines.len() {
            let line = lines[i].trim();
            if let Some(rest) = line.strip_prefix("ANALYSIS:") {
                fields.analysis = rest.trim().to_string();
            } else if let Some(rest) = line.strip_prefix("EXPLANATION:") {
                fields.explanation = rest.trim().to_string();
            } else if let Some(rest) = line.strip_prefix("COMMAND:") {
                let mut command = rest.trim().to_string();
                let mut j = i + 1;
                while j < lines.len() {
                    let next = lines[j].trim();
                    if next.is_empty() || is_labeled(next) {
                        break;
                    }
                    command.push(' ');
                    command.push_str(next);
                    j += 1;
                }
                fields.command = command;
                i = j;
                continue;
            }
            i += 1;
        }

        fields
    }

    /// Sanitize and execute a command against the named tool.
    ///
    /// Returns the sanitized command actually dispatched alongside the
    /// result. Unknown tools and unsalvageable commands come back as failure
    /// results; nothing raises past this boundary.
    pub async fn execute_tool(
        &self,
        tool_name: &str,
        command: &str,
        memory: &Memory,
    ) -> (String, ToolResult) {
        let tool = match self.registry.get(tool_name) {
            Some(tool) => tool,
            None => {
                return (
                    command.to_string(),
                    ToolResult::failure(format!("Unknown tool: {}", tool_name)),
                )
            }
        };

        let sanitized = match tool.descriptor().kind {
            ToolKind::Read => match sanitize_sql(command) {
                Ok(sql) => sql,
                Err(reason) => return (command.to_string(), ToolResult::failure_with_command(reason, command)),
            },
            ToolKind::Metric => sanitize_metric(command),
            ToolKind::Reasoning => sanitize_reasoning(command, memory),
        };

        tracing::debug!("Dispatching to {}: {}", tool_name, &sanitized);
        let result = tool.execute(&sanitized).await;
        (sanitized, result)
    }
}

fn is_labeled(line: &str) -> bool {
    ["ANALYSIS:", "EXPLANATION:", "COMMAND:"]
        .iter()
        .any(|p| line.starts_with(p))
}

/// Strip markdown code fences anywhere in the text.
fn strip_code_fences(text: &str) -> String {
    let re = Regex::new(r"```\w*").unwrap_or_else(|_| unreachable!());
    re.replace_all(text, "").into_owned()
}

/// Salvage a bare SELECT statement from model output.
///
/// Handles code fences, `query='...'` call envelopes, escaped quotes, and
/// leading prose; rejects anything without a locatable SELECT.
fn sanitize_sql(command: &str) -> Result<String, String> {
    let mut sql = strip_code_fences(command).trim().to_string();

    // Call envelope: CRM_Database_Query(query='...'). Greedy capture to the
    // last quote so escaped quotes inside the statement survive.
    if let Ok(re) = Regex::new(r#"(?is)query\s*=\s*['"](.+)['"]"#) {
        if let Some(caps) = re.captures(&sql) {
            sql = caps[1].to_string();
        }
    }

    sql = sql.replace("\\'", "'").replace("\\\"", "\"");
    let mut sql = sql.trim().to_string();

    if !sql.to_uppercase().starts_with("SELECT") {
        let located = Regex::new(r"(?is)(SELECT\s.+?)(?:;|$)")
            .ok()
            .and_then(|re| re.captures(&sql).map(|c| c[1].trim().to_string()));
        match located {
            Some(found) => sql = found,
            None => {
                return Err(format!(
                    "Invalid SQL (must contain a SELECT statement): {}",
                    clip(&sql, 100)
                ))
            }
        }
    }

    Ok(sql.trim_end_matches(';').trim().to_string())
}

/// Reduce model output to a bare lower-case metric keyword.
fn sanitize_metric(command: &str) -> String {
    let cleaned = strip_code_fences(command);

    if let Ok(re) = Regex::new(r#"(?i)metric\s*=\s*['"](\w+)['"]"#) {
        if let Some(caps) = re.captures(&cleaned) {
            return caps[1].to_lowercase();
        }
    }

    cleaned.trim().to_lowercase()
}

/// Normalize a reasoning command to the tool's TASK/CONTEXT grammar.
///
/// Accepts a `CRM_Reasoning(task='...', context='...')` envelope; free-form
/// text becomes the context of an "analyze" task, prefixed with the last
/// successful row data in memory when the model did not embed any.
fn sanitize_reasoning(command: &str, memory: &Memory) -> String {
    let task = Regex::new(r#"(?i)task\s*=\s*['"](\w+)['"]"#)
        .ok()
        .and_then(|re| re.captures(command).map(|c| c[1].to_lowercase()))
        .unwrap_or_else(|| "analyze".to_string());

    let embedded_context = Regex::new(r#"(?is)context\s*=\s*['"](.+)['"]"#)
        .ok()
        .and_then(|re| re.captures(command).map(|c| c[1].to_string()));

    let context = match embedded_context {
        Some(ctx) => ctx,
        None => {
            let raw = strip_code_fences(command).trim().to_string();
            match memory.last_successful_rows() {
                Some(rows) => {
                    let data =
                        serde_json::to_string(rows).unwrap_or_else(|_| "[]".to_string());
                    format!("Previous data: {}\n\nTask: {}", clip(&data, 2000), raw)
                }
                None => raw,
            }
        }
    };

    format!("TASK: {}\nCONTEXT: {}", task, context)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{seeded_store, MockGeneration};
    use crate::tools::{CrmAnalytics, CrmDatabaseQuery, CrmReasoning};

    fn executor() -> Executor {
        let store = Arc::new(seeded_store());
        let generation = Arc::new(MockGeneration::new(vec!["analysis text".to_string()]));
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(CrmDatabaseQuery::new(store.clone())));
        registry.register(Arc::new(CrmAnalytics::new(store)));
        registry.register(Arc::new(CrmReasoning::new(generation)));
        Executor::new(Arc::new(MockGeneration::new(vec![])), Arc::new(registry))
    }

    #[test]
    fn extracts_all_three_fields() {
        let fields = Executor::extract_command(
            "ANALYSIS: need lead counts\nEXPLANATION: count rows\nCOMMAND: SELECT COUNT(*) FROM leads",
        );
        assert_eq!(fields.analysis, "need lead counts");
        assert_eq!(fields.explanation, "count rows");
        assert_eq!(fields.command, "SELECT COUNT(*) FROM leads");
    }

    #[test]
    fn command_continues_across_unlabeled_lines() {
        let fields = Executor::extract_command("COMMAND: SELECT 1\nmore text");
        assert_eq!(fields.command, "SELECT 1 more text");
    }

    #[test]
    fn command_stops_at_next_labeled_field() {
        let fields = Executor::extract_command(
            "COMMAND: SELECT *\nFROM leads\nEXPLANATION: trailing explanation",
        );
        assert_eq!(fields.command, "SELECT * FROM leads");
        assert_eq!(fields.explanation, "trailing explanation");
    }

    #[test]
    fn sanitizes_fenced_sql() {
        let sql = sanitize_sql("```sql\nSELECT * FROM leads LIMIT 5;\n```").unwrap();
        assert_eq!(sql, "SELECT * FROM leads LIMIT 5");
    }

    #[test]
    fn sanitizes_call_envelope_with_escaped_quotes() {
        let sql = sanitize_sql(
            r#"CRM_Database_Query(query='SELECT * FROM leads WHERE lead_status = \'new\'')"#,
        )
        .unwrap();
        assert_eq!(sql, "SELECT * FROM leads WHERE lead_status = 'new'");
    }

    #[test]
    fn locates_select_after_prose() {
        let sql =
            sanitize_sql("Here is the query you need: SELECT amount FROM opportunities; thanks")
                .unwrap();
        assert_eq!(sql, "SELECT amount FROM opportunities");
    }

    #[test]
    fn rejects_text_without_select() {
        assert!(sanitize_sql("I cannot answer that").is_err());
    }

    #[test]
    fn lowers_metric_and_unwraps_envelope() {
        assert_eq!(sanitize_metric("Pipeline_Value"), "pipeline_value");
        assert_eq!(
            sanitize_metric("CRM_Analytics(metric='Win_Rate')"),
            "win_rate"
        );
    }

    #[test]
    fn reasoning_envelope_extracts_task_and_context() {
        let memory = Memory::new();
        let cmd = sanitize_reasoning(
            "CRM_Reasoning(task='summarize', context='42 open deals')",
            &memory,
        );
        assert_eq!(cmd, "TASK: summarize\nCONTEXT: 42 open deals");
    }

    #[test]
    fn free_form_reasoning_pulls_last_rows_from_memory() {
        let mut memory = Memory::new();
        memory.add_action(
            1,
            "CRM_Database_Query",
            "count",
            "SELECT COUNT(*) FROM leads",
            ToolResult::rows(1, vec![serde_json::json!({"count": 3})]),
        );
        let cmd = sanitize_reasoning("what do these numbers tell us", &memory);
        assert!(cmd.starts_with("TASK: analyze\n"));
        assert!(cmd.contains("Previous data:"));
        assert!(cmd.contains("\"count\":3"));
    }

    #[tokio::test]
    async fn unknown_tool_is_failure_result() {
        let exec = executor();
        let memory = Memory::new();
        let (_, result) = exec
            .execute_tool("Spreadsheet_Export", "whatever", &memory)
            .await;
        assert!(!result.is_success());
        assert!(result.error().unwrap().contains("Unknown tool"));
    }

    #[tokio::test]
    async fn dispatches_sanitized_sql() {
        let exec = executor();
        let memory = Memory::new();
        let (command, result) = exec
            .execute_tool(
                "CRM_Database_Query",
                "```sql\nSELECT COUNT(*) AS n FROM leads;\n```",
                &memory,
            )
            .await;
        assert_eq!(command, "SELECT COUNT(*) AS n FROM leads");
        assert!(result.is_success());
    }

    #[tokio::test]
    async fn unsalvageable_sql_never_reaches_the_store() {
        let exec = executor();
        let memory = Memory::new();
        let (_, result) = exec
            .execute_tool("CRM_Database_Query", "no statement here", &memory)
            .await;
        assert!(!result.is_success());
        assert!(!result.error().unwrap().is_empty());
    }
}
