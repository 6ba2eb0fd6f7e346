//! Planner: query analysis, ambiguity checks, tool selection, and final
//! answer synthesis.
//!
//! Everything here is built on labeled-line model output, which is
//! best-effort text rather than a grammar. Extraction is line-prefix based
//! with typed fallbacks for every field.

use std::sync::Arc;

use crate::llm::{GenerationClient, LlmError};
use crate::tools::ToolRegistry;
use crate::util::clip;

use super::memory::Memory;
use super::policies;

/// A parsed CONTEXT/SUB_GOAL/TOOL selection.
///
/// `tool == None` is an explicit no-tool signal (the model said "none" or
/// named something unresolvable), distinct from a generation failure which
/// never reaches this type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedStep {
    pub context: String,
    pub sub_goal: String,
    pub tool: Option<String>,
}

impl PlannedStep {
    /// Render back into the labeled three-field format.
    pub fn to_labeled(&self) -> String {
        format!(
            "CONTEXT: {}\nSUB_GOAL: {}\nTOOL: {}",
            self.context,
            self.sub_goal,
            self.tool.as_deref().unwrap_or("none")
        )
    }
}

pub struct Planner {
    generation: Arc<dyn GenerationClient>,
    registry: Arc<ToolRegistry>,
}

impl Planner {
    pub fn new(generation: Arc<dyn GenerationClient>, registry: Arc<ToolRegistry>) -> Self {
        Self {
            generation,
            registry,
        }
    }

    fn tool_catalog(&self) -> String {
        self.registry
            .descriptors()
            .iter()
            .map(|d| {
                format!(
                    "- {}: {}\n  Demo: {}",
                    d.name,
                    d.description,
                    d.demo_commands.first().copied().unwrap_or("")
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Analyze the user query to understand intent. Generation failures are
    /// substituted with a degraded placeholder, never propagated.
    pub async fn analyze(&self, query: &str) -> String {
        let prompt = format!(
            "You are analyzing a CRM query to understand what the user wants.\n\n\
             Query: {query}\n\n\
             Available Tools:\n{tools}\n\n\
             Analyze this query:\n\
             1. What is the user trying to accomplish?\n\
             2. What data do they need?\n\
             3. Which tools would be most helpful?\n\
             4. What is the expected output format?\n\n\
             Assume reasonable defaults for any unspecified parameters:\n\
             - Time range: default to all time unless specified\n\
             - Status: include all statuses unless specified\n\
             - Limit: use sensible defaults (e.g., top 10, top 50)\n\n\
             Provide a concise analysis and proceed with the query:",
            query = query,
            tools = self.tool_catalog(),
        );

        match self.generation.generate(&prompt, None, 500).await {
            Ok(analysis) => analysis,
            Err(e) => {
                tracing::warn!("Query analysis failed: {}", e);
                format!("Query about: {}. Analysis unavailable.", query)
            }
        }
    }

    /// Check whether the query is too vague to process. When it is, returns
    /// a clarifying response to short-circuit with.
    pub async fn check_ambiguity(&self, query: &str) -> Option<String> {
        if policies::is_vague_query(query) {
            Some(self.clarifying_response(query).await)
        } else {
            None
        }
    }

    /// Generate a friendly clarification request. Always returns non-empty
    /// text; generation failure degrades to a canned response.
    pub async fn clarifying_response(&self, query: &str) -> String {
        let prompt = format!(
            "The user asked a vague question that needs clarification: \"{query}\"\n\n\
             This is a CRM (Customer Relationship Management) system. Generate a helpful, \
             friendly response that:\n\
             1. Acknowledges their question\n\
             2. Explains what information you need to help them\n\
             3. Provides 2-3 example questions they could ask\n\n\
             Available CRM capabilities:\n\
             - Query leads, contacts, accounts, opportunities, activities\n\
             - Get pipeline value and analytics\n\
             - Analyze conversion rates and win rates\n\n\
             Keep the response concise and helpful:",
            query = query,
        );

        match self.generation.generate(&prompt, None, 300).await {
            Ok(text) if !text.trim().is_empty() => text,
            _ => "I need a bit more detail to help with that. You could ask, for example: \
                  \"How many leads do we have?\", \"Show the top 10 opportunities by amount\", \
                  or \"What is our current pipeline value?\""
                .to_string(),
        }
    }

    /// Ask for the next CONTEXT/SUB_GOAL/TOOL selection.
    pub async fn next_step(
        &self,
        query: &str,
        analysis: &str,
        memory: &Memory,
        step_count: usize,
        max_steps: usize,
    ) -> Result<String, LlmError> {
        let prompt = format!(
            "You are a CRM agent deciding the next action to take.\n\n\
             Original Query: {query}\n\
             Query Analysis: {analysis}\n\n\
             Previous Actions:\n{memory}\n\n\
             Available Tools (YOU MUST CHOOSE ONE):\n{tools}\n\n\
             Current Step: {step}/{max_steps}\n\n\
             IMPORTANT RULES:\n\
             1. You MUST select one of the available tools listed above\n\
             2. For data questions, use CRM_Database_Query\n\
             3. For metrics/analytics, use CRM_Analytics\n\
             4. For analysis/explanation of data already retrieved, use CRM_Reasoning\n\
             5. Do NOT output \"None\" or \"No tool\" - always pick a tool\n\
             6. If unsure, default to CRM_Database_Query with a simple query\n\n\
             Output in this EXACT format:\n\
             CONTEXT: <current situation and what we know>\n\
             SUB_GOAL: <specific goal for this step>\n\
             TOOL: <exact tool name>",
            query = query,
            analysis = analysis,
            memory = memory.context_summary(),
            tools = self.tool_catalog(),
            step = step_count,
            max_steps = max_steps,
        );

        self.generation.generate(&prompt, None, 400).await
    }

    /// Parse a next-step response into its three fields.
    ///
    /// A tool of "none"/"n/a"/"no tool"/empty normalizes to `None`; an
    /// unrecognized name is resolved by case-insensitive substring match
    /// against registered names, falling back to `None`.
    pub fn extract_step(&self, next_step: &str) -> PlannedStep {
        let mut context = String::new();
        let mut sub_goal = String::new();
        let mut tool_name: Option<String> = None;

        for line in next_step.lines() {
            let line = line.trim();
            if let Some(rest) = line.strip_prefix("CONTEXT:") {
                context = rest.trim().to_string();
            } else if let Some(rest) = line.strip_prefix("SUB_GOAL:") {
                sub_goal = rest.trim().to_string();
            } else if let Some(rest) = line.strip_prefix("TOOL:") {
                tool_name = Some(rest.trim().to_string());
            }
        }

        let tool = tool_name.and_then(|name| self.resolve_tool_name(&name));

        PlannedStep {
            context,
            sub_goal,
            tool,
        }
    }

    /// Normalize explicit no-tool sentinels and fuzzy-match everything else
    /// against the registry.
    fn resolve_tool_name(&self, name: &str) -> Option<String> {
        let lowered = name.trim().to_lowercase();
        if matches!(lowered.as_str(), "" | "none" | "n/a" | "no tool" | "no_tool") {
            return None;
        }

        if self.registry.get(name.trim()).is_some() {
            return Some(name.trim().to_string());
        }

        self.registry
            .names()
            .into_iter()
            .find(|registered| {
                let reg_lower = registered.to_lowercase();
                // Match either direction on sanitized names so e.g.
                // "database query" resolves to "CRM_Database_Query".
                let reg_flat = reg_lower.replace('_', " ");
                reg_lower.contains(&lowered)
                    || lowered.contains(&reg_lower)
                    || reg_flat.contains(&lowered)
                    || lowered.contains(&reg_flat)
            })
            .map(|s| s.to_string())
    }

    fn collect_results(memory: &Memory) -> String {
        let results: Vec<_> = memory.successful_results();
        let rendered = serde_json::to_string_pretty(&results).unwrap_or_else(|_| "[]".into());
        clip(&rendered, 2000)
    }

    /// Generate the detailed final solution from memory. Never re-queries
    /// the tools.
    pub async fn final_output(&self, query: &str, memory: &Memory) -> Result<String, LlmError> {
        let prompt = format!(
            "Based on the CRM query and results, provide a detailed analysis.\n\n\
             Original Query: {query}\n\n\
             Actions Taken:\n{memory}\n\n\
             Results Summary:\n{results}\n\n\
             Provide a detailed, well-formatted response that:\n\
             1. Directly answers the user's question\n\
             2. Includes relevant numbers and data\n\
             3. Provides insights where appropriate\n\
             4. Uses clear formatting (bullet points, sections)",
            query = query,
            memory = memory.context_summary(),
            results = Self::collect_results(memory),
        );

        self.generation.generate(&prompt, None, 1000).await
    }

    /// Generate a concise direct answer from memory.
    pub async fn direct_output(&self, query: &str, memory: &Memory) -> Result<String, LlmError> {
        let prompt = format!(
            "Give a brief, direct answer to this CRM query.\n\n\
             Query: {query}\n\n\
             Results:\n{results}\n\n\
             Provide a 1-3 sentence direct answer with key numbers:",
            query = query,
            results = Self::collect_results(memory),
        );

        self.generation.generate(&prompt, None, 200).await
    }
}
