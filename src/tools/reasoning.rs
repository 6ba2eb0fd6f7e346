//! Generation-backed reasoning tool for analyzing previously retrieved data.

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;

use crate::llm::GenerationClient;

use super::{Tool, ToolDescriptor, ToolKind, ToolResult};

static DESCRIPTOR: ToolDescriptor = ToolDescriptor {
    name: "CRM_Reasoning",
    description: "Use LLM reasoning to analyze, summarize, or explain CRM data. \
        Use this AFTER fetching data with CRM_Database_Query or CRM_Analytics; it \
        works on results from previous steps, not on the user directly.",
    demo_commands: &[
        "TASK: summarize\nCONTEXT: <data from previous query>",
        "TASK: recommend\nCONTEXT: Lead with low engagement",
    ],
    input_shape: "TASK: <summarize|recommend|analyze|explain>\nCONTEXT: <data to reason about>",
    output_shape: "reasoning text",
    metadata: "Tasks: summarize, recommend, analyze, explain",
    kind: ToolKind::Reasoning,
    requires_generation: true,
};

/// Reasoning task keywords. Unknown keywords fall back to a generic prompt
/// rather than failing, since the keyword comes from model output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReasoningTask {
    Summarize,
    Recommend,
    Analyze,
    Explain,
}

impl FromStr for ReasoningTask {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "summarize" => Ok(Self::Summarize),
            "recommend" => Ok(Self::Recommend),
            "analyze" => Ok(Self::Analyze),
            "explain" => Ok(Self::Explain),
            _ => Err(()),
        }
    }
}

impl ReasoningTask {
    fn prompt(&self, context: &str) -> String {
        match self {
            Self::Summarize => {
                format!("Summarize the following CRM data concisely:\n\n{}", context)
            }
            Self::Recommend => format!(
                "Based on this CRM data, provide actionable recommendations:\n\n{}",
                context
            ),
            Self::Analyze => format!(
                "Analyze this CRM data and identify key insights and patterns:\n\n{}",
                context
            ),
            Self::Explain => format!(
                "Explain what this CRM data means in business terms:\n\n{}",
                context
            ),
        }
    }
}

/// Parsed TASK/CONTEXT command. The CONTEXT field runs to the end of the
/// command text.
fn parse_command(command: &str) -> (Option<ReasoningTask>, Option<String>, String) {
    let mut task_text = None;
    let mut context: Option<String> = None;

    for line in command.lines() {
        let trimmed = line.trim();
        if let Some(rest) = trimmed.strip_prefix("TASK:") {
            task_text = Some(rest.trim().to_string());
        } else if let Some(rest) = trimmed.strip_prefix("CONTEXT:") {
            context = Some(rest.trim().to_string());
        } else if let Some(ctx) = context.as_mut() {
            if !trimmed.is_empty() {
                ctx.push('\n');
                ctx.push_str(trimmed);
            }
        }
    }

    let raw_task = task_text.clone().unwrap_or_default();
    let task = task_text.and_then(|t| ReasoningTask::from_str(&t).ok());
    (task, context, raw_task)
}

/// Reasoning tool; the only tool that needs the generation capability.
pub struct CrmReasoning {
    generation: Arc<dyn GenerationClient>,
}

impl CrmReasoning {
    pub fn new(generation: Arc<dyn GenerationClient>) -> Self {
        Self { generation }
    }
}

#[async_trait]
impl Tool for CrmReasoning {
    fn descriptor(&self) -> &ToolDescriptor {
        &DESCRIPTOR
    }

    async fn execute(&self, command: &str) -> ToolResult {
        let (task, context, raw_task) = parse_command(command);

        let context = match context {
            Some(c) if !c.is_empty() => c,
            _ => {
                return ToolResult::failure_with_command(
                    "Both task and context are required",
                    command,
                )
            }
        };

        let prompt = match task {
            Some(task) => task.prompt(&context),
            // Unknown task keyword from the model: keep it, prompt generically
            None => format!("Task: {}\n\nContext:\n{}", raw_task, context),
        };

        tracing::debug!(
            "CRM reasoning task={} context_len={}",
            if raw_task.is_empty() { "analyze" } else { &raw_task },
            context.len()
        );

        match self.generation.generate(&prompt, None, 800).await {
            Ok(response) => ToolResult::reasoning(response),
            Err(e) => ToolResult::failure_with_command(e.to_string(), command),
        }
    }
}
