//! The solver: a Planner -> Executor -> Verifier -> Memory stepping loop.
//!
//! One `solve` call walks the state machine
//! `ANALYZING -> (AMBIGUOUS_EXIT |) PLANNING -> COMMAND_GENERATION ->
//! EXECUTING -> LOOP_CHECK -> VERIFYING -> (DONE | PLANNING) -> FINALIZING`,
//! under a step budget and a wall-clock budget checked between iterations.
//! No collaborator failure is fatal anywhere in the loop; the caller always
//! gets a well-formed `SolveResult`.

pub mod executor;
pub mod memory;
pub mod planner;
pub mod policies;
pub mod trace;
pub mod verifier;

pub use executor::{CommandFields, Executor};
pub use memory::{ActionRecord, Memory};
pub use planner::{PlannedStep, Planner};
pub use trace::ReasoningStep;
pub use verifier::{Verdict, Verifier};

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;

use crate::config::SolverConfig;
use crate::llm::GenerationClient;
use crate::tools::{ToolKind, ToolRegistry, ToolResult};

/// Consecutive tool-selection failures tolerated before abandoning the loop
/// with a clarifying response.
const MAX_SELECTION_FAILURES: usize = 2;

/// Caller-visible result of one solve invocation.
#[derive(Debug, Serialize)]
pub struct SolveResult {
    pub success: bool,
    pub query: String,
    pub summary: String,
    pub detailed_solution: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sql_query: Option<String>,
    pub results: Vec<Value>,
    pub result_count: usize,
    pub reasoning_steps: Vec<ReasoningStep>,
    pub memory: Vec<ActionRecord>,
    /// Seconds elapsed for the whole solve
    pub execution_time: f64,
    pub steps_taken: usize,
    pub tools_available: Vec<String>,
    #[serde(default)]
    pub needs_clarification: bool,
}

/// Orchestrator for natural-language CRM queries.
///
/// Shared read-only across requests; each `solve` call owns its own
/// `Memory`, so concurrent solves do not interact beyond the registry and
/// the pooled store connection underneath the query tools.
pub struct Solver {
    planner: Planner,
    executor: Executor,
    verifier: Verifier,
    registry: Arc<ToolRegistry>,
    config: SolverConfig,
}

impl Solver {
    pub fn new(
        generation: Arc<dyn GenerationClient>,
        registry: Arc<ToolRegistry>,
        config: SolverConfig,
    ) -> Self {
        Self {
            planner: Planner::new(generation.clone(), registry.clone()),
            executor: Executor::new(generation.clone(), registry.clone()),
            verifier: Verifier::new(generation),
            registry,
            config,
        }
    }

    /// First registered read-kind tool, used when planning fails outright
    /// and we fall back to a simple data fetch.
    fn default_read_tool(&self) -> Option<String> {
        self.registry
            .descriptors()
            .iter()
            .find(|d| d.kind == ToolKind::Read)
            .map(|d| d.name.to_string())
    }

    fn tool_kind(&self, name: &str) -> Option<ToolKind> {
        self.registry.get(name).map(|t| t.descriptor().kind)
    }

    /// Solve a natural-language CRM query.
    ///
    /// Always returns; never errors past this boundary. Failures flip the
    /// `success` flag or set `needs_clarification` instead.
    pub async fn solve(&self, query: &str) -> SolveResult {
        let started = Instant::now();
        let mut memory = Memory::new();
        memory.clear();
        memory.set_query(query);

        let mut steps: Vec<ReasoningStep> = Vec::new();

        tracing::info!("Solving CRM query: {}", query);

        // ANALYZING
        let analysis = self.planner.analyze(query).await;
        steps.push(ReasoningStep::Analysis {
            step: 0,
            content: analysis.clone(),
            timestamp: Utc::now(),
        });

        if let Some(clarification) = self.planner.check_ambiguity(query).await {
            tracing::info!("Query is ambiguous, returning clarifying response");
            steps.push(ReasoningStep::Clarification {
                step: 1,
                content: clarification.clone(),
                timestamp: Utc::now(),
            });
            return self.clarification_result(query, clarification, steps, &memory, 1, started);
        }

        // Main loop
        let mut step_count = 0usize;
        let mut final_result: Option<ToolResult> = None;
        let mut last_sql: Option<String> = None;
        let mut consecutive_selection_failures = 0usize;

        let mut has_read_data = false;
        let mut has_reasoned = false;
        let mut recent_kinds: Vec<ToolKind> = Vec::new();

        while step_count < self.config.max_steps && started.elapsed() < self.config.max_time {
            step_count += 1;

            // PLANNING
            let planned = match self
                .planner
                .next_step(query, &analysis, &memory, step_count, self.config.max_steps)
                .await
            {
                Ok(text) => self.planner.extract_step(&text),
                Err(e) => {
                    tracing::warn!("Next-step generation failed: {}", e);
                    PlannedStep {
                        context: format!("Error: {}", e),
                        sub_goal: "Query database".to_string(),
                        tool: self.default_read_tool(),
                    }
                }
            };

            steps.push(ReasoningStep::Planning {
                step: step_count,
                context: planned.context.clone(),
                sub_goal: planned.sub_goal.clone(),
                tool: planned.tool.clone(),
                timestamp: Utc::now(),
            });

            let tool_name = match planned.tool {
                Some(name) => name,
                None => {
                    consecutive_selection_failures += 1;
                    tracing::warn!(
                        "No resolvable tool selected ({} consecutive)",
                        consecutive_selection_failures
                    );

                    if consecutive_selection_failures >= MAX_SELECTION_FAILURES {
                        // Abandon the loop instead of iterating forever.
                        let fallback = self.planner.clarifying_response(query).await;
                        steps.push(ReasoningStep::Fallback {
                            step: step_count,
                            content: fallback.clone(),
                            reason: format!(
                                "Could not determine appropriate tool after {} attempts",
                                consecutive_selection_failures
                            ),
                            timestamp: Utc::now(),
                        });
                        return self.clarification_result(
                            query, fallback, steps, &memory, step_count, started,
                        );
                    }

                    let failure = ToolResult::failure("No valid tool selected");
                    final_result = Some(failure.clone());
                    memory.add_action(step_count, "none", planned.sub_goal, "", failure);
                    continue;
                }
            };
            consecutive_selection_failures = 0;

            // COMMAND_GENERATION
            let fields = match self
                .executor
                .generate_command(query, &planned.context, &planned.sub_goal, &tool_name, step_count)
                .await
            {
                Ok(raw) => Executor::extract_command(&raw),
                Err(e) => {
                    tracing::warn!("Command generation failed: {}", e);
                    CommandFields {
                        analysis: format!("Error: {}", e),
                        explanation: "Fallback query".to_string(),
                        command: "SELECT COUNT(*) FROM leads".to_string(),
                    }
                }
            };

            steps.push(ReasoningStep::CommandGeneration {
                step: step_count,
                analysis: fields.analysis.clone(),
                explanation: fields.explanation.clone(),
                command: fields.command.clone(),
                timestamp: Utc::now(),
            });

            // EXECUTING
            let (command, result) = self
                .executor
                .execute_tool(&tool_name, &fields.command, &memory)
                .await;

            steps.push(ReasoningStep::Execution {
                step: step_count,
                tool: tool_name.clone(),
                success: result.is_success(),
                result_count: result.result_count(),
                error: result.error().map(|e| e.to_string()),
                timestamp: Utc::now(),
            });

            if command.to_uppercase().contains("SELECT") {
                last_sql = Some(command.clone());
            }

            if let Some(kind) = self.tool_kind(&tool_name) {
                recent_kinds.push(kind);
                if result.is_success() {
                    match kind {
                        ToolKind::Read => has_read_data = true,
                        ToolKind::Reasoning => has_reasoned = true,
                        ToolKind::Metric => {}
                    }
                }
            }

            final_result = Some(result.clone());
            memory.add_action(step_count, &tool_name, planned.sub_goal, command, result);

            // LOOP_CHECK: forced stops run before the verifier is consulted
            if policies::should_force_stop(has_read_data, has_reasoned, step_count) {
                tracing::info!("Forced stop: data and analysis present after {} steps", step_count);
                break;
            }
            if policies::is_read_reason_oscillation(&recent_kinds) {
                tracing::warn!("Detected read/reason oscillation, stopping");
                break;
            }

            // VERIFYING
            let (verdict_analysis, verdict) = match self
                .verifier
                .check_stop(query, &analysis, &memory, step_count)
                .await
            {
                Ok(text) => Verifier::extract_conclusion(&text),
                Err(e) => {
                    tracing::warn!("Verification failed, continuing: {}", e);
                    (format!("Error: {}", e), Verdict::Continue)
                }
            };

            steps.push(ReasoningStep::Verification {
                step: step_count,
                analysis: verdict_analysis,
                conclusion: verdict.as_str().to_string(),
                timestamp: Utc::now(),
            });

            if verdict == Verdict::Stop {
                break;
            }
        }

        // FINALIZING: always reached, with whatever memory accumulated.
        let detailed = match self.planner.final_output(query, &memory).await {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!("Final synthesis failed: {}", e);
                format!(
                    "Results from query: {}",
                    final_result
                        .as_ref()
                        .and_then(|r| serde_json::to_string(r).ok())
                        .unwrap_or_else(|| "no results".to_string())
                )
            }
        };

        let summary = match self.planner.direct_output(query, &memory).await {
            Ok(text) => text,
            Err(_) => format!(
                "Query completed with {} results.",
                final_result.as_ref().map(|r| r.result_count()).unwrap_or(0)
            ),
        };

        steps.push(ReasoningStep::FinalOutput {
            step: step_count + 1,
            detailed_solution: detailed.clone(),
            direct_answer: summary.clone(),
            timestamp: Utc::now(),
        });

        let execution_time = started.elapsed().as_secs_f64();
        tracing::info!(
            "Solve complete: {} steps in {:.2}s",
            step_count,
            execution_time
        );

        let (results, result_count) = match final_result.as_ref() {
            Some(r) => (r.row_values().to_vec(), r.result_count()),
            None => (Vec::new(), 0),
        };

        SolveResult {
            success: final_result.map(|r| r.is_success()).unwrap_or(false),
            query: query.to_string(),
            summary,
            detailed_solution: detailed,
            sql_query: last_sql,
            results,
            result_count,
            reasoning_steps: steps,
            memory: memory.actions().to_vec(),
            execution_time,
            steps_taken: step_count,
            tools_available: self.registry.names().iter().map(|s| s.to_string()).collect(),
            needs_clarification: false,
        }
    }

    /// Short-circuit result shared by the ambiguity exit and the escalated
    /// selection-failure exit.
    fn clarification_result(
        &self,
        query: &str,
        clarification: String,
        steps: Vec<ReasoningStep>,
        memory: &Memory,
        steps_taken: usize,
        started: Instant,
    ) -> SolveResult {
        SolveResult {
            success: true,
            query: query.to_string(),
            summary: clarification.clone(),
            detailed_solution: clarification,
            sql_query: None,
            results: Vec::new(),
            result_count: 0,
            reasoning_steps: steps,
            memory: memory.actions().to_vec(),
            execution_time: started.elapsed().as_secs_f64(),
            steps_taken,
            tools_available: self.registry.names().iter().map(|s| s.to_string()).collect(),
            needs_clarification: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{seeded_store, MockGeneration};
    use crate::tools::{CrmAnalytics, CrmDatabaseQuery, CrmReasoning};

    /// Solver wired to a single scripted generation client that also backs
    /// the reasoning tool, plus a seeded in-memory store.
    fn build_solver(responses: Vec<&str>, config: SolverConfig) -> (Solver, Arc<MockGeneration>) {
        let generation = Arc::new(MockGeneration::new(
            responses.into_iter().map(String::from).collect(),
        ));
        let store = Arc::new(seeded_store());
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(CrmDatabaseQuery::new(store.clone())));
        registry.register(Arc::new(CrmAnalytics::new(store)));
        registry.register(Arc::new(CrmReasoning::new(generation.clone())));
        let solver = Solver::new(generation.clone(), Arc::new(registry), config);
        (solver, generation)
    }

    #[tokio::test]
    async fn ambiguous_query_short_circuits() {
        let (solver, _) = build_solver(
            vec![
                "intent analysis",          // analyze
                "Could you say more about what you need?", // clarifying response
            ],
            SolverConfig::default(),
        );

        let result = solver.solve("huh").await;
        assert!(result.success);
        assert!(result.needs_clarification);
        assert_eq!(result.steps_taken, 1);
        assert!(result.summary.contains("say more"));
        assert!(result.memory.is_empty());
        assert!(matches!(
            result.reasoning_steps.last(),
            Some(ReasoningStep::Clarification { .. })
        ));
    }

    #[tokio::test]
    async fn two_selection_failures_escalate_to_clarification() {
        let (solver, _) = build_solver(
            vec![
                "intent analysis",
                "CONTEXT: c\nSUB_GOAL: g\nTOOL: none",
                "CONTEXT: c\nSUB_GOAL: g\nTOOL: Totally_Unknown_Tool",
                "Here is what I can help with instead.",
            ],
            SolverConfig::default(),
        );

        let result = solver.solve("do the thing with the stuff somehow").await;
        assert!(result.success);
        assert!(result.needs_clarification);
        assert_eq!(result.steps_taken, 2);
        // first failure is recorded, second escalates before recording
        assert_eq!(result.memory.len(), 1);
        assert_eq!(result.memory[0].step, 1);
        assert!(!result.memory[0].result.is_success());
    }

    #[tokio::test]
    async fn data_then_reasoning_forces_stop_without_verifier() {
        let (solver, generation) = build_solver(
            vec![
                "intent analysis",
                // step 1: fetch
                "CONTEXT: no data\nSUB_GOAL: count leads\nTOOL: CRM_Database_Query",
                "ANALYSIS: a\nEXPLANATION: e\nCOMMAND: SELECT COUNT(*) AS n FROM leads",
                "ANALYSIS: only raw data\nCONCLUSION: CONTINUE",
                // step 2: reason
                "CONTEXT: have counts\nSUB_GOAL: analyze them\nTOOL: CRM_Reasoning",
                "ANALYSIS: a\nEXPLANATION: e\nCOMMAND: CRM_Reasoning(task='analyze', context='3 leads')",
                "The lead base is small but growing.", // reasoning tool call
                // forced stop: no verifier call here
                "Detailed answer.",
                "Short answer.",
            ],
            SolverConfig::default(),
        );

        let result = solver.solve("how many leads do we have?").await;
        assert!(result.success);
        assert_eq!(result.steps_taken, 2);
        assert!(!result.needs_clarification);
        assert_eq!(result.sql_query.as_deref(), Some("SELECT COUNT(*) AS n FROM leads"));
        let steps: Vec<usize> = result.memory.iter().map(|a| a.step).collect();
        assert_eq!(steps, vec![1, 2]);

        // the verifier ran after step 1 only; step 2 hit the forced stop
        let verifier_calls = generation
            .prompts()
            .iter()
            .filter(|p| p.contains("verifying if we have enough information"))
            .count();
        assert_eq!(verifier_calls, 1);
    }

    #[tokio::test]
    async fn verifier_stop_ends_loop() {
        let (solver, _) = build_solver(
            vec![
                "intent analysis",
                "CONTEXT: no data\nSUB_GOAL: pipeline value\nTOOL: CRM_Analytics",
                "ANALYSIS: a\nEXPLANATION: e\nCOMMAND: pipeline_value",
                "ANALYSIS: simple lookup satisfied\nCONCLUSION: STOP",
                "Detailed answer.",
                "Short answer.",
            ],
            SolverConfig::default(),
        );

        let result = solver.solve("what is our pipeline value?").await;
        assert!(result.success);
        assert_eq!(result.steps_taken, 1);
        assert_eq!(result.summary, "Short answer.");
        assert_eq!(result.detailed_solution, "Detailed answer.");
    }

    #[tokio::test]
    async fn step_budget_bounds_iteration() {
        let (solver, _) = build_solver(
            vec![
                "intent analysis",
                "CONTEXT: c\nSUB_GOAL: fetch\nTOOL: CRM_Database_Query",
                "ANALYSIS: a\nEXPLANATION: e\nCOMMAND: SELECT COUNT(*) FROM leads",
                "ANALYSIS: keep going\nCONCLUSION: CONTINUE",
                "Detailed answer.",
                "Short answer.",
            ],
            SolverConfig {
                max_steps: 1,
                ..SolverConfig::default()
            },
        );

        let result = solver.solve("how many leads?").await;
        assert_eq!(result.steps_taken, 1);
        assert!(result.steps_taken <= 1);
        assert!(result.success);
    }

    #[tokio::test]
    async fn exhausted_time_budget_skips_loop_but_still_finalizes() {
        let (solver, _) = build_solver(
            vec!["intent analysis", "Detailed answer.", "Short answer."],
            SolverConfig {
                max_time: std::time::Duration::ZERO,
                ..SolverConfig::default()
            },
        );

        // Budget already spent before the first iteration: no planning, no
        // tool calls, but finalization still runs and the result is complete.
        let result = solver.solve("how many leads do we have?").await;
        assert_eq!(result.steps_taken, 0);
        assert!(!result.success);
        assert!(result.memory.is_empty());
        assert!(result.results.is_empty());
        assert_eq!(result.summary, "Short answer.");
        assert_eq!(result.detailed_solution, "Detailed answer.");
    }

    #[tokio::test]
    async fn total_generation_outage_still_produces_a_result() {
        let generation = Arc::new(MockGeneration::failing());
        let store = Arc::new(seeded_store());
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(CrmDatabaseQuery::new(store.clone())));
        registry.register(Arc::new(CrmAnalytics::new(store)));
        registry.register(Arc::new(CrmReasoning::new(generation.clone())));
        let solver = Solver::new(
            generation,
            Arc::new(registry),
            SolverConfig {
                max_steps: 3,
                ..SolverConfig::default()
            },
        );

        // Planning falls back to the read tool with a fallback count query,
        // verification fails open to CONTINUE, so the loop runs to budget
        // and finalization degrades to canned text. Nothing raises.
        let result = solver.solve("how many leads do we have?").await;
        assert!(result.success);
        assert_eq!(result.steps_taken, 3);
        assert!(result.summary.contains("Query completed"));
        let steps: Vec<usize> = result.memory.iter().map(|a| a.step).collect();
        assert_eq!(steps, vec![1, 2, 3]);
        assert!(result.memory.iter().all(|a| a.result.is_success()));
    }
}
