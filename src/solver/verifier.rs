//! Verifier: decides whether accumulated results are enough to stop.
//!
//! Fail-open by design: a missing or unparseable CONCLUSION means CONTINUE,
//! bounded only by the orchestrator's step and time budgets. The failure
//! mode we refuse is silently stopping with a half-answer.

use std::sync::Arc;

use crate::llm::{GenerationClient, LlmError};

use super::memory::Memory;

/// STOP/CONTINUE verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Stop,
    Continue,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stop => "STOP",
            Self::Continue => "CONTINUE",
        }
    }
}

pub struct Verifier {
    generation: Arc<dyn GenerationClient>,
}

impl Verifier {
    pub fn new(generation: Arc<dyn GenerationClient>) -> Self {
        Self { generation }
    }

    /// Ask whether we have enough information to answer the query.
    pub async fn check_stop(
        &self,
        query: &str,
        analysis: &str,
        memory: &Memory,
        step_count: usize,
    ) -> Result<String, LlmError> {
        let prompt = format!(
            "You are verifying if we have enough information to answer a CRM query.\n\n\
             Original Query: {query}\n\
             Query Analysis: {analysis}\n\n\
             Actions Completed ({count} so far):\n{memory}\n\n\
             STOP CRITERIA - Say STOP if ANY of these are true:\n\
             1. We retrieved data AND already did a reasoning analysis on it\n\
             2. The query was a simple data lookup and we have the results\n\
             3. We've done 2+ steps and have meaningful data/analysis\n\
             4. We're repeating the same type of action (e.g., fetching same data again)\n\n\
             CONTINUE CRITERIA - Say CONTINUE only if:\n\
             1. We have NO data yet and need to fetch it\n\
             2. We have raw data but haven't analyzed it when analysis was requested\n\n\
             Current step: {step}\n\n\
             BE DECISIVE - if we have data + analysis, STOP. Don't loop forever.\n\n\
             Output:\n\
             ANALYSIS: <brief assessment>\n\
             CONCLUSION: STOP or CONTINUE",
            query = query,
            analysis = analysis,
            count = memory.actions().len(),
            memory = memory.context_summary(),
            step = step_count,
        );

        self.generation.generate(&prompt, None, 300).await
    }

    /// Extract the verdict from a verification response.
    ///
    /// The verdict is STOP only when the CONCLUSION field contains "STOP"
    /// (case-insensitive); everything else, including a missing field,
    /// defaults to CONTINUE.
    pub fn extract_conclusion(verification: &str) -> (String, Verdict) {
        let mut analysis = String::new();
        let mut verdict = Verdict::Continue;

        for line in verification.lines() {
            let line = line.trim();
            if let Some(rest) = line.strip_prefix("ANALYSIS:") {
                analysis = rest.trim().to_string();
            } else if let Some(rest) = line.strip_prefix("CONCLUSION:") {
                if rest.to_uppercase().contains("STOP") {
                    verdict = Verdict::Stop;
                } else {
                    verdict = Verdict::Continue;
                }
            }
        }

        (analysis, verdict)
    }
}
