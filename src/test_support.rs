//! Shared fixtures for unit tests: a scripted generation client and a seeded
//! in-memory record store.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::llm::{GenerationClient, LlmError};
use crate::store::RecordStore;

/// Scripted generation client. Pops one canned response per `generate` call
/// and records every prompt for assertions; an exhausted script or the
/// `failing()` variant returns a network error so callers exercise their
/// degrade paths.
pub struct MockGeneration {
    responses: Mutex<VecDeque<String>>,
    prompts: Mutex<Vec<String>>,
    always_fail: bool,
}

impl MockGeneration {
    pub fn new(responses: Vec<String>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            prompts: Mutex::new(Vec::new()),
            always_fail: false,
        }
    }

    /// A client whose every call fails.
    pub fn failing() -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            prompts: Mutex::new(Vec::new()),
            always_fail: true,
        }
    }

    /// Prompts seen so far, in call order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    /// Number of `generate` calls made.
    pub fn call_count(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }
}

#[async_trait]
impl GenerationClient for MockGeneration {
    async fn generate(
        &self,
        prompt: &str,
        _system_prompt: Option<&str>,
        _max_tokens: u32,
    ) -> Result<String, LlmError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        if self.always_fail {
            return Err(LlmError::network_error("mock generation failure".to_string()));
        }
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| LlmError::network_error("mock script exhausted".to_string()))
    }
}

/// In-memory store with a small, fixed CRM dataset.
///
/// Opportunities: two open (50k + 30k), two closed (one won, one lost).
/// Leads: three total, one converted.
pub fn seeded_store() -> RecordStore {
    let store = RecordStore::open_in_memory().expect("in-memory store");
    store.ensure_schema().expect("schema");
    store
        .execute_batch(
            "INSERT INTO leads (lead_id, first_name, last_name, company_name, lead_status, annual_revenue) VALUES
                (1, 'Ada', 'Lovelace', 'Analytical Engines', 'new', 250000.0),
                (2, 'Grace', 'Hopper', 'Flowmatic', 'converted', 500000.0),
                (3, 'Alan', 'Turing', 'Enigma Ltd', 'contacted', 120000.0);
             INSERT INTO accounts (account_id, account_name, industry, annual_revenue, employee_count) VALUES
                (1, 'Analytical Engines', 'Manufacturing', 2500000.0, 120),
                (2, 'Flowmatic', 'Software', 8000000.0, 300);
             INSERT INTO opportunities (opportunity_id, opportunity_name, account_id, amount, stage, probability, is_closed, is_won) VALUES
                (1, 'Engine refresh', 1, 50000.0, 'Proposal', 0.6, 0, 0),
                (2, 'Compiler rollout', 2, 30000.0, 'Negotiation', 0.4, 0, 0),
                (3, 'Legacy migration', 2, 90000.0, 'Closed Won', 1.0, 1, 1),
                (4, 'Pilot expansion', 1, 20000.0, 'Closed Lost', 0.0, 1, 0);
             INSERT INTO activities (activity_id, activity_type, subject, status, related_to_type, related_to_id) VALUES
                (1, 'call', 'Intro call', 'done', 'lead', 1),
                (2, 'email', 'Follow-up', 'open', 'opportunity', 2);",
        )
        .expect("seed data");
    store
}
