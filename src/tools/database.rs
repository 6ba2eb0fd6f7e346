//! Read-only SQL query tool for the CRM record store.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::store::RecordStore;
use crate::util::clip;

use super::{Tool, ToolDescriptor, ToolKind, ToolResult};

/// Write-class keywords that must never appear in a command, even inside an
/// otherwise valid SELECT (e.g. as a subquery trick).
const BLOCKED_KEYWORDS: &[&str] = &[
    "INSERT", "UPDATE", "DELETE", "DROP", "ALTER", "CREATE", "TRUNCATE",
];

static DESCRIPTOR: ToolDescriptor = ToolDescriptor {
    name: "CRM_Database_Query",
    description: "Execute SQL SELECT queries against the CRM database",
    demo_commands: &[
        "SELECT * FROM leads LIMIT 10",
        "SELECT COUNT(*) FROM opportunities WHERE stage = 'Closed Won'",
    ],
    input_shape: "query: str - a valid SQL SELECT statement",
    output_shape: "rows with result_count",
    metadata: "CRM Database Schema:\n\
        - leads: lead_id, first_name, last_name, company_name, email, lead_status, lead_rating, annual_revenue, ai_score, created_at\n\
        - contacts: contact_id, first_name, last_name, account_id, email, title, department\n\
        - accounts: account_id, account_name, industry, annual_revenue, employee_count\n\
        - opportunities: opportunity_id, opportunity_name, account_id, amount, stage, probability, close_date, is_closed, is_won\n\
        - activities: activity_id, activity_type, subject, status, related_to_type, related_to_id, created_at",
    kind: ToolKind::Read,
    requires_generation: false,
};

/// SELECT-only query tool. Rejects anything that is not a plain read, then
/// dispatches to the record store and caps returned rows.
pub struct CrmDatabaseQuery {
    store: Arc<RecordStore>,
}

impl CrmDatabaseQuery {
    pub fn new(store: Arc<RecordStore>) -> Self {
        Self { store }
    }

    /// Check a statement against the write-keyword blocklist.
    ///
    /// Keywords match as standalone tokens only, so column names like
    /// `dropped_at` do not trip the check.
    fn find_blocked_keyword(sql: &str) -> Option<&'static str> {
        let upper = sql.to_uppercase();
        BLOCKED_KEYWORDS.iter().copied().find(|kw| {
            regex::Regex::new(&format!(r"\b{}\b", kw))
                .map(|re| re.is_match(&upper))
                .unwrap_or(false)
        })
    }
}

#[async_trait]
impl Tool for CrmDatabaseQuery {
    fn descriptor(&self) -> &ToolDescriptor {
        &DESCRIPTOR
    }

    async fn execute(&self, command: &str) -> ToolResult {
        let sql = command.trim();
        if sql.is_empty() {
            return ToolResult::failure("No query provided");
        }

        if !sql.to_uppercase().starts_with("SELECT") {
            return ToolResult::failure_with_command(
                format!("Only SELECT queries allowed: {}", clip(sql, 100)),
                sql,
            );
        }

        if let Some(kw) = Self::find_blocked_keyword(sql) {
            return ToolResult::failure_with_command(
                format!("Dangerous keyword '{}' not allowed", kw),
                sql,
            );
        }

        match self.store.query(sql) {
            Ok(rows) => {
                let count = rows.len();
                let rows: Vec<Value> = rows.into_iter().map(Value::Object).collect();
                tracing::debug!("CRM query returned {} rows", count);
                ToolResult::rows(count, rows)
            }
            Err(e) => ToolResult::failure_with_command(e.to_string(), sql),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::seeded_store;

    fn tool() -> CrmDatabaseQuery {
        CrmDatabaseQuery::new(Arc::new(seeded_store()))
    }

    #[tokio::test]
    async fn executes_select() {
        let result = tool()
            .execute("SELECT first_name FROM leads ORDER BY lead_id LIMIT 2")
            .await;
        assert!(result.is_success());
        assert_eq!(result.result_count(), 2);
    }

    #[tokio::test]
    async fn rejects_non_select() {
        let result = tool().execute("PRAGMA table_info(leads)").await;
        assert!(!result.is_success());
        assert!(!result.error().unwrap().is_empty());
    }

    #[tokio::test]
    async fn rejects_standalone_drop_keyword() {
        let result = tool().execute("SELECT 1; DROP TABLE leads").await;
        assert!(!result.is_success());
        assert!(result.error().unwrap().contains("DROP"));
    }

    #[tokio::test]
    async fn allows_drop_as_substring_of_identifier() {
        // "dropped" contains DROP but is not a standalone keyword
        let result = tool()
            .execute("SELECT COUNT(*) AS dropped_count FROM leads")
            .await;
        assert!(result.is_success(), "{:?}", result.error());
    }

    #[tokio::test]
    async fn converts_store_errors_to_failure() {
        let result = tool().execute("SELECT nope FROM missing_table").await;
        assert!(!result.is_success());
        assert!(!result.error().unwrap().is_empty());
    }
}
