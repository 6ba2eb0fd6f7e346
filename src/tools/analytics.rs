//! Precomputed analytics tool for CRM insights.

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::store::RecordStore;

use super::{Tool, ToolDescriptor, ToolKind, ToolResult};

static DESCRIPTOR: ToolDescriptor = ToolDescriptor {
    name: "CRM_Analytics",
    description: "Perform analytics and aggregations on CRM data",
    demo_commands: &["pipeline_value", "win_rate"],
    input_shape: "metric: str - the metric keyword to calculate",
    output_shape: "metric value object",
    metadata: "Available metrics:\n\
        - pipeline_value: total value of open opportunities\n\
        - lead_conversion_rate: percentage of leads converted to opportunities\n\
        - win_rate: percentage of closed-won vs closed-lost",
    kind: ToolKind::Metric,
    requires_generation: false,
};

/// Supported metrics. The command grammar is a bare lower-case keyword;
/// anything else is rejected before any SQL runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalyticsMetric {
    PipelineValue,
    LeadConversionRate,
    WinRate,
}

impl FromStr for AnalyticsMetric {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pipeline_value" => Ok(Self::PipelineValue),
            "lead_conversion_rate" => Ok(Self::LeadConversionRate),
            "win_rate" => Ok(Self::WinRate),
            _ => Err(()),
        }
    }
}

impl AnalyticsMetric {
    pub fn name(&self) -> &'static str {
        match self {
            Self::PipelineValue => "pipeline_value",
            Self::LeadConversionRate => "lead_conversion_rate",
            Self::WinRate => "win_rate",
        }
    }
}

/// Metric tool backed by fixed aggregate queries against the record store.
pub struct CrmAnalytics {
    store: Arc<RecordStore>,
}

impl CrmAnalytics {
    pub fn new(store: Arc<RecordStore>) -> Self {
        Self { store }
    }

    fn compute(&self, metric: AnalyticsMetric) -> Result<Value, crate::store::StoreError> {
        match metric {
            AnalyticsMetric::PipelineValue => {
                let rows = self.store.query(
                    "SELECT COALESCE(SUM(amount), 0) AS total_value, COUNT(*) AS deal_count \
                     FROM opportunities WHERE is_closed = 0",
                )?;
                Ok(first_row(rows))
            }
            AnalyticsMetric::LeadConversionRate => {
                let rows = self.store.query(
                    "SELECT SUM(CASE WHEN lead_status = 'converted' THEN 1 ELSE 0 END) AS converted, \
                     COUNT(*) AS total FROM leads",
                )?;
                let row = first_row(rows);
                let converted = row["converted"].as_f64().unwrap_or(0.0);
                let total = row["total"].as_f64().unwrap_or(0.0);
                let rate = if total > 0.0 {
                    (converted / total * 100.0 * 100.0).round() / 100.0
                } else {
                    0.0
                };
                Ok(json!({
                    "conversion_rate": rate,
                    "converted": row["converted"],
                    "total": row["total"],
                }))
            }
            AnalyticsMetric::WinRate => {
                let rows = self.store.query(
                    "SELECT SUM(CASE WHEN is_won = 1 THEN 1 ELSE 0 END) AS won, \
                     SUM(CASE WHEN is_closed = 1 THEN 1 ELSE 0 END) AS closed FROM opportunities",
                )?;
                let row = first_row(rows);
                let won = row["won"].as_f64().unwrap_or(0.0);
                let closed = row["closed"].as_f64().unwrap_or(0.0);
                let rate = if closed > 0.0 {
                    (won / closed * 100.0 * 100.0).round() / 100.0
                } else {
                    0.0
                };
                Ok(json!({
                    "win_rate": rate,
                    "won": row["won"],
                    "closed": row["closed"],
                }))
            }
        }
    }
}

fn first_row(rows: Vec<serde_json::Map<String, Value>>) -> Value {
    rows.into_iter()
        .next()
        .map(Value::Object)
        .unwrap_or_else(|| json!({}))
}

#[async_trait]
impl Tool for CrmAnalytics {
    fn descriptor(&self) -> &ToolDescriptor {
        &DESCRIPTOR
    }

    async fn execute(&self, command: &str) -> ToolResult {
        let metric = match AnalyticsMetric::from_str(command) {
            Ok(m) => m,
            Err(()) => {
                return ToolResult::failure_with_command(
                    format!("Unknown metric: {}", command.trim()),
                    command,
                )
            }
        };

        match self.compute(metric) {
            Ok(value) => ToolResult::metric(json!({
                "metric": metric.name(),
                "value": value,
            })),
            Err(e) => ToolResult::failure_with_command(e.to_string(), command),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::seeded_store;

    fn tool() -> CrmAnalytics {
        CrmAnalytics::new(Arc::new(seeded_store()))
    }

    #[test]
    fn parses_metric_keywords() {
        assert_eq!(
            AnalyticsMetric::from_str(" Pipeline_Value "),
            Ok(AnalyticsMetric::PipelineValue)
        );
        assert!(AnalyticsMetric::from_str("deal_velocity").is_err());
    }

    #[tokio::test]
    async fn computes_pipeline_value_over_open_deals() {
        let result = tool().execute("pipeline_value").await;
        assert!(result.is_success());
        match result {
            ToolResult::Success { value: Some(v), .. } => {
                // Seed data: two open opportunities worth 50k + 30k
                assert_eq!(v["value"]["total_value"].as_f64(), Some(80000.0));
                assert_eq!(v["value"]["deal_count"].as_i64(), Some(2));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn computes_win_rate() {
        let result = tool().execute("win_rate").await;
        match result {
            ToolResult::Success { value: Some(v), .. } => {
                // Seed data: 1 won of 2 closed
                assert_eq!(v["value"]["win_rate"].as_f64(), Some(50.0));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn unknown_metric_is_failure() {
        let result = tool().execute("deal_velocity").await;
        assert!(!result.is_success());
        assert!(result.error().unwrap().contains("deal_velocity"));
    }
}
