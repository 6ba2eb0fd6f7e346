//! HTTP API for the CRM solver.
//!
//! ## Endpoints
//!
//! - `GET /health` - Health check
//! - `GET /api/agent/query/examples` - Example queries the solver handles well
//! - `POST /api/agent/query` - Solve a natural-language CRM query

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::config::Config;
use crate::solver::Solver;

/// Shared application state.
pub struct AppState {
    pub solver: Arc<Solver>,
}

#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    pub query: String,
}

/// Solve result plus a request id for log correlation.
#[derive(Debug, Serialize)]
pub struct QueryResponse {
    pub request_id: Uuid,
    #[serde(flatten)]
    pub result: crate::solver::SolveResult,
}

/// Build the router. Separated from `serve` so tests can drive it directly.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/agent/query/examples", get(query_examples))
        .route("/api/agent/query", post(solve_query))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the HTTP server.
pub async fn serve(config: &Config, solver: Arc<Solver>) -> anyhow::Result<()> {
    let state = Arc::new(AppState { solver });
    let app = router(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Listening on {}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok", "service": "crmflow" }))
}

async fn query_examples() -> Json<Value> {
    Json(json!({
        "examples": [
            "How many leads do we have?",
            "Show the top 10 opportunities by amount",
            "What is our current pipeline value?",
            "What is our lead conversion rate?",
            "List accounts in the Software industry",
            "Summarize recent activities and suggest next steps",
        ]
    }))
}

async fn solve_query(
    State(state): State<Arc<AppState>>,
    Json(request): Json<QueryRequest>,
) -> Result<Json<QueryResponse>, (StatusCode, Json<Value>)> {
    if request.query.trim().is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "query must not be empty" })),
        ));
    }

    let request_id = Uuid::new_v4();
    tracing::info!(%request_id, "Received agent query");

    let result = state.solver.solve(&request.query).await;
    Ok(Json(QueryResponse { request_id, result }))
}
