/*!
HTTP service for log retrieval and interval ticks

Routes:
- `GET /health`
- `GET /logs/{date}`: persisted deletions for one UTC day (`YYYY-MM-DD`)
- `POST /tick`: fan out a log query to every configured site and post one
  combined notification to the caller's `return_url`
*/

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tracing::{error, info};

use crate::core::{
    config::{MonitorConfig, NotifierConfig},
    error::Result,
    output_plugins::deliver,
    store::{DeletionStore, StoredDeletion},
};
use crate::fanout::{fan_out, summary_payload, SiteResult};

/// Shared state for all handlers
pub struct AppState {
    /// `None` when persistence is disabled
    pub store: Option<Arc<Mutex<DeletionStore>>>,
    pub client: reqwest::Client,
    pub notifier: NotifierConfig,
}

impl AppState {
    pub fn from_config(config: &MonitorConfig, store: Option<Arc<Mutex<DeletionStore>>>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.server.fetch_timeout_secs.max(1)))
            .build()?;
        Ok(Self {
            store,
            client,
            notifier: config.notifier.clone(),
        })
    }
}

/// Response body for `GET /logs/{date}`
#[derive(Debug, Serialize, Deserialize)]
pub struct LogsResponse {
    pub logs: Vec<StoredDeletion>,
}

/// Request body for `POST /tick`
#[derive(Debug, Deserialize)]
pub struct TickRequest {
    pub return_url: String,
    #[serde(default)]
    pub settings: Vec<Setting>,
}

#[derive(Debug, Deserialize)]
pub struct Setting {
    pub label: String,
    #[serde(default)]
    pub default: Value,
}

impl TickRequest {
    /// Base URLs from every non-empty `site*` setting
    pub fn sites(&self) -> Vec<String> {
        self.settings
            .iter()
            .filter(|setting| setting.label.starts_with("site"))
            .filter_map(|setting| setting.default.as_str())
            .map(str::trim)
            .filter(|site| !site.is_empty())
            .map(str::to_string)
            .collect()
    }
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Handler for `GET /logs/{date}`
async fn get_logs_handler(
    State(state): State<Arc<AppState>>,
    Path(date): Path<String>,
) -> std::result::Result<Json<LogsResponse>, Response> {
    let day = NaiveDate::parse_from_str(&date, "%Y-%m-%d").map_err(|_| {
        error_response(
            StatusCode::BAD_REQUEST,
            format!("invalid date: {}. Expected YYYY-MM-DD", date),
        )
    })?;

    let Some(store) = &state.store else {
        return Err(error_response(
            StatusCode::SERVICE_UNAVAILABLE,
            "persistence is not configured",
        ));
    };

    let logs = store.lock().await.logs_for_date(day).map_err(|e| {
        error!("Failed to read logs for {}: {}", day, e);
        error_response(StatusCode::INTERNAL_SERVER_ERROR, "failed to read logs")
    })?;

    Ok(Json(LogsResponse { logs }))
}

/// Handler for `POST /tick`. Accepts immediately; the fan-out runs in the
/// background.
async fn tick_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<TickRequest>,
) -> Response {
    let sites = request.sites();
    if sites.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "no site settings configured");
    }

    info!("Tick received: querying {} sites", sites.len());
    let date = Utc::now().date_naive();
    tokio::spawn(async move {
        run_tick(&state, &request.return_url, &sites, date).await;
    });

    (StatusCode::ACCEPTED, Json(json!({ "status": "accepted" }))).into_response()
}

/// Queries every site, then posts the combined result to `return_url`.
/// Delivery failure is logged, not retried.
pub async fn run_tick(state: &AppState, return_url: &str, sites: &[String], date: NaiveDate) -> Vec<SiteResult> {
    let results = fan_out(&state.client, sites, date).await;

    match summary_payload(&results, &state.notifier.event_name, &state.notifier.username) {
        Ok(payload) => match deliver(&state.client, return_url, &payload).await {
            Ok(()) => info!("✅ Tick summary sent to {}", return_url),
            Err(e) => error!("❌ Failed to send tick summary to {}: {}", return_url, e),
        },
        Err(e) => error!("Failed to build tick summary: {}", e),
    }

    results
}

/// Builds the application router with all routes
pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/logs/{date}", get(get_logs_handler))
        .route("/tick", post(tick_handler))
        .with_state(state)
}

/// Binds the configured address and serves until the process stops
pub async fn serve(config: &MonitorConfig, store: Option<Arc<Mutex<DeletionStore>>>) -> Result<()> {
    let state = Arc::new(AppState::from_config(config, store)?);
    let listener = TcpListener::bind(config.server.bind_addr).await?;
    info!("🌐 Serving log retrieval on {}", listener.local_addr()?);

    axum::serve(listener, app(state)).await?;
    Ok(())
}
