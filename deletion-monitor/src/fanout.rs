/*!
One-shot fan-out of log queries across remote monitor sites

Every site is queried concurrently at `GET <site>/logs/<date>`. A site that
fails is reported inline with an error entry; the others are unaffected.
There is no retry and no ordering between sites.
*/

use chrono::NaiveDate;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::core::{
    error::{MonitorError, Result},
    output_plugins::{AlertStatus, WebhookPayload},
};

/// Result of querying one site
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SiteResult {
    Logs { site: String, logs: serde_json::Value },
    Error { site: String, error: String },
}

impl SiteResult {
    pub fn site(&self) -> &str {
        match self {
            Self::Logs { site, .. } | Self::Error { site, .. } => site,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }
}

#[derive(Debug, Deserialize)]
struct LogsEnvelope {
    logs: serde_json::Value,
}

fn logs_url(site: &str, date: NaiveDate) -> String {
    format!("{}/logs/{}", site.trim_end_matches('/'), date.format("%Y-%m-%d"))
}

async fn fetch_site(client: &reqwest::Client, site: &str, date: NaiveDate) -> Result<serde_json::Value> {
    let response = client.get(logs_url(site, date)).send().await?;
    if !response.status().is_success() {
        return Err(MonitorError::HttpStatus(response.status()));
    }
    let envelope: LogsEnvelope = response.json().await?;
    Ok(envelope.logs)
}

/// Queries all sites and gathers every result, successes and failures alike,
/// in the order the sites were given.
pub async fn fan_out(client: &reqwest::Client, sites: &[String], date: NaiveDate) -> Vec<SiteResult> {
    let fetches = sites.iter().map(|site| async move {
        match fetch_site(client, site, date).await {
            Ok(logs) => SiteResult::Logs {
                site: site.clone(),
                logs,
            },
            Err(e) => {
                warn!("Fetching logs from {} failed: {}", site, e);
                SiteResult::Error {
                    site: site.clone(),
                    error: e.to_string(),
                }
            }
        }
    });

    let results = join_all(fetches).await;
    info!(
        "Fan-out finished: {} sites, {} failed",
        results.len(),
        results.iter().filter(|result| result.is_error()).count()
    );
    results
}

/// Single combined notification for a finished fan-out
pub fn summary_payload(results: &[SiteResult], event_name: &str, username: &str) -> Result<WebhookPayload> {
    let status = if results.iter().any(SiteResult::is_error) {
        AlertStatus::Error
    } else {
        AlertStatus::Success
    };

    Ok(WebhookPayload {
        message: serde_json::to_string(results)?,
        event_name: event_name.to_string(),
        status,
        username: username.to_string(),
    })
}
