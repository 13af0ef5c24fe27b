/*!
Output handlers that receive each delivered deletion
*/

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{error, info};

use crate::core::{
    config::NotifierConfig,
    error::{MonitorError, Result},
    event::DeletionEvent,
    store::DeletionStore,
};

/// Trait for output plugins
#[async_trait]
pub trait OutputHandler: Send {
    /// Name of the output handler
    fn name(&self) -> &'static str;

    /// Handle a deletion event
    async fn handle_deletion(&mut self, event: &DeletionEvent) -> Result<()>;
}

/// Runs every handler for every event. A failing handler is logged and
/// never stops the ones after it.
pub struct OutputManager {
    handlers: Vec<Box<dyn OutputHandler>>,
}

impl OutputManager {
    pub fn new(handlers: Vec<Box<dyn OutputHandler>>) -> Self {
        info!("Initialized output manager with {} handlers", handlers.len());
        Self { handlers }
    }

    /// The webhook first, then the store when one is configured
    pub fn with_notifier(notifier: WebhookNotifier, store: Option<Arc<Mutex<DeletionStore>>>) -> Self {
        let mut handlers: Vec<Box<dyn OutputHandler>> = vec![Box::new(notifier)];
        if let Some(store) = store {
            handlers.push(Box::new(SqliteSink::new(store)));
        }
        Self::new(handlers)
    }

    /// Send a deletion to all handlers. Returns how many succeeded.
    pub async fn handle_deletion(&mut self, event: &DeletionEvent) -> usize {
        let mut succeeded = 0;
        for handler in &mut self.handlers {
            match handler.handle_deletion(event).await {
                Ok(()) => succeeded += 1,
                Err(e) => error!(
                    "Handler {} failed to process deletion of {}: {}",
                    handler.name(),
                    event.path_or_missing(),
                    e
                ),
            }
        }
        succeeded
    }

    pub fn handler_names(&self) -> Vec<&'static str> {
        self.handlers.iter().map(|handler| handler.name()).collect()
    }
}

/// Outcome label carried by every webhook payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertStatus {
    Success,
    Error,
}

/// Body POSTed to the webhook
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookPayload {
    pub message: String,
    pub event_name: String,
    pub status: AlertStatus,
    pub username: String,
}

/// Human-readable alert text for one deletion
pub fn format_alert(event: &DeletionEvent) -> String {
    format!(
        "🚨 {} Deleted: `{}`\n👤 Deleted by: `{}`\n🕒 At: {}",
        event.kind_label(),
        event.path_or_missing(),
        event.user_name_or_unknown(),
        event.timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
    )
}

/// POSTs a payload once. Anything but a 2xx answer is an error.
pub async fn deliver(client: &reqwest::Client, url: &str, payload: &WebhookPayload) -> Result<()> {
    let response = client.post(url).json(payload).send().await?;

    if !response.status().is_success() {
        return Err(MonitorError::HttpStatus(response.status()));
    }
    Ok(())
}

/// Delivers alerts to the configured webhook. No retries.
pub struct WebhookNotifier {
    url: String,
    username: String,
    event_name: String,
    client: reqwest::Client,
}

impl WebhookNotifier {
    pub fn new(url: String, config: &NotifierConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()?;
        Ok(Self::with_client(client, url, config))
    }

    pub fn with_client(client: reqwest::Client, url: String, config: &NotifierConfig) -> Self {
        Self {
            url,
            username: config.username.clone(),
            event_name: config.event_name.clone(),
            client,
        }
    }

    pub fn payload_for(&self, event: &DeletionEvent) -> WebhookPayload {
        WebhookPayload {
            message: format_alert(event),
            event_name: self.event_name.clone(),
            status: AlertStatus::Success,
            username: self.username.clone(),
        }
    }
}

#[async_trait]
impl OutputHandler for WebhookNotifier {
    fn name(&self) -> &'static str {
        "Webhook"
    }

    async fn handle_deletion(&mut self, event: &DeletionEvent) -> Result<()> {
        let payload = self.payload_for(event);
        deliver(&self.client, &self.url, &payload).await?;
        info!("✅ Webhook notification sent: {}", event.path_or_missing());
        Ok(())
    }
}

/// Appends each deletion to the SQLite store
pub struct SqliteSink {
    store: Arc<Mutex<DeletionStore>>,
}

impl SqliteSink {
    pub fn new(store: Arc<Mutex<DeletionStore>>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl OutputHandler for SqliteSink {
    fn name(&self) -> &'static str {
        "SQLite"
    }

    async fn handle_deletion(&mut self, event: &DeletionEvent) -> Result<()> {
        self.store.lock().await.append(event)?;
        Ok(())
    }
}
