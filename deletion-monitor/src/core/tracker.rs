/*!
Polling loop that drives the deletion pipeline

Each cycle runs fetch → parse → dedup → resolve → notify → persist to
completion before the tracker goes idle for the configured delay.
*/

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::core::{
    command::{CommandRunner, SystemCommandRunner},
    config::{MonitorConfig, SourceKind},
    dedup::Deduplicator,
    error::{MonitorError, Result},
    log_source::{AuditLogSource, LogSource, NotifyLogSource},
    output_plugins::{OutputManager, WebhookNotifier},
    parser::parse_deletions,
    store::DeletionStore,
    user_resolver::{SystemUserResolver, UserResolver},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerState {
    /// Waiting for the next tick
    Idle,
    /// Running one pipeline pass
    Processing,
}

/// What one cycle did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub parsed: usize,
    pub suppressed: usize,
    pub dispatched: usize,
}

/// Main tracker that coordinates all components
pub struct DeletionTracker {
    source: Box<dyn LogSource>,
    resolver: Box<dyn UserResolver>,
    dedup: Deduplicator,
    outputs: OutputManager,
    poll_interval: Duration,
    state: TrackerState,
    prepared: bool,
    cycles: u64,
}

/// Fails unless `path` exists and is a directory
pub fn check_watch_target(path: &Path) -> Result<()> {
    if path.is_dir() {
        Ok(())
    } else {
        Err(MonitorError::WatchTargetMissing(path.display().to_string()))
    }
}

impl DeletionTracker {
    pub fn new(
        source: Box<dyn LogSource>,
        resolver: Box<dyn UserResolver>,
        outputs: OutputManager,
        poll_interval: Duration,
    ) -> Self {
        Self {
            source,
            resolver,
            dedup: Deduplicator::new(),
            outputs,
            poll_interval,
            state: TrackerState::Idle,
            prepared: false,
            cycles: 0,
        }
    }

    /// Builds the tracker from configuration. Fails if the watched
    /// directory does not exist.
    pub fn from_config(config: &MonitorConfig, store: Option<Arc<Mutex<DeletionStore>>>) -> Result<Self> {
        check_watch_target(&config.watch.path)?;
        info!("Initializing deletion tracker for {:?}", config.watch.path);

        let runner: Arc<dyn CommandRunner> = Arc::new(SystemCommandRunner::new(config.command_timeout()));

        let source: Box<dyn LogSource> = match config.source.kind {
            SourceKind::Audit => {
                let checkpoint = config.source.checkpoint_path.clone().filter(|checkpoint| {
                    match checkpoint.parent().map(std::fs::create_dir_all) {
                        Some(Err(e)) => {
                            warn!("Not using ausearch checkpoint {:?}: {}", checkpoint, e);
                            false
                        }
                        _ => true,
                    }
                });
                Box::new(AuditLogSource::new(
                    runner.clone(),
                    config.watch.path.clone(),
                    config.source.audit_key.clone(),
                    checkpoint,
                ))
            }
            SourceKind::Notify => Box::new(NotifyLogSource::new(config.watch.path.clone())),
        };

        let resolver = Box::new(SystemUserResolver::new(runner));
        let notifier = WebhookNotifier::new(config.watch.webhook_url.clone(), &config.notifier)?;
        let outputs = OutputManager::with_notifier(notifier, store);

        Ok(Self::new(source, resolver, outputs, config.poll_interval()))
    }

    pub fn state(&self) -> TrackerState {
        self.state
    }

    pub fn cycles_completed(&self) -> u64 {
        self.cycles
    }

    /// Runs cycles with a fixed delay after each one until the watched
    /// directory itself goes away. Otherwise stopped by dropping the future
    /// (e.g. on Ctrl-C).
    pub async fn start(&mut self) -> Result<()> {
        info!("🚀 Starting deletion tracker with {} source", self.source.name());
        info!("📤 Outputs: {:?}", self.outputs.handler_names());
        info!("⏱ Poll interval: {:?}", self.poll_interval);

        loop {
            let report = self.run_cycle().await;
            if report.parsed > 0 {
                info!(
                    "Cycle {}: {} parsed, {} suppressed, {} dispatched",
                    self.cycles, report.parsed, report.suppressed, report.dispatched
                );
            }
            if let Some(target) = self.source.lost_target() {
                error!("❌ Watched directory {:?} was removed, stopping", target);
                return Err(MonitorError::WatchTargetMissing(target.display().to_string()));
            }
            sleep(self.poll_interval).await;
        }
    }

    /// Runs one full pipeline pass. Never fails: every error inside a cycle
    /// is logged and the cycle carries on.
    pub async fn run_cycle(&mut self) -> CycleReport {
        self.state = TrackerState::Processing;
        let mut report = CycleReport::default();

        self.ensure_prepared().await;

        if let Some(raw) = self.source.poll().await {
            let events = parse_deletions(&raw);
            report.parsed = events.len();

            // oldest first, so the dedup slot ends on the newest record
            for event in events.into_iter().rev() {
                let Some(mut event) = self.dedup.admit(event) else {
                    report.suppressed += 1;
                    continue;
                };

                event.user_name = Some(self.resolver.resolve(event.user_id.as_deref()).await);
                warn!(
                    "🗑 {} deleted: {} by {}",
                    event.kind_label(),
                    event.path_or_missing(),
                    event.user_name_or_unknown()
                );

                self.outputs.handle_deletion(&event).await;
                report.dispatched += 1;
            }
        } else {
            debug!("No new delete records");
        }

        self.cycles += 1;
        self.state = TrackerState::Idle;
        report
    }

    /// Registers the watch, retrying on later cycles until it succeeds
    async fn ensure_prepared(&mut self) {
        if self.prepared {
            return;
        }
        match self.source.prepare().await {
            Ok(()) => self.prepared = true,
            Err(e) => error!("⚠️ Could not register {} watch: {}", self.source.name(), e),
        }
    }
}
