/*!
Sources of raw delete records for the watched directory

Two implementations sit behind [`LogSource`]: the Linux audit subsystem,
queried through `auditctl`/`ausearch`, and kernel file-change notifications
via the `notify` crate. Both hand back `key=value` text for the parser.
*/

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use notify::{
    event::RemoveKind, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher,
};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::core::{
    command::{CommandOutput, CommandRunner},
    error::{MonitorError, Result},
};

/// ausearch exit codes reporting an unusable checkpoint file
const CHECKPOINT_ERROR_CODES: [i32; 3] = [10, 11, 12];

/// Yields raw delete-related log text on each poll.
#[async_trait]
pub trait LogSource: Send {
    fn name(&self) -> &'static str;

    /// Registers the watch for the target directory. Safe to call repeatedly.
    async fn prepare(&mut self) -> Result<()> {
        Ok(())
    }

    /// Returns new raw records, or `None` if nothing new arrived. Failures of
    /// the underlying tool are logged and reported as `None`.
    async fn poll(&mut self) -> Option<String>;

    /// The watched directory, once the source has seen it removed
    fn lost_target(&self) -> Option<&Path> {
        None
    }
}

/// Reads delete records from the Linux audit log
pub struct AuditLogSource {
    runner: Arc<dyn CommandRunner>,
    watch_path: PathBuf,
    key: String,
    checkpoint: Option<PathBuf>,
}

impl AuditLogSource {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        watch_path: PathBuf,
        key: String,
        checkpoint: Option<PathBuf>,
    ) -> Self {
        Self {
            runner,
            watch_path,
            key,
            checkpoint,
        }
    }

    fn watch_path_str(&self) -> String {
        self.watch_path.to_string_lossy().into_owned()
    }

    async fn search_args(&self) -> Vec<String> {
        let mut args = vec!["-k".to_string(), self.key.clone()];
        match &self.checkpoint {
            Some(checkpoint) => {
                let start = if tokio::fs::try_exists(checkpoint).await.unwrap_or(false) {
                    "checkpoint"
                } else {
                    "recent"
                };
                args.extend([
                    "--checkpoint".to_string(),
                    checkpoint.to_string_lossy().into_owned(),
                    "--start".to_string(),
                    start.to_string(),
                ]);
            }
            None => args.extend(["--start".to_string(), "recent".to_string()]),
        }
        args
    }

    async fn reset_checkpoint(&self) {
        if let Some(checkpoint) = &self.checkpoint {
            if let Err(e) = tokio::fs::remove_file(checkpoint).await {
                debug!("Could not remove checkpoint {:?}: {}", checkpoint, e);
            }
        }
    }
}

fn reports_no_matches(output: &CommandOutput) -> bool {
    output.stdout.to_lowercase().contains("no matches")
        || output.stderr.to_lowercase().contains("no matches")
}

fn command_failed(program: &str, output: &CommandOutput) -> MonitorError {
    MonitorError::Command {
        program: program.to_string(),
        reason: format!(
            "exit code {:?}: {}",
            output.code,
            output.stderr.trim()
        ),
    }
}

#[async_trait]
impl LogSource for AuditLogSource {
    fn name(&self) -> &'static str {
        "audit"
    }

    async fn prepare(&mut self) -> Result<()> {
        let path = self.watch_path_str();

        let rules = self.runner.run("auditctl", &["-l"]).await?;
        if !rules.success {
            return Err(command_failed("auditctl", &rules));
        }
        if rules.stdout.lines().any(|rule| rule.contains(&path)) {
            info!("✅ Audit rule already exists for {}", path);
            return Ok(());
        }

        let added = self
            .runner
            .run("auditctl", &["-w", &path, "-p", "wa", "-k", &self.key])
            .await?;
        if !added.success {
            return Err(command_failed("auditctl", &added));
        }

        info!("🚀 Added audit rule to monitor {} (key {})", path, self.key);
        Ok(())
    }

    async fn poll(&mut self) -> Option<String> {
        let args = self.search_args().await;
        let args: Vec<&str> = args.iter().map(String::as_str).collect();

        let output = match self.runner.run("ausearch", &args).await {
            Ok(output) => output,
            Err(e) => {
                warn!("Audit search unavailable: {}", e);
                return None;
            }
        };

        if reports_no_matches(&output) {
            return None;
        }

        if !output.success {
            if output.code.is_some_and(|code| CHECKPOINT_ERROR_CODES.contains(&code)) {
                warn!("Discarding unusable ausearch checkpoint (exit code {:?})", output.code);
                self.reset_checkpoint().await;
            } else {
                warn!("{}", command_failed("ausearch", &output));
            }
            return None;
        }

        if output.stdout.trim().is_empty() {
            return None;
        }
        Some(output.stdout)
    }
}

/// A removal reported by the kernel
#[derive(Debug, Clone)]
struct Removal {
    path: PathBuf,
    is_directory: Option<bool>,
    at: DateTime<Utc>,
}

/// Watches the directory tree with kernel notifications (inotify on Linux).
///
/// The audit subsystem is not consulted, so these records carry no uid.
pub struct NotifyLogSource {
    root: PathBuf,
    watcher: Option<RecommendedWatcher>,
    receiver: Option<mpsc::UnboundedReceiver<Removal>>,
    sequence: u64,
    root_removed: bool,
}

impl NotifyLogSource {
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            watcher: None,
            receiver: None,
            sequence: 0,
            root_removed: false,
        }
    }

    fn render(&mut self, removal: &Removal) -> String {
        self.sequence += 1;

        let mut line = format!(
            "type=DELETE msg=notify({}.{:03}:{}) nametype=DELETE name={}",
            removal.at.timestamp(),
            removal.at.timestamp_subsec_millis(),
            self.sequence,
            encode_name(&removal.path),
        );
        match removal.is_directory {
            Some(true) => line.push_str(" mode=040000"),
            Some(false) => line.push_str(" mode=0100000"),
            None => {}
        }
        line
    }
}

/// Quotes the name, or hex-encodes it the way auditd does when quoting
/// would be ambiguous.
fn encode_name(path: &Path) -> String {
    let name = path.to_string_lossy();
    if name.contains(['"', '\'']) || name.chars().any(char::is_control) {
        name.bytes().map(|b| format!("{:02X}", b)).collect()
    } else {
        format!("\"{}\"", name)
    }
}

fn removal_from(event: Event) -> Vec<Removal> {
    let EventKind::Remove(kind) = event.kind else {
        return Vec::new();
    };
    let is_directory = match kind {
        RemoveKind::Folder => Some(true),
        RemoveKind::File => Some(false),
        _ => None,
    };
    let at = Utc::now();

    event
        .paths
        .into_iter()
        .map(|path| Removal {
            path,
            is_directory,
            at,
        })
        .collect()
}

#[async_trait]
impl LogSource for NotifyLogSource {
    fn name(&self) -> &'static str {
        "notify"
    }

    async fn prepare(&mut self) -> Result<()> {
        if self.watcher.is_some() {
            return Ok(());
        }

        // reported paths are compared against the root
        if let Ok(root) = tokio::fs::canonicalize(&self.root).await {
            self.root = root;
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let mut watcher = notify::recommended_watcher(move |result: notify::Result<Event>| {
            match result {
                Ok(event) => {
                    for removal in removal_from(event) {
                        let _ = tx.send(removal);
                    }
                }
                Err(e) => warn!("File watch error: {}", e),
            }
        })?;
        watcher.watch(&self.root, RecursiveMode::Recursive)?;

        info!("✅ Monitoring {:?} and all subdirectories for deletions", self.root);
        self.watcher = Some(watcher);
        self.receiver = Some(rx);
        Ok(())
    }

    async fn poll(&mut self) -> Option<String> {
        let mut removals = Vec::new();
        if let Some(receiver) = self.receiver.as_mut() {
            while let Ok(removal) = receiver.try_recv() {
                removals.push(removal);
            }
        }
        if removals.is_empty() {
            return None;
        }

        if removals.iter().any(|removal| removal.path == self.root) {
            error!("❌ Watched directory {:?} was deleted", self.root);
            self.root_removed = true;
        }

        let lines: Vec<String> = removals.iter().map(|removal| self.render(removal)).collect();
        Some(lines.join("\n"))
    }

    fn lost_target(&self) -> Option<&Path> {
        self.root_removed.then_some(self.root.as_path())
    }
}
