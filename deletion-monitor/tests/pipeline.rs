mod common;

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::http::StatusCode;
use tokio::sync::Mutex;

use deletion_monitor::core::{
    config::NotifierConfig,
    log_source::LogSource,
    output_plugins::{OutputManager, WebhookNotifier},
    store::DeletionStore,
    tracker::{CycleReport, DeletionTracker},
    user_resolver::UserResolver,
};

const REPORT: &str = "type=PATH msg=audit(1697725262.123:456): item=1 name=\"/home/alice/report.txt\" inode=42 mode=0100644 ouid=0 nametype=DELETE\n\
                      type=SYSCALL msg=audit(1697725262.123:456): arch=c000003e syscall=263 success=yes uid=1000 comm=\"rm\" key=\"file_delete\"";

const SECOND: &str = "type=PATH msg=audit(1697725270.500:457): item=1 name=\"/home/alice/old\" mode=040755 nametype=DELETE\n\
                      type=SYSCALL msg=audit(1697725270.500:457): syscall=84 uid=1000 key=\"file_delete\"";

struct Batches(VecDeque<&'static str>);

#[async_trait]
impl LogSource for Batches {
    fn name(&self) -> &'static str {
        "batches"
    }

    async fn poll(&mut self) -> Option<String> {
        self.0.pop_front().map(str::to_string)
    }
}

struct Alice;

#[async_trait]
impl UserResolver for Alice {
    async fn resolve(&self, user_id: Option<&str>) -> String {
        match user_id {
            Some("1000") => "alice".to_string(),
            _ => "Unknown".to_string(),
        }
    }
}

fn tracker(
    batches: Vec<&'static str>,
    webhook_url: &str,
    store: Option<Arc<Mutex<DeletionStore>>>,
) -> DeletionTracker {
    let notifier = WebhookNotifier::new(webhook_url.to_string(), &NotifierConfig::default()).unwrap();
    DeletionTracker::new(
        Box::new(Batches(batches.into())),
        Box::new(Alice),
        OutputManager::with_notifier(notifier, store),
        Duration::from_secs(10),
    )
}

#[tokio::test]
async fn deletion_reaches_webhook_and_store() {
    let receiver = common::spawn_receiver(StatusCode::OK).await;
    let store = Arc::new(Mutex::new(DeletionStore::open_in_memory("deletion_logs").unwrap()));
    let mut tracker = tracker(vec![REPORT], &receiver.url, Some(store.clone()));

    let report = tracker.run_cycle().await;
    assert_eq!(report, CycleReport { parsed: 1, suppressed: 0, dispatched: 1 });

    let received = receiver.received();
    assert_eq!(received.len(), 1);
    let message = received[0]["message"].as_str().unwrap();
    assert!(message.contains("/home/alice/report.txt"));
    assert!(message.contains("alice"));
    assert_eq!(received[0]["status"], "success");
    assert_eq!(received[0]["event_name"], "deletion");
    assert_eq!(received[0]["username"], "File Monitor");

    let day = chrono::NaiveDate::from_ymd_opt(2023, 10, 19).unwrap();
    let logs = store.lock().await.logs_for_date(day).unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].file_path, "/home/alice/report.txt");
    assert_eq!(logs[0].deleted_by, "alice");
}

#[tokio::test]
async fn rejected_webhook_does_not_stop_the_loop() {
    let receiver = common::spawn_receiver(StatusCode::INTERNAL_SERVER_ERROR).await;
    let store = Arc::new(Mutex::new(DeletionStore::open_in_memory("deletion_logs").unwrap()));
    let mut tracker = tracker(vec![REPORT, SECOND], &receiver.url, Some(store.clone()));

    assert_eq!(tracker.run_cycle().await.dispatched, 1);
    assert_eq!(tracker.run_cycle().await.dispatched, 1);
    assert_eq!(tracker.cycles_completed(), 2);

    // both attempts reached the webhook, and persistence still ran
    assert_eq!(receiver.received().len(), 2);
    let day = chrono::NaiveDate::from_ymd_opt(2023, 10, 19).unwrap();
    assert_eq!(store.lock().await.logs_for_date(day).unwrap().len(), 2);
}

#[tokio::test]
async fn unreachable_webhook_is_tolerated() {
    let mut tracker = tracker(vec![REPORT, REPORT], "http://127.0.0.1:1/hook", None);

    assert_eq!(tracker.run_cycle().await.dispatched, 1);
    let second = tracker.run_cycle().await;
    assert_eq!(second.suppressed, 1);
    assert_eq!(tracker.cycles_completed(), 2);
}

#[tokio::test]
async fn re_read_window_reaches_webhook_once_per_record() {
    const WINDOW: &str = "type=PATH msg=audit(1697725262.123:456): item=1 name=\"/home/alice/report.txt\" mode=0100644 nametype=DELETE\n\
                          type=SYSCALL msg=audit(1697725262.123:456): syscall=263 uid=1000 key=\"file_delete\"\n\
                          type=PATH msg=audit(1697725270.500:457): item=1 name=\"/home/alice/old\" mode=040755 nametype=DELETE\n\
                          type=SYSCALL msg=audit(1697725270.500:457): syscall=84 uid=1000 key=\"file_delete\"";

    let receiver = common::spawn_receiver(StatusCode::OK).await;
    let mut tracker = tracker(vec![WINDOW, WINDOW, WINDOW], &receiver.url, None);
    for _ in 0..3 {
        tracker.run_cycle().await;
    }

    let received = receiver.received();
    assert_eq!(received.len(), 2);
    assert!(received[0]["message"].as_str().unwrap().contains("report.txt"));
    assert!(received[1]["message"].as_str().unwrap().contains("Directory Deleted"));
}
