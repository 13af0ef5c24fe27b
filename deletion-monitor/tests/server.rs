mod common;

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
};
use chrono::{NaiveDate, TimeZone, Utc};
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tower::ServiceExt;

use deletion_monitor::{
    core::{config::NotifierConfig, store::DeletionStore},
    fanout::{fan_out, SiteResult},
    server::{app, run_tick, AppState},
    DeletionEvent,
};

fn state(store: Option<DeletionStore>) -> Arc<AppState> {
    Arc::new(AppState {
        store: store.map(|store| Arc::new(Mutex::new(store))),
        client: reqwest::Client::new(),
        notifier: NotifierConfig::default(),
    })
}

fn seeded_store() -> DeletionStore {
    let store = DeletionStore::open_in_memory("deletion_logs").unwrap();
    let event = DeletionEvent {
        event_id: Some("1760886062.000:1".to_string()),
        path: Some("/srv/share/budget.xlsx".to_string()),
        is_directory: Some(false),
        user_id: Some("1000".to_string()),
        user_name: Some("alice".to_string()),
        timestamp: Utc.with_ymd_and_hms(2026, 10, 19, 15, 1, 2).unwrap(),
    };
    store.append(&event).unwrap();
    store
}

async fn get(state: Arc<AppState>, uri: &str) -> (StatusCode, Value) {
    let response = app(state)
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&body).unwrap())
}

#[tokio::test]
async fn logs_for_a_day_are_served() {
    let (status, body) = get(state(Some(seeded_store())), "/logs/2026-10-19").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["logs"].as_array().unwrap().len(), 1);
    assert_eq!(body["logs"][0]["file_path"], "/srv/share/budget.xlsx");
    assert_eq!(body["logs"][0]["deleted_by"], "alice");
    assert_eq!(body["logs"][0]["timestamp"], "2026-10-19 15:01:02");

    let (status, body) = get(state(Some(seeded_store())), "/logs/2026-10-20").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["logs"], json!([]));
}

#[tokio::test]
async fn malformed_date_is_a_bad_request() {
    let (status, body) = get(state(Some(seeded_store())), "/logs/19-10-2026").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("YYYY-MM-DD"));
}

#[tokio::test]
async fn logs_without_persistence_are_unavailable() {
    let (status, _) = get(state(None), "/logs/2026-10-19").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn health_reports_ok() {
    let (status, body) = get(state(None), "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn fan_out_reports_failing_site_inline() {
    let a = common::spawn_site(Some(json!([{"id": 1, "file_path": "/a"}]))).await;
    let b = common::spawn_site(None).await;
    let c = common::spawn_site(Some(json!([]))).await;
    let sites = vec![a.clone(), b.clone(), c.clone()];

    let day = NaiveDate::from_ymd_opt(2026, 10, 19).unwrap();
    let results = fan_out(&reqwest::Client::new(), &sites, day).await;

    assert_eq!(results.len(), 3);
    assert_eq!(results.iter().filter(|result| result.is_error()).count(), 1);
    let failed = results.iter().find(|result| result.is_error()).unwrap();
    assert_eq!(failed.site(), b);
    assert!(matches!(&results[0], SiteResult::Logs { site, .. } if *site == a));
    assert!(matches!(&results[2], SiteResult::Logs { site, logs } if *site == c && logs == &json!([])));
}

#[tokio::test]
async fn tick_summary_is_posted_to_return_url() {
    let receiver = common::spawn_receiver(StatusCode::OK).await;
    let up = common::spawn_site(Some(json!([]))).await;
    let down = common::spawn_site(None).await;

    let day = NaiveDate::from_ymd_opt(2026, 10, 19).unwrap();
    let results = run_tick(&state(None), &receiver.url, &[up, down.clone()], day).await;
    assert_eq!(results.len(), 2);

    let received = receiver.received();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0]["status"], "error");
    assert!(received[0]["message"].as_str().unwrap().contains(&down));
}

#[tokio::test]
async fn tick_is_accepted_and_runs_in_background() {
    let receiver = common::spawn_receiver(StatusCode::OK).await;
    let site = common::spawn_site(Some(json!([]))).await;

    let request = json!({
        "channel_id": "chan",
        "return_url": receiver.url,
        "settings": [
            {"label": "site-1", "type": "text", "required": true, "default": site},
            {"label": "interval", "type": "text", "required": true, "default": "* * * * *"}
        ]
    });
    let response = app(state(None))
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/tick")
                .header("content-type", "application/json")
                .body(Body::from(request.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    let received = receiver.wait_for(1).await;
    assert_eq!(received.len(), 1);
    assert_eq!(received[0]["status"], "success");
}

#[tokio::test]
async fn tick_without_sites_is_rejected() {
    let response = app(state(None))
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/tick")
                .header("content-type", "application/json")
                .body(Body::from(json!({"return_url": "http://localhost/x", "settings": []}).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
