#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::{extract::State, http::StatusCode, routing::{get, post}, Json, Router};
use serde_json::{json, Value};
use tokio::net::TcpListener;

/// Webhook receiver that records every JSON body and answers with `status`
#[derive(Clone)]
pub struct Receiver {
    pub url: String,
    received: Arc<Mutex<Vec<Value>>>,
}

impl Receiver {
    pub fn received(&self) -> Vec<Value> {
        self.received.lock().unwrap().clone()
    }

    /// Waits up to two seconds for `count` bodies to arrive
    pub async fn wait_for(&self, count: usize) -> Vec<Value> {
        for _ in 0..40 {
            let received = self.received();
            if received.len() >= count {
                return received;
            }
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        }
        self.received()
    }
}

async fn record(
    State((received, status)): State<(Arc<Mutex<Vec<Value>>>, StatusCode)>,
    Json(body): Json<Value>,
) -> StatusCode {
    received.lock().unwrap().push(body);
    status
}

pub async fn spawn(router: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

pub async fn spawn_receiver(status: StatusCode) -> Receiver {
    let received = Arc::new(Mutex::new(Vec::new()));
    let router = Router::new()
        .route("/hook", post(record))
        .with_state((received.clone(), status));
    let addr = spawn(router).await;
    Receiver {
        url: format!("http://{}/hook", addr),
        received,
    }
}

/// A remote site answering `GET /logs/{date}` with fixed logs or a 500
pub async fn spawn_site(logs: Option<Value>) -> String {
    let router = Router::new().route(
        "/logs/{date}",
        get(move || {
            let logs = logs.clone();
            async move {
                match logs {
                    Some(logs) => (StatusCode::OK, Json(json!({ "logs": logs }))),
                    None => (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": "down" }))),
                }
            }
        }),
    );
    format!("http://{}", spawn(router).await)
}
