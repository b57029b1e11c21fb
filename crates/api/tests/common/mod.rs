#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Method, Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use tower::ServiceExt;

use taskcast_api::config::ServerConfig;
use taskcast_api::router::build_app_router;
use taskcast_api::state::AppState;
use taskcast_core::task::TaskRecord;
use taskcast_core::types::TaskId;
use taskcast_events::{ConnectionRegistry, TaskEventBus};
use taskcast_worker::{QueueConfig, TaskQueue};

/// Build a test `ServerConfig` with safe defaults.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 5,
        queue: QueueConfig {
            pool_size: 2,
            ..QueueConfig::default()
        },
    }
}

/// Build the full application router plus the state behind it, so tests
/// can submit tasks and push notifications directly.
///
/// Must be called from inside a Tokio runtime.
pub fn build_test_app() -> (Router, AppState) {
    let (app, state, _bus) = build_test_app_with_bus();
    (app, state)
}

/// Like [`build_test_app`], also returning the queue's event bus.
pub fn build_test_app_with_bus() -> (Router, AppState, Arc<TaskEventBus>) {
    let config = test_config();
    let bus = Arc::new(TaskEventBus::default());
    let queue = TaskQueue::new(&config.queue, Arc::clone(&bus));
    let state = AppState::new(config.clone(), queue, Arc::new(ConnectionRegistry::new()));
    (build_app_router(state.clone(), &config), state, bus)
}

/// Serve `app` on an ephemeral local port.
pub async fn spawn_server(app: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

pub async fn get(app: Router, uri: &str) -> Response<Body> {
    send(app, Method::GET, uri).await
}

pub async fn post(app: Router, uri: &str) -> Response<Body> {
    send(app, Method::POST, uri).await
}

async fn send(app: Router, method: Method, uri: &str) -> Response<Body> {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

/// Poll until the task is terminal.
pub async fn wait_terminal(queue: &TaskQueue, task_id: TaskId) -> TaskRecord {
    for _ in 0..300 {
        if let Some(record) = queue.get(task_id).filter(TaskRecord::is_terminal) {
            return record;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("task {task_id} did not finish");
}
