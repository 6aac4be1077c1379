//! Mock appliance API for vprov-rest integration tests.
//!
//! Serves datacenters and their portgroups under `/api/v1`, a health
//! endpoint that becomes ready after a number of hits, and task documents
//! for asynchronous operations.

#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Map, Value};
use tokio::net::TcpListener;
use vprov_rest::{RestClient, RestConfig};

/// Scripted task: reports `running` for `running_polls` polls, then `outcome`.
#[derive(Debug, Clone)]
pub struct TaskScript {
    pub running_polls: u32,
    pub outcome: Value,
    pub polls: u32,
}

#[derive(Debug, Default)]
pub struct Appliance {
    pub datacenters: BTreeSet<String>,
    pub portgroups: BTreeMap<(String, String), Map<String, Value>>,
    /// Names invisible to GET that still collide on POST.
    pub hidden: BTreeSet<String>,
    pub patches: Vec<Value>,
    pub mutations: u32,
    pub health_hits: u32,
    pub health_ready_after: u32,
    /// When set, POST and DELETE answer `202` with a task running this script.
    pub task_script: Option<TaskScript>,
    pub tasks: BTreeMap<u32, TaskScript>,
}

pub type Shared = Arc<Mutex<Appliance>>;

impl Appliance {
    fn start_task(&mut self) -> Option<Response> {
        let script = self.task_script.clone()?;
        let id = self.tasks.len() as u32 + 1;
        self.tasks.insert(id, script);
        let location = format!("/api/v1/tasks/{}", id);
        Some(
            (
                StatusCode::ACCEPTED,
                [(header::LOCATION, location)],
                Json(json!({ "task": id })),
            )
                .into_response(),
        )
    }
}

fn not_found(what: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "message": format!("{} not found", what) })),
    )
        .into_response()
}

async fn get_datacenter(State(app): State<Shared>, Path(dc): Path<String>) -> Response {
    let app = app.lock().unwrap();
    if app.datacenters.contains(&dc) {
        Json(json!({ "name": dc })).into_response()
    } else {
        not_found(&dc)
    }
}

async fn create_portgroup(
    State(app): State<Shared>,
    Path(dc): Path<String>,
    Json(body): Json<Map<String, Value>>,
) -> Response {
    let mut app = app.lock().unwrap();
    if !app.datacenters.contains(&dc) {
        return not_found(&dc);
    }
    let name = body
        .get("name")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    if app.hidden.contains(&name) || app.portgroups.contains_key(&(dc.clone(), name.clone())) {
        return (
            StatusCode::CONFLICT,
            Json(json!({ "message": format!("portgroup {} already exists", name) })),
        )
            .into_response();
    }
    app.mutations += 1;
    app.portgroups.insert((dc, name), body.clone());
    if let Some(accepted) = app.start_task() {
        return accepted;
    }
    (StatusCode::CREATED, Json(Value::Object(body))).into_response()
}

async fn get_portgroup(
    State(app): State<Shared>,
    Path((dc, name)): Path<(String, String)>,
) -> Response {
    let app = app.lock().unwrap();
    match app.portgroups.get(&(dc, name.clone())) {
        Some(pg) => Json(Value::Object(pg.clone())).into_response(),
        None => not_found(&name),
    }
}

async fn patch_portgroup(
    State(app): State<Shared>,
    Path((dc, name)): Path<(String, String)>,
    Json(changes): Json<Map<String, Value>>,
) -> Response {
    let mut app = app.lock().unwrap();
    app.patches.push(Value::Object(changes.clone()));
    let Some(pg) = app.portgroups.get_mut(&(dc, name.clone())) else {
        return not_found(&name);
    };
    pg.extend(changes);
    let updated = pg.clone();
    app.mutations += 1;
    Json(Value::Object(updated)).into_response()
}

async fn delete_portgroup(
    State(app): State<Shared>,
    Path((dc, name)): Path<(String, String)>,
) -> Response {
    let mut app = app.lock().unwrap();
    if app.portgroups.remove(&(dc, name.clone())).is_none() {
        return not_found(&name);
    }
    app.mutations += 1;
    if let Some(accepted) = app.start_task() {
        return accepted;
    }
    StatusCode::NO_CONTENT.into_response()
}

async fn health(State(app): State<Shared>) -> Response {
    let mut app = app.lock().unwrap();
    app.health_hits += 1;
    if app.health_hits >= app.health_ready_after {
        Json(json!({ "status": "ok" })).into_response()
    } else {
        StatusCode::SERVICE_UNAVAILABLE.into_response()
    }
}

async fn get_task(State(app): State<Shared>, Path(id): Path<u32>) -> Response {
    let mut app = app.lock().unwrap();
    let Some(task) = app.tasks.get_mut(&id) else {
        return not_found("task");
    };
    task.polls += 1;
    if task.polls <= task.running_polls {
        Json(json!({ "id": id, "status": "running" })).into_response()
    } else {
        let mut doc = task.outcome.clone();
        if let Some(map) = doc.as_object_mut() {
            map.insert("id".to_string(), json!(id));
        }
        Json(doc).into_response()
    }
}

/// Mock appliance listening on an OS-assigned local port.
pub struct TestAppliance {
    pub addr: SocketAddr,
    pub state: Shared,
    shutdown_tx: tokio::sync::oneshot::Sender<()>,
}

impl TestAppliance {
    pub async fn spawn() -> Self {
        let state: Shared = Arc::new(Mutex::new(Appliance::default()));

        let router = Router::new()
            .route("/api/v1/health", get(health))
            .route("/api/v1/datacenters/{dc}", get(get_datacenter))
            .route(
                "/api/v1/datacenters/{dc}/portgroups",
                axum::routing::post(create_portgroup),
            )
            .route(
                "/api/v1/datacenters/{dc}/portgroups/{name}",
                get(get_portgroup)
                    .patch(patch_portgroup)
                    .delete(delete_portgroup),
            )
            .route("/api/v1/tasks/{id}", get(get_task))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind");
        let addr = listener.local_addr().unwrap();

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
        tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
                .expect("Server error");
        });

        Self {
            addr,
            state,
            shutdown_tx,
        }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}/api/v1", self.addr)
    }

    pub fn client(&self) -> RestClient {
        RestClient::new(&RestConfig::new(self.base_url())).unwrap()
    }

    pub fn with<R>(&self, f: impl FnOnce(&mut Appliance) -> R) -> R {
        f(&mut self.state.lock().unwrap())
    }

    pub fn shutdown(self) {
        let _ = self.shutdown_tx.send(());
    }
}

/// A local address nothing listens on.
pub async fn dead_address() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}
