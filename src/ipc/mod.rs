use anyhow::Result;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::trace::TraceLayer;

use crate::supervisor::error::SupervisorError;
use crate::supervisor::Supervisor;
use crate::utils::current_timestamp;

/// IPC 요청/응답 타입
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddScriptRequest {
    pub path: String,
    #[serde(default)]
    pub interpreter: Option<String>,
    #[serde(default)]
    pub args: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StdinRequest {
    pub input: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConsoleQuery {
    pub since: Option<u64>,
    pub recent: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptInfo {
    pub id: String,
    pub name: String,
    pub display_name: String,
    pub path: String,
    pub interpreter: String,
    pub args: Vec<String>,
    pub autostart: bool,
    // 런타임 상태
    pub status: String,
    pub pid: Option<u32>,
    pub uptime_seconds: Option<u64>,
    pub cpu_percent: f32,
    pub memory_bytes: u64,
    pub memory_percent: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptListResponse {
    pub scripts: Vec<ScriptInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageResponse {
    /// 실행 중인 전체 스크립트 CPU 합 (표시용, 100 클램프)
    pub total_cpu_percent: f32,
    pub total_memory_percent: f32,
    pub running_count: usize,
}

/// IPC Server State
#[derive(Clone)]
pub struct IPCServer {
    pub supervisor: Arc<RwLock<Supervisor>>,
    pub listen_addr: String,
}

impl IPCServer {
    pub fn new(supervisor: Arc<RwLock<Supervisor>>, listen_addr: &str) -> Self {
        Self {
            supervisor,
            listen_addr: listen_addr.to_string(),
        }
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/api/scripts", get(list_scripts).post(add_script))
            .route(
                "/api/script/:id",
                get(get_script).patch(update_script).delete(delete_script),
            )
            .route("/api/script/:id/start", post(start_script))
            .route("/api/script/:id/stop", post(stop_script))
            .route("/api/script/:id/pause", post(pause_script))
            .route("/api/script/:id/resume", post(resume_script))
            .route("/api/script/:id/console", get(get_console))
            .route("/api/script/:id/stdin", post(send_stdin))
            .route("/api/usage", get(get_usage))
            .route("/api/settings", get(get_settings).put(put_settings))
            .layer(TraceLayer::new_for_http())
            .with_state(self.clone())
    }

    pub async fn start(self) -> Result<()> {
        tracing::info!("IPC HTTP server starting on {}", self.listen_addr);

        let router = self.router();
        let listener = tokio::net::TcpListener::bind(&self.listen_addr).await?;
        tracing::info!("IPC listening on http://{}", self.listen_addr);

        axum::serve(listener, router).await?;
        Ok(())
    }
}

/// 카탈로그 엔트리 + 트래커 상태를 합쳐 ScriptInfo 생성
fn build_script_info(supervisor: &Supervisor, entry: &crate::script::ScriptEntry) -> ScriptInfo {
    let view = supervisor.tracker.view(&entry.id);
    let (status, pid, uptime_seconds, usage) = match view {
        Some(v) => {
            let uptime = if v.state.is_active() {
                Some(current_timestamp().saturating_sub(v.start_time))
            } else {
                None
            };
            (v.state.as_str().to_string(), v.pid, uptime, v.usage)
        }
        None => ("stopped".to_string(), None, None, Default::default()),
    };

    ScriptInfo {
        id: entry.id.clone(),
        name: entry.name.clone(),
        display_name: entry.display_name.clone(),
        path: entry.path.clone(),
        interpreter: entry.interpreter.clone(),
        args: entry.args.clone(),
        autostart: entry.autostart,
        status,
        pid,
        uptime_seconds,
        cpu_percent: usage.cpu_percent,
        memory_bytes: usage.memory_bytes,
        memory_percent: usage.memory_percent,
    }
}

/// GET /api/scripts - 카탈로그 전체 + 런타임 상태
async fn list_scripts(State(state): State<IPCServer>) -> impl IntoResponse {
    let supervisor = state.supervisor.read().await;

    let scripts: Vec<ScriptInfo> = supervisor
        .catalog
        .list()
        .iter()
        .map(|entry| build_script_info(&supervisor, entry))
        .collect();

    Json(ScriptListResponse { scripts })
}

/// POST /api/scripts - 스크립트 추가
async fn add_script(
    State(state): State<IPCServer>,
    Json(payload): Json<AddScriptRequest>,
) -> Result<impl IntoResponse, SupervisorError> {
    if payload.path.trim().is_empty() {
        return Err(SupervisorError::InvalidRequest("path must not be empty".into()));
    }

    let mut supervisor = state.supervisor.write().await;
    let entry = supervisor.add_script(&payload.path, payload.interpreter.as_deref(), payload.args)?;
    let info = build_script_info(&supervisor, &entry);
    Ok((StatusCode::CREATED, Json(json!({ "success": true, "script": info }))))
}

/// GET /api/script/:id - 단일 스크립트 조회
async fn get_script(
    Path(id): Path<String>,
    State(state): State<IPCServer>,
) -> Result<impl IntoResponse, SupervisorError> {
    let supervisor = state.supervisor.read().await;
    let entry = supervisor
        .catalog
        .get(&id)
        .ok_or_else(|| SupervisorError::ScriptNotFound(id.clone()))?;
    Ok(Json(build_script_info(&supervisor, entry)))
}

/// PATCH /api/script/:id - 이름/인터프리터/args/autostart 업데이트
async fn update_script(
    Path(id): Path<String>,
    State(state): State<IPCServer>,
    Json(patch): Json<Value>,
) -> Result<impl IntoResponse, SupervisorError> {
    let mut supervisor = state.supervisor.write().await;
    let entry = supervisor.update_script(&id, &patch)?;
    let info = build_script_info(&supervisor, &entry);
    Ok(Json(json!({ "success": true, "script": info })))
}

/// DELETE /api/script/:id - 카탈로그에서 제거 (실행 중이면 먼저 중지)
async fn delete_script(
    Path(id): Path<String>,
    State(state): State<IPCServer>,
) -> Result<impl IntoResponse, SupervisorError> {
    let mut supervisor = state.supervisor.write().await;
    let result = supervisor.remove_script(&id).await?;
    Ok(Json(result))
}

/// POST /api/script/:id/start
async fn start_script(
    Path(id): Path<String>,
    State(state): State<IPCServer>,
) -> Result<impl IntoResponse, SupervisorError> {
    let mut supervisor = state.supervisor.write().await;
    let result = supervisor.start_script(&id).await?;
    Ok(Json(result))
}

/// POST /api/script/:id/stop
async fn stop_script(
    Path(id): Path<String>,
    State(state): State<IPCServer>,
) -> Result<impl IntoResponse, SupervisorError> {
    let mut supervisor = state.supervisor.write().await;
    let result = supervisor.stop_script(&id).await?;
    Ok(Json(result))
}

/// POST /api/script/:id/pause
async fn pause_script(
    Path(id): Path<String>,
    State(state): State<IPCServer>,
) -> Result<impl IntoResponse, SupervisorError> {
    let mut supervisor = state.supervisor.write().await;
    let result = supervisor.pause_script(&id)?;
    Ok(Json(result))
}

/// POST /api/script/:id/resume
async fn resume_script(
    Path(id): Path<String>,
    State(state): State<IPCServer>,
) -> Result<impl IntoResponse, SupervisorError> {
    let mut supervisor = state.supervisor.write().await;
    let result = supervisor.resume_script(&id)?;
    Ok(Json(result))
}

/// GET /api/script/:id/console?since=N 또는 ?recent=N
async fn get_console(
    Path(id): Path<String>,
    Query(query): Query<ConsoleQuery>,
    State(state): State<IPCServer>,
) -> Result<impl IntoResponse, SupervisorError> {
    let supervisor = state.supervisor.read().await;
    let lines = supervisor
        .console_output(&id, query.since, query.recent)
        .await?;
    Ok(Json(json!({ "lines": lines })))
}

/// POST /api/script/:id/stdin - 콘솔 입력 전달
async fn send_stdin(
    Path(id): Path<String>,
    State(state): State<IPCServer>,
    Json(payload): Json<StdinRequest>,
) -> Result<impl IntoResponse, SupervisorError> {
    let supervisor = state.supervisor.read().await;
    supervisor.send_stdin(&id, &payload.input).await?;
    Ok(Json(json!({ "success": true })))
}

/// GET /api/usage - 전체 부하 (대시보드 헤더용)
async fn get_usage(State(state): State<IPCServer>) -> impl IntoResponse {
    let supervisor = state.supervisor.read().await;
    let (total_cpu_percent, total_memory_percent) = supervisor.aggregate_usage();
    let running_count = supervisor
        .catalog
        .list()
        .iter()
        .filter(|e| {
            supervisor
                .tracker
                .view(&e.id)
                .map(|v| v.state.is_active())
                .unwrap_or(false)
        })
        .count();

    Json(UsageResponse {
        total_cpu_percent,
        total_memory_percent,
        running_count,
    })
}

/// GET /api/settings
async fn get_settings(State(state): State<IPCServer>) -> impl IntoResponse {
    let supervisor = state.supervisor.read().await;
    Json(supervisor.settings.clone())
}

/// PUT /api/settings - 부분 업데이트 후 저장
async fn put_settings(
    State(state): State<IPCServer>,
    Json(update): Json<Value>,
) -> Result<impl IntoResponse, SupervisorError> {
    let mut supervisor = state.supervisor.write().await;
    let mut updated = supervisor.settings.clone();
    updated
        .apply_update(&update)
        .map_err(SupervisorError::InvalidRequest)?;
    supervisor.settings = updated;
    supervisor.save_settings()?;
    Ok(Json(json!({ "success": true, "settings": supervisor.settings.clone() })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::util::ServiceExt;

    fn test_server(dir: &tempfile::TempDir) -> IPCServer {
        let catalog = dir.path().join("scripts.json");
        let settings = dir.path().join("settings.json");
        let supervisor = Supervisor::new(catalog.to_str().unwrap(), settings.to_str().unwrap());
        IPCServer::new(Arc::new(RwLock::new(supervisor)), "127.0.0.1:0")
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_list_empty_catalog() {
        let dir = tempfile::tempdir().unwrap();
        let router = test_server(&dir).router();

        let response = router
            .oneshot(Request::get("/api/scripts").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["scripts"].as_array().unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_add_get_delete_script() {
        let dir = tempfile::tempdir().unwrap();
        let server = test_server(&dir);

        // 추가
        let response = server
            .router()
            .oneshot(json_request(
                "POST",
                "/api/scripts",
                json!({ "path": "/tmp/job.py" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let created = body_json(response).await;
        let id = created["script"]["id"].as_str().unwrap().to_string();
        assert_eq!(created["script"]["status"], "stopped");

        // 조회
        let response = server
            .router()
            .oneshot(
                Request::get(format!("/api/script/{}", id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let info = body_json(response).await;
        assert_eq!(info["name"], "job");
        assert_eq!(info["cpu_percent"], 0.0);

        // 제거
        let response = server
            .router()
            .oneshot(
                Request::delete(format!("/api/script/{}", id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        // 제거 후 404 + 에러 코드
        let response = server
            .router()
            .oneshot(
                Request::get(format!("/api/script/{}", id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let err = body_json(response).await;
        assert_eq!(err["error_code"], "SCRIPT_NOT_FOUND");
    }

    #[tokio::test]
    async fn test_add_rejects_empty_path() {
        let dir = tempfile::tempdir().unwrap();
        let response = test_server(&dir)
            .router()
            .oneshot(json_request("POST", "/api/scripts", json!({ "path": "" })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_start_with_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let server = test_server(&dir);

        let response = server
            .router()
            .oneshot(json_request(
                "POST",
                "/api/scripts",
                json!({ "path": "/nonexistent/job.py" }),
            ))
            .await
            .unwrap();
        let id = body_json(response).await["script"]["id"]
            .as_str()
            .unwrap()
            .to_string();

        let response = server
            .router()
            .oneshot(
                Request::post(format!("/api/script/{}/start", id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let err = body_json(response).await;
        assert_eq!(err["error_code"], "SCRIPT_FILE_MISSING");
    }

    #[tokio::test]
    async fn test_stop_when_not_running_conflicts() {
        let dir = tempfile::tempdir().unwrap();
        let server = test_server(&dir);

        let response = server
            .router()
            .oneshot(json_request(
                "POST",
                "/api/scripts",
                json!({ "path": "/tmp/job.py" }),
            ))
            .await
            .unwrap();
        let id = body_json(response).await["script"]["id"]
            .as_str()
            .unwrap()
            .to_string();

        let response = server
            .router()
            .oneshot(
                Request::post(format!("/api/script/{}/stop", id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert_eq!(body_json(response).await["error_code"], "NOT_RUNNING");
    }

    #[tokio::test]
    async fn test_rename_via_patch() {
        let dir = tempfile::tempdir().unwrap();
        let server = test_server(&dir);

        let response = server
            .router()
            .oneshot(json_request(
                "POST",
                "/api/scripts",
                json!({ "path": "/tmp/job.py" }),
            ))
            .await
            .unwrap();
        let id = body_json(response).await["script"]["id"]
            .as_str()
            .unwrap()
            .to_string();

        let response = server
            .router()
            .oneshot(json_request(
                "PATCH",
                &format!("/api/script/{}", id),
                json!({ "display_name": "nightly job" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["script"]["display_name"], "nightly job");
        // 파생 이름은 유지
        assert_eq!(json["script"]["name"], "job");
    }

    #[tokio::test]
    async fn test_usage_endpoint() {
        let dir = tempfile::tempdir().unwrap();
        let response = test_server(&dir)
            .router()
            .oneshot(Request::get("/api/usage").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["running_count"], 0);
        assert_eq!(json["total_cpu_percent"], 0.0);
    }

    #[tokio::test]
    async fn test_settings_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let server = test_server(&dir);

        let response = server
            .router()
            .oneshot(Request::get("/api/settings").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let settings = body_json(response).await;
        assert_eq!(settings["monitor_interval_secs"], 1);

        // 업데이트
        let response = server
            .router()
            .oneshot(json_request("PUT", "/api/settings", json!({ "theme": "dark" })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        // 알 수 없는 키는 400
        let response = server
            .router()
            .oneshot(json_request("PUT", "/api/settings", json!({ "bogus": 1 })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_console_of_unknown_script() {
        let dir = tempfile::tempdir().unwrap();
        let response = test_server(&dir)
            .router()
            .oneshot(
                Request::get("/api/script/ghost/console")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
