//! Supervisor 전용 에러 타입 — 에러 종류를 구분하여 IPC 핸들러에서
//! 적절한 HTTP 상태 코드를 반환할 수 있게 합니다.

use axum::http::StatusCode;

/// Supervisor 작업 중 발생할 수 있는 에러 유형
#[derive(thiserror::Error, Debug)]
pub enum SupervisorError {
    #[error("Script '{0}' not found")]
    ScriptNotFound(String),

    #[error("Script file '{0}' does not exist")]
    ScriptFileMissing(String),

    #[error("Script '{0}' is already running")]
    AlreadyRunning(String),

    #[error("Script '{0}' is not running")]
    NotRunning(String),

    #[error("Script '{0}' is not paused")]
    NotPaused(String),

    #[error("Failed to spawn '{program}': {reason}")]
    SpawnFailed { program: String, reason: String },

    #[error("Failed to signal process {pid}: {reason}")]
    SignalFailed { pid: u32, reason: String },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("{0}")]
    Internal(#[from] anyhow::Error),
}

impl SupervisorError {
    /// HTTP 상태 코드 매핑
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::ScriptNotFound(_) => StatusCode::NOT_FOUND,
            Self::ScriptFileMissing(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::AlreadyRunning(_) | Self::NotRunning(_) | Self::NotPaused(_) => {
                StatusCode::CONFLICT
            }
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::SpawnFailed { .. } | Self::SignalFailed { .. } | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// JSON 에러 응답 생성
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "success": false,
            "error": self.to_string(),
            "error_code": self.error_code(),
        })
    }

    /// 머신 리더블 에러 코드
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::ScriptNotFound(_) => "SCRIPT_NOT_FOUND",
            Self::ScriptFileMissing(_) => "SCRIPT_FILE_MISSING",
            Self::AlreadyRunning(_) => "ALREADY_RUNNING",
            Self::NotRunning(_) => "NOT_RUNNING",
            Self::NotPaused(_) => "NOT_PAUSED",
            Self::SpawnFailed { .. } => "SPAWN_FAILED",
            Self::SignalFailed { .. } => "SIGNAL_FAILED",
            Self::InvalidRequest(_) => "INVALID_REQUEST",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

/// axum 핸들러에서 SupervisorError를 직접 반환할 수 있도록 IntoResponse 구현
impl axum::response::IntoResponse for SupervisorError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status_code();
        let body = axum::Json(self.to_json());
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_code_mapping() {
        assert_eq!(
            SupervisorError::ScriptNotFound("x".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            SupervisorError::AlreadyRunning("x".into()).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            SupervisorError::ScriptFileMissing("/tmp/x.py".into()).status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
    }

    #[test]
    fn test_json_shape() {
        let err = SupervisorError::NotRunning("abc".into());
        let json = err.to_json();
        assert_eq!(json["success"], false);
        assert_eq!(json["error_code"], "NOT_RUNNING");
        assert!(json["error"].as_str().unwrap().contains("abc"));
    }
}
