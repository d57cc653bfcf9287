//! Supervisor 전용 에러 타입. 에러 종류를 구분해 호출자(CLI)가
//! 머신 리더블 코드와 함께 결과를 출력할 수 있게 합니다.

use super::process::ProcessError;
use super::state_machine::TransitionError;

/// Supervisor 작업 중 발생할 수 있는 에러 유형
#[derive(thiserror::Error, Debug)]
pub enum SupervisorError {
    #[error("Failed to launch server: {0}")]
    LaunchFailed(String),

    #[error("Server at '{0}' is already running")]
    AlreadyRunning(String),

    #[error("Server at '{0}' is not running")]
    NotRunning(String),

    #[error("No managed process for server at '{0}'")]
    NoManagedProcess(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Process(#[from] ProcessError),

    #[error(transparent)]
    State(#[from] TransitionError),

    #[error("{0}")]
    Internal(#[from] anyhow::Error),
}

impl SupervisorError {
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
            Self::LaunchFailed(_) => "LAUNCH_FAILED",
            Self::AlreadyRunning(_) => "ALREADY_RUNNING",
            Self::NotRunning(_) => "NOT_RUNNING",
            Self::NoManagedProcess(_) => "NO_MANAGED_PROCESS",
            Self::InvalidConfig(_) => "INVALID_CONFIG",
            Self::Process(_) => "PROCESS_ERROR",
            Self::State(_) => "INVALID_STATE",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }
}
