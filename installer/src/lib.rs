//! # mcwarden 인스톨러 라이브러리
//!
//! 게임 서버 아티팩트(server.jar)를 내려받아 검증하고 버전별 이름으로
//! 배치합니다. 버전 카탈로그를 활용하여 설치 가능한 버전을 관리합니다.
//!
//! ## 동작 원리
//! - **카탈로그(catalog.rs)**: 버전 ID → 다운로드 URL/기대 크기/체크섬, 최신순 정렬
//! - **다운로드(download.rs)**: 스트리밍 수신 → 임시 파일 → 검증 → 원자적 rename
//! - **워커(worker.rs)**: 설치 요청 순차 처리, 진행률/완료/실패 이벤트 브로드캐스트
//! - **에러(error.rs)**: 네트워크 끊김, 타임아웃 등 장애 처리와 재시도 정책
//!
//! ## 아티팩트 이름
//! 설치된 파일은 `<이름>_<버전>.<확장자>` (기본 `server_<버전>.jar`)입니다.
//! 검증에 통과한 파일이 이미 있으면 네트워크 요청 없이 성공으로 끝나고,
//! 실패한 설치는 최종 경로에 아무것도 남기지 않습니다.

// ══════════════════════════════════════════════════════
// 모듈
// ══════════════════════════════════════════════════════

pub mod catalog;
pub mod download;
pub mod error;
pub mod version;
pub mod worker;


// Re-exports for convenience
pub use catalog::{CatalogEntry, VersionCatalog};
pub use download::{InstallOutcome, InstallProgress, Installer};
pub use error::{ErrorContext, InstallerError, NetworkChecker, RecoveryStrategy};
pub use version::GameVersion;
pub use worker::{InstallEvent, InstallTask, InstallWorker, InstallWorkerStatus};

use std::time::Duration;

// ══════════════════════════════════════════════════════
// 설정
// ══════════════════════════════════════════════════════

/// 인스톨러 설정
#[derive(Debug, Clone)]
pub struct InstallerConfig {
    /// 아티팩트 기본 이름 (`server_1.20.2.jar`의 `server`)
    pub artifact_name: String,
    /// 아티팩트 확장자
    pub artifact_ext: String,
    /// 설치 1건의 전체 데드라인
    pub download_timeout: Duration,
    /// HTTP 연결 타임아웃
    pub connect_timeout: Duration,
    /// 내장 카탈로그를 대체하는 항목 (비어 있으면 내장 카탈로그 사용)
    pub catalog_overrides: Vec<CatalogEntry>,
}

impl Default for InstallerConfig {
    fn default() -> Self {
        Self {
            artifact_name: "server".to_string(),
            artifact_ext: "jar".to_string(),
            download_timeout: Duration::from_secs(300),
            connect_timeout: Duration::from_secs(10),
            catalog_overrides: Vec::new(),
        }
    }
}
