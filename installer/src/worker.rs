//! 백그라운드 워커 — 설치 요청을 전용 태스크에서 처리
//!
//! ## 아키텍처
//! - `InstallWorker`: 독립적인 tokio 태스크로 실행
//! - 호출자는 이벤트 구독을 통해 진행률/완료/실패를 수신
//! - 취소는 태스크 큐를 거치지 않고 진행 중인 전송의 토큰을 직접 끊는다

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, RwLock};
use tokio_util::sync::CancellationToken;

use crate::download::{InstallOutcome, InstallProgress, Installer};
use crate::error::{ErrorContext, InstallerError, NetworkChecker, RecoveryStrategy};

/// 백그라운드 작업 타입
#[derive(Debug, Clone)]
pub enum InstallTask {
    /// 버전 설치
    Install {
        version: String,
        target_dir: PathBuf,
        force: bool,
    },
    /// 워커 종료
    Shutdown,
}

/// 워커에서 발생하는 이벤트 (구독자에게 브로드캐스트)
#[derive(Debug, Clone)]
pub enum InstallEvent {
    /// 설치 시작
    Started { version: String },
    /// 다운로드 진행률
    Progress {
        version: String,
        downloaded_bytes: u64,
        total_bytes: Option<u64>,
    },
    /// 설치 완료 (다운로드 또는 이미 존재)
    Completed {
        version: String,
        outcome: InstallOutcome,
    },
    /// 설치 실패
    Failed { version: String, error: String },
    /// 설치 취소됨
    Cancelled { version: String },
    /// 워커 종료됨
    WorkerShutdown,
}

/// 백그라운드 워커 상태
#[derive(Debug, Clone, Default)]
pub struct InstallWorkerStatus {
    /// 현재 작업 중인지
    pub busy: bool,
    /// 현재 태스크 설명
    pub current_task: Option<String>,
    /// 완료된 설치 수
    pub completed: usize,
    /// 실패한 설치 수
    pub failed: usize,
}

/// 백그라운드 설치 워커
pub struct InstallWorker {
    /// 태스크 전송 채널
    task_tx: mpsc::Sender<InstallTask>,
    /// 이벤트 브로드캐스트 송신자
    event_tx: broadcast::Sender<InstallEvent>,
    /// 워커 상태
    status: Arc<RwLock<InstallWorkerStatus>>,
    /// 진행 중인 설치의 취소 토큰 (버전별)
    cancellations: Arc<RwLock<HashMap<String, CancellationToken>>>,
}

impl InstallWorker {
    /// 새 워커 생성 및 시작
    pub fn spawn(installer: Arc<Installer>) -> Self {
        let (task_tx, task_rx) = mpsc::channel::<InstallTask>(32);
        let (event_tx, _) = broadcast::channel::<InstallEvent>(64);
        let status = Arc::new(RwLock::new(InstallWorkerStatus::default()));
        let cancellations = Arc::new(RwLock::new(HashMap::new()));

        let worker = Self {
            task_tx,
            event_tx: event_tx.clone(),
            status: status.clone(),
            cancellations: cancellations.clone(),
        };

        tokio::spawn(async move {
            worker_loop(installer, task_rx, event_tx, status, cancellations).await;
        });

        worker
    }

    /// 태스크 제출
    pub async fn submit(&self, task: InstallTask) -> Result<(), String> {
        self.task_tx
            .send(task)
            .await
            .map_err(|e| format!("Failed to submit task: {}", e))
    }

    /// 설치 요청
    pub async fn install(
        &self,
        version: &str,
        target_dir: &std::path::Path,
        force: bool,
    ) -> Result<(), String> {
        self.submit(InstallTask::Install {
            version: version.to_string(),
            target_dir: target_dir.to_path_buf(),
            force,
        })
        .await
    }

    /// 진행 중인 설치 취소. 해당 버전이 전송 중이었으면 true.
    ///
    /// 큐를 거치면 진행 중인 다운로드 뒤에서 대기하게 되므로
    /// 토큰을 직접 끊는다. 부분 파일은 다운로드 쪽에서 제거된다.
    pub async fn cancel(&self, version: &str) -> bool {
        match self.cancellations.read().await.get(version) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// 이벤트 구독
    pub fn subscribe(&self) -> broadcast::Receiver<InstallEvent> {
        self.event_tx.subscribe()
    }

    /// 현재 상태 조회
    pub async fn get_status(&self) -> InstallWorkerStatus {
        self.status.read().await.clone()
    }

    /// 워커 종료
    pub async fn shutdown(&self) -> Result<(), String> {
        self.submit(InstallTask::Shutdown).await
    }
}

/// 워커 메인 루프
async fn worker_loop(
    installer: Arc<Installer>,
    mut task_rx: mpsc::Receiver<InstallTask>,
    event_tx: broadcast::Sender<InstallEvent>,
    status: Arc<RwLock<InstallWorkerStatus>>,
    cancellations: Arc<RwLock<HashMap<String, CancellationToken>>>,
) {
    tracing::info!("[Worker] Install worker started");

    while let Some(task) = task_rx.recv().await {
        match task {
            InstallTask::Shutdown => {
                tracing::info!("[Worker] Shutdown requested");
                let _ = event_tx.send(InstallEvent::WorkerShutdown);
                break;
            }
            InstallTask::Install {
                version,
                target_dir,
                force,
            } => {
                handle_install(
                    &installer,
                    &event_tx,
                    &status,
                    &cancellations,
                    version,
                    target_dir,
                    force,
                )
                .await;
            }
        }
    }

    tracing::info!("[Worker] Install worker stopped");
}

/// 설치 처리. 복구 가능한 실패는 백오프를 두고 재시도한다.
async fn handle_install(
    installer: &Arc<Installer>,
    event_tx: &broadcast::Sender<InstallEvent>,
    status: &Arc<RwLock<InstallWorkerStatus>>,
    cancellations: &Arc<RwLock<HashMap<String, CancellationToken>>>,
    version: String,
    target_dir: PathBuf,
    force: bool,
) {
    {
        let mut s = status.write().await;
        s.busy = true;
        s.current_task = Some(format!("Installing {}...", version));
    }

    let _ = event_tx.send(InstallEvent::Started {
        version: version.clone(),
    });
    tracing::info!("[Worker] Starting install: {}", version);

    let deadline = installer.config().download_timeout;
    let mut strategy = RecoveryStrategy::default();

    let result = loop {
        let token = CancellationToken::new();
        cancellations
            .write()
            .await
            .insert(version.clone(), token.clone());

        let (progress_tx, progress_rx) = mpsc::unbounded_channel::<InstallProgress>();
        let forwarder = tokio::spawn(forward_progress(progress_rx, event_tx.clone()));

        let attempt = installer
            .install_with(
                &version,
                &target_dir,
                force,
                deadline,
                token.clone(),
                Some(progress_tx),
            )
            .await;

        cancellations.write().await.remove(&version);
        // progress_tx가 drop 되었으므로 포워더는 큐를 비우고 끝난다
        let _ = forwarder.await;

        match attempt {
            Err(e) if e.is_recoverable() && strategy.can_retry() && !token.is_cancelled() => {
                let delay = strategy.next_delay();
                strategy.increment();
                ErrorContext::new("install", e.clone())
                    .with_version(&version)
                    .log();
                tracing::warn!(
                    "[Worker] Retrying {} in {:?} (attempt {}/{})",
                    version,
                    delay,
                    strategy.current_attempt,
                    strategy.max_retries
                );
                if matches!(e, InstallerError::NetworkError { .. }) {
                    // 오프라인 상태면 백오프만 돌리지 말고 연결 복구를 기다린다
                    NetworkChecker::new()
                        .wait_for_connection(delay.max(Duration::from_secs(4)))
                        .await;
                } else {
                    tokio::time::sleep(delay).await;
                }
            }
            other => break other,
        }
    };

    match result {
        Ok(outcome) => {
            tracing::info!("[Worker] Install completed: {}", version);
            let _ = event_tx.send(InstallEvent::Completed {
                version: version.clone(),
                outcome,
            });
            status.write().await.completed += 1;
        }
        Err(InstallerError::Cancelled { .. }) => {
            tracing::info!("[Worker] Install cancelled: {}", version);
            let _ = event_tx.send(InstallEvent::Cancelled {
                version: version.clone(),
            });
        }
        Err(e) => {
            ErrorContext::new("install", e.clone())
                .with_version(&version)
                .log();
            let _ = event_tx.send(InstallEvent::Failed {
                version: version.clone(),
                error: format!("{}", e),
            });
            status.write().await.failed += 1;
        }
    }

    {
        let mut s = status.write().await;
        s.busy = false;
        s.current_task = None;
    }
}

/// 다운로드 진행률을 브로드캐스트 이벤트로 중계
async fn forward_progress(
    mut progress_rx: mpsc::UnboundedReceiver<InstallProgress>,
    event_tx: broadcast::Sender<InstallEvent>,
) {
    while let Some(p) = progress_rx.recv().await {
        let _ = event_tx.send(InstallEvent::Progress {
            version: p.version,
            downloaded_bytes: p.downloaded_bytes,
            total_bytes: p.total_bytes,
        });
    }
}
