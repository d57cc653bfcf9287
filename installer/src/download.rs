//! 스트리밍 다운로드 / 검증 / 원자적 배치 파이프라인.
//!
//! 응답 본문은 대상 디렉터리 안의 임시 파일로 청크 단위로 흘려 쓰고,
//! 크기와 SHA-256을 검증한 뒤에만 최종 이름(`<name>_<version>.<ext>`)으로
//! rename 한다. 어떤 실패 경로에서도 최종 경로에 부분 파일이 남지 않는다:
//! persist 전에 함수를 떠나면 NamedTempFile이 drop 되면서 임시 파일을
//! 지운다. 호출자 데드라인 초과는 Timeout 에러이며, 취소 토큰으로 진행
//! 중인 전송을 중단할 수 있다.

use std::io::Write as _;
use std::path::{Path, PathBuf};

use futures_util::StreamExt;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::catalog::{artifact_filename, installed_versions, CatalogEntry, VersionCatalog};
use crate::error::InstallerError;
use crate::InstallerConfig;

/// Outcome of an install request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum InstallOutcome {
    /// Downloaded, verified and renamed into place.
    Installed {
        version: String,
        path: PathBuf,
        bytes: u64,
    },
    /// A verified artifact was already on disk; no network traffic happened.
    AlreadyPresent { version: String, path: PathBuf },
}

impl InstallOutcome {
    pub fn version(&self) -> &str {
        match self {
            InstallOutcome::Installed { version, .. } => version,
            InstallOutcome::AlreadyPresent { version, .. } => version,
        }
    }

    pub fn path(&self) -> &Path {
        match self {
            InstallOutcome::Installed { path, .. } => path,
            InstallOutcome::AlreadyPresent { path, .. } => path,
        }
    }
}

/// 진행률 스냅샷. 전송 중 일정 간격으로, 그리고 본문이 끝났을 때 보고된다.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallProgress {
    pub version: String,
    pub downloaded_bytes: u64,
    pub total_bytes: Option<u64>,
}

// 청크마다 보고하면 수신자가 밀리므로 이 간격으로 묶는다
const PROGRESS_STEP: u64 = 256 * 1024;

pub struct Installer {
    config: InstallerConfig,
    client: reqwest::Client,
    catalog: VersionCatalog,
}

impl Installer {
    pub fn new(config: InstallerConfig) -> Result<Self, InstallerError> {
        // 전체 데드라인은 install 단위로 적용하므로 클라이언트에는
        // 연결 타임아웃만 건다.
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .user_agent("mcwarden-installer")
            .build()
            .map_err(|e| InstallerError::from_reqwest(&e, "building HTTP client"))?;
        let catalog = VersionCatalog::with_overrides(config.catalog_overrides.clone());
        Ok(Self { config, client, catalog })
    }

    pub fn config(&self) -> &InstallerConfig {
        &self.config
    }

    pub fn catalog(&self) -> &VersionCatalog {
        &self.catalog
    }

    /// 설치 가능한 버전 ID, 최신순.
    pub fn list_available_versions(&self) -> Vec<String> {
        self.catalog.ids()
    }

    /// `target_dir`에 이미 설치된 버전 ID, 최신순.
    pub fn list_installed_versions(&self, target_dir: &Path) -> Vec<String> {
        installed_versions(target_dir, &self.config.artifact_name, &self.config.artifact_ext)
    }

    /// 최종 아티팩트 경로.
    pub fn artifact_path(&self, target_dir: &Path, version: &str) -> PathBuf {
        target_dir.join(artifact_filename(
            &self.config.artifact_name,
            version,
            &self.config.artifact_ext,
        ))
    }

    /// Install `version` into `target_dir` with the configured deadline and
    /// no external cancellation.
    pub async fn install(
        &self,
        version: &str,
        target_dir: &Path,
        force: bool,
    ) -> Result<InstallOutcome, InstallerError> {
        self.install_with(
            version,
            target_dir,
            force,
            self.config.download_timeout,
            CancellationToken::new(),
            None,
        )
        .await
    }

    /// Install with an explicit overall deadline, cancellation token and
    /// optional progress reporting.
    ///
    /// AlreadyPresent 판정은 네트워크 호출 전에 끝난다: 검증에 통과하는
    /// 파일이 이미 있으면 요청 자체를 보내지 않는다.
    pub async fn install_with(
        &self,
        version: &str,
        target_dir: &Path,
        force: bool,
        deadline: std::time::Duration,
        cancel: CancellationToken,
        progress: Option<mpsc::UnboundedSender<InstallProgress>>,
    ) -> Result<InstallOutcome, InstallerError> {
        let entry = self.catalog.resolve(version)?.clone();
        let final_path = self.artifact_path(target_dir, version);

        if !force {
            if let Some(outcome) = self.check_already_present(&entry, &final_path)? {
                tracing::info!(
                    "[Installer] {} already present at {}, skipping download",
                    version,
                    final_path.display()
                );
                return Ok(outcome);
            }
        }

        match tokio::time::timeout(
            deadline,
            self.download_and_place(&entry, target_dir, &final_path, &cancel, progress.as_ref()),
        )
        .await
        {
            Ok(result) => result,
            // 데드라인 초과: 다운로드 future가 drop 되면서 임시 파일도 제거됨
            Err(_) => Err(InstallerError::Timeout {
                operation: format!("install {}", version),
                duration_secs: deadline.as_secs(),
            }),
        }
    }

    /// 존재 + 검증 통과 시 AlreadyPresent. 검증 실패 파일은 없는 것으로
    /// 취급해 재다운로드를 허용한다 (기존 파일은 rename 순간까지 유효).
    fn check_already_present(
        &self,
        entry: &CatalogEntry,
        final_path: &Path,
    ) -> Result<Option<InstallOutcome>, InstallerError> {
        let meta = match std::fs::metadata(final_path) {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(InstallerError::from_io(
                    &e,
                    "inspecting existing artifact",
                    &final_path.display().to_string(),
                ))
            }
        };
        if !meta.is_file() {
            return Err(InstallerError::FileSystemError {
                operation: "inspecting existing artifact".to_string(),
                path: final_path.display().to_string(),
                message: "artifact path exists but is not a regular file".to_string(),
            });
        }

        if let Some(expected) = entry.size {
            if meta.len() != expected {
                tracing::warn!(
                    "[Installer] Existing {} has size {} (expected {}), re-downloading",
                    final_path.display(),
                    meta.len(),
                    expected
                );
                return Ok(None);
            }
        }
        if let Some(expected) = &entry.sha256 {
            let actual = sha256_file(final_path)?;
            if !actual.eq_ignore_ascii_case(expected) {
                tracing::warn!(
                    "[Installer] Existing {} fails checksum, re-downloading",
                    final_path.display()
                );
                return Ok(None);
            }
        }
        // 검증 정보가 전혀 없으면 비어 있지 않은 파일의 존재로 충분
        if entry.size.is_none() && entry.sha256.is_none() && meta.len() == 0 {
            return Ok(None);
        }

        Ok(Some(InstallOutcome::AlreadyPresent {
            version: entry.id.clone(),
            path: final_path.to_path_buf(),
        }))
    }

    async fn download_and_place(
        &self,
        entry: &CatalogEntry,
        target_dir: &Path,
        final_path: &Path,
        cancel: &CancellationToken,
        progress: Option<&mpsc::UnboundedSender<InstallProgress>>,
    ) -> Result<InstallOutcome, InstallerError> {
        std::fs::create_dir_all(target_dir).map_err(|e| {
            InstallerError::from_io(&e, "creating target directory", &target_dir.display().to_string())
        })?;

        let url = entry.resolve_url();
        tracing::info!("[Installer] Downloading {} from {}", entry.id, url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| InstallerError::from_reqwest(&e, "requesting artifact"))?;
        if !response.status().is_success() {
            return Err(InstallerError::ApiError {
                status_code: response.status().as_u16(),
                message: format!("GET {}", url),
            });
        }

        // 기대 크기: 카탈로그 값이 우선, 없으면 Content-Length
        let expected_size = entry.size.or(response.content_length());

        let mut tmp = NamedTempFile::new_in(target_dir).map_err(|e| {
            InstallerError::from_io(&e, "creating temp file", &target_dir.display().to_string())
        })?;
        let mut hasher = Sha256::new();
        let mut downloaded: u64 = 0;
        let mut last_reported: u64 = 0;
        let mut stream = response.bytes_stream();

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    // tmp drop이 부분 파일을 지운다
                    tracing::info!("[Installer] Install of {} cancelled", entry.id);
                    return Err(InstallerError::Cancelled { version: entry.id.clone() });
                }
                chunk = stream.next() => chunk,
            };
            let chunk = match next {
                Some(Ok(chunk)) => chunk,
                Some(Err(e)) => {
                    let mapped = InstallerError::from_reqwest(&e, "streaming artifact");
                    return Err(match mapped {
                        InstallerError::Timeout { .. } => mapped,
                        _ => InstallerError::DownloadInterrupted {
                            version: entry.id.clone(),
                            downloaded_bytes: downloaded,
                            total_bytes: expected_size.unwrap_or(0),
                        },
                    });
                }
                None => break,
            };
            hasher.update(&chunk);
            tmp.write_all(&chunk).map_err(|e| {
                InstallerError::from_io(&e, "writing temp file", &final_path.display().to_string())
            })?;
            downloaded += chunk.len() as u64;
            if let Some(tx) = progress {
                if downloaded - last_reported >= PROGRESS_STEP {
                    last_reported = downloaded;
                    let _ = tx.send(InstallProgress {
                        version: entry.id.clone(),
                        downloaded_bytes: downloaded,
                        total_bytes: expected_size,
                    });
                }
            }
        }
        if let Some(tx) = progress {
            if downloaded != last_reported {
                let _ = tx.send(InstallProgress {
                    version: entry.id.clone(),
                    downloaded_bytes: downloaded,
                    total_bytes: expected_size,
                });
            }
        }
        tmp.flush().map_err(|e| {
            InstallerError::from_io(&e, "flushing temp file", &final_path.display().to_string())
        })?;

        let file_label = final_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| entry.id.clone());

        if let Some(expected) = expected_size {
            if downloaded != expected {
                return Err(InstallerError::ValidationFailed {
                    subject: format!("size of {}", file_label),
                    expected: expected.to_string(),
                    actual: downloaded.to_string(),
                });
            }
        }
        let digest = format!("{:x}", hasher.finalize());
        if let Some(expected) = &entry.sha256 {
            if !digest.eq_ignore_ascii_case(expected) {
                return Err(InstallerError::ValidationFailed {
                    subject: format!("sha256 of {}", file_label),
                    expected: expected.clone(),
                    actual: digest,
                });
            }
        }

        // 검증을 통과한 뒤에만 최종 이름으로 원자적 rename
        tmp.persist(final_path).map_err(|e| {
            InstallerError::from_io(&e.error, "renaming into place", &final_path.display().to_string())
        })?;
        tracing::info!(
            "[Installer] Installed {} ({} bytes) at {}",
            entry.id,
            downloaded,
            final_path.display()
        );
        Ok(InstallOutcome::Installed {
            version: entry.id.clone(),
            path: final_path.to_path_buf(),
            bytes: downloaded,
        })
    }
}

/// 파일 전체의 SHA-256 (hex).
fn sha256_file(path: &Path) -> Result<String, InstallerError> {
    use std::io::Read;

    let mut file = std::fs::File::open(path)
        .map_err(|e| InstallerError::from_io(&e, "opening artifact for hashing", &path.display().to_string()))?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];
    loop {
        let n = file
            .read(&mut buffer)
            .map_err(|e| InstallerError::from_io(&e, "reading artifact for hashing", &path.display().to_string()))?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}
