//! 설치 가능한 버전 카탈로그.
//!
//! 카탈로그는 항상 최신 버전이 앞에 오도록 정렬된다. 기본 카탈로그는
//! Mojang 배포 서버의 고정 URL을 내장하고, 설정으로 항목을 통째로
//! 교체할 수 있다. URL의 `{version}` 자리표시자는 항목 ID로 치환되므로
//! PaperMC처럼 버전이 경로에 들어가는 소스도 같은 타입으로 기술된다.

use std::cmp::Ordering;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::InstallerError;
use crate::version::GameVersion;

/// One installable version of the server artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogEntry {
    /// Version identifier, e.g. "1.20.2"
    pub id: String,
    /// Download URL; a `{version}` placeholder expands to `id`
    pub url: String,
    /// Expected size in bytes, verified after download when present
    #[serde(default)]
    pub size: Option<u64>,
    /// Expected SHA-256 (hex), verified after download when present
    #[serde(default)]
    pub sha256: Option<String>,
}

impl CatalogEntry {
    /// `{version}` 치환을 적용한 실제 다운로드 URL
    pub fn resolve_url(&self) -> String {
        self.url.replace("{version}", &self.id)
    }
}

/// Ordered list of installable versions, newest first.
pub struct VersionCatalog {
    entries: Vec<CatalogEntry>,
}

impl VersionCatalog {
    /// 내장 기본 카탈로그 (Mojang vanilla server.jar 배포 URL)
    pub fn builtin() -> Self {
        let entry = |id: &str, object: &str| CatalogEntry {
            id: id.to_string(),
            url: format!("https://piston-data.mojang.com/v1/objects/{}/server.jar", object),
            size: None,
            sha256: None,
        };
        Self::from_entries(vec![
            entry("1.21.1", "59353fb40c36d304f2035d51e7d6e6baa98dc05c"),
            entry("1.21", "450698d1863ab5180c25d7c804ef0fe6369dd1ba"),
            entry("1.20.6", "145ff0858209bcfc164859ba735d4199aafa1eea"),
            entry("1.20.4", "8dd1a28015f51b1803213892b50b7b4fc76e594d"),
            entry("1.20.2", "5b868151bd02b41319f54c8d4061b8cae84e665c"),
            entry("1.20.1", "84194a2f286ef7c14ed7ce0090dba59902951553"),
            entry("1.19.4", "8f3112a1049751cc472ec13e397eade5336ca7ae"),
            entry("1.18.2", "c8f83c5655308435b3dcf03c06d9fe8740a77469"),
        ])
    }

    /// Build a catalog from entries, sorting newest first. Entries with
    /// unparseable IDs sort after all parseable ones, keeping their order.
    pub fn from_entries(mut entries: Vec<CatalogEntry>) -> Self {
        entries.sort_by(|a, b| {
            match (GameVersion::parse(&a.id), GameVersion::parse(&b.id)) {
                (Some(va), Some(vb)) => vb.cmp(&va),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            }
        });
        Self { entries }
    }

    /// 설정 오버라이드가 있으면 그걸로, 없으면 내장 카탈로그로
    pub fn with_overrides(overrides: Vec<CatalogEntry>) -> Self {
        if overrides.is_empty() {
            Self::builtin()
        } else {
            Self::from_entries(overrides)
        }
    }

    /// All entries, newest first.
    pub fn list(&self) -> &[CatalogEntry] {
        &self.entries
    }

    /// Version identifiers, newest first.
    pub fn ids(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.id.clone()).collect()
    }

    /// Find the entry for a version identifier.
    pub fn resolve(&self, version: &str) -> Result<&CatalogEntry, InstallerError> {
        self.entries
            .iter()
            .find(|e| e.id == version)
            .ok_or_else(|| InstallerError::UnknownVersion {
                version: version.to_string(),
            })
    }
}

/// 최종 아티팩트 파일 이름: `<name>_<version>.<ext>`
pub fn artifact_filename(name: &str, version: &str, ext: &str) -> String {
    format!("{}_{}.{}", name, version, ext)
}

/// Scan `dir` for installed artifacts and return their version identifiers.
pub fn installed_versions(dir: &Path, name: &str, ext: &str) -> Vec<String> {
    let pattern = dir.join(format!("{}_*.{}", name, ext));
    let pattern = pattern.to_string_lossy();
    let prefix = format!("{}_", name);
    let suffix = format!(".{}", ext);

    let mut versions = Vec::new();
    match glob::glob(&pattern) {
        Ok(paths) => {
            for path in paths.flatten() {
                if let Some(file_name) = path.file_name().and_then(|n| n.to_str()) {
                    if let Some(v) = file_name
                        .strip_prefix(&prefix)
                        .and_then(|s| s.strip_suffix(&suffix))
                    {
                        if !v.is_empty() {
                            versions.push(v.to_string());
                        }
                    }
                }
            }
        }
        Err(e) => {
            tracing::warn!("[Installer] Bad artifact scan pattern {:?}: {}", pattern, e);
        }
    }
    versions.sort_by(|a, b| match (GameVersion::parse(a), GameVersion::parse(b)) {
        (Some(va), Some(vb)) => vb.cmp(&va),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.cmp(b),
    });
    versions
}
