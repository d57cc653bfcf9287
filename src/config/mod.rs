//! Daemon configuration (config/mcwarden.toml).
//!
//! Every section and field has a default, so a missing file yields a
//! working configuration for the common case: a Java server in ./server.
//! A malformed file is an error, not a silent fallback.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::supervisor::{LaunchSpec, SupervisorOptions};
use mcwarden_installer_lib::catalog::CatalogEntry;

#[derive(Deserialize, Debug, Clone, Default)]
pub struct WardenConfig {
    #[serde(default)]
    pub launch: LaunchConfig,
    #[serde(default)]
    pub supervisor: SupervisorConfig,
    #[serde(default)]
    pub properties: PropertiesConfig,
    #[serde(default)]
    pub artifacts: ArtifactsConfig,
    #[serde(default)]
    pub network: NetworkConfig,
}

#[derive(Deserialize, Debug, Clone)]
pub struct LaunchConfig {
    #[serde(default = "default_program")]
    pub program: String,
    #[serde(default = "default_args")]
    pub args: Vec<String>,
    #[serde(default = "default_working_dir")]
    pub working_dir: PathBuf,
    /// Extra environment variables for the server process
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// Regex with a `level` named capture group for console line levels
    #[serde(default = "default_log_pattern")]
    pub log_pattern: String,
    #[serde(default = "default_log_buffer_size")]
    pub log_buffer_size: usize,
}

#[derive(Deserialize, Debug, Clone)]
pub struct SupervisorConfig {
    #[serde(default = "default_probe_window_ms")]
    pub probe_window_ms: u64,
    #[serde(default = "default_stop_grace_secs")]
    pub stop_grace_secs: u64,
    /// Console command used as the most graceful stop. Empty string disables.
    #[serde(default = "default_console_stop_command")]
    pub console_stop_command: String,
    /// Background reconcile interval
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct PropertiesConfig {
    /// Defaults to <launch.working_dir>/server.properties
    #[serde(default)]
    pub path: Option<PathBuf>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct ArtifactsConfig {
    /// Where installed server artifacts live. Defaults to launch.working_dir.
    #[serde(default)]
    pub dir: Option<PathBuf>,
    #[serde(default = "default_artifact_name")]
    pub artifact_name: String,
    #[serde(default = "default_artifact_ext")]
    pub artifact_ext: String,
    #[serde(default = "default_download_timeout_secs")]
    pub download_timeout_secs: u64,
    /// Catalog overrides; empty means the built-in catalog
    #[serde(default)]
    pub versions: Vec<CatalogEntry>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct NetworkConfig {
    #[serde(default = "default_public_ip_endpoint")]
    pub public_ip_endpoint: String,
    #[serde(default = "default_network_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_program() -> String {
    "java".to_string()
}

fn default_args() -> Vec<String> {
    vec!["-Xmx2G".into(), "-jar".into(), "server.jar".into(), "nogui".into()]
}

fn default_working_dir() -> PathBuf {
    PathBuf::from("./server")
}

fn default_log_pattern() -> String {
    r"/(?P<level>INFO|WARN|ERROR|DEBUG|FATAL)\]".to_string()
}

fn default_log_buffer_size() -> usize {
    10_000
}

fn default_probe_window_ms() -> u64 {
    1500
}

fn default_stop_grace_secs() -> u64 {
    10
}

fn default_console_stop_command() -> String {
    "stop".to_string()
}

fn default_poll_interval_secs() -> u64 {
    2
}

fn default_artifact_name() -> String {
    "server".to_string()
}

fn default_artifact_ext() -> String {
    "jar".to_string()
}

fn default_download_timeout_secs() -> u64 {
    300
}

fn default_public_ip_endpoint() -> String {
    "https://api.ipify.org".to_string()
}

fn default_network_timeout_secs() -> u64 {
    5
}

impl Default for LaunchConfig {
    fn default() -> Self {
        Self {
            program: default_program(),
            args: default_args(),
            working_dir: default_working_dir(),
            env: BTreeMap::new(),
            log_pattern: default_log_pattern(),
            log_buffer_size: default_log_buffer_size(),
        }
    }
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            probe_window_ms: default_probe_window_ms(),
            stop_grace_secs: default_stop_grace_secs(),
            console_stop_command: default_console_stop_command(),
            poll_interval_secs: default_poll_interval_secs(),
        }
    }
}

impl Default for ArtifactsConfig {
    fn default() -> Self {
        Self {
            dir: None,
            artifact_name: default_artifact_name(),
            artifact_ext: default_artifact_ext(),
            download_timeout_secs: default_download_timeout_secs(),
            versions: Vec::new(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            public_ip_endpoint: default_public_ip_endpoint(),
            timeout_secs: default_network_timeout_secs(),
        }
    }
}

impl WardenConfig {
    pub fn default_path() -> PathBuf {
        PathBuf::from("config/mcwarden.toml")
    }

    /// Load from `path`. A missing file yields the defaults; a file that
    /// exists but does not parse is an error.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(s) => {
                let cfg: Self = toml::from_str(&s)
                    .map_err(|e| anyhow::anyhow!("invalid config {}: {}", path.display(), e))?;
                Ok(cfg)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("No config at {}, using defaults", path.display());
                Ok(Self::default())
            }
            Err(e) => Err(anyhow::anyhow!("failed to read {}: {}", path.display(), e)),
        }
    }

    /// Launch spec for the configured server.
    pub fn launch_spec(&self) -> LaunchSpec {
        let mut spec = LaunchSpec::new(
            self.launch.program.clone(),
            self.launch.args.clone(),
            self.launch.working_dir.clone(),
        );
        spec.env = self.launch.env.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        spec.log_pattern = Some(self.launch.log_pattern.clone());
        spec.log_buffer_size = self.launch.log_buffer_size;
        spec
    }

    pub fn supervisor_options(&self) -> SupervisorOptions {
        SupervisorOptions {
            probe_window: Duration::from_millis(self.supervisor.probe_window_ms),
            stop_grace: Duration::from_secs(self.supervisor.stop_grace_secs),
            console_stop_command: if self.supervisor.console_stop_command.is_empty() {
                None
            } else {
                Some(self.supervisor.console_stop_command.clone())
            },
        }
    }

    /// Path of the managed server.properties file.
    pub fn properties_path(&self) -> PathBuf {
        self.properties
            .path
            .clone()
            .unwrap_or_else(|| self.launch.working_dir.join("server.properties"))
    }

    /// Directory artifacts are installed into.
    pub fn artifacts_dir(&self) -> PathBuf {
        self.artifacts
            .dir
            .clone()
            .unwrap_or_else(|| self.launch.working_dir.clone())
    }

    /// Installer setup derived from the artifacts section.
    pub fn installer_config(&self) -> mcwarden_installer_lib::InstallerConfig {
        mcwarden_installer_lib::InstallerConfig {
            artifact_name: self.artifacts.artifact_name.clone(),
            artifact_ext: self.artifacts.artifact_ext.clone(),
            download_timeout: Duration::from_secs(self.artifacts.download_timeout_secs),
            catalog_overrides: self.artifacts.versions.clone(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_describe_a_java_server() {
        let cfg = WardenConfig::default();
        assert_eq!(cfg.launch.program, "java");
        assert_eq!(cfg.launch.working_dir, PathBuf::from("./server"));
        assert_eq!(cfg.supervisor.stop_grace_secs, 10);
        assert_eq!(cfg.network.public_ip_endpoint, "https://api.ipify.org");
        assert_eq!(cfg.properties_path(), PathBuf::from("./server/server.properties"));
        assert_eq!(cfg.artifacts_dir(), PathBuf::from("./server"));
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let cfg: WardenConfig = toml::from_str(
            r#"
            [launch]
            working_dir = "/srv/mc"

            [supervisor]
            stop_grace_secs = 30
            "#,
        )
        .unwrap();
        assert_eq!(cfg.launch.working_dir, PathBuf::from("/srv/mc"));
        assert_eq!(cfg.launch.program, "java");
        assert_eq!(cfg.supervisor.stop_grace_secs, 30);
        assert_eq!(cfg.supervisor.probe_window_ms, 1500);
        assert_eq!(cfg.properties_path(), PathBuf::from("/srv/mc/server.properties"));
    }

    #[test]
    fn version_overrides_parse() {
        let cfg: WardenConfig = toml::from_str(
            r#"
            [[artifacts.versions]]
            id = "1.20.2"
            url = "https://example.com/{version}/server.jar"
            sha256 = "ab12"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.artifacts.versions.len(), 1);
        assert_eq!(cfg.artifacts.versions[0].id, "1.20.2");
    }

    #[test]
    fn empty_console_stop_disables_it() {
        let cfg: WardenConfig = toml::from_str(
            r#"
            [supervisor]
            console_stop_command = ""
            "#,
        )
        .unwrap();
        assert!(cfg.supervisor_options().console_stop_command.is_none());
    }

    #[test]
    fn load_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = WardenConfig::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(cfg.launch.program, "java");
    }

    #[test]
    fn load_malformed_file_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.toml");
        std::fs::write(&path, "launch = \"not a table\"").unwrap();
        assert!(WardenConfig::load(&path).is_err());
    }

    #[test]
    fn installer_config_carries_artifact_settings() {
        let cfg: WardenConfig = toml::from_str(
            r#"
            [artifacts]
            artifact_name = "paper"
            download_timeout_secs = 42

            [[artifacts.versions]]
            id = "1.20.2"
            url = "https://example.com/{version}"
            "#,
        )
        .unwrap();
        let ic = cfg.installer_config();
        assert_eq!(ic.artifact_name, "paper");
        assert_eq!(ic.artifact_ext, "jar");
        assert_eq!(ic.download_timeout, Duration::from_secs(42));
        assert_eq!(ic.catalog_overrides.len(), 1);
    }
}
