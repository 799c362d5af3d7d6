//! Configuration handling

use anyhow::Result;
use docspace::{ExitPolicy, TreeRoots, WorkspaceSpec};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration file
#[derive(Debug, Serialize, Deserialize, Default)]
pub struct Config {
    /// Where trees and scratch files live
    #[serde(default)]
    pub storage: StorageConfig,

    /// External tools
    #[serde(default)]
    pub tools: ToolsConfig,

    /// HTTP listener
    #[serde(default)]
    pub server: ServerConfig,

    /// Principal header verification
    #[serde(default)]
    pub auth: AuthSection,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Base directory of received trees
    #[serde(default = "default_received_root")]
    pub received_root: String,

    /// Base directory of generated trees
    #[serde(default = "default_generated_root")]
    pub generated_root: String,

    /// Scratch directory for rendering
    #[serde(default = "default_scratch_dir")]
    pub scratch_dir: String,

    /// Largest accepted upload request
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            received_root: default_received_root(),
            generated_root: default_generated_root(),
            scratch_dir: default_scratch_dir(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

fn default_received_root() -> String {
    "~/.local/share/docspace/received".to_string()
}
fn default_generated_root() -> String {
    "~/.local/share/docspace/generated".to_string()
}
fn default_scratch_dir() -> String {
    "~/.cache/docspace/scratch".to_string()
}
fn default_max_upload_bytes() -> usize {
    64 * 1024 * 1024
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Directory holding the converter and renderer
    #[serde(default = "default_executable_root")]
    pub executable_root: String,

    /// Converter executable name
    #[serde(default = "default_converter")]
    pub converter: String,

    /// Renderer executable name
    #[serde(default = "default_renderer")]
    pub renderer: String,

    /// Value of the converter's `-b` flag
    #[serde(default = "default_server_name")]
    pub server_name: String,

    /// Kill tools after this many seconds
    #[serde(default)]
    pub timeout_seconds: Option<u64>,

    /// Fail report generation on a non-zero converter exit
    #[serde(default)]
    pub strict_exit: bool,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            executable_root: default_executable_root(),
            converter: default_converter(),
            renderer: default_renderer(),
            server_name: default_server_name(),
            timeout_seconds: None,
            strict_exit: false,
        }
    }
}

fn default_executable_root() -> String {
    "/usr/local/lib/docspace/bin".to_string()
}
fn default_converter() -> String {
    "beagleviz".to_string()
}
fn default_renderer() -> String {
    "tree2svg".to_string()
}
fn default_server_name() -> String {
    "localhost".to_string()
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen address
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Sessions unused for this long are dropped, cursors included
    #[serde(default = "default_session_idle_secs")]
    pub session_idle_secs: u64,

    /// Most sessions kept at once; the least recently used go first
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            session_idle_secs: default_session_idle_secs(),
            max_sessions: default_max_sessions(),
        }
    }
}

impl ServerConfig {
    pub fn session_idle(&self) -> Duration {
        Duration::from_secs(self.session_idle_secs)
    }
}

fn default_listen() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_session_idle_secs() -> u64 {
    3600
}

fn default_max_sessions() -> usize {
    10_000
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AuthSection {
    /// Maximum allowed clock skew for signed principal headers
    #[serde(default = "default_max_skew_secs")]
    pub max_skew_secs: u64,
}

impl Default for AuthSection {
    fn default() -> Self {
        Self {
            max_skew_secs: default_max_skew_secs(),
        }
    }
}

fn default_max_skew_secs() -> u64 {
    60
}

impl Config {
    /// Load configuration from file
    pub fn load(path: &str) -> Result<Self> {
        let expanded = shellexpand::tilde(path).to_string();
        let path = Path::new(&expanded);

        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Build the workspace runtime spec, expanding `~` in every path
    pub fn workspace_spec(&self) -> WorkspaceSpec {
        let roots = TreeRoots {
            received: expand(&self.storage.received_root),
            generated: expand(&self.storage.generated_root),
        };
        let mut spec = WorkspaceSpec::new(
            roots,
            expand(&self.tools.executable_root),
            expand(&self.storage.scratch_dir),
        );
        spec.converter = self.tools.converter.clone();
        spec.renderer = self.tools.renderer.clone();
        spec.server_name = self.tools.server_name.clone();
        spec.timeout = self.tools.timeout_seconds.map(Duration::from_secs);
        spec.exit_policy = if self.tools.strict_exit {
            ExitPolicy::Strict
        } else {
            ExitPolicy::Permissive
        };
        spec
    }
}

fn expand(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).as_ref())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.storage.received_root, "~/.local/share/docspace/received");
        assert_eq!(config.storage.max_upload_bytes, 64 * 1024 * 1024);
        assert_eq!(config.tools.converter, "beagleviz");
        assert_eq!(config.tools.renderer, "tree2svg");
        assert!(config.tools.timeout_seconds.is_none());
        assert!(!config.tools.strict_exit);
        assert_eq!(config.server.listen, "127.0.0.1:8080");
        assert_eq!(config.server.session_idle(), Duration::from_secs(3600));
        assert_eq!(config.server.max_sessions, 10_000);
        assert_eq!(config.auth.max_skew_secs, 60);
    }

    #[test]
    fn test_load_nonexistent_file_returns_default() {
        let config = Config::load("/nonexistent/path/docspace.toml").unwrap();
        assert_eq!(config.tools.converter, "beagleviz");
    }

    #[test]
    fn test_load_valid_toml() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[storage]
received_root = "/srv/docspace/received"
generated_root = "/srv/docspace/generated"
scratch_dir = "/var/tmp/docspace"
max_upload_bytes = 1048576

[tools]
executable_root = "/opt/beagle/bin"
converter = "beagleviz2"
server_name = "forum.example.org"
timeout_seconds = 120
strict_exit = true

[server]
listen = "0.0.0.0:9000"
session_idle_secs = 900

[auth]
max_skew_secs = 15
"#
        )
        .unwrap();

        let config = Config::load(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.storage.max_upload_bytes, 1_048_576);
        assert_eq!(config.tools.renderer, "tree2svg");
        assert_eq!(config.server.listen, "0.0.0.0:9000");
        assert_eq!(config.server.session_idle_secs, 900);
        assert_eq!(config.server.max_sessions, 10_000);
        assert_eq!(config.auth.max_skew_secs, 15);

        let spec = config.workspace_spec();
        assert_eq!(spec.roots.received, PathBuf::from("/srv/docspace/received"));
        assert_eq!(spec.executable_root, PathBuf::from("/opt/beagle/bin"));
        assert_eq!(spec.converter, "beagleviz2");
        assert_eq!(spec.server_name, "forum.example.org");
        assert_eq!(spec.timeout, Some(Duration::from_secs(120)));
        assert_eq!(spec.exit_policy, ExitPolicy::Strict);
    }

    #[test]
    fn test_tilde_paths_are_expanded() {
        let spec = Config::default().workspace_spec();
        assert!(!spec.roots.generated.starts_with("~"));
        assert!(spec.roots.generated.ends_with(".local/share/docspace/generated"));
    }

    #[test]
    fn test_load_invalid_toml_returns_error() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[[[not valid toml").unwrap();

        assert!(Config::load(file.path().to_str().unwrap()).is_err());
    }
}
