//! # Runtime Settings
//!
//! All configuration the pipeline needs for one run, resolved once at
//! startup and passed by reference into each stage. Nothing in the
//! library reads ambient environment state after `Settings::from_env()`
//! returns, which keeps stages pure and testable.
//!
//! ## Environment keys and defaults
//!
//! | Variable                    | Default                      | Meaning |
//! |-----------------------------|------------------------------|---------|
//! | `MIHOMO_DIR`                | `~/.config/mihomo`           | engine config directory |
//! | `SCRIPTS_DIR`               | `<MIHOMO_DIR>/scripts`       | operator policy documents |
//! | `SUB_REQUEST_TIMEOUT`       | `20` (seconds)               | per-subscription fetch timeout |
//! | `JS_OVERRIDE_TIMEOUT`       | `20` (seconds)               | sandbox wall-clock timeout |
//! | `NODE_BIN`                  | `node`                       | sandbox interpreter binary |
//! | `CLASH_EXTERNAL_CONTROLLER` | `0.0.0.0:9090`               | engine control endpoint |
//! | `CLASH_MIXED_PORT`          | unset                        | forced mixed listen port |
//! | `CLASH_SOCKS_PORT`          | unset                        | forced SOCKS listen port |
//! | `CLASH_SECRET`              | unset                        | control API shared secret |
//! | `CLASH_DISABLE_GEOIP`       | unset (off)                  | strip GEOIP rules when truthy |
//!
//! Invalid integer values are logged and ignored rather than failing the
//! run, matching how operators actually deploy this tool.

use std::path::{Path, PathBuf};
use std::time::Duration;

use log::warn;

/// Default engine control endpoint when `CLASH_EXTERNAL_CONTROLLER` is unset.
pub const DEFAULT_EXTERNAL_CONTROLLER: &str = "0.0.0.0:9090";

const DEFAULT_TIMEOUT_SECS: u64 = 20;

/// Filesystem locations used by the pipeline.
#[derive(Debug, Clone)]
pub struct Paths {
    /// Engine configuration directory (final document lives here).
    pub base_dir: PathBuf,
    /// Per-subscription node snapshots, for inspection and debugging.
    pub subs_dir: PathBuf,
    /// Timestamped backups of previously written documents.
    pub backup_dir: PathBuf,
    /// The final synthesized document.
    pub config_file: PathBuf,
    /// The subscription list (JSON).
    pub subs_config: PathBuf,
    /// Base template document (YAML), optional.
    pub template_file: PathBuf,
    /// Static structured override document (YAML), optional.
    pub override_file: PathBuf,
    /// Transform script source (JavaScript), optional.
    pub override_script_file: PathBuf,
    /// Site policy document (YAML), optional.
    pub site_policy_file: PathBuf,
}

impl Paths {
    /// Build the standard layout under an engine dir and a scripts dir.
    pub fn new(base_dir: PathBuf, scripts_dir: PathBuf) -> Self {
        Self {
            subs_dir: base_dir.join("subs"),
            backup_dir: base_dir.join("backups"),
            config_file: base_dir.join("config.yaml"),
            subs_config: scripts_dir.join("subscriptions.json"),
            template_file: scripts_dir.join("template.yaml"),
            override_file: scripts_dir.join("override.yaml"),
            override_script_file: scripts_dir.join("override.js"),
            site_policy_file: scripts_dir.join("site_policy.yaml"),
            base_dir,
        }
    }

    /// Create the directories a run writes into.
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.base_dir)?;
        std::fs::create_dir_all(&self.subs_dir)?;
        std::fs::create_dir_all(&self.backup_dir)?;
        Ok(())
    }
}

/// Runtime knobs consumed by individual stages.
#[derive(Debug, Clone)]
pub struct Runtime {
    /// Per-subscription HTTP fetch timeout.
    pub request_timeout: Duration,
    /// Sandbox subprocess wall-clock timeout.
    pub script_timeout: Duration,
    /// Interpreter binary for the transform script sandbox.
    pub node_bin: String,
    /// Engine control endpoint forced into the final document.
    pub external_controller: String,
    /// Forced mixed listen port, when configured.
    pub mixed_port: Option<u16>,
    /// Forced SOCKS listen port, when configured.
    pub socks_port: Option<u16>,
    /// Control API shared secret, when configured.
    pub secret: Option<String>,
    /// Strip GEOIP rules from the final rule list.
    pub disable_geoip: bool,
}

impl Default for Runtime {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            script_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            node_bin: "node".to_string(),
            external_controller: DEFAULT_EXTERNAL_CONTROLLER.to_string(),
            mixed_port: None,
            socks_port: None,
            secret: None,
            disable_geoip: false,
        }
    }
}

/// Complete per-run configuration.
#[derive(Debug, Clone)]
pub struct Settings {
    pub paths: Paths,
    pub runtime: Runtime,
}

impl Settings {
    /// Resolve settings from the environment with documented defaults.
    pub fn from_env() -> Self {
        let base_dir = match std::env::var("MIHOMO_DIR") {
            Ok(dir) if !dir.trim().is_empty() => PathBuf::from(dir),
            _ => dirs::config_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("mihomo"),
        };
        let scripts_dir = match std::env::var("SCRIPTS_DIR") {
            Ok(dir) if !dir.trim().is_empty() => PathBuf::from(dir),
            _ => base_dir.join("scripts"),
        };

        let runtime = Runtime {
            request_timeout: Duration::from_secs(
                read_int_env("SUB_REQUEST_TIMEOUT").unwrap_or(DEFAULT_TIMEOUT_SECS),
            ),
            script_timeout: Duration::from_secs(
                read_int_env("JS_OVERRIDE_TIMEOUT").unwrap_or(DEFAULT_TIMEOUT_SECS),
            ),
            node_bin: read_str_env("NODE_BIN").unwrap_or_else(|| "node".to_string()),
            external_controller: read_str_env("CLASH_EXTERNAL_CONTROLLER")
                .unwrap_or_else(|| DEFAULT_EXTERNAL_CONTROLLER.to_string()),
            mixed_port: read_int_env("CLASH_MIXED_PORT").and_then(to_port("CLASH_MIXED_PORT")),
            socks_port: read_int_env("CLASH_SOCKS_PORT").and_then(to_port("CLASH_SOCKS_PORT")),
            secret: read_str_env("CLASH_SECRET"),
            disable_geoip: env_flag("CLASH_DISABLE_GEOIP"),
        };

        Self {
            paths: Paths::new(base_dir, scripts_dir),
            runtime,
        }
    }

    /// Settings rooted at explicit directories, with default runtime knobs.
    ///
    /// Used by tests and by callers that manage their own layout.
    pub fn with_dirs(base_dir: &Path, scripts_dir: &Path) -> Self {
        Self {
            paths: Paths::new(base_dir.to_path_buf(), scripts_dir.to_path_buf()),
            runtime: Runtime::default(),
        }
    }
}

fn read_str_env(name: &str) -> Option<String> {
    match std::env::var(name) {
        Ok(value) => {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        }
        Err(_) => None,
    }
}

fn read_int_env(name: &str) -> Option<u64> {
    let raw = read_str_env(name)?;
    match raw.parse::<u64>() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("invalid {}={:?}, ignored", name, raw);
            None
        }
    }
}

fn to_port(name: &'static str) -> impl Fn(u64) -> Option<u16> {
    move |value| match u16::try_from(value) {
        Ok(port) => Some(port),
        Err(_) => {
            warn!("invalid {}={}, ignored (not a valid port)", name, value);
            None
        }
    }
}

fn env_flag(name: &str) -> bool {
    read_str_env(name)
        .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(false)
}
