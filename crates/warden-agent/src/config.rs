//! Configuration loading and defaults.
//!
//! Values come from `warden.toml` in the working directory (override the path
//! with the `WARDEN_CONFIG` env var). The file is re-read on every query so
//! edits apply on the next server restart or reconnect without restarting the
//! agent. A missing file yields the compiled defaults.
//!
//! ```toml
//! [server]
//! auto-start = true
//! auto-eula = true
//! stop-command = "stop"
//! jar-path = "auto-find"
//! restart-on-crash = true
//! stop-agent-on-server-stop = false
//!
//! [server.flags]
//! enable = true
//! list = ["Xms2G", "Xmx2G"]
//!
//! [server.arguments]
//! enable = false
//! list = ["--nogui"]
//!
//! [interpreter]
//! java-path = "java"
//! managed = false
//! # build-id = 17
//!
//! [remote]
//! address = "127.0.0.1:35565"
//! key = "INSERT_KEY_HERE"
//! ```

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub interpreter: InterpreterConfig,
    #[serde(default)]
    pub remote: RemoteConfig,
}

/// Supervised server settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ServerConfig {
    /// Start the server together with the agent (default true).
    #[serde(default = "default_true")]
    pub auto_start: bool,
    /// Write an accepted `eula.txt` before launch when missing (default true).
    #[serde(default = "default_true")]
    pub auto_eula: bool,
    /// Console command used to stop the server gracefully (default `stop`).
    #[serde(default = "default_stop_command")]
    pub stop_command: String,
    /// Server jar to launch: an absolute or relative path, or `auto-find` to
    /// pick the first foreign jar in the working directory (default).
    #[serde(default = "default_jar_path")]
    pub jar_path: String,
    /// Relaunch the server when it exits with a non-zero code (default true).
    #[serde(default = "default_true")]
    pub restart_on_crash: bool,
    /// Exit the whole agent once the server stops (default false).
    #[serde(default)]
    pub stop_agent_on_server_stop: bool,
    /// JVM flags passed before `-jar`. The leading hyphen is added by the
    /// launcher, so list entries look like `Xmx2G` or `XX:+UseG1GC`.
    #[serde(default)]
    pub flags: FlagsConfig,
    /// Program arguments passed after the jar path.
    #[serde(default)]
    pub arguments: ArgumentsConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct FlagsConfig {
    #[serde(default = "default_true")]
    pub enable: bool,
    #[serde(default = "default_flags")]
    pub list: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ArgumentsConfig {
    #[serde(default)]
    pub enable: bool,
    #[serde(default = "default_arguments")]
    pub list: Vec<String>,
}

/// Java runtime selection.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct InterpreterConfig {
    /// Interpreter used when managed mode is off (default `java`, resolved
    /// via PATH).
    #[serde(default = "default_java_path")]
    pub java_path: String,
    /// Use the runtime installed under `warden/system/jre` instead of
    /// `java-path` (default false).
    #[serde(default)]
    pub managed: bool,
    /// Build id recorded by the runtime installer. Required when `managed`
    /// is on.
    #[serde(default)]
    pub build_id: Option<u32>,
}

/// Control-server session settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RemoteConfig {
    /// Host:port of the control server.
    #[serde(default = "default_remote_address")]
    pub address: String,
    /// Server key authenticating this agent. Keep it private, it grants
    /// remote console access.
    #[serde(default = "default_remote_key")]
    pub key: String,
}

fn default_true() -> bool {
    true
}

fn default_stop_command() -> String {
    "stop".to_string()
}

fn default_jar_path() -> String {
    "auto-find".to_string()
}

fn default_flags() -> Vec<String> {
    vec!["Xms2G".to_string(), "Xmx2G".to_string()]
}

fn default_arguments() -> Vec<String> {
    vec!["--nogui".to_string()]
}

fn default_java_path() -> String {
    "java".to_string()
}

fn default_remote_address() -> String {
    "127.0.0.1:35565".to_string()
}

fn default_remote_key() -> String {
    "INSERT_KEY_HERE".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            auto_start: true,
            auto_eula: true,
            stop_command: default_stop_command(),
            jar_path: default_jar_path(),
            restart_on_crash: true,
            stop_agent_on_server_stop: false,
            flags: FlagsConfig::default(),
            arguments: ArgumentsConfig::default(),
        }
    }
}

impl Default for FlagsConfig {
    fn default() -> Self {
        Self {
            enable: true,
            list: default_flags(),
        }
    }
}

impl Default for ArgumentsConfig {
    fn default() -> Self {
        Self {
            enable: false,
            list: default_arguments(),
        }
    }
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        Self {
            java_path: default_java_path(),
            managed: false,
            build_id: None,
        }
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            address: default_remote_address(),
            key: default_remote_key(),
        }
    }
}

/// Handle to the on-disk configuration, loaded fresh on every call.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Resolve the config path from `WARDEN_CONFIG` or `warden.toml` in the
    /// working directory.
    pub fn from_env(working_dir: &Path) -> Self {
        let path = std::env::var("WARDEN_CONFIG")
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| working_dir.join("warden.toml"));
        Self::new(path)
    }

    /// Read and parse the config file. A missing file is not an error.
    pub fn load(&self) -> anyhow::Result<Config> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(v) => v,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Config::default()),
            Err(e) => {
                return Err(e).with_context(|| format!("read config: {}", self.path.display()));
            }
        };
        toml::from_str(&raw).with_context(|| format!("parse config: {}", self.path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_yields_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert!(config.server.auto_start);
        assert!(config.server.auto_eula);
        assert_eq!(config.server.stop_command, "stop");
        assert_eq!(config.server.jar_path, "auto-find");
        assert!(config.server.restart_on_crash);
        assert!(!config.server.stop_agent_on_server_stop);
        assert!(config.server.flags.enable);
        assert_eq!(config.server.flags.list, vec!["Xms2G", "Xmx2G"]);
        assert!(!config.server.arguments.enable);
        assert_eq!(config.server.arguments.list, vec!["--nogui"]);
        assert_eq!(config.interpreter.java_path, "java");
        assert!(!config.interpreter.managed);
        assert_eq!(config.interpreter.build_id, None);
        assert_eq!(config.remote.key, "INSERT_KEY_HERE");
    }

    #[test]
    fn partial_sections_keep_field_defaults() {
        let config: Config = toml::from_str(
            r#"
            [server]
            stop-command = "end"

            [server.flags]
            enable = false
            "#,
        )
        .unwrap();
        assert_eq!(config.server.stop_command, "end");
        assert!(config.server.auto_start);
        assert!(!config.server.flags.enable);
        // An explicit [server.flags] without a list still gets the default.
        assert_eq!(config.server.flags.list, vec!["Xms2G", "Xmx2G"]);
    }

    #[test]
    fn managed_interpreter_parses_build_id() {
        let config: Config = toml::from_str(
            r#"
            [interpreter]
            managed = true
            build-id = 17
            "#,
        )
        .unwrap();
        assert!(config.interpreter.managed);
        assert_eq!(config.interpreter.build_id, Some(17));
    }

    #[test]
    fn missing_file_loads_defaults() {
        let store = ConfigStore::new("/nonexistent/warden-test/warden.toml");
        let config = store.load().unwrap();
        assert_eq!(config.server.stop_command, "stop");
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = std::env::temp_dir().join("warden-config-malformed-test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("warden.toml");
        std::fs::write(&path, "[server\n").unwrap();
        let err = ConfigStore::new(&path).load().unwrap_err();
        assert!(err.to_string().contains("parse config"));
        std::fs::remove_dir_all(&dir).ok();
    }
}
