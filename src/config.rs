//! Configuration loader and validator for the URL checker service.
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Root configuration struct mirroring the YAML schema exactly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    pub app: App,
    pub probe: ProbeSettings,
    pub report: ReportSettings,
}

/// Process-level settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct App {
    pub data_dir: String,
    pub listen_addr: String,
    pub shutdown_grace_seconds: u64,
}

/// Shared HTTP client used by every probe.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProbeSettings {
    pub timeout_seconds: u64,
    pub user_agent: String,
}

/// Report queue sizing and wait ceiling.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReportSettings {
    pub queue_capacity: usize,
    pub wait_timeout_seconds: u64,
}

impl App {
    pub fn database_url(&self) -> String {
        format!("sqlite://{}/url-checker.db", self.data_dir.trim_end_matches('/'))
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_seconds)
    }
}

impl ReportSettings {
    pub fn wait_timeout(&self) -> Duration {
        Duration::from_secs(self.wait_timeout_seconds)
    }
}

impl Config {
    /// Ensure required directories exist (creates `app.data_dir` if missing).
    pub fn ensure_dirs(&self) -> Result<(), std::io::Error> {
        if self.app.data_dir.trim().is_empty() {
            return Ok(());
        }
        fs::create_dir_all(&self.app.data_dir)
    }
}

/// Load configuration from a YAML file and validate it.
/// - If `path` is None, uses `config.yaml` in the current working directory.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("config.yaml"));
    let content = fs::read_to_string(path)?;
    let cfg: Config = serde_yaml::from_str(&content)?;
    validate(&cfg)?;
    Ok(cfg)
}

/// Validate a configuration instance.
pub fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.app.data_dir.trim().is_empty() {
        return Err(ConfigError::Invalid("app.data_dir must be non-empty"));
    }
    if cfg.app.listen_addr.trim().is_empty() {
        return Err(ConfigError::Invalid("app.listen_addr must be non-empty"));
    }
    if cfg.app.shutdown_grace_seconds == 0 {
        return Err(ConfigError::Invalid("app.shutdown_grace_seconds must be > 0"));
    }

    if cfg.probe.timeout_seconds == 0 {
        return Err(ConfigError::Invalid("probe.timeout_seconds must be > 0"));
    }
    if cfg.probe.user_agent.trim().is_empty() {
        return Err(ConfigError::Invalid("probe.user_agent must be non-empty"));
    }

    if cfg.report.queue_capacity == 0 {
        return Err(ConfigError::Invalid("report.queue_capacity must be > 0"));
    }
    if cfg.report.wait_timeout_seconds == 0 {
        return Err(ConfigError::Invalid("report.wait_timeout_seconds must be > 0"));
    }

    Ok(())
}

/// Example configuration with the service defaults.
pub fn example() -> &'static str {
    r#"app:
  data_dir: "./data"
  listen_addr: "0.0.0.0:8080"
  shutdown_grace_seconds: 30

probe:
  timeout_seconds: 10
  user_agent: "URL-Checker/1.0"

report:
  queue_capacity: 10
  wait_timeout_seconds: 30
"#
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn example_config() -> Config {
        serde_yaml::from_str(example()).unwrap()
    }

    #[test]
    fn parse_example_ok() {
        let cfg = example_config();
        validate(&cfg).unwrap();
        assert_eq!(cfg.report.queue_capacity, 10);
        assert_eq!(cfg.report.wait_timeout(), Duration::from_secs(30));
        assert_eq!(cfg.probe.user_agent, "URL-Checker/1.0");
    }

    #[test]
    fn invalid_app_settings() {
        let mut cfg = example_config();
        cfg.app.data_dir = " ".into();
        let err = validate(&cfg).unwrap_err();
        match err {
            ConfigError::Invalid(msg) => assert!(msg.contains("data_dir")),
            _ => panic!("wrong error"),
        }

        let mut cfg = example_config();
        cfg.app.listen_addr = "".into();
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));

        let mut cfg = example_config();
        cfg.app.shutdown_grace_seconds = 0;
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn invalid_probe_and_report_settings() {
        let mut cfg = example_config();
        cfg.probe.timeout_seconds = 0;
        let err = validate(&cfg).unwrap_err();
        match err {
            ConfigError::Invalid(msg) => assert!(msg.contains("probe.timeout_seconds")),
            _ => panic!("wrong error"),
        }

        let mut cfg = example_config();
        cfg.probe.user_agent = "".into();
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));

        let mut cfg = example_config();
        cfg.report.queue_capacity = 0;
        let err = validate(&cfg).unwrap_err();
        match err {
            ConfigError::Invalid(msg) => assert!(msg.contains("queue_capacity")),
            _ => panic!("wrong error"),
        }

        let mut cfg = example_config();
        cfg.report.wait_timeout_seconds = 0;
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn database_url_uses_data_dir() {
        let mut cfg = example_config();
        cfg.app.data_dir = "/var/lib/checker/".into();
        assert_eq!(
            cfg.app.database_url(),
            "sqlite:///var/lib/checker/url-checker.db"
        );
    }

    #[test]
    fn ensure_dirs_creates_data_dir() {
        let td = tempdir().unwrap();
        let data_path = td.path().join("data");
        let mut cfg = example_config();
        cfg.app.data_dir = data_path.to_string_lossy().to_string();
        cfg.ensure_dirs().unwrap();
        assert!(data_path.exists());
    }

    #[test]
    fn load_from_file_ok() {
        let td = tempdir().unwrap();
        let p = td.path().join("config.yaml");
        fs::write(&p, example()).unwrap();
        let cfg = load(Some(&p)).unwrap();
        assert_eq!(cfg.app.listen_addr, "0.0.0.0:8080");
    }

    #[test]
    fn load_missing_file_is_io_error() {
        let td = tempdir().unwrap();
        let p = td.path().join("absent.yaml");
        assert!(matches!(load(Some(&p)), Err(ConfigError::Io(_))));
    }
}
