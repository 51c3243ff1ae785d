//! Pipeline configuration loaded from an optional TOML file and `HEARTLINE__*` environment variables.
//!
//! | Key | Default | Description |
//! |-----|---------|-------------|
//! | app_name | Heartline | Display name used by the gateway. |
//! | port | 8001 | HTTP port for the gateway. |
//! | storage_path | ./data | Base directory for sled databases. |
//! | execution_mode | graph | `graph` (checkpointed) or `sequential`. |
//! | knowledge_top_k | 3 | Snippets requested per knowledge query. |
//! | provider_attempts | 1 | Tries per retrieval stage before the turn fails. |
//! | nudge_window_start / nudge_window_end | 8 / 21 | Inclusive local hours when nudges may surface. |
//! | max_daily_nudges | 3 | Accepted nudges per user per day. |
//! | nudge_cooldown_hours | 4 | Minimum gap between accepted nudges, at most one week. |
//! | default_user_id | user123 | User a turn is attributed to when the caller gives none. |
//! | health_data_path | (unset) | JSON dataset for the static health data provider. |

use serde::{Deserialize, Serialize};
use std::path::Path;

pub const MAX_NUDGE_COOLDOWN_HOURS: i64 = 24 * 7;

/// Which executor drives a turn. Both produce identical replies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    #[default]
    Graph,
    Sequential,
}

impl std::fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionMode::Graph => f.write_str("graph"),
            ExecutionMode::Sequential => f.write_str("sequential"),
        }
    }
}

fn default_app_name() -> String {
    "Heartline".to_string()
}

fn default_port() -> u16 {
    8001
}

fn default_storage_path() -> String {
    "./data".to_string()
}

fn default_top_k() -> usize {
    3
}

fn default_provider_attempts() -> u32 {
    1
}

fn default_window_start() -> u32 {
    8
}

fn default_window_end() -> u32 {
    21
}

fn default_max_daily_nudges() -> u32 {
    3
}

fn default_cooldown_hours() -> i64 {
    4
}

fn default_user_id() -> String {
    "user123".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_app_name")]
    pub app_name: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_storage_path")]
    pub storage_path: String,
    #[serde(default)]
    pub execution_mode: ExecutionMode,
    #[serde(default = "default_top_k")]
    pub knowledge_top_k: usize,
    #[serde(default = "default_provider_attempts")]
    pub provider_attempts: u32,
    #[serde(default = "default_window_start")]
    pub nudge_window_start: u32,
    #[serde(default = "default_window_end")]
    pub nudge_window_end: u32,
    #[serde(default = "default_max_daily_nudges")]
    pub max_daily_nudges: u32,
    #[serde(default = "default_cooldown_hours")]
    pub nudge_cooldown_hours: i64,
    #[serde(default = "default_user_id")]
    pub default_user_id: String,
    #[serde(default)]
    pub health_data_path: Option<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            app_name: default_app_name(),
            port: default_port(),
            storage_path: default_storage_path(),
            execution_mode: ExecutionMode::default(),
            knowledge_top_k: default_top_k(),
            provider_attempts: default_provider_attempts(),
            nudge_window_start: default_window_start(),
            nudge_window_end: default_window_end(),
            max_daily_nudges: default_max_daily_nudges(),
            nudge_cooldown_hours: default_cooldown_hours(),
            default_user_id: default_user_id(),
            health_data_path: None,
        }
    }
}

impl PipelineConfig {
    /// Load config from file and environment. Precedence: `HEARTLINE__*` env > file named by
    /// `HEARTLINE_CONFIG` (default `config/heartline`) > defaults.
    pub fn load() -> Result<Self, config::ConfigError> {
        let config_path =
            std::env::var("HEARTLINE_CONFIG").unwrap_or_else(|_| "config/heartline".to_string());
        Self::load_from(Path::new(&config_path))
    }

    /// Same as [`PipelineConfig::load`] with an explicit file path. A missing file is skipped.
    pub fn load_from(path: &Path) -> Result<Self, config::ConfigError> {
        let builder = config::Config::builder()
            .set_default("app_name", default_app_name())?
            .set_default("port", i64::from(default_port()))?
            .set_default("storage_path", default_storage_path())?
            .set_default("execution_mode", "graph")?;

        let built = builder
            .add_source(config::File::from(path).required(false))
            .add_source(config::Environment::with_prefix("HEARTLINE").separator("__"))
            .build()?;

        let cfg: Self = built.try_deserialize()?;
        Ok(cfg.normalized())
    }

    /// Clamps values that would make the pipeline misbehave.
    fn normalized(mut self) -> Self {
        self.provider_attempts = self.provider_attempts.max(1);
        self.knowledge_top_k = self.knowledge_top_k.max(1);
        self.nudge_window_start = self.nudge_window_start.min(23);
        self.nudge_window_end = self.nudge_window_end.clamp(self.nudge_window_start, 23);
        self.nudge_cooldown_hours = self.nudge_cooldown_hours.clamp(0, MAX_NUDGE_COOLDOWN_HOURS);
        self
    }

    /// Sled path for conversation checkpoints.
    pub fn checkpoint_path(&self) -> std::path::PathBuf {
        Path::new(&self.storage_path).join("heartline_checkpoints")
    }

    /// Sled path for the knowledge snippet store.
    pub fn knowledge_path(&self) -> std::path::PathBuf {
        Path::new(&self.storage_path).join("heartline_knowledge")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = PipelineConfig::load_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(cfg.execution_mode, ExecutionMode::Graph);
        assert_eq!(cfg.knowledge_top_k, 3);
        assert_eq!(cfg.nudge_window_start, 8);
        assert_eq!(cfg.nudge_window_end, 21);
        assert_eq!(cfg.max_daily_nudges, 3);
        assert_eq!(cfg.nudge_cooldown_hours, 4);
        assert_eq!(cfg.default_user_id, "user123");
    }

    #[test]
    fn file_values_override_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("heartline.toml");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "execution_mode = \"sequential\"").unwrap();
        writeln!(f, "knowledge_top_k = 5").unwrap();
        writeln!(f, "provider_attempts = 0").unwrap();
        drop(f);

        let cfg = PipelineConfig::load_from(&path).unwrap();
        assert_eq!(cfg.execution_mode, ExecutionMode::Sequential);
        assert_eq!(cfg.knowledge_top_k, 5);
        assert_eq!(cfg.provider_attempts, 1, "attempts are clamped to at least one");
    }

    #[test]
    fn cooldown_is_clamped_to_a_week() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("heartline.toml");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "nudge_cooldown_hours = 9000000000000").unwrap();
        drop(f);

        let cfg = PipelineConfig::load_from(&path).unwrap();
        assert_eq!(cfg.nudge_cooldown_hours, MAX_NUDGE_COOLDOWN_HOURS);
    }

    #[test]
    fn derived_paths_live_under_storage() {
        let cfg = PipelineConfig {
            storage_path: "/tmp/hl".to_string(),
            ..PipelineConfig::default()
        };
        assert!(cfg.checkpoint_path().ends_with("heartline_checkpoints"));
        assert!(cfg.knowledge_path().starts_with("/tmp/hl"));
    }
}
