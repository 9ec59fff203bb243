//! Configuration types.

use std::path::PathBuf;
use std::time::Duration;

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Directory for uploaded datasets, rendered charts, and reports.
    pub data_dir: PathBuf,
    /// Maximum number of dataset columns offered on a single menu.
    pub max_menu_columns: usize,
    /// Distinct-value ceiling under which a numeric column is also offered
    /// as categorical (ordinal-coded proxy).
    pub categorical_cardinality: usize,
    /// Timeout applied to every LLM call before falling back to templates.
    pub llm_timeout: Duration,
    /// Session idle timeout (sessions are pruned after this duration).
    pub session_idle_timeout: Duration,
    /// Maximum projects listed per user.
    pub project_list_limit: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            max_menu_columns: 30,
            categorical_cardinality: 10,
            llm_timeout: Duration::from_secs(30),
            session_idle_timeout: Duration::from_secs(3600), // 1 hour
            project_list_limit: 10,
        }
    }
}

impl EngineConfig {
    /// Build configuration from environment variables, falling back to
    /// defaults for anything unset.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(dir) = std::env::var("QUANTABOT_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        if let Some(secs) = env_u64("QUANTABOT_LLM_TIMEOUT_SECS") {
            config.llm_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = env_u64("QUANTABOT_SESSION_IDLE_SECS") {
            config.session_idle_timeout = Duration::from_secs(secs);
        }
        config
    }
}

fn env_u64(key: &str) -> Option<u64> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = EngineConfig::default();
        assert_eq!(config.max_menu_columns, 30);
        assert_eq!(config.categorical_cardinality, 10);
        assert!(config.llm_timeout >= Duration::from_secs(5));
    }
}
