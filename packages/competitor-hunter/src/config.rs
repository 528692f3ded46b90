//! Environment-driven settings.
//!
//! `Settings::from_env` loads a `.env` file when present, then reads:
//!
//! | Variable | Default |
//! |---|---|
//! | `OPENAI_API_KEY` | required |
//! | `OPENAI_BASE_URL` | provider default |
//! | `OPENAI_MODEL_NAME` | `gpt-4o` |
//! | `HEADLESS_MODE` | `true` |
//! | `DB_PATH` | `data/competitors.db` |
//! | `SCREENSHOT_DIR` | `logs` |
//! | `CHROME_BIN` | auto-detected |
//! | `HUNTER_MAX_SESSIONS` | pipeline default |
//! | `HUNTER_BATCH_CONCURRENCY` | pipeline default |
//! | `HUNTER_FETCH_ATTEMPTS` | pipeline default |

use dotenvy::dotenv;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{ConfigError, ConfigResult};
use crate::security::LlmCredentials;
use crate::types::config::PipelineConfig;

pub const DEFAULT_DB_PATH: &str = "data/competitors.db";
pub const DEFAULT_SCREENSHOT_DIR: &str = "logs";

/// Process settings read from the environment.
#[derive(Debug, Clone)]
pub struct Settings {
    pub llm: LlmCredentials,
    pub headless: bool,
    pub db_path: PathBuf,
    pub screenshot_dir: PathBuf,
    pub chrome_bin: Option<PathBuf>,
    pub max_sessions: Option<usize>,
    pub batch_concurrency: Option<usize>,
    pub fetch_attempts: Option<u32>,
}

fn parse_bool(name: &'static str, value: &str) -> ConfigResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid {
            name,
            value: value.to_string(),
        }),
    }
}

fn parse_positive<T>(name: &'static str, value: &str) -> ConfigResult<T>
where
    T: FromStr + PartialOrd + Default,
{
    match value.trim().parse::<T>() {
        Ok(n) if n > T::default() => Ok(n),
        _ => Err(ConfigError::Invalid {
            name,
            value: value.to_string(),
        }),
    }
}

impl Settings {
    /// Load `.env` if present, then read the process environment.
    pub fn from_env() -> ConfigResult<Self> {
        let _ = dotenv();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build settings from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> ConfigResult<Self> {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let api_key = var("OPENAI_API_KEY").ok_or(ConfigError::Missing("OPENAI_API_KEY"))?;
        let mut llm = LlmCredentials::new(api_key);
        if let Some(model) = var("OPENAI_MODEL_NAME") {
            llm = llm.with_model(model);
        }
        if let Some(base_url) = var("OPENAI_BASE_URL") {
            llm = llm.with_base_url(base_url);
        }

        let headless = match var("HEADLESS_MODE") {
            Some(v) => parse_bool("HEADLESS_MODE", &v)?,
            None => true,
        };

        Ok(Self {
            llm,
            headless,
            db_path: var("DB_PATH").unwrap_or_else(|| DEFAULT_DB_PATH.into()).into(),
            screenshot_dir: var("SCREENSHOT_DIR")
                .unwrap_or_else(|| DEFAULT_SCREENSHOT_DIR.into())
                .into(),
            chrome_bin: var("CHROME_BIN").map(PathBuf::from),
            max_sessions: var("HUNTER_MAX_SESSIONS")
                .map(|v| parse_positive("HUNTER_MAX_SESSIONS", &v))
                .transpose()?,
            batch_concurrency: var("HUNTER_BATCH_CONCURRENCY")
                .map(|v| parse_positive("HUNTER_BATCH_CONCURRENCY", &v))
                .transpose()?,
            fetch_attempts: var("HUNTER_FETCH_ATTEMPTS")
                .map(|v| parse_positive("HUNTER_FETCH_ATTEMPTS", &v))
                .transpose()?,
        })
    }

    /// Pipeline defaults with the environment overrides applied.
    pub fn pipeline_config(&self) -> PipelineConfig {
        let mut config = PipelineConfig::default();
        config.fetch = config.fetch.with_headless(self.headless);
        if let Some(max) = self.max_sessions {
            config.fetch = config.fetch.with_max_sessions(max);
        }
        if let Some(concurrency) = self.batch_concurrency {
            config.batch = config.batch.with_concurrency(concurrency);
        }
        if let Some(attempts) = self.fetch_attempts {
            config.retry.fetch = config.retry.fetch.with_max_attempts(attempts);
        }
        config
    }

    /// Create the database's parent directory and the screenshot directory.
    pub fn ensure_dirs(&self) -> ConfigResult<()> {
        if let Some(parent) = self.db_path.parent().filter(|p| p != &Path::new("")) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::create_dir_all(&self.screenshot_dir)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings(vars: &[(&str, &str)]) -> ConfigResult<Settings> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Settings::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_defaults() {
        let s = settings(&[("OPENAI_API_KEY", "sk-test")]).unwrap();
        assert_eq!(s.llm.model, "gpt-4o");
        assert!(s.llm.base_url.is_none());
        assert!(s.headless);
        assert_eq!(s.db_path, PathBuf::from("data/competitors.db"));
        assert_eq!(s.screenshot_dir, PathBuf::from("logs"));
        assert!(s.chrome_bin.is_none());
    }

    #[test]
    fn test_missing_api_key() {
        let err = settings(&[("HEADLESS_MODE", "false")]).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("OPENAI_API_KEY")));
    }

    #[test]
    fn test_overrides_reach_pipeline_config() {
        let s = settings(&[
            ("OPENAI_API_KEY", "sk-test"),
            ("OPENAI_MODEL_NAME", "gpt-4o-mini"),
            ("HEADLESS_MODE", "False"),
            ("HUNTER_MAX_SESSIONS", "3"),
            ("HUNTER_BATCH_CONCURRENCY", "6"),
            ("HUNTER_FETCH_ATTEMPTS", "5"),
        ])
        .unwrap();

        let config = s.pipeline_config();
        assert_eq!(s.llm.model, "gpt-4o-mini");
        assert!(!config.fetch.headless);
        assert_eq!(config.fetch.max_sessions, 3);
        assert_eq!(config.batch.concurrency, 6);
        assert_eq!(config.retry.fetch.max_attempts, 5);
    }

    #[test]
    fn test_invalid_values() {
        let err = settings(&[("OPENAI_API_KEY", "k"), ("HEADLESS_MODE", "maybe")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "HEADLESS_MODE", .. }));

        let err = settings(&[("OPENAI_API_KEY", "k"), ("HUNTER_MAX_SESSIONS", "0")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "HUNTER_MAX_SESSIONS", .. }));
    }

    #[test]
    fn test_ensure_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let mut s = settings(&[("OPENAI_API_KEY", "k")]).unwrap();
        s.db_path = dir.path().join("data").join("competitors.db");
        s.screenshot_dir = dir.path().join("shots");

        s.ensure_dirs().unwrap();
        assert!(dir.path().join("data").is_dir());
        assert!(dir.path().join("shots").is_dir());
    }
}
