//! Add-on configuration.
//!
//! Read from the Home Assistant options file (`/data/options.json` unless
//! `SPOTCHECK_OPTIONS` points elsewhere). Every field has a default, so a
//! missing file or missing keys are fine; a file that does not parse is not.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::{fs, path::Path, path::PathBuf, time::Duration};

pub const DEFAULT_OPTIONS_PATH: &str = "/data/options.json";

/// Longest accepted gap between automatic passes: one week.
pub const MAX_AUTO_CHECK_INTERVAL_MINUTES: u64 = 7 * 24 * 60;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub database_path: PathBuf,
    pub home_assistant_url: String,
    /// Bearer token for the Home Assistant API; normally `SUPERVISOR_TOKEN`.
    #[serde(skip_serializing)]
    pub supervisor_token: Option<String>,
    #[serde(skip_serializing)]
    pub gemini_api_key: Option<String>,
    pub gemini_model: String,
    pub image_fetch_timeout_secs: u64,
    pub classify_timeout_secs: u64,
    pub max_concurrent_checks: usize,
    /// Minutes between automatic passes over all spots; 0 disables them.
    pub auto_check_interval_minutes: u64,
    pub history_limit: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("/data/spotcheck.sqlite3"),
            home_assistant_url: "http://supervisor/core/api".into(),
            supervisor_token: None,
            gemini_api_key: None,
            gemini_model: "gemini-2.0-flash".into(),
            image_fetch_timeout_secs: 15,
            classify_timeout_secs: 30,
            max_concurrent_checks: 2,
            auto_check_interval_minutes: 0,
            history_limit: 50,
        }
    }
}

impl Settings {
    /// Options file, then environment overrides, then validation.
    pub fn load() -> Result<Self> {
        let path = std::env::var_os("SPOTCHECK_OPTIONS")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_OPTIONS_PATH));

        let mut settings = Self::from_file(&path)?;
        settings.apply_overrides(|key| std::env::var(key).ok());
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read options from {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("Invalid options in {}", path.display()))
    }

    /// Apply environment-style overrides; `lookup` is `std::env::var` in production.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(token) = non_empty("SUPERVISOR_TOKEN") {
            self.supervisor_token = Some(token);
        }
        if let Some(key) = non_empty("GEMINI_API_KEY") {
            self.gemini_api_key = Some(key);
        }
        if let Some(path) = non_empty("SPOTCHECK_DB_PATH") {
            self.database_path = PathBuf::from(path);
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent_checks == 0 {
            bail!("max_concurrent_checks must be at least 1");
        }
        if self.image_fetch_timeout_secs == 0 || self.classify_timeout_secs == 0 {
            bail!("adapter timeouts must be at least one second");
        }
        if self.auto_check_interval_minutes > MAX_AUTO_CHECK_INTERVAL_MINUTES {
            bail!(
                "auto_check_interval_minutes must be at most {MAX_AUTO_CHECK_INTERVAL_MINUTES}, got {}",
                self.auto_check_interval_minutes
            );
        }
        Ok(())
    }

    pub fn image_fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.image_fetch_timeout_secs)
    }

    pub fn classify_timeout(&self) -> Duration {
        Duration::from_secs(self.classify_timeout_secs)
    }

    pub fn auto_check_interval(&self) -> Option<Duration> {
        (self.auto_check_interval_minutes > 0)
            .then(|| Duration::from_secs(self.auto_check_interval_minutes.saturating_mul(60)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::HashMap;

    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let settings = Settings::from_file(&dir.path().join("options.json")).unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.auto_check_interval(), None);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("options.json");
        fs::write(
            &path,
            r#"{"max_concurrent_checks": 4, "auto_check_interval_minutes": 15}"#,
        )
        .unwrap();

        let settings = Settings::from_file(&path).unwrap();
        assert_eq!(settings.max_concurrent_checks, 4);
        assert_eq!(
            settings.auto_check_interval(),
            Some(Duration::from_secs(900))
        );
        assert_eq!(settings.classify_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn invalid_file_is_an_error_naming_the_path() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("options.json");
        fs::write(&path, "{not json").unwrap();

        let err = Settings::from_file(&path).unwrap_err();
        assert!(err.to_string().contains("options.json"));
    }

    #[test]
    fn environment_overrides_win_and_blanks_are_ignored() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("SUPERVISOR_TOKEN", "abc"),
            ("GEMINI_API_KEY", "  "),
            ("SPOTCHECK_DB_PATH", "/tmp/spots.sqlite3"),
        ]);
        let mut settings = Settings::default();
        settings.apply_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(settings.supervisor_token.as_deref(), Some("abc"));
        assert_eq!(settings.gemini_api_key, None);
        assert_eq!(settings.database_path, PathBuf::from("/tmp/spots.sqlite3"));
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        let settings = Settings {
            max_concurrent_checks: 0,
            ..Settings::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn auto_check_interval_is_bounded() {
        let week = Settings {
            auto_check_interval_minutes: MAX_AUTO_CHECK_INTERVAL_MINUTES,
            ..Settings::default()
        };
        assert!(week.validate().is_ok());
        assert_eq!(
            week.auto_check_interval(),
            Some(Duration::from_secs(7 * 24 * 60 * 60))
        );

        let absurd = Settings {
            auto_check_interval_minutes: u64::MAX,
            ..Settings::default()
        };
        assert!(absurd.validate().is_err());
        // The accessor itself never overflows.
        assert!(absurd.auto_check_interval().is_some());

        assert_eq!(Settings::default().auto_check_interval(), None);
    }
}
