//! Service configuration.
//!
//! Loaded from a TOML file whose path comes from the caller (usually the
//! `--config` flag) or the `PHILLOW_CONFIG` environment variable. Every
//! field has a default, so an empty file is a valid configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::NaiveDate;
use phillow_analytics_models::ReportingWindow;
use serde::{Deserialize, Serialize};

use crate::ServiceError;

/// Environment variable naming the configuration file.
pub const CONFIG_ENV_VAR: &str = "PHILLOW_CONFIG";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Window the street-level crime aggregates count incidents in.
    pub crime_window: ReportingWindow,
    /// Reference date for the investment score; today when unset.
    pub as_of: Option<NaiveDate>,
    pub safe_properties_limit: usize,
    pub lowest_crime_zips_limit: usize,
    /// Zips must have strictly more residents than this to be listed by
    /// the populated-zip price view.
    pub populated_zip_threshold: u64,
    pub computation_timeout_secs: u64,
    pub geocode_timeout_secs: u64,
    /// When set, the street info cache refreshes on this interval.
    pub cache_refresh_interval_secs: Option<u64>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            crime_window: ReportingWindow::default(),
            as_of: None,
            safe_properties_limit: 100,
            lowest_crime_zips_limit: 10,
            populated_zip_threshold: 10_000,
            computation_timeout_secs: 120,
            geocode_timeout_secs: 10,
            cache_refresh_interval_secs: None,
        }
    }
}

impl ServiceConfig {
    /// Parses a configuration from TOML.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Config`] if the TOML is malformed or the
    /// crime window is empty.
    pub fn from_toml_str(toml_str: &str) -> Result<Self, ServiceError> {
        let config: Self = toml::de::from_str(toml_str).map_err(|e| ServiceError::Config {
            message: e.to_string(),
        })?;

        if config.crime_window.start >= config.crime_window.end {
            return Err(ServiceError::Config {
                message: format!(
                    "crime_window start {} must be before end {}",
                    config.crime_window.start, config.crime_window.end
                ),
            });
        }

        Ok(config)
    }

    /// Loads the configuration from `path`, else from the file named by
    /// `PHILLOW_CONFIG`, else returns the defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Config`] if the file cannot be read or
    /// parsed.
    pub fn load(path: Option<&Path>) -> Result<Self, ServiceError> {
        let path = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var(CONFIG_ENV_VAR).ok().map(PathBuf::from));

        let Some(path) = path else {
            log::debug!("No configuration file given, using defaults");
            return Ok(Self::default());
        };

        log::info!("Loading configuration from {}", path.display());
        let contents = std::fs::read_to_string(&path).map_err(|e| ServiceError::Config {
            message: format!("Failed to read {}: {e}", path.display()),
        })?;
        Self::from_toml_str(&contents)
    }

    #[must_use]
    pub const fn computation_timeout(&self) -> Duration {
        Duration::from_secs(self.computation_timeout_secs)
    }

    #[must_use]
    pub const fn geocode_timeout(&self) -> Duration {
        Duration::from_secs(self.geocode_timeout_secs)
    }

    #[must_use]
    pub fn cache_refresh_interval(&self) -> Option<Duration> {
        self.cache_refresh_interval_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }

    /// The investment score reference date.
    #[must_use]
    pub fn as_of_date(&self) -> NaiveDate {
        self.as_of
            .unwrap_or_else(|| chrono::Local::now().date_naive())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_uses_defaults() {
        let config = ServiceConfig::from_toml_str("").unwrap();
        assert_eq!(config, ServiceConfig::default());
        assert_eq!(config.crime_window, ReportingWindow::default());
        assert_eq!(config.safe_properties_limit, 100);
        assert_eq!(config.computation_timeout(), Duration::from_secs(120));
        assert_eq!(config.cache_refresh_interval(), None);
    }

    #[test]
    fn parses_window_and_overrides() {
        let config = ServiceConfig::from_toml_str(
            r#"
            as_of = "2023-06-01"
            lowest_crime_zips_limit = 5
            cache_refresh_interval_secs = 3600

            [crime_window]
            start = "2019-01-01"
            end = "2020-01-01"
            "#,
        )
        .unwrap();

        assert_eq!(config.crime_window, ReportingWindow::calendar_year(2019).unwrap());
        assert_eq!(config.as_of_date(), NaiveDate::from_ymd_opt(2023, 6, 1).unwrap());
        assert_eq!(config.lowest_crime_zips_limit, 5);
        assert_eq!(config.cache_refresh_interval(), Some(Duration::from_secs(3600)));
        assert_eq!(config.populated_zip_threshold, 10_000);
    }

    #[test]
    fn rejects_empty_window() {
        let result = ServiceConfig::from_toml_str(
            r#"
            [crime_window]
            start = "2020-01-01"
            end = "2020-01-01"
            "#,
        );
        assert!(matches!(result, Err(ServiceError::Config { .. })));
    }

    #[test]
    fn missing_file_is_config_error() {
        let result = ServiceConfig::load(Some(Path::new("/nonexistent/phillow.toml")));
        assert!(matches!(result, Err(ServiceError::Config { .. })));
    }
}
