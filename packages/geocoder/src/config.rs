//! Geocoding service configuration.
//!
//! The default Nominatim endpoint is defined in `services/nominatim.toml`
//! and embedded at compile time. Deployments can load a replacement from
//! any TOML string with the same shape.

use std::time::Duration;

use serde::Deserialize;

use crate::GeocodeError;

const NOMINATIM_TOML: &str = include_str!("../services/nominatim.toml");

/// Nominatim endpoint configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NominatimConfig {
    /// Search endpoint (e.g., `"https://nominatim.openstreetmap.org/search"`).
    pub base_url: String,
    /// `User-Agent` header sent with every request; the public instance
    /// rejects anonymous clients.
    pub user_agent: String,
    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Comma-separated ISO country codes to restrict results to.
    #[serde(default)]
    pub country_codes: Option<String>,
}

const fn default_timeout_secs() -> u64 {
    10
}

impl NominatimConfig {
    /// Parses a configuration from TOML.
    ///
    /// # Errors
    ///
    /// Returns [`GeocodeError::Parse`] if the TOML is malformed or missing
    /// required fields.
    pub fn from_toml_str(toml_str: &str) -> Result<Self, GeocodeError> {
        toml::de::from_str(toml_str).map_err(|e| GeocodeError::Parse {
            message: format!("Invalid Nominatim configuration: {e}"),
        })
    }

    /// The embedded default configuration.
    ///
    /// # Panics
    ///
    /// Panics if the embedded TOML is malformed (a compile-time guarantee
    /// since the file ships with the crate).
    #[must_use]
    pub fn embedded() -> Self {
        Self::from_toml_str(NOMINATIM_TOML)
            .unwrap_or_else(|e| panic!("Failed to parse embedded nominatim.toml: {e}"))
    }

    /// Replaces the request timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_secs = timeout.as_secs();
        self
    }

    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for NominatimConfig {
    fn default() -> Self {
        Self::embedded()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedded_config_is_valid() {
        let config = NominatimConfig::embedded();
        assert!(config.base_url.starts_with("https://"));
        assert!(!config.user_agent.is_empty());
        assert_eq!(config.timeout(), Duration::from_secs(10));
        assert_eq!(config.country_codes.as_deref(), Some("us"));
    }

    #[test]
    fn timeout_defaults_when_omitted() {
        let config = NominatimConfig::from_toml_str(
            "base_url = \"http://localhost:8080/search\"\nuser_agent = \"test\"\n",
        )
        .unwrap();
        assert_eq!(config.timeout_secs, 10);
        assert_eq!(config.country_codes, None);
    }

    #[test]
    fn missing_base_url_is_a_parse_error() {
        assert!(matches!(
            NominatimConfig::from_toml_str("user_agent = \"test\"\n"),
            Err(GeocodeError::Parse { .. })
        ));
    }
}
