//! Request outcome taxonomy.

use phillow_analytics::AnalyticsError;
use phillow_cache::CacheError;
use phillow_geocoder::GeocodeError;
use phillow_proximity::ProximityError;
use phillow_records::RecordStoreError;
use strum_macros::{AsRefStr, Display};
use thiserror::Error;

/// Coarse outcome class a request layer maps to a status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum ErrorKind {
    /// A required parameter is missing or malformed.
    InvalidRequest,
    /// The request was valid but matched no reference data.
    NotFound,
    /// The geocoding service failed or timed out.
    Upstream,
    /// A computation exceeded its time budget.
    Timeout,
    /// Anything else; not the caller's fault.
    Internal,
}

/// Errors returned by [`InsightsService`](crate::InsightsService)
/// operations.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// A required parameter is missing or malformed.
    #[error("Invalid request: {message}")]
    InvalidRequest {
        /// Which parameter was wrong and why.
        message: String,
    },

    /// No reference data matched.
    #[error("Not found: {message}")]
    NotFound {
        /// What was looked up.
        message: String,
    },

    /// The geocoding service failed.
    #[error("Geocoding failed: {0}")]
    Upstream(#[from] GeocodeError),

    /// A computation did not finish within its time budget.
    #[error("{operation} timed out")]
    Timeout {
        /// The operation that was cut off.
        operation: &'static str,
    },

    /// A computation was cancelled.
    #[error("Computation cancelled")]
    Cancelled,

    /// Reading the reference records failed.
    #[error(transparent)]
    Store(#[from] RecordStoreError),

    /// Refreshing the street info cache failed.
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// The configuration could not be loaded.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of what went wrong.
        message: String,
    },

    /// A background computation task failed.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the failure.
        message: String,
    },
}

impl ServiceError {
    /// The outcome class of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidRequest { .. } => ErrorKind::InvalidRequest,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Upstream(_) => ErrorKind::Upstream,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Cancelled
            | Self::Store(_)
            | Self::Cache(_)
            | Self::Config { .. }
            | Self::Internal { .. } => ErrorKind::Internal,
        }
    }

    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }

    pub(crate) fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }
}

impl From<AnalyticsError> for ServiceError {
    fn from(e: AnalyticsError) -> Self {
        match e {
            AnalyticsError::Cancelled => Self::Cancelled,
            AnalyticsError::InvalidParameter { message } => Self::InvalidRequest { message },
        }
    }
}

impl From<ProximityError> for ServiceError {
    fn from(e: ProximityError) -> Self {
        match e {
            ProximityError::InvalidRadius { .. } => Self::invalid(e.to_string()),
            // The only search center is the geocoder's answer.
            ProximityError::InvalidCoordinate { .. } => Self::Upstream(GeocodeError::Parse {
                message: format!("geocoder returned an unusable point: {e}"),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_keep_invalid_and_not_found_apart() {
        assert_eq!(ServiceError::invalid("x").kind(), ErrorKind::InvalidRequest);
        assert_eq!(ServiceError::not_found("x").kind(), ErrorKind::NotFound);
        assert_ne!(
            ServiceError::invalid("x").kind(),
            ServiceError::not_found("x").kind()
        );
    }

    #[test]
    fn geocoder_timeout_is_upstream() {
        let e = ServiceError::from(GeocodeError::Timeout);
        assert_eq!(e.kind(), ErrorKind::Upstream);
        assert_eq!(e.kind().as_ref(), "upstream");
    }

    #[test]
    fn proximity_errors_split_between_caller_and_upstream() {
        let radius = ServiceError::from(ProximityError::InvalidRadius { radius_km: -1.0 });
        assert_eq!(radius.kind(), ErrorKind::InvalidRequest);

        let center = ServiceError::from(ProximityError::InvalidCoordinate {
            latitude: 91.0,
            longitude: -75.0,
        });
        assert_eq!(center.kind(), ErrorKind::Upstream);
        assert!(matches!(
            center,
            ServiceError::Upstream(GeocodeError::Parse { .. })
        ));
    }

    #[test]
    fn analytics_errors_map_to_request_outcomes() {
        let e = ServiceError::from(AnalyticsError::InvalidParameter {
            message: "crime_type is required".to_string(),
        });
        assert_eq!(e.kind(), ErrorKind::InvalidRequest);
        assert!(matches!(
            ServiceError::from(AnalyticsError::Cancelled),
            ServiceError::Cancelled
        ));
    }

    #[test]
    fn invalid_radius_is_invalid_request() {
        let e = ServiceError::from(ProximityError::InvalidRadius { radius_km: -1.0 });
        assert_eq!(e.kind(), ErrorKind::InvalidRequest);
    }
}
