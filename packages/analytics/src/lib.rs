#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Aggregation and scoring engine for property and crime data.
//!
//! Every public function is a pure computation over an immutable
//! [`RecordSet`](phillow_records_models::RecordSet) snapshot:
//!
//! - [`normalize`]: street-name extraction used as the join key.
//! - [`aggregate`]: per-street and per-zip grouping of property and crime
//!   facts.
//! - [`scoring`]: home-finder, safety, and investment scores.
//! - [`queries`]: reference lookups (per-capita rates, safe high-value
//!   properties, zip price averages).
//!
//! Long-running functions take a [`CancellationToken`] and stop with
//! [`AnalyticsError::Cancelled`] soon after it fires.

pub mod aggregate;
pub mod normalize;
pub mod queries;
pub mod scoring;

use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Errors that can occur during analytics operations.
#[derive(Debug, Error)]
pub enum AnalyticsError {
    /// The computation was cancelled before it finished.
    #[error("Computation cancelled")]
    Cancelled,

    /// A required parameter is missing or out of range.
    #[error("Invalid parameter: {message}")]
    InvalidParameter {
        /// Description of what went wrong.
        message: String,
    },
}

/// How many records a scan processes between cancellation checks.
const CANCEL_CHECK_INTERVAL: usize = 4096;

/// Returns [`AnalyticsError::Cancelled`] if `cancel` has fired.
///
/// # Errors
///
/// Returns [`AnalyticsError::Cancelled`] once the token is cancelled.
pub fn check_cancelled(cancel: &CancellationToken) -> Result<(), AnalyticsError> {
    if cancel.is_cancelled() {
        return Err(AnalyticsError::Cancelled);
    }
    Ok(())
}

/// Checks `cancel` every [`CANCEL_CHECK_INTERVAL`] iterations of a scan.
fn check_every(i: usize, cancel: &CancellationToken) -> Result<(), AnalyticsError> {
    if i % CANCEL_CHECK_INTERVAL == 0 {
        check_cancelled(cancel)?;
    }
    Ok(())
}

/// Rounds to `places` decimal places, halves away from zero.
#[must_use]
pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

/// Rounds currency amounts and scores.
#[must_use]
pub fn round2(value: f64) -> f64 {
    round_to(value, 2)
}

/// Rounds per-capita rates.
#[must_use]
pub fn round4(value: f64) -> f64 {
    round_to(value, 4)
}

/// Converts a count to `f64` for ratio math.
#[allow(clippy::cast_precision_loss)]
const fn as_f64(count: u64) -> f64 {
    count as f64
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounds_half_away_from_zero() {
        assert!((round2(1.005_000_1) - 1.01).abs() < 1e-12);
        assert!((round2(-1.255_000_1) - -1.26).abs() < 1e-12);
        assert!((round4(5778.0 / 53679.0) - 0.1076).abs() < 1e-12);
    }

    #[test]
    fn cancelled_token_stops() {
        let cancel = CancellationToken::new();
        assert!(check_cancelled(&cancel).is_ok());
        cancel.cancel();
        assert!(matches!(
            check_cancelled(&cancel),
            Err(AnalyticsError::Cancelled)
        ));
    }
}
