//! Nominatim / `OpenStreetMap` geocoder client.
//!
//! Nominatim has strict rate limits on the public instance: **1 request
//! per second** maximum. The proximity search issues one request per
//! user query, so no client-side throttling is done here.
//!
//! See <https://nominatim.org/release-docs/develop/api/Search/>

use async_trait::async_trait;
use serde::Deserialize;

use crate::config::NominatimConfig;
use crate::{GeocodeError, GeocodedAddress, Geocoder};

/// Geocoder backed by a Nominatim search endpoint.
#[derive(Debug, Clone)]
pub struct NominatimGeocoder {
    client: reqwest::Client,
    config: NominatimConfig,
}

impl NominatimGeocoder {
    /// Builds a client with the configured user agent and timeout.
    ///
    /// # Errors
    ///
    /// Returns [`GeocodeError::Http`] if the HTTP client cannot be built.
    pub fn new(config: NominatimConfig) -> Result<Self, GeocodeError> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(config.timeout())
            .build()?;

        Ok(Self { client, config })
    }

    #[must_use]
    pub const fn config(&self) -> &NominatimConfig {
        &self.config
    }
}

#[async_trait]
impl Geocoder for NominatimGeocoder {
    async fn geocode(&self, address: &str) -> Result<Option<GeocodedAddress>, GeocodeError> {
        let mut query = vec![("q", address), ("format", "jsonv2"), ("limit", "1")];
        if let Some(codes) = self.config.country_codes.as_deref() {
            query.push(("countrycodes", codes));
        }

        let resp = self
            .client
            .get(&self.config.base_url)
            .query(&query)
            .send()
            .await
            .map_err(map_transport_error)?;

        if resp.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            log::warn!("Nominatim rate limit hit");
            return Err(GeocodeError::RateLimited);
        }

        let body = resp
            .error_for_status()
            .map_err(map_transport_error)?
            .bytes()
            .await
            .map_err(map_transport_error)?;

        let result = parse_response(&body)?;
        if result.is_none() {
            log::debug!("Nominatim found no match for '{address}'");
        }
        Ok(result)
    }
}

fn map_transport_error(e: reqwest::Error) -> GeocodeError {
    if e.is_timeout() {
        log::warn!("Nominatim request timed out: {e}");
        GeocodeError::Timeout
    } else {
        log::warn!("Nominatim request failed: {e}");
        GeocodeError::Http(e)
    }
}

/// One entry of a `format=jsonv2` search response.
///
/// Nominatim sends coordinates as decimal strings.
#[derive(Debug, Deserialize)]
struct SearchHit {
    lat: String,
    lon: String,
    #[serde(default)]
    display_name: Option<String>,
}

impl TryFrom<SearchHit> for GeocodedAddress {
    type Error = GeocodeError;

    fn try_from(hit: SearchHit) -> Result<Self, Self::Error> {
        let coordinate = |name: &str, raw: &str| {
            raw.trim().parse::<f64>().map_err(|e| GeocodeError::Parse {
                message: format!("Bad {name} '{raw}' in Nominatim response: {e}"),
            })
        };

        Ok(Self {
            latitude: coordinate("lat", &hit.lat)?,
            longitude: coordinate("lon", &hit.lon)?,
            display_name: hit.display_name,
        })
    }
}

/// Decodes a Nominatim search response body, keeping the best match.
///
/// # Errors
///
/// Returns [`GeocodeError::Parse`] if the body is not a JSON array of
/// search hits or the first hit has unreadable coordinates.
pub fn parse_response(body: &[u8]) -> Result<Option<GeocodedAddress>, GeocodeError> {
    let hits: Vec<SearchHit> =
        serde_json::from_slice(body).map_err(|e| GeocodeError::Parse {
            message: format!("Unexpected Nominatim response: {e}"),
        })?;

    hits.into_iter().next().map(GeocodedAddress::try_from).transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    const CITY_HALL_HIT: &str = r#"[
        {
            "place_id": 1,
            "lat": "39.9524",
            "lon": "-75.1636",
            "display_name": "City Hall, Philadelphia, PA, USA",
            "importance": 0.6
        },
        { "lat": "40.0", "lon": "-75.0" }
    ]"#;

    #[test]
    fn first_hit_wins_and_extra_fields_are_ignored() {
        let found = parse_response(CITY_HALL_HIT.as_bytes()).unwrap().unwrap();
        assert_eq!(found.point(), phillow_records_models::GeoPoint::new(39.9524, -75.1636));
        assert_eq!(
            found.display_name.as_deref(),
            Some("City Hall, Philadelphia, PA, USA")
        );
    }

    #[test]
    fn no_hits_is_not_an_error() {
        assert!(parse_response(b"[]").unwrap().is_none());
    }

    #[test]
    fn display_name_is_optional() {
        let found = parse_response(br#"[{"lat": " 39.95 ", "lon": "-75.19"}]"#)
            .unwrap()
            .unwrap();
        assert!(found.display_name.is_none());
        assert!((found.latitude - 39.95).abs() < 1e-9);
    }

    #[test]
    fn malformed_bodies_are_parse_errors() {
        for body in [
            r#"{"error": "Unable to geocode"}"#,
            r#"[{"lat": "39.95"}]"#,
            r#"[{"lat": "north", "lon": "-75.19"}]"#,
            r#"[{"lat": 39.95, "lon": -75.19}]"#,
            "not json",
        ] {
            assert!(
                matches!(
                    parse_response(body.as_bytes()),
                    Err(GeocodeError::Parse { .. })
                ),
                "{body}"
            );
        }
    }

    #[test]
    fn builds_client_from_embedded_config() {
        let geocoder = NominatimGeocoder::new(NominatimConfig::embedded()).unwrap();
        assert!(geocoder.config().base_url.contains("nominatim"));
    }
}
