use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::ClientError;

const EARTH_RADIUS_KM: f64 = 6_371.0;

pub const ADDRESS_UNAVAILABLE: &str = "Address not available";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

pub fn haversine_km(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let delta_lat = (b.lat - a.lat).to_radians();
    let delta_lng = (b.lng - a.lng).to_radians();

    let sin_lat = (delta_lat / 2.0).sin();
    let sin_lng = (delta_lng / 2.0).sin();

    let haversine = sin_lat * sin_lat + lat1.cos() * lat2.cos() * sin_lng * sin_lng;
    let central_angle = 2.0 * haversine.sqrt().asin();

    EARTH_RADIUS_KM * central_angle
}

/// Reverse geocoding: coordinates to a human-readable address.
#[async_trait]
pub trait Geocoder: Send + Sync {
    async fn reverse(&self, point: GeoPoint) -> Result<Option<String>, ClientError>;
}

#[derive(Deserialize)]
struct GeocodeResponse {
    #[serde(default)]
    results: Vec<GeocodeResult>,
}

#[derive(Deserialize)]
struct GeocodeResult {
    formatted_address: Option<String>,
}

/// Google Geocoding API client.
pub struct GoogleGeocoder {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl GoogleGeocoder {
    pub fn new(
        http: reqwest::Client,
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            http,
            endpoint: endpoint.into(),
            api_key: api_key.into(),
        }
    }
}

#[async_trait]
impl Geocoder for GoogleGeocoder {
    async fn reverse(&self, point: GeoPoint) -> Result<Option<String>, ClientError> {
        let latlng = format!("{},{}", point.lat, point.lng);
        let response = self
            .http
            .get(&self.endpoint)
            .query(&[("latlng", latlng.as_str()), ("key", self.api_key.as_str())])
            .send()
            .await?
            .error_for_status()?;

        let body: GeocodeResponse = response.json().await?;
        Ok(body
            .results
            .into_iter()
            .next()
            .and_then(|result| result.formatted_address))
    }
}

/// Used when no maps key is configured.
pub struct NoGeocoder;

#[async_trait]
impl Geocoder for NoGeocoder {
    async fn reverse(&self, _point: GeoPoint) -> Result<Option<String>, ClientError> {
        Ok(None)
    }
}

/// Resolves an address, degrading to "Address not available" on any failure.
pub async fn address_or_unavailable(geocoder: &dyn Geocoder, point: GeoPoint) -> String {
    match geocoder.reverse(point).await {
        Ok(Some(address)) => address,
        Ok(None) => ADDRESS_UNAVAILABLE.to_string(),
        Err(err) => {
            warn!(error = %err, lat = point.lat, lng = point.lng, "reverse geocoding failed");
            ADDRESS_UNAVAILABLE.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::{address_or_unavailable, haversine_km, GeoPoint, Geocoder, ADDRESS_UNAVAILABLE};
    use crate::error::ClientError;

    struct FailingGeocoder;

    #[async_trait]
    impl Geocoder for FailingGeocoder {
        async fn reverse(&self, _point: GeoPoint) -> Result<Option<String>, ClientError> {
            Err(ClientError::Transport("offline".to_string()))
        }
    }

    #[test]
    fn zero_distance_for_same_point() {
        let p = GeoPoint {
            lat: 53.5511,
            lng: 9.9937,
        };
        let distance = haversine_km(&p, &p);
        assert!(distance < 1e-9);
    }

    #[test]
    fn london_to_paris_is_around_343_km() {
        let london = GeoPoint {
            lat: 51.5074,
            lng: -0.1278,
        };
        let paris = GeoPoint {
            lat: 48.8566,
            lng: 2.3522,
        };
        let distance = haversine_km(&london, &paris);
        assert!((distance - 343.0).abs() < 5.0);
    }

    #[tokio::test]
    async fn geocoding_failure_degrades_to_placeholder() {
        let address = address_or_unavailable(
            &FailingGeocoder,
            GeoPoint {
                lat: 40.7,
                lng: -74.0,
            },
        )
        .await;
        assert_eq!(address, ADDRESS_UNAVAILABLE);
    }
}
