use crate::photometa_core::error::{PhotometaError, Result};
use crate::photometa_core::photo::Location;
use reqwest::blocking::Client;
use serde::Deserialize;
use std::time::Duration;

pub const DEFAULT_ENDPOINT: &str = "https://nominatim.openstreetmap.org";
pub const DEFAULT_USER_AGENT: &str = concat!("photometa/", env!("CARGO_PKG_VERSION"));

/// Reverse geocoding: coordinates to a place.
///
/// Implementations may block. Callers treat every error as "no location"; the
/// pipeline bounds how long it waits, but not how long the call runs.
/// Implementations should time out on their own: a call that never returns
/// holds one of the pipeline's lookup slots for good.
pub trait GeoLocationResolver: Send + Sync {
    fn resolve(&self, latitude: f64, longitude: f64) -> Result<Location>;
}

impl<F> GeoLocationResolver for F
where
    F: Fn(f64, f64) -> Result<Location> + Send + Sync,
{
    fn resolve(&self, latitude: f64, longitude: f64) -> Result<Location> {
        self(latitude, longitude)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct NominatimAddress {
    country: Option<String>,
    state: Option<String>,
    province: Option<String>,
    city: Option<String>,
    town: Option<String>,
    village: Option<String>,
    postcode: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct NominatimResponse {
    address: NominatimAddress,
    display_name: Option<String>,
    timezone: Option<String>,
    /// Numeric in practice, but some mirrors send a string.
    place_id: Option<serde_json::Value>,
    error: Option<String>,
}

impl TryFrom<NominatimResponse> for Location {
    type Error = PhotometaError;

    fn try_from(response: NominatimResponse) -> Result<Self> {
        if let Some(error) = response.error {
            return Err(PhotometaError::Geocode(error));
        }

        let address = response.address;
        let place_id = response.place_id.and_then(|id| match id {
            serde_json::Value::String(s) => Some(s),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        });

        Ok(Location {
            country: address.country,
            state: address.state.or(address.province),
            city: address.city.or(address.town).or(address.village),
            address: response.display_name,
            postal_code: address.postcode,
            timezone: response.timezone,
            place_id,
        })
    }
}

/// Resolver backed by a Nominatim `/reverse` endpoint.
pub struct NominatimResolver {
    client: Client,
    endpoint: String,
}

impl NominatimResolver {
    pub fn new(endpoint: &str, timeout: Duration, user_agent: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .user_agent(user_agent)
            .build()?;

        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
        })
    }
}

impl GeoLocationResolver for NominatimResolver {
    fn resolve(&self, latitude: f64, longitude: f64) -> Result<Location> {
        let url = format!("{}/reverse", self.endpoint);
        log::debug!("Reverse geocoding {}, {} via {}", latitude, longitude, url);

        let response: NominatimResponse = self
            .client
            .get(&url)
            .query(&[
                ("format", "json".to_string()),
                ("lat", latitude.to_string()),
                ("lon", longitude.to_string()),
                ("zoom", "18".to_string()),
                ("addressdetails", "1".to_string()),
            ])
            .send()?
            .error_for_status()?
            .json()?;

        Location::try_from(response)
    }
}
