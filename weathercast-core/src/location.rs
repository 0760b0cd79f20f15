//! Device location: last-known position lookup plus reverse geocoding.
//!
//! The service never asks a provider for a fresh fix. It walks the enabled
//! providers in priority order (precise before coarse), takes the first cached
//! fix, and turns it into a place name.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{config::LocationConfig, error::LocationError};

pub const NOMINATIM_URL: &str = "https://nominatim.openstreetmap.org/reverse";
const REQUEST_TIMEOUT_SECS: u64 = 10;
const USER_AGENT: &str = concat!("weathercast/", env!("CARGO_PKG_VERSION"));

/// A cached position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Fix {
    pub lat: f64,
    pub lon: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recorded_at: Option<DateTime<Utc>>,
}

/// Provider classes, declared in lookup priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ProviderKind {
    Precise,
    Coarse,
}

#[async_trait]
pub trait PositionProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    fn is_enabled(&self) -> bool;

    /// Cached fix only. Must not trigger an active position request.
    async fn last_known(&self) -> Option<Fix>;
}

pub trait PermissionGate: Send + Sync {
    fn is_granted(&self) -> bool;
}

/// Address components from reverse geocoding, coarsest last.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Address {
    pub locality: Option<String>,
    pub sub_admin_area: Option<String>,
    pub admin_area: Option<String>,
    pub country: Option<String>,
}

impl Address {
    /// Locality, falling back to sub-admin then admin area. Empty strings count as missing.
    pub fn place_name(&self) -> Option<&str> {
        [&self.locality, &self.sub_admin_area, &self.admin_area]
            .into_iter()
            .filter_map(|part| part.as_deref())
            .find(|s| !s.trim().is_empty())
    }
}

#[async_trait]
pub trait Geocoder: Send + Sync {
    /// Whether reverse geocoding can be attempted at all.
    fn is_available(&self) -> bool;

    async fn reverse(&self, lat: f64, lon: f64) -> Result<Vec<Address>, LocationError>;
}

/// Permission decided up front (configuration, prompt result).
#[derive(Debug, Clone, Copy)]
pub struct StaticPermission(pub bool);

impl PermissionGate for StaticPermission {
    fn is_granted(&self) -> bool {
        self.0
    }
}

/// Provider backed by a fix some other component cached earlier.
#[derive(Debug, Clone)]
pub struct CachedFixProvider {
    kind: ProviderKind,
    enabled: bool,
    fix: Option<Fix>,
}

impl CachedFixProvider {
    pub fn new(kind: ProviderKind, enabled: bool, fix: Option<Fix>) -> Self {
        Self { kind, enabled, fix }
    }
}

#[async_trait]
impl PositionProvider for CachedFixProvider {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    async fn last_known(&self) -> Option<Fix> {
        self.fix
    }
}

#[derive(Debug, Deserialize)]
struct NominatimResponse {
    address: Option<NominatimAddress>,
}

#[derive(Debug, Deserialize)]
struct NominatimAddress {
    city: Option<String>,
    town: Option<String>,
    village: Option<String>,
    municipality: Option<String>,
    county: Option<String>,
    state_district: Option<String>,
    state: Option<String>,
    country: Option<String>,
}

impl From<NominatimAddress> for Address {
    fn from(a: NominatimAddress) -> Self {
        Address {
            locality: a.city.or(a.town).or(a.village).or(a.municipality),
            sub_admin_area: a.county.or(a.state_district),
            admin_area: a.state,
            country: a.country,
        }
    }
}

/// Reverse geocoding through Nominatim (OpenStreetMap). No API key required.
#[derive(Debug, Clone)]
pub struct NominatimGeocoder {
    client: Option<Client>,
    url: String,
}

impl NominatimGeocoder {
    pub fn new(url: &str) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .user_agent(USER_AGENT)
            .build();

        let client = match client {
            Ok(c) => Some(c),
            Err(e) => {
                warn!(error = %e, "failed to create geocoding client");
                None
            }
        };

        Self {
            client,
            url: url.to_string(),
        }
    }
}

#[async_trait]
impl Geocoder for NominatimGeocoder {
    fn is_available(&self) -> bool {
        self.client.is_some()
    }

    async fn reverse(&self, lat: f64, lon: f64) -> Result<Vec<Address>, LocationError> {
        let client = self.client.as_ref().ok_or(LocationError::GeocodeUnavailable)?;

        let lat = lat.to_string();
        let lon = lon.to_string();
        let response = client
            .get(&self.url)
            .query(&[
                ("lat", lat.as_str()),
                ("lon", lon.as_str()),
                ("format", "json"),
                ("addressdetails", "1"),
                ("zoom", "10"),
            ])
            .send()
            .await
            .map_err(|e| LocationError::GeocodeFailed(e.to_string()))?;

        if !response.status().is_success() {
            return Err(LocationError::GeocodeFailed(format!(
                "status {}",
                response.status()
            )));
        }

        let body: NominatimResponse = response
            .json()
            .await
            .map_err(|e| LocationError::GeocodeFailed(e.to_string()))?;

        Ok(body.address.map(Address::from).into_iter().collect())
    }
}

/// Stateless resolver from device position to place name.
#[derive(Clone)]
pub struct LocationService {
    permission: Arc<dyn PermissionGate>,
    providers: Vec<Arc<dyn PositionProvider>>,
    geocoder: Arc<dyn Geocoder>,
}

impl LocationService {
    pub fn new(
        permission: Arc<dyn PermissionGate>,
        mut providers: Vec<Arc<dyn PositionProvider>>,
        geocoder: Arc<dyn Geocoder>,
    ) -> Self {
        providers.sort_by_key(|p| p.kind());
        Self {
            permission,
            providers,
            geocoder,
        }
    }

    pub fn from_config(cfg: &LocationConfig) -> Self {
        let providers: Vec<Arc<dyn PositionProvider>> = vec![
            Arc::new(CachedFixProvider::new(
                ProviderKind::Precise,
                cfg.precise.is_some(),
                cfg.precise,
            )),
            Arc::new(CachedFixProvider::new(
                ProviderKind::Coarse,
                cfg.coarse.is_some(),
                cfg.coarse,
            )),
        ];

        Self::new(
            Arc::new(StaticPermission(cfg.permission_granted)),
            providers,
            Arc::new(NominatimGeocoder::new(&cfg.geocoder_url)),
        )
    }

    pub fn has_permission(&self) -> bool {
        self.permission.is_granted()
    }

    /// First cached fix across enabled providers, precise first.
    pub async fn last_known_fix(&self) -> Result<Fix, LocationError> {
        if !self.has_permission() {
            return Err(LocationError::NoPermission);
        }

        let enabled: Vec<_> = self.providers.iter().filter(|p| p.is_enabled()).collect();
        if enabled.is_empty() {
            return Err(LocationError::NoProvider);
        }

        for provider in enabled {
            if let Some(fix) = provider.last_known().await {
                debug!(kind = ?provider.kind(), lat = fix.lat, lon = fix.lon, "using cached fix");
                return Ok(fix);
            }
        }

        Err(LocationError::NoFix)
    }

    pub async fn place_name_for(&self, fix: Fix) -> Result<String, LocationError> {
        if !self.geocoder.is_available() {
            return Err(LocationError::GeocodeUnavailable);
        }

        let addresses = self.geocoder.reverse(fix.lat, fix.lon).await?;
        let first = addresses
            .first()
            .ok_or_else(|| LocationError::GeocodeFailed("no address for position".into()))?;

        first
            .place_name()
            .map(str::to_string)
            .ok_or_else(|| LocationError::GeocodeFailed("address has no place name".into()))
    }

    pub async fn resolve_current_city(&self) -> Result<String, LocationError> {
        let fix = self.last_known_fix().await?;
        let city = self.place_name_for(fix).await?;
        info!(%city, "resolved device location");
        Ok(city)
    }
}
