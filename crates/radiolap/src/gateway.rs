//! Session data gateway.
//!
//! Typed access to the public session-data HTTP API. Every response is a
//! JSON array of flat records; responses are memoized in a
//! [`ResponseCache`] keyed by endpoint and query parameters.
//!
//! The gateway does not retry: a non-success status or network failure is
//! returned to the caller as-is. Records are decoded one at a time; a row
//! that does not fit the data model is logged and skipped.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{Client, Url};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use crate::cache::{CacheKey, ResponseCache};
use crate::config::GatewayConfig;
use crate::error::{Error, Result};
use crate::model::{
    CarDataSample, Driver, Lap, Meeting, PitStop, PositionSample, RadioMessage, Session, Stint,
    WeatherSample,
};

/// Upstream collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    /// Race weekends.
    Meetings,
    /// Sessions within a meeting.
    Sessions,
    /// Drivers entered in a session.
    Drivers,
    /// Lap records.
    Laps,
    /// Position samples.
    Position,
    /// Tire stints.
    Stints,
    /// Pit stops.
    Pit,
    /// Team radio recordings.
    TeamRadio,
    /// Weather samples.
    Weather,
    /// Car telemetry.
    CarData,
}

impl Endpoint {
    /// URL path segment under the API base.
    #[must_use]
    pub fn path(self) -> &'static str {
        match self {
            Self::Meetings => "meetings",
            Self::Sessions => "sessions",
            Self::Drivers => "drivers",
            Self::Laps => "laps",
            Self::Position => "position",
            Self::Stints => "stints",
            Self::Pit => "pit",
            Self::TeamRadio => "team_radio",
            Self::Weather => "weather",
            Self::CarData => "car_data",
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

/// Performs a GET and returns the decoded JSON body.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Fetch `url`. Non-success statuses are errors.
    async fn get_json(&self, url: &str) -> Result<Value>;
}

/// [`Transport`] backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    /// Build a client with the given request timeout and user agent.
    ///
    /// # Errors
    ///
    /// Returns an error if the TLS backend cannot be initialized.
    pub fn new(timeout: Duration, user_agent: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .map_err(|source| Error::Http {
                url: String::new(),
                source,
            })?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get_json(&self, url: &str) -> Result<Value> {
        let http_err = |source| Error::Http {
            url: url.to_string(),
            source,
        };
        let response = self.client.get(url).send().await.map_err(http_err)?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::UpstreamStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        let body = response.bytes().await.map_err(http_err)?;
        serde_json::from_slice(&body)
            .map_err(|e| Error::unexpected_payload(url, format!("invalid JSON: {e}")))
    }
}

/// Cached, typed client for the session-data API.
///
/// Fetch methods take `&mut self`, so a gateway never has more than one
/// request in flight.
#[derive(Debug)]
pub struct SessionGateway<T = HttpTransport> {
    base_url: String,
    transport: T,
    cache: ResponseCache,
}

impl SessionGateway<HttpTransport> {
    /// Build an HTTP gateway from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn from_config(config: &GatewayConfig) -> Result<Self> {
        let transport = HttpTransport::new(config.timeout(), &config.user_agent)?;
        Ok(Self::new(
            config.base_url.clone(),
            transport,
            ResponseCache::new(config.cache_capacity()?),
        ))
    }
}

impl<T: Transport> SessionGateway<T> {
    /// Create a gateway over an arbitrary transport.
    pub fn new(base_url: impl Into<String>, transport: T, cache: ResponseCache) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            base_url,
            transport,
            cache,
        }
    }

    /// The response cache.
    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    /// The underlying transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Absolute URL for a request key.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidUrl`] if the base URL is malformed.
    pub fn url_for(&self, key: &CacheKey) -> Result<Url> {
        let raw = format!("{}/{}", self.base_url, key.endpoint().path());
        let params = key.params().iter().map(|(name, value)| (*name, value.as_str()));
        Url::parse_with_params(&raw, params).map_err(|e| Error::InvalidUrl {
            url: raw,
            message: e.to_string(),
        })
    }

    /// Fetch the raw record array for `key`, consulting the cache first.
    ///
    /// # Errors
    ///
    /// Returns the transport's error, or [`Error::UnexpectedPayload`] when
    /// the body is not a JSON array.
    pub async fn fetch_raw(&mut self, key: CacheKey) -> Result<Value> {
        if let Some(value) = self.cache.get(&key) {
            debug!(%key, "served from cache");
            return Ok(value);
        }

        let url = self.url_for(&key)?;
        debug!(%url, "fetching");
        let value = self.transport.get_json(url.as_str()).await?;
        if !value.is_array() {
            return Err(Error::unexpected_payload(url, "expected a JSON array"));
        }
        self.cache.insert(key, value.clone());
        Ok(value)
    }

    /// Fetch and decode the records for `key`.
    ///
    /// Rows that do not decode into `R` are dropped with a warning; the
    /// remaining rows keep their upstream order.
    ///
    /// # Errors
    ///
    /// Propagates any error from [`Self::fetch_raw`].
    pub async fn fetch<R: DeserializeOwned>(&mut self, key: CacheKey) -> Result<Vec<R>> {
        let endpoint = key.endpoint();
        let Value::Array(rows) = self.fetch_raw(key).await? else {
            return Ok(Vec::new());
        };
        Ok(decode_rows(endpoint, rows))
    }

    /// Meetings held in `year`.
    ///
    /// # Errors
    ///
    /// Propagates fetch and decode failures.
    pub async fn meetings(&mut self, year: i32) -> Result<Vec<Meeting>> {
        self.fetch(CacheKey::new(Endpoint::Meetings).with("year", year))
            .await
    }

    /// A single meeting.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the key is unknown upstream.
    pub async fn meeting(&mut self, meeting_key: u32) -> Result<Meeting> {
        let key = CacheKey::new(Endpoint::Meetings).with("meeting_key", meeting_key);
        first_or_not_found(self.fetch(key).await?, || format!("meeting {meeting_key}"))
    }

    /// Sessions of a meeting.
    ///
    /// # Errors
    ///
    /// Propagates fetch and decode failures.
    pub async fn sessions(&mut self, meeting_key: u32) -> Result<Vec<Session>> {
        self.fetch(CacheKey::new(Endpoint::Sessions).with("meeting_key", meeting_key))
            .await
    }

    /// A single session.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the key is unknown upstream.
    pub async fn session(&mut self, session_key: u32) -> Result<Session> {
        let key = CacheKey::new(Endpoint::Sessions).with("session_key", session_key);
        first_or_not_found(self.fetch(key).await?, || format!("session {session_key}"))
    }

    /// Drivers entered in a session.
    ///
    /// # Errors
    ///
    /// Propagates fetch and decode failures.
    pub async fn drivers(&mut self, session_key: u32) -> Result<Vec<Driver>> {
        self.fetch(CacheKey::new(Endpoint::Drivers).with("session_key", session_key))
            .await
    }

    /// One driver of a session, looked up in the session's driver list.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the driver did not take part.
    pub async fn driver(&mut self, session_key: u32, driver_number: u32) -> Result<Driver> {
        self.drivers(session_key)
            .await?
            .into_iter()
            .find(|d| d.driver_number == driver_number)
            .ok_or_else(|| {
                Error::not_found(format!("driver {driver_number} in session {session_key}"))
            })
    }

    /// Laps of one driver.
    ///
    /// # Errors
    ///
    /// Propagates fetch and decode failures.
    pub async fn laps(&mut self, session_key: u32, driver_number: u32) -> Result<Vec<Lap>> {
        self.fetch(driver_key(Endpoint::Laps, session_key, driver_number))
            .await
    }

    /// Position samples of one driver.
    ///
    /// # Errors
    ///
    /// Propagates fetch and decode failures.
    pub async fn positions(
        &mut self,
        session_key: u32,
        driver_number: u32,
    ) -> Result<Vec<PositionSample>> {
        self.fetch(driver_key(Endpoint::Position, session_key, driver_number))
            .await
    }

    /// Tire stints of one driver.
    ///
    /// # Errors
    ///
    /// Propagates fetch and decode failures.
    pub async fn stints(&mut self, session_key: u32, driver_number: u32) -> Result<Vec<Stint>> {
        self.fetch(driver_key(Endpoint::Stints, session_key, driver_number))
            .await
    }

    /// Pit stops of one driver.
    ///
    /// # Errors
    ///
    /// Propagates fetch and decode failures.
    pub async fn pit_stops(&mut self, session_key: u32, driver_number: u32) -> Result<Vec<PitStop>> {
        self.fetch(driver_key(Endpoint::Pit, session_key, driver_number))
            .await
    }

    /// Team radio of a session, optionally for one driver.
    ///
    /// # Errors
    ///
    /// Propagates fetch and decode failures.
    pub async fn team_radio(
        &mut self,
        session_key: u32,
        driver_number: Option<u32>,
    ) -> Result<Vec<RadioMessage>> {
        let key = match driver_number {
            Some(driver_number) => driver_key(Endpoint::TeamRadio, session_key, driver_number),
            None => CacheKey::new(Endpoint::TeamRadio).with("session_key", session_key),
        };
        self.fetch(key).await
    }

    /// Weather samples over a meeting.
    ///
    /// # Errors
    ///
    /// Propagates fetch and decode failures.
    pub async fn weather(&mut self, meeting_key: u32) -> Result<Vec<WeatherSample>> {
        self.fetch(CacheKey::new(Endpoint::Weather).with("meeting_key", meeting_key))
            .await
    }

    /// Car telemetry of one driver at an instant.
    ///
    /// # Errors
    ///
    /// Propagates fetch and decode failures.
    pub async fn car_data_at(
        &mut self,
        session_key: u32,
        driver_number: u32,
        at: DateTime<Utc>,
    ) -> Result<Vec<CarDataSample>> {
        let key = driver_key(Endpoint::CarData, session_key, driver_number)
            .with("date", at.to_rfc3339_opts(SecondsFormat::AutoSi, true));
        self.fetch(key).await
    }
}

fn driver_key(endpoint: Endpoint, session_key: u32, driver_number: u32) -> CacheKey {
    CacheKey::new(endpoint)
        .with("session_key", session_key)
        .with("driver_number", driver_number)
}

fn decode_rows<R: DeserializeOwned>(endpoint: Endpoint, rows: Vec<Value>) -> Vec<R> {
    let total = rows.len();
    let records: Vec<R> = rows
        .into_iter()
        .enumerate()
        .filter_map(|(index, row)| match serde_json::from_value(row) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(%endpoint, index, error = %e, "skipping malformed record");
                None
            }
        })
        .collect();
    if records.len() < total {
        debug!(%endpoint, kept = records.len(), total, "decoded with skipped rows");
    }
    records
}

fn first_or_not_found<R>(records: Vec<R>, what: impl FnOnce() -> String) -> Result<R> {
    records
        .into_iter()
        .next()
        .ok_or_else(|| Error::not_found(what()))
}
