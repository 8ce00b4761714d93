//! Request-scoped bundle of fetched records.
//!
//! A [`RequestContext`] holds everything one user action needs for a single
//! driver in a single session. It is built once, up front, and passed by
//! reference to the report builder and the narrative prompts.

use chrono::Duration;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::correlate::{correlate, CorrelatedEvent, CorrelationPolicy, LapMatcher};
use crate::error::Result;
use crate::gateway::{SessionGateway, Transport};
use crate::model::{
    Driver, Lap, Meeting, PitStop, PositionSample, RadioMessage, Session, Stint, WeatherSample,
};

/// The session and driver a request is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Selection {
    /// Session key.
    pub session_key: u32,
    /// Car number.
    pub driver_number: u32,
}

/// Every record fetched for one [`Selection`].
#[derive(Debug, Clone, PartialEq)]
pub struct RequestContext {
    /// What was requested.
    pub selection: Selection,
    /// Meeting the session belongs to.
    pub meeting: Meeting,
    /// The session.
    pub session: Session,
    /// The selected driver.
    pub driver: Driver,
    /// Laps, ordered by lap number.
    pub laps: Vec<Lap>,
    /// Position samples, ordered by time.
    pub positions: Vec<PositionSample>,
    /// Team radio, ordered by time.
    pub radio: Vec<RadioMessage>,
    /// Tire stints.
    pub stints: Vec<Stint>,
    /// Pit stops.
    pub pit_stops: Vec<PitStop>,
    /// Weather over the meeting.
    pub weather: Vec<WeatherSample>,
}

impl RequestContext {
    /// Fetch every record for `selection`, one request at a time.
    ///
    /// # Errors
    ///
    /// Any gateway failure aborts the load; no partial context is returned.
    pub async fn load<T: Transport>(
        gateway: &mut SessionGateway<T>,
        selection: Selection,
    ) -> Result<Self> {
        let Selection {
            session_key,
            driver_number,
        } = selection;

        let session = gateway.session(session_key).await?;
        let meeting = gateway.meeting(session.meeting_key).await?;
        let driver = gateway.driver(session_key, driver_number).await?;
        let laps = gateway.laps(session_key, driver_number).await?;
        let positions = gateway.positions(session_key, driver_number).await?;
        let radio = gateway.team_radio(session_key, Some(driver_number)).await?;
        let stints = gateway.stints(session_key, driver_number).await?;
        let pit_stops = gateway.pit_stops(session_key, driver_number).await?;
        let weather = gateway.weather(session.meeting_key).await?;

        let mut context = Self {
            selection,
            meeting,
            session,
            driver,
            laps,
            positions,
            radio,
            stints,
            pit_stops,
            weather,
        };
        context.sort_records();

        info!(
            session = session_key,
            driver = driver_number,
            laps = context.laps.len(),
            positions = context.positions.len(),
            radio = context.radio.len(),
            "loaded session data"
        );
        Ok(context)
    }

    /// Restore record ordering: laps by number, samples and radio by time.
    ///
    /// Records without a lap number or time sort last.
    pub fn sort_records(&mut self) {
        self.laps
            .sort_by_key(|lap| (lap.lap_number.is_none(), lap.lap_number));
        self.positions.sort_by_key(|sample| sample.date);
        self.radio.sort_by_key(|message| message.date);
        self.stints.sort_by_key(|stint| stint.stint_number);
        self.pit_stops.sort_by_key(|pit| pit.lap_number);
        self.weather.sort_by_key(|sample| sample.date);
    }

    /// Lap matcher over this driver's laps.
    #[must_use]
    pub fn matcher(
        &self,
        policy: CorrelationPolicy,
        tolerance: Option<Duration>,
    ) -> Box<dyn LapMatcher> {
        policy.matcher(&self.laps, tolerance)
    }

    /// Radio messages placed on laps.
    #[must_use]
    pub fn correlated_radio(&self, matcher: &dyn LapMatcher) -> Vec<CorrelatedEvent<RadioMessage>> {
        correlate(&self.radio, matcher)
    }

    /// Highest lap number seen, or the number of lap records when no lap
    /// carries a number.
    #[must_use]
    pub fn total_laps(&self) -> usize {
        self.laps
            .iter()
            .filter_map(|lap| lap.lap_number)
            .max()
            .map_or(self.laps.len(), |n| n as usize)
    }
}
