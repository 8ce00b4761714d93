//! End-to-end tests: a fake upstream feeds the gateway, the loaded context
//! feeds the report builders.

use std::io::Write as _;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

use async_trait::async_trait;
use serde_json::{json, Value};

use radiolap::cli::OutputFormat;
use radiolap::config::CorrelationConfig;
use radiolap::narrative::{
    NarrativeError, NarrativeGenerator, Prompt, RetryPolicy, Retrying, Sentiment, Transcriber,
};
use radiolap::{
    Config, CorrelationPolicy, Error, RadioLog, RequestContext, ResponseCache, Selection,
    SessionGateway, SessionReport, Transport,
};

/// Serves a recorded Singapore race for car 55.
#[derive(Default)]
struct RecordedUpstream {
    requests: AtomicUsize,
}

impl RecordedUpstream {
    fn body(endpoint: &str) -> Option<Value> {
        Some(match endpoint {
            "sessions" => json!([{
                "session_key": 9161, "meeting_key": 1219, "session_name": "Race",
                "session_type": "Race", "date_start": "2023-09-17T12:00:00+00:00"
            }]),
            "meetings" => json!([{
                "meeting_key": 1219, "meeting_name": "Singapore Grand Prix", "year": 2023,
                "country_name": "Singapore", "location": "Marina Bay"
            }]),
            "drivers" => json!([{
                "driver_number": 55, "full_name": "Carlos SAINZ", "team_name": "Ferrari",
                "name_acronym": "SAI"
            }]),
            "laps" => json!([
                {"lap_number": 4, "date_start": "2023-09-17T12:05:00.000000+00:00", "lap_duration": 99.5},
                {"lap_number": 1, "date_start": "2023-09-17T12:00:00+00:00", "lap_duration": 101.2},
                {"lap_number": 2, "date_start": "2023-09-17T12:01:41.200000+00:00", "lap_duration": 98.8},
                {"lap_number": 3, "date_start": "2023-09-17T12:03:20+00:00", "lap_duration": 100.0},
                {"lap_number": 5, "date_start": "2023-09-17 12:06:39.500", "lap_duration": null}
            ]),
            "position" => json!([
                {"date": "2023-09-17T12:00:05+00:00", "position": 2},
                {"date": "2023-09-17T12:02:00+00:00", "position": 1},
                {"date": "2023-09-17T12:04:00+00:00", "position": 3},
                {"date": "2023-09-17T12:05:30+00:00", "position": 1}
            ]),
            "team_radio" => json!([
                {"date": "2023-09-17T12:03:50+00:00", "recording_url": "https://audio.test/box.mp3"},
                {"date": "2023-09-17T12:00:30+00:00", "recording_url": "https://audio.test/start.mp3"},
                {"date": "2023-09-17T12:30:00+00:00", "recording_url": "https://audio.test/late.mp3"},
                {"date": "not a date", "recording_url": "https://audio.test/lost.mp3"}
            ]),
            "stints" => json!([
                {"stint_number": 2, "compound": "HARD", "lap_start": 4, "lap_end": 5},
                {"stint_number": 1, "compound": "MEDIUM", "lap_start": 1, "lap_end": 3}
            ]),
            "pit" => json!([{"lap_number": 3, "pit_duration": 22.9}]),
            "weather" => json!([
                {"date": "2023-09-17T12:00:00+00:00", "air_temperature": 30.1, "track_temperature": 39.0, "rainfall": 0},
                {"date": "2023-09-17T12:05:00+00:00", "air_temperature": 29.6, "track_temperature": 37.5, "rainfall": 0}
            ]),
            "car_data" => json!([
                {"date": "2023-09-17T12:00:30.120000+00:00", "speed": 287, "throttle": 99,
                 "brake": 0, "n_gear": 7, "rpm": 11450, "drs": 8}
            ]),
            _ => return None,
        })
    }
}

#[async_trait]
impl Transport for RecordedUpstream {
    async fn get_json(&self, url: &str) -> radiolap::Result<Value> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        let path = url.split('?').next().unwrap_or_default();
        let endpoint = path.rsplit('/').next().unwrap_or_default();
        Self::body(endpoint).ok_or_else(|| Error::UpstreamStatus {
            url: url.to_string(),
            status: 404,
        })
    }
}

fn gateway() -> SessionGateway<RecordedUpstream> {
    SessionGateway::new(
        "https://api.openf1.test/v1",
        RecordedUpstream::default(),
        ResponseCache::default(),
    )
}

const SAINZ: Selection = Selection {
    session_key: 9161,
    driver_number: 55,
};

#[tokio::test]
async fn test_session_report_from_recorded_race() {
    let mut gateway = gateway();
    let context = RequestContext::load(&mut gateway, SAINZ).await.unwrap();
    let report = SessionReport::build(&context, &CorrelationConfig::default());

    assert_eq!(report.meeting, "Singapore Grand Prix");
    assert_eq!(report.driver, "55 - Carlos SAINZ");
    assert_eq!(report.headline.total_laps, 5);
    assert_eq!(report.headline.final_position, Some(1));
    assert_eq!(report.headline.position_changes, 5);
    assert!((report.headline.fastest_lap - 98.8).abs() < 1e-9);

    let pace = report.pace.as_ref().unwrap();
    assert_eq!(pace.excluded_laps.iter().copied().collect::<Vec<_>>(), vec![3]);
    assert_eq!(pace.racing.lap_count, 3);

    let compounds: Vec<String> = report.stints.iter().map(|s| s.compound.to_string()).collect();
    assert_eq!(compounds, vec!["MEDIUM", "HARD"]);
    assert_eq!(report.stints[1].fastest_lap, Some(99.5));

    // Radio sorted by time; unknown dates sort last and stay unresolved.
    let labels: Vec<String> = report.radio.iter().map(|r| r.lap_label()).collect();
    assert_eq!(labels, vec!["1", "3", "?", "?"]);

    let by_lap: Vec<(u32, u32)> = report
        .positions_by_lap
        .iter()
        .map(|p| (p.lap_number, p.position))
        .collect();
    assert!(by_lap.contains(&(4, 1)));

    assert_eq!(report.radio_by_hour.get(&12), Some(&3));
    assert!(report.weather.changed);
    assert!(!report.weather.rainfall);

    let table = report.render(OutputFormat::Table).unwrap();
    assert!(table.contains("Singapore Grand Prix 2023 - Race (session 9161)"));
    assert!(table.contains("MEDIUM"));
    assert!(table.contains("Pit laps:          3"));
}

#[tokio::test]
async fn test_nearest_start_places_late_radio() {
    let mut gateway = gateway();
    let context = RequestContext::load(&mut gateway, SAINZ).await.unwrap();
    let correlation = CorrelationConfig {
        policy: CorrelationPolicy::NearestStart,
        ..CorrelationConfig::default()
    };
    let report = SessionReport::build(&context, &correlation);
    let labels: Vec<String> = report.radio.iter().map(|r| r.lap_label()).collect();
    assert_eq!(labels, vec!["1", "3", "5", "?"]);

    let bounded = CorrelationConfig {
        nearest_tolerance_secs: Some(60.0),
        ..correlation
    };
    let report = SessionReport::build(&context, &bounded);
    assert_eq!(report.radio[2].lap_number, None);
}

#[tokio::test]
async fn test_second_load_served_from_cache() {
    let mut gateway = gateway();
    RequestContext::load(&mut gateway, SAINZ).await.unwrap();
    let after_first = gateway.transport().requests.load(Ordering::SeqCst);
    assert_eq!(after_first, 9);

    RequestContext::load(&mut gateway, SAINZ).await.unwrap();
    assert_eq!(gateway.transport().requests.load(Ordering::SeqCst), after_first);
    assert_eq!(gateway.cache().stats().hits, 9);
}

#[tokio::test]
async fn test_unknown_driver_is_not_found() {
    let mut gateway = gateway();
    let err = RequestContext::load(
        &mut gateway,
        Selection {
            session_key: 9161,
            driver_number: 44,
        },
    )
    .await
    .unwrap_err();
    assert!(err.is_not_found());
}

/// Every request fails with a server error.
struct Outage;

#[async_trait]
impl Transport for Outage {
    async fn get_json(&self, url: &str) -> radiolap::Result<Value> {
        Err(Error::UpstreamStatus {
            url: url.to_string(),
            status: 503,
        })
    }
}

#[tokio::test]
async fn test_radio_log_telemetry_snapshots() {
    let mut gateway = gateway();
    let context = RequestContext::load(&mut gateway, SAINZ).await.unwrap();
    let mut log = RadioLog::build(&context, &CorrelationConfig::default());

    // The message with an unknown date is not looked up.
    let before = gateway.transport().requests.load(Ordering::SeqCst);
    assert_eq!(log.attach_telemetry(&mut gateway, SAINZ).await, 3);
    assert_eq!(gateway.transport().requests.load(Ordering::SeqCst), before + 3);
    assert!(log.entries[3].car.is_none());

    let json: Value = serde_json::from_str(&log.render(OutputFormat::Json).unwrap()).unwrap();
    assert_eq!(json["entries"][0]["car"]["speed"], 287.0);
    assert_eq!(json["entries"][0]["car"]["n_gear"], 7);
    assert!(json["entries"][3].get("car").is_none());

    let plain = log.render(OutputFormat::Plain).unwrap();
    assert!(plain.contains("Car: 287 km/h, throttle 99%, brake 0, gear 7, DRS 8"));
}

#[tokio::test]
async fn test_radio_log_telemetry_outage_is_not_fatal() {
    let mut recorded = gateway();
    let context = RequestContext::load(&mut recorded, SAINZ).await.unwrap();
    let mut log = RadioLog::build(&context, &CorrelationConfig::default());

    let mut down =
        SessionGateway::new("https://api.openf1.test/v1", Outage, ResponseCache::default());
    assert_eq!(log.attach_telemetry(&mut down, SAINZ).await, 0);
    assert!(log.entries.iter().all(|e| e.car.is_none()));
    assert_eq!(log.entries.len(), 4);
}

/// Fails a fixed number of times, then classifies everything as positive.
struct FlakyModel {
    failures_left: AtomicU32,
}

#[async_trait]
impl NarrativeGenerator for FlakyModel {
    async fn generate(&self, prompt: &Prompt) -> Result<String, NarrativeError> {
        if self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(NarrativeError::Status {
                status: 503,
                body: "overloaded".to_string(),
            });
        }
        if prompt.system.contains("sentiment") {
            Ok("Positive.".to_string())
        } else {
            Ok("Sainz is told to box this lap.".to_string())
        }
    }
}

struct EchoTranscriber;

#[async_trait]
impl Transcriber for EchoTranscriber {
    async fn transcribe(&self, recording_url: &str) -> Result<String, NarrativeError> {
        Ok(format!("heard {recording_url}"))
    }
}

#[tokio::test]
async fn test_radio_log_with_retrying_model() {
    let mut gateway = gateway();
    let context = RequestContext::load(&mut gateway, SAINZ).await.unwrap();
    let mut log = RadioLog::build(&context, &CorrelationConfig::default());

    log.transcribe(&EchoTranscriber).await;
    let model = Retrying::new(
        FlakyModel {
            failures_left: AtomicU32::new(2),
        },
        RetryPolicy::immediate(3),
    );
    log.summarize(&model).await;

    assert!(log.entries.iter().all(|e| e.summary.as_ref().is_some_and(|s| !s.is_warning())));
    assert!(log
        .entries
        .iter()
        .all(|e| e.sentiment == Some(Sentiment::Positive)));

    let json: Value = serde_json::from_str(&log.render(OutputFormat::Json).unwrap()).unwrap();
    assert_eq!(json["entries"][0]["lap_number"], 1);
    assert_eq!(json["entries"][0]["sentiment"], "Positive");
    assert_eq!(json["entries"][0]["transcript"]["kind"], "text");
}

#[tokio::test]
async fn test_policy_from_config_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        "[correlation]\npolicy = \"nearest-start\"\nas_of_direction = \"backward\"\n\n[gateway]\ncache_capacity = 16"
    )
    .unwrap();

    let config = Config::load_from(Some(file.path().to_path_buf())).unwrap();
    assert_eq!(config.correlation.policy, CorrelationPolicy::NearestStart);
    assert_eq!(config.gateway.cache_capacity, 16);

    let mut gateway = gateway();
    let context = RequestContext::load(&mut gateway, SAINZ).await.unwrap();
    let report = SessionReport::build(&context, &config.correlation);
    assert_eq!(report.policy, CorrelationPolicy::NearestStart);
    assert_eq!(report.radio[2].lap_number, Some(5));
}
