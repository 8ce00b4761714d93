//! `radiolap` - F1 session telemetry event correlator
//!
//! Fetches timing data for one driver in one session, places team radio and
//! position samples on the laps they belong to, and derives lap-time, tire
//! and weather statistics. Optional narrative summaries and radio transcripts
//! come from an OpenAI-compatible service.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

pub mod align;
pub mod cache;
pub mod cli;
pub mod config;
pub mod context;
pub mod correlate;
pub mod error;
pub mod gateway;
pub mod logging;
pub mod model;
pub mod narrative;
pub mod report;
pub mod stats;
pub mod timestamp;

pub use align::{align_positions, AsOfDirection, LapPosition};
pub use cache::{CacheKey, ResponseCache};
pub use config::Config;
pub use context::{RequestContext, Selection};
pub use correlate::{correlate, resolve_unknown, CorrelatedEvent, CorrelationPolicy, LapMatcher};
pub use error::{Error, Result};
pub use gateway::{Endpoint, HttpTransport, SessionGateway, Transport};
pub use logging::init_logging;
pub use narrative::{Narrative, NarrativeError, NarrativeGenerator};
pub use report::{RadioLog, SessionReport};
pub use timestamp::EventTime;
