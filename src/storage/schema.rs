//! Metric names, values and query periods
//!
//! Every device owns a fixed set of series:
//!
//! - `cpu` - CPU load samples (percent)
//! - `temp_0` .. `temp_7` - per-core temperature samples (Celsius)
//! - `state` - liveness transitions (`true` = up)
//! - `events` - audit trail written by sync and slot operations
//!
//! Entries are immutable once written. Pruning removes whole entries
//! older than a cutoff.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::error::StorageError;
use crate::DeviceId;

/// Highest core number with its own temperature series
pub const MAX_CORE: u8 = 7;

/// Name of one per-device time series
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Metric {
    Cpu,
    Temp(u8),
    State,
    Events,
}

impl Metric {
    /// Every metric a device can own, per-core temperatures included
    pub fn all() -> Vec<Metric> {
        let mut metrics = vec![Metric::Cpu, Metric::State, Metric::Events];
        metrics.extend(Self::temperatures());
        metrics
    }

    pub fn temperatures() -> impl Iterator<Item = Metric> {
        (0..=MAX_CORE).map(Metric::Temp)
    }

    /// Temperature series for `core`, if the core number is tracked
    pub fn temp(core: u8) -> Option<Metric> {
        (core <= MAX_CORE).then_some(Metric::Temp(core))
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Metric::Cpu => write!(f, "cpu"),
            Metric::Temp(core) => write!(f, "temp_{core}"),
            Metric::State => write!(f, "state"),
            Metric::Events => write!(f, "events"),
        }
    }
}

impl FromStr for Metric {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cpu" => Ok(Metric::Cpu),
            "state" => Ok(Metric::State),
            "events" => Ok(Metric::Events),
            _ => s
                .strip_prefix("temp_")
                .and_then(|core| core.parse::<u8>().ok())
                .and_then(Metric::temp)
                .ok_or_else(|| StorageError::UnknownMetric(s.to_string())),
        }
    }
}

/// Value carried by a metric entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum MetricValue {
    Number(f64),
    State(bool),
    Event(String),
}

impl MetricValue {
    pub fn as_state(&self) -> Option<bool> {
        match self {
            MetricValue::State(state) => Some(*state),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            MetricValue::Number(n) => Some(*n),
            _ => None,
        }
    }
}

/// One (timestamp, value) pair of a series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricEntry {
    pub timestamp: DateTime<Utc>,
    pub value: MetricValue,
}

impl MetricEntry {
    pub fn new(timestamp: DateTime<Utc>, value: MetricValue) -> Self {
        Self { timestamp, value }
    }
}

/// Named convenience ranges for history queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Period {
    #[serde(rename = "10_minutes")]
    TenMinutes,
    #[serde(rename = "hour")]
    Hour,
    #[serde(rename = "day")]
    Day,
    #[serde(rename = "week")]
    Week,
    #[serde(rename = "all")]
    All,
}

impl Period {
    /// Length of the period, `None` for `All`
    pub fn duration(&self) -> Option<Duration> {
        match self {
            Period::TenMinutes => Some(Duration::minutes(10)),
            Period::Hour => Some(Duration::hours(1)),
            Period::Day => Some(Duration::days(1)),
            Period::Week => Some(Duration::weeks(1)),
            Period::All => None,
        }
    }

    /// Inclusive `[min, max]` bounds ending at `now`
    pub fn bounds(&self, now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        match self.duration() {
            Some(length) => (now - length, now),
            None => (DateTime::<Utc>::MIN_UTC, DateTime::<Utc>::MAX_UTC),
        }
    }

    /// Entries strictly before this instant fall out of the period
    pub fn cutoff(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.duration().map(|length| now - length)
    }
}

impl FromStr for Period {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "10_minutes" => Ok(Period::TenMinutes),
            "hour" => Ok(Period::Hour),
            "day" => Ok(Period::Day),
            "week" => Ok(Period::Week),
            "all" => Ok(Period::All),
            _ => Err(StorageError::UnknownPeriod(s.to_string())),
        }
    }
}

/// Parameters of a range query over one series
#[derive(Debug, Clone)]
pub struct RangeQuery {
    pub device_id: DeviceId,
    pub metric: Metric,

    /// Start of time range (inclusive)
    pub min: DateTime<Utc>,

    /// End of time range (inclusive)
    pub max: DateTime<Utc>,

    /// Maximum number of results to return
    pub limit: Option<usize>,

    /// Newest first when set
    pub reverse: bool,
}

impl RangeQuery {
    pub fn new(device_id: DeviceId, metric: Metric, min: DateTime<Utc>, max: DateTime<Utc>) -> Self {
        Self {
            device_id,
            metric,
            min,
            max,
            limit: None,
            reverse: false,
        }
    }

    pub fn for_period(device_id: DeviceId, metric: Metric, period: Period, now: DateTime<Utc>) -> Self {
        let (min, max) = period.bounds(now);
        Self::new(device_id, metric, min, max)
    }

    pub fn limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        self
    }

    pub fn reverse(mut self, reverse: bool) -> Self {
        self.reverse = reverse;
        self
    }
}
