use crate::session::Screen;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, ops::RangeInclusive};
use thiserror::Error;

pub const SLEEP_HOURS: RangeInclusive<f64> = 4.0..=10.0;
pub const WORK_HOURS: RangeInclusive<f64> = 2.0..=12.0;
pub const EXERCISE_MINUTES: RangeInclusive<u32> = 0..=120;
pub const CAFFEINE_CUPS: RangeInclusive<u32> = 0..=6;
pub const SCREEN_HOURS: RangeInclusive<f64> = 1.0..=8.0;

/// The five lifestyle inputs fed to the model, in feature order.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub sleep: f64,
    pub work: f64,
    pub exercise: u32,
    pub caffeine: u32,
    pub screen: f64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self {
            sleep: 7.5,
            work: 8.0,
            exercise: 30,
            caffeine: 2,
            screen: 3.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum MetricsError {
    #[error("{field} must be between {min} and {max}, got {value}")]
    OutOfRange {
        field: &'static str,
        min: f64,
        max: f64,
        value: f64,
    },
}

impl Metrics {
    pub fn validate(&self) -> Result<(), MetricsError> {
        check_real("sleep", self.sleep, &SLEEP_HOURS)?;
        check_real("work", self.work, &WORK_HOURS)?;
        check_whole("exercise", self.exercise, &EXERCISE_MINUTES)?;
        check_whole("caffeine", self.caffeine, &CAFFEINE_CUPS)?;
        check_real("screen", self.screen, &SCREEN_HOURS)?;
        Ok(())
    }

    /// Feature vector in model order: sleep, work, exercise, caffeine, screen.
    pub fn features(&self) -> [f64; 5] {
        [
            self.sleep,
            self.work,
            f64::from(self.exercise),
            f64::from(self.caffeine),
            self.screen,
        ]
    }
}

fn check_real(field: &'static str, value: f64, range: &RangeInclusive<f64>) -> Result<(), MetricsError> {
    // NaN is never contained, so it is rejected here too.
    if range.contains(&value) {
        return Ok(());
    }
    Err(MetricsError::OutOfRange {
        field,
        min: *range.start(),
        max: *range.end(),
        value,
    })
}

fn check_whole(field: &'static str, value: u32, range: &RangeInclusive<u32>) -> Result<(), MetricsError> {
    if range.contains(&value) {
        return Ok(());
    }
    Err(MetricsError::OutOfRange {
        field,
        min: f64::from(*range.start()),
        max: f64::from(*range.end()),
        value: f64::from(value),
    })
}

/// A user name that is non-empty after trimming. Stored in trimmed form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct PersonName(String);

impl PersonName {
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PersonName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A record about to be synced; the store assigns the timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct NewPrediction {
    pub name: PersonName,
    pub score: f64,
    pub metrics: Metrics,
}

/// A stored `user_logs` document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRecord {
    pub name: String,
    #[serde(rename = "efficiency_score")]
    pub score: f64,
    #[serde(flatten)]
    pub metrics: Metrics,
    #[serde(rename = "timestamp")]
    pub created_at: DateTime<Utc>,
}

impl PredictionRecord {
    pub fn from_new(entry: &NewPrediction, created_at: DateTime<Utc>) -> Self {
        Self {
            name: entry.name.as_str().to_string(),
            score: entry.score,
            metrics: entry.metrics,
            created_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct NavigateRequest {
    pub action: String,
}

/// Partial update of the dashboard inputs. Absent fields keep their value.
#[derive(Debug, Default, Deserialize)]
pub struct InputsRequest {
    pub name: Option<String>,
    pub sleep: Option<f64>,
    pub work: Option<f64>,
    pub exercise: Option<u32>,
    pub caffeine: Option<u32>,
    pub screen: Option<f64>,
}

impl InputsRequest {
    pub fn apply_to(&self, metrics: Metrics) -> Metrics {
        Metrics {
            sleep: self.sleep.unwrap_or(metrics.sleep),
            work: self.work.unwrap_or(metrics.work),
            exercise: self.exercise.unwrap_or(metrics.exercise),
            caffeine: self.caffeine.unwrap_or(metrics.caffeine),
            screen: self.screen.unwrap_or(metrics.screen),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PredictResponse {
    pub score: f64,
    pub score_label: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionView {
    pub screen: Screen,
    pub model_ready: bool,
    pub model_error: Option<String>,
    pub connected: bool,
    pub dashboard: Option<DashboardView>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DashboardView {
    pub title: String,
    pub name: String,
    pub metrics: Metrics,
    pub score: f64,
    pub score_label: String,
    pub sync_enabled: bool,
    pub charts: ChartsResponse,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RadarPoint {
    pub axis: String,
    pub value: f64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BarPoint {
    pub metric: String,
    pub hours: f64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChartsResponse {
    pub radar: Vec<RadarPoint>,
    pub bars: Vec<BarPoint>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub name: String,
    pub score: f64,
    pub label: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HistoryResponse {
    pub connected: bool,
    pub entries: Vec<HistoryEntry>,
    pub message: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SyncResponse {
    pub message: String,
    pub record: PredictionRecord,
}

/// One decimal place, as shown on the dashboard.
pub fn round_score(score: f64) -> f64 {
    (score * 10.0).round() / 10.0
}

pub fn score_label(score: f64) -> String {
    format!("{:.1}%", round_score(score))
}
