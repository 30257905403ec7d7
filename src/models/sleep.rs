/*
These are internal models that we define. Every field is always serialized,
absent upstream values become null.
*/

use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SleepSummary {
    pub date: String,
    pub sleep_time_hours: Option<f64>,
    pub deep_sleep_hours: Option<f64>,
    pub light_sleep_hours: Option<f64>,
    pub rem_sleep_hours: Option<f64>,
    pub awake_hours: Option<f64>,
    pub sleep_start: Option<i64>,
    pub sleep_end: Option<i64>,
    pub average_spo2: Option<f64>,
    pub average_respiration: Option<f64>,
    pub average_sleep_stress: Option<f64>,
    pub sleep_scores: Option<Value>,
    pub sleep_need: Option<Value>,
}

/// Returned instead of a [`SleepSummary`] when Garmin has nothing for the night.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct NoSleepData {
    pub message: String,
    pub date: String,
}

impl NoSleepData {
    pub fn for_date(date: &str) -> Self {
        NoSleepData {
            message: format!("No sleep data found for {}", date),
            date: date.to_string(),
        }
    }
}
