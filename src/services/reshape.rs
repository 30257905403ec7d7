use chrono::NaiveDate;
use serde::Serialize;
use serde_json::Value;

use crate::{
    error::ApiError,
    models::{
        body_composition::{BodyComposition, BodyCompositionMeasurement},
        profile::UserProfile,
        sleep::{NoSleepData, SleepSummary},
    },
};

const SECONDS_PER_HOUR: f64 = 3600.0;
const GRAMS_PER_KILOGRAM: f64 = 1000.0;

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

pub fn seconds_to_hours(seconds: f64) -> f64 {
    round2(seconds / SECONDS_PER_HOUR)
}

pub fn grams_to_kilograms(grams: f64) -> f64 {
    round2(grams / GRAMS_PER_KILOGRAM)
}

/// Flattens `dailySleepDTO` into a [`SleepSummary`], or a [`NoSleepData`]
/// placeholder when Garmin recorded nothing for the night.
pub fn reshape_sleep(raw: &Value, date: NaiveDate) -> Result<Value, ApiError> {
    let requested = date.format("%Y-%m-%d").to_string();

    let dto = match raw.get("dailySleepDTO") {
        Some(dto) if has_sleep_data(dto) => dto,
        _ => return to_json(&NoSleepData::for_date(&requested)),
    };

    let hours = |key: &str| number(dto, key).map(seconds_to_hours);

    to_json(&SleepSummary {
        date: dto
            .get("calendarDate")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or(requested),
        sleep_time_hours: hours("sleepTimeSeconds"),
        deep_sleep_hours: hours("deepSleepSeconds"),
        light_sleep_hours: hours("lightSleepSeconds"),
        rem_sleep_hours: hours("remSleepSeconds"),
        awake_hours: hours("awakeSleepSeconds"),
        sleep_start: dto.get("sleepStartTimestampLocal").and_then(Value::as_i64),
        sleep_end: dto.get("sleepEndTimestampLocal").and_then(Value::as_i64),
        average_spo2: number(dto, "averageSpO2Value"),
        average_respiration: number(dto, "averageRespirationValue"),
        average_sleep_stress: number(dto, "avgSleepStress"),
        sleep_scores: passthrough(dto, "sleepScores"),
        sleep_need: passthrough(dto, "sleepNeed"),
    })
}

pub fn reshape_body_composition(raw: &Value, start: NaiveDate, end: NaiveDate) -> Result<Value, ApiError> {
    let entries = match raw.get("dateWeightList") {
        None | Some(Value::Null) => &[][..],
        Some(Value::Array(entries)) => entries.as_slice(),
        Some(_) => {
            return Err(ApiError::UpstreamError(
                "Unexpected body composition payload: dateWeightList is not a list".to_string(),
            ));
        }
    };

    let measurements = entries
        .iter()
        .map(|entry| BodyCompositionMeasurement {
            date: entry
                .get("calendarDate")
                .and_then(Value::as_str)
                .map(str::to_string),
            weight_kg: number(entry, "weight").map(grams_to_kilograms),
            bmi: number(entry, "bmi"),
            body_fat_percent: number(entry, "bodyFat"),
            body_water_percent: number(entry, "bodyWater"),
            bone_mass_kg: number(entry, "boneMass").map(grams_to_kilograms),
            muscle_mass_kg: number(entry, "muscleMass").map(grams_to_kilograms),
        })
        .collect();

    to_json(&BodyComposition {
        start_date: start.format("%Y-%m-%d").to_string(),
        end_date: end.format("%Y-%m-%d").to_string(),
        measurements,
    })
}

pub fn reshape_user_profile(full_name: Option<String>, unit_system: Option<String>) -> Result<Value, ApiError> {
    to_json(&UserProfile {
        full_name,
        unit_system,
    })
}

const SLEEP_DURATION_FIELDS: [&str; 5] = [
    "sleepTimeSeconds",
    "deepSleepSeconds",
    "lightSleepSeconds",
    "remSleepSeconds",
    "awakeSleepSeconds",
];

// Garmin sends a DTO with ids and the date filled in but no durations when
// nothing was recorded, so only the durations count as data.
fn has_sleep_data(dto: &Value) -> bool {
    SLEEP_DURATION_FIELDS.iter().any(|key| number(dto, key).is_some())
}

fn number(value: &Value, key: &str) -> Option<f64> {
    value.get(key).and_then(Value::as_f64)
}

fn passthrough(value: &Value, key: &str) -> Option<Value> {
    value.get(key).filter(|v| !v.is_null()).cloned()
}

fn to_json<T: Serialize>(record: &T) -> Result<Value, ApiError> {
    serde_json::to_value(record)
        .map_err(|e| ApiError::UpstreamError(format!("Failed to serialize response: {}", e)))
}
