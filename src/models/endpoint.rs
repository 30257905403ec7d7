use std::{fmt, str::FromStr};

use chrono::NaiveDate;
use serde::Deserialize;

use crate::error::ApiError;

pub const DEFAULT_ACTIVITY_START: u32 = 0;
pub const DEFAULT_ACTIVITY_LIMIT: u32 = 30;

/// Data categories exposed under `/api/<endpoint>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    Activities,
    Sleep,
    BodyComposition,
    UserSummary,
    HeartRate,
    Hrv,
    Stress,
    Stats,
    Steps,
    Hydration,
    UserProfile,
    Spo2,
    Respiration,
    TrainingStatus,
    TrainingReadiness,
}

impl Endpoint {
    /// Advertised endpoint list, in the order `GET /` reports it.
    pub const ALL: [Endpoint; 15] = [
        Endpoint::Activities,
        Endpoint::Sleep,
        Endpoint::BodyComposition,
        Endpoint::UserSummary,
        Endpoint::HeartRate,
        Endpoint::Hrv,
        Endpoint::Stress,
        Endpoint::Stats,
        Endpoint::Steps,
        Endpoint::Hydration,
        Endpoint::UserProfile,
        Endpoint::Spo2,
        Endpoint::Respiration,
        Endpoint::TrainingStatus,
        Endpoint::TrainingReadiness,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Endpoint::Activities => "activities",
            Endpoint::Sleep => "sleep",
            Endpoint::BodyComposition => "body_composition",
            Endpoint::UserSummary => "user_summary",
            Endpoint::HeartRate => "heart_rate",
            Endpoint::Hrv => "hrv",
            Endpoint::Stress => "stress",
            Endpoint::Stats => "stats",
            Endpoint::Steps => "steps",
            Endpoint::Hydration => "hydration",
            Endpoint::UserProfile => "user_profile",
            Endpoint::Spo2 => "spo2",
            Endpoint::Respiration => "respiration",
            Endpoint::TrainingStatus => "training_status",
            Endpoint::TrainingReadiness => "training_readiness",
        }
    }

    pub fn path(&self) -> String {
        format!("/api/{}", self.as_str())
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Endpoint {
    type Err = ApiError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        Endpoint::ALL
            .iter()
            .copied()
            .find(|endpoint| endpoint.as_str() == name)
            .ok_or_else(|| ApiError::NotFound(format!("Unknown endpoint: {}", name)))
    }
}

/// Raw query string as sent by the caller. Everything is optional and
/// validated in [`EndpointParams::resolve`] so malformed values become our
/// own 400 instead of an extractor rejection.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct EndpointQuery {
    pub date: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub start: Option<String>,
    pub limit: Option<String>,
}

/// Query parameters with defaults applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointParams {
    pub date: NaiveDate,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub start: u32,
    pub limit: u32,
}

impl EndpointParams {
    pub fn resolve(query: &EndpointQuery, today: NaiveDate) -> Result<Self, ApiError> {
        let date = match non_empty(&query.date) {
            Some(raw) => parse_date("date", raw)?,
            None => today,
        };
        let start_date = match non_empty(&query.start_date) {
            Some(raw) => parse_date("start_date", raw)?,
            None => date,
        };
        let end_date = match non_empty(&query.end_date) {
            Some(raw) => parse_date("end_date", raw)?,
            None => date,
        };
        let start = match non_empty(&query.start) {
            Some(raw) => parse_count("start", raw)?,
            None => DEFAULT_ACTIVITY_START,
        };
        let limit = match non_empty(&query.limit) {
            Some(raw) => parse_count("limit", raw)?,
            None => DEFAULT_ACTIVITY_LIMIT,
        };

        Ok(EndpointParams {
            date,
            start_date,
            end_date,
            start,
            limit,
        })
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn parse_date(name: &str, raw: &str) -> Result<NaiveDate, ApiError> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| {
        ApiError::BadRequest(format!("Invalid {}: '{}' (expected YYYY-MM-DD)", name, raw))
    })
}

fn parse_count(name: &str, raw: &str) -> Result<u32, ApiError> {
    raw.parse::<u32>().map_err(|_| {
        ApiError::BadRequest(format!("Invalid {}: '{}' (expected a non-negative integer)", name, raw))
    })
}
