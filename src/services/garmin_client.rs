use std::{
    path::PathBuf,
    sync::{Arc, OnceLock},
    time::Duration,
};

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use regex::Regex;
use reqwest::{Client, StatusCode, header::REFERER};
use serde_json::Value;

use crate::{
    error::ApiError,
    models::session::{Credentials, SessionArtifact},
};

const SSO_BASE: &str = "https://sso.garmin.com/sso";
const CONNECT_MODERN: &str = "https://connect.garmin.com/modern";
const API_BASE: &str = "https://connect.garmin.com/modern/proxy";
const USER_AGENT: &str =
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Safari/537.36";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub const ARTIFACT_FILE: &str = "session.json";
/// Files a login may leave in the token directory, ours plus the token
/// files other Garmin clients keep there.
pub const TOKEN_ARTIFACTS: [&str; 3] = [ARTIFACT_FILE, "oauth1_token.json", "oauth2_token.json"];

/// Data operations available on an authenticated Garmin Connect session.
/// Every call returns Garmin's JSON as-is; reshaping happens in the dispatcher.
#[async_trait]
pub trait GarminApi: Send + Sync {
    async fn get_activities(&self, start: u32, limit: u32) -> Result<Value, ApiError>;
    async fn get_sleep_data(&self, date: NaiveDate) -> Result<Value, ApiError>;
    async fn get_body_composition(&self, start: NaiveDate, end: NaiveDate) -> Result<Value, ApiError>;
    async fn get_user_summary(&self, date: NaiveDate) -> Result<Value, ApiError>;
    async fn get_heart_rates(&self, date: NaiveDate) -> Result<Value, ApiError>;
    async fn get_hrv_data(&self, date: NaiveDate) -> Result<Value, ApiError>;
    async fn get_stress_data(&self, date: NaiveDate) -> Result<Value, ApiError>;
    async fn get_stats(&self, date: NaiveDate) -> Result<Value, ApiError>;
    async fn get_steps_data(&self, date: NaiveDate) -> Result<Value, ApiError>;
    async fn get_hydration_data(&self, date: NaiveDate) -> Result<Value, ApiError>;
    async fn get_full_name(&self) -> Result<Option<String>, ApiError>;
    async fn get_unit_system(&self) -> Result<Option<String>, ApiError>;
    async fn get_spo2_data(&self, date: NaiveDate) -> Result<Value, ApiError>;
    async fn get_respiration_data(&self, date: NaiveDate) -> Result<Value, ApiError>;
    async fn get_training_status(&self, date: NaiveDate) -> Result<Value, ApiError>;
    async fn get_training_readiness(&self, date: NaiveDate) -> Result<Value, ApiError>;
}

/// Establishes new sessions. Split from [`GarminApi`] so the session cache
/// can be driven by a fake in tests.
#[async_trait]
pub trait GarminConnector: Send + Sync {
    async fn login(&self, credentials: &Credentials) -> Result<Arc<dyn GarminApi>, ApiError>;
}

pub struct GarminConnectConnector {
    token_dir: PathBuf,
}

impl GarminConnectConnector {
    pub fn new(token_dir: PathBuf) -> Self {
        GarminConnectConnector { token_dir }
    }

    fn build_http_client() -> Result<Client, ApiError> {
        Client::builder()
            .cookie_store(true)
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ApiError::AuthenticationError(format!("Failed to build HTTP client: {}", e)))
    }

    /// Runs the SSO form login and returns the service ticket.
    async fn sign_in(&self, client: &Client, credentials: &Credentials) -> Result<String, ApiError> {
        let signin_url = format!("{}/signin", SSO_BASE);
        let params = [
            ("id", "gauth-widget"),
            ("embedWidget", "true"),
            ("gauthHost", SSO_BASE),
            ("service", CONNECT_MODERN),
            ("source", CONNECT_MODERN),
            ("redirectAfterAccountLoginUrl", CONNECT_MODERN),
            ("redirectAfterAccountCreationUrl", CONNECT_MODERN),
        ];

        client
            .get(format!("{}/embed", SSO_BASE))
            .query(&params[..3])
            .send()
            .await
            .map_err(login_request_failed)?;

        let signin_page = client
            .get(&signin_url)
            .query(&params)
            .send()
            .await
            .map_err(login_request_failed)?
            .text()
            .await
            .map_err(login_request_failed)?;

        let csrf = capture(csrf_regex(), &signin_page).ok_or_else(|| {
            ApiError::AuthenticationError("Could not find CSRF token on the Garmin sign-in page".to_string())
        })?;

        let response = client
            .post(&signin_url)
            .query(&params)
            .header(REFERER, signin_url.as_str())
            .form(&[
                ("username", credentials.email.as_str()),
                ("password", credentials.password.as_str()),
                ("embed", "true"),
                ("_csrf", csrf.as_str()),
            ])
            .send()
            .await
            .map_err(login_request_failed)?;

        let status = response.status();
        let body = response.text().await.map_err(login_request_failed)?;

        match capture(title_regex(), &body).as_deref() {
            Some("Success") => {}
            Some(title) => {
                return Err(ApiError::AuthenticationError(format!(
                    "Garmin sign-in failed ({}): {}",
                    status, title
                )));
            }
            None => {
                return Err(ApiError::AuthenticationError(format!(
                    "Garmin sign-in failed ({}): unexpected response",
                    status
                )));
            }
        }

        capture(ticket_regex(), &body).ok_or_else(|| {
            ApiError::AuthenticationError("Garmin sign-in succeeded but returned no ticket".to_string())
        })
    }

    async fn persist_artifact(&self, artifact: &SessionArtifact) {
        let path = self.token_dir.join(ARTIFACT_FILE);
        let result = async {
            tokio::fs::create_dir_all(&self.token_dir).await?;
            let body = serde_json::to_vec_pretty(artifact).map_err(std::io::Error::other)?;
            tokio::fs::write(&path, body).await
        }
        .await;

        if let Err(e) = result {
            tracing::warn!("Could not write session artifact to {}: {}", path.display(), e);
        }
    }
}

#[async_trait]
impl GarminConnector for GarminConnectConnector {
    async fn login(&self, credentials: &Credentials) -> Result<Arc<dyn GarminApi>, ApiError> {
        let client = Self::build_http_client()?;
        let ticket = self.sign_in(&client, credentials).await?;

        let response = client
            .get(CONNECT_MODERN)
            .query(&[("ticket", ticket.as_str())])
            .send()
            .await
            .map_err(login_request_failed)?;
        if !response.status().is_success() {
            return Err(ApiError::AuthenticationError(format!(
                "Garmin ticket exchange failed ({})",
                response.status()
            )));
        }

        let profile = fetch_json(&client, "/userprofile-service/socialProfile", &[])
            .await
            .map_err(|e| ApiError::AuthenticationError(format!("Failed to load Garmin profile: {}", e)))?;
        let display_name = profile
            .get("displayName")
            .and_then(Value::as_str)
            .ok_or_else(|| ApiError::AuthenticationError("Garmin profile has no display name".to_string()))?
            .to_string();
        let full_name = profile
            .get("fullName")
            .and_then(Value::as_str)
            .map(str::to_string);

        self.persist_artifact(&SessionArtifact {
            display_name: display_name.clone(),
            logged_in_at: Utc::now(),
        })
        .await;

        tracing::info!("Logged in to Garmin Connect as {}", display_name);

        Ok(Arc::new(GarminConnectSession {
            client,
            display_name,
            full_name,
        }))
    }
}

/// Cookie-authenticated session against the Connect web proxy.
pub struct GarminConnectSession {
    client: Client,
    display_name: String,
    full_name: Option<String>,
}

impl GarminConnectSession {
    async fn get(&self, path: &str, query: &[(&str, String)]) -> Result<Value, ApiError> {
        fetch_json(&self.client, path, query).await
    }
}

#[async_trait]
impl GarminApi for GarminConnectSession {
    async fn get_activities(&self, start: u32, limit: u32) -> Result<Value, ApiError> {
        self.get(
            "/activitylist-service/activities/search/activities",
            &[("start", start.to_string()), ("limit", limit.to_string())],
        )
        .await
    }

    async fn get_sleep_data(&self, date: NaiveDate) -> Result<Value, ApiError> {
        self.get(
            &format!("/wellness-service/wellness/dailySleepData/{}", self.display_name),
            &[("date", iso(date)), ("nonSleepBufferMinutes", "60".to_string())],
        )
        .await
    }

    async fn get_body_composition(&self, start: NaiveDate, end: NaiveDate) -> Result<Value, ApiError> {
        self.get(
            "/weight-service/weight/dateRange",
            &[("startDate", iso(start)), ("endDate", iso(end))],
        )
        .await
    }

    async fn get_user_summary(&self, date: NaiveDate) -> Result<Value, ApiError> {
        self.get(
            &format!("/usersummary-service/usersummary/daily/{}", self.display_name),
            &[("calendarDate", iso(date))],
        )
        .await
    }

    async fn get_heart_rates(&self, date: NaiveDate) -> Result<Value, ApiError> {
        self.get(
            &format!("/wellness-service/wellness/dailyHeartRate/{}", self.display_name),
            &[("date", iso(date))],
        )
        .await
    }

    async fn get_hrv_data(&self, date: NaiveDate) -> Result<Value, ApiError> {
        self.get(&format!("/hrv-service/hrv/{}", iso(date)), &[]).await
    }

    async fn get_stress_data(&self, date: NaiveDate) -> Result<Value, ApiError> {
        self.get(&format!("/wellness-service/wellness/dailyStress/{}", iso(date)), &[])
            .await
    }

    // Garmin serves the daily stats from the same summary resource.
    async fn get_stats(&self, date: NaiveDate) -> Result<Value, ApiError> {
        self.get_user_summary(date).await
    }

    async fn get_steps_data(&self, date: NaiveDate) -> Result<Value, ApiError> {
        self.get(
            &format!("/wellness-service/wellness/dailySummaryChart/{}", self.display_name),
            &[("date", iso(date))],
        )
        .await
    }

    async fn get_hydration_data(&self, date: NaiveDate) -> Result<Value, ApiError> {
        self.get(
            &format!("/usersummary-service/usersummary/hydration/daily/{}", iso(date)),
            &[],
        )
        .await
    }

    async fn get_full_name(&self) -> Result<Option<String>, ApiError> {
        Ok(self.full_name.clone())
    }

    async fn get_unit_system(&self) -> Result<Option<String>, ApiError> {
        let settings = self
            .get("/userprofile-service/userprofile/user-settings", &[])
            .await?;
        Ok(settings
            .pointer("/userData/measurementSystem")
            .and_then(Value::as_str)
            .map(str::to_string))
    }

    async fn get_spo2_data(&self, date: NaiveDate) -> Result<Value, ApiError> {
        self.get(&format!("/wellness-service/wellness/daily/spo2/{}", iso(date)), &[])
            .await
    }

    async fn get_respiration_data(&self, date: NaiveDate) -> Result<Value, ApiError> {
        self.get(
            &format!("/wellness-service/wellness/daily/respiration/{}", iso(date)),
            &[],
        )
        .await
    }

    async fn get_training_status(&self, date: NaiveDate) -> Result<Value, ApiError> {
        self.get(
            &format!("/metrics-service/metrics/trainingstatus/aggregated/{}", iso(date)),
            &[],
        )
        .await
    }

    async fn get_training_readiness(&self, date: NaiveDate) -> Result<Value, ApiError> {
        self.get(
            &format!("/metrics-service/metrics/trainingreadiness/{}", iso(date)),
            &[],
        )
        .await
    }
}

async fn fetch_json(client: &Client, path: &str, query: &[(&str, String)]) -> Result<Value, ApiError> {
    let url = format!("{}{}", API_BASE, path);
    let response = client
        .get(&url)
        .query(query)
        .header("NK", "NT")
        .send()
        .await
        .map_err(|e| ApiError::UpstreamError(format!("Garmin API request failed: {}", e)))?;

    let status = response.status();
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(ApiError::SessionRejected(format!(
            "Garmin rejected the session ({}) for {}",
            status, path
        )));
    }

    if !status.is_success() {
        let error_text = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
        tracing::warn!("Garmin API returned error {} for {}: {}", status, path, error_text);
        return Err(ApiError::UpstreamError(format!(
            "Garmin API returned {}: {}",
            status, error_text
        )));
    }

    let body = response
        .bytes()
        .await
        .map_err(|e| ApiError::UpstreamError(format!("Failed to read Garmin response: {}", e)))?;
    parse_body(&body)
}

/// Garmin answers "no data" with 204 or an empty body; both become null.
fn parse_body(body: &[u8]) -> Result<Value, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Null);
    }
    serde_json::from_slice(body)
        .map_err(|e| ApiError::UpstreamError(format!("Failed to parse Garmin response: {}", e)))
}

fn login_request_failed(e: reqwest::Error) -> ApiError {
    ApiError::AuthenticationError(format!("Garmin login request failed: {}", e))
}

fn iso(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

fn capture(re: &Regex, haystack: &str) -> Option<String> {
    re.captures(haystack)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

fn csrf_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"name="_csrf"\s+value="([^"]+)""#).expect("csrf pattern"))
}

fn title_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<title>([^<]+)</title>").expect("title pattern"))
}

fn ticket_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"embed\?ticket=([^"]+)""#).expect("ticket pattern"))
}
