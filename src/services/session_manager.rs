use std::{path::{Path, PathBuf}, sync::Arc, time::Duration};

use tokio::{sync::Mutex, time::Instant};

use crate::{
    error::ApiError,
    models::session::{Credentials, SessionStatus},
    services::garmin_client::{GarminApi, GarminConnector, TOKEN_ARTIFACTS},
    utils::env_utils::{self, EnvLookup},
};

pub const DEFAULT_SESSION_TTL_MINUTES: u64 = 30;
const DEFAULT_TOKEN_DIR: &str = ".garminconnect";

#[derive(Clone, Debug)]
pub struct GarminConfig {
    pub credentials: Option<Credentials>,
    pub token_dir: PathBuf,
    pub clear_tokens_on_login: bool,
    pub session_ttl: Duration,
}

impl GarminConfig {
    pub fn from_env() -> Result<Self, ApiError> {
        Self::from_lookup(&env_utils::process_env)
    }

    /// Missing credentials are not an error here: the service still boots and
    /// reports a configuration error on the first data request.
    pub fn from_lookup(lookup: &EnvLookup<'_>) -> Result<Self, ApiError> {
        let credentials = match (
            env_utils::non_empty(lookup, "GARMIN_EMAIL"),
            env_utils::non_empty(lookup, "GARMIN_PASSWORD"),
        ) {
            (Some(email), Some(password)) => Some(Credentials::new(email, password)),
            _ => None,
        };

        let token_dir = env_utils::non_empty(lookup, "GARMINTOKENS")
            .map(|dir| expand_home(&dir))
            .unwrap_or_else(default_token_dir);

        let clear_tokens_on_login = env_utils::parse_bool(lookup, "CLEAR_TOKENS_ON_LOGIN", true)?;
        let ttl_minutes: u64 = env_utils::parse_number(lookup, "SESSION_TTL_MINUTES", DEFAULT_SESSION_TTL_MINUTES)?;
        let ttl_seconds = ttl_minutes.checked_mul(60).ok_or_else(|| {
            ApiError::ConfigurationError(format!("SESSION_TTL_MINUTES is too large: {}", ttl_minutes))
        })?;

        Ok(Self {
            credentials,
            token_dir,
            clear_tokens_on_login,
            session_ttl: Duration::from_secs(ttl_seconds),
        })
    }
}

fn default_token_dir() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(DEFAULT_TOKEN_DIR))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_TOKEN_DIR))
}

fn expand_home(dir: &str) -> PathBuf {
    match (dir.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(dir),
    }
}

struct CachedSession {
    api: Arc<dyn GarminApi>,
    created_at: Instant,
}

/// Owns the single Garmin session of the process.
///
/// The whole check-expiry / clear-artifacts / login / store sequence runs
/// under one lock, so concurrent requests that find the session expired
/// produce a single login and all receive the same handle.
pub struct SessionManager {
    config: GarminConfig,
    connector: Arc<dyn GarminConnector>,
    cache: Mutex<Option<CachedSession>>,
}

impl SessionManager {
    pub fn new(config: GarminConfig, connector: Arc<dyn GarminConnector>) -> Self {
        SessionManager {
            config,
            connector,
            cache: Mutex::new(None),
        }
    }

    pub async fn acquire_session(&self) -> Result<Arc<dyn GarminApi>, ApiError> {
        let mut cache = self.cache.lock().await;

        if let Some(cached) = cache.as_ref() {
            let age = cached.created_at.elapsed();
            if age < self.config.session_ttl {
                tracing::debug!("Using cached Garmin session ({}s old)", age.as_secs());
                return Ok(Arc::clone(&cached.api));
            }
            tracing::info!("Found expired Garmin session ({}s old). Evicting.", age.as_secs());
            *cache = None;
        }

        let credentials = self.config.credentials.as_ref().ok_or_else(|| {
            ApiError::ConfigurationError(
                "Missing GARMIN_EMAIL or GARMIN_PASSWORD environment variable".to_string(),
            )
        })?;

        if self.config.clear_tokens_on_login {
            clear_token_dir(&self.config.token_dir).await;
        }

        tracing::info!("No valid session. Logging in to Garmin Connect...");
        let api = self.connector.login(credentials).await.map_err(|e| match e {
            ApiError::AuthenticationError(_) | ApiError::ConfigurationError(_) => e,
            other => ApiError::AuthenticationError(other.to_string()),
        })?;

        *cache = Some(CachedSession {
            api: Arc::clone(&api),
            created_at: Instant::now(),
        });
        tracing::info!("Garmin login successful. Session cached for {} minutes.", self.config.session_ttl.as_secs() / 60);

        Ok(api)
    }

    /// Reports the cache without touching the network.
    pub async fn session_status(&self) -> SessionStatus {
        let cache = self.cache.lock().await;
        match cache.as_ref() {
            Some(cached) if cached.created_at.elapsed() < self.config.session_ttl => SessionStatus {
                active: true,
                age_seconds: Some(cached.created_at.elapsed().as_secs()),
            },
            _ => SessionStatus {
                active: false,
                age_seconds: None,
            },
        }
    }

    /// Drops the cached session, but only if it is still `rejected`. A
    /// request that held an older handle must not evict a newer login.
    pub async fn invalidate(&self, rejected: &Arc<dyn GarminApi>) {
        let mut cache = self.cache.lock().await;
        let is_current = cache
            .as_ref()
            .is_some_and(|cached| Arc::ptr_eq(&cached.api, rejected));

        if is_current {
            *cache = None;
            tracing::warn!("Garmin session invalidated; next request will log in again.");
        } else {
            tracing::debug!("Ignoring rejection of a session that is no longer cached.");
        }
    }
}

/// Removes the token files a previous login left behind. Only known
/// artifact names are touched; the directory and anything else in it stay.
async fn clear_token_dir(dir: &Path) {
    for name in TOKEN_ARTIFACTS {
        let path = dir.join(name);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => tracing::debug!("Removed stale token artifact {}", path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!("Could not remove token artifact {}: {}", path.display(), e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use serde_json::Value;
    use std::{collections::HashMap, sync::atomic::{AtomicUsize, Ordering}};

    struct NullApi;

    #[async_trait]
    impl GarminApi for NullApi {
        async fn get_activities(&self, _: u32, _: u32) -> Result<Value, ApiError> { Ok(Value::Null) }
        async fn get_sleep_data(&self, _: NaiveDate) -> Result<Value, ApiError> { Ok(Value::Null) }
        async fn get_body_composition(&self, _: NaiveDate, _: NaiveDate) -> Result<Value, ApiError> { Ok(Value::Null) }
        async fn get_user_summary(&self, _: NaiveDate) -> Result<Value, ApiError> { Ok(Value::Null) }
        async fn get_heart_rates(&self, _: NaiveDate) -> Result<Value, ApiError> { Ok(Value::Null) }
        async fn get_hrv_data(&self, _: NaiveDate) -> Result<Value, ApiError> { Ok(Value::Null) }
        async fn get_stress_data(&self, _: NaiveDate) -> Result<Value, ApiError> { Ok(Value::Null) }
        async fn get_stats(&self, _: NaiveDate) -> Result<Value, ApiError> { Ok(Value::Null) }
        async fn get_steps_data(&self, _: NaiveDate) -> Result<Value, ApiError> { Ok(Value::Null) }
        async fn get_hydration_data(&self, _: NaiveDate) -> Result<Value, ApiError> { Ok(Value::Null) }
        async fn get_full_name(&self) -> Result<Option<String>, ApiError> { Ok(None) }
        async fn get_unit_system(&self) -> Result<Option<String>, ApiError> { Ok(None) }
        async fn get_spo2_data(&self, _: NaiveDate) -> Result<Value, ApiError> { Ok(Value::Null) }
        async fn get_respiration_data(&self, _: NaiveDate) -> Result<Value, ApiError> { Ok(Value::Null) }
        async fn get_training_status(&self, _: NaiveDate) -> Result<Value, ApiError> { Ok(Value::Null) }
        async fn get_training_readiness(&self, _: NaiveDate) -> Result<Value, ApiError> { Ok(Value::Null) }
    }

    #[derive(Default)]
    struct CountingConnector {
        logins: AtomicUsize,
        reject: bool,
    }

    #[async_trait]
    impl GarminConnector for CountingConnector {
        async fn login(&self, _credentials: &Credentials) -> Result<Arc<dyn GarminApi>, ApiError> {
            self.logins.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            if self.reject {
                return Err(ApiError::AuthenticationError("Invalid username or password".to_string()));
            }
            Ok(Arc::new(NullApi))
        }
    }

    fn config(token_dir: PathBuf, clear: bool) -> GarminConfig {
        GarminConfig {
            credentials: Some(Credentials::new("runner@example.com", "secret")),
            token_dir,
            clear_tokens_on_login: clear,
            session_ttl: Duration::from_secs(30 * 60),
        }
    }

    fn manager(connector: Arc<CountingConnector>) -> SessionManager {
        SessionManager::new(config(PathBuf::from("unused-token-dir"), false), connector)
    }

    #[tokio::test(start_paused = true)]
    async fn reuses_session_within_window() {
        let connector = Arc::new(CountingConnector::default());
        let manager = manager(Arc::clone(&connector));

        let first = manager.acquire_session().await.unwrap();
        tokio::time::advance(Duration::from_secs(29 * 60)).await;
        let second = manager.acquire_session().await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(connector.logins.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn logs_in_again_after_window() {
        let connector = Arc::new(CountingConnector::default());
        let manager = manager(Arc::clone(&connector));

        let first = manager.acquire_session().await.unwrap();
        tokio::time::advance(Duration::from_secs(31 * 60)).await;
        let second = manager.acquire_session().await.unwrap();
        let third = manager.acquire_session().await.unwrap();

        assert!(!Arc::ptr_eq(&first, &second));
        assert!(Arc::ptr_eq(&second, &third));
        assert_eq!(connector.logins.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_acquisitions_share_one_login() {
        let connector = Arc::new(CountingConnector::default());
        let manager = Arc::new(manager(Arc::clone(&connector)));

        let (a, b) = tokio::join!(manager.acquire_session(), manager.acquire_session());

        assert!(Arc::ptr_eq(&a.unwrap(), &b.unwrap()));
        assert_eq!(connector.logins.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn missing_credentials_is_configuration_error() {
        let connector = Arc::new(CountingConnector::default());
        let mut cfg = config(PathBuf::from("unused-token-dir"), false);
        cfg.credentials = None;
        let manager = SessionManager::new(cfg, connector.clone());

        let err = manager.acquire_session().await.err().unwrap();
        assert!(matches!(err, ApiError::ConfigurationError(_)));
        assert_eq!(connector.logins.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn rejected_login_is_not_cached() {
        let connector = Arc::new(CountingConnector { reject: true, ..Default::default() });
        let manager = manager(Arc::clone(&connector));

        let err = manager.acquire_session().await.err().unwrap();
        assert_eq!(err.to_string(), "Invalid username or password");
        assert!(!manager.session_status().await.active);

        let _ = manager.acquire_session().await;
        assert_eq!(connector.logins.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn invalidate_forces_new_login() {
        let connector = Arc::new(CountingConnector::default());
        let manager = manager(Arc::clone(&connector));

        let first = manager.acquire_session().await.unwrap();
        assert!(manager.session_status().await.active);
        manager.invalidate(&first).await;
        assert!(!manager.session_status().await.active);
        manager.acquire_session().await.unwrap();

        assert_eq!(connector.logins.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn late_rejection_of_old_session_keeps_newer_one() {
        let connector = Arc::new(CountingConnector::default());
        let manager = manager(Arc::clone(&connector));

        let old = manager.acquire_session().await.unwrap();
        manager.invalidate(&old).await;
        let current = manager.acquire_session().await.unwrap();

        // a request still holding the old handle reports its 401 late
        manager.invalidate(&old).await;
        let after = manager.acquire_session().await.unwrap();

        assert!(Arc::ptr_eq(&current, &after));
        assert!(manager.session_status().await.active);
        assert_eq!(connector.logins.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn clears_stale_artifacts_before_login_when_enabled() {
        let tmp = tempfile::tempdir().unwrap();
        let token_dir = tmp.path().join("tokens");
        std::fs::create_dir_all(&token_dir).unwrap();
        std::fs::write(token_dir.join("oauth2_token.json"), "{}").unwrap();
        std::fs::write(token_dir.join("session.json"), "{}").unwrap();
        std::fs::write(token_dir.join("notes.txt"), "keep me").unwrap();

        let manager = SessionManager::new(config(token_dir.clone(), true), Arc::new(CountingConnector::default()));
        manager.acquire_session().await.unwrap();

        assert!(!token_dir.join("oauth2_token.json").exists());
        assert!(!token_dir.join("session.json").exists());
        assert!(token_dir.join("notes.txt").exists());
        assert!(token_dir.is_dir());
    }

    #[tokio::test]
    async fn clearing_a_missing_token_dir_is_harmless() {
        let tmp = tempfile::tempdir().unwrap();
        let manager = SessionManager::new(
            config(tmp.path().join("never-created"), true),
            Arc::new(CountingConnector::default()),
        );
        assert!(manager.acquire_session().await.is_ok());
    }

    #[tokio::test]
    async fn keeps_artifacts_when_clearing_disabled() {
        let tmp = tempfile::tempdir().unwrap();
        let token_dir = tmp.path().join("tokens");
        std::fs::create_dir_all(&token_dir).unwrap();
        std::fs::write(token_dir.join("oauth2_token.json"), "{}").unwrap();

        let manager = SessionManager::new(config(token_dir.clone(), false), Arc::new(CountingConnector::default()));
        manager.acquire_session().await.unwrap();

        assert!(token_dir.join("oauth2_token.json").exists());
    }

    #[test]
    fn config_reads_environment() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("GARMIN_EMAIL", "runner@example.com"),
            ("GARMIN_PASSWORD", "secret"),
            ("GARMINTOKENS", "/tmp/garmin-tokens"),
            ("CLEAR_TOKENS_ON_LOGIN", "false"),
            ("SESSION_TTL_MINUTES", "10"),
        ]);
        let lookup = |key: &str| vars.get(key).map(|v| v.to_string());

        let cfg = GarminConfig::from_lookup(&lookup).unwrap();
        assert_eq!(cfg.credentials, Some(Credentials::new("runner@example.com", "secret")));
        assert_eq!(cfg.token_dir, PathBuf::from("/tmp/garmin-tokens"));
        assert!(!cfg.clear_tokens_on_login);
        assert_eq!(cfg.session_ttl, Duration::from_secs(600));
    }

    #[test]
    fn config_defaults() {
        let lookup = |_: &str| -> Option<String> { None };
        let cfg = GarminConfig::from_lookup(&lookup).unwrap();
        assert!(cfg.credentials.is_none());
        assert!(cfg.clear_tokens_on_login);
        assert_eq!(cfg.session_ttl, Duration::from_secs(30 * 60));
        assert!(cfg.token_dir.ends_with(".garminconnect"));
    }

    #[test]
    fn config_rejects_malformed_ttl() {
        let lookup = |key: &str| (key == "SESSION_TTL_MINUTES").then(|| "half an hour".to_string());
        assert!(matches!(GarminConfig::from_lookup(&lookup), Err(ApiError::ConfigurationError(_))));
    }

    #[test]
    fn config_rejects_overflowing_ttl() {
        let lookup = |key: &str| (key == "SESSION_TTL_MINUTES").then(|| "307445734561825861".to_string());
        assert!(matches!(GarminConfig::from_lookup(&lookup), Err(ApiError::ConfigurationError(_))));
    }
}
