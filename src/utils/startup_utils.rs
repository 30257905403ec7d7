use std::{
    net::{IpAddr, SocketAddr},
    sync::Arc,
};

use axum::{Router, middleware, routing::get};
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use crate::{
    api::{auth::require_api_key, endpoints::{not_found, read_endpoint}, health::{health_check, service_info}},
    error::ApiError,
    services::{
        garmin_client::{GarminConnectConnector, GarminConnector},
        session_manager::{GarminConfig, SessionManager},
    },
    utils::env_utils::{self, EnvLookup},
};

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 10000;
const DEFAULT_LOG_FILTER: &str = "garmin_bridge=info,tower_http=info";

#[derive(Clone)]
pub struct ServerConfig {
    pub api_key: Option<String>,
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ApiError> {
        Self::from_lookup(&env_utils::process_env)
    }

    pub fn from_lookup(lookup: &EnvLookup<'_>) -> Result<Self, ApiError> {
        Ok(Self {
            api_key: env_utils::non_empty(lookup, "API_KEY"),
            host: env_utils::non_empty(lookup, "HOST").unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: env_utils::parse_number(lookup, "PORT", DEFAULT_PORT)?,
        })
    }

    pub fn bind_addr(&self) -> Result<SocketAddr, ApiError> {
        // parsed as a bare IP so IPv6 hosts like `::` need no brackets
        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|e| ApiError::StartupError(format!("Invalid HOST {}: {}", self.host, e)))?;
        Ok(SocketAddr::new(ip, self.port))
    }
}

pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

pub fn get_session_manager(garmin_config: GarminConfig) -> Arc<SessionManager> {
    let connector: Arc<dyn GarminConnector> =
        Arc::new(GarminConnectConnector::new(garmin_config.token_dir.clone()));
    Arc::new(SessionManager::new(garmin_config, connector))
}

// AppState is handed to every handler and to the auth middleware
#[derive(Clone)]
pub struct AppState {
    pub session_manager: Arc<SessionManager>,
    pub api_key: Option<Arc<str>>,
}

impl AppState {
    pub fn new(session_manager: Arc<SessionManager>, api_key: Option<String>) -> Self {
        AppState {
            session_manager,
            api_key: api_key.map(Arc::from),
        }
    }
}

pub fn create_app(state: AppState) -> Router {
    let api = Router::new()
        .route("/api/:endpoint", get(read_endpoint))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_api_key));

    Router::new()
        .route("/", get(service_info))
        .route("/health", get(health_check))
        .merge(api)
        .fallback(not_found)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown");
}

pub async fn create_server(state: AppState, config: &ServerConfig) -> Result<(), ApiError> {
    let app = create_app(state);
    let addr = config.bind_addr()?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ApiError::StartupError(format!("Failed to bind {}: {}", addr, e)))?;

    tracing::info!("Garmin bridge listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| ApiError::StartupError(format!("Server error: {}", e)))
}
