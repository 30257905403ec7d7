use garmin_bridge::{
    error::ApiError,
    services::{dispatcher, session_manager::GarminConfig},
    utils::startup_utils::{self, AppState, ServerConfig},
};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    startup_utils::init_tracing();

    if let Err(e) = run().await {
        tracing::error!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), ApiError> {
    dispatcher::verify_endpoint_table()?;

    let server_config = ServerConfig::from_env()?;
    let garmin_config = GarminConfig::from_env()?;

    if garmin_config.credentials.is_none() {
        tracing::warn!("GARMIN_EMAIL or GARMIN_PASSWORD is not set; data endpoints will fail until it is.");
    }
    if server_config.api_key.is_none() {
        tracing::warn!("API_KEY is not set; every /api request will be rejected.");
    }
    tracing::info!(
        "Token directory {} (cleared before each login: {})",
        garmin_config.token_dir.display(),
        garmin_config.clear_tokens_on_login
    );

    let session_manager = startup_utils::get_session_manager(garmin_config);
    let state = AppState::new(session_manager, server_config.api_key.clone());

    startup_utils::create_server(state, &server_config).await
}
