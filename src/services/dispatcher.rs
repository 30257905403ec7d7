use std::{collections::HashSet, str::FromStr};

use serde_json::Value;

use crate::{
    error::ApiError,
    models::endpoint::{Endpoint, EndpointParams},
    services::{garmin_client::GarminApi, reshape},
};

/// Resolves the name first so unknown endpoints never cost a login.
pub fn resolve(name: &str) -> Result<Endpoint, ApiError> {
    Endpoint::from_str(name)
}

pub async fn handle(
    endpoint_name: &str,
    params: &EndpointParams,
    session: &dyn GarminApi,
) -> Result<Value, ApiError> {
    let endpoint = resolve(endpoint_name)?;
    dispatch(endpoint, params, session).await
}

/// One upstream call per endpoint, reshaped where the endpoint has a
/// simplified schema and passed through otherwise.
pub async fn dispatch(
    endpoint: Endpoint,
    params: &EndpointParams,
    session: &dyn GarminApi,
) -> Result<Value, ApiError> {
    tracing::debug!("Dispatching {} with {:?}", endpoint, params);

    match endpoint {
        Endpoint::Activities => session.get_activities(params.start, params.limit).await,
        Endpoint::Sleep => {
            let raw = session.get_sleep_data(params.date).await?;
            reshape::reshape_sleep(&raw, params.date)
        }
        Endpoint::BodyComposition => {
            let raw = session
                .get_body_composition(params.start_date, params.end_date)
                .await?;
            reshape::reshape_body_composition(&raw, params.start_date, params.end_date)
        }
        Endpoint::UserSummary => session.get_user_summary(params.date).await,
        Endpoint::HeartRate => session.get_heart_rates(params.date).await,
        Endpoint::Hrv => session.get_hrv_data(params.date).await,
        Endpoint::Stress => session.get_stress_data(params.date).await,
        Endpoint::Stats => session.get_stats(params.date).await,
        Endpoint::Steps => session.get_steps_data(params.date).await,
        Endpoint::Hydration => session.get_hydration_data(params.date).await,
        Endpoint::UserProfile => {
            let full_name = session.get_full_name().await?;
            let unit_system = session.get_unit_system().await?;
            reshape::reshape_user_profile(full_name, unit_system)
        }
        Endpoint::Spo2 => session.get_spo2_data(params.date).await,
        Endpoint::Respiration => session.get_respiration_data(params.date).await,
        Endpoint::TrainingStatus => session.get_training_status(params.date).await,
        Endpoint::TrainingReadiness => session.get_training_readiness(params.date).await,
    }
}

/// Startup check that the advertised endpoint list and the name lookup agree.
pub fn verify_endpoint_table() -> Result<(), ApiError> {
    let mut seen = HashSet::new();
    for endpoint in Endpoint::ALL {
        if !seen.insert(endpoint.as_str()) {
            return Err(ApiError::StartupError(format!(
                "Endpoint {} is advertised twice",
                endpoint
            )));
        }
        match resolve(endpoint.as_str()) {
            Ok(resolved) if resolved == endpoint => {}
            _ => {
                return Err(ApiError::StartupError(format!(
                    "Endpoint {} does not resolve to its handler",
                    endpoint
                )));
            }
        }
    }
    tracing::info!("Endpoint table verified ({} endpoints)", seen.len());
    Ok(())
}
