use axum::{
    Json,
    extract::{Path, Query, State, rejection::QueryRejection},
};
use chrono::Local;
use serde_json::Value;

use crate::{
    error::ApiError,
    models::endpoint::{EndpointParams, EndpointQuery},
    services::dispatcher,
    utils::startup_utils::AppState,
};

pub async fn read_endpoint(
    State(state): State<AppState>,
    Path(name): Path<String>,
    query: Result<Query<EndpointQuery>, QueryRejection>,
) -> Result<Json<Value>, ApiError> {
    let endpoint = dispatcher::resolve(&name)?;
    let Query(query) = query.map_err(|e| ApiError::BadRequest(format!("Invalid query string: {}", e.body_text())))?;
    let params = EndpointParams::resolve(&query, Local::now().date_naive())?;

    let session = state.session_manager.acquire_session().await?;
    match dispatcher::dispatch(endpoint, &params, session.as_ref()).await {
        Ok(body) => Ok(Json(body)),
        Err(e @ ApiError::SessionRejected(_)) => {
            state.session_manager.invalidate(&session).await;
            Err(e)
        }
        Err(e) => Err(e),
    }
}

pub async fn not_found() -> ApiError {
    ApiError::NotFound("Not found".to_string())
}
