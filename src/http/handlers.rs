//! Route handlers.
//!
//! Handlers only translate between HTTP and the services; every decision
//! lives in `builder` and `access`.

use axum::{
    extract::{rejection::JsonRejection, rejection::QueryRejection, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::access::RedeemedData;
use crate::builder::{BuildRequest, ConfigResult, SettingsUpdate, SettingsView};
use crate::error::{GatewayError, GatewayResult};
use crate::http::server::AppState;
use crate::security::CallerContext;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ConfigQuery {
    pub id: String,
    pub name: String,
    pub key: String,
    pub deal_id: String,
    pub dark: bool,
}

/// `GET /api/config`
pub async fn get_config(
    State(state): State<AppState>,
    caller: CallerContext,
    headers: HeaderMap,
    query: Result<Query<ConfigQuery>, QueryRejection>,
) -> GatewayResult<Json<ConfigResult>> {
    let Query(query) = query.map_err(|e| GatewayError::ValidationFailed(e.body_text()))?;
    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();

    let request = BuildRequest {
        user_id: caller.user_id,
        tenant_id: caller.tenant_id,
        deal_id: query.deal_id.trim().to_string(),
        file_id: query.id.trim().to_string(),
        file_name: query.name.trim().to_string(),
        doc_key: query.key.trim().to_string(),
        user_agent,
        dark_mode: query.dark,
    };

    let config = state.config_service.build(request).await?;
    Ok(Json(config))
}

/// `GET /api/settings`
pub async fn get_settings(
    State(state): State<AppState>,
    caller: CallerContext,
) -> GatewayResult<Json<SettingsView>> {
    let view = state.settings_service.get(caller).await?;
    Ok(Json(view))
}

/// `POST /api/settings`
pub async fn save_settings(
    State(state): State<AppState>,
    caller: CallerContext,
    body: Result<Json<SettingsUpdate>, JsonRejection>,
) -> Response {
    let update = match body {
        Ok(Json(update)) => update,
        Err(rejection) if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE => {
            return rejection.into_response();
        }
        Err(rejection) => return GatewayError::ValidationFailed(rejection.body_text()).into_response(),
    };

    match state.settings_service.save(caller, update).await {
        Ok(()) => StatusCode::CREATED.into_response(),
        Err(err) => err.into_response(),
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct DataQuery {
    pub code: String,
}

/// `GET /api/data`
pub async fn get_data(
    State(state): State<AppState>,
    caller: CallerContext,
    query: Result<Query<DataQuery>, QueryRejection>,
) -> GatewayResult<Json<RedeemedData>> {
    let Query(query) = query.map_err(|e| GatewayError::ValidationFailed(e.body_text()))?;
    let redeemed = state.access.redeem(caller, query.code.trim()).await?;
    Ok(Json(redeemed))
}

#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
    pub version: &'static str,
    pub dependencies: BTreeMap<&'static str, &'static str>,
}

/// `GET /health`. Liveness plus breaker states; open breakers do not fail it.
pub async fn health(State(state): State<AppState>) -> Json<HealthStatus> {
    let dependencies = state
        .deps
        .breaker_states()
        .into_iter()
        .map(|(name, breaker)| (name, breaker.as_str()))
        .collect();

    Json(HealthStatus {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        dependencies,
    })
}
