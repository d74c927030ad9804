//! HTTP handlers.

use std::net::SocketAddr;

use axum::extract::{ConnectInfo, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::Deserialize;

use super::middleware::client_ip;
use super::types::{ApiError, ApiResponse, AppState, VersionInfo};
use crate::geoip::IpInfo;

#[derive(Debug, Deserialize)]
pub struct IpQuery {
    #[serde(default)]
    pub ip: String,
}

/// `GET /ip-info?ip=<addr>`
pub async fn ip_info_handler(
    State(state): State<AppState>,
    Query(query): Query<IpQuery>,
) -> Result<Json<ApiResponse<IpInfo>>, ApiError> {
    let info = state.locator.resolve(&query.ip).await?;
    Ok(Json(ApiResponse::ok(info)))
}

/// `GET /client-ip`: locates the caller.
pub async fn client_ip_handler(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Result<Json<ApiResponse<IpInfo>>, ApiError> {
    let ip = client_ip(&headers, peer);
    let info = state.locator.resolve(&ip).await?;
    Ok(Json(ApiResponse::ok(info)))
}

/// `GET /healthz`
pub async fn healthz_handler() -> &'static str {
    "ok"
}

/// `GET /version`
pub async fn version_handler(State(state): State<AppState>) -> Json<ApiResponse<VersionInfo>> {
    Json(ApiResponse::ok(VersionInfo {
        version: state.version.to_string(),
    }))
}
