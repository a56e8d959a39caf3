use axum::{
    extract::{FromRequestParts, State},
    http::request::Parts,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

use crate::config::Config;
use crate::server::error::{ApiError, ApiResult, ErrorResponse};
use crate::server::hub::Hub;
use crate::server::ingest::{DeviceRecord, DeviceStore, IngestOutcome};
use crate::server::publisher::Advertised;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<DeviceStore>,
    pub hub: Hub,
    pub advertised: Arc<Advertised>,
}

/// Privileged caller, authenticated by the shared admin token in the
/// `x-admin-token` header or a `token` query parameter.
pub struct AdminUser;

impl FromRequestParts<AppState> for AdminUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let expected = state
            .config
            .web
            .admin_token
            .as_deref()
            .ok_or(ApiError::Unauthorized)?;

        let header = parts
            .headers
            .get("x-admin-token")
            .and_then(|v| v.to_str().ok());
        if header == Some(expected) {
            return Ok(AdminUser);
        }

        let query = parts.uri.query().and_then(query_token);
        if query.as_deref() == Some(expected) {
            return Ok(AdminUser);
        }

        Err(ApiError::Unauthorized)
    }
}

fn query_token(query: &str) -> Option<String> {
    query.split('&').find_map(|pair| {
        let raw = pair.strip_prefix("token=")?;
        Some(match urlencoding::decode(raw) {
            Ok(decoded) => decoded.into_owned(),
            Err(_) => raw.to_string(),
        })
    })
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct LocationRequest {
    #[serde(rename = "userId", default)]
    pub user_id: Option<String>,
    pub lat: f64,
    pub lon: f64,
    #[serde(default)]
    pub ts: Option<f64>,
    #[serde(default)]
    pub heartbeat: Option<bool>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LocationResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skipped: Option<&'static str>,
}

#[utoipa::path(
    post,
    path = "/location",
    tag = "location",
    request_body = LocationRequest,
    responses(
        (status = 200, description = "Sample accepted or acknowledged-but-skipped", body = LocationResponse),
        (status = 400, description = "Missing or invalid coordinates", body = ErrorResponse)
    )
)]
pub async fn post_location(
    State(state): State<AppState>,
    Json(request): Json<LocationRequest>,
) -> ApiResult<Json<LocationResponse>> {
    let user_id = request.user_id.unwrap_or_else(|| "anon".to_string());
    let ts = match request.ts {
        Some(t) if t.is_finite() => t as i64,
        _ => chrono::Utc::now().timestamp_millis(),
    };

    match state.store.ingest(&user_id, request.lat, request.lon, ts) {
        IngestOutcome::Rejected => Err(ApiError::Validation(
            "missing or invalid coords".to_string(),
        )),
        IngestOutcome::Skipped(reason) => Ok(Json(LocationResponse {
            ok: true,
            first: None,
            skipped: Some(reason.as_str()),
        })),
        IngestOutcome::Accepted { first } => {
            log::info!(
                "{} -> {:.6}, {:.6}{}",
                user_id,
                request.lat,
                request.lon,
                if request.heartbeat == Some(true) {
                    " (heartbeat)"
                } else {
                    ""
                }
            );
            state.hub.publish(DeviceRecord {
                user_id,
                lat: request.lat,
                lon: request.lon,
                ts,
            });
            Ok(Json(LocationResponse {
                ok: true,
                first: first.then_some(true),
                skipped: None,
            }))
        }
    }
}

#[utoipa::path(
    get,
    path = "/health",
    tag = "discovery",
    responses((status = 200, description = "Liveness", body = String))
)]
pub async fn health() -> &'static str {
    "OK"
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ServerUrlResponse {
    pub server: Option<String>,
}

#[utoipa::path(
    get,
    path = "/current-tunnel",
    tag = "discovery",
    responses((status = 200, description = "Currently advertised endpoint", body = ServerUrlResponse))
)]
pub async fn current_tunnel(State(state): State<AppState>) -> Json<ServerUrlResponse> {
    Json(ServerUrlResponse {
        server: state.advertised.current(),
    })
}

#[utoipa::path(
    get,
    path = "/server-url.json",
    tag = "discovery",
    responses((status = 200, description = "Currently advertised endpoint", body = ServerUrlResponse))
)]
pub async fn server_url(State(state): State<AppState>) -> Json<ServerUrlResponse> {
    Json(ServerUrlResponse {
        server: state.advertised.current(),
    })
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DevicesResponse {
    pub ok: bool,
    pub devices: Vec<DeviceRecord>,
}

#[utoipa::path(
    get,
    path = "/admin/api/devices",
    tag = "admin",
    params(
        ("token" = Option<String>, Query, description = "Admin token (alternative to the x-admin-token header)")
    ),
    responses(
        (status = 200, description = "All known device records", body = DevicesResponse),
        (status = 401, description = "Bad or missing admin token")
    )
)]
pub async fn admin_devices(
    State(state): State<AppState>,
    _user: AdminUser,
) -> Json<DevicesResponse> {
    Json(DevicesResponse {
        ok: true,
        devices: state.store.snapshot(),
    })
}
