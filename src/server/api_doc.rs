use utoipa::OpenApi;

use super::api::{DevicesResponse, LocationRequest, LocationResponse, ServerUrlResponse};
use super::error::ErrorResponse;
use crate::server::ingest::DeviceRecord;

#[derive(OpenApi)]
#[openapi(
    paths(
        super::api::post_location,
        super::api::health,
        super::api::current_tunnel,
        super::api::server_url,
        super::api::admin_devices,
    ),
    components(
        schemas(
            LocationRequest,
            LocationResponse,
            ServerUrlResponse,
            DevicesResponse,
            DeviceRecord,
            ErrorResponse,
        )
    ),
    info(
        title = "Waylink Relay API",
        description = "Location ingestion, discovery, and admin API",
        version = "0.1.0"
    ),
    tags(
        (name = "location", description = "Location ingestion"),
        (name = "discovery", description = "Endpoint discovery reads"),
        (name = "admin", description = "Privileged device overview")
    )
)]
pub struct ApiDoc;
