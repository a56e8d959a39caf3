use axum::{routing::get, routing::post, Router};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::config::Config;
use crate::server::api::{self, AppState};
use crate::server::api_doc::ApiDoc;
use crate::server::hub::Hub;
use crate::server::ingest::DeviceStore;
use crate::server::publisher::Advertised;
use crate::server::ws;

const FANOUT_CAPACITY: usize = 256;

pub async fn run_server(config: Config, advertise: Option<String>) -> std::io::Result<()> {
    let bind_addr = config.web.bind.clone();

    if config.web.admin_token.is_none() {
        log::warn!("no admin_token configured, the privileged channel is closed");
    }

    let store = DeviceStore::new(config.ingest.clone());
    let hub = Hub::new(FANOUT_CAPACITY);
    let advertised = Advertised::new(config.publish.clone());
    if let Some(url) = advertise {
        advertised.set(url).await;
    }

    let state = AppState {
        config: Arc::new(config),
        store: Arc::new(store),
        hub,
        advertised: Arc::new(advertised),
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/location", post(api::post_location))
        .route("/health", get(api::health))
        .route("/current-tunnel", get(api::current_tunnel))
        .route("/server-url.json", get(api::server_url))
        .route("/admin/api/devices", get(api::admin_devices))
        .route("/ws", get(ws::ws_handler))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    log::info!("Starting server on {}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await
}
