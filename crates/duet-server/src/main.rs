mod config;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router,
    extract::{State, WebSocketUpgrade},
    http::{Method, header::{AUTHORIZATION, CONTENT_TYPE}},
    response::IntoResponse,
    routing::get,
};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use duet_api::channel::MessageChannel;
use duet_api::state::AppStateInner;
use duet_db::Database;
use duet_gateway::connection;
use duet_gateway::dispatcher::Dispatcher;
use duet_gateway::live::LiveQuery;
use duet_media::signer::HmacSigner;
use duet_media::storage::ObjectStorage;

use crate::config::Config;

#[derive(Clone)]
struct GatewayState {
    live: LiveQuery,
    jwt_secret: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "duet=debug,tower_http=debug".into()),
        )
        .init();

    let config = Config::from_env()?;

    let db = Arc::new(Database::open(&config.db_path)?);
    let storage = Arc::new(ObjectStorage::new(config.media_dir.clone()).await?);
    let channel = MessageChannel::new(db, Dispatcher::new());

    let gateway = GatewayState {
        live: channel.live().clone(),
        jwt_secret: config.jwt_secret.clone(),
    };
    let state = Arc::new(AppStateInner {
        channel,
        storage,
        signer: HmacSigner::new(&config.media_secret, &config.public_url),
        jwt_secret: config.jwt_secret.clone(),
        max_upload_bytes: config.max_upload_bytes,
    });

    let ws_route = Router::new()
        .route("/gateway", get(ws_upgrade))
        .with_state(gateway);

    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::any())
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE])
        .allow_credentials(false);

    let app = Router::new()
        .merge(duet_api::routes::router(state))
        .merge(ws_route)
        .route("/health", get(health))
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("Duet server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn ws_upgrade(State(state): State<GatewayState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| connection::handle_connection(socket, state.live, state.jwt_secret))
}

async fn health() -> &'static str {
    "ok"
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => tokio::select! {
                _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
                _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
            },
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                ctrl_c.await.ok();
                info!("Received Ctrl+C, shutting down...");
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
