use std::sync::Arc;

use anonychat::{auth, config::Config, db::MessageStore, logging, rooms::Hub, AppState};
use anyhow::Context;
use axum::http::{HeaderValue, Method};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tower_sessions::{cookie::SameSite, Expiry, MemoryStore, SessionManagerLayer};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init_tracing();

    let config = Config::from_env()?;

    let session_store = MemoryStore::default();
    let session_layer = SessionManagerLayer::new(session_store)
        .with_secure(config.public_url.starts_with("https://"))
        .with_same_site(SameSite::Lax)
        .with_expiry(Expiry::OnInactivity(time::Duration::hours(1)));

    let store = MessageStore::connect(&config.database_url)
        .await
        .with_context(|| format!("failed to open {}", config.database_url))?;

    let clients = auth::Clients::from_config(&config).map_err(|e| e.0)?;

    let origins = config.cors_origins.iter()
        .map(|origin| HeaderValue::from_str(origin))
        .collect::<Result<Vec<_>, _>>()
        .context("invalid CORS_ORIGINS")?;
    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([axum::http::header::AUTHORIZATION, axum::http::header::CONTENT_TYPE])
        .allow_credentials(true);

    let port = config.port;
    let app_state = AppState {
        store,
        hub: Hub::new(),
        verifier: Arc::new(auth::FirebaseVerifier::new(config.firebase_project_id.clone())),
        clients,
        config: Arc::new(config),
    };

    let app = anonychat::router()
        .with_state(app_state)
        .layer(session_layer)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    tracing::info!(port, "server running");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    Ok(())
}
