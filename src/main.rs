//! Flood Relief Backend
//!
//! Coordinates victims' help requests, relief organizations, rescuer teams and
//! missions over a REST API with SQLite persistence.

mod access;
mod api;
mod auth;
mod config;
mod db;
mod errors;
mod models;
mod services;

use std::sync::Arc;

use axum::{
    middleware,
    routing::{delete, get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use config::Config;
use db::Repository;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<Repository>,
    pub config: Arc<Config>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::from_env()?;

    // Initialize logging
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Flood Relief Backend");
    tracing::info!("Database path: {:?}", config.db_path);
    tracing::info!("Bind address: {}", config.bind_addr);
    tracing::info!("Zone cell size: {} degrees", config.zone_cell_degrees);

    // Warn if PSK is not configured
    if config.api_psk.is_none() {
        tracing::warn!("No API PSK configured (FLOOD_API_PSK). Deployment key check is disabled!");
    }
    if config.bootstrap_admin_email.is_none() {
        tracing::warn!("No FLOOD_BOOTSTRAP_ADMIN_EMAIL set. Nobody can sign up as admin.");
    }

    // Initialize database
    let pool = db::init_database(&config.db_path).await?;
    let repo = Arc::new(Repository::new(pool));

    let state = AppState {
        repo,
        config: Arc::new(config.clone()),
    };

    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}

/// Create the application router with all routes.
pub fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Clone PSK for the auth layer
    let psk = state.config.api_psk.clone();

    // API routes
    let api_routes = Router::new()
        // Identity
        .route("/auth/signup", post(api::sign_up))
        .route("/auth/signin", post(api::sign_in))
        .route("/auth/signout", post(api::sign_out))
        .route("/auth/me", get(api::me))
        .route("/profile", get(api::get_profile).put(api::update_profile))
        .route("/revision", get(api::get_revision))
        // Organizations
        .route(
            "/organizations",
            get(api::list_organizations).post(api::register_organization),
        )
        .route(
            "/organizations/{id}",
            get(api::get_organization).put(api::update_organization),
        )
        .route("/organizations/{id}/approve", post(api::approve_organization))
        .route("/organizations/{id}/reject", post(api::reject_organization))
        .route("/organizations/{id}/resubmit", post(api::resubmit_organization))
        .route(
            "/organizations/{id}/zones",
            get(api::list_zones).put(api::set_zones),
        )
        .route("/organizations/{id}/zones/summary", get(api::zone_summary))
        .route(
            "/organizations/{id}/documents",
            get(api::list_documents).post(api::add_document),
        )
        // Teams
        .route("/teams", get(api::list_teams).post(api::create_team))
        .route("/teams/{id}", get(api::get_team).put(api::update_team))
        .route("/teams/{id}/members", post(api::add_member))
        .route("/teams/{id}/members/{user_id}", delete(api::remove_member))
        // Help requests
        .route("/requests", get(api::list_requests).post(api::create_request))
        .route(
            "/requests/{id}",
            get(api::get_request).put(api::update_request),
        )
        .route("/requests/{id}/status", post(api::transition_request))
        // Missions
        .route("/missions", get(api::list_missions).post(api::create_mission))
        .route("/missions/{id}", get(api::get_mission))
        .route("/missions/{id}/status", post(api::advance_mission))
        .route("/missions/{id}/cancel", post(api::cancel_mission))
        // Apply PSK auth middleware
        .layer(middleware::from_fn(move |req, next| {
            auth::psk_auth_layer(psk.clone(), req, next)
        }));

    // Health check (no auth required)
    let health_routes = Router::new().route("/health", get(health_check));

    Router::new()
        .nest("/api", api_routes)
        .merge(health_routes)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}

/// Health check endpoint.
async fn health_check() -> &'static str {
    "OK"
}

#[cfg(test)]
mod tests;
