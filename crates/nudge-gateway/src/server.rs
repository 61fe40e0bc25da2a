//! HTTP server implementation using Axum.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use axum::routing::{get, post, put};
use axum::Router;
use nudge_core::config::AuthConfig;
use nudge_core::traits::{EventStore, UserDirectory};
use nudge_scheduler::ReminderScheduler;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::accounts::AccountService;
use crate::auth::TokenProvider;
use crate::events::EventService;

/// Shared state for the gateway server.
pub struct AppState {
    pub tokens: Arc<TokenProvider>,
    pub accounts: AccountService,
    pub events: EventService,
    /// Shared with the background harness so the toggle is live.
    pub scheduler: Arc<ReminderScheduler>,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(
        tokens: Arc<TokenProvider>,
        users: Arc<dyn UserDirectory>,
        events: Arc<dyn EventStore>,
        scheduler: Arc<ReminderScheduler>,
        auth: &AuthConfig,
    ) -> Self {
        Self {
            accounts: AccountService::new(users.clone(), tokens.clone(), auth),
            events: EventService::new(users, events),
            tokens,
            scheduler,
            start_time: Instant::now(),
        }
    }
}

fn cors_layer() -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([
            axum::http::Method::GET,
            axum::http::Method::POST,
            axum::http::Method::PUT,
            axum::http::Method::DELETE,
            axum::http::Method::OPTIONS,
        ])
        .allow_headers(Any)
        .max_age(std::time::Duration::from_secs(3600));

    // Example: NUDGE_CORS_ORIGINS=https://app.example.com,https://admin.example.com
    match std::env::var("NUDGE_CORS_ORIGINS") {
        Ok(origins) if !origins.is_empty() => {
            let allowed: Vec<_> = origins
                .split(',')
                .filter_map(|s| s.trim().parse::<axum::http::HeaderValue>().ok())
                .collect();
            cors.allow_origin(allowed)
        }
        _ => cors.allow_origin(Any),
    }
}

/// Build the Axum router with all routes.
pub fn build_router(shared: Arc<AppState>) -> Router {
    // Protected routes: the gate attaches an Identity when the token verifies
    let protected = Router::new()
        .route(
            "/events",
            get(super::routes::list_events).post(super::routes::create_event),
        )
        .route(
            "/events/{id}",
            put(super::routes::update_event).delete(super::routes::delete_event),
        )
        .route(
            "/admin/scheduler",
            get(super::routes::scheduler_status).put(super::routes::scheduler_toggle),
        )
        .route("/admin/scheduler/run", post(super::routes::scheduler_run))
        .route_layer(axum::middleware::from_fn_with_state(
            shared.tokens.clone(),
            super::gate::authenticate,
        ));

    // Public routes: no gate
    let public = Router::new()
        .route("/health", get(super::routes::health_check))
        .route("/auth/register", post(super::routes::register))
        .route("/auth/login", post(super::routes::login));

    protected
        .merge(public)
        .layer(cors_layer())
        .layer(TraceLayer::new_for_http())
        .with_state(shared)
}

/// Serve until `shutdown` resolves.
pub async fn serve(
    listener: tokio::net::TcpListener,
    state: Arc<AppState>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let addr = listener.local_addr()?;
    tracing::info!("🌐 Gateway listening on http://{addr}");
    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown)
        .await?;
    tracing::info!("🛑 Gateway stopped");
    Ok(())
}
