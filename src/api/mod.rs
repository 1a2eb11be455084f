mod handlers;
mod middleware;

use axum::{
    http::{header, HeaderValue, Method},
    routing::{delete, get, post, put},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::hub::FamilyHub;

pub use middleware::{
    session_token, CurrentUser, SecurityConfig, CORRELATION_ID_HEADER, SESSION_COOKIE,
};

#[derive(Clone)]
pub struct AppState {
    pub hub: FamilyHub,
    pub security: SecurityConfig,
}

/// Router with security settings taken from the environment.
pub fn create_router(hub: FamilyHub) -> Router {
    create_router_with_config(hub, SecurityConfig::from_env())
}

pub fn create_router_with_config(hub: FamilyHub, security: SecurityConfig) -> Router {
    let state = AppState {
        hub,
        security: security.clone(),
    };

    let protected = Router::new()
        // Tasks
        .route("/tasks", get(handlers::list_tasks))
        .route("/tasks", post(handlers::create_task))
        .route("/tasks/{id}", get(handlers::get_task))
        .route("/tasks/{id}", delete(handlers::delete_task))
        .route("/tasks/{id}/complete", put(handlers::complete_task))
        .route("/tasks/{id}/priority", put(handlers::change_task_priority))
        // Members
        .route("/members", get(handlers::list_members))
        .route("/members", post(handlers::create_member))
        .route("/members/{id}", delete(handlers::delete_member))
        // Shopping list
        .route("/shopping", get(handlers::shopping_list))
        .route("/shopping", post(handlers::add_shopping_item))
        .route("/shopping/{id}", delete(handlers::delete_shopping_item))
        .route("/shopping/{id}/purchased", put(handlers::mark_item_purchased))
        // Live updates
        .route("/events", get(handlers::event_stream))
        // Session
        .route("/auth/logout", post(handlers::logout))
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::require_session,
        ));

    let public = Router::new()
        .route("/auth/register", post(handlers::register))
        .route("/auth/login", post(handlers::login))
        .route("/health", get(handlers::health));

    Router::new()
        .nest("/api/v1", protected.merge(public))
        .layer(axum::middleware::from_fn(middleware::correlation_id))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&security))
        .with_state(state)
}

fn cors_layer(security: &SecurityConfig) -> CorsLayer {
    let Some(origins) = &security.cors_origins else {
        return CorsLayer::permissive();
    };

    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin: {}", o);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::HeaderName::from_static(CORRELATION_ID_HEADER)])
        .allow_credentials(true)
}
