//! HTTP boundary.

pub mod error;
pub mod handlers;
pub mod headers;

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::extract::{Request, State};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use idmsvc_db::repository::{SurrealDomainRepository, SurrealHostconfJwkRepository};
use idmsvc_trust::TrustFabricService;
use surrealdb::engine::any::Any;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::Span;

use crate::config::WebConfig;
use error::ApiError;
use headers::REQUEST_ID_HEADER;

pub const API_PREFIX: &str = "/api/idmsvc/v1";

/// Trust fabric service over the SurrealDB repositories.
pub type Service =
    TrustFabricService<SurrealDomainRepository<Any>, SurrealHostconfJwkRepository<Any>>;

/// Shared application state.
pub struct AppState {
    pub service: Service,
}

/// Create the API router
pub fn create_router(state: Arc<AppState>, web: &WebConfig) -> Router {
    let api = Router::new()
        .route("/domains/token", post(handlers::create_domain_token))
        .route(
            "/domains",
            get(handlers::list_domains).post(handlers::register_domain),
        )
        .route(
            "/domains/{uuid}",
            get(handlers::read_domain)
                .put(handlers::update_domain_agent)
                .patch(handlers::update_domain_user)
                .delete(handlers::delete_domain),
        )
        .route(
            "/host-conf/{inventory_id}/{fqdn}",
            post(handlers::host_conf),
        )
        .route("/signing_keys", get(handlers::signing_keys));

    Router::new()
        .nest(API_PREFIX, api)
        .layer(middleware::from_fn_with_state(
            web.size_limit_request_header,
            limit_request_headers,
        ))
        .layer(RequestBodyLimitLayer::new(web.size_limit_request_body))
        .layer(TimeoutLayer::new(Duration::from_secs(web.request_timeout_secs)))
        .layer(TraceLayer::new_for_http().make_span_with(request_span))
        .with_state(state)
}

fn request_span(request: &Request) -> Span {
    let request_id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    tracing::info_span!(
        "request",
        method = %request.method(),
        uri = %request.uri(),
        request_id,
    )
}

/// Rejects requests whose header names and values together exceed `limit`
/// bytes.
async fn limit_request_headers(
    State(limit): State<usize>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let size: usize = request
        .headers()
        .iter()
        .map(|(name, value)| name.as_str().len() + value.len())
        .sum();
    if size > limit {
        return Err(ApiError::HeadersTooLarge);
    }
    Ok(next.run(request).await)
}
