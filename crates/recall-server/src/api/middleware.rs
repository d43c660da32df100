//! Request interceptors: CORS (outermost), correlation id, auth (innermost).

use axum::{
    body::Body,
    extract::{Request, State},
    http::{HeaderValue, Method, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tower_http::cors::{AllowOrigin, CorsLayer};

use recall::config::{bool_from_env, optional_string_from_env};

use super::auth::{decode_session, session_cookie_value};
use super::error::ApiError;
use super::state::AppState;

/// Correlation header echoed on every response.
pub const CORRELATION_ID_HEADER: &str = "X-Correlation-ID";

/// Routes reachable without a session. Logout stays public so clearing a
/// stale or expired cookie always succeeds.
const PUBLIC_PATHS: &[&str] = &["/healthz", "/auth/login", "/auth/logout"];

/// The authenticated username, inserted into request extensions.
#[derive(Debug, Clone)]
pub struct AuthUser(pub String);

/// Request-scoped correlation id.
#[derive(Debug, Clone)]
pub struct CorrelationId(pub String);

/// CORS / UI origin configuration.
#[derive(Debug, Clone)]
pub struct CorsConfig {
    pub ui_origin: Option<String>,
    pub allow_all: bool,
}

impl CorsConfig {
    pub fn from_env() -> Self {
        Self {
            ui_origin: optional_string_from_env("UI_ORIGIN"),
            allow_all: bool_from_env("CORS_ALLOW_ALL", false),
        }
    }

    /// Builds the CORS layer. Credentials are always allowed, so the
    /// wildcard mode mirrors the request origin instead of `*`.
    pub fn layer(&self) -> CorsLayer {
        let allow_origin = if self.allow_all {
            AllowOrigin::mirror_request()
        } else {
            let mut origins: Vec<String> = vec![
                "http://localhost:4321".to_string(),
                "http://localhost:3000".to_string(),
                "http://127.0.0.1:4321".to_string(),
                "http://127.0.0.1:3000".to_string(),
            ];
            if let Some(ui_origin) = &self.ui_origin {
                origins.push(ui_origin.trim_end_matches('/').to_string());
            }
            AllowOrigin::list(
                origins
                    .iter()
                    .filter_map(|o| HeaderValue::from_str(o).ok()),
            )
        };

        CorsLayer::new()
            .allow_origin(allow_origin)
            .allow_methods(tower_http::cors::AllowMethods::mirror_request())
            .allow_headers(tower_http::cors::AllowHeaders::mirror_request())
            .allow_credentials(true)
    }
}

/// Attaches a correlation id (request-provided or generated) and echoes it
/// on the response.
pub async fn correlation_id_middleware(mut request: Request<Body>, next: Next) -> Response {
    let correlation_id = request
        .headers()
        .get(CORRELATION_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| uuid::Uuid::new_v4().simple().to_string());

    request
        .extensions_mut()
        .insert(CorrelationId(correlation_id.clone()));

    let mut response = next.run(request).await;
    if let Ok(value) = HeaderValue::from_str(&correlation_id) {
        response.headers_mut().insert(CORRELATION_ID_HEADER, value);
    }
    response
}

/// Rejects unauthenticated requests to private routes with 401.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    // CORS preflight must pass through to the CORS layer.
    if request.method() == Method::OPTIONS {
        return next.run(request).await;
    }
    if PUBLIC_PATHS.contains(&request.uri().path()) {
        return next.run(request).await;
    }

    let user = request
        .headers()
        .get(header::COOKIE)
        .and_then(|v| v.to_str().ok())
        .and_then(session_cookie_value)
        .and_then(|token| decode_session(&state.auth, token));

    match user {
        Some(username) => {
            request.extensions_mut().insert(AuthUser(username));
            next.run(request).await
        }
        None => ApiError::Unauthorized.into_response(),
    }
}
