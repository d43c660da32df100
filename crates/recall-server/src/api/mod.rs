//! HTTP surface.

pub mod auth;
pub mod error;
pub mod middleware;
pub mod state;


pub use error::ApiError;
pub use state::AppState;

use axum::{
    Extension, Json, Router,
    extract::State,
    http::{HeaderValue, header},
    middleware::from_fn_with_state,
    response::sse::{Event, Sse},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use futures_util::StreamExt;
use serde::Deserialize;
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::error;

use recall::SearchRequest;

use crate::chat::{ChatRequest, StreamChunk};
use crate::models::AVAILABLE_MODELS;
use auth::{SESSION_COOKIE, create_session, verify_password};
use middleware::{
    AuthUser, CorrelationId, CorsConfig, auth_middleware, correlation_id_middleware,
};

/// Builds the full router: CORS outermost, correlation id, auth innermost.
pub fn create_router(state: AppState, cors: &CorsConfig) -> Router {
    Router::new()
        .route("/healthz", get(healthz_handler))
        .route("/auth/login", post(login_handler))
        .route("/auth/logout", post(logout_handler))
        .route("/models", get(models_handler))
        .route("/chats", get(chats_handler))
        .route("/search", post(search_handler))
        .route("/chat", post(chat_handler))
        .layer(from_fn_with_state(state.clone(), auth_middleware))
        .layer(axum::middleware::from_fn(correlation_id_middleware))
        .layer(cors.layer())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn healthz_handler() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok", "service": "api" }))
}

#[derive(Debug, Deserialize)]
struct LoginRequest {
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,
}

async fn login_handler(
    State(state): State<AppState>,
    request: axum::extract::Request,
) -> Result<Response, ApiError> {
    let secure = request
        .headers()
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .map(|proto| proto.eq_ignore_ascii_case("https"))
        .unwrap_or_else(|| request.uri().scheme_str() == Some("https"));

    let body = axum::body::to_bytes(request.into_body(), 64 * 1024)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    let login: LoginRequest =
        serde_json::from_slice(&body).unwrap_or(LoginRequest {
            username: String::new(),
            password: String::new(),
        });

    if let Some(retry_after_seconds) = state.login_limiter.check(&state.auth, &login.username) {
        return Err(ApiError::TooManyAttempts {
            retry_after_seconds,
        });
    }

    if login.username != state.auth.app_user
        || !verify_password(&login.password, &state.auth.app_user_hash_bcrypt)
    {
        state.login_limiter.record_failure(&state.auth, &login.username);
        return Err(ApiError::InvalidCredentials);
    }

    let token =
        create_session(&state.auth, &login.username).map_err(ApiError::Internal)?;

    let cookie = format!(
        "{}={}; HttpOnly; SameSite=Lax; Path=/{}",
        SESSION_COOKIE,
        token,
        if secure { "; Secure" } else { "" }
    );

    let mut response = Json(json!({ "ok": true })).into_response();
    if let Ok(value) = HeaderValue::from_str(&cookie) {
        response.headers_mut().insert(header::SET_COOKIE, value);
    }
    Ok(response)
}

async fn logout_handler() -> Response {
    let cookie = format!(
        "{}=; HttpOnly; SameSite=Lax; Path=/; Max-Age=0",
        SESSION_COOKIE
    );
    let mut response = Json(json!({ "ok": true })).into_response();
    if let Ok(value) = HeaderValue::from_str(&cookie) {
        response.headers_mut().insert(header::SET_COOKIE, value);
    }
    response
}

async fn models_handler() -> Json<serde_json::Value> {
    Json(json!(AVAILABLE_MODELS))
}

async fn chats_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    match state.engine.get_available_chats().await {
        Ok(chats) => Json(json!({ "ok": true, "chats": chats })),
        Err(e) => {
            error!(error = %e, "failed to list chats");
            Json(json!({ "ok": false, "chats": [], "error": e.to_string() }))
        }
    }
}

async fn search_handler(
    State(state): State<AppState>,
    Extension(correlation_id): Extension<CorrelationId>,
    Json(request): Json<SearchRequest>,
) -> Json<serde_json::Value> {
    let results = state.engine.search(&request).await;
    Json(json!({
        "ok": true,
        "results": results,
        "correlation_id": correlation_id.0,
    }))
}

async fn chat_handler(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(request): Json<ChatRequest>,
) -> Response {
    let stream = state
        .chat
        .chat_stream(request, user.0)
        .map(|chunk: StreamChunk| Ok::<_, std::convert::Infallible>(
            Event::default().data(chunk.to_sse_data()),
        ));

    let mut response = Sse::new(stream).into_response();
    response.headers_mut().insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("no-cache"),
    );
    response
}
