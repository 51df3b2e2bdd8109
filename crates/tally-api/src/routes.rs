use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Request, State};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use chrono::Utc;
use serde::Serialize;
use tally_core::sync::{FirstSyncRequest, SyncRequest};
use tally_core::util::user_fingerprint;
use tally_core::SyncService;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::auth::{extract_bearer_token, AuthenticatedUser, JwtVerifier};
use crate::config::AppConfig;
use crate::error::AppError;
use crate::rate_limit::{EndpointRateLimiter, ProtectedEndpoint, RateLimitMetricsSnapshot};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    jwt_verifier: Arc<JwtVerifier>,
    sync: SyncService,
    endpoint_rate_limiter: Arc<EndpointRateLimiter>,
}

impl AppState {
    pub fn new(config: Arc<AppConfig>, sync: SyncService) -> Self {
        Self {
            jwt_verifier: Arc::new(JwtVerifier::new(config.clone())),
            endpoint_rate_limiter: Arc::new(EndpointRateLimiter::from_config(config.as_ref())),
            sync,
            config,
        }
    }

    pub async fn from_config(config: Arc<AppConfig>) -> tally_core::Result<Self> {
        let sync = if config.database_path == ":memory:" {
            tracing::warn!("Using an in-memory database; data is lost on restart");
            SyncService::open_in_memory().await?
        } else {
            SyncService::open_path(&config.database_path).await?
        };
        Ok(Self::new(config, sync))
    }
}

pub fn app_router(state: AppState) -> Router {
    let protected_routes = Router::new()
        .route("/sync", post(sync))
        .route("/sync/first", post(first_sync))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .route("/healthz", get(healthz))
        .nest("/v1", protected_routes)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_headers(Any)
                .allow_methods(Any),
        )
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    timestamp: i64,
    rate_limit: RateLimitMetricsSnapshot,
}

async fn healthz(State(state): State<AppState>) -> Json<HealthResponse> {
    let status = match state.sync.ping().await {
        Ok(()) => "ok",
        Err(error) => {
            tracing::warn!("Health check could not reach the store: {error}");
            "degraded"
        }
    };
    Json(HealthResponse {
        status,
        timestamp: Utc::now().timestamp(),
        rate_limit: state.endpoint_rate_limiter.metrics_snapshot().await,
    })
}

async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = extract_bearer_token(request.headers())?;
    let user = state.jwt_verifier.verify_access_token(token)?;
    state
        .sync
        .ensure_user(&user.user_id, user.email.as_deref())
        .await?;
    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}

async fn sync(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    body: Result<Json<SyncRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let Json(request) = body.map_err(|rejection| AppError::bad_request(rejection.body_text()))?;
    state
        .endpoint_rate_limiter
        .check(ProtectedEndpoint::Sync, &user.user_id)
        .await?;

    let user_hash = user_fingerprint(&user.user_id);
    if let Some(commands) = request.commands.as_deref() {
        ensure_batch_size(&state, commands.len())?;
        let response = state.sync.run_commands(&user.user_id, commands).await?;
        tracing::info!(
            endpoint = "sync",
            user = user_hash,
            commands = commands.len(),
            sync_token = %response.sync_token,
            "Replayed commands"
        );
        return Ok(Json(response).into_response());
    }

    if let Some(sync_token) = request.sync_token.as_deref() {
        let data = state
            .sync
            .sync_data(&user.user_id, sync_token, request.resource_types.as_ref())
            .await?;
        tracing::info!(endpoint = "sync", user = user_hash, "Served pull");
        return Ok(Json(data).into_response());
    }

    Err(AppError::bad_request(
        "Request must include `commands` or `sync_token`",
    ))
}

async fn first_sync(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    body: Result<Json<FirstSyncRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let Json(request) = body.map_err(|rejection| AppError::bad_request(rejection.body_text()))?;
    state
        .endpoint_rate_limiter
        .check(ProtectedEndpoint::FirstSync, &user.user_id)
        .await?;
    ensure_batch_size(&state, request.commands.len())?;

    let snapshot = state.sync.first_sync(&user.user_id, &request).await?;
    tracing::info!(
        endpoint = "first_sync",
        user = user_fingerprint(&user.user_id),
        sync_type = ?request.sync_type,
        businesses = snapshot.businesses.len(),
        "Completed first sync"
    );
    Ok(Json(snapshot).into_response())
}

fn ensure_batch_size(state: &AppState, len: usize) -> Result<(), AppError> {
    if len > state.config.max_commands_per_batch {
        return Err(AppError::bad_request(format!(
            "A batch may contain at most {} commands",
            state.config.max_commands_per_batch
        )));
    }
    Ok(())
}
