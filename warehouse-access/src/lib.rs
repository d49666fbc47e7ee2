pub mod config;
pub mod db;
pub mod middleware;
pub mod models;
pub mod services;

use service_core::axum::{
    extract::{FromRef, State},
    middleware::from_fn,
    routing::get,
    Json, Router,
};
use service_core::error::AppError;
use service_core::middleware::tracing::{request_id_middleware, REQUEST_ID_HEADER};
use sqlx::PgPool;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::config::{AccessConfig, SecurityConfig};
use crate::models::SecurityEvent;
use crate::services::{
    AccessControl, AuditSink, PgAssignmentStore, PgAuditSink, SecretVault, VaultError,
};

#[derive(Clone)]
pub struct AccessState {
    pub config: AccessConfig,
    pub pool: PgPool,
    pub access: AccessControl,
    pub vault: Arc<SecretVault>,
}

impl AccessState {
    /// Connect to PostgreSQL and build the access and vault services.
    ///
    /// A bad `ENCRYPTION_KEY` stops startup here instead of at the first
    /// encrypt or decrypt.
    pub async fn from_config(config: AccessConfig) -> Result<Self, AppError> {
        let pool = db::create_pool(&config.database)
            .await
            .map_err(|e| AppError::DatabaseError(e.into()))?;
        tracing::info!("Database pool initialized");

        let audit = Arc::new(PgAuditSink::new(pool.clone()));
        let vault = open_vault(&config.security, audit.as_ref())?;
        tracing::info!("Secret vault initialized");

        let store = Arc::new(PgAssignmentStore::new(pool.clone()));
        let access = AccessControl::new(store, audit);

        Ok(Self {
            config,
            pool,
            access,
            vault: Arc::new(vault),
        })
    }
}

impl FromRef<AccessState> for AccessControl {
    fn from_ref(state: &AccessState) -> Self {
        state.access.clone()
    }
}

/// Build the vault from configured key material, recording a
/// `KEY_CONFIGURATION_FAILURE` event when the material is unusable.
pub fn open_vault(
    security: &SecurityConfig,
    audit: &dyn AuditSink,
) -> Result<SecretVault, VaultError> {
    SecretVault::from_secret(security.encryption_key.as_ref()).map_err(|e| {
        audit.record(SecurityEvent::key_configuration_failure(e.to_string()));
        e
    })
}

pub async fn build_router(state: AccessState) -> Result<Router, AppError> {
    let app = Router::new()
        .route("/health", get(health_check))
        .with_state(state)
        .layer(TraceLayer::new_for_http().make_span_with(
            |request: &service_core::axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get(REQUEST_ID_HEADER)
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri(),
                    version = ?request.version(),
                )
            },
        ))
        .layer(from_fn(request_id_middleware));

    Ok(app)
}

async fn health_check(
    State(state): State<AccessState>,
) -> Result<Json<serde_json::Value>, AppError> {
    db::health_check(&state.pool).await.map_err(|e| {
        tracing::error!(error = %e, "PostgreSQL health check failed");
        AppError::DatabaseError(e.into())
    })?;

    Ok(Json(serde_json::json!({
        "status": "healthy",
        "service": state.config.service_name,
        "version": state.config.service_version,
        "environment": format!("{:?}", state.config.environment),
        "checks": {
            "postgres": "up"
        }
    })))
}
