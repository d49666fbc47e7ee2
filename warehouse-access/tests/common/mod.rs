//! Shared setup for warehouse-access integration tests.

#![allow(dead_code)]

use service_core::axum::{
    middleware::from_fn_with_state, routing::get, Extension, Router,
};
use sqlx::PgPool;
use std::sync::Arc;
use warehouse_access::{
    config::DatabaseConfig,
    db,
    middleware::{require_resource_access, CurrentCaller, ResourceGuard},
    models::{Caller, PermissionSet, Role},
    services::{AccessControl, MemoryAuditSink, MockAssignmentStore},
};

pub const TEST_ENCRYPTION_KEY: &str = "integration-test-key-with-enough-chars";

pub fn admin(id: i64) -> Caller {
    Caller::new(id, Role::Admin, PermissionSet::empty())
}

pub fn manager(id: i64) -> Caller {
    Caller::new(id, Role::Manager, PermissionSet::empty())
}

pub fn staff(id: i64) -> Caller {
    Caller::new(id, Role::Staff, PermissionSet::new(["read"]))
}

pub fn viewer(id: i64) -> Caller {
    Caller::new(id, Role::Viewer, PermissionSet::empty())
}

/// AccessControl over an in-memory store, with handles to inspect both.
pub struct TestAccess {
    pub access: AccessControl,
    pub store: Arc<MockAssignmentStore>,
    pub audit: Arc<MemoryAuditSink>,
}

impl TestAccess {
    pub fn new(store: MockAssignmentStore) -> Self {
        let store = Arc::new(store);
        let audit = Arc::new(MemoryAuditSink::new());
        let access = AccessControl::new(store.clone(), audit.clone());
        Self {
            access,
            store,
            audit,
        }
    }

    /// Router with project and customer routes behind the resource guard.
    pub fn router(&self, caller: Option<Caller>) -> Router {
        let projects = Router::new()
            .route(
                "/projects/:project_id",
                get(|CurrentCaller(caller): CurrentCaller| async move {
                    format!("project for {}", caller.id)
                }),
            )
            .route_layer(from_fn_with_state(
                self.access.clone(),
                |state, req, next| {
                    require_resource_access(state, ResourceGuard::project("project_id"), req, next)
                },
            ));

        let customers = Router::new()
            .route(
                "/customers/:customer_id",
                get(|| async { "customer" }),
            )
            .route_layer(from_fn_with_state(
                self.access.clone(),
                |state, req, next| {
                    require_resource_access(
                        state,
                        ResourceGuard::customer("customer_id"),
                        req,
                        next,
                    )
                },
            ));

        let router = projects.merge(customers);
        match caller {
            Some(caller) => router.layer(Extension(caller)),
            None => router,
        }
    }
}

/// Connect to the test database and create the tables the store reads.
pub async fn test_pool() -> PgPool {
    let config = DatabaseConfig {
        url: std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "postgres://localhost/warehouse_test".to_string()),
        max_connections: 5,
        min_connections: 1,
        acquire_timeout_seconds: 5,
    };
    let pool = db::create_pool(&config)
        .await
        .expect("Failed to connect to test database");

    for statement in [
        r#"CREATE TABLE IF NOT EXISTS projects (
            id SERIAL PRIMARY KEY,
            customer_id INTEGER
        )"#,
        r#"CREATE TABLE IF NOT EXISTS user_project_access (
            user_id INTEGER NOT NULL,
            project_id INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
            permissions JSONB DEFAULT '[]'::jsonb,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            PRIMARY KEY (user_id, project_id)
        )"#,
        r#"CREATE TABLE IF NOT EXISTS security_audit_logs (
            id UUID PRIMARY KEY,
            event_type TEXT NOT NULL,
            severity TEXT NOT NULL,
            user_id BIGINT,
            role TEXT,
            resource_type TEXT,
            resource_id BIGINT,
            request_method TEXT,
            request_path TEXT,
            ip_address TEXT,
            request_id TEXT,
            details TEXT NOT NULL,
            created_at TIMESTAMPTZ NOT NULL
        )"#,
    ] {
        sqlx::query(statement)
            .execute(&pool)
            .await
            .expect("Failed to create test schema");
    }

    pool
}

/// Insert a project owned by `customer_id` and return its id.
pub async fn insert_project(pool: &PgPool, customer_id: i64) -> i64 {
    sqlx::query_scalar::<_, i64>(
        "INSERT INTO projects (customer_id) VALUES ($1) RETURNING id::BIGINT",
    )
    .bind(customer_id as i32)
    .fetch_one(pool)
    .await
    .expect("Failed to insert project")
}

/// A user id unlikely to collide with other test runs.
pub fn unique_user_id() -> i64 {
    i64::from(rand_id())
}

fn rand_id() -> u32 {
    let bytes = uuid::Uuid::new_v4();
    let b = bytes.as_bytes();
    u32::from_le_bytes([b[0], b[1], b[2], b[3] & 0x3f])
}
