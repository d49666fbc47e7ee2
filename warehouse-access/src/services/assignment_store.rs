//! Project assignment lookups.
//!
//! Expected tables (owned by the schema scripts, not by this crate):
//!
//! ```text
//! user_project_access(user_id, project_id, permissions JSONB, created_at,
//!                     UNIQUE (user_id, project_id))
//! projects(id, customer_id, ...)
//! ```
//!
//! Every call hits the store; nothing is cached between decisions.

use async_trait::async_trait;
use sqlx::postgres::PgPool;
use sqlx::types::Json;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::models::{PermissionSet, ResourceAssignment};

#[async_trait]
pub trait AssignmentStore: Send + Sync {
    /// Number of assignment rows for `(user_id, project_id)`.
    async fn count_project_assignments(
        &self,
        user_id: i64,
        project_id: i64,
    ) -> Result<i64, anyhow::Error>;

    /// Number of the user's assignments whose project belongs to `customer_id`.
    async fn count_customer_assignments(
        &self,
        user_id: i64,
        customer_id: i64,
    ) -> Result<i64, anyhow::Error>;

    /// Ids of every project the user is assigned to.
    async fn project_ids_for_user(&self, user_id: i64) -> Result<Vec<i64>, anyhow::Error>;
}

/// PostgreSQL-backed assignment store.
#[derive(Clone)]
pub struct PgAssignmentStore {
    pool: PgPool,
}

impl PgAssignmentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create or replace the assignment for `(user_id, project_id)`.
    pub async fn upsert_assignment(
        &self,
        user_id: i64,
        project_id: i64,
        permissions: &PermissionSet,
    ) -> Result<ResourceAssignment, anyhow::Error> {
        let assignment = sqlx::query_as::<_, ResourceAssignment>(
            r#"
            INSERT INTO user_project_access (user_id, project_id, permissions)
            VALUES ($1, $2, $3)
            ON CONFLICT (user_id, project_id)
            DO UPDATE SET permissions = EXCLUDED.permissions
            RETURNING user_id::BIGINT AS user_id,
                      project_id::BIGINT AS project_id,
                      COALESCE(permissions, '[]'::jsonb) AS granted_permissions,
                      created_at
            "#,
        )
        .bind(user_id)
        .bind(project_id)
        .bind(Json(permissions))
        .fetch_one(&self.pool)
        .await?;

        tracing::info!(user_id, project_id, "Project assignment saved");
        Ok(assignment)
    }

    /// Remove the assignment. Returns whether a row existed.
    pub async fn revoke_assignment(
        &self,
        user_id: i64,
        project_id: i64,
    ) -> Result<bool, anyhow::Error> {
        let result =
            sqlx::query("DELETE FROM user_project_access WHERE user_id = $1 AND project_id = $2")
                .bind(user_id)
                .bind(project_id)
                .execute(&self.pool)
                .await?;

        let removed = result.rows_affected() > 0;
        tracing::info!(user_id, project_id, removed, "Project assignment revoked");
        Ok(removed)
    }

    pub async fn assignments_for_user(
        &self,
        user_id: i64,
    ) -> Result<Vec<ResourceAssignment>, anyhow::Error> {
        let rows = sqlx::query_as::<_, ResourceAssignment>(
            r#"
            SELECT user_id::BIGINT AS user_id,
                   project_id::BIGINT AS project_id,
                   COALESCE(permissions, '[]'::jsonb) AS granted_permissions,
                   created_at
            FROM user_project_access
            WHERE user_id = $1
            ORDER BY project_id
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

#[async_trait]
impl AssignmentStore for PgAssignmentStore {
    async fn count_project_assignments(
        &self,
        user_id: i64,
        project_id: i64,
    ) -> Result<i64, anyhow::Error> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM user_project_access WHERE user_id = $1 AND project_id = $2",
        )
        .bind(user_id)
        .bind(project_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn count_customer_assignments(
        &self,
        user_id: i64,
        customer_id: i64,
    ) -> Result<i64, anyhow::Error> {
        let count = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*)
            FROM user_project_access upa
            JOIN projects p ON p.id = upa.project_id
            WHERE upa.user_id = $1 AND p.customer_id = $2
            "#,
        )
        .bind(user_id)
        .bind(customer_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn project_ids_for_user(&self, user_id: i64) -> Result<Vec<i64>, anyhow::Error> {
        let ids = sqlx::query_scalar::<_, i64>(
            "SELECT project_id::BIGINT FROM user_project_access WHERE user_id = $1 ORDER BY project_id",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }
}

/// In-memory store for tests. Counts every lookup and can be told to fail.
pub struct MockAssignmentStore {
    assignments: Mutex<HashSet<(i64, i64)>>,
    project_customers: Mutex<HashMap<i64, i64>>,
    lookups: AtomicUsize,
    failing: AtomicBool,
}

impl Default for MockAssignmentStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MockAssignmentStore {
    pub fn new() -> Self {
        Self {
            assignments: Mutex::new(HashSet::new()),
            project_customers: Mutex::new(HashMap::new()),
            lookups: AtomicUsize::new(0),
            failing: AtomicBool::new(false),
        }
    }

    pub fn with_assignment(self, user_id: i64, project_id: i64) -> Self {
        self.assign(user_id, project_id);
        self
    }

    pub fn with_project_customer(self, project_id: i64, customer_id: i64) -> Self {
        if let Ok(mut map) = self.project_customers.lock() {
            map.insert(project_id, customer_id);
        }
        self
    }

    pub fn assign(&self, user_id: i64, project_id: i64) {
        if let Ok(mut set) = self.assignments.lock() {
            set.insert((user_id, project_id));
        }
    }

    pub fn unassign(&self, user_id: i64, project_id: i64) {
        if let Ok(mut set) = self.assignments.lock() {
            set.remove(&(user_id, project_id));
        }
    }

    /// Make every subsequent lookup return an error.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of lookups served so far.
    pub fn lookup_count(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    fn begin_lookup(&self) -> Result<(), anyhow::Error> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(anyhow::anyhow!("mock store unavailable"));
        }
        Ok(())
    }
}

#[async_trait]
impl AssignmentStore for MockAssignmentStore {
    async fn count_project_assignments(
        &self,
        user_id: i64,
        project_id: i64,
    ) -> Result<i64, anyhow::Error> {
        self.begin_lookup()?;
        let found = self
            .assignments
            .lock()
            .map_err(|e| anyhow::anyhow!("Mock assignments mutex poisoned: {}", e))?
            .contains(&(user_id, project_id));
        Ok(i64::from(found))
    }

    async fn count_customer_assignments(
        &self,
        user_id: i64,
        customer_id: i64,
    ) -> Result<i64, anyhow::Error> {
        self.begin_lookup()?;
        let assignments = self
            .assignments
            .lock()
            .map_err(|e| anyhow::anyhow!("Mock assignments mutex poisoned: {}", e))?;
        let customers = self
            .project_customers
            .lock()
            .map_err(|e| anyhow::anyhow!("Mock customers mutex poisoned: {}", e))?;

        let count = assignments
            .iter()
            .filter(|(uid, pid)| *uid == user_id && customers.get(pid) == Some(&customer_id))
            .count();
        Ok(count as i64)
    }

    async fn project_ids_for_user(&self, user_id: i64) -> Result<Vec<i64>, anyhow::Error> {
        self.begin_lookup()?;
        let mut ids: Vec<i64> = self
            .assignments
            .lock()
            .map_err(|e| anyhow::anyhow!("Mock assignments mutex poisoned: {}", e))?
            .iter()
            .filter(|(uid, _)| *uid == user_id)
            .map(|(_, pid)| *pid)
            .collect();
        ids.sort_unstable();
        Ok(ids)
    }
}
