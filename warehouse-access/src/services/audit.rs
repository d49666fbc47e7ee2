//! Audit sinks for security events.
//!
//! Access decisions only need "append one structured event"; where the event
//! ends up is the sink's business. Sinks never fail the request that produced
//! the event.

use sqlx::postgres::PgPool;
use std::sync::{Arc, Mutex};

use crate::models::SecurityEvent;

pub trait AuditSink: Send + Sync {
    fn record(&self, event: SecurityEvent);
}

/// Emits events as structured `warn` log lines.
#[derive(Debug, Clone, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, event: SecurityEvent) {
        tracing::warn!(
            event_id = %event.id,
            event_type = event.kind.as_str(),
            severity = event.severity.as_str(),
            user_id = ?event.user_id,
            role = ?event.role,
            resource_type = ?event.resource_type,
            resource_id = ?event.resource_id,
            method = ?event.request_method,
            path = ?event.request_path,
            ip_address = ?event.ip_address,
            request_id = ?event.request_id,
            details = %event.details,
            "Security event"
        );
    }
}

/// Persists events to `security_audit_logs` without blocking the caller.
#[derive(Clone)]
pub struct PgAuditSink {
    pool: PgPool,
}

impl PgAuditSink {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert one event and wait for the write.
    pub async fn write(&self, event: &SecurityEvent) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO security_audit_logs
                (id, event_type, severity, user_id, role, resource_type, resource_id,
                 request_method, request_path, ip_address, request_id, details, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(event.id)
        .bind(event.kind.as_str())
        .bind(event.severity.as_str())
        .bind(event.user_id)
        .bind(&event.role)
        .bind(&event.resource_type)
        .bind(event.resource_id)
        .bind(&event.request_method)
        .bind(&event.request_path)
        .bind(&event.ip_address)
        .bind(&event.request_id)
        .bind(&event.details)
        .bind(event.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

impl AuditSink for PgAuditSink {
    fn record(&self, event: SecurityEvent) {
        TracingAuditSink.record(event.clone());

        let sink = self.clone();
        tokio::spawn(async move {
            if let Err(e) = sink.write(&event).await {
                tracing::error!(
                    error = %e,
                    event_id = %event.id,
                    event_type = event.kind.as_str(),
                    "Failed to write security audit log"
                );
            }
        });
    }
}

/// Keeps events in memory; used by tests and local tooling.
#[derive(Debug, Clone, Default)]
pub struct MemoryAuditSink {
    events: Arc<Mutex<Vec<SecurityEvent>>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<SecurityEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.events.lock().map(|events| events.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, event: SecurityEvent) {
        match self.events.lock() {
            Ok(mut events) => events.push(event),
            Err(e) => tracing::error!(error = %e, "Memory audit sink mutex poisoned"),
        }
    }
}
