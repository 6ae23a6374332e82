//! Best-effort audit events.
//!
//! The ledger publishes one event after each successful write. Sink failures
//! are logged by the caller and never change an operation's outcome.

use chrono::{DateTime, Utc};
use log::info;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum AuditError {
    #[error("failed to encode audit event: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("failed to write audit event: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    AccountCreated,
    AccountUpdated,
    AccountDeleted,
    CoinsAdded,
    CoinsDeducted,
    SubscriptionActivated,
    SubscriptionRenewed,
}

/// A structured audit record.
#[derive(Debug, Clone, Serialize)]
pub struct AuditEvent {
    pub service_name: String,
    pub event_type: AuditEventType,
    pub entity_id: Uuid,
    pub actor: Uuid,
    pub occurred_at: DateTime<Utc>,
    pub payload: Value,
}

impl AuditEvent {
    /// Builds an event about an account, acted on by that same account.
    pub fn for_account(
        service_name: &str,
        event_type: AuditEventType,
        account_id: Uuid,
        payload: Value,
    ) -> Self {
        AuditEvent {
            service_name: service_name.to_string(),
            event_type,
            entity_id: account_id,
            actor: account_id,
            occurred_at: Utc::now(),
            payload,
        }
    }
}

/// Destination for audit events.
pub trait AuditSink: Send + Sync {
    fn publish(&self, event: &AuditEvent) -> Result<(), AuditError>;
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopAuditSink;

impl AuditSink for NoopAuditSink {
    fn publish(&self, _event: &AuditEvent) -> Result<(), AuditError> {
        Ok(())
    }
}

/// Emits each event as a JSON line on the `audit` log target.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogAuditSink;

impl AuditSink for LogAuditSink {
    fn publish(&self, event: &AuditEvent) -> Result<(), AuditError> {
        let line = serde_json::to_string(event)?;
        info!(target: "audit", "{}", line);
        Ok(())
    }
}

/// Appends each event as one JSON line to a writer.
///
/// Publishing writes and flushes on the caller's thread while holding the
/// writer lock, so a slow writer delays the operation that emitted the event.
pub struct JsonLinesAuditSink<W: Write + Send> {
    writer: Mutex<W>,
}

impl<W: Write + Send> JsonLinesAuditSink<W> {
    pub fn new(writer: W) -> Self {
        JsonLinesAuditSink {
            writer: Mutex::new(writer),
        }
    }

    /// Returns the underlying writer.
    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}

impl JsonLinesAuditSink<File> {
    /// Opens `path` for appending, creating it if needed.
    pub fn append_to(path: &Path) -> Result<Self, AuditError> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self::new(file))
    }
}

impl<W: Write + Send> AuditSink for JsonLinesAuditSink<W> {
    fn publish(&self, event: &AuditEvent) -> Result<(), AuditError> {
        let line = serde_json::to_vec(event)?;
        let mut writer = self.writer.lock();
        writer.write_all(&line)?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        Ok(())
    }
}
