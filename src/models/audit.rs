use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Audited action kinds. Serialized lowercase into the audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Create,
    Update,
    Delete,
    Submit,
    Approve,
    Reject,
    Send,
    MarkPaid,
    Cancel,
}

impl AuditAction {
    pub fn as_str(self) -> &'static str {
        match self {
            AuditAction::Create => "create",
            AuditAction::Update => "update",
            AuditAction::Delete => "delete",
            AuditAction::Submit => "submit",
            AuditAction::Approve => "approve",
            AuditAction::Reject => "reject",
            AuditAction::Send => "send",
            AuditAction::MarkPaid => "mark_paid",
            AuditAction::Cancel => "cancel",
        }
    }
}

/// Entity families tracked by the audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Client,
    Sow,
    Project,
    Timesheet,
    Invoice,
}

impl EntityKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EntityKind::Client => "client",
            EntityKind::Sow => "sow",
            EntityKind::Project => "project",
            EntityKind::Timesheet => "timesheet",
            EntityKind::Invoice => "invoice",
        }
    }
}

/// One immutable audit trail row: who changed what, from what old value to
/// what new value, and why. Never updated or deleted once written.
#[derive(sqlx::FromRow, Debug, Clone, Serialize)]
pub struct AuditLogEntry {
    pub id: i64,
    pub actor_id: i64,
    pub action: AuditAction,
    pub entity_kind: EntityKind,
    pub entity_id: i64,
    /// Snapshot of the mutated fields before the change; absent for creates.
    pub old_values: Option<Value>,
    pub new_values: Value,
    pub description: String,
    pub recorded_at: DateTime<Utc>,
}

impl AuditLogEntry {
    /// Entry ready for inclusion in a unit of work. The store assigns the id
    /// at commit time.
    pub fn new(
        actor_id: i64,
        action: AuditAction,
        entity_kind: EntityKind,
        entity_id: i64,
        old_values: Option<Value>,
        new_values: Value,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: 0,
            actor_id,
            action,
            entity_kind,
            entity_id,
            old_values,
            new_values,
            description: description.into(),
            recorded_at: Utc::now(),
        }
    }
}
