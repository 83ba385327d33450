//! Persistence layer.
//!
//! The business services never touch storage rows directly: each operation
//! builds a [`UnitOfWork`] pairing its mutations with the audit entries that
//! document them, and the store commits both atomically. If the commit fails,
//! nothing is applied; a business mutation can never land without its audit
//! record, and no orphan audit record can outlive a rolled-back mutation.
//!
//! Two backends implement [`Store`]: [`PgStore`] over sqlx/Postgres and
//! [`MemStore`], an in-memory implementation with the same transactional
//! semantics used by the test suite.

mod memory;
mod postgres;

pub use memory::MemStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::error::{AppError, Result};
use crate::models::{
    AuditAction, AuditLogEntry, Client, EntityKind, Invoice, InvoiceStatus, LineItem, Project,
    ProjectStatus, Sow, SowStatus, Timesheet, TimesheetStatus,
};

/// Offset/limit pagination window.
#[derive(Debug, Clone, Copy)]
pub struct Page {
    pub offset: i64,
    pub limit: i64,
}

impl Page {
    pub fn new(offset: i64, limit: i64) -> Self {
        Self { offset, limit }
    }

    /// Unbounded window, for internal aggregation reads.
    pub fn all() -> Self {
        Self {
            offset: 0,
            limit: i64::MAX,
        }
    }
}

impl Default for Page {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: 100,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SowFilter {
    pub client_id: Option<i64>,
    pub status: Option<SowStatus>,
}

#[derive(Debug, Clone, Default)]
pub struct TimesheetFilter {
    pub project_id: Option<i64>,
    pub consultant_id: Option<i64>,
    pub status: Option<TimesheetStatus>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default)]
pub struct InvoiceFilter {
    pub client_id: Option<i64>,
    pub project_id: Option<i64>,
    pub status: Option<InvoiceStatus>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default)]
pub struct AuditFilter {
    pub entity_kind: Option<EntityKind>,
    pub entity_id: Option<i64>,
    pub actor_id: Option<i64>,
    pub action: Option<AuditAction>,
}

/// A single write the services may request of the store.
#[derive(Debug, Clone)]
pub enum Mutation {
    InsertClient(Client),
    UpdateClient(Client),
    InsertSow(Sow),
    UpdateSow(Sow),
    InsertProject(Project),
    UpdateProject(Project),
    InsertTimesheet(Timesheet),
    UpdateTimesheet(Timesheet),
    /// Invoice together with its line items; line item ids are assigned by
    /// the store.
    InsertInvoice {
        invoice: Invoice,
        line_items: Vec<LineItem>,
    },
    UpdateInvoice(Invoice),
    /// Mark a timesheet as consumed by an invoice. The store re-reads the
    /// entry at commit time and fails the whole unit of work with
    /// [`AppError::Conflict`] unless it is still approved and unclaimed.
    ClaimTimesheet { timesheet_id: i64, invoice_id: i64 },
}

/// Mutations plus the audit entries documenting them, committed atomically.
#[derive(Debug, Default)]
pub struct UnitOfWork {
    mutations: Vec<Mutation>,
    audit: Vec<AuditLogEntry>,
}

impl UnitOfWork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, mutation: Mutation) {
        self.mutations.push(mutation);
    }

    pub fn record(&mut self, entry: AuditLogEntry) {
        self.audit.push(entry);
    }

    pub fn mutations(&self) -> &[Mutation] {
        &self.mutations
    }

    pub fn audit(&self) -> &[AuditLogEntry] {
        &self.audit
    }

    /// An unaudited financial mutation is a compliance violation; both
    /// backends reject such a unit of work before touching storage.
    pub fn validate_coupling(&self) -> Result<()> {
        if !self.mutations.is_empty() && self.audit.is_empty() {
            return Err(AppError::Internal(
                "unit of work carries mutations without an audit entry".into(),
            ));
        }
        Ok(())
    }
}

/// Transactional persistence collaborator.
///
/// Reads are plain queries; all writes flow through [`Store::commit`].
#[async_trait]
pub trait Store: Send + Sync {
    // Clients
    async fn get_client(&self, id: i64) -> Result<Option<Client>>;
    async fn get_client_by_email(&self, email: &str) -> Result<Option<Client>>;
    async fn list_clients(&self, active: Option<bool>, page: Page) -> Result<Vec<Client>>;

    // SOWs
    async fn get_sow(&self, id: i64) -> Result<Option<Sow>>;
    async fn list_sows(&self, filter: SowFilter, page: Page) -> Result<Vec<Sow>>;

    // Projects
    async fn get_project(&self, id: i64) -> Result<Option<Project>>;
    async fn get_project_for_sow(&self, sow_id: i64) -> Result<Option<Project>>;
    async fn list_projects(&self, status: Option<ProjectStatus>, page: Page)
    -> Result<Vec<Project>>;

    // Timesheets
    async fn get_timesheet(&self, id: i64) -> Result<Option<Timesheet>>;
    async fn list_timesheets(&self, filter: TimesheetFilter, page: Page)
    -> Result<Vec<Timesheet>>;
    /// Approved, not yet invoiced entries for a project: the exact selection
    /// invoice generation consumes.
    async fn list_billable_timesheets(&self, project_id: i64) -> Result<Vec<Timesheet>>;

    // Invoices
    async fn get_invoice(&self, id: i64) -> Result<Option<Invoice>>;
    async fn get_line_items_by_invoice(&self, invoice_id: i64) -> Result<Vec<LineItem>>;
    async fn list_invoices(&self, filter: InvoiceFilter, page: Page) -> Result<Vec<Invoice>>;

    // Audit trail, newest first
    async fn list_audit_entries(&self, filter: AuditFilter, page: Page)
    -> Result<Vec<AuditLogEntry>>;

    /// Allocate the next id for an entity family.
    async fn next_id(&self, kind: EntityKind) -> Result<i64>;

    /// Atomic, collision-free invoice number sequence. Failed generations may
    /// burn a number; they never reuse one.
    async fn next_invoice_sequence(&self) -> Result<i64>;

    /// Apply a unit of work atomically: every mutation and audit entry, or
    /// none of them.
    async fn commit(&self, work: UnitOfWork) -> Result<()>;
}
