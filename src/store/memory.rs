//! In-memory store with the same transactional semantics as the Postgres
//! backend. Backs the test suite and embedded use.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::{AppError, Result};
use crate::models::{
    AuditLogEntry, Client, EntityKind, Invoice, LineItem, Project, ProjectStatus, Sow, Timesheet,
    TimesheetStatus,
};
use crate::store::{
    AuditFilter, InvoiceFilter, Mutation, Page, SowFilter, Store, TimesheetFilter, UnitOfWork,
};

#[derive(Default)]
struct Inner {
    clients: BTreeMap<i64, Client>,
    sows: BTreeMap<i64, Sow>,
    projects: BTreeMap<i64, Project>,
    timesheets: BTreeMap<i64, Timesheet>,
    invoices: BTreeMap<i64, Invoice>,
    line_items: Vec<LineItem>,
    audit: Vec<AuditLogEntry>,
    ids: HashMap<EntityKind, i64>,
    invoice_seq: i64,
    line_item_seq: i64,
    audit_seq: i64,
}

/// In-memory [`Store`] implementation. A single writer lock makes every
/// commit serializable, which is the isolation level invoice generation
/// requires.
#[derive(Default)]
pub struct MemStore {
    inner: RwLock<Inner>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn page<T>(items: Vec<T>, page: Page) -> Vec<T> {
    items
        .into_iter()
        .skip(page.offset.max(0) as usize)
        .take(page.limit.max(0).min(usize::MAX as i64) as usize)
        .collect()
}

impl Inner {
    /// First pass over a unit of work: verify every mutation can apply.
    /// Nothing is written until the whole batch has been checked.
    fn validate(&self, work: &UnitOfWork) -> Result<()> {
        for mutation in work.mutations() {
            match mutation {
                Mutation::InsertClient(c) => {
                    if self.clients.contains_key(&c.id) {
                        return Err(AppError::Conflict(format!("client {} already exists", c.id)));
                    }
                }
                Mutation::UpdateClient(c) => {
                    if !self.clients.contains_key(&c.id) {
                        return Err(AppError::NotFound(format!("client {}", c.id)));
                    }
                }
                Mutation::InsertSow(s) => {
                    if self.sows.contains_key(&s.id) {
                        return Err(AppError::Conflict(format!("SOW {} already exists", s.id)));
                    }
                }
                Mutation::UpdateSow(s) => {
                    if !self.sows.contains_key(&s.id) {
                        return Err(AppError::NotFound(format!("SOW {}", s.id)));
                    }
                }
                Mutation::InsertProject(p) => {
                    if self.projects.contains_key(&p.id) {
                        return Err(AppError::Conflict(format!(
                            "project {} already exists",
                            p.id
                        )));
                    }
                }
                Mutation::UpdateProject(p) => {
                    if !self.projects.contains_key(&p.id) {
                        return Err(AppError::NotFound(format!("project {}", p.id)));
                    }
                }
                Mutation::InsertTimesheet(t) => {
                    if self.timesheets.contains_key(&t.id) {
                        return Err(AppError::Conflict(format!(
                            "timesheet {} already exists",
                            t.id
                        )));
                    }
                }
                Mutation::UpdateTimesheet(t) => {
                    if !self.timesheets.contains_key(&t.id) {
                        return Err(AppError::NotFound(format!("timesheet {}", t.id)));
                    }
                }
                Mutation::InsertInvoice { invoice, .. } => {
                    if self.invoices.contains_key(&invoice.id) {
                        return Err(AppError::Conflict(format!(
                            "invoice {} already exists",
                            invoice.id
                        )));
                    }
                    if self
                        .invoices
                        .values()
                        .any(|i| i.invoice_number == invoice.invoice_number)
                    {
                        return Err(AppError::Conflict(format!(
                            "invoice number {} already allocated",
                            invoice.invoice_number
                        )));
                    }
                }
                Mutation::UpdateInvoice(i) => {
                    if !self.invoices.contains_key(&i.id) {
                        return Err(AppError::NotFound(format!("invoice {}", i.id)));
                    }
                }
                Mutation::ClaimTimesheet { timesheet_id, .. } => {
                    // Optimistic recheck: the entry must still be approved
                    // and unclaimed at commit time.
                    let ts = self.timesheets.get(timesheet_id).ok_or_else(|| {
                        AppError::NotFound(format!("timesheet {timesheet_id}"))
                    })?;
                    if ts.status != TimesheetStatus::Approved || ts.invoice_id.is_some() {
                        return Err(AppError::Conflict(format!(
                            "timesheet {timesheet_id} is no longer billable"
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    fn apply(&mut self, work: UnitOfWork) {
        let UnitOfWork { mutations, audit } = work;
        for mutation in mutations {
            match mutation {
                Mutation::InsertClient(c) | Mutation::UpdateClient(c) => {
                    self.clients.insert(c.id, c);
                }
                Mutation::InsertSow(s) | Mutation::UpdateSow(s) => {
                    self.sows.insert(s.id, s);
                }
                Mutation::InsertProject(p) | Mutation::UpdateProject(p) => {
                    self.projects.insert(p.id, p);
                }
                Mutation::InsertTimesheet(t) | Mutation::UpdateTimesheet(t) => {
                    self.timesheets.insert(t.id, t);
                }
                Mutation::InsertInvoice {
                    invoice,
                    line_items,
                } => {
                    self.invoices.insert(invoice.id, invoice);
                    for mut item in line_items {
                        self.line_item_seq += 1;
                        item.id = self.line_item_seq;
                        self.line_items.push(item);
                    }
                }
                Mutation::UpdateInvoice(i) => {
                    self.invoices.insert(i.id, i);
                }
                Mutation::ClaimTimesheet {
                    timesheet_id,
                    invoice_id,
                } => {
                    if let Some(ts) = self.timesheets.get_mut(&timesheet_id) {
                        ts.invoice_id = Some(invoice_id);
                    }
                }
            }
        }
        for mut entry in audit {
            self.audit_seq += 1;
            entry.id = self.audit_seq;
            self.audit.push(entry);
        }
    }
}

#[async_trait]
impl Store for MemStore {
    async fn get_client(&self, id: i64) -> Result<Option<Client>> {
        Ok(self.inner.read().await.clients.get(&id).cloned())
    }

    async fn get_client_by_email(&self, email: &str) -> Result<Option<Client>> {
        let inner = self.inner.read().await;
        Ok(inner.clients.values().find(|c| c.email == email).cloned())
    }

    async fn list_clients(&self, active: Option<bool>, window: Page) -> Result<Vec<Client>> {
        let inner = self.inner.read().await;
        let mut clients: Vec<Client> = inner
            .clients
            .values()
            .filter(|c| active.is_none_or(|a| c.active == a))
            .cloned()
            .collect();
        clients.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(page(clients, window))
    }

    async fn get_sow(&self, id: i64) -> Result<Option<Sow>> {
        Ok(self.inner.read().await.sows.get(&id).cloned())
    }

    async fn list_sows(&self, filter: SowFilter, window: Page) -> Result<Vec<Sow>> {
        let inner = self.inner.read().await;
        let sows: Vec<Sow> = inner
            .sows
            .values()
            .filter(|s| filter.client_id.is_none_or(|c| s.client_id == c))
            .filter(|s| filter.status.is_none_or(|st| s.status == st))
            .cloned()
            .collect();
        Ok(page(sows, window))
    }

    async fn get_project(&self, id: i64) -> Result<Option<Project>> {
        Ok(self.inner.read().await.projects.get(&id).cloned())
    }

    async fn get_project_for_sow(&self, sow_id: i64) -> Result<Option<Project>> {
        let inner = self.inner.read().await;
        Ok(inner
            .projects
            .values()
            .find(|p| p.sow_id == sow_id)
            .cloned())
    }

    async fn list_projects(
        &self,
        status: Option<ProjectStatus>,
        window: Page,
    ) -> Result<Vec<Project>> {
        let inner = self.inner.read().await;
        let projects: Vec<Project> = inner
            .projects
            .values()
            .filter(|p| status.is_none_or(|s| p.status == s))
            .cloned()
            .collect();
        Ok(page(projects, window))
    }

    async fn get_timesheet(&self, id: i64) -> Result<Option<Timesheet>> {
        Ok(self.inner.read().await.timesheets.get(&id).cloned())
    }

    async fn list_timesheets(
        &self,
        filter: TimesheetFilter,
        window: Page,
    ) -> Result<Vec<Timesheet>> {
        let inner = self.inner.read().await;
        let timesheets: Vec<Timesheet> = inner
            .timesheets
            .values()
            .filter(|t| filter.project_id.is_none_or(|p| t.project_id == p))
            .filter(|t| filter.consultant_id.is_none_or(|c| t.consultant_id == c))
            .filter(|t| filter.status.is_none_or(|s| t.status == s))
            .filter(|t| filter.from.is_none_or(|d| t.work_date >= d))
            .filter(|t| filter.to.is_none_or(|d| t.work_date <= d))
            .cloned()
            .collect();
        Ok(page(timesheets, window))
    }

    async fn list_billable_timesheets(&self, project_id: i64) -> Result<Vec<Timesheet>> {
        let inner = self.inner.read().await;
        Ok(inner
            .timesheets
            .values()
            .filter(|t| {
                t.project_id == project_id
                    && t.status == TimesheetStatus::Approved
                    && t.invoice_id.is_none()
            })
            .cloned()
            .collect())
    }

    async fn get_invoice(&self, id: i64) -> Result<Option<Invoice>> {
        Ok(self.inner.read().await.invoices.get(&id).cloned())
    }

    async fn get_line_items_by_invoice(&self, invoice_id: i64) -> Result<Vec<LineItem>> {
        let inner = self.inner.read().await;
        Ok(inner
            .line_items
            .iter()
            .filter(|li| li.invoice_id == invoice_id)
            .cloned()
            .collect())
    }

    async fn list_invoices(&self, filter: InvoiceFilter, window: Page) -> Result<Vec<Invoice>> {
        let inner = self.inner.read().await;
        let mut invoices: Vec<Invoice> = inner
            .invoices
            .values()
            .filter(|i| filter.client_id.is_none_or(|c| i.client_id == c))
            .filter(|i| filter.project_id.is_none_or(|p| i.project_id == Some(p)))
            .filter(|i| filter.status.is_none_or(|s| i.status == s))
            .filter(|i| filter.from.is_none_or(|d| i.invoice_date >= d))
            .filter(|i| filter.to.is_none_or(|d| i.invoice_date <= d))
            .cloned()
            .collect();
        invoices.sort_by(|a, b| b.invoice_date.cmp(&a.invoice_date).then(b.id.cmp(&a.id)));
        Ok(page(invoices, window))
    }

    async fn list_audit_entries(
        &self,
        filter: AuditFilter,
        window: Page,
    ) -> Result<Vec<AuditLogEntry>> {
        let inner = self.inner.read().await;
        let entries: Vec<AuditLogEntry> = inner
            .audit
            .iter()
            .rev() // append order, so reversed is newest first
            .filter(|e| filter.entity_kind.is_none_or(|k| e.entity_kind == k))
            .filter(|e| filter.entity_id.is_none_or(|id| e.entity_id == id))
            .filter(|e| filter.actor_id.is_none_or(|a| e.actor_id == a))
            .filter(|e| filter.action.is_none_or(|a| e.action == a))
            .cloned()
            .collect();
        Ok(page(entries, window))
    }

    async fn next_id(&self, kind: EntityKind) -> Result<i64> {
        let mut inner = self.inner.write().await;
        let counter = inner.ids.entry(kind).or_insert(0);
        *counter += 1;
        Ok(*counter)
    }

    async fn next_invoice_sequence(&self) -> Result<i64> {
        let mut inner = self.inner.write().await;
        inner.invoice_seq += 1;
        Ok(inner.invoice_seq)
    }

    async fn commit(&self, work: UnitOfWork) -> Result<()> {
        work.validate_coupling()?;
        let mut inner = self.inner.write().await;
        inner.validate(&work)?;
        inner.apply(work);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AuditAction, AuditLogEntry, InvoiceStatus};
    use chrono::{NaiveDate, Utc};
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn timesheet(id: i64, status: TimesheetStatus, invoice_id: Option<i64>) -> Timesheet {
        Timesheet {
            id,
            project_id: 1,
            consultant_id: 1,
            invoice_id,
            work_date: NaiveDate::from_ymd_opt(2025, 2, 3).unwrap(),
            hours: dec!(8),
            billing_rate: dec!(150),
            billable_amount: dec!(1200),
            notes: None,
            status,
            submitted_at: Some(Utc::now()),
            approved_by: None,
            approved_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn audit_entry() -> AuditLogEntry {
        AuditLogEntry::new(
            1,
            AuditAction::Update,
            EntityKind::Timesheet,
            1,
            None,
            json!({}),
            "test entry",
        )
    }

    #[tokio::test]
    async fn commit_rejects_unaudited_mutations() {
        let store = MemStore::new();
        let mut work = UnitOfWork::new();
        work.push(Mutation::InsertTimesheet(timesheet(
            1,
            TimesheetStatus::Submitted,
            None,
        )));
        let err = store.commit(work).await.unwrap_err();
        assert!(matches!(err, AppError::Internal(_)));
        assert!(store.get_timesheet(1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn claiming_a_claimed_timesheet_conflicts_and_applies_nothing() {
        let store = MemStore::new();
        let mut seed = UnitOfWork::new();
        seed.push(Mutation::InsertTimesheet(timesheet(
            1,
            TimesheetStatus::Approved,
            Some(7),
        )));
        seed.push(Mutation::InsertTimesheet(timesheet(
            2,
            TimesheetStatus::Approved,
            None,
        )));
        seed.record(audit_entry());
        store.commit(seed).await.unwrap();

        let mut work = UnitOfWork::new();
        // Both claims are in one unit of work; the first conflicts, so the
        // second must not land either.
        work.push(Mutation::ClaimTimesheet {
            timesheet_id: 1,
            invoice_id: 9,
        });
        work.push(Mutation::ClaimTimesheet {
            timesheet_id: 2,
            invoice_id: 9,
        });
        work.record(audit_entry());
        let err = store.commit(work).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        let untouched = store.get_timesheet(2).await.unwrap().unwrap();
        assert_eq!(untouched.invoice_id, None);
    }

    #[tokio::test]
    async fn duplicate_invoice_numbers_are_rejected() {
        let store = MemStore::new();
        let day = NaiveDate::from_ymd_opt(2025, 2, 3).unwrap();
        let invoice = |id: i64| Invoice {
            id,
            client_id: 1,
            project_id: None,
            invoice_number: "INV-20250203-0001".into(),
            invoice_date: day,
            due_date: day,
            subtotal: dec!(100),
            tax_amount: dec!(10),
            discount_amount: dec!(0),
            total_amount: dec!(110),
            status: InvoiceStatus::Draft,
            payment_date: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        let mut first = UnitOfWork::new();
        first.push(Mutation::InsertInvoice {
            invoice: invoice(1),
            line_items: vec![],
        });
        first.record(audit_entry());
        store.commit(first).await.unwrap();

        let mut second = UnitOfWork::new();
        second.push(Mutation::InsertInvoice {
            invoice: invoice(2),
            line_items: vec![],
        });
        second.record(audit_entry());
        assert!(matches!(
            store.commit(second).await,
            Err(AppError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn id_allocation_is_monotonic_per_entity() {
        let store = MemStore::new();
        assert_eq!(store.next_id(EntityKind::Client).await.unwrap(), 1);
        assert_eq!(store.next_id(EntityKind::Client).await.unwrap(), 2);
        assert_eq!(store.next_id(EntityKind::Invoice).await.unwrap(), 1);
        assert_eq!(store.next_invoice_sequence().await.unwrap(), 1);
        assert_eq!(store.next_invoice_sequence().await.unwrap(), 2);
    }
}
