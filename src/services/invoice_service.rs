//! Invoice generation and payment tracking.
//!
//! Generation aggregates every approved, not-yet-invoiced timesheet entry for
//! a project into one invoice. The invoice insert, the line items, the
//! timesheet claims and the audit entry travel in a single unit of work, so a
//! concurrent competing generation fails whole with a conflict and leaves no
//! partial billing behind.

use std::sync::Arc;

use chrono::{Days, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde_json::json;
use tracing::{info, warn};

use crate::error::{AppError, Result};
use crate::models::{
    Actor, AuditAction, AuditLogEntry, EntityKind, Invoice, InvoiceStatus, LineItem, Role,
    tax_rate,
};
use crate::rbac::{Action, Policy};
use crate::store::{InvoiceFilter, Mutation, Page, Store, UnitOfWork};

pub struct InvoiceService {
    store: Arc<dyn Store>,
    policy: Policy,
}

impl InvoiceService {
    pub fn new(store: Arc<dyn Store>, policy: Policy) -> Self {
        Self { store, policy }
    }

    /// Generate a draft invoice from the project's approved, unclaimed
    /// timesheet entries.
    pub async fn generate(
        &self,
        actor: &Actor,
        project_id: i64,
        invoice_date: NaiveDate,
    ) -> Result<Invoice> {
        self.policy.authorize(actor, Action::GenerateInvoice, None)?;

        let project = self
            .store
            .get_project(project_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("project {project_id}")))?;
        let sow = self
            .store
            .get_sow(project.sow_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("SOW {}", project.sow_id)))?;
        let client = self
            .store
            .get_client(sow.client_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("client {}", sow.client_id)))?;

        let timesheets = self.store.list_billable_timesheets(project_id).await?;
        if timesheets.is_empty() {
            return Err(AppError::EmptyInvoice(format!(
                "no approved, uninvoiced timesheets for project {project_id}"
            )));
        }

        // Decimal accumulation; rounding happens once, at the tax boundary.
        let subtotal: Decimal = timesheets.iter().map(|t| t.billable_amount).sum();
        let tax_amount = (subtotal * tax_rate()).round_dp(2);
        let discount_amount = Decimal::ZERO;
        let total_amount = subtotal + tax_amount - discount_amount;

        let sequence = self.store.next_invoice_sequence().await?;
        let invoice_number = format!("INV-{}-{:04}", invoice_date.format("%Y%m%d"), sequence);
        let id = self.store.next_id(EntityKind::Invoice).await?;
        let due_date = invoice_date
            .checked_add_days(Days::new(client.payment_terms.max(0) as u64))
            .ok_or_else(|| {
                AppError::Validation(format!(
                    "due date overflows for payment terms {}",
                    client.payment_terms
                ))
            })?;

        let now = Utc::now();
        let invoice = Invoice {
            id,
            client_id: client.id,
            project_id: Some(project_id),
            invoice_number,
            invoice_date,
            due_date,
            subtotal,
            tax_amount,
            discount_amount,
            total_amount,
            status: InvoiceStatus::Draft,
            payment_date: None,
            created_at: now,
            updated_at: now,
        };
        invoice.validate_totals()?;

        let line_items: Vec<LineItem> = timesheets
            .iter()
            .map(|t| LineItem {
                id: 0,
                invoice_id: id,
                description: format!("Consulting services - {}", t.work_date),
                quantity: t.hours,
                unit_price: t.billing_rate,
                line_total: t.billable_amount,
            })
            .collect();

        let mut work = UnitOfWork::new();
        work.push(Mutation::InsertInvoice {
            invoice: invoice.clone(),
            line_items,
        });
        for timesheet in &timesheets {
            work.push(Mutation::ClaimTimesheet {
                timesheet_id: timesheet.id,
                invoice_id: id,
            });
        }
        work.record(AuditLogEntry::new(
            actor.id,
            AuditAction::Create,
            EntityKind::Invoice,
            id,
            None,
            json!({
                "client_id": invoice.client_id,
                "project_id": project_id,
                "invoice_number": invoice.invoice_number,
                "subtotal": invoice.subtotal,
                "tax_amount": invoice.tax_amount,
                "total_amount": invoice.total_amount,
            }),
            format!(
                "Invoice {} generated for {} timesheets",
                invoice.invoice_number,
                timesheets.len()
            ),
        ));

        if let Err(err) = self.store.commit(work).await {
            if matches!(err, AppError::Conflict(_)) {
                warn!(project_id, "invoice generation lost a billing race");
            }
            return Err(err);
        }

        info!(
            invoice_id = id,
            invoice_number = %invoice.invoice_number,
            total = %invoice.total_amount,
            "invoice generated"
        );
        Ok(invoice)
    }

    async fn transition(
        &self,
        actor: &Actor,
        invoice_id: i64,
        next: InvoiceStatus,
        action: AuditAction,
        payment_date: Option<NaiveDate>,
    ) -> Result<Invoice> {
        let mut invoice = self
            .store
            .get_invoice(invoice_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("invoice {invoice_id}")))?;
        if !invoice.status.can_transition(next) {
            return Err(AppError::InvalidState(format!(
                "invoice {} cannot move from '{}' to '{}'",
                invoice.invoice_number,
                invoice.status.as_str(),
                next.as_str()
            )));
        }

        let old_status = invoice.status;
        invoice.status = next;
        invoice.payment_date = payment_date.or(invoice.payment_date);
        invoice.updated_at = Utc::now();

        let mut new_values = serde_json::Map::new();
        new_values.insert("status".into(), json!(invoice.status.as_str()));
        if let Some(paid_on) = payment_date {
            new_values.insert("payment_date".into(), json!(paid_on));
        }

        let mut work = UnitOfWork::new();
        work.push(Mutation::UpdateInvoice(invoice.clone()));
        work.record(AuditLogEntry::new(
            actor.id,
            action,
            EntityKind::Invoice,
            invoice.id,
            Some(json!({ "status": old_status.as_str() })),
            new_values.into(),
            format!(
                "Invoice {} moved from {} to {}",
                invoice.invoice_number,
                old_status.as_str(),
                next.as_str()
            ),
        ));
        self.store.commit(work).await?;

        Ok(invoice)
    }

    /// Issue a draft invoice to the client.
    pub async fn send(&self, actor: &Actor, invoice_id: i64) -> Result<Invoice> {
        self.policy.authorize(actor, Action::SendInvoice, None)?;
        self.transition(actor, invoice_id, InvoiceStatus::Sent, AuditAction::Send, None)
            .await
    }

    /// Record payment. Legal from sent or overdue; a paid invoice can never
    /// be paid again.
    pub async fn mark_paid(
        &self,
        actor: &Actor,
        invoice_id: i64,
        payment_date: NaiveDate,
    ) -> Result<Invoice> {
        self.policy.authorize(actor, Action::MarkInvoicePaid, None)?;
        self.transition(
            actor,
            invoice_id,
            InvoiceStatus::Paid,
            AuditAction::MarkPaid,
            Some(payment_date),
        )
        .await
    }

    /// Flag a sent invoice whose due date has passed.
    pub async fn mark_overdue(
        &self,
        actor: &Actor,
        invoice_id: i64,
        as_of: NaiveDate,
    ) -> Result<Invoice> {
        self.policy.authorize(actor, Action::MarkInvoicePaid, None)?;

        let invoice = self
            .store
            .get_invoice(invoice_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("invoice {invoice_id}")))?;
        if as_of <= invoice.due_date {
            return Err(AppError::Validation(format!(
                "invoice {} is not past its due date {}",
                invoice.invoice_number, invoice.due_date
            )));
        }
        self.transition(
            actor,
            invoice_id,
            InvoiceStatus::Overdue,
            AuditAction::Update,
            None,
        )
        .await
    }

    /// Void an unpaid invoice. Timesheets consumed by a cancelled invoice
    /// stay consumed; an entry is billed at most once, ever.
    pub async fn cancel(&self, actor: &Actor, invoice_id: i64) -> Result<Invoice> {
        self.policy.authorize(actor, Action::CancelInvoice, None)?;
        self.transition(
            actor,
            invoice_id,
            InvoiceStatus::Cancelled,
            AuditAction::Cancel,
            None,
        )
        .await
    }

    /// Fetch an invoice with its line items, re-validating the totals
    /// identity on the way out.
    pub async fn get(&self, actor: &Actor, invoice_id: i64) -> Result<(Invoice, Vec<LineItem>)> {
        let invoice = self
            .store
            .get_invoice(invoice_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("invoice {invoice_id}")))?;
        self.policy
            .authorize(actor, Action::ReadInvoice, Some(invoice.client_id))?;
        invoice.validate_totals()?;
        let line_items = self.store.get_line_items_by_invoice(invoice_id).await?;
        Ok((invoice, line_items))
    }

    pub async fn list(
        &self,
        actor: &Actor,
        mut filter: InvoiceFilter,
        page: Page,
    ) -> Result<Vec<Invoice>> {
        if actor.role == Role::Client {
            filter.client_id = actor.client_id;
            self.policy
                .authorize(actor, Action::ReadInvoice, actor.client_id)?;
        } else {
            self.policy.authorize(actor, Action::ReadInvoice, None)?;
        }
        self.store.list_invoices(filter, page).await
    }
}
