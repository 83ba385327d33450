//! Timesheet ledger: per-entry time records with their own approval
//! sub-workflow feeding invoice generation.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::json;
use tracing::info;

use crate::error::{AppError, Result};
use crate::models::{
    Actor, AuditAction, AuditLogEntry, EntityKind, Role, Timesheet, TimesheetStatus,
    billable_amount,
};
use crate::rbac::{Action, Policy};
use crate::store::{Mutation, Page, Store, TimesheetFilter, UnitOfWork};

const MAX_HOURS_PER_DAY: i64 = 24;

#[derive(Debug, Clone)]
pub struct NewTimesheet {
    pub project_id: i64,
    pub work_date: NaiveDate,
    pub hours: Decimal,
    pub billing_rate: Decimal,
    pub notes: Option<String>,
}

/// Aggregate view over a set of timesheet entries.
#[derive(Debug, Clone, Serialize)]
pub struct TimesheetSummary {
    pub total_hours: Decimal,
    pub total_billable: Decimal,
    pub approved_hours: Decimal,
    pub approved_billable: Decimal,
    pub entry_count: usize,
    pub approved_count: usize,
    pub pending_count: usize,
}

pub struct TimesheetService {
    store: Arc<dyn Store>,
    policy: Policy,
}

impl TimesheetService {
    pub fn new(store: Arc<dyn Store>, policy: Policy) -> Self {
        Self { store, policy }
    }

    /// Record a time entry and submit it for approval in one step. The entry
    /// is always attributed to the submitting actor.
    pub async fn submit_entry(&self, actor: &Actor, new: NewTimesheet) -> Result<Timesheet> {
        self.policy.authorize(actor, Action::SubmitTimesheet, None)?;

        let project = self
            .store
            .get_project(new.project_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("project {}", new.project_id)))?;
        if new.hours <= Decimal::ZERO || new.hours > Decimal::from(MAX_HOURS_PER_DAY) {
            return Err(AppError::Validation(
                "hours must be greater than 0 and at most 24".into(),
            ));
        }
        if new.billing_rate <= Decimal::ZERO {
            return Err(AppError::Validation("billing_rate must be positive".into()));
        }
        if !project.covers(new.work_date) {
            return Err(AppError::Validation(format!(
                "work_date must be between {} and {}",
                project.start_date, project.end_date
            )));
        }

        let id = self.store.next_id(EntityKind::Timesheet).await?;
        let now = Utc::now();
        let timesheet = Timesheet {
            id,
            project_id: new.project_id,
            consultant_id: actor.id,
            invoice_id: None,
            work_date: new.work_date,
            hours: new.hours,
            billing_rate: new.billing_rate,
            billable_amount: billable_amount(new.hours, new.billing_rate),
            notes: new.notes,
            status: TimesheetStatus::Submitted,
            submitted_at: Some(now),
            approved_by: None,
            approved_at: None,
            created_at: now,
            updated_at: now,
        };

        let mut work = UnitOfWork::new();
        work.push(Mutation::InsertTimesheet(timesheet.clone()));
        work.record(AuditLogEntry::new(
            actor.id,
            AuditAction::Submit,
            EntityKind::Timesheet,
            id,
            None,
            json!({
                "project_id": timesheet.project_id,
                "work_date": timesheet.work_date,
                "hours": timesheet.hours,
                "billing_rate": timesheet.billing_rate,
                "status": timesheet.status.as_str(),
            }),
            format!(
                "Timesheet entry for {}: {} hours submitted",
                timesheet.work_date, timesheet.hours
            ),
        ));
        self.store.commit(work).await?;

        info!(timesheet_id = id, project_id = new.project_id, "timesheet submitted");
        Ok(timesheet)
    }

    fn load_for_decision(&self, timesheet: Option<Timesheet>, id: i64) -> Result<Timesheet> {
        let timesheet =
            timesheet.ok_or_else(|| AppError::NotFound(format!("timesheet {id}")))?;
        // A consumed entry is frozen forever, whatever its status claims.
        if timesheet.invoice_id.is_some() {
            return Err(AppError::InvalidState(format!(
                "timesheet {id} has already been invoiced"
            )));
        }
        Ok(timesheet)
    }

    /// Approve a submitted entry, making it billable.
    pub async fn approve(&self, actor: &Actor, timesheet_id: i64) -> Result<Timesheet> {
        self.policy.authorize(actor, Action::DecideTimesheet, None)?;

        let found = self.store.get_timesheet(timesheet_id).await?;
        let mut timesheet = self.load_for_decision(found, timesheet_id)?;
        if !timesheet.status.can_transition(TimesheetStatus::Approved) {
            return Err(AppError::InvalidState(format!(
                "only submitted timesheets can be approved (current: '{}')",
                timesheet.status.as_str()
            )));
        }

        let old_status = timesheet.status;
        let decided_at = Utc::now();
        timesheet.status = TimesheetStatus::Approved;
        timesheet.approved_by = Some(actor.id);
        timesheet.approved_at = Some(decided_at);
        timesheet.updated_at = decided_at;

        let mut work = UnitOfWork::new();
        work.push(Mutation::UpdateTimesheet(timesheet.clone()));
        work.record(AuditLogEntry::new(
            actor.id,
            AuditAction::Approve,
            EntityKind::Timesheet,
            timesheet.id,
            Some(json!({ "status": old_status.as_str() })),
            json!({
                "status": timesheet.status.as_str(),
                "approved_by": actor.id,
                "approved_at": decided_at.to_rfc3339(),
            }),
            format!("Timesheet {timesheet_id} approved for billing"),
        ));
        self.store.commit(work).await?;

        Ok(timesheet)
    }

    /// Reject a submitted entry, excluding it from invoicing.
    pub async fn reject(
        &self,
        actor: &Actor,
        timesheet_id: i64,
        reason: Option<String>,
    ) -> Result<Timesheet> {
        self.policy.authorize(actor, Action::DecideTimesheet, None)?;

        let found = self.store.get_timesheet(timesheet_id).await?;
        let mut timesheet = self.load_for_decision(found, timesheet_id)?;
        if !timesheet.status.can_transition(TimesheetStatus::Rejected) {
            return Err(AppError::InvalidState(format!(
                "only submitted timesheets can be rejected (current: '{}')",
                timesheet.status.as_str()
            )));
        }

        let old_status = timesheet.status;
        timesheet.status = TimesheetStatus::Rejected;
        if let Some(reason) = &reason {
            timesheet.notes = Some(match timesheet.notes.take() {
                Some(notes) => format!("[REJECTED] {reason}\n{notes}"),
                None => format!("[REJECTED] {reason}"),
            });
        }
        timesheet.updated_at = Utc::now();

        let mut work = UnitOfWork::new();
        work.push(Mutation::UpdateTimesheet(timesheet.clone()));
        work.record(AuditLogEntry::new(
            actor.id,
            AuditAction::Reject,
            EntityKind::Timesheet,
            timesheet.id,
            Some(json!({ "status": old_status.as_str() })),
            json!({
                "status": timesheet.status.as_str(),
                "reason": reason,
            }),
            format!("Timesheet {timesheet_id} rejected"),
        ));
        self.store.commit(work).await?;

        Ok(timesheet)
    }

    pub async fn get(&self, actor: &Actor, timesheet_id: i64) -> Result<Timesheet> {
        self.policy.authorize(actor, Action::ReadTimesheet, None)?;
        let timesheet = self
            .store
            .get_timesheet(timesheet_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("timesheet {timesheet_id}")))?;
        if actor.role == Role::Consultant && timesheet.consultant_id != actor.id {
            return Err(AppError::Forbidden(
                "consultants may only read their own timesheets".into(),
            ));
        }
        Ok(timesheet)
    }

    pub async fn list(
        &self,
        actor: &Actor,
        mut filter: TimesheetFilter,
        page: Page,
    ) -> Result<Vec<Timesheet>> {
        self.policy.authorize(actor, Action::ReadTimesheet, None)?;
        if actor.role == Role::Consultant {
            filter.consultant_id = Some(actor.id);
        }
        self.store.list_timesheets(filter, page).await
    }

    /// Hour and billing totals over the entries matching `filter`.
    pub async fn summary(
        &self,
        actor: &Actor,
        mut filter: TimesheetFilter,
    ) -> Result<TimesheetSummary> {
        self.policy.authorize(actor, Action::ReadTimesheet, None)?;
        if actor.role == Role::Consultant {
            filter.consultant_id = Some(actor.id);
        }
        let entries = self.store.list_timesheets(filter, Page::all()).await?;

        let mut summary = TimesheetSummary {
            total_hours: Decimal::ZERO,
            total_billable: Decimal::ZERO,
            approved_hours: Decimal::ZERO,
            approved_billable: Decimal::ZERO,
            entry_count: entries.len(),
            approved_count: 0,
            pending_count: 0,
        };
        for entry in &entries {
            summary.total_hours += entry.hours;
            summary.total_billable += entry.billable_amount;
            match entry.status {
                TimesheetStatus::Approved => {
                    summary.approved_hours += entry.hours;
                    summary.approved_billable += entry.billable_amount;
                    summary.approved_count += 1;
                }
                TimesheetStatus::Submitted => summary.pending_count += 1,
                _ => {}
            }
        }
        Ok(summary)
    }
}
