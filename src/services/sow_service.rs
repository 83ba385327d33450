//! SOW approval workflow: draft -> pending -> {approved, rejected}.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde_json::json;
use tracing::info;

use crate::error::{AppError, Result};
use crate::models::{Actor, AuditAction, AuditLogEntry, EntityKind, Sow, SowStatus, SowUpdate};
use crate::rbac::{Action, Policy};
use crate::store::{Mutation, Page, SowFilter, Store, UnitOfWork};

#[derive(Debug, Clone)]
pub struct NewSow {
    pub client_id: i64,
    pub title: String,
    pub description: Option<String>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub rate: Decimal,
    pub total_budget: Decimal,
}

pub struct SowService {
    store: Arc<dyn Store>,
    policy: Policy,
}

fn validate_terms(start: NaiveDate, end: NaiveDate, rate: Decimal, budget: Decimal) -> Result<()> {
    if end <= start {
        return Err(AppError::Validation(
            "end_date must be after start_date".into(),
        ));
    }
    if rate <= Decimal::ZERO {
        return Err(AppError::Validation("rate must be positive".into()));
    }
    if budget <= Decimal::ZERO {
        return Err(AppError::Validation("total_budget must be positive".into()));
    }
    Ok(())
}

impl SowService {
    pub fn new(store: Arc<dyn Store>, policy: Policy) -> Self {
        Self { store, policy }
    }

    /// Create a new SOW in draft status.
    pub async fn create(&self, actor: &Actor, new: NewSow) -> Result<Sow> {
        self.policy.authorize(actor, Action::CreateSow, None)?;
        validate_terms(new.start_date, new.end_date, new.rate, new.total_budget)?;

        let client = self
            .store
            .get_client(new.client_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("client {}", new.client_id)))?;
        if !client.active {
            return Err(AppError::Precondition(format!(
                "client {} is deactivated",
                client.id
            )));
        }

        let id = self.store.next_id(EntityKind::Sow).await?;
        let now = Utc::now();
        let sow = Sow {
            id,
            client_id: new.client_id,
            title: new.title,
            description: new.description,
            start_date: new.start_date,
            end_date: new.end_date,
            rate: new.rate,
            total_budget: new.total_budget,
            status: SowStatus::Draft,
            created_by: actor.id,
            approved_by: None,
            approved_at: None,
            created_at: now,
            updated_at: now,
        };

        let mut work = UnitOfWork::new();
        work.push(Mutation::InsertSow(sow.clone()));
        work.record(AuditLogEntry::new(
            actor.id,
            AuditAction::Create,
            EntityKind::Sow,
            id,
            None,
            json!({
                "status": sow.status.as_str(),
                "client_id": sow.client_id,
                "title": sow.title,
                "total_budget": sow.total_budget,
            }),
            format!("SOW '{}' created in draft status", sow.title),
        ));
        self.store.commit(work).await?;

        info!(sow_id = id, "SOW created");
        Ok(sow)
    }

    /// Update a draft SOW. Financial and date fields are frozen once the SOW
    /// leaves draft.
    pub async fn update(&self, actor: &Actor, sow_id: i64, update: SowUpdate) -> Result<Sow> {
        self.policy.authorize(actor, Action::UpdateSow, None)?;

        let mut sow = self
            .store
            .get_sow(sow_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("SOW {sow_id}")))?;
        if sow.status != SowStatus::Draft {
            return Err(AppError::InvalidState(format!(
                "cannot update SOW with status '{}'; only draft SOWs can be updated",
                sow.status.as_str()
            )));
        }

        let mut old = serde_json::Map::new();
        let mut new = serde_json::Map::new();
        if let Some(title) = update.title {
            old.insert("title".into(), json!(sow.title));
            new.insert("title".into(), json!(title));
            sow.title = title;
        }
        if let Some(description) = update.description {
            old.insert("description".into(), json!(sow.description));
            new.insert("description".into(), json!(description));
            sow.description = Some(description);
        }
        if let Some(start_date) = update.start_date {
            old.insert("start_date".into(), json!(sow.start_date));
            new.insert("start_date".into(), json!(start_date));
            sow.start_date = start_date;
        }
        if let Some(end_date) = update.end_date {
            old.insert("end_date".into(), json!(sow.end_date));
            new.insert("end_date".into(), json!(end_date));
            sow.end_date = end_date;
        }
        if let Some(rate) = update.rate {
            old.insert("rate".into(), json!(sow.rate));
            new.insert("rate".into(), json!(rate));
            sow.rate = rate;
        }
        if let Some(budget) = update.total_budget {
            old.insert("total_budget".into(), json!(sow.total_budget));
            new.insert("total_budget".into(), json!(budget));
            sow.total_budget = budget;
        }
        if new.is_empty() {
            return Ok(sow);
        }
        validate_terms(sow.start_date, sow.end_date, sow.rate, sow.total_budget)?;
        sow.updated_at = Utc::now();

        let mut work = UnitOfWork::new();
        work.push(Mutation::UpdateSow(sow.clone()));
        work.record(AuditLogEntry::new(
            actor.id,
            AuditAction::Update,
            EntityKind::Sow,
            sow.id,
            Some(old.into()),
            new.into(),
            format!("SOW '{}' updated", sow.title),
        ));
        self.store.commit(work).await?;

        Ok(sow)
    }

    /// Submit a draft SOW for approval.
    pub async fn submit(&self, actor: &Actor, sow_id: i64) -> Result<Sow> {
        self.policy.authorize(actor, Action::SubmitSow, None)?;

        let mut sow = self
            .store
            .get_sow(sow_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("SOW {sow_id}")))?;
        if !sow.status.can_transition(SowStatus::Pending) {
            return Err(AppError::InvalidState(format!(
                "cannot submit SOW with status '{}'; only draft SOWs can be submitted",
                sow.status.as_str()
            )));
        }

        let old_status = sow.status;
        sow.status = SowStatus::Pending;
        sow.updated_at = Utc::now();

        let mut work = UnitOfWork::new();
        work.push(Mutation::UpdateSow(sow.clone()));
        work.record(AuditLogEntry::new(
            actor.id,
            AuditAction::Submit,
            EntityKind::Sow,
            sow.id,
            Some(json!({ "status": old_status.as_str() })),
            json!({ "status": sow.status.as_str() }),
            format!("SOW '{}' submitted for approval", sow.title),
        ));
        self.store.commit(work).await?;

        Ok(sow)
    }

    /// Approve or reject a pending SOW, recording the deciding user.
    pub async fn decide(&self, actor: &Actor, sow_id: i64, approved: bool) -> Result<Sow> {
        self.policy.authorize(actor, Action::DecideSow, None)?;

        let mut sow = self
            .store
            .get_sow(sow_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("SOW {sow_id}")))?;

        let next = if approved {
            SowStatus::Approved
        } else {
            SowStatus::Rejected
        };
        if !sow.status.can_transition(next) {
            return Err(AppError::InvalidState(format!(
                "cannot decide SOW with status '{}'; only pending SOWs can be approved or rejected",
                sow.status.as_str()
            )));
        }

        let old_status = sow.status;
        let decided_at = Utc::now();
        sow.status = next;
        sow.approved_by = Some(actor.id);
        sow.approved_at = Some(decided_at);
        sow.updated_at = decided_at;

        let action = if approved {
            AuditAction::Approve
        } else {
            AuditAction::Reject
        };
        let mut work = UnitOfWork::new();
        work.push(Mutation::UpdateSow(sow.clone()));
        work.record(AuditLogEntry::new(
            actor.id,
            action,
            EntityKind::Sow,
            sow.id,
            Some(json!({ "status": old_status.as_str() })),
            json!({
                "status": sow.status.as_str(),
                "approved_by": actor.id,
                "approved_at": decided_at.to_rfc3339(),
            }),
            format!(
                "SOW '{}' {} by user {}",
                sow.title,
                sow.status.as_str(),
                actor.id
            ),
        ));
        self.store.commit(work).await?;

        info!(sow_id, status = sow.status.as_str(), "SOW decided");
        Ok(sow)
    }

    pub async fn get(&self, actor: &Actor, sow_id: i64) -> Result<Sow> {
        let sow = self
            .store
            .get_sow(sow_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("SOW {sow_id}")))?;
        self.policy
            .authorize(actor, Action::ReadSow, Some(sow.client_id))?;
        Ok(sow)
    }

    pub async fn list(&self, actor: &Actor, mut filter: SowFilter, page: Page) -> Result<Vec<Sow>> {
        if actor.role == crate::models::Role::Client {
            // Client-portal actors only ever see their own account's SOWs.
            filter.client_id = actor.client_id;
            self.policy
                .authorize(actor, Action::ReadSow, actor.client_id)?;
        } else {
            self.policy.authorize(actor, Action::ReadSow, None)?;
        }
        self.store.list_sows(filter, page).await
    }
}
