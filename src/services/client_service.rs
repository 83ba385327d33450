//! Client registry: CRUD over client identity and billing-term records.

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use tracing::info;

use crate::error::{AppError, Result};
use crate::models::{Actor, AuditAction, AuditLogEntry, Client, EntityKind};
use crate::rbac::{Action, Policy};
use crate::store::{Mutation, Page, Store, UnitOfWork};

#[derive(Debug, Clone)]
pub struct NewClient {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub company: Option<String>,
    pub billing_address: Option<String>,
    /// Net payment terms in days.
    pub payment_terms: i32,
}

/// Partial update; unset fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct ClientUpdate {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub company: Option<String>,
    pub billing_address: Option<String>,
    pub payment_terms: Option<i32>,
}

pub struct ClientService {
    store: Arc<dyn Store>,
    policy: Policy,
}

impl ClientService {
    pub fn new(store: Arc<dyn Store>, policy: Policy) -> Self {
        Self { store, policy }
    }

    pub async fn create(&self, actor: &Actor, new: NewClient) -> Result<Client> {
        self.policy.authorize(actor, Action::CreateClient, None)?;

        if new.name.trim().is_empty() {
            return Err(AppError::Validation("client name must not be empty".into()));
        }
        if new.email.trim().is_empty() {
            return Err(AppError::Validation("client email must not be empty".into()));
        }
        if new.payment_terms < 0 {
            return Err(AppError::Validation(
                "payment_terms must not be negative".into(),
            ));
        }
        if self.store.get_client_by_email(&new.email).await?.is_some() {
            return Err(AppError::Conflict(format!(
                "client with email {} already exists",
                new.email
            )));
        }

        let id = self.store.next_id(EntityKind::Client).await?;
        let now = Utc::now();
        let client = Client {
            id,
            name: new.name,
            email: new.email,
            phone: new.phone,
            company: new.company,
            billing_address: new.billing_address,
            payment_terms: new.payment_terms,
            active: true,
            created_at: now,
            updated_at: now,
        };

        let mut work = UnitOfWork::new();
        work.push(Mutation::InsertClient(client.clone()));
        work.record(AuditLogEntry::new(
            actor.id,
            AuditAction::Create,
            EntityKind::Client,
            id,
            None,
            json!({
                "name": client.name,
                "email": client.email,
                "company": client.company,
            }),
            format!("Client '{}' created", client.name),
        ));
        self.store.commit(work).await?;

        info!(client_id = id, "client created");
        Ok(client)
    }

    pub async fn update(
        &self,
        actor: &Actor,
        client_id: i64,
        update: ClientUpdate,
    ) -> Result<Client> {
        self.policy.authorize(actor, Action::UpdateClient, None)?;

        let mut client = self
            .store
            .get_client(client_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("client {client_id}")))?;

        if let Some(email) = &update.email
            && email != &client.email
            && self.store.get_client_by_email(email).await?.is_some()
        {
            return Err(AppError::Conflict(format!(
                "client with email {email} already exists"
            )));
        }
        if let Some(terms) = update.payment_terms
            && terms < 0
        {
            return Err(AppError::Validation(
                "payment_terms must not be negative".into(),
            ));
        }

        let mut old = serde_json::Map::new();
        let mut new = serde_json::Map::new();
        if let Some(name) = update.name {
            old.insert("name".into(), json!(client.name));
            new.insert("name".into(), json!(name));
            client.name = name;
        }
        if let Some(email) = update.email {
            old.insert("email".into(), json!(client.email));
            new.insert("email".into(), json!(email));
            client.email = email;
        }
        if let Some(phone) = update.phone {
            old.insert("phone".into(), json!(client.phone));
            new.insert("phone".into(), json!(phone));
            client.phone = Some(phone);
        }
        if let Some(company) = update.company {
            old.insert("company".into(), json!(client.company));
            new.insert("company".into(), json!(company));
            client.company = Some(company);
        }
        if let Some(address) = update.billing_address {
            old.insert("billing_address".into(), json!(client.billing_address));
            new.insert("billing_address".into(), json!(address));
            client.billing_address = Some(address);
        }
        if let Some(terms) = update.payment_terms {
            old.insert("payment_terms".into(), json!(client.payment_terms));
            new.insert("payment_terms".into(), json!(terms));
            client.payment_terms = terms;
        }
        if new.is_empty() {
            return Ok(client);
        }
        client.updated_at = Utc::now();

        let mut work = UnitOfWork::new();
        work.push(Mutation::UpdateClient(client.clone()));
        work.record(AuditLogEntry::new(
            actor.id,
            AuditAction::Update,
            EntityKind::Client,
            client.id,
            Some(old.into()),
            new.into(),
            format!("Client '{}' updated", client.name),
        ));
        self.store.commit(work).await?;

        Ok(client)
    }

    /// Soft deactivation. Clients are referenced by historical invoices and
    /// are never hard-deleted.
    pub async fn deactivate(&self, actor: &Actor, client_id: i64) -> Result<Client> {
        self.policy.authorize(actor, Action::DeactivateClient, None)?;

        let mut client = self
            .store
            .get_client(client_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("client {client_id}")))?;
        if !client.active {
            return Err(AppError::InvalidState(format!(
                "client {client_id} is already deactivated"
            )));
        }

        client.active = false;
        client.updated_at = Utc::now();

        let mut work = UnitOfWork::new();
        work.push(Mutation::UpdateClient(client.clone()));
        work.record(AuditLogEntry::new(
            actor.id,
            AuditAction::Delete,
            EntityKind::Client,
            client.id,
            Some(json!({ "active": true })),
            json!({ "active": false }),
            format!("Client '{}' deactivated", client.name),
        ));
        self.store.commit(work).await?;

        info!(client_id, "client deactivated");
        Ok(client)
    }

    pub async fn get(&self, actor: &Actor, client_id: i64) -> Result<Client> {
        self.policy.authorize(actor, Action::ReadClient, None)?;
        self.store
            .get_client(client_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("client {client_id}")))
    }

    pub async fn list(
        &self,
        actor: &Actor,
        active: Option<bool>,
        page: Page,
    ) -> Result<Vec<Client>> {
        self.policy.authorize(actor, Action::ReadClient, None)?;
        self.store.list_clients(active, page).await
    }
}
