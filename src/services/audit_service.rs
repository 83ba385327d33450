//! Read side of the audit trail. Writing happens implicitly: every mutating
//! service couples its audit entries to the mutation in the same unit of work.

use std::sync::Arc;

use crate::error::Result;
use crate::models::{Actor, AuditLogEntry};
use crate::rbac::{Action, Policy};
use crate::store::{AuditFilter, Page, Store};

pub struct AuditService {
    store: Arc<dyn Store>,
    policy: Policy,
}

impl AuditService {
    pub fn new(store: Arc<dyn Store>, policy: Policy) -> Self {
        Self { store, policy }
    }

    /// Query the audit trail, newest first.
    pub async fn query(
        &self,
        actor: &Actor,
        filter: AuditFilter,
        page: Page,
    ) -> Result<Vec<AuditLogEntry>> {
        self.policy.authorize(actor, Action::ReadAuditLog, None)?;
        self.store.list_audit_entries(filter, page).await
    }
}
