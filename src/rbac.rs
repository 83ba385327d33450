//! Role-based access guard.
//!
//! Authorization is a capability-set lookup: each role maps to a fixed set of
//! permitted actions, and the policy object is injected into every service so
//! call sites never compare role strings inline. Client-portal actors carry an
//! additional ownership restriction: they may only read resources belonging to
//! their own client account.

use crate::error::{AppError, Result};
use crate::models::{Actor, Role};

/// Every operation the core exposes, named from the caller's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    CreateClient,
    UpdateClient,
    DeactivateClient,
    ReadClient,

    CreateSow,
    UpdateSow,
    SubmitSow,
    DecideSow,
    ReadSow,

    CreateProject,
    UpdateProject,
    TransitionProject,
    ReadProject,

    SubmitTimesheet,
    DecideTimesheet,
    ReadTimesheet,

    GenerateInvoice,
    SendInvoice,
    MarkInvoicePaid,
    CancelInvoice,
    ReadInvoice,

    ReadAuditLog,
}

const PROJECT_MANAGER_ACTIONS: &[Action] = &[
    Action::CreateClient,
    Action::UpdateClient,
    Action::DeactivateClient,
    Action::ReadClient,
    Action::CreateSow,
    Action::UpdateSow,
    Action::SubmitSow,
    Action::DecideSow,
    Action::ReadSow,
    Action::CreateProject,
    Action::UpdateProject,
    Action::TransitionProject,
    Action::ReadProject,
    Action::SubmitTimesheet,
    Action::DecideTimesheet,
    Action::ReadTimesheet,
    Action::GenerateInvoice,
    Action::SendInvoice,
    Action::CancelInvoice,
    Action::ReadInvoice,
];

const CONSULTANT_ACTIONS: &[Action] = &[
    Action::SubmitTimesheet,
    Action::ReadTimesheet,
    Action::ReadProject,
];

const CLIENT_ACTIONS: &[Action] = &[Action::ReadSow, Action::ReadInvoice];

const ACCOUNTANT_ACTIONS: &[Action] = &[
    Action::MarkInvoicePaid,
    Action::ReadInvoice,
    Action::ReadClient,
    Action::ReadAuditLog,
];

/// Role -> permitted-action table consulted by every mutating operation.
#[derive(Debug, Clone, Copy, Default)]
pub struct Policy;

impl Policy {
    /// Actions a role may perform. Admin is handled in [`Policy::permits`],
    /// not here: it holds every capability.
    pub fn permitted(role: Role) -> &'static [Action] {
        match role {
            Role::Admin => &[],
            Role::ProjectManager => PROJECT_MANAGER_ACTIONS,
            Role::Consultant => CONSULTANT_ACTIONS,
            Role::Client => CLIENT_ACTIONS,
            Role::Accountant => ACCOUNTANT_ACTIONS,
        }
    }

    pub fn permits(role: Role, action: Action) -> bool {
        role == Role::Admin || Self::permitted(role).contains(&action)
    }

    /// Authorize `actor` to perform `action`, optionally against a resource
    /// owned by `owner_client_id`. Client-role actors are denied any resource
    /// not belonging to their own client account.
    pub fn authorize(
        &self,
        actor: &Actor,
        action: Action,
        owner_client_id: Option<i64>,
    ) -> Result<()> {
        if !Self::permits(actor.role, action) {
            return Err(AppError::Forbidden(format!(
                "role '{}' may not perform {action:?}",
                actor.role.as_str()
            )));
        }
        if actor.role == Role::Client {
            match (owner_client_id, actor.client_id) {
                (Some(owner), Some(own)) if owner == own => {}
                _ => {
                    return Err(AppError::Forbidden(format!(
                        "client actor {} may only access its own account's resources",
                        actor.id
                    )));
                }
            }
        }
        Ok(())
    }
}
