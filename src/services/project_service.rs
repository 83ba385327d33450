//! Project lifecycle: spawned from approved SOWs, closed out when delivered.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde_json::json;
use tracing::info;

use crate::error::{AppError, Result};
use crate::models::{
    Actor, AuditAction, AuditLogEntry, EntityKind, Project, ProjectStatus, SowStatus,
};
use crate::rbac::{Action, Policy};
use crate::store::{Mutation, Page, Store, UnitOfWork};

#[derive(Debug, Clone)]
pub struct NewProject {
    pub sow_id: i64,
    pub name: String,
    pub description: Option<String>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub budget: Decimal,
}

pub struct ProjectService {
    store: Arc<dyn Store>,
    policy: Policy,
}

impl ProjectService {
    pub fn new(store: Arc<dyn Store>, policy: Policy) -> Self {
        Self { store, policy }
    }

    /// Create a project from an approved SOW. Project dates must fall inside
    /// the SOW's date bounds; one project per SOW.
    pub async fn create_from_sow(&self, actor: &Actor, new: NewProject) -> Result<Project> {
        self.policy.authorize(actor, Action::CreateProject, None)?;

        let sow = self
            .store
            .get_sow(new.sow_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("SOW {}", new.sow_id)))?;
        if sow.status != SowStatus::Approved {
            return Err(AppError::Precondition(format!(
                "SOW must be approved to create a project (current status: '{}')",
                sow.status.as_str()
            )));
        }
        if self.store.get_project_for_sow(new.sow_id).await?.is_some() {
            return Err(AppError::Conflict(format!(
                "a project already exists for SOW {}",
                new.sow_id
            )));
        }
        if new.end_date <= new.start_date {
            return Err(AppError::Validation(
                "end_date must be after start_date".into(),
            ));
        }
        if new.start_date < sow.start_date || new.end_date > sow.end_date {
            return Err(AppError::Validation(format!(
                "project dates must fall within the SOW period {} to {}",
                sow.start_date, sow.end_date
            )));
        }
        if new.budget <= Decimal::ZERO {
            return Err(AppError::Validation("budget must be positive".into()));
        }

        let id = self.store.next_id(EntityKind::Project).await?;
        let now = Utc::now();
        let project = Project {
            id,
            sow_id: new.sow_id,
            name: new.name,
            description: new.description,
            status: ProjectStatus::Active,
            start_date: new.start_date,
            end_date: new.end_date,
            budget: new.budget,
            created_by: actor.id,
            created_at: now,
            updated_at: now,
        };

        let mut work = UnitOfWork::new();
        work.push(Mutation::InsertProject(project.clone()));
        work.record(AuditLogEntry::new(
            actor.id,
            AuditAction::Create,
            EntityKind::Project,
            id,
            None,
            json!({
                "status": project.status.as_str(),
                "sow_id": project.sow_id,
                "name": project.name,
                "budget": project.budget,
            }),
            format!(
                "Project '{}' created from approved SOW {}",
                project.name, project.sow_id
            ),
        ));
        self.store.commit(work).await?;

        info!(project_id = id, sow_id = new.sow_id, "project created");
        Ok(project)
    }

    async fn transition(
        &self,
        actor: &Actor,
        project_id: i64,
        next: ProjectStatus,
        action: AuditAction,
    ) -> Result<Project> {
        self.policy
            .authorize(actor, Action::TransitionProject, None)?;

        let mut project = self
            .store
            .get_project(project_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("project {project_id}")))?;
        if !project.status.can_transition(next) {
            return Err(AppError::InvalidState(format!(
                "project {} cannot move from '{}' to '{}'",
                project_id,
                project.status.as_str(),
                next.as_str()
            )));
        }

        let old_status = project.status;
        project.status = next;
        project.updated_at = Utc::now();

        let mut work = UnitOfWork::new();
        work.push(Mutation::UpdateProject(project.clone()));
        work.record(AuditLogEntry::new(
            actor.id,
            action,
            EntityKind::Project,
            project.id,
            Some(json!({ "status": old_status.as_str() })),
            json!({ "status": project.status.as_str() }),
            format!(
                "Project '{}' moved from {} to {}",
                project.name,
                old_status.as_str(),
                next.as_str()
            ),
        ));
        self.store.commit(work).await?;

        Ok(project)
    }

    /// Close out a delivered project. Legal only from active or on-hold.
    pub async fn close(&self, actor: &Actor, project_id: i64) -> Result<Project> {
        self.transition(actor, project_id, ProjectStatus::Completed, AuditAction::Update)
            .await
    }

    pub async fn put_on_hold(&self, actor: &Actor, project_id: i64) -> Result<Project> {
        self.transition(actor, project_id, ProjectStatus::OnHold, AuditAction::Update)
            .await
    }

    pub async fn resume(&self, actor: &Actor, project_id: i64) -> Result<Project> {
        self.transition(actor, project_id, ProjectStatus::Active, AuditAction::Update)
            .await
    }

    pub async fn cancel(&self, actor: &Actor, project_id: i64) -> Result<Project> {
        self.transition(actor, project_id, ProjectStatus::Cancelled, AuditAction::Cancel)
            .await
    }

    /// Update the free-text description. Blocked once the project is in a
    /// terminal state.
    pub async fn update(
        &self,
        actor: &Actor,
        project_id: i64,
        description: Option<String>,
    ) -> Result<Project> {
        self.policy.authorize(actor, Action::UpdateProject, None)?;

        let mut project = self
            .store
            .get_project(project_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("project {project_id}")))?;
        if project.status.is_terminal() {
            return Err(AppError::InvalidState(format!(
                "cannot update a {} project",
                project.status.as_str()
            )));
        }

        let Some(description) = description else {
            return Ok(project);
        };
        let old_description = project.description.clone();
        project.description = Some(description.clone());
        project.updated_at = Utc::now();

        let mut work = UnitOfWork::new();
        work.push(Mutation::UpdateProject(project.clone()));
        work.record(AuditLogEntry::new(
            actor.id,
            AuditAction::Update,
            EntityKind::Project,
            project.id,
            Some(json!({ "description": old_description })),
            json!({ "description": description }),
            format!("Project '{}' description updated", project.name),
        ));
        self.store.commit(work).await?;

        Ok(project)
    }

    pub async fn get(&self, actor: &Actor, project_id: i64) -> Result<Project> {
        self.policy.authorize(actor, Action::ReadProject, None)?;
        self.store
            .get_project(project_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("project {project_id}")))
    }

    pub async fn list(
        &self,
        actor: &Actor,
        status: Option<ProjectStatus>,
        page: Page,
    ) -> Result<Vec<Project>> {
        self.policy.authorize(actor, Action::ReadProject, None)?;
        self.store.list_projects(status, page).await
    }
}
