use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Project delivery state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    Active,
    OnHold,
    Completed,
    Cancelled,
}

impl ProjectStatus {
    /// Active work may be paused, resumed, closed out or cancelled;
    /// completed and cancelled projects never reopen.
    pub fn can_transition(self, next: ProjectStatus) -> bool {
        matches!(
            (self, next),
            (ProjectStatus::Active, ProjectStatus::OnHold)
                | (ProjectStatus::OnHold, ProjectStatus::Active)
                | (ProjectStatus::Active, ProjectStatus::Completed)
                | (ProjectStatus::OnHold, ProjectStatus::Completed)
                | (ProjectStatus::Active, ProjectStatus::Cancelled)
                | (ProjectStatus::OnHold, ProjectStatus::Cancelled)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, ProjectStatus::Completed | ProjectStatus::Cancelled)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ProjectStatus::Active => "active",
            ProjectStatus::OnHold => "on_hold",
            ProjectStatus::Completed => "completed",
            ProjectStatus::Cancelled => "cancelled",
        }
    }
}

/// Delivery engagement spawned from exactly one approved SOW.
/// Date bounds are inherited from, and validated against, the SOW.
#[derive(sqlx::FromRow, Debug, Clone, Serialize)]
pub struct Project {
    pub id: i64,
    pub sow_id: i64,
    pub name: String,
    pub description: Option<String>,
    pub status: ProjectStatus,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub budget: Decimal,
    pub created_by: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Project {
    /// Whether a work date falls inside the project's date bounds.
    pub fn covers(&self, work_date: NaiveDate) -> bool {
        work_date >= self.start_date && work_date <= self.end_date
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hold_and_resume_round_trip() {
        assert!(ProjectStatus::Active.can_transition(ProjectStatus::OnHold));
        assert!(ProjectStatus::OnHold.can_transition(ProjectStatus::Active));
    }

    #[test]
    fn terminal_states_never_reopen() {
        for terminal in [ProjectStatus::Completed, ProjectStatus::Cancelled] {
            assert!(terminal.is_terminal());
            for next in [
                ProjectStatus::Active,
                ProjectStatus::OnHold,
                ProjectStatus::Completed,
                ProjectStatus::Cancelled,
            ] {
                assert!(!terminal.can_transition(next));
            }
        }
    }
}
