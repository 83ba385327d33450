use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// SOW approval workflow state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SowStatus {
    Draft,
    Pending,
    Approved,
    Rejected,
}

impl SowStatus {
    /// Central transition table: draft -> pending -> {approved, rejected}.
    /// Approved and rejected are terminal.
    pub fn can_transition(self, next: SowStatus) -> bool {
        matches!(
            (self, next),
            (SowStatus::Draft, SowStatus::Pending)
                | (SowStatus::Pending, SowStatus::Approved)
                | (SowStatus::Pending, SowStatus::Rejected)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SowStatus::Draft => "draft",
            SowStatus::Pending => "pending",
            SowStatus::Approved => "approved",
            SowStatus::Rejected => "rejected",
        }
    }
}

/// Statement of Work: contractual scope, rate and budget for one client.
///
/// Financial and date fields are mutable only while the SOW is in `Draft`.
#[derive(sqlx::FromRow, Debug, Clone, Serialize)]
pub struct Sow {
    pub id: i64,
    pub client_id: i64,
    pub title: String,
    pub description: Option<String>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    /// Hourly billing rate agreed with the client.
    pub rate: Decimal,
    pub total_budget: Decimal,
    pub status: SowStatus,
    pub created_by: i64,
    pub approved_by: Option<i64>,
    pub approved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Partial update applied to a draft SOW; unset fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct SowUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub rate: Option<Decimal>,
    pub total_budget: Option<Decimal>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn draft_can_only_move_to_pending() {
        assert!(SowStatus::Draft.can_transition(SowStatus::Pending));
        assert!(!SowStatus::Draft.can_transition(SowStatus::Approved));
        assert!(!SowStatus::Draft.can_transition(SowStatus::Rejected));
    }

    #[test]
    fn pending_decides_to_approved_or_rejected() {
        assert!(SowStatus::Pending.can_transition(SowStatus::Approved));
        assert!(SowStatus::Pending.can_transition(SowStatus::Rejected));
        assert!(!SowStatus::Pending.can_transition(SowStatus::Draft));
    }

    #[test]
    fn approved_and_rejected_are_terminal() {
        for terminal in [SowStatus::Approved, SowStatus::Rejected] {
            for next in [
                SowStatus::Draft,
                SowStatus::Pending,
                SowStatus::Approved,
                SowStatus::Rejected,
            ] {
                assert!(!terminal.can_transition(next));
            }
        }
    }
}
