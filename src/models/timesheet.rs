use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Timesheet approval state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TimesheetStatus {
    Draft,
    Submitted,
    Approved,
    Rejected,
}

impl TimesheetStatus {
    /// draft -> submitted -> {approved, rejected}. Entries are created
    /// directly in `Submitted`; the `Draft` arm exists for imported data.
    pub fn can_transition(self, next: TimesheetStatus) -> bool {
        matches!(
            (self, next),
            (TimesheetStatus::Draft, TimesheetStatus::Submitted)
                | (TimesheetStatus::Submitted, TimesheetStatus::Approved)
                | (TimesheetStatus::Submitted, TimesheetStatus::Rejected)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TimesheetStatus::Draft => "draft",
            TimesheetStatus::Submitted => "submitted",
            TimesheetStatus::Approved => "approved",
            TimesheetStatus::Rejected => "rejected",
        }
    }
}

/// Exact billable amount for a time entry. Decimal throughout, no rounding:
/// the product of two scale-2 decimals is representable exactly.
pub fn billable_amount(hours: Decimal, rate: Decimal) -> Decimal {
    hours * rate
}

/// One per-day time record bound to a project and a submitting consultant.
///
/// `invoice_id` is set once the entry has been consumed by an invoice;
/// a consumed entry can never be re-approved or billed a second time.
#[derive(sqlx::FromRow, Debug, Clone, Serialize)]
pub struct Timesheet {
    pub id: i64,
    pub project_id: i64,
    pub consultant_id: i64,
    pub invoice_id: Option<i64>,
    pub work_date: NaiveDate,
    pub hours: Decimal,
    /// Rate captured at submission time; later SOW edits do not reprice
    /// already-logged work.
    pub billing_rate: Decimal,
    pub billable_amount: Decimal,
    pub notes: Option<String>,
    pub status: TimesheetStatus,
    pub submitted_at: Option<DateTime<Utc>>,
    pub approved_by: Option<i64>,
    pub approved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
