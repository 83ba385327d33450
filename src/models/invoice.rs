use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Fixed MVP tax rate applied to every invoice subtotal.
pub fn tax_rate() -> Decimal {
    Decimal::new(10, 2) // 0.10
}

/// Invoice payment state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    Draft,
    Sent,
    Paid,
    Overdue,
    Cancelled,
}

impl InvoiceStatus {
    /// draft -> sent -> {paid, overdue, cancelled}; overdue invoices can still
    /// be paid. Paid and cancelled are terminal, so a paid invoice can never
    /// record a second payment.
    pub fn can_transition(self, next: InvoiceStatus) -> bool {
        matches!(
            (self, next),
            (InvoiceStatus::Draft, InvoiceStatus::Sent)
                | (InvoiceStatus::Draft, InvoiceStatus::Cancelled)
                | (InvoiceStatus::Sent, InvoiceStatus::Paid)
                | (InvoiceStatus::Sent, InvoiceStatus::Overdue)
                | (InvoiceStatus::Sent, InvoiceStatus::Cancelled)
                | (InvoiceStatus::Overdue, InvoiceStatus::Paid)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            InvoiceStatus::Draft => "draft",
            InvoiceStatus::Sent => "sent",
            InvoiceStatus::Paid => "paid",
            InvoiceStatus::Overdue => "overdue",
            InvoiceStatus::Cancelled => "cancelled",
        }
    }
}

/// Invoice aggregating approved, previously un-invoiced timesheet entries.
#[derive(sqlx::FromRow, Debug, Clone, Serialize)]
pub struct Invoice {
    pub id: i64,
    pub client_id: i64,
    pub project_id: Option<i64>,
    /// Globally unique, format `INV-YYYYMMDD-NNNN`.
    pub invoice_number: String,
    pub invoice_date: NaiveDate,
    /// `invoice_date` plus the client's payment terms.
    pub due_date: NaiveDate,
    pub subtotal: Decimal,
    pub tax_amount: Decimal,
    pub discount_amount: Decimal,
    pub total_amount: Decimal,
    pub status: InvoiceStatus,
    pub payment_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Invoice {
    /// Pure totals check: `total = subtotal + tax - discount` must always
    /// hold. A violation is a programming defect, not a user error.
    pub fn validate_totals(&self) -> Result<()> {
        let expected = self.subtotal + self.tax_amount - self.discount_amount;
        if self.total_amount != expected {
            return Err(AppError::Internal(format!(
                "invoice {} totals drifted: expected {expected}, stored {}",
                self.invoice_number, self.total_amount
            )));
        }
        Ok(())
    }

    /// Days past the due date as of `today`; zero when paid or not yet due.
    pub fn days_overdue(&self, today: NaiveDate) -> i64 {
        if self.payment_date.is_some() {
            return 0;
        }
        (today - self.due_date).num_days().max(0)
    }
}

/// One priced invoice row, derived from a single consumed timesheet entry.
#[derive(sqlx::FromRow, Debug, Clone, Serialize)]
pub struct LineItem {
    pub id: i64,
    pub invoice_id: i64,
    pub description: String,
    /// Hours billed.
    pub quantity: Decimal,
    /// Hourly rate captured on the timesheet.
    pub unit_price: Decimal,
    pub line_total: Decimal,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn invoice(subtotal: Decimal, tax: Decimal, discount: Decimal, total: Decimal) -> Invoice {
        let day = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();
        Invoice {
            id: 1,
            client_id: 1,
            project_id: Some(1),
            invoice_number: "INV-20250301-0001".into(),
            invoice_date: day,
            due_date: day,
            subtotal,
            tax_amount: tax,
            discount_amount: discount,
            total_amount: total,
            status: InvoiceStatus::Draft,
            payment_date: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn totals_identity_holds() {
        let inv = invoice(dec!(2700.00), dec!(270.00), dec!(0), dec!(2970.00));
        assert!(inv.validate_totals().is_ok());
    }

    #[test]
    fn drifted_totals_are_a_defect() {
        let inv = invoice(dec!(2700.00), dec!(270.00), dec!(0), dec!(2970.01));
        assert!(matches!(
            inv.validate_totals(),
            Err(AppError::Internal(_))
        ));
    }

    #[test]
    fn paid_is_terminal() {
        assert!(!InvoiceStatus::Paid.can_transition(InvoiceStatus::Paid));
        assert!(!InvoiceStatus::Paid.can_transition(InvoiceStatus::Sent));
        assert!(InvoiceStatus::Overdue.can_transition(InvoiceStatus::Paid));
    }

    #[test]
    fn days_overdue_ignores_paid_invoices() {
        let mut inv = invoice(dec!(100), dec!(10.00), dec!(0), dec!(110.00));
        let later = NaiveDate::from_ymd_opt(2025, 3, 11).unwrap();
        assert_eq!(inv.days_overdue(later), 10);
        inv.payment_date = Some(later);
        assert_eq!(inv.days_overdue(later), 0);
    }
}
