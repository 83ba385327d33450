use chrono::{DateTime, Utc};
use serde::Serialize;

/// Client identity and billing-term record.
///
/// Clients are never hard-deleted: historical invoices reference them, so
/// removal is a soft deactivation of the `active` flag.
#[derive(sqlx::FromRow, Debug, Clone, Serialize)]
pub struct Client {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub company: Option<String>,
    pub billing_address: Option<String>,
    /// Net payment terms in days; feeds invoice due-date computation.
    pub payment_terms: i32,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
