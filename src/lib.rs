//! Consulting-engagement back office core.
//!
//! Client records flow into Statements of Work, approved SOWs spawn projects,
//! projects accumulate timesheets, and approved timesheets are aggregated into
//! invoices. Every mutation is authorized against a role policy and committed
//! together with its audit trail entry in a single unit of work.
//!
//! The crate owns no transport: callers hand each service an authenticated
//! [`models::Actor`] and get back domain entities or an [`error::AppError`].

pub mod config;
pub mod error;
pub mod models;
pub mod rbac;
pub mod services;
pub mod store;

pub use config::Config;
pub use error::{AppError, Result};
