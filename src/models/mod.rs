mod actor;
mod audit;
mod client;
mod invoice;
mod project;
mod sow;
mod timesheet;

pub use actor::{Actor, Role};
pub use audit::{AuditAction, AuditLogEntry, EntityKind};
pub use client::Client;
pub use invoice::{Invoice, InvoiceStatus, LineItem, tax_rate};
pub use project::{Project, ProjectStatus};
pub use sow::{Sow, SowStatus, SowUpdate};
pub use timesheet::{Timesheet, TimesheetStatus, billable_amount};
