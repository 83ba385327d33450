//! Business logic layer.
//!
//! Each service authorizes the acting user against the injected [`Policy`],
//! validates state-machine legality and business invariants, then commits its
//! mutations together with their audit entries in one unit of work.
//!
//! [`Policy`]: crate::rbac::Policy

mod audit_service;
mod client_service;
mod invoice_service;
mod project_service;
mod sow_service;
mod timesheet_service;

pub use audit_service::AuditService;
pub use client_service::{ClientService, ClientUpdate, NewClient};
pub use invoice_service::InvoiceService;
pub use project_service::{NewProject, ProjectService};
pub use sow_service::{NewSow, SowService};
pub use timesheet_service::{NewTimesheet, TimesheetService, TimesheetSummary};
