//! End-to-end engagement workflow: client onboarding through SOW approval,
//! project delivery, timesheet approval and invoicing, driven through the
//! service layer against the in-memory store.

use std::sync::Arc;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::json;

use consulting_core::error::AppError;
use consulting_core::models::{
    Actor, AuditAction, EntityKind, InvoiceStatus, Role, SowStatus, TimesheetStatus,
};
use consulting_core::rbac::Policy;
use consulting_core::services::{
    AuditService, ClientService, InvoiceService, NewClient, NewProject, NewSow, NewTimesheet,
    ProjectService, SowService, TimesheetService,
};
use consulting_core::store::{AuditFilter, MemStore, Page, Store};

struct Harness {
    store: Arc<MemStore>,
    clients: ClientService,
    sows: SowService,
    projects: ProjectService,
    timesheets: TimesheetService,
    invoices: InvoiceService,
    audit: AuditService,
}

fn harness() -> Harness {
    let store = Arc::new(MemStore::new());
    let policy = Policy;
    let dyn_store: Arc<dyn Store> = store.clone();
    Harness {
        store,
        clients: ClientService::new(dyn_store.clone(), policy),
        sows: SowService::new(dyn_store.clone(), policy),
        projects: ProjectService::new(dyn_store.clone(), policy),
        timesheets: TimesheetService::new(dyn_store.clone(), policy),
        invoices: InvoiceService::new(dyn_store.clone(), policy),
        audit: AuditService::new(dyn_store, policy),
    }
}

fn admin() -> Actor {
    Actor::new(1, Role::Admin)
}

fn manager() -> Actor {
    Actor::new(2, Role::ProjectManager)
}

fn consultant() -> Actor {
    Actor::new(3, Role::Consultant)
}

fn accountant() -> Actor {
    Actor::new(4, Role::Accountant)
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// Client with net-30 terms, approved SOW at $150/h and an active project.
async fn engagement(h: &Harness) -> i64 {
    let client = h
        .clients
        .create(
            &manager(),
            NewClient {
                name: "Acme Corp".into(),
                email: "billing@acme.example".into(),
                phone: None,
                company: Some("Acme Corp".into()),
                billing_address: Some("1 Main St".into()),
                payment_terms: 30,
            },
        )
        .await
        .unwrap();

    let sow = h
        .sows
        .create(
            &manager(),
            NewSow {
                client_id: client.id,
                title: "Platform modernization".into(),
                description: None,
                start_date: date(2025, 1, 1),
                end_date: date(2025, 12, 31),
                rate: dec!(150.00),
                total_budget: dec!(100000.00),
            },
        )
        .await
        .unwrap();
    h.sows.submit(&manager(), sow.id).await.unwrap();
    h.sows.decide(&admin(), sow.id, true).await.unwrap();

    let project = h
        .projects
        .create_from_sow(
            &manager(),
            NewProject {
                sow_id: sow.id,
                name: "Phase 1".into(),
                description: None,
                start_date: date(2025, 1, 15),
                end_date: date(2025, 6, 30),
                budget: dec!(50000.00),
            },
        )
        .await
        .unwrap();
    project.id
}

async fn approved_entry(h: &Harness, project_id: i64, day: NaiveDate, hours: Decimal) -> i64 {
    let entry = h
        .timesheets
        .submit_entry(
            &consultant(),
            NewTimesheet {
                project_id,
                work_date: day,
                hours,
                billing_rate: dec!(150.00),
                notes: None,
            },
        )
        .await
        .unwrap();
    h.timesheets.approve(&manager(), entry.id).await.unwrap();
    entry.id
}

#[tokio::test]
async fn full_engagement_produces_an_exact_invoice() {
    let h = harness();
    let project_id = engagement(&h).await;

    let ids = [
        approved_entry(&h, project_id, date(2025, 2, 3), dec!(8)).await,
        approved_entry(&h, project_id, date(2025, 2, 4), dec!(6)).await,
        approved_entry(&h, project_id, date(2025, 2, 5), dec!(4)).await,
    ];

    let invoice = h
        .invoices
        .generate(&manager(), project_id, date(2025, 3, 1))
        .await
        .unwrap();

    assert_eq!(invoice.subtotal, dec!(2700.00));
    assert_eq!(invoice.tax_amount, dec!(270.00));
    assert_eq!(invoice.discount_amount, Decimal::ZERO);
    assert_eq!(invoice.total_amount, dec!(2970.00));
    assert_eq!(invoice.status, InvoiceStatus::Draft);
    assert_eq!(invoice.invoice_number, "INV-20250301-0001");
    // Net-30 terms.
    assert_eq!(invoice.due_date, date(2025, 3, 31));

    let (_, line_items) = h.invoices.get(&admin(), invoice.id).await.unwrap();
    assert_eq!(line_items.len(), 3);
    assert!(line_items.iter().all(|li| li.line_total == li.quantity * li.unit_price));

    // Every entry is consumed by exactly this invoice.
    for id in ids {
        let entry = h.timesheets.get(&manager(), id).await.unwrap();
        assert_eq!(entry.invoice_id, Some(invoice.id));
    }
}

#[tokio::test]
async fn generating_twice_finds_nothing_left_to_bill() {
    let h = harness();
    let project_id = engagement(&h).await;
    approved_entry(&h, project_id, date(2025, 2, 3), dec!(8)).await;

    h.invoices
        .generate(&manager(), project_id, date(2025, 3, 1))
        .await
        .unwrap();
    let err = h
        .invoices
        .generate(&manager(), project_id, date(2025, 3, 2))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::EmptyInvoice(_)));
}

#[tokio::test]
async fn submitted_entries_never_bill_and_rejected_entries_stay_out() {
    let h = harness();
    let project_id = engagement(&h).await;

    approved_entry(&h, project_id, date(2025, 2, 3), dec!(8)).await;
    let pending = h
        .timesheets
        .submit_entry(
            &consultant(),
            NewTimesheet {
                project_id,
                work_date: date(2025, 2, 4),
                hours: dec!(6),
                billing_rate: dec!(150.00),
                notes: None,
            },
        )
        .await
        .unwrap();
    let rejected = h
        .timesheets
        .submit_entry(
            &consultant(),
            NewTimesheet {
                project_id,
                work_date: date(2025, 2, 5),
                hours: dec!(4),
                billing_rate: dec!(150.00),
                notes: None,
            },
        )
        .await
        .unwrap();
    h.timesheets
        .reject(&manager(), rejected.id, Some("wrong project".into()))
        .await
        .unwrap();

    let invoice = h
        .invoices
        .generate(&manager(), project_id, date(2025, 3, 1))
        .await
        .unwrap();
    // Only the approved 8-hour entry billed.
    assert_eq!(invoice.subtotal, dec!(1200.00));

    let untouched = h.timesheets.get(&manager(), pending.id).await.unwrap();
    assert_eq!(untouched.status, TimesheetStatus::Submitted);
    assert_eq!(untouched.invoice_id, None);
}

#[tokio::test]
async fn sow_approval_is_audited_and_role_guarded() {
    let h = harness();
    let client = h
        .clients
        .create(
            &admin(),
            NewClient {
                name: "Globex".into(),
                email: "ap@globex.example".into(),
                phone: None,
                company: None,
                billing_address: None,
                payment_terms: 45,
            },
        )
        .await
        .unwrap();
    let sow = h
        .sows
        .create(
            &manager(),
            NewSow {
                client_id: client.id,
                title: "Data migration".into(),
                description: None,
                start_date: date(2025, 3, 1),
                end_date: date(2025, 9, 1),
                rate: dec!(175.00),
                total_budget: dec!(40000.00),
            },
        )
        .await
        .unwrap();
    h.sows.submit(&manager(), sow.id).await.unwrap();

    // A consultant holds no SOW capabilities at all.
    let err = h.sows.decide(&consultant(), sow.id, true).await.unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));

    let before = h
        .audit
        .query(&admin(), AuditFilter::default(), Page::all())
        .await
        .unwrap()
        .len();
    let decided = h.sows.decide(&manager(), sow.id, true).await.unwrap();
    assert_eq!(decided.status, SowStatus::Approved);
    assert_eq!(decided.approved_by, Some(manager().id));

    let entries = h
        .audit
        .query(
            &admin(),
            AuditFilter {
                entity_kind: Some(EntityKind::Sow),
                entity_id: Some(sow.id),
                action: Some(AuditAction::Approve),
                ..Default::default()
            },
            Page::all(),
        )
        .await
        .unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].old_values, Some(json!({ "status": "pending" })));
    assert_eq!(entries[0].new_values["status"], json!("approved"));

    let after = h
        .audit
        .query(&admin(), AuditFilter::default(), Page::all())
        .await
        .unwrap()
        .len();
    // The failed decision wrote nothing; the successful one wrote one entry.
    assert_eq!(after, before + 1);
}

#[tokio::test]
async fn draft_sow_cannot_skip_to_a_decision() {
    let h = harness();
    let client = h
        .clients
        .create(
            &admin(),
            NewClient {
                name: "Initech".into(),
                email: "ap@initech.example".into(),
                phone: None,
                company: None,
                billing_address: None,
                payment_terms: 15,
            },
        )
        .await
        .unwrap();
    let sow = h
        .sows
        .create(
            &manager(),
            NewSow {
                client_id: client.id,
                title: "TPS automation".into(),
                description: None,
                start_date: date(2025, 4, 1),
                end_date: date(2025, 8, 1),
                rate: dec!(120.00),
                total_budget: dec!(20000.00),
            },
        )
        .await
        .unwrap();

    let err = h.sows.decide(&manager(), sow.id, true).await.unwrap_err();
    assert!(matches!(err, AppError::InvalidState(_)));
    let unchanged = h.sows.get(&manager(), sow.id).await.unwrap();
    assert_eq!(unchanged.status, SowStatus::Draft);
}

#[tokio::test]
async fn a_paid_invoice_rejects_a_second_payment() {
    let h = harness();
    let project_id = engagement(&h).await;
    approved_entry(&h, project_id, date(2025, 2, 3), dec!(8)).await;

    let invoice = h
        .invoices
        .generate(&manager(), project_id, date(2025, 3, 1))
        .await
        .unwrap();
    h.invoices.send(&manager(), invoice.id).await.unwrap();
    let paid = h
        .invoices
        .mark_paid(&accountant(), invoice.id, date(2025, 3, 20))
        .await
        .unwrap();
    assert_eq!(paid.status, InvoiceStatus::Paid);
    assert_eq!(paid.payment_date, Some(date(2025, 3, 20)));

    let err = h
        .invoices
        .mark_paid(&accountant(), invoice.id, date(2025, 3, 25))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidState(_)));
    let (unchanged, _) = h.invoices.get(&accountant(), invoice.id).await.unwrap();
    assert_eq!(unchanged.payment_date, Some(date(2025, 3, 20)));
}

#[tokio::test]
async fn overdue_invoices_can_still_be_paid() {
    let h = harness();
    let project_id = engagement(&h).await;
    approved_entry(&h, project_id, date(2025, 2, 3), dec!(8)).await;

    let invoice = h
        .invoices
        .generate(&manager(), project_id, date(2025, 3, 1))
        .await
        .unwrap();
    h.invoices.send(&manager(), invoice.id).await.unwrap();

    // Not yet past the net-30 due date.
    let err = h
        .invoices
        .mark_overdue(&accountant(), invoice.id, date(2025, 3, 31))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    let overdue = h
        .invoices
        .mark_overdue(&accountant(), invoice.id, date(2025, 4, 10))
        .await
        .unwrap();
    assert_eq!(overdue.status, InvoiceStatus::Overdue);
    assert_eq!(overdue.days_overdue(date(2025, 4, 10)), 10);

    let paid = h
        .invoices
        .mark_paid(&accountant(), invoice.id, date(2025, 4, 12))
        .await
        .unwrap();
    assert_eq!(paid.status, InvoiceStatus::Paid);
}

#[tokio::test]
async fn cancelled_invoices_keep_their_timesheets_consumed() {
    let h = harness();
    let project_id = engagement(&h).await;
    let entry_id = approved_entry(&h, project_id, date(2025, 2, 3), dec!(8)).await;

    let invoice = h
        .invoices
        .generate(&manager(), project_id, date(2025, 3, 1))
        .await
        .unwrap();
    let cancelled = h.invoices.cancel(&manager(), invoice.id).await.unwrap();
    assert_eq!(cancelled.status, InvoiceStatus::Cancelled);

    // Billed at most once, ever: cancellation does not release the entry.
    let entry = h.timesheets.get(&manager(), entry_id).await.unwrap();
    assert_eq!(entry.invoice_id, Some(invoice.id));
    let err = h
        .invoices
        .generate(&manager(), project_id, date(2025, 3, 2))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::EmptyInvoice(_)));
}

#[tokio::test]
async fn client_actors_only_see_their_own_account() {
    let h = harness();
    let project_id = engagement(&h).await;
    approved_entry(&h, project_id, date(2025, 2, 3), dec!(8)).await;
    let invoice = h
        .invoices
        .generate(&manager(), project_id, date(2025, 3, 1))
        .await
        .unwrap();

    let own = Actor::client(10, invoice.client_id);
    let other = Actor::client(11, invoice.client_id + 1);

    assert!(h.invoices.get(&own, invoice.id).await.is_ok());
    assert!(matches!(
        h.invoices.get(&other, invoice.id).await,
        Err(AppError::Forbidden(_))
    ));
    assert!(matches!(
        h.audit
            .query(&own, AuditFilter::default(), Page::default())
            .await,
        Err(AppError::Forbidden(_))
    ));
}

#[tokio::test]
async fn project_must_come_from_an_approved_sow() {
    let h = harness();
    let client = h
        .clients
        .create(
            &admin(),
            NewClient {
                name: "Umbrella".into(),
                email: "ap@umbrella.example".into(),
                phone: None,
                company: None,
                billing_address: None,
                payment_terms: 30,
            },
        )
        .await
        .unwrap();
    let sow = h
        .sows
        .create(
            &manager(),
            NewSow {
                client_id: client.id,
                title: "Lab tooling".into(),
                description: None,
                start_date: date(2025, 5, 1),
                end_date: date(2025, 11, 1),
                rate: dec!(200.00),
                total_budget: dec!(60000.00),
            },
        )
        .await
        .unwrap();

    let new_project = NewProject {
        sow_id: sow.id,
        name: "Build-out".into(),
        description: None,
        start_date: date(2025, 5, 1),
        end_date: date(2025, 10, 1),
        budget: dec!(30000.00),
    };
    let err = h
        .projects
        .create_from_sow(&manager(), new_project.clone())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Precondition(_)));

    h.sows.submit(&manager(), sow.id).await.unwrap();
    h.sows.decide(&manager(), sow.id, true).await.unwrap();
    h.projects
        .create_from_sow(&manager(), new_project.clone())
        .await
        .unwrap();

    // One project per SOW.
    let err = h
        .projects
        .create_from_sow(&manager(), new_project)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));
}

#[tokio::test]
async fn timesheets_must_fall_inside_the_project_window() {
    let h = harness();
    let project_id = engagement(&h).await;

    let err = h
        .timesheets
        .submit_entry(
            &consultant(),
            NewTimesheet {
                project_id,
                // Project runs 2025-01-15 to 2025-06-30.
                work_date: date(2025, 7, 1),
                hours: dec!(8),
                billing_rate: dec!(150.00),
                notes: None,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    let err = h
        .timesheets
        .submit_entry(
            &consultant(),
            NewTimesheet {
                project_id,
                work_date: date(2025, 2, 3),
                hours: dec!(25),
                billing_rate: dec!(150.00),
                notes: None,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
}

#[tokio::test]
async fn every_mutation_leaves_an_audit_entry() {
    let h = harness();
    let project_id = engagement(&h).await;
    approved_entry(&h, project_id, date(2025, 2, 3), dec!(8)).await;
    h.invoices
        .generate(&manager(), project_id, date(2025, 3, 1))
        .await
        .unwrap();

    let entries = h
        .audit
        .query(&admin(), AuditFilter::default(), Page::all())
        .await
        .unwrap();
    // client create, SOW create/submit/approve, project create, timesheet
    // submit/approve, invoice generate.
    assert_eq!(entries.len(), 8);
    // Newest first.
    assert_eq!(entries[0].entity_kind, EntityKind::Invoice);
    assert!(entries.windows(2).all(|w| w[0].id > w[1].id));
    // Direct store inspection: no entry ever lacks a new_values payload.
    assert!(h
        .store
        .list_audit_entries(AuditFilter::default(), Page::all())
        .await
        .unwrap()
        .iter()
        .all(|e| !e.new_values.is_null()));
}
