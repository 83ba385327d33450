//! Postgres-backed store.
//!
//! All queries are runtime-checked; writes for one unit of work share a
//! single transaction so the mutations and their audit entries land together
//! or not at all.

use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, QueryBuilder};

use crate::config::Config;
use crate::error::{AppError, Result};
use crate::models::{
    AuditLogEntry, Client, EntityKind, Invoice, LineItem, Project, ProjectStatus, Sow, Timesheet,
};
use crate::store::{
    AuditFilter, InvoiceFilter, Mutation, Page, SowFilter, Store, TimesheetFilter, UnitOfWork,
};

/// Database connection pool
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Create a new store with a connection pool
    pub async fn connect(config: &Config) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(config.database_url())
            .await?;

        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get a reference to the connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Apply the embedded schema migrations
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!().run(&self.pool).await?;
        Ok(())
    }
}

fn sequence_name(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::Client => "clients_id_seq",
        EntityKind::Sow => "sows_id_seq",
        EntityKind::Project => "projects_id_seq",
        EntityKind::Timesheet => "timesheets_id_seq",
        EntityKind::Invoice => "invoices_id_seq",
    }
}

fn push_page(qb: &mut QueryBuilder<'_, Postgres>, page: Page) {
    qb.push(" LIMIT ");
    qb.push_bind(page.limit);
    qb.push(" OFFSET ");
    qb.push_bind(page.offset);
}

#[async_trait]
impl Store for PgStore {
    async fn get_client(&self, id: i64) -> Result<Option<Client>> {
        let client = sqlx::query_as::<_, Client>("SELECT * FROM clients WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(client)
    }

    async fn get_client_by_email(&self, email: &str) -> Result<Option<Client>> {
        let client = sqlx::query_as::<_, Client>("SELECT * FROM clients WHERE email = $1")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;

        Ok(client)
    }

    async fn list_clients(&self, active: Option<bool>, page: Page) -> Result<Vec<Client>> {
        let mut qb = QueryBuilder::new("SELECT * FROM clients WHERE TRUE");
        if let Some(active) = active {
            qb.push(" AND active = ");
            qb.push_bind(active);
        }
        qb.push(" ORDER BY name ASC");
        push_page(&mut qb, page);

        Ok(qb.build_query_as::<Client>().fetch_all(&self.pool).await?)
    }

    async fn get_sow(&self, id: i64) -> Result<Option<Sow>> {
        let sow = sqlx::query_as::<_, Sow>("SELECT * FROM sows WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(sow)
    }

    async fn list_sows(&self, filter: SowFilter, page: Page) -> Result<Vec<Sow>> {
        let mut qb = QueryBuilder::new("SELECT * FROM sows WHERE TRUE");
        if let Some(client_id) = filter.client_id {
            qb.push(" AND client_id = ");
            qb.push_bind(client_id);
        }
        if let Some(status) = filter.status {
            qb.push(" AND status = ");
            qb.push_bind(status);
        }
        qb.push(" ORDER BY id ASC");
        push_page(&mut qb, page);

        Ok(qb.build_query_as::<Sow>().fetch_all(&self.pool).await?)
    }

    async fn get_project(&self, id: i64) -> Result<Option<Project>> {
        let project = sqlx::query_as::<_, Project>("SELECT * FROM projects WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(project)
    }

    async fn get_project_for_sow(&self, sow_id: i64) -> Result<Option<Project>> {
        let project = sqlx::query_as::<_, Project>("SELECT * FROM projects WHERE sow_id = $1")
            .bind(sow_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(project)
    }

    async fn list_projects(
        &self,
        status: Option<ProjectStatus>,
        page: Page,
    ) -> Result<Vec<Project>> {
        let mut qb = QueryBuilder::new("SELECT * FROM projects WHERE TRUE");
        if let Some(status) = status {
            qb.push(" AND status = ");
            qb.push_bind(status);
        }
        qb.push(" ORDER BY id ASC");
        push_page(&mut qb, page);

        Ok(qb.build_query_as::<Project>().fetch_all(&self.pool).await?)
    }

    async fn get_timesheet(&self, id: i64) -> Result<Option<Timesheet>> {
        let timesheet = sqlx::query_as::<_, Timesheet>("SELECT * FROM timesheets WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(timesheet)
    }

    async fn list_timesheets(
        &self,
        filter: TimesheetFilter,
        page: Page,
    ) -> Result<Vec<Timesheet>> {
        let mut qb = QueryBuilder::new("SELECT * FROM timesheets WHERE TRUE");
        if let Some(project_id) = filter.project_id {
            qb.push(" AND project_id = ");
            qb.push_bind(project_id);
        }
        if let Some(consultant_id) = filter.consultant_id {
            qb.push(" AND consultant_id = ");
            qb.push_bind(consultant_id);
        }
        if let Some(status) = filter.status {
            qb.push(" AND status = ");
            qb.push_bind(status);
        }
        if let Some(from) = filter.from {
            qb.push(" AND work_date >= ");
            qb.push_bind(from);
        }
        if let Some(to) = filter.to {
            qb.push(" AND work_date <= ");
            qb.push_bind(to);
        }
        qb.push(" ORDER BY work_date ASC, id ASC");
        push_page(&mut qb, page);

        Ok(qb
            .build_query_as::<Timesheet>()
            .fetch_all(&self.pool)
            .await?)
    }

    async fn list_billable_timesheets(&self, project_id: i64) -> Result<Vec<Timesheet>> {
        let timesheets = sqlx::query_as::<_, Timesheet>(
            r#"
            SELECT * FROM timesheets
            WHERE project_id = $1
              AND status = 'approved'
              AND invoice_id IS NULL
            ORDER BY work_date ASC, id ASC
            "#,
        )
        .bind(project_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(timesheets)
    }

    async fn get_invoice(&self, id: i64) -> Result<Option<Invoice>> {
        let invoice = sqlx::query_as::<_, Invoice>("SELECT * FROM invoices WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(invoice)
    }

    async fn get_line_items_by_invoice(&self, invoice_id: i64) -> Result<Vec<LineItem>> {
        let line_items = sqlx::query_as::<_, LineItem>(
            "SELECT * FROM line_items WHERE invoice_id = $1 ORDER BY id ASC",
        )
        .bind(invoice_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(line_items)
    }

    async fn list_invoices(&self, filter: InvoiceFilter, page: Page) -> Result<Vec<Invoice>> {
        let mut qb = QueryBuilder::new("SELECT * FROM invoices WHERE TRUE");
        if let Some(client_id) = filter.client_id {
            qb.push(" AND client_id = ");
            qb.push_bind(client_id);
        }
        if let Some(project_id) = filter.project_id {
            qb.push(" AND project_id = ");
            qb.push_bind(project_id);
        }
        if let Some(status) = filter.status {
            qb.push(" AND status = ");
            qb.push_bind(status);
        }
        if let Some(from) = filter.from {
            qb.push(" AND invoice_date >= ");
            qb.push_bind(from);
        }
        if let Some(to) = filter.to {
            qb.push(" AND invoice_date <= ");
            qb.push_bind(to);
        }
        qb.push(" ORDER BY invoice_date DESC, id DESC");
        push_page(&mut qb, page);

        Ok(qb.build_query_as::<Invoice>().fetch_all(&self.pool).await?)
    }

    async fn list_audit_entries(
        &self,
        filter: AuditFilter,
        page: Page,
    ) -> Result<Vec<AuditLogEntry>> {
        let mut qb = QueryBuilder::new("SELECT * FROM audit_log WHERE TRUE");
        if let Some(entity_kind) = filter.entity_kind {
            qb.push(" AND entity_kind = ");
            qb.push_bind(entity_kind);
        }
        if let Some(entity_id) = filter.entity_id {
            qb.push(" AND entity_id = ");
            qb.push_bind(entity_id);
        }
        if let Some(actor_id) = filter.actor_id {
            qb.push(" AND actor_id = ");
            qb.push_bind(actor_id);
        }
        if let Some(action) = filter.action {
            qb.push(" AND action = ");
            qb.push_bind(action);
        }
        qb.push(" ORDER BY recorded_at DESC, id DESC");
        push_page(&mut qb, page);

        Ok(qb
            .build_query_as::<AuditLogEntry>()
            .fetch_all(&self.pool)
            .await?)
    }

    async fn next_id(&self, kind: EntityKind) -> Result<i64> {
        let id = sqlx::query_scalar::<_, i64>("SELECT nextval($1::regclass)")
            .bind(sequence_name(kind))
            .fetch_one(&self.pool)
            .await?;

        Ok(id)
    }

    async fn next_invoice_sequence(&self) -> Result<i64> {
        let seq = sqlx::query_scalar::<_, i64>("SELECT nextval('invoice_number_seq')")
            .fetch_one(&self.pool)
            .await?;

        Ok(seq)
    }

    async fn commit(&self, work: UnitOfWork) -> Result<()> {
        work.validate_coupling()?;

        // Begin a transaction; an early return rolls everything back.
        let mut tx = self.pool.begin().await?;

        for mutation in work.mutations().iter().cloned() {
            match mutation {
                Mutation::InsertClient(c) => {
                    sqlx::query(
                        r#"
                        INSERT INTO clients
                            (id, name, email, phone, company, billing_address,
                             payment_terms, active, created_at, updated_at)
                        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                        "#,
                    )
                    .bind(c.id)
                    .bind(c.name)
                    .bind(c.email)
                    .bind(c.phone)
                    .bind(c.company)
                    .bind(c.billing_address)
                    .bind(c.payment_terms)
                    .bind(c.active)
                    .bind(c.created_at)
                    .bind(c.updated_at)
                    .execute(&mut *tx)
                    .await?;
                }
                Mutation::UpdateClient(c) => {
                    sqlx::query(
                        r#"
                        UPDATE clients
                        SET name = $1, email = $2, phone = $3, company = $4,
                            billing_address = $5, payment_terms = $6, active = $7,
                            updated_at = $8
                        WHERE id = $9
                        "#,
                    )
                    .bind(c.name)
                    .bind(c.email)
                    .bind(c.phone)
                    .bind(c.company)
                    .bind(c.billing_address)
                    .bind(c.payment_terms)
                    .bind(c.active)
                    .bind(c.updated_at)
                    .bind(c.id)
                    .execute(&mut *tx)
                    .await?;
                }
                Mutation::InsertSow(s) => {
                    sqlx::query(
                        r#"
                        INSERT INTO sows
                            (id, client_id, title, description, start_date, end_date,
                             rate, total_budget, status, created_by, approved_by,
                             approved_at, created_at, updated_at)
                        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
                        "#,
                    )
                    .bind(s.id)
                    .bind(s.client_id)
                    .bind(s.title)
                    .bind(s.description)
                    .bind(s.start_date)
                    .bind(s.end_date)
                    .bind(s.rate)
                    .bind(s.total_budget)
                    .bind(s.status)
                    .bind(s.created_by)
                    .bind(s.approved_by)
                    .bind(s.approved_at)
                    .bind(s.created_at)
                    .bind(s.updated_at)
                    .execute(&mut *tx)
                    .await?;
                }
                Mutation::UpdateSow(s) => {
                    sqlx::query(
                        r#"
                        UPDATE sows
                        SET title = $1, description = $2, start_date = $3, end_date = $4,
                            rate = $5, total_budget = $6, status = $7, approved_by = $8,
                            approved_at = $9, updated_at = $10
                        WHERE id = $11
                        "#,
                    )
                    .bind(s.title)
                    .bind(s.description)
                    .bind(s.start_date)
                    .bind(s.end_date)
                    .bind(s.rate)
                    .bind(s.total_budget)
                    .bind(s.status)
                    .bind(s.approved_by)
                    .bind(s.approved_at)
                    .bind(s.updated_at)
                    .bind(s.id)
                    .execute(&mut *tx)
                    .await?;
                }
                Mutation::InsertProject(p) => {
                    sqlx::query(
                        r#"
                        INSERT INTO projects
                            (id, sow_id, name, description, status, start_date, end_date,
                             budget, created_by, created_at, updated_at)
                        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
                        "#,
                    )
                    .bind(p.id)
                    .bind(p.sow_id)
                    .bind(p.name)
                    .bind(p.description)
                    .bind(p.status)
                    .bind(p.start_date)
                    .bind(p.end_date)
                    .bind(p.budget)
                    .bind(p.created_by)
                    .bind(p.created_at)
                    .bind(p.updated_at)
                    .execute(&mut *tx)
                    .await?;
                }
                Mutation::UpdateProject(p) => {
                    sqlx::query(
                        r#"
                        UPDATE projects
                        SET name = $1, description = $2, status = $3, updated_at = $4
                        WHERE id = $5
                        "#,
                    )
                    .bind(p.name)
                    .bind(p.description)
                    .bind(p.status)
                    .bind(p.updated_at)
                    .bind(p.id)
                    .execute(&mut *tx)
                    .await?;
                }
                Mutation::InsertTimesheet(t) => {
                    sqlx::query(
                        r#"
                        INSERT INTO timesheets
                            (id, project_id, consultant_id, invoice_id, work_date, hours,
                             billing_rate, billable_amount, notes, status, submitted_at,
                             approved_by, approved_at, created_at, updated_at)
                        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13,
                                $14, $15)
                        "#,
                    )
                    .bind(t.id)
                    .bind(t.project_id)
                    .bind(t.consultant_id)
                    .bind(t.invoice_id)
                    .bind(t.work_date)
                    .bind(t.hours)
                    .bind(t.billing_rate)
                    .bind(t.billable_amount)
                    .bind(t.notes)
                    .bind(t.status)
                    .bind(t.submitted_at)
                    .bind(t.approved_by)
                    .bind(t.approved_at)
                    .bind(t.created_at)
                    .bind(t.updated_at)
                    .execute(&mut *tx)
                    .await?;
                }
                Mutation::UpdateTimesheet(t) => {
                    sqlx::query(
                        r#"
                        UPDATE timesheets
                        SET notes = $1, status = $2, submitted_at = $3, approved_by = $4,
                            approved_at = $5, updated_at = $6
                        WHERE id = $7
                        "#,
                    )
                    .bind(t.notes)
                    .bind(t.status)
                    .bind(t.submitted_at)
                    .bind(t.approved_by)
                    .bind(t.approved_at)
                    .bind(t.updated_at)
                    .bind(t.id)
                    .execute(&mut *tx)
                    .await?;
                }
                Mutation::InsertInvoice {
                    invoice,
                    line_items,
                } => {
                    sqlx::query(
                        r#"
                        INSERT INTO invoices
                            (id, client_id, project_id, invoice_number, invoice_date,
                             due_date, subtotal, tax_amount, discount_amount, total_amount,
                             status, payment_date, created_at, updated_at)
                        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
                        "#,
                    )
                    .bind(invoice.id)
                    .bind(invoice.client_id)
                    .bind(invoice.project_id)
                    .bind(invoice.invoice_number)
                    .bind(invoice.invoice_date)
                    .bind(invoice.due_date)
                    .bind(invoice.subtotal)
                    .bind(invoice.tax_amount)
                    .bind(invoice.discount_amount)
                    .bind(invoice.total_amount)
                    .bind(invoice.status)
                    .bind(invoice.payment_date)
                    .bind(invoice.created_at)
                    .bind(invoice.updated_at)
                    .execute(&mut *tx)
                    .await?;

                    for item in line_items {
                        sqlx::query(
                            r#"
                            INSERT INTO line_items
                                (invoice_id, description, quantity, unit_price, line_total)
                            VALUES ($1, $2, $3, $4, $5)
                            "#,
                        )
                        .bind(item.invoice_id)
                        .bind(item.description)
                        .bind(item.quantity)
                        .bind(item.unit_price)
                        .bind(item.line_total)
                        .execute(&mut *tx)
                        .await?;
                    }
                }
                Mutation::UpdateInvoice(i) => {
                    sqlx::query(
                        r#"
                        UPDATE invoices
                        SET status = $1, payment_date = $2, updated_at = $3
                        WHERE id = $4
                        "#,
                    )
                    .bind(i.status)
                    .bind(i.payment_date)
                    .bind(i.updated_at)
                    .bind(i.id)
                    .execute(&mut *tx)
                    .await?;
                }
                Mutation::ClaimTimesheet {
                    timesheet_id,
                    invoice_id,
                } => {
                    // Optimistic recheck at write time: only an approved,
                    // unclaimed entry may be consumed.
                    let result = sqlx::query(
                        r#"
                        UPDATE timesheets
                        SET invoice_id = $1, updated_at = NOW()
                        WHERE id = $2 AND status = 'approved' AND invoice_id IS NULL
                        "#,
                    )
                    .bind(invoice_id)
                    .bind(timesheet_id)
                    .execute(&mut *tx)
                    .await?;

                    if result.rows_affected() != 1 {
                        return Err(AppError::Conflict(format!(
                            "timesheet {timesheet_id} is no longer billable"
                        )));
                    }
                }
            }
        }

        for entry in work.audit().iter().cloned() {
            sqlx::query(
                r#"
                INSERT INTO audit_log
                    (actor_id, action, entity_kind, entity_id, old_values, new_values,
                     description, recorded_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                "#,
            )
            .bind(entry.actor_id)
            .bind(entry.action)
            .bind(entry.entity_kind)
            .bind(entry.entity_id)
            .bind(entry.old_values)
            .bind(entry.new_values)
            .bind(entry.description)
            .bind(entry.recorded_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        Ok(())
    }
}
