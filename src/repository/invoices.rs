use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::domain::{CommissionInvoice, Invoice, InvoiceStatus};
use crate::error::{map_db_error, AppError, AppResult};
use crate::schemas::InvoicesQuery;

const INVOICE_COLUMNS: &str = "id, organization_id, lease_id, owner_id, tenant_account_id, \
     invoice_number, period_start, period_end, subtotal, late_fee, adjustments, total, \
     currency, amount_paid, due_date, status, issued_at, created_at";

const COMMISSION_COLUMNS: &str = "id, organization_id, invoice_id, owner_id, invoice_number, \
     commission_rate, base_amount, commission_amount, tax_amount, total, currency, due_date, \
     status, created_at";

pub struct NewInvoice<'a> {
    pub organization_id: Uuid,
    pub lease_id: Uuid,
    pub owner_id: Uuid,
    pub tenant_account_id: Uuid,
    pub invoice_number: &'a str,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub subtotal: Decimal,
    pub late_fee: Decimal,
    pub adjustments: Decimal,
    pub total: Decimal,
    pub currency: &'a str,
    pub due_date: NaiveDate,
}

pub async fn insert_invoice(
    conn: &mut PgConnection,
    invoice: NewInvoice<'_>,
) -> AppResult<Invoice> {
    sqlx::query_as::<_, Invoice>(&format!(
        "INSERT INTO invoices
             (organization_id, lease_id, owner_id, tenant_account_id, invoice_number,
              period_start, period_end, subtotal, late_fee, adjustments, total, currency,
              due_date, status)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, 'draft')
         RETURNING {INVOICE_COLUMNS}"
    ))
    .bind(invoice.organization_id)
    .bind(invoice.lease_id)
    .bind(invoice.owner_id)
    .bind(invoice.tenant_account_id)
    .bind(invoice.invoice_number)
    .bind(invoice.period_start)
    .bind(invoice.period_end)
    .bind(invoice.subtotal)
    .bind(invoice.late_fee)
    .bind(invoice.adjustments)
    .bind(invoice.total)
    .bind(invoice.currency)
    .bind(invoice.due_date)
    .fetch_one(&mut *conn)
    .await
    .map_err(map_db_error)
}

pub async fn get_invoice(pool: &PgPool, invoice_id: Uuid) -> AppResult<Invoice> {
    sqlx::query_as::<_, Invoice>(&format!(
        "SELECT {INVOICE_COLUMNS} FROM invoices WHERE id = $1"
    ))
    .bind(invoice_id)
    .fetch_optional(pool)
    .await
    .map_err(map_db_error)?
    .ok_or_else(|| AppError::NotFound("Invoice not found.".to_string()))
}

pub async fn get_invoice_for_update(
    conn: &mut PgConnection,
    invoice_id: Uuid,
) -> AppResult<Invoice> {
    sqlx::query_as::<_, Invoice>(&format!(
        "SELECT {INVOICE_COLUMNS} FROM invoices WHERE id = $1 FOR UPDATE"
    ))
    .bind(invoice_id)
    .fetch_optional(&mut *conn)
    .await
    .map_err(map_db_error)?
    .ok_or_else(|| AppError::NotFound("Invoice not found.".to_string()))
}

pub async fn list_invoices(
    pool: &PgPool,
    query: &InvoicesQuery,
    limit: i64,
    offset: i64,
) -> AppResult<Vec<Invoice>> {
    let mut builder = QueryBuilder::<Postgres>::new(format!(
        "SELECT {INVOICE_COLUMNS} FROM invoices WHERE 1=1"
    ));

    if let Some(organization_id) = query.organization_id {
        builder.push(" AND organization_id = ").push_bind(organization_id);
    }
    if let Some(lease_id) = query.lease_id {
        builder.push(" AND lease_id = ").push_bind(lease_id);
    }
    if let Some(tenant_account_id) = query.tenant_account_id {
        builder
            .push(" AND tenant_account_id = ")
            .push_bind(tenant_account_id);
    }
    if let Some(status) = query.status.as_deref().and_then(InvoiceStatus::parse) {
        builder.push(" AND status = ").push_bind(status.as_str());
    }
    if let Some(due_before) = query.due_before {
        builder.push(" AND due_date <= ").push_bind(due_before);
    }
    if let Some(due_after) = query.due_after {
        builder.push(" AND due_date >= ").push_bind(due_after);
    }

    builder
        .push(" ORDER BY created_at DESC LIMIT ")
        .push_bind(limit)
        .push(" OFFSET ")
        .push_bind(offset.max(0));

    builder
        .build_query_as::<Invoice>()
        .fetch_all(pool)
        .await
        .map_err(map_db_error)
}

/// Invoices still carrying debt for late-fee accrual: everything not paid
/// and not cancelled.
pub async fn list_unpaid_by_account(
    pool: &PgPool,
    account_id: Uuid,
) -> AppResult<Vec<Invoice>> {
    sqlx::query_as::<_, Invoice>(&format!(
        "SELECT {INVOICE_COLUMNS}
         FROM invoices
         WHERE tenant_account_id = $1 AND status NOT IN ('paid', 'cancelled')
         ORDER BY due_date ASC"
    ))
    .bind(account_id)
    .fetch_all(pool)
    .await
    .map_err(map_db_error)
}

/// Outstanding invoices in FIFO order, locked for payment application.
pub async fn list_outstanding_for_update(
    conn: &mut PgConnection,
    account_id: Uuid,
) -> AppResult<Vec<Invoice>> {
    sqlx::query_as::<_, Invoice>(&format!(
        "SELECT {INVOICE_COLUMNS}
         FROM invoices
         WHERE tenant_account_id = $1 AND status IN ('issued', 'partially_paid')
         ORDER BY due_date ASC, created_at ASC
         FOR UPDATE"
    ))
    .bind(account_id)
    .fetch_all(&mut *conn)
    .await
    .map_err(map_db_error)
}

pub async fn mark_issued(
    conn: &mut PgConnection,
    invoice_id: Uuid,
    issued_at: DateTime<Utc>,
) -> AppResult<Invoice> {
    sqlx::query_as::<_, Invoice>(&format!(
        "UPDATE invoices SET status = 'issued', issued_at = $2
         WHERE id = $1
         RETURNING {INVOICE_COLUMNS}"
    ))
    .bind(invoice_id)
    .bind(issued_at)
    .fetch_one(&mut *conn)
    .await
    .map_err(map_db_error)
}

pub async fn mark_cancelled(conn: &mut PgConnection, invoice_id: Uuid) -> AppResult<Invoice> {
    sqlx::query_as::<_, Invoice>(&format!(
        "UPDATE invoices SET status = 'cancelled'
         WHERE id = $1
         RETURNING {INVOICE_COLUMNS}"
    ))
    .bind(invoice_id)
    .fetch_one(&mut *conn)
    .await
    .map_err(map_db_error)
}

pub async fn update_amount_paid(
    conn: &mut PgConnection,
    invoice_id: Uuid,
    amount_paid: Decimal,
    status: InvoiceStatus,
) -> AppResult<()> {
    sqlx::query("UPDATE invoices SET amount_paid = $2, status = $3 WHERE id = $1")
        .bind(invoice_id)
        .bind(amount_paid)
        .bind(status.as_str())
        .execute(&mut *conn)
        .await
        .map_err(map_db_error)?;
    Ok(())
}

pub struct NewCommissionInvoice<'a> {
    pub organization_id: Uuid,
    pub invoice_id: Uuid,
    pub owner_id: Uuid,
    pub invoice_number: &'a str,
    pub commission_rate: Decimal,
    pub base_amount: Decimal,
    pub commission_amount: Decimal,
    pub tax_amount: Decimal,
    pub total: Decimal,
    pub currency: &'a str,
    pub due_date: NaiveDate,
}

pub async fn insert_commission_invoice(
    conn: &mut PgConnection,
    commission: NewCommissionInvoice<'_>,
) -> AppResult<CommissionInvoice> {
    sqlx::query_as::<_, CommissionInvoice>(&format!(
        "INSERT INTO commission_invoices
             (organization_id, invoice_id, owner_id, invoice_number, commission_rate,
              base_amount, commission_amount, tax_amount, total, currency, due_date, status)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, 'draft')
         RETURNING {COMMISSION_COLUMNS}"
    ))
    .bind(commission.organization_id)
    .bind(commission.invoice_id)
    .bind(commission.owner_id)
    .bind(commission.invoice_number)
    .bind(commission.commission_rate)
    .bind(commission.base_amount)
    .bind(commission.commission_amount)
    .bind(commission.tax_amount)
    .bind(commission.total)
    .bind(commission.currency)
    .bind(commission.due_date)
    .fetch_one(&mut *conn)
    .await
    .map_err(map_db_error)
}
