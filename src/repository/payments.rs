use chrono::NaiveDate;
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::domain::{Payment, PaymentApplication, PaymentItem, PaymentItemKind, PaymentStatus};
use crate::error::{map_db_error, AppError, AppResult};
use crate::schemas::{PaymentItemInput, PaymentsQuery};

const PAYMENT_COLUMNS: &str = "id, organization_id, tenant_account_id, amount, currency, \
     payment_date, method, reference, receipt_number, status, notes, created_by_user_id, \
     created_at";

pub struct NewPayment<'a> {
    pub organization_id: Uuid,
    pub tenant_account_id: Uuid,
    pub amount: Decimal,
    pub currency: &'a str,
    pub payment_date: NaiveDate,
    pub method: Option<&'a str>,
    pub reference: Option<&'a str>,
    pub notes: Option<&'a str>,
    pub created_by_user_id: Option<Uuid>,
}

pub async fn insert_payment(
    conn: &mut PgConnection,
    payment: NewPayment<'_>,
) -> AppResult<Payment> {
    sqlx::query_as::<_, Payment>(&format!(
        "INSERT INTO payments
             (organization_id, tenant_account_id, amount, currency, payment_date,
              method, reference, notes, created_by_user_id, status)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, 'pending')
         RETURNING {PAYMENT_COLUMNS}"
    ))
    .bind(payment.organization_id)
    .bind(payment.tenant_account_id)
    .bind(payment.amount)
    .bind(payment.currency)
    .bind(payment.payment_date)
    .bind(payment.method)
    .bind(payment.reference)
    .bind(payment.notes)
    .bind(payment.created_by_user_id)
    .fetch_one(&mut *conn)
    .await
    .map_err(map_db_error)
}

pub async fn get_payment(pool: &PgPool, payment_id: Uuid) -> AppResult<Payment> {
    sqlx::query_as::<_, Payment>(&format!(
        "SELECT {PAYMENT_COLUMNS} FROM payments WHERE id = $1"
    ))
    .bind(payment_id)
    .fetch_optional(pool)
    .await
    .map_err(map_db_error)?
    .ok_or_else(|| AppError::NotFound("Payment not found.".to_string()))
}

pub async fn get_payment_for_update(
    conn: &mut PgConnection,
    payment_id: Uuid,
) -> AppResult<Payment> {
    sqlx::query_as::<_, Payment>(&format!(
        "SELECT {PAYMENT_COLUMNS} FROM payments WHERE id = $1 FOR UPDATE"
    ))
    .bind(payment_id)
    .fetch_optional(&mut *conn)
    .await
    .map_err(map_db_error)?
    .ok_or_else(|| AppError::NotFound("Payment not found.".to_string()))
}

pub async fn list_payments(
    pool: &PgPool,
    query: &PaymentsQuery,
    limit: i64,
    offset: i64,
) -> AppResult<Vec<Payment>> {
    let mut builder = QueryBuilder::<Postgres>::new(format!(
        "SELECT {PAYMENT_COLUMNS} FROM payments WHERE 1=1"
    ));

    if let Some(organization_id) = query.organization_id {
        builder.push(" AND organization_id = ").push_bind(organization_id);
    }
    if let Some(tenant_account_id) = query.tenant_account_id {
        builder
            .push(" AND tenant_account_id = ")
            .push_bind(tenant_account_id);
    }
    if let Some(status) = query.status.as_deref().and_then(PaymentStatus::parse) {
        builder.push(" AND status = ").push_bind(status.as_str());
    }

    builder
        .push(" ORDER BY created_at DESC LIMIT ")
        .push_bind(limit)
        .push(" OFFSET ")
        .push_bind(offset.max(0));

    builder
        .build_query_as::<Payment>()
        .fetch_all(pool)
        .await
        .map_err(map_db_error)
}

pub async fn update_status(
    conn: &mut PgConnection,
    payment_id: Uuid,
    status: PaymentStatus,
) -> AppResult<Payment> {
    sqlx::query_as::<_, Payment>(&format!(
        "UPDATE payments SET status = $2 WHERE id = $1 RETURNING {PAYMENT_COLUMNS}"
    ))
    .bind(payment_id)
    .bind(status.as_str())
    .fetch_one(&mut *conn)
    .await
    .map_err(map_db_error)
}

pub async fn set_receipt_number(
    pool: &PgPool,
    payment_id: Uuid,
    receipt_number: &str,
) -> AppResult<()> {
    sqlx::query("UPDATE payments SET receipt_number = $2 WHERE id = $1")
        .bind(payment_id)
        .bind(receipt_number)
        .execute(pool)
        .await
        .map_err(map_db_error)?;
    Ok(())
}

pub struct PendingPaymentPatch<'a> {
    pub amount: Decimal,
    pub payment_date: Option<NaiveDate>,
    pub method: Option<&'a str>,
    pub reference: Option<&'a str>,
    pub notes: Option<&'a str>,
}

pub async fn update_pending_fields(
    conn: &mut PgConnection,
    payment_id: Uuid,
    patch: PendingPaymentPatch<'_>,
) -> AppResult<Payment> {
    sqlx::query_as::<_, Payment>(&format!(
        "UPDATE payments
         SET amount = $2,
             payment_date = COALESCE($3, payment_date),
             method = COALESCE($4, method),
             reference = COALESCE($5, reference),
             notes = COALESCE($6, notes)
         WHERE id = $1
         RETURNING {PAYMENT_COLUMNS}"
    ))
    .bind(payment_id)
    .bind(patch.amount)
    .bind(patch.payment_date)
    .bind(patch.method)
    .bind(patch.reference)
    .bind(patch.notes)
    .fetch_one(&mut *conn)
    .await
    .map_err(map_db_error)
}

pub async fn list_items(pool: &PgPool, payment_id: Uuid) -> AppResult<Vec<PaymentItem>> {
    sqlx::query_as::<_, PaymentItem>(
        "SELECT id, payment_id, kind, description, amount, quantity
         FROM payment_items WHERE payment_id = $1 ORDER BY id",
    )
    .bind(payment_id)
    .fetch_all(pool)
    .await
    .map_err(map_db_error)
}

pub async fn replace_items(
    conn: &mut PgConnection,
    payment_id: Uuid,
    items: &[PaymentItemInput],
) -> AppResult<()> {
    sqlx::query("DELETE FROM payment_items WHERE payment_id = $1")
        .bind(payment_id)
        .execute(&mut *conn)
        .await
        .map_err(map_db_error)?;

    for item in items {
        let kind = PaymentItemKind::parse(&item.kind).ok_or_else(|| {
            AppError::BadRequest(format!("Unknown payment item kind '{}'.", item.kind))
        })?;
        sqlx::query(
            "INSERT INTO payment_items (payment_id, kind, description, amount, quantity)
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(payment_id)
        .bind(kind.as_str())
        .bind(item.description.as_deref())
        .bind(item.amount)
        .bind(item.quantity)
        .execute(&mut *conn)
        .await
        .map_err(map_db_error)?;
    }
    Ok(())
}

pub async fn insert_application(
    conn: &mut PgConnection,
    payment_id: Uuid,
    invoice_id: Uuid,
    amount: Decimal,
) -> AppResult<()> {
    sqlx::query(
        "INSERT INTO payment_applications (payment_id, invoice_id, amount)
         VALUES ($1, $2, $3)",
    )
    .bind(payment_id)
    .bind(invoice_id)
    .bind(amount)
    .execute(&mut *conn)
    .await
    .map_err(map_db_error)?;
    Ok(())
}

pub async fn list_applications(
    conn: &mut PgConnection,
    payment_id: Uuid,
) -> AppResult<Vec<PaymentApplication>> {
    sqlx::query_as::<_, PaymentApplication>(
        "SELECT id, payment_id, invoice_id, amount, created_at
         FROM payment_applications WHERE payment_id = $1 ORDER BY created_at",
    )
    .bind(payment_id)
    .fetch_all(&mut *conn)
    .await
    .map_err(map_db_error)
}

pub async fn delete_applications(
    conn: &mut PgConnection,
    payment_id: Uuid,
) -> AppResult<()> {
    sqlx::query("DELETE FROM payment_applications WHERE payment_id = $1")
        .bind(payment_id)
        .execute(&mut *conn)
        .await
        .map_err(map_db_error)?;
    Ok(())
}
