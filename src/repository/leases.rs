use chrono::NaiveDate;
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::domain::{LeaseBilling, Owner};
use crate::error::{map_db_error, AppError, AppResult};

const LEASE_COLUMNS: &str = "id, organization_id, owner_id, tenant_id, currency, monthly_rent, \
     additional_expenses, payment_frequency, payment_due_day, late_fee_type, late_fee_value, \
     adjustment_type, adjustment_value, inflation_index_type, adjustment_frequency_months, \
     last_adjustment_date, next_adjustment_date, last_billing_date, next_billing_date";

pub async fn get_lease_billing(pool: &PgPool, lease_id: Uuid) -> AppResult<LeaseBilling> {
    sqlx::query_as::<_, LeaseBilling>(&format!(
        "SELECT {LEASE_COLUMNS} FROM leases WHERE id = $1"
    ))
    .bind(lease_id)
    .fetch_optional(pool)
    .await
    .map_err(map_db_error)?
    .ok_or_else(|| AppError::NotFound("Lease not found.".to_string()))
}

/// Locked variant for invoice generation: the same lease must not be billed
/// twice concurrently (both runs would read the same next_billing_date).
pub async fn get_lease_billing_for_update(
    conn: &mut PgConnection,
    lease_id: Uuid,
) -> AppResult<LeaseBilling> {
    sqlx::query_as::<_, LeaseBilling>(&format!(
        "SELECT {LEASE_COLUMNS} FROM leases WHERE id = $1 FOR UPDATE"
    ))
    .bind(lease_id)
    .fetch_optional(&mut *conn)
    .await
    .map_err(map_db_error)?
    .ok_or_else(|| AppError::NotFound("Lease not found.".to_string()))
}

pub async fn update_lease_rent(
    conn: &mut PgConnection,
    lease_id: Uuid,
    monthly_rent: Decimal,
    last_adjustment_date: NaiveDate,
    next_adjustment_date: NaiveDate,
) -> AppResult<()> {
    sqlx::query(
        "UPDATE leases
         SET monthly_rent = $2, last_adjustment_date = $3, next_adjustment_date = $4
         WHERE id = $1",
    )
    .bind(lease_id)
    .bind(monthly_rent)
    .bind(last_adjustment_date)
    .bind(next_adjustment_date)
    .execute(&mut *conn)
    .await
    .map_err(map_db_error)?;
    Ok(())
}

pub async fn update_lease_billing_schedule(
    conn: &mut PgConnection,
    lease_id: Uuid,
    last_billing_date: NaiveDate,
    next_billing_date: NaiveDate,
) -> AppResult<()> {
    sqlx::query(
        "UPDATE leases SET last_billing_date = $2, next_billing_date = $3 WHERE id = $1",
    )
    .bind(lease_id)
    .bind(last_billing_date)
    .bind(next_billing_date)
    .execute(&mut *conn)
    .await
    .map_err(map_db_error)?;
    Ok(())
}

pub async fn get_owner(pool: &PgPool, owner_id: Uuid) -> AppResult<Owner> {
    sqlx::query_as::<_, Owner>(
        "SELECT id, organization_id, full_name, commission_rate FROM owners WHERE id = $1",
    )
    .bind(owner_id)
    .fetch_optional(pool)
    .await
    .map_err(map_db_error)?
    .ok_or_else(|| AppError::NotFound("Owner not found.".to_string()))
}
