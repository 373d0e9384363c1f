use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::domain::{MovementType, TenantAccount, TenantAccountMovement};
use crate::error::{map_db_error, AppError, AppResult};

const ACCOUNT_COLUMNS: &str =
    "id, lease_id, currency, balance, last_movement_at, created_at";

const MOVEMENT_COLUMNS: &str = "id, account_id, movement_type, amount, balance_after, \
     reference_type, reference_id, description, movement_date, created_at";

pub async fn get_account(pool: &PgPool, account_id: Uuid) -> AppResult<TenantAccount> {
    sqlx::query_as::<_, TenantAccount>(&format!(
        "SELECT {ACCOUNT_COLUMNS} FROM tenant_accounts WHERE id = $1"
    ))
    .bind(account_id)
    .fetch_optional(pool)
    .await
    .map_err(map_db_error)?
    .ok_or_else(|| AppError::NotFound("Tenant account not found.".to_string()))
}

pub async fn get_account_by_lease(pool: &PgPool, lease_id: Uuid) -> AppResult<TenantAccount> {
    sqlx::query_as::<_, TenantAccount>(&format!(
        "SELECT {ACCOUNT_COLUMNS} FROM tenant_accounts WHERE lease_id = $1"
    ))
    .bind(lease_id)
    .fetch_optional(pool)
    .await
    .map_err(map_db_error)?
    .ok_or_else(|| AppError::NotFound("Tenant account not found for this lease.".to_string()))
}

/// Lock the account row for the duration of a read-modify-write. Serializes
/// concurrent movements on the same account.
pub async fn get_account_for_update(
    conn: &mut PgConnection,
    account_id: Uuid,
) -> AppResult<TenantAccount> {
    sqlx::query_as::<_, TenantAccount>(&format!(
        "SELECT {ACCOUNT_COLUMNS} FROM tenant_accounts WHERE id = $1 FOR UPDATE"
    ))
    .bind(account_id)
    .fetch_optional(&mut *conn)
    .await
    .map_err(map_db_error)?
    .ok_or_else(|| AppError::NotFound("Tenant account not found.".to_string()))
}

/// Idempotent creation: a concurrent second attempt lands on the unique
/// lease_id constraint, inserts nothing and falls through to the re-select.
pub async fn insert_account_if_absent(
    pool: &PgPool,
    lease_id: Uuid,
    currency: &str,
) -> AppResult<TenantAccount> {
    sqlx::query(
        "INSERT INTO tenant_accounts (lease_id, currency, balance)
         VALUES ($1, $2, 0)
         ON CONFLICT (lease_id) DO NOTHING",
    )
    .bind(lease_id)
    .bind(currency)
    .execute(pool)
    .await
    .map_err(map_db_error)?;

    get_account_by_lease(pool, lease_id).await
}

pub struct NewMovement<'a> {
    pub account_id: Uuid,
    pub movement_type: MovementType,
    pub amount: Decimal,
    pub balance_after: Decimal,
    pub reference_type: Option<&'a str>,
    pub reference_id: Option<Uuid>,
    pub description: Option<&'a str>,
    pub movement_date: NaiveDate,
}

pub async fn insert_movement(
    conn: &mut PgConnection,
    movement: NewMovement<'_>,
) -> AppResult<TenantAccountMovement> {
    sqlx::query_as::<_, TenantAccountMovement>(&format!(
        "INSERT INTO tenant_account_movements
             (account_id, movement_type, amount, balance_after,
              reference_type, reference_id, description, movement_date)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
         RETURNING {MOVEMENT_COLUMNS}"
    ))
    .bind(movement.account_id)
    .bind(movement.movement_type.as_str())
    .bind(movement.amount)
    .bind(movement.balance_after)
    .bind(movement.reference_type)
    .bind(movement.reference_id)
    .bind(movement.description)
    .bind(movement.movement_date)
    .fetch_one(&mut *conn)
    .await
    .map_err(map_db_error)
}

pub async fn update_account_balance(
    conn: &mut PgConnection,
    account_id: Uuid,
    balance: Decimal,
    moved_at: DateTime<Utc>,
) -> AppResult<()> {
    sqlx::query(
        "UPDATE tenant_accounts SET balance = $2, last_movement_at = $3 WHERE id = $1",
    )
    .bind(account_id)
    .bind(balance)
    .bind(moved_at)
    .execute(&mut *conn)
    .await
    .map_err(map_db_error)?;
    Ok(())
}

pub async fn list_movements(
    pool: &PgPool,
    account_id: Uuid,
    limit: i64,
    offset: i64,
) -> AppResult<Vec<TenantAccountMovement>> {
    sqlx::query_as::<_, TenantAccountMovement>(&format!(
        "SELECT {MOVEMENT_COLUMNS}
         FROM tenant_account_movements
         WHERE account_id = $1
         ORDER BY created_at ASC
         LIMIT $2 OFFSET $3"
    ))
    .bind(account_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await
    .map_err(map_db_error)
}
