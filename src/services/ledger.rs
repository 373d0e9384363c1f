use chrono::Utc;
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::domain::{MovementType, TenantAccount, TenantAccountMovement};
use crate::error::{map_db_error, AppError, AppResult};
use crate::repository::{accounts, invoices, leases};
use crate::services::late_fees::{self, PendingInvoice};

/// Post a signed movement inside an open transaction. The account row is
/// locked first so two concurrent movements cannot both read the same
/// balance; `balance_after` is the snapshot that makes the movement log
/// replayable.
pub async fn add_movement(
    conn: &mut PgConnection,
    account_id: Uuid,
    movement_type: MovementType,
    amount: Decimal,
    reference: Option<(&str, Uuid)>,
    description: Option<&str>,
) -> AppResult<TenantAccountMovement> {
    let account = accounts::get_account_for_update(conn, account_id).await?;
    let new_balance = account.balance + amount;
    let now = Utc::now();

    let movement = accounts::insert_movement(
        conn,
        accounts::NewMovement {
            account_id,
            movement_type,
            amount,
            balance_after: new_balance,
            reference_type: reference.map(|(kind, _)| kind),
            reference_id: reference.map(|(_, id)| id),
            description,
            movement_date: now.date_naive(),
        },
    )
    .await?;
    accounts::update_account_balance(conn, account_id, new_balance, now).await?;

    tracing::info!(
        account_id = %account_id,
        movement_type = movement_type.as_str(),
        amount = %amount,
        balance = %new_balance,
        "Ledger movement posted"
    );
    Ok(movement)
}

/// Standalone movement entry point (adjustments recorded by operators).
/// Wraps `add_movement` in its own transaction.
pub async fn record_movement(
    pool: &PgPool,
    account_id: Uuid,
    movement_type: MovementType,
    amount: Decimal,
    reference: Option<(&str, Uuid)>,
    description: Option<&str>,
) -> AppResult<TenantAccountMovement> {
    let mut tx = pool.begin().await.map_err(map_db_error)?;
    let movement = add_movement(
        &mut tx,
        account_id,
        movement_type,
        amount,
        reference,
        description,
    )
    .await?;
    tx.commit().await.map_err(map_db_error)?;
    Ok(movement)
}

/// Idempotent account provisioning for a lease. A lease without an assigned
/// tenant cannot hold an account.
pub async fn create_for_lease(pool: &PgPool, lease_id: Uuid) -> AppResult<TenantAccount> {
    let lease = leases::get_lease_billing(pool, lease_id).await?;
    if lease.tenant_id.is_none() {
        return Err(AppError::NotFound(
            "Lease has no assigned tenant; cannot open a tenant account.".to_string(),
        ));
    }
    accounts::insert_account_if_absent(pool, lease.id, &lease.currency).await
}

#[derive(Debug, Clone, Serialize)]
pub struct BalanceInfo {
    pub balance: Decimal,
    pub late_fee: Decimal,
    pub total: Decimal,
}

/// Current balance plus the advisory late fee. The fee is computed fresh on
/// every call and is not persisted here; only invoice generation bakes it
/// into a movement.
pub async fn balance_info(pool: &PgPool, account_id: Uuid) -> AppResult<BalanceInfo> {
    let account = accounts::get_account(pool, account_id).await?;
    let lease = leases::get_lease_billing(pool, account.lease_id).await?;

    let today = Utc::now().date_naive();
    let pending: Vec<PendingInvoice> = invoices::list_unpaid_by_account(pool, account_id)
        .await?
        .iter()
        .map(|invoice| PendingInvoice {
            due_date: invoice.due_date,
            pending: invoice.pending(),
        })
        .collect();

    let late_fee = late_fees::compute_late_fee(lease.late_fee_policy(), &pending, today);
    Ok(BalanceInfo {
        balance: account.balance,
        late_fee,
        total: account.balance + late_fee,
    })
}
