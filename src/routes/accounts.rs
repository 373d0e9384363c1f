use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use serde_json::{json, Value};

use crate::{
    domain::MovementType,
    error::{AppError, AppResult},
    repository::accounts,
    schemas::{
        clamp_limit_in_range, validate_input, AccountPath, CreateMovementInput,
        CreateTenantAccountInput, LeasePath, MovementsQuery,
    },
    services::ledger,
    state::AppState,
};

pub fn router() -> axum::Router<AppState> {
    axum::Router::new()
        .route(
            "/tenant-accounts",
            axum::routing::post(create_tenant_account),
        )
        .route(
            "/tenant-accounts/{account_id}",
            axum::routing::get(get_tenant_account),
        )
        .route(
            "/tenant-accounts/{account_id}/movements",
            axum::routing::get(list_movements).post(create_movement),
        )
        .route(
            "/tenant-accounts/{account_id}/balance",
            axum::routing::get(get_balance_info),
        )
        .route(
            "/leases/{lease_id}/tenant-account",
            axum::routing::get(get_account_by_lease),
        )
}

async fn create_tenant_account(
    State(state): State<AppState>,
    Json(payload): Json<CreateTenantAccountInput>,
) -> AppResult<impl IntoResponse> {
    let pool = db_pool(&state)?;
    let account = ledger::create_for_lease(pool, payload.lease_id).await?;
    Ok((axum::http::StatusCode::CREATED, Json(json!({ "data": account }))))
}

async fn get_tenant_account(
    State(state): State<AppState>,
    Path(path): Path<AccountPath>,
) -> AppResult<Json<Value>> {
    let pool = db_pool(&state)?;
    let account = accounts::get_account(pool, path.account_id).await?;
    Ok(Json(json!({ "data": account })))
}

async fn get_account_by_lease(
    State(state): State<AppState>,
    Path(path): Path<LeasePath>,
) -> AppResult<Json<Value>> {
    let pool = db_pool(&state)?;
    let account = accounts::get_account_by_lease(pool, path.lease_id).await?;
    Ok(Json(json!({ "data": account })))
}

async fn list_movements(
    State(state): State<AppState>,
    Path(path): Path<AccountPath>,
    Query(query): Query<MovementsQuery>,
) -> AppResult<Json<Value>> {
    let pool = db_pool(&state)?;
    // Existence check first so an unknown account 404s instead of listing empty.
    accounts::get_account(pool, path.account_id).await?;

    let movements = accounts::list_movements(
        pool,
        path.account_id,
        clamp_limit_in_range(query.limit, 1, 1000),
        query.offset.unwrap_or(0),
    )
    .await?;
    Ok(Json(json!({ "data": movements })))
}

/// Record a manual ledger movement. Charges and payments are posted by the
/// invoice and payment lifecycles, never by hand.
async fn create_movement(
    State(state): State<AppState>,
    Path(path): Path<AccountPath>,
    Json(payload): Json<CreateMovementInput>,
) -> AppResult<impl IntoResponse> {
    validate_input(&payload)?;
    let pool = db_pool(&state)?;

    let movement_type = MovementType::parse(&payload.movement_type).ok_or_else(|| {
        AppError::BadRequest(format!(
            "Unknown movement type '{}'.",
            payload.movement_type
        ))
    })?;
    if matches!(movement_type, MovementType::Charge | MovementType::Payment) {
        return Err(AppError::BadRequest(
            "Charge and payment movements are posted by the invoice and payment lifecycles."
                .to_string(),
        ));
    }

    let movement = ledger::record_movement(
        pool,
        path.account_id,
        movement_type,
        payload.amount,
        None,
        payload.description.as_deref(),
    )
    .await?;
    Ok((axum::http::StatusCode::CREATED, Json(json!({ "data": movement }))))
}

async fn get_balance_info(
    State(state): State<AppState>,
    Path(path): Path<AccountPath>,
) -> AppResult<Json<Value>> {
    let pool = db_pool(&state)?;
    let info = ledger::balance_info(pool, path.account_id).await?;
    Ok(Json(json!({ "data": info })))
}

fn db_pool(state: &AppState) -> AppResult<&sqlx::PgPool> {
    state.db_pool.as_ref().ok_or_else(|| {
        AppError::Dependency("Database is not configured. Set DATABASE_URL.".to_string())
    })
}
