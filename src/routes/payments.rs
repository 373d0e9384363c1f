use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use serde_json::{json, Value};

use crate::{
    error::{AppError, AppResult},
    repository::payments,
    schemas::{
        clamp_limit_in_range, validate_input, ActingUserQuery, CreatePaymentInput, PaymentPath,
        PaymentsQuery, UpdatePaymentInput,
    },
    services::payments as payment_service,
    state::AppState,
};

pub fn router() -> axum::Router<AppState> {
    axum::Router::new()
        .route(
            "/payments",
            axum::routing::get(list_payments).post(create_payment),
        )
        .route(
            "/payments/{payment_id}",
            axum::routing::get(get_payment).patch(update_payment),
        )
        .route(
            "/payments/{payment_id}/confirm",
            axum::routing::post(confirm_payment),
        )
        .route(
            "/payments/{payment_id}/cancel",
            axum::routing::post(cancel_payment),
        )
}

async fn create_payment(
    State(state): State<AppState>,
    Query(query): Query<ActingUserQuery>,
    Json(payload): Json<CreatePaymentInput>,
) -> AppResult<impl IntoResponse> {
    validate_input(&payload)?;
    let pool = db_pool(&state)?;
    let payment =
        payment_service::create_payment(pool, &payload, query.acting_user_id).await?;
    Ok((axum::http::StatusCode::CREATED, Json(json!({ "data": payment }))))
}

async fn list_payments(
    State(state): State<AppState>,
    Query(query): Query<PaymentsQuery>,
) -> AppResult<Json<Value>> {
    let pool = db_pool(&state)?;
    let limit = clamp_limit_in_range(query.limit, 1, 500);
    let offset = query.offset.unwrap_or(0);
    let rows = payments::list_payments(pool, &query, limit, offset).await?;
    Ok(Json(json!({ "data": rows })))
}

async fn get_payment(
    State(state): State<AppState>,
    Path(path): Path<PaymentPath>,
) -> AppResult<Json<Value>> {
    let pool = db_pool(&state)?;
    let payment = payments::get_payment(pool, path.payment_id).await?;
    let items = payments::list_items(pool, path.payment_id).await?;
    Ok(Json(json!({ "data": payment, "items": items })))
}

async fn update_payment(
    State(state): State<AppState>,
    Path(path): Path<PaymentPath>,
    Json(payload): Json<UpdatePaymentInput>,
) -> AppResult<Json<Value>> {
    validate_input(&payload)?;
    let pool = db_pool(&state)?;
    let payment =
        payment_service::update_pending_payment(pool, path.payment_id, &payload).await?;
    Ok(Json(json!({ "data": payment })))
}

async fn confirm_payment(
    State(state): State<AppState>,
    Path(path): Path<PaymentPath>,
) -> AppResult<Json<Value>> {
    let pool = db_pool(&state)?;
    let payment = payment_service::confirm_payment(&state, pool, path.payment_id).await?;
    Ok(Json(json!({ "data": payment })))
}

async fn cancel_payment(
    State(state): State<AppState>,
    Path(path): Path<PaymentPath>,
) -> AppResult<Json<Value>> {
    let pool = db_pool(&state)?;
    let payment = payment_service::cancel_payment(pool, path.payment_id).await?;
    Ok(Json(json!({ "data": payment })))
}

fn db_pool(state: &AppState) -> AppResult<&sqlx::PgPool> {
    state.db_pool.as_ref().ok_or_else(|| {
        AppError::Dependency("Database is not configured. Set DATABASE_URL.".to_string())
    })
}
