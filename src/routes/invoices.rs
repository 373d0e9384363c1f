use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use serde_json::{json, Value};

use crate::{
    error::{AppError, AppResult},
    repository::invoices,
    schemas::{
        clamp_limit_in_range, validate_input, CreateInvoiceInput, GenerateInvoiceInput,
        InvoicePath, InvoicesQuery, LeasePath,
    },
    services::billing,
    state::AppState,
};

pub fn router() -> axum::Router<AppState> {
    axum::Router::new()
        .route(
            "/invoices",
            axum::routing::get(list_invoices).post(create_invoice),
        )
        .route("/invoices/{invoice_id}", axum::routing::get(get_invoice))
        .route(
            "/invoices/{invoice_id}/issue",
            axum::routing::post(issue_invoice),
        )
        .route(
            "/invoices/{invoice_id}/cancel",
            axum::routing::post(cancel_invoice),
        )
        .route(
            "/leases/{lease_id}/invoices",
            axum::routing::post(generate_invoice_for_lease),
        )
}

async fn create_invoice(
    State(state): State<AppState>,
    Json(payload): Json<CreateInvoiceInput>,
) -> AppResult<impl IntoResponse> {
    validate_input(&payload)?;
    let pool = db_pool(&state)?;
    let invoice = billing::create_manual_invoice(pool, &payload).await?;
    Ok((axum::http::StatusCode::CREATED, Json(json!({ "data": invoice }))))
}

async fn generate_invoice_for_lease(
    State(state): State<AppState>,
    Path(path): Path<LeasePath>,
    payload: Option<Json<GenerateInvoiceInput>>,
) -> AppResult<impl IntoResponse> {
    let pool = db_pool(&state)?;
    let options = payload.map(|Json(input)| input).unwrap_or_default();
    let generated = billing::generate_for_lease(&state, pool, path.lease_id, &options).await?;
    Ok((
        axum::http::StatusCode::CREATED,
        Json(json!({
            "data": generated.invoice,
            "adjustment": generated.adjustment,
        })),
    ))
}

async fn list_invoices(
    State(state): State<AppState>,
    Query(query): Query<InvoicesQuery>,
) -> AppResult<Json<Value>> {
    let pool = db_pool(&state)?;
    let limit = clamp_limit_in_range(query.limit, 1, 500);
    let offset = query.offset.unwrap_or(0);
    let rows = invoices::list_invoices(pool, &query, limit, offset).await?;

    let today = Utc::now().date_naive();
    let data: Vec<Value> = rows
        .iter()
        .map(|invoice| {
            json!({
                "invoice": invoice,
                "is_overdue": invoice.is_overdue(today),
            })
        })
        .collect();
    Ok(Json(json!({ "data": data })))
}

async fn get_invoice(
    State(state): State<AppState>,
    Path(path): Path<InvoicePath>,
) -> AppResult<Json<Value>> {
    let pool = db_pool(&state)?;
    let invoice = invoices::get_invoice(pool, path.invoice_id).await?;
    let today = Utc::now().date_naive();
    Ok(Json(json!({
        "data": invoice,
        "is_overdue": invoice.is_overdue(today),
    })))
}

async fn issue_invoice(
    State(state): State<AppState>,
    Path(path): Path<InvoicePath>,
) -> AppResult<Json<Value>> {
    let pool = db_pool(&state)?;
    let invoice = billing::issue_invoice(&state, pool, path.invoice_id).await?;
    Ok(Json(json!({ "data": invoice })))
}

async fn cancel_invoice(
    State(state): State<AppState>,
    Path(path): Path<InvoicePath>,
) -> AppResult<Json<Value>> {
    let pool = db_pool(&state)?;
    let invoice = billing::cancel_invoice(pool, path.invoice_id).await?;
    Ok(Json(json!({ "data": invoice })))
}

fn db_pool(state: &AppState) -> AppResult<&sqlx::PgPool> {
    state.db_pool.as_ref().ok_or_else(|| {
        AppError::Dependency("Database is not configured. Set DATABASE_URL.".to_string())
    })
}
