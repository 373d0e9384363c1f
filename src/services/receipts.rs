use serde_json::{json, Value};
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::{Invoice, Payment};
use crate::repository::reference;
use crate::state::AppState;

/// Render a receipt for a confirmed payment and register the resulting
/// document. Runs after the confirming transaction has committed; any
/// failure here is logged and swallowed — the financial state is already
/// durable.
pub async fn render_receipt_document(state: &AppState, pool: &PgPool, payment: &Payment) {
    let payload = json!({
        "kind": "receipt",
        "receipt_number": payment.receipt_number,
        "payment_id": payment.id,
        "tenant_account_id": payment.tenant_account_id,
        "amount": payment.amount,
        "currency": payment.currency,
        "payment_date": payment.payment_date,
        "method": payment.method,
        "reference": payment.reference,
    });
    render_and_register(state, pool, "payment", payment.id, payload).await;
}

/// Render the printable document for an issued invoice. Same best-effort
/// contract as receipts.
pub async fn render_invoice_document(state: &AppState, pool: &PgPool, invoice: &Invoice) {
    let payload = json!({
        "kind": "invoice",
        "invoice_number": invoice.invoice_number,
        "invoice_id": invoice.id,
        "lease_id": invoice.lease_id,
        "period_start": invoice.period_start,
        "period_end": invoice.period_end,
        "subtotal": invoice.subtotal,
        "late_fee": invoice.late_fee,
        "adjustments": invoice.adjustments,
        "total": invoice.total,
        "currency": invoice.currency,
        "due_date": invoice.due_date,
    });
    render_and_register(state, pool, "invoice", invoice.id, payload).await;
}

async fn render_and_register(
    state: &AppState,
    pool: &PgPool,
    entity_type: &str,
    entity_id: Uuid,
    payload: Value,
) {
    let (storage_key, size_bytes) = match render_document(state, &payload).await {
        Ok(rendered) => rendered,
        Err(error) => {
            tracing::warn!(entity_type, entity_id = %entity_id, error = %error, "Document rendering failed");
            return;
        }
    };

    if let Err(error) = reference::insert_document(
        pool,
        entity_type,
        entity_id,
        &storage_key,
        "application/pdf",
        size_bytes,
    )
    .await
    {
        tracing::warn!(
            entity_type,
            entity_id = %entity_id,
            error = %error,
            "Failed to register rendered document"
        );
    }
}

/// Call the external rendering collaborator. Returns the storage key it
/// reports for the generated PDF.
async fn render_document(state: &AppState, payload: &Value) -> Result<(String, Option<i64>), String> {
    let base_url = state
        .config
        .document_render_url
        .as_deref()
        .filter(|url| !url.is_empty())
        .ok_or_else(|| "DOCUMENT_RENDER_URL not configured".to_string())?;

    let response = state
        .http_client
        .post(format!("{base_url}/render"))
        .json(payload)
        .send()
        .await
        .map_err(|error| format!("Renderer request failed: {error}"))?;

    let status = response.status();
    let body: Value = response
        .json()
        .await
        .unwrap_or(json!({"error": "failed to parse renderer response"}));

    if !status.is_success() {
        let message = body
            .get("error")
            .and_then(Value::as_str)
            .unwrap_or("Unknown renderer error");
        return Err(format!("Renderer error ({status}): {message}"));
    }

    let storage_key = body
        .get("storage_key")
        .and_then(Value::as_str)
        .filter(|key| !key.is_empty())
        .ok_or_else(|| "Renderer response missing storage_key".to_string())?;
    let size_bytes = body.get("size_bytes").and_then(Value::as_i64);

    Ok((storage_key.to_string(), size_bytes))
}
