use chrono::Utc;
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::{
    DocumentKind, Invoice, InvoiceStatus, MovementType, Payment, PaymentItemKind, PaymentStatus,
};
use crate::error::{map_db_error, AppError, AppResult};
use crate::repository::{accounts, invoices, leases, payments};
use crate::schemas::{CreatePaymentInput, PaymentItemInput, UpdatePaymentInput};
use crate::services::{ledger, receipts, sequences};
use crate::state::AppState;

/// Resolve the payment amount: an explicit amount always wins; otherwise it
/// is the signed sum of the line items (charges positive, discounts
/// negative).
pub fn resolve_payment_amount(
    explicit: Option<Decimal>,
    items: Option<&[PaymentItemInput]>,
) -> AppResult<Decimal> {
    let amount = match explicit {
        Some(amount) => amount,
        None => {
            let items = items.filter(|items| !items.is_empty()).ok_or_else(|| {
                AppError::BadRequest(
                    "Either an amount or at least one line item is required.".to_string(),
                )
            })?;
            let mut sum = Decimal::ZERO;
            for item in items {
                let kind = PaymentItemKind::parse(&item.kind).ok_or_else(|| {
                    AppError::BadRequest(format!("Unknown payment item kind '{}'.", item.kind))
                })?;
                let line = item.amount * item.quantity;
                sum += match kind {
                    PaymentItemKind::Charge => line,
                    PaymentItemKind::Discount => -line,
                };
            }
            sum
        }
    };

    if amount <= Decimal::ZERO {
        return Err(AppError::BadRequest(
            "Payment amount must be positive.".to_string(),
        ));
    }
    Ok(amount)
}

/// One planned slice of a payment against an outstanding invoice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Allocation {
    pub invoice_id: Uuid,
    pub amount: Decimal,
    pub new_amount_paid: Decimal,
    pub new_status: InvoiceStatus,
}

#[derive(Debug, Clone)]
pub struct OpenInvoice {
    pub invoice_id: Uuid,
    pub total: Decimal,
    pub amount_paid: Decimal,
}

impl From<&Invoice> for OpenInvoice {
    fn from(invoice: &Invoice) -> Self {
        Self {
            invoice_id: invoice.id,
            total: invoice.total,
            amount_paid: invoice.amount_paid,
        }
    }
}

/// FIFO application plan: invoices arrive ordered by ascending due date,
/// each absorbs up to its pending amount, and any excess beyond the last
/// invoice stays unapplied (the ledger already reflects it as credit).
pub fn plan_fifo_application(amount: Decimal, invoices: &[OpenInvoice]) -> Vec<Allocation> {
    let mut remaining = amount;
    let mut allocations = Vec::new();

    for invoice in invoices {
        if remaining <= Decimal::ZERO {
            break;
        }
        let pending = invoice.total - invoice.amount_paid;
        if pending <= Decimal::ZERO {
            continue;
        }
        let applied = remaining.min(pending);
        let new_amount_paid = invoice.amount_paid + applied;
        allocations.push(Allocation {
            invoice_id: invoice.invoice_id,
            amount: applied,
            new_amount_paid,
            new_status: if new_amount_paid >= invoice.total {
                InvoiceStatus::Paid
            } else {
                InvoiceStatus::PartiallyPaid
            },
        });
        remaining -= applied;
    }

    allocations
}

pub async fn create_payment(
    pool: &PgPool,
    input: &CreatePaymentInput,
    acting_user_id: Option<Uuid>,
) -> AppResult<Payment> {
    let account = accounts::get_account(pool, input.tenant_account_id).await?;
    let lease = leases::get_lease_billing(pool, account.lease_id).await?;
    let amount = resolve_payment_amount(input.amount, input.items.as_deref())?;
    let currency = input.currency.as_deref().unwrap_or(&account.currency);

    let mut tx = pool.begin().await.map_err(map_db_error)?;
    let payment = payments::insert_payment(
        &mut tx,
        payments::NewPayment {
            organization_id: lease.organization_id,
            tenant_account_id: account.id,
            amount,
            currency,
            payment_date: input
                .payment_date
                .unwrap_or_else(|| Utc::now().date_naive()),
            method: input.method.as_deref(),
            reference: input.reference.as_deref(),
            notes: input.notes.as_deref(),
            created_by_user_id: acting_user_id,
        },
    )
    .await?;
    if let Some(items) = input.items.as_deref() {
        payments::replace_items(&mut tx, payment.id, items).await?;
    }
    tx.commit().await.map_err(map_db_error)?;

    tracing::info!(
        payment_id = %payment.id,
        account_id = %payment.tenant_account_id,
        amount = %payment.amount,
        "Payment recorded"
    );
    Ok(payment)
}

/// Confirm a pending payment: credit the ledger, apply the amount FIFO
/// across outstanding invoices, and allocate the receipt number — one
/// transaction. Receipt rendering runs after commit and is best-effort.
pub async fn confirm_payment(
    state: &AppState,
    pool: &PgPool,
    payment_id: Uuid,
) -> AppResult<Payment> {
    let mut tx = pool.begin().await.map_err(map_db_error)?;
    let payment = payments::get_payment_for_update(&mut tx, payment_id).await?;
    if payment.status() != PaymentStatus::Pending {
        return Err(AppError::InvalidState(
            "Only pending payments can be confirmed.".to_string(),
        ));
    }

    let mut confirmed = payments::update_status(&mut tx, payment_id, PaymentStatus::Completed).await?;
    ledger::add_movement(
        &mut tx,
        payment.tenant_account_id,
        MovementType::Payment,
        -payment.amount,
        Some(("payment", payment.id)),
        Some("Payment received"),
    )
    .await?;

    let outstanding =
        invoices::list_outstanding_for_update(&mut tx, payment.tenant_account_id).await?;
    let open: Vec<OpenInvoice> = outstanding.iter().map(OpenInvoice::from).collect();
    let allocations = plan_fifo_application(payment.amount, &open);
    for allocation in &allocations {
        invoices::update_amount_paid(
            &mut tx,
            allocation.invoice_id,
            allocation.new_amount_paid,
            allocation.new_status,
        )
        .await?;
        payments::insert_application(
            &mut tx,
            payment.id,
            allocation.invoice_id,
            allocation.amount,
        )
        .await?;
    }

    let today = Utc::now().date_naive();
    let receipt_number = sequences::next_document_number(
        &mut tx,
        payment.organization_id,
        DocumentKind::Receipt,
        today,
    )
    .await?;
    sqlx::query("UPDATE payments SET receipt_number = $2 WHERE id = $1")
        .bind(payment.id)
        .bind(&receipt_number)
        .execute(&mut *tx)
        .await
        .map_err(map_db_error)?;
    confirmed.receipt_number = Some(receipt_number);

    tx.commit().await.map_err(map_db_error)?;

    tracing::info!(
        payment_id = %confirmed.id,
        amount = %confirmed.amount,
        applied_invoices = allocations.len(),
        "Payment confirmed"
    );

    receipts::render_receipt_document(state, pool, &confirmed).await;

    Ok(confirmed)
}

/// Cancel a payment. A completed payment is fully unwound: the exact FIFO
/// allocations recorded at confirmation are reversed on each invoice, then
/// the ledger credit is reversed with an adjustment.
pub async fn cancel_payment(pool: &PgPool, payment_id: Uuid) -> AppResult<Payment> {
    let mut tx = pool.begin().await.map_err(map_db_error)?;
    let payment = payments::get_payment_for_update(&mut tx, payment_id).await?;

    match payment.status() {
        PaymentStatus::Cancelled => {
            return Err(AppError::InvalidState(
                "Payment is already cancelled.".to_string(),
            ));
        }
        PaymentStatus::Completed => {
            let applications = payments::list_applications(&mut tx, payment_id).await?;
            for application in &applications {
                let invoice =
                    invoices::get_invoice_for_update(&mut tx, application.invoice_id).await?;
                let new_amount_paid =
                    (invoice.amount_paid - application.amount).max(Decimal::ZERO);
                let new_status = if invoice.status() == InvoiceStatus::Cancelled {
                    InvoiceStatus::Cancelled
                } else if new_amount_paid.is_zero() {
                    InvoiceStatus::Issued
                } else {
                    InvoiceStatus::PartiallyPaid
                };
                invoices::update_amount_paid(
                    &mut tx,
                    invoice.id,
                    new_amount_paid,
                    new_status,
                )
                .await?;
            }
            payments::delete_applications(&mut tx, payment_id).await?;

            ledger::add_movement(
                &mut tx,
                payment.tenant_account_id,
                MovementType::Adjustment,
                payment.amount,
                Some(("payment", payment.id)),
                Some("Payment cancelled"),
            )
            .await?;
        }
        PaymentStatus::Pending => {}
    }

    let cancelled = payments::update_status(&mut tx, payment_id, PaymentStatus::Cancelled).await?;
    tx.commit().await.map_err(map_db_error)?;

    tracing::info!(payment_id = %cancelled.id, "Payment cancelled");
    Ok(cancelled)
}

/// Edit a payment that has not been confirmed yet.
pub async fn update_pending_payment(
    pool: &PgPool,
    payment_id: Uuid,
    input: &UpdatePaymentInput,
) -> AppResult<Payment> {
    let mut tx = pool.begin().await.map_err(map_db_error)?;
    let payment = payments::get_payment_for_update(&mut tx, payment_id).await?;
    if payment.status() != PaymentStatus::Pending {
        return Err(AppError::InvalidState(
            "Only pending payments can be updated.".to_string(),
        ));
    }

    let amount = match (input.amount, input.items.as_deref()) {
        (None, None) => payment.amount,
        (explicit, items) => resolve_payment_amount(explicit, items)?,
    };

    if let Some(items) = input.items.as_deref() {
        payments::replace_items(&mut tx, payment_id, items).await?;
    }
    let updated = payments::update_pending_fields(
        &mut tx,
        payment_id,
        payments::PendingPaymentPatch {
            amount,
            payment_date: input.payment_date,
            method: input.method.as_deref(),
            reference: input.reference.as_deref(),
            notes: input.notes.as_deref(),
        },
    )
    .await?;
    tx.commit().await.map_err(map_db_error)?;
    Ok(updated)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(raw: &str) -> Decimal {
        raw.parse().unwrap()
    }

    fn item(kind: &str, amount: &str, quantity: &str) -> PaymentItemInput {
        PaymentItemInput {
            kind: kind.to_string(),
            description: None,
            amount: dec(amount),
            quantity: dec(quantity),
        }
    }

    fn open(total: &str, paid: &str) -> OpenInvoice {
        OpenInvoice {
            invoice_id: Uuid::new_v4(),
            total: dec(total),
            amount_paid: dec(paid),
        }
    }

    #[test]
    fn explicit_amount_wins_over_items() {
        let items = vec![item("charge", "100", "2")];
        let amount = resolve_payment_amount(Some(dec("50")), Some(&items)).unwrap();
        assert_eq!(amount, dec("50"));
    }

    #[test]
    fn items_sum_signed_by_kind() {
        let items = vec![
            item("charge", "100", "2"),
            item("discount", "30", "1"),
        ];
        let amount = resolve_payment_amount(None, Some(&items)).unwrap();
        assert_eq!(amount, dec("170"));
    }

    #[test]
    fn missing_amount_and_items_is_rejected() {
        assert!(resolve_payment_amount(None, None).is_err());
        assert!(resolve_payment_amount(None, Some(&[])).is_err());
    }

    #[test]
    fn non_positive_amount_is_rejected() {
        let items = vec![item("discount", "100", "1")];
        assert!(resolve_payment_amount(None, Some(&items)).is_err());
        assert!(resolve_payment_amount(Some(Decimal::ZERO), None).is_err());
    }

    #[test]
    fn fifo_pays_oldest_invoice_first() {
        let invoices = vec![open("1000", "0"), open("1000", "0")];
        let plan = plan_fifo_application(dec("1200"), &invoices);
        assert_eq!(plan.len(), 2);
        assert_eq!(plan[0].amount, dec("1000"));
        assert_eq!(plan[0].new_status, InvoiceStatus::Paid);
        assert_eq!(plan[1].amount, dec("200"));
        assert_eq!(plan[1].new_status, InvoiceStatus::PartiallyPaid);
    }

    #[test]
    fn fifo_never_over_applies() {
        let invoices = vec![open("500", "200")];
        let plan = plan_fifo_application(dec("1000"), &invoices);
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].amount, dec("300"));
        assert_eq!(plan[0].new_amount_paid, dec("500"));
        assert_eq!(plan[0].new_status, InvoiceStatus::Paid);
        let applied: Decimal = plan.iter().map(|a| a.amount).sum();
        assert!(applied <= dec("1000"));
    }

    #[test]
    fn fifo_skips_settled_invoices() {
        let invoices = vec![open("500", "500"), open("800", "0")];
        let plan = plan_fifo_application(dec("300"), &invoices);
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].invoice_id, invoices[1].invoice_id);
        assert_eq!(plan[0].amount, dec("300"));
        assert_eq!(plan[0].new_status, InvoiceStatus::PartiallyPaid);
    }

    #[test]
    fn fifo_stops_when_amount_is_exhausted() {
        let invoices = vec![open("100", "0"), open("100", "0"), open("100", "0")];
        let plan = plan_fifo_application(dec("150"), &invoices);
        assert_eq!(plan.len(), 2);
        let applied: Decimal = plan.iter().map(|a| a.amount).sum();
        assert_eq!(applied, dec("150"));
    }

    #[test]
    fn excess_beyond_all_invoices_stays_unapplied() {
        let invoices = vec![open("100", "0")];
        let plan = plan_fifo_application(dec("500"), &invoices);
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].amount, dec("100"));
    }
}
