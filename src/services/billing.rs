use chrono::{Datelike, Months, NaiveDate, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::domain::{
    AdjustmentType, DocumentKind, InflationIndexType, Invoice, InvoiceStatus, LeaseBilling,
    MovementType,
};
use crate::error::{map_db_error, AppError, AppResult};
use crate::repository::{accounts, invoices, leases, reference};
use crate::schemas::{CreateInvoiceInput, GenerateInvoiceInput};
use crate::services::late_fees::{self, PendingInvoice};
use crate::services::{commissions, ledger, receipts, sequences};
use crate::state::AppState;

const DEFAULT_ADJUSTMENT_INTERVAL_MONTHS: u32 = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BillingPeriod {
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub due_date: NaiveDate,
}

/// Resolve the billing window and due date for the next invoice. Explicit
/// override dates are used verbatim; everything else is derived from the
/// lease schedule.
pub fn compute_billing_period(
    lease: &LeaseBilling,
    today: NaiveDate,
    period_start: Option<NaiveDate>,
    period_end: Option<NaiveDate>,
    due_date: Option<NaiveDate>,
) -> AppResult<BillingPeriod> {
    let start = match period_start {
        Some(start) => start,
        None => lease
            .next_billing_date
            .unwrap_or_else(|| first_of_month(today)),
    };

    let end = match period_end {
        Some(end) => end,
        None => {
            let next_period = add_months(start, lease.payment_frequency().months())?;
            next_period
                .pred_opt()
                .ok_or_else(|| AppError::Internal("Billing period underflow.".to_string()))?
        }
    };

    let due = match due_date {
        Some(due) => due,
        None => {
            let due_day = lease.payment_due_day.max(1) as u32;
            let candidate = set_day_clamped(start, due_day);
            if candidate < start {
                set_day_clamped(add_months(start, 1)?, due_day)
            } else {
                candidate
            }
        }
    };

    Ok(BillingPeriod {
        period_start: start,
        period_end: end,
        due_date: due,
    })
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AdjustmentOutcome {
    Applied {
        adjustment_type: String,
        previous_rent: Decimal,
        new_rent: Decimal,
    },
    Skipped {
        reason: AdjustmentSkip,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AdjustmentSkip {
    NotRequested,
    NoAdjustmentConfigured,
    NotDueYet,
    IndexUnavailable,
}

/// Apply one adjustment step to the base rent, rounded to 2 decimals.
/// For inflation-indexed leases `value` is the monthly variation percentage.
pub fn adjusted_rent(rent: Decimal, adjustment_type: AdjustmentType, value: Decimal) -> Decimal {
    let adjusted = match adjustment_type {
        AdjustmentType::Fixed => rent + value,
        AdjustmentType::Percentage | AdjustmentType::InflationIndex => {
            rent + rent * (value / Decimal::ONE_HUNDRED)
        }
    };
    adjusted.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Returns the rent effective for this period, applying and persisting a due
/// rent adjustment when requested. The lease row must already be locked by
/// the surrounding transaction.
pub async fn apply_adjustment_if_needed(
    state: &AppState,
    pool: &PgPool,
    conn: &mut PgConnection,
    lease: &LeaseBilling,
    period_start: NaiveDate,
    apply: bool,
) -> AppResult<(Decimal, AdjustmentOutcome)> {
    let current = lease.monthly_rent;
    if !apply {
        return Ok((current, skipped(AdjustmentSkip::NotRequested)));
    }
    let Some(adjustment_type) = lease.adjustment_type() else {
        return Ok((current, skipped(AdjustmentSkip::NoAdjustmentConfigured)));
    };
    if let Some(next_adjustment) = lease.next_adjustment_date {
        if period_start < next_adjustment {
            return Ok((current, skipped(AdjustmentSkip::NotDueYet)));
        }
    }

    let value = match adjustment_type {
        AdjustmentType::Fixed | AdjustmentType::Percentage => match lease.adjustment_value {
            Some(value) => value,
            None => return Ok((current, skipped(AdjustmentSkip::NoAdjustmentConfigured))),
        },
        AdjustmentType::InflationIndex => {
            let Some(index_type) = lease
                .inflation_index_type
                .as_deref()
                .and_then(InflationIndexType::parse)
            else {
                return Ok((current, skipped(AdjustmentSkip::IndexUnavailable)));
            };
            let latest =
                reference::find_latest_index_cached(state, pool, index_type.reference_series())
                    .await?;
            match latest.and_then(|index| index.variation_monthly) {
                Some(variation) => variation,
                // No published index row: leave the rent alone rather than
                // guessing. The caller sees exactly why nothing moved.
                None => return Ok((current, skipped(AdjustmentSkip::IndexUnavailable))),
            }
        }
    };

    let new_rent = adjusted_rent(current, adjustment_type, value);
    let interval = lease
        .adjustment_frequency_months
        .map(|months| months.max(1) as u32)
        .unwrap_or(DEFAULT_ADJUSTMENT_INTERVAL_MONTHS);
    let next_adjustment = add_months(period_start, interval)?;

    leases::update_lease_rent(conn, lease.id, new_rent, period_start, next_adjustment).await?;

    tracing::info!(
        lease_id = %lease.id,
        adjustment_type = adjustment_type.as_str(),
        previous_rent = %current,
        new_rent = %new_rent,
        "Rent adjustment applied"
    );

    Ok((
        new_rent,
        AdjustmentOutcome::Applied {
            adjustment_type: adjustment_type.as_str().to_string(),
            previous_rent: current,
            new_rent,
        },
    ))
}

fn skipped(reason: AdjustmentSkip) -> AdjustmentOutcome {
    AdjustmentOutcome::Skipped { reason }
}

#[derive(Debug, Clone, Serialize)]
pub struct GeneratedInvoice {
    pub invoice: Invoice,
    pub adjustment: AdjustmentOutcome,
}

/// Generate the next periodic invoice for a lease: resolve the account,
/// compute the period, apply a due rent adjustment, optionally bake in the
/// accrued late fee, allocate a number and persist the draft — one
/// transaction, then optionally issue.
pub async fn generate_for_lease(
    state: &AppState,
    pool: &PgPool,
    lease_id: Uuid,
    options: &GenerateInvoiceInput,
) -> AppResult<GeneratedInvoice> {
    let today = Utc::now().date_naive();

    let mut tx = pool.begin().await.map_err(map_db_error)?;
    let lease = leases::get_lease_billing_for_update(&mut tx, lease_id).await?;
    if lease.tenant_id.is_none() {
        return Err(AppError::NotFound(
            "Lease has no assigned tenant; cannot generate an invoice.".to_string(),
        ));
    }
    let account = accounts::insert_account_if_absent(pool, lease.id, &lease.currency).await?;

    let period = compute_billing_period(
        &lease,
        today,
        options.period_start,
        options.period_end,
        options.due_date,
    )?;

    let (effective_rent, adjustment) = apply_adjustment_if_needed(
        state,
        pool,
        &mut tx,
        &lease,
        period.period_start,
        options.apply_adjustment,
    )
    .await?;

    let late_fee = if options.apply_late_fee {
        let pending: Vec<PendingInvoice> = invoices::list_unpaid_by_account(pool, account.id)
            .await?
            .iter()
            .map(|invoice| PendingInvoice {
                due_date: invoice.due_date,
                pending: invoice.pending(),
            })
            .collect();
        late_fees::compute_late_fee(lease.late_fee_policy(), &pending, today)
    } else {
        Decimal::ZERO
    };

    let subtotal = effective_rent + lease.additional_expenses;
    let total = subtotal + late_fee;

    let invoice_number =
        sequences::next_document_number(&mut tx, lease.owner_id, DocumentKind::Invoice, today)
            .await?;
    let invoice = invoices::insert_invoice(
        &mut tx,
        invoices::NewInvoice {
            organization_id: lease.organization_id,
            lease_id: lease.id,
            owner_id: lease.owner_id,
            tenant_account_id: account.id,
            invoice_number: &invoice_number,
            period_start: period.period_start,
            period_end: period.period_end,
            subtotal,
            late_fee,
            adjustments: Decimal::ZERO,
            total,
            currency: &lease.currency,
            due_date: period.due_date,
        },
    )
    .await?;

    let next_billing = period
        .period_end
        .succ_opt()
        .ok_or_else(|| AppError::Internal("Billing schedule overflow.".to_string()))?;
    leases::update_lease_billing_schedule(&mut tx, lease.id, period.period_start, next_billing)
        .await?;

    tx.commit().await.map_err(map_db_error)?;

    tracing::info!(
        lease_id = %lease.id,
        invoice_number = %invoice.invoice_number,
        total = %invoice.total,
        "Invoice generated"
    );

    let invoice = if options.issue {
        issue_invoice(state, pool, invoice.id).await?
    } else {
        invoice
    };

    Ok(GeneratedInvoice {
        invoice,
        adjustment,
    })
}

/// Create an invoice from explicit caller-supplied amounts and dates. Does
/// not touch the lease billing schedule.
pub async fn create_manual_invoice(
    pool: &PgPool,
    input: &CreateInvoiceInput,
) -> AppResult<Invoice> {
    if input.period_end < input.period_start {
        return Err(AppError::BadRequest(
            "period_end must be on or after period_start.".to_string(),
        ));
    }

    let lease = leases::get_lease_billing(pool, input.lease_id).await?;
    if lease.tenant_id.is_none() {
        return Err(AppError::NotFound(
            "Lease has no assigned tenant; cannot create an invoice.".to_string(),
        ));
    }
    let account = accounts::insert_account_if_absent(pool, lease.id, &lease.currency).await?;

    let currency = input.currency.as_deref().unwrap_or(&lease.currency);
    let total = input.subtotal + input.late_fee + input.adjustments;
    let today = Utc::now().date_naive();

    let mut tx = pool.begin().await.map_err(map_db_error)?;
    let invoice_number =
        sequences::next_document_number(&mut tx, lease.owner_id, DocumentKind::Invoice, today)
            .await?;
    let invoice = invoices::insert_invoice(
        &mut tx,
        invoices::NewInvoice {
            organization_id: lease.organization_id,
            lease_id: lease.id,
            owner_id: lease.owner_id,
            tenant_account_id: account.id,
            invoice_number: &invoice_number,
            period_start: input.period_start,
            period_end: input.period_end,
            subtotal: input.subtotal,
            late_fee: input.late_fee,
            adjustments: input.adjustments,
            total,
            currency,
            due_date: input.due_date,
        },
    )
    .await?;
    tx.commit().await.map_err(map_db_error)?;

    Ok(invoice)
}

/// Issue a draft invoice: the charge becomes owed on the ledger. The
/// commission cascade and document rendering run after commit and are
/// best-effort.
pub async fn issue_invoice(
    state: &AppState,
    pool: &PgPool,
    invoice_id: Uuid,
) -> AppResult<Invoice> {
    let mut tx = pool.begin().await.map_err(map_db_error)?;
    let invoice = invoices::get_invoice_for_update(&mut tx, invoice_id).await?;
    if invoice.status() != InvoiceStatus::Draft {
        return Err(AppError::InvalidState(
            "Only draft invoices can be issued.".to_string(),
        ));
    }

    let issued = invoices::mark_issued(&mut tx, invoice_id, Utc::now()).await?;
    ledger::add_movement(
        &mut tx,
        issued.tenant_account_id,
        MovementType::Charge,
        issued.total,
        Some(("invoice", issued.id)),
        Some(&format!("Invoice {} issued", issued.invoice_number)),
    )
    .await?;
    tx.commit().await.map_err(map_db_error)?;

    tracing::info!(
        invoice_id = %issued.id,
        invoice_number = %issued.invoice_number,
        total = %issued.total,
        "Invoice issued"
    );

    match commissions::cascade_for_invoice(pool, &issued).await {
        Ok(commissions::CascadeOutcome::Created(commission)) => {
            tracing::info!(
                invoice_id = %issued.id,
                commission_number = %commission.invoice_number,
                total = %commission.total,
                "Commission invoice created"
            );
        }
        Ok(commissions::CascadeOutcome::Skipped(reason)) => {
            tracing::debug!(invoice_id = %issued.id, ?reason, "Commission cascade skipped");
        }
        Err(error) => {
            tracing::warn!(invoice_id = %issued.id, error = %error, "Commission cascade failed");
        }
    }

    receipts::render_invoice_document(state, pool, &issued).await;

    Ok(issued)
}

/// Cancel an invoice. An issued invoice gets a reversing ledger adjustment;
/// a fully paid one can never be cancelled.
pub async fn cancel_invoice(pool: &PgPool, invoice_id: Uuid) -> AppResult<Invoice> {
    let mut tx = pool.begin().await.map_err(map_db_error)?;
    let invoice = invoices::get_invoice_for_update(&mut tx, invoice_id).await?;

    match invoice.status() {
        InvoiceStatus::Paid => {
            return Err(AppError::InvalidState(
                "Paid invoices cannot be cancelled.".to_string(),
            ));
        }
        InvoiceStatus::Cancelled => {
            return Err(AppError::InvalidState(
                "Invoice is already cancelled.".to_string(),
            ));
        }
        status => {
            if status.is_outstanding() {
                ledger::add_movement(
                    &mut tx,
                    invoice.tenant_account_id,
                    MovementType::Adjustment,
                    -invoice.total,
                    Some(("invoice", invoice.id)),
                    Some(&format!("Invoice {} cancelled", invoice.invoice_number)),
                )
                .await?;
            }
        }
    }

    let cancelled = invoices::mark_cancelled(&mut tx, invoice_id).await?;
    tx.commit().await.map_err(map_db_error)?;

    tracing::info!(
        invoice_id = %cancelled.id,
        invoice_number = %cancelled.invoice_number,
        "Invoice cancelled"
    );
    Ok(cancelled)
}

fn first_of_month(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

fn add_months(date: NaiveDate, months: u32) -> AppResult<NaiveDate> {
    date.checked_add_months(Months::new(months))
        .ok_or_else(|| AppError::Internal("Date arithmetic overflow.".to_string()))
}

fn set_day_clamped(date: NaiveDate, day: u32) -> NaiveDate {
    let clamped = day.min(days_in_month(date));
    date.with_day(clamped).unwrap_or(date)
}

fn days_in_month(date: NaiveDate) -> u32 {
    let first = first_of_month(date);
    let next = first
        .checked_add_months(Months::new(1))
        .unwrap_or(first);
    next.pred_opt().map(|last| last.day()).unwrap_or(28)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::LeaseBilling;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn dec(raw: &str) -> Decimal {
        raw.parse().unwrap()
    }

    fn lease() -> LeaseBilling {
        LeaseBilling {
            id: Uuid::nil(),
            organization_id: Uuid::nil(),
            owner_id: Uuid::nil(),
            tenant_id: Some(Uuid::nil()),
            currency: "ARS".to_string(),
            monthly_rent: dec("1000"),
            additional_expenses: Decimal::ZERO,
            payment_frequency: "monthly".to_string(),
            payment_due_day: 10,
            late_fee_type: None,
            late_fee_value: None,
            adjustment_type: None,
            adjustment_value: None,
            inflation_index_type: None,
            adjustment_frequency_months: None,
            last_adjustment_date: None,
            next_adjustment_date: None,
            last_billing_date: None,
            next_billing_date: Some(date(2026, 3, 1)),
        }
    }

    #[test]
    fn monthly_period_from_next_billing_date() {
        let period =
            compute_billing_period(&lease(), date(2026, 3, 5), None, None, None).unwrap();
        assert_eq!(period.period_start, date(2026, 3, 1));
        assert_eq!(period.period_end, date(2026, 3, 31));
        assert_eq!(period.due_date, date(2026, 3, 10));
    }

    #[test]
    fn quarterly_period_spans_three_months() {
        let mut quarterly = lease();
        quarterly.payment_frequency = "quarterly".to_string();
        let period =
            compute_billing_period(&quarterly, date(2026, 3, 5), None, None, None).unwrap();
        assert_eq!(period.period_start, date(2026, 3, 1));
        assert_eq!(period.period_end, date(2026, 5, 31));
    }

    #[test]
    fn unset_schedule_falls_back_to_current_month() {
        let mut unscheduled = lease();
        unscheduled.next_billing_date = None;
        let period =
            compute_billing_period(&unscheduled, date(2026, 3, 17), None, None, None).unwrap();
        assert_eq!(period.period_start, date(2026, 3, 1));
        assert_eq!(period.period_end, date(2026, 3, 31));
    }

    #[test]
    fn due_date_rolls_forward_when_before_period_start() {
        let mut mid_month = lease();
        mid_month.next_billing_date = Some(date(2026, 3, 15));
        mid_month.payment_due_day = 5;
        let period =
            compute_billing_period(&mid_month, date(2026, 3, 15), None, None, None).unwrap();
        assert_eq!(period.due_date, date(2026, 4, 5));
    }

    #[test]
    fn due_day_clamps_to_month_length() {
        let mut short_month = lease();
        short_month.next_billing_date = Some(date(2026, 2, 1));
        short_month.payment_due_day = 31;
        let period =
            compute_billing_period(&short_month, date(2026, 2, 1), None, None, None).unwrap();
        assert_eq!(period.due_date, date(2026, 2, 28));
    }

    #[test]
    fn override_dates_win_verbatim() {
        let period = compute_billing_period(
            &lease(),
            date(2026, 3, 5),
            Some(date(2026, 6, 1)),
            Some(date(2026, 6, 30)),
            Some(date(2026, 6, 15)),
        )
        .unwrap();
        assert_eq!(period.period_start, date(2026, 6, 1));
        assert_eq!(period.period_end, date(2026, 6, 30));
        assert_eq!(period.due_date, date(2026, 6, 15));
    }

    #[test]
    fn fixed_adjustment_adds_value() {
        assert_eq!(
            adjusted_rent(dec("1000"), AdjustmentType::Fixed, dec("50")),
            dec("1050.00")
        );
    }

    #[test]
    fn percentage_adjustment_scales_rent() {
        assert_eq!(
            adjusted_rent(dec("1000"), AdjustmentType::Percentage, dec("7.5")),
            dec("1075.00")
        );
    }

    #[test]
    fn index_adjustment_uses_monthly_variation() {
        assert_eq!(
            adjusted_rent(dec("1000"), AdjustmentType::InflationIndex, dec("10")),
            dec("1100.00")
        );
    }

    #[test]
    fn adjusted_rent_rounds_half_up() {
        // 1234.56 * 1.033 = 1275.30048
        assert_eq!(
            adjusted_rent(dec("1234.56"), AdjustmentType::Percentage, dec("3.3")),
            dec("1275.30")
        );
    }

    #[test]
    fn days_in_month_handles_february() {
        assert_eq!(days_in_month(date(2026, 2, 10)), 28);
        assert_eq!(days_in_month(date(2028, 2, 10)), 29);
        assert_eq!(days_in_month(date(2026, 12, 1)), 31);
    }
}
