use chrono::{Duration, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use sqlx::PgPool;

use crate::domain::{CommissionInvoice, DocumentKind, Invoice};
use crate::error::{map_db_error, AppError, AppResult};
use crate::repository::{invoices, leases};
use crate::services::sequences;

/// Fixed VAT applied on top of the management commission.
const COMMISSION_TAX_PERCENT: Decimal = Decimal::from_parts(21, 0, 0, false, 0);

const COMMISSION_DUE_DAYS: i64 = 15;

#[derive(Debug, Clone)]
pub enum CascadeOutcome {
    Created(CommissionInvoice),
    Skipped(CascadeSkip),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CascadeSkip {
    NoCommissionRate,
    NoCompanyScope,
}

/// Commission, tax and total for a given base amount, each rounded half-up
/// to 2 decimals.
pub fn commission_amounts(base: Decimal, rate: Decimal) -> (Decimal, Decimal, Decimal) {
    let commission = (base * rate / Decimal::ONE_HUNDRED)
        .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    let tax = (commission * COMMISSION_TAX_PERCENT / Decimal::ONE_HUNDRED)
        .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    (commission, tax, commission + tax)
}

/// Derive the owner-facing commission invoice from a freshly issued tenant
/// invoice. Missing commission configuration is not an error: issuance must
/// stay robust to incomplete auxiliary setup.
pub async fn cascade_for_invoice(pool: &PgPool, invoice: &Invoice) -> AppResult<CascadeOutcome> {
    let owner = match leases::get_owner(pool, invoice.owner_id).await {
        Ok(owner) => owner,
        Err(AppError::NotFound(_)) => {
            return Ok(CascadeOutcome::Skipped(CascadeSkip::NoCompanyScope));
        }
        Err(error) => return Err(error),
    };

    let Some(rate) = owner.commission_rate.filter(|rate| !rate.is_zero()) else {
        return Ok(CascadeOutcome::Skipped(CascadeSkip::NoCommissionRate));
    };

    let base = invoice.subtotal;
    let (commission, tax, total) = commission_amounts(base, rate);
    let today = Utc::now().date_naive();
    let due_date = today + Duration::days(COMMISSION_DUE_DAYS);

    let mut tx = pool.begin().await.map_err(map_db_error)?;
    let invoice_number = sequences::next_document_number(
        &mut tx,
        owner.organization_id,
        DocumentKind::CommissionInvoice,
        today,
    )
    .await?;
    let commission_invoice = invoices::insert_commission_invoice(
        &mut tx,
        invoices::NewCommissionInvoice {
            organization_id: owner.organization_id,
            invoice_id: invoice.id,
            owner_id: owner.id,
            invoice_number: &invoice_number,
            commission_rate: rate,
            base_amount: base,
            commission_amount: commission,
            tax_amount: tax,
            total,
            currency: &invoice.currency,
            due_date,
        },
    )
    .await?;
    tx.commit().await.map_err(map_db_error)?;

    Ok(CascadeOutcome::Created(commission_invoice))
}

#[cfg(test)]
mod tests {
    use super::commission_amounts;
    use rust_decimal::Decimal;

    fn dec(raw: &str) -> Decimal {
        raw.parse().unwrap()
    }

    #[test]
    fn commission_includes_fixed_tax() {
        // 10000 at 8% -> 800 commission, 168 tax (21%), 968 total
        let (commission, tax, total) = commission_amounts(dec("10000"), dec("8"));
        assert_eq!(commission, dec("800.00"));
        assert_eq!(tax, dec("168.00"));
        assert_eq!(total, dec("968.00"));
    }

    #[test]
    fn commission_rounds_half_up() {
        // 1234.56 at 7.25% = 89.5056 -> 89.51; tax = 18.7971 -> 18.80
        let (commission, tax, total) = commission_amounts(dec("1234.56"), dec("7.25"));
        assert_eq!(commission, dec("89.51"));
        assert_eq!(tax, dec("18.80"));
        assert_eq!(total, dec("108.31"));
    }
}
