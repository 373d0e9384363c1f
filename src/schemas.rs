use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use crate::error::AppError;

pub fn validate_input<T: Validate>(input: &T) -> Result<(), AppError> {
    input
        .validate()
        .map_err(|errors| AppError::UnprocessableEntity(format!("Validation failed: {errors}")))
}

pub fn clamp_limit_in_range(limit: Option<i64>, min: i64, max: i64) -> i64 {
    limit.unwrap_or(max).clamp(min, max)
}

fn default_true() -> bool {
    true
}
fn default_false() -> bool {
    false
}
fn default_quantity_one() -> Decimal {
    Decimal::ONE
}

#[derive(Debug, Clone, Deserialize)]
pub struct AccountPath {
    pub account_id: Uuid,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LeasePath {
    pub lease_id: Uuid,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InvoicePath {
    pub invoice_id: Uuid,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentPath {
    pub payment_id: Uuid,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateTenantAccountInput {
    pub lease_id: Uuid,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MovementsQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateMovementInput {
    pub movement_type: String,
    pub amount: Decimal,
    #[validate(length(max = 500))]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateInvoiceInput {
    pub lease_id: Uuid,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub due_date: NaiveDate,
    pub subtotal: Decimal,
    #[serde(default)]
    pub late_fee: Decimal,
    #[serde(default)]
    pub adjustments: Decimal,
    #[validate(length(min = 3, max = 3))]
    pub currency: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GenerateInvoiceInput {
    /// Bake the accrued late fee into the new invoice. Off by default: the
    /// fee stays advisory until explicitly requested.
    #[serde(default = "default_false")]
    pub apply_late_fee: bool,
    #[serde(default = "default_true")]
    pub apply_adjustment: bool,
    #[serde(default = "default_false")]
    pub issue: bool,
    pub period_start: Option<NaiveDate>,
    pub period_end: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
}

impl Default for GenerateInvoiceInput {
    fn default() -> Self {
        Self {
            apply_late_fee: false,
            apply_adjustment: true,
            issue: false,
            period_start: None,
            period_end: None,
            due_date: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct InvoicesQuery {
    pub organization_id: Option<Uuid>,
    pub lease_id: Option<Uuid>,
    pub tenant_account_id: Option<Uuid>,
    pub status: Option<String>,
    pub due_before: Option<NaiveDate>,
    pub due_after: Option<NaiveDate>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct PaymentItemInput {
    pub kind: String,
    #[validate(length(max = 255))]
    pub description: Option<String>,
    pub amount: Decimal,
    #[serde(default = "default_quantity_one")]
    pub quantity: Decimal,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreatePaymentInput {
    pub tenant_account_id: Uuid,
    /// Explicit amount wins; when omitted, the signed sum of `items` is used.
    pub amount: Option<Decimal>,
    #[validate(length(min = 3, max = 3))]
    pub currency: Option<String>,
    pub payment_date: Option<NaiveDate>,
    #[validate(length(max = 64))]
    pub method: Option<String>,
    #[validate(length(max = 255))]
    pub reference: Option<String>,
    #[validate(length(max = 1000))]
    pub notes: Option<String>,
    #[validate(nested)]
    pub items: Option<Vec<PaymentItemInput>>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct UpdatePaymentInput {
    pub amount: Option<Decimal>,
    pub payment_date: Option<NaiveDate>,
    #[validate(length(max = 64))]
    pub method: Option<String>,
    #[validate(length(max = 255))]
    pub reference: Option<String>,
    #[validate(length(max = 1000))]
    pub notes: Option<String>,
    #[validate(nested)]
    pub items: Option<Vec<PaymentItemInput>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentsQuery {
    pub organization_id: Option<Uuid>,
    pub tenant_account_id: Option<Uuid>,
    pub status: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ActingUserQuery {
    pub acting_user_id: Option<Uuid>,
}

#[cfg(test)]
mod tests {
    use super::clamp_limit_in_range;

    #[test]
    fn clamps_limits() {
        assert_eq!(clamp_limit_in_range(None, 1, 500), 500);
        assert_eq!(clamp_limit_in_range(Some(0), 1, 500), 1);
        assert_eq!(clamp_limit_in_range(Some(2000), 1, 500), 500);
        assert_eq!(clamp_limit_in_range(Some(25), 1, 500), 25);
    }
}
