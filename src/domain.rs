use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

/// Signed ledger movement kinds. Charges and late fees increase what the
/// tenant owes; payments and discounts decrease it. The sign convention
/// lives in the `amount` column, not the type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MovementType {
    Charge,
    Payment,
    Adjustment,
    Refund,
    Interest,
    LateFee,
    Discount,
}

impl MovementType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Charge => "charge",
            Self::Payment => "payment",
            Self::Adjustment => "adjustment",
            Self::Refund => "refund",
            Self::Interest => "interest",
            Self::LateFee => "late_fee",
            Self::Discount => "discount",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "charge" => Some(Self::Charge),
            "payment" => Some(Self::Payment),
            "adjustment" => Some(Self::Adjustment),
            "refund" => Some(Self::Refund),
            "interest" => Some(Self::Interest),
            "late_fee" => Some(Self::LateFee),
            "discount" => Some(Self::Discount),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvoiceStatus {
    Draft,
    Issued,
    PartiallyPaid,
    Paid,
    Cancelled,
}

impl InvoiceStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Issued => "issued",
            Self::PartiallyPaid => "partially_paid",
            Self::Paid => "paid",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "draft" => Some(Self::Draft),
            "issued" => Some(Self::Issued),
            "partially_paid" => Some(Self::PartiallyPaid),
            "paid" => Some(Self::Paid),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// States that still owe money and participate in FIFO application
    /// and late-fee accrual.
    pub fn is_outstanding(self) -> bool {
        matches!(self, Self::Issued | Self::PartiallyPaid)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentStatus {
    Pending,
    Completed,
    Cancelled,
}

impl PaymentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "completed" => Some(Self::Completed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentItemKind {
    Charge,
    Discount,
}

impl PaymentItemKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Charge => "charge",
            Self::Discount => "discount",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "charge" => Some(Self::Charge),
            "discount" => Some(Self::Discount),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LateFeeType {
    DailyPercentage,
    DailyFixed,
    Percentage,
    Fixed,
}

impl LateFeeType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::DailyPercentage => "daily_percentage",
            Self::DailyFixed => "daily_fixed",
            Self::Percentage => "percentage",
            Self::Fixed => "fixed",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "daily_percentage" => Some(Self::DailyPercentage),
            "daily_fixed" => Some(Self::DailyFixed),
            "percentage" => Some(Self::Percentage),
            "fixed" => Some(Self::Fixed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdjustmentType {
    Fixed,
    Percentage,
    InflationIndex,
}

impl AdjustmentType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Fixed => "fixed",
            Self::Percentage => "percentage",
            Self::InflationIndex => "inflation_index",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "fixed" => Some(Self::Fixed),
            "percentage" => Some(Self::Percentage),
            "inflation_index" => Some(Self::InflationIndex),
            _ => None,
        }
    }
}

/// Lease-side enum naming the published index series the rent follows.
/// Mapped onto the reference-data series identifiers before lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InflationIndexType {
    Icl,
    Ipc,
    CasaPropia,
}

impl InflationIndexType {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "icl" => Some(Self::Icl),
            "ipc" => Some(Self::Ipc),
            "casa_propia" => Some(Self::CasaPropia),
            _ => None,
        }
    }

    /// Series identifier used by the `inflation_indices` reference table.
    pub fn reference_series(self) -> &'static str {
        match self {
            Self::Icl => "icl",
            Self::Ipc => "ipc",
            Self::CasaPropia => "casa_propia",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentFrequency {
    Monthly,
    Bimonthly,
    Quarterly,
    Semiannual,
    Annual,
}

impl PaymentFrequency {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "monthly" => Some(Self::Monthly),
            "bimonthly" => Some(Self::Bimonthly),
            "quarterly" => Some(Self::Quarterly),
            "semiannual" => Some(Self::Semiannual),
            "annual" => Some(Self::Annual),
            _ => None,
        }
    }

    pub fn months(self) -> u32 {
        match self {
            Self::Monthly => 1,
            Self::Bimonthly => 2,
            Self::Quarterly => 3,
            Self::Semiannual => 6,
            Self::Annual => 12,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Invoice,
    CommissionInvoice,
    Receipt,
}

impl DocumentKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Invoice => "invoice",
            Self::CommissionInvoice => "commission_invoice",
            Self::Receipt => "receipt",
        }
    }

    pub fn prefix(self) -> &'static str {
        match self {
            Self::Invoice => "INV",
            Self::CommissionInvoice => "COM",
            Self::Receipt => "REC",
        }
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct TenantAccount {
    pub id: Uuid,
    pub lease_id: Uuid,
    pub currency: String,
    pub balance: Decimal,
    pub last_movement_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct TenantAccountMovement {
    pub id: Uuid,
    pub account_id: Uuid,
    pub movement_type: String,
    pub amount: Decimal,
    pub balance_after: Decimal,
    pub reference_type: Option<String>,
    pub reference_id: Option<Uuid>,
    pub description: Option<String>,
    pub movement_date: NaiveDate,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Invoice {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub lease_id: Uuid,
    pub owner_id: Uuid,
    pub tenant_account_id: Uuid,
    pub invoice_number: String,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub subtotal: Decimal,
    pub late_fee: Decimal,
    pub adjustments: Decimal,
    pub total: Decimal,
    pub currency: String,
    pub amount_paid: Decimal,
    pub due_date: NaiveDate,
    pub status: String,
    pub issued_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Invoice {
    pub fn status(&self) -> InvoiceStatus {
        InvoiceStatus::parse(&self.status).unwrap_or(InvoiceStatus::Draft)
    }

    pub fn pending(&self) -> Decimal {
        self.total - self.amount_paid
    }

    /// Overdue is derived, never stored: an outstanding invoice past its
    /// due date.
    pub fn is_overdue(&self, today: NaiveDate) -> bool {
        self.status().is_outstanding() && self.due_date < today
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct CommissionInvoice {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub invoice_id: Uuid,
    pub owner_id: Uuid,
    pub invoice_number: String,
    pub commission_rate: Decimal,
    pub base_amount: Decimal,
    pub commission_amount: Decimal,
    pub tax_amount: Decimal,
    pub total: Decimal,
    pub currency: String,
    pub due_date: NaiveDate,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Payment {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub tenant_account_id: Uuid,
    pub amount: Decimal,
    pub currency: String,
    pub payment_date: NaiveDate,
    pub method: Option<String>,
    pub reference: Option<String>,
    pub receipt_number: Option<String>,
    pub status: String,
    pub notes: Option<String>,
    pub created_by_user_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl Payment {
    pub fn status(&self) -> PaymentStatus {
        PaymentStatus::parse(&self.status).unwrap_or(PaymentStatus::Pending)
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct PaymentItem {
    pub id: Uuid,
    pub payment_id: Uuid,
    pub kind: String,
    pub description: Option<String>,
    pub amount: Decimal,
    pub quantity: Decimal,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct PaymentApplication {
    pub id: Uuid,
    pub payment_id: Uuid,
    pub invoice_id: Uuid,
    pub amount: Decimal,
    pub created_at: DateTime<Utc>,
}

/// The billing-relevant slice of a lease row. The rest of the lease is
/// owned by the platform's CRUD layer and never read here.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct LeaseBilling {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub owner_id: Uuid,
    pub tenant_id: Option<Uuid>,
    pub currency: String,
    pub monthly_rent: Decimal,
    pub additional_expenses: Decimal,
    pub payment_frequency: String,
    pub payment_due_day: i16,
    pub late_fee_type: Option<String>,
    pub late_fee_value: Option<Decimal>,
    pub adjustment_type: Option<String>,
    pub adjustment_value: Option<Decimal>,
    pub inflation_index_type: Option<String>,
    pub adjustment_frequency_months: Option<i16>,
    pub last_adjustment_date: Option<NaiveDate>,
    pub next_adjustment_date: Option<NaiveDate>,
    pub last_billing_date: Option<NaiveDate>,
    pub next_billing_date: Option<NaiveDate>,
}

impl LeaseBilling {
    pub fn payment_frequency(&self) -> PaymentFrequency {
        PaymentFrequency::parse(&self.payment_frequency).unwrap_or(PaymentFrequency::Monthly)
    }

    pub fn late_fee_policy(&self) -> Option<(LateFeeType, Decimal)> {
        let fee_type = LateFeeType::parse(self.late_fee_type.as_deref()?)?;
        Some((fee_type, self.late_fee_value?))
    }

    pub fn adjustment_type(&self) -> Option<AdjustmentType> {
        AdjustmentType::parse(self.adjustment_type.as_deref()?)
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Owner {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub full_name: String,
    pub commission_rate: Option<Decimal>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enum_round_trips() {
        for movement in [
            MovementType::Charge,
            MovementType::Payment,
            MovementType::Adjustment,
            MovementType::Refund,
            MovementType::Interest,
            MovementType::LateFee,
            MovementType::Discount,
        ] {
            assert_eq!(MovementType::parse(movement.as_str()), Some(movement));
        }
        for status in [
            InvoiceStatus::Draft,
            InvoiceStatus::Issued,
            InvoiceStatus::PartiallyPaid,
            InvoiceStatus::Paid,
            InvoiceStatus::Cancelled,
        ] {
            assert_eq!(InvoiceStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(LateFeeType::parse("DAILY_PERCENTAGE"), Some(LateFeeType::DailyPercentage));
        assert_eq!(MovementType::parse("unknown"), None);
    }

    #[test]
    fn frequency_months() {
        assert_eq!(PaymentFrequency::Monthly.months(), 1);
        assert_eq!(PaymentFrequency::Bimonthly.months(), 2);
        assert_eq!(PaymentFrequency::Quarterly.months(), 3);
        assert_eq!(PaymentFrequency::Semiannual.months(), 6);
        assert_eq!(PaymentFrequency::Annual.months(), 12);
        assert_eq!(PaymentFrequency::parse("weekly"), None);
    }

    #[test]
    fn outstanding_states() {
        assert!(InvoiceStatus::Issued.is_outstanding());
        assert!(InvoiceStatus::PartiallyPaid.is_outstanding());
        assert!(!InvoiceStatus::Draft.is_outstanding());
        assert!(!InvoiceStatus::Paid.is_outstanding());
        assert!(!InvoiceStatus::Cancelled.is_outstanding());
    }

    #[test]
    fn document_prefixes() {
        assert_eq!(DocumentKind::Invoice.prefix(), "INV");
        assert_eq!(DocumentKind::CommissionInvoice.prefix(), "COM");
        assert_eq!(DocumentKind::Receipt.prefix(), "REC");
    }
}
