use chrono::NaiveDate;
use rust_decimal::{Decimal, RoundingStrategy};

use crate::domain::LateFeeType;

/// An invoice slice relevant to late-fee accrual: what is still owed and
/// since when. Callers filter out paid/cancelled invoices before building
/// these.
#[derive(Debug, Clone)]
pub struct PendingInvoice {
    pub due_date: NaiveDate,
    pub pending: Decimal,
}

/// Advisory late fee across all overdue invoices. Pure: the caller decides
/// whether the result is persisted (baked into a generated invoice) or only
/// reported (balance queries).
pub fn compute_late_fee(
    policy: Option<(LateFeeType, Decimal)>,
    invoices: &[PendingInvoice],
    today: NaiveDate,
) -> Decimal {
    let Some((fee_type, value)) = policy else {
        return Decimal::ZERO;
    };

    let mut fee = Decimal::ZERO;
    for invoice in invoices {
        let days_overdue = (today - invoice.due_date).num_days();
        if days_overdue <= 0 || invoice.pending <= Decimal::ZERO {
            continue;
        }
        let days = Decimal::from(days_overdue);
        fee += match fee_type {
            LateFeeType::DailyPercentage => {
                invoice.pending * (value / Decimal::ONE_HUNDRED) * days
            }
            LateFeeType::DailyFixed => value * days,
            LateFeeType::Percentage => invoice.pending * (value / Decimal::ONE_HUNDRED),
            LateFeeType::Fixed => value,
        };
    }

    fee.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn dec(raw: &str) -> Decimal {
        raw.parse().unwrap()
    }

    fn three_days_overdue() -> Vec<PendingInvoice> {
        vec![PendingInvoice {
            due_date: date(2026, 3, 7),
            pending: dec("1000"),
        }]
    }

    const TODAY: (i32, u32, u32) = (2026, 3, 10);

    #[test]
    fn daily_percentage_scales_with_days() {
        let fee = compute_late_fee(
            Some((LateFeeType::DailyPercentage, dec("1"))),
            &three_days_overdue(),
            date(TODAY.0, TODAY.1, TODAY.2),
        );
        assert_eq!(fee, dec("30.00"));
    }

    #[test]
    fn daily_fixed_scales_with_days() {
        let fee = compute_late_fee(
            Some((LateFeeType::DailyFixed, dec("10"))),
            &three_days_overdue(),
            date(TODAY.0, TODAY.1, TODAY.2),
        );
        assert_eq!(fee, dec("30.00"));
    }

    #[test]
    fn one_time_percentage_ignores_days() {
        let fee = compute_late_fee(
            Some((LateFeeType::Percentage, dec("5"))),
            &three_days_overdue(),
            date(TODAY.0, TODAY.1, TODAY.2),
        );
        assert_eq!(fee, dec("50.00"));
    }

    #[test]
    fn one_time_fixed_applies_once_per_invoice() {
        let fee = compute_late_fee(
            Some((LateFeeType::Fixed, dec("40"))),
            &three_days_overdue(),
            date(TODAY.0, TODAY.1, TODAY.2),
        );
        assert_eq!(fee, dec("40.00"));

        let two = vec![
            PendingInvoice {
                due_date: date(2026, 2, 7),
                pending: dec("500"),
            },
            PendingInvoice {
                due_date: date(2026, 3, 7),
                pending: dec("1000"),
            },
        ];
        let fee = compute_late_fee(
            Some((LateFeeType::Fixed, dec("40"))),
            &two,
            date(TODAY.0, TODAY.1, TODAY.2),
        );
        assert_eq!(fee, dec("80.00"));
    }

    #[test]
    fn due_today_or_future_accrues_nothing() {
        let not_yet = vec![
            PendingInvoice {
                due_date: date(2026, 3, 10),
                pending: dec("1000"),
            },
            PendingInvoice {
                due_date: date(2026, 4, 1),
                pending: dec("1000"),
            },
        ];
        let fee = compute_late_fee(
            Some((LateFeeType::DailyPercentage, dec("1"))),
            &not_yet,
            date(TODAY.0, TODAY.1, TODAY.2),
        );
        assert_eq!(fee, Decimal::ZERO);
    }

    #[test]
    fn no_policy_or_no_pending_means_zero() {
        assert_eq!(
            compute_late_fee(None, &three_days_overdue(), date(TODAY.0, TODAY.1, TODAY.2)),
            Decimal::ZERO
        );
        let settled = vec![PendingInvoice {
            due_date: date(2026, 3, 7),
            pending: Decimal::ZERO,
        }];
        assert_eq!(
            compute_late_fee(
                Some((LateFeeType::DailyFixed, dec("10"))),
                &settled,
                date(TODAY.0, TODAY.1, TODAY.2)
            ),
            Decimal::ZERO
        );
    }

    #[test]
    fn result_is_rounded_half_up() {
        // 333.33 * 0.75% * 1 day = 2.4999975 -> 2.50
        let invoices = vec![PendingInvoice {
            due_date: date(2026, 3, 9),
            pending: dec("333.33"),
        }];
        let fee = compute_late_fee(
            Some((LateFeeType::DailyPercentage, dec("0.75"))),
            &invoices,
            date(TODAY.0, TODAY.1, TODAY.2),
        );
        assert_eq!(fee, dec("2.50"));
    }
}
