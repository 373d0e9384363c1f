use chrono::{Datelike, NaiveDate};
use sqlx::PgConnection;
use uuid::Uuid;

use crate::domain::DocumentKind;
use crate::error::{map_db_error, AppResult};

/// Allocate the next document number within (scope, kind, month). The
/// counter row is upserted atomically, so concurrent allocations in the
/// same scope serialize on the row and never hand out the same value.
/// Runs inside the caller's transaction: a rolled-back invoice leaves a
/// numbering gap at most, never a duplicate.
pub async fn next_document_number(
    conn: &mut PgConnection,
    scope_id: Uuid,
    kind: DocumentKind,
    date: NaiveDate,
) -> AppResult<String> {
    let period = period_for(date);
    let sequence: i64 = sqlx::query_scalar(
        "INSERT INTO document_counters (scope_id, kind, period, last_value)
         VALUES ($1, $2, $3, 1)
         ON CONFLICT (scope_id, kind, period)
         DO UPDATE SET last_value = document_counters.last_value + 1
         RETURNING last_value",
    )
    .bind(scope_id)
    .bind(kind.as_str())
    .bind(&period)
    .fetch_one(&mut *conn)
    .await
    .map_err(map_db_error)?;

    Ok(format_document_number(kind, &period, sequence))
}

pub fn period_for(date: NaiveDate) -> String {
    format!("{:04}{:02}", date.year(), date.month())
}

pub fn format_document_number(kind: DocumentKind, period: &str, sequence: i64) -> String {
    format!("{}-{}-{:05}", kind.prefix(), period, sequence)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_period_from_date() {
        let date = NaiveDate::from_ymd_opt(2026, 3, 7).unwrap();
        assert_eq!(period_for(date), "202603");
    }

    #[test]
    fn formats_document_numbers_per_kind() {
        assert_eq!(
            format_document_number(DocumentKind::Invoice, "202603", 1),
            "INV-202603-00001"
        );
        assert_eq!(
            format_document_number(DocumentKind::CommissionInvoice, "202603", 42),
            "COM-202603-00042"
        );
        assert_eq!(
            format_document_number(DocumentKind::Receipt, "202612", 123456),
            "REC-202612-123456"
        );
    }
}
