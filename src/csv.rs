use serde::Deserialize;
use std::io;
use std::path::Path;
use thiserror::Error;

use crate::model::{CashbackTransaction, OrderEvent};

/// Errors that can occur when reading or writing csv files
#[derive(Debug, Error)]
pub enum CsvError {
    #[error("failed to open {path}: {source}")]
    Open { path: String, source: csv::Error },

    #[error("line {line}: failed to parse row: {source}")]
    Parse { line: usize, source: csv::Error },

    #[error("line {line}: unrecognized event type '{event_type}'")]
    UnrecognizedType { line: usize, event_type: String },

    #[error("line {line}: {event_type} missing {field}")]
    MissingField {
        line: usize,
        event_type: String,
        field: &'static str,
    },

    #[error("failed to write row: {0}")]
    Write(#[from] csv::Error),

    #[error("failed to flush output: {0}")]
    Flush(#[from] io::Error),
}

#[derive(Debug, Deserialize)]
struct EventRow {
    r#type: String,
    shop: String,
    order_id: String,
    cart_token: Option<String>,
    /// Space separated merchandise ids
    items: Option<String>,
    /// Optional column; lets replays skip refunds already reversed
    #[serde(default)]
    refund_id: Option<String>,
}

fn reader(path: &Path) -> Result<csv::Reader<std::fs::File>, CsvError> {
    csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|source| CsvError::Open {
            path: path.display().to_string(),
            source,
        })
}

/// Read a transaction snapshot. Any malformed row fails the whole read.
pub fn read_transactions(path: impl AsRef<Path>) -> Result<Vec<CashbackTransaction>, CsvError> {
    reader(path.as_ref())?
        .into_deserialize::<CashbackTransaction>()
        .enumerate()
        .map(|(idx, result)| {
            let line = idx + 2; // 1-indexed, skip header
            result.map_err(|source| CsvError::Parse { line, source })
        })
        .collect()
}

/// Write a transaction snapshot, one row per transaction
pub fn write_transactions<'a>(
    transactions: impl IntoIterator<Item = &'a CashbackTransaction>,
    out: impl io::Write,
) -> Result<(), CsvError> {
    let mut writer = csv::Writer::from_writer(out);
    for tx in transactions {
        writer.serialize(tx)?;
    }
    writer.flush()?;
    Ok(())
}

/// Read order events to replay, one result per row
pub fn read_events(
    path: impl AsRef<Path>,
) -> Result<impl Iterator<Item = Result<OrderEvent, CsvError>>, CsvError> {
    let reader = reader(path.as_ref())?;

    Ok(reader
        .into_deserialize::<EventRow>()
        .enumerate()
        .map(|(idx, result)| {
            let line = idx + 2; // 1-indexed, skip header
            let row = result.map_err(|source| CsvError::Parse { line, source })?;
            match row.r#type.as_str() {
                "paid" => Ok(OrderEvent::Paid {
                    shop: row.shop,
                    order_id: row.order_id,
                    cart_token: row.cart_token.filter(|t| !t.is_empty()),
                }),
                "cancelled" => Ok(OrderEvent::Cancelled {
                    shop: row.shop,
                    order_id: row.order_id,
                }),
                "partially_refunded" => {
                    let items = row.items.ok_or_else(|| CsvError::MissingField {
                        line,
                        event_type: "partially_refunded".to_string(),
                        field: "items",
                    })?;
                    Ok(OrderEvent::PartiallyRefunded {
                        shop: row.shop,
                        order_id: row.order_id,
                        refund_id: row.refund_id.filter(|id| !id.is_empty()),
                        merchandise_ids: items.split_whitespace().map(String::from).collect(),
                    })
                }
                other => Err(CsvError::UnrecognizedType {
                    line,
                    event_type: other.to_string(),
                }),
            }
        }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Amount;
    use crate::model::TransactionStatus;
    use chrono::{DateTime, Utc};
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_csv(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    fn events(content: &str) -> Vec<Result<OrderEvent, CsvError>> {
        let file = write_csv(content);
        read_events(file.path()).unwrap().collect()
    }

    const EVENTS_HEADER: &str = "type,shop,order_id,cart_token,items\n";

    #[test]
    fn read_paid() {
        let results = events(&format!("{EVENTS_HEADER}paid,acme,o1,c1,\n"));
        assert_eq!(results.len(), 1);
        assert_eq!(
            results[0].as_ref().unwrap(),
            &OrderEvent::Paid {
                shop: "acme".into(),
                order_id: "o1".into(),
                cart_token: Some("c1".into()),
            }
        );
    }

    #[test]
    fn read_paid_without_cart_token() {
        let results = events(&format!("{EVENTS_HEADER}paid,acme,o1,,\n"));
        assert!(matches!(
            results[0].as_ref().unwrap(),
            OrderEvent::Paid { cart_token: None, .. }
        ));
    }

    #[test]
    fn read_partial_refund_items() {
        let results = events(&format!(
            "{EVENTS_HEADER}partially_refunded,acme,o1,,v1 v2\n"
        ));
        match results.into_iter().next().unwrap().unwrap() {
            OrderEvent::PartiallyRefunded {
                merchandise_ids, ..
            } => assert_eq!(merchandise_ids, vec!["v1", "v2"]),
            other => panic!("expected partial refund, got {other:?}"),
        }
    }

    #[test]
    fn read_partial_refund_id() {
        let results = events(
            "type,shop,order_id,cart_token,items,refund_id\n\
             partially_refunded,acme,o1,,v1,r9\n\
             partially_refunded,acme,o1,,v1,\n",
        );
        assert!(matches!(
            results[0].as_ref().unwrap(),
            OrderEvent::PartiallyRefunded { refund_id: Some(id), .. } if id == "r9"
        ));
        assert!(matches!(
            results[1].as_ref().unwrap(),
            OrderEvent::PartiallyRefunded { refund_id: None, .. }
        ));
    }

    #[test]
    fn read_with_whitespace() {
        let results = events("type, shop, order_id, cart_token, items\ncancelled, acme, o1, , \n");
        assert_eq!(results.len(), 1);
        assert!(results[0].is_ok());
    }

    #[test]
    fn read_returns_error_for_unknown_type() {
        let results = events(&format!("{EVENTS_HEADER}shipped,acme,o1,,\n"));
        let err = results[0].as_ref().unwrap_err();
        assert!(matches!(err, CsvError::UnrecognizedType { line: 2, .. }));
    }

    #[test]
    fn read_returns_error_for_missing_items() {
        let results = events(&format!("{EVENTS_HEADER}partially_refunded,acme,o1,,\n"));
        let err = results[0].as_ref().unwrap_err();
        assert!(matches!(err, CsvError::MissingField { line: 2, field: "items", .. }));
    }

    #[test]
    fn read_missing_file_fails() {
        assert!(matches!(
            read_events("no-such-file.csv"),
            Err(CsvError::Open { .. })
        ));
    }

    #[test]
    fn transactions_survive_write_then_read() {
        let expires_at: DateTime<Utc> = "2026-10-19T12:00:00Z".parse().unwrap();
        let mut confirmed =
            CashbackTransaction::new("acme".into(), "c1".into(), "ct-1".into(), expires_at);
        confirmed.amount_to_redeem = Amount::from_minor(300);
        confirmed.confirm("o1".into(), "t1".into(), Some(Amount::from_minor(75)));
        confirmed.record_refund(Some("r1".into()));
        confirmed.record_refund(Some("r2".into()));
        let pending = CashbackTransaction::new("acme".into(), "c2".into(), "ct-2".into(), expires_at);

        let mut out = Vec::new();
        write_transactions([&confirmed, &pending], &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("shop,cart_token,confirm_token,expires_at,amount_to_redeem,status"));

        let file = write_csv(&text);
        let restored = read_transactions(file.path()).unwrap();
        assert_eq!(restored, vec![confirmed, pending]);
        assert_eq!(restored[1].status, TransactionStatus::Pending);
        assert_eq!(restored[1].tid, None);
        assert_eq!(restored[0].refund_ids, vec!["r1", "r2"]);
        assert!(restored[1].refund_ids.is_empty());
    }

    #[test]
    fn read_transactions_without_newer_columns() {
        let file = write_csv(
            "shop,cart_token,confirm_token,expires_at,amount_to_redeem,status,shopify_order_id,tid,accumulated_order,failed_attempts\n\
             acme,c1,ct,2026-10-19T12:00:00Z,0,confirmed,o1,t1,,0\n",
        );
        let restored = read_transactions(file.path()).unwrap();
        assert!(!restored[0].needs_reconciliation);
        assert!(restored[0].refund_ids.is_empty());
    }

    #[test]
    fn read_transactions_reports_bad_line() {
        let file = write_csv(
            "shop,cart_token,confirm_token,expires_at,amount_to_redeem,status,shopify_order_id,tid,accumulated_order,failed_attempts\n\
             acme,c1,ct,not-a-date,0,pending,,,,0\n",
        );
        let err = read_transactions(file.path()).unwrap_err();
        assert!(matches!(err, CsvError::Parse { line: 2, .. }));
    }
}
