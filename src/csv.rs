use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::io;
use std::path::Path;
use thiserror::Error;

use crate::Amount;
use crate::amount::AmountParseError;
use crate::gateway::PollStep;
use crate::model::{ResponseCode, TransactionRecord, TransactionStatus};

/// Errors that can occur when reading a poll script
#[derive(Debug, Error)]
pub enum CsvError {
    #[error("failed to open poll script: {0}")]
    Open(#[source] csv::Error),

    #[error("line {line}: failed to parse row: {source}")]
    Parse { line: usize, source: csv::Error },

    #[error("line {line}: confirmed row missing {field}")]
    MissingField { line: usize, field: &'static str },

    #[error("line {line}: invalid amount: {source}")]
    Amount {
        line: usize,
        source: AmountParseError,
    },
}

#[derive(Debug, Deserialize)]
struct ScriptRow {
    response_code: Option<i32>,
    #[serde(default)]
    message: String,
    hash: Option<String>,
    from_account: Option<String>,
    to_account: Option<String>,
    currency: Option<String>,
    amount: Option<String>,
    external_ref: Option<String>,
}

#[derive(Debug, Serialize)]
struct ReceiptRow<'a> {
    hash: &'a str,
    from_account: &'a str,
    to_account: &'a str,
    currency: &'a str,
    amount: String,
    created_at: String,
    acknowledged_at: String,
    external_ref: &'a str,
}

/// Read scripted gateway answers from a csv file.
///
/// An empty `response_code` stands for a transport error carrying `message`.
pub fn read_poll_script(
    path: impl AsRef<Path>,
) -> Result<impl Iterator<Item = Result<PollStep, CsvError>>, CsvError> {
    let reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(CsvError::Open)?;

    Ok(reader
        .into_deserialize::<ScriptRow>()
        .enumerate()
        .map(|(idx, result)| {
            let line = idx + 2; // 1-indexed, skip header
            let row = result.map_err(|source| CsvError::Parse { line, source })?;
            parse_step(line, row)
        }))
}

fn parse_step(line: usize, row: ScriptRow) -> Result<PollStep, CsvError> {
    let Some(code) = row.response_code else {
        let message = if row.message.is_empty() {
            "scripted transport error".to_string()
        } else {
            row.message
        };
        return Ok(PollStep::TransportError(message));
    };

    let response_code = ResponseCode::from(code);
    if response_code != ResponseCode::Confirmed {
        return Ok(PollStep::Status(TransactionStatus {
            response_code,
            message: row.message,
            record: None,
        }));
    }

    let hash = row.hash.ok_or(CsvError::MissingField {
        line,
        field: "hash",
    })?;
    let amount: Amount = row
        .amount
        .ok_or(CsvError::MissingField {
            line,
            field: "amount",
        })?
        .parse()
        .map_err(|source| CsvError::Amount { line, source })?;

    let now = Utc::now();
    let record = TransactionRecord {
        hash,
        from_account: row.from_account.unwrap_or_default(),
        to_account: row.to_account.unwrap_or_default(),
        currency: row.currency.unwrap_or_default(),
        amount,
        created_at: now,
        acknowledged_at: now,
        external_ref: row.external_ref,
    };
    Ok(PollStep::Status(TransactionStatus {
        response_code,
        message: row.message,
        record: Some(record),
    }))
}

/// Write a confirmed transaction as a single csv receipt row (with header).
pub fn write_receipt(writer: impl io::Write, record: &TransactionRecord) -> Result<(), csv::Error> {
    let mut writer = csv::Writer::from_writer(writer);
    writer.serialize(ReceiptRow {
        hash: &record.hash,
        from_account: &record.from_account,
        to_account: &record.to_account,
        currency: &record.currency,
        amount: record.amount.to_string(),
        created_at: record.created_at.to_rfc3339_opts(SecondsFormat::Secs, true),
        acknowledged_at: record
            .acknowledged_at
            .to_rfc3339_opts(SecondsFormat::Secs, true),
        external_ref: record.external_ref.as_deref().unwrap_or(""),
    })?;
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const HEADER: &str =
        "response_code,message,hash,from_account,to_account,currency,amount,external_ref\n";

    fn write_csv(rows: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(HEADER.as_bytes()).unwrap();
        file.write_all(rows.as_bytes()).unwrap();
        file
    }

    fn read(file: &NamedTempFile) -> Vec<Result<PollStep, CsvError>> {
        read_poll_script(file.path()).unwrap().collect()
    }

    #[test]
    fn read_pending_and_rejected() {
        let file = write_csv("1,not yet,,,,,,\n7, declined ,,,,,,\n");
        let steps = read(&file);
        assert_eq!(steps.len(), 2);

        assert_eq!(
            steps[0].as_ref().unwrap(),
            &PollStep::Status(TransactionStatus::with_code(1, "not yet"))
        );
        assert_eq!(
            steps[1].as_ref().unwrap(),
            &PollStep::rejected(7, "declined")
        );
    }

    #[test]
    fn read_transport_error() {
        let file = write_csv(",connection reset,,,,,,\n,,,,,,,\n");
        let steps = read(&file);

        assert_eq!(
            steps[0].as_ref().unwrap(),
            &PollStep::transport("connection reset")
        );
        assert_eq!(
            steps[1].as_ref().unwrap(),
            &PollStep::transport("scripted transport error")
        );
    }

    #[test]
    fn read_confirmed() {
        let file = write_csv("0,ok,H1,111,222,USD,4.99,INV-9\n");
        let steps = read(&file);

        match steps[0].as_ref().unwrap() {
            PollStep::Status(status) => {
                assert_eq!(status.response_code, ResponseCode::Confirmed);
                let record = status.record.as_ref().unwrap();
                assert_eq!(record.hash, "H1");
                assert_eq!(record.from_account, "111");
                assert_eq!(record.amount, Amount::from_scaled(49_900));
                assert_eq!(record.external_ref.as_deref(), Some("INV-9"));
            }
            other => panic!("expected status, got {other:?}"),
        }
    }

    #[test]
    fn confirmed_row_requires_hash_and_amount() {
        let file = write_csv("0,ok,,111,222,USD,4.99,\n0,ok,H2,111,222,USD,,\n0,ok,H3,1,2,USD,abc,\n");
        let steps = read(&file);

        assert!(matches!(
            steps[0],
            Err(CsvError::MissingField {
                line: 2,
                field: "hash"
            })
        ));
        assert!(matches!(
            steps[1],
            Err(CsvError::MissingField {
                line: 3,
                field: "amount"
            })
        ));
        assert!(matches!(steps[2], Err(CsvError::Amount { line: 4, .. })));
    }

    #[test]
    fn unparsable_code_is_line_error() {
        let file = write_csv("zero,ok,,,,,,\n1,pending,,,,,,\n");
        let steps = read(&file);

        assert!(matches!(steps[0], Err(CsvError::Parse { line: 2, .. })));
        assert!(steps[1].is_ok());
    }

    #[test]
    fn missing_file_fails_to_open() {
        let result = read_poll_script("/nonexistent/poll_script.csv");
        assert!(matches!(result, Err(CsvError::Open(_))));
    }

    #[test]
    fn receipt_row() {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
        let record = TransactionRecord {
            hash: "H1".to_string(),
            from_account: "111".to_string(),
            to_account: "222".to_string(),
            currency: "USD".to_string(),
            amount: Amount::from_scaled(49_900),
            created_at: at,
            acknowledged_at: at,
            external_ref: None,
        };

        let mut out = Vec::new();
        write_receipt(&mut out, &record).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(
            lines[0],
            "hash,from_account,to_account,currency,amount,created_at,acknowledged_at,external_ref"
        );
        assert_eq!(
            lines[1],
            "H1,111,222,USD,4.9900,2024-05-01T10:00:00Z,2024-05-01T10:00:00Z,"
        );
    }
}
