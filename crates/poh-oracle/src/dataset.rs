//! # Dataset Loading
//!
//! Reads the historical dataset (CSV) into ordered rows. Each row either
//! parses into a [`Record`] or carries a [`SchemaError`] explaining why it
//! did not; one bad row never stops its siblings. Only a missing or unusable
//! header aborts loading.
//!
//! ## Format
//!
//! | Column | Aliases | Type |
//! |--------|---------|------|
//! | `date` | `as_of_date` | `YYYY-MM-DD` |
//! | `open`, `high`, `low`, `close` | | non-negative decimal, at most 8 fractional digits |
//! | `volume` | | non-negative integer |
//! | `Name` | `symbol`, `ticker` | entity id |
//!
//! Header matching ignores case and surrounding whitespace. Column order is
//! free and unknown columns are ignored. Fields may be double-quoted with
//! `""` as the escaped quote; a quoted field cannot span lines.

use chrono::{Datelike, NaiveDate};
use poh_registry::record::parse_volume;
use poh_registry::{Identity, Price, Record, RecordPayload, ValueError, YEAR_RANGE};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

/// Date format of the `date` column.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Columns every dataset must provide, by canonical name.
pub const REQUIRED_COLUMNS: [&str; 7] =
    ["date", "open", "high", "low", "close", "volume", "name"];

/// Failures that prevent loading the dataset at all.
#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("cannot read dataset {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("dataset has no header row")]
    MissingHeader,

    #[error("dataset header is malformed: {0}")]
    MalformedHeader(String),

    #[error("dataset header lacks required columns: {}", .0.join(", "))]
    MissingColumns(Vec<String>),

    #[error("dataset header maps {0:?} twice")]
    DuplicateColumn(String),
}

/// Why one row could not become a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SchemaError {
    #[error("expected {expected} fields, found {found}")]
    FieldCount { expected: usize, found: usize },

    #[error("{field} is empty")]
    MissingValue { field: String },

    #[error("bad date {value:?}, expected YYYY-MM-DD")]
    BadDate { value: String },

    #[error("bad entity id {value:?}: {reason}")]
    BadEntity { value: String, reason: String },

    #[error("bad {field}: {reason}")]
    BadValue { field: String, reason: String },

    #[error("{field} is negative ({value})")]
    Negative { field: String, value: String },

    #[error("unterminated quoted field")]
    UnterminatedQuote,

    #[error("duplicate of the row on line {first_line}")]
    Duplicate { first_line: usize },
}

/// One data line of the dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetRow {
    /// 1-based line number in the source text.
    pub line: usize,
    pub parsed: Result<Record, SchemaError>,
}

impl DatasetRow {
    /// The record identity, when the row parsed.
    pub fn identity(&self) -> Option<&Identity> {
        self.parsed.as_ref().ok().map(|r| &r.identity)
    }
}

/// An ordered dataset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dataset {
    rows: Vec<DatasetRow>,
}

impl Dataset {
    /// Reads and parses a CSV file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, DatasetError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| DatasetError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let dataset = Self::parse(&text)?;
        info!(
            path = %path.display(),
            rows = dataset.len(),
            malformed = dataset.malformed(),
            "loaded dataset"
        );
        Ok(dataset)
    }

    /// Parses CSV text.
    ///
    /// # Errors
    ///
    /// Only header problems are errors. Row problems are recorded per row.
    pub fn parse(text: &str) -> Result<Self, DatasetError> {
        let mut lines = text
            .trim_start_matches('\u{feff}')
            .lines()
            .enumerate()
            .map(|(i, line)| (i + 1, line))
            .filter(|(_, line)| !line.trim().is_empty());

        let (_, header) = lines.next().ok_or(DatasetError::MissingHeader)?;
        let columns = Columns::from_header(header)?;

        let mut first_seen: HashMap<Identity, usize> = HashMap::new();
        let mut rows = Vec::new();
        for (line, text) in lines {
            let parsed = split_fields(text)
                .and_then(|fields| columns.record(&fields))
                .and_then(|record| match first_seen.get(&record.identity) {
                    Some(&first_line) => Err(SchemaError::Duplicate { first_line }),
                    None => {
                        first_seen.insert(record.identity.clone(), line);
                        Ok(record)
                    }
                });
            if let Err(e) = &parsed {
                warn!(line, error = %e, "malformed dataset row");
            }
            rows.push(DatasetRow { line, parsed });
        }

        Ok(Dataset { rows })
    }

    /// Builds a dataset from already-typed records, numbered from line 2.
    pub fn from_records(records: impl IntoIterator<Item = Record>) -> Self {
        let rows = records
            .into_iter()
            .enumerate()
            .map(|(i, record)| DatasetRow {
                line: i + 2,
                parsed: Ok(record),
            })
            .collect();
        Dataset { rows }
    }

    pub fn rows(&self) -> &[DatasetRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Successfully parsed records, in order.
    pub fn records(&self) -> impl Iterator<Item = &Record> {
        self.rows.iter().filter_map(|r| r.parsed.as_ref().ok())
    }

    /// Number of rows carrying a schema error.
    pub fn malformed(&self) -> usize {
        self.rows.iter().filter(|r| r.parsed.is_err()).count()
    }
}

/// Positions of the required columns in the header.
struct Columns {
    date: usize,
    open: usize,
    high: usize,
    low: usize,
    close: usize,
    volume: usize,
    name: usize,
    width: usize,
}

impl Columns {
    fn from_header(header: &str) -> Result<Self, DatasetError> {
        let fields =
            split_fields(header).map_err(|e| DatasetError::MalformedHeader(e.to_string()))?;

        let mut positions: HashMap<&'static str, usize> = HashMap::new();
        for (index, raw) in fields.iter().enumerate() {
            if let Some(canonical) = canonical_column(raw) {
                if positions.insert(canonical, index).is_some() {
                    return Err(DatasetError::DuplicateColumn(canonical.to_string()));
                }
            }
        }

        let missing: Vec<String> = REQUIRED_COLUMNS
            .iter()
            .filter(|c| !positions.contains_key(*c))
            .map(|c| c.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(DatasetError::MissingColumns(missing));
        }

        Ok(Columns {
            date: positions["date"],
            open: positions["open"],
            high: positions["high"],
            low: positions["low"],
            close: positions["close"],
            volume: positions["volume"],
            name: positions["name"],
            width: fields.len(),
        })
    }

    fn record(&self, fields: &[String]) -> Result<Record, SchemaError> {
        if fields.len() != self.width {
            return Err(SchemaError::FieldCount {
                expected: self.width,
                found: fields.len(),
            });
        }
        let field = |index: usize, name: &str| -> Result<&str, SchemaError> {
            let value = fields[index].trim();
            if value.is_empty() {
                Err(SchemaError::MissingValue {
                    field: name.to_string(),
                })
            } else {
                Ok(value)
            }
        };

        let date_text = field(self.date, "date")?;
        let date = NaiveDate::parse_from_str(date_text, DATE_FORMAT)
            .ok()
            .filter(|d| YEAR_RANGE.contains(&d.year()))
            .ok_or_else(|| SchemaError::BadDate {
                value: date_text.to_string(),
            })?;

        let name = field(self.name, "name")?;
        let identity = Identity::new(name, date).map_err(|e| SchemaError::BadEntity {
            value: name.to_string(),
            reason: e.to_string(),
        })?;

        let payload = RecordPayload {
            open: price(field(self.open, "open")?, "open")?,
            high: price(field(self.high, "high")?, "high")?,
            low: price(field(self.low, "low")?, "low")?,
            close: price(field(self.close, "close")?, "close")?,
            volume: parse_volume(field(self.volume, "volume")?)
                .map_err(|e| value_error("volume", e))?,
        };

        Ok(Record { identity, payload })
    }
}

fn canonical_column(raw: &str) -> Option<&'static str> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "date" | "as_of_date" => Some("date"),
        "open" => Some("open"),
        "high" => Some("high"),
        "low" => Some("low"),
        "close" => Some("close"),
        "volume" => Some("volume"),
        "name" | "symbol" | "ticker" => Some("name"),
        _ => None,
    }
}

fn price(text: &str, field: &str) -> Result<Price, SchemaError> {
    let value: Price = text.parse().map_err(|e| value_error(field, e))?;
    if value.is_negative() {
        return Err(SchemaError::Negative {
            field: field.to_string(),
            value: text.to_string(),
        });
    }
    Ok(value)
}

fn value_error(field: &str, err: ValueError) -> SchemaError {
    match err {
        ValueError::Negative(value) => SchemaError::Negative {
            field: field.to_string(),
            value,
        },
        other => SchemaError::BadValue {
            field: field.to_string(),
            reason: other.to_string(),
        },
    }
}

/// Splits one CSV line into fields, honoring double quotes.
fn split_fields(line: &str) -> Result<Vec<String>, SchemaError> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    chars.next();
                    field.push('"');
                }
                '"' => in_quotes = false,
                _ => field.push(c),
            }
        } else {
            match c {
                '"' if field.trim().is_empty() => {
                    field.clear();
                    in_quotes = true;
                }
                ',' => fields.push(std::mem::take(&mut field)),
                _ => field.push(c),
            }
        }
    }

    if in_quotes {
        return Err(SchemaError::UnterminatedQuote);
    }
    fields.push(field);
    Ok(fields)
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "date,open,high,low,close,volume,Name";

    fn parse(body: &str) -> Dataset {
        Dataset::parse(&format!("{HEADER}\n{body}")).unwrap()
    }

    // ===== Happy Path =====

    #[test]
    fn test_parses_rows_in_order() {
        let ds = parse(
            "2023-10-25,170.65,173.06,170.65,171.80,57157115,AAPL\n\
             2023-10-26,340.54,341.63,326.94,327.89,37828500,MSFT\n",
        );
        assert_eq!(ds.len(), 2);
        assert_eq!(ds.malformed(), 0);
        assert_eq!(ds.rows()[0].line, 2);
        assert_eq!(ds.rows()[1].identity().unwrap().to_string(), "MSFT@2023-10-26");
        let aapl = ds.records().next().unwrap();
        assert_eq!(aapl.payload.close, "171.8".parse().unwrap());
        assert_eq!(aapl.payload.volume, 57_157_115);
    }

    #[test]
    fn test_header_aliases_and_order() {
        let ds = Dataset::parse(
            "Ticker, VOLUME ,Close,Low,High,Open,As_Of_Date,extra\n\
             AAPL,57157115,171.80,170.65,173.06,170.65,2023-10-25,ignored\n",
        )
        .unwrap();
        let canonical = parse("2023-10-25,170.65,173.06,170.65,171.80,57157115,AAPL");
        assert_eq!(
            ds.records().next().unwrap().commitment(),
            canonical.records().next().unwrap().commitment()
        );
    }

    #[test]
    fn test_quoted_fields_and_bom() {
        let ds = Dataset::parse(
            "\u{feff}date,open,high,low,close,volume,Name\n\
             \"2023-10-25\",\"170.65\",173.06,170.65,171.80,\"57157115.0\",\"AAPL\"\n",
        )
        .unwrap();
        assert_eq!(ds.malformed(), 0);
        assert_eq!(ds.records().next().unwrap().payload.volume, 57_157_115);
    }

    #[test]
    fn test_blank_lines_skipped_line_numbers_kept() {
        let ds = parse("\n2023-10-25,1,1,1,1,1,AAPL\n\n2023-10-26,1,1,1,1,1,AAPL\n");
        let lines: Vec<_> = ds.rows().iter().map(|r| r.line).collect();
        assert_eq!(lines, vec![3, 5]);
    }

    // ===== Header Errors =====

    #[test]
    fn test_missing_columns_abort() {
        let err = Dataset::parse("date,open,high,low,close,Name\n").unwrap_err();
        match err {
            DatasetError::MissingColumns(cols) => assert_eq!(cols, vec!["volume".to_string()]),
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(Dataset::parse(""), Err(DatasetError::MissingHeader)));
        assert!(matches!(
            Dataset::parse("date,open,high,low,close,volume,Name,symbol\n"),
            Err(DatasetError::DuplicateColumn(_))
        ));
    }

    // ===== Row Errors =====

    #[test]
    fn test_bad_rows_isolated() {
        let ds = parse(
            "2023-10-25,170.65,173.06,170.65,171.80,57157115,AAPL\n\
             2023/10/26,1,1,1,1,1,AAPL\n\
             2023-10-27,1,1,1,abc,1,AAPL\n\
             2023-10-28,1,1,1,1.123456789,1,AAPL\n\
             2023-10-29,1,1,-1,1,1,AAPL\n\
             2023-10-30,1,1,1,1,-5,AAPL\n\
             2023-10-31,1,1,1,1,1,\n\
             2023-11-01,1,1,1,1,1,AA PL\n\
             2023-11-02,1,1,1,1,AAPL\n\
             2023-11-03,1,1,1,1,1,\"AAPL\n\
             2023-11-04,1,1,1,1,1,MSFT\n",
        );
        let errors: Vec<_> = ds.rows().iter().map(|r| r.parsed.clone().err()).collect();
        assert!(errors[0].is_none());
        assert!(matches!(errors[1], Some(SchemaError::BadDate { .. })));
        assert!(matches!(
            errors[2],
            Some(SchemaError::BadValue { ref field, .. }) if field == "close"
        ));
        assert!(matches!(
            errors[3],
            Some(SchemaError::BadValue { ref field, .. }) if field == "close"
        ));
        assert!(matches!(
            errors[4],
            Some(SchemaError::Negative { ref field, .. }) if field == "low"
        ));
        assert!(matches!(
            errors[5],
            Some(SchemaError::Negative { ref field, .. }) if field == "volume"
        ));
        assert!(matches!(errors[6], Some(SchemaError::MissingValue { .. })));
        assert!(matches!(errors[7], Some(SchemaError::BadEntity { .. })));
        assert!(matches!(errors[8], Some(SchemaError::FieldCount { expected: 7, found: 6 })));
        assert!(matches!(errors[9], Some(SchemaError::UnterminatedQuote)));
        assert!(errors[10].is_none());
        assert_eq!(ds.records().count(), 2);
    }

    #[test]
    fn test_out_of_range_year_is_row_error() {
        let ds = parse(
            "-0001-01-01,1,1,1,1,1,AAPL\n\
             +10000-01-01,1,1,1,1,1,AAPL\n\
             2023-10-25,1,1,1,1,1,AAPL\n",
        );
        assert!(matches!(ds.rows()[0].parsed, Err(SchemaError::BadDate { .. })));
        assert!(matches!(ds.rows()[1].parsed, Err(SchemaError::BadDate { .. })));
        let records: Vec<_> = ds.records().collect();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].identity.date_code(), 20231025);
        // Every surviving row hashes without overflow.
        let _ = records[0].commitment();
    }

    #[test]
    fn test_duplicate_identity_flagged() {
        let ds = parse(
            "2023-10-25,1,1,1,1,1,AAPL\n\
             2023-10-25,2,2,2,2,2,AAPL\n",
        );
        assert!(ds.rows()[0].parsed.is_ok());
        assert_eq!(
            ds.rows()[1].parsed.clone().unwrap_err(),
            SchemaError::Duplicate { first_line: 2 }
        );
    }

    #[test]
    fn test_split_fields_escapes() {
        assert_eq!(
            split_fields(r#"a,"b,c","d""e",,"#).unwrap(),
            vec!["a", "b,c", "d\"e", "", ""]
        );
    }
}
