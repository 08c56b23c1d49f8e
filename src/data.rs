//! Sales ledger loading and frame construction using Polars

use std::path::Path;

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeDelta, Utc};
use polars::prelude::*;
use tracing::{debug, warn};

use crate::error::{RfmError, Stage};

/// Default `chrono` format for the `InvoiceDate` column
pub const DEFAULT_DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

const FALLBACK_DATETIME_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S", "%m/%d/%Y %H:%M"];

// Source CSV header names
const SRC_INVOICE: &str = "InvoiceNo";
const SRC_STOCK_CODE: &str = "StockCode";
const SRC_QUANTITY: &str = "Quantity";
const SRC_INVOICE_DATE: &str = "InvoiceDate";
const SRC_UNIT_PRICE: &str = "UnitPrice";
const SRC_CUSTOMER: &str = "CustomerID";

// Column names of the frames passed between stages
pub const INVOICE_ID: &str = "invoice_id";
pub const CUSTOMER_ID: &str = "customer_id";
pub const STOCK_CODE: &str = "stock_code";
pub const QUANTITY: &str = "quantity";
pub const UNIT_PRICE: &str = "unit_price";
pub const INVOICE_DATE: &str = "invoice_date";

/// One line of the sales ledger
#[derive(Debug, Clone, PartialEq)]
pub struct SalesLine {
    pub invoice_id: String,
    pub customer_id: String,
    pub stock_code: String,
    pub quantity: i64,
    pub unit_price: f64,
    pub invoice_date: NaiveDate,
}

impl SalesLine {
    /// Line value: quantity times unit price
    pub fn amount(&self) -> f64 {
        self.quantity as f64 * self.unit_price
    }
}

/// Options controlling how the ledger CSV is read
#[derive(Debug, Clone)]
pub struct LoadOptions {
    /// `chrono` format tried for `InvoiceDate` after RFC 3339
    pub date_format: String,
    /// Drop lines without a customer instead of failing the run
    pub skip_anonymous: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            date_format: DEFAULT_DATE_FORMAT.to_string(),
            skip_anonymous: false,
        }
    }
}

/// Load and validate every sales line from a CSV ledger
///
/// # Arguments
/// * `file_path` - Path to the CSV file
/// * `options` - Date format and anonymous-line policy
///
/// # Returns
/// * Parsed `SalesLine`s in file order
pub fn load_sales_lines(file_path: &Path, options: &LoadOptions) -> crate::Result<Vec<SalesLine>> {
    // Read every column as text; typing happens per row so failures can name the invoice
    let raw = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(0))
        .try_into_reader_with_file_path(Some(file_path.to_path_buf()))?
        .finish()?;

    debug!(rows = raw.height(), path = %file_path.display(), "read sales ledger");

    let invoices = text_column(&raw, SRC_INVOICE)?;
    let stock_codes = text_column(&raw, SRC_STOCK_CODE)?;
    let quantities = text_column(&raw, SRC_QUANTITY)?;
    let dates = text_column(&raw, SRC_INVOICE_DATE)?;
    let prices = text_column(&raw, SRC_UNIT_PRICE)?;
    let customers = text_column(&raw, SRC_CUSTOMER)?;

    let mut lines = Vec::with_capacity(raw.height());
    let mut anonymous = 0usize;

    for row in 0..raw.height() {
        let invoice_id = match present(invoices.get(row)) {
            Some(id) => id.to_string(),
            None => {
                return Err(RfmError::integrity(
                    Stage::Load,
                    format!("line {}", row + 1),
                    "invoice number is missing",
                ))
            }
        };
        let entity = format!("invoice {invoice_id}");

        let customer_id = match present(customers.get(row)) {
            Some(id) => id.to_string(),
            None if options.skip_anonymous => {
                anonymous += 1;
                continue;
            }
            None => {
                return Err(RfmError::integrity(Stage::Load, entity, "customer id is missing"));
            }
        };

        let quantity = present(quantities.get(row))
            .ok_or_else(|| RfmError::integrity(Stage::Load, entity.clone(), "quantity is missing"))?
            .parse::<i64>()
            .map_err(|e| RfmError::integrity(Stage::Load, entity.clone(), format!("invalid quantity: {e}")))?;

        let unit_price = present(prices.get(row))
            .ok_or_else(|| RfmError::integrity(Stage::Load, entity.clone(), "unit price is missing"))?
            .parse::<f64>()
            .map_err(|e| RfmError::integrity(Stage::Load, entity.clone(), format!("invalid unit price: {e}")))?;
        if !unit_price.is_finite() {
            return Err(RfmError::integrity(Stage::Load, entity, "unit price is not finite"));
        }

        let raw_date = present(dates.get(row))
            .ok_or_else(|| RfmError::integrity(Stage::Load, entity.clone(), "invoice date is missing"))?;
        let invoice_date = parse_invoice_date(raw_date, &options.date_format).ok_or_else(|| {
            RfmError::integrity(Stage::Load, entity.clone(), format!("unparseable invoice date '{raw_date}'"))
        })?;

        lines.push(SalesLine {
            invoice_id,
            customer_id,
            stock_code: present(stock_codes.get(row)).unwrap_or_default().to_string(),
            quantity,
            unit_price,
            invoice_date,
        });
    }

    if anonymous > 0 {
        warn!(skipped = anonymous, "dropped sales lines without a customer id");
    }

    if lines.is_empty() {
        return Err(RfmError::EmptyDataset { stage: Stage::Load });
    }

    Ok(lines)
}

/// Build the typed sales frame every downstream stage reads
pub fn sales_frame(lines: &[SalesLine]) -> crate::Result<DataFrame> {
    if lines.is_empty() {
        return Err(RfmError::EmptyDataset { stage: Stage::Load });
    }

    let invoice_ids: Vec<&str> = lines.iter().map(|l| l.invoice_id.as_str()).collect();
    let customer_ids: Vec<&str> = lines.iter().map(|l| l.customer_id.as_str()).collect();
    let stock_codes: Vec<&str> = lines.iter().map(|l| l.stock_code.as_str()).collect();
    let quantities: Vec<i64> = lines.iter().map(|l| l.quantity).collect();
    let unit_prices: Vec<f64> = lines.iter().map(|l| l.unit_price).collect();
    let invoice_days: Vec<i32> = lines.iter().map(|l| date_to_day(l.invoice_date)).collect();

    let frame = df!(
        INVOICE_ID => invoice_ids,
        CUSTOMER_ID => customer_ids,
        STOCK_CODE => stock_codes,
        QUANTITY => quantities,
        UNIT_PRICE => unit_prices,
        INVOICE_DATE => invoice_days
    )?
    .lazy()
    .with_column(col(INVOICE_DATE).cast(DataType::Date))
    .collect()?;

    Ok(frame)
}

/// Parse an invoice timestamp and keep only its calendar date
pub fn parse_invoice_date(raw: &str, format: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.date_naive());
    }
    if let Ok(parsed) = NaiveDateTime::parse_from_str(raw, format) {
        return Some(parsed.date());
    }
    if let Ok(parsed) = NaiveDate::parse_from_str(raw, format) {
        return Some(parsed);
    }
    FALLBACK_DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|parsed| parsed.date())
        .or_else(|| NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok())
}

/// Days since the Unix epoch, the physical representation of a Polars `Date`
pub fn date_to_day(date: NaiveDate) -> i32 {
    (date - epoch()).num_days() as i32
}

/// Inverse of [`date_to_day`]
pub fn day_to_date(day: i64) -> Option<NaiveDate> {
    epoch().checked_add_signed(TimeDelta::try_days(day)?)
}

fn epoch() -> NaiveDate {
    DateTime::<Utc>::UNIX_EPOCH.date_naive()
}

fn present(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn text_column<'a>(frame: &'a DataFrame, name: &str) -> crate::Result<&'a StringChunked> {
    let column = frame
        .column(name)
        .map_err(|_| RfmError::InvalidInput(format!("sales ledger has no '{name}' column")))?;
    Ok(column.as_materialized_series().str()?)
}

/// Read a column as owned strings, treating nulls as a data error
pub(crate) fn string_values(frame: &DataFrame, name: &str, stage: Stage) -> crate::Result<Vec<String>> {
    let column = frame.column(name)?;
    column
        .as_materialized_series()
        .str()?
        .into_iter()
        .enumerate()
        .map(|(row, value)| {
            value
                .map(str::to_string)
                .ok_or_else(|| RfmError::integrity(stage, format!("row {row}"), format!("{name} is null")))
        })
        .collect()
}

/// Read a numeric column as `i64`
pub(crate) fn i64_values(frame: &DataFrame, name: &str, stage: Stage) -> crate::Result<Vec<i64>> {
    let column = frame.column(name)?.cast(&DataType::Int64)?;
    column
        .as_materialized_series()
        .i64()?
        .into_iter()
        .enumerate()
        .map(|(row, value)| {
            value.ok_or_else(|| RfmError::integrity(stage, format!("row {row}"), format!("{name} is null")))
        })
        .collect()
}

/// Read a numeric column as `f64`
pub(crate) fn f64_values(frame: &DataFrame, name: &str, stage: Stage) -> crate::Result<Vec<f64>> {
    let column = frame.column(name)?.cast(&DataType::Float64)?;
    column
        .as_materialized_series()
        .f64()?
        .into_iter()
        .enumerate()
        .map(|(row, value)| {
            value.ok_or_else(|| RfmError::integrity(stage, format!("row {row}"), format!("{name} is null")))
        })
        .collect()
}

/// Read a `Date` column as calendar dates
pub(crate) fn date_values(frame: &DataFrame, name: &str, stage: Stage) -> crate::Result<Vec<NaiveDate>> {
    i64_values(frame, name, stage)?
        .into_iter()
        .enumerate()
        .map(|(row, day)| {
            day_to_date(day).ok_or_else(|| {
                RfmError::integrity(stage, format!("row {row}"), format!("{name} is out of range"))
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const HEADER: &str = "InvoiceNo,StockCode,Description,Quantity,InvoiceDate,UnitPrice,CustomerID,Country";

    fn create_test_csv(rows: &[&str]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "{HEADER}").unwrap();
        for row in rows {
            writeln!(file, "{row}").unwrap();
        }
        file
    }

    #[test]
    fn test_load_sales_lines() {
        let file = create_test_csv(&[
            "536365,85123A,WHITE HANGING HEART T-LIGHT HOLDER,6,2010-12-01T08:26:00Z,2.55,17850,United Kingdom",
            "536365,71053,WHITE METAL LANTERN,6,2010-12-01T08:26:00,3.39,17850,United Kingdom",
            "536367,84406B,CREAM CUPID HEARTS COAT HANGER,8,2010-12-01 08:34:00,2.75,13047,United Kingdom",
        ]);

        let lines = load_sales_lines(file.path(), &LoadOptions::default()).unwrap();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0].invoice_id, "536365");
        assert_eq!(lines[2].customer_id, "13047");
        assert_eq!(lines[1].invoice_date, NaiveDate::from_ymd_opt(2010, 12, 1).unwrap());
        assert!((lines[0].amount() - 15.3).abs() < 1e-9);
    }

    #[test]
    fn test_missing_quantity_is_integrity_error() {
        let file = create_test_csv(&["536365,85123A,HOLDER,,2010-12-01T08:26:00,2.55,17850,United Kingdom"]);

        let err = load_sales_lines(file.path(), &LoadOptions::default()).unwrap_err();
        match err {
            RfmError::DataIntegrity { stage, entity, .. } => {
                assert_eq!(stage, Stage::Load);
                assert_eq!(entity, "invoice 536365");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_bad_date_is_integrity_error() {
        let file = create_test_csv(&["536365,85123A,HOLDER,6,yesterday,2.55,17850,United Kingdom"]);

        let err = load_sales_lines(file.path(), &LoadOptions::default()).unwrap_err();
        assert!(matches!(err, RfmError::DataIntegrity { .. }));
        assert!(err.to_string().contains("yesterday"));
    }

    #[test]
    fn test_anonymous_lines() {
        let rows = [
            "536365,85123A,HOLDER,6,2010-12-01T08:26:00,2.55,,United Kingdom",
            "536366,22633,HAND WARMER,6,2010-12-01T08:28:00,1.85,17850,United Kingdom",
        ];

        let file = create_test_csv(&rows);
        assert!(load_sales_lines(file.path(), &LoadOptions::default()).is_err());

        let options = LoadOptions {
            skip_anonymous: true,
            ..LoadOptions::default()
        };
        let lines = load_sales_lines(file.path(), &options).unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].customer_id, "17850");
    }

    #[test]
    fn test_custom_date_format() {
        let parsed = parse_invoice_date("01/12/2010", "%d/%m/%Y");
        assert_eq!(parsed, NaiveDate::from_ymd_opt(2010, 12, 1));

        let parsed = parse_invoice_date("12/1/2010 8:26", DEFAULT_DATE_FORMAT);
        assert_eq!(parsed, NaiveDate::from_ymd_opt(2010, 12, 1));
    }

    #[test]
    fn test_day_conversion() {
        let date = NaiveDate::from_ymd_opt(2011, 12, 9).unwrap();
        assert_eq!(day_to_date(date_to_day(date) as i64), Some(date));
        assert_eq!(date_to_day(NaiveDate::from_ymd_opt(1970, 1, 2).unwrap()), 1);
    }

    #[test]
    fn test_sales_frame() {
        let date = NaiveDate::from_ymd_opt(2011, 1, 3).unwrap();
        let lines = vec![SalesLine {
            invoice_id: "A1".to_string(),
            customer_id: "C1".to_string(),
            stock_code: "S1".to_string(),
            quantity: 2,
            unit_price: 1.5,
            invoice_date: date,
        }];

        let frame = sales_frame(&lines).unwrap();
        assert_eq!(frame.height(), 1);
        assert_eq!(frame.column(INVOICE_DATE).unwrap().dtype(), &DataType::Date);
        assert_eq!(date_values(&frame, INVOICE_DATE, Stage::Load).unwrap(), vec![date]);
        assert!(sales_frame(&[]).is_err());
    }
}
