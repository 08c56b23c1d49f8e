//! Command-line interface definitions and argument parsing

use clap::Parser;

use crate::data::{LoadOptions, DEFAULT_DATE_FORMAT};
use crate::error::RfmError;

/// RFM scoring and customer segmentation over a sales ledger
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to the input CSV file
    #[arg(short, long, default_value = "data.csv")]
    pub input: String,

    /// Output path for the scored customers CSV
    #[arg(short, long, default_value = "rfm_scores.csv")]
    pub output: String,

    /// Optional path for a JSON run summary
    #[arg(short, long)]
    pub summary: Option<String>,

    /// Optional path for a PNG chart of segment sizes
    #[arg(long)]
    pub plot: Option<String>,

    /// chrono format of the InvoiceDate column (RFC 3339 is always accepted)
    #[arg(long, default_value = DEFAULT_DATE_FORMAT)]
    pub date_format: String,

    /// Drop sales lines without a CustomerID instead of failing
    #[arg(long)]
    pub skip_anonymous: bool,

    /// Prediction mode: provide R,F,M values as comma-separated string
    /// Example: --predict "30,1.5,500.0" for Recency=30 days, Frequency=1.5, Monetary=500.0
    #[arg(short, long)]
    pub predict: Option<String>,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

impl Args {
    /// Parse RFM values from the predict string
    /// Expected format: "recency,frequency,monetary"
    pub fn parse_rfm_values(&self) -> crate::Result<Option<(i64, f64, f64)>> {
        let Some(ref predict_str) = self.predict else {
            return Ok(None);
        };

        let parts: Vec<&str> = predict_str.split(',').map(str::trim).collect();
        if parts.len() != 3 {
            return Err(RfmError::InvalidInput(
                "predict values must be in format 'recency,frequency,monetary'".to_string(),
            ));
        }

        let recency: i64 = parts[0]
            .parse()
            .map_err(|_| RfmError::InvalidInput(format!("invalid recency value: {}", parts[0])))?;
        if recency < 0 {
            return Err(RfmError::InvalidInput(format!("recency cannot be negative: {recency}")));
        }
        let frequency: f64 = parts[1]
            .parse()
            .map_err(|_| RfmError::InvalidInput(format!("invalid frequency value: {}", parts[1])))?;
        let monetary: f64 = parts[2]
            .parse()
            .map_err(|_| RfmError::InvalidInput(format!("invalid monetary value: {}", parts[2])))?;

        Ok(Some((recency, frequency, monetary)))
    }

    pub fn load_options(&self) -> LoadOptions {
        LoadOptions {
            date_format: self.date_format.clone(),
            skip_anonymous: self.skip_anonymous,
        }
    }
}
