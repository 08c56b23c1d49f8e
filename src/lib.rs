//! RfmForge: RFM (Recency, Frequency, Monetary) scoring and customer segmentation
//!
//! A batch pipeline over a sales ledger: line valuation, invoice totals,
//! per-customer metrics, quantile normalization, and scoring into one of
//! eleven marketing personas. Bulk table work runs on Polars.

pub mod aggregate;
pub mod cli;
pub mod data;
pub mod error;
pub mod normalize;
pub mod pipeline;
pub mod score;
pub mod segment;
pub mod viz;

// Re-export public items for easier access
pub use cli::Args;
pub use data::{load_sales_lines, sales_frame, LoadOptions, SalesLine};
pub use error::{RfmError, Stage};
pub use normalize::{Cutpoints, QuantileCutpoints};
pub use pipeline::{run, run_file, RfmReport};
pub use score::{ScoredCustomer, Scorer};
pub use segment::{Segment, SegmentRules};
pub use viz::create_segment_chart;

/// Common result type used throughout the library
pub type Result<T> = std::result::Result<T, RfmError>;
