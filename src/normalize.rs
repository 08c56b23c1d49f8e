//! Recency/frequency derivation and population-wide quantile cutpoints

use chrono::NaiveDate;
use polars::prelude::*;
use tracing::{debug, info};

use crate::aggregate::{CustomerMetrics, FIRST_PURCHASE, LAST_PURCHASE, MONETARY, ORDER_COUNT};
use crate::data::{day_to_date, f64_values, i64_values};
use crate::error::{RfmError, Stage};

pub const REFERENCE_DAY: &str = "reference_day";
pub const RECENCY: &str = "recency";
pub const MONTHS_ACTIVE: &str = "months_active";
pub const FREQUENCY: &str = "frequency";

/// Number of buckets of the approximate quantile; yields `BUCKETS + 1` cutpoints
pub const QUANTILE_BUCKETS: usize = 100;

/// Percentile indices kept as scoring cutpoints
pub const SCORE_PERCENTILES: [usize; 5] = [20, 40, 60, 80, 100];

/// Customer metrics extended with recency and frequency
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedMetrics {
    pub metrics: CustomerMetrics,
    /// Days between the last purchase and the reference date
    pub recency: i64,
    pub months_active: i64,
    /// Orders per active month
    pub frequency: f64,
}

/// Five non-decreasing cut values (p20, p40, p60, p80, p100) for one metric
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cutpoints {
    cuts: [f64; 5],
}

impl Cutpoints {
    /// Build cutpoints from explicit values, rejecting a decreasing sequence
    pub fn new(cuts: [f64; 5]) -> crate::Result<Self> {
        if cuts.iter().any(|c| c.is_nan()) || cuts.windows(2).any(|w| w[0] > w[1]) {
            return Err(RfmError::InvalidInput(format!(
                "cutpoints must be non-decreasing, got {cuts:?}"
            )));
        }
        Ok(Self { cuts })
    }

    /// Cutpoints of one metric column over the whole population
    pub fn from_population(frame: &DataFrame, metric: &str) -> crate::Result<Self> {
        let percentiles = approx_percentiles(frame, metric)?.ok_or_else(|| {
            RfmError::InvalidInput(format!("no finite {metric} values to compute quantiles from"))
        })?;
        Self::new(SCORE_PERCENTILES.map(|p| percentiles[p]))
    }

    pub fn values(&self) -> [f64; 5] {
        self.cuts
    }

    /// Index of the first band whose upper bound is `>= value`
    ///
    /// Bands are (-inf, p20], (p20, p40], (p40, p60], (p60, p80], (p80, p100].
    /// Returns `None` above p100 or for NaN.
    pub fn band_index(&self, value: f64) -> Option<usize> {
        self.cuts.iter().position(|&cut| value <= cut)
    }
}

/// Cutpoints for all three metrics, computed once per run
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuantileCutpoints {
    pub recency: Cutpoints,
    pub frequency: Cutpoints,
    pub monetary: Cutpoints,
}

impl QuantileCutpoints {
    /// Compute all three metrics' cutpoints from a normalized frame
    pub fn from_frame(frame: &DataFrame) -> crate::Result<Self> {
        Ok(Self {
            recency: Cutpoints::from_population(frame, RECENCY)?,
            frequency: Cutpoints::from_population(frame, FREQUENCY)?,
            monetary: Cutpoints::from_population(frame, MONETARY)?,
        })
    }
}

/// The normalized customer population of one run
#[derive(Debug, Clone)]
pub struct NormalizedPopulation {
    /// One day past the latest purchase of any customer
    pub reference_date: NaiveDate,
    pub customers: Vec<NormalizedMetrics>,
    pub cutpoints: QuantileCutpoints,
}

/// Approximate percentiles over `QUANTILE_BUCKETS` buckets (indices 0..=100)
///
/// Polars computes each percentile with `QuantileMethod::Nearest`, i.e. the
/// sorted value at index `round((n - 1) * k / 100)`. NaN values are left out;
/// returns `None` when no value remains.
pub fn approx_percentiles(frame: &DataFrame, metric: &str) -> crate::Result<Option<Vec<f64>>> {
    let values = col(metric).cast(DataType::Float64);
    let finite = values.clone().filter(values.is_not_nan());

    let quantiles: Vec<Expr> = (0..=QUANTILE_BUCKETS)
        .map(|k| {
            finite
                .clone()
                .quantile(lit(k as f64 / QUANTILE_BUCKETS as f64), QuantileMethod::Nearest)
                .alias(format!("p{k}"))
        })
        .collect();
    let row = frame.clone().lazy().select(quantiles).collect()?;

    let mut percentiles = Vec::with_capacity(QUANTILE_BUCKETS + 1);
    for column in row.get_columns() {
        match column.as_materialized_series().f64()?.get(0) {
            Some(value) => percentiles.push(value),
            None => return Ok(None),
        }
    }
    Ok(Some(percentiles))
}

/// Stage 4: derive recency and frequency, then compute the cutpoints
///
/// The reference date is a single window maximum over every customer, so
/// recency values are comparable across the population.
pub fn normalize(metrics: &DataFrame) -> crate::Result<NormalizedPopulation> {
    let stage = Stage::Normalization;

    let last_day = col(LAST_PURCHASE).cast(DataType::Int32);
    let reference_day = last_day.clone().max() + lit(1);

    let year_of = |name: &str| col(name).dt().year().cast(DataType::Int32);
    let month_of = |name: &str| col(name).dt().month().cast(DataType::Int32);
    let day_of = |name: &str| col(name).dt().day().cast(DataType::Int32);

    // Whole calendar months between first and last purchase
    let months_between = (year_of(LAST_PURCHASE) - year_of(FIRST_PURCHASE)) * lit(12)
        + (month_of(LAST_PURCHASE) - month_of(FIRST_PURCHASE))
        - when(day_of(LAST_PURCHASE).lt(day_of(FIRST_PURCHASE)))
            .then(lit(1))
            .otherwise(lit(0));

    let frame = metrics
        .clone()
        .lazy()
        .with_columns([
            reference_day.clone().alias(REFERENCE_DAY),
            (reference_day - last_day).alias(RECENCY),
            (months_between + lit(1)).alias(MONTHS_ACTIVE),
        ])
        .with_column(
            (col(ORDER_COUNT).cast(DataType::Float64) / col(MONTHS_ACTIVE).cast(DataType::Float64))
                .alias(FREQUENCY),
        )
        .collect()?;

    let reference = i64_values(&frame, REFERENCE_DAY, stage)?
        .first()
        .copied()
        .ok_or(RfmError::EmptyDataset { stage })?;
    let reference_date = day_to_date(reference)
        .ok_or_else(|| RfmError::integrity(stage, "reference date", "out of range"))?;

    let base = CustomerMetrics::from_frame(&frame)?;
    let recency = i64_values(&frame, RECENCY, stage)?;
    let months = i64_values(&frame, MONTHS_ACTIVE, stage)?;
    let frequency = f64_values(&frame, FREQUENCY, stage)?;

    let mut customers = Vec::with_capacity(base.len());
    for (row, metrics) in base.into_iter().enumerate() {
        if months[row] < 1 {
            return Err(RfmError::integrity(
                stage,
                format!("customer {}", metrics.customer_id),
                format!("{} active months", months[row]),
            ));
        }
        customers.push(NormalizedMetrics {
            metrics,
            recency: recency[row],
            months_active: months[row],
            frequency: frequency[row],
        });
    }
    customers.sort_by(|a, b| a.metrics.customer_id.cmp(&b.metrics.customer_id));

    let cutpoints = QuantileCutpoints::from_frame(&frame)?;

    info!(%reference_date, customers = customers.len(), "normalized customer metrics");
    debug!(
        recency = ?cutpoints.recency.values(),
        frequency = ?cutpoints.frequency.values(),
        monetary = ?cutpoints.monetary.values(),
        "quantile cutpoints"
    );

    Ok(NormalizedPopulation {
        reference_date,
        customers,
        cutpoints,
    })
}
