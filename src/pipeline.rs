//! End-to-end RFM pipeline and report output

use std::collections::BTreeMap;
use std::fs::File;
use std::path::Path;

use chrono::NaiveDate;
use polars::prelude::*;
use serde::Serialize;
use tracing::info;

use crate::aggregate::customer_metrics;
use crate::data::{load_sales_lines, sales_frame, LoadOptions, SalesLine};
use crate::normalize::{normalize, QuantileCutpoints};
use crate::score::{ScoredCustomer, Scorer};
use crate::segment::{Segment, SegmentRules};

/// Output of one pipeline run
#[derive(Debug, Clone)]
pub struct RfmReport {
    pub reference_date: NaiveDate,
    pub cutpoints: QuantileCutpoints,
    pub rules: SegmentRules,
    /// One entry per customer, sorted by customer id
    pub customers: Vec<ScoredCustomer>,
}

/// Serializable run summary
#[derive(Debug, Serialize)]
pub struct RunSummary {
    pub reference_date: String,
    pub customers: usize,
    pub cutpoints: CutpointSummary,
    pub segments: BTreeMap<String, usize>,
}

#[derive(Debug, Serialize)]
pub struct CutpointSummary {
    pub recency: [f64; 5],
    pub frequency: [f64; 5],
    pub monetary: [f64; 5],
}

/// Load a CSV ledger and run every stage over it
pub fn run_file(file_path: &Path, options: &LoadOptions) -> crate::Result<RfmReport> {
    let lines = load_sales_lines(file_path, options)?;
    info!(lines = lines.len(), "loaded sales lines");
    run(&lines)
}

/// Run every stage over in-memory sales lines
///
/// Any failing stage aborts the run; no partial report is produced.
pub fn run(lines: &[SalesLine]) -> crate::Result<RfmReport> {
    let rules = SegmentRules::standard()?;

    let sales = sales_frame(lines)?;
    let metrics = customer_metrics(&sales)?;
    let population = normalize(&metrics)?;

    let scorer = Scorer::new(&population.cutpoints, &rules);
    let customers = population
        .customers
        .iter()
        .map(|customer| scorer.score(customer))
        .collect::<crate::Result<Vec<_>>>()?;

    info!(customers = customers.len(), "scored and segmented customers");

    Ok(RfmReport {
        reference_date: population.reference_date,
        cutpoints: population.cutpoints,
        rules,
        customers,
    })
}

impl RfmReport {
    /// Score a hypothetical customer against this run's cutpoints
    pub fn predict(&self, recency: i64, frequency: f64, monetary: f64) -> crate::Result<ScoredCustomer> {
        Scorer::new(&self.cutpoints, &self.rules).score_values("<predicted>", recency, frequency, monetary)
    }

    /// Customer count per segment, every segment present
    pub fn segment_counts(&self) -> BTreeMap<Segment, usize> {
        let mut counts: BTreeMap<Segment, usize> = Segment::ALL.iter().map(|&s| (s, 0)).collect();
        for customer in &self.customers {
            *counts.entry(customer.segment).or_default() += 1;
        }
        counts
    }

    pub fn customer(&self, customer_id: &str) -> Option<&ScoredCustomer> {
        self.customers
            .binary_search_by(|c| c.customer_id.as_str().cmp(customer_id))
            .ok()
            .map(|idx| &self.customers[idx])
    }

    /// The output table, one row per customer
    pub fn to_frame(&self) -> crate::Result<DataFrame> {
        let c = &self.customers;
        let frame = df!(
            "customer_id" => c.iter().map(|s| s.customer_id.as_str()).collect::<Vec<_>>(),
            "r_score" => c.iter().map(|s| s.r_score as i32).collect::<Vec<_>>(),
            "f_score" => c.iter().map(|s| s.f_score as i32).collect::<Vec<_>>(),
            "m_score" => c.iter().map(|s| s.m_score as i32).collect::<Vec<_>>(),
            "fm_score" => c.iter().map(|s| s.fm_score as i32).collect::<Vec<_>>(),
            "recency" => c.iter().map(|s| s.recency).collect::<Vec<_>>(),
            "frequency" => c.iter().map(|s| s.frequency).collect::<Vec<_>>(),
            "monetary" => c.iter().map(|s| s.monetary).collect::<Vec<_>>(),
            "segment" => c.iter().map(|s| s.segment.label()).collect::<Vec<_>>()
        )?;
        Ok(frame)
    }

    /// Write the scored customers as CSV
    pub fn write_csv(&self, output_path: &Path) -> crate::Result<()> {
        let mut frame = self.to_frame()?;
        let mut file = File::create(output_path)?;
        CsvWriter::new(&mut file)
            .include_header(true)
            .finish(&mut frame)?;
        info!(path = %output_path.display(), rows = frame.height(), "wrote scored customers");
        Ok(())
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary {
            reference_date: self.reference_date.to_string(),
            customers: self.customers.len(),
            cutpoints: CutpointSummary {
                recency: self.cutpoints.recency.values(),
                frequency: self.cutpoints.frequency.values(),
                monetary: self.cutpoints.monetary.values(),
            },
            segments: self
                .segment_counts()
                .into_iter()
                .map(|(segment, count)| (segment.label().to_string(), count))
                .collect(),
        }
    }

    /// Write the run summary as pretty-printed JSON
    pub fn write_summary(&self, output_path: &Path) -> crate::Result<()> {
        let file = File::create(output_path)?;
        serde_json::to_writer_pretty(file, &self.summary())?;
        info!(path = %output_path.display(), "wrote run summary");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(invoice: &str, customer: &str, price: f64, day: u32) -> SalesLine {
        SalesLine {
            invoice_id: invoice.to_string(),
            customer_id: customer.to_string(),
            stock_code: "71053".to_string(),
            quantity: 1,
            unit_price: price,
            invoice_date: NaiveDate::from_ymd_opt(2011, 3, day).unwrap(),
        }
    }

    fn sample_lines() -> Vec<SalesLine> {
        vec![
            line("I1", "C1", 100.0, 1),
            line("I2", "C1", 300.0, 28),
            line("I3", "C2", 20.0, 2),
            line("I4", "C3", 80.0, 10),
            line("I5", "C3", 40.0, 20),
            line("I6", "C4", 5.0, 25),
        ]
    }

    #[test]
    fn test_run_scores_every_customer() {
        let report = run(&sample_lines()).unwrap();
        assert_eq!(report.customers.len(), 4);
        assert_eq!(report.reference_date, NaiveDate::from_ymd_opt(2011, 3, 29).unwrap());

        for c in &report.customers {
            for score in [c.r_score, c.f_score, c.m_score, c.fm_score] {
                assert!((1..=5).contains(&score));
            }
        }

        let ids: Vec<&str> = report.customers.iter().map(|c| c.customer_id.as_str()).collect();
        assert_eq!(ids, vec!["C1", "C2", "C3", "C4"]);
    }

    #[test]
    fn test_segment_counts_cover_all_segments() {
        let report = run(&sample_lines()).unwrap();
        let counts = report.segment_counts();
        assert_eq!(counts.len(), Segment::ALL.len());
        assert_eq!(counts.values().sum::<usize>(), 4);
    }

    #[test]
    fn test_to_frame_and_lookup() {
        let report = run(&sample_lines()).unwrap();
        let frame = report.to_frame().unwrap();
        assert_eq!(frame.height(), 4);
        assert_eq!(frame.width(), 9);

        let c1 = report.customer("C1").unwrap();
        assert_eq!(c1.r_score, 5);
        assert!(report.customer("nobody").is_none());
    }

    #[test]
    fn test_predict_uses_population_cutpoints() {
        let report = run(&sample_lines()).unwrap();
        let predicted = report.predict(1, 2.0, 400.0).unwrap();
        assert_eq!(predicted.r_score, 5);
        assert_eq!(predicted.m_score, 5);
        assert!(report.predict(1, 2.0, 10_000.0).is_err());
    }

    #[test]
    fn test_summary_serializes() {
        let report = run(&sample_lines()).unwrap();
        let json = serde_json::to_value(report.summary()).unwrap();
        assert_eq!(json["customers"], 4);
        assert_eq!(json["reference_date"], "2011-03-29");
        assert_eq!(json["segments"].as_object().unwrap().len(), 11);
    }
}
