//! Quantile band scoring and segment assignment

use crate::error::{RfmError, Stage};
use crate::normalize::{Cutpoints, NormalizedMetrics, QuantileCutpoints};
use crate::segment::{Segment, SegmentRules};

/// Final scores and segment for one customer
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredCustomer {
    pub customer_id: String,
    pub r_score: u8,
    pub f_score: u8,
    pub m_score: u8,
    pub fm_score: u8,
    pub recency: i64,
    pub frequency: f64,
    pub monetary: f64,
    pub segment: Segment,
}

/// Score of a value that rises with the metric: band 0 scores 1, band 4 scores 5
pub fn ascending_score(cutpoints: &Cutpoints, value: f64) -> Option<u8> {
    cutpoints.band_index(value).map(|band| band as u8 + 1)
}

/// Score of a value that falls with the metric: band 0 scores 5, band 4 scores 1
pub fn descending_score(cutpoints: &Cutpoints, value: f64) -> Option<u8> {
    cutpoints.band_index(value).map(|band| 5 - band as u8)
}

/// Combined frequency-monetary score, `(f + m) / 2` rounded half up
///
/// Both inputs are band scores in `1..=5`.
pub fn fm_score(f_score: u8, m_score: u8) -> u8 {
    debug_assert!((1..=5).contains(&f_score), "fScore out of range: {f_score}");
    debug_assert!((1..=5).contains(&m_score), "mScore out of range: {m_score}");
    (f_score + m_score + 1) / 2
}

/// Scores customers against one run's cutpoints and rule table
#[derive(Debug, Clone, Copy)]
pub struct Scorer<'a> {
    cutpoints: &'a QuantileCutpoints,
    rules: &'a SegmentRules,
}

impl<'a> Scorer<'a> {
    pub fn new(cutpoints: &'a QuantileCutpoints, rules: &'a SegmentRules) -> Self {
        Self { cutpoints, rules }
    }

    pub fn score(&self, customer: &NormalizedMetrics) -> crate::Result<ScoredCustomer> {
        self.score_values(
            &customer.metrics.customer_id,
            customer.recency,
            customer.frequency,
            customer.metrics.monetary,
        )
    }

    /// Score raw metric values; also used for hypothetical customers
    pub fn score_values(
        &self,
        customer_id: &str,
        recency: i64,
        frequency: f64,
        monetary: f64,
    ) -> crate::Result<ScoredCustomer> {
        let undefined = |metric: &'static str, value: f64| RfmError::UndefinedScore {
            stage: Stage::Scoring,
            customer_id: customer_id.to_string(),
            metric,
            value,
        };

        let r_score = descending_score(&self.cutpoints.recency, recency as f64)
            .ok_or_else(|| undefined("recency", recency as f64))?;
        let f_score = ascending_score(&self.cutpoints.frequency, frequency)
            .ok_or_else(|| undefined("frequency", frequency))?;
        let m_score = ascending_score(&self.cutpoints.monetary, monetary)
            .ok_or_else(|| undefined("monetary", monetary))?;
        let fm_score = fm_score(f_score, m_score);

        Ok(ScoredCustomer {
            customer_id: customer_id.to_string(),
            r_score,
            f_score,
            m_score,
            fm_score,
            recency,
            frequency,
            monetary,
            segment: self.rules.segment(r_score, fm_score)?,
        })
    }
}
