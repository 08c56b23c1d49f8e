//! Error taxonomy for the RFM pipeline

use std::fmt;

use polars::prelude::PolarsError;

/// Pipeline stage that raised an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Load,
    InvoiceAggregation,
    CustomerAggregation,
    Normalization,
    Scoring,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Load => "load",
            Stage::InvoiceAggregation => "invoice aggregation",
            Stage::CustomerAggregation => "customer aggregation",
            Stage::Normalization => "normalization",
            Stage::Scoring => "scoring",
        };
        f.write_str(name)
    }
}

/// Errors that abort a pipeline run.
#[derive(Debug, thiserror::Error)]
pub enum RfmError {
    #[error("data integrity error during {stage} ({entity}): {reason}")]
    DataIntegrity {
        stage: Stage,
        entity: String,
        reason: String,
    },

    #[error("undefined {metric} score during {stage} for customer {customer_id}: value {value} lies outside every quantile band")]
    UndefinedScore {
        stage: Stage,
        customer_id: String,
        metric: &'static str,
        value: f64,
    },

    #[error("segment rule table has no rule for rScore={r_score}, fmScore={fm_score}")]
    IncompleteRuleTable { r_score: u8, fm_score: u8 },

    #[error("segment rule table maps rScore={r_score}, fmScore={fm_score} to both {first} and {second}")]
    OverlappingRule {
        r_score: u8,
        fm_score: u8,
        first: String,
        second: String,
    },

    #[error("no rows left after {stage}")]
    EmptyDataset { stage: Stage },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("query engine error: {0}")]
    Engine(#[from] PolarsError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("chart rendering failed: {0}")]
    Render(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("summary serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl RfmError {
    pub fn integrity(stage: Stage, entity: impl Into<String>, reason: impl Into<String>) -> Self {
        RfmError::DataIntegrity {
            stage,
            entity: entity.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integrity_message_names_stage_and_entity() {
        let err = RfmError::integrity(Stage::Load, "invoice 536365", "quantity is missing");
        let msg = err.to_string();
        assert!(msg.contains("load"));
        assert!(msg.contains("invoice 536365"));
        assert!(msg.contains("quantity is missing"));
    }

    #[test]
    fn test_undefined_score_names_customer() {
        let err = RfmError::UndefinedScore {
            stage: Stage::Scoring,
            customer_id: "17850".to_string(),
            metric: "monetary",
            value: f64::NAN,
        };
        let msg = err.to_string();
        assert!(msg.contains("customer 17850"));
        assert!(msg.contains("during scoring"));
    }

    #[test]
    fn test_render_error_keeps_source() {
        use std::error::Error;

        let cause = std::io::Error::new(std::io::ErrorKind::NotFound, "no such directory");
        let err = RfmError::Render(Box::new(cause));
        assert!(err.to_string().contains("no such directory"));
        assert!(err.source().is_some());
    }
}
