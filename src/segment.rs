//! Segment rule table mapping (rScore, fmScore) to a marketing persona

use std::fmt;
use std::ops::RangeInclusive;

use crate::error::RfmError;

/// One of the eleven customer personas
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Segment {
    Champions,
    LoyalCustomers,
    PotentialLoyalists,
    RecentCustomers,
    Promising,
    CustomersNeedingAttention,
    AboutToSleep,
    AtRisk,
    CantLoseThem,
    Hibernating,
    Lost,
}

impl Segment {
    pub const ALL: [Segment; 11] = [
        Segment::Champions,
        Segment::LoyalCustomers,
        Segment::PotentialLoyalists,
        Segment::RecentCustomers,
        Segment::Promising,
        Segment::CustomersNeedingAttention,
        Segment::AboutToSleep,
        Segment::AtRisk,
        Segment::CantLoseThem,
        Segment::Hibernating,
        Segment::Lost,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Segment::Champions => "Champions",
            Segment::LoyalCustomers => "Loyal Customers",
            Segment::PotentialLoyalists => "Potential Loyalists",
            Segment::RecentCustomers => "Recent Customers",
            Segment::Promising => "Promising",
            Segment::CustomersNeedingAttention => "Customers Needing Attention",
            Segment::AboutToSleep => "About to Sleep",
            Segment::AtRisk => "At Risk",
            Segment::CantLoseThem => "Can't Lose Them",
            Segment::Hibernating => "Hibernating",
            Segment::Lost => "Lost",
        }
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A rectangle of (rScore, fmScore) cells assigned to one segment
#[derive(Debug, Clone)]
pub struct SegmentRule {
    pub r_scores: RangeInclusive<u8>,
    pub fm_scores: RangeInclusive<u8>,
    pub segment: Segment,
}

const fn rule(r_scores: RangeInclusive<u8>, fm_scores: RangeInclusive<u8>, segment: Segment) -> SegmentRule {
    SegmentRule {
        r_scores,
        fm_scores,
        segment,
    }
}

/// The standard RFM persona rules
pub const STANDARD_RULES: [SegmentRule; 17] = [
    rule(5..=5, 4..=5, Segment::Champions),
    rule(4..=4, 5..=5, Segment::Champions),
    rule(5..=5, 3..=3, Segment::LoyalCustomers),
    rule(4..=4, 4..=4, Segment::LoyalCustomers),
    rule(3..=3, 4..=5, Segment::LoyalCustomers),
    rule(4..=5, 2..=2, Segment::PotentialLoyalists),
    rule(3..=4, 3..=3, Segment::PotentialLoyalists),
    rule(5..=5, 1..=1, Segment::RecentCustomers),
    rule(3..=4, 1..=1, Segment::Promising),
    rule(3..=3, 2..=2, Segment::CustomersNeedingAttention),
    rule(2..=2, 2..=3, Segment::CustomersNeedingAttention),
    rule(2..=2, 1..=1, Segment::AboutToSleep),
    rule(2..=2, 4..=5, Segment::AtRisk),
    rule(1..=1, 3..=3, Segment::AtRisk),
    rule(1..=1, 4..=5, Segment::CantLoseThem),
    rule(1..=1, 2..=2, Segment::Hibernating),
    rule(1..=1, 1..=1, Segment::Lost),
];

/// Total lookup over {1..5} x {1..5}
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentRules {
    table: [[Segment; 5]; 5],
}

impl SegmentRules {
    /// Build the lookup table, rejecting gaps and overlapping rules
    pub fn from_rules(rules: &[SegmentRule]) -> crate::Result<Self> {
        let mut cells: [[Option<Segment>; 5]; 5] = [[None; 5]; 5];

        for rule in rules {
            for r in rule.r_scores.clone() {
                for fm in rule.fm_scores.clone() {
                    let (ri, fi) = cell_index(r, fm)?;
                    if let Some(existing) = cells[ri][fi] {
                        return Err(RfmError::OverlappingRule {
                            r_score: r,
                            fm_score: fm,
                            first: existing.label().to_string(),
                            second: rule.segment.label().to_string(),
                        });
                    }
                    cells[ri][fi] = Some(rule.segment);
                }
            }
        }

        let mut table = [[Segment::Lost; 5]; 5];
        for (ri, row) in cells.iter().enumerate() {
            for (fi, cell) in row.iter().enumerate() {
                table[ri][fi] = cell.ok_or(RfmError::IncompleteRuleTable {
                    r_score: ri as u8 + 1,
                    fm_score: fi as u8 + 1,
                })?;
            }
        }

        Ok(Self { table })
    }

    pub fn standard() -> crate::Result<Self> {
        Self::from_rules(&STANDARD_RULES)
    }

    pub fn segment(&self, r_score: u8, fm_score: u8) -> crate::Result<Segment> {
        let (ri, fi) = cell_index(r_score, fm_score)?;
        Ok(self.table[ri][fi])
    }
}

fn cell_index(r_score: u8, fm_score: u8) -> crate::Result<(usize, usize)> {
    if !(1..=5).contains(&r_score) || !(1..=5).contains(&fm_score) {
        return Err(RfmError::InvalidInput(format!(
            "scores must lie in 1..=5, got rScore={r_score}, fmScore={fm_score}"
        )));
    }
    Ok((r_score as usize - 1, fm_score as usize - 1))
}
