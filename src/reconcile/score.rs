//! Sheet scoring for duplicate resolution.
//!
//! Score tiers, in decreasing weight: workflow status, presence of chemical
//! records, answer completeness, recency of the last modification.

use super::SheetCandidate;
use crate::config::ReconcileConfig;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::cmp::Ordering;

/// Points per tier for one sheet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ScoreBreakdown {
    pub status: f64,
    pub chemicals: f64,
    pub completeness: f64,
    pub recency: f64,
}

impl ScoreBreakdown {
    pub fn total(&self) -> f64 {
        self.status + self.chemicals + self.completeness + self.recency
    }

    /// Tiers in tie-break order.
    fn tiers(&self) -> [(&'static str, f64); 4] {
        [
            ("status", self.status),
            ("chemicals", self.chemicals),
            ("completeness", self.completeness),
            ("recency", self.recency),
        ]
    }
}

pub struct Scorer<'a> {
    config: &'a ReconcileConfig,
    as_of: DateTime<Utc>,
}

impl<'a> Scorer<'a> {
    /// `as_of` is the reference time for recency.
    pub fn new(config: &'a ReconcileConfig, as_of: DateTime<Utc>) -> Self {
        Self { config, as_of }
    }

    pub fn score(&self, sheet: &SheetCandidate) -> ScoreBreakdown {
        ScoreBreakdown {
            status: self.config.status_points(sheet.status.as_deref()),
            chemicals: if sheet.has_chemicals {
                self.config.chemical_bonus
            } else {
                0.0
            },
            completeness: self.config.answer_weight
                * sheet.answers.min(self.config.answer_cap) as f64,
            recency: self.recency(sheet.modified_at),
        }
    }

    fn recency(&self, modified_at: Option<DateTime<Utc>>) -> f64 {
        let Some(modified_at) = modified_at else {
            return 0.0;
        };
        let age_days = (self.as_of - modified_at).num_seconds() as f64 / 86_400.0;
        let fraction = 1.0 - age_days / self.config.recency_window_days;
        (self.config.recency_max * fraction).clamp(0.0, self.config.recency_max)
    }

    /// Itemised explanation of a sheet's score.
    pub fn reasons(&self, sheet: &SheetCandidate, score: &ScoreBreakdown) -> Vec<String> {
        let status = match sheet.status.as_deref() {
            Some(s) => format!("status {}: +{:.0}", s, score.status),
            None => format!("no status: +{:.0}", score.status),
        };
        let chemicals = if sheet.has_chemicals {
            format!("chemicals attached: +{:.0}", score.chemicals)
        } else {
            "no chemicals: +0".to_string()
        };
        let completeness = format!("{} answers: +{:.1}", sheet.answers, score.completeness);
        let recency = match sheet.modified_at {
            Some(at) => format!(
                "modified {} days ago: +{:.1}",
                (self.as_of - at).num_days(),
                score.recency
            ),
            None => "no modification date: +0".to_string(),
        };
        vec![status, chemicals, completeness, recency]
    }
}

/// Order two scored sheets, best first: total score, then each tier in
/// turn, then the lowest id.
pub fn rank(a: (&SheetCandidate, &ScoreBreakdown), b: (&SheetCandidate, &ScoreBreakdown)) -> Ordering {
    b.1.total()
        .total_cmp(&a.1.total())
        .then_with(|| {
            a.1.tiers()
                .iter()
                .zip(b.1.tiers().iter())
                .map(|((_, x), (_, y))| y.total_cmp(x))
                .find(|o| o.is_ne())
                .unwrap_or(Ordering::Equal)
        })
        .then_with(|| a.0.id.cmp(&b.0.id))
}

/// Why `keeper` won over `loser`, for the loser's reasons list.
pub fn deciding_factor(
    keeper: (&SheetCandidate, &ScoreBreakdown),
    loser: (&SheetCandidate, &ScoreBreakdown),
) -> String {
    let (k, l) = (keeper.1.total(), loser.1.total());
    if k != l {
        return format!(
            "score {:.1} below keeper #{} ({:.1})",
            l, keeper.0.id, k
        );
    }
    for ((tier, kv), (_, lv)) in keeper.1.tiers().iter().zip(loser.1.tiers().iter()) {
        if kv != lv {
            return format!(
                "tied on score with keeper #{}; lost on {} ({:.1} < {:.1})",
                keeper.0.id, tier, lv, kv
            );
        }
    }
    format!(
        "identical score to keeper #{}; lower id wins",
        keeper.0.id
    )
}
