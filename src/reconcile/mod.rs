//! Duplicate sheet reconciliation.
//!
//! Sheets sharing a natural key (owning company and trimmed name) form a
//! duplicate group. Every group resolves to exactly one keeper; the rest
//! are delete candidates. Nothing is deleted here: [`ReconcilePlan`] is a
//! report, and applying it is a separate, explicit step.

mod score;

pub use score::{ScoreBreakdown, Scorer, deciding_factor, rank};

use crate::config::ReconcileConfig;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

/// A migrated sheet with the facts the scorer needs.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SheetCandidate {
    pub id: i64,
    pub source_id: String,
    pub company_id: i64,
    pub name: String,
    pub status: Option<String>,
    pub answers: usize,
    pub has_chemicals: bool,
    pub modified_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct GroupKey {
    pub company_id: i64,
    pub name: String,
}

impl GroupKey {
    pub fn of(sheet: &SheetCandidate) -> Self {
        Self {
            company_id: sheet.company_id,
            name: sheet.name.trim().to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ScoredSheet {
    #[serde(flatten)]
    pub sheet: SheetCandidate,
    pub score: ScoreBreakdown,
    pub total: f64,
    pub reasons: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GroupResolution {
    pub key: GroupKey,
    pub keep: ScoredSheet,
    pub delete: Vec<ScoredSheet>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReconcilePlan {
    pub as_of: DateTime<Utc>,
    pub sheets_examined: usize,
    pub groups: Vec<GroupResolution>,
}

impl ReconcilePlan {
    /// Ids of every delete candidate, ascending.
    pub fn delete_ids(&self) -> Vec<i64> {
        let mut ids: Vec<i64> = self
            .groups
            .iter()
            .flat_map(|g| g.delete.iter().map(|s| s.sheet.id))
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Human-readable report.
    pub fn to_text(&self) -> String {
        let mut out = format!(
            "Duplicate groups: {} ({} sheets examined, {} delete candidates)\n",
            self.groups.len(),
            self.sheets_examined,
            self.delete_ids().len()
        );
        for group in &self.groups {
            out.push_str(&format!(
                "\ncompany {} / \"{}\"\n",
                group.key.company_id, group.key.name
            ));
            push_sheet(&mut out, "KEEP  ", &group.keep);
            for sheet in &group.delete {
                push_sheet(&mut out, "DELETE", sheet);
            }
        }
        out
    }
}

fn push_sheet(out: &mut String, verdict: &str, scored: &ScoredSheet) {
    out.push_str(&format!(
        "  {} #{} ({}) score {:.1}\n",
        verdict, scored.sheet.id, scored.sheet.source_id, scored.total
    ));
    for reason in &scored.reasons {
        out.push_str(&format!("      - {}\n", reason));
    }
}

/// Group sheets by natural key, keeping only groups with duplicates.
pub fn group_duplicates(sheets: Vec<SheetCandidate>) -> BTreeMap<GroupKey, Vec<SheetCandidate>> {
    let mut groups: BTreeMap<GroupKey, Vec<SheetCandidate>> = BTreeMap::new();
    for sheet in sheets {
        groups.entry(GroupKey::of(&sheet)).or_default().push(sheet);
    }
    groups.retain(|_, members| members.len() >= 2);
    groups
}

/// Score every duplicate group and pick one keeper per group.
pub fn resolve(
    sheets: Vec<SheetCandidate>,
    config: &ReconcileConfig,
    as_of: DateTime<Utc>,
) -> ReconcilePlan {
    let sheets_examined = sheets.len();
    let scorer = Scorer::new(config, as_of);
    let mut groups = Vec::new();

    for (key, members) in group_duplicates(sheets) {
        let mut scored: Vec<(SheetCandidate, ScoreBreakdown)> = members
            .into_iter()
            .map(|sheet| {
                let score = scorer.score(&sheet);
                (sheet, score)
            })
            .collect();
        scored.sort_by(|a, b| rank((&a.0, &a.1), (&b.0, &b.1)));

        let mut ranked = scored.into_iter();
        let Some((keeper, keeper_score)) = ranked.next() else {
            continue;
        };

        let delete: Vec<ScoredSheet> = ranked
            .map(|(sheet, score)| {
                let mut reasons = scorer.reasons(&sheet, &score);
                reasons.push(deciding_factor((&keeper, &keeper_score), (&sheet, &score)));
                ScoredSheet {
                    total: score.total(),
                    sheet,
                    score,
                    reasons,
                }
            })
            .collect();

        let mut reasons = scorer.reasons(&keeper, &keeper_score);
        reasons.push(format!(
            "highest ranked of {} duplicates",
            delete.len() + 1
        ));
        let keep = ScoredSheet {
            total: keeper_score.total(),
            sheet: keeper,
            score: keeper_score,
            reasons,
        };
        groups.push(GroupResolution { key, keep, delete });
    }

    ReconcilePlan {
        as_of,
        sheets_examined,
        groups,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn as_of() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-06-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn sheet(id: i64, company_id: i64, name: &str, status: Option<&str>) -> SheetCandidate {
        SheetCandidate {
            id,
            source_id: format!("s{}", id),
            company_id,
            name: name.into(),
            status: status.map(String::from),
            answers: 0,
            has_chemicals: false,
            modified_at: Some(as_of() - Duration::days(10)),
        }
    }

    #[test]
    fn groups_by_company_and_trimmed_name() {
        let groups = group_duplicates(vec![
            sheet(1, 1, "SDS Acetone", None),
            sheet(2, 1, "SDS Acetone  ", None),
            sheet(3, 2, "SDS Acetone", None),
            sheet(4, 1, "SDS Ethanol", None),
        ]);
        assert_eq!(groups.len(), 1);
        let (key, members) = groups.iter().next().unwrap();
        assert_eq!(key.company_id, 1);
        assert_eq!(key.name, "SDS Acetone");
        assert_eq!(members.len(), 2);
    }

    #[test]
    fn exactly_one_keeper_per_group() {
        let plan = resolve(
            vec![
                sheet(1, 1, "A", None),
                sheet(2, 1, "A", Some("submitted")),
                sheet(3, 1, "A", None),
                sheet(4, 2, "B", None),
                sheet(5, 2, "B", None),
            ],
            &ReconcileConfig::default(),
            as_of(),
        );
        assert_eq!(plan.groups.len(), 2);
        assert_eq!(plan.groups[0].keep.sheet.id, 2);
        assert_eq!(plan.groups[0].delete.len(), 2);
        // Identical scores: the lowest id is kept.
        assert_eq!(plan.groups[1].keep.sheet.id, 4);
        assert_eq!(plan.delete_ids(), vec![1, 3, 5]);
    }

    #[test]
    fn resolution_is_independent_of_input_order() {
        let mut sheets = vec![
            sheet(1, 1, "A", None),
            sheet(2, 1, "A", Some("in_progress")),
            sheet(3, 1, "A", Some("approved")),
        ];
        let first = resolve(sheets.clone(), &ReconcileConfig::default(), as_of());
        sheets.reverse();
        let second = resolve(sheets, &ReconcileConfig::default(), as_of());
        assert_eq!(first.groups[0].keep.sheet.id, second.groups[0].keep.sheet.id);
        assert_eq!(first.delete_ids(), second.delete_ids());
    }

    #[test]
    fn every_candidate_carries_reasons() {
        let plan = resolve(
            vec![sheet(1, 1, "A", Some("approved")), sheet(2, 1, "A", None)],
            &ReconcileConfig::default(),
            as_of(),
        );
        let group = &plan.groups[0];
        assert!(group.keep.reasons.iter().any(|r| r.contains("highest ranked")));
        assert!(group.delete[0].reasons.iter().any(|r| r.contains("below keeper #1")));
        let text = plan.to_text();
        assert!(text.contains("KEEP   #1"));
        assert!(text.contains("DELETE #2"));
    }

    #[test]
    fn json_output_flattens_sheet_fields() {
        let plan = resolve(
            vec![sheet(1, 1, "A", None), sheet(2, 1, "A", None)],
            &ReconcileConfig::default(),
            as_of(),
        );
        let json = serde_json::to_value(&plan).unwrap();
        assert_eq!(json["groups"][0]["keep"]["id"], 1);
        assert_eq!(json["groups"][0]["delete"][0]["source_id"], "s2");
    }
}
