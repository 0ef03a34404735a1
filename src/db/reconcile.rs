//! Queries backing duplicate sheet reconciliation.

use super::Database;
use crate::reconcile::SheetCandidate;
use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};
use serde::Serialize;

/// Rows removed by [`Database::delete_sheets`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DeleteSummary {
    pub sheets: usize,
    pub answers: usize,
    pub chemicals: usize,
    pub links: usize,
    /// Lineage references on surviving sheets that were cleared.
    pub detached: usize,
}

/// Tables keyed by `sheet_id` that go with a deleted sheet.
const SHEET_JUNCTIONS: [&str; 3] = [
    "sheet_tags",
    "sheet_shareable_companies",
    "sheet_assigned_users",
];

fn parse_timestamp(raw: Option<String>) -> Option<DateTime<Utc>> {
    raw.and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

fn sheet_exists(conn: &Connection, id: i64) -> Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sheets WHERE id = ?1",
        params![id],
        |r| r.get(0),
    )?;
    Ok(count > 0)
}

impl Database {
    /// Migrated sheets with answer counts and chemical presence, optionally
    /// restricted to one company.
    pub fn sheet_candidates(&self, company_id: Option<i64>) -> Result<Vec<SheetCandidate>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT s.id, s.source_id, s.company_id, s.name, s.status,
                        (SELECT COUNT(*) FROM answers a WHERE a.sheet_id = s.id),
                        EXISTS (SELECT 1 FROM chemicals c WHERE c.sheet_id = s.id),
                        COALESCE(s.modified_at, s.created_at)
                 FROM sheets s
                 WHERE ?1 IS NULL OR s.company_id = ?1
                 ORDER BY s.id",
            )?;
            let rows = stmt.query_map(params![company_id], |r| {
                Ok(SheetCandidate {
                    id: r.get(0)?,
                    source_id: r.get(1)?,
                    company_id: r.get(2)?,
                    name: r.get(3)?,
                    status: r.get(4)?,
                    answers: r.get::<_, i64>(5)? as usize,
                    has_chemicals: r.get::<_, i64>(6)? != 0,
                    modified_at: parse_timestamp(r.get(7)?),
                })
            })?;
            let mut sheets = Vec::new();
            for row in rows {
                sheets.push(row?);
            }
            Ok(sheets)
        })
    }

    /// Delete sheets and everything owned by them in one transaction.
    ///
    /// Father and previous links on other sheets that point at a deleted
    /// sheet are cleared. Mapping records are left in place so a later run
    /// treats the removed records as already migrated.
    pub fn delete_sheets(&self, ids: &[i64]) -> Result<DeleteSummary> {
        let mut summary = DeleteSummary::default();
        if ids.is_empty() {
            return Ok(summary);
        }
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            for &id in ids {
                if !sheet_exists(&tx, id)? {
                    return Err(anyhow!("Sheet {} not found", id));
                }
                summary.answers += tx.execute("DELETE FROM answers WHERE sheet_id = ?1", params![id])?;
                summary.chemicals +=
                    tx.execute("DELETE FROM chemicals WHERE sheet_id = ?1", params![id])?;
                for table in SHEET_JUNCTIONS {
                    summary.links += tx.execute(
                        &format!("DELETE FROM {} WHERE sheet_id = ?1", table),
                        params![id],
                    )?;
                }
                summary.detached += tx.execute(
                    "UPDATE sheets SET father_sheet_id = NULL WHERE father_sheet_id = ?1",
                    params![id],
                )?;
                summary.detached += tx.execute(
                    "UPDATE sheets SET previous_sheet_id = NULL WHERE previous_sheet_id = ?1",
                    params![id],
                )?;
            }
            for &id in ids {
                summary.sheets += tx.execute("DELETE FROM sheets WHERE id = ?1", params![id])?;
            }
            tx.commit()?;
            Ok(())
        })?;
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seed(db: &Database) {
        db.with_conn(|conn| {
            conn.execute_batch(
                "INSERT INTO companies (id, source_id, name) VALUES (1, 'c1', 'Acme');
                 INSERT INTO companies (id, source_id, name) VALUES (2, 'c2', 'Other');
                 INSERT INTO tags (id, source_id, name) VALUES (1, 't1', 'food');
                 INSERT INTO sections (id, source_id, name) VALUES (1, 'sec', 'S');
                 INSERT INTO subsections (id, source_id, name, section_id) VALUES (1, 'sub', 'SS', 1);
                 INSERT INTO questions (id, source_id, label, subsection_id) VALUES (1, 'q1', 'Q', 1);
                 INSERT INTO sheets (id, source_id, name, status, company_id, modified_at)
                     VALUES (1, 's1', 'SDS', 'approved', 1, '2024-05-01T00:00:00+00:00');
                 INSERT INTO sheets (id, source_id, name, company_id, father_sheet_id)
                     VALUES (2, 's2', 'SDS', 1, 1);
                 INSERT INTO sheets (id, source_id, name, company_id, previous_sheet_id)
                     VALUES (3, 's3', 'Other', 2, 2);
                 INSERT INTO answers (source_id, value_text, sheet_id, question_id) VALUES ('a1', 'x', 1, 1);
                 INSERT INTO answers (source_id, value_text, sheet_id, question_id) VALUES ('a2', 'y', 1, 1);
                 INSERT INTO answers (source_id, value_text, sheet_id, question_id) VALUES ('a3', 'z', 2, 1);
                 INSERT INTO chemicals (source_id, name, sheet_id) VALUES ('ch1', 'Acetone', 2);
                 INSERT INTO sheet_tags (sheet_id, tag_id) VALUES (2, 1);",
            )?;
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn candidates_carry_answer_counts_and_chemicals() {
        let db = Database::open_in_memory().unwrap();
        seed(&db);

        let all = db.sheet_candidates(None).unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].answers, 2);
        assert!(!all[0].has_chemicals);
        assert_eq!(all[0].status.as_deref(), Some("approved"));
        assert!(all[0].modified_at.is_some());
        assert_eq!(all[1].answers, 1);
        assert!(all[1].has_chemicals);
        assert!(all[1].modified_at.is_none());

        let acme = db.sheet_candidates(Some(1)).unwrap();
        assert_eq!(acme.len(), 2);
    }

    #[test]
    fn delete_removes_dependents_and_detaches_lineage() {
        let db = Database::open_in_memory().unwrap();
        seed(&db);

        let summary = db.delete_sheets(&[2]).unwrap();
        assert_eq!(
            summary,
            DeleteSummary {
                sheets: 1,
                answers: 1,
                chemicals: 1,
                links: 1,
                detached: 1,
            }
        );

        let (sheets, previous): (i64, Option<i64>) = db
            .with_conn(|conn| {
                let count = conn.query_row("SELECT COUNT(*) FROM sheets", [], |r| r.get(0))?;
                let previous =
                    conn.query_row("SELECT previous_sheet_id FROM sheets WHERE id = 3", [], |r| {
                        r.get(0)
                    })?;
                Ok((count, previous))
            })
            .unwrap();
        assert_eq!(sheets, 2);
        assert_eq!(previous, None);
    }

    #[test]
    fn unknown_sheet_rolls_back() {
        let db = Database::open_in_memory().unwrap();
        seed(&db);

        assert!(db.delete_sheets(&[2, 99]).is_err());
        assert_eq!(db.sheet_candidates(None).unwrap().len(), 3);
    }
}
