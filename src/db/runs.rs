//! Run history and table counts.

use super::Database;
use crate::transform::{
    Junction, QUESTION_COMPANIES, QUESTION_TAGS, SHEET_ASSIGNED_USERS, SHEET_SHAREABLE_COMPANIES,
    SHEET_TAGS,
};
use crate::types::{EntityType, MigrationReport, TableCounts};
use anyhow::Result;
use rusqlite::{OptionalExtension, params};

/// Junction tables reported alongside entity tables.
const JUNCTIONS: [Junction; 5] = [
    QUESTION_TAGS,
    QUESTION_COMPANIES,
    SHEET_TAGS,
    SHEET_SHAREABLE_COMPANIES,
    SHEET_ASSIGNED_USERS,
];

impl Database {
    /// Persist the report of a finished run and return its id.
    pub fn record_run(&self, report: &MigrationReport) -> Result<i64> {
        let totals = report.totals();
        let json = serde_json::to_string(report)?;
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO migration_runs (started_at, finished_at, migrated, skipped, failed, report)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    report.started_at.to_rfc3339(),
                    report.finished_at.to_rfc3339(),
                    totals.migrated as i64,
                    totals.skipped as i64,
                    totals.failed as i64,
                    json
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    /// The most recently recorded run, if any.
    pub fn last_run(&self) -> Result<Option<MigrationReport>> {
        let json: Option<String> = self.with_conn(|conn| {
            Ok(conn
                .query_row(
                    "SELECT report FROM migration_runs ORDER BY id DESC LIMIT 1",
                    [],
                    |r| r.get(0),
                )
                .optional()?)
        })?;
        match json {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    /// Row counts of every entity table, junction table and the mapping table.
    pub fn table_counts(&self) -> Result<TableCounts> {
        let tables = EntityType::ALL
            .iter()
            .map(|e| e.table())
            .chain(JUNCTIONS.iter().map(|j| j.table))
            .chain(std::iter::once("id_mappings"));
        self.with_conn(|conn| {
            let mut counts = TableCounts::new();
            for table in tables {
                let count: i64 =
                    conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |r| r.get(0))?;
                counts.insert(table.to_string(), count as usize);
            }
            Ok(counts)
        })
    }
}
