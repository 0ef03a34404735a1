//! [`TargetStore`] implementation for the SQLite database.

use super::{Database, check_identifier};
use crate::error::StoreError;
use crate::store::TargetStore;
use crate::types::{FieldValue, Row};
use async_trait::async_trait;
use rusqlite::ToSql;
use rusqlite::types::{ToSqlOutput, Value as SqlValue};
use std::collections::{HashMap, HashSet};

impl ToSql for FieldValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            FieldValue::Null => ToSqlOutput::Owned(SqlValue::Null),
            FieldValue::Integer(v) => ToSqlOutput::Owned(SqlValue::Integer(*v)),
            FieldValue::Real(v) => ToSqlOutput::Owned(SqlValue::Real(*v)),
            FieldValue::Text(s) => ToSqlOutput::Borrowed(rusqlite::types::ValueRef::Text(s.as_bytes())),
        })
    }
}

/// Build `INSERT ... ON CONFLICT(source_id) DO UPDATE ... RETURNING id` for one row.
///
/// Rows of one table can carry different column sets (unset FKs are
/// omitted), so the statement is built per row.
fn upsert_sql(table: &str, row: &Row) -> Result<String, StoreError> {
    let mut columns = vec!["source_id"];
    for (name, _) in &row.columns {
        check_identifier(name)?;
        columns.push(*name);
    }
    let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{}", i)).collect();
    let updates: Vec<String> = columns
        .iter()
        .map(|c| format!("{c} = excluded.{c}"))
        .collect();
    Ok(format!(
        "INSERT INTO {table} ({}) VALUES ({}) ON CONFLICT(source_id) DO UPDATE SET {} RETURNING id",
        columns.join(", "),
        placeholders.join(", "),
        updates.join(", ")
    ))
}

#[async_trait]
impl TargetStore for Database {
    async fn insert_rows(&self, table: &str, rows: &[Row]) -> Result<Vec<i64>, StoreError> {
        check_identifier(table)?;
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        let ids = self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let mut ids = Vec::with_capacity(rows.len());
            for row in rows {
                let sql = upsert_sql(table, row).map_err(|e| anyhow::anyhow!(e.to_string()))?;
                let mut values: Vec<&dyn ToSql> = vec![&row.source_id];
                values.extend(row.columns.iter().map(|(_, v)| v as &dyn ToSql));
                let id: i64 = tx.query_row(&sql, values.as_slice(), |r| r.get(0))?;
                ids.push(id);
            }
            tx.commit()?;
            Ok(ids)
        })?;
        Ok(ids)
    }

    async fn upsert_links(
        &self,
        table: &str,
        left_column: &str,
        right_column: &str,
        pairs: &[(i64, i64)],
    ) -> Result<usize, StoreError> {
        check_identifier(table)?;
        check_identifier(left_column)?;
        check_identifier(right_column)?;
        if pairs.is_empty() {
            return Ok(0);
        }
        let written = self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let mut written = 0;
            {
                let mut stmt = tx.prepare(&format!(
                    "INSERT OR IGNORE INTO {table} ({left_column}, {right_column}) VALUES (?1, ?2)"
                ))?;
                for (left, right) in pairs {
                    written += stmt.execute([left, right])?;
                }
            }
            tx.commit()?;
            Ok(written)
        })?;
        Ok(written)
    }

    async fn existing_ids(&self, table: &str, ids: &[i64]) -> Result<HashSet<i64>, StoreError> {
        check_identifier(table)?;
        if ids.is_empty() {
            return Ok(HashSet::new());
        }
        let found = self.with_conn(|conn| {
            let mut found = HashSet::new();
            // SQLite caps bound parameters; stay well under the limit.
            for chunk in ids.chunks(500) {
                let placeholders = vec!["?"; chunk.len()].join(", ");
                let mut stmt = conn.prepare(&format!(
                    "SELECT id FROM {table} WHERE id IN ({placeholders})"
                ))?;
                let rows = stmt.query_map(rusqlite::params_from_iter(chunk.iter()), |r| {
                    r.get::<_, i64>(0)
                })?;
                for id in rows {
                    found.insert(id?);
                }
            }
            Ok(found)
        })?;
        Ok(found)
    }

    async fn column_values(&self, table: &str, column: &str) -> Result<HashMap<i64, i64>, StoreError> {
        check_identifier(table)?;
        check_identifier(column)?;
        let values = self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT id, {column} FROM {table} WHERE {column} IS NOT NULL"
            ))?;
            let rows = stmt.query_map([], |r| Ok((r.get::<_, i64>(0)?, r.get::<_, i64>(1)?)))?;
            let mut values = HashMap::new();
            for row in rows {
                let (id, value) = row?;
                values.insert(id, value);
            }
            Ok(values)
        })?;
        Ok(values)
    }

    async fn update_columns(
        &self,
        table: &str,
        id: i64,
        columns: &[(&'static str, FieldValue)],
    ) -> Result<(), StoreError> {
        check_identifier(table)?;
        if columns.is_empty() {
            return Ok(());
        }
        let mut assignments = Vec::with_capacity(columns.len());
        for (i, (name, _)) in columns.iter().enumerate() {
            check_identifier(name)?;
            assignments.push(format!("{} = ?{}", name, i + 1));
        }
        let sql = format!(
            "UPDATE {table} SET {} WHERE id = ?{}",
            assignments.join(", "),
            columns.len() + 1
        );
        self.with_conn(|conn| {
            let mut values: Vec<&dyn ToSql> = columns.iter().map(|(_, v)| v as &dyn ToSql).collect();
            values.push(&id);
            let changed = conn.execute(&sql, values.as_slice())?;
            if changed == 0 {
                return Err(anyhow::anyhow!("no row {} in {}", id, table));
            }
            Ok(())
        })?;
        Ok(())
    }

    async fn count(&self, table: &str) -> Result<usize, StoreError> {
        check_identifier(table)?;
        let count = self.with_conn(|conn| {
            let n: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |r| r.get(0))?;
            Ok(n as usize)
        })?;
        Ok(count)
    }
}
