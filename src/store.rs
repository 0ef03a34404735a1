//! Target store seam.
//!
//! The pipeline only talks to the target through this trait so tests can
//! wrap the SQLite store with fault injection.

use crate::error::StoreError;
use crate::types::{FieldValue, Row};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};

/// Table-scoped operations against the target relational store.
#[async_trait]
pub trait TargetStore: Send + Sync {
    /// Insert (or update, keyed on `source_id`) all rows in one transaction.
    ///
    /// Returns the target id of every row, in input order. Either every row
    /// is written or none is.
    async fn insert_rows(&self, table: &str, rows: &[Row]) -> Result<Vec<i64>, StoreError>;

    /// Insert junction pairs, ignoring pairs that already exist.
    /// Returns the number of pairs newly written.
    async fn upsert_links(
        &self,
        table: &str,
        left_column: &str,
        right_column: &str,
        pairs: &[(i64, i64)],
    ) -> Result<usize, StoreError>;

    /// Subset of `ids` present in `table`.
    async fn existing_ids(&self, table: &str, ids: &[i64]) -> Result<HashSet<i64>, StoreError>;

    /// Non-null values of an integer column, keyed by row id.
    async fn column_values(&self, table: &str, column: &str) -> Result<HashMap<i64, i64>, StoreError>;

    /// Update columns of a single row by id.
    async fn update_columns(
        &self,
        table: &str,
        id: i64,
        columns: &[(&'static str, FieldValue)],
    ) -> Result<(), StoreError>;

    /// Number of rows in `table`.
    async fn count(&self, table: &str) -> Result<usize, StoreError>;
}
