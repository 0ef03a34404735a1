//! Source backed by records already in memory.
//!
//! Used for offline runs against an exported dump (one `<type>.json` file
//! per type name) and as the source fake in tests.

use super::{Page, SourceApi};
use crate::error::SourceError;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Default)]
pub struct StaticSource {
    records: HashMap<String, Vec<Value>>,
    requests: AtomicUsize,
}

impl StaticSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(mut self, type_name: &str, records: Vec<Value>) -> Self {
        self.records.insert(type_name.to_string(), records);
        self
    }

    /// Load every `*.json` file in `dir`. A file may hold a bare array of
    /// records or a full API envelope (`{"response": {"results": [...]}}`).
    pub fn from_dir(dir: &Path) -> Result<Self> {
        let mut source = Self::new();
        for entry in std::fs::read_dir(dir)
            .with_context(|| format!("cannot read dump directory {}", dir.display()))?
        {
            let path = entry?.path();
            if path.extension().is_none_or(|ext| ext != "json") {
                continue;
            }
            let Some(type_name) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let content = std::fs::read_to_string(&path)?;
            let value: Value = serde_json::from_str(&content)
                .with_context(|| format!("invalid JSON in {}", path.display()))?;
            let records = match value {
                Value::Array(items) => items,
                other => other
                    .pointer("/response/results")
                    .and_then(|v| v.as_array())
                    .cloned()
                    .with_context(|| format!("{} holds no record array", path.display()))?,
            };
            source.records.insert(type_name.to_string(), records);
        }
        Ok(source)
    }

    /// Number of pages served so far.
    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::Relaxed)
    }

    pub fn type_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.records.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

#[async_trait]
impl SourceApi for StaticSource {
    async fn fetch_page(
        &self,
        type_name: &str,
        cursor: usize,
        limit: usize,
    ) -> Result<Page, SourceError> {
        self.requests.fetch_add(1, Ordering::Relaxed);
        let all = self.records.get(type_name).map(Vec::as_slice).unwrap_or(&[]);
        let start = cursor.min(all.len());
        let end = (start + limit).min(all.len());
        Ok(Page {
            cursor,
            results: all[start..end].to_vec(),
            remaining: all.len() - end,
            count: end - start,
        })
    }
}
