//! End-to-end migration runs against an in-memory source and database.

use async_trait::async_trait;
use serde_json::{Value, json};
use sheet_migrator::db::Database;
use sheet_migrator::error::{MigrationError, SourceError, StoreError};
use sheet_migrator::identity::{IdentityCache, MappingStore};
use sheet_migrator::orchestrator::{Orchestrator, Plan, RunOptions, StageDescriptor};
use sheet_migrator::pipeline::{ImportOptions, RetryPolicy};
use sheet_migrator::source::{Page, SourceApi, StaticSource};
use sheet_migrator::store::TargetStore;
use sheet_migrator::transform::UserTransformer;
use sheet_migrator::types::{EntityType, FieldValue, MigrationReport, Row, StageStats};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

fn fixture() -> StaticSource {
    StaticSource::new()
        .with_records("association", vec![json!({"_id": "a1", "Name": "Chemical Industry"})])
        .with_records(
            "stack",
            vec![json!({"_id": "st1", "Name": "Main", "Association": "a1"})],
        )
        .with_records(
            "company",
            vec![
                json!({"_id": "c1", "Name": "Acme", "VAT": "IT123", "Association": "a1", "Stack": "st1"}),
                json!({"_id": "c2", "Name": "Globex"}),
            ],
        )
        .with_records(
            "user",
            vec![json!({"_id": "u1", "Email": "Ann@Example.com", "Company": "c1"})],
        )
        .with_records("tag", vec![json!({"_id": "t1", "Name": "food", "Company": "c1"})])
        .with_records(
            "section",
            vec![json!({"_id": "sec1", "Name": "Composition", "Order": 1, "Company": "c1"})],
        )
        .with_records(
            "subsection",
            vec![json!({"_id": "sub1", "Name": "Ingredients", "Section": "sec1"})],
        )
        .with_records(
            "question",
            vec![
                json!({"_id": "q1", "Label": "Contains allergens?", "Type": "Yes/No",
                       "Subsection": "sub1", "Tags": ["t1"], "Companies": ["c1", "c2"]}),
                json!({"_id": "q2", "Label": "Ingredients table", "Type": "List Table",
                       "Subsection": "sub1"}),
            ],
        )
        .with_records("choice", vec![json!({"_id": "ch1", "Label": "Yes", "Question": "q1"})])
        .with_records("listtable", vec![json!({"_id": "lt1", "Name": "Ingredients", "Question": "q2"})])
        .with_records(
            "listtablecolumn",
            vec![json!({"_id": "col1", "Name": "Percentage", "List Table": "lt1"})],
        )
        .with_records(
            "listtablerow",
            vec![json!({"_id": "row1", "Label": "Water", "List Table": "lt1"})],
        )
        .with_records(
            "sheet",
            vec![
                // s1 points at s2, which is listed after it.
                json!({"_id": "s1", "Name": "SDS Acetone", "Status": "Approved", "Company": "c1",
                       "Father Sheet": "s2", "Tags": ["t1"], "Assigned Users": ["u1"],
                       "Modified Date": "2024-05-01T00:00:00Z"}),
                json!({"_id": "s2", "Name": "SDS Acetone", "Company": "c1"}),
                json!({"_id": "s3", "Name": "SDS Ethanol", "Company": "c2", "Previous Sheet": "s4"}),
                json!({"_id": "s4", "Name": "SDS Ethanol", "Company": "c2", "Previous Sheet": "s3"}),
            ],
        )
        .with_records(
            "chemical",
            vec![json!({"_id": "chem1", "Name": "Acetone", "CAS Number": "67-64-1", "Sheet": "s1"})],
        )
        .with_records(
            "answer",
            vec![
                json!({"_id": "an1", "Value": "yes", "Sheet": "s1", "Question": "q1", "Choice": "ch1"}),
                json!({"_id": "an2", "Value": "3,5", "Sheet": "s2", "Question": "q2",
                       "List Table Row": "row1", "List Table Column": "col1"}),
                json!({"_id": "an3", "Value": "orphan", "Sheet": "s1", "Question": "q-missing"}),
            ],
        )
}

fn import_options() -> ImportOptions {
    ImportOptions {
        batch_size: 2,
        retry: RetryPolicy::new(3, Duration::ZERO),
        ..ImportOptions::default()
    }
}

async fn migrate(
    db: &Database,
    store: Arc<dyn TargetStore>,
    import: ImportOptions,
) -> Result<MigrationReport, MigrationError> {
    let cache = Arc::new(IdentityCache::new(Arc::new(db.clone())));
    let options = RunOptions {
        import,
        page_size: 3,
        stages: Vec::new(),
    };
    Orchestrator::new(Plan::default(), Arc::new(fixture()), store, cache, options)?
        .run()
        .await
}

async fn run_stages(
    db: &Database,
    source: Arc<dyn SourceApi>,
    stages: &[&str],
    parent: Option<&str>,
) -> Result<MigrationReport, MigrationError> {
    let cache = Arc::new(IdentityCache::new(Arc::new(db.clone())));
    let options = RunOptions {
        import: ImportOptions {
            parent: parent.map(str::to_string),
            ..import_options()
        },
        page_size: 3,
        stages: stages.iter().map(|s| s.to_string()).collect(),
    };
    Orchestrator::new(Plan::default(), source, Arc::new(db.clone()), cache, options)?
        .run()
        .await
}

fn stats(report: &MigrationReport, stage: &str) -> StageStats {
    report.stage(stage).map(|s| s.stats).unwrap_or_default()
}

fn query_i64(db: &Database, sql: &str) -> Option<i64> {
    db.with_conn(|conn| Ok(conn.query_row(sql, [], |r| r.get::<_, Option<i64>>(0))?))
        .unwrap()
}

/// Serves the fixture, but every page of one type fails.
struct FailingSource {
    inner: StaticSource,
    type_name: &'static str,
    transient: bool,
    calls: AtomicUsize,
}

impl FailingSource {
    fn new(type_name: &'static str, transient: bool) -> Self {
        Self {
            inner: fixture(),
            type_name,
            transient,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl SourceApi for FailingSource {
    async fn fetch_page(&self, type_name: &str, cursor: usize, limit: usize) -> Result<Page, SourceError> {
        if type_name != self.type_name {
            return self.inner.fetch_page(type_name, cursor, limit).await;
        }
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.transient {
            Err(SourceError::Transient("503 Service Unavailable".into()))
        } else {
            Err(SourceError::Api {
                status: 404,
                body: "type not found".into(),
            })
        }
    }
}

/// Delegates to the database, failing `insert_rows` on one table.
struct FlakyStore {
    inner: Database,
    table: &'static str,
    transient_failures: AtomicUsize,
    permanent: bool,
    inserts: AtomicUsize,
}

impl FlakyStore {
    fn transient(inner: Database, table: &'static str, failures: usize) -> Self {
        Self {
            inner,
            table,
            transient_failures: AtomicUsize::new(failures),
            permanent: false,
            inserts: AtomicUsize::new(0),
        }
    }

    fn permanent(inner: Database, table: &'static str) -> Self {
        Self {
            inner,
            table,
            transient_failures: AtomicUsize::new(0),
            permanent: true,
            inserts: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl TargetStore for FlakyStore {
    async fn insert_rows(&self, table: &str, rows: &[Row]) -> Result<Vec<i64>, StoreError> {
        if table == self.table {
            self.inserts.fetch_add(1, Ordering::SeqCst);
            if self.permanent {
                return Err(StoreError::Constraint("CHECK constraint failed".into()));
            }
            let left = self.transient_failures.load(Ordering::SeqCst);
            if left > 0 {
                self.transient_failures.store(left - 1, Ordering::SeqCst);
                return Err(StoreError::Transient("database is locked".into()));
            }
        }
        self.inner.insert_rows(table, rows).await
    }

    async fn upsert_links(
        &self,
        table: &str,
        left_column: &str,
        right_column: &str,
        pairs: &[(i64, i64)],
    ) -> Result<usize, StoreError> {
        self.inner.upsert_links(table, left_column, right_column, pairs).await
    }

    async fn existing_ids(&self, table: &str, ids: &[i64]) -> Result<HashSet<i64>, StoreError> {
        self.inner.existing_ids(table, ids).await
    }

    async fn column_values(&self, table: &str, column: &str) -> Result<HashMap<i64, i64>, StoreError> {
        self.inner.column_values(table, column).await
    }

    async fn update_columns(
        &self,
        table: &str,
        id: i64,
        columns: &[(&'static str, FieldValue)],
    ) -> Result<(), StoreError> {
        self.inner.update_columns(table, id, columns).await
    }

    async fn count(&self, table: &str) -> Result<usize, StoreError> {
        self.inner.count(table).await
    }
}

#[tokio::test]
async fn full_plan_migrates_every_entity() {
    let db = Database::open_in_memory().unwrap();
    let report = migrate(&db, Arc::new(db.clone()), import_options()).await.unwrap();

    assert_eq!(report.stages.len(), 16);
    assert_eq!(stats(&report, "company").migrated, 2);
    assert_eq!(stats(&report, "sheet").migrated, 4);
    assert_eq!(
        stats(&report, "answer"),
        StageStats { migrated: 2, skipped: 0, failed: 1 }
    );

    let counts = db.table_counts().unwrap();
    assert_eq!(counts["companies"], 2);
    assert_eq!(counts["questions"], 2);
    assert_eq!(counts["sheets"], 4);
    assert_eq!(counts["answers"], 2);
    assert_eq!(counts["question_tags"], 1);
    assert_eq!(counts["question_companies"], 2);
    assert_eq!(counts["sheet_tags"], 1);
    assert_eq!(counts["sheet_assigned_users"], 1);

    let (number, text): (Option<f64>, Option<String>) = db
        .with_conn(|conn| {
            Ok(conn.query_row(
                "SELECT value_number, value_text FROM answers WHERE source_id = 'an2'",
                [],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )?)
        })
        .unwrap();
    assert_eq!(number, Some(3.5));
    assert_eq!(text.as_deref(), Some("3,5"));
    let email: String = db
        .with_conn(|conn| {
            Ok(conn.query_row("SELECT email FROM users WHERE source_id = 'u1'", [], |r| {
                r.get(0)
            })?)
        })
        .unwrap();
    assert_eq!(email, "ann@example.com");
}

#[tokio::test]
async fn second_run_migrates_nothing_new() {
    let db = Database::open_in_memory().unwrap();
    migrate(&db, Arc::new(db.clone()), import_options()).await.unwrap();
    let before = db.table_counts().unwrap();

    let report = migrate(&db, Arc::new(db.clone()), import_options()).await.unwrap();
    for stage in &report.stages {
        assert_eq!(stage.stats.migrated, 0, "stage {} re-migrated rows", stage.name);
    }
    assert_eq!(stats(&report, "sheet").skipped, 4);
    // Two links already stored, one still refused as a cycle.
    assert_eq!(
        stats(&report, "sheet_lineage"),
        StageStats { migrated: 0, skipped: 3, failed: 0 }
    );
    assert_eq!(db.table_counts().unwrap(), before);
}

#[tokio::test]
async fn mappings_are_one_to_one_with_rows() {
    let db = Database::open_in_memory().unwrap();
    migrate(&db, Arc::new(db.clone()), import_options()).await.unwrap();

    let counts = db.table_counts().unwrap();
    let mappings = db.counts().await.unwrap();
    for entity in EntityType::ALL {
        assert_eq!(
            mappings.get(&entity).copied().unwrap_or(0),
            counts[entity.table()],
            "mapping count for {}",
            entity
        );
    }

    // Each mapping points at the row carrying the same source id.
    for entity in EntityType::ALL {
        let mismatched = query_i64(
            &db,
            &format!(
                "SELECT COUNT(*) FROM id_mappings m JOIN {} t ON t.id = m.target_id
                 WHERE m.entity_type = '{}' AND t.source_id != m.source_id",
                entity.table(),
                entity.as_str()
            ),
        );
        assert_eq!(mismatched, Some(0), "mismatched mappings for {}", entity);
    }
}

#[tokio::test]
async fn unresolved_references_never_reach_the_target() {
    let db = Database::open_in_memory().unwrap();
    migrate(&db, Arc::new(db.clone()), import_options()).await.unwrap();

    assert_eq!(
        query_i64(&db, "SELECT COUNT(*) FROM answers WHERE source_id = 'an3'"),
        Some(0)
    );
    assert_eq!(
        query_i64(
            &db,
            "SELECT COUNT(*) FROM answers a LEFT JOIN questions q ON q.id = a.question_id
             WHERE q.id IS NULL"
        ),
        Some(0)
    );
    assert_eq!(
        query_i64(
            &db,
            "SELECT COUNT(*) FROM sheets s LEFT JOIN companies c ON c.id = s.company_id
             WHERE c.id IS NULL"
        ),
        Some(0)
    );
}

#[tokio::test]
async fn lineage_links_forward_references_and_refuses_cycles() {
    let db = Database::open_in_memory().unwrap();
    let report = migrate(&db, Arc::new(db.clone()), import_options()).await.unwrap();

    assert_eq!(
        stats(&report, "sheet_lineage"),
        StageStats { migrated: 2, skipped: 1, failed: 0 }
    );
    assert_eq!(
        query_i64(&db, "SELECT father_sheet_id FROM sheets WHERE source_id = 's1'"),
        query_i64(&db, "SELECT id FROM sheets WHERE source_id = 's2'")
    );
    // s3 -> s4 is applied first; s4 -> s3 would close the loop.
    assert_eq!(
        query_i64(&db, "SELECT previous_sheet_id FROM sheets WHERE source_id = 's3'"),
        query_i64(&db, "SELECT id FROM sheets WHERE source_id = 's4'")
    );
    assert_eq!(
        query_i64(&db, "SELECT previous_sheet_id FROM sheets WHERE source_id = 's4'"),
        None
    );
}

#[tokio::test]
async fn dry_run_writes_nothing() {
    let db = Database::open_in_memory().unwrap();
    let options = ImportOptions {
        dry_run: true,
        ..import_options()
    };
    let report = migrate(&db, Arc::new(db.clone()), options).await.unwrap();

    assert!(report.dry_run);
    assert_eq!(stats(&report, "association").migrated, 1);
    assert_eq!(stats(&report, "company").migrated, 2);
    assert!(db.table_counts().unwrap().values().all(|&n| n == 0));
}

#[tokio::test]
async fn transient_insert_failures_are_retried() {
    let db = Database::open_in_memory().unwrap();
    let store = Arc::new(FlakyStore::transient(db.clone(), "companies", 2));
    let report = migrate(&db, store.clone(), import_options()).await.unwrap();

    assert_eq!(
        stats(&report, "company"),
        StageStats { migrated: 2, skipped: 0, failed: 0 }
    );
    assert_eq!(store.inserts.load(Ordering::SeqCst), 3);
    assert_eq!(report.totals().failed, 1);
}

#[tokio::test]
async fn exhausted_retries_fail_the_chunk() {
    let db = Database::open_in_memory().unwrap();
    let store = Arc::new(FlakyStore::transient(db.clone(), "tags", 10));
    let options = ImportOptions {
        retry: RetryPolicy::new(1, Duration::ZERO),
        ..import_options()
    };
    let report = migrate(&db, store.clone(), options).await.unwrap();

    assert_eq!(stats(&report, "tag").failed, 1);
    assert_eq!(store.inserts.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn permanent_failure_fails_chunk_and_run_continues() {
    let db = Database::open_in_memory().unwrap();
    let store = Arc::new(FlakyStore::permanent(db.clone(), "tags"));
    let report = migrate(&db, store.clone(), import_options()).await.unwrap();

    assert_eq!(
        stats(&report, "tag"),
        StageStats { migrated: 0, skipped: 0, failed: 1 }
    );
    // Not retried.
    assert_eq!(store.inserts.load(Ordering::SeqCst), 1);
    // Later stages still run; tag links are simply absent.
    assert_eq!(stats(&report, "question").migrated, 2);
    assert_eq!(stats(&report, "sheet").migrated, 4);
    let counts = db.table_counts().unwrap();
    assert_eq!(counts["sheet_tags"], 0);
    assert_eq!(counts["question_tags"], 0);
}

#[tokio::test]
async fn invalid_plan_is_rejected_before_running() {
    let db = Database::open_in_memory().unwrap();
    let cache = Arc::new(IdentityCache::new(Arc::new(db.clone())));
    let plan = Plan::new(vec![StageDescriptor::import(UserTransformer)]);
    let result = Orchestrator::new(
        plan,
        Arc::new(fixture()),
        Arc::new(db.clone()),
        cache,
        RunOptions::default(),
    );
    assert!(matches!(result, Err(MigrationError::InvalidPlan(_))));
    assert_eq!(db.table_counts().unwrap()["users"], 0);
}

#[tokio::test]
async fn unknown_stage_selection_is_rejected() {
    let db = Database::open_in_memory().unwrap();
    let cache = Arc::new(IdentityCache::new(Arc::new(db.clone())));
    let options = RunOptions {
        stages: vec!["widgets".into()],
        ..RunOptions::default()
    };
    let result = Orchestrator::new(
        Plan::default(),
        Arc::new(fixture()),
        Arc::new(db.clone()),
        cache,
        options,
    );
    assert!(matches!(result, Err(MigrationError::InvalidPlan(_))));
}

#[tokio::test]
async fn dump_directory_feeds_a_run() {
    let dir = tempfile::tempdir().unwrap();
    let records: Value = json!([{"_id": "a1", "Name": "Chemical Industry"}]);
    std::fs::write(dir.path().join("association.json"), records.to_string()).unwrap();
    std::fs::write(
        dir.path().join("company.json"),
        json!({"response": {"cursor": 0, "results": [{"_id": "c1", "Name": "Acme", "Association": "a1"}],
                            "remaining": 0, "count": 1}})
        .to_string(),
    )
    .unwrap();

    let db = Database::open_in_memory().unwrap();
    let cache = Arc::new(IdentityCache::new(Arc::new(db.clone())));
    let options = RunOptions {
        import: import_options(),
        page_size: 10,
        stages: vec!["association".into(), "company".into()],
    };
    let source = StaticSource::from_dir(dir.path()).unwrap();
    let report = Orchestrator::new(Plan::default(), Arc::new(source), Arc::new(db.clone()), cache, options)
        .unwrap()
        .run()
        .await
        .unwrap();

    assert_eq!(report.stages.len(), 2);
    assert_eq!(stats(&report, "company").migrated, 1);
    assert_eq!(
        query_i64(&db, "SELECT association_id FROM companies WHERE source_id = 'c1'"),
        query_i64(&db, "SELECT id FROM associations WHERE source_id = 'a1'")
    );
}

#[tokio::test]
async fn scoped_lineage_runs_cannot_close_a_cycle_together() {
    let source: Arc<dyn SourceApi> = Arc::new(
        StaticSource::new()
            .with_records(
                "company",
                vec![json!({"_id": "c1", "Name": "Acme"}), json!({"_id": "c2", "Name": "Globex"})],
            )
            .with_records(
                "sheet",
                vec![
                    json!({"_id": "s1", "Name": "SDS Acetone", "Company": "c1", "Previous Sheet": "s2"}),
                    json!({"_id": "s2", "Name": "SDS Acetone", "Company": "c2", "Previous Sheet": "s1"}),
                ],
            ),
    );
    let db = Database::open_in_memory().unwrap();
    run_stages(&db, source.clone(), &["company", "sheet"], None).await.unwrap();

    let first = run_stages(&db, source.clone(), &["sheet_lineage"], Some("c1")).await.unwrap();
    assert_eq!(
        stats(&first, "sheet_lineage"),
        StageStats { migrated: 1, skipped: 0, failed: 0 }
    );
    // s2 -> s1 would close a loop through the stored s1 -> s2.
    let second = run_stages(&db, source, &["sheet_lineage"], Some("c2")).await.unwrap();
    assert_eq!(
        stats(&second, "sheet_lineage"),
        StageStats { migrated: 0, skipped: 1, failed: 0 }
    );

    assert_eq!(
        query_i64(&db, "SELECT previous_sheet_id FROM sheets WHERE source_id = 's1'"),
        query_i64(&db, "SELECT id FROM sheets WHERE source_id = 's2'")
    );
    assert_eq!(
        query_i64(&db, "SELECT previous_sheet_id FROM sheets WHERE source_id = 's2'"),
        None
    );
}

#[tokio::test]
async fn parent_filter_scopes_a_selected_stage() {
    let db = Database::open_in_memory().unwrap();
    let source: Arc<dyn SourceApi> = Arc::new(fixture());
    run_stages(&db, source.clone(), &["association"], None).await.unwrap();

    let report = run_stages(&db, source, &["company"], Some("a1")).await.unwrap();
    assert_eq!(stats(&report, "company").migrated, 1);
    assert_eq!(
        query_i64(&db, "SELECT COUNT(*) FROM companies WHERE source_id = 'c1'"),
        Some(1)
    );
    assert_eq!(db.table_counts().unwrap()["companies"], 1);
}

#[tokio::test]
async fn parent_filter_without_stage_selection_is_rejected() {
    let db = Database::open_in_memory().unwrap();
    let result = run_stages(&db, Arc::new(fixture()), &[], Some("c1")).await;
    assert!(matches!(result, Err(MigrationError::InvalidPlan(_))));
    assert!(db.table_counts().unwrap().values().all(|&n| n == 0));
}

#[tokio::test]
async fn failed_candidate_fetch_aborts_the_run() {
    let db = Database::open_in_memory().unwrap();
    let source = Arc::new(FailingSource::new("question", false));
    let cache = Arc::new(IdentityCache::new(Arc::new(db.clone())));
    let options = RunOptions {
        import: import_options(),
        page_size: 3,
        stages: Vec::new(),
    };
    let result = Orchestrator::new(Plan::default(), source.clone(), Arc::new(db.clone()), cache, options)
        .unwrap()
        .run()
        .await;

    match result {
        Err(MigrationError::Source { stage, source: SourceError::Api { status, .. } }) => {
            assert_eq!(stage, "question");
            assert_eq!(status, 404);
        }
        other => panic!("expected source failure, got {:?}", other.map(|r| r.totals())),
    }
    // Not retried.
    assert_eq!(source.calls.load(Ordering::SeqCst), 1);

    let counts = db.table_counts().unwrap();
    assert_eq!(counts["companies"], 2);
    assert_eq!(counts["subsections"], 1);
    for table in ["questions", "choices", "sheets", "chemicals", "answers", "sheet_tags"] {
        assert_eq!(counts[table], 0, "stage after the failure wrote {}", table);
    }
}

#[tokio::test]
async fn transient_fetch_failure_aborts_after_retries() {
    let db = Database::open_in_memory().unwrap();
    let source = Arc::new(FailingSource::new("sheet", true));
    let cache = Arc::new(IdentityCache::new(Arc::new(db.clone())));
    let options = RunOptions {
        import: import_options(),
        page_size: 3,
        stages: Vec::new(),
    };
    let result = Orchestrator::new(Plan::default(), source.clone(), Arc::new(db.clone()), cache, options)
        .unwrap()
        .run()
        .await;

    assert!(matches!(
        result,
        Err(MigrationError::Source { ref stage, source: SourceError::Transient(_) }) if stage == "sheet"
    ));
    // One attempt plus three retries.
    assert_eq!(source.calls.load(Ordering::SeqCst), 4);
    let counts = db.table_counts().unwrap();
    assert_eq!(counts["questions"], 2);
    assert_eq!(counts["sheets"], 0);
    assert_eq!(counts["answers"], 0);
}
