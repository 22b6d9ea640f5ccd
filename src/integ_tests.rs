//! Integration tests for importer and loader behavior
//!
//! These tests use SQLite in-memory databases, real CSV/XLSX files, and a
//! scripted in-memory destination to test end to end scenarios of the
//! importer.

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::io::Write;
    use std::path::PathBuf;
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use tempfile::TempDir;

    use crate::db::destination::{Destination, DestinationTx, ExistingColumn, Row, WriteMode};
    use crate::db::schema::{TableSchema, TypeTag};
    use crate::db::SqlDestination;
    use crate::error::{DestinationError, ImportError};
    use crate::import::{IfExistsPolicy, ImportPolicy, Importer};
    use crate::runner::{run_import, ImportArgs};

    // ============ Test Helpers ============

    /// Helper to create a CSV file with the given lines
    fn create_csv(dir: &TempDir, filename: &str, lines: &[&str]) -> PathBuf {
        let path = dir.path().join(filename);
        let mut file = std::fs::File::create(&path).unwrap();
        for line in lines {
            writeln!(file, "{line}").unwrap();
        }
        file.flush().unwrap();
        path
    }

    /// Helper to create a standard test CSV with id,name,value columns
    fn create_numbered_csv(dir: &TempDir, filename: &str, num_rows: usize) -> PathBuf {
        let mut lines = vec!["id,name,value".to_string()];
        for i in 0..num_rows {
            lines.push(format!("{i},name_{i},{i}.5"));
        }
        let line_refs: Vec<&str> = lines.iter().map(String::as_str).collect();
        create_csv(dir, filename, &line_refs)
    }

    fn policy(if_exists: IfExistsPolicy) -> ImportPolicy {
        ImportPolicy {
            if_exists,
            ..ImportPolicy::default()
        }
    }

    /// Policy with a tiny threshold so any file takes the chunked path.
    fn chunked_policy(if_exists: IfExistsPolicy, chunk_size: usize) -> ImportPolicy {
        ImportPolicy {
            if_exists,
            strict_schema: false,
            chunk_size,
            chunk_threshold_bytes: 1,
        }
    }

    async fn import(
        destination: &dyn Destination,
        path: &PathBuf,
        table: &str,
        policy: ImportPolicy,
    ) -> Result<crate::import::ImportReport, ImportError> {
        Importer::new(destination, policy, true)
            .import_file(path, table)
            .await
    }

    // ============ Scripted In-Memory Destination ============

    /// In-memory destination double. Writes stage in the transaction and only
    /// land on commit, and a designated batch index can be made to fail.
    #[derive(Default)]
    struct MockState {
        tables: HashMap<String, (Vec<String>, Vec<Row>)>,
        write_modes: Vec<WriteMode>,
        fail_on_batch: Option<usize>,
        batches_seen: usize,
    }

    #[derive(Clone, Default)]
    struct MockDestination {
        state: Arc<Mutex<MockState>>,
    }

    impl MockDestination {
        fn failing_at(batch: usize) -> Self {
            let dest = Self::default();
            dest.state.lock().unwrap().fail_on_batch = Some(batch);
            dest
        }

        fn table_rows(&self, table: &str) -> Option<usize> {
            self.state
                .lock()
                .unwrap()
                .tables
                .get(table)
                .map(|(_, rows)| rows.len())
        }

        fn write_modes(&self) -> Vec<WriteMode> {
            self.state.lock().unwrap().write_modes.clone()
        }
    }

    struct MockTx {
        state: Arc<Mutex<MockState>>,
        /// Working copy; replaces the committed tables on commit.
        staged: HashMap<String, (Vec<String>, Vec<Row>)>,
    }

    #[async_trait]
    impl Destination for MockDestination {
        async fn table_names(&self) -> Result<Vec<String>, DestinationError> {
            Ok(self.state.lock().unwrap().tables.keys().cloned().collect())
        }

        async fn table_columns(&self, table: &str) -> Result<Vec<ExistingColumn>, DestinationError> {
            let state = self.state.lock().unwrap();
            let (columns, _) = state
                .tables
                .get(table)
                .ok_or_else(|| DestinationError::Other(format!("no such table '{table}'")))?;
            Ok(columns
                .iter()
                .map(|name| ExistingColumn {
                    name: name.clone(),
                    sql_type: "TEXT".to_string(),
                })
                .collect())
        }

        async fn begin(&self) -> Result<Box<dyn DestinationTx>, DestinationError> {
            let staged = self.state.lock().unwrap().tables.clone();
            Ok(Box::new(MockTx {
                state: Arc::clone(&self.state),
                staged,
            }))
        }
    }

    #[async_trait]
    impl DestinationTx for MockTx {
        async fn write_batch(
            &mut self,
            table: &str,
            schema: &TableSchema,
            rows: &[Row],
            mode: WriteMode,
        ) -> Result<u64, DestinationError> {
            {
                let mut state = self.state.lock().unwrap();
                state.write_modes.push(mode);
                let index = state.batches_seen;
                state.batches_seen += 1;
                if state.fail_on_batch == Some(index) {
                    return Err(DestinationError::Other(format!(
                        "injected failure on batch {index}"
                    )));
                }
            }

            let columns: Vec<String> = schema.column_names().map(str::to_string).collect();
            match mode {
                WriteMode::Replace => {
                    self.staged
                        .insert(table.to_string(), (columns, rows.to_vec()));
                }
                WriteMode::Append => {
                    let entry = self
                        .staged
                        .entry(table.to_string())
                        .or_insert_with(|| (columns, Vec::new()));
                    entry.1.extend(rows.iter().cloned());
                }
                WriteMode::FailIfExists => {
                    if self.staged.contains_key(table) {
                        return Err(DestinationError::TableExists(table.to_string()));
                    }
                    self.staged
                        .insert(table.to_string(), (columns, rows.to_vec()));
                }
            }
            Ok(rows.len() as u64)
        }

        async fn commit(self: Box<Self>) -> Result<(), DestinationError> {
            self.state.lock().unwrap().tables = self.staged;
            Ok(())
        }
    }

    // ============ Single-Shot CSV Tests ============

    #[tokio::test]
    async fn test_basic_replace_load() {
        let dir = TempDir::new().unwrap();
        let csv = create_csv(
            &dir,
            "people.csv",
            &["id,name", "1,Alice", "2,Bob", "3,Carol"],
        );
        let destination = SqlDestination::sqlite_in_memory().await.unwrap();

        let report = import(&destination, &csv, "people", policy(IfExistsPolicy::Replace))
            .await
            .unwrap();

        assert_eq!(report.imported.len(), 1);
        let import = &report.imported[0];
        assert_eq!(import.table, "people");
        assert_eq!(import.rows_imported, 3);
        assert_eq!(import.schema.columns[0].type_tag, TypeTag::BigInt);
        assert_eq!(import.schema.columns[1].type_tag, TypeTag::Text);
        // The text column falls through the ordered classifier, which flags it.
        assert_eq!(import.warnings.len(), 1);
        assert!(import.warnings[0].contains("name"));

        assert_eq!(destination.count_rows("people").await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_replace_overwrites_previous_load() {
        let dir = TempDir::new().unwrap();
        let csv = create_numbered_csv(&dir, "data.csv", 10);
        let destination = SqlDestination::sqlite_in_memory().await.unwrap();

        for _ in 0..2 {
            import(&destination, &csv, "data", policy(IfExistsPolicy::Replace))
                .await
                .unwrap();
        }

        assert_eq!(destination.count_rows("data").await.unwrap(), 10);
    }

    #[tokio::test]
    async fn test_append_accumulates() {
        let dir = TempDir::new().unwrap();
        let csv = create_numbered_csv(&dir, "data.csv", 10);
        let destination = SqlDestination::sqlite_in_memory().await.unwrap();

        for _ in 0..2 {
            import(&destination, &csv, "data", policy(IfExistsPolicy::Append))
                .await
                .unwrap();
        }

        assert_eq!(destination.count_rows("data").await.unwrap(), 20);
    }

    #[tokio::test]
    async fn test_fail_policy_rejects_existing_table() {
        let dir = TempDir::new().unwrap();
        let csv = create_csv(&dir, "data.csv", &["id,name", "1,x"]);
        let destination = SqlDestination::sqlite_in_memory().await.unwrap();
        destination
            .execute_raw("CREATE TABLE data (id BIGINT, name TEXT)")
            .await
            .unwrap();

        let err = import(&destination, &csv, "data", policy(IfExistsPolicy::Fail))
            .await
            .unwrap_err();

        assert!(matches!(err, ImportError::ImportFailed { .. }));
        // The existing table is untouched and no rows were written.
        assert_eq!(destination.count_rows("data").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_fail_policy_succeeds_on_fresh_table() {
        let dir = TempDir::new().unwrap();
        let csv = create_csv(&dir, "data.csv", &["id,name", "1,x"]);
        let destination = SqlDestination::sqlite_in_memory().await.unwrap();

        let report = import(&destination, &csv, "data", policy(IfExistsPolicy::Fail))
            .await
            .unwrap();

        assert_eq!(report.imported[0].rows_imported, 1);
        assert_eq!(destination.count_rows("data").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_empty_csv_is_invalid_input() {
        let dir = TempDir::new().unwrap();
        let csv = create_csv(&dir, "empty.csv", &["id,name"]);
        let destination = SqlDestination::sqlite_in_memory().await.unwrap();

        let err = import(&destination, &csv, "empty", policy(IfExistsPolicy::Replace))
            .await
            .unwrap_err();

        assert!(matches!(err, ImportError::InvalidInput { .. }));
    }

    #[tokio::test]
    async fn test_unsupported_extension_aborts() {
        let dir = TempDir::new().unwrap();
        let path = create_csv(&dir, "data.parquet", &["id,name", "1,x"]);
        let destination = SqlDestination::sqlite_in_memory().await.unwrap();

        let err = import(&destination, &path, "data", policy(IfExistsPolicy::Replace))
            .await
            .unwrap_err();

        assert!(matches!(err, ImportError::UnsupportedFormat { .. }));
    }

    #[tokio::test]
    async fn test_typed_values_land_in_destination() {
        let dir = TempDir::new().unwrap();
        let csv = create_csv(
            &dir,
            "typed.csv",
            &[
                "id,amount,seen_at,active",
                "1,1.5,2025-01-01 10:30:00,true",
                "2,-2.25,2025-06-30 23:59:59,false",
                "3,,2025-12-31 00:00:00,",
            ],
        );
        let destination = SqlDestination::sqlite_in_memory().await.unwrap();

        let report = import(&destination, &csv, "typed", policy(IfExistsPolicy::Replace))
            .await
            .unwrap();

        let schema = &report.imported[0].schema;
        assert_eq!(schema.columns[0].type_tag, TypeTag::BigInt);
        assert_eq!(schema.columns[1].type_tag, TypeTag::Float64);
        assert_eq!(schema.columns[2].type_tag, TypeTag::Timestamp);
        // Pass 2 has no boolean test; stringly booleans land as TEXT.
        assert_eq!(schema.columns[3].type_tag, TypeTag::Text);
        assert_eq!(destination.count_rows("typed").await.unwrap(), 3);
    }

    // ============ Strict Schema Tests ============

    #[tokio::test]
    async fn test_strict_schema_mismatch_is_rejected() {
        let dir = TempDir::new().unwrap();
        let csv = create_csv(&dir, "data.csv", &["id,name,extra_col", "1,x,y"]);
        let destination = SqlDestination::sqlite_in_memory().await.unwrap();
        destination
            .execute_raw("CREATE TABLE data (id BIGINT, name TEXT, missing_col TEXT)")
            .await
            .unwrap();

        let strict = ImportPolicy {
            if_exists: IfExistsPolicy::Append,
            strict_schema: true,
            ..ImportPolicy::default()
        };
        let err = import(&destination, &csv, "data", strict).await.unwrap_err();

        match err {
            ImportError::SchemaMismatch {
                missing, extra, ..
            } => {
                assert_eq!(missing, vec!["missing_col".to_string()]);
                assert_eq!(extra, vec!["extra_col".to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(destination.count_rows("data").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_strict_schema_passes_on_matching_columns() {
        let dir = TempDir::new().unwrap();
        let csv = create_csv(&dir, "data.csv", &["id,name", "1,x"]);
        let destination = SqlDestination::sqlite_in_memory().await.unwrap();
        destination
            .execute_raw("CREATE TABLE data (id BIGINT, name TEXT)")
            .await
            .unwrap();

        let strict = ImportPolicy {
            if_exists: IfExistsPolicy::Append,
            strict_schema: true,
            ..ImportPolicy::default()
        };
        import(&destination, &csv, "data", strict).await.unwrap();

        assert_eq!(destination.count_rows("data").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_strict_schema_trivially_compatible_when_table_missing() {
        let dir = TempDir::new().unwrap();
        let csv = create_csv(&dir, "data.csv", &["id,name", "1,x"]);
        let destination = SqlDestination::sqlite_in_memory().await.unwrap();

        let strict = ImportPolicy {
            if_exists: IfExistsPolicy::Replace,
            strict_schema: true,
            ..ImportPolicy::default()
        };
        import(&destination, &csv, "data", strict).await.unwrap();

        assert_eq!(destination.count_rows("data").await.unwrap(), 1);
    }

    // ============ Chunked Loading Tests ============

    #[tokio::test]
    async fn test_chunked_load_matches_single_shot() {
        let dir = TempDir::new().unwrap();
        let csv = create_numbered_csv(&dir, "data.csv", 97);

        let single = SqlDestination::sqlite_in_memory().await.unwrap();
        import(&single, &csv, "data", policy(IfExistsPolicy::Replace))
            .await
            .unwrap();

        let chunked = SqlDestination::sqlite_in_memory().await.unwrap();
        let report = import(&chunked, &csv, "data", chunked_policy(IfExistsPolicy::Replace, 10))
            .await
            .unwrap();

        // Chunked and single-shot loads of the same file are equivalent.
        assert_eq!(report.imported[0].rows_imported, 97);
        assert_eq!(
            single.count_rows("data").await.unwrap(),
            chunked.count_rows("data").await.unwrap()
        );
        let single_columns = single.table_columns("data").await.unwrap();
        let chunked_columns = chunked.table_columns("data").await.unwrap();
        assert_eq!(
            single_columns.iter().map(|c| &c.name).collect::<Vec<_>>(),
            chunked_columns.iter().map(|c| &c.name).collect::<Vec<_>>()
        );
    }

    #[tokio::test]
    async fn test_chunked_replace_resets_previous_rows() {
        let dir = TempDir::new().unwrap();
        let csv = create_numbered_csv(&dir, "data.csv", 25);
        let destination = SqlDestination::sqlite_in_memory().await.unwrap();

        for _ in 0..2 {
            import(
                &destination,
                &csv,
                "data",
                chunked_policy(IfExistsPolicy::Replace, 10),
            )
            .await
            .unwrap();
        }

        // Only the first chunk carries replace semantics, so a re-run must
        // not multiply rows.
        assert_eq!(destination.count_rows("data").await.unwrap(), 25);
    }

    #[tokio::test]
    async fn test_first_chunk_carries_policy_rest_append() {
        let dir = TempDir::new().unwrap();
        let csv = create_numbered_csv(&dir, "data.csv", 30);
        let destination = MockDestination::default();

        import(
            &destination,
            &csv,
            "data",
            chunked_policy(IfExistsPolicy::Replace, 10),
        )
        .await
        .unwrap();

        assert_eq!(
            destination.write_modes(),
            vec![WriteMode::Replace, WriteMode::Append, WriteMode::Append]
        );
        assert_eq!(destination.table_rows("data"), Some(30));
    }

    #[tokio::test]
    async fn test_chunked_rollback_leaves_destination_unchanged() {
        let dir = TempDir::new().unwrap();
        let csv = create_numbered_csv(&dir, "data.csv", 50);

        // Fail on the third batch, well into the chunked write.
        let destination = MockDestination::failing_at(2);
        let err = import(
            &destination,
            &csv,
            "data",
            chunked_policy(IfExistsPolicy::Replace, 10),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, ImportError::ImportFailed { .. }));
        assert_eq!(destination.table_rows("data"), None);
    }

    #[tokio::test]
    async fn test_chunked_rollback_preserves_existing_rows() {
        let dir = TempDir::new().unwrap();
        let seed = create_numbered_csv(&dir, "seed.csv", 5);
        let csv = create_numbered_csv(&dir, "data.csv", 50);

        let destination = MockDestination::default();
        import(&destination, &seed, "data", policy(IfExistsPolicy::Replace))
            .await
            .unwrap();
        assert_eq!(destination.table_rows("data"), Some(5));

        destination.state.lock().unwrap().fail_on_batch = Some(3);
        let err = import(
            &destination,
            &csv,
            "data",
            chunked_policy(IfExistsPolicy::Replace, 10),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, ImportError::ImportFailed { .. }));
        // The pre-call contents survive the aborted replace.
        assert_eq!(destination.table_rows("data"), Some(5));
    }

    // ============ Workbook Tests ============

    fn create_workbook(dir: &TempDir, filename: &str) -> PathBuf {
        use rust_xlsxwriter::Workbook;

        let path = dir.path().join(filename);
        let mut workbook = Workbook::new();

        let people = workbook.add_worksheet();
        people.set_name("People Data").unwrap();
        people.write(0, 0, "id").unwrap();
        people.write(0, 1, "name").unwrap();
        people.write(1, 0, 1).unwrap();
        people.write(1, 1, "Alice").unwrap();
        people.write(2, 0, 2).unwrap();
        people.write(2, 1, "Bob").unwrap();

        // Single-column sheet: non-tabular, must be skipped.
        let notes = workbook.add_worksheet();
        notes.set_name("Notes").unwrap();
        notes.write(0, 0, "only_column").unwrap();
        notes.write(1, 0, "lonely").unwrap();

        workbook.save(&path).unwrap();
        path
    }

    #[tokio::test]
    async fn test_workbook_imports_valid_sheets_and_skips_rest() {
        let dir = TempDir::new().unwrap();
        let xlsx = create_workbook(&dir, "book.xlsx");
        let destination = SqlDestination::sqlite_in_memory().await.unwrap();

        let report = import(&destination, &xlsx, "book", policy(IfExistsPolicy::Replace))
            .await
            .unwrap();

        assert_eq!(report.imported.len(), 1);
        assert_eq!(report.skipped.len(), 1);
        assert!(report.failed.is_empty());

        let import = &report.imported[0];
        assert_eq!(import.table, "book_people_data");
        assert_eq!(import.rows_imported, 2);
        assert_eq!(report.skipped[0].sheet, "Notes");

        assert_eq!(destination.count_rows("book_people_data").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_workbook_sheet_failure_is_isolated() {
        let dir = TempDir::new().unwrap();
        let xlsx = create_workbook(&dir, "book.xlsx");

        // A pre-existing destination table makes only this sheet's import fail.
        let destination = SqlDestination::sqlite_in_memory().await.unwrap();
        destination
            .execute_raw("CREATE TABLE book_people_data (id BIGINT, name TEXT)")
            .await
            .unwrap();

        let report = import(&destination, &xlsx, "book", policy(IfExistsPolicy::Fail))
            .await
            .unwrap();

        assert!(report.imported.is_empty());
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].table, "book_people_data");
        // The failed sheet's destination table is untouched.
        assert_eq!(destination.count_rows("book_people_data").await.unwrap(), 0);
    }

    // ============ Runner API Tests ============

    #[tokio::test]
    async fn test_runner_with_injected_destination() {
        let dir = TempDir::new().unwrap();
        let csv = create_csv(&dir, "data.csv", &["id,name", "1,Alice", "2,Bob"]);
        let destination = Arc::new(SqlDestination::sqlite_in_memory().await.unwrap());
        let injected: Arc<dyn Destination> = destination.clone();

        let report = run_import(ImportArgs {
            database_url: String::new(),
            file: csv,
            table: "data".to_string(),
            policy: ImportPolicy::default(),
            quiet: true,
            test_destination: Some(injected),
        })
        .await
        .unwrap();

        assert_eq!(report.imported[0].rows_imported, 2);
        assert_eq!(destination.count_rows("data").await.unwrap(), 2);
    }
}
