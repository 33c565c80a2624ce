//! Integration tests for the Dumper end-to-end pipeline.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use shelldump::ddl::CompatibilityOptions;
use shelldump::dialect::Dialect;
use shelldump::dumper::{DumpOptions, DumpPlan, Dumper, SchemaPlan, TableSpec};
use shelldump::error::Result;
use shelldump::model::{ColumnMeta, IndexMeta};
use shelldump::session::{
    CapturingConsole, ColumnType, ConnectionOptions, Console, Directory, FixtureColumn, FixtureSession, FixtureTable,
    LocalDirectory, OwnedRow, Row, Session, StdConsole,
};

fn session_factory_over(fixture: Arc<Mutex<FixtureSession>>) -> shelldump::dumper::SessionFactory {
    Box::new(move || {
        let guard = fixture.lock().unwrap();
        Ok(Box::new(guard.clone()) as Box<dyn Session>)
    })
}

fn large_table_plan() -> DumpPlan {
    DumpPlan {
        schemas: vec![SchemaPlan {
            name: "shop".into(),
            tables: vec![TableSpec {
                name: "orders".into(),
                columns: vec![ColumnMeta { name: "id".into(), ty: ColumnType::Int, csv_unsafe: false }],
                indexes: vec![IndexMeta { name: "id".into(), is_primary: true }],
                triggers: vec![],
            }],
            views: vec![],
            routines: vec![],
            events: vec![],
        }],
        users: vec![],
    }
}

fn large_fixture(row_count: u64) -> FixtureSession {
    let mut fixture = FixtureSession::new();
    let rows = (1..=row_count).map(|id| vec![Some(id.to_string().into_bytes())]).collect();
    fixture.add_table(
        "shop",
        "orders",
        FixtureTable {
            columns: vec![FixtureColumn { name: "id".into(), ty: ColumnType::Int }],
            key_index: Some(0),
            rows,
            create_ddl: "CREATE TABLE `orders` (`id` INT NOT NULL PRIMARY KEY)".into(),
        },
    );
    fixture
}

/// A 10,000-row integer-keyed table with `bytes_per_chunk` tuned to 2,500
/// rows/chunk splits into exactly four chunk files, and every row in
/// `1..=10000` appears in exactly one of them.
#[test]
fn large_table_splits_into_expected_chunks_and_covers_every_row() {
    let fixture = Arc::new(Mutex::new(large_fixture(10_000)));

    let tmp = tempfile::tempdir().unwrap();
    let directory: Arc<dyn Directory> = Arc::new(LocalDirectory::new(tmp.path()));
    let console: Arc<dyn Console> = Arc::new(StdConsole);

    let mut options = DumpOptions::default();
    options.output_url = tmp.path().display().to_string();
    options.threads = 4;
    options.consistent = true;
    options.dialect = Dialect::Tsv;
    options.dump_users = false;
    // avg_row_length defaults to 128 since the fixture's information_schema
    // response only ever populates TABLE_ROWS; 320,000 / 128 = 2,500 rows
    // per chunk, so 10,000 rows plans to exactly four chunks.
    options.bytes_per_chunk = 320_000;

    let dumper = Dumper::new(options, directory, console, session_factory_over(fixture));
    let report = dumper.run(large_table_plan()).unwrap();
    assert_eq!(report.rows, 10_000);

    let data_files: Vec<_> = std::fs::read_dir(tmp.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .filter(|n| n.starts_with("shop@orders@") && n.ends_with(".tsv"))
        .collect();
    assert_eq!(data_files.len(), 4, "expected four chunk files, got {data_files:?}");

    let mut seen: HashSet<u64> = HashSet::new();
    for name in &data_files {
        let contents = std::fs::read_to_string(tmp.path().join(name)).unwrap();
        for line in contents.lines() {
            let id: u64 = line.trim().parse().expect("row is a single integer column");
            assert!(seen.insert(id), "row {id} appeared in more than one chunk file");
        }
    }
    assert_eq!(seen.len(), 10_000);
    assert_eq!(*seen.iter().min().unwrap(), 1);
    assert_eq!(*seen.iter().max().unwrap(), 10_000);
}

/// A fixed compatibility rewrite (`force_if_not_exists` adding
/// `IF NOT EXISTS` to the `CREATE TABLE`) must be reported through
/// `Console::print_note` and surfaced in the table manifest's `issues`
/// list, not silently discarded once the fatal-issue check passes.
#[test]
fn fixed_ddl_issues_are_logged_as_notes_and_recorded_in_the_manifest() {
    let fixture = Arc::new(Mutex::new(large_fixture(3)));

    let tmp = tempfile::tempdir().unwrap();
    let directory: Arc<dyn Directory> = Arc::new(LocalDirectory::new(tmp.path()));
    let capturing = Arc::new(CapturingConsole::default());
    let console: Arc<dyn Console> = capturing.clone();

    let mut options = DumpOptions::default();
    options.output_url = tmp.path().display().to_string();
    options.threads = 1;
    options.dump_users = false;
    options.compatibility = CompatibilityOptions { force_if_not_exists: true, ..CompatibilityOptions::default() };

    let dumper = Dumper::new(options, directory, console, session_factory_over(fixture));
    dumper.run(large_table_plan()).unwrap();

    let messages = capturing.messages.lock().unwrap();
    assert!(
        messages.iter().any(|(level, msg)| *level == "note" && msg.contains("IF NOT EXISTS")),
        "expected a note about the IF NOT EXISTS rewrite, got {messages:?}"
    );
    drop(messages);

    let manifest_json = std::fs::read_to_string(tmp.path().join("shop@orders.json")).unwrap();
    let manifest: serde_json::Value = serde_json::from_str(&manifest_json).unwrap();
    let issues = manifest["issues"].as_array().expect("issues array present");
    assert!(
        issues.iter().any(|i| i["fixed"] == true && i["description"].as_str().unwrap().contains("IF NOT EXISTS")),
        "expected the IF NOT EXISTS issue in the table manifest, got {issues:?}"
    );
}

/// A session wrapper that flips a shared interrupt flag partway through
/// streaming a chunk, standing in for a `KILL QUERY` landing mid-stream:
/// the worker's own per-row interrupt check aborts the chunk before its
/// sink is ever finished or abandoned, leaving a `.dumping` orphan.
struct KillMidStreamSession {
    inner: FixtureSession,
    interrupt: Arc<AtomicBool>,
}

impl Session for KillMidStreamSession {
    fn execute(&mut self, sql: &str) -> Result<()> {
        self.inner.execute(sql)
    }

    fn query_rows(&mut self, sql: &str) -> Result<Vec<OwnedRow>> {
        self.inner.query_rows(sql)
    }

    fn stream_query(&mut self, sql: &str, on_row: &mut dyn FnMut(&dyn Row) -> Result<()>) -> Result<u64> {
        let interrupt = self.interrupt.clone();
        let mut seen = 0u64;
        self.inner.stream_query(sql, &mut |row| {
            seen += 1;
            if seen == 2 {
                // Simulate the side-session's KILL QUERY landing right
                // before the second row would be written.
                interrupt.store(true, Ordering::Relaxed);
            }
            on_row(row)
        })
    }

    fn get_connection_id(&self) -> u64 {
        self.inner.get_connection_id()
    }

    fn get_server_version(&self) -> (u32, u32, u32) {
        self.inner.get_server_version()
    }

    fn ansi_quotes_enabled(&self) -> bool {
        self.inner.ansi_quotes_enabled()
    }

    fn no_backslash_escapes_enabled(&self) -> bool {
        self.inner.no_backslash_escapes_enabled()
    }

    fn get_connection_options(&self) -> &ConnectionOptions {
        self.inner.get_connection_options()
    }
}

/// When a chunk is interrupted mid-stream, the dump fails, no `@.done.json`
/// is written, and the chunk's data file is orphaned with its `.dumping`
/// suffix still attached (spec §8 emergency-shutdown scenario).
#[test]
fn interrupted_chunk_leaves_no_done_manifest_and_orphans_a_dumping_file() {
    let mut inner = FixtureSession::new();
    inner.add_table(
        "s",
        "t",
        FixtureTable {
            columns: vec![FixtureColumn { name: "id".into(), ty: ColumnType::Int }],
            key_index: Some(0),
            rows: vec![vec![Some(b"1".to_vec())], vec![Some(b"2".to_vec())], vec![Some(b"3".to_vec())]],
            create_ddl: "CREATE TABLE `t` (`id` INT NOT NULL PRIMARY KEY)".into(),
        },
    );

    let tmp = tempfile::tempdir().unwrap();
    let directory: Arc<dyn Directory> = Arc::new(LocalDirectory::new(tmp.path()));
    let console: Arc<dyn Console> = Arc::new(StdConsole);

    let mut options = DumpOptions::default();
    options.output_url = tmp.path().display().to_string();
    options.threads = 1;
    options.consistent = false;
    options.dialect = Dialect::Csv;
    options.dump_users = false;

    // The session factory is called after `Dumper::new`, so the interrupt
    // handle it needs is threaded through a slot filled in right after
    // construction rather than passed in directly.
    let interrupt_slot: Arc<Mutex<Option<Arc<AtomicBool>>>> = Arc::new(Mutex::new(None));
    let session_factory: shelldump::dumper::SessionFactory = {
        let inner = inner.clone();
        let interrupt_slot = interrupt_slot.clone();
        Box::new(move || {
            let interrupt = interrupt_slot.lock().unwrap().clone().expect("interrupt handle set before first use");
            Ok(Box::new(KillMidStreamSession { inner: inner.clone(), interrupt }) as Box<dyn Session>)
        })
    };

    let dumper = Dumper::new(options, directory, console, session_factory);
    *interrupt_slot.lock().unwrap() = Some(dumper.interrupt_handle());

    let plan = DumpPlan {
        schemas: vec![SchemaPlan {
            name: "s".into(),
            tables: vec![TableSpec {
                name: "t".into(),
                columns: vec![ColumnMeta { name: "id".into(), ty: ColumnType::Int, csv_unsafe: false }],
                indexes: vec![IndexMeta { name: "id".into(), is_primary: true }],
                triggers: vec![],
            }],
            views: vec![],
            routines: vec![],
            events: vec![],
        }],
        users: vec![],
    };

    let result = dumper.run(plan);
    assert!(result.is_err(), "an interrupted dump must return an error");

    assert!(tmp.path().join("@.json").exists(), "the start manifest is written before any worker runs");
    assert!(!tmp.path().join("@.done.json").exists(), "no end manifest is written on interrupt");

    let orphans: Vec<_> = std::fs::read_dir(tmp.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .filter(|n| n.ends_with(".dumping"))
        .collect();
    assert!(!orphans.is_empty(), "an interrupted chunk must leave at least one .dumping orphan");
}
