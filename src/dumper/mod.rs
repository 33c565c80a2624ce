//! Dumper controller (spec §4.8): plans schemas, spawns workers, enforces
//! transactional consistency, enqueues DDL/chunking/streaming tasks, tracks
//! progress, writes the manifest, and handles interrupts.
//!
//! Grounded on `examples/original_source/modules/util/dump/dumper.h`/`.cc`
//! in full — in particular `Dumper::do_run`'s phase sequence, the
//! `m_chunking_tasks` counter that triggers `maybe_push_shutdown_tasks`, and
//! `kill_query`'s side-session `KILL QUERY` mechanism for emergency
//! shutdown.

pub mod basename;
pub mod options;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::Duration;

use ahash::AHashMap;
use chrono::Utc;

use crate::chunker;
use crate::ddl::{self, CompatibilityOptions};
use crate::error::{DumpError, Result};
use crate::manifest::{
    ColumnDecode, ColumnManifest, DialectManifest, DumpEndManifest, DumpStartManifest, IssueManifest, SchemaManifest,
    TableManifest,
};
use crate::model::{ColumnMeta, DumpInfo, IndexMeta, SchemaTask, TableInfo};
use crate::progress::{Counters, ProgressReporter, ThreadState, ThreadStates};
use crate::queue::{Priority, TaskQueue};
use crate::session::{Console, Directory, FileMode, Row, Session};
use crate::sink::{Compression, Sink};
use crate::worker::{Task, Worker, WorkerContext};

pub use basename::{BasenameRegistry, MAX_BASENAME_LENGTH};
pub use options::{DumpOptions, DEFAULT_BYTES_PER_CHUNK};

/// Fallback used when `information_schema.tables.AVG_ROW_LENGTH` is zero or
/// unavailable (e.g. a freshly `ANALYZE`d-but-empty table). Not part of
/// spec.md, which assumes the value is always known; an open-question
/// decision recorded in DESIGN.md.
const DEFAULT_AVG_ROW_LENGTH: u64 = 128;

/// How many rows a worker streams between rate-limiter/counter updates
/// (spec §4.7 step 2: "every 2000 rows").
const RATE_LIMIT_STRIDE: u64 = 2000;

/// How often the emergency-shutdown monitor polls the interrupt flag.
const MONITOR_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Opens one fresh `Session` per call. Workers and the controller each get
/// their own; a side-session is also opened on emergency shutdown to send
/// `KILL QUERY` (spec §4.8 "Emergency shutdown").
pub type SessionFactory = Box<dyn Fn() -> Result<Box<dyn Session>> + Send + Sync>;

// ---------------------------------------------------------------------
// Planning input — supplied by the caller, since `Session` has no
// schema-enumeration call of its own (spec §6).
// ---------------------------------------------------------------------

/// One table to dump, before the row-count/avg-row-length estimate that
/// only `information_schema` can supply is filled in during planning.
#[derive(Debug, Clone, Default)]
pub struct TableSpec {
    pub name: String,
    pub columns: Vec<ColumnMeta>,
    /// Primary-key and unique-index candidates; [`choose_index`] picks one.
    pub indexes: Vec<IndexMeta>,
    pub triggers: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ViewSpec {
    pub name: String,
    pub column_names: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct RoutineSpec {
    pub name: String,
    pub is_function: bool,
}

#[derive(Debug, Clone, Default)]
pub struct SchemaPlan {
    pub name: String,
    pub tables: Vec<TableSpec>,
    pub views: Vec<ViewSpec>,
    pub routines: Vec<RoutineSpec>,
    pub events: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct UserSpec {
    pub user: String,
    pub host: String,
}

/// Top-level planning input to [`Dumper::run`].
#[derive(Debug, Clone, Default)]
pub struct DumpPlan {
    pub schemas: Vec<SchemaPlan>,
    pub users: Vec<UserSpec>,
}

/// Primary-key-preferred index choice (spec §4.5: "primary key preferred,
/// else any unique column, else no chunking").
fn choose_index(candidates: &[IndexMeta]) -> Option<IndexMeta> {
    candidates
        .iter()
        .find(|i| i.is_primary)
        .or_else(|| candidates.first())
        .cloned()
}

#[derive(Debug, Clone)]
struct ViewPlanned {
    schema: String,
    name: String,
    basename: String,
    column_names: Vec<String>,
}

/// Per-schema DDL task input: the schema's own `CREATE SCHEMA` plus the
/// event/routine objects that get appended into the same `<basename>.sql`
/// file (spec §6 `dump_events`/`dump_routines`).
#[derive(Debug, Clone)]
struct SchemaDdlPlanned {
    name: String,
    basename: String,
    events: Vec<String>,
    routines: Vec<RoutineSpec>,
}

/// Aggregate result of a successful run.
#[derive(Debug, Clone, Default)]
pub struct DumpReport {
    pub rows: u64,
    pub data_bytes: u64,
    pub bytes_written: u64,
    pub table_data_bytes: HashMap<String, HashMap<String, u64>>,
}

// ---------------------------------------------------------------------
// Internal synchronization helpers
// ---------------------------------------------------------------------

/// Counting barrier the controller waits on until every worker has started
/// its transaction (spec §5: "Workers start their transactions BEFORE the
/// global read lock is released — enforced by a counting barrier").
struct TxnBarrier {
    mutex: Mutex<usize>,
    cond: Condvar,
    target: usize,
}

impl TxnBarrier {
    fn new(target: usize) -> Self {
        Self { mutex: Mutex::new(0), cond: Condvar::new(), target }
    }

    fn notify(&self) {
        let mut n = self.mutex.lock().unwrap();
        *n += 1;
        self.cond.notify_all();
    }

    fn wait(&self) {
        let mut n = self.mutex.lock().unwrap();
        while *n < self.target {
            n = self.cond.wait(n).unwrap();
        }
    }
}

/// Per-worker first-error slots (spec §7: "a worker catches all exceptions,
/// stores the current exception ... in a per-worker slot").
#[derive(Clone)]
struct ErrorSink {
    slots: Arc<Vec<Mutex<Option<DumpError>>>>,
}

impl ErrorSink {
    fn new(n_workers: usize) -> Self {
        Self { slots: Arc::new((0..n_workers).map(|_| Mutex::new(None)).collect()) }
    }

    fn record(&self, worker_id: usize, err: DumpError) {
        if let Some(slot) = self.slots.get(worker_id) {
            let mut guard = slot.lock().unwrap();
            if guard.is_none() {
                *guard = Some(err);
            }
        }
    }

    fn take_first(&self) -> Option<DumpError> {
        self.slots.iter().find_map(|slot| slot.lock().unwrap().take())
    }
}

// ---------------------------------------------------------------------
// Dumper
// ---------------------------------------------------------------------

pub struct Dumper {
    options: DumpOptions,
    directory: Arc<dyn Directory>,
    console: Arc<dyn Console>,
    session_factory: Arc<SessionFactory>,
    interrupt: Arc<AtomicBool>,
}

impl Dumper {
    pub fn new(
        options: DumpOptions,
        directory: Arc<dyn Directory>,
        console: Arc<dyn Console>,
        session_factory: SessionFactory,
    ) -> Self {
        Self {
            options,
            directory,
            console,
            session_factory: Arc::new(session_factory),
            interrupt: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Handle a caller can use to request cancellation (e.g. from a signal
    /// handler), per spec §5 "a single process-wide interrupt flag (volatile
    /// boolean) set from a signal handler".
    pub fn interrupt_handle(&self) -> Arc<AtomicBool> {
        self.interrupt.clone()
    }

    /// Runs the full state-machine pipeline from spec §4.8:
    /// `Init → PlanSchemas → ValidateCompatibility → CreateOutputDir →
    /// AcquireGlobalReadLock → SpawnWorkers → WaitTxnBarrier →
    /// ReleaseGlobalReadLock → EnqueueDDL → EnqueueChunking → Drain →
    /// Finalize → (on error) EmergencyShutdown`.
    pub fn run(&self, plan: DumpPlan) -> Result<DumpReport> {
        self.options.validate().map_err(DumpError::Configuration)?;
        self.create_output_dir()?;

        let mut control = (self.session_factory)()?;
        let dump_info = self.fetch_dump_info(control.as_mut())?;
        let (schema_tasks, tables, views, schema_ddl_plans) = self.plan_schemas(control.as_mut(), &plan)?;
        self.validate_compatibility(control.as_mut(), &tables, &views)?;

        let basenames: HashMap<String, String> =
            schema_tasks.iter().map(|s| (s.name.clone(), s.basename.clone())).collect();

        self.write_dump_start_manifest(&dump_info, &schema_tasks, &basenames, &plan)?;

        if self.options.dry_run {
            self.console.print_info("dry run: planning complete, no data written");
            return Ok(DumpReport::default());
        }

        let n_workers = self.options.threads.max(1);
        let counters = Arc::new(Counters::default());
        let thread_states = Arc::new(ThreadStates::new(n_workers));
        let table_data_bytes = Arc::new(Mutex::new(AHashMap::new()));
        let ddl_issues = Arc::new(Mutex::new(AHashMap::new()));
        let queue: Arc<TaskQueue<Task>> = Arc::new(TaskQueue::new());
        let errors = ErrorSink::new(n_workers);

        let ctx = Arc::new(WorkerContext {
            interrupt: self.interrupt.clone(),
            directory: self.directory.clone(),
            queue: queue.clone(),
            counters: counters.clone(),
            thread_states: thread_states.clone(),
            table_data_bytes: table_data_bytes.clone(),
            ddl_issues: ddl_issues.clone(),
            dialect: self.options.dialect,
            compression: self.options.compression,
            use_base64: self.options.use_base64,
            max_rate_bytes_per_sec: self.options.max_rate,
            rate_limit_stride: RATE_LIMIT_STRIDE,
            charset: self.options.charset.clone(),
            time_zone_utc: self.options.time_zone_utc,
            console: self.console.clone(),
        });

        if self.options.consistent {
            self.acquire_global_read_lock(control.as_mut())?;
        }

        let barrier = Arc::new(TxnBarrier::new(n_workers));
        let connection_ids: Arc<Mutex<Vec<u64>>> = Arc::new(Mutex::new(Vec::new()));
        let progress = ProgressReporter::start(counters.clone(), thread_states.clone(), self.console.clone());

        let handles = self.spawn_workers(n_workers, &ctx, &barrier, &errors, &connection_ids)?;

        barrier.wait();

        if self.options.consistent {
            self.release_global_read_lock(control.as_mut())?;
        }
        self.console.print_status(&format!(
            "consistent snapshot established across {n_workers} worker sessions"
        ));

        let monitor = self.spawn_emergency_monitor(&queue, n_workers, &connection_ids, &errors);

        self.enqueue_ddl(&queue, &tables, &views, &schema_ddl_plans, &plan, &errors);
        self.enqueue_chunking(&queue, &tables, n_workers, &errors);

        for h in handles {
            let _ = h.join();
        }
        monitor.stop();
        progress.stop();

        if let Some(err) = errors.take_first() {
            self.emergency_cleanup();
            return Err(DumpError::Fatal(format!("dump failed: {err}")));
        }
        if self.interrupt.load(Ordering::Relaxed) {
            self.emergency_cleanup();
            return Err(DumpError::Interrupted);
        }

        self.finalize(&dump_info, &schema_tasks, &tables, &views, &counters, &table_data_bytes, &ddl_issues)
    }

    // -- phases --------------------------------------------------------

    fn create_output_dir(&self) -> Result<()> {
        if self.directory.exists() {
            let files = self.directory.list_files(false)?;
            if !files.is_empty() {
                return Err(DumpError::Configuration(format!(
                    "output directory `{}` is not empty",
                    self.directory.full_path()
                )));
            }
        } else {
            self.directory.create()?;
        }
        Ok(())
    }

    fn fetch_dump_info(&self, control: &mut dyn Session) -> Result<DumpInfo> {
        let (major, minor, patch) = control.get_server_version();
        let hostname = control
            .query_rows("SELECT @@GLOBAL.HOSTNAME")?
            .first()
            .and_then(|r| r.get_as_string(0))
            .unwrap_or_default();
        let gtid_executed = control
            .query_rows("SELECT @@GLOBAL.GTID_EXECUTED")?
            .first()
            .and_then(|r| r.get_as_string(0))
            .filter(|s| !s.is_empty());
        Ok(DumpInfo {
            server_version: format!("{major}.{minor}.{patch}"),
            hostname,
            begin: Some(Utc::now()),
            end: None,
            gtid_executed,
            consistent: self.options.consistent,
        })
    }

    fn estimate_table_size(&self, control: &mut dyn Session, schema: &str, table: &str) -> Result<(u64, u64)> {
        let rows = control.query_rows(&format!(
            "SELECT TABLE_ROWS, AVG_ROW_LENGTH FROM information_schema.tables \
             WHERE TABLE_SCHEMA='{schema}' AND TABLE_NAME='{table}'"
        ))?;
        let row = rows.first();
        let row_count = row.and_then(|r| r.get_uint(0)).unwrap_or(0);
        // Fixture/minimal `Session` implementations may only populate the
        // first projected column; guard against a short row rather than
        // indexing past its end.
        let avg_row_length = row
            .filter(|r| r.num_fields() > 1)
            .and_then(|r| r.get_uint(1))
            .filter(|v| *v > 0)
            .unwrap_or(DEFAULT_AVG_ROW_LENGTH);
        Ok((row_count, avg_row_length))
    }

    fn plan_schemas(
        &self,
        control: &mut dyn Session,
        plan: &DumpPlan,
    ) -> Result<(Vec<SchemaTask>, Vec<TableInfo>, Vec<ViewPlanned>, Vec<SchemaDdlPlanned>)> {
        let mut registry = BasenameRegistry::new();
        let mut schema_tasks = Vec::new();
        let mut tables = Vec::new();
        let mut views = Vec::new();
        let mut schema_ddl_plans = Vec::new();

        for schema in &plan.schemas {
            let schema_basename = registry.get_basename(&basename::encode_schema_basename(&schema.name));

            let mut table_names = Vec::new();
            for t in &schema.tables {
                let table_basename =
                    registry.get_basename(&basename::encode_table_basename(&schema.name, &t.name));
                let (row_count_estimate, avg_row_length) =
                    self.estimate_table_size(control, &schema.name, &t.name)?;
                tables.push(TableInfo {
                    schema: schema.name.clone(),
                    name: t.name.clone(),
                    basename: table_basename,
                    row_count_estimate,
                    avg_row_length,
                    index: choose_index(&t.indexes),
                    columns: t.columns.clone(),
                    triggers: t.triggers.clone(),
                });
                table_names.push(t.name.clone());
            }

            let mut view_names = Vec::new();
            for v in &schema.views {
                let view_basename =
                    registry.get_basename(&basename::encode_table_basename(&schema.name, &v.name));
                views.push(ViewPlanned {
                    schema: schema.name.clone(),
                    name: v.name.clone(),
                    basename: view_basename,
                    column_names: v.column_names.clone(),
                });
                view_names.push(v.name.clone());
            }

            schema_ddl_plans.push(SchemaDdlPlanned {
                name: schema.name.clone(),
                basename: schema_basename.clone(),
                events: schema.events.clone(),
                routines: schema.routines.clone(),
            });

            schema_tasks.push(SchemaTask {
                name: schema.name.clone(),
                basename: schema_basename,
                tables: table_names,
                views: view_names,
                events: schema.events.clone(),
                routines: schema.routines.iter().map(|r| r.name.clone()).collect(),
            });
        }

        Ok((schema_tasks, tables, views, schema_ddl_plans))
    }

    /// Validation-mode pre-flight: every table's and view's DDL compatibility
    /// is surfaced here (spec §4.4 "Validation mode surfaces every issue
    /// without writing"; spec §7 "Compatibility" errors), so an unfixable
    /// issue is reported before any worker is spawned rather than discovered
    /// mid-dump. Only runs when a compatibility target is actually
    /// configured — otherwise no rewrite ever produces an `unfixed` issue.
    fn validate_compatibility(
        &self,
        control: &mut dyn Session,
        tables: &[TableInfo],
        views: &[ViewPlanned],
    ) -> Result<()> {
        if !self.options.compatibility.mds_compatibility && self.options.compatibility.unsupported_engines.is_empty()
        {
            return Ok(());
        }

        let mut unfixed = Vec::new();
        for t in tables {
            let obj = ddl::capture_table_ddl(control, &t.schema, &t.name, &self.options.compatibility)?;
            unfixed.extend(
                obj.issues
                    .into_iter()
                    .filter(|i| !i.fixed)
                    .map(|i| format!("`{}`.`{}`: {}", t.schema, t.name, i.description)),
            );
        }
        for v in views {
            let obj = ddl::capture_view_ddl(control, &v.schema, &v.name, &v.column_names, &self.options.compatibility)?;
            unfixed.extend(
                obj.real_ddl
                    .issues
                    .into_iter()
                    .filter(|i| !i.fixed)
                    .map(|i| format!("`{}`.`{}`: {}", v.schema, v.name, i.description)),
            );
        }

        if unfixed.is_empty() {
            return Ok(());
        }

        // Validation mode surfaces every issue without writing (spec §4.4);
        // only dump mode treats an unfixed issue as fatal.
        if self.options.dry_run {
            for msg in &unfixed {
                self.console.print_warning(msg);
            }
            return Ok(());
        }

        Err(DumpError::Compatibility(format!(
            "{} unfixable compatibility issue(s): {}",
            unfixed.len(),
            unfixed.join("; ")
        )))
    }

    fn acquire_global_read_lock(&self, control: &mut dyn Session) -> Result<()> {
        control.execute("FLUSH TABLES WITH READ LOCK").map_err(|e| match e {
            DumpError::Transient(msg) | DumpError::Fatal(msg) => DumpError::Permission(format!(
                "could not acquire global read lock ({msg}); needs RELOAD/BACKUP_ADMIN/LOCK TABLES privilege"
            )),
            other => other,
        })
    }

    fn release_global_read_lock(&self, control: &mut dyn Session) -> Result<()> {
        control.execute("UNLOCK TABLES")
    }

    fn spawn_workers(
        &self,
        n_workers: usize,
        ctx: &Arc<WorkerContext>,
        barrier: &Arc<TxnBarrier>,
        errors: &ErrorSink,
        connection_ids: &Arc<Mutex<Vec<u64>>>,
    ) -> Result<Vec<thread::JoinHandle<()>>> {
        let mut handles = Vec::with_capacity(n_workers);
        for id in 0..n_workers {
            let session = (self.session_factory)()?;
            let ctx = ctx.clone();
            let barrier = barrier.clone();
            let consistent = self.options.consistent;
            let errors = errors.clone();
            let connection_ids = connection_ids.clone();

            let handle = thread::Builder::new()
                .name(format!("worker-{id}"))
                .spawn(move || {
                    let mut worker = match Worker::new(id, session, ctx) {
                        Ok(w) => w,
                        Err(e) => {
                            errors.record(id, e);
                            barrier.notify();
                            return;
                        }
                    };
                    connection_ids.lock().unwrap().push(worker.connection_id());
                    if consistent {
                        if let Err(e) = worker.start_consistent_transaction() {
                            errors.record(id, e);
                            barrier.notify();
                            return;
                        }
                    }
                    barrier.notify();
                    if let Err(e) = worker.run() {
                        if !matches!(e, DumpError::Interrupted) {
                            errors.record(id, e);
                        }
                    }
                })
                .map_err(|e| DumpError::Fatal(format!("failed to spawn worker thread: {e}")))?;
            handles.push(handle);
        }
        Ok(handles)
    }

    /// Watches the interrupt flag and, the moment it flips (set either by a
    /// task that hit an error or by an external caller via
    /// [`Dumper::interrupt_handle`]), performs spec §4.8's emergency
    /// shutdown: push `n_workers` sentinels and `KILL QUERY` every worker's
    /// connection id from a fresh side-session.
    fn spawn_emergency_monitor(
        &self,
        queue: &Arc<TaskQueue<Task>>,
        n_workers: usize,
        connection_ids: &Arc<Mutex<Vec<u64>>>,
        errors: &ErrorSink,
    ) -> MonitorHandle {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = stop.clone();
        let interrupt = self.interrupt.clone();
        let queue = queue.clone();
        let connection_ids = connection_ids.clone();
        let session_factory_unavailable = errors.clone();
        let console = self.console.clone();
        let kill_session = self.session_factory.clone();

        let handle = thread::Builder::new()
            .name("emergency-monitor".into())
            .spawn(move || {
                let mut fired = false;
                while !stop_flag.load(Ordering::Relaxed) {
                    if interrupt.load(Ordering::Relaxed) && !fired {
                        fired = true;
                        queue.shutdown(n_workers);
                        for id in connection_ids.lock().unwrap().iter().copied() {
                            match kill_session() {
                                Ok(mut side) => {
                                    if let Err(e) = side.execute(&format!("KILL QUERY {id}")) {
                                        console.print_warning(&format!("KILL QUERY {id} failed: {e}"));
                                    }
                                }
                                Err(e) => {
                                    session_factory_unavailable.record(0, e);
                                }
                            }
                        }
                    }
                    thread::sleep(MONITOR_POLL_INTERVAL);
                }
            })
            .expect("failed to spawn emergency-monitor thread");

        MonitorHandle { stop, handle: Some(handle) }
    }

    // -- enqueue ---------------------------------------------------------

    fn enqueue_ddl(
        &self,
        queue: &Arc<TaskQueue<Task>>,
        tables: &[TableInfo],
        views: &[ViewPlanned],
        schema_ddl_plans: &[SchemaDdlPlanned],
        plan: &DumpPlan,
        errors: &ErrorSink,
    ) {
        if !self.options.dump_ddl {
            return;
        }

        if self.options.dump_schema_ddl {
            for s in schema_ddl_plans {
                queue.push(
                    Priority::High,
                    ddl_schema_task(
                        s.clone(),
                        self.options.dump_events,
                        self.options.dump_routines,
                        self.options.compatibility.clone(),
                        errors.clone(),
                    ),
                );
            }
        }

        for t in tables {
            queue.push(
                Priority::High,
                ddl_table_task(t.clone(), self.options.compatibility.clone(), errors.clone()),
            );
            if self.options.dump_triggers && !t.triggers.is_empty() {
                queue.push(
                    Priority::High,
                    ddl_triggers_task(t.clone(), self.options.compatibility.clone(), errors.clone()),
                );
            }
        }

        for v in views {
            queue.push(
                Priority::High,
                ddl_view_task(v.clone(), self.options.compatibility.clone(), errors.clone()),
            );
        }

        if self.options.dump_users {
            let selected: Vec<UserSpec> = plan
                .users
                .iter()
                .filter(|u| user_selected(u, &self.options.included_users, &self.options.excluded_users))
                .cloned()
                .collect();
            if !selected.is_empty() {
                queue.push(Priority::High, ddl_users_task(selected, errors.clone()));
            }
        }
    }

    fn enqueue_chunking(&self, queue: &Arc<TaskQueue<Task>>, tables: &[TableInfo], n_workers: usize, errors: &ErrorSink) {
        if tables.is_empty() {
            queue.shutdown(n_workers);
            return;
        }
        let remaining = Arc::new(AtomicUsize::new(tables.len()));
        let bytes_per_chunk = self.options.bytes_per_chunk;
        let dump_data = self.options.dump_data;
        let split = self.options.split;
        for t in tables {
            queue.push(
                Priority::Medium,
                chunking_task(
                    t.clone(),
                    bytes_per_chunk,
                    dump_data,
                    split,
                    n_workers,
                    remaining.clone(),
                    errors.clone(),
                ),
            );
        }
    }

    // -- finalize ---------------------------------------------------------

    fn write_dump_start_manifest(
        &self,
        dump_info: &DumpInfo,
        schema_tasks: &[SchemaTask],
        basenames: &HashMap<String, String>,
        plan: &DumpPlan,
    ) -> Result<()> {
        let manifest = DumpStartManifest {
            dumper: "shelldump".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            schemas: schema_tasks.iter().map(|s| s.name.clone()).collect(),
            basenames: basenames.clone(),
            users: plan.users.iter().map(|u| format!("{}@{}", u.user, u.host)).collect(),
            default_character_set: self.options.charset.clone(),
            tz_utc: self.options.time_zone_utc,
            table_only: false,
            user: String::new(),
            hostname: dump_info.hostname.clone(),
            server: "mysql".to_string(),
            server_version: dump_info.server_version.clone(),
            gtid_executed: dump_info.gtid_executed.clone(),
            consistent: dump_info.consistent,
            mds_compatibility: self.options.compatibility.mds_compatibility,
            begin: dump_info.begin.unwrap_or_else(Utc::now),
        };
        write_json_file(self.directory.as_ref(), "@.json", &manifest)
    }

    fn finalize(
        &self,
        dump_info: &DumpInfo,
        schema_tasks: &[SchemaTask],
        tables: &[TableInfo],
        views: &[ViewPlanned],
        counters: &Arc<Counters>,
        table_data_bytes: &Arc<Mutex<AHashMap<(String, String), u64>>>,
        ddl_issues: &Arc<Mutex<AHashMap<(String, String), Vec<ddl::Issue>>>>,
    ) -> Result<DumpReport> {
        for schema in schema_tasks {
            let manifest = SchemaManifest {
                tables: schema.tables.clone(),
                views: schema.views.clone(),
                events: schema.events.clone(),
                routines: schema.routines.clone(),
            };
            write_json_file(self.directory.as_ref(), &format!("{}.json", schema.basename), &manifest)?;
        }

        let issues_map = ddl_issues.lock().unwrap();
        for t in tables {
            let issues = issues_map.get(&(t.schema.clone(), t.name.clone())).cloned().unwrap_or_default();
            self.write_table_manifest(t, &issues)?;
        }
        for v in views {
            let issues = issues_map.get(&(v.schema.clone(), v.name.clone())).cloned().unwrap_or_default();
            self.write_view_manifest(v, &issues)?;
        }
        drop(issues_map);

        write_ddl_sink(self.directory.as_ref(), "@.sql", "-- shelldump global DDL prologue\n")?;
        write_ddl_sink(self.directory.as_ref(), "@.post.sql", "-- shelldump global DDL epilogue\n")?;

        let snapshot = counters.snapshot();
        let table_data_bytes_map = table_data_bytes.lock().unwrap();
        let mut nested: HashMap<String, HashMap<String, u64>> = HashMap::new();
        for ((schema, table), bytes) in table_data_bytes_map.iter() {
            nested.entry(schema.clone()).or_default().insert(table.clone(), *bytes);
        }

        let end_manifest = DumpEndManifest {
            end: Utc::now(),
            data_bytes: snapshot.data_bytes,
            table_data_bytes: nested.clone(),
        };
        write_json_file(self.directory.as_ref(), "@.done.json", &end_manifest)?;

        let _ = dump_info;
        Ok(DumpReport {
            rows: snapshot.rows,
            data_bytes: snapshot.data_bytes,
            bytes_written: snapshot.bytes_written,
            table_data_bytes: nested,
        })
    }

    fn write_table_manifest(&self, t: &TableInfo, issues: &[ddl::Issue]) -> Result<()> {
        let columns = t
            .columns
            .iter()
            .map(|c| ColumnManifest {
                name: c.name.clone(),
                decode: ColumnDecode::for_csv_unsafe(c.csv_unsafe, self.options.use_base64),
            })
            .collect();
        let manifest = TableManifest {
            schema: t.schema.clone(),
            table: t.name.clone(),
            columns,
            primary_index: t.index.as_ref().map(|i| i.name.clone()),
            compression: self.options.compression,
            dialect: DialectManifest::from(self.options.dialect),
            histograms: Vec::new(),
            includes_data: self.options.dump_data,
            includes_ddl: self.options.dump_ddl,
            chunking: t.index.is_some() && self.options.split,
            extension: format!(
                "{}{}",
                self.options.dialect.file_extension(),
                self.options.compression.extension_suffix()
            ),
            issues: issues.iter().map(IssueManifest::from).collect(),
        };
        write_json_file(self.directory.as_ref(), &format!("{}.json", t.basename), &manifest)
    }

    fn write_view_manifest(&self, v: &ViewPlanned, issues: &[ddl::Issue]) -> Result<()> {
        let manifest = TableManifest {
            schema: v.schema.clone(),
            table: v.name.clone(),
            columns: v
                .column_names
                .iter()
                .map(|c| ColumnManifest { name: c.clone(), decode: ColumnDecode::None })
                .collect(),
            primary_index: None,
            compression: Compression::None,
            dialect: DialectManifest::from(self.options.dialect),
            histograms: Vec::new(),
            includes_data: false,
            includes_ddl: self.options.dump_ddl,
            chunking: false,
            extension: String::new(),
            issues: issues.iter().map(IssueManifest::from).collect(),
        };
        write_json_file(self.directory.as_ref(), &format!("{}.json", v.basename), &manifest)
    }

    /// Leaves `.dumping` orphans in place and skips the final manifest
    /// (spec §4.8/§7): nothing to actually delete, this exists as the named
    /// phase so callers (and a future reader of this file) can see where
    /// "do not write final manifest, leave `.dumping` files" is honored.
    fn emergency_cleanup(&self) {
        self.console.print_error("dump aborted; partial .dumping files left in place");
    }
}

struct MonitorHandle {
    stop: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl MonitorHandle {
    fn stop(mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(h) = self.handle.take() {
            let _ = h.join();
        }
    }
}

// ---------------------------------------------------------------------
// Task builders
// ---------------------------------------------------------------------

fn write_ddl_sink(directory: &dyn Directory, file_name: &str, text: &str) -> Result<()> {
    let mut sink = Sink::create(directory, file_name, Compression::None, false)?;
    sink.write_row(text.as_bytes())?;
    sink.finish()?;
    Ok(())
}

fn write_json_file<T: serde::Serialize>(directory: &dyn Directory, name: &str, value: &T) -> Result<()> {
    let json = serde_json::to_vec_pretty(value)
        .map_err(|e| DumpError::Fatal(format!("failed to serialize {name}: {e}")))?;
    let mut file = directory.file(name);
    file.open(FileMode::Write)?;
    file.write(&json)?;
    file.close()?;
    Ok(())
}

/// `*`-wildcard match against `user@host`, used for `included_users`/
/// `excluded_users` (spec §6). Empty `included` means "all users included".
fn user_selected(user: &UserSpec, included: &[String], excluded: &[String]) -> bool {
    let account = format!("{}@{}", user.user, user.host);
    let included_ok = included.is_empty() || included.iter().any(|p| glob_match(p, &account));
    let excluded_hit = excluded.iter().any(|p| glob_match(p, &account));
    included_ok && !excluded_hit
}

/// Minimal `*`-only glob match (no `?`/character classes), sufficient for
/// `user@host` account patterns.
fn glob_match(pattern: &str, text: &str) -> bool {
    fn rec(pattern: &[u8], text: &[u8]) -> bool {
        match pattern.first() {
            None => text.is_empty(),
            Some(b'*') => rec(&pattern[1..], text) || (!text.is_empty() && rec(pattern, &text[1..])),
            Some(&c) => !text.is_empty() && c == text[0] && rec(&pattern[1..], &text[1..]),
        }
    }
    rec(pattern.as_bytes(), text.as_bytes())
}

/// Reports every compatibility fix that was applied without blocking the
/// dump (spec §7 `note`: "compatibility fix applied").
fn log_fixed_issues(console: &dyn Console, schema: &str, name: &str, issues: &[ddl::Issue]) {
    for issue in issues {
        if issue.fixed {
            console.print_note(&format!("`{schema}`.`{name}`: {}", issue.description));
        }
    }
}

fn ddl_schema_task(
    schema: SchemaDdlPlanned,
    dump_events: bool,
    dump_routines: bool,
    opts: CompatibilityOptions,
    errors: ErrorSink,
) -> Task {
    Box::new(move |worker: &mut Worker| {
        worker.ctx().thread_states.set(
            worker.id,
            ThreadState::CapturingDdl { schema: schema.name.clone(), table: String::new() },
        );
        let result = (|| -> Result<()> {
            let schema_obj = ddl::capture_schema_ddl(worker.session_mut(), &schema.name, &opts)?;
            log_fixed_issues(worker.ctx().console.as_ref(), &schema.name, &schema.name, &schema_obj.issues);
            let mut text = schema_obj.ddl;
            text.push_str(";\n");

            if dump_events {
                for event in &schema.events {
                    let obj = ddl::capture_event_ddl(worker.session_mut(), &schema.name, event, &opts)?;
                    log_fixed_issues(worker.ctx().console.as_ref(), &schema.name, event, &obj.issues);
                    text.push_str(&obj.ddl);
                    text.push_str(";\n");
                }
            }
            if dump_routines {
                for routine in &schema.routines {
                    let obj = ddl::capture_routine_ddl(
                        worker.session_mut(),
                        &schema.name,
                        &routine.name,
                        routine.is_function,
                        &opts,
                    )?;
                    log_fixed_issues(worker.ctx().console.as_ref(), &schema.name, &routine.name, &obj.issues);
                    text.push_str(&obj.ddl);
                    text.push_str(";\n");
                }
            }

            write_ddl_sink(worker.ctx().directory.as_ref(), &format!("{}.sql", schema.basename), &text)
        })();
        if let Err(e) = result {
            errors.record(worker.id, e);
            worker.ctx().interrupt.store(true, Ordering::Relaxed);
        }
    })
}

/// `<tableBasename>.triggers.sql` (spec §6 `dump_triggers`), gated on the
/// table actually having triggers, mirroring `Dumper::dump_triggers` in
/// `examples/original_source/modules/util/dump/dumper.cc`.
fn ddl_triggers_task(table: TableInfo, opts: CompatibilityOptions, errors: ErrorSink) -> Task {
    Box::new(move |worker: &mut Worker| {
        let result = (|| -> Result<()> {
            let mut text = String::new();
            for trigger in &table.triggers {
                let obj = ddl::capture_trigger_ddl(worker.session_mut(), &table.schema, trigger, &opts)?;
                log_fixed_issues(worker.ctx().console.as_ref(), &table.schema, trigger, &obj.issues);
                text.push_str(&obj.ddl);
                text.push_str(";\n");
            }
            write_ddl_sink(
                worker.ctx().directory.as_ref(),
                &format!("{}.triggers.sql", table.basename),
                &text,
            )
        })();
        if let Err(e) = result {
            errors.record(worker.id, e);
            worker.ctx().interrupt.store(true, Ordering::Relaxed);
        }
    })
}

fn ddl_table_task(table: TableInfo, opts: CompatibilityOptions, errors: ErrorSink) -> Task {
    Box::new(move |worker: &mut Worker| {
        worker.ctx().thread_states.set(
            worker.id,
            ThreadState::CapturingDdl { schema: table.schema.clone(), table: table.name.clone() },
        );
        let result = ddl::capture_table_ddl(worker.session_mut(), &table.schema, &table.name, &opts)
            .and_then(|obj| {
                log_fixed_issues(worker.ctx().console.as_ref(), &table.schema, &table.name, &obj.issues);
                worker
                    .ctx()
                    .ddl_issues
                    .lock()
                    .unwrap()
                    .insert((table.schema.clone(), table.name.clone()), obj.issues.clone());
                let file_name = format!("{}.sql", table.basename);
                write_ddl_sink(worker.ctx().directory.as_ref(), &file_name, &obj.ddl)?;
                if !obj.issues.iter().any(|i| !i.fixed) {
                    Ok(())
                } else {
                    Err(DumpError::Compatibility(format!(
                        "unfixable DDL issue for `{}`.`{}`",
                        table.schema, table.name
                    )))
                }
            });
        if let Err(e) = result {
            errors.record(worker.id, e);
            worker.ctx().interrupt.store(true, Ordering::Relaxed);
        }
    })
}

fn ddl_view_task(view: ViewPlanned, opts: CompatibilityOptions, errors: ErrorSink) -> Task {
    Box::new(move |worker: &mut Worker| {
        worker.ctx().thread_states.set(
            worker.id,
            ThreadState::CapturingDdl { schema: view.schema.clone(), table: view.name.clone() },
        );
        let result = ddl::capture_view_ddl(worker.session_mut(), &view.schema, &view.name, &view.column_names, &opts)
            .and_then(|v| {
                write_ddl_sink(
                    worker.ctx().directory.as_ref(),
                    &format!("{}.pre.sql", view.basename),
                    &v.placeholder_ddl,
                )?;
                write_ddl_sink(worker.ctx().directory.as_ref(), &format!("{}.sql", view.basename), &v.real_ddl.ddl)?;
                log_fixed_issues(worker.ctx().console.as_ref(), &view.schema, &view.name, &v.real_ddl.issues);
                worker
                    .ctx()
                    .ddl_issues
                    .lock()
                    .unwrap()
                    .insert((view.schema.clone(), view.name.clone()), v.real_ddl.issues.clone());
                if v.real_ddl.issues.iter().any(|i| !i.fixed) {
                    return Err(DumpError::Compatibility(format!(
                        "unfixable view DDL issue for `{}`.`{}`",
                        view.schema, view.name
                    )));
                }
                Ok(())
            });
        if let Err(e) = result {
            errors.record(worker.id, e);
            worker.ctx().interrupt.store(true, Ordering::Relaxed);
        }
    })
}

fn ddl_users_task(users: Vec<UserSpec>, errors: ErrorSink) -> Task {
    Box::new(move |worker: &mut Worker| {
        let mut text = String::new();
        for u in &users {
            match ddl::capture_user_ddl(worker.session_mut(), &u.user, &u.host) {
                Ok(obj) => {
                    text.push_str(&obj.ddl);
                    text.push_str(";\n");
                }
                Err(e) => {
                    errors.record(worker.id, e);
                    worker.ctx().interrupt.store(true, Ordering::Relaxed);
                    return;
                }
            }
        }
        if let Err(e) = write_ddl_sink(worker.ctx().directory.as_ref(), "@.users.sql", &text) {
            errors.record(worker.id, e);
            worker.ctx().interrupt.store(true, Ordering::Relaxed);
        }
    })
}

fn chunking_task(
    table: TableInfo,
    bytes_per_chunk: u64,
    dump_data: bool,
    split: bool,
    n_workers: usize,
    remaining: Arc<AtomicUsize>,
    errors: ErrorSink,
) -> Task {
    Box::new(move |worker: &mut Worker| {
        if dump_data {
            worker.ctx().thread_states.set(
                worker.id,
                ThreadState::Chunking { schema: table.schema.clone(), table: table.name.clone() },
            );
            // `split=false` (spec §6) disables chunking outright: the table
            // streams as a single chunk regardless of whether it has a
            // usable key.
            let key = if split { table.key_column() } else { None };
            let plan_result = chunker::plan_chunks(
                worker.session_mut(),
                &table.schema,
                &table.name,
                key.as_ref(),
                table.row_count_estimate,
                table.avg_row_length,
                bytes_per_chunk,
            );
            match plan_result {
                Ok(chunks) => {
                    let queue = worker.ctx().queue.clone();
                    for chunk in chunks {
                        let table = table.clone();
                        let errors = errors.clone();
                        queue.push(
                            Priority::Low,
                            Box::new(move |worker: &mut Worker| {
                                if let Err(e) = worker.stream_chunk(&table, &chunk) {
                                    errors.record(worker.id, e);
                                    worker.ctx().interrupt.store(true, Ordering::Relaxed);
                                }
                            }),
                        );
                    }
                }
                Err(e) => {
                    errors.record(worker.id, e);
                    worker.ctx().interrupt.store(true, Ordering::Relaxed);
                }
            }
        }

        // Last chunking task to finish triggers the ordered shutdown (spec
        // §4.8 "maybe_push_shutdown_tasks"): no more chunking (and thus no
        // more streaming) work will ever be produced once every table's
        // chunking task has run.
        if remaining.fetch_sub(1, Ordering::SeqCst) == 1 {
            worker.ctx().queue.shutdown(n_workers);
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{ColumnType, FixtureColumn, FixtureSession, FixtureTable, LocalDirectory, StdConsole};
    use std::sync::Mutex as StdMutex;

    fn session_factory_over(fixture: Arc<StdMutex<FixtureSession>>) -> SessionFactory {
        Box::new(move || {
            let guard = fixture.lock().unwrap();
            Ok(Box::new(guard.clone()) as Box<dyn Session>)
        })
    }

    #[test]
    fn choose_index_prefers_primary_key() {
        let candidates = vec![
            IndexMeta { name: "uniq_email".into(), is_primary: false },
            IndexMeta { name: "id".into(), is_primary: true },
        ];
        let chosen = choose_index(&candidates).unwrap();
        assert_eq!(chosen.name, "id");
    }

    #[test]
    fn choose_index_falls_back_to_first_unique() {
        let candidates = vec![IndexMeta { name: "uniq_email".into(), is_primary: false }];
        let chosen = choose_index(&candidates).unwrap();
        assert_eq!(chosen.name, "uniq_email");
    }

    #[test]
    fn choose_index_is_none_without_candidates() {
        assert!(choose_index(&[]).is_none());
    }

    #[test]
    fn end_to_end_dump_of_two_row_table_to_csv() {
        let mut fixture = FixtureSession::new();
        fixture.add_table(
            "s",
            "t",
            FixtureTable {
                columns: vec![
                    FixtureColumn { name: "id".into(), ty: ColumnType::Int },
                    FixtureColumn { name: "v".into(), ty: ColumnType::String },
                ],
                key_index: Some(0),
                rows: vec![
                    vec![Some(b"1".to_vec()), Some(b"a".to_vec())],
                    vec![Some(b"2".to_vec()), Some(b"c,d".to_vec())],
                ],
                create_ddl: "CREATE TABLE `t` (id INT PRIMARY KEY, v VARCHAR(10))".into(),
            },
        );
        let fixture = Arc::new(StdMutex::new(fixture));

        let tmp = tempfile::tempdir().unwrap();
        let directory: Arc<dyn Directory> = Arc::new(LocalDirectory::new(tmp.path()));
        let console: Arc<dyn Console> = Arc::new(StdConsole);

        let mut options = DumpOptions::default();
        options.output_url = tmp.path().display().to_string();
        options.threads = 1;
        options.consistent = false;
        options.dialect = crate::dialect::Dialect::Csv;
        options.dump_users = false;

        let dumper = Dumper::new(options, directory, console, session_factory_over(fixture));

        let plan = DumpPlan {
            schemas: vec![SchemaPlan {
                name: "s".into(),
                tables: vec![TableSpec {
                    name: "t".into(),
                    columns: vec![
                        ColumnMeta { name: "id".into(), ty: ColumnType::Int, csv_unsafe: false },
                        ColumnMeta { name: "v".into(), ty: ColumnType::String, csv_unsafe: false },
                    ],
                    indexes: vec![IndexMeta { name: "id".into(), is_primary: true }],
                    triggers: vec![],
                }],
                views: vec![],
                routines: vec![],
                events: vec![],
            }],
            users: vec![],
        };

        let report = dumper.run(plan).unwrap();
        assert_eq!(report.rows, 2);
        assert!(tmp.path().join("@.json").exists());
        assert!(tmp.path().join("@.done.json").exists());
        assert!(tmp.path().join("s.json").exists());
        assert!(tmp.path().join("s@t.json").exists());
        assert!(tmp.path().join("s@t.sql").exists());
        assert!(tmp.path().join("s.sql").exists(), "schema DDL is written by default");

        let data_files: Vec<_> = std::fs::read_dir(tmp.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .filter(|n| n.starts_with("s@t@"))
            .collect();
        assert!(data_files.iter().any(|n| n.ends_with(".csv")));
    }

    #[test]
    fn glob_match_supports_wildcard() {
        assert!(glob_match("app_reader", "app_reader")); // no wildcard: exact match only
        assert!(glob_match("*", "anything"));
        assert!(glob_match("app_*@%", "app_reader@%"));
        assert!(!glob_match("app_*@localhost", "app_reader@%"));
    }

    #[test]
    fn user_selected_honors_included_and_excluded() {
        let u = UserSpec { user: "app_reader".into(), host: "%".into() };
        assert!(user_selected(&u, &[], &[]));
        assert!(user_selected(&u, &["app_*@%".into()], &[]));
        assert!(!user_selected(&u, &["admin@%".into()], &[]));
        assert!(!user_selected(&u, &[], &["app_*@%".into()]));
    }

    #[test]
    fn end_to_end_dump_writes_trigger_and_schema_ddl_and_filters_users() {
        let mut fixture = FixtureSession::new();
        fixture.add_table(
            "s",
            "t",
            FixtureTable {
                columns: vec![FixtureColumn { name: "id".into(), ty: ColumnType::Int }],
                key_index: Some(0),
                rows: vec![vec![Some(b"1".to_vec())]],
                create_ddl: "CREATE TABLE `t` (id INT PRIMARY KEY)".into(),
            },
        );
        let fixture = Arc::new(StdMutex::new(fixture));

        let tmp = tempfile::tempdir().unwrap();
        let directory: Arc<dyn Directory> = Arc::new(LocalDirectory::new(tmp.path()));
        let console: Arc<dyn Console> = Arc::new(StdConsole);

        let mut options = DumpOptions::default();
        options.output_url = tmp.path().display().to_string();
        options.threads = 1;
        options.consistent = false;
        options.dump_users = true;
        options.included_users = vec!["app_*@%".into()];

        let dumper = Dumper::new(options, directory, console, session_factory_over(fixture));

        let plan = DumpPlan {
            schemas: vec![SchemaPlan {
                name: "s".into(),
                tables: vec![TableSpec {
                    name: "t".into(),
                    columns: vec![ColumnMeta { name: "id".into(), ty: ColumnType::Int, csv_unsafe: false }],
                    indexes: vec![IndexMeta { name: "id".into(), is_primary: true }],
                    triggers: vec!["t_before_insert".into()],
                }],
                views: vec![],
                routines: vec![RoutineSpec { name: "r1".into(), is_function: false }],
                events: vec!["e1".into()],
            }],
            users: vec![
                UserSpec { user: "app_reader".into(), host: "%".into() },
                UserSpec { user: "admin".into(), host: "localhost".into() },
            ],
        };

        dumper.run(plan).unwrap();

        assert!(tmp.path().join("s@t.triggers.sql").exists());
        assert!(tmp.path().join("s.json").exists());
        let schema_ddl = std::fs::read_to_string(tmp.path().join("s.sql")).unwrap();
        assert!(schema_ddl.contains("CREATE DATABASE"));
        assert!(schema_ddl.contains("CREATE EVENT"));
        assert!(schema_ddl.contains("CREATE PROCEDURE"));

        let users_sql = std::fs::read_to_string(tmp.path().join("@.users.sql")).unwrap();
        assert!(users_sql.contains("app_reader"));
        assert!(!users_sql.contains("admin"));
    }
}
