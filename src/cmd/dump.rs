//! `shelldump dump`: builds a [`DumpOptions`] from CLI flags, wires a
//! [`Dumper`] over the bundled [`FixtureSession`] demo schema, and runs
//! it — standing in for `mysqlsh`'s live connection the same way a
//! subcommand might stand in for a file on disk when no live input is
//! wired up yet.

use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};

use clap::Args;

use anyhow::anyhow;

use crate::ddl::CompatibilityOptions;
use crate::dumper::{DumpOptions, DumpPlan, Dumper, SchemaPlan, TableSpec};
use crate::model::{ColumnMeta, IndexMeta};
use crate::session::{
    ColumnType, Console, Directory, FixtureColumn, FixtureSession, FixtureTable, LocalDirectory, Session, StdConsole,
};
use crate::sink::Compression;

use super::{BEHAVIOR, FILTERING, INPUT_OUTPUT, LIMITS};

#[derive(Args)]
pub struct DumpArgs {
    /// Directory the dump is written to
    #[arg(short, long, help_heading = INPUT_OUTPUT)]
    output: String,

    /// Worker thread count
    #[arg(long, default_value_t = 4, help_heading = LIMITS)]
    threads: usize,

    /// Output dialect: default, csv, csv-unix, tsv, json
    #[arg(long, default_value = "default", help_heading = INPUT_OUTPUT)]
    dialect: Dialect,

    /// Compression applied to every data file: none, gzip, zstd
    #[arg(long, default_value = "none", help_heading = INPUT_OUTPUT)]
    compression: Compression,

    /// Per-worker throughput cap in bytes/sec (0 = unlimited)
    #[arg(long, default_value_t = 0, help_heading = LIMITS)]
    max_rate: u64,

    /// Target size in bytes for a single data chunk
    #[arg(long, default_value_t = crate::dumper::DEFAULT_BYTES_PER_CHUNK, help_heading = LIMITS)]
    bytes_per_chunk: u64,

    /// Plan and print what would be dumped without writing any files
    #[arg(long, help_heading = BEHAVIOR)]
    dry_run: bool,

    /// Disable the consistent-snapshot transaction across workers
    #[arg(long, help_heading = BEHAVIOR)]
    no_consistent: bool,

    /// Skip DDL files entirely (schema, triggers, events, routines)
    #[arg(long, help_heading = FILTERING)]
    no_ddl: bool,

    /// Skip row data, dump DDL only
    #[arg(long, help_heading = FILTERING)]
    no_data: bool,

    /// Skip per-table `CREATE TABLE` files
    #[arg(long, help_heading = FILTERING)]
    no_schema_ddl: bool,

    /// Skip trigger definitions
    #[arg(long, help_heading = FILTERING)]
    no_triggers: bool,

    /// Skip event definitions
    #[arg(long, help_heading = FILTERING)]
    no_events: bool,

    /// Skip stored routine (procedure/function) definitions
    #[arg(long, help_heading = FILTERING)]
    no_routines: bool,

    /// Also dump `CREATE USER`/`GRANT` statements
    #[arg(long, help_heading = FILTERING)]
    users: bool,

    /// Encode unsafe binary columns as hex instead of base64
    #[arg(long, help_heading = BEHAVIOR)]
    no_base64: bool,

    /// Character set passed to `SET NAMES` during session setup
    #[arg(long, default_value = "utf8mb4", help_heading = BEHAVIOR)]
    charset: String,

    /// Force the session time zone to UTC before streaming
    #[arg(long, help_heading = BEHAVIOR)]
    time_zone_utc: bool,

    /// Disable chunking: stream every table as a single file
    #[arg(long, help_heading = BEHAVIOR)]
    no_split: bool,
}

/// The demo schema `dump` runs against: one small table with a mix of
/// column types, enough to exercise chunking, DDL capture and the
/// dialect writer end to end without a live database.
fn demo_fixture() -> FixtureSession {
    let mut fixture = FixtureSession::new();
    fixture.add_table(
        "shop",
        "customers",
        FixtureTable {
            columns: vec![
                FixtureColumn { name: "id".into(), ty: ColumnType::Int },
                FixtureColumn { name: "name".into(), ty: ColumnType::String },
                FixtureColumn { name: "notes".into(), ty: ColumnType::Blob },
            ],
            key_index: Some(0),
            rows: vec![
                vec![Some(b"1".to_vec()), Some(b"Ada Lovelace".to_vec()), Some(b"first customer".to_vec())],
                vec![Some(b"2".to_vec()), Some(b"Grace Hopper".to_vec()), None],
                vec![Some(b"3".to_vec()), Some(b"Margaret Hamilton, esq.".to_vec()), Some(b"referred".to_vec())],
            ],
            create_ddl: "CREATE TABLE `customers` (\n  `id` INT NOT NULL PRIMARY KEY,\n  `name` VARCHAR(255),\n  `notes` BLOB\n)".into(),
        },
    );
    fixture
}

fn demo_plan() -> DumpPlan {
    DumpPlan {
        schemas: vec![SchemaPlan {
            name: "shop".into(),
            tables: vec![TableSpec {
                name: "customers".into(),
                columns: vec![
                    ColumnMeta { name: "id".into(), ty: ColumnType::Int, csv_unsafe: false },
                    ColumnMeta { name: "name".into(), ty: ColumnType::String, csv_unsafe: false },
                    ColumnMeta { name: "notes".into(), ty: ColumnType::Blob, csv_unsafe: true },
                ],
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

pub fn run(args: DumpArgs) -> anyhow::Result<()> {
    let options = DumpOptions {
        threads: args.threads,
        compression: args.compression,
        max_rate: args.max_rate,
        bytes_per_chunk: args.bytes_per_chunk,
        consistent: !args.no_consistent,
        dry_run: args.dry_run,
        dump_ddl: !args.no_ddl,
        dump_data: !args.no_data,
        dump_schema_ddl: !args.no_schema_ddl,
        dump_triggers: !args.no_triggers,
        dump_events: !args.no_events,
        dump_routines: !args.no_routines,
        dump_users: args.users,
        compatibility: CompatibilityOptions::default(),
        dialect: args.dialect,
        use_base64: !args.no_base64,
        charset: args.charset,
        time_zone_utc: args.time_zone_utc,
        split: !args.no_split,
        included_users: Vec::new(),
        excluded_users: Vec::new(),
        output_url: args.output,
    };

    let fixture = Arc::new(Mutex::new(demo_fixture()));
    let session_factory: crate::dumper::SessionFactory = Box::new(move || {
        let guard = fixture.lock().expect("fixture mutex poisoned");
        Ok(Box::new(guard.clone()) as Box<dyn Session>)
    });

    let directory: Arc<dyn Directory> = Arc::new(LocalDirectory::new(std::path::Path::new(&options.output_url)));
    let console: Arc<dyn Console> = Arc::new(StdConsole);

    let dumper = Dumper::new(options, directory, console, session_factory);
    let interrupt = dumper.interrupt_handle();
    install_interrupt_handler(interrupt);

    let report = dumper.run(demo_plan())?;
    println!(
        "dumped {} row(s), {} byte(s) of data, {} byte(s) written to disk",
        report.rows, report.data_bytes, report.bytes_written
    );
    Ok(())
}

/// No signal-handling crate is wired in yet, so `Ctrl-C` is left to the
/// default terminal behavior; this just hands back the same handle a real
/// signal handler would flip (spec §5).
fn install_interrupt_handler(_interrupt: Arc<AtomicBool>) {}
