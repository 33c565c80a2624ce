//! Worker (spec §4.7).
//!
//! Each worker owns one `Session` for its whole lifetime, runs the session
//! setup sequence, then loops pop/check-interrupt/run/check-interrupt until
//! it receives a shutdown sentinel. Spawned with `std::thread::Builder`, one
//! thread per worker — plain `std::thread`-only concurrency, no async
//! runtime, no crossbeam.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use ahash::AHashMap;

use crate::chunker::{tracing_comment, ChunkPlan};
use crate::ddl::Issue;
use crate::dialect::{wrap_unsafe_projection, AnyDialectWriter, Dialect};
use crate::error::{DumpError, Result};
use crate::model::TableInfo;
use crate::progress::{Counters, ThreadState, ThreadStates};
use crate::queue::{PopResult, TaskQueue};
use crate::ratelimit::RateLimiter;
use crate::session::{Console, Directory, Session};
use crate::sink::{Compression, DumpWriteResult, Sink};

/// A unit of work handed to a worker thread. Takes `&mut Worker` so a task
/// can reach the worker's exclusively-owned `Session` and rate limiter,
/// mirroring `examples/original_source/modules/util/dump/dumper.h`'s
/// `std::function<void(Table_worker*)>`.
pub type Task = Box<dyn FnOnce(&mut Worker) + Send + 'static>;

/// Shared, process-wide state every worker thread reads from (spec §5).
pub struct WorkerContext {
    pub interrupt: Arc<AtomicBool>,
    pub directory: Arc<dyn Directory>,
    pub queue: Arc<TaskQueue<Task>>,
    pub counters: Arc<Counters>,
    pub thread_states: Arc<ThreadStates>,
    pub table_data_bytes: Arc<Mutex<AHashMap<(String, String), u64>>>,
    /// DDL compatibility issues captured per table/view, surfaced in the
    /// per-table manifest (spec §4.9).
    pub ddl_issues: Arc<Mutex<AHashMap<(String, String), Vec<Issue>>>>,
    pub dialect: Dialect,
    pub compression: Compression,
    pub use_base64: bool,
    pub max_rate_bytes_per_sec: u64,
    /// Rows between rate-limiter calls and global counter updates (spec §4.7: 2000).
    pub rate_limit_stride: u64,
    /// Character set passed to `SET NAMES` during session setup (spec §4.7).
    pub charset: String,
    /// Forces `SET TIME_ZONE='+00:00'` during session setup (spec §4.7, `--time-zone-utc`).
    pub time_zone_utc: bool,
    pub console: Arc<dyn Console>,
}

/// How often, in rows, the interrupt flag is checked inside the streaming
/// loop (spec §4.7/§5: "between every row").
const INTERRUPT_CHECK_EVERY_ROW: bool = true;

pub struct Worker {
    pub id: usize,
    session: Box<dyn Session>,
    ctx: Arc<WorkerContext>,
    rate_limiter: RateLimiter,
}

impl Worker {
    pub fn new(id: usize, mut session: Box<dyn Session>, ctx: Arc<WorkerContext>) -> Result<Self> {
        configure_session(session.as_mut(), &ctx.charset, ctx.time_zone_utc)?;
        let rate_limiter = RateLimiter::new(ctx.max_rate_bytes_per_sec);
        Ok(Self {
            id,
            session,
            ctx,
            rate_limiter,
        })
    }

    /// If `consistent`, start the transaction and notify the barrier before
    /// the controller releases the global read lock (spec §4.7 step 2,
    /// §5 "Workers start their transactions BEFORE the global read lock is
    /// released").
    pub fn start_consistent_transaction(&mut self) -> Result<()> {
        self.session
            .execute("SET SESSION TRANSACTION ISOLATION LEVEL REPEATABLE READ")?;
        self.session.execute("START TRANSACTION WITH CONSISTENT SNAPSHOT")?;
        Ok(())
    }

    pub fn connection_id(&self) -> u64 {
        self.session.get_connection_id()
    }

    /// Exposes the worker's exclusively-owned session to a running task
    /// (spec §4.7: "a task is a one-shot callable that receives the worker").
    pub fn session_mut(&mut self) -> &mut dyn Session {
        self.session.as_mut()
    }

    pub fn ctx(&self) -> &WorkerContext {
        &self.ctx
    }

    fn check_interrupt(&self) -> Result<()> {
        if self.ctx.interrupt.load(Ordering::Relaxed) {
            return Err(DumpError::Interrupted);
        }
        Ok(())
    }

    /// Main loop: pop, check interrupt, run task, check interrupt (spec §4.7
    /// step 5). Returns when a shutdown sentinel is observed.
    pub fn run(&mut self) -> Result<()> {
        loop {
            self.check_interrupt()?;
            match self.ctx.queue.pop() {
                PopResult::Shutdown => {
                    self.ctx.thread_states.set(self.id, ThreadState::Done);
                    return Ok(());
                }
                PopResult::Task(task) => {
                    self.check_interrupt()?;
                    task(self);
                    self.check_interrupt()?;
                }
            }
        }
    }

    /// Stream one chunk of one table (spec §4.7 "Streaming a data chunk").
    pub fn stream_chunk(&mut self, table: &TableInfo, chunk: &ChunkPlan) -> Result<DumpWriteResult> {
        self.ctx.thread_states.set(
            self.id,
            ThreadState::Streaming {
                schema: table.schema.clone(),
                table: table.name.clone(),
                chunk_id: chunk.chunk_id,
            },
        );

        let sql = build_chunk_query(table, chunk, self.ctx.use_base64);
        let ext = self.ctx.dialect.file_extension();
        let suffix = self.ctx.compression.extension_suffix();
        let chunk_marker = if is_last_chunk(chunk) { "@@" } else { "@" };
        let file_name = format!("{}{}{}.{}{}", table.basename, chunk_marker, chunk.chunk_id, ext, suffix);

        let writer = AnyDialectWriter::new(self.ctx.dialect, self.ctx.use_base64);
        let mut sink = match Sink::create(self.ctx.directory.as_ref(), &file_name, self.ctx.compression, true) {
            Ok(s) => s,
            Err(e) => return Err(e),
        };

        let mut buf = crate::buffer::Buffer::new();
        let mut rows_since_rate_check = 0u64;
        let mut stream_err: Option<DumpError> = None;

        // Pre-extract the fields the closure needs so it borrows disjoint
        // parts of `self` (interrupt flag, rate limiter) rather than `self`
        // as a whole, leaving `self.session` free to be borrowed mutably as
        // the `stream_query` receiver below.
        let interrupt = self.ctx.interrupt.clone();
        let rate_limit_stride = self.ctx.rate_limit_stride;
        let rate_limiter = &mut self.rate_limiter;

        let row_count = self.session.stream_query(&sql, &mut |row| {
            if interrupt.load(Ordering::Relaxed) {
                return Err(DumpError::Interrupted);
            }
            buf.clear();
            writer.write_row(row, &mut buf);
            if let Err(e) = sink.write_row(buf.as_slice()) {
                stream_err = Some(e);
                return Ok(());
            }
            rows_since_rate_check += 1;
            if rows_since_rate_check >= rate_limit_stride {
                rate_limiter.throttle(buf.len() as u64 * rows_since_rate_check);
                rows_since_rate_check = 0;
                let _ = INTERRUPT_CHECK_EVERY_ROW;
            }
            Ok(())
        });

        if let Some(e) = stream_err {
            let _ = sink.abandon();
            return Err(e);
        }
        row_count?;

        match sink.finish() {
            Ok(result) => {
                self.ctx.counters.add_rows(result.rows);
                self.ctx.counters.add_bytes(result.data_bytes, result.bytes_written);
                let mut map = self.ctx.table_data_bytes.lock().unwrap();
                *map.entry((table.schema.clone(), table.name.clone())).or_insert(0) += result.data_bytes;
                Ok(result)
            }
            Err(e) => Err(e),
        }
    }
}

fn is_last_chunk(chunk: &ChunkPlan) -> bool {
    chunk.is_last
}

/// Session setup performed once, right after connecting (spec §4.7 step 4).
fn configure_session(session: &mut dyn Session, charset: &str, time_zone_utc: bool) -> Result<()> {
    session.execute("SET SQL_MODE=''")?;
    session.execute(&format!("SET NAMES {charset}"))?;
    session.execute("SET net_write_timeout=1800")?;
    session.execute("SET wait_timeout=31536000")?;
    if time_zone_utc {
        session.execute("SET TIME_ZONE='+00:00'")?;
    }
    Ok(())
}

fn build_chunk_query(table: &TableInfo, chunk: &ChunkPlan, use_base64: bool) -> String {
    let projections: Vec<String> = table
        .columns
        .iter()
        .map(|c| {
            let col = format!("`{}`", c.name);
            if c.csv_unsafe {
                wrap_unsafe_projection(&col, use_base64)
            } else {
                col
            }
        })
        .collect();

    let key_name = table.index.as_ref().map(|i| i.name.clone());
    let mut where_clauses = Vec::new();
    if let (Some(range), Some(key)) = (&chunk.range, &key_name) {
        where_clauses.push(format!("`{key}` BETWEEN {} AND {}", range.begin, range.end));
    }
    if chunk.include_nulls {
        if let Some(key) = &key_name {
            if let Some(last) = where_clauses.last_mut() {
                *last = format!("({last} OR `{key}` IS NULL)");
            }
        }
    }

    let where_sql = if where_clauses.is_empty() {
        String::new()
    } else {
        format!("WHERE {} ", where_clauses.join(" AND "))
    };

    let order_sql = key_name
        .as_ref()
        .map(|k| format!("ORDER BY `{k}` "))
        .unwrap_or_default();

    format!(
        "SELECT {} FROM `{}`.`{}` {}{}{}",
        projections.join(", "),
        table.schema,
        table.name,
        where_sql,
        order_sql,
        tracing_comment(&table.schema, &table.name, chunk.chunk_id)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunker::Range;
    use crate::model::{ColumnMeta, IndexMeta};
    use crate::session::ColumnType;

    fn sample_table() -> TableInfo {
        TableInfo {
            schema: "s".into(),
            name: "t".into(),
            basename: "s@t".into(),
            row_count_estimate: 3,
            avg_row_length: 16,
            index: Some(IndexMeta { name: "id".into(), is_primary: true }),
            columns: vec![
                ColumnMeta { name: "id".into(), ty: ColumnType::Int, csv_unsafe: false },
                ColumnMeta { name: "blob_col".into(), ty: ColumnType::Blob, csv_unsafe: true },
            ],
            triggers: vec![],
        }
    }

    #[test]
    fn chunk_query_wraps_csv_unsafe_columns_and_carries_tracing_comment() {
        let table = sample_table();
        let chunk = ChunkPlan {
            chunk_id: 0,
            range: Some(Range { begin: "1".into(), end: "100".into() }),
            include_nulls: true,
            is_last: false,
        };
        let sql = build_chunk_query(&table, &chunk, true);
        assert!(sql.contains("TO_BASE64(`blob_col`)"));
        assert!(sql.contains("BETWEEN 1 AND 100"));
        assert!(sql.contains("OR `id` IS NULL"));
        assert!(sql.contains("chunk ID: 0"));
    }

    #[test]
    fn chunk_query_uses_hex_when_base64_disabled() {
        let table = sample_table();
        let chunk = ChunkPlan { chunk_id: 1, range: None, include_nulls: false, is_last: true };
        let sql = build_chunk_query(&table, &chunk, false);
        assert!(sql.contains("HEX(`blob_col`)"));
        assert!(!sql.contains("WHERE"));
    }
}
