//! External collaborator contracts (spec §6).
//!
//! `Session`, `Row`, `Directory`, `File` and `Console` are the hard
//! dependency interface this crate consumes from the shell that embeds it.
//! This module defines those contracts plus the concrete pieces that are in
//! scope: a local-filesystem `Directory`/`File` pair, a direct-print
//! `Console`, and a `FixtureSession`/`Row` implementation used by tests and
//! the demo CLI in place of a live MySQL connection.

use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::{DumpError, Result};

/// Column type classification, used by the dialect writer to decide
/// enclosure and the numeric NaN/Inf-to-NULL coercion (spec §4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Int,
    UInt,
    BigInt,
    Decimal,
    Float,
    Double,
    String,
    Date,
    DateTime,
    Timestamp,
    Bool,
    Bit,
    Blob,
    Geometry,
    Json,
    Other,
}

impl ColumnType {
    /// String-typed columns are enclosed even under `fields_optionally_enclosed`.
    pub fn is_string(self) -> bool {
        matches!(
            self,
            ColumnType::String
                | ColumnType::Date
                | ColumnType::DateTime
                | ColumnType::Timestamp
                | ColumnType::Json
        )
    }

    /// Numeric columns are scanned for the "inf"/"-inf"/"nan" text forms
    /// that get coerced to NULL (spec §4.2 step 3). BIT is transferred in
    /// binary/projected form and must not be scanned for alpha characters.
    pub fn is_numeric(self) -> bool {
        matches!(
            self,
            ColumnType::Int
                | ColumnType::UInt
                | ColumnType::BigInt
                | ColumnType::Decimal
                | ColumnType::Float
                | ColumnType::Double
        )
    }

    /// Columns whose raw bytes may contain delimiters or non-UTF-8 and must
    /// be requested already wrapped in `TO_BASE64`/`HEX` (spec §4.2, GLOSSARY).
    pub fn is_csv_unsafe(self) -> bool {
        matches!(self, ColumnType::Bit | ColumnType::Blob | ColumnType::Geometry)
    }
}

/// A single result row. Implementations own their backing bytes for the
/// lifetime of the call; the engine never needs a row to outlive the
/// callback or loop iteration that produced it.
pub trait Row {
    fn num_fields(&self) -> usize;
    fn is_null(&self, idx: usize) -> bool;
    /// Raw bytes as returned by the server, `None` when NULL.
    fn get_raw_data(&self, idx: usize) -> Option<&[u8]>;
    fn get_type(&self, idx: usize) -> ColumnType;
    fn get_as_string(&self, idx: usize) -> Option<String> {
        self.get_raw_data(idx)
            .map(|b| String::from_utf8_lossy(b).into_owned())
    }
    fn get_int(&self, idx: usize) -> Option<i64> {
        self.get_as_string(idx).and_then(|s| s.parse().ok())
    }
    fn get_uint(&self, idx: usize) -> Option<u64> {
        self.get_as_string(idx).and_then(|s| s.parse().ok())
    }
}

/// An owned, buffered row: what `query_rows` returns for small result sets
/// (MIN/MAX, EXPLAIN estimates, `SHOW CREATE …`, pagination lookups).
#[derive(Debug, Clone, Default)]
pub struct OwnedRow {
    pub types: Vec<ColumnType>,
    pub values: Vec<Option<Vec<u8>>>,
}

impl Row for OwnedRow {
    fn num_fields(&self) -> usize {
        self.values.len()
    }

    fn is_null(&self, idx: usize) -> bool {
        self.values[idx].is_none()
    }

    fn get_raw_data(&self, idx: usize) -> Option<&[u8]> {
        self.values[idx].as_deref()
    }

    fn get_type(&self, idx: usize) -> ColumnType {
        self.types.get(idx).copied().unwrap_or(ColumnType::Other)
    }
}

/// Connection metadata a caller may want to report or log (spec §6).
#[derive(Debug, Clone, Default)]
pub struct ConnectionOptions {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub schema: Option<String>,
}

/// The database session contract. One instance is owned exclusively by one
/// worker thread (or the controller thread) for its lifetime; sessions are
/// never shared (spec §3, §5).
pub trait Session: Send {
    fn execute(&mut self, sql: &str) -> Result<()>;

    /// Buffered query: suitable for small result sets (metadata lookups,
    /// `SHOW CREATE …`, chunk-boundary queries). Data-row streaming uses
    /// [`Session::stream_query`] instead to avoid materializing a whole
    /// table's rows in memory.
    fn query_rows(&mut self, sql: &str) -> Result<Vec<OwnedRow>>;

    /// Streaming query: `on_row` is invoked once per row in result order.
    /// Returns the number of rows streamed.
    fn stream_query(&mut self, sql: &str, on_row: &mut dyn FnMut(&dyn Row) -> Result<()>) -> Result<u64>;

    fn get_connection_id(&self) -> u64;
    fn get_server_version(&self) -> (u32, u32, u32);
    fn ansi_quotes_enabled(&self) -> bool;
    fn no_backslash_escapes_enabled(&self) -> bool;
    fn get_connection_options(&self) -> &ConnectionOptions;
}

/// How a `File` is opened (spec §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileMode {
    Read,
    Write,
    Append,
}

pub trait File: Send {
    fn open(&mut self, mode: FileMode) -> std::io::Result<()>;
    fn close(&mut self) -> std::io::Result<()>;
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize>;
    /// Rename the underlying object to `new_name` within the same directory.
    fn rename(&mut self, new_name: &str) -> std::io::Result<()>;
    fn filename(&self) -> &str;
    fn full_path(&self) -> String;
}

pub trait Directory: Send + Sync {
    fn exists(&self) -> bool;
    fn create(&self) -> std::io::Result<()>;
    fn list_files(&self, recursive: bool) -> std::io::Result<Vec<String>>;
    fn file(&self, name: &str) -> Box<dyn File>;
    fn full_path(&self) -> String;
}

pub trait Console: Send + Sync {
    fn print_info(&self, msg: &str);
    fn print_status(&self, msg: &str);
    fn print_warning(&self, msg: &str);
    fn print_error(&self, msg: &str);
    fn print_note(&self, msg: &str);
}

// ---------------------------------------------------------------------
// Local filesystem Directory/File
// ---------------------------------------------------------------------

pub struct LocalFile {
    path: PathBuf,
    filename: String,
    handle: Option<fs::File>,
}

impl LocalFile {
    pub fn new(dir: &Path, name: &str) -> Self {
        Self {
            path: dir.join(name),
            filename: name.to_string(),
            handle: None,
        }
    }
}

impl File for LocalFile {
    fn open(&mut self, mode: FileMode) -> std::io::Result<()> {
        let mut opts = OpenOptions::new();
        match mode {
            FileMode::Read => {
                opts.read(true);
            }
            FileMode::Write => {
                opts.write(true).create(true).truncate(true);
            }
            FileMode::Append => {
                opts.write(true).create(true).append(true);
            }
        }
        self.handle = Some(opts.open(&self.path)?);
        Ok(())
    }

    fn close(&mut self) -> std::io::Result<()> {
        if let Some(mut f) = self.handle.take() {
            f.flush()?;
        }
        Ok(())
    }

    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let f = self
            .handle
            .as_mut()
            .ok_or_else(|| std::io::Error::other("file not open"))?;
        f.write_all(buf)?;
        Ok(buf.len())
    }

    fn rename(&mut self, new_name: &str) -> std::io::Result<()> {
        let new_path = self.path.with_file_name(new_name);
        fs::rename(&self.path, &new_path)?;
        self.path = new_path;
        self.filename = new_name.to_string();
        Ok(())
    }

    fn filename(&self) -> &str {
        &self.filename
    }

    fn full_path(&self) -> String {
        self.path.display().to_string()
    }
}

pub struct LocalDirectory {
    path: PathBuf,
}

impl LocalDirectory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Directory for LocalDirectory {
    fn exists(&self) -> bool {
        self.path.is_dir()
    }

    fn create(&self) -> std::io::Result<()> {
        fs::create_dir_all(&self.path)
    }

    fn list_files(&self, recursive: bool) -> std::io::Result<Vec<String>> {
        let mut out = Vec::new();
        if recursive {
            let mut stack = vec![self.path.clone()];
            while let Some(dir) = stack.pop() {
                for entry in fs::read_dir(&dir)? {
                    let entry = entry?;
                    let p = entry.path();
                    if p.is_dir() {
                        stack.push(p);
                    } else if let Some(name) = p.file_name().and_then(|n| n.to_str()) {
                        out.push(name.to_string());
                    }
                }
            }
        } else {
            for entry in fs::read_dir(&self.path)? {
                let entry = entry?;
                if let Some(name) = entry.file_name().to_str() {
                    out.push(name.to_string());
                }
            }
        }
        Ok(out)
    }

    fn file(&self, name: &str) -> Box<dyn File> {
        Box::new(LocalFile::new(&self.path, name))
    }

    fn full_path(&self) -> String {
        self.path.display().to_string()
    }
}

/// Returns bytes written to the file so far, even while still open, used by
/// the sink to record `.idx` offsets without a separate byte counter.
pub fn file_len_on_disk(path: &Path) -> u64 {
    fs::metadata(path).map(|m| m.len()).unwrap_or(0)
}

// ---------------------------------------------------------------------
// In-memory File, used for DDL buffering (spec §4.3)
// ---------------------------------------------------------------------

pub struct MemoryFile {
    filename: String,
    data: Vec<u8>,
    pos: usize,
    open: bool,
}

impl MemoryFile {
    pub fn new(filename: &str) -> Self {
        Self {
            filename: filename.to_string(),
            data: Vec::new(),
            pos: 0,
            open: false,
        }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }
}

impl File for MemoryFile {
    fn open(&mut self, _mode: FileMode) -> std::io::Result<()> {
        self.open = true;
        Ok(())
    }

    fn close(&mut self) -> std::io::Result<()> {
        self.open = false;
        Ok(())
    }

    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        if !self.open {
            return Err(std::io::Error::other("file not open"));
        }
        self.data.extend_from_slice(buf);
        self.pos += buf.len();
        Ok(buf.len())
    }

    fn rename(&mut self, new_name: &str) -> std::io::Result<()> {
        self.filename = new_name.to_string();
        Ok(())
    }

    fn filename(&self) -> &str {
        &self.filename
    }

    fn full_path(&self) -> String {
        format!("memory://{}", self.filename)
    }
}

impl Read for MemoryFile {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let remaining = &self.data[self.pos.min(self.data.len())..];
        let n = remaining.len().min(buf.len());
        buf[..n].copy_from_slice(&remaining[..n]);
        self.pos += n;
        Ok(n)
    }
}

impl Seek for MemoryFile {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        let new_pos = match pos {
            SeekFrom::Start(p) => p as i64,
            SeekFrom::End(p) => self.data.len() as i64 + p,
            SeekFrom::Current(p) => self.pos as i64 + p,
        };
        self.pos = new_pos.max(0) as usize;
        Ok(self.pos as u64)
    }
}

// ---------------------------------------------------------------------
// Console
// ---------------------------------------------------------------------

/// Prints directly to stdout/stderr via `println!`/`eprintln!`, no logging
/// facade.
pub struct StdConsole;

impl Console for StdConsole {
    fn print_info(&self, msg: &str) {
        println!("{msg}");
    }

    fn print_status(&self, msg: &str) {
        println!("{msg}");
    }

    fn print_warning(&self, msg: &str) {
        eprintln!("Warning: {msg}");
    }

    fn print_error(&self, msg: &str) {
        eprintln!("Error: {msg}");
    }

    fn print_note(&self, msg: &str) {
        println!("Note: {msg}");
    }
}

/// Collects messages instead of printing, useful in tests.
#[derive(Default)]
pub struct CapturingConsole {
    pub messages: Mutex<Vec<(&'static str, String)>>,
}

impl Console for CapturingConsole {
    fn print_info(&self, msg: &str) {
        self.messages.lock().unwrap().push(("info", msg.to_string()));
    }
    fn print_status(&self, msg: &str) {
        self.messages.lock().unwrap().push(("status", msg.to_string()));
    }
    fn print_warning(&self, msg: &str) {
        self.messages.lock().unwrap().push(("warning", msg.to_string()));
    }
    fn print_error(&self, msg: &str) {
        self.messages.lock().unwrap().push(("error", msg.to_string()));
    }
    fn print_note(&self, msg: &str) {
        self.messages.lock().unwrap().push(("note", msg.to_string()));
    }
}

// ---------------------------------------------------------------------
// FixtureSession: a deterministic in-memory stand-in for a live MySQL
// session, used by tests and the demo CLI.
// ---------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct FixtureColumn {
    pub name: String,
    pub ty: ColumnType,
}

#[derive(Debug, Clone)]
pub struct FixtureTable {
    pub columns: Vec<FixtureColumn>,
    /// Index of the chunking key column, if any.
    pub key_index: Option<usize>,
    pub rows: Vec<Vec<Option<Vec<u8>>>>,
    pub create_ddl: String,
}

impl FixtureTable {
    pub fn key_values_sorted(&self, key_index: usize) -> Vec<(usize, i128)> {
        let mut out: Vec<(usize, i128)> = self
            .rows
            .iter()
            .enumerate()
            .filter_map(|(i, r)| {
                r[key_index]
                    .as_ref()
                    .and_then(|b| std::str::from_utf8(b).ok())
                    .and_then(|s| s.parse::<i128>().ok())
                    .map(|v| (i, v))
            })
            .collect();
        out.sort_by_key(|(_, v)| *v);
        out
    }
}

/// A tiny in-process "database": named `schema.table` fixtures plus enough
/// query-shape recognition to answer the specific queries the chunker,
/// worker and DDL capturer issue (MIN/MAX, `EXPLAIN` row estimates, `LIMIT`
/// pagination, `SHOW CREATE TABLE`, and ranged data SELECTs). It does not
/// attempt to be a general SQL engine.
#[derive(Clone)]
pub struct FixtureSession {
    pub tables: HashMap<(String, String), FixtureTable>,
    pub connection_id: u64,
    pub version: (u32, u32, u32),
    options: ConnectionOptions,
    pub executed: Vec<String>,
}

impl FixtureSession {
    pub fn new() -> Self {
        Self {
            tables: HashMap::new(),
            connection_id: 1,
            version: (8, 0, 34),
            options: ConnectionOptions {
                host: "127.0.0.1".into(),
                port: 3306,
                user: "root".into(),
                schema: None,
            },
            executed: Vec::new(),
        }
    }

    pub fn add_table(&mut self, schema: &str, table: &str, fixture: FixtureTable) {
        self.tables.insert((schema.to_string(), table.to_string()), fixture);
    }

    fn find_table(&self, sql: &str) -> Option<(&(String, String), &FixtureTable)> {
        self.tables.iter().find(|((s, t), _)| {
            sql.contains(&format!("`{s}`.`{t}`"))
                || sql.contains(&format!("{s}.{t}"))
                || (sql.contains(&format!("TABLE_SCHEMA='{s}'")) && sql.contains(&format!("TABLE_NAME='{t}'")))
        })
    }
}

impl Default for FixtureSession {
    fn default() -> Self {
        Self::new()
    }
}

/// All backtick-quoted identifiers in a query, in order, e.g. `["s", "f"]`
/// for `` SHOW CREATE FUNCTION `s`.`f` `` or `["app_reader", "%"]` for
/// `` SHOW CREATE USER `app_reader`@`%` ``.
fn backtick_tokens(sql: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut rest = sql;
    while let Some(start) = rest.find('`') {
        let after = &rest[start + 1..];
        let Some(end) = after.find('`') else { break };
        out.push(after[..end].to_string());
        rest = &after[end + 1..];
    }
    out
}

/// Last backtick-quoted identifier in a query, e.g. the routine/event/
/// trigger/schema name in `` SHOW CREATE FUNCTION `s`.`f` ``.
fn last_backtick_token(sql: &str) -> Option<String> {
    backtick_tokens(sql).into_iter().next_back()
}

fn extract_between(sql: &str, marker: &str) -> Option<(i128, i128)> {
    let idx = sql.find(marker)?;
    let rest = &sql[idx + marker.len()..];
    let mut parts = rest.split_whitespace();
    let begin = parts.next()?.trim_matches('\'').parse().ok()?;
    // skip "AND"
    let and = parts.next()?;
    if !and.eq_ignore_ascii_case("and") {
        return None;
    }
    let end_tok = parts.next()?;
    let end_clean: String = end_tok
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '-')
        .collect();
    let end = end_clean.parse().ok()?;
    Some((begin, end))
}

impl Session for FixtureSession {
    fn execute(&mut self, sql: &str) -> Result<()> {
        self.executed.push(sql.to_string());
        Ok(())
    }

    fn query_rows(&mut self, sql: &str) -> Result<Vec<OwnedRow>> {
        if sql.contains("information_schema.tables") {
            if let Some((_, t)) = self.find_table(sql) {
                let count = t.rows.len() as u64;
                return Ok(vec![OwnedRow {
                    types: vec![ColumnType::BigInt],
                    values: vec![Some(count.to_string().into_bytes())],
                }]);
            }
            return Ok(vec![]);
        }

        if sql.contains("SHOW CREATE USER") {
            let tokens = backtick_tokens(sql);
            if let (Some(user), Some(host)) = (tokens.first(), tokens.get(1)) {
                return Ok(vec![OwnedRow {
                    types: vec![ColumnType::String],
                    values: vec![Some(
                        format!("CREATE USER `{user}`@`{host}` IDENTIFIED WITH 'caching_sha2_password'").into_bytes(),
                    )],
                }]);
            }
            return Ok(vec![]);
        }

        if sql.contains("SHOW CREATE SCHEMA") {
            if let Some(name) = last_backtick_token(sql) {
                return Ok(vec![OwnedRow {
                    types: vec![ColumnType::String, ColumnType::String],
                    values: vec![
                        Some(name.clone().into_bytes()),
                        Some(format!("CREATE DATABASE `{name}` /*!40100 DEFAULT CHARACTER SET utf8mb4 */").into_bytes()),
                    ],
                }]);
            }
            return Ok(vec![]);
        }

        if sql.contains("SHOW CREATE EVENT")
            || sql.contains("SHOW CREATE PROCEDURE")
            || sql.contains("SHOW CREATE FUNCTION")
            || sql.contains("SHOW CREATE TRIGGER")
        {
            let kw = if sql.contains("EVENT") {
                "EVENT"
            } else if sql.contains("TRIGGER") {
                "TRIGGER"
            } else if sql.contains("FUNCTION") {
                "FUNCTION"
            } else {
                "PROCEDURE"
            };
            if let Some(name) = last_backtick_token(sql) {
                return Ok(vec![OwnedRow {
                    types: vec![ColumnType::String, ColumnType::String],
                    values: vec![
                        Some(name.clone().into_bytes()),
                        Some(format!("CREATE {kw} `{name}` /* fixture body */").into_bytes()),
                    ],
                }]);
            }
            return Ok(vec![]);
        }

        if sql.contains("SHOW CREATE TABLE") {
            if let Some((_, t)) = self.find_table(sql) {
                return Ok(vec![OwnedRow {
                    types: vec![ColumnType::String, ColumnType::String],
                    values: vec![Some(b"table".to_vec()), Some(t.create_ddl.clone().into_bytes())],
                }]);
            }
            return Ok(vec![]);
        }

        if sql.starts_with("EXPLAIN") && sql.contains("BETWEEN") {
            if let Some((_, t)) = self.find_table(sql) {
                let key_index = t.key_index.unwrap_or(0);
                if let Some((begin, end)) = extract_between(sql, "BETWEEN ") {
                    let sorted = t.key_values_sorted(key_index);
                    let count = sorted
                        .iter()
                        .filter(|(_, v)| *v >= begin && *v <= end)
                        .count() as u64;
                    return Ok(vec![OwnedRow {
                        types: vec![ColumnType::BigInt],
                        values: vec![Some(count.to_string().into_bytes())],
                    }]);
                }
            }
            return Ok(vec![OwnedRow {
                types: vec![ColumnType::BigInt],
                values: vec![Some(b"0".to_vec())],
            }]);
        }

        if sql.contains("MIN(") && sql.contains("MAX(") {
            if let Some((_, t)) = self.find_table(sql) {
                let key_index = t.key_index.unwrap_or(0);
                let sorted = t.key_values_sorted(key_index);
                if let (Some((_, lo)), Some((_, hi))) = (sorted.first(), sorted.last()) {
                    return Ok(vec![OwnedRow {
                        types: vec![ColumnType::BigInt, ColumnType::BigInt],
                        values: vec![
                            Some(lo.to_string().into_bytes()),
                            Some(hi.to_string().into_bytes()),
                        ],
                    }]);
                }
            }
            return Ok(vec![OwnedRow {
                types: vec![ColumnType::BigInt, ColumnType::BigInt],
                values: vec![None, None],
            }]);
        }

        if sql.contains("ORDER BY") && sql.contains("LIMIT") && !sql.contains("BETWEEN") {
            // pagination: "... WHERE k > start ORDER BY k LIMIT n,1"
            if let Some((_, t)) = self.find_table(sql) {
                let key_index = t.key_index.unwrap_or(0);
                let sorted = t.key_values_sorted(key_index);
                let after = sql
                    .find('>')
                    .and_then(|i| sql[i + 1..].split_whitespace().next())
                    .and_then(|tok| tok.parse::<i128>().ok());
                let limit_n: usize = sql
                    .rsplit("LIMIT ")
                    .next()
                    .and_then(|rest| rest.split(',').next())
                    .and_then(|n| n.trim().parse().ok())
                    .unwrap_or(0);
                let candidates: Vec<&(usize, i128)> = match after {
                    Some(a) => sorted.iter().filter(|(_, v)| *v > a).collect(),
                    None => sorted.iter().collect(),
                };
                if let Some((idx, v)) = candidates.get(limit_n) {
                    let _ = idx;
                    return Ok(vec![OwnedRow {
                        types: vec![ColumnType::BigInt],
                        values: vec![Some(v.to_string().into_bytes())],
                    }]);
                }
            }
            return Ok(vec![]);
        }

        Ok(vec![])
    }

    fn stream_query(&mut self, sql: &str, on_row: &mut dyn FnMut(&dyn Row) -> Result<()>) -> Result<u64> {
        let table = self
            .find_table(sql)
            .map(|(k, v)| (k.clone(), v.clone()))
            .ok_or_else(|| DumpError::Transient("unknown table in stream_query".into()))?;
        let (_, t) = table;
        let key_index = t.key_index;
        let include_nulls = sql.contains("IS NULL");
        let range = key_index.and_then(|_| extract_between(sql, "BETWEEN "));

        let mut count = 0u64;
        let sorted_indices: Vec<usize> = if let Some(ki) = key_index {
            let mut idxs: Vec<usize> = (0..t.rows.len()).collect();
            idxs.sort_by_key(|&i| {
                t.rows[i][ki]
                    .as_ref()
                    .and_then(|b| std::str::from_utf8(b).ok())
                    .and_then(|s| s.parse::<i128>().ok())
            });
            idxs
        } else {
            (0..t.rows.len()).collect()
        };

        for i in sorted_indices {
            let row_vals = &t.rows[i];
            let matches = match (key_index, range) {
                (Some(ki), Some((begin, end))) => {
                    let v = row_vals[ki]
                        .as_ref()
                        .and_then(|b| std::str::from_utf8(b).ok())
                        .and_then(|s| s.parse::<i128>().ok());
                    match v {
                        Some(v) => v >= begin && v <= end,
                        None => include_nulls,
                    }
                }
                _ => true,
            };
            if !matches {
                continue;
            }
            let row = OwnedRow {
                types: t.columns.iter().map(|c| c.ty).collect(),
                values: row_vals.clone(),
            };
            on_row(&row)?;
            count += 1;
        }
        Ok(count)
    }

    fn get_connection_id(&self) -> u64 {
        self.connection_id
    }

    fn get_server_version(&self) -> (u32, u32, u32) {
        self.version
    }

    fn ansi_quotes_enabled(&self) -> bool {
        false
    }

    fn no_backslash_escapes_enabled(&self) -> bool {
        false
    }

    fn get_connection_options(&self) -> &ConnectionOptions {
        &self.options
    }
}
