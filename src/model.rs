//! Shared data model (spec §3): `SchemaTask`, `TableInfo`, `Range`/`ChunkTask`
//! live in [`crate::chunker`]; this module holds the rest, since both
//! [`crate::worker`] and [`crate::dumper`] need them without creating a
//! dependency cycle between those two modules.

use crate::session::ColumnType;

#[derive(Debug, Clone)]
pub struct ColumnMeta {
    pub name: String,
    pub ty: ColumnType,
    /// BIT/BLOB/GEOMETRY-like columns requested as `TO_BASE64`/`HEX`
    /// projections (spec §4.2 GLOSSARY `csv_unsafe column`).
    pub csv_unsafe: bool,
}

#[derive(Debug, Clone)]
pub struct IndexMeta {
    pub name: String,
    pub is_primary: bool,
}

/// `TableInfo`/`TableTask` merged per spec §3: planned once, read-only
/// thereafter.
#[derive(Debug, Clone)]
pub struct TableInfo {
    pub schema: String,
    pub name: String,
    pub basename: String,
    pub row_count_estimate: u64,
    pub avg_row_length: u64,
    pub index: Option<IndexMeta>,
    pub columns: Vec<ColumnMeta>,
    /// Trigger names attached to this table (spec §6: `dump_triggers`,
    /// `<schema>@<table>.triggers.sql`).
    pub triggers: Vec<String>,
}

impl TableInfo {
    pub fn key_column(&self) -> Option<crate::chunker::KeyColumn> {
        let index = self.index.as_ref()?;
        let col = self.columns.iter().find(|c| c.name == index.name)?;
        Some(crate::chunker::KeyColumn {
            name: col.name.clone(),
            is_integer: matches!(
                col.ty,
                ColumnType::Int | ColumnType::UInt | ColumnType::BigInt
            ),
        })
    }
}

#[derive(Debug, Clone)]
pub struct SchemaTask {
    pub name: String,
    pub basename: String,
    pub tables: Vec<String>,
    pub views: Vec<String>,
    /// Event/routine names, carried through to the schema manifest (spec
    /// §4.9) and to the `<schema>.sql` DDL task (spec §6 `dump_events`/
    /// `dump_routines`).
    pub events: Vec<String>,
    pub routines: Vec<String>,
}

/// Process-wide singleton, finalized once all workers join (spec §3).
#[derive(Debug, Clone, Default)]
pub struct DumpInfo {
    pub server_version: String,
    pub hostname: String,
    pub begin: Option<chrono::DateTime<chrono::Utc>>,
    pub end: Option<chrono::DateTime<chrono::Utc>>,
    pub gtid_executed: Option<String>,
    pub consistent: bool,
}

impl DumpInfo {
    pub fn duration(&self) -> Option<chrono::Duration> {
        Some(self.end? - self.begin?)
    }
}
