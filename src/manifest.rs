//! Manifest JSON files (spec §4.9/§6): `@.json`, `@.done.json`, per-schema
//! and per-table manifests. `serde`/`serde_json`/`chrono` are already
//! teacher dependencies; the field names below are dictated by spec §4.9
//! and are therefore `camelCase` rather than this crate's usual `snake_case`.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ddl::Issue;
use crate::dialect::Dialect;
use crate::sink::Compression;

/// `@.json`, written once planning/validation succeeds, before any data
/// file is opened (spec §4.9).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DumpStartManifest {
    pub dumper: String,
    pub version: String,
    pub schemas: Vec<String>,
    pub basenames: HashMap<String, String>,
    pub users: Vec<String>,
    #[serde(rename = "defaultCharacterSet")]
    pub default_character_set: String,
    #[serde(rename = "tzUtc")]
    pub tz_utc: bool,
    #[serde(rename = "tableOnly")]
    pub table_only: bool,
    pub user: String,
    pub hostname: String,
    pub server: String,
    #[serde(rename = "serverVersion")]
    pub server_version: String,
    #[serde(rename = "gtidExecuted")]
    pub gtid_executed: Option<String>,
    pub consistent: bool,
    #[serde(rename = "mdsCompatibility")]
    pub mds_compatibility: bool,
    pub begin: DateTime<Utc>,
}

/// `@.done.json`, written once when every worker has joined successfully.
/// Its presence (spec §8 "Manifest completeness") is itself the signal that
/// the dump ran to completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DumpEndManifest {
    pub end: DateTime<Utc>,
    #[serde(rename = "dataBytes")]
    pub data_bytes: u64,
    #[serde(rename = "tableDataBytes")]
    pub table_data_bytes: HashMap<String, HashMap<String, u64>>,
}

/// `<schemaBasename>.json`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SchemaManifest {
    pub tables: Vec<String>,
    pub views: Vec<String>,
    pub events: Vec<String>,
    pub routines: Vec<String>,
}

/// One column's reload-time decode instruction (spec §4.9: "per-column
/// decode instructions (`FROM_BASE64` / `UNHEX`)").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ColumnDecode {
    None,
    FromBase64,
    Unhex,
}

impl ColumnDecode {
    pub fn for_csv_unsafe(csv_unsafe: bool, use_base64: bool) -> Self {
        if !csv_unsafe {
            ColumnDecode::None
        } else if use_base64 {
            ColumnDecode::FromBase64
        } else {
            ColumnDecode::Unhex
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnManifest {
    pub name: String,
    pub decode: ColumnDecode,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DialectManifest {
    #[serde(rename = "linesTerminatedBy")]
    pub lines_terminated_by: String,
    #[serde(rename = "fieldsTerminatedBy")]
    pub fields_terminated_by: String,
    #[serde(rename = "fieldsEnclosedBy")]
    pub fields_enclosed_by: Option<String>,
    #[serde(rename = "fieldsEscapedBy")]
    pub fields_escaped_by: Option<String>,
    #[serde(rename = "fieldsOptionallyEnclosed")]
    pub fields_optionally_enclosed: bool,
}

impl From<Dialect> for DialectManifest {
    /// Mirrors the parameter table in spec.md §4.2 for each of the five
    /// compile-time dialects.
    fn from(dialect: Dialect) -> Self {
        match dialect {
            Dialect::Default => Self {
                lines_terminated_by: "\n".into(),
                fields_terminated_by: "\t".into(),
                fields_enclosed_by: None,
                fields_escaped_by: Some("\\".into()),
                fields_optionally_enclosed: false,
            },
            Dialect::Csv => Self {
                lines_terminated_by: "\r\n".into(),
                fields_terminated_by: ",".into(),
                fields_enclosed_by: Some("\"".into()),
                fields_escaped_by: Some("\\".into()),
                fields_optionally_enclosed: true,
            },
            Dialect::CsvUnix => Self {
                lines_terminated_by: "\n".into(),
                fields_terminated_by: ",".into(),
                fields_enclosed_by: Some("\"".into()),
                fields_escaped_by: Some("\\".into()),
                fields_optionally_enclosed: false,
            },
            Dialect::Tsv => Self {
                lines_terminated_by: "\r\n".into(),
                fields_terminated_by: "\t".into(),
                fields_enclosed_by: Some("\"".into()),
                fields_escaped_by: Some("\\".into()),
                fields_optionally_enclosed: true,
            },
            Dialect::Json => Self {
                lines_terminated_by: "\n".into(),
                fields_terminated_by: "\n".into(),
                fields_enclosed_by: None,
                fields_escaped_by: None,
                fields_optionally_enclosed: false,
            },
        }
    }
}

/// `<tableBasename>.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableManifest {
    pub schema: String,
    pub table: String,
    pub columns: Vec<ColumnManifest>,
    #[serde(rename = "primaryIndex")]
    pub primary_index: Option<String>,
    pub compression: Compression,
    pub dialect: DialectManifest,
    pub histograms: Vec<String>,
    #[serde(rename = "includesData")]
    pub includes_data: bool,
    #[serde(rename = "includesDdl")]
    pub includes_ddl: bool,
    pub chunking: bool,
    pub extension: String,
    pub issues: Vec<IssueManifest>,
}

/// DDL issue as it appears in a manifest, flattening `src/ddl::Issue`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssueManifest {
    pub fixed: bool,
    pub description: String,
}

impl From<&Issue> for IssueManifest {
    fn from(issue: &Issue) -> Self {
        Self {
            fixed: issue.fixed,
            description: issue.description.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dump_start_manifest_round_trips_through_json() {
        let manifest = DumpStartManifest {
            dumper: "shelldump".into(),
            version: "0.1.0".into(),
            schemas: vec!["s".into()],
            basenames: HashMap::from([("s".into(), "s".into())]),
            users: vec![],
            default_character_set: "utf8mb4".into(),
            tz_utc: true,
            table_only: false,
            user: "root".into(),
            hostname: "localhost".into(),
            server: "mysql".into(),
            server_version: "8.0.34".into(),
            gtid_executed: None,
            consistent: true,
            mds_compatibility: false,
            begin: Utc::now(),
        };
        let json = serde_json::to_string(&manifest).unwrap();
        assert!(json.contains("\"defaultCharacterSet\""));
        let back: DumpStartManifest = serde_json::from_str(&json).unwrap();
        assert_eq!(back.dumper, "shelldump");
    }

    #[test]
    fn column_decode_picks_base64_or_hex() {
        assert_eq!(ColumnDecode::for_csv_unsafe(false, true), ColumnDecode::None);
        assert_eq!(ColumnDecode::for_csv_unsafe(true, true), ColumnDecode::FromBase64);
        assert_eq!(ColumnDecode::for_csv_unsafe(true, false), ColumnDecode::Unhex);
    }
}
