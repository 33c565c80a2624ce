//! Recognized dump options (spec §6), independent of how a caller gathers
//! them — the CLI surface in `src/cmd/mod.rs` builds one of these from
//! `clap::Args`, but a library caller can construct it directly.

use crate::ddl::CompatibilityOptions;
use crate::dialect::Dialect;
use crate::sink::Compression;

/// Default target chunk size (spec §6: `bytes_per_chunk`, default 64 MiB).
pub const DEFAULT_BYTES_PER_CHUNK: u64 = 64 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct DumpOptions {
    pub threads: usize,
    pub compression: Compression,
    /// bytes/sec/thread; 0 = unlimited.
    pub max_rate: u64,
    pub bytes_per_chunk: u64,
    pub consistent: bool,
    pub dry_run: bool,
    pub dump_ddl: bool,
    pub dump_data: bool,
    pub dump_schema_ddl: bool,
    pub dump_triggers: bool,
    pub dump_events: bool,
    pub dump_routines: bool,
    pub dump_users: bool,
    pub compatibility: CompatibilityOptions,
    pub dialect: Dialect,
    pub use_base64: bool,
    /// Passed verbatim to `SET NAMES` during session setup (spec §4.7).
    pub charset: String,
    pub time_zone_utc: bool,
    pub split: bool,
    pub included_users: Vec<String>,
    pub excluded_users: Vec<String>,
    pub output_url: String,
}

impl Default for DumpOptions {
    fn default() -> Self {
        Self {
            threads: 4,
            compression: Compression::None,
            max_rate: 0,
            bytes_per_chunk: DEFAULT_BYTES_PER_CHUNK,
            consistent: true,
            dry_run: false,
            dump_ddl: true,
            dump_data: true,
            dump_schema_ddl: true,
            dump_triggers: true,
            dump_events: true,
            dump_routines: true,
            dump_users: false,
            compatibility: CompatibilityOptions::default(),
            dialect: Dialect::Default,
            use_base64: true,
            charset: "utf8mb4".into(),
            time_zone_utc: false,
            split: true,
            included_users: Vec::new(),
            excluded_users: Vec::new(),
            output_url: String::new(),
        }
    }
}

impl DumpOptions {
    /// Configuration-class validation performed before any work starts
    /// (spec §7: "Configuration" errors, fatal and non-retryable).
    pub fn validate(&self) -> Result<(), String> {
        if self.output_url.trim().is_empty() {
            return Err("output path/URL must not be empty".into());
        }
        if self.threads == 0 {
            return Err("threads must be at least 1".into());
        }
        if self.bytes_per_chunk == 0 {
            return Err("bytes_per_chunk must be greater than zero".into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_pass_validation() {
        let mut opts = DumpOptions::default();
        opts.output_url = "/tmp/dump".into();
        assert!(opts.validate().is_ok());
    }

    #[test]
    fn empty_output_path_is_rejected() {
        let opts = DumpOptions::default();
        assert!(opts.validate().is_err());
    }

    #[test]
    fn zero_threads_is_rejected() {
        let mut opts = DumpOptions::default();
        opts.output_url = "/tmp/dump".into();
        opts.threads = 0;
        assert!(opts.validate().is_err());
    }
}
