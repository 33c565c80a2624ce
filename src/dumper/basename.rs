//! Collision-free basenames (spec §4.8), grounded on
//! `examples/original_source/modules/util/dump/dumper.cc`'s
//! `get_basename`/`encode_schema_basename`/`encode_table_basename`.
//!
//! Two steps: first encode `schema`/`table` into a filesystem-safe
//! identifier (hex-escaping bytes outside `[A-Za-z0-9_]`), then cap the
//! result to 225 UTF-8 characters, appending a monotonically increasing
//! ordinal suffix scoped by the truncated prefix whenever truncation
//! actually occurred.

use std::collections::HashMap;

/// Spec §3/§4.8: "length-capped to ≤225 characters of UTF-8".
pub const MAX_BASENAME_LENGTH: usize = 225;

/// Hex-escape every byte not in `[A-Za-z0-9_]`, collapsing consecutive
/// escaped bytes into a single `@HH@HH...@` run so the common case (a long
/// ASCII identifier) stays cheap to read back.
fn encode_identifier(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut in_escape_run = false;
    for b in name.bytes() {
        let safe = b.is_ascii_alphanumeric() || b == b'_';
        if safe {
            if in_escape_run {
                out.push('@');
                in_escape_run = false;
            }
            out.push(b as char);
        } else {
            if !in_escape_run {
                out.push('@');
                in_escape_run = true;
            }
            out.push_str(&format!("{b:02X}"));
        }
    }
    if in_escape_run {
        out.push('@');
    }
    out
}

pub fn encode_schema_basename(schema: &str) -> String {
    encode_identifier(schema)
}

pub fn encode_table_basename(schema: &str, table: &str) -> String {
    format!("{}@{}", encode_identifier(schema), encode_identifier(table))
}

/// Truncate `s` to at most `max_chars` Unicode scalar values, always at a
/// codepoint boundary (never splitting a multi-byte character).
fn truncate_codepoints(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &s[..byte_idx],
        None => s,
    }
}

/// Scopes the ordinal suffix counter across all basenames produced for one
/// dump (spec §4.8: "scoped by the truncated prefix").
#[derive(Debug, Default)]
pub struct BasenameRegistry {
    truncated_ordinals: HashMap<String, u64>,
}

impl BasenameRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply the length cap and collision-avoidance suffix to an already
    /// schema/table-encoded identifier.
    pub fn get_basename(&mut self, encoded: &str) -> String {
        let truncated = truncate_codepoints(encoded, MAX_BASENAME_LENGTH);
        if truncated.len() == encoded.len() {
            return encoded.to_string();
        }
        let ordinal = self.truncated_ordinals.entry(truncated.to_string()).or_insert(0);
        let basename = format!("{truncated}{ordinal}");
        *ordinal += 1;
        basename
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ascii_identifiers_pass_through_unescaped() {
        assert_eq!(encode_schema_basename("my_schema"), "my_schema");
        assert_eq!(encode_table_basename("s", "t"), "s@t");
    }

    #[test]
    fn unsafe_bytes_are_hex_escaped() {
        let encoded = encode_schema_basename("weird schema!");
        assert!(encoded.starts_with("weird"));
        assert!(encoded.contains("@20@21@") || encoded.contains("@2021@"));
        assert!(!encoded.contains(' '));
        assert!(!encoded.contains('!'));
    }

    #[test]
    fn short_names_are_never_truncated_or_suffixed() {
        let mut registry = BasenameRegistry::new();
        let a = registry.get_basename("short");
        let b = registry.get_basename("short");
        assert_eq!(a, "short");
        assert_eq!(b, "short");
    }

    #[test]
    fn truncation_appends_ordinal_scoped_by_prefix() {
        let mut registry = BasenameRegistry::new();
        let long_name: String = "x".repeat(300);
        let first = registry.get_basename(&long_name);
        let second = registry.get_basename(&long_name);
        assert_ne!(first, second);
        assert!(first.starts_with(&"x".repeat(MAX_BASENAME_LENGTH)));
        assert_eq!(first.len(), MAX_BASENAME_LENGTH + 1);
        assert_eq!(second.len(), MAX_BASENAME_LENGTH + 1);
    }

    #[test]
    fn truncates_at_codepoint_boundary() {
        let mut registry = BasenameRegistry::new();
        let multibyte: String = "é".repeat(300);
        let basename = registry.get_basename(&multibyte);
        assert!(basename.chars().count() <= MAX_BASENAME_LENGTH + 2);
        assert!(std::str::from_utf8(basename.as_bytes()).is_ok());
    }
}
