//! Per-dialect row encoding (spec §4.2).
//!
//! Each dialect is a zero-sized marker type implementing [`DialectSpec`];
//! [`DialectWriter<D>`] is generic over it so the per-row algorithm
//! specializes at compile time instead of branching on a runtime config
//! struct, mirroring `Dialect_dump_writer<T>` in
//! `examples/original_source/modules/util/dump/dialect_dump_writer.h`.

use crate::buffer::Buffer;
use crate::session::{ColumnType, Row};

mod csv;
mod csv_unix;
mod default;
mod json;
mod tsv;

pub use csv::Csv;
pub use csv_unix::CsvUnix;
pub use default::Default as DefaultDialect;
pub use json::Json;
pub use tsv::Tsv;

/// The five dialect parameters from spec.md §4.2, as compile-time constants.
pub trait DialectSpec {
    const LINE_TERMINATOR: &'static [u8];
    const FIELD_TERMINATOR: &'static [u8];
    const ENCLOSURE: Option<u8>;
    const ESCAPE: Option<u8>;
    const OPTIONALLY_ENCLOSED: bool;
    const FILE_EXTENSION: &'static str;
}

/// Encodes rows for dialect `D` into a [`Buffer`]. Stateless beyond the
/// base64-vs-hex choice for csv_unsafe columns; one instance is cheap to
/// create per chunk task.
#[derive(Debug, Clone, Copy)]
pub struct DialectWriter<D: DialectSpec> {
    use_base64: bool,
    _dialect: std::marker::PhantomData<D>,
}

impl<D: DialectSpec> DialectWriter<D> {
    pub fn new(use_base64: bool) -> Self {
        Self {
            use_base64,
            _dialect: std::marker::PhantomData,
        }
    }

    pub fn use_base64(&self) -> bool {
        self.use_base64
    }

    pub fn file_extension(&self) -> &'static str {
        D::FILE_EXTENSION
    }

    /// Encode one row into `buf`, advancing it. Returns the number of bytes
    /// appended.
    pub fn write_row(&self, row: &dyn Row, buf: &mut Buffer) -> usize {
        let start = buf.len();
        let n = row.num_fields();
        for i in 0..n {
            if i != 0 {
                buf.will_write(D::FIELD_TERMINATOR.len());
                buf.append_bytes(D::FIELD_TERMINATOR);
            }
            self.write_field(row, i, buf);
        }
        buf.will_write(D::LINE_TERMINATOR.len());
        buf.append_bytes(D::LINE_TERMINATOR);
        buf.len() - start
    }

    fn write_field(&self, row: &dyn Row, i: usize, buf: &mut Buffer) {
        let ty = row.get_type(i);
        let mut is_null = row.is_null(i);
        let raw = row.get_raw_data(i);

        // Step 3: numeric columns whose text form starts with a non-numeric
        // letter (after an optional leading '-') are "inf"/"-inf"/"nan" and
        // get coerced to NULL; this is intentional lossy behavior, not a bug.
        if !is_null && ty.is_numeric() {
            if let Some(bytes) = raw {
                if let Some(&first) = bytes.iter().find(|&&b| b != b'-') {
                    if first.is_ascii_alphabetic() {
                        is_null = true;
                    }
                }
            }
        }

        if is_null {
            self.write_null(buf);
            return;
        }

        let bytes = raw.unwrap_or(&[]);
        let enclose = D::ENCLOSURE.is_some() && (ty.is_string() || !D::OPTIONALLY_ENCLOSED);

        if enclose {
            buf.will_write(1);
            buf.append(D::ENCLOSURE.unwrap());
        }
        self.write_payload(bytes, buf);
        if enclose {
            buf.will_write(1);
            buf.append(D::ENCLOSURE.unwrap());
        }
    }

    fn write_null(&self, buf: &mut Buffer) {
        match D::ESCAPE {
            Some(esc) => {
                buf.will_write(2);
                buf.append(esc);
                buf.append(b'N');
            }
            None => {
                buf.will_write(4);
                buf.append_bytes(b"NULL");
            }
        }
    }

    fn write_payload(&self, bytes: &[u8], buf: &mut Buffer) {
        let Some(esc) = D::ESCAPE else {
            buf.will_write(bytes.len());
            buf.append_bytes(bytes);
            return;
        };

        let field_byte = D::FIELD_TERMINATOR.first().copied();
        let line_byte = D::LINE_TERMINATOR.first().copied();
        let enclosure = D::ENCLOSURE;

        buf.will_write(bytes.len());
        for &b in bytes {
            let mnemonic = mnemonic_escape(b);
            let needs_escape =
                b == esc || Some(b) == field_byte || Some(b) == line_byte || Some(b) == enclosure || mnemonic.is_some();
            if needs_escape {
                buf.will_write(2);
                buf.append(esc);
                buf.append(mnemonic.unwrap_or(b));
            } else {
                buf.append(b);
            }
        }
    }
}

/// The mnemonic substitutions from spec.md §4.2 step 5.
fn mnemonic_escape(b: u8) -> Option<u8> {
    match b {
        0x00 => Some(b'0'),
        0x08 => Some(b'b'),
        b'\n' => Some(b'n'),
        b'\r' => Some(b'r'),
        b'\t' => Some(b't'),
        0x1A => Some(b'Z'),
        _ => None,
    }
}

/// Encode `csv_unsafe` column projections server-side: wraps a column
/// reference in `TO_BASE64(...)` or `HEX(...)` depending on the dump-wide
/// option (spec §4.2 last paragraph).
pub fn wrap_unsafe_projection(column_expr: &str, use_base64: bool) -> String {
    if use_base64 {
        format!("TO_BASE64({column_expr})")
    } else {
        format!("HEX({column_expr})")
    }
}

/// A dialect picked at runtime (e.g. from a CLI flag), dispatched once at
/// chunk-task construction time to the appropriate monomorphized
/// [`DialectWriter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Default,
    Csv,
    CsvUnix,
    Tsv,
    Json,
}

impl std::str::FromStr for Dialect {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "default" => Ok(Dialect::Default),
            "csv" => Ok(Dialect::Csv),
            "csv-unix" | "csv_unix" => Ok(Dialect::CsvUnix),
            "tsv" => Ok(Dialect::Tsv),
            "json" => Ok(Dialect::Json),
            other => Err(format!("unknown dialect '{other}'")),
        }
    }
}

impl std::fmt::Display for Dialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Dialect::Default => "default",
            Dialect::Csv => "csv",
            Dialect::CsvUnix => "csv-unix",
            Dialect::Tsv => "tsv",
            Dialect::Json => "json",
        };
        write!(f, "{s}")
    }
}

impl Dialect {
    pub fn file_extension(self) -> &'static str {
        match self {
            Dialect::Default => DefaultDialect::FILE_EXTENSION,
            Dialect::Csv => Csv::FILE_EXTENSION,
            Dialect::CsvUnix => CsvUnix::FILE_EXTENSION,
            Dialect::Tsv => Tsv::FILE_EXTENSION,
            Dialect::Json => Json::FILE_EXTENSION,
        }
    }
}

/// Encode one row for a runtime-selected dialect, dispatching to the
/// monomorphized writer. Used by the worker, which only learns the dialect
/// from `DumpOptions` at run time.
pub enum AnyDialectWriter {
    Default(DialectWriter<DefaultDialect>),
    Csv(DialectWriter<Csv>),
    CsvUnix(DialectWriter<CsvUnix>),
    Tsv(DialectWriter<Tsv>),
    Json(DialectWriter<Json>),
}

impl AnyDialectWriter {
    pub fn new(dialect: Dialect, use_base64: bool) -> Self {
        match dialect {
            Dialect::Default => AnyDialectWriter::Default(DialectWriter::new(use_base64)),
            Dialect::Csv => AnyDialectWriter::Csv(DialectWriter::new(use_base64)),
            Dialect::CsvUnix => AnyDialectWriter::CsvUnix(DialectWriter::new(use_base64)),
            Dialect::Tsv => AnyDialectWriter::Tsv(DialectWriter::new(use_base64)),
            Dialect::Json => AnyDialectWriter::Json(DialectWriter::new(use_base64)),
        }
    }

    pub fn use_base64(&self) -> bool {
        match self {
            AnyDialectWriter::Default(w) => w.use_base64(),
            AnyDialectWriter::Csv(w) => w.use_base64(),
            AnyDialectWriter::CsvUnix(w) => w.use_base64(),
            AnyDialectWriter::Tsv(w) => w.use_base64(),
            AnyDialectWriter::Json(w) => w.use_base64(),
        }
    }

    pub fn file_extension(&self) -> &'static str {
        match self {
            AnyDialectWriter::Default(w) => w.file_extension(),
            AnyDialectWriter::Csv(w) => w.file_extension(),
            AnyDialectWriter::CsvUnix(w) => w.file_extension(),
            AnyDialectWriter::Tsv(w) => w.file_extension(),
            AnyDialectWriter::Json(w) => w.file_extension(),
        }
    }

    pub fn write_row(&self, row: &dyn Row, buf: &mut Buffer) -> usize {
        match self {
            AnyDialectWriter::Default(w) => w.write_row(row, buf),
            AnyDialectWriter::Csv(w) => w.write_row(row, buf),
            AnyDialectWriter::CsvUnix(w) => w.write_row(row, buf),
            AnyDialectWriter::Tsv(w) => w.write_row(row, buf),
            AnyDialectWriter::Json(w) => w.write_row(row, buf),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::OwnedRow;

    fn row(values: Vec<Option<&str>>, types: Vec<ColumnType>) -> OwnedRow {
        OwnedRow {
            types,
            values: values.into_iter().map(|v| v.map(|s| s.as_bytes().to_vec())).collect(),
        }
    }

    #[test]
    fn csv_dialect_encodes_scenario_one() {
        let w = DialectWriter::<Csv>::new(true);
        let mut buf = Buffer::new();
        w.write_row(
            &row(vec![Some("1"), Some("a")], vec![ColumnType::Int, ColumnType::String]),
            &mut buf,
        );
        w.write_row(
            &row(vec![Some("2"), None], vec![ColumnType::Int, ColumnType::String]),
            &mut buf,
        );
        w.write_row(
            &row(vec![Some("3"), Some("c,d")], vec![ColumnType::Int, ColumnType::String]),
            &mut buf,
        );
        assert_eq!(
            buf.as_slice(),
            b"1,\"a\"\r\n2,\\N\r\n3,\"c,d\"\r\n".as_slice()
        );
    }

    #[test]
    fn tsv_dialect_encodes_scenario_two() {
        let w = DialectWriter::<Tsv>::new(true);
        let mut buf = Buffer::new();
        w.write_row(
            &row(vec![Some("1"), Some("a")], vec![ColumnType::Int, ColumnType::String]),
            &mut buf,
        );
        w.write_row(
            &row(vec![Some("2"), None], vec![ColumnType::Int, ColumnType::String]),
            &mut buf,
        );
        w.write_row(
            &row(vec![Some("3"), Some("c,d")], vec![ColumnType::Int, ColumnType::String]),
            &mut buf,
        );
        assert_eq!(
            buf.as_slice(),
            b"1\t\"a\"\r\n2\t\\N\r\n3\t\"c,d\"\r\n".as_slice()
        );
    }

    #[test]
    fn default_dialect_coerces_nan_and_inf_to_null() {
        let w = DialectWriter::<DefaultDialect>::new(true);
        let mut buf = Buffer::new();
        for v in ["1.5", "inf", "-inf", "nan"] {
            w.write_row(&row(vec![Some(v)], vec![ColumnType::Double]), &mut buf);
        }
        assert_eq!(buf.as_slice(), b"1.5\n\\N\n\\N\n\\N\n".as_slice());
    }

    #[test]
    fn escape_correctness_no_unescaped_special_bytes() {
        let w = DialectWriter::<Csv>::new(true);
        let mut buf = Buffer::new();
        w.write_row(
            &row(vec![Some("has\"quote,and\ttab")], vec![ColumnType::String]),
            &mut buf,
        );
        let encoded = buf.as_slice();
        assert_eq!(encoded[0], b'"');
        assert_eq!(&encoded[encoded.len() - 2..], b"\r\n");
        let inner = &encoded[1..encoded.len() - 3];
        let mut i = 0;
        while i < inner.len() {
            let b = inner[i];
            if b == b'\\' {
                i += 2;
                continue;
            }
            assert_ne!(b, b'"', "unescaped quote at {i}");
            assert_ne!(b, b',', "unescaped comma at {i}");
            i += 1;
        }
    }
}
