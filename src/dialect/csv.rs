use super::DialectSpec;

/// RFC4180-ish CSV: CRLF lines, comma fields, double-quote enclosure, only
/// string columns (and anything that would otherwise collide) get quoted.
pub struct Csv;

impl DialectSpec for Csv {
    const LINE_TERMINATOR: &'static [u8] = b"\r\n";
    const FIELD_TERMINATOR: &'static [u8] = b",";
    const ENCLOSURE: Option<u8> = Some(b'"');
    const ESCAPE: Option<u8> = Some(b'\\');
    const OPTIONALLY_ENCLOSED: bool = true;
    const FILE_EXTENSION: &'static str = "csv";
}
