use super::DialectSpec;

/// Tab-separated with CRLF lines and optional quoting of string columns.
pub struct Tsv;

impl DialectSpec for Tsv {
    const LINE_TERMINATOR: &'static [u8] = b"\r\n";
    const FIELD_TERMINATOR: &'static [u8] = b"\t";
    const ENCLOSURE: Option<u8> = Some(b'"');
    const ESCAPE: Option<u8> = Some(b'\\');
    const OPTIONALLY_ENCLOSED: bool = true;
    const FILE_EXTENSION: &'static str = "tsv";
}
