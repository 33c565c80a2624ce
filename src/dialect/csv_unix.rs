use super::DialectSpec;

/// CSV variant with Unix line endings and unconditional enclosure.
pub struct CsvUnix;

impl DialectSpec for CsvUnix {
    const LINE_TERMINATOR: &'static [u8] = b"\n";
    const FIELD_TERMINATOR: &'static [u8] = b",";
    const ENCLOSURE: Option<u8> = Some(b'"');
    const ESCAPE: Option<u8> = Some(b'\\');
    const OPTIONALLY_ENCLOSED: bool = false;
    const FILE_EXTENSION: &'static str = "csv";
}
