use super::DialectSpec;

/// `LOAD DATA` default format: tab-separated, backslash-escaped, no enclosure.
pub struct Default;

impl DialectSpec for Default {
    const LINE_TERMINATOR: &'static [u8] = b"\n";
    const FIELD_TERMINATOR: &'static [u8] = b"\t";
    const ENCLOSURE: Option<u8> = None;
    const ESCAPE: Option<u8> = Some(b'\\');
    const OPTIONALLY_ENCLOSED: bool = false;
    const FILE_EXTENSION: &'static str = "txt";
}
