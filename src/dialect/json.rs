use super::DialectSpec;

/// JSON dialect: no enclosure, no escape byte — payloads are expected to
/// already be server-side-encoded JSON scalars.
pub struct Json;

impl DialectSpec for Json {
    const LINE_TERMINATOR: &'static [u8] = b"\n";
    const FIELD_TERMINATOR: &'static [u8] = b"\n";
    const ENCLOSURE: Option<u8> = None;
    const ESCAPE: Option<u8> = None;
    const OPTIONALLY_ENCLOSED: bool = false;
    const FILE_EXTENSION: &'static str = "json";
}
