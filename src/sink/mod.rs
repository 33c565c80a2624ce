//! File sink: compression wrapper, `.dumping` → final rename, `.idx`
//! sidecar (spec §4.3).

use std::io::Write;

use flate2::write::GzEncoder;
use flate2::Compression as GzCompression;
use serde::{Deserialize, Serialize};

use crate::error::{DumpError, Result};
use crate::session::{Directory, File, FileMode};

/// How often (in rows) a cumulative offset is appended to the `.idx` file.
pub const INDEX_STRIDE: u64 = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    #[default]
    None,
    Gzip,
    Zstd,
}

impl std::str::FromStr for Compression {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "none" => Ok(Compression::None),
            "gzip" => Ok(Compression::Gzip),
            "zstd" => Ok(Compression::Zstd),
            other => Err(format!("unknown compression '{other}'")),
        }
    }
}

impl std::fmt::Display for Compression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Compression::None => "none",
            Compression::Gzip => "gzip",
            Compression::Zstd => "zstd",
        };
        write!(f, "{s}")
    }
}

impl Compression {
    pub fn extension_suffix(self) -> &'static str {
        match self {
            Compression::None => "",
            Compression::Gzip => ".gz",
            Compression::Zstd => ".zst",
        }
    }
}

/// Additive write-result counters (spec §3 `DumpWriteResult`).
#[derive(Debug, Clone, Copy, Default)]
pub struct DumpWriteResult {
    pub rows: u64,
    pub data_bytes: u64,
    pub bytes_written: u64,
}

impl DumpWriteResult {
    pub fn add(&mut self, other: DumpWriteResult) {
        self.rows += other.rows;
        self.data_bytes += other.data_bytes;
        self.bytes_written += other.bytes_written;
    }
}

/// Adapts a `Box<dyn File>` to `std::io::Write`, counting the bytes that
/// actually reach the file — i.e. the post-compression byte count, since
/// compressors write their encoded output through this adapter.
struct CountingFileWriter {
    file: Box<dyn File>,
    written: u64,
}

impl Write for CountingFileWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let n = self.file.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

enum Body {
    Plain(CountingFileWriter),
    Gzip(GzEncoder<CountingFileWriter>),
    Zstd(zstd::stream::write::Encoder<'static, CountingFileWriter>),
}

impl Body {
    fn new(compression: Compression, file: Box<dyn File>) -> Result<Self> {
        let counting = CountingFileWriter { file, written: 0 };
        Ok(match compression {
            Compression::None => Body::Plain(counting),
            Compression::Gzip => Body::Gzip(GzEncoder::new(counting, GzCompression::default())),
            Compression::Zstd => {
                Body::Zstd(zstd::stream::write::Encoder::new(counting, 0).map_err(DumpError::Io)?)
            }
        })
    }

    fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        match self {
            Body::Plain(w) => w.write_all(bytes)?,
            Body::Gzip(w) => w.write_all(bytes)?,
            Body::Zstd(w) => w.write_all(bytes)?,
        }
        Ok(())
    }

    /// Flush/finish the compressor (if any) and return the underlying file
    /// plus the total post-compression bytes written to it.
    fn into_file(self) -> Result<(Box<dyn File>, u64)> {
        let counting = match self {
            Body::Plain(w) => w,
            Body::Gzip(w) => w.finish().map_err(DumpError::Io)?,
            Body::Zstd(w) => w.finish().map_err(DumpError::Io)?,
        };
        Ok((counting.file, counting.written))
    }
}

/// One data file plus its optional `.idx` sidecar. Owned exclusively by one
/// chunk task for its lifetime (spec §3).
pub struct Sink {
    final_name: String,
    body: Body,
    idx_file: Option<Box<dyn File>>,
    uncompressed_offset: u64,
    rows_since_index: u64,
    result: DumpWriteResult,
}

impl Sink {
    pub fn create(
        directory: &dyn Directory,
        final_name: &str,
        compression: Compression,
        with_index: bool,
    ) -> Result<Self> {
        let mut file = directory.file(&format!("{final_name}.dumping"));
        file.open(FileMode::Write)?;
        let body = Body::new(compression, file)?;

        let idx_file = if with_index {
            let mut f = directory.file(&format!("{final_name}.idx.dumping"));
            f.open(FileMode::Write)?;
            Some(f)
        } else {
            None
        };

        Ok(Self {
            final_name: final_name.to_string(),
            body,
            idx_file,
            uncompressed_offset: 0,
            rows_since_index: 0,
            result: DumpWriteResult::default(),
        })
    }

    /// Write one already-encoded row's bytes.
    pub fn write_row(&mut self, bytes: &[u8]) -> Result<()> {
        self.body.write_all(bytes)?;
        self.uncompressed_offset += bytes.len() as u64;
        self.result.rows += 1;
        self.result.data_bytes += bytes.len() as u64;
        self.rows_since_index += 1;
        if self.rows_since_index >= INDEX_STRIDE {
            self.append_index_offset(self.uncompressed_offset)?;
            self.rows_since_index = 0;
        }
        Ok(())
    }

    fn append_index_offset(&mut self, offset: u64) -> Result<()> {
        if let Some(idx) = self.idx_file.as_mut() {
            idx.write(&offset.to_be_bytes())?;
        }
        Ok(())
    }

    /// Close the sink: append the final total-bytes sentinel to `.idx`,
    /// close both files, and rename `.dumping` → final names.
    pub fn finish(mut self) -> Result<DumpWriteResult> {
        self.append_index_offset(self.uncompressed_offset)?;
        let (mut file, bytes_written) = self.body.into_file()?;
        self.result.bytes_written = bytes_written;
        file.close()?;
        file.rename(&self.final_name)?;
        if let Some(mut idx) = self.idx_file.take() {
            idx.close()?;
            idx.rename(&format!("{}.idx", self.final_name))?;
        }
        Ok(self.result)
    }

    /// Abandon the sink on error: leaves the `.dumping` file(s) in place as
    /// an orphan marker, per spec §4.3/§7.
    pub fn abandon(self) -> Result<()> {
        let (mut file, _) = self.body.into_file()?;
        file.close()?;
        if let Some(mut idx) = self.idx_file {
            idx.close()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::LocalDirectory;

    #[test]
    fn idx_sentinel_equals_total_bytes() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = LocalDirectory::new(tmp.path());
        dir.create().unwrap();
        let mut sink = Sink::create(&dir, "t@0.csv", Compression::None, true).unwrap();
        sink.write_row(b"1,\"a\"\r\n").unwrap();
        sink.write_row(b"2,\"b\"\r\n").unwrap();
        let result = sink.finish().unwrap();
        assert_eq!(result.rows, 2);

        let idx_bytes = std::fs::read(tmp.path().join("t@0.csv.idx")).unwrap();
        assert_eq!(idx_bytes.len(), 8);
        let total = u64::from_be_bytes(idx_bytes[..8].try_into().unwrap());
        assert_eq!(total, result.data_bytes);
    }

    #[test]
    fn dumping_suffix_is_renamed_away_on_success() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = LocalDirectory::new(tmp.path());
        dir.create().unwrap();
        let sink = Sink::create(&dir, "s@t@0.tsv", Compression::None, false).unwrap();
        sink.finish().unwrap();
        assert!(tmp.path().join("s@t@0.tsv").exists());
        assert!(!tmp.path().join("s@t@0.tsv.dumping").exists());
    }

    #[test]
    fn gzip_compression_shrinks_repetitive_data() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = LocalDirectory::new(tmp.path());
        dir.create().unwrap();
        let mut sink = Sink::create(&dir, "g@t@0.txt", Compression::Gzip, false).unwrap();
        let row = vec![b'a'; 1024];
        for _ in 0..200 {
            sink.write_row(&row).unwrap();
        }
        let result = sink.finish().unwrap();
        assert!(result.bytes_written < result.data_bytes);
    }
}
