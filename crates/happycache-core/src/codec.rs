//! Map stream codec: gzip-compressed, line-oriented, delta-encoded.
//!
//! Write side is atomic — write to a sibling temp file, rename over the
//! final name on successful close, via `tempfile::NamedTempFile`. Read
//! side is a streaming line reader with an explicit maximum line length,
//! since `BufReader::read_until` alone has no notion of "this line is too
//! long".

use std::fs::File;
use std::io::{self, BufRead, BufReader, Read, Write};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use tempfile::NamedTempFile;

use crate::error::HappycacheError;

/// Minimum line buffer size: a path longer than this is a format error,
/// not a silent truncation.
pub const MIN_LINE_BUFFER: usize = 4096;

/// Parse a line as the non-negative decimal integer delta grammar: the
/// whole line must parse, or it's a path line.
pub fn parse_delta(line: &str) -> Option<u64> {
    line.parse::<u64>().ok()
}

/// Writes path/delta lines into a single gzip stream, renamed atomically
/// into place on `finish`.
pub struct MapWriter {
    encoder: GzEncoder<File>,
    temp: NamedTempFile,
    final_path: PathBuf,
}

impl MapWriter {
    /// Create the writer. The temp file is created as a sibling of
    /// `final_path` so the final `rename` is same-filesystem and atomic.
    pub fn create(final_path: &Path) -> io::Result<Self> {
        let dir = match final_path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        let temp = NamedTempFile::new_in(dir)?;
        let handle = temp.reopen()?;
        Ok(Self {
            encoder: GzEncoder::new(handle, Compression::fast()),
            temp,
            final_path: final_path.to_path_buf(),
        })
    }

    fn write_line(&mut self, line: &str) -> io::Result<()> {
        self.encoder.write_all(line.as_bytes())?;
        self.encoder.write_all(b"\n")
    }

    /// Emit a group's path line. Must be followed by at least one delta
    /// line; callers never emit a path for a file with zero resident
    /// pages.
    pub fn write_path(&mut self, path: &str) -> io::Result<()> {
        self.write_line(path)
    }

    /// Emit a delta line within the group opened by the preceding path.
    pub fn write_delta(&mut self, delta: u64) -> io::Result<()> {
        self.write_line(&delta.to_string())
    }

    /// Finish the gzip stream and atomically rename the temp file over
    /// `final_path`.
    pub fn finish(self) -> io::Result<()> {
        self.encoder.finish()?;
        self.temp
            .persist(&self.final_path)
            .map_err(|e| e.error)?;
        Ok(())
    }
}

/// Streaming reader over a decompressed line stream, enforcing a maximum
/// line length.
pub struct MapReader<R> {
    reader: BufReader<R>,
    buf: Vec<u8>,
    max_line: usize,
}

impl<R: Read> MapReader<R> {
    pub fn new(reader: R) -> Self {
        Self::with_max_line(reader, MIN_LINE_BUFFER)
    }

    pub fn with_max_line(reader: R, max_line: usize) -> Self {
        let max_line = max_line.max(MIN_LINE_BUFFER);
        Self {
            reader: BufReader::with_capacity(max_line, reader),
            buf: Vec::new(),
            max_line,
        }
    }

    /// Read the next line with its trailing newline stripped. The final
    /// line of the stream may omit its newline. Returns `Ok(None)` at end
    /// of stream.
    pub fn next_line(&mut self) -> crate::error::Result<Option<String>> {
        self.buf.clear();
        let n = self.reader.read_until(b'\n', &mut self.buf)?;
        if n == 0 {
            return Ok(None);
        }
        if self.buf.last() == Some(&b'\n') {
            self.buf.pop();
        }
        if self.buf.len() > self.max_line {
            return Err(HappycacheError::Format {
                line: String::from_utf8_lossy(&self.buf).into_owned(),
                reason: "line exceeds maximum map line length",
            });
        }
        let buf = std::mem::take(&mut self.buf);
        let line = String::from_utf8(buf).map_err(|e| HappycacheError::Format {
            line: String::from_utf8_lossy(e.as_bytes()).into_owned(),
            reason: "line is not valid UTF-8",
        })?;
        Ok(Some(line))
    }
}

/// Open a gzip-compressed map file for streaming reads.
pub fn open_reader(path: &Path) -> io::Result<MapReader<GzDecoder<File>>> {
    let file = File::open(path)?;
    Ok(MapReader::new(GzDecoder::new(file)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn round_trips_groups() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("map.gz");

        let mut writer = MapWriter::create(&path).unwrap();
        writer.write_path("./a").unwrap();
        writer.write_delta(0).unwrap();
        writer.write_delta(2).unwrap();
        writer.write_delta(1).unwrap();
        writer.write_path("./b").unwrap();
        writer.write_delta(1).unwrap();
        writer.finish().unwrap();

        let mut reader = open_reader(&path).unwrap();
        let mut lines = Vec::new();
        while let Some(line) = reader.next_line().unwrap() {
            lines.push(line);
        }
        assert_eq!(lines, vec!["./a", "0", "2", "1", "./b", "1"]);
    }

    #[test]
    fn parse_delta_rejects_non_integers_and_negatives() {
        assert_eq!(parse_delta("0"), Some(0));
        assert_eq!(parse_delta("42"), Some(42));
        assert_eq!(parse_delta("-1"), None);
        assert_eq!(parse_delta("./a"), None);
        assert_eq!(parse_delta(""), None);
        assert_eq!(parse_delta("12x"), None);
    }

    #[test]
    fn oversized_line_is_a_format_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("map.gz");
        let mut writer = MapWriter::create(&path).unwrap();
        let huge = "x".repeat(MIN_LINE_BUFFER + 1);
        writer.write_path(&huge).unwrap();
        writer.finish().unwrap();

        let mut reader = open_reader(&path).unwrap();
        assert!(reader.next_line().is_err());
    }

    #[test]
    fn final_line_without_trailing_newline_is_read() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("map.gz");
        {
            let file = File::create(&path).unwrap();
            let mut encoder = GzEncoder::new(file, Compression::fast());
            encoder.write_all(b"./a\n5").unwrap();
            encoder.finish().unwrap();
        }

        let mut reader = open_reader(&path).unwrap();
        assert_eq!(reader.next_line().unwrap(), Some("./a".to_string()));
        assert_eq!(reader.next_line().unwrap(), Some("5".to_string()));
        assert_eq!(reader.next_line().unwrap(), None);
    }
}
