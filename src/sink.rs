//! Destinations for normalised records and resident data dumps.

use crate::error::Result;
use crate::mft::MFTRecord;
use crate::output::{FileListEntry, OutputRecord};
use chrono::SecondsFormat;
use log::{debug, info};
use std::fs;
use std::io::Write;
use std::path::PathBuf;

/// How a [`ConsoleSink`] renders each record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Table,
    /// One JSON object per line.
    Json,
    /// Flat file listing.
    List,
}

pub trait RecordSink {
    fn write_record(&mut self, record: &OutputRecord) -> Result<()>;

    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Collects records in memory.
impl RecordSink for Vec<OutputRecord> {
    fn write_record(&mut self, record: &OutputRecord) -> Result<()> {
        self.push(record.clone());
        Ok(())
    }
}

pub struct ConsoleSink<W: Write> {
    out: W,
    format: OutputFormat,
    written: usize,
}

impl<W: Write> ConsoleSink<W> {
    pub fn new(out: W, format: OutputFormat) -> Self {
        Self {
            out,
            format,
            written: 0,
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> RecordSink for ConsoleSink<W> {
    fn write_record(&mut self, record: &OutputRecord) -> Result<()> {
        match self.format {
            OutputFormat::Table => writeln!(self.out, "{}", record.to_string())?,
            OutputFormat::Json => {
                serde_json::to_writer(&mut self.out, record)?;
                writeln!(self.out)?;
            }
            OutputFormat::List => {
                let entry = FileListEntry::from(record);
                let created = entry
                    .created_0x10
                    .map(|d| d.to_rfc3339_opts(SecondsFormat::Nanos, true))
                    .unwrap_or_default();
                let size = if entry.is_directory {
                    "<DIR>".to_string()
                } else {
                    entry.file_size.to_string()
                };
                writeln!(self.out, "{:>14}  {}  {}", size, created, entry.full_path)?;
            }
        }
        self.written += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.out.flush()?;
        debug!("Console sink wrote {} records", self.written);
        Ok(())
    }
}

/// Writes the resident `$DATA` payloads of records into one directory.
pub struct ResidentDumper {
    dir: PathBuf,
}

impl ResidentDumper {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// Dump every resident data stream of `record`. Returns the paths written.
    pub fn dump(&self, record: &MFTRecord) -> Result<Vec<PathBuf>> {
        let Some(name) = record.primary_name() else {
            return Ok(Vec::new());
        };
        let mut written = Vec::new();
        for (stream, bytes) in record.resident_data() {
            let path = self.dir.join(dump_file_name(record, &name.name, stream));
            fs::write(&path, bytes)?;
            info!("Dumped {} bytes to {}", bytes.len(), path.display());
            written.push(path);
        }
        Ok(written)
    }
}

/// `{entry}-{seq}_{file_name}.bin`, with `_{stream}` before the suffix for
/// named streams.
pub fn dump_file_name(record: &MFTRecord, file_name: &str, stream: Option<&str>) -> String {
    let stem = format!(
        "{}-{}_{}",
        record.entry_number,
        record.sequence_number(),
        sanitize(file_name)
    );
    match stream {
        Some(s) => format!("{}_{}.bin", stem, sanitize(s)),
        None => format!("{}.bin", stem),
    }
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '\\' | '/' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect()
}
