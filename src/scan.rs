//! Walks a decoded table and feeds normalised records to a sink.

use crate::error::{MftError, Result};
use crate::filter::{base_records, report_unrecognized, select_file_names};
use crate::mft::{MFTRecord, MasterFileTable};
use crate::output::OutputRecord;
use crate::sink::{RecordSink, ResidentDumper};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct ScanOptions {
    /// Also emit DOS 8.3 filename attributes.
    pub include_short_names: bool,
    /// Fill every 0x30 timestamp, not only those that differ from 0x10.
    pub show_all_timestamps: bool,
    /// Where resident data payloads are written, if anywhere.
    pub dump_directory: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct ScanSummary {
    pub base_records: usize,
    pub records_emitted: usize,
    pub ads_records_emitted: usize,
    pub skipped_cycles: usize,
    pub files_dumped: usize,
}

/// Emit one record per selected filename attribute of every base record,
/// plus one per (filename, alternate data stream) pair.
pub fn process_records<S: RecordSink + ?Sized>(
    mft: &MasterFileTable,
    options: &ScanOptions,
    sink: &mut S,
) -> Result<ScanSummary> {
    let dumper = options
        .dump_directory
        .as_ref()
        .map(ResidentDumper::new)
        .transpose()?;
    let mut summary = ScanSummary::default();

    for record in base_records(mft) {
        summary.base_records += 1;
        report_unrecognized(record);

        let streams = record.alternate_data_streams();
        for name in select_file_names(record, options.include_short_names) {
            let emitted = emit(mft, record, sink, |resolver| {
                OutputRecord::create(resolver, record, &name, None, options.show_all_timestamps)
            })?;
            if !emitted {
                summary.skipped_cycles += 1;
                continue;
            }
            summary.records_emitted += 1;

            for ads in &streams {
                let emitted = emit(mft, record, sink, |resolver| {
                    OutputRecord::create(
                        resolver,
                        record,
                        &name,
                        Some(ads),
                        options.show_all_timestamps,
                    )
                })?;
                if emitted {
                    summary.ads_records_emitted += 1;
                }
            }
        }

        if let Some(dumper) = &dumper {
            summary.files_dumped += dumper.dump(record)?.len();
        }
    }

    sink.finish()?;
    info!(
        "Processed {} base records: {} records, {} ADS records, {} skipped",
        summary.base_records,
        summary.records_emitted,
        summary.ads_records_emitted,
        summary.skipped_cycles
    );
    Ok(summary)
}

// Ok(false) when the record's parent chain loops; that record is dropped and
// the scan goes on.
fn emit<S, F>(
    mft: &MasterFileTable,
    record: &MFTRecord,
    sink: &mut S,
    build: F,
) -> Result<bool>
where
    S: RecordSink + ?Sized,
    F: FnOnce(&MasterFileTable) -> Result<OutputRecord>,
{
    match build(mft) {
        Ok(out) => {
            sink.write_record(&out)?;
            Ok(true)
        }
        Err(MftError::ParentCycle { entry, sequence }) => {
            warn!(
                "Skipping entry {}-{}: cyclic parent chain at {}-{}",
                record.entry_number,
                record.sequence_number(),
                entry,
                sequence
            );
            Ok(false)
        }
        Err(e) => Err(e),
    }
}
