//! Selection of the records and filename attributes that produce output.

use crate::mft::{AttributeType, FileNameAttr, MFTRecord, MasterFileTable, NameType};
use log::{debug, info};

/// Base records in entry order. Extension records are skipped: their
/// attributes were folded into the base record when the table was loaded.
pub fn base_records(mft: &MasterFileTable) -> impl Iterator<Item = &MFTRecord> {
    mft.records().filter(|record| match record.base_record() {
        Some(base) => {
            debug!(
                "Skipping entry # 0x{:X}, seq #: 0x{:X} since it is an extension record of {}",
                record.entry_number,
                record.sequence_number(),
                base
            );
            false
        }
        None => true,
    })
}

/// Filename attributes to emit, in namespace order. DOS short names are
/// only kept when `include_short_names` is set.
pub fn select_file_names(record: &MFTRecord, include_short_names: bool) -> Vec<FileNameAttr> {
    let mut names = record.file_names();
    names.sort_by_key(|f| f.name_type);
    names.retain(|f| include_short_names || f.name_type != NameType::Dos);
    names
}

/// Attribute id of the record's first $DATA attribute. Directories carry
/// no data stream and report none.
pub fn primary_data_attribute_id(record: &MFTRecord) -> Option<u16> {
    if record.is_dir() {
        return None;
    }
    record
        .attributes
        .iter()
        .find(|a| a.attr_type() == AttributeType::Data && a.lowest_vcn() == 0)
        .map(|a| a.header().id)
}

/// Log attribute kinds the scanner does not interpret.
pub fn report_unrecognized(record: &MFTRecord) {
    for attr_type in record.unrecognized_attributes() {
        info!(
            "E/S: {}-{}: {}",
            record.entry_number,
            record.sequence_number(),
            attr_type
        );
    }
}
