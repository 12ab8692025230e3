//! Normalised per-file forensic records.

use crate::error::Result;
use crate::filter::primary_data_attribute_id;
use crate::mft::{
    AdsDescriptor, FileNameAttr, MFTRecord, NameType, PathResolver, StandardInformation,
    si_flags_to_string,
};
use chrono::{DateTime, Utc};
use encoding::all::WINDOWS_1252;
use encoding::{DecoderTrap, Encoding};
use prettytable::{Table, row};
use serde::{Deserialize, Serialize};

pub const ZONE_IDENTIFIER: &str = "Zone.Identifier";
pub const ZONE_ID_NON_RESIDENT: &str = "(Zone.Identifier data is non-resident)";
const DEVICE_PATH_PREFIX: &str = r"\??\";

/// One output line: a base record seen through one of its filename
/// attributes, optionally narrowed to one alternate data stream.
///
/// The `_0x10` timestamps come from `$STANDARD_INFORMATION`; the `_0x30`
/// ones from `$FILE_NAME` and are only filled in when they disagree with
/// their `_0x10` counterpart (or when every timestamp was asked for).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputRecord {
    pub entry_number: u32,
    pub sequence_number: u16,
    pub parent_entry_number: u32,
    pub parent_sequence_number: u16,
    pub in_use: bool,
    pub parent_path: String,
    pub file_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extension: Option<String>,
    pub is_directory: bool,
    pub has_ads: bool,
    pub is_ads: bool,
    pub file_size: u64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_0x10: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_0x30: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_modified_0x10: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_modified_0x30: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_record_change_0x10: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_record_change_0x30: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_access_0x10: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_access_0x30: Option<DateTime<Utc>>,

    pub update_sequence_number: i64,
    pub logfile_sequence_number: i64,
    pub security_id: i32,
    pub si_flags: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zone_id_contents: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object_id_file_droid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reparse_target: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logged_util_stream: Option<String>,
    pub reference_count: usize,
    pub name_type: NameType,

    pub timestomped: bool,
    pub usec_zeros: bool,
    pub copied: bool,

    pub fn_attribute_id: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub other_attribute_id: Option<u16>,
}

impl OutputRecord {
    /// Build the output record for `record` as named by `name`, or for one
    /// of its alternate data streams when `ads` is given.
    ///
    /// Fails only when the parent chain cannot be resolved.
    pub fn create<P: PathResolver + ?Sized>(
        resolver: &P,
        record: &MFTRecord,
        name: &FileNameAttr,
        ads: Option<&AdsDescriptor>,
        show_all_timestamps: bool,
    ) -> Result<Self> {
        let is_directory = record.is_dir();
        let streams = record.alternate_data_streams();

        let mut out = OutputRecord {
            entry_number: record.entry_number,
            sequence_number: record.sequence_number(),
            parent_entry_number: name.parent.entry_number,
            parent_sequence_number: name.parent.sequence_number,
            in_use: record.in_use(),
            parent_path: resolver.parent_path(name.parent)?,
            file_name: name.name.clone(),
            extension: None,
            is_directory,
            has_ads: !streams.is_empty(),
            is_ads: ads.is_some(),
            file_size: record.file_size(),
            created_0x10: None,
            created_0x30: None,
            last_modified_0x10: None,
            last_modified_0x30: None,
            last_record_change_0x10: None,
            last_record_change_0x30: None,
            last_access_0x10: None,
            last_access_0x30: None,
            update_sequence_number: 0,
            logfile_sequence_number: record.header.lsn as i64,
            security_id: 0,
            si_flags: 0,
            zone_id_contents: None,
            object_id_file_droid: record.object_id(),
            reparse_target: record
                .reparse_point()
                .and_then(|rp| rp.substitute_name)
                .map(|s| strip_device_prefix(&s).to_string()),
            logged_util_stream: record.logged_utility_stream(),
            reference_count: record.reference_count(),
            name_type: name.name_type,
            timestomped: false,
            usec_zeros: false,
            copied: false,
            fn_attribute_id: name.attribute_id,
            other_attribute_id: primary_data_attribute_id(record),
        };

        if !is_directory {
            out.extension = extension_of(&out.file_name);
        }

        if let Some(stream) = ads {
            out.file_name = format!("{}:{}", out.file_name, stream.name);
            out.file_size = stream.size;
            out.extension = extension_of(&stream.name);
            if stream.name == ZONE_IDENTIFIER {
                out.zone_id_contents = Some(match &stream.resident_payload {
                    Some(payload) => decode_zone_identifier(payload),
                    None => ZONE_ID_NON_RESIDENT.to_string(),
                });
            }
        }

        match record.standard_information() {
            Some(si) => out.reconcile_timestamps(&si, name, show_all_timestamps),
            None => {
                out.created_0x10 = Some(name.created);
                out.last_modified_0x10 = Some(name.modified);
                out.last_record_change_0x10 = Some(name.mft_modified);
                out.last_access_0x10 = Some(name.accessed);
            }
        }

        Ok(out)
    }

    fn reconcile_timestamps(
        &mut self,
        si: &StandardInformation,
        name: &FileNameAttr,
        show_all: bool,
    ) {
        let when_differs = |fn_value: DateTime<Utc>, si_value: DateTime<Utc>| {
            (show_all || fn_value != si_value).then_some(fn_value)
        };

        self.update_sequence_number = si.usn.unwrap_or(0) as i64;
        self.security_id = si.security_id.unwrap_or(0) as i32;
        self.si_flags = si.file_attrs;

        self.created_0x10 = Some(si.created);
        self.last_modified_0x10 = Some(si.modified);
        self.last_record_change_0x10 = Some(si.mft_modified);
        self.last_access_0x10 = Some(si.accessed);

        self.created_0x30 = when_differs(name.created, si.created);
        self.last_modified_0x30 = when_differs(name.modified, si.modified);
        self.last_record_change_0x30 = when_differs(name.mft_modified, si.mft_modified);
        self.last_access_0x30 = when_differs(name.accessed, si.accessed);

        self.copied = si.modified < si.created;
        self.timestomped = self.created_0x30.is_some_and(|fn_created| fn_created < si.created);
        self.usec_zeros =
            si.created.timestamp_subsec_nanos() == 0 || si.modified.timestamp_subsec_nanos() == 0;
    }

    /// Convert to a human‑readable table string.
    pub fn to_string(&self) -> String {
        let ts = |v: &Option<DateTime<Utc>>| v.map(|d| d.to_rfc3339()).unwrap_or_default();

        let mut t = Table::new();
        t.add_row(row![b -> "Entry", format!("{}-{}", self.entry_number, self.sequence_number)]);
        t.add_row(row![
            b -> "Parent",
            format!("{}-{}", self.parent_entry_number, self.parent_sequence_number)
        ]);
        t.add_row(row![b -> "Path", format!("{}\\{}", self.parent_path, self.file_name)]);
        t.add_row(row![b -> "In Use", self.in_use]);
        t.add_row(row![b -> "Directory", self.is_directory]);
        t.add_row(row![b -> "Size", self.file_size]);
        if let Some(ext) = &self.extension {
            t.add_row(row![b -> "Extension", ext]);
        }
        t.add_row(row![b -> "Name Type", format!("{:?}", self.name_type)]);
        t.add_row(row![b -> "Created 0x10", ts(&self.created_0x10)]);
        if self.created_0x30.is_some() {
            t.add_row(row![b -> "Created 0x30", ts(&self.created_0x30)]);
        }
        t.add_row(row![b -> "Modified 0x10", ts(&self.last_modified_0x10)]);
        if self.last_modified_0x30.is_some() {
            t.add_row(row![b -> "Modified 0x30", ts(&self.last_modified_0x30)]);
        }
        t.add_row(row![b -> "Record Change 0x10", ts(&self.last_record_change_0x10)]);
        if self.last_record_change_0x30.is_some() {
            t.add_row(row![b -> "Record Change 0x30", ts(&self.last_record_change_0x30)]);
        }
        t.add_row(row![b -> "Accessed 0x10", ts(&self.last_access_0x10)]);
        if self.last_access_0x30.is_some() {
            t.add_row(row![b -> "Accessed 0x30", ts(&self.last_access_0x30)]);
        }
        t.add_row(row![b -> "SI Flags", si_flags_to_string(self.si_flags)]);
        t.add_row(row![b -> "Security ID", self.security_id]);
        t.add_row(row![b -> "USN", self.update_sequence_number]);
        t.add_row(row![b -> "LSN", self.logfile_sequence_number]);
        t.add_row(row![b -> "Links", self.reference_count]);
        if self.has_ads {
            t.add_row(row![b -> "Has ADS", self.has_ads]);
        }
        if let Some(zone) = &self.zone_id_contents {
            t.add_row(row![b -> "Zone.Identifier", zone]);
        }
        if let Some(oid) = &self.object_id_file_droid {
            t.add_row(row![b -> "Object ID", oid]);
        }
        if let Some(target) = &self.reparse_target {
            t.add_row(row![b -> "Reparse Target", target]);
        }
        if let Some(lus) = &self.logged_util_stream {
            t.add_row(row![b -> "Logged Utility Stream", lus]);
        }
        let flags: Vec<&str> = [
            (self.timestomped, "TIMESTOMPED"),
            (self.usec_zeros, "USEC_ZEROS"),
            (self.copied, "COPIED"),
        ]
        .iter()
        .filter(|(set, _)| *set)
        .map(|(_, name)| *name)
        .collect();
        if !flags.is_empty() {
            t.add_row(row![b -> "Indicators", flags.join(" | ")]);
        }
        t.to_string()
    }
}

/// Flat projection used by the file listing output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileListEntry {
    pub full_path: String,
    pub extension: Option<String>,
    pub is_directory: bool,
    pub file_size: u64,
    pub created_0x10: Option<DateTime<Utc>>,
    pub last_modified_0x10: Option<DateTime<Utc>>,
}

impl From<&OutputRecord> for FileListEntry {
    fn from(r: &OutputRecord) -> Self {
        Self {
            full_path: format!("{}\\{}", r.parent_path, r.file_name),
            extension: r.extension.clone(),
            is_directory: r.is_directory,
            file_size: r.file_size,
            created_0x10: r.created_0x10,
            last_modified_0x10: r.last_modified_0x10,
        }
    }
}

/// Extension of `name` including the leading dot, in the manner of a
/// Windows path: nothing after a separator or stream colon, nothing for a
/// trailing dot. Names with characters invalid in a path yield `None`.
pub fn extension_of(name: &str) -> Option<String> {
    if name
        .chars()
        .any(|c| c < ' ' || matches!(c, '"' | '<' | '>' | '|'))
    {
        return None;
    }
    let idx = name.rfind(['.', '\\', '/', ':'])?;
    let ext = &name[idx..];
    (ext.starts_with('.') && ext.len() > 1).then(|| ext.to_string())
}

/// Zone.Identifier payloads are written in the ANSI code page.
pub fn decode_zone_identifier(payload: &[u8]) -> String {
    WINDOWS_1252
        .decode(payload, DecoderTrap::Replace)
        .unwrap_or_else(|_| String::from_utf8_lossy(payload).into_owned())
}

fn strip_device_prefix(target: &str) -> &str {
    target.strip_prefix(DEVICE_PATH_PREFIX).unwrap_or(target)
}
