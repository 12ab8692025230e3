// Sources:
// - https://dubeyko.com/development/FileSystems/NTFS/ntfsdoc.pdf
// - https://en.wikipedia.org/wiki/NTFS

use crate::error::{MftError, Result};
use byteorder::{LittleEndian, ReadBytesExt};
use chrono::{DateTime, TimeZone, Utc};
use log::{debug, info, trace, warn};
use prettytable::{Table, row};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::io::{self, Cursor, ErrorKind, Read};

/// Size of the fixed part of a FILE record header.
pub const RECORD_HEADER_SIZE: usize = 0x30;
/// Largest record size accepted from a header or boot sector.
pub const MAX_RECORD_SIZE: u32 = 0x10000;
/// Entry number of the root directory.
pub const ROOT_ENTRY: u32 = 5;
/// Hop bound for parent-path resolution.
pub const MAX_PATH_DEPTH: usize = 4096;

const FIXUP_STRIDE: usize = 512;

/// A reference to an MFT slot: entry number plus the generation it must match.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize,
)]
pub struct FileRecordRef {
    pub entry_number: u32,
    pub sequence_number: u16,
}

impl FileRecordRef {
    pub fn new(entry_number: u32, sequence_number: u16) -> Self {
        Self {
            entry_number,
            sequence_number,
        }
    }

    /// Split an on-disk 64-bit reference (48-bit entry, 16-bit sequence).
    pub fn from_raw(raw: u64) -> Self {
        Self {
            entry_number: (raw & 0x0000_FFFF_FFFF_FFFF) as u32,
            sequence_number: (raw >> 48) as u16,
        }
    }

    pub fn is_zero(&self) -> bool {
        self.entry_number == 0 && self.sequence_number == 0
    }
}

impl fmt::Display for FileRecordRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.entry_number, self.sequence_number)
    }
}

/// Header found at the very beginning of every **FILE** record (offset 0).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FileRecordHeader {
    pub signature: [u8; 4],
    pub usa_offset: u16,
    pub usa_count: u16,
    pub lsn: u64,
    pub sequence_number: u16,
    pub hard_link_count: u16,
    pub attrs_offset: u16,
    pub flags: u16,
    pub bytes_in_use: u32,
    pub bytes_allocated: u32,
    pub base_file_record: u64,
    pub next_attr_id: u16,
}

impl FileRecordHeader {
    pub fn from_bytes(raw: &[u8]) -> io::Result<Self> {
        let mut cursor = Cursor::new(raw);
        let mut signature = [0u8; 4];
        cursor.read_exact(&mut signature)?;
        Ok(Self {
            signature,
            usa_offset: cursor.read_u16::<LittleEndian>()?,
            usa_count: cursor.read_u16::<LittleEndian>()?,
            lsn: cursor.read_u64::<LittleEndian>()?,
            sequence_number: cursor.read_u16::<LittleEndian>()?,
            hard_link_count: cursor.read_u16::<LittleEndian>()?,
            attrs_offset: cursor.read_u16::<LittleEndian>()?,
            flags: cursor.read_u16::<LittleEndian>()?,
            bytes_in_use: cursor.read_u32::<LittleEndian>()?,
            bytes_allocated: cursor.read_u32::<LittleEndian>()?,
            base_file_record: cursor.read_u64::<LittleEndian>()?,
            next_attr_id: cursor.read_u16::<LittleEndian>()?,
        })
    }

    pub fn is_file(&self) -> bool {
        &self.signature == b"FILE"
    }

    pub fn in_use(&self) -> bool {
        self.flags & 0x0001 != 0
    }

    pub fn is_dir(&self) -> bool {
        self.flags & 0x0002 != 0
    }

    /// Back-reference to the base record; `None` for base records.
    pub fn base_record(&self) -> Option<FileRecordRef> {
        let base = FileRecordRef::from_raw(self.base_file_record);
        (!base.is_zero()).then_some(base)
    }
}

/// Check a declared record size against the hard cap and the containing
/// volume or stream.
pub fn validate_record_size(size: u32, offset: u64, limit: u64) -> Result<u32> {
    let details = if size == 0 {
        "declared record length is zero".to_string()
    } else if size > MAX_RECORD_SIZE {
        format!("declared record length {} exceeds {}", size, MAX_RECORD_SIZE)
    } else if size as u64 > limit {
        format!("declared record length {} exceeds available {} bytes", size, limit)
    } else if (size as usize) < RECORD_HEADER_SIZE {
        format!("declared record length {} is smaller than a record header", size)
    } else {
        return Ok(size);
    };
    Err(MftError::CorruptMftHeader { offset, details })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum AttributeType {
    StandardInformation,
    AttributeList,
    FileName,
    ObjectId,
    SecurityDescriptor,
    VolumeName,
    VolumeInformation,
    Data,
    IndexRoot,
    IndexAllocation,
    Bitmap,
    ReparsePoint,
    EaInformation,
    Ea,
    PropertySet,
    LoggedUtilityStream,
    Unknown(u32),
}

impl AttributeType {
    pub fn from_code(value: u32) -> Self {
        use AttributeType::*;
        match value {
            0x10 => StandardInformation,
            0x20 => AttributeList,
            0x30 => FileName,
            0x40 => ObjectId,
            0x50 => SecurityDescriptor,
            0x60 => VolumeName,
            0x70 => VolumeInformation,
            0x80 => Data,
            0x90 => IndexRoot,
            0xA0 => IndexAllocation,
            0xB0 => Bitmap,
            0xC0 => ReparsePoint,
            0xD0 => EaInformation,
            0xE0 => Ea,
            0xF0 => PropertySet,
            0x100 => LoggedUtilityStream,
            other => Unknown(other),
        }
    }

    pub fn code(&self) -> u32 {
        use AttributeType::*;
        match self {
            StandardInformation => 0x10,
            AttributeList => 0x20,
            FileName => 0x30,
            ObjectId => 0x40,
            SecurityDescriptor => 0x50,
            VolumeName => 0x60,
            VolumeInformation => 0x70,
            Data => 0x80,
            IndexRoot => 0x90,
            IndexAllocation => 0xA0,
            Bitmap => 0xB0,
            ReparsePoint => 0xC0,
            EaInformation => 0xD0,
            Ea => 0xE0,
            PropertySet => 0xF0,
            LoggedUtilityStream => 0x100,
            Unknown(code) => *code,
        }
    }

    /// Whether the scanner knows what to make of this attribute kind.
    /// Anything else is worth surfacing to an analyst.
    pub fn is_recognized(&self) -> bool {
        use AttributeType::*;
        match self {
            StandardInformation | AttributeList | FileName | ObjectId | VolumeName
            | VolumeInformation | Data | IndexRoot | IndexAllocation | Bitmap | ReparsePoint
            | LoggedUtilityStream => true,
            SecurityDescriptor | EaInformation | Ea | PropertySet | Unknown(_) => false,
        }
    }
}

impl fmt::Display for AttributeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeType::Unknown(code) => write!(f, "Unknown(0x{:X})", code),
            other => write!(f, "{:?}(0x{:X})", other, other.code()),
        }
    }
}

/// Common header part for resident & non‑resident attributes.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AttributeHeaderCommon {
    pub attr_type: AttributeType,
    pub length: u32,
    pub non_resident: bool,
    pub name_length: u8,
    pub name_offset: u16,
    pub flags: u16,
    pub id: u16,
    pub name: Option<String>,
}

/// Additional 8‑byte header present only when the attribute is resident
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ResidentHeader {
    pub value_length: u32,
    pub value_offset: u16,
    pub resident_flags: u8, // 0 = indexed ($I30), 1 = normal
}

/// Additional 40‑byte header present only when the attribute is non‑resident
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NonResidentHeader {
    pub lowest_vcn: u64,
    pub highest_vcn: u64,
    pub mapping_pairs_offset: u16,
    pub compression_unit: u16,
    pub allocated_size: u64,
    pub real_size: u64,
    pub initialized_size: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub enum Attribute {
    Resident {
        header: AttributeHeaderCommon,
        resident: ResidentHeader,
        value: Vec<u8>,
    },
    NonResident {
        header: AttributeHeaderCommon,
        non_resident: NonResidentHeader,
        run_list: Vec<u8>,
    },
}

impl Attribute {
    pub fn header(&self) -> &AttributeHeaderCommon {
        match self {
            Attribute::Resident { header, .. } | Attribute::NonResident { header, .. } => header,
        }
    }

    pub fn attr_type(&self) -> AttributeType {
        self.header().attr_type
    }

    pub fn is_resident(&self) -> bool {
        matches!(self, Attribute::Resident { .. })
    }

    /// Logical size of the attribute value.
    pub fn data_size(&self) -> u64 {
        match self {
            Attribute::Resident { resident, .. } => resident.value_length as u64,
            Attribute::NonResident { non_resident, .. } => non_resident.real_size,
        }
    }

    pub fn resident_value(&self) -> Option<&[u8]> {
        match self {
            Attribute::Resident { value, .. } => Some(value),
            Attribute::NonResident { .. } => None,
        }
    }

    /// First VCN mapped by this segment. Resident values and the leading
    /// segment of a split attribute start at 0.
    pub fn lowest_vcn(&self) -> u64 {
        match self {
            Attribute::Resident { .. } => 0,
            Attribute::NonResident { non_resident, .. } => non_resident.lowest_vcn,
        }
    }

    fn is_named(&self) -> bool {
        self.header().name_length > 0
    }

    // Continuation segments carry zero sizes; only the VCN 0 segment
    // describes the whole stream.
    fn is_leading_data(&self) -> bool {
        self.attr_type() == AttributeType::Data && self.lowest_vcn() == 0
    }
}

/// Alternate data stream (named $DATA attribute).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct AdsDescriptor {
    pub name: String,
    pub size: u64,
    pub resident_payload: Option<Vec<u8>>,
}

/// Reparse point payload; only mount points and symbolic links carry names.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReparsePoint {
    pub tag: u32,
    pub substitute_name: Option<String>,
    pub print_name: Option<String>,
}

pub const IO_REPARSE_TAG_MOUNT_POINT: u32 = 0xA000_0003;
pub const IO_REPARSE_TAG_SYMLINK: u32 = 0xA000_000C;

impl ReparsePoint {
    pub fn from_bytes(raw: &[u8]) -> Option<Self> {
        let mut cur = Cursor::new(raw);
        let tag = cur.read_u32::<LittleEndian>().ok()?;
        let _data_length = cur.read_u16::<LittleEndian>().ok()?;
        cur.read_u16::<LittleEndian>().ok()?; // reserved

        let buffer_start = match tag {
            IO_REPARSE_TAG_MOUNT_POINT => 16,
            IO_REPARSE_TAG_SYMLINK => 20,
            _ => {
                return Some(Self {
                    tag,
                    substitute_name: None,
                    print_name: None,
                });
            }
        };
        let sub_off = cur.read_u16::<LittleEndian>().ok()? as usize;
        let sub_len = cur.read_u16::<LittleEndian>().ok()? as usize;
        let print_off = cur.read_u16::<LittleEndian>().ok()? as usize;
        let print_len = cur.read_u16::<LittleEndian>().ok()? as usize;

        let slice = |off: usize, len: usize| {
            raw.get(buffer_start + off..buffer_start + off + len)
                .map(utf16_string)
        };
        Some(Self {
            tag,
            substitute_name: slice(sub_off, sub_len),
            print_name: slice(print_off, print_len),
        })
    }
}

/// Format the first 16 bytes of an $OBJECT_ID value as a GUID.
pub fn format_object_id(raw: &[u8]) -> Option<String> {
    let b = raw.get(..16)?;
    let d1 = u32::from_le_bytes([b[0], b[1], b[2], b[3]]);
    let d2 = u16::from_le_bytes([b[4], b[5]]);
    let d3 = u16::from_le_bytes([b[6], b[7]]);
    Some(format!(
        "{:08x}-{:04x}-{:04x}-{:02x}{:02x}-{:02x}{:02x}{:02x}{:02x}{:02x}{:02x}",
        d1, d2, d3, b[8], b[9], b[10], b[11], b[12], b[13], b[14], b[15]
    ))
}

/// A fully parsed MFT record.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MFTRecord {
    pub entry_number: u32,
    pub header: FileRecordHeader,
    pub attributes: Vec<Attribute>,
}

// At the end of every 512‑byte stride NTFS overwrites the last two bytes with the Update‑Sequence Number (USN).
fn apply_fixups(buf: &mut [u8], usa_offset: usize, usa_count: usize) -> io::Result<()> {
    if usa_offset + 2 * usa_count > buf.len() {
        warn!("Incomplete multi‑sector transfer – corrupted MFT record.");
        return Err(invalid("USA table outside record"));
    }
    if usa_count < 1 {
        return Ok(());
    }

    let usn = [buf[usa_offset], buf[usa_offset + 1]];

    for i in 1..usa_count {
        let sector_end = i * FIXUP_STRIDE - 2;
        if sector_end + 2 > buf.len() {
            return Err(invalid(format!("sector {} ends after record", i)));
        }
        if buf[sector_end] != usn[0] || buf[sector_end + 1] != usn[1] {
            return Err(invalid(format!("bad USN at sector {}", i)));
        }
        let fix_pos = usa_offset + 2 * i;
        buf[sector_end] = buf[fix_pos];
        buf[sector_end + 1] = buf[fix_pos + 1];
    }
    Ok(())
}

impl MFTRecord {
    /// Parse one raw record slot into a `MFTRecord`.
    pub fn from_bytes(raw: &[u8], entry_number: u32) -> Result<Self> {
        let corrupt = |e: io::Error| MftError::CorruptRecord {
            entry: entry_number as u64,
            details: e.to_string(),
        };

        let header = FileRecordHeader::from_bytes(raw).map_err(corrupt)?;
        if !header.is_file() {
            return Err(corrupt(invalid(format!(
                "record signature is not 'FILE', found: {}",
                String::from_utf8_lossy(&header.signature)
            ))));
        }

        // we need a mutable copy so we can patch the USNs in‑place
        let mut buf = raw.to_vec();
        apply_fixups(
            &mut buf,
            header.usa_offset as usize,
            header.usa_count as usize,
        )
        .map_err(corrupt)?;

        let end = std::cmp::min(header.bytes_in_use as usize, buf.len());
        let mut pos = header.attrs_offset as usize;
        let mut attributes = Vec::new();
        while pos + 4 <= end {
            let code = u32::from_le_bytes([buf[pos], buf[pos + 1], buf[pos + 2], buf[pos + 3]]);
            if code == 0xFFFF_FFFF {
                break;
            }
            if pos + 8 > end {
                return Err(corrupt(invalid("attribute header truncated")));
            }
            let length =
                u32::from_le_bytes([buf[pos + 4], buf[pos + 5], buf[pos + 6], buf[pos + 7]])
                    as usize;
            if length == 0 || pos + length > end {
                return Err(corrupt(invalid(format!(
                    "attribute at 0x{:X} has invalid length {}",
                    pos, length
                ))));
            }
            attributes.push(parse_attribute(&buf[pos..pos + length]).map_err(corrupt)?);
            pos += length;
        }

        Ok(MFTRecord {
            entry_number,
            header,
            attributes,
        })
    }

    pub fn sequence_number(&self) -> u16 {
        self.header.sequence_number
    }

    pub fn reference(&self) -> FileRecordRef {
        FileRecordRef::new(self.entry_number, self.header.sequence_number)
    }

    pub fn base_record(&self) -> Option<FileRecordRef> {
        self.header.base_record()
    }

    pub fn is_dir(&self) -> bool {
        self.header.is_dir()
    }

    pub fn in_use(&self) -> bool {
        self.header.in_use()
    }

    fn find(&self, attr_type: AttributeType) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.attr_type() == attr_type)
    }

    /// List every $FILE_NAME attribute found (there may be 2 – long & DOS).
    pub fn file_names(&self) -> Vec<FileNameAttr> {
        self.attributes
            .iter()
            .filter(|a| a.attr_type() == AttributeType::FileName)
            .filter_map(|a| {
                let value = a.resident_value()?;
                FileNameAttr::parse(value, a.header().id)
            })
            .collect()
    }

    /// The name used for paths: the first non-DOS name in namespace order.
    pub fn primary_name(&self) -> Option<FileNameAttr> {
        let mut names = self.file_names();
        names.sort_by_key(|f| f.name_type);
        let fallback = names.first().cloned();
        names
            .into_iter()
            .find(|f| f.name_type != NameType::Dos)
            .or(fallback)
    }

    pub fn standard_information(&self) -> Option<StandardInformation> {
        self.find(AttributeType::StandardInformation)
            .and_then(Attribute::resident_value)
            .and_then(StandardInformation::from_bytes)
    }

    /// The leading segment of the unnamed $DATA attribute, if any.
    pub fn data_attribute(&self) -> Option<&Attribute> {
        self.attributes
            .iter()
            .find(|a| a.is_leading_data() && !a.is_named())
    }

    /// Logical size of the primary data stream; 0 when there is none.
    pub fn file_size(&self) -> u64 {
        self.data_attribute().map_or(0, Attribute::data_size)
    }

    /// Number of hard links (non-DOS names).
    pub fn reference_count(&self) -> usize {
        self.file_names()
            .iter()
            .filter(|f| f.name_type != NameType::Dos)
            .count()
    }

    /// Extract Alternate Data Streams (named $DATA attributes), one per
    /// stream name even when its extents span several extension records.
    pub fn alternate_data_streams(&self) -> Vec<AdsDescriptor> {
        let mut seen = HashSet::new();
        self.attributes
            .iter()
            .filter(|a| a.is_leading_data() && a.is_named())
            .filter(|a| seen.insert(a.header().name.as_deref()))
            .map(|a| AdsDescriptor {
                name: a.header().name.clone().unwrap_or_default(),
                size: a.data_size(),
                resident_payload: a.resident_value().map(<[u8]>::to_vec),
            })
            .collect()
    }

    /// Resident $DATA payloads as `(stream name, bytes)`; `None` names the
    /// primary stream.
    pub fn resident_data(&self) -> Vec<(Option<&str>, &[u8])> {
        self.attributes
            .iter()
            .filter(|a| a.attr_type() == AttributeType::Data)
            .filter_map(|a| Some((a.header().name.as_deref(), a.resident_value()?)))
            .collect()
    }

    pub fn object_id(&self) -> Option<String> {
        self.find(AttributeType::ObjectId)
            .and_then(Attribute::resident_value)
            .and_then(format_object_id)
    }

    pub fn reparse_point(&self) -> Option<ReparsePoint> {
        self.find(AttributeType::ReparsePoint)
            .and_then(Attribute::resident_value)
            .and_then(ReparsePoint::from_bytes)
    }

    /// Name of the first $LOGGED_UTILITY_STREAM (e.g. `$TXF_DATA`, `$EFS`).
    pub fn logged_utility_stream(&self) -> Option<String> {
        self.find(AttributeType::LoggedUtilityStream)
            .map(|a| a.header().name.clone().unwrap_or_default())
    }

    pub fn unrecognized_attributes(&self) -> impl Iterator<Item = AttributeType> + '_ {
        self.attributes
            .iter()
            .map(Attribute::attr_type)
            .filter(|t| !t.is_recognized())
    }

    /// Convert record to a human‑readable table string.
    pub fn to_string(&self) -> String {
        let mut out = String::new();

        let mut hdr = Table::new();
        hdr.add_row(row!["MFT Entry Header Values"]);
        hdr.add_row(row![b -> "Entry", self.entry_number]);
        hdr.add_row(row![b -> "Sequence", self.header.sequence_number]);
        hdr.add_row(row![b -> "$LogFile Sequence Number", self.header.lsn]);
        hdr.add_row(row![b -> "Flags", record_flags_to_string(self.header.flags)]);
        hdr.add_row(row![b -> "Links", self.header.hard_link_count]);
        if let Some(base) = self.base_record() {
            hdr.add_row(row![b -> "Base Record", base]);
        }
        out.push_str(&hdr.to_string());

        let mut attrs = Table::new();
        attrs.add_row(row!["Attributes", "Name", "Status", "Size"]);
        for a in &self.attributes {
            let header = a.header();
            attrs.add_row(row![
                format!("{}‑#{}", header.attr_type, header.id),
                header.name.clone().unwrap_or_else(|| "N/A".to_string()),
                if a.is_resident() { "Resident" } else { "Non‑resident" },
                a.data_size()
            ]);
        }
        out.push('\n');
        out.push_str(&attrs.to_string());

        if let Some(std) = self.standard_information() {
            let mut t = Table::new();
            t.add_row(row!["$STANDARD_INFORMATION"]);
            t.add_row(row![b -> "Created", std.created.to_rfc3339()]);
            t.add_row(row![b -> "File Modified", std.modified.to_rfc3339()]);
            t.add_row(row![b -> "MFT Modified", std.mft_modified.to_rfc3339()]);
            t.add_row(row![b -> "Accessed", std.accessed.to_rfc3339()]);
            t.add_row(row![b -> "Flags", si_flags_to_string(std.file_attrs)]);
            t.add_row(row![b -> "Owner ID", std.owner_id.map_or("‑".into(), |v| v.to_string())]);
            t.add_row(
                row![b -> "Security ID", std.security_id.map_or("‑".into(), |v| v.to_string())],
            );
            if let Some(u) = std.usn {
                t.add_row(row![b -> "Last USN", u]);
            }
            out.push('\n');
            out.push_str(&t.to_string());
        }

        let names = self.file_names();
        if !names.is_empty() {
            let mut t = Table::new();
            t.add_row(row!["$FILE_NAME Attributes"]);
            for fname in names {
                t.add_row(row![b -> "Name", fname.name.clone()]);
                t.add_row(row![b -> "Namespace", format!("{:?}", fname.name_type)]);
                t.add_row(row![b -> "Parent MFT", fname.parent]);
                t.add_row(row![b -> "Allocated", fname.allocated_size]);
                t.add_row(row![b -> "Actual", fname.real_size]);
                t.add_row(row!["‑ Created", fname.created.to_rfc3339()]);
                t.add_row(row!["‑ Modified", fname.modified.to_rfc3339()]);
                t.add_row(row!["‑ MFT Mod", fname.mft_modified.to_rfc3339()]);
                t.add_row(row!["‑ Accessed", fname.accessed.to_rfc3339()]);
                t.add_row(row!["", ""]);
            }
            out.push('\n');
            out.push_str(&t.to_string());
        }

        let ads = self.alternate_data_streams();
        if !ads.is_empty() {
            let mut t = Table::new();
            t.add_row(row!["Alternate Data Streams"]);
            t.add_row(row![b -> "Name", "Size", "Resident"]);
            for s in ads {
                let resident = if s.resident_payload.is_some() { "Yes" } else { "No" };
                t.add_row(row![s.name, s.size, resident]);
            }
            out.push('\n');
            out.push_str(&t.to_string());
        }

        out
    }

    pub fn to_json(&self) -> Value {
        json!({
            "entry": self.entry_number,
            "header": &self.header,
            "attributes": &self.attributes,
            "file_names": self.file_names(),
            "ads": self.alternate_data_streams(),
        })
    }
}

fn invalid<E>(msg: E) -> io::Error
where
    E: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    io::Error::new(ErrorKind::InvalidData, msg)
}

fn utf16_string(raw: &[u8]) -> String {
    let units: Vec<u16> = raw
        .chunks_exact(2)
        .map(|b| u16::from_le_bytes([b[0], b[1]]))
        .collect();
    String::from_utf16_lossy(&units)
}

fn parse_attribute(raw: &[u8]) -> io::Result<Attribute> {
    let mut cursor = Cursor::new(raw);

    let attr_type = AttributeType::from_code(cursor.read_u32::<LittleEndian>()?);
    let length = cursor.read_u32::<LittleEndian>()?;
    let non_resident = cursor.read_u8()? != 0;
    let name_length = cursor.read_u8()?;
    let name_offset = cursor.read_u16::<LittleEndian>()?;
    let flags = cursor.read_u16::<LittleEndian>()?;
    let id = cursor.read_u16::<LittleEndian>()?;

    let name = if name_length > 0 {
        let start = name_offset as usize;
        let end = start + name_length as usize * 2;
        let name_raw = raw
            .get(start..end)
            .ok_or_else(|| invalid("attribute name outside attribute"))?;
        Some(utf16_string(name_raw))
    } else {
        None
    };

    let header = AttributeHeaderCommon {
        attr_type,
        length,
        non_resident,
        name_length,
        name_offset,
        flags,
        id,
        name,
    };

    if !non_resident {
        let value_length = cursor.read_u32::<LittleEndian>()?;
        let value_offset = cursor.read_u16::<LittleEndian>()?;
        let resident_flags = cursor.read_u8()?;
        let start = value_offset as usize;
        let value = raw
            .get(start..start + value_length as usize)
            .ok_or_else(|| invalid("resident value outside attribute"))?
            .to_vec();
        Ok(Attribute::Resident {
            header,
            resident: ResidentHeader {
                value_length,
                value_offset,
                resident_flags,
            },
            value,
        })
    } else {
        let lowest_vcn = cursor.read_u64::<LittleEndian>()?;
        let highest_vcn = cursor.read_u64::<LittleEndian>()?;
        let mapping_pairs_offset = cursor.read_u16::<LittleEndian>()?;
        let compression_unit = cursor.read_u16::<LittleEndian>()?;
        cursor.read_u32::<LittleEndian>()?; // padding
        let allocated_size = cursor.read_u64::<LittleEndian>()?;
        let real_size = cursor.read_u64::<LittleEndian>()?;
        let initialized_size = cursor.read_u64::<LittleEndian>()?;
        let run_list = raw
            .get(mapping_pairs_offset as usize..)
            .ok_or_else(|| invalid("mapping pairs outside attribute"))?
            .to_vec();
        Ok(Attribute::NonResident {
            header,
            non_resident: NonResidentHeader {
                lowest_vcn,
                highest_vcn,
                mapping_pairs_offset,
                compression_unit,
                allocated_size,
                real_size,
                initialized_size,
            },
            run_list,
        })
    }
}

const FILETIME_UNIX_DELTA_SECS: i64 = 11_644_473_600;

/// Convert a 100ns FILETIME to UTC, keeping full precision.
pub fn filetime_to_datetime(ft: u64) -> DateTime<Utc> {
    let secs = (ft / 10_000_000) as i64 - FILETIME_UNIX_DELTA_SECS;
    let nanos = (ft % 10_000_000) as u32 * 100;
    Utc.timestamp_opt(secs, nanos).single().unwrap_or_default()
}

/// Parsed $STANDARD_INFORMATION (covers v0 & v1, optionally v2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StandardInformation {
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
    pub mft_modified: DateTime<Utc>,
    pub accessed: DateTime<Utc>,
    pub file_attrs: u32,
    pub max_versions: u32,
    pub version_number: u32,
    pub class_id: u32,
    pub owner_id: Option<u32>,
    pub security_id: Option<u32>,
    pub quota_charged: Option<u64>,
    pub usn: Option<u64>,
}

impl StandardInformation {
    pub fn from_bytes(raw: &[u8]) -> Option<Self> {
        if raw.len() < 0x30 {
            return None;
        }
        let mut cur = Cursor::new(raw);
        let mut timestamp = || cur.read_u64::<LittleEndian>().ok().map(filetime_to_datetime);
        let created = timestamp()?;
        let modified = timestamp()?;
        let mft_modified = timestamp()?;
        let accessed = timestamp()?;
        let file_attrs = cur.read_u32::<LittleEndian>().ok()?;
        let max_versions = cur.read_u32::<LittleEndian>().ok()?;
        let version_number = cur.read_u32::<LittleEndian>().ok()?;
        let class_id = cur.read_u32::<LittleEndian>().ok()?;
        let (owner_id, security_id, quota_charged, usn) = if raw.len() >= 0x48 {
            (
                Some(cur.read_u32::<LittleEndian>().ok()?),
                Some(cur.read_u32::<LittleEndian>().ok()?),
                Some(cur.read_u64::<LittleEndian>().ok()?),
                Some(cur.read_u64::<LittleEndian>().ok()?),
            )
        } else {
            (None, None, None, None)
        };
        Some(Self {
            created,
            modified,
            mft_modified,
            accessed,
            file_attrs,
            max_versions,
            version_number,
            class_id,
            owner_id,
            security_id,
            quota_charged,
            usn,
        })
    }
}

/// $FILE_NAME namespace. Declaration order is the emission order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
pub enum NameType {
    Posix = 0,
    Win32 = 1,
    Dos = 2,
    Win32AndDos = 3,
}

impl NameType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(NameType::Posix),
            1 => Some(NameType::Win32),
            2 => Some(NameType::Dos),
            3 => Some(NameType::Win32AndDos),
            _ => None,
        }
    }
}

/// Parsed $FILE_NAME attribute.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileNameAttr {
    pub parent: FileRecordRef,
    pub allocated_size: u64,
    pub real_size: u64,
    pub name: String,
    pub name_type: NameType,
    pub flags: u32,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
    pub mft_modified: DateTime<Utc>,
    pub accessed: DateTime<Utc>,
    pub attribute_id: u16,
}

impl FileNameAttr {
    pub fn parse(raw: &[u8], attribute_id: u16) -> Option<Self> {
        if raw.len() < 66 {
            return None;
        }
        let mut cur = Cursor::new(raw);
        let parent = FileRecordRef::from_raw(cur.read_u64::<LittleEndian>().ok()?);
        let mut timestamp = || cur.read_u64::<LittleEndian>().ok().map(filetime_to_datetime);
        let created = timestamp()?;
        let modified = timestamp()?;
        let mft_modified = timestamp()?;
        let accessed = timestamp()?;
        let allocated_size = cur.read_u64::<LittleEndian>().ok()?;
        let real_size = cur.read_u64::<LittleEndian>().ok()?;
        let flags = cur.read_u32::<LittleEndian>().ok()?;
        cur.read_u32::<LittleEndian>().ok()?; // reparse value
        let name_len = cur.read_u8().ok()? as usize;
        let name_type = NameType::from_u8(cur.read_u8().ok()?)?;
        let name_raw = raw.get(66..66 + name_len * 2)?;
        Some(Self {
            parent,
            allocated_size,
            real_size,
            name: utf16_string(name_raw),
            name_type,
            flags,
            created,
            modified,
            mft_modified,
            accessed,
            attribute_id,
        })
    }
}

/// Decode MFT record flags.
fn record_flags_to_string(flags: u16) -> String {
    let mut v = Vec::new();
    if flags & 0x0001 != 0 {
        v.push("Allocated")
    }
    if flags & 0x0002 != 0 {
        v.push("Directory")
    }
    if flags & 0x0004 != 0 {
        v.push("Extend")
    }
    if flags & 0x0008 != 0 {
        v.push("View Index")
    }
    if v.is_empty() {
        "None".into()
    } else {
        v.join(" | ")
    }
}

/// Decode FILE attribute flags inside $STANDARD_INFORMATION.
pub fn si_flags_to_string(flags: u32) -> String {
    const NAMES: [(u32, &str); 14] = [
        (0x0001, "READONLY"),
        (0x0002, "HIDDEN"),
        (0x0004, "SYSTEM"),
        (0x0020, "ARCHIVE"),
        (0x0040, "DEVICE"),
        (0x0080, "NORMAL"),
        (0x0100, "TEMPORARY"),
        (0x0200, "SPARSE_FILE"),
        (0x0400, "REPARSE_POINT"),
        (0x0800, "COMPRESSED"),
        (0x1000, "OFFLINE"),
        (0x2000, "NOT_CONTENT_INDEXED"),
        (0x4000, "ENCRYPTED"),
        (0x10000000, "DIRECTORY"),
    ];
    let v: Vec<&str> = NAMES
        .iter()
        .filter(|(bit, _)| flags & bit != 0)
        .map(|(_, name)| *name)
        .collect();
    if v.is_empty() {
        "None".to_string()
    } else {
        v.join(" | ")
    }
}

/// Turns a parent reference into the directory path above a file.
pub trait PathResolver {
    fn parent_path(&self, parent: FileRecordRef) -> Result<String>;
}

/// All records of one `$MFT` stream, with extension records folded into
/// their base records.
#[derive(Debug, Clone, Default)]
pub struct MasterFileTable {
    pub record_size: u32,
    pub stream_size: u64,
    pub free_records: usize,
    pub bad_records: usize,
    records: BTreeMap<u32, MFTRecord>,
}

impl MasterFileTable {
    /// Decode a `$MFT` stream, taking the record size from record 0.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let header = FileRecordHeader::from_bytes(data).map_err(|e| MftError::CorruptMftHeader {
            offset: 0,
            details: e.to_string(),
        })?;
        if !header.is_file() {
            return Err(MftError::CorruptMftHeader {
                offset: 0,
                details: format!(
                    "record 0 signature is {:?}, not FILE",
                    String::from_utf8_lossy(&header.signature)
                ),
            });
        }
        let record_size = validate_record_size(header.bytes_allocated, 0, data.len() as u64)?;
        Self::with_record_size(data, record_size)
    }

    pub fn with_record_size(data: &[u8], record_size: u32) -> Result<Self> {
        let record_size = validate_record_size(record_size, 0, data.len() as u64)?;
        let mut table = Self {
            record_size,
            stream_size: data.len() as u64,
            ..Default::default()
        };

        for (index, raw) in data.chunks_exact(record_size as usize).enumerate() {
            let entry = index as u32;
            if raw[..4] == [0u8; 4] {
                table.free_records += 1;
                continue;
            }
            match MFTRecord::from_bytes(raw, entry) {
                Ok(record) => {
                    trace!("Decoded entry {} ({} attributes)", entry, record.attributes.len());
                    table.records.insert(entry, record);
                }
                Err(e) => {
                    debug!("Skipping entry {} at offset 0x{:X}: {}", entry, index as u64 * record_size as u64, e);
                    table.bad_records += 1;
                }
            }
        }

        table.fold_extensions();
        info!(
            "FILE records found: {} (Free records: {}, Bad records: {}) File size: {}",
            table.records.len(),
            table.free_records,
            table.bad_records,
            table.stream_size
        );
        Ok(table)
    }

    fn fold_extensions(&mut self) {
        let links: Vec<(u32, FileRecordRef)> = self
            .records
            .values()
            .filter(|r| r.in_use())
            .filter_map(|r| r.base_record().map(|base| (r.entry_number, base)))
            .collect();

        for (entry, base) in links {
            let Some(attributes) = self.records.get(&entry).map(|r| r.attributes.clone()) else {
                continue;
            };
            match self.records.get_mut(&base.entry_number) {
                Some(target)
                    if target.sequence_number() == base.sequence_number
                        && target.in_use()
                        && target.base_record().is_none() =>
                {
                    trace!("Folding {} attributes of entry {} into {}", attributes.len(), entry, base);
                    target.attributes.extend(attributes);
                }
                _ => debug!("Extension entry {} points at missing base record {}", entry, base),
            }
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, entry: u32) -> Option<&MFTRecord> {
        self.records.get(&entry)
    }

    /// Records in entry-number order.
    pub fn records(&self) -> impl Iterator<Item = &MFTRecord> {
        self.records.values()
    }

    // A deleted directory has had its sequence bumped once since children
    // recorded their parent reference.
    fn lookup(&self, reference: FileRecordRef) -> Option<&MFTRecord> {
        self.records.get(&reference.entry_number).filter(|r| {
            r.sequence_number() == reference.sequence_number
                || (!r.in_use() && r.sequence_number() == reference.sequence_number.wrapping_add(1))
        })
    }
}

impl PathResolver for MasterFileTable {
    fn parent_path(&self, parent: FileRecordRef) -> Result<String> {
        let mut parts: Vec<String> = Vec::new();
        let mut visited = HashSet::new();
        let mut current = parent;

        let root = loop {
            if current.entry_number == ROOT_ENTRY {
                break ".".to_string();
            }
            if !visited.insert(current.entry_number) || visited.len() > MAX_PATH_DEPTH {
                return Err(MftError::ParentCycle {
                    entry: parent.entry_number,
                    sequence: parent.sequence_number,
                });
            }
            match self.lookup(current).and_then(MFTRecord::primary_name) {
                Some(name) => {
                    parts.push(name.name);
                    current = name.parent;
                }
                None => {
                    break format!(
                        "PathUnknown\\Directory with ID 0x{:08X}-{:08X}",
                        current.entry_number, current.sequence_number
                    );
                }
            }
        };

        parts.push(root);
        parts.reverse();
        Ok(parts.join("\\"))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) const SECOND: u64 = 10_000_000;
    // 2020-01-01T00:00:00Z
    pub(crate) const FT_2020: u64 = 132_223_104_000_000_000;

    /// Builder for synthetic FILE records used across the crate's tests.
    pub(crate) struct RecordBuilder {
        sequence: u16,
        flags: u16,
        base: u64,
        attrs: Vec<u8>,
        next_id: u16,
    }

    impl RecordBuilder {
        pub(crate) fn new(sequence: u16) -> Self {
            Self {
                sequence,
                flags: 0x0001,
                base: 0,
                attrs: Vec::new(),
                next_id: 0,
            }
        }

        pub(crate) fn directory(mut self) -> Self {
            self.flags |= 0x0002;
            self
        }

        pub(crate) fn deleted(mut self) -> Self {
            self.flags &= !0x0001;
            self
        }

        pub(crate) fn base(mut self, entry: u32, sequence: u16) -> Self {
            self.base = entry as u64 | ((sequence as u64) << 48);
            self
        }

        pub(crate) fn resident(mut self, code: u32, name: Option<&str>, value: &[u8]) -> Self {
            let name16: Vec<u8> = name
                .unwrap_or("")
                .encode_utf16()
                .flat_map(|u| u.to_le_bytes())
                .collect();
            let value_offset = (0x18 + name16.len() + 7) & !7;
            let length = (value_offset + value.len() + 7) & !7;
            let mut a = vec![0u8; length];
            a[0..4].copy_from_slice(&code.to_le_bytes());
            a[4..8].copy_from_slice(&(length as u32).to_le_bytes());
            a[8] = 0;
            a[9] = (name16.len() / 2) as u8;
            a[10..12].copy_from_slice(&0x18u16.to_le_bytes());
            a[14..16].copy_from_slice(&self.next_id.to_le_bytes());
            a[16..20].copy_from_slice(&(value.len() as u32).to_le_bytes());
            a[20..22].copy_from_slice(&(value_offset as u16).to_le_bytes());
            a[0x18..0x18 + name16.len()].copy_from_slice(&name16);
            a[value_offset..value_offset + value.len()].copy_from_slice(value);
            self.next_id += 1;
            self.attrs.extend(a);
            self
        }

        pub(crate) fn non_resident(
            self,
            code: u32,
            name: Option<&str>,
            run_list: &[u8],
            real_size: u64,
        ) -> Self {
            self.non_resident_segment(code, name, run_list, 0, real_size)
        }

        /// One extent of a split attribute. Continuation segments pass a
        /// non-zero `lowest_vcn` and zero sizes.
        pub(crate) fn non_resident_segment(
            mut self,
            code: u32,
            name: Option<&str>,
            run_list: &[u8],
            lowest_vcn: u64,
            real_size: u64,
        ) -> Self {
            let name16: Vec<u8> = name
                .unwrap_or("")
                .encode_utf16()
                .flat_map(|u| u.to_le_bytes())
                .collect();
            let runs_offset = (0x40 + name16.len() + 7) & !7;
            let length = (runs_offset + run_list.len() + 1 + 7) & !7;
            let mut a = vec![0u8; length];
            a[0..4].copy_from_slice(&code.to_le_bytes());
            a[4..8].copy_from_slice(&(length as u32).to_le_bytes());
            a[8] = 1;
            a[9] = (name16.len() / 2) as u8;
            a[10..12].copy_from_slice(&0x40u16.to_le_bytes());
            a[14..16].copy_from_slice(&self.next_id.to_le_bytes());
            a[0x10..0x18].copy_from_slice(&lowest_vcn.to_le_bytes());
            a[0x20..0x22].copy_from_slice(&(runs_offset as u16).to_le_bytes());
            a[0x28..0x30].copy_from_slice(&real_size.to_le_bytes());
            a[0x30..0x38].copy_from_slice(&real_size.to_le_bytes());
            a[0x38..0x40].copy_from_slice(&real_size.to_le_bytes());
            a[0x40..0x40 + name16.len()].copy_from_slice(&name16);
            a[runs_offset..runs_offset + run_list.len()].copy_from_slice(run_list);
            self.next_id += 1;
            self.attrs.extend(a);
            self
        }

        pub(crate) fn standard_info(self, times: [u64; 4]) -> Self {
            let mut v = vec![0u8; 0x48];
            for (i, t) in times.iter().enumerate() {
                v[i * 8..i * 8 + 8].copy_from_slice(&t.to_le_bytes());
            }
            v[0x20..0x24].copy_from_slice(&0x20u32.to_le_bytes()); // ARCHIVE
            v[0x34..0x38].copy_from_slice(&0x101u32.to_le_bytes()); // security id
            v[0x40..0x48].copy_from_slice(&0x4242u64.to_le_bytes()); // usn
            self.resident(0x10, None, &v)
        }

        pub(crate) fn file_name(
            self,
            parent: (u32, u16),
            name: &str,
            name_type: NameType,
            times: [u64; 4],
        ) -> Self {
            let name16: Vec<u8> = name.encode_utf16().flat_map(|u| u.to_le_bytes()).collect();
            let mut v = vec![0u8; 66 + name16.len()];
            let parent_raw = parent.0 as u64 | ((parent.1 as u64) << 48);
            v[0..8].copy_from_slice(&parent_raw.to_le_bytes());
            for (i, t) in times.iter().enumerate() {
                v[8 + i * 8..16 + i * 8].copy_from_slice(&t.to_le_bytes());
            }
            v[64] = (name16.len() / 2) as u8;
            v[65] = name_type as u8;
            v[66..].copy_from_slice(&name16);
            self.resident(0x30, None, &v)
        }

        /// Serialise into a record of `size` bytes with valid fixups.
        pub(crate) fn build(&self, size: usize) -> Vec<u8> {
            let mut r = vec![0u8; size];
            let usa_count = size / FIXUP_STRIDE + 1;
            let attrs_offset = (0x30 + usa_count * 2 + 7) & !7;
            r[0..4].copy_from_slice(b"FILE");
            r[4..6].copy_from_slice(&0x30u16.to_le_bytes());
            r[6..8].copy_from_slice(&(usa_count as u16).to_le_bytes());
            r[8..16].copy_from_slice(&0x1234u64.to_le_bytes());
            r[0x10..0x12].copy_from_slice(&self.sequence.to_le_bytes());
            r[0x12..0x14].copy_from_slice(&1u16.to_le_bytes());
            r[0x14..0x16].copy_from_slice(&(attrs_offset as u16).to_le_bytes());
            r[0x16..0x18].copy_from_slice(&self.flags.to_le_bytes());
            let used = attrs_offset + self.attrs.len() + 8;
            assert!(used <= size, "attributes do not fit in the record");
            r[0x18..0x1C].copy_from_slice(&(used as u32).to_le_bytes());
            r[0x1C..0x20].copy_from_slice(&(size as u32).to_le_bytes());
            r[0x20..0x28].copy_from_slice(&self.base.to_le_bytes());
            r[0x28..0x2A].copy_from_slice(&self.next_id.to_le_bytes());
            r[attrs_offset..attrs_offset + self.attrs.len()].copy_from_slice(&self.attrs);
            let end = attrs_offset + self.attrs.len();
            r[end..end + 4].copy_from_slice(&0xFFFF_FFFFu32.to_le_bytes());

            // Move the last word of every stride into the USA and stamp the USN.
            let usn = [0x07, 0x00];
            r[0x30..0x32].copy_from_slice(&usn);
            for i in 1..usa_count {
                let sector_end = i * FIXUP_STRIDE - 2;
                let fix = 0x30 + 2 * i;
                r[fix] = r[sector_end];
                r[fix + 1] = r[sector_end + 1];
                r[sector_end..sector_end + 2].copy_from_slice(&usn);
            }
            r
        }
    }

    pub(crate) fn times(base: u64) -> [u64; 4] {
        [base, base, base, base]
    }

    fn table(records: &[(u32, Vec<u8>)]) -> MasterFileTable {
        let count = records.iter().map(|(e, _)| *e).max().unwrap_or(0) as usize + 1;
        let mut data = vec![0u8; count * 1024];
        for (entry, raw) in records {
            let at = *entry as usize * 1024;
            data[at..at + 1024].copy_from_slice(raw);
        }
        MasterFileTable::from_bytes(&data).unwrap()
    }

    fn named(sequence: u16, parent: (u32, u16), name: &str) -> Vec<u8> {
        RecordBuilder::new(sequence)
            .directory()
            .file_name(parent, name, NameType::Win32, times(FT_2020))
            .build(1024)
    }

    #[test]
    fn record_round_trip_through_fixups() {
        let raw = RecordBuilder::new(3)
            .standard_info(times(FT_2020))
            .file_name((5, 5), "report.docx", NameType::Win32, times(FT_2020))
            .resident(0x80, None, b"hello")
            .build(1024);
        let rec = MFTRecord::from_bytes(&raw, 40).unwrap();
        assert_eq!(rec.reference(), FileRecordRef::new(40, 3));
        assert!(rec.in_use());
        assert!(!rec.is_dir());
        assert_eq!(rec.file_names()[0].name, "report.docx");
        assert_eq!(rec.file_size(), 5);
        let si = rec.standard_information().unwrap();
        assert_eq!(si.created.to_rfc3339(), "2020-01-01T00:00:00+00:00");
        assert_eq!(si.security_id, Some(0x101));
        assert_eq!(si.usn, Some(0x4242));
    }

    #[test]
    fn bad_fixup_is_rejected() {
        let mut raw = RecordBuilder::new(1).build(1024);
        raw[510] ^= 0xFF;
        assert!(matches!(
            MFTRecord::from_bytes(&raw, 9),
            Err(MftError::CorruptRecord { entry: 9, .. })
        ));
    }

    #[test]
    fn unknown_attribute_types_are_kept_and_flagged() {
        let raw = RecordBuilder::new(1)
            .resident(0x50, None, &[0u8; 8])
            .resident(0x1000, None, &[1, 2, 3])
            .resident(0x40, None, &[0u8; 16])
            .build(1024);
        let rec = MFTRecord::from_bytes(&raw, 20).unwrap();
        let unknown: Vec<_> = rec.unrecognized_attributes().collect();
        assert_eq!(
            unknown,
            vec![AttributeType::SecurityDescriptor, AttributeType::Unknown(0x1000)]
        );
        assert!(AttributeType::ObjectId.is_recognized());
    }

    #[test]
    fn object_id_is_formatted_as_guid() {
        let raw: Vec<u8> = (0u8..16).collect();
        assert_eq!(
            format_object_id(&raw).unwrap(),
            "03020100-0504-0706-0809-0a0b0c0d0e0f"
        );
        assert!(format_object_id(&raw[..8]).is_none());
    }

    #[test]
    fn mount_point_substitute_name() {
        let sub: Vec<u8> = r"\??\C:\target".encode_utf16().flat_map(|u| u.to_le_bytes()).collect();
        let print: Vec<u8> = r"C:\target".encode_utf16().flat_map(|u| u.to_le_bytes()).collect();
        let mut v = Vec::new();
        v.extend(IO_REPARSE_TAG_MOUNT_POINT.to_le_bytes());
        v.extend(((8 + sub.len() + print.len() + 4) as u16).to_le_bytes());
        v.extend(0u16.to_le_bytes());
        v.extend(0u16.to_le_bytes());
        v.extend((sub.len() as u16).to_le_bytes());
        v.extend(((sub.len() + 2) as u16).to_le_bytes());
        v.extend((print.len() as u16).to_le_bytes());
        v.extend(&sub);
        v.extend([0, 0]);
        v.extend(&print);
        v.extend([0, 0]);
        let rp = ReparsePoint::from_bytes(&v).unwrap();
        assert_eq!(rp.substitute_name.as_deref(), Some(r"\??\C:\target"));
        assert_eq!(rp.print_name.as_deref(), Some(r"C:\target"));
    }

    #[test]
    fn filetime_keeps_sub_second_precision() {
        let dt = filetime_to_datetime(FT_2020 + 1);
        assert_eq!(dt.timestamp_subsec_nanos(), 100);
        assert_eq!(filetime_to_datetime(FT_2020 + SECOND).timestamp(), 1_577_836_801);
    }

    #[test]
    fn free_and_bad_slots_are_counted() {
        let mut baad = RecordBuilder::new(1).build(1024);
        baad[0..4].copy_from_slice(b"BAAD");
        let t = table(&[
            (0, RecordBuilder::new(1).build(1024)),
            (2, baad),
            (5, named(5, (5, 5), ".")),
        ]);
        assert_eq!(t.len(), 2);
        assert_eq!(t.free_records, 3);
        assert_eq!(t.bad_records, 1);
        assert_eq!(t.record_size, 1024);
    }

    #[test]
    fn zero_record_size_is_corrupt_header() {
        let mut raw = RecordBuilder::new(1).build(1024);
        raw[0x1C..0x20].copy_from_slice(&0u32.to_le_bytes());
        assert!(matches!(
            MasterFileTable::from_bytes(&raw),
            Err(MftError::CorruptMftHeader { offset: 0, .. })
        ));
    }

    #[test]
    fn extension_attributes_fold_into_base() {
        let extension = RecordBuilder::new(1)
            .base(12, 3)
            .resident(0x80, Some("extra"), b"xyz")
            .build(1024);
        let t = table(&[
            (0, RecordBuilder::new(1).build(1024)),
            (12, named(3, (5, 5), "big")),
            (30, extension),
        ]);
        let base = t.get(12).unwrap();
        assert_eq!(base.alternate_data_streams().len(), 1);
        assert_eq!(t.get(30).unwrap().base_record(), Some(FileRecordRef::new(12, 3)));
    }

    #[test]
    fn extension_with_stale_sequence_is_not_folded() {
        let extension = RecordBuilder::new(1)
            .base(12, 3)
            .resident(0x80, Some("extra"), b"xyz")
            .build(1024);
        let t = table(&[
            (0, RecordBuilder::new(1).build(1024)),
            (12, named(4, (5, 5), "big")),
            (30, extension),
        ]);
        assert!(t.get(12).unwrap().alternate_data_streams().is_empty());
    }

    #[test]
    fn split_streams_merge_across_extension_records() {
        let base = RecordBuilder::new(3)
            .standard_info(times(FT_2020))
            .file_name((5, 5), "big.bin", NameType::Win32, times(FT_2020))
            .build(1024);
        // Entry 30 holds the tail of the unnamed stream, so folding sees it first.
        let first = RecordBuilder::new(1)
            .base(12, 3)
            .non_resident_segment(0x80, None, &[0x11, 0x03, 0x40], 2, 0)
            .non_resident(0x80, Some("s"), &[0x11, 0x05, 0x20], 20480)
            .build(1024);
        let second = RecordBuilder::new(1)
            .base(12, 3)
            .non_resident(0x80, None, &[0x11, 0x02, 0x60], 9000)
            .non_resident_segment(0x80, Some("s"), &[0x11, 0x04, 0x70], 5, 0)
            .build(1024);
        let t = table(&[
            (0, RecordBuilder::new(1).build(1024)),
            (12, base),
            (30, first),
            (31, second),
        ]);

        let rec = t.get(12).unwrap();
        assert_eq!(rec.file_size(), 9000);
        assert_eq!(rec.data_attribute().unwrap().lowest_vcn(), 0);
        let ads = rec.alternate_data_streams();
        assert_eq!(ads.len(), 1);
        assert_eq!(ads[0].name, "s");
        assert_eq!(ads[0].size, 20480);
    }

    #[test]
    fn parent_path_walks_to_root() {
        let t = table(&[
            (0, RecordBuilder::new(1).build(1024)),
            (5, named(5, (5, 5), ".")),
            (30, named(2, (5, 5), "Windows")),
            (31, named(7, (30, 2), "System32")),
        ]);
        assert_eq!(t.parent_path(FileRecordRef::new(31, 7)).unwrap(), r".\Windows\System32");
        assert_eq!(t.parent_path(FileRecordRef::new(5, 5)).unwrap(), ".");
    }

    #[test]
    fn parent_path_with_missing_parent() {
        let t = table(&[
            (0, RecordBuilder::new(1).build(1024)),
            (31, named(7, (30, 2), "orphans")),
        ]);
        assert_eq!(
            t.parent_path(FileRecordRef::new(31, 7)).unwrap(),
            r"PathUnknown\Directory with ID 0x0000001E-00000002\orphans"
        );
        // sequence mismatch behaves like a missing parent
        assert!(t
            .parent_path(FileRecordRef::new(31, 6))
            .unwrap()
            .starts_with("PathUnknown"));
    }

    #[test]
    fn deleted_parent_one_sequence_ahead_still_resolves() {
        let gone = RecordBuilder::new(3)
            .directory()
            .deleted()
            .file_name((5, 5), "Old", NameType::Win32, times(FT_2020))
            .build(1024);
        let t = table(&[
            (0, RecordBuilder::new(1).build(1024)),
            (5, named(5, (5, 5), ".")),
            (30, gone),
        ]);
        assert_eq!(t.parent_path(FileRecordRef::new(30, 2)).unwrap(), r".\Old");
        // two reuses ago is no longer the same directory
        assert_eq!(
            t.parent_path(FileRecordRef::new(30, 1)).unwrap(),
            r"PathUnknown\Directory with ID 0x0000001E-00000001"
        );
    }

    #[test]
    fn live_parent_one_sequence_ahead_is_unknown() {
        let t = table(&[
            (0, RecordBuilder::new(1).build(1024)),
            (5, named(5, (5, 5), ".")),
            (30, named(3, (5, 5), "Reused")),
        ]);
        assert_eq!(
            t.parent_path(FileRecordRef::new(30, 2)).unwrap(),
            r"PathUnknown\Directory with ID 0x0000001E-00000002"
        );
    }

    #[test]
    fn parent_cycle_is_detected() {
        let t = table(&[
            (0, RecordBuilder::new(1).build(1024)),
            (40, named(1, (41, 1), "a")),
            (41, named(1, (40, 1), "b")),
        ]);
        assert!(matches!(
            t.parent_path(FileRecordRef::new(40, 1)),
            Err(MftError::ParentCycle { entry: 40, sequence: 1 })
        ));
    }

    #[test]
    fn primary_name_skips_dos_names() {
        let raw = RecordBuilder::new(1)
            .file_name((5, 5), "LONGFI~1.TXT", NameType::Dos, times(FT_2020))
            .file_name((5, 5), "long file name.txt", NameType::Win32, times(FT_2020))
            .build(1024);
        let rec = MFTRecord::from_bytes(&raw, 50).unwrap();
        assert_eq!(rec.primary_name().unwrap().name, "long file name.txt");
        assert_eq!(rec.reference_count(), 1);
    }
}
