// Sources:
// - https://en.wikipedia.org/wiki/NTFS

//! NTFS partition boot sector and the volume geometry derived from it.

use crate::error::{MftError, Result};
use byteorder::{LittleEndian, ReadBytesExt};
use prettytable::{Table, row};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::io::{Cursor, Read};

pub const BOOT_SECTOR_SIZE: usize = 512;
/// Largest cluster NTFS formats (2 MiB).
pub const MAX_CLUSTER_SIZE: u64 = 2 * 1024 * 1024;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PartitionBootSector {
    /* -- 0x00-0x0A ------------------------------------------ */
    pub jump_instruction: [u8; 3], // x86 JMP + NOP
    pub oem_id: [u8; 8],           // "NTFS    "

    /* -- BIOS Parameter Block (BPB) – 0x0B-0x23 ------------- */
    pub bytes_per_sector: u16,   // 0x0B
    pub sectors_per_cluster: u8, // 0x0D
    pub media_descriptor: u8,    // 0x15 (0xF8 = hard disk)
    pub hidden_sectors: u32,     // 0x1C

    /* -- Extended BPB – 0x28-0x53 ---------------------------- */
    pub total_sectors: u64,           // 0x28
    pub mft_cluster: u64,             // 0x30
    pub mft_mirror_cluster: u64,      // 0x38
    pub clusters_per_file_record: i8, // 0x40  (may be negative)
    pub clusters_per_index_buffer: i8, // 0x44
    pub volume_serial_number: u64,    // 0x48

    pub end_of_sector_marker: u16, // 0x1FE (0xAA55)
}

impl PartitionBootSector {
    pub const NTFS_OEM_ID: [u8; 8] = *b"NTFS    ";
    pub const END_OF_SECTOR_MARKER: u16 = 0xAA55;

    /// Parse the first 512 bytes of a volume into a `PartitionBootSector`.
    pub fn from_bytes(buf: &[u8]) -> Result<Self> {
        if buf.len() < BOOT_SECTOR_SIZE {
            return Err(MftError::MalformedBootSector(format!(
                "expected {} bytes, got {}",
                BOOT_SECTOR_SIZE,
                buf.len()
            )));
        }
        let mut c = Cursor::new(buf);

        macro_rules! read_array {
            ($len:expr) => {{
                let mut tmp = [0u8; $len];
                c.read_exact(&mut tmp)?;
                tmp
            }};
        }
        macro_rules! skip {
            ($len:expr) => {
                c.set_position(c.position() + $len)
            };
        }

        let jump_instruction = read_array!(3);
        let oem_id = read_array!(8);
        let bytes_per_sector = c.read_u16::<LittleEndian>()?;
        let sectors_per_cluster = c.read_u8()?;
        skip!(7); // reserved sectors, unused, unused
        let media_descriptor = c.read_u8()?;
        skip!(6); // unused, sectors per track, heads
        let hidden_sectors = c.read_u32::<LittleEndian>()?;
        skip!(8);
        let total_sectors = c.read_u64::<LittleEndian>()?;
        let mft_cluster = c.read_u64::<LittleEndian>()?;
        let mft_mirror_cluster = c.read_u64::<LittleEndian>()?;
        let clusters_per_file_record = c.read_i8()?;
        skip!(3);
        let clusters_per_index_buffer = c.read_i8()?;
        skip!(3);
        let volume_serial_number = c.read_u64::<LittleEndian>()?;
        c.set_position(0x1FE);
        let end_of_sector_marker = c.read_u16::<LittleEndian>()?;

        Ok(Self {
            jump_instruction,
            oem_id,
            bytes_per_sector,
            sectors_per_cluster,
            media_descriptor,
            hidden_sectors,
            total_sectors,
            mft_cluster,
            mft_mirror_cluster,
            clusters_per_file_record,
            clusters_per_index_buffer,
            volume_serial_number,
            end_of_sector_marker,
        })
    }

    /// Check if the oem_id is valid
    pub fn oem_id_is_valid(&self) -> bool {
        self.oem_id == Self::NTFS_OEM_ID
    }

    pub fn signature_is_valid(&self) -> bool {
        self.end_of_sector_marker == Self::END_OF_SECTOR_MARKER
    }

    /// Sectors per cluster, decoding the power-of-two form used by volumes
    /// with clusters larger than 64 KiB.
    pub fn sectors_per_cluster(&self) -> u32 {
        match self.sectors_per_cluster {
            v if v > 0x80 => 1u32.checked_shl(256 - v as u32).unwrap_or(0),
            v => v as u32,
        }
    }

    /// Compute actual bytes per file-record segment
    pub fn file_record_size(&self) -> u32 {
        if self.clusters_per_file_record > 0 {
            (self.clusters_per_file_record as u32)
                .saturating_mul(self.sectors_per_cluster())
                .saturating_mul(self.bytes_per_sector as u32)
        } else {
            1u32
                .checked_shl(-(self.clusters_per_file_record as i32) as u32)
                .unwrap_or(0)
        }
    }

    /// Validate the sector and derive the volume geometry.
    pub fn geometry(&self) -> Result<Geometry> {
        if !self.oem_id_is_valid() {
            return Err(MftError::MalformedBootSector(format!(
                "OEM identifier is {:?}, not NTFS",
                String::from_utf8_lossy(&self.oem_id)
            )));
        }
        if !self.signature_is_valid() {
            return Err(MftError::MalformedBootSector(format!(
                "end of sector marker is {:#06X}",
                self.end_of_sector_marker
            )));
        }
        if self.bytes_per_sector == 0 {
            return Err(MftError::MalformedBootSector(
                "bytes per sector is zero".into(),
            ));
        }
        if self.sectors_per_cluster() == 0 {
            return Err(MftError::MalformedBootSector(
                "sectors per cluster is zero".into(),
            ));
        }
        let cluster_size = self.bytes_per_sector as u64 * self.sectors_per_cluster() as u64;
        if cluster_size > MAX_CLUSTER_SIZE {
            return Err(MftError::MalformedBootSector(format!(
                "cluster size of {} bytes exceeds {}",
                cluster_size, MAX_CLUSTER_SIZE
            )));
        }
        Ok(Geometry {
            bytes_per_sector: self.bytes_per_sector as u32,
            sectors_per_cluster: self.sectors_per_cluster(),
            mft_start_cluster: self.mft_cluster,
            mft_record_size: self.file_record_size(),
            total_sectors: self.total_sectors,
        })
    }

    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|_| json!({}))
    }

    /// Convert the boot sector to a human‑readable table string.
    pub fn to_string(&self) -> String {
        let mut t = Table::new();
        t.add_row(row!["Partition Boot Sector"]);
        t.add_row(row![b -> "OEM ID", String::from_utf8_lossy(&self.oem_id)]);
        t.add_row(row![b -> "Bytes per Sector", self.bytes_per_sector]);
        t.add_row(row![b -> "Sectors per Cluster", self.sectors_per_cluster()]);
        t.add_row(row![b -> "Media Descriptor", format!("0x{:02X}", self.media_descriptor)]);
        t.add_row(row![b -> "Hidden Sectors", self.hidden_sectors]);
        t.add_row(row![b -> "Total Sectors", self.total_sectors]);
        t.add_row(row![b -> "$MFT Cluster", self.mft_cluster]);
        t.add_row(row![b -> "$MFTMirr Cluster", self.mft_mirror_cluster]);
        t.add_row(row![b -> "File Record Size", self.file_record_size()]);
        t.add_row(row![b -> "Serial Number", format!("{:016X}", self.volume_serial_number)]);
        t.add_row(row![b -> "Signature", format!("0x{:04X}", self.end_of_sector_marker)]);
        t.to_string()
    }
}

/// Volume layout needed to turn cluster numbers into byte offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct Geometry {
    pub bytes_per_sector: u32,
    pub sectors_per_cluster: u32,
    pub mft_start_cluster: u64,
    pub mft_record_size: u32,
    pub total_sectors: u64,
}

impl Geometry {
    pub fn cluster_size(&self) -> u64 {
        self.sectors_per_cluster as u64 * self.bytes_per_sector as u64
    }

    pub fn volume_size(&self) -> u64 {
        self.total_sectors.saturating_mul(self.bytes_per_sector as u64)
    }

    /// Absolute byte offset of `cluster` on the volume.
    pub fn byte_offset(&self, cluster: u64) -> Result<u64> {
        cluster
            .checked_mul(self.sectors_per_cluster as u64)
            .and_then(|v| v.checked_mul(self.bytes_per_sector as u64))
            .ok_or(MftError::OffsetOverflow { cluster })
    }

    pub fn mft_offset(&self) -> Result<u64> {
        self.byte_offset(self.mft_start_cluster)
    }
}
