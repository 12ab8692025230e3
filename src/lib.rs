// Sources:
// - https://dubeyko.com/development/FileSystems/NTFS/ntfsdoc.pdf
// - https://en.wikipedia.org/wiki/NTFS

//! Extract the NTFS Master File Table from a volume (or take an already
//! extracted `$MFT`) and turn its records into normalised forensic rows.

use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use log::{debug, info, warn};

pub mod error;
pub mod filter;
pub mod mft;
pub mod output;
pub mod pbs;
pub mod runs;
pub mod scan;
pub mod sink;

pub use error::{MftError, Result};
use mft::{Attribute, FileRecordHeader, MFTRecord, RECORD_HEADER_SIZE, validate_record_size};
use pbs::{BOOT_SECTOR_SIZE, Geometry, PartitionBootSector};
use runs::{decode_run_list, read_full, resolve_runs};

/// Object-safe `Read + Seek`, so any volume stream can sit behind a `dyn`.
pub trait ReadSeek: Read + Seek {}

impl<T: Read + Seek> ReadSeek for T {}

/// An NTFS volume opened for MFT extraction.
pub struct NtfsVolume<T: Read + Seek> {
    pub pbs: PartitionBootSector,
    pub geometry: Geometry,
    pub body: T,
}

impl<T: Read + Seek> NtfsVolume<T> {
    /// Read and validate the boot sector at the start of `body`.
    pub fn new(mut body: T) -> Result<Self> {
        body.seek(SeekFrom::Start(0))?;
        let mut sector = vec![0u8; BOOT_SECTOR_SIZE];
        let got = read_full(&mut body, &mut sector)?;
        if got != BOOT_SECTOR_SIZE {
            return Err(MftError::MalformedBootSector(format!(
                "volume is only {} bytes long",
                got
            )));
        }
        let pbs = PartitionBootSector::from_bytes(&sector)?;
        let geometry = pbs.geometry()?;
        debug!(
            "Geometry: {} bytes/sector, {} sectors/cluster, MFT at cluster {}",
            geometry.bytes_per_sector, geometry.sectors_per_cluster, geometry.mft_start_cluster
        );
        Ok(Self {
            pbs,
            geometry,
            body,
        })
    }

    // Read exactly `len` bytes at `offset`.
    fn read_at(&mut self, offset: u64, len: usize) -> Result<Vec<u8>> {
        self.body.seek(SeekFrom::Start(offset))?;
        let mut buf = vec![0u8; len];
        let got = read_full(&mut self.body, &mut buf)?;
        if got != len {
            return Err(MftError::ShortRead {
                offset,
                expected: len,
                actual: got,
            });
        }
        Ok(buf)
    }

    /// Record 0 of the MFT (the `$MFT` file itself), sized by its own header.
    pub fn mft_record_zero(&mut self) -> Result<MFTRecord> {
        let offset = self.geometry.mft_offset()?;
        let raw = self.read_at(offset, RECORD_HEADER_SIZE)?;
        let header = FileRecordHeader::from_bytes(&raw).map_err(|e| MftError::CorruptMftHeader {
            offset,
            details: e.to_string(),
        })?;
        if !header.is_file() {
            return Err(MftError::CorruptMftHeader {
                offset,
                details: format!(
                    "signature is {:?}, not FILE",
                    String::from_utf8_lossy(&header.signature)
                ),
            });
        }

        let limit = match self.geometry.volume_size() {
            0 => u64::MAX,
            size => size,
        };
        let record_size = validate_record_size(header.bytes_allocated, offset, limit)?;
        debug!("MFT record size declared as {} bytes", record_size);
        if record_size != self.geometry.mft_record_size {
            warn!(
                "Record 0 declares {} byte records but the boot sector says {}",
                record_size, self.geometry.mft_record_size
            );
        }

        let raw = self.read_at(offset, record_size as usize)?;
        MFTRecord::from_bytes(&raw, 0)
    }

    /// Reassemble the whole `$MFT` stream from the runs of record 0's
    /// unnamed `$DATA` attribute.
    pub fn extract_mft(&mut self) -> Result<Vec<u8>> {
        let record = self.mft_record_zero()?;
        let Some(Attribute::NonResident {
            non_resident,
            run_list,
            ..
        }) = record.data_attribute()
        else {
            return Err(MftError::MissingMftData);
        };

        let runs = decode_run_list(run_list)?;
        debug!("$MFT spans {} runs", runs.len());

        let mut data = Vec::new();
        resolve_runs(
            &mut self.body,
            &runs,
            &self.geometry,
            non_resident.allocated_size,
            &mut data,
        )?;
        data.truncate(non_resident.real_size as usize);
        info!("Extracted $MFT stream of {} bytes", data.len());
        Ok(data)
    }
}

/// Where the `$MFT` bytes come from.
pub enum MftSource<'a> {
    /// A `$MFT` previously copied off a volume.
    ExtractedFile(&'a Path),
    /// A raw volume, device or image positioned at the boot sector.
    RawVolume(&'a mut dyn ReadSeek),
}

impl MftSource<'_> {
    pub fn acquire(self) -> Result<Vec<u8>> {
        match self {
            MftSource::ExtractedFile(path) => {
                debug!("Reading extracted $MFT from {}", path.display());
                std::fs::read(path).map_err(|e| match e.kind() {
                    std::io::ErrorKind::NotFound => MftError::NotFound(path.to_path_buf()),
                    _ => MftError::Io(e),
                })
            }
            MftSource::RawVolume(stream) => NtfsVolume::new(stream)?.extract_mft(),
        }
    }
}

/// Turn a bare drive letter (`C:`) into its device path (`\\.\C:`).
/// Anything else is returned unchanged.
pub fn device_path(input: &str) -> String {
    match parse_drive_letter(input) {
        Some(letter) => format!(r"\\.\{}:", letter),
        None => input.to_string(),
    }
}

fn parse_drive_letter(input: &str) -> Option<char> {
    let mut chars = input.chars();
    match (chars.next(), chars.next(), chars.next()) {
        (Some(letter), Some(':'), None) if letter.is_ascii_alphabetic() => {
            Some(letter.to_ascii_uppercase())
        }
        _ => None,
    }
}
