// Sources:
// - https://dubeyko.com/development/FileSystems/NTFS/ntfsdoc.pdf

//! Non-resident attribute run lists and the reader that follows them.

use crate::error::{MftError, Result};
use crate::pbs::Geometry;
use log::{debug, trace};
use serde::{Deserialize, Serialize};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};

/// One extent of a non-resident attribute.
///
/// `cluster_delta` is relative to the absolute start of the previous run.
/// A sparse run has no on-disk clusters and leaves the running position alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct DataRun {
    pub cluster_delta: i64,
    pub cluster_count: u64,
    pub sparse: bool,
}

impl DataRun {
    pub fn new(cluster_delta: i64, cluster_count: u64) -> Self {
        Self {
            cluster_delta,
            cluster_count,
            sparse: false,
        }
    }

    pub fn sparse(cluster_count: u64) -> Self {
        Self {
            cluster_delta: 0,
            cluster_count,
            sparse: true,
        }
    }
}

/// Decode the mapping pairs of a non-resident attribute.
pub fn decode_run_list(raw: &[u8]) -> Result<Vec<DataRun>> {
    let mut out = Vec::new();
    let mut pos = 0usize;
    while pos < raw.len() && raw[pos] != 0 {
        let hdr = raw[pos];
        pos += 1;
        let len_sz = (hdr & 0x0F) as usize;
        let ofs_sz = (hdr >> 4) as usize;

        if len_sz == 0 || len_sz > 8 || ofs_sz > 8 {
            return Err(MftError::CorruptRunList(format!(
                "invalid run header {:#04X} at byte {}",
                hdr,
                pos - 1
            )));
        }
        if pos + len_sz + ofs_sz > raw.len() {
            return Err(MftError::CorruptRunList(format!(
                "run at byte {} extends past the end of the list",
                pos - 1
            )));
        }

        let mut run_len = 0u64;
        for i in 0..len_sz {
            run_len |= (raw[pos + i] as u64) << (8 * i);
        }
        pos += len_sz;

        if ofs_sz == 0 {
            out.push(DataRun::sparse(run_len));
            continue;
        }

        let mut ofs = 0i64;
        for i in 0..ofs_sz {
            ofs |= (raw[pos + i] as i64) << (8 * i);
        }
        // sign-extend negative offsets
        if ofs_sz < 8 && (raw[pos + ofs_sz - 1] & 0x80) != 0 {
            ofs |= !0 << (ofs_sz * 8);
        }
        pos += ofs_sz;

        out.push(DataRun::new(ofs, run_len));
    }
    Ok(out)
}

/// Absolute starting cluster of every run, `None` for sparse runs.
pub fn absolute_clusters(runs: &[DataRun]) -> Result<Vec<Option<u64>>> {
    let mut lcn: i64 = 0;
    let mut out = Vec::with_capacity(runs.len());
    for (i, run) in runs.iter().enumerate() {
        if run.sparse {
            out.push(None);
            continue;
        }
        lcn = lcn
            .checked_add(run.cluster_delta)
            .ok_or(MftError::InvalidCluster { run: i, cluster: lcn })?;
        if lcn < 0 {
            return Err(MftError::InvalidCluster { run: i, cluster: lcn });
        }
        out.push(Some(lcn as u64));
    }
    Ok(out)
}

/// Copy the clusters described by `runs` from `volume` into `out`, in run
/// order, one cluster at a time. Returns the number of bytes written.
///
/// `allocated_size` is the attribute's declared allocation. Runs covering
/// more than that are rejected as [`MftError::CorruptRunList`] before any
/// cluster is read. Any short read aborts with [`MftError::ShortRead`].
pub fn resolve_runs<R, W>(
    volume: &mut R,
    runs: &[DataRun],
    geometry: &Geometry,
    allocated_size: u64,
    out: &mut W,
) -> Result<u64>
where
    R: Read + Seek,
    W: Write,
{
    let covered = runs.iter().try_fold(0u64, |acc, run| {
        run.cluster_count
            .checked_mul(geometry.cluster_size())
            .and_then(|bytes| acc.checked_add(bytes))
    });
    match covered {
        Some(bytes) if bytes <= allocated_size => {}
        Some(bytes) => {
            return Err(MftError::CorruptRunList(format!(
                "runs cover {} bytes but the attribute allocates {}",
                bytes, allocated_size
            )));
        }
        None => {
            return Err(MftError::CorruptRunList(
                "run lengths overflow a 64-bit byte count".into(),
            ));
        }
    }

    let cluster_size = geometry.cluster_size() as usize;
    let mut buf = vec![0u8; cluster_size];
    let mut written = 0u64;

    for (run, start) in runs.iter().zip(absolute_clusters(runs)?) {
        let Some(lcn) = start else {
            trace!("Sparse run of {} clusters", run.cluster_count);
            buf.fill(0);
            for _ in 0..run.cluster_count {
                out.write_all(&buf)?;
                written += cluster_size as u64;
            }
            continue;
        };

        let mut offset = geometry.byte_offset(lcn)?;
        debug!(
            "Reading {} clusters from LCN {} (offset 0x{:X})",
            run.cluster_count, lcn, offset
        );
        volume.seek(SeekFrom::Start(offset))?;
        for _ in 0..run.cluster_count {
            let got = read_full(volume, &mut buf)?;
            if got != cluster_size {
                return Err(MftError::ShortRead {
                    offset,
                    expected: cluster_size,
                    actual: got,
                });
            }
            out.write_all(&buf)?;
            written += cluster_size as u64;
            offset += cluster_size as u64;
        }
    }
    Ok(written)
}

// Like read_exact, but reports how far it got instead of failing on EOF.
pub(crate) fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(filled)
}
