//! File-backed [`PModeDataStore`]: JSON snapshot plus a write-ahead log.
//!
//! On disk the store is two files:
//!
//! - `<path>`: the JSON [`PModeDocument`] written by the last checkpoint.
//! - `<path>.wal`: MessagePack-encoded [`StoreMutation`] frames appended since
//!   then. Each frame is a big-endian `u32` length followed by the payload,
//!   and every append is fsynced before it returns.
//!
//! Loading reads the snapshot and replays the log over it. A frame cut short
//! by a crash is dropped with a warning and the log is truncated back to the
//! last complete frame. An append that fails part way is rolled back before
//! the error is returned, so the log never carries a failed mutation. Checkpoints write the snapshot to a temp file, fsync,
//! rename over the old snapshot, then truncate the log. Replay is idempotent,
//! so a crash between rename and truncate is harmless.

use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::Context;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::storage::data_store::{PModeDataStore, PModeDocument, StoreMutation};

const FRAME_HEADER_LEN: usize = 4;

pub struct WalFileDataStore {
    snapshot_path: PathBuf,
    wal_path: PathBuf,
    wal: Mutex<File>,
}

impl WalFileDataStore {
    /// Opens (creating if needed) the store rooted at `snapshot_path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the parent directory or the log file cannot be created.
    pub fn open(snapshot_path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let snapshot_path = snapshot_path.into();
        if let Some(parent) = snapshot_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("cannot create {}", parent.display()))?;
            }
        }

        let wal_path = wal_path_for(&snapshot_path);
        let wal = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&wal_path)
            .with_context(|| format!("cannot open {}", wal_path.display()))?;

        Ok(Self {
            snapshot_path,
            wal_path,
            wal: Mutex::new(wal),
        })
    }

    #[must_use]
    pub fn snapshot_path(&self) -> &Path {
        &self.snapshot_path
    }

    #[must_use]
    pub fn wal_path(&self) -> &Path {
        &self.wal_path
    }

    fn read_snapshot(&self) -> anyhow::Result<PModeDocument> {
        if !self.snapshot_path.exists() {
            return Ok(PModeDocument::default());
        }
        let data = fs::read(&self.snapshot_path)
            .with_context(|| format!("cannot read {}", self.snapshot_path.display()))?;
        serde_json::from_slice(&data)
            .with_context(|| format!("corrupt snapshot {}", self.snapshot_path.display()))
    }

    fn tmp_path(&self) -> PathBuf {
        let mut os: OsString = self.snapshot_path.clone().into_os_string();
        os.push(".tmp");
        PathBuf::from(os)
    }
}

impl PModeDataStore for WalFileDataStore {
    fn load(&self) -> anyhow::Result<PModeDocument> {
        let mut document = self.read_snapshot()?;

        let wal = self.wal.lock();
        let data = fs::read(&self.wal_path)
            .with_context(|| format!("cannot read {}", self.wal_path.display()))?;

        let (mutations, valid_len) = decode_frames(&data)?;
        if valid_len < data.len() {
            warn!(
                path = %self.wal_path.display(),
                discarded_bytes = data.len() - valid_len,
                "write-ahead log ends in a torn frame; truncating"
            );
            wal.set_len(valid_len as u64)?;
            wal.sync_all()?;
        }

        let replayed = mutations.len();
        for mutation in mutations {
            document.apply(mutation);
        }
        debug!(
            records = document.records.len(),
            replayed, "pmode document loaded"
        );
        Ok(document)
    }

    fn append(&self, mutation: &StoreMutation) -> anyhow::Result<()> {
        let frame = encode_frame(mutation)?;
        let mut wal = self.wal.lock();
        append_frame(&mut *wal, &frame)
    }

    fn checkpoint(&self, document: &PModeDocument) -> anyhow::Result<()> {
        let data = serde_json::to_vec_pretty(document)?;
        let tmp_path = self.tmp_path();

        // Hold the log lock so no append lands between rename and truncate.
        let wal = self.wal.lock();

        let mut file = File::create(&tmp_path)
            .with_context(|| format!("cannot create {}", tmp_path.display()))?;
        file.write_all(&data)?;
        file.sync_all()?;
        fs::rename(&tmp_path, &self.snapshot_path)?;

        #[cfg(unix)]
        {
            if let Some(dir) = self.snapshot_path.parent().and_then(|p| File::open(p).ok()) {
                let _ = dir.sync_all();
            }
        }

        wal.set_len(0)?;
        wal.sync_all()?;
        debug!(records = document.records.len(), "pmode snapshot checkpointed");
        Ok(())
    }

    fn is_log_structured(&self) -> bool {
        true
    }
}

/// File operations an append goes through.
trait LogFile {
    fn end_offset(&self) -> io::Result<u64>;
    fn write_frame(&mut self, frame: &[u8]) -> io::Result<()>;
    fn sync_frame(&mut self) -> io::Result<()>;
    fn truncate_to(&mut self, len: u64) -> io::Result<()>;
}

impl LogFile for File {
    fn end_offset(&self) -> io::Result<u64> {
        Ok(self.metadata()?.len())
    }

    fn write_frame(&mut self, frame: &[u8]) -> io::Result<()> {
        self.write_all(frame)
    }

    fn sync_frame(&mut self) -> io::Result<()> {
        self.sync_data()
    }

    fn truncate_to(&mut self, len: u64) -> io::Result<()> {
        self.set_len(len)?;
        self.sync_all()
    }
}

fn encode_frame(mutation: &StoreMutation) -> anyhow::Result<Vec<u8>> {
    let payload = rmp_serde::to_vec_named(mutation)?;
    let len = u32::try_from(payload.len())
        .map_err(|_| anyhow::anyhow!("mutation too large: {} bytes", payload.len()))?;

    let mut frame = Vec::with_capacity(FRAME_HEADER_LEN + payload.len());
    frame.extend_from_slice(&len.to_be_bytes());
    frame.extend_from_slice(&payload);
    Ok(frame)
}

/// Writes and syncs one frame. On failure the log is cut back to where it
/// ended before the write.
fn append_frame(log: &mut impl LogFile, frame: &[u8]) -> anyhow::Result<()> {
    let start = log.end_offset()?;
    let written = log.write_frame(frame).and_then(|()| log.sync_frame());
    let Err(err) = written else {
        return Ok(());
    };

    match log.truncate_to(start) {
        Ok(()) => Err(anyhow::Error::new(err).context("write-ahead log append failed")),
        Err(rollback) => {
            warn!(offset = start, error = %rollback, "cannot roll back failed write-ahead log append");
            Err(anyhow::Error::new(err).context(format!(
                "write-ahead log append failed and rollback to offset {start} failed: {rollback}"
            )))
        }
    }
}

fn wal_path_for(snapshot_path: &Path) -> PathBuf {
    let mut os: OsString = snapshot_path.as_os_str().to_os_string();
    os.push(".wal");
    PathBuf::from(os)
}

/// Decodes complete frames from `data`, returning them with the byte length
/// they cover. A complete frame that fails to decode is an error.
fn decode_frames(data: &[u8]) -> anyhow::Result<(Vec<StoreMutation>, usize)> {
    let mut mutations = Vec::new();
    let mut offset = 0;

    while data.len() - offset >= FRAME_HEADER_LEN {
        let mut header = [0u8; FRAME_HEADER_LEN];
        header.copy_from_slice(&data[offset..offset + FRAME_HEADER_LEN]);
        let len = u32::from_be_bytes(header) as usize;

        let start = offset + FRAME_HEADER_LEN;
        if data.len() - start < len {
            break;
        }
        let mutation = rmp_serde::from_slice(&data[start..start + len])
            .with_context(|| format!("corrupt write-ahead log frame at offset {offset}"))?;
        mutations.push(mutation);
        offset = start + len;
    }

    Ok((mutations, offset))
}
