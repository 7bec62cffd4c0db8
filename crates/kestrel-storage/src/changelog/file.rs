//! File-backed changelog
//!
//! One append-only file per store. Each file holds length-prefixed,
//! postcard-serialized frames:
//!
//! ```text
//! [4 bytes: len BE][len bytes: frame][4 bytes: len BE][...]
//! ```
//!
//! A torn or corrupt tail (for example after a crash mid-append) ends replay
//! at the last good frame, and is cut off before the file is appended to
//! again. An append that fails part way is cut back off at once.

use std::fmt::Debug;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, trace, warn};

use kestrel_core::{ChangeLogger, ChangeValue, LogRecord, Position, StoreError, StoreResult};

const LEN_PREFIX_SIZE: usize = 4;
const MAX_FRAME_LEN: usize = u32::MAX as usize;

/// Configuration for a file changelog
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileChangelogConfig {
    /// Directory holding one changelog file per store
    pub base_dir: PathBuf,
    /// Whether to fsync after every append
    pub sync_on_write: bool,
    /// Largest serialized frame accepted on append or replay
    pub max_record_size: usize,
}

impl Default for FileChangelogConfig {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("./data/changelog"),
            sync_on_write: true,
            max_record_size: 10 * 1024 * 1024, // 10MB
        }
    }
}

impl FileChangelogConfig {
    pub fn with_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            ..Default::default()
        }
    }

    pub fn with_sync_on_write(mut self, sync_on_write: bool) -> Self {
        self.sync_on_write = sync_on_write;
        self
    }

    /// Capped at `u32::MAX`, the largest length the frame prefix can hold
    pub fn with_max_record_size(mut self, max_record_size: usize) -> Self {
        self.max_record_size = max_record_size.min(MAX_FRAME_LEN);
        self
    }

    /// Effective frame size limit, also for configs built by deserializing
    fn frame_limit(&self) -> usize {
        self.max_record_size.min(MAX_FRAME_LEN)
    }
}

/// A record as stored on disk
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChangelogFrame {
    /// Position of the frame in its file, starting at 0
    sequence: u64,
    /// Wall-clock time of the append
    appended_at_millis: i64,
    record: LogRecord,
}

/// File operations an append handle needs
trait SegmentFile: Write + Send + Debug {
    fn truncate_to(&mut self, len: u64) -> io::Result<()>;
    fn sync(&mut self) -> io::Result<()>;
}

impl SegmentFile for File {
    fn truncate_to(&mut self, len: u64) -> io::Result<()> {
        self.set_len(len)
    }

    fn sync(&mut self) -> io::Result<()> {
        self.sync_data()
    }
}

/// Open append handle for one store's changelog file
#[derive(Debug)]
struct Segment {
    file: Box<dyn SegmentFile>,
    next_sequence: u64,
    /// Length of the file's intact prefix
    offset: u64,
    /// Set once the file may hold a partial frame; the handle must be reopened
    discarded: bool,
}

/// Result of reading a changelog file
struct FrameScan {
    frames: Vec<ChangelogFrame>,
    /// Length of the prefix made of complete, decodable frames
    valid_len: u64,
    file_len: u64,
}

/// [`ChangeLogger`] that appends to per-store files
#[derive(Debug)]
pub struct FileChangelog {
    config: FileChangelogConfig,
    segments: DashMap<String, Arc<Mutex<Segment>>>,
}

impl FileChangelog {
    /// Open a changelog directory, creating it if needed
    #[instrument(skip_all)]
    pub fn open(config: FileChangelogConfig) -> StoreResult<Self> {
        std::fs::create_dir_all(&config.base_dir)?;
        info!(path = %config.base_dir.display(), "Opened file changelog");
        Ok(Self {
            config,
            segments: DashMap::new(),
        })
    }

    pub fn config(&self) -> &FileChangelogConfig {
        &self.config
    }

    /// Path of the changelog file for `store_name`
    pub fn log_path(&self, store_name: &str) -> PathBuf {
        let plain = !store_name.is_empty()
            && store_name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
            && !store_name.starts_with('.')
            && !store_name.starts_with("x-");
        let file_stem = if plain {
            store_name.to_string()
        } else {
            format!("x-{}", hex::encode(store_name))
        };
        self.config.base_dir.join(format!("{file_stem}.changelog"))
    }

    /// Read back every intact record of a store, in append order
    pub fn replay(&self, store_name: &str) -> StoreResult<Vec<LogRecord>> {
        if let Some(segment) = self.segments.get(store_name) {
            segment.lock().file.flush()?;
        }
        let scan = scan_frames(&self.log_path(store_name), self.config.frame_limit())?;
        info!(
            store = store_name,
            records = scan.frames.len(),
            "Replayed changelog"
        );
        Ok(scan.frames.into_iter().map(|frame| frame.record).collect())
    }

    /// Flush and sync every open changelog file
    pub fn flush(&self) -> StoreResult<()> {
        for entry in self.segments.iter() {
            let mut segment = entry.value().lock();
            segment.file.flush()?;
            segment.file.sync()?;
        }
        Ok(())
    }

    fn segment(&self, store_name: &str) -> StoreResult<Arc<Mutex<Segment>>> {
        if let Some(segment) = self.segments.get(store_name) {
            return Ok(Arc::clone(segment.value()));
        }
        let opened = Arc::new(Mutex::new(self.open_segment(store_name)?));
        let segment = self
            .segments
            .entry(store_name.to_string())
            .or_insert(opened);
        Ok(Arc::clone(segment.value()))
    }

    fn open_segment(&self, store_name: &str) -> StoreResult<Segment> {
        let path = self.log_path(store_name);
        let scan = scan_frames(&path, self.config.frame_limit())?;

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)?;
        if scan.valid_len < scan.file_len {
            warn!(
                path = %path.display(),
                valid_len = scan.valid_len,
                file_len = scan.file_len,
                "Truncating torn changelog tail"
            );
            file.set_len(scan.valid_len)?;
        }

        debug!(
            store = store_name,
            path = %path.display(),
            records = scan.frames.len(),
            "Opened changelog segment"
        );
        Ok(Segment {
            file: Box::new(file),
            next_sequence: scan.frames.len() as u64,
            offset: scan.valid_len,
            discarded: false,
        })
    }

    /// Cut a failed append back off, or drop the handle if that fails too
    fn roll_back(
        &self,
        store_name: &str,
        handle: &Arc<Mutex<Segment>>,
        segment: &mut Segment,
        error: &io::Error,
    ) {
        warn!(
            store = store_name,
            offset = segment.offset,
            error = %error,
            "Changelog append failed, rolling back"
        );
        if let Err(e) = segment.file.truncate_to(segment.offset) {
            warn!(
                store = store_name,
                error = %e,
                "Rollback failed, discarding changelog segment"
            );
            segment.discarded = true;
            self.segments
                .remove_if(store_name, |_, open| Arc::ptr_eq(open, handle));
        }
    }
}

fn write_frame(file: &mut dyn SegmentFile, frame: &[u8], sync: bool) -> io::Result<()> {
    file.write_all(frame)?;
    file.flush()?;
    if sync {
        file.sync()?;
    }
    Ok(())
}

impl ChangeLogger for FileChangelog {
    fn log_change(
        &self,
        store_name: &str,
        key: Bytes,
        value: ChangeValue,
        timestamp: i64,
        position: &Position,
    ) -> StoreResult<()> {
        let handle = self.segment(store_name)?;
        let mut segment = handle.lock();
        if segment.discarded {
            return Err(StoreError::changelog(format!(
                "changelog segment for {store_name} was discarded after a failed append"
            )));
        }

        let frame = ChangelogFrame {
            sequence: segment.next_sequence,
            appended_at_millis: chrono::Utc::now().timestamp_millis(),
            record: LogRecord::new(store_name, key, value, timestamp, position.clone()),
        };
        let payload = postcard::to_allocvec(&frame)?;
        let limit = self.config.frame_limit();
        if payload.len() > limit {
            return Err(StoreError::changelog(format!(
                "record of {} bytes exceeds maximum of {}",
                payload.len(),
                limit
            )));
        }

        let mut buf = Vec::with_capacity(LEN_PREFIX_SIZE + payload.len());
        buf.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        buf.extend_from_slice(&payload);
        if let Err(e) = write_frame(segment.file.as_mut(), &buf, self.config.sync_on_write) {
            self.roll_back(store_name, &handle, &mut segment, &e);
            return Err(e.into());
        }

        trace!(
            store = store_name,
            sequence = segment.next_sequence,
            offset = segment.offset,
            len = payload.len(),
            "Appended changelog frame"
        );
        segment.next_sequence += 1;
        segment.offset += buf.len() as u64;
        Ok(())
    }
}

fn scan_frames(path: &Path, max_record_size: usize) -> StoreResult<FrameScan> {
    if !path.exists() {
        return Ok(FrameScan {
            frames: Vec::new(),
            valid_len: 0,
            file_len: 0,
        });
    }

    let data = std::fs::read(path)?;
    let mut frames = Vec::new();
    let mut offset = 0usize;

    while offset < data.len() {
        let Some(len_buf) = data.get(offset..offset + LEN_PREFIX_SIZE) else {
            warn!(offset, "Truncated frame header, stopping replay");
            break;
        };
        let mut prefix = [0u8; LEN_PREFIX_SIZE];
        prefix.copy_from_slice(len_buf);
        let frame_len = u32::from_be_bytes(prefix) as usize;

        if frame_len == 0 || frame_len > max_record_size {
            warn!(offset, len = frame_len, "Invalid frame length, stopping replay");
            break;
        }

        let body_start = offset + LEN_PREFIX_SIZE;
        let Some(body) = data.get(body_start..body_start + frame_len) else {
            warn!(offset, len = frame_len, "Truncated frame, stopping replay");
            break;
        };

        match postcard::from_bytes::<ChangelogFrame>(body) {
            Ok(frame) => frames.push(frame),
            Err(e) => {
                warn!(offset, error = %e, "Failed to decode frame, stopping replay");
                break;
            }
        }
        offset = body_start + frame_len;
    }

    Ok(FrameScan {
        frames,
        valid_len: offset as u64,
        file_len: data.len() as u64,
    })
}
