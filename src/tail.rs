//! Incremental reading of a single growing file.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use tokio::fs::{self, File};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncSeekExt, BufReader};
use tracing::{debug, info};

use crate::encoding::TextEncoding;
use crate::error::{Error, Result};
use crate::event::{FileIdentity, LifecycleKind};

/// Longest line handed out in one piece. Longer lines are split.
pub const MAX_LINE_BYTES: usize = 1024 * 1024;

/// Owns the open handle, the read cursor and the identity of the file
/// behind the watched path.
///
/// The buffered reader's logical position always equals `cursor` between
/// calls to [`TailEngine::poll_once`].
pub struct TailEngine {
    path: PathBuf,
    reader: Option<BufReader<File>>,
    identity: Option<FileIdentity>,
    cursor: u64,
    encoding: TextEncoding,
    follow_rotation: bool,
    max_line_bytes: usize,
}

impl TailEngine {
    pub fn new<P: AsRef<Path>>(path: P, encoding: TextEncoding, follow_rotation: bool) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            reader: None,
            identity: None,
            cursor: 0,
            encoding,
            follow_rotation,
            max_line_bytes: MAX_LINE_BYTES,
        }
    }

    /// Caps how many bytes one poll may consume for a single line. A line
    /// that reaches the cap without a terminator is delivered as is and the
    /// rest follows on later cycles.
    pub fn with_max_line_bytes(mut self, max_line_bytes: usize) -> Self {
        self.max_line_bytes = max_line_bytes.max(1);
        self
    }

    /// Opens the path and positions the cursor at end-of-file.
    ///
    /// Any handle held before is dropped first.
    pub async fn open(&mut self) -> Result<()> {
        if self.reader.take().is_some() {
            debug!(path = %self.path.display(), "closed previous handle");
        }

        let file = File::open(&self.path)
            .await
            .map_err(|e| Error::from_open(&self.path, e))?;
        let metadata = file
            .metadata()
            .await
            .map_err(|e| Error::from_open(&self.path, e))?;

        let mut reader = BufReader::new(file);
        let end = reader.seek(SeekFrom::End(0)).await?;
        let identity = FileIdentity::from_metadata(&metadata);

        self.identity = Some(identity);
        self.cursor = end;
        self.reader = Some(reader);

        debug!(path = %self.path.display(), %identity, cursor = end, "opened file");
        Ok(())
    }

    /// Runs one poll cycle: rotation check, truncation check, then at most
    /// one complete line.
    ///
    /// Lifecycle events are appended to `events` in the order they happen,
    /// even when the cycle later fails, so the caller can deliver them before
    /// handling the error.
    pub async fn poll_once(&mut self, events: &mut Vec<LifecycleKind>) -> Result<Option<String>> {
        if self.reader.is_none() {
            return Err(Error::InvalidState {
                message: format!("{} is not open", self.path.display()),
            });
        }

        let size = if self.follow_rotation {
            let metadata = fs::metadata(&self.path)
                .await
                .map_err(|e| read_error(&self.path, e))?;
            let current = FileIdentity::from_metadata(&metadata);

            let held = self.identity;
            match held {
                Some(held) if held != current => {
                    info!(
                        path = %self.path.display(),
                        old = %held,
                        new = %current,
                        "file rotated, reopening"
                    );
                    events.push(LifecycleKind::Rotated {
                        old_identity: held,
                        new_identity: current,
                    });
                    // Already reported; a failed open must not report it again.
                    self.identity = Some(current);
                    self.open().await.map_err(|e| match e {
                        Error::FileNotFound { path } => {
                            read_error(&path, std::io::ErrorKind::NotFound.into())
                        }
                        Error::PermissionDenied { path } => {
                            read_error(&path, std::io::ErrorKind::PermissionDenied.into())
                        }
                        other => other,
                    })?;
                    self.cursor
                }
                _ => metadata.len(),
            }
        } else {
            let Some(reader) = self.reader.as_ref() else {
                return Ok(None);
            };
            reader
                .get_ref()
                .metadata()
                .await
                .map_err(|e| read_error(&self.path, e))?
                .len()
        };

        let Self {
            path,
            reader,
            cursor,
            encoding,
            max_line_bytes,
            ..
        } = self;
        let path: &Path = path;
        let Some(reader) = reader.as_mut() else {
            return Ok(None);
        };

        if detect_file_truncation(size, *cursor) {
            info!(path = %path.display(), old_size = *cursor, new_size = size, "file truncated");
            events.push(LifecycleKind::Truncated {
                old_size: *cursor,
                new_size: size,
            });
            *cursor = 0;
            reader
                .seek(SeekFrom::Start(0))
                .await
                .map_err(|e| read_error(path, e))?;
        }

        let mut buf = Vec::new();
        let limit = *max_line_bytes as u64;
        let read = (&mut *reader)
            .take(limit)
            .read_until(b'\n', &mut buf)
            .await
            .map_err(|e| read_error(path, e))?;

        if read == 0 {
            return Ok(None);
        }

        let capped = read as u64 == limit;
        if buf.last() != Some(&b'\n') && !capped {
            // Writer is mid-line; rewind and pick it up whole next cycle.
            reader
                .seek(SeekFrom::Start(*cursor))
                .await
                .map_err(|e| read_error(path, e))?;
            return Ok(None);
        }

        *cursor += read as u64;

        Ok(Some(encoding.decode(strip_line_terminator(&buf))))
    }

    /// Drops the handle. Cursor and identity stay readable.
    pub fn close(&mut self) {
        if self.reader.take().is_some() {
            debug!(path = %self.path.display(), "closed file");
        }
    }

    pub fn is_open(&self) -> bool {
        self.reader.is_some()
    }

    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    pub fn identity(&self) -> Option<FileIdentity> {
        self.identity
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn read_error(path: &Path, source: std::io::Error) -> Error {
    Error::Read {
        path: path.to_path_buf(),
        source,
    }
}

/// Detect if the file was truncated by comparing current size with the cursor
fn detect_file_truncation(current_size: u64, cursor: u64) -> bool {
    current_size < cursor
}

fn strip_line_terminator(buf: &[u8]) -> &[u8] {
    let buf = buf.strip_suffix(b"\n").unwrap_or(buf);
    buf.strip_suffix(b"\r").unwrap_or(buf)
}
