//! Append-only result journal.
//!
//! Every record is written as one JSON line. On open, the log is replayed
//! front to back to build an in-memory index of `job id -> line location`,
//! so lookups after a restart read exactly one line from disk instead of
//! scanning the file.
//!
//! # Torn writes
//!
//! A process killed in the middle of an append can leave a partial last
//! line behind. Replay treats an unparseable *final* line as a torn write,
//! logs it, and truncates it away so later appends stay line aligned. A
//! final line that decodes but lost only its newline is kept and terminated.
//! An unparseable line followed by valid data cannot be a torn write and is
//! reported as [`StoreError::Corrupt`].

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError, RwLock};

use super::record::{JobId, ResultRecord};

/// Longest line replay will accept. Records are a few hundred bytes.
const MAX_LINE_LEN: usize = 64 * 1024;

/// Errors raised by the result log.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Opening, reading, or writing the log file failed.
    #[error("I/O error on result log {path}: {source}")]
    Io {
        /// Path of the log file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A record could not be encoded as a log line.
    #[error("Failed to serialize record for job {job_id}: {source}")]
    Serialize {
        /// Job whose record failed to encode.
        job_id: JobId,
        /// Underlying serialization error.
        #[source]
        source: serde_json::Error,
    },

    /// A line in the log could not be decoded.
    #[error("Result log {path} is corrupt at line {line}: {reason}")]
    Corrupt {
        /// Path of the log file.
        path: PathBuf,
        /// 1-based line number.
        line: usize,
        /// What was wrong with the line.
        reason: String,
    },
}

/// Result alias for log operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Byte range of one record line, excluding its newline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Locator {
    offset: u64,
    len: u64,
}

#[derive(Debug)]
struct LogWriter {
    file: File,
    /// Offset at which the next line will start.
    end: u64,
    /// Set when a failed append could not be rolled back; `end` no longer
    /// matches the file and further appends are refused.
    failed: bool,
}

/// Durable, append-only store of [`ResultRecord`]s.
///
/// Appends are serialized through an internal writer lock, so replay order
/// always matches the order in which `append` calls completed. Lookups use
/// their own read handle and only contend with appends on the index lock.
#[derive(Debug)]
pub struct DurableStore {
    path: PathBuf,
    writer: Mutex<LogWriter>,
    index: RwLock<HashMap<JobId, Locator>>,
    sync_writes: bool,
}

impl DurableStore {
    /// Opens or creates the log at `path` and replays it.
    ///
    /// Parent directories are created when missing.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] if the file cannot be created, opened for
    /// appending, or read, and [`StoreError::Corrupt`] if replay finds a bad
    /// line that is not the torn tail of the log.
    pub fn open(path: &Path) -> StoreResult<Self> {
        let io_err = |source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_err)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(path)
            .map_err(io_err)?;

        let replayed = replay(&file, path)?;

        let end = match replayed.tail {
            Tail::Clean => replayed.end,
            Tail::Unterminated => {
                log::warn!(
                    "Result log {} ends without a line terminator; repairing",
                    path.display()
                );
                (&file).write_all(b"\n").map_err(io_err)?;
                file.sync_all().map_err(io_err)?;
                replayed.end + 1
            }
            Tail::Torn(offset) => {
                file.set_len(offset).map_err(io_err)?;
                file.sync_all().map_err(io_err)?;
                offset
            }
        };

        log::info!(
            "Opened result log {} ({} records)",
            path.display(),
            replayed.index.len()
        );

        Ok(Self {
            path: path.to_path_buf(),
            writer: Mutex::new(LogWriter {
                file,
                end,
                failed: false,
            }),
            index: RwLock::new(replayed.index),
            sync_writes: false,
        })
    }

    /// Sync file data to the device after every append.
    ///
    /// Without this, a successful append is visible to readers and handed to
    /// the OS, but may not survive a power loss.
    #[must_use]
    pub fn with_sync_writes(mut self, sync: bool) -> Self {
        self.sync_writes = sync;
        self
    }

    /// Appends `record` as a new line.
    ///
    /// The record is durable (by the configured sync policy) once this
    /// returns `Ok`. Later appends for the same id supersede earlier ones.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Serialize`] if the record cannot be encoded and
    /// [`StoreError::Io`] if the write fails. A failed write is rolled back
    /// to the previous end of the file so no partial line is left behind. If
    /// the rollback itself fails, every later append is refused with
    /// [`StoreError::Io`]; the partial line is dropped as a torn tail on the
    /// next open.
    pub fn append(&self, record: &ResultRecord) -> StoreResult<()> {
        let mut line = serde_json::to_vec(record).map_err(|source| StoreError::Serialize {
            job_id: record.job_id.clone(),
            source,
        })?;
        let len = line.len() as u64;
        line.push(b'\n');

        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        if writer.failed {
            return Err(self.io_error(std::io::Error::other(
                "log writer disabled after a failed rollback",
            )));
        }
        let offset = writer.end;

        let mut written = writer.file.write_all(&line);
        if written.is_ok() && self.sync_writes {
            written = writer.file.sync_data();
        }
        if let Err(source) = written {
            if let Err(e) = writer.file.set_len(offset) {
                log::error!(
                    "Failed to roll back partial append in {}: {}; refusing further appends",
                    self.path.display(),
                    e
                );
                writer.failed = true;
            }
            return Err(self.io_error(source));
        }
        writer.end = offset + line.len() as u64;

        self.index
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(record.job_id.clone(), Locator { offset, len });

        log::trace!("Appended record for job {} at offset {}", record.job_id, offset);
        Ok(())
    }

    /// Looks up the latest record appended for `job_id`.
    ///
    /// Returns `Ok(None)` when the id has never been appended.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] if the line cannot be read back and
    /// [`StoreError::Corrupt`] if it no longer decodes.
    pub fn lookup(&self, job_id: &str) -> StoreResult<Option<ResultRecord>> {
        let locator = self
            .index
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(job_id)
            .copied();
        let Some(locator) = locator else {
            return Ok(None);
        };

        let mut file = File::open(&self.path).map_err(|e| self.io_error(e))?;
        file.seek(SeekFrom::Start(locator.offset))
            .map_err(|e| self.io_error(e))?;
        let mut buf = vec![0u8; locator.len as usize];
        file.read_exact(&mut buf).map_err(|e| self.io_error(e))?;

        serde_json::from_slice(&buf)
            .map(Some)
            .map_err(|e| StoreError::Corrupt {
                path: self.path.clone(),
                line: 0,
                reason: format!("record for job {job_id} no longer decodes: {e}"),
            })
    }

    /// Whether a record for `job_id` has been appended.
    #[must_use]
    pub fn contains(&self, job_id: &str) -> bool {
        self.index
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(job_id)
    }

    /// Number of distinct job ids in the log.
    #[must_use]
    pub fn len(&self) -> usize {
        self.index
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether the log holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A store whose writer handle is read-only, so every append fails.
    #[cfg(test)]
    pub(crate) fn open_with_read_only_writer(path: &Path) -> StoreResult<Self> {
        let store = Self::open(path)?;
        let file = File::open(path).map_err(|e| store.io_error(e))?;
        {
            let mut writer = store.writer.lock().unwrap_or_else(PoisonError::into_inner);
            writer.file = file;
        }
        Ok(store)
    }

    fn io_error(&self, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

/// State of the last line found by replay.
enum Tail {
    /// Ends on a line terminator (or the log is empty).
    Clean,
    /// The last line is a valid record missing only its newline.
    Unterminated,
    /// The last line is garbage starting at this offset.
    Torn(u64),
}

struct Replayed {
    index: HashMap<JobId, Locator>,
    end: u64,
    tail: Tail,
}

fn replay(file: &File, path: &Path) -> StoreResult<Replayed> {
    let io_err = |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    };

    let mut handle = file.try_clone().map_err(io_err)?;
    handle.seek(SeekFrom::Start(0)).map_err(io_err)?;
    let mut reader = BufReader::new(handle);

    let mut index = HashMap::new();
    let mut offset: u64 = 0;
    let mut line_no: usize = 0;
    // A bad line is only an error if something follows it.
    let mut pending: Option<(usize, u64, String)> = None;
    let mut unterminated = false;

    loop {
        let mut buf = Vec::new();
        let read = (&mut reader)
            .take(MAX_LINE_LEN as u64 + 1)
            .read_until(b'\n', &mut buf)
            .map_err(io_err)?;
        if read == 0 {
            break;
        }
        line_no += 1;

        if let Some((line, _, reason)) = pending.take() {
            return Err(StoreError::Corrupt {
                path: path.to_path_buf(),
                line,
                reason,
            });
        }

        let has_newline = buf.last() == Some(&b'\n');
        let content = if has_newline {
            &buf[..buf.len() - 1]
        } else {
            &buf[..]
        };

        if buf.len() > MAX_LINE_LEN {
            return Err(StoreError::Corrupt {
                path: path.to_path_buf(),
                line: line_no,
                reason: format!("line exceeds {MAX_LINE_LEN} bytes"),
            });
        }

        if content.iter().all(u8::is_ascii_whitespace) {
            offset += read as u64;
            continue;
        }

        match serde_json::from_slice::<ResultRecord>(content) {
            Ok(record) => {
                // Only the last line of the file can lack a newline.
                unterminated = !has_newline;
                index.insert(
                    record.job_id,
                    Locator {
                        offset,
                        len: content.len() as u64,
                    },
                );
            }
            Err(e) => {
                pending = Some((line_no, offset, e.to_string()));
            }
        }
        offset += read as u64;
    }

    let tail = match pending {
        Some((line, at, reason)) => {
            log::warn!(
                "Truncating torn tail of result log {} at line {}: {}",
                path.display(),
                line,
                reason
            );
            Tail::Torn(at)
        }
        None if unterminated => Tail::Unterminated,
        None => Tail::Clean,
    };

    Ok(Replayed {
        index,
        end: offset,
        tail,
    })
}
