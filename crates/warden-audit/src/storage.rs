//! Audit storage backends.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};

use tracing::{debug, info, warn};

use crate::error::{AuditError, AuditResult};
use crate::record::AuditRecord;

/// Storage backend for audit records.
///
/// Backends only persist and read back records; sequencing and chaining
/// belong to [`crate::AuditLog`]. Reads must not wait on an in-progress
/// append longer than it takes to publish one record.
pub trait AuditStorage: Send + Sync {
    /// Persist one record durably.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be written.
    fn append(&self, record: &AuditRecord) -> AuditResult<()>;

    /// The last stored record, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    fn last(&self) -> AuditResult<Option<AuditRecord>>;

    /// Up to `limit` records following the first `after` records, in order.
    /// Sequences are gapless from 1, so this is also `sequence > after`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    fn read_after(&self, after: u64, limit: usize) -> AuditResult<Vec<AuditRecord>>;

    /// Number of stored records.
    fn len(&self) -> usize;

    /// Whether nothing is stored.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Volatile storage for tests and ephemeral deployments.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    records: RwLock<Vec<AuditRecord>>,
}

impl MemoryStorage {
    /// Create empty storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn position(after: u64) -> usize {
    usize::try_from(after).unwrap_or(usize::MAX)
}

impl AuditStorage for MemoryStorage {
    fn append(&self, record: &AuditRecord) -> AuditResult<()> {
        self.records
            .write()
            .map_err(|e| AuditError::Storage(e.to_string()))?
            .push(record.clone());
        Ok(())
    }

    fn last(&self) -> AuditResult<Option<AuditRecord>> {
        Ok(self
            .records
            .read()
            .map_err(|e| AuditError::Storage(e.to_string()))?
            .last()
            .cloned())
    }

    fn read_after(&self, after: u64, limit: usize) -> AuditResult<Vec<AuditRecord>> {
        let records = self
            .records
            .read()
            .map_err(|e| AuditError::Storage(e.to_string()))?;
        Ok(records
            .iter()
            .skip(position(after))
            .take(limit)
            .cloned()
            .collect())
    }

    fn len(&self) -> usize {
        self.records.read().map_or(0, |r| r.len())
    }
}

/// JSON-lines file storage, one record per line.
///
/// Appends are written in a single `write_all` and optionally followed by
/// `fsync`. Byte offsets of every line are indexed on open so readers can
/// seek straight to a sequence number.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    fsync: bool,
    writer: Mutex<File>,
    offsets: RwLock<Vec<u64>>,
    end: RwLock<u64>,
    last: RwLock<Option<AuditRecord>>,
}

impl FileStorage {
    /// Open or create the log at `path`, indexing existing records.
    ///
    /// A final line cut short by a crash (no trailing newline, not valid
    /// JSON) is truncated away. Any other malformed line is an error.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::Io`] if the file cannot be opened and
    /// [`AuditError::Corrupt`] if an existing line is not a record.
    pub fn open(path: impl AsRef<Path>, fsync: bool) -> AuditResult<Self> {
        let path = path.as_ref().to_path_buf();
        let io = |source| AuditError::Io {
            path: path.clone(),
            source,
        };

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(io)?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)
            .map_err(io)?;

        let (offsets, end, last) = index(&path, &mut file)?;
        info!(path = %path.display(), records = offsets.len(), "opened audit log");

        Ok(Self {
            path,
            fsync,
            writer: Mutex::new(file),
            offsets: RwLock::new(offsets),
            end: RwLock::new(end),
            last: RwLock::new(last),
        })
    }

    /// Log file location.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io(&self, source: std::io::Error) -> AuditError {
        AuditError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

/// Scan the file, returning line offsets, the end of the last complete
/// line and the last record.
fn index(path: &Path, file: &mut File) -> AuditResult<(Vec<u64>, u64, Option<AuditRecord>)> {
    let io = |source| AuditError::Io {
        path: path.to_path_buf(),
        source,
    };
    file.seek(SeekFrom::Start(0)).map_err(io)?;
    let mut reader = BufReader::new(&mut *file);
    let mut offsets = Vec::new();
    let mut last = None;
    let mut offset = 0u64;
    let mut line = String::new();
    let mut line_no = 0usize;

    loop {
        line.clear();
        let read = reader.read_line(&mut line).map_err(io)?;
        if read == 0 {
            break;
        }
        line_no = line_no.saturating_add(1);
        let complete = line.ends_with('\n');
        let trimmed = line.trim_end();
        if trimmed.is_empty() {
            offset = offset.saturating_add(read as u64);
            continue;
        }
        match serde_json::from_str::<AuditRecord>(trimmed) {
            Ok(record) => {
                if !complete {
                    // Valid but unterminated: finish the line so the next
                    // append starts cleanly.
                    drop(reader);
                    file.write_all(b"\n").map_err(io)?;
                    offsets.push(offset);
                    let end = offset.saturating_add(read as u64).saturating_add(1);
                    return Ok((offsets, end, Some(record)));
                }
                offsets.push(offset);
                last = Some(record);
            },
            Err(e) if !complete => {
                warn!(
                    path = %path.display(),
                    line = line_no,
                    error = %e,
                    "truncating partial trailing audit record"
                );
                drop(reader);
                file.set_len(offset).map_err(io)?;
                return Ok((offsets, offset, last));
            },
            Err(e) => {
                return Err(AuditError::Corrupt {
                    path: path.to_path_buf(),
                    line: line_no,
                    reason: e.to_string(),
                });
            },
        }
        offset = offset.saturating_add(read as u64);
    }

    Ok((offsets, offset, last))
}

/// The file operations an append needs.
trait LogFile: Write {
    fn sync(&mut self) -> std::io::Result<()>;
    fn truncate(&mut self, len: u64) -> std::io::Result<()>;
}

impl LogFile for File {
    fn sync(&mut self) -> std::io::Result<()> {
        self.sync_data()
    }

    fn truncate(&mut self, len: u64) -> std::io::Result<()> {
        self.set_len(len)
    }
}

/// Write one terminated line at `end`. On any failure the file is cut back
/// to `end`, so a failed append leaves neither a torn line nor a record
/// whose sequence the next append would repeat.
fn write_line(file: &mut impl LogFile, line: &[u8], end: u64, fsync: bool) -> std::io::Result<()> {
    let written = file
        .write_all(line)
        .and_then(|()| if fsync { file.sync() } else { Ok(()) });
    if let Err(e) = written {
        if let Err(cut) = file.truncate(end) {
            warn!(error = %cut, "could not roll back failed audit append");
        }
        return Err(e);
    }
    Ok(())
}

impl AuditStorage for FileStorage {
    fn append(&self, record: &AuditRecord) -> AuditResult<()> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');

        let mut file = self
            .writer
            .lock()
            .map_err(|e| AuditError::Storage(e.to_string()))?;
        let mut end = self
            .end
            .write()
            .map_err(|e| AuditError::Storage(e.to_string()))?;
        write_line(&mut *file, &line, *end, self.fsync).map_err(|e| self.io(e))?;

        self.offsets
            .write()
            .map_err(|e| AuditError::Storage(e.to_string()))?
            .push(*end);
        *end = end.saturating_add(line.len() as u64);
        *self
            .last
            .write()
            .map_err(|e| AuditError::Storage(e.to_string()))? = Some(record.clone());
        debug!(sequence = record.sequence, "audit record written");
        Ok(())
    }

    fn last(&self) -> AuditResult<Option<AuditRecord>> {
        Ok(self
            .last
            .read()
            .map_err(|e| AuditError::Storage(e.to_string()))?
            .clone())
    }

    fn read_after(&self, after: u64, limit: usize) -> AuditResult<Vec<AuditRecord>> {
        let (start, count) = {
            let offsets = self
                .offsets
                .read()
                .map_err(|e| AuditError::Storage(e.to_string()))?;
            let Some(&start) = offsets.get(position(after)) else {
                return Ok(Vec::new());
            };
            let available = offsets.len().saturating_sub(position(after));
            (start, available.min(limit))
        };

        let mut file = File::open(&self.path).map_err(|e| self.io(e))?;
        file.seek(SeekFrom::Start(start)).map_err(|e| self.io(e))?;
        let mut records = Vec::with_capacity(count);
        for (i, line) in BufReader::new(file).lines().enumerate() {
            if records.len() >= count {
                break;
            }
            let line = line.map_err(|e| self.io(e))?;
            if line.trim().is_empty() {
                continue;
            }
            let record = serde_json::from_str(&line).map_err(|e| AuditError::Corrupt {
                path: self.path.clone(),
                line: position(after).saturating_add(i).saturating_add(1),
                reason: e.to_string(),
            })?;
            records.push(record);
        }
        Ok(records)
    }

    fn len(&self) -> usize {
        self.offsets.read().map_or(0, |o| o.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{AuditDraft, zero_hash};
    use warden_core::{Arguments, CorrelationId, ExecutionStatus, PrincipalId, Timestamp};

    fn record(sequence: u64, previous: String) -> AuditRecord {
        let draft = AuditDraft::new(
            CorrelationId::from_string(format!("c-{sequence}")),
            PrincipalId::new("alice"),
            "echo",
            &Arguments::new(),
            ExecutionStatus::Completed,
        );
        AuditRecord::seal(draft, sequence, previous, Timestamp::now()).unwrap()
    }

    fn chain(n: u64) -> Vec<AuditRecord> {
        let mut previous = zero_hash();
        (1..=n)
            .map(|seq| {
                let r = record(seq, previous.clone());
                previous = r.hash.clone();
                r
            })
            .collect()
    }

    #[test]
    fn test_memory_read_after() {
        let storage = MemoryStorage::new();
        for r in chain(5) {
            storage.append(&r).unwrap();
        }
        let page: Vec<u64> = storage
            .read_after(2, 2)
            .unwrap()
            .iter()
            .map(|r| r.sequence)
            .collect();
        assert_eq!(page, vec![3, 4]);
        assert_eq!(storage.last().unwrap().unwrap().sequence, 5);
    }

    #[test]
    fn test_file_reopen_recovers_last() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit").join("log.jsonl");
        {
            let storage = FileStorage::open(&path, true).unwrap();
            for r in chain(3) {
                storage.append(&r).unwrap();
            }
        }
        let storage = FileStorage::open(&path, true).unwrap();
        assert_eq!(storage.len(), 3);
        assert_eq!(storage.last().unwrap().unwrap().sequence, 3);
        let page: Vec<u64> = storage
            .read_after(1, 10)
            .unwrap()
            .iter()
            .map(|r| r.sequence)
            .collect();
        assert_eq!(page, vec![2, 3]);
    }

    #[test]
    fn test_partial_trailing_line_truncated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.jsonl");
        {
            let storage = FileStorage::open(&path, false).unwrap();
            for r in chain(2) {
                storage.append(&r).unwrap();
            }
        }
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(b"{\"sequence\":3,\"corr").unwrap();
        drop(file);

        let storage = FileStorage::open(&path, false).unwrap();
        assert_eq!(storage.len(), 2);
        storage.append(&record(3, storage.last().unwrap().unwrap().hash)).unwrap();
        let reopened = FileStorage::open(&path, false).unwrap();
        assert_eq!(reopened.len(), 3);
    }

    #[test]
    fn test_corrupt_middle_line_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.jsonl");
        let records = chain(2);
        let mut text = serde_json::to_string(&records[0]).unwrap();
        text.push_str("\nnot json\n");
        text.push_str(&serde_json::to_string(&records[1]).unwrap());
        text.push('\n');
        std::fs::write(&path, text).unwrap();

        let err = FileStorage::open(&path, false).unwrap_err();
        assert!(matches!(err, AuditError::Corrupt { line: 2, .. }));
    }

    /// A log file that fails on demand and records truncations.
    #[derive(Default)]
    struct FaultyFile {
        bytes: Vec<u8>,
        fail_write_after: Option<usize>,
        fail_sync: bool,
    }

    impl Write for FaultyFile {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            match self.fail_write_after {
                Some(0) => Err(std::io::Error::other("disk full")),
                Some(n) => {
                    let n = n.min(buf.len());
                    self.bytes.extend_from_slice(&buf[..n]);
                    self.fail_write_after = Some(0);
                    Ok(n)
                },
                None => {
                    self.bytes.extend_from_slice(buf);
                    Ok(buf.len())
                },
            }
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl LogFile for FaultyFile {
        fn sync(&mut self) -> std::io::Result<()> {
            if self.fail_sync {
                Err(std::io::Error::other("fsync failed"))
            } else {
                Ok(())
            }
        }

        fn truncate(&mut self, len: u64) -> std::io::Result<()> {
            self.bytes.truncate(usize::try_from(len).unwrap());
            Ok(())
        }
    }

    #[test]
    fn test_short_write_rolled_back() {
        let mut file = FaultyFile {
            bytes: b"{\"a\":1}\n".to_vec(),
            fail_write_after: Some(4),
            ..FaultyFile::default()
        };
        let err = write_line(&mut file, b"{\"b\":2}\n", 8, false).unwrap_err();
        assert_eq!(err.to_string(), "disk full");
        assert_eq!(file.bytes, b"{\"a\":1}\n");
    }

    #[test]
    fn test_failed_sync_rolled_back() {
        let mut file = FaultyFile {
            fail_sync: true,
            ..FaultyFile::default()
        };
        assert!(write_line(&mut file, b"{}\n", 0, true).is_err());
        assert!(file.bytes.is_empty());

        file.fail_sync = false;
        write_line(&mut file, b"{}\n", 0, true).unwrap();
        assert_eq!(file.bytes, b"{}\n");
    }

    #[test]
    fn test_file_rollback_keeps_log_appendable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.jsonl");
        let records = chain(2);
        let storage = FileStorage::open(&path, false).unwrap();
        storage.append(&records[0]).unwrap();
        let end = std::fs::metadata(&path).unwrap().len();

        {
            let mut file = storage.writer.lock().unwrap();
            file.write_all(b"{\"sequence\":2,\"torn").unwrap();
            file.truncate(end).unwrap();
        }
        storage.append(&records[1]).unwrap();

        let reopened = FileStorage::open(&path, false).unwrap();
        assert_eq!(reopened.len(), 2);
        let page: Vec<u64> = reopened
            .read_after(0, 10)
            .unwrap()
            .iter()
            .map(|r| r.sequence)
            .collect();
        assert_eq!(page, vec![1, 2]);
    }
}
