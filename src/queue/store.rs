use serde_json::{Map, Value};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

/// One collected record: a JSON object keyed by field name
pub type DomainRecord = Map<String, Value>;

/// Zero-padded width of the sequence prefix
pub const SEQUENCE_WIDTH: usize = 8;

const RECORD_EXTENSION: &str = "json";
const QUARANTINE_DIR: &str = "quarantine";

#[derive(Error, Debug)]
pub enum QueueError {
    #[error("Queue I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Corrupt queue record {path}: {source}")]
    CorruptRecord {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Queue record {0} is not a JSON object")]
    NotAnObject(PathBuf),

    #[error("Failed to serialize record for {domain}: {source}")]
    Serialize {
        domain: String,
        #[source]
        source: serde_json::Error,
    },
}

pub type Result<T> = std::result::Result<T, QueueError>;

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> QueueError + '_ {
    move |source| QueueError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// A pending record file: `<sequence>-<domain>.json`
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QueuedItem {
    file_name: String,
    path: PathBuf,
}

impl QueuedItem {
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Sequence number parsed from the filename prefix, if it has one
    pub fn sequence(&self) -> Option<u64> {
        self.file_name
            .split_once('-')
            .and_then(|(prefix, _)| prefix.parse().ok())
    }

    /// Sanitized domain part of the filename
    pub fn domain(&self) -> &str {
        let stem = self
            .file_name
            .strip_suffix(".json")
            .unwrap_or(&self.file_name);
        stem.split_once('-').map(|(_, domain)| domain).unwrap_or(stem)
    }
}

/// Filesystem-backed FIFO of records awaiting delivery
///
/// Layout:
/// - `<root>/<00000042>-<domain>.json` pending records, pretty-printed JSON
/// - `<root>/.tmp*` in-flight writes, never listed
/// - `<root>/quarantine/` records that failed to parse
///
/// Filenames sort lexically in arrival order. Files appear atomically
/// (temp file + rename), so a reader never observes a partial record.
/// One collector/dispatcher pair per directory at a time; there is no
/// cross-process lock.
#[derive(Clone, Debug)]
pub struct QueueStore {
    root: PathBuf,
}

impl QueueStore {
    /// Open a queue rooted at `root`; the directory is created on first write
    pub fn open<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn quarantine_dir(&self) -> PathBuf {
        self.root.join(QUARANTINE_DIR)
    }

    /// Create the queue directory if it does not exist yet
    pub fn ensure_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.root).map_err(io_error(&self.root))
    }

    /// Filename for a record: zero-padded sequence plus sanitized domain
    pub fn file_name(sequence: u64, domain: &str) -> String {
        format!(
            "{:0width$}-{}.{}",
            sequence,
            sanitize_domain(domain),
            RECORD_EXTENSION,
            width = SEQUENCE_WIDTH
        )
    }

    /// Write `record` as a new queue file
    pub fn enqueue(&self, sequence: u64, domain: &str, record: &DomainRecord) -> Result<QueuedItem> {
        self.ensure_dir()?;

        let body = serde_json::to_vec_pretty(record).map_err(|source| QueueError::Serialize {
            domain: domain.to_string(),
            source,
        })?;

        let file_name = Self::file_name(sequence, domain);
        let path = self.root.join(&file_name);

        let mut temp = tempfile::Builder::new()
            .prefix(".tmp")
            .tempfile_in(&self.root)
            .map_err(io_error(&self.root))?;
        temp.write_all(&body).map_err(io_error(&path))?;
        temp.as_file().sync_all().map_err(io_error(&path))?;
        temp.persist(&path).map_err(|e| QueueError::Io {
            path: path.clone(),
            source: e.error,
        })?;

        debug!(sequence, domain, file = %file_name, "Record enqueued");

        Ok(QueuedItem { file_name, path })
    }

    /// Oldest pending records, sorted by filename, at most `limit`
    pub fn list_pending(&self, limit: usize) -> Result<Vec<QueuedItem>> {
        let mut items = self.scan()?;
        items.truncate(limit);
        Ok(items)
    }

    /// Number of pending records
    pub fn pending_count(&self) -> Result<usize> {
        Ok(self.scan()?.len())
    }

    fn scan(&self) -> Result<Vec<QueuedItem>> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io_error(&self.root)(e)),
        };

        let mut items = Vec::new();
        for entry in entries {
            let entry = entry.map_err(io_error(&self.root))?;
            let Ok(file_name) = entry.file_name().into_string() else {
                continue;
            };
            if file_name.starts_with('.') || !is_record_name(&file_name) {
                continue;
            }
            match entry.file_type() {
                Ok(kind) if kind.is_file() => {}
                _ => continue,
            }
            items.push(QueuedItem {
                path: entry.path(),
                file_name,
            });
        }

        items.sort();
        Ok(items)
    }

    /// Parse a queued record
    pub fn read(&self, item: &QueuedItem) -> Result<DomainRecord> {
        let bytes = fs::read(&item.path).map_err(io_error(&item.path))?;
        let value: Value =
            serde_json::from_slice(&bytes).map_err(|source| QueueError::CorruptRecord {
                path: item.path.clone(),
                source,
            })?;

        match value {
            Value::Object(record) => Ok(record),
            _ => Err(QueueError::NotAnObject(item.path.clone())),
        }
    }

    /// Remove a delivered record; a missing file is not an error
    pub fn delete(&self, item: &QueuedItem) -> Result<()> {
        match fs::remove_file(&item.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(file = %item.file_name, "Record already removed");
                Ok(())
            }
            Err(e) => Err(io_error(&item.path)(e)),
        }
    }

    /// Move an unreadable record out of the pending set, keeping it for inspection
    pub fn quarantine(&self, item: &QueuedItem) -> Result<PathBuf> {
        let dir = self.quarantine_dir();
        fs::create_dir_all(&dir).map_err(io_error(&dir))?;

        let target = free_target(&dir, &item.file_name);
        fs::rename(&item.path, &target).map_err(io_error(&item.path))?;

        warn!(file = %item.file_name, target = %target.display(), "Record quarantined");
        Ok(target)
    }

    /// Quarantined files, sorted by name
    pub fn list_quarantined(&self) -> Result<Vec<PathBuf>> {
        let dir = self.quarantine_dir();
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io_error(&dir)(e)),
        };

        let mut paths = Vec::new();
        for entry in entries {
            paths.push(entry.map_err(io_error(&dir))?.path());
        }
        paths.sort();
        Ok(paths)
    }

    /// Remove every pending record; quarantined files are kept
    pub fn clear(&self) -> Result<usize> {
        let items = self.scan()?;
        for item in &items {
            self.delete(item)?;
        }
        info!(removed = items.len(), queue = %self.root.display(), "Queue cleared");
        Ok(items.len())
    }

    /// One past the highest pending sequence number, 0 for an empty queue
    pub fn next_sequence(&self) -> Result<u64> {
        Ok(self
            .scan()?
            .iter()
            .filter_map(QueuedItem::sequence)
            .max()
            .map_or(0, |seq| seq + 1))
    }
}

/// `dir/<file_name>`, or `dir/<stem>.<n>.json` with the first free `n` when
/// an earlier record of the same name was already quarantined
fn free_target(dir: &Path, file_name: &str) -> PathBuf {
    let target = dir.join(file_name);
    if !target.exists() {
        return target;
    }

    let stem = file_name
        .strip_suffix(".json")
        .unwrap_or(file_name);
    (1u32..)
        .map(|n| dir.join(format!("{stem}.{n}.{RECORD_EXTENSION}")))
        .find(|candidate| !candidate.exists())
        .unwrap_or(target)
}

fn is_record_name(file_name: &str) -> bool {
    Path::new(file_name)
        .extension()
        .is_some_and(|ext| ext == RECORD_EXTENSION)
}

/// Normalize a domain for use in a filename: lower-case, `[a-z0-9._-]` kept,
/// everything else replaced by `_`
pub fn sanitize_domain(domain: &str) -> String {
    let sanitized: String = domain
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| match c {
            'a'..='z' | '0'..='9' | '.' | '-' | '_' => c,
            _ => '_',
        })
        .collect();

    // Leading dots would hide the file from `scan`
    let sanitized = sanitized.trim_start_matches('.');
    if sanitized.is_empty() {
        "_".to_string()
    } else {
        sanitized.to_string()
    }
}
