//! Whole-cache persistence to a single binary file.
//!
//! Layout: a fixed 20-byte header followed by a bincode payload holding the
//! entries oldest-first.
//!
//! ```text
//! magic "RCSN" (u32) | version (u16) | flags (u16) | payload len (u64) | payload crc32c (u32)
//! ```
//!
//! Absent, valid and corrupt files are told apart: `load` returns `Ok(None)`,
//! `Ok(Some(_))` or [`CacheError::Corrupt`] respectively.

use std::hash::Hash;
use std::io::Write;
use std::path::{Path, PathBuf};

use crc32c::crc32c;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{CacheError, Result, io_at};
use crate::lru::LruStore;

/// Magic number for snapshot files: "RCSN".
pub const SNAPSHOT_MAGIC: u32 = u32::from_be_bytes(*b"RCSN");

/// Current snapshot format version.
pub const SNAPSHOT_VERSION: u16 = 1;

/// Encoded header size (bincode fixint encoding).
const HEADER_LEN: usize = 20;

/// Extension of the resource cache snapshot.
pub const SNAPSHOT_EXTENSION: &str = "bin";

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct SnapshotHeader {
    magic: u32,
    version: u16,
    /// Reserved.
    flags: u16,
    payload_len: u64,
    payload_crc: u32,
}

impl SnapshotHeader {
    fn for_payload(payload: &[u8]) -> Self {
        Self {
            magic: SNAPSHOT_MAGIC,
            version: SNAPSHOT_VERSION,
            flags: 0,
            payload_len: payload.len() as u64,
            payload_crc: crc32c(payload),
        }
    }
}

#[derive(Serialize)]
struct PayloadRef<'a, K, V> {
    capacity: u64,
    entries: Vec<(&'a K, &'a V)>,
}

#[derive(Deserialize)]
struct Payload<K, V> {
    capacity: u64,
    entries: Vec<(K, V)>,
}

/// Snapshot path for a cache directory: `<stem>.<extension>` next to it.
///
/// `/data/.imgcache` maps to `/data/.imgcache.bin`.
pub fn snapshot_path(cache_dir: &Path, extension: &str) -> PathBuf {
    let stem = cache_dir
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "rcache".to_string());
    cache_dir.with_file_name(format!("{stem}.{extension}"))
}

/// Remove a file, treating "already gone" as success. Returns whether a file
/// was removed.
pub(crate) fn remove_if_exists(path: &Path) -> Result<bool> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(io_at(path)(e)),
    }
}

/// Reads and writes one snapshot file.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Snapshot for the resource cache rooted at `cache_dir`.
    pub fn for_cache_dir(cache_dir: &Path) -> Self {
        Self::new(snapshot_path(cache_dir, SNAPSHOT_EXTENSION))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Trim `store` and write all of it, replacing the previous snapshot.
    ///
    /// Written to a temporary file in the same directory and renamed into
    /// place, so a crash leaves either the old or the new snapshot.
    pub fn save<K, V>(&self, store: &mut LruStore<K, V>) -> Result<()>
    where
        K: Hash + Eq + Serialize,
        V: Serialize,
    {
        store.trim();
        let payload = PayloadRef {
            capacity: store.capacity() as u64,
            entries: store.iter().collect(),
        };
        let body = bincode::serialize(&payload).map_err(CacheError::Encode)?;
        let header =
            bincode::serialize(&SnapshotHeader::for_payload(&body)).map_err(CacheError::Encode)?;

        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(io_at(dir))?;
        tmp.write_all(&header).map_err(io_at(tmp.path()))?;
        tmp.write_all(&body).map_err(io_at(tmp.path()))?;
        tmp.as_file().sync_all().map_err(io_at(tmp.path()))?;
        tmp.persist(&self.path).map_err(|e| io_at(&self.path)(e.error))?;

        debug!(
            path = %self.path.display(),
            entries = payload.entries.len(),
            bytes = HEADER_LEN + body.len(),
            "Saved cache snapshot"
        );
        Ok(())
    }

    /// Read the snapshot into a store with the given capacity.
    ///
    /// The stored capacity is informational; the caller's configured
    /// capacity wins and the result is trimmed to it.
    pub fn load<K, V>(&self, capacity: usize) -> Result<Option<LruStore<K, V>>>
    where
        K: Hash + Eq + DeserializeOwned,
        V: DeserializeOwned,
    {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_at(&self.path)(e)),
        };

        let payload: Payload<K, V> = self.decode(&bytes)?;
        if payload.capacity != capacity as u64 {
            debug!(
                stored = payload.capacity,
                configured = capacity,
                "Snapshot capacity differs from configuration"
            );
        }
        let store = LruStore::from_entries(capacity, payload.entries);
        debug!(path = %self.path.display(), entries = store.len(), "Loaded cache snapshot");
        Ok(Some(store))
    }

    /// Delete the snapshot file if present.
    pub fn remove(&self) -> Result<bool> {
        let removed = remove_if_exists(&self.path)?;
        if removed {
            debug!(path = %self.path.display(), "Removed cache snapshot");
        }
        Ok(removed)
    }

    fn decode<K, V>(&self, bytes: &[u8]) -> Result<Payload<K, V>>
    where
        K: DeserializeOwned,
        V: DeserializeOwned,
    {
        if bytes.len() < HEADER_LEN {
            return Err(CacheError::corrupt(
                &self.path,
                format!("truncated header ({} bytes)", bytes.len()),
            ));
        }
        let (head, body) = bytes.split_at(HEADER_LEN);

        let header: SnapshotHeader = bincode::deserialize(head)
            .map_err(|e| CacheError::corrupt(&self.path, format!("unreadable header: {e}")))?;
        if header.magic != SNAPSHOT_MAGIC {
            return Err(CacheError::corrupt(
                &self.path,
                format!(
                    "invalid magic number: expected {SNAPSHOT_MAGIC:08x}, got {:08x}",
                    header.magic
                ),
            ));
        }
        if header.version != SNAPSHOT_VERSION {
            return Err(CacheError::corrupt(
                &self.path,
                format!("unsupported snapshot version {}", header.version),
            ));
        }
        if header.payload_len != body.len() as u64 {
            return Err(CacheError::corrupt(
                &self.path,
                format!(
                    "payload length mismatch: header says {}, file has {}",
                    header.payload_len,
                    body.len()
                ),
            ));
        }
        let actual = crc32c(body);
        if actual != header.payload_crc {
            warn!(path = %self.path.display(), "Snapshot checksum mismatch");
            return Err(CacheError::corrupt(
                &self.path,
                format!(
                    "checksum mismatch: expected {:08x}, got {actual:08x}",
                    header.payload_crc
                ),
            ));
        }

        bincode::deserialize(body)
            .map_err(|e| CacheError::corrupt(&self.path, format!("unreadable payload: {e}")))
    }
}
