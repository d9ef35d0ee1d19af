//! Memoization of expensive image-producing calls.
//!
//! A call is identified by its [`Fingerprint`]. Results live in an LRU store
//! and are also written to `<dir>/<fingerprint>.<ext>`, so a later process
//! can pick them up from disk without rendering again.

mod artifact;
mod fingerprint;

pub use artifact::Artifact;
pub use fingerprint::{Fingerprint, SlugArgs, SlugValue, fingerprint, normalize};

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use rcache_config::CacheSettings;
use tracing::{debug, trace, warn};

use crate::body::ImageBody;
use crate::error::{CacheError, Result, io_at};
use crate::lru::LruStore;
use crate::snapshot::{SnapshotStore, remove_if_exists, snapshot_path};

/// Extension of the slug cache snapshot.
pub const SLUG_SNAPSHOT_EXTENSION: &str = "slugs.bin";

/// Slug cache of rendered images.
pub type ImageSlugCache = SlugCache<ImageBody>;

/// Memoizes render calls by fingerprint.
pub struct SlugCache<A: Artifact> {
    dir: PathBuf,
    store: LruStore<String, A>,
    snapshot: SnapshotStore,
    from_memory: bool,
}

impl<A: Artifact> SlugCache<A> {
    /// Open the slug cache writing into `dir`.
    ///
    /// A corrupt snapshot is removed and the cache starts empty.
    pub fn open(dir: impl Into<PathBuf>, capacity: usize) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(io_at(&dir))?;
        let snapshot = SnapshotStore::new(snapshot_path(&dir, SLUG_SNAPSHOT_EXTENSION));

        let store = match snapshot.load(capacity) {
            Ok(Some(store)) => store,
            Ok(None) => LruStore::new(capacity),
            Err(e) if e.is_corruption() => {
                warn!(error = %e, "Slug snapshot damaged, starting empty");
                snapshot.remove()?;
                LruStore::new(capacity)
            }
            Err(e) => return Err(e),
        };

        debug!(dir = %dir.display(), entries = store.len(), capacity, "Opened slug cache");
        Ok(Self {
            dir,
            store,
            snapshot,
            from_memory: false,
        })
    }

    /// Open using the configured slug directory and capacity.
    pub fn from_settings(settings: &CacheSettings) -> Result<Self> {
        Self::open(settings.effective_slug_dir(), settings.cache_max)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn snapshot_path(&self) -> &Path {
        self.snapshot.path()
    }

    /// Whether the last `provide` was answered from memory.
    pub fn from_memory(&self) -> bool {
        self.from_memory
    }

    /// Output file for a fingerprint.
    pub fn output_path(&self, fingerprint: &Fingerprint) -> PathBuf {
        self.dir.join(format!("{fingerprint}.{}", A::EXTENSION))
    }

    /// Return the memoized result of `render(args)` under `namespace`.
    ///
    /// Lookup order is memory, then the output file, then `render`. A fresh
    /// render is written to its output file before it is returned. An
    /// unreadable output file is ignored and rendered over.
    ///
    /// The slug snapshot is rewritten whenever an entry is added, so other
    /// instances opened on the same directory see every output.
    pub fn provide<F, E>(&mut self, namespace: &str, args: &SlugArgs, render: F) -> Result<A>
    where
        F: FnOnce(&SlugArgs) -> std::result::Result<A, E>,
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let fp = fingerprint(namespace, args);

        if let Some(hit) = self.store.get(fp.as_str()) {
            trace!(fingerprint = %fp, "Slug cache hit");
            self.from_memory = true;
            return Ok(hit.clone());
        }
        self.from_memory = false;

        let path = self.output_path(&fp);
        if path.is_file() {
            match A::read_from(&path) {
                Ok(artifact) => {
                    debug!(fingerprint = %fp, path = %path.display(), "Slug loaded from disk");
                    self.remember(fp, artifact.clone())?;
                    return Ok(artifact);
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Unreadable slug output, rendering again");
                }
            }
        }

        let artifact = render(args).map_err(|e| CacheError::Render {
            fingerprint: fp.to_string(),
            source: e.into(),
        })?;
        artifact.write_to(&path)?;
        debug!(fingerprint = %fp, path = %path.display(), "Rendered slug");

        self.remember(fp, artifact.clone())?;
        Ok(artifact)
    }

    fn remember(&mut self, fp: Fingerprint, artifact: A) -> Result<()> {
        self.store.put(fp.into_string(), artifact);
        self.snapshot.save(&mut self.store)
    }

    /// Look up by fingerprint and mark most recently used.
    pub fn get(&mut self, fingerprint: &str) -> Option<&A> {
        self.store.get(fingerprint)
    }

    /// Fingerprints, oldest-first.
    pub fn keys(&self) -> Vec<String> {
        self.store.keys()
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// Trim and write the slug snapshot.
    pub fn save(&mut self) -> Result<()> {
        self.snapshot.save(&mut self.store)
    }

    /// Empty memory; with `persistent`, also delete the snapshot and the
    /// output file of every entry in memory or in the snapshot.
    ///
    /// Outputs of entries already evicted from both are left on disk.
    pub fn clear(&mut self, persistent: bool) -> Result<()> {
        if persistent {
            let mut known: BTreeSet<String> = self.store.keys().into_iter().collect();
            match self.snapshot.load::<String, A>(usize::MAX) {
                Ok(Some(stored)) => known.extend(stored.keys()),
                Ok(None) => {}
                Err(e) if e.is_corruption() => {
                    warn!(error = %e, "Slug snapshot damaged, clearing known outputs only");
                }
                Err(e) => return Err(e),
            }
            let known: Vec<PathBuf> = known
                .iter()
                .map(|key| self.dir.join(format!("{key}.{}", A::EXTENSION)))
                .collect();
            let mut removed = 0;
            for path in &known {
                if remove_if_exists(path)? {
                    removed += 1;
                }
            }
            self.snapshot.remove()?;
            debug!(removed, "Cleared slug outputs");
        }
        self.store.clear();
        self.from_memory = false;
        Ok(())
    }
}

impl<A: Artifact> std::fmt::Debug for SlugCache<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlugCache")
            .field("dir", &self.dir)
            .field("keys", &self.store.keys())
            .field("from_memory", &self.from_memory)
            .finish()
    }
}
