//! Resource cache: LRU entries backed by a snapshot and a staging directory.

use std::path::{Path, PathBuf};

use rcache_config::CacheSettings;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{Result, io_at};
use crate::lru::LruStore;
use crate::resource::{ResourceEntry, ResourceLoader, Source, resource_key};
use crate::snapshot::{SnapshotStore, remove_if_exists};

/// Where an instance is in its load lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheState {
    /// Snapshot not read yet.
    NotLoaded,
    /// Refresh in progress.
    Loading,
    /// Refresh in progress after a corrupt snapshot was discarded.
    Rebuilding,
    /// Snapshot (if any) has been read.
    Ready,
}

/// What a call to [`ResourceCache::refresh`] did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RefreshReport {
    /// Snapshot was deleted because purge on startup is set.
    pub purged: bool,
    /// Entries were read from the snapshot.
    pub loaded_snapshot: bool,
    /// The snapshot was corrupt and has been discarded.
    pub rebuilt: bool,
    /// Source files merged into the cache.
    pub ingested: usize,
    /// Ingested sources that failed to decode.
    pub substituted: usize,
    /// Entries dropped to stay within capacity.
    pub evicted: usize,
    /// Snapshot was written.
    pub saved: bool,
    /// Source files deleted from the staging directory.
    pub removed_sources: usize,
    /// Entries in the cache afterwards.
    pub entries: usize,
}

/// Image cache with LRU eviction and snapshot persistence.
///
/// The cache directory is a staging area: `refresh` imports whatever image
/// files it finds there and, outside debug mode, deletes them once the
/// snapshot holding their decoded contents has been written.
pub struct ResourceCache {
    settings: CacheSettings,
    store: LruStore<String, ResourceEntry>,
    snapshot: SnapshotStore,
    loader: ResourceLoader,
    state: CacheState,
}

impl ResourceCache {
    /// Prepare the cache directories and create an empty, unloaded cache.
    pub fn open(settings: CacheSettings) -> Result<Self> {
        settings.validate()?;
        settings.prepare(false)?;
        let loader = ResourceLoader::from_settings(&settings)?;
        let snapshot = SnapshotStore::for_cache_dir(&settings.cache_dir);

        debug!(
            cache_dir = %settings.cache_dir.display(),
            capacity = settings.cache_max,
            snapshot = %snapshot.path().display(),
            "Opened resource cache"
        );

        Ok(Self {
            store: LruStore::new(settings.cache_max),
            settings,
            snapshot,
            loader,
            state: CacheState::NotLoaded,
        })
    }

    pub fn settings(&self) -> &CacheSettings {
        &self.settings
    }

    pub fn state(&self) -> CacheState {
        self.state
    }

    pub fn snapshot_path(&self) -> &Path {
        self.snapshot.path()
    }

    /// Image substituted for undecodable sources.
    pub fn error_body(&self) -> &crate::ImageBody {
        self.loader.error_body()
    }

    /// Look up an entry and mark it most recently used. `None` is a miss.
    pub fn get(&mut self, key: &str) -> Option<&ResourceEntry> {
        self.store.get(key)
    }

    /// Look up an entry without touching recency.
    pub fn peek(&self, key: &str) -> Option<&ResourceEntry> {
        self.store.peek(key)
    }

    pub fn put(&mut self, key: impl Into<String>, entry: ResourceEntry) {
        self.store.put(key.into(), entry);
    }

    pub fn update<I>(&mut self, entries: I) -> &mut Self
    where
        I: IntoIterator<Item = (String, ResourceEntry)>,
    {
        self.store.update(entries);
        self
    }

    /// Keys, oldest-first.
    pub fn keys(&self) -> Vec<String> {
        self.store.keys()
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    pub fn trim(&mut self) -> usize {
        self.store.trim()
    }

    /// Trim and write the snapshot.
    pub fn save(&mut self) -> Result<()> {
        info!(path = %self.snapshot.path().display(), "Saving cache snapshot");
        self.snapshot.save(&mut self.store)
    }

    /// Read the snapshot once per instance.
    ///
    /// Snapshot entries become the older part of the cache; anything already
    /// in memory is replayed on top. Returns whether a snapshot was read.
    /// A corrupt snapshot is reported as [`crate::CacheError::Corrupt`] and
    /// left in place; `refresh` is the place that recovers from it.
    pub fn load(&mut self) -> Result<bool> {
        if self.state == CacheState::Ready {
            return Ok(false);
        }
        let loaded = self.load_snapshot()?;
        self.state = CacheState::Ready;
        Ok(loaded)
    }

    fn load_snapshot(&mut self) -> Result<bool> {
        let Some(mut loaded) = self.snapshot.load(self.settings.cache_max)? else {
            return Ok(false);
        };
        info!(entries = loaded.len(), "Loading cache from snapshot");
        loaded.update(self.store.drain());
        self.store = loaded;
        Ok(true)
    }

    /// Empty the cache; with `persistent`, also delete the snapshot.
    pub fn clear(&mut self, persistent: bool) -> Result<()> {
        self.store.clear();
        if persistent {
            self.snapshot.remove()?;
            self.state = CacheState::NotLoaded;
        }
        Ok(())
    }

    /// Load one source and merge it straight into the cache.
    ///
    /// Returns the key it was stored under.
    pub fn load_image(&mut self, source: Source, filename: &str) -> Result<String> {
        let loaded = self.loader.load(source, filename)?;
        self.store.put(loaded.key.clone(), loaded.entry);
        Ok(loaded.key)
    }

    /// Decode a placeholder entry from its staged source file.
    ///
    /// Entries that already have a body are returned as they are.
    pub fn resolve(&mut self, key: &str) -> Result<Option<&ResourceEntry>> {
        let pending = match self.store.get(key) {
            None => return Ok(None),
            Some(entry) if entry.is_placeholder() => Some(entry.filename.clone()),
            Some(_) => None,
        };

        if let Some(filename) = pending {
            let path = self.settings.cache_dir.join(&filename);
            let loaded = self.loader.load(Source::open(&path)?, &filename)?;
            if let Some(entry) = self.store.get_mut(key) {
                entry.body = loaded.entry.body;
            }
        }

        Ok(self.store.peek(key))
    }

    /// Bring the cache up to date with the snapshot and the staging directory.
    ///
    /// Corrupt snapshots and undecodable sources are recovered from here;
    /// only filesystem failures are returned as errors.
    pub fn refresh(&mut self, resave: bool) -> Result<RefreshReport> {
        let mut report = RefreshReport::default();

        if self.state == CacheState::NotLoaded {
            if self.settings.purge_cache_on_startup && self.snapshot.exists() {
                info!("Purging cache snapshot on startup");
                report.purged = self.snapshot.remove()?;
            }

            self.state = CacheState::Loading;
            match self.load_snapshot() {
                Ok(loaded) => {
                    report.loaded_snapshot = loaded;
                    if !loaded {
                        debug!("No snapshot, loading cache from file system");
                    }
                }
                Err(e) if e.is_corruption() => {
                    warn!(error = %e, "Cache snapshot damaged, rebuilding from source directory");
                    self.snapshot.remove()?;
                    self.state = CacheState::Rebuilding;
                    report.rebuilt = true;
                }
                Err(e) => {
                    self.state = CacheState::NotLoaded;
                    return Err(e);
                }
            }
        }

        report.evicted += self.store.trim();

        let staged = self.ingest(&mut report)?;

        if report.ingested > 0 || resave {
            self.save()?;
            report.saved = true;
        }

        if !self.settings.debug_images {
            for path in &staged {
                if remove_if_exists(path)? {
                    report.removed_sources += 1;
                }
            }
        }

        self.state = CacheState::Ready;
        report.entries = self.store.len();
        info!(
            ingested = report.ingested,
            substituted = report.substituted,
            evicted = report.evicted,
            rebuilt = report.rebuilt,
            saved = report.saved,
            entries = report.entries,
            "Refreshed resource cache"
        );
        Ok(report)
    }

    /// Import every file in the staging directory.
    ///
    /// Returns the source files whose contents are now held in memory; they
    /// may be deleted once the snapshot is written.
    fn ingest(&mut self, report: &mut RefreshReport) -> Result<Vec<PathBuf>> {
        let files = staged_files(&self.settings.cache_dir)?;
        if files.is_empty() {
            return Ok(Vec::new());
        }
        info!(count = files.len(), "Importing new images");

        let mut batch = Vec::with_capacity(files.len());
        let mut decoded = Vec::new();
        for (filename, path) in files {
            if self.settings.preload {
                let loaded = self.loader.load(Source::open(&path)?, &filename)?;
                if loaded.substituted {
                    report.substituted += 1;
                }
                batch.push((loaded.key, loaded.entry));
                decoded.push(path);
            } else {
                // Lazy sources stay staged; skip the ones already recorded,
                // decoded or not.
                let key = resource_key(&filename).to_string();
                let known = self
                    .store
                    .peek(&key)
                    .is_some_and(|e| e.filename == filename);
                if known {
                    continue;
                }
                batch.push((key, ResourceEntry::placeholder(filename)));
            }
            report.ingested += 1;
        }

        for (key, entry) in batch {
            report.evicted += self.store.put(key, entry);
        }
        Ok(decoded)
    }
}

impl std::fmt::Debug for ResourceCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceCache")
            .field("cache_dir", &self.settings.cache_dir)
            .field("state", &self.state)
            .field("store", &self.store)
            .finish()
    }
}

/// Regular files in `dir` with UTF-8 names, sorted by name.
fn staged_files(dir: &Path) -> Result<Vec<(String, PathBuf)>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(io_at(dir))? {
        let entry = entry.map_err(io_at(dir))?;
        let path = entry.path();
        if !entry.file_type().map_err(io_at(&path))?.is_file() {
            continue;
        }
        match entry.file_name().into_string() {
            Ok(name) => files.push((name, path)),
            Err(name) => warn!(name = ?name, "Skipping source with non UTF-8 name"),
        }
    }
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ImageBody;
    use image::{DynamicImage, RgbaImage};

    fn settings(root: &Path) -> CacheSettings {
        CacheSettings::in_dir(root.join(".imgcache"))
    }

    fn write_png(path: &Path, color: [u8; 4]) -> ImageBody {
        let image = RgbaImage::from_pixel(3, 2, image::Rgba(color));
        image.save(path).unwrap();
        ImageBody::from_image(DynamicImage::ImageRgba8(image))
    }

    #[test]
    fn test_open_prepares_dirs() {
        let root = tempfile::tempdir().unwrap();
        let cache = ResourceCache::open(settings(root.path())).unwrap();
        assert!(cache.settings().cache_dir.is_dir());
        assert!(cache.settings().error_dir.is_dir());
        assert_eq!(cache.state(), CacheState::NotLoaded);
        assert_eq!(cache.snapshot_path(), root.path().join(".imgcache.bin"));
    }

    #[test]
    fn test_get_missing_is_none() {
        let root = tempfile::tempdir().unwrap();
        let mut cache = ResourceCache::open(settings(root.path())).unwrap();
        assert!(cache.get("missing").is_none());
    }

    #[test]
    fn test_load_image_merges_into_cache() {
        let root = tempfile::tempdir().unwrap();
        let mut cache = ResourceCache::open(settings(root.path())).unwrap();
        let image = RgbaImage::from_pixel(1, 1, image::Rgba([5, 5, 5, 255]));

        let key = cache
            .load_image(DynamicImage::ImageRgba8(image).into(), "dot.png")
            .unwrap();
        assert_eq!(key, "dot");
        let entry = cache.get("dot").unwrap();
        assert_eq!(entry.filename, "dot.png");
        assert_eq!(entry.body.as_ref().unwrap().dimensions(), (1, 1));
    }

    #[test]
    fn test_refresh_empty_dir_is_noop() {
        let root = tempfile::tempdir().unwrap();
        let mut cache = ResourceCache::open(settings(root.path())).unwrap();

        let report = cache.refresh(false).unwrap();
        assert_eq!(report.ingested, 0);
        assert!(!report.saved);
        assert!(!cache.snapshot_path().exists());
        assert_eq!(cache.state(), CacheState::Ready);
    }

    #[test]
    fn test_refresh_resave_writes_empty_snapshot() {
        let root = tempfile::tempdir().unwrap();
        let mut cache = ResourceCache::open(settings(root.path())).unwrap();

        let report = cache.refresh(true).unwrap();
        assert!(report.saved);
        assert!(cache.snapshot_path().exists());
    }

    #[test]
    fn test_refresh_ingests_and_removes_sources() {
        let root = tempfile::tempdir().unwrap();
        let mut cache = ResourceCache::open(settings(root.path())).unwrap();
        let source = cache.settings().cache_dir.join("good.png");
        let expected = write_png(&source, [10, 20, 30, 255]);

        let report = cache.refresh(false).unwrap();
        assert_eq!(report.ingested, 1);
        assert_eq!(report.removed_sources, 1);
        assert!(report.saved);
        assert!(!source.exists());
        assert_eq!(cache.get("good").unwrap().body.as_ref(), Some(&expected));
    }

    #[test]
    fn test_refresh_is_idempotent() {
        let root = tempfile::tempdir().unwrap();
        let mut cache = ResourceCache::open(settings(root.path())).unwrap();
        write_png(&cache.settings().cache_dir.join("a.png"), [1, 1, 1, 255]);

        cache.refresh(false).unwrap();
        let modified = std::fs::metadata(cache.snapshot_path()).unwrap().modified().unwrap();

        let second = cache.refresh(false).unwrap();
        assert_eq!(second.ingested, 0);
        assert!(!second.saved);
        assert!(!second.loaded_snapshot);
        assert_eq!(cache.keys(), vec!["a"]);
        assert_eq!(
            std::fs::metadata(cache.snapshot_path()).unwrap().modified().unwrap(),
            modified
        );
    }

    #[test]
    fn test_without_preload_stores_placeholders_and_keeps_sources() {
        let root = tempfile::tempdir().unwrap();
        let mut cache = ResourceCache::open(settings(root.path()).with_preload(false)).unwrap();
        let source = cache.settings().cache_dir.join("lazy.png");
        let expected = write_png(&source, [7, 7, 7, 255]);

        let report = cache.refresh(false).unwrap();
        assert_eq!(report.ingested, 1);
        assert_eq!(report.removed_sources, 0);
        assert!(source.exists());
        assert!(cache.peek("lazy").unwrap().is_placeholder());

        let again = cache.refresh(false).unwrap();
        assert_eq!(again.ingested, 0);

        let resolved = cache.resolve("lazy").unwrap().unwrap();
        assert_eq!(resolved.body.as_ref(), Some(&expected));
        assert!(cache.resolve("absent").unwrap().is_none());
    }

    #[test]
    fn test_refresh_keeps_resolved_lazy_entry() {
        let root = tempfile::tempdir().unwrap();
        let mut cache = ResourceCache::open(settings(root.path()).with_preload(false)).unwrap();
        let expected = write_png(&cache.settings().cache_dir.join("lazy.png"), [3, 4, 5, 255]);

        cache.refresh(false).unwrap();
        cache.resolve("lazy").unwrap();
        let modified = std::fs::metadata(cache.snapshot_path()).unwrap().modified().unwrap();

        let report = cache.refresh(false).unwrap();
        assert_eq!(report.ingested, 0);
        assert!(!report.saved);
        assert_eq!(cache.peek("lazy").unwrap().body.as_ref(), Some(&expected));
        assert_eq!(
            std::fs::metadata(cache.snapshot_path()).unwrap().modified().unwrap(),
            modified
        );
    }

    #[test]
    fn test_debug_mode_keeps_sources() {
        let root = tempfile::tempdir().unwrap();
        let mut cache =
            ResourceCache::open(settings(root.path()).with_debug_images(true)).unwrap();
        let source = cache.settings().cache_dir.join("keep.png");
        write_png(&source, [0, 0, 0, 255]);

        let report = cache.refresh(false).unwrap();
        assert_eq!(report.removed_sources, 0);
        assert!(source.exists());
    }

    #[test]
    fn test_new_instance_loads_snapshot() {
        let root = tempfile::tempdir().unwrap();
        let mut first = ResourceCache::open(settings(root.path())).unwrap();
        let expected = write_png(&first.settings().cache_dir.join("p.png"), [9, 8, 7, 255]);
        first.refresh(false).unwrap();

        let mut second = ResourceCache::open(settings(root.path())).unwrap();
        let report = second.refresh(false).unwrap();
        assert!(report.loaded_snapshot);
        assert_eq!(second.get("p").unwrap().body.as_ref(), Some(&expected));
    }

    #[test]
    fn test_load_keeps_entries_added_before() {
        let root = tempfile::tempdir().unwrap();
        let mut first = ResourceCache::open(settings(root.path())).unwrap();
        first.put("old", ResourceEntry::placeholder("old.png"));
        first.save().unwrap();

        let mut second = ResourceCache::open(settings(root.path())).unwrap();
        second.put("new", ResourceEntry::placeholder("new.png"));
        assert!(second.load().unwrap());
        assert_eq!(second.keys(), vec!["old", "new"]);
        assert!(!second.load().unwrap());
    }

    #[test]
    fn test_purge_on_startup() {
        let root = tempfile::tempdir().unwrap();
        let mut first = ResourceCache::open(settings(root.path())).unwrap();
        first.put("stale", ResourceEntry::placeholder("stale.png"));
        first.save().unwrap();

        let mut second =
            ResourceCache::open(settings(root.path()).with_purge_on_startup(true)).unwrap();
        let report = second.refresh(false).unwrap();
        assert!(report.purged);
        assert!(!report.loaded_snapshot);
        assert!(second.is_empty());
        assert!(!second.snapshot_path().exists());
    }

    #[test]
    fn test_clear_persistent_removes_snapshot() {
        let root = tempfile::tempdir().unwrap();
        let mut cache = ResourceCache::open(settings(root.path())).unwrap();
        cache.put("x", ResourceEntry::placeholder("x.png"));
        cache.save().unwrap();

        cache.clear(false).unwrap();
        assert!(cache.is_empty());
        assert!(cache.snapshot_path().exists());

        cache.put("x", ResourceEntry::placeholder("x.png"));
        cache.clear(true).unwrap();
        assert!(cache.keys().is_empty());
        assert!(!cache.snapshot_path().exists());
    }

    #[test]
    fn test_load_reports_corruption() {
        let root = tempfile::tempdir().unwrap();
        let mut cache = ResourceCache::open(settings(root.path())).unwrap();
        std::fs::write(cache.snapshot_path(), b"junk").unwrap();

        let err = cache.load().unwrap_err();
        assert!(err.is_corruption());
        assert!(cache.snapshot_path().exists());
    }
}
