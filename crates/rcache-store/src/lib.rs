//! Image resource cache for rcache.
//!
//! This crate provides:
//! - [`LruStore`]: capacity-bounded store with least-recently-used eviction
//! - [`SnapshotStore`]: checksummed single-file persistence of a store
//! - [`ResourceLoader`]: decoding with fallback-image substitution
//! - [`ResourceCache`]: the staging-directory ingestion pipeline
//! - [`SlugCache`]: memoization of rendered images by call fingerprint
//!
//! Everything is synchronous and owned by a single caller; share a cache
//! across threads by wrapping it yourself.

mod body;
mod cache;
mod error;
mod lru;
mod resource;
pub mod slug;
mod snapshot;

pub use body::ImageBody;
pub use cache::{CacheState, RefreshReport, ResourceCache};
pub use error::{CacheError, Result};
pub use crate::lru::LruStore;
pub use resource::{Loaded, ResourceEntry, ResourceLoader, Source, resource_key};
pub use slug::{Artifact, Fingerprint, ImageSlugCache, SlugArgs, SlugCache, SlugValue, fingerprint};
pub use snapshot::{SNAPSHOT_EXTENSION, SNAPSHOT_MAGIC, SNAPSHOT_VERSION, SnapshotStore, snapshot_path};

// Re-export for callers that build sources or convert bodies.
pub use image;
