//! Turning source images into cache entries.
//!
//! A [`Source`] is either an image that is already decoded or a byte handle
//! that still needs decoding. [`ResourceLoader::load`] takes ownership of the
//! source, so the handle is closed on every path out of the loader.

use std::fs::File;
use std::io::{BufReader, Cursor, Read};
use std::path::{Path, PathBuf};

use image::DynamicImage;
use rcache_config::CacheSettings;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::body::ImageBody;
use crate::error::{Result, io_at};

/// Input to the loader.
pub enum Source {
    /// Decoded image, accepted as-is.
    Decoded(DynamicImage),
    /// Encoded bytes still to be decoded.
    Raw(Box<dyn Read>),
}

impl Source {
    /// Open a file as a raw source.
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(io_at(path))?;
        Ok(Source::Raw(Box::new(BufReader::new(file))))
    }

    /// Wrap in-memory encoded bytes.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Source::Raw(Box::new(Cursor::new(bytes)))
    }
}

impl From<DynamicImage> for Source {
    fn from(image: DynamicImage) -> Self {
        Source::Decoded(image)
    }
}

impl std::fmt::Debug for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Source::Decoded(image) => f
                .debug_tuple("Decoded")
                .field(&(image.width(), image.height()))
                .finish(),
            Source::Raw(_) => f.write_str("Raw(..)"),
        }
    }
}

/// Entry stored in the resource cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceEntry {
    /// Original file name, including extension.
    pub filename: String,

    /// Decoded image. `None` marks a placeholder whose decode was deferred.
    pub body: Option<ImageBody>,
}

impl ResourceEntry {
    /// Entry with a decoded body.
    pub fn new(filename: impl Into<String>, body: ImageBody) -> Self {
        Self {
            filename: filename.into(),
            body: Some(body),
        }
    }

    /// Entry that only records the file name.
    pub fn placeholder(filename: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            body: None,
        }
    }

    /// Whether the body has not been decoded yet.
    pub fn is_placeholder(&self) -> bool {
        self.body.is_none()
    }
}

/// Cache key for a file name: the text before the first `.`.
///
/// Names starting with a dot fall back to the whole name so they still get a
/// non-empty key.
pub fn resource_key(filename: &str) -> &str {
    match filename.split('.').next() {
        Some(stem) if !stem.is_empty() => stem,
        _ => filename,
    }
}

/// Result of loading one source.
#[derive(Debug, Clone)]
pub struct Loaded {
    pub key: String,
    pub entry: ResourceEntry,
    /// The source failed to decode and the fallback image was used.
    pub substituted: bool,
}

/// Decodes sources, substituting a fallback image when decoding fails.
#[derive(Debug, Clone)]
pub struct ResourceLoader {
    error_body: ImageBody,
    error_dir: PathBuf,
    debug_images: bool,
}

impl ResourceLoader {
    /// Create a loader with an explicit fallback image.
    pub fn new(error_body: ImageBody, error_dir: impl Into<PathBuf>, debug_images: bool) -> Self {
        Self {
            error_body,
            error_dir: error_dir.into(),
            debug_images,
        }
    }

    /// Create a loader from settings, reading the fallback image once.
    pub fn from_settings(settings: &CacheSettings) -> Result<Self> {
        let error_body = match &settings.error_image {
            Some(path) => {
                debug!(path = %path.display(), "Loading error image");
                ImageBody::open(path)?
            }
            None => ImageBody::fallback(),
        };
        Ok(Self::new(
            error_body,
            &settings.error_dir,
            settings.debug_images,
        ))
    }

    /// The image substituted for undecodable sources.
    pub fn error_body(&self) -> &ImageBody {
        &self.error_body
    }

    /// Produce an entry for `source`, keyed by the base name of `filename`.
    ///
    /// Decode failures are not errors: the fallback image becomes the body
    /// and, in debug mode, the offending bytes are written to the error
    /// directory under `filename`. Failing to read the source or to write
    /// that copy is an error.
    pub fn load(&self, source: Source, filename: &str) -> Result<Loaded> {
        let key = resource_key(filename).to_string();

        let (body, substituted) = match source {
            Source::Decoded(image) => (ImageBody::from_image(image), false),
            Source::Raw(mut reader) => {
                let mut bytes = Vec::new();
                reader
                    .read_to_end(&mut bytes)
                    .map_err(io_at(Path::new(filename)))?;
                drop(reader);

                match ImageBody::decode(&bytes) {
                    Ok(body) => (body, false),
                    Err(e) => {
                        warn!(filename, error = %e, "Failed to decode image, substituting error image");
                        if self.debug_images {
                            self.capture(filename, &bytes)?;
                        }
                        (self.error_body.clone(), true)
                    }
                }
            }
        };

        debug!(key = %key, filename, substituted, "Loaded resource");
        Ok(Loaded {
            key,
            entry: ResourceEntry::new(filename, body),
            substituted,
        })
    }

    /// Keep a copy of an undecodable source for inspection.
    fn capture(&self, filename: &str, bytes: &[u8]) -> Result<()> {
        let name = Path::new(filename)
            .file_name()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(filename));
        let dest = self.error_dir.join(name);
        std::fs::create_dir_all(&self.error_dir).map_err(io_at(&self.error_dir))?;
        std::fs::write(&dest, bytes).map_err(io_at(&dest))?;
        debug!(path = %dest.display(), "Captured undecodable source");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CacheError;
    use image::RgbaImage;

    fn png_bytes(color: [u8; 4]) -> Vec<u8> {
        let image = RgbaImage::from_pixel(4, 4, image::Rgba(color));
        ImageBody::from_image(DynamicImage::ImageRgba8(image))
            .encode_png()
            .unwrap()
    }

    fn loader(error_dir: &Path, debug_images: bool) -> ResourceLoader {
        ResourceLoader::new(ImageBody::fallback(), error_dir, debug_images)
    }

    #[test]
    fn test_resource_key() {
        assert_eq!(resource_key("good.png"), "good");
        assert_eq!(resource_key("archive.tar.gz"), "archive");
        assert_eq!(resource_key("noext"), "noext");
        assert_eq!(resource_key(".hidden"), ".hidden");
    }

    #[test]
    fn test_load_raw_png() {
        let dir = tempfile::tempdir().unwrap();
        let bytes = png_bytes([1, 2, 3, 255]);

        let loaded = loader(dir.path(), false)
            .load(Source::from_bytes(bytes.clone()), "good.png")
            .unwrap();
        assert_eq!(loaded.key, "good");
        assert_eq!(loaded.entry.filename, "good.png");
        assert!(!loaded.substituted);
        assert_eq!(loaded.entry.body, Some(ImageBody::decode(&bytes).unwrap()));
    }

    #[test]
    fn test_load_decoded_is_accepted_as_is() {
        let dir = tempfile::tempdir().unwrap();
        let image = RgbaImage::from_pixel(2, 3, image::Rgba([9, 9, 9, 255]));
        let expected = ImageBody::from_image(DynamicImage::ImageRgba8(image.clone()));

        let loaded = loader(dir.path(), false)
            .load(DynamicImage::ImageRgba8(image).into(), "made.png")
            .unwrap();
        assert_eq!(loaded.entry.body, Some(expected));
        assert!(!loaded.substituted);
    }

    #[test]
    fn test_bad_bytes_substitute_without_capture() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = loader(dir.path(), false)
            .load(Source::from_bytes(b"garbage".to_vec()), "bad.png")
            .unwrap();

        assert!(loaded.substituted);
        assert_eq!(loaded.entry.body, Some(ImageBody::fallback()));
        assert!(!dir.path().join("bad.png").exists());
    }

    #[test]
    fn test_bad_bytes_captured_in_debug_mode() {
        let dir = tempfile::tempdir().unwrap();
        let errors = dir.path().join("errors");
        let loaded = loader(&errors, true)
            .load(Source::from_bytes(b"garbage".to_vec()), "bad.png")
            .unwrap();

        assert!(loaded.substituted);
        assert_eq!(std::fs::read(errors.join("bad.png")).unwrap(), b"garbage");
    }

    #[test]
    fn test_custom_error_image() {
        let dir = tempfile::tempdir().unwrap();
        let err_path = dir.path().join("err.png");
        std::fs::write(&err_path, png_bytes([255, 0, 0, 255])).unwrap();

        let settings = CacheSettings::in_dir(dir.path().join(".imgcache")).with_error_image(&err_path);
        let loader = ResourceLoader::from_settings(&settings).unwrap();
        assert_eq!(loader.error_body(), &ImageBody::open(&err_path).unwrap());

        let loaded = loader
            .load(Source::from_bytes(vec![0; 8]), "x.png")
            .unwrap();
        assert_eq!(loaded.entry.body.as_ref(), Some(loader.error_body()));
    }

    #[test]
    fn test_missing_error_image_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let settings = CacheSettings::in_dir(dir.path().join(".imgcache"))
            .with_error_image(dir.path().join("missing.png"));
        assert!(matches!(
            ResourceLoader::from_settings(&settings),
            Err(CacheError::Io { .. })
        ));
    }

    #[test]
    fn test_read_failure_propagates() {
        struct Broken;
        impl Read for Broken {
            fn read(&mut self, _: &mut [u8]) -> std::io::Result<usize> {
                Err(std::io::Error::other("disk gone"))
            }
        }

        let dir = tempfile::tempdir().unwrap();
        let result = loader(dir.path(), false).load(Source::Raw(Box::new(Broken)), "b.png");
        assert!(matches!(result, Err(CacheError::Io { .. })));
    }

    #[test]
    fn test_placeholder() {
        let entry = ResourceEntry::placeholder("later.png");
        assert!(entry.is_placeholder());
        assert_eq!(entry.filename, "later.png");
    }
}
