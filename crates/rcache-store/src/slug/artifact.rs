//! Outputs a slug cache can store on disk.

use std::path::Path;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::body::ImageBody;
use crate::error::{Result, io_at};

/// A rendered value with a file representation.
///
/// The serde bounds let the slug cache snapshot its in-memory entries.
pub trait Artifact: Clone + Serialize + DeserializeOwned {
    /// Output file extension, without the dot.
    const EXTENSION: &'static str;

    fn write_to(&self, path: &Path) -> Result<()>;

    fn read_from(path: &Path) -> Result<Self>;
}

impl Artifact for ImageBody {
    const EXTENSION: &'static str = "png";

    fn write_to(&self, path: &Path) -> Result<()> {
        let png = self.encode_png()?;
        std::fs::write(path, png).map_err(io_at(path))
    }

    fn read_from(path: &Path) -> Result<Self> {
        ImageBody::open(path)
    }
}
