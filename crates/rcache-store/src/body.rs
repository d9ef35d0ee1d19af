//! Decoded image payload stored in cache entries.

use std::path::Path;

use image::codecs::png::PngEncoder;
use image::{DynamicImage, ExtendedColorType, ImageEncoder, ImageError, RgbaImage};
use serde::{Deserialize, Serialize};

use crate::error::{CacheError, Result, io_at};

/// Side length of the built-in fallback image.
const FALLBACK_SIZE: u32 = 16;

/// Side length of one checkerboard tile in the fallback image.
const FALLBACK_TILE: u32 = 4;

/// Fully materialized RGBA8 image.
///
/// Holds no file handle or decoder state, so entries can be cloned, compared
/// pixel by pixel and written into a snapshot. Converting to a
/// toolkit-native handle is left to the caller via [`ImageBody::to_dynamic`].
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawImageBody")]
pub struct ImageBody {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

/// Unchecked wire form; validated into [`ImageBody`] on deserialize.
#[derive(Deserialize)]
struct RawImageBody {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl TryFrom<RawImageBody> for ImageBody {
    type Error = String;

    fn try_from(raw: RawImageBody) -> std::result::Result<Self, Self::Error> {
        ImageBody::from_rgba(raw.width, raw.height, raw.pixels).map_err(|e| e.to_string())
    }
}

impl ImageBody {
    /// Wrap a raw RGBA8 buffer. Fails if the length does not match the size.
    pub fn from_rgba(width: u32, height: u32, pixels: Vec<u8>) -> Result<Self> {
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|n| n.checked_mul(4));
        if expected != Some(pixels.len()) {
            return Err(CacheError::InvalidBuffer {
                width,
                height,
                len: pixels.len(),
            });
        }
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    /// Materialize an already-decoded image.
    pub fn from_image(image: DynamicImage) -> Self {
        let rgba = image.into_rgba8();
        let (width, height) = rgba.dimensions();
        Self {
            width,
            height,
            pixels: rgba.into_raw(),
        }
    }

    /// Decode an encoded image (format sniffed from the bytes).
    pub fn decode(bytes: &[u8]) -> std::result::Result<Self, ImageError> {
        image::load_from_memory(bytes).map(Self::from_image)
    }

    /// Read and decode an image file.
    pub fn open(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path).map_err(io_at(path))?;
        Self::decode(&bytes).map_err(|source| CacheError::Image {
            name: path.display().to_string(),
            source,
        })
    }

    /// The built-in substitute for undecodable sources: a magenta and black
    /// checkerboard.
    pub fn fallback() -> Self {
        let image = RgbaImage::from_fn(FALLBACK_SIZE, FALLBACK_SIZE, |x, y| {
            if (x / FALLBACK_TILE + y / FALLBACK_TILE) % 2 == 0 {
                image::Rgba([255, 0, 255, 255])
            } else {
                image::Rgba([0, 0, 0, 255])
            }
        });
        Self::from_image(DynamicImage::ImageRgba8(image))
    }

    /// Encode as PNG.
    pub fn encode_png(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        PngEncoder::new(&mut buf)
            .write_image(
                &self.pixels,
                self.width,
                self.height,
                ExtendedColorType::Rgba8,
            )
            .map_err(|source| CacheError::Image {
                name: format!("{}x{} buffer", self.width, self.height),
                source,
            })?;
        Ok(buf)
    }

    /// Copy into an `image` buffer.
    pub fn to_rgba_image(&self) -> Result<RgbaImage> {
        RgbaImage::from_raw(self.width, self.height, self.pixels.clone()).ok_or(
            CacheError::InvalidBuffer {
                width: self.width,
                height: self.height,
                len: self.pixels.len(),
            },
        )
    }

    /// Copy into a `DynamicImage` for handing to a GUI toolkit.
    pub fn to_dynamic(&self) -> Result<DynamicImage> {
        self.to_rgba_image().map(DynamicImage::ImageRgba8)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Raw RGBA8 bytes, row-major.
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }
}

impl std::fmt::Debug for ImageBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageBody")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.pixels.len())
            .finish()
    }
}
