// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Texel formats for textures.
//!
//! Each format fixes the number of channels, the data type per channel and the color space,
//! and therefore the number of bytes a single texel occupies in a tightly packed upload.
//!
//! # Available Formats
//!
//! ## Single Channel
//! - [`PixelFormat::R8Unorm`] - 8-bit normalized unsigned integer (0-255 mapped to 0.0-1.0)
//! - [`PixelFormat::R16Float`] - 16-bit half-precision float
//! - [`PixelFormat::R32Float`] - 32-bit single-precision float
//! - [`PixelFormat::R32Sint`] - 32-bit signed integer
//!
//! ## Multi-Channel
//! - [`PixelFormat::Rg32Float`] - 2-channel 32-bit float (8 bytes total)
//! - [`PixelFormat::Rgba8Unorm`] - 4-channel 8-bit normalized (4 bytes total)
//! - [`PixelFormat::Rgba8UnormSrgb`] - 4-channel 8-bit normalized with sRGB encoding
//! - [`PixelFormat::Bgra8UnormSrgb`] - 4-channel 8-bit normalized with sRGB encoding (BGRA order)
//! - [`PixelFormat::Rgba16Unorm`] - 4-channel 16-bit normalized (8 bytes total)
//! - [`PixelFormat::Rgba32Float`] - 4-channel 32-bit float (16 bytes total)
//!
//! # Examples
//!
//! ```
//! use dats_and_texs::pixel_formats::PixelFormat;
//!
//! // a 16x16 RGBA8 image is 1 KiB
//! assert_eq!(PixelFormat::Rgba8Unorm.bytes_for([16, 16, 1]), 1024);
//! ```

/*
Formats are a runtime enum rather than one zero-sized type per format.  Textures here are created
from a format chosen at runtime and transfers only need the texel size, so nothing is gained by
carrying the format in the type.
*/

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    R8Unorm,
    R16Float,
    R32Float,
    R32Sint,
    Rg32Float,
    Rgba8Unorm,
    Rgba8UnormSrgb,
    Bgra8UnormSrgb,
    Rgba16Unorm,
    Rgba32Float,
}

impl PixelFormat {
    /// Number of bytes per texel for this format.
    pub const fn bytes_per_texel(self) -> u8 {
        match self {
            PixelFormat::R8Unorm => 1,
            PixelFormat::R16Float => 2,
            PixelFormat::R32Float | PixelFormat::R32Sint => 4,
            PixelFormat::Rgba8Unorm
            | PixelFormat::Rgba8UnormSrgb
            | PixelFormat::Bgra8UnormSrgb => 4,
            PixelFormat::Rg32Float | PixelFormat::Rgba16Unorm => 8,
            PixelFormat::Rgba32Float => 16,
        }
    }

    /// Bytes occupied by a tightly packed block of `shape` texels.
    pub const fn bytes_for(self, shape: [u32; 3]) -> u64 {
        shape[0] as u64 * shape[1] as u64 * shape[2] as u64 * self.bytes_per_texel() as u64
    }
}
