// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Logical allocations: dats (buffer data) and texs (texture data).

use crate::buffer::{BufferRegions, BufferType};
use crate::texture::Texture;

/// How a dat is backed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DatFlags {
    /// Give the dat a dedicated buffer instead of a slice of the shared one.
    pub standalone: bool,
}

impl DatFlags {
    pub const SHARED: DatFlags = DatFlags { standalone: false };
    pub const STANDALONE: DatFlags = DatFlags { standalone: true };
}

/// A logically sized buffer allocation.
///
/// With `count > 1` the dat is a ring with one slot per frame in flight.
#[derive(Debug)]
pub struct Dat {
    pub(crate) id: u64,
    pub(crate) regions: BufferRegions,
    flags: DatFlags,
}

impl Dat {
    pub(crate) fn new(id: u64, regions: BufferRegions, flags: DatFlags) -> Self {
        Dat { id, regions, flags }
    }

    pub fn regions(&self) -> &BufferRegions {
        &self.regions
    }

    pub fn buffer_type(&self) -> BufferType {
        self.regions.buffer_type()
    }

    pub fn size(&self) -> u64 {
        self.regions.size()
    }

    pub fn count(&self) -> u32 {
        self.regions.count()
    }

    pub fn flags(&self) -> DatFlags {
        self.flags
    }

    pub fn is_alive(&self) -> bool {
        self.regions.is_alive()
    }
}

/// A logically sized texture allocation.
#[derive(Debug)]
pub struct Tex {
    texture: Texture,
}

impl Tex {
    pub(crate) fn new(texture: Texture) -> Self {
        Tex { texture }
    }

    pub fn texture(&self) -> &Texture {
        &self.texture
    }

    pub fn is_alive(&self) -> bool {
        self.texture.is_alive()
    }
}
