// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
Device-local images.

A [Texture] is a handle to an image owned by a [crate::Context].  Every texture has a resting
layout (`ShaderReadOnly`) it returns to between transfers; copies move it into a transfer layout
and back.  The current layout is tracked so that redundant transitions are never recorded.

Recorded transitions are pending until `submit` reports how the command list went.  A failed
submission may have stopped anywhere, so the tracked layout falls back to `Undefined` and the next
barrier is accepted from whatever layout the image is really in.
*/

use crate::error::{Error, Result};
use crate::imp::{BoundDevice, Commands, GpuImage};
use crate::pixel_formats::PixelFormat;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

/// Number of dimensions of a texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TexDims {
    D1,
    D2,
    D3,
}

impl TexDims {
    pub const fn count(self) -> usize {
        match self {
            TexDims::D1 => 1,
            TexDims::D2 => 2,
            TexDims::D3 => 3,
        }
    }

    /// Turns a requested shape into an extent: axes beyond the dimension count become 1,
    /// axes within it must be nonzero.
    pub fn extent(self, shape: [u32; 3]) -> Result<[u32; 3]> {
        let mut extent = [1; 3];
        for (axis, value) in shape.iter().enumerate().take(self.count()) {
            if *value == 0 {
                return Err(Error::ZeroSize);
            }
            extent[axis] = *value;
        }
        Ok(extent)
    }
}

impl TryFrom<u32> for TexDims {
    type Error = Error;

    fn try_from(value: u32) -> Result<Self> {
        match value {
            1 => Ok(TexDims::D1),
            2 => Ok(TexDims::D2),
            3 => Ok(TexDims::D3),
            other => Err(Error::InvalidDims(other)),
        }
    }
}

/// Memory layout an image is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageLayout {
    Undefined,
    General,
    TransferSrc,
    TransferDst,
    ShaderReadOnly,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug)]
struct TextureState {
    image: GpuImage,
    extent: [u32; 3],
    /// Layout as of the last submission that went through.
    layout: ImageLayout,
    /// Layout the recorded but unsubmitted barriers lead to.
    pending: Option<ImageLayout>,
}

impl TextureState {
    fn current(&self) -> ImageLayout {
        self.pending.unwrap_or(self.layout)
    }
}

/// Submits `commands`, then settles the tracked layout of every texture they transition.
pub(crate) fn submit(commands: Commands, textures: &[&TextureInner]) -> Result<()> {
    let result = commands.submit();
    for texture in textures {
        texture.settle(result.is_ok());
    }
    Ok(result?)
}

#[derive(Debug)]
pub(crate) struct TextureInner {
    label: String,
    dims: TexDims,
    format: PixelFormat,
    resting: ImageLayout,
    state: Mutex<TextureState>,
}

impl TextureInner {
    /// Creates the image and moves it from `Undefined` to its resting layout.
    pub(crate) fn new(
        device: &BoundDevice,
        label: String,
        dims: TexDims,
        shape: [u32; 3],
        format: PixelFormat,
    ) -> Result<Arc<Self>> {
        let extent = dims.extent(shape)?;
        let image = GpuImage::new(device, &label, dims, extent, format)?;
        let inner = Arc::new(TextureInner {
            label,
            dims,
            format,
            resting: ImageLayout::ShaderReadOnly,
            state: Mutex::new(TextureState {
                image,
                extent,
                layout: ImageLayout::Undefined,
                pending: None,
            }),
        });
        let mut commands = device.commands("texture initial layout");
        inner.transition(&mut commands, inner.resting);
        submit(commands, &[&*inner])?;
        Ok(inner)
    }

    /// Replaces the image with an empty one of a new shape.  Contents are lost.
    pub(crate) fn recreate(&self, device: &BoundDevice, shape: [u32; 3]) -> Result<()> {
        let extent = self.dims.extent(shape)?;
        let image = GpuImage::new(device, &self.label, self.dims, extent, self.format)?;
        {
            let mut state = lock(&self.state);
            state.image = image;
            state.extent = extent;
            state.layout = ImageLayout::Undefined;
            state.pending = None;
        }
        let mut commands = device.commands("texture initial layout");
        self.transition(&mut commands, self.resting);
        submit(commands, &[self])
    }

    pub(crate) fn image(&self) -> GpuImage {
        lock(&self.state).image.clone()
    }

    pub(crate) fn extent(&self) -> [u32; 3] {
        lock(&self.state).extent
    }

    pub(crate) fn format(&self) -> PixelFormat {
        self.format
    }

    /// Records a barrier into `layout` unless the image is already headed there.
    pub(crate) fn transition(&self, commands: &mut Commands, layout: ImageLayout) {
        let mut state = lock(&self.state);
        let current = state.current();
        if current == layout {
            return;
        }
        commands.barrier(&state.image, current, layout);
        state.pending = Some(layout);
    }

    fn settle(&self, submitted: bool) {
        let mut state = lock(&self.state);
        let Some(pending) = state.pending.take() else {
            return;
        };
        if submitted {
            state.layout = pending;
        } else {
            logwise::warn_sync!(
                "{label} is in an unknown layout after a failed submission",
                label = self.label.clone()
            );
            state.layout = ImageLayout::Undefined;
        }
    }

    /// Records a barrier back to the resting layout, unless that is `Undefined`.
    pub(crate) fn rest(&self, commands: &mut Commands) {
        if self.resting != ImageLayout::Undefined {
            self.transition(commands, self.resting);
        }
    }

    /// Fails unless texels of `other` can be copied into this texture.
    pub(crate) fn check_copy_from(&self, other: &TextureInner) -> Result<()> {
        if self.format != other.format {
            return Err(Error::FormatMismatch {
                src: other.format,
                dst: self.format,
            });
        }
        Ok(())
    }

    /// Fills in zero components of `shape` with the rest of the extent past `offset`, then
    /// checks that the region fits.
    pub(crate) fn region(&self, offset: [u32; 3], shape: [u32; 3]) -> Result<[u32; 3]> {
        let extent = self.extent();
        let mut full = shape;
        for axis in 0..3 {
            if full[axis] == 0 {
                full[axis] = extent[axis].saturating_sub(offset[axis]);
            }
            let end = offset[axis] as u64 + full[axis] as u64;
            if full[axis] == 0 || end > extent[axis] as u64 {
                return Err(Error::OutOfBounds {
                    offset: offset[axis] as u64,
                    end,
                    size: extent[axis] as u64,
                });
            }
        }
        Ok(full)
    }
}

/// Handle to a texture owned by a context.
#[derive(Debug, Clone)]
pub struct Texture {
    pub(crate) id: u64,
    inner: Weak<TextureInner>,
}

impl Texture {
    pub(crate) fn new(id: u64, inner: &Arc<TextureInner>) -> Self {
        Texture {
            id,
            inner: Arc::downgrade(inner),
        }
    }

    pub(crate) fn inner(&self) -> Result<Arc<TextureInner>> {
        self.inner.upgrade().ok_or(Error::StaleTexture)
    }

    pub fn is_alive(&self) -> bool {
        self.inner.strong_count() > 0
    }

    pub fn shape(&self) -> Result<[u32; 3]> {
        Ok(self.inner()?.extent())
    }

    pub fn dims(&self) -> Result<TexDims> {
        Ok(self.inner()?.dims)
    }

    pub fn format(&self) -> Result<PixelFormat> {
        Ok(self.inner()?.format)
    }

    /// Layout the image is in right now.
    pub fn layout(&self) -> Result<ImageLayout> {
        Ok(lock(&self.inner()?.state).layout)
    }

    pub(crate) fn same_as(&self, other: &Texture) -> bool {
        self.id == other.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extent_fills_unused_axes() {
        assert_eq!(TexDims::D1.extent([8, 0, 0]).unwrap(), [8, 1, 1]);
        assert_eq!(TexDims::D2.extent([8, 4, 9]).unwrap(), [8, 4, 1]);
        assert!(matches!(TexDims::D3.extent([8, 4, 0]), Err(Error::ZeroSize)));
    }

    #[test]
    fn dims_from_count() {
        assert_eq!(TexDims::try_from(2).unwrap(), TexDims::D2);
        assert!(matches!(TexDims::try_from(4), Err(Error::InvalidDims(4))));
    }

    #[test]
    #[cfg(not(feature = "backend_wgpu"))]
    fn full_region() {
        let device = BoundDevice::new().unwrap();
        let inner = TextureInner::new(
            &device,
            "t".to_string(),
            TexDims::D2,
            [4, 4, 1],
            PixelFormat::R8Unorm,
        )
        .unwrap();
        assert_eq!(inner.region([1, 2, 0], [0, 0, 0]).unwrap(), [3, 2, 1]);
        assert!(inner.region([0, 0, 0], [5, 1, 1]).is_err());
    }

    #[test]
    #[cfg(not(feature = "backend_wgpu"))]
    fn redundant_transition_skipped() {
        let device = BoundDevice::new().unwrap();
        let inner = TextureInner::new(
            &device,
            "t".to_string(),
            TexDims::D1,
            [4, 1, 1],
            PixelFormat::R8Unorm,
        )
        .unwrap();
        let mut commands = device.commands("test");
        inner.transition(&mut commands, ImageLayout::ShaderReadOnly);
        inner.transition(&mut commands, ImageLayout::TransferDst);
        inner.transition(&mut commands, ImageLayout::TransferDst);
        // nothing counts until it is submitted
        assert_eq!(lock(&inner.state).layout, ImageLayout::ShaderReadOnly);
        submit(commands, &[&*inner]).unwrap();
        assert_eq!(lock(&inner.state).layout, ImageLayout::TransferDst);
    }

    #[test]
    #[cfg(not(feature = "backend_wgpu"))]
    fn failed_submission_forgets_the_layout() {
        use crate::buffer::BufferType;
        use crate::imp::GpuBuffer;

        let device = BoundDevice::new().unwrap();
        let inner = TextureInner::new(
            &device,
            "t".to_string(),
            TexDims::D2,
            [2, 2, 1],
            PixelFormat::R8Unorm,
        )
        .unwrap();
        // too small to fill the image
        let staging = GpuBuffer::new(&device, "staging", 2, BufferType::Staging).unwrap();
        let mut commands = device.commands("short copy");
        inner.transition(&mut commands, ImageLayout::TransferDst);
        commands.copy_buffer_to_image(&staging, 0, &inner.image(), [0, 0, 0], [2, 2, 1]);
        inner.rest(&mut commands);
        assert!(submit(commands, &[&*inner]).is_err());
        assert_eq!(lock(&inner.state).layout, ImageLayout::Undefined);

        // the image is stuck in TransferDst, yet the next round trip goes through
        let staging = GpuBuffer::new(&device, "staging", 4, BufferType::Staging).unwrap();
        let mut commands = device.commands("full copy");
        inner.transition(&mut commands, ImageLayout::TransferDst);
        commands.copy_buffer_to_image(&staging, 0, &inner.image(), [0, 0, 0], [2, 2, 1]);
        inner.rest(&mut commands);
        submit(commands, &[&*inner]).unwrap();
        assert_eq!(lock(&inner.state).layout, ImageLayout::ShaderReadOnly);
    }
}
