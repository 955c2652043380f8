// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
use crate::imp::wgpu::pixel_format::wgpu_format;
use crate::imp::wgpu::{BoundDevice, Error};
use crate::pixel_formats::PixelFormat;
use crate::texture::TexDims;
use wgpu::{Extent3d, TextureDescriptor, TextureDimension, TextureUsages};

#[derive(Debug, Clone)]
pub struct GpuImage {
    pub(super) texture: wgpu::Texture,
    pub(super) format: PixelFormat,
}

impl GpuImage {
    pub fn new(
        device: &BoundDevice,
        label: &str,
        dims: TexDims,
        extent: [u32; 3],
        format: PixelFormat,
    ) -> Result<Self, Error> {
        let dimension = match dims {
            TexDims::D1 => TextureDimension::D1,
            TexDims::D2 => TextureDimension::D2,
            TexDims::D3 => TextureDimension::D3,
        };
        let descriptor = TextureDescriptor {
            label: Some(label),
            size: Extent3d {
                width: extent[0],
                height: extent[1],
                depth_or_array_layers: extent[2],
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension,
            format: wgpu_format(format),
            usage: TextureUsages::COPY_SRC
                | TextureUsages::COPY_DST
                | TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        };
        let texture = device.validated(|| device.device.create_texture(&descriptor))?;
        Ok(GpuImage { texture, format })
    }

    pub(super) fn copy_info(&self, origin: [u32; 3]) -> wgpu::TexelCopyTextureInfo<'_> {
        wgpu::TexelCopyTextureInfo {
            texture: &self.texture,
            mip_level: 0,
            origin: wgpu::Origin3d {
                x: origin[0],
                y: origin[1],
                z: origin[2],
            },
            aspect: wgpu::TextureAspect::All,
        }
    }
}
