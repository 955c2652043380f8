// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
use crate::imp::wgpu::{BoundDevice, Error};
use crate::sampler::{AddressMode, Filter, SamplerConfig};
use wgpu::SamplerDescriptor;

fn filter(filter: Filter) -> wgpu::FilterMode {
    match filter {
        Filter::Nearest => wgpu::FilterMode::Nearest,
        Filter::Linear => wgpu::FilterMode::Linear,
    }
}

fn address_mode(mode: AddressMode) -> wgpu::AddressMode {
    match mode {
        AddressMode::ClampToEdge => wgpu::AddressMode::ClampToEdge,
        AddressMode::Repeat => wgpu::AddressMode::Repeat,
        AddressMode::MirrorRepeat => wgpu::AddressMode::MirrorRepeat,
    }
}

/// Owns the wgpu sampler for as long as the context keeps it.
#[derive(Debug)]
pub struct GpuSampler {
    _sampler: wgpu::Sampler,
}

impl GpuSampler {
    pub fn new(device: &BoundDevice, config: SamplerConfig) -> Result<Self, Error> {
        let [u, v, w] = config.address_mode.map(address_mode);
        let s = SamplerDescriptor {
            label: None,
            address_mode_u: u,
            address_mode_v: v,
            address_mode_w: w,
            mag_filter: filter(config.mag_filter),
            min_filter: filter(config.min_filter),
            mipmap_filter: wgpu::FilterMode::Nearest,
            lod_min_clamp: 0.0,
            lod_max_clamp: 14.0,
            compare: None,
            anisotropy_clamp: 1,
            border_color: None,
        };
        let sampler = device.validated(|| device.device.create_sampler(&s))?;
        Ok(GpuSampler { _sampler: sampler })
    }
}
