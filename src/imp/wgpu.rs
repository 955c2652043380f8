// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! wgpu backend.
//!
//! wgpu tracks image layouts itself, so barriers are accepted and ignored.  Buffer-texture copies
//! are issued one row at a time so that tightly packed staging data never has to meet
//! `COPY_BYTES_PER_ROW_ALIGNMENT`.
//!
//! wgpu moves buffer bytes in whole 4-byte words.  Host transfers that start or end inside a word
//! cover the surrounding words and keep the bytes they do not own; buffer copies that cannot be
//! encoded go through the host the same way.

mod bound_device;
mod buffer;
mod commands;
mod error;
mod pixel_format;
mod sampler;
mod texture;

pub use bound_device::BoundDevice;
pub use buffer::GpuBuffer;
pub use commands::Commands;
pub use error::Error;
pub use sampler::GpuSampler;
pub use texture::GpuImage;

/// Whether wgpu can copy `size` bytes at `offset` directly.
fn is_word_aligned(offset: u64, size: u64) -> bool {
    offset % wgpu::COPY_BUFFER_ALIGNMENT == 0 && size % wgpu::COPY_BUFFER_ALIGNMENT == 0
}
