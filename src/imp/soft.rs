// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
A device emulated in host memory.

Buffers are byte vectors, images are tightly packed texel arrays.  Command lists execute in order
when submitted, so every queue is idle as soon as `submit` returns.  Device-local buffers refuse
host access and images refuse copies made in the wrong layout, which keeps callers as honest as a
real driver would.
*/

use crate::buffer::BufferType;
use crate::imp::{MemoryKind, QueueKind};
use crate::pixel_formats::PixelFormat;
use crate::sampler::SamplerConfig;
use crate::texture::{ImageLayout, TexDims};
use std::sync::{Arc, Mutex, PoisonError};

/// Uniform offset alignment most desktop drivers report.
const MIN_UNIFORM_BUFFER_OFFSET_ALIGNMENT: u64 = 256;
/// wgpu's default `max_buffer_size`.
const MAX_BUFFER_SIZE: u64 = 1 << 28;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("buffer {label} is device-local and cannot be accessed from the host")]
    NotHostVisible { label: String },
    #[error("buffer {label} of {size} bytes exceeds the device limit of {max}")]
    BufferTooLarge { label: String, size: u64, max: u64 },
    #[error("range {offset}..{end} exceeds buffer {label} of size {size}")]
    BufferRange {
        label: String,
        offset: u64,
        end: u64,
        size: u64,
    },
    #[error("region at {origin:?} of shape {shape:?} exceeds image {label} of extent {extent:?}")]
    ImageRange {
        label: String,
        origin: [u32; 3],
        shape: [u32; 3],
        extent: [u32; 3],
    },
    #[error("image {label} is in layout {actual:?}, expected {expected:?}")]
    ImageLayout {
        label: String,
        expected: ImageLayout,
        actual: ImageLayout,
    },
    #[error("cannot copy between formats {src:?} and {dst:?}")]
    FormatMismatch { src: PixelFormat, dst: PixelFormat },
}

#[derive(Debug, Clone)]
pub struct BoundDevice {
    min_uniform_buffer_offset_alignment: u64,
    max_buffer_size: u64,
}

impl BoundDevice {
    pub fn new() -> Result<Self, Error> {
        logwise::info_sync!("binding software device");
        Ok(BoundDevice {
            min_uniform_buffer_offset_alignment: MIN_UNIFORM_BUFFER_OFFSET_ALIGNMENT,
            max_buffer_size: MAX_BUFFER_SIZE,
        })
    }

    pub fn max_buffer_size(&self) -> u64 {
        self.max_buffer_size
    }

    fn check_buffer_size(&self, label: &str, size: u64) -> Result<(), Error> {
        if size > self.max_buffer_size {
            return Err(Error::BufferTooLarge {
                label: label.to_string(),
                size,
                max: self.max_buffer_size,
            });
        }
        Ok(())
    }

    pub fn min_uniform_buffer_offset_alignment(&self) -> u64 {
        self.min_uniform_buffer_offset_alignment
    }

    /// Submissions execute synchronously, so there is never anything to wait for.
    pub fn wait_idle(&self, queue: QueueKind) {
        logwise::trace_sync!("wait_idle {queue}", queue = logwise::privacy::LogIt(&queue));
    }

    pub fn wait_device_idle(&self) {
        for queue in QueueKind::ALL {
            self.wait_idle(queue);
        }
    }

    pub fn commands(&self, label: &str) -> Commands {
        Commands {
            label: label.to_string(),
            commands: Vec::new(),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug)]
struct SoftBuffer {
    label: String,
    memory: MemoryKind,
    bytes: Vec<u8>,
}

impl SoftBuffer {
    fn range(&self, offset: u64, len: u64) -> Result<std::ops::Range<usize>, Error> {
        let size = self.bytes.len() as u64;
        match offset.checked_add(len) {
            Some(end) if end <= size => Ok(offset as usize..end as usize),
            end => Err(Error::BufferRange {
                label: self.label.clone(),
                offset,
                end: end.unwrap_or(u64::MAX),
                size,
            }),
        }
    }
}

#[derive(Debug, Clone)]
pub struct GpuBuffer {
    inner: Arc<Mutex<SoftBuffer>>,
}

impl GpuBuffer {
    pub fn new(
        device: &BoundDevice,
        label: &str,
        size: u64,
        buffer_type: BufferType,
    ) -> Result<Self, Error> {
        device.check_buffer_size(label, size)?;
        Ok(GpuBuffer {
            inner: Arc::new(Mutex::new(SoftBuffer {
                label: label.to_string(),
                memory: buffer_type.memory(),
                bytes: vec![0; size as usize],
            })),
        })
    }

    pub fn size(&self) -> u64 {
        lock(&self.inner).bytes.len() as u64
    }

    /// Grows or shrinks the buffer.  Bytes below the smaller of the two sizes are preserved.
    pub fn resize(&mut self, device: &BoundDevice, new_size: u64) -> Result<(), Error> {
        let mut buffer = lock(&self.inner);
        device.check_buffer_size(&buffer.label, new_size)?;
        buffer.bytes.resize(new_size as usize, 0);
        Ok(())
    }

    pub fn write(&self, _device: &BoundDevice, offset: u64, data: &[u8]) -> Result<(), Error> {
        let mut buffer = lock(&self.inner);
        if buffer.memory != MemoryKind::HostVisible {
            return Err(Error::NotHostVisible {
                label: buffer.label.clone(),
            });
        }
        let range = buffer.range(offset, data.len() as u64)?;
        buffer.bytes[range].copy_from_slice(data);
        Ok(())
    }

    pub fn read(&self, _device: &BoundDevice, offset: u64, out: &mut [u8]) -> Result<(), Error> {
        let buffer = lock(&self.inner);
        if buffer.memory != MemoryKind::HostVisible {
            return Err(Error::NotHostVisible {
                label: buffer.label.clone(),
            });
        }
        let range = buffer.range(offset, out.len() as u64)?;
        out.copy_from_slice(&buffer.bytes[range]);
        Ok(())
    }

    fn copy_out(&self, offset: u64, len: u64) -> Result<Vec<u8>, Error> {
        let buffer = lock(&self.inner);
        let range = buffer.range(offset, len)?;
        Ok(buffer.bytes[range].to_vec())
    }

    fn copy_in(&self, offset: u64, data: &[u8]) -> Result<(), Error> {
        let mut buffer = lock(&self.inner);
        let range = buffer.range(offset, data.len() as u64)?;
        buffer.bytes[range].copy_from_slice(data);
        Ok(())
    }
}

#[derive(Debug)]
struct SoftImage {
    label: String,
    extent: [u32; 3],
    format: PixelFormat,
    layout: ImageLayout,
    texels: Vec<u8>,
}

impl SoftImage {
    fn check_region(&self, origin: [u32; 3], shape: [u32; 3]) -> Result<(), Error> {
        let fits = (0..3).all(|i| origin[i] as u64 + shape[i] as u64 <= self.extent[i] as u64);
        if fits {
            Ok(())
        } else {
            Err(Error::ImageRange {
                label: self.label.clone(),
                origin,
                shape,
                extent: self.extent,
            })
        }
    }

    fn check_layout(&self, expected: ImageLayout) -> Result<(), Error> {
        if self.layout == expected || self.layout == ImageLayout::General {
            Ok(())
        } else {
            Err(Error::ImageLayout {
                label: self.label.clone(),
                expected,
                actual: self.layout,
            })
        }
    }

    /// Byte offset of each row in `shape`, starting at `origin`.
    fn rows(&self, origin: [u32; 3], shape: [u32; 3]) -> impl Iterator<Item = usize> + '_ {
        let bpp = self.format.bytes_per_texel() as usize;
        let [w, h, _] = self.extent.map(|e| e as usize);
        (0..shape[2] as usize).flat_map(move |z| {
            (0..shape[1] as usize).map(move |y| {
                let z = origin[2] as usize + z;
                let y = origin[1] as usize + y;
                ((z * h + y) * w + origin[0] as usize) * bpp
            })
        })
    }

    fn read_region(&self, origin: [u32; 3], shape: [u32; 3]) -> Vec<u8> {
        let row = shape[0] as usize * self.format.bytes_per_texel() as usize;
        let mut out = Vec::with_capacity(row * shape[1] as usize * shape[2] as usize);
        for start in self.rows(origin, shape) {
            out.extend_from_slice(&self.texels[start..start + row]);
        }
        out
    }

    fn write_region(&mut self, origin: [u32; 3], shape: [u32; 3], data: &[u8]) {
        let row = shape[0] as usize * self.format.bytes_per_texel() as usize;
        let starts: Vec<usize> = self.rows(origin, shape).collect();
        for (start, chunk) in starts.into_iter().zip(data.chunks_exact(row)) {
            self.texels[start..start + row].copy_from_slice(chunk);
        }
    }
}

#[derive(Debug, Clone)]
pub struct GpuImage {
    inner: Arc<Mutex<SoftImage>>,
}

impl GpuImage {
    pub fn new(
        _device: &BoundDevice,
        label: &str,
        _dims: TexDims,
        extent: [u32; 3],
        format: PixelFormat,
    ) -> Result<Self, Error> {
        let len = format.bytes_for(extent) as usize;
        Ok(GpuImage {
            inner: Arc::new(Mutex::new(SoftImage {
                label: label.to_string(),
                extent,
                format,
                layout: ImageLayout::Undefined,
                texels: vec![0; len],
            })),
        })
    }
}

/// Sampling never happens on this device, so there is nothing to keep.
#[derive(Debug)]
pub struct GpuSampler;

impl GpuSampler {
    pub fn new(_device: &BoundDevice, _config: SamplerConfig) -> Result<Self, Error> {
        Ok(GpuSampler)
    }
}

#[derive(Debug)]
enum Command {
    CopyBuffer {
        src: GpuBuffer,
        src_offset: u64,
        dst: GpuBuffer,
        dst_offset: u64,
        size: u64,
    },
    BufferToImage {
        src: GpuBuffer,
        src_offset: u64,
        dst: GpuImage,
        origin: [u32; 3],
        shape: [u32; 3],
    },
    ImageToBuffer {
        src: GpuImage,
        origin: [u32; 3],
        shape: [u32; 3],
        dst: GpuBuffer,
        dst_offset: u64,
    },
    CopyImage {
        src: GpuImage,
        src_origin: [u32; 3],
        dst: GpuImage,
        dst_origin: [u32; 3],
        shape: [u32; 3],
    },
    Barrier {
        image: GpuImage,
        old: ImageLayout,
        new: ImageLayout,
    },
}

impl Command {
    fn execute(self) -> Result<(), Error> {
        match self {
            Command::CopyBuffer {
                src,
                src_offset,
                dst,
                dst_offset,
                size,
            } => {
                let bytes = src.copy_out(src_offset, size)?;
                dst.copy_in(dst_offset, &bytes)
            }
            Command::BufferToImage {
                src,
                src_offset,
                dst,
                origin,
                shape,
            } => {
                let mut image = lock(&dst.inner);
                image.check_layout(ImageLayout::TransferDst)?;
                image.check_region(origin, shape)?;
                let bytes = src.copy_out(src_offset, image.format.bytes_for(shape))?;
                image.write_region(origin, shape, &bytes);
                Ok(())
            }
            Command::ImageToBuffer {
                src,
                origin,
                shape,
                dst,
                dst_offset,
            } => {
                let bytes = {
                    let image = lock(&src.inner);
                    image.check_layout(ImageLayout::TransferSrc)?;
                    image.check_region(origin, shape)?;
                    image.read_region(origin, shape)
                };
                dst.copy_in(dst_offset, &bytes)
            }
            Command::CopyImage {
                src,
                src_origin,
                dst,
                dst_origin,
                shape,
            } => {
                let (bytes, format) = {
                    let image = lock(&src.inner);
                    image.check_layout(ImageLayout::TransferSrc)?;
                    image.check_region(src_origin, shape)?;
                    (image.read_region(src_origin, shape), image.format)
                };
                let mut image = lock(&dst.inner);
                if image.format != format {
                    return Err(Error::FormatMismatch {
                        src: format,
                        dst: image.format,
                    });
                }
                image.check_layout(ImageLayout::TransferDst)?;
                image.check_region(dst_origin, shape)?;
                image.write_region(dst_origin, shape, &bytes);
                Ok(())
            }
            Command::Barrier { image, old, new } => {
                let mut image = lock(&image.inner);
                // transitions out of Undefined discard contents and are valid from any layout
                if old != ImageLayout::Undefined && old != image.layout {
                    return Err(Error::ImageLayout {
                        label: image.label.clone(),
                        expected: old,
                        actual: image.layout,
                    });
                }
                image.layout = new;
                Ok(())
            }
        }
    }
}

/// One-shot command list.
#[derive(Debug)]
pub struct Commands {
    label: String,
    commands: Vec<Command>,
}

impl Commands {
    pub fn copy_buffer(
        &mut self,
        src: &GpuBuffer,
        src_offset: u64,
        dst: &GpuBuffer,
        dst_offset: u64,
        size: u64,
    ) {
        self.commands.push(Command::CopyBuffer {
            src: src.clone(),
            src_offset,
            dst: dst.clone(),
            dst_offset,
            size,
        });
    }

    pub fn copy_buffer_to_image(
        &mut self,
        src: &GpuBuffer,
        src_offset: u64,
        dst: &GpuImage,
        origin: [u32; 3],
        shape: [u32; 3],
    ) {
        self.commands.push(Command::BufferToImage {
            src: src.clone(),
            src_offset,
            dst: dst.clone(),
            origin,
            shape,
        });
    }

    pub fn copy_image_to_buffer(
        &mut self,
        src: &GpuImage,
        origin: [u32; 3],
        shape: [u32; 3],
        dst: &GpuBuffer,
        dst_offset: u64,
    ) {
        self.commands.push(Command::ImageToBuffer {
            src: src.clone(),
            origin,
            shape,
            dst: dst.clone(),
            dst_offset,
        });
    }

    pub fn copy_image(
        &mut self,
        src: &GpuImage,
        src_origin: [u32; 3],
        dst: &GpuImage,
        dst_origin: [u32; 3],
        shape: [u32; 3],
    ) {
        self.commands.push(Command::CopyImage {
            src: src.clone(),
            src_origin,
            dst: dst.clone(),
            dst_origin,
            shape,
        });
    }

    pub fn barrier(&mut self, image: &GpuImage, old: ImageLayout, new: ImageLayout) {
        self.commands.push(Command::Barrier {
            image: image.clone(),
            old,
            new,
        });
    }

    /// Executes the recorded commands in order, stopping at the first failure.
    pub fn submit(self) -> Result<(), Error> {
        logwise::trace_sync!(
            "submit {label} ({count} commands)",
            label = self.label,
            count = self.commands.len()
        );
        self.commands.into_iter().try_for_each(Command::execute)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_local_refuses_host_access() {
        let device = BoundDevice::new().unwrap();
        let buffer = GpuBuffer::new(&device, "vertex", 16, BufferType::Vertex).unwrap();
        assert!(matches!(
            buffer.write(&device, 0, &[1, 2, 3]),
            Err(Error::NotHostVisible { .. })
        ));
    }

    #[test]
    fn resize_preserves_contents() {
        let device = BoundDevice::new().unwrap();
        let mut buffer = GpuBuffer::new(&device, "staging", 4, BufferType::Staging).unwrap();
        buffer.write(&device, 0, &[1, 2, 3, 4]).unwrap();
        buffer.resize(&device, 8).unwrap();
        let mut out = [0; 8];
        buffer.read(&device, 0, &mut out).unwrap();
        assert_eq!(out, [1, 2, 3, 4, 0, 0, 0, 0]);
    }

    #[test]
    fn oversized_buffers_are_refused() {
        let device = BoundDevice::new().unwrap();
        assert!(matches!(
            GpuBuffer::new(&device, "huge", MAX_BUFFER_SIZE + 1, BufferType::Storage),
            Err(Error::BufferTooLarge { .. })
        ));
        let mut buffer = GpuBuffer::new(&device, "storage", 4, BufferType::Storage).unwrap();
        assert!(buffer.resize(&device, MAX_BUFFER_SIZE + 1).is_err());
        assert_eq!(buffer.size(), 4);
    }

    #[test]
    fn range_past_the_end_of_the_address_space() {
        let device = BoundDevice::new().unwrap();
        let buffer = GpuBuffer::new(&device, "staging", 4, BufferType::Staging).unwrap();
        assert!(matches!(
            buffer.write(&device, u64::MAX, &[1]),
            Err(Error::BufferRange { end: u64::MAX, .. })
        ));
    }

    #[test]
    fn image_copy_requires_transfer_layout() {
        let device = BoundDevice::new().unwrap();
        let staging = GpuBuffer::new(&device, "staging", 16, BufferType::Staging).unwrap();
        let image = GpuImage::new(
            &device,
            "image",
            TexDims::D2,
            [2, 2, 1],
            PixelFormat::Rgba8Unorm,
        )
        .unwrap();
        let mut commands = device.commands("no barrier");
        commands.copy_buffer_to_image(&staging, 0, &image, [0, 0, 0], [2, 2, 1]);
        assert!(matches!(commands.submit(), Err(Error::ImageLayout { .. })));

        let mut commands = device.commands("with barrier");
        commands.barrier(&image, ImageLayout::Undefined, ImageLayout::TransferDst);
        commands.copy_buffer_to_image(&staging, 0, &image, [0, 0, 0], [2, 2, 1]);
        commands.submit().unwrap();
    }

    #[test]
    fn sub_region_rows() {
        let device = BoundDevice::new().unwrap();
        let image = GpuImage::new(&device, "image", TexDims::D2, [3, 2, 1], PixelFormat::R8Unorm)
            .unwrap();
        let mut img = lock(&image.inner);
        img.write_region([0, 0, 0], [3, 2, 1], &[1, 2, 3, 4, 5, 6]);
        assert_eq!(img.read_region([1, 0, 0], [2, 2, 1]), vec![2, 3, 5, 6]);
    }
}
