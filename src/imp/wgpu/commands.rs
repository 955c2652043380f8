// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
use crate::imp::wgpu::{BoundDevice, Error, GpuBuffer, GpuImage, is_word_aligned};
use crate::texture::ImageLayout;
use wgpu::{CommandEncoder, CommandEncoderDescriptor, Extent3d, TextureDescriptor, TextureUsages};

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
}

/// Origin and buffer offset of every row in `shape`, for tightly packed buffer data.
fn rows(
    origin: [u32; 3],
    shape: [u32; 3],
    offset: u64,
    row_bytes: u64,
) -> impl Iterator<Item = ([u32; 3], u64)> {
    (0..shape[2]).flat_map(move |z| {
        (0..shape[1]).map(move |y| {
            let row = z as u64 * shape[1] as u64 + y as u64;
            (
                [origin[0], origin[1] + y, origin[2] + z],
                offset + row * row_bytes,
            )
        })
    })
}

fn row_extent(width: u32) -> Extent3d {
    Extent3d {
        width,
        height: 1,
        depth_or_array_layers: 1,
    }
}

fn extent(shape: [u32; 3]) -> Extent3d {
    Extent3d {
        width: shape[0],
        height: shape[1],
        depth_or_array_layers: shape[2],
    }
}

fn buffer_info(buffer: &GpuBuffer, offset: u64) -> wgpu::TexelCopyBufferInfo<'_> {
    wgpu::TexelCopyBufferInfo {
        buffer: &buffer.buffer,
        layout: wgpu::TexelCopyBufferLayout {
            offset,
            bytes_per_row: None,
            rows_per_image: None,
        },
    }
}

impl Command {
    /// A buffer copy wgpu cannot encode: an end falls inside a word, or both sides are the
    /// same buffer.  Those are carried out through the host.
    fn host_copy(&self) -> Option<(&GpuBuffer, u64, &GpuBuffer, u64, u64)> {
        match self {
            Command::CopyBuffer {
                src,
                src_offset,
                dst,
                dst_offset,
                size,
            } if src.buffer == dst.buffer
                || !is_word_aligned(*src_offset, *size)
                || !is_word_aligned(*dst_offset, *size) =>
            {
                Some((src, *src_offset, dst, *dst_offset, *size))
            }
            _ => None,
        }
    }

    fn encode(&self, device: &BoundDevice, encoder: &mut CommandEncoder) {
        match self {
            Command::CopyBuffer {
                src,
                src_offset,
                dst,
                dst_offset,
                size,
            } => {
                encoder.copy_buffer_to_buffer(
                    &src.buffer,
                    *src_offset,
                    &dst.buffer,
                    *dst_offset,
                    *size,
                );
            }
            Command::BufferToImage {
                src,
                src_offset,
                dst,
                origin,
                shape,
            } => {
                let row_bytes = dst.format.bytes_for([shape[0], 1, 1]);
                for (row_origin, offset) in rows(*origin, *shape, *src_offset, row_bytes) {
                    encoder.copy_buffer_to_texture(
                        buffer_info(src, offset),
                        dst.copy_info(row_origin),
                        row_extent(shape[0]),
                    );
                }
            }
            Command::ImageToBuffer {
                src,
                origin,
                shape,
                dst,
                dst_offset,
            } => {
                let row_bytes = src.format.bytes_for([shape[0], 1, 1]);
                for (row_origin, offset) in rows(*origin, *shape, *dst_offset, row_bytes) {
                    encoder.copy_texture_to_buffer(
                        src.copy_info(row_origin),
                        buffer_info(dst, offset),
                        row_extent(shape[0]),
                    );
                }
            }
            Command::CopyImage {
                src,
                src_origin,
                dst,
                dst_origin,
                shape,
            } if src.texture == dst.texture => {
                // a texture cannot be both ends of one copy; bounce through a scratch image
                let scratch = device.device.create_texture(&TextureDescriptor {
                    label: Some("texture copy scratch"),
                    size: extent(*shape),
                    mip_level_count: 1,
                    sample_count: 1,
                    dimension: src.texture.dimension(),
                    format: src.texture.format(),
                    usage: TextureUsages::COPY_SRC | TextureUsages::COPY_DST,
                    view_formats: &[],
                });
                let scratch = GpuImage {
                    texture: scratch,
                    format: src.format,
                };
                encoder.copy_texture_to_texture(
                    src.copy_info(*src_origin),
                    scratch.copy_info([0; 3]),
                    extent(*shape),
                );
                encoder.copy_texture_to_texture(
                    scratch.copy_info([0; 3]),
                    dst.copy_info(*dst_origin),
                    extent(*shape),
                );
            }
            Command::CopyImage {
                src,
                src_origin,
                dst,
                dst_origin,
                shape,
            } => {
                encoder.copy_texture_to_texture(
                    src.copy_info(*src_origin),
                    dst.copy_info(*dst_origin),
                    extent(*shape),
                );
            }
        }
    }
}

/// One-shot command list, encoded and submitted on [Commands::submit].
#[derive(Debug)]
pub struct Commands {
    device: BoundDevice,
    label: String,
    commands: Vec<Command>,
}

impl Commands {
    pub(super) fn new(device: &BoundDevice, label: &str) -> Self {
        Commands {
            device: device.clone(),
            label: label.to_string(),
            commands: Vec::new(),
        }
    }

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

    /// wgpu inserts layout transitions itself.
    pub fn barrier(&mut self, _image: &GpuImage, old: ImageLayout, new: ImageLayout) {
        logwise::trace_sync!(
            "barrier {old} -> {new}",
            old = logwise::privacy::LogIt(&old),
            new = logwise::privacy::LogIt(&new)
        );
    }

    /// Executes the recorded commands in order.  Copies that need the host split the list;
    /// everything between them goes to the GPU as one submission.
    pub fn submit(self) -> Result<(), Error> {
        logwise::trace_sync!(
            "submit {label} ({count} commands)",
            label = self.label.clone(),
            count = self.commands.len()
        );
        let mut batch = Vec::new();
        for command in &self.commands {
            match command.host_copy() {
                Some((src, src_offset, dst, dst_offset, size)) => {
                    self.submit_batch(&batch)?;
                    batch.clear();
                    let mut bytes = vec![0; size as usize];
                    src.load(&self.device, src_offset, &mut bytes)?;
                    dst.store(&self.device, dst_offset, &bytes)?;
                }
                None => batch.push(command),
            }
        }
        self.submit_batch(&batch)
    }

    fn submit_batch(&self, batch: &[&Command]) -> Result<(), Error> {
        if batch.is_empty() {
            return Ok(());
        }
        let device = &self.device;
        device.validated(|| {
            let mut encoder = device
                .device
                .create_command_encoder(&CommandEncoderDescriptor {
                    label: Some(&self.label),
                });
            for command in batch {
                command.encode(device, &mut encoder);
            }
            device.queue.submit(std::iter::once(encoder.finish()));
        })
    }
}
