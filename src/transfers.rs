// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
Synchronous data movement between host memory, buffers and textures.

Every operation builds a short chain of tasks, submits it to the context's
[queue::TransferQueue] and blocks until the chain finished:

| Operation | Chain |
|-----------|-------|
| upload to a mappable buffer | upload |
| upload to any other buffer | upload (to staging) → copy |
| download from a mappable buffer | download → done |
| download from any other buffer | copy (to staging) → download → done |
| upload to a texture | upload (to staging) → buffer-to-texture |
| download from a texture | texture-to-buffer (to staging) → download → done |
| buffer/texture copies | copy |

Uploads and downloads run on the worker thread; copies and completion events are processed by the
calling thread while it waits.

Staged transfers share one staging region per context.  It grows as needed and stays in place as
long as nothing else was allocated in the staging buffer after it.
*/

pub(crate) mod process;
pub mod queue;
pub mod task;

use crate::buffer::{BufferRegions, BufferType};
use crate::context::Context;
use crate::dat::{Dat, Tex};
use crate::error::{Error, Result};
use crate::texture::Texture;
use queue::{Chain, Group, Item, SubQueue};
use std::future::Future;
use std::sync::PoisonError;
use task::{DownloadSink, TransferTask};

impl Context {
    /// The staging region, grown to at least `size` bytes.
    fn staging_region(&mut self, size: u64) -> Result<BufferRegions> {
        let staging = match self.staging.take() {
            Some(mut staging) if staging.is_alive() => {
                if staging.size() < size {
                    self.resize_regions(&mut staging, size)?;
                }
                staging
            }
            _ => self.allocate_regions(BufferType::Staging, 1, size)?,
        };
        self.staging = Some(staging.clone());
        Ok(staging)
    }

    /// Runs a single GPU copy task to completion.
    fn run_copy(&self, task: TransferTask) -> Result<()> {
        let chain = self.transfers.submit(Item::new(SubQueue::Copy, task))?;
        self.transfers.dequeue(Group::Copy, true);
        self.transfers.wait(Group::UploadDownload)?;
        chain.result()
    }

    /// Waits for the tail of a download chain and copies the downloaded bytes into `out`.
    fn finish_download(
        &self,
        chain: Chain,
        finished: impl Future<Output = bool>,
        sink: DownloadSink,
        out: &mut [u8],
    ) -> Result<()> {
        self.transfers.wait(Group::UploadDownload)?;
        self.transfers.dequeue(Group::Event, true);
        self.transfers.wait(Group::Event)?;
        let delivered = test_executors::sleep_on(finished);
        chain.result()?;
        if !delivered {
            return Err(Error::WorkerStopped);
        }
        let bytes = sink.lock().unwrap_or_else(PoisonError::into_inner);
        if bytes.len() != out.len() {
            return Err(Error::PayloadSize {
                expected: out.len() as u64,
                actual: bytes.len() as u64,
            });
        }
        out.copy_from_slice(&bytes);
        Ok(())
    }

    /// Writes `data` at `offset` bytes into slot 0 of `regions`.
    pub fn upload_buffer(
        &mut self,
        regions: &BufferRegions,
        offset: u64,
        data: &[u8],
    ) -> Result<()> {
        if data.is_empty() {
            return Err(Error::ZeroSize);
        }
        let size = data.len() as u64;
        regions.absolute(offset, size)?;
        let buffer = regions.buffer()?;
        logwise::trace_sync!(
            "upload {size} bytes to {buffer_type}",
            size = size,
            buffer_type = logwise::privacy::LogIt(&regions.buffer_type())
        );

        if buffer.is_mappable() {
            let chain = self.transfers.submit(Item::new(
                SubQueue::Upload,
                TransferTask::BufferUpload {
                    dst: regions.clone(),
                    offset,
                    data: data.to_vec(),
                },
            ))?;
            self.transfers.wait(Group::UploadDownload)?;
            return chain.result();
        }

        let staging = self.staging_region(size)?;
        let chain = self.transfers.submit(
            Item::new(
                SubQueue::Upload,
                TransferTask::BufferUpload {
                    dst: staging.clone(),
                    offset: 0,
                    data: data.to_vec(),
                },
            )
            .then(Item::new(
                SubQueue::Copy,
                TransferTask::BufferCopy {
                    src: staging,
                    src_offset: 0,
                    dst: regions.clone(),
                    dst_offset: offset,
                    size,
                },
            )),
        )?;
        self.transfers.dequeue(Group::Copy, true);
        self.transfers.wait(Group::UploadDownload)?;
        chain.result()
    }

    /// Reads `out.len()` bytes at `offset` bytes into slot 0 of `regions`.
    pub fn download_buffer(
        &mut self,
        regions: &BufferRegions,
        offset: u64,
        out: &mut [u8],
    ) -> Result<()> {
        if out.is_empty() {
            return Err(Error::ZeroSize);
        }
        let size = out.len() as u64;
        regions.absolute(offset, size)?;
        let buffer = regions.buffer()?;
        logwise::trace_sync!(
            "download {size} bytes from {buffer_type}",
            size = size,
            buffer_type = logwise::privacy::LogIt(&regions.buffer_type())
        );
        let sink = DownloadSink::default();
        let (done, finished) = r#continue::continuation();
        let done = Item::new(SubQueue::Event, TransferTask::DownloadDone { size, done });

        let chain = if buffer.is_mappable() {
            self.transfers.submit(
                Item::new(
                    SubQueue::Download,
                    TransferTask::BufferDownload {
                        src: regions.clone(),
                        offset,
                        size,
                        sink: sink.clone(),
                    },
                )
                .then(done),
            )?
        } else {
            let staging = self.staging_region(size)?;
            let chain = self.transfers.submit(
                Item::new(
                    SubQueue::Copy,
                    TransferTask::BufferCopy {
                        src: regions.clone(),
                        src_offset: offset,
                        dst: staging.clone(),
                        dst_offset: 0,
                        size,
                    },
                )
                .then(Item::new(
                    SubQueue::Download,
                    TransferTask::BufferDownload {
                        src: staging,
                        offset: 0,
                        size,
                        sink: sink.clone(),
                    },
                ))
                .then(done),
            )?;
            self.transfers.dequeue(Group::Copy, true);
            chain
        };
        self.finish_download(chain, finished, sink, out)
    }

    /// Copies `size` bytes between slot 0 of two region groups, which may share a buffer.
    pub fn copy_buffer(
        &self,
        src: &BufferRegions,
        src_offset: u64,
        dst: &BufferRegions,
        dst_offset: u64,
        size: u64,
    ) -> Result<()> {
        if size == 0 {
            return Err(Error::ZeroSize);
        }
        src.absolute(src_offset, size)?;
        dst.absolute(dst_offset, size)?;
        self.run_copy(TransferTask::BufferCopy {
            src: src.clone(),
            src_offset,
            dst: dst.clone(),
            dst_offset,
            size,
        })
    }

    /// Writes tightly packed texels into the region of `texture` at `offset`.
    ///
    /// A zero component of `shape` covers the rest of the texture along that axis.
    pub fn upload_texture(
        &mut self,
        texture: &Texture,
        offset: [u32; 3],
        shape: [u32; 3],
        data: &[u8],
    ) -> Result<()> {
        let inner = texture.inner()?;
        let shape = inner.region(offset, shape)?;
        let size = inner.format().bytes_for(shape);
        if data.len() as u64 != size {
            return Err(Error::PayloadSize {
                expected: size,
                actual: data.len() as u64,
            });
        }
        let staging = self.staging_region(size)?;
        let chain = self.transfers.submit(
            Item::new(
                SubQueue::Upload,
                TransferTask::BufferUpload {
                    dst: staging.clone(),
                    offset: 0,
                    data: data.to_vec(),
                },
            )
            .then(Item::new(
                SubQueue::Copy,
                TransferTask::BufferTexture {
                    src: staging,
                    src_offset: 0,
                    dst: texture.clone(),
                    dst_offset: offset,
                    shape,
                },
            )),
        )?;
        self.transfers.dequeue(Group::Copy, true);
        self.transfers.wait(Group::UploadDownload)?;
        chain.result()
    }

    /// Reads the region of `texture` at `offset` as tightly packed texels.
    ///
    /// A zero component of `shape` covers the rest of the texture along that axis.
    pub fn download_texture(
        &mut self,
        texture: &Texture,
        offset: [u32; 3],
        shape: [u32; 3],
        out: &mut [u8],
    ) -> Result<()> {
        let inner = texture.inner()?;
        let shape = inner.region(offset, shape)?;
        let size = inner.format().bytes_for(shape);
        if out.len() as u64 != size {
            return Err(Error::PayloadSize {
                expected: size,
                actual: out.len() as u64,
            });
        }
        let staging = self.staging_region(size)?;
        let sink = DownloadSink::default();
        let (done, finished) = r#continue::continuation();
        let chain = self.transfers.submit(
            Item::new(
                SubQueue::Copy,
                TransferTask::TextureBuffer {
                    src: texture.clone(),
                    src_offset: offset,
                    shape,
                    dst: staging.clone(),
                    dst_offset: 0,
                },
            )
            .then(Item::new(
                SubQueue::Download,
                TransferTask::BufferDownload {
                    src: staging,
                    offset: 0,
                    size,
                    sink: sink.clone(),
                },
            ))
            .then(Item::new(
                SubQueue::Event,
                TransferTask::DownloadDone { size, done },
            )),
        )?;
        self.transfers.dequeue(Group::Copy, true);
        self.finish_download(chain, finished, sink, out)
    }

    /// Copies a region between two textures of the same format.
    pub fn copy_texture(
        &self,
        src: &Texture,
        src_offset: [u32; 3],
        dst: &Texture,
        dst_offset: [u32; 3],
        shape: [u32; 3],
    ) -> Result<()> {
        let (src_inner, dst_inner) = (src.inner()?, dst.inner()?);
        dst_inner.check_copy_from(&src_inner)?;
        let shape = src_inner.region(src_offset, shape)?;
        dst_inner.region(dst_offset, shape)?;
        self.run_copy(TransferTask::TextureCopy {
            src: src.clone(),
            src_offset,
            dst: dst.clone(),
            dst_offset,
            shape,
        })
    }

    /// Copies tightly packed texels from slot 0 of `src` into a texture region.
    pub fn copy_buffer_to_texture(
        &self,
        src: &BufferRegions,
        src_offset: u64,
        dst: &Texture,
        dst_offset: [u32; 3],
        shape: [u32; 3],
    ) -> Result<()> {
        let inner = dst.inner()?;
        let shape = inner.region(dst_offset, shape)?;
        src.absolute(src_offset, inner.format().bytes_for(shape))?;
        self.run_copy(TransferTask::BufferTexture {
            src: src.clone(),
            src_offset,
            dst: dst.clone(),
            dst_offset,
            shape,
        })
    }

    /// Copies a texture region into slot 0 of `dst` as tightly packed texels.
    pub fn copy_texture_to_buffer(
        &self,
        src: &Texture,
        src_offset: [u32; 3],
        shape: [u32; 3],
        dst: &BufferRegions,
        dst_offset: u64,
    ) -> Result<()> {
        let inner = src.inner()?;
        let shape = inner.region(src_offset, shape)?;
        dst.absolute(dst_offset, inner.format().bytes_for(shape))?;
        self.run_copy(TransferTask::TextureBuffer {
            src: src.clone(),
            src_offset,
            shape,
            dst: dst.clone(),
            dst_offset,
        })
    }

    /// Uploads `data` into every slot of a dat.
    pub fn upload_dat(&mut self, dat: &Dat, offset: u64, data: &[u8]) -> Result<()> {
        for slot in dat.regions().slots() {
            self.upload_buffer(&slot, offset, data)?;
        }
        Ok(())
    }

    /// Downloads from the first slot of a dat.
    pub fn download_dat(&mut self, dat: &Dat, offset: u64, out: &mut [u8]) -> Result<()> {
        self.download_buffer(dat.regions(), offset, out)
    }

    pub fn upload_tex(
        &mut self,
        tex: &Tex,
        offset: [u32; 3],
        shape: [u32; 3],
        data: &[u8],
    ) -> Result<()> {
        self.upload_texture(tex.texture(), offset, shape, data)
    }

    pub fn download_tex(
        &mut self,
        tex: &Tex,
        offset: [u32; 3],
        shape: [u32; 3],
        out: &mut [u8],
    ) -> Result<()> {
        self.download_texture(tex.texture(), offset, shape, out)
    }

    /// Writes straight into one ring slot of a mappable region, bypassing the queue.
    ///
    /// Intended for per-frame uniforms: the caller picks the slot the GPU is not reading.
    pub fn write_mappable(
        &self,
        regions: &BufferRegions,
        slot: u32,
        offset: u64,
        data: &[u8],
    ) -> Result<()> {
        let buffer = regions.buffer()?;
        if !buffer.is_mappable() {
            logwise::error_sync!(
                "write_mappable on a {buffer_type} buffer",
                buffer_type = logwise::privacy::LogIt(&buffer.buffer_type())
            );
            return Err(Error::NotMappable(buffer.buffer_type()));
        }
        let region = regions.slot(slot).ok_or(Error::OutOfBounds {
            offset: slot as u64,
            end: slot as u64 + 1,
            size: regions.count() as u64,
        })?;
        let at = region.absolute(offset, data.len() as u64)?;
        buffer.write(&self.device, at, data)
    }
}
