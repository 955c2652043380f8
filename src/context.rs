// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
The resource context.

A [Context] owns every GPU resource it hands out: one shared buffer per [BufferType] with the
arena that carves it up, standalone dat buffers, textures and samplers.  Clients hold weak
handles ([BufferRegions], [Texture], [Sampler]) that go stale when the context resets or drops.

The context also owns the transfer queue and its worker; transfer operations live in
[crate::transfers].
*/

use crate::arena::{Allocator, Arena};
use crate::bittricks::{align_up, next_pow2, pretty_size};
use crate::buffer::{Buffer, BufferRegions, BufferType};
use crate::dat::{Dat, DatFlags, Tex};
use crate::error::{Error, Result};
use crate::imp::{BoundDevice, GpuSampler, QueueKind};
use crate::pixel_formats::PixelFormat;
use crate::sampler::{Sampler, SamplerConfig};
use crate::texture::{TexDims, Texture, TextureInner};
use crate::transfers::process;
use crate::transfers::queue::{Group, TransferQueue};
use std::collections::HashMap;
use std::sync::Arc;

/// Largest ring a dat may have.
pub const MAX_DAT_COUNT: u32 = 10;

/// Sizes and limits a context is created with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextConfig {
    /// Initial capacity of each shared buffer, in [BufferType::ALL] order.
    pub buffer_sizes: [u64; 6],
    /// Upper bound on the `count` of a dat.
    pub max_dat_count: u32,
}

impl ContextConfig {
    pub fn buffer_size(&self, buffer_type: BufferType) -> u64 {
        self.buffer_sizes[buffer_type.index()]
    }

    pub fn with_buffer_size(mut self, buffer_type: BufferType, size: u64) -> Self {
        self.buffer_sizes[buffer_type.index()] = size;
        self
    }
}

impl Default for ContextConfig {
    fn default() -> Self {
        ContextConfig {
            buffer_sizes: BufferType::ALL.map(BufferType::default_size),
            max_dat_count: MAX_DAT_COUNT,
        }
    }
}

/// Snapshot of one shared buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferInfo {
    pub buffer_type: BufferType,
    pub capacity: u64,
    pub allocated_size: u64,
    pub alignment: u64,
    pub mappable: bool,
    /// Times the buffer was grown since it was created.
    pub reallocations: u32,
    pub queues: &'static [QueueKind],
}

fn alignment_for(device: &BoundDevice, buffer_type: BufferType) -> u64 {
    if buffer_type.needs_alignment() {
        device.min_uniform_buffer_offset_alignment()
    } else {
        0
    }
}

type Catalogue = (Vec<Arc<Buffer>>, Vec<Box<dyn Allocator>>);

fn default_buffers(device: &BoundDevice, config: &ContextConfig) -> Result<Catalogue> {
    let mut buffers = Vec::with_capacity(BufferType::ALL.len());
    let mut arenas: Vec<Box<dyn Allocator>> = Vec::with_capacity(BufferType::ALL.len());
    for buffer_type in BufferType::ALL {
        let size = config.buffer_size(buffer_type);
        buffers.push(Buffer::new(
            device,
            buffer_type,
            size,
            format!("shared {buffer_type:?} buffer"),
        )?);
        arenas.push(Box::new(Arena::new(size, alignment_for(device, buffer_type))));
    }
    Ok((buffers, arenas))
}

/// Owner of GPU memory and of the transfer pipeline.
#[derive(Debug)]
pub struct Context {
    pub(crate) device: BoundDevice,
    config: ContextConfig,
    // indexed by BufferType
    buffers: Vec<Arc<Buffer>>,
    arenas: Vec<Box<dyn Allocator>>,
    standalone: HashMap<u64, Arc<Buffer>>,
    textures: HashMap<u64, Arc<TextureInner>>,
    samplers: HashMap<u64, Arc<GpuSampler>>,
    pub(crate) staging: Option<BufferRegions>,
    next_id: u64,
    pub(crate) transfers: TransferQueue,
}

impl Context {
    pub fn new(device: BoundDevice) -> Result<Self> {
        Self::with_config(device, ContextConfig::default())
    }

    /// Creates the default buffers, registers the transfer callbacks and starts the
    /// transfer worker.
    pub fn with_config(device: BoundDevice, config: ContextConfig) -> Result<Self> {
        let (buffers, arenas) = default_buffers(&device, &config)?;
        let mut transfers = TransferQueue::new();
        process::register(&transfers, &device);
        transfers.spawn_worker()?;
        logwise::info_sync!("context created");
        Ok(Context {
            device,
            config,
            buffers,
            arenas,
            standalone: HashMap::new(),
            textures: HashMap::new(),
            samplers: HashMap::new(),
            staging: None,
            next_id: 0,
            transfers,
        })
    }

    pub fn device(&self) -> &BoundDevice {
        &self.device
    }

    pub fn config(&self) -> &ContextConfig {
        &self.config
    }

    /// The queue transfers run through.  Extra callbacks may be registered on it.
    pub fn transfers(&self) -> &TransferQueue {
        &self.transfers
    }

    /// Offset alignment of regions in buffers of `buffer_type`; 0 when unaligned.
    pub fn alignment(&self, buffer_type: BufferType) -> u64 {
        self.arenas[buffer_type.index()].alignment()
    }

    pub fn buffer_info(&self, buffer_type: BufferType) -> BufferInfo {
        let buffer = &self.buffers[buffer_type.index()];
        BufferInfo {
            buffer_type,
            capacity: buffer.capacity(),
            allocated_size: buffer.allocated_size(),
            alignment: self.alignment(buffer_type),
            mappable: buffer.is_mappable(),
            reallocations: buffer.reallocations(),
            queues: buffer.queue_access(),
        }
    }

    pub fn texture_count(&self) -> usize {
        self.textures.len()
    }

    pub fn sampler_count(&self) -> usize {
        self.samplers.len()
    }

    pub fn standalone_count(&self) -> usize {
        self.standalone.len()
    }

    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    /// Waits until neither the transfer worker nor the device is doing anything.
    fn idle(&self) -> Result<()> {
        self.transfers.wait(Group::UploadDownload)?;
        self.device.wait_device_idle();
        Ok(())
    }

    fn grow(&self, buffer: &Buffer, capacity: u64) -> Result<()> {
        self.idle()?;
        buffer.grow(&self.device, capacity)
    }

    /// Carves `count` slots of `size` bytes out of the shared buffer of `buffer_type`.
    ///
    /// Grows the buffer to the next power of two if needed.
    pub fn allocate_regions(
        &mut self,
        buffer_type: BufferType,
        count: u32,
        size: u64,
    ) -> Result<BufferRegions> {
        if size == 0 || count == 0 {
            logwise::error_sync!(
                "cannot allocate {count} regions of {size} bytes",
                count = count,
                size = size
            );
            return Err(Error::ZeroSize);
        }
        let buffer = self
            .buffers
            .get(buffer_type.index())
            .cloned()
            .ok_or(Error::BufferNotFound(buffer_type))?;
        let alignment = self.alignment(buffer_type);
        let aligned = align_up(size, alignment);
        let total = aligned.checked_mul(count as u64).ok_or(Error::OutOfBounds {
            offset: 0,
            end: u64::MAX,
            size: buffer.capacity(),
        })?;
        let allocation = self.arenas[buffer_type.index()].plan(total)?;
        if let Some(capacity) = allocation.resized {
            self.grow(&buffer, capacity)?;
        }
        self.arenas[buffer_type.index()].commit(&allocation);
        buffer.set_allocated_size(allocation.end);
        logwise::debuginternal_sync!(
            "allocating {count} regions (type {buffer_type}) with size {size} (aligned size {aligned})",
            count = count,
            buffer_type = logwise::privacy::LogIt(&buffer_type),
            size = pretty_size(size),
            aligned = pretty_size(aligned)
        );
        let regions = BufferRegions::new(&buffer, count, allocation.offset, size, alignment);
        assert_eq!(
            regions.offsets()[count as usize - 1] + regions.aligned_size(),
            buffer.allocated_size(),
            "region group does not end at the allocation mark"
        );
        Ok(regions)
    }

    /// Resizes a single-slot region group.
    ///
    /// The region keeps its offset if it is the last one allocated in its buffer.  Otherwise it
    /// moves to a fresh allocation and its old bytes are not carried over.
    pub fn resize_regions(&mut self, regions: &mut BufferRegions, new_size: u64) -> Result<()> {
        if new_size == 0 {
            return Err(Error::ZeroSize);
        }
        if regions.count() != 1 {
            logwise::error_sync!(
                "resizing regions only supports count 1, not {count}",
                count = regions.count()
            );
            return Err(Error::UnsupportedRegionCount(regions.count()));
        }
        let buffer = regions.buffer()?;
        let buffer_type = regions.buffer_type();
        let new_aligned = align_up(new_size, regions.alignment());

        if !Arc::ptr_eq(&buffer, &self.buffers[buffer_type.index()]) {
            // standalone: the whole buffer belongs to this region
            if new_aligned > buffer.capacity() {
                self.grow(&buffer, next_pow2(new_aligned))?;
            }
            buffer.set_allocated_size(new_aligned);
            regions.set_size(new_size);
            return Ok(());
        }

        let planned = self.arenas[buffer_type.index()].plan_resize_last(
            regions.offsets()[0],
            regions.aligned_size(),
            new_aligned,
        );
        match planned {
            Some(allocation) => {
                logwise::debuginternal_sync!("resize the buffer region in-place");
                if let Some(capacity) = allocation.resized {
                    self.grow(&buffer, capacity)?;
                }
                self.arenas[buffer_type.index()].commit(&allocation);
                buffer.set_allocated_size(allocation.end);
                regions.set_size(new_size);
            }
            None => {
                logwise::debuginternal_sync!(
                    "failed to resize the buffer region in-place, allocating a new region"
                );
                *regions = self.allocate_regions(buffer_type, 1, new_size)?;
            }
        }
        Ok(())
    }

    /// Creates a dat of `count` slots of `size` bytes.
    pub fn create_dat(
        &mut self,
        buffer_type: BufferType,
        size: u64,
        count: u32,
        flags: DatFlags,
    ) -> Result<Dat> {
        if size == 0 || count == 0 {
            return Err(Error::ZeroSize);
        }
        if count > self.config.max_dat_count {
            logwise::error_sync!(
                "dat count {count} exceeds {max}",
                count = count,
                max = self.config.max_dat_count
            );
            return Err(Error::TooManyItems {
                count,
                max: self.config.max_dat_count,
            });
        }
        let id = self.next_id();
        let regions = if flags.standalone {
            let alignment = self.alignment(buffer_type);
            let total = align_up(size, alignment).saturating_mul(count as u64);
            let buffer = Buffer::new(
                &self.device,
                buffer_type,
                total,
                format!("standalone {buffer_type:?} buffer for dat {id}"),
            )?;
            buffer.set_allocated_size(total);
            let regions = BufferRegions::new(&buffer, count, 0, size, alignment);
            self.standalone.insert(id, buffer);
            regions
        } else {
            self.allocate_regions(buffer_type, count, size)?
        };
        Ok(Dat::new(id, regions, flags))
    }

    /// Resizes a single-slot dat.  Contents are only kept when the region resizes in place.
    pub fn resize_dat(&mut self, dat: &mut Dat, new_size: u64) -> Result<()> {
        self.resize_regions(&mut dat.regions, new_size)
    }

    /// Destroys a dat.  A standalone dat releases its buffer; space in a shared buffer is
    /// only reclaimed by [Context::reset].
    pub fn destroy_dat(&mut self, dat: Dat) -> Result<()> {
        if dat.flags().standalone {
            self.idle()?;
            self.standalone.remove(&dat.id);
        }
        Ok(())
    }

    /// Creates a device-local texture in its resting layout.
    pub fn create_texture(
        &mut self,
        dims: TexDims,
        shape: [u32; 3],
        format: PixelFormat,
    ) -> Result<Texture> {
        let id = self.next_id();
        let inner = TextureInner::new(&self.device, format!("texture {id}"), dims, shape, format)?;
        let texture = Texture::new(id, &inner);
        self.textures.insert(id, inner);
        Ok(texture)
    }

    /// Gives a texture a new shape.  Contents are lost.
    pub fn resize_texture(&mut self, texture: &Texture, shape: [u32; 3]) -> Result<()> {
        let inner = texture.inner()?;
        self.idle()?;
        inner.recreate(&self.device, shape)
    }

    pub fn destroy_texture(&mut self, texture: Texture) -> Result<()> {
        self.idle()?;
        self.textures.remove(&texture.id);
        Ok(())
    }

    pub fn create_tex(
        &mut self,
        dims: TexDims,
        shape: [u32; 3],
        format: PixelFormat,
    ) -> Result<Tex> {
        Ok(Tex::new(self.create_texture(dims, shape, format)?))
    }

    pub fn resize_tex(&mut self, tex: &Tex, shape: [u32; 3]) -> Result<()> {
        self.resize_texture(tex.texture(), shape)
    }

    pub fn destroy_tex(&mut self, tex: Tex) -> Result<()> {
        self.destroy_texture(tex.texture().clone())
    }

    pub fn create_sampler(&mut self, config: SamplerConfig) -> Result<Sampler> {
        let id = self.next_id();
        let inner = Arc::new(GpuSampler::new(&self.device, config)?);
        let sampler = Sampler::new(id, config, &inner);
        self.samplers.insert(id, inner);
        Ok(sampler)
    }

    pub fn destroy_sampler(&mut self, sampler: Sampler) {
        self.samplers.remove(&sampler.id);
    }

    fn destroy_resources(&mut self) {
        self.staging = None;
        self.standalone.clear();
        self.textures.clear();
        self.samplers.clear();
        self.buffers.clear();
    }

    /// Destroys every resource and recreates the default buffers with their configured sizes.
    ///
    /// Every handle obtained before the reset goes stale.
    pub fn reset(&mut self) -> Result<()> {
        self.idle()?;
        self.destroy_resources();
        let (buffers, arenas) = default_buffers(&self.device, &self.config)?;
        self.buffers = buffers;
        self.arenas = arenas;
        logwise::info_sync!("context reset");
        Ok(())
    }

    /// Tears the context down: resources, then the arenas, then the transfer worker.
    pub fn destroy(self) {
        drop(self);
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        if let Err(error) = self.idle() {
            logwise::warn_sync!(
                "destroying context while transfers are stuck: {error}",
                error = logwise::privacy::LogIt(&error)
            );
        }
        self.destroy_resources();
        self.arenas.clear();
        self.transfers.stop();
        logwise::info_sync!("context destroyed");
    }
}
