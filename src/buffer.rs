// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
Physical buffers and the region groups carved out of them.

A [Buffer] is one physical allocation owned by a [crate::Context].  Clients never see it
directly; they hold [BufferRegions], which refer to the buffer weakly and describe `count` equally
sized, equally spaced slices of it.  A region group with `count > 1` is a per-frame ring: slot `i`
lives at `offsets[i] = base + i * aligned_size`.
*/

use crate::bittricks::{align_up, pretty_size};
use crate::error::{Error, Result};
use crate::imp::{BoundDevice, GpuBuffer, MemoryKind, QueueKind};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

/// Purpose of a buffer.  The context keeps one shared buffer of each type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BufferType {
    Staging,
    Vertex,
    Index,
    Storage,
    Uniform,
    /// Uniform data the host writes directly through a persistent mapping.
    Mappable,
}

impl BufferType {
    pub const ALL: [BufferType; 6] = [
        BufferType::Staging,
        BufferType::Vertex,
        BufferType::Index,
        BufferType::Storage,
        BufferType::Uniform,
        BufferType::Mappable,
    ];

    /// Capacity of the shared buffer of this type when a context is created or reset.
    pub const fn default_size(self) -> u64 {
        const MIB: u64 = 1024 * 1024;
        match self {
            BufferType::Staging | BufferType::Vertex | BufferType::Index => 4 * MIB,
            BufferType::Storage | BufferType::Uniform | BufferType::Mappable => MIB,
        }
    }

    /// Whether region offsets must respect the device's uniform offset alignment.
    pub const fn needs_alignment(self) -> bool {
        matches!(self, BufferType::Uniform | BufferType::Mappable)
    }

    /// Whether buffers of this type are persistently mapped for direct host writes.
    pub const fn is_mappable(self) -> bool {
        matches!(self, BufferType::Mappable)
    }

    pub const fn memory(self) -> MemoryKind {
        match self {
            BufferType::Staging | BufferType::Mappable => MemoryKind::HostVisible,
            _ => MemoryKind::DeviceLocal,
        }
    }

    pub(crate) const fn index(self) -> usize {
        self as usize
    }
}

impl TryFrom<u32> for BufferType {
    type Error = Error;

    fn try_from(value: u32) -> Result<Self> {
        match BufferType::ALL.get(value as usize) {
            Some(t) => Ok(*t),
            None => {
                logwise::error_sync!("unknown buffer type {value}", value = value);
                Err(Error::UnknownBufferType(value))
            }
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug)]
struct BufferState {
    gpu: GpuBuffer,
    allocated_size: u64,
    reallocations: u32,
}

/// A physical buffer.
#[derive(Debug)]
pub(crate) struct Buffer {
    label: String,
    buffer_type: BufferType,
    state: Mutex<BufferState>,
}

impl Buffer {
    pub(crate) fn new(
        device: &BoundDevice,
        buffer_type: BufferType,
        size: u64,
        label: String,
    ) -> Result<Arc<Self>> {
        logwise::debuginternal_sync!(
            "creating {label} with size {size}",
            label = label.clone(),
            size = pretty_size(size)
        );
        let gpu = GpuBuffer::new(device, &label, size, buffer_type)?;
        Ok(Arc::new(Buffer {
            label,
            buffer_type,
            state: Mutex::new(BufferState {
                gpu,
                allocated_size: 0,
                reallocations: 0,
            }),
        }))
    }

    pub(crate) fn buffer_type(&self) -> BufferType {
        self.buffer_type
    }

    pub(crate) fn is_mappable(&self) -> bool {
        self.buffer_type.is_mappable()
    }

    /// Queues allowed to touch the buffer.  Every buffer is shared by all of them.
    pub(crate) fn queue_access(&self) -> &'static [QueueKind] {
        &QueueKind::ALL
    }

    pub(crate) fn capacity(&self) -> u64 {
        lock(&self.state).gpu.size()
    }

    pub(crate) fn allocated_size(&self) -> u64 {
        lock(&self.state).allocated_size
    }

    pub(crate) fn set_allocated_size(&self, allocated_size: u64) {
        let mut state = lock(&self.state);
        assert!(
            allocated_size <= state.gpu.size(),
            "{} allocated past its capacity",
            self.label
        );
        state.allocated_size = allocated_size;
    }

    pub(crate) fn reallocations(&self) -> u32 {
        lock(&self.state).reallocations
    }

    /// Resizes the backing store, preserving contents.
    ///
    /// The buffer must not be in use by the device; callers wait for idle first.
    pub(crate) fn grow(&self, device: &BoundDevice, new_capacity: u64) -> Result<()> {
        logwise::info_sync!(
            "reallocating buffer {buffer_type} to {size}",
            buffer_type = logwise::privacy::LogIt(&self.buffer_type),
            size = pretty_size(new_capacity)
        );
        let _interval = logwise::perfwarn_begin!("Buffer::grow");
        let mut state = lock(&self.state);
        state.gpu.resize(device, new_capacity)?;
        state.reallocations += 1;
        Ok(())
    }

    pub(crate) fn gpu(&self) -> GpuBuffer {
        lock(&self.state).gpu.clone()
    }

    pub(crate) fn write(&self, device: &BoundDevice, offset: u64, data: &[u8]) -> Result<()> {
        self.gpu().write(device, offset, data)?;
        Ok(())
    }

    pub(crate) fn read(&self, device: &BoundDevice, offset: u64, out: &mut [u8]) -> Result<()> {
        self.gpu().read(device, offset, out)?;
        Ok(())
    }
}

/// A group of `count` equally sized slices of one buffer.
#[derive(Debug, Clone)]
pub struct BufferRegions {
    buffer: Weak<Buffer>,
    buffer_type: BufferType,
    count: u32,
    offsets: Vec<u64>,
    size: u64,
    aligned_size: u64,
    alignment: u64,
}

impl BufferRegions {
    pub(crate) fn new(
        buffer: &Arc<Buffer>,
        count: u32,
        base: u64,
        size: u64,
        alignment: u64,
    ) -> Self {
        let aligned_size = align_up(size, alignment);
        let offsets: Vec<u64> = (0..count as u64).map(|i| base + i * aligned_size).collect();
        if alignment != 0 {
            assert!(
                offsets.iter().all(|o| o % alignment == 0),
                "misaligned region offsets {offsets:?} for alignment {alignment}"
            );
        }
        BufferRegions {
            buffer: Arc::downgrade(buffer),
            buffer_type: buffer.buffer_type(),
            count,
            offsets,
            size,
            aligned_size,
            alignment,
        }
    }

    pub fn buffer_type(&self) -> BufferType {
        self.buffer_type
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn offsets(&self) -> &[u64] {
        &self.offsets
    }

    /// Size of each slot as requested.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Distance between slots.
    pub fn aligned_size(&self) -> u64 {
        self.aligned_size
    }

    pub fn alignment(&self) -> u64 {
        self.alignment
    }

    /// False once the context destroyed or reset the backing buffer.
    pub fn is_alive(&self) -> bool {
        self.buffer.strong_count() > 0
    }

    /// A `count == 1` view of ring slot `index`.
    pub fn slot(&self, index: u32) -> Option<BufferRegions> {
        let offset = *self.offsets.get(index as usize)?;
        Some(BufferRegions {
            buffer: self.buffer.clone(),
            buffer_type: self.buffer_type,
            count: 1,
            offsets: vec![offset],
            size: self.size,
            aligned_size: self.aligned_size,
            alignment: self.alignment,
        })
    }

    /// Every slot as its own `count == 1` view.
    pub fn slots(&self) -> impl Iterator<Item = BufferRegions> + '_ {
        (0..self.count).filter_map(|i| self.slot(i))
    }

    pub(crate) fn buffer(&self) -> Result<Arc<Buffer>> {
        self.buffer.upgrade().ok_or(Error::StaleRegion)
    }

    pub(crate) fn set_size(&mut self, size: u64) {
        self.size = size;
        self.aligned_size = align_up(size, self.alignment);
    }

    /// Absolute buffer offset of `offset` bytes into slot 0, after checking that
    /// `offset..offset + len` lies inside the slot.
    pub(crate) fn absolute(&self, offset: u64, len: u64) -> Result<u64> {
        match offset.checked_add(len) {
            Some(end) if end <= self.size => Ok(self.offsets[0] + offset),
            end => Err(Error::OutOfBounds {
                offset,
                end: end.unwrap_or(u64::MAX),
                size: self.size,
            }),
        }
    }
}
