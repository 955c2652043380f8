// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
use crate::bittricks::align_up;
use crate::buffer::BufferType;
use crate::imp::MemoryKind;
use crate::imp::wgpu::{BoundDevice, Error, is_word_aligned};
use wgpu::{
    BufferDescriptor, BufferUsages, COPY_BUFFER_ALIGNMENT, CommandEncoderDescriptor, MapMode,
};

fn usage(buffer_type: BufferType) -> BufferUsages {
    let role = match buffer_type {
        BufferType::Staging => BufferUsages::empty(),
        BufferType::Vertex => BufferUsages::VERTEX,
        BufferType::Index => BufferUsages::INDEX,
        BufferType::Storage => BufferUsages::STORAGE,
        BufferType::Uniform | BufferType::Mappable => BufferUsages::UNIFORM,
    };
    role | BufferUsages::COPY_SRC | BufferUsages::COPY_DST
}

/// The whole words covering `offset..offset + len`.
fn word_window(offset: u64, len: u64) -> (u64, u64) {
    let start = offset - offset % COPY_BUFFER_ALIGNMENT;
    (start, align_up(offset + len, COPY_BUFFER_ALIGNMENT))
}

#[derive(Debug, Clone)]
pub struct GpuBuffer {
    pub(super) buffer: wgpu::Buffer,
    label: String,
    buffer_type: BufferType,
    size: u64,
}

impl GpuBuffer {
    pub fn new(
        device: &BoundDevice,
        label: &str,
        size: u64,
        buffer_type: BufferType,
    ) -> Result<Self, Error> {
        let buffer = Self::create(device, label, size, buffer_type)?;
        Ok(GpuBuffer {
            buffer,
            label: label.to_string(),
            buffer_type,
            size,
        })
    }

    /// Creates the wgpu buffer, rounded up to whole words so that every logical byte lies in
    /// a copyable word.
    fn create(
        device: &BoundDevice,
        label: &str,
        size: u64,
        buffer_type: BufferType,
    ) -> Result<wgpu::Buffer, Error> {
        let physical = align_up(size, COPY_BUFFER_ALIGNMENT);
        if physical > device.max_buffer_size() {
            return Err(Error::BufferTooLarge {
                label: label.to_string(),
                size,
                max: device.max_buffer_size(),
            });
        }
        let descriptor = BufferDescriptor {
            label: Some(label),
            size: physical,
            usage: usage(buffer_type),
            mapped_at_creation: false,
        };
        device.validated(|| device.device.create_buffer(&descriptor))
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// Replaces the buffer with one of `new_size` bytes and copies the old contents across.
    pub fn resize(&mut self, device: &BoundDevice, new_size: u64) -> Result<(), Error> {
        let buffer = Self::create(device, &self.label, new_size, self.buffer_type)?;
        let keep = align_up(self.size.min(new_size), COPY_BUFFER_ALIGNMENT)
            .min(self.buffer.size())
            .min(buffer.size());
        if keep > 0 {
            let mut encoder = device.device.create_command_encoder(&CommandEncoderDescriptor {
                label: Some("resize"),
            });
            encoder.copy_buffer_to_buffer(&self.buffer, 0, &buffer, 0, keep);
            device.queue.submit(std::iter::once(encoder.finish()));
            device.poll()?;
        }
        self.buffer.destroy();
        self.buffer = buffer;
        self.size = new_size;
        Ok(())
    }

    fn check_range(&self, offset: u64, len: u64) -> Result<(), Error> {
        match offset.checked_add(len) {
            Some(end) if end <= self.size => Ok(()),
            end => Err(Error::BufferRange {
                label: self.label.clone(),
                offset,
                end: end.unwrap_or(u64::MAX),
                size: self.size,
            }),
        }
    }

    fn check_host(&self, offset: u64, len: u64) -> Result<(), Error> {
        if self.buffer_type.memory() != MemoryKind::HostVisible {
            return Err(Error::NotHostVisible {
                label: self.label.clone(),
            });
        }
        self.check_range(offset, len)
    }

    pub fn write(&self, device: &BoundDevice, offset: u64, data: &[u8]) -> Result<(), Error> {
        self.check_host(offset, data.len() as u64)?;
        self.store(device, offset, data)
    }

    pub fn read(&self, device: &BoundDevice, offset: u64, out: &mut [u8]) -> Result<(), Error> {
        self.check_host(offset, out.len() as u64)?;
        self.load(device, offset, out)
    }

    /// Writes `data` at `offset` through the queue.  Partial words at either end are read
    /// first so that neighbouring bytes survive.
    pub(super) fn store(
        &self,
        device: &BoundDevice,
        offset: u64,
        data: &[u8],
    ) -> Result<(), Error> {
        let len = data.len() as u64;
        self.check_range(offset, len)?;
        if data.is_empty() {
            return Ok(());
        }
        if is_word_aligned(offset, len) {
            return self.store_words(device, offset, data);
        }
        let (start, end) = word_window(offset, len);
        let mut words = vec![0; (end - start) as usize];
        self.load_words(device, start, &mut words)?;
        let at = (offset - start) as usize;
        words[at..at + data.len()].copy_from_slice(data);
        self.store_words(device, start, &words)
    }

    /// Reads `out.len()` bytes at `offset` back to the host.
    pub(super) fn load(
        &self,
        device: &BoundDevice,
        offset: u64,
        out: &mut [u8],
    ) -> Result<(), Error> {
        let len = out.len() as u64;
        self.check_range(offset, len)?;
        if out.is_empty() {
            return Ok(());
        }
        if is_word_aligned(offset, len) {
            return self.load_words(device, offset, out);
        }
        let (start, end) = word_window(offset, len);
        let mut words = vec![0; (end - start) as usize];
        self.load_words(device, start, &mut words)?;
        let at = (offset - start) as usize;
        out.copy_from_slice(&words[at..at + out.len()]);
        Ok(())
    }

    fn store_words(&self, device: &BoundDevice, offset: u64, words: &[u8]) -> Result<(), Error> {
        device.validated(|| device.queue.write_buffer(&self.buffer, offset, words))?;
        device.queue.submit(std::iter::empty());
        device.poll()
    }

    /// Copies whole words out through a mappable read-back buffer.
    fn load_words(&self, device: &BoundDevice, offset: u64, out: &mut [u8]) -> Result<(), Error> {
        let len = out.len() as u64;
        let read_back = device.device.create_buffer(&BufferDescriptor {
            label: Some("read back"),
            size: len,
            usage: BufferUsages::MAP_READ | BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        device.validated(|| {
            let mut encoder = device.device.create_command_encoder(&CommandEncoderDescriptor {
                label: Some("read back"),
            });
            encoder.copy_buffer_to_buffer(&self.buffer, offset, &read_back, 0, len);
            device.queue.submit(std::iter::once(encoder.finish()));
        })?;

        let (sender, mapped) = r#continue::continuation();
        read_back
            .slice(..)
            .map_async(MapMode::Read, move |result| sender.send(result));
        device.poll()?;
        test_executors::spin_on(mapped)?;
        {
            let view = read_back.slice(..).get_mapped_range();
            out.copy_from_slice(&view);
        }
        read_back.unmap();
        read_back.destroy();
        Ok(())
    }
}
