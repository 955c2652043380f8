// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Callbacks that carry out transfer tasks on a device.

use crate::error::Result;
use crate::imp::{BoundDevice, Commands, QueueKind};
use crate::texture::{self, ImageLayout, TextureInner};
use crate::transfers::queue::{SubQueue, TransferQueue};
use crate::transfers::task::{TaskKind, TransferTask};
use std::sync::PoisonError;

/// Which sub-queue each kind of task is processed on.
const ROUTES: [(SubQueue, TaskKind); 7] = [
    (SubQueue::Upload, TaskKind::BufferUpload),
    (SubQueue::Download, TaskKind::BufferDownload),
    (SubQueue::Copy, TaskKind::BufferCopy),
    (SubQueue::Copy, TaskKind::TextureCopy),
    (SubQueue::Copy, TaskKind::BufferTexture),
    (SubQueue::Copy, TaskKind::TextureBuffer),
    (SubQueue::Event, TaskKind::DownloadDone),
];

pub(crate) fn register(queue: &TransferQueue, device: &BoundDevice) {
    for (sub_queue, kind) in ROUTES {
        let device = device.clone();
        queue.callback(sub_queue, kind, move |task| process(&device, task));
    }
}

/// Copies between device resources.  The render queue is drained before and the transfer
/// queue after, so the copy never races a frame.  `textures` are the ones `record` transitions.
fn gpu_copy(
    device: &BoundDevice,
    label: &str,
    textures: &[&TextureInner],
    record: impl FnOnce(&mut Commands),
) -> Result<()> {
    device.wait_idle(QueueKind::Render);
    let mut commands = device.commands(label);
    record(&mut commands);
    texture::submit(commands, textures)?;
    device.wait_idle(QueueKind::Transfer);
    Ok(())
}

fn process(device: &BoundDevice, task: TransferTask) -> Result<()> {
    match task {
        TransferTask::BufferUpload { dst, offset, data } => {
            let at = dst.absolute(offset, data.len() as u64)?;
            dst.buffer()?.write(device, at, &data)
        }
        TransferTask::BufferDownload {
            src,
            offset,
            size,
            sink,
        } => {
            let at = src.absolute(offset, size)?;
            let mut bytes = vec![0; size as usize];
            src.buffer()?.read(device, at, &mut bytes)?;
            *sink.lock().unwrap_or_else(PoisonError::into_inner) = bytes;
            Ok(())
        }
        TransferTask::BufferCopy {
            src,
            src_offset,
            dst,
            dst_offset,
            size,
        } => {
            let src_at = src.absolute(src_offset, size)?;
            let dst_at = dst.absolute(dst_offset, size)?;
            let (src, dst) = (src.buffer()?.gpu(), dst.buffer()?.gpu());
            gpu_copy(device, "buffer copy", &[], |commands| {
                commands.copy_buffer(&src, src_at, &dst, dst_at, size)
            })
        }
        TransferTask::TextureCopy {
            src,
            src_offset,
            dst,
            dst_offset,
            shape,
        } => {
            let same = src.same_as(&dst);
            let (src, dst) = (src.inner()?, dst.inner()?);
            dst.check_copy_from(&src)?;
            let shape = src.region(src_offset, shape)?;
            dst.region(dst_offset, shape)?;
            let pair = [&*src, &*dst];
            let textures = if same { &pair[..1] } else { &pair[..] };
            gpu_copy(device, "texture copy", textures, |commands| {
                if same {
                    src.transition(commands, ImageLayout::General);
                } else {
                    src.transition(commands, ImageLayout::TransferSrc);
                    dst.transition(commands, ImageLayout::TransferDst);
                }
                commands.copy_image(&src.image(), src_offset, &dst.image(), dst_offset, shape);
                src.rest(commands);
                if !same {
                    dst.rest(commands);
                }
            })
        }
        TransferTask::BufferTexture {
            src,
            src_offset,
            dst,
            dst_offset,
            shape,
        } => {
            let texture = dst.inner()?;
            let shape = texture.region(dst_offset, shape)?;
            let at = src.absolute(src_offset, texture.format().bytes_for(shape))?;
            let buffer = src.buffer()?.gpu();
            gpu_copy(device, "buffer to texture", &[&*texture], |commands| {
                texture.transition(commands, ImageLayout::TransferDst);
                commands.copy_buffer_to_image(&buffer, at, &texture.image(), dst_offset, shape);
                texture.rest(commands);
            })
        }
        TransferTask::TextureBuffer {
            src,
            src_offset,
            shape,
            dst,
            dst_offset,
        } => {
            let texture = src.inner()?;
            let shape = texture.region(src_offset, shape)?;
            let at = dst.absolute(dst_offset, texture.format().bytes_for(shape))?;
            let buffer = dst.buffer()?.gpu();
            gpu_copy(device, "texture to buffer", &[&*texture], |commands| {
                texture.transition(commands, ImageLayout::TransferSrc);
                commands.copy_image_to_buffer(&texture.image(), src_offset, shape, &buffer, at);
                texture.rest(commands);
            })
        }
        TransferTask::DownloadDone { size, done } => {
            logwise::trace_sync!("download of {size} bytes done", size = size);
            done.send(true);
            Ok(())
        }
    }
}
