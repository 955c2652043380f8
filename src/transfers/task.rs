// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Units of work for the transfer queue.

use crate::buffer::BufferRegions;
use crate::texture::Texture;
use std::sync::{Arc, Mutex};

/// Tag used to look up the callback for a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    BufferUpload,
    BufferDownload,
    BufferCopy,
    TextureCopy,
    BufferTexture,
    TextureBuffer,
    DownloadDone,
}

/// Bytes a download writes into, shared between the worker and the caller.
pub type DownloadSink = Arc<Mutex<Vec<u8>>>;

/// One step of a transfer.  Buffer offsets are relative to slot 0 of the region group.
pub enum TransferTask {
    /// Host bytes into a host-visible buffer.
    BufferUpload {
        dst: BufferRegions,
        offset: u64,
        data: Vec<u8>,
    },
    /// Host-visible buffer bytes into `sink`.
    BufferDownload {
        src: BufferRegions,
        offset: u64,
        size: u64,
        sink: DownloadSink,
    },
    BufferCopy {
        src: BufferRegions,
        src_offset: u64,
        dst: BufferRegions,
        dst_offset: u64,
        size: u64,
    },
    TextureCopy {
        src: Texture,
        src_offset: [u32; 3],
        dst: Texture,
        dst_offset: [u32; 3],
        shape: [u32; 3],
    },
    /// Buffer bytes into a texture region.
    BufferTexture {
        src: BufferRegions,
        src_offset: u64,
        dst: Texture,
        dst_offset: [u32; 3],
        shape: [u32; 3],
    },
    /// A texture region into buffer bytes.
    TextureBuffer {
        src: Texture,
        src_offset: [u32; 3],
        shape: [u32; 3],
        dst: BufferRegions,
        dst_offset: u64,
    },
    /// Signals that a download chain finished.  `true` when every step before it succeeded.
    DownloadDone {
        size: u64,
        done: r#continue::Sender<bool>,
    },
}

impl TransferTask {
    pub fn kind(&self) -> TaskKind {
        match self {
            TransferTask::BufferUpload { .. } => TaskKind::BufferUpload,
            TransferTask::BufferDownload { .. } => TaskKind::BufferDownload,
            TransferTask::BufferCopy { .. } => TaskKind::BufferCopy,
            TransferTask::TextureCopy { .. } => TaskKind::TextureCopy,
            TransferTask::BufferTexture { .. } => TaskKind::BufferTexture,
            TransferTask::TextureBuffer { .. } => TaskKind::TextureBuffer,
            TransferTask::DownloadDone { .. } => TaskKind::DownloadDone,
        }
    }

    /// Drops a task whose chain already failed.  Completion signals still fire, with `false`,
    /// so nobody waits on them forever.
    pub(crate) fn cancel(self) {
        if let TransferTask::DownloadDone { done, .. } = self {
            done.send(false);
        }
    }
}

impl std::fmt::Debug for TransferTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransferTask::BufferUpload { dst, offset, data } => f
                .debug_struct("BufferUpload")
                .field("dst", dst)
                .field("offset", offset)
                .field("len", &data.len())
                .finish(),
            TransferTask::BufferDownload {
                src, offset, size, ..
            } => f
                .debug_struct("BufferDownload")
                .field("src", src)
                .field("offset", offset)
                .field("size", size)
                .finish(),
            TransferTask::DownloadDone { size, .. } => {
                f.debug_struct("DownloadDone").field("size", size).finish()
            }
            other => write!(f, "{:?}", other.kind()),
        }
    }
}
