// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("No such adapter")]
    NoSuchAdapter,
    #[error(transparent)]
    RequestDeviceError(#[from] wgpu::RequestDeviceError),
    #[error("buffer {label} is device-local and cannot be accessed from the host")]
    NotHostVisible { label: String },
    #[error("range {offset}..{end} exceeds buffer {label} of size {size}")]
    BufferRange {
        label: String,
        offset: u64,
        end: u64,
        size: u64,
    },
    #[error("buffer {label} of {size} bytes exceeds the device limit of {max}")]
    BufferTooLarge { label: String, size: u64, max: u64 },
    #[error(transparent)]
    BufferAsyncError(#[from] wgpu::BufferAsyncError),
    #[error(transparent)]
    PollError(#[from] wgpu::PollError),
    #[error("{0}")]
    Validation(String),
}
