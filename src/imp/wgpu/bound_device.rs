// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
use crate::imp::QueueKind;
use crate::imp::wgpu::Error;
use crate::imp::wgpu::commands::Commands;
use wgpu::{Limits, PollType, Trace};

/// Cross-platform bound device that can be safely cloned
/// Multiple instances share the same underlying GPU resources
#[derive(Debug, Clone)]
pub struct BoundDevice {
    pub(super) device: wgpu::Device,
    pub(super) queue: wgpu::Queue,
}

impl BoundDevice {
    /// Picks the default adapter and binds a device on it.
    pub fn new() -> Result<Self, Error> {
        test_executors::spin_on(Self::bind())
    }

    async fn bind() -> Result<Self, Error> {
        let descriptor = wgpu::InstanceDescriptor::from_env_or_default();
        let instance = wgpu::Instance::new(&descriptor);
        let options = wgpu::RequestAdapterOptions {
            power_preference: Default::default(),
            force_fallback_adapter: false,
            compatible_surface: None,
        };
        let adapter = instance
            .request_adapter(&options)
            .await
            .map_err(|_| Error::NoSuchAdapter)?;
        let descriptor = wgpu::DeviceDescriptor {
            label: wgpu::Label::from("Bound Device"),
            required_features: Default::default(),
            required_limits: Limits::downlevel_defaults().using_resolution(adapter.limits()),
            memory_hints: Default::default(),
            trace: Trace::Off,
        };
        let (device, queue) = adapter.request_device(&descriptor).await?;
        logwise::info_sync!(
            "bound wgpu device on {adapter}",
            adapter = logwise::privacy::LogIt(&adapter.get_info().name)
        );
        Ok(BoundDevice { device, queue })
    }

    pub fn min_uniform_buffer_offset_alignment(&self) -> u64 {
        self.device.limits().min_uniform_buffer_offset_alignment as u64
    }

    pub fn max_buffer_size(&self) -> u64 {
        self.device.limits().max_buffer_size
    }

    /// wgpu exposes a single queue, so every queue waits for the same submissions.
    pub fn wait_idle(&self, queue: QueueKind) {
        logwise::trace_sync!("wait_idle {queue}", queue = logwise::privacy::LogIt(&queue));
        if let Err(error) = self.poll() {
            logwise::warn_sync!(
                "polling the device failed: {error}",
                error = logwise::privacy::LogIt(&error)
            );
        }
    }

    pub fn wait_device_idle(&self) {
        self.wait_idle(QueueKind::Render);
    }

    pub(super) fn poll(&self) -> Result<(), Error> {
        let _interval = logwise::perfwarn_begin!("wgpu::BoundDevice::poll");
        self.device.poll(PollType::Wait)?;
        Ok(())
    }

    pub fn commands(&self, label: &str) -> Commands {
        Commands::new(self, label)
    }

    /// Runs `f` inside a validation error scope, turning validation failures into errors
    /// instead of panics.
    pub(super) fn validated<R>(&self, f: impl FnOnce() -> R) -> Result<R, Error> {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let r = f();
        match test_executors::spin_on(self.device.pop_error_scope()) {
            Some(error) => Err(Error::Validation(error.to_string())),
            None => Ok(r),
        }
    }
}
