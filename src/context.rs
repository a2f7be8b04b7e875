//! Device and queue the wgpu backend runs on.
//!
//! The instance manager never presents anything itself, so the context is headless:
//! either it requests its own adapter ([`Context::new_headless`]) or it adopts the
//! device of an application that already owns a surface ([`Context::from_parts`]).

use std::time::Duration;

use crate::error::GpuError;

#[derive(Debug, Clone)]
pub struct Context {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    /// Whether `first_instance` of indirect draws is honoured. Without it the wgpu
    /// backend issues one indirect draw per slot.
    pub indirect_first_instance: bool,
}

impl Context {
    pub async fn new_headless() -> Result<Self, GpuError> {
        log::info!("WGPU setup");
        let mut desc = wgpu::InstanceDescriptor::new_without_display_handle();
        #[cfg(not(target_arch = "wasm32"))]
        {
            desc.backends = wgpu::Backends::PRIMARY;
        }
        #[cfg(target_arch = "wasm32")]
        {
            desc.backends = wgpu::Backends::GL;
        }
        let instance = wgpu::Instance::new(desc);

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::default(),
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .map_err(|e| GpuError::NoAdapter(e.to_string()))?;

        let mut required_features = wgpu::Features::empty();
        if adapter
            .features()
            .contains(wgpu::Features::INDIRECT_FIRST_INSTANCE)
        {
            required_features |= wgpu::Features::INDIRECT_FIRST_INSTANCE;
        }

        log::info!("device and queue");
        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("Instance Manager Device"),
                required_features,
                // WebGL doesn't support all of wgpu's features, so if
                // we're building for the web we'll have to disable some.
                required_limits: if cfg!(target_arch = "wasm32") {
                    wgpu::Limits::downlevel_webgl2_defaults()
                } else {
                    wgpu::Limits::default()
                },
                ..Default::default()
            })
            .await
            .map_err(|e| GpuError::DeviceRequest(e.to_string()))?;

        Ok(Self::from_parts(device, queue))
    }

    pub fn from_parts(device: wgpu::Device, queue: wgpu::Queue) -> Self {
        let indirect_first_instance = device
            .features()
            .contains(wgpu::Features::INDIRECT_FIRST_INSTANCE);
        if !indirect_first_instance {
            log::warn!("INDIRECT_FIRST_INSTANCE is unavailable, falling back to one indirect draw per slot");
        }
        Self {
            device,
            queue,
            indirect_first_instance,
        }
    }

    /// Copies `size` bytes from the start of `buffer` and waits for them.
    ///
    /// `buffer` needs `COPY_SRC`. Meant for tests and debugging, not for the frame loop.
    pub async fn read_buffer(
        &self,
        buffer: &wgpu::Buffer,
        size: u64,
    ) -> Result<Vec<u8>, GpuError> {
        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Readback Buffer"),
            size,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Readback Encoder"),
            });
        encoder.copy_buffer_to_buffer(buffer, 0, &staging, 0, size);
        self.queue.submit(Some(encoder.finish()));

        // The mapping has to be requested before polling, otherwise the wait never ends.
        let (tx, rx) = futures_intrusive::channel::shared::oneshot_channel();
        let slice = staging.slice(..);
        slice.map_async(wgpu::MapMode::Read, move |result| {
            // The receiver only disappears if the caller gave up on the future.
            let _ = tx.send(result);
        });
        self.device
            .poll(wgpu::PollType::Wait {
                submission_index: None,
                timeout: Some(Duration::from_secs(3)),
            })
            .map_err(|e| GpuError::Readback(e.to_string()))?;
        rx.receive()
            .await
            .ok_or_else(|| GpuError::Readback("mapping callback dropped".to_string()))?
            .map_err(|e| GpuError::Readback(e.to_string()))?;

        let data = slice.get_mapped_range().to_vec();
        staging.unmap();
        Ok(data)
    }
}
