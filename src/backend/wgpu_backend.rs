//! [`GpuBackend`] on top of a wgpu device.
//!
//! Uploads go through `Queue::write_buffer`; the compile pass and the multi-draw are
//! recorded into one command encoder per frame:
//!
//! ```ignore
//! backend.begin_frame(target);
//! manager.render(&mut backend)?;
//! backend.finish_frame();
//! ```
//!
//! Queue writes of a frame land before the frame's encoder executes, which gives the
//! upload → compile → draw order the manager relies on.

use futures::executor::block_on;
use wgpu::util::DeviceExt;

use crate::{
    backend::{BufferRole, BufferSpec, GpuBackend},
    compiler::CompilePass,
    context::Context,
    data_structures::{mesh::MeshCatalog, model::ModelVertex},
    error::GpuError,
    pipelines::{
        compile::CompileResources,
        indirect::{CameraUniform, IndirectResources},
    },
    render::{FrameTarget, IndirectDraw},
};

pub struct WgpuBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,
    compile: CompileResources,
    indirect: IndirectResources,
    pool_vertices: wgpu::Buffer,
    pool_indices: wgpu::Buffer,
    encoder: Option<wgpu::CommandEncoder>,
    target: Option<FrameTarget>,
    limits: wgpu::Limits,
    indirect_first_instance: bool,
}

impl WgpuBackend {
    /// Uploads the shared mesh pool of `catalog` and builds both pipelines.
    ///
    /// `depth_format` must match the depth view of every [`FrameTarget`]; `None`
    /// draws without depth testing. Without `INDIRECT_FIRST_INSTANCE` on the device
    /// the multi-draw is replaced by one indirect draw per slot.
    pub fn new(
        ctx: &Context,
        catalog: &MeshCatalog,
        color_format: wgpu::TextureFormat,
        depth_format: Option<wgpu::TextureFormat>,
    ) -> Self {
        let device = ctx.device.clone();

        // Empty catalogs still get a bindable pool.
        let vertices = if catalog.vertices().is_empty() {
            vec![ModelVertex::default()]
        } else {
            catalog.vertices().to_vec()
        };
        let indices = if catalog.indices().is_empty() {
            vec![0u32; 3]
        } else {
            catalog.indices().to_vec()
        };
        let pool_vertices = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Mesh Pool Vertex Buffer"),
            contents: bytemuck::cast_slice(&vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let pool_indices = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Mesh Pool Index Buffer"),
            contents: bytemuck::cast_slice(&indices),
            usage: wgpu::BufferUsages::INDEX,
        });
        log::info!(
            "mesh pool uploaded: {} vertices, {} indices",
            catalog.vertices().len(),
            catalog.indices().len()
        );

        Self {
            compile: CompileResources::new(&device),
            indirect: IndirectResources::new(&device, color_format, depth_format),
            limits: device.limits(),
            indirect_first_instance: ctx.indirect_first_instance,
            queue: ctx.queue.clone(),
            device,
            pool_vertices,
            pool_indices,
            encoder: None,
            target: None,
        }
    }

    /// Sets where the next multi-draw goes and uploads its camera.
    pub fn begin_frame(&mut self, target: FrameTarget) {
        self.queue.write_buffer(
            &self.indirect.camera_buffer,
            0,
            bytemuck::bytes_of(&CameraUniform::new(target.view_proj)),
        );
        self.target = Some(target);
    }

    /// Submits everything recorded since the last call. `None` if nothing was.
    pub fn finish_frame(&mut self) -> Option<wgpu::SubmissionIndex> {
        self.target = None;
        let encoder = self.encoder.take()?;
        Some(self.queue.submit(std::iter::once(encoder.finish())))
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    fn encoder(&mut self) -> &mut wgpu::CommandEncoder {
        let device = &self.device;
        self.encoder.get_or_insert_with(|| {
            device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Instance Frame Encoder"),
            })
        })
    }

    fn usage(role: BufferRole) -> wgpu::BufferUsages {
        match role {
            BufferRole::Instances => {
                wgpu::BufferUsages::VERTEX
                    | wgpu::BufferUsages::STORAGE
                    | wgpu::BufferUsages::COPY_DST
            }
            BufferRole::MeshDescriptors => {
                wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST
            }
            BufferRole::DrawCommands => {
                wgpu::BufferUsages::STORAGE
                    | wgpu::BufferUsages::INDIRECT
                    | wgpu::BufferUsages::COPY_SRC
            }
        }
    }
}

impl GpuBackend for WgpuBackend {
    type Buffer = wgpu::Buffer;

    fn create_buffer(&mut self, spec: &BufferSpec<'_>) -> Result<wgpu::Buffer, GpuError> {
        // Every buffer is bound as a storage buffer by the compile pass.
        let max = self
            .limits
            .max_buffer_size
            .min(self.limits.max_storage_buffer_binding_size);
        if spec.size > max {
            return Err(GpuError::CapacityExceeded {
                label: spec.label.to_string(),
                size: spec.size,
                max,
            });
        }

        let scope = self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(spec.label),
            size: spec.size,
            usage: Self::usage(spec.role),
            mapped_at_creation: false,
        });
        if let Some(error) = block_on(scope.pop()) {
            log::error!("allocating {:?} failed: {}", spec.label, error);
            return Err(GpuError::Allocation {
                label: spec.label.to_string(),
                size: spec.size,
                reason: error.to_string(),
            });
        }
        log::debug!("created {:?} ({} bytes)", spec.label, spec.size);
        Ok(buffer)
    }

    fn destroy_buffer(&mut self, buffer: wgpu::Buffer) {
        // Recorded and submitted work keeps its own reference alive.
        drop(buffer);
    }

    fn write_buffer(&mut self, buffer: &wgpu::Buffer, offset: u64, data: &[u8]) {
        self.queue.write_buffer(buffer, offset, data);
    }

    fn compile_draw_commands(
        &mut self,
        pass: &CompilePass<'_, wgpu::Buffer>,
    ) -> Result<(), GpuError> {
        let workgroups = pass.params.workgroup_count();
        let max = self.limits.max_compute_workgroups_per_dimension;
        if workgroups > max {
            return Err(GpuError::CapacityExceeded {
                label: "compile dispatch".to_string(),
                size: u64::from(workgroups),
                max: u64::from(max),
            });
        }

        self.queue
            .write_buffer(&self.compile.params, 0, bytemuck::bytes_of(&pass.params));
        let bind_group =
            self.compile
                .bind_group(&self.device, pass.instances, pass.meshes, pass.commands);
        let pipeline = self.compile.pipeline.clone();

        let mut compute_pass = self
            .encoder()
            .begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("Compile Draw Commands"),
                timestamp_writes: None,
            });
        compute_pass.set_pipeline(&pipeline);
        compute_pass.set_bind_group(0, &bind_group, &[]);
        compute_pass.dispatch_workgroups(workgroups, 1, 1);
        Ok(())
    }

    fn multi_draw_indexed_indirect(
        &mut self,
        draw: &IndirectDraw<'_, wgpu::Buffer>,
    ) -> Result<(), GpuError> {
        let target = self.target.clone().ok_or(GpuError::NoFrameTarget)?;
        let load = match target.clear_colour {
            Some(colour) => wgpu::LoadOp::Clear(colour),
            None => wgpu::LoadOp::Load,
        };
        let depth_load = match target.clear_colour {
            Some(_) => wgpu::LoadOp::Clear(1.0),
            None => wgpu::LoadOp::Load,
        };
        let pipeline = self.indirect.pipeline.clone();
        let camera_bind_group = self.indirect.camera_bind_group.clone();
        let pool_vertices = self.pool_vertices.clone();
        let pool_indices = self.pool_indices.clone();
        let indirect_first_instance = self.indirect_first_instance;

        let mut render_pass = self.encoder().begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Instance Render Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &target.color,
                depth_slice: None,
                resolve_target: None,
                ops: wgpu::Operations {
                    load,
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: target.depth.as_ref().map(|view| {
                wgpu::RenderPassDepthStencilAttachment {
                    view,
                    depth_ops: Some(wgpu::Operations {
                        load: depth_load,
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
            multiview_mask: None,
        });
        render_pass.set_pipeline(&pipeline);
        render_pass.set_bind_group(0, &camera_bind_group, &[]);
        render_pass.set_vertex_buffer(0, pool_vertices.slice(..));
        render_pass.set_index_buffer(pool_indices.slice(..), wgpu::IndexFormat::Uint32);
        if indirect_first_instance {
            render_pass.set_vertex_buffer(1, draw.instances.slice(..));
            render_pass.multi_draw_indexed_indirect(draw.commands, 0, draw.draw_count);
        } else {
            // first_instance reads as 0 here, so each command gets its slot's record
            // bound at the start of the instance stream instead.
            for (instance_offset, command_offset) in draw.per_slot_offsets() {
                render_pass.set_vertex_buffer(1, draw.instances.slice(instance_offset..));
                render_pass.draw_indexed_indirect(draw.commands, command_offset);
            }
        }
        Ok(())
    }
}
