//! Vulkan renderer for the spinning quad.
//!
//! # Overview
//!
//! [`Renderer`] owns every GPU resource: instance, device, swapchain, the
//! render pass pipeline, the quad's vertex/index/uniform buffers, the
//! texture, and the frame ring. Command buffers are recorded once per
//! swapchain image and resubmitted every frame; only the uniform buffer is
//! rewritten per frame.
//!
//! # Resource Destruction Order
//!
//! Vulkan objects must be destroyed children-first: pipeline and shader
//! objects, descriptor objects, buffers and textures, sync objects, the
//! command pool, the swapchain, the device, the surface, and finally the
//! instance. `ManuallyDrop` fields make that order explicit in `Drop`.

use std::mem::ManuallyDrop;
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, error, info};

use spinquad_core::{Error, Result, Timer};
use spinquad_platform::{Surface, Window, poll_nonzero_extent};
use spinquad_rhi::buffer::{Buffer, BufferUsage};
use spinquad_rhi::command::CommandPool;
use spinquad_rhi::descriptor::{
    DescriptorBindingBuilder, DescriptorPool, DescriptorSetLayout, update_descriptor_sets,
};
use spinquad_rhi::device::Device;
use spinquad_rhi::instance::Instance;
use spinquad_rhi::physical_device::select_physical_device;
use spinquad_rhi::pipeline::{
    CullMode, FrontFace, GraphicsPipelineBuilder, Pipeline, PipelineLayout,
};
use spinquad_rhi::render_pass::{Framebuffer, RenderPass};
use spinquad_rhi::shader::{Shader, ShaderStage};
use spinquad_rhi::swapchain::Swapchain;
use spinquad_rhi::texture::Texture;
use spinquad_rhi::vertex::QuadVertex;
use spinquad_rhi::{RhiError, vk};

use crate::MAX_FRAMES_IN_FLIGHT;
use crate::frame::FrameRing;
use crate::quad::{QUAD_INDICES, QUAD_VERTICES};
use crate::scheduler::{
    AcquireOutcome, FrameBackend, FrameOutcome, FrameScheduler, PresentOutcome,
};
use crate::ubo::TransformUbo;

const VERT_SHADER_PATH: &str = "shaders/spirv/quad.vert.spv";
const FRAG_SHADER_PATH: &str = "shaders/spirv/quad.frag.spv";
const TEXTURE_PATH: &str = "assets/textures/checker.png";

/// Upper bound on descriptor sets; swapchains stay well under this.
const MAX_DESCRIPTOR_SETS: u32 = 8;

/// Maps RHI errors onto the process-level error categories.
fn rhi_err(e: RhiError) -> Error {
    match e {
        RhiError::ShaderError(msg) => Error::Asset(msg),
        other => Error::Vulkan(other.to_string()),
    }
}

/// Owns all Vulkan state and renders the spinning quad.
pub struct Renderer {
    instance: ManuallyDrop<Instance>,
    surface: ManuallyDrop<Surface>,
    device: ManuallyDrop<Arc<Device>>,
    swapchain: ManuallyDrop<Swapchain>,
    render_pass: ManuallyDrop<RenderPass>,
    descriptor_set_layout: ManuallyDrop<DescriptorSetLayout>,
    descriptor_pool: ManuallyDrop<DescriptorPool>,
    vert_shader: ManuallyDrop<Shader>,
    frag_shader: ManuallyDrop<Shader>,
    pipeline_layout: ManuallyDrop<PipelineLayout>,
    pipeline: ManuallyDrop<Pipeline>,
    framebuffers: Vec<Framebuffer>,
    command_pool: ManuallyDrop<CommandPool>,
    command_buffers: Vec<vk::CommandBuffer>,
    vertex_buffer: ManuallyDrop<Buffer>,
    index_buffer: ManuallyDrop<Buffer>,
    texture: ManuallyDrop<Texture>,
    uniform_buffers: Vec<Buffer>,
    descriptor_sets: Vec<vk::DescriptorSet>,
    frames: ManuallyDrop<FrameRing>,
    scheduler: FrameScheduler,
    timer: Timer,
}

impl Renderer {
    /// Creates a renderer presenting to `window`.
    ///
    /// # Errors
    ///
    /// Surfaces Vulkan setup failures as [`Error::Vulkan`] and missing
    /// shader or texture files as [`Error::Asset`].
    pub fn new(window: &Window) -> Result<Self> {
        let width = window.width();
        let height = window.height();
        info!("Initializing renderer ({width}x{height})");

        let enable_validation = cfg!(debug_assertions);
        let surface_extensions = window.required_extensions()?;
        let instance =
            Instance::new(enable_validation, &surface_extensions).map_err(rhi_err)?;

        let surface = window.create_surface(instance.entry(), instance.handle())?;

        let physical_device =
            select_physical_device(instance.handle(), surface.handle(), surface.loader())
                .map_err(rhi_err)?;
        let device = Device::new(&instance, &physical_device).map_err(rhi_err)?;

        let swapchain = Swapchain::new(
            instance.handle(),
            Arc::clone(&device),
            surface.handle(),
            surface.loader(),
            width,
            height,
        )
        .map_err(rhi_err)?;

        let render_pass =
            RenderPass::new(Arc::clone(&device), swapchain.format()).map_err(rhi_err)?;

        let bindings = [
            DescriptorBindingBuilder::uniform_buffer(0, vk::ShaderStageFlags::VERTEX),
            DescriptorBindingBuilder::combined_image_sampler(1, vk::ShaderStageFlags::FRAGMENT),
        ];
        let descriptor_set_layout =
            DescriptorSetLayout::new(Arc::clone(&device), &bindings).map_err(rhi_err)?;

        let pool_sizes = [
            vk::DescriptorPoolSize::default()
                .ty(vk::DescriptorType::UNIFORM_BUFFER)
                .descriptor_count(MAX_DESCRIPTOR_SETS),
            vk::DescriptorPoolSize::default()
                .ty(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                .descriptor_count(MAX_DESCRIPTOR_SETS),
        ];
        let descriptor_pool =
            DescriptorPool::new(Arc::clone(&device), MAX_DESCRIPTOR_SETS, &pool_sizes)
                .map_err(rhi_err)?;

        let vert_shader = Shader::from_spirv_file(
            Arc::clone(&device),
            Path::new(VERT_SHADER_PATH),
            ShaderStage::Vertex,
            "main",
        )
        .map_err(rhi_err)?;
        let frag_shader = Shader::from_spirv_file(
            Arc::clone(&device),
            Path::new(FRAG_SHADER_PATH),
            ShaderStage::Fragment,
            "main",
        )
        .map_err(rhi_err)?;

        let pipeline_layout =
            PipelineLayout::new(Arc::clone(&device), &[descriptor_set_layout.handle()])
                .map_err(rhi_err)?;
        let pipeline = Self::build_pipeline(
            &device,
            &vert_shader,
            &frag_shader,
            &pipeline_layout,
            render_pass.handle(),
            swapchain.extent(),
        )
        .map_err(rhi_err)?;

        let framebuffers =
            Self::create_framebuffers(&device, &swapchain, render_pass.handle())
                .map_err(rhi_err)?;

        let command_pool = CommandPool::new(Arc::clone(&device)).map_err(rhi_err)?;

        let vertex_buffer = Buffer::device_local_with_data(
            Arc::clone(&device),
            BufferUsage::Vertex,
            bytemuck::cast_slice(&QUAD_VERTICES),
            &command_pool,
        )
        .map_err(rhi_err)?;
        let index_buffer = Buffer::device_local_with_data(
            Arc::clone(&device),
            BufferUsage::Index,
            bytemuck::cast_slice(&QUAD_INDICES),
            &command_pool,
        )
        .map_err(rhi_err)?;

        let texture = Self::load_texture(&device, &command_pool)?;

        let image_count = swapchain.image_count() as usize;
        let uniform_buffers =
            Self::create_uniform_buffers(&device, image_count).map_err(rhi_err)?;
        let descriptor_sets = Self::create_descriptor_sets(
            &device,
            &descriptor_pool,
            &descriptor_set_layout,
            &uniform_buffers,
            &texture,
        )
        .map_err(rhi_err)?;

        let command_buffers = command_pool
            .allocate_command_buffers(image_count as u32)
            .map_err(rhi_err)?;

        let frames = FrameRing::new(&device, MAX_FRAMES_IN_FLIGHT).map_err(rhi_err)?;
        let scheduler = FrameScheduler::new(MAX_FRAMES_IN_FLIGHT, image_count);

        let renderer = Self {
            instance: ManuallyDrop::new(instance),
            surface: ManuallyDrop::new(surface),
            device: ManuallyDrop::new(device),
            swapchain: ManuallyDrop::new(swapchain),
            render_pass: ManuallyDrop::new(render_pass),
            descriptor_set_layout: ManuallyDrop::new(descriptor_set_layout),
            descriptor_pool: ManuallyDrop::new(descriptor_pool),
            vert_shader: ManuallyDrop::new(vert_shader),
            frag_shader: ManuallyDrop::new(frag_shader),
            pipeline_layout: ManuallyDrop::new(pipeline_layout),
            pipeline: ManuallyDrop::new(pipeline),
            framebuffers,
            command_pool: ManuallyDrop::new(command_pool),
            command_buffers,
            vertex_buffer: ManuallyDrop::new(vertex_buffer),
            index_buffer: ManuallyDrop::new(index_buffer),
            texture: ManuallyDrop::new(texture),
            uniform_buffers,
            descriptor_sets,
            frames: ManuallyDrop::new(frames),
            scheduler,
            timer: Timer::new(),
        };
        renderer.record_command_buffers().map_err(rhi_err)?;

        info!(
            "Renderer ready: {} swapchain images, {} frames in flight",
            image_count, MAX_FRAMES_IN_FLIGHT
        );
        Ok(renderer)
    }

    fn build_pipeline(
        device: &Arc<Device>,
        vert_shader: &Shader,
        frag_shader: &Shader,
        layout: &PipelineLayout,
        render_pass: vk::RenderPass,
        extent: vk::Extent2D,
    ) -> spinquad_rhi::RhiResult<Pipeline> {
        let attributes = QuadVertex::attribute_descriptions();
        GraphicsPipelineBuilder::new()
            .vertex_shader(vert_shader)
            .fragment_shader(frag_shader)
            .vertex_binding(QuadVertex::binding_description())
            .vertex_attributes(&attributes)
            .cull_mode(CullMode::Back)
            .front_face(FrontFace::CounterClockwise)
            .render_pass(render_pass)
            .extent(extent)
            .build(Arc::clone(device), layout)
    }

    fn create_framebuffers(
        device: &Arc<Device>,
        swapchain: &Swapchain,
        render_pass: vk::RenderPass,
    ) -> spinquad_rhi::RhiResult<Vec<Framebuffer>> {
        let extent = swapchain.extent();
        (0..swapchain.image_count() as usize)
            .map(|i| {
                Framebuffer::new(
                    Arc::clone(device),
                    render_pass,
                    swapchain.image_view(i),
                    extent,
                )
            })
            .collect()
    }

    fn load_texture(device: &Arc<Device>, pool: &CommandPool) -> Result<Texture> {
        let image = image::open(Path::new(TEXTURE_PATH))
            .map_err(|e| Error::Asset(format!("failed to load {TEXTURE_PATH}: {e}")))?;
        let rgba = image.into_rgba8();
        let (width, height) = rgba.dimensions();
        debug!("Texture loaded: {TEXTURE_PATH} ({width}x{height})");
        Texture::from_rgba8(Arc::clone(device), pool, width, height, rgba.as_raw())
            .map_err(rhi_err)
    }

    fn create_uniform_buffers(
        device: &Arc<Device>,
        count: usize,
    ) -> spinquad_rhi::RhiResult<Vec<Buffer>> {
        (0..count)
            .map(|_| {
                Buffer::new(
                    Arc::clone(device),
                    BufferUsage::Uniform,
                    TransformUbo::SIZE as u64,
                )
            })
            .collect()
    }

    fn create_descriptor_sets(
        device: &Arc<Device>,
        pool: &DescriptorPool,
        layout: &DescriptorSetLayout,
        uniform_buffers: &[Buffer],
        texture: &Texture,
    ) -> spinquad_rhi::RhiResult<Vec<vk::DescriptorSet>> {
        let layouts = vec![layout.handle(); uniform_buffers.len()];
        let sets = pool.allocate(&layouts)?;

        for (&set, ubo) in sets.iter().zip(uniform_buffers) {
            let buffer_infos = [vk::DescriptorBufferInfo::default()
                .buffer(ubo.handle())
                .offset(0)
                .range(TransformUbo::SIZE as u64)];
            let image_infos = [vk::DescriptorImageInfo::default()
                .sampler(texture.sampler())
                .image_view(texture.view())
                .image_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)];

            let writes = [
                vk::WriteDescriptorSet::default()
                    .dst_set(set)
                    .dst_binding(0)
                    .dst_array_element(0)
                    .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
                    .buffer_info(&buffer_infos),
                vk::WriteDescriptorSet::default()
                    .dst_set(set)
                    .dst_binding(1)
                    .dst_array_element(0)
                    .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                    .image_info(&image_infos),
            ];
            update_descriptor_sets(device, &writes);
        }

        Ok(sets)
    }

    /// Records the draw commands for every swapchain image.
    ///
    /// Commands are static apart from the descriptor set binding, so each
    /// buffer is recorded once and resubmitted until the next recreation.
    fn record_command_buffers(&self) -> spinquad_rhi::RhiResult<()> {
        let raw = self.device.handle();
        let extent = self.swapchain.extent();

        for (i, &cmd) in self.command_buffers.iter().enumerate() {
            // SAFETY: cmd is allocated from our pool and, per the frame
            // fences, not pending execution while re-recorded.
            unsafe {
                raw.reset_command_buffer(cmd, vk::CommandBufferResetFlags::empty())?;
                raw.begin_command_buffer(cmd, &vk::CommandBufferBeginInfo::default())?;

                let clear_values = [vk::ClearValue {
                    color: vk::ClearColorValue {
                        float32: [0.0, 0.0, 0.0, 1.0],
                    },
                }];
                let begin_info = vk::RenderPassBeginInfo::default()
                    .render_pass(self.render_pass.handle())
                    .framebuffer(self.framebuffers[i].handle())
                    .render_area(vk::Rect2D {
                        offset: vk::Offset2D { x: 0, y: 0 },
                        extent,
                    })
                    .clear_values(&clear_values);

                raw.cmd_begin_render_pass(cmd, &begin_info, vk::SubpassContents::INLINE);
                raw.cmd_bind_pipeline(
                    cmd,
                    vk::PipelineBindPoint::GRAPHICS,
                    self.pipeline.handle(),
                );
                raw.cmd_bind_vertex_buffers(cmd, 0, &[self.vertex_buffer.handle()], &[0]);
                raw.cmd_bind_index_buffer(
                    cmd,
                    self.index_buffer.handle(),
                    0,
                    vk::IndexType::UINT16,
                );
                raw.cmd_bind_descriptor_sets(
                    cmd,
                    vk::PipelineBindPoint::GRAPHICS,
                    self.pipeline_layout.handle(),
                    0,
                    &[self.descriptor_sets[i]],
                    &[],
                );
                raw.cmd_draw_indexed(cmd, QUAD_INDICES.len() as u32, 1, 0, 0, 0);
                raw.cmd_end_render_pass(cmd);
                raw.end_command_buffer(cmd)?;
            }
        }

        debug!("Recorded {} command buffers", self.command_buffers.len());
        Ok(())
    }

    /// Notifies the renderer of a window resize.
    ///
    /// The swapchain is rebuilt lazily, at the start of the next frame.
    pub fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        let current = self.swapchain.extent();
        if width != current.width || height != current.height {
            debug!(
                "Resize {}x{} -> {width}x{height}, rebuild requested",
                current.width, current.height
            );
            self.scheduler.request_rebuild();
        }
    }

    /// Renders and presents one frame.
    ///
    /// Rebuilds the swapchain first when a resize or stale present is
    /// pending. Any error is fatal to the frame loop.
    pub fn render_frame(&mut self, window: &Window) -> Result<()> {
        if self.scheduler.rebuild_requested() {
            self.recreate_swapchain(window)?;
        }

        let extent = self.swapchain.extent();
        let mut backend = GpuFrames {
            device: &self.device,
            swapchain: &self.swapchain,
            frames: &self.frames,
            command_buffers: &self.command_buffers,
            uniform_buffers: &self.uniform_buffers,
            elapsed: self.timer.elapsed_secs(),
            aspect: extent.width as f32 / extent.height as f32,
            suboptimal_acquire: false,
        };

        let outcome = self.scheduler.drive(&mut backend).map_err(rhi_err)?;
        let suboptimal = backend.suboptimal_acquire;

        if suboptimal {
            self.scheduler.request_rebuild();
        }
        if outcome == FrameOutcome::SkippedStale {
            debug!("Frame skipped, swapchain stale");
        }
        Ok(())
    }

    /// Rebuilds everything that depends on the surface extent.
    ///
    /// Blocks while the window reports a degenerate extent (minimized), then
    /// waits for device idle and replaces swapchain, render pass, pipeline,
    /// framebuffers, and command buffers. Failures here are fatal.
    fn recreate_swapchain(&mut self, window: &Window) -> Result<()> {
        let (width, height) = poll_nonzero_extent(|| window.framebuffer_extent());
        info!("Recreating swapchain at {width}x{height}");

        self.device.wait_idle().map_err(rhi_err)?;

        let old_image_count = self.swapchain.image_count() as usize;

        // Framebuffers and command buffers reference the old image views and
        // pipeline; they go first.
        self.framebuffers.clear();
        self.command_pool.free_command_buffers(&self.command_buffers);
        self.command_buffers.clear();

        self.swapchain
            .recreate(self.surface.handle(), self.surface.loader(), width, height)
            .map_err(rhi_err)?;

        let render_pass =
            RenderPass::new(Arc::clone(&self.device), self.swapchain.format())
                .map_err(rhi_err)?;
        let pipeline = Self::build_pipeline(
            &self.device,
            &self.vert_shader,
            &self.frag_shader,
            &self.pipeline_layout,
            render_pass.handle(),
            self.swapchain.extent(),
        )
        .map_err(rhi_err)?;

        let old_pipeline = std::mem::replace(&mut self.pipeline, ManuallyDrop::new(pipeline));
        drop(ManuallyDrop::into_inner(old_pipeline));
        let old_render_pass =
            std::mem::replace(&mut self.render_pass, ManuallyDrop::new(render_pass));
        drop(ManuallyDrop::into_inner(old_render_pass));

        self.framebuffers =
            Self::create_framebuffers(&self.device, &self.swapchain, self.render_pass.handle())
                .map_err(rhi_err)?;

        let image_count = self.swapchain.image_count() as usize;
        if image_count != old_image_count {
            // Per-image resources track the image count.
            self.uniform_buffers =
                Self::create_uniform_buffers(&self.device, image_count).map_err(rhi_err)?;
            self.descriptor_pool.reset().map_err(rhi_err)?;
            self.descriptor_sets = Self::create_descriptor_sets(
                &self.device,
                &self.descriptor_pool,
                &self.descriptor_set_layout,
                &self.uniform_buffers,
                &self.texture,
            )
            .map_err(rhi_err)?;
        }

        self.command_buffers = self
            .command_pool
            .allocate_command_buffers(image_count as u32)
            .map_err(rhi_err)?;
        self.record_command_buffers().map_err(rhi_err)?;

        self.scheduler.rebuild_complete(image_count);
        Ok(())
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        // Single device-idle wait before any resource is released.
        if let Err(e) = self.device.wait_idle() {
            error!("device_wait_idle failed during shutdown: {e}");
        }

        self.framebuffers.clear();
        self.uniform_buffers.clear();

        // SAFETY: each field is dropped exactly once, children before the
        // objects they were created from; the command pool frees the
        // remaining command buffers.
        unsafe {
            ManuallyDrop::drop(&mut self.pipeline);
            ManuallyDrop::drop(&mut self.pipeline_layout);
            ManuallyDrop::drop(&mut self.vert_shader);
            ManuallyDrop::drop(&mut self.frag_shader);
            ManuallyDrop::drop(&mut self.descriptor_pool);
            ManuallyDrop::drop(&mut self.descriptor_set_layout);
            ManuallyDrop::drop(&mut self.render_pass);
            ManuallyDrop::drop(&mut self.texture);
            ManuallyDrop::drop(&mut self.vertex_buffer);
            ManuallyDrop::drop(&mut self.index_buffer);
            ManuallyDrop::drop(&mut self.frames);
            ManuallyDrop::drop(&mut self.command_pool);
            ManuallyDrop::drop(&mut self.swapchain);
            ManuallyDrop::drop(&mut self.device);
            ManuallyDrop::drop(&mut self.surface);
            ManuallyDrop::drop(&mut self.instance);
        }

        info!("Renderer destroyed");
    }
}

/// Real-device frame backend borrowing the renderer's resources.
struct GpuFrames<'a> {
    device: &'a Device,
    swapchain: &'a Swapchain,
    frames: &'a FrameRing,
    command_buffers: &'a [vk::CommandBuffer],
    uniform_buffers: &'a [Buffer],
    elapsed: f32,
    aspect: f32,
    /// Set when acquire succeeded but flagged the swapchain suboptimal;
    /// handled as a deferred rebuild because the image was consumed.
    suboptimal_acquire: bool,
}

impl FrameBackend for GpuFrames<'_> {
    type Error = RhiError;

    fn wait_slot_fence(&mut self, slot: usize) -> spinquad_rhi::RhiResult<()> {
        self.frames.slot(slot).in_flight().wait(u64::MAX)
    }

    fn acquire_image(&mut self, slot: usize) -> spinquad_rhi::RhiResult<AcquireOutcome> {
        let semaphore = self.frames.slot(slot).image_available().handle();
        match self.swapchain.acquire_next_image(semaphore) {
            Ok((image_index, suboptimal)) => {
                if suboptimal {
                    self.suboptimal_acquire = true;
                }
                Ok(AcquireOutcome::Ready { image_index })
            }
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(AcquireOutcome::Stale),
            Err(e) => Err(RhiError::VulkanError(e)),
        }
    }

    fn wait_image_fence(&mut self, slot: usize) -> spinquad_rhi::RhiResult<()> {
        self.frames.slot(slot).in_flight().wait(u64::MAX)
    }

    fn reset_slot_fence(&mut self, slot: usize) -> spinquad_rhi::RhiResult<()> {
        self.frames.slot(slot).in_flight().reset()
    }

    fn submit(&mut self, slot: usize, image_index: u32) -> spinquad_rhi::RhiResult<()> {
        let image = image_index as usize;

        let ubo = TransformUbo::spin(self.elapsed, self.aspect);
        self.uniform_buffers[image].upload(bytemuck::bytes_of(&ubo))?;

        let frame = self.frames.slot(slot);
        let wait_semaphores = [frame.image_available().handle()];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let command_buffers = [self.command_buffers[image]];
        let signal_semaphores = [frame.render_finished().handle()];

        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        // SAFETY: all handles are live; the slot fence was reset by the
        // scheduler immediately before this call.
        unsafe {
            self.device.handle().queue_submit(
                self.device.graphics_queue(),
                &[submit_info],
                frame.in_flight().handle(),
            )?;
        }
        Ok(())
    }

    fn present(&mut self, slot: usize, image_index: u32) -> spinquad_rhi::RhiResult<PresentOutcome> {
        let wait = self.frames.slot(slot).render_finished().handle();
        match self
            .swapchain
            .present(self.device.present_queue(), image_index, wait)
        {
            Ok(false) => Ok(PresentOutcome::Optimal),
            Ok(true) | Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(PresentOutcome::Stale),
            Err(e) => Err(RhiError::VulkanError(e)),
        }
    }
}
