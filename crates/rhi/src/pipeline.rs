//! Graphics pipeline construction.
//!
//! # Overview
//!
//! [`GraphicsPipelineBuilder`] assembles the fixed-function state for a
//! render-pass-based pipeline with a viewport and scissor baked in at the
//! swapchain extent. Resizing therefore rebuilds the pipeline along with the
//! rest of the swapchain-dependent objects.
//!
//! # Example
//!
//! ```no_run
//! # use spinquad_rhi::pipeline::{CullMode, FrontFace, GraphicsPipelineBuilder, PipelineLayout};
//! # fn build(device: std::sync::Arc<spinquad_rhi::device::Device>,
//! #          vert: &spinquad_rhi::shader::Shader,
//! #          frag: &spinquad_rhi::shader::Shader,
//! #          layout: &PipelineLayout,
//! #          render_pass: spinquad_rhi::vk::RenderPass,
//! #          extent: spinquad_rhi::vk::Extent2D) -> spinquad_rhi::RhiResult<()> {
//! let pipeline = GraphicsPipelineBuilder::new()
//!     .vertex_shader(vert)
//!     .fragment_shader(frag)
//!     .cull_mode(CullMode::Back)
//!     .front_face(FrontFace::CounterClockwise)
//!     .render_pass(render_pass)
//!     .extent(extent)
//!     .build(device, layout)?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::shader::Shader;

/// RAII wrapper around a pipeline layout.
pub struct PipelineLayout {
    device: Arc<Device>,
    layout: vk::PipelineLayout,
}

impl PipelineLayout {
    /// Creates a pipeline layout from descriptor set layouts.
    pub fn new(device: Arc<Device>, set_layouts: &[vk::DescriptorSetLayout]) -> RhiResult<Self> {
        let create_info = vk::PipelineLayoutCreateInfo::default().set_layouts(set_layouts);

        // SAFETY: set_layouts are live handles owned by the caller.
        let layout = unsafe { device.handle().create_pipeline_layout(&create_info, None)? };

        Ok(Self { device, layout })
    }

    /// Returns the raw pipeline layout handle.
    #[inline]
    pub fn handle(&self) -> vk::PipelineLayout {
        self.layout
    }
}

impl Drop for PipelineLayout {
    fn drop(&mut self) {
        // SAFETY: destroyed exactly once; the device outlives this wrapper.
        unsafe {
            self.device
                .handle()
                .destroy_pipeline_layout(self.layout, None);
        }
    }
}

/// RAII wrapper around a graphics pipeline.
pub struct Pipeline {
    device: Arc<Device>,
    pipeline: vk::Pipeline,
}

impl Pipeline {
    /// Returns the raw pipeline handle.
    #[inline]
    pub fn handle(&self) -> vk::Pipeline {
        self.pipeline
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        // SAFETY: destroyed exactly once; the device outlives this wrapper.
        unsafe {
            self.device.handle().destroy_pipeline(self.pipeline, None);
        }
        debug!("Graphics pipeline destroyed");
    }
}

/// Primitive assembly topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PrimitiveTopology {
    /// Independent triangles from every three vertices.
    #[default]
    TriangleList,
    /// A connected triangle strip.
    TriangleStrip,
    /// Independent lines from every two vertices.
    LineList,
}

impl PrimitiveTopology {
    fn to_vk(self) -> vk::PrimitiveTopology {
        match self {
            Self::TriangleList => vk::PrimitiveTopology::TRIANGLE_LIST,
            Self::TriangleStrip => vk::PrimitiveTopology::TRIANGLE_STRIP,
            Self::LineList => vk::PrimitiveTopology::LINE_LIST,
        }
    }
}

/// Face culling mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CullMode {
    /// No culling.
    None,
    /// Cull front faces.
    Front,
    /// Cull back faces.
    #[default]
    Back,
}

impl CullMode {
    fn to_vk(self) -> vk::CullModeFlags {
        match self {
            Self::None => vk::CullModeFlags::NONE,
            Self::Front => vk::CullModeFlags::FRONT,
            Self::Back => vk::CullModeFlags::BACK,
        }
    }
}

/// Winding order that counts as front facing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FrontFace {
    /// Counter-clockwise winding is front facing.
    #[default]
    CounterClockwise,
    /// Clockwise winding is front facing.
    Clockwise,
}

impl FrontFace {
    fn to_vk(self) -> vk::FrontFace {
        match self {
            Self::CounterClockwise => vk::FrontFace::COUNTER_CLOCKWISE,
            Self::Clockwise => vk::FrontFace::CLOCKWISE,
        }
    }
}

/// Builder for a graphics pipeline with fixed viewport state.
pub struct GraphicsPipelineBuilder<'a> {
    vertex_shader: Option<&'a Shader>,
    fragment_shader: Option<&'a Shader>,
    vertex_binding: Option<vk::VertexInputBindingDescription>,
    vertex_attributes: &'a [vk::VertexInputAttributeDescription],
    topology: PrimitiveTopology,
    cull_mode: CullMode,
    front_face: FrontFace,
    render_pass: vk::RenderPass,
    subpass: u32,
    extent: vk::Extent2D,
}

impl Default for GraphicsPipelineBuilder<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> GraphicsPipelineBuilder<'a> {
    /// Creates a builder with default state.
    pub fn new() -> Self {
        Self {
            vertex_shader: None,
            fragment_shader: None,
            vertex_binding: None,
            vertex_attributes: &[],
            topology: PrimitiveTopology::default(),
            cull_mode: CullMode::default(),
            front_face: FrontFace::default(),
            render_pass: vk::RenderPass::null(),
            subpass: 0,
            extent: vk::Extent2D::default(),
        }
    }

    /// Sets the vertex shader.
    pub fn vertex_shader(mut self, shader: &'a Shader) -> Self {
        self.vertex_shader = Some(shader);
        self
    }

    /// Sets the fragment shader.
    pub fn fragment_shader(mut self, shader: &'a Shader) -> Self {
        self.fragment_shader = Some(shader);
        self
    }

    /// Sets the vertex buffer binding description.
    pub fn vertex_binding(mut self, binding: vk::VertexInputBindingDescription) -> Self {
        self.vertex_binding = Some(binding);
        self
    }

    /// Sets the vertex attribute descriptions.
    pub fn vertex_attributes(
        mut self,
        attributes: &'a [vk::VertexInputAttributeDescription],
    ) -> Self {
        self.vertex_attributes = attributes;
        self
    }

    /// Sets the primitive topology.
    pub fn topology(mut self, topology: PrimitiveTopology) -> Self {
        self.topology = topology;
        self
    }

    /// Sets the cull mode.
    pub fn cull_mode(mut self, cull_mode: CullMode) -> Self {
        self.cull_mode = cull_mode;
        self
    }

    /// Sets the front face winding.
    pub fn front_face(mut self, front_face: FrontFace) -> Self {
        self.front_face = front_face;
        self
    }

    /// Sets the render pass the pipeline will be used with.
    pub fn render_pass(mut self, render_pass: vk::RenderPass) -> Self {
        self.render_pass = render_pass;
        self
    }

    /// Sets the subpass index.
    pub fn subpass(mut self, subpass: u32) -> Self {
        self.subpass = subpass;
        self
    }

    /// Sets the fixed viewport and scissor extent.
    pub fn extent(mut self, extent: vk::Extent2D) -> Self {
        self.extent = extent;
        self
    }

    /// Builds the graphics pipeline.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::PipelineError`] when a required piece of state is
    /// missing, or the Vulkan error from pipeline creation.
    pub fn build(self, device: Arc<Device>, layout: &PipelineLayout) -> RhiResult<Pipeline> {
        let vertex_shader = self
            .vertex_shader
            .ok_or_else(|| RhiError::PipelineError("missing vertex shader".into()))?;
        let fragment_shader = self
            .fragment_shader
            .ok_or_else(|| RhiError::PipelineError("missing fragment shader".into()))?;
        if self.render_pass == vk::RenderPass::null() {
            return Err(RhiError::PipelineError("missing render pass".into()));
        }
        if self.extent.width == 0 || self.extent.height == 0 {
            return Err(RhiError::PipelineError("zero viewport extent".into()));
        }

        let stages = [
            vertex_shader.stage_create_info(),
            fragment_shader.stage_create_info(),
        ];

        let bindings: Vec<vk::VertexInputBindingDescription> =
            self.vertex_binding.into_iter().collect();
        let vertex_input = vk::PipelineVertexInputStateCreateInfo::default()
            .vertex_binding_descriptions(&bindings)
            .vertex_attribute_descriptions(self.vertex_attributes);

        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::default()
            .topology(self.topology.to_vk())
            .primitive_restart_enable(false);

        let viewports = [vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: self.extent.width as f32,
            height: self.extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        }];
        let scissors = [vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent: self.extent,
        }];
        let viewport_state = vk::PipelineViewportStateCreateInfo::default()
            .viewports(&viewports)
            .scissors(&scissors);

        let rasterizer = vk::PipelineRasterizationStateCreateInfo::default()
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(false)
            .polygon_mode(vk::PolygonMode::FILL)
            .line_width(1.0)
            .cull_mode(self.cull_mode.to_vk())
            .front_face(self.front_face.to_vk())
            .depth_bias_enable(false);

        let multisample = vk::PipelineMultisampleStateCreateInfo::default()
            .rasterization_samples(vk::SampleCountFlags::TYPE_1)
            .sample_shading_enable(false);

        let blend_attachments = [vk::PipelineColorBlendAttachmentState::default()
            .blend_enable(false)
            .color_write_mask(vk::ColorComponentFlags::RGBA)];
        let color_blend = vk::PipelineColorBlendStateCreateInfo::default()
            .logic_op_enable(false)
            .attachments(&blend_attachments);

        let create_info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterizer)
            .multisample_state(&multisample)
            .color_blend_state(&color_blend)
            .layout(layout.handle())
            .render_pass(self.render_pass)
            .subpass(self.subpass);

        // SAFETY: all referenced state lives on the stack for the duration
        // of the call; shader modules and layout are live handles.
        let pipelines = unsafe {
            device
                .handle()
                .create_graphics_pipelines(vk::PipelineCache::null(), &[create_info], None)
                .map_err(|(_, result)| result)?
        };

        debug!(
            "Graphics pipeline created at {}x{}",
            self.extent.width, self.extent.height
        );

        Ok(Pipeline {
            device,
            pipeline: pipelines[0],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topology_to_vk() {
        assert_eq!(
            PrimitiveTopology::TriangleList.to_vk(),
            vk::PrimitiveTopology::TRIANGLE_LIST
        );
        assert_eq!(
            PrimitiveTopology::TriangleStrip.to_vk(),
            vk::PrimitiveTopology::TRIANGLE_STRIP
        );
        assert_eq!(
            PrimitiveTopology::LineList.to_vk(),
            vk::PrimitiveTopology::LINE_LIST
        );
    }

    #[test]
    fn test_cull_mode_to_vk() {
        assert_eq!(CullMode::None.to_vk(), vk::CullModeFlags::NONE);
        assert_eq!(CullMode::Front.to_vk(), vk::CullModeFlags::FRONT);
        assert_eq!(CullMode::Back.to_vk(), vk::CullModeFlags::BACK);
    }

    #[test]
    fn test_front_face_to_vk() {
        assert_eq!(
            FrontFace::CounterClockwise.to_vk(),
            vk::FrontFace::COUNTER_CLOCKWISE
        );
        assert_eq!(FrontFace::Clockwise.to_vk(), vk::FrontFace::CLOCKWISE);
    }

    #[test]
    fn test_builder_defaults() {
        let builder = GraphicsPipelineBuilder::new();
        assert_eq!(builder.topology, PrimitiveTopology::TriangleList);
        assert_eq!(builder.cull_mode, CullMode::Back);
        assert_eq!(builder.front_face, FrontFace::CounterClockwise);
        assert_eq!(builder.subpass, 0);
    }
}
