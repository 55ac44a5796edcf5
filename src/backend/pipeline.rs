// Render pass and graphics pipeline
//
// One color attachment (the swapchain image), cleared on load and handed to
// the presentation engine at the end of the pass. The pipeline draws three
// vertices generated in the vertex shader: no vertex buffers, no depth,
// no blending, no descriptor sets.

use super::shader::{ShaderModule, ShaderStage};
use super::teardown::TeardownStack;
use crate::error::{RendererError, Result};
use ash::vk;
use std::ffi::CString;
use std::path::Path;

/// The swapchain image as the pass's only attachment.
pub fn color_attachment(format: vk::Format) -> vk::AttachmentDescription {
    vk::AttachmentDescription::builder()
        .format(format)
        .samples(vk::SampleCountFlags::TYPE_1)
        .load_op(vk::AttachmentLoadOp::CLEAR)
        .store_op(vk::AttachmentStoreOp::STORE)
        .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
        .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
        .initial_layout(vk::ImageLayout::UNDEFINED)
        .final_layout(vk::ImageLayout::PRESENT_SRC_KHR)
        .build()
}

// Hold color writes until the acquired image is actually available.
fn acquire_dependency() -> vk::SubpassDependency {
    vk::SubpassDependency::builder()
        .src_subpass(vk::SUBPASS_EXTERNAL)
        .dst_subpass(0)
        .src_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
        .src_access_mask(vk::AccessFlags::empty())
        .dst_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
        .dst_access_mask(
            vk::AccessFlags::COLOR_ATTACHMENT_READ | vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
        )
        .build()
}

pub fn create_render_pass(
    device: &ash::Device,
    format: vk::Format,
    teardown: &mut TeardownStack,
) -> Result<vk::RenderPass> {
    let color_attachment_ref = vk::AttachmentReference::builder()
        .attachment(0)
        .layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
        .build();

    let color_attachments = [color_attachment_ref];
    let subpass = vk::SubpassDescription::builder()
        .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
        .color_attachments(&color_attachments)
        .build();

    let attachments = [color_attachment(format)];
    let subpasses = [subpass];
    let dependencies = [acquire_dependency()];

    let render_pass_info = vk::RenderPassCreateInfo::builder()
        .attachments(&attachments)
        .subpasses(&subpasses)
        .dependencies(&dependencies);

    let render_pass = unsafe { device.create_render_pass(&render_pass_info, None) }
        .map_err(RendererError::RenderPassCreationFailed)?;

    let owner = device.clone();
    teardown.push("render pass", move || unsafe {
        owner.destroy_render_pass(render_pass, None)
    });
    Ok(render_pass)
}

/// Full-surface viewport with the standard [0, 1] depth range.
pub fn viewport_for(extent: vk::Extent2D) -> vk::Viewport {
    vk::Viewport {
        x: 0.0,
        y: 0.0,
        width: extent.width as f32,
        height: extent.height as f32,
        min_depth: 0.0,
        max_depth: 1.0,
    }
}

pub fn scissor_for(extent: vk::Extent2D) -> vk::Rect2D {
    vk::Rect2D {
        offset: vk::Offset2D { x: 0, y: 0 },
        extent,
    }
}

/// Shader entry point as a C string. Interior NULs make it unusable.
fn entry_point_name(entry_point: &str, path: &Path) -> Result<CString> {
    CString::new(entry_point).map_err(|_| RendererError::ShaderModuleCreationFailed {
        path: path.to_path_buf(),
        reason: format!("entry point {:?} contains a NUL byte", entry_point),
    })
}

pub struct GraphicsPipeline {
    pub pipeline: vk::Pipeline,
    pub layout: vk::PipelineLayout,
    pub render_pass: vk::RenderPass,
}

impl GraphicsPipeline {
    /// Build the render pass, layout and pipeline, registering each.
    ///
    /// Shader modules are only needed while the pipeline is created and are
    /// destroyed before this returns, whether it succeeds or not.
    pub fn new(
        device: &ash::Device,
        vertex_path: &Path,
        fragment_path: &Path,
        entry_point: &str,
        extent: vk::Extent2D,
        format: vk::Format,
        teardown: &mut TeardownStack,
    ) -> Result<Self> {
        let render_pass = create_render_pass(device, format, teardown)?;

        let vertex = ShaderModule::load(device, vertex_path, ShaderStage::Vertex)?;
        let fragment = ShaderModule::load(device, fragment_path, ShaderStage::Fragment)?;
        let entry = entry_point_name(entry_point, vertex_path)?;

        let shader_stages = [&vertex, &fragment].map(|module| {
            vk::PipelineShaderStageCreateInfo::builder()
                .stage(module.stage.flags())
                .module(module.handle)
                .name(&entry)
                .build()
        });

        // Positions come from gl_VertexIndex; nothing is bound.
        let vertex_input_info = vk::PipelineVertexInputStateCreateInfo::builder();

        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::builder()
            .topology(vk::PrimitiveTopology::TRIANGLE_LIST)
            .primitive_restart_enable(false);

        let viewports = [viewport_for(extent)];
        let scissors = [scissor_for(extent)];
        let viewport_state = vk::PipelineViewportStateCreateInfo::builder()
            .viewports(&viewports)
            .scissors(&scissors);

        let rasterizer = vk::PipelineRasterizationStateCreateInfo::builder()
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(false)
            .polygon_mode(vk::PolygonMode::FILL)
            .line_width(1.0)
            .cull_mode(vk::CullModeFlags::NONE)
            .front_face(vk::FrontFace::CLOCKWISE)
            .depth_bias_enable(false);

        let multisampling = vk::PipelineMultisampleStateCreateInfo::builder()
            .sample_shading_enable(false)
            .rasterization_samples(vk::SampleCountFlags::TYPE_1);

        let color_blend_attachment = vk::PipelineColorBlendAttachmentState::builder()
            .color_write_mask(vk::ColorComponentFlags::RGBA)
            .blend_enable(false)
            .build();

        let color_blend_attachments = [color_blend_attachment];
        let color_blending = vk::PipelineColorBlendStateCreateInfo::builder()
            .logic_op_enable(false)
            .attachments(&color_blend_attachments);

        let layout_info = vk::PipelineLayoutCreateInfo::builder();
        let layout = unsafe { device.create_pipeline_layout(&layout_info, None) }.map_err(
            |result| RendererError::PipelineCreationFailed {
                stage: "pipeline layout",
                result,
            },
        )?;
        let owner = device.clone();
        teardown.push("pipeline layout", move || unsafe {
            owner.destroy_pipeline_layout(layout, None)
        });

        let pipeline_info = vk::GraphicsPipelineCreateInfo::builder()
            .stages(&shader_stages)
            .vertex_input_state(&vertex_input_info)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterizer)
            .multisample_state(&multisampling)
            .color_blend_state(&color_blending)
            .layout(layout)
            .render_pass(render_pass)
            .subpass(0)
            .build();

        let pipelines = unsafe {
            device.create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info], None)
        }
        .map_err(|(_, result)| RendererError::PipelineCreationFailed {
            stage: "graphics pipeline",
            result,
        })?;

        let pipeline = pipelines[0];
        let owner = device.clone();
        teardown.push("graphics pipeline", move || unsafe {
            owner.destroy_pipeline(pipeline, None)
        });

        log::info!(
            "Created graphics pipeline for {}x{} ({:?})",
            extent.width,
            extent.height,
            format
        );
        Ok(Self {
            pipeline,
            layout,
            render_pass,
        })
    }
}
