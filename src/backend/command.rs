// Command pool and pre-recorded command buffers
//
// The scene never changes, so every buffer is recorded once at startup,
// one per framebuffer, and resubmitted each frame. Buffers are recorded
// with SIMULTANEOUS_USE since the same one may still be pending on the
// queue when it is submitted again.

use super::teardown::TeardownStack;
use crate::error::{RendererError, Result};
use ash::vk;

/// Vertices per draw; the vertex shader indexes a constant position table.
pub const TRIANGLE_VERTEX_COUNT: u32 = 3;

pub fn create_command_pool(
    device: &ash::Device,
    graphics_family: u32,
    teardown: &mut TeardownStack,
) -> Result<vk::CommandPool> {
    let pool_info = vk::CommandPoolCreateInfo::builder().queue_family_index(graphics_family);

    let pool = unsafe { device.create_command_pool(&pool_info, None) }
        .map_err(RendererError::CommandPoolCreationFailed)?;

    let owner = device.clone();
    teardown.push("command pool", move || unsafe {
        owner.destroy_command_pool(pool, None)
    });
    Ok(pool)
}

/// Allocate `count` primary buffers from `pool`.
pub fn allocate_command_buffers(
    device: &ash::Device,
    pool: vk::CommandPool,
    count: usize,
    teardown: &mut TeardownStack,
) -> Result<Vec<vk::CommandBuffer>> {
    let alloc_info = vk::CommandBufferAllocateInfo::builder()
        .command_pool(pool)
        .level(vk::CommandBufferLevel::PRIMARY)
        .command_buffer_count(count as u32);

    let buffers = unsafe { device.allocate_command_buffers(&alloc_info) }
        .map_err(RendererError::CommandBufferAllocationFailed)?;

    let owner = device.clone();
    let release = buffers.clone();
    teardown.push("command buffers", move || unsafe {
        owner.free_command_buffers(pool, &release)
    });

    log::info!("Allocated {} command buffer(s)", buffers.len());
    Ok(buffers)
}

pub fn clear_values(clear_color: [f32; 4]) -> [vk::ClearValue; 1] {
    [vk::ClearValue {
        color: vk::ClearColorValue {
            float32: clear_color,
        },
    }]
}

fn begin_info() -> vk::CommandBufferBeginInfo {
    vk::CommandBufferBeginInfo::builder()
        .flags(vk::CommandBufferUsageFlags::SIMULTANEOUS_USE)
        .build()
}

/// What every recorded buffer draws with.
pub struct TriangleRecording<'a> {
    pub render_pass: vk::RenderPass,
    pub pipeline: vk::Pipeline,
    pub framebuffers: &'a [vk::Framebuffer],
    pub extent: vk::Extent2D,
    pub clear_color: [f32; 4],
}

/// Record `buffers[i]` to clear `framebuffers[i]` and draw the triangle.
pub fn record_triangle_commands(
    device: &ash::Device,
    buffers: &[vk::CommandBuffer],
    recording: &TriangleRecording<'_>,
) -> Result<()> {
    let clear = clear_values(recording.clear_color);
    let render_area = vk::Rect2D {
        offset: vk::Offset2D { x: 0, y: 0 },
        extent: recording.extent,
    };
    let begin = begin_info();

    for (index, (&cmd, &framebuffer)) in buffers.iter().zip(recording.framebuffers).enumerate() {
        let failed = |result| RendererError::CommandBufferRecordingFailed { index, result };

        let pass_info = vk::RenderPassBeginInfo::builder()
            .render_pass(recording.render_pass)
            .framebuffer(framebuffer)
            .render_area(render_area)
            .clear_values(&clear);

        unsafe {
            device.begin_command_buffer(cmd, &begin).map_err(failed)?;
            device.cmd_begin_render_pass(cmd, &pass_info, vk::SubpassContents::INLINE);
            device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, recording.pipeline);
            device.cmd_draw(cmd, TRIANGLE_VERTEX_COUNT, 1, 0, 0);
            device.cmd_end_render_pass(cmd);
            device.end_command_buffer(cmd).map_err(failed)?;
        }
    }

    log::debug!("Recorded {} command buffer(s)", buffers.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clear_values_carry_color() {
        let values = clear_values([0.1, 0.2, 0.3, 1.0]);
        let color = unsafe { values[0].color.float32 };
        assert_eq!(color, [0.1, 0.2, 0.3, 1.0]);
    }

    #[test]
    fn test_buffers_are_resubmittable() {
        let info = begin_info();
        assert!(info
            .flags
            .contains(vk::CommandBufferUsageFlags::SIMULTANEOUS_USE));
        assert!(!info
            .flags
            .contains(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT));
    }
}
