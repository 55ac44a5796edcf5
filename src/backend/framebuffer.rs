// Framebuffers - one per swapchain image view, bound to the render pass

use super::teardown::TeardownStack;
use crate::error::{RendererError, Result};
use ash::vk;

pub fn create_framebuffers(
    device: &ash::Device,
    image_views: &[vk::ImageView],
    render_pass: vk::RenderPass,
    extent: vk::Extent2D,
    teardown: &mut TeardownStack,
) -> Result<Vec<vk::Framebuffer>> {
    let mut framebuffers = Vec::with_capacity(image_views.len());

    for (index, &image_view) in image_views.iter().enumerate() {
        let attachments = [image_view];
        let framebuffer_info = vk::FramebufferCreateInfo::builder()
            .render_pass(render_pass)
            .attachments(&attachments)
            .width(extent.width)
            .height(extent.height)
            .layers(1);

        let framebuffer = unsafe { device.create_framebuffer(&framebuffer_info, None) }
            .map_err(|result| RendererError::FramebufferCreationFailed { index, result })?;

        let owner = device.clone();
        teardown.push("framebuffer", move || unsafe {
            owner.destroy_framebuffer(framebuffer, None)
        });
        framebuffers.push(framebuffer);
    }

    log::info!("Created {} framebuffer(s)", framebuffers.len());
    Ok(framebuffers)
}
