// Swapchain - Window presentation
//
// Negotiates format, present mode and extent with the surface, then owns
// the chain of presentable images and one view per image. The swapchain is
// built once: a resized window keeps rendering at the original extent.

use super::device::{LogicalDevice, QueueFamilyIndices};
use super::surface::Surface;
use super::teardown::TeardownStack;
use crate::error::{RendererError, Result};
use ash::extensions::khr;
use ash::vk;

/// Substituted when the surface reports a single UNDEFINED format,
/// meaning "anything goes".
pub const DEFAULT_SURFACE_FORMAT: vk::SurfaceFormatKHR = vk::SurfaceFormatKHR {
    format: vk::Format::R8G8B8A8_UNORM,
    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
};

/// Surface capabilities plus the formats/present modes it supports.
#[derive(Clone, Debug, Default)]
pub struct SwapchainSupportDetails {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SwapchainSupportDetails {
    pub fn query(
        loader: &khr::Surface,
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> Result<Self> {
        let query_failed = |what| move |result| RendererError::DeviceQueryFailed { what, result };

        unsafe {
            Ok(Self {
                capabilities: loader
                    .get_physical_device_surface_capabilities(physical_device, surface)
                    .map_err(query_failed("surface capabilities"))?,
                formats: loader
                    .get_physical_device_surface_formats(physical_device, surface)
                    .map_err(query_failed("surface formats"))?,
                present_modes: loader
                    .get_physical_device_surface_present_modes(physical_device, surface)
                    .map_err(query_failed("surface present modes"))?,
            })
        }
    }

    /// At least one format and one present mode.
    pub fn is_adequate(&self) -> bool {
        !self.formats.is_empty() && !self.present_modes.is_empty()
    }
}

/// Prefer 8-bit RGBA/BGRA in sRGB-nonlinear space, else the first reported.
///
/// `formats` must be non-empty (guaranteed by device selection).
pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> vk::SurfaceFormatKHR {
    if let [only] = formats {
        if only.format == vk::Format::UNDEFINED {
            return DEFAULT_SURFACE_FORMAT;
        }
    }

    formats
        .iter()
        .copied()
        .find(|f| {
            (f.format == vk::Format::R8G8B8A8_UNORM || f.format == vk::Format::B8G8R8A8_UNORM)
                && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
        })
        .or_else(|| formats.first().copied())
        .unwrap_or(DEFAULT_SURFACE_FORMAT)
}

/// The preferred mode if offered, otherwise FIFO (always supported).
pub fn choose_present_mode(
    modes: &[vk::PresentModeKHR],
    preferred: vk::PresentModeKHR,
) -> vk::PresentModeKHR {
    if modes.contains(&preferred) {
        preferred
    } else {
        vk::PresentModeKHR::FIFO
    }
}

/// Surface-dictated extent, or the window size clamped into the allowed range
/// when the surface leaves it to us (current width == u32::MAX).
pub fn choose_extent(capabilities: &vk::SurfaceCapabilitiesKHR, width: u32, height: u32) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        return capabilities.current_extent;
    }

    let min = capabilities.min_image_extent;
    let max = capabilities.max_image_extent;
    vk::Extent2D {
        width: width.max(min.width).min(max.width),
        height: height.max(min.height).min(max.height),
    }
}

/// One more than the minimum, capped by the maximum when there is one.
pub fn determine_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let count = capabilities.min_image_count + 1;
    if capabilities.max_image_count > 0 && count > capabilities.max_image_count {
        capabilities.max_image_count
    } else {
        count
    }
}

/// CONCURRENT over both families when they differ, otherwise EXCLUSIVE.
pub fn sharing_mode(indices: &QueueFamilyIndices) -> (vk::SharingMode, Vec<u32>) {
    match (indices.graphics_family, indices.presentation_family) {
        (Some(graphics), Some(presentation)) if graphics != presentation => {
            (vk::SharingMode::CONCURRENT, vec![graphics, presentation])
        }
        _ => (vk::SharingMode::EXCLUSIVE, Vec::new()),
    }
}

/// Raw image (owned by the swapchain) and the view we created for it.
#[derive(Clone, Copy, Debug)]
pub struct SwapchainImage {
    pub image: vk::Image,
    pub view: vk::ImageView,
}

pub struct Swapchain {
    pub handle: vk::SwapchainKHR,
    pub loader: khr::Swapchain,
    pub images: Vec<SwapchainImage>,
    pub format: vk::Format,
    pub extent: vk::Extent2D,
    pub present_mode: vk::PresentModeKHR,
}

impl Swapchain {
    pub fn new(
        instance: &ash::Instance,
        device: &LogicalDevice,
        physical_device: vk::PhysicalDevice,
        surface: &Surface,
        window_size: (u32, u32),
        preferred_present_mode: vk::PresentModeKHR,
        teardown: &mut TeardownStack,
    ) -> Result<Self> {
        let support = SwapchainSupportDetails::query(&surface.loader, physical_device, surface.handle)?;
        if !support.is_adequate() {
            return Err(RendererError::NoSuitableAccelerator(1));
        }

        let surface_format = choose_surface_format(&support.formats);
        let present_mode = choose_present_mode(&support.present_modes, preferred_present_mode);
        let extent = choose_extent(&support.capabilities, window_size.0, window_size.1);
        let image_count = determine_image_count(&support.capabilities);
        let (sharing, family_indices) = sharing_mode(&device.queue_families);

        log::info!(
            "Creating swapchain: {}x{} {:?} {:?}, {} image(s), {:?}",
            extent.width,
            extent.height,
            surface_format.format,
            present_mode,
            image_count,
            sharing
        );

        let create_info = vk::SwapchainCreateInfoKHR::builder()
            .surface(surface.handle)
            .min_image_count(image_count)
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(sharing)
            .queue_family_indices(&family_indices)
            .pre_transform(support.capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true)
            .old_swapchain(vk::SwapchainKHR::null());

        let loader = khr::Swapchain::new(instance, &device.device);
        let handle = unsafe { loader.create_swapchain(&create_info, None) }
            .map_err(RendererError::SwapchainCreationFailed)?;

        let release = loader.clone();
        teardown.push("swapchain", move || unsafe { release.destroy_swapchain(handle, None) });

        let raw_images = unsafe { loader.get_swapchain_images(handle) }
            .map_err(RendererError::SwapchainCreationFailed)?;
        log::info!("Created swapchain with {} images", raw_images.len());

        // Each view is registered as soon as it exists, so a failure part way
        // through releases exactly the views created so far.
        let mut images = Vec::with_capacity(raw_images.len());
        for (index, &image) in raw_images.iter().enumerate() {
            let view = create_image_view(&device.device, image, surface_format.format)
                .map_err(|result| RendererError::ImageViewCreationFailed { index, result })?;

            let owner = device.device.clone();
            teardown.push("swapchain image view", move || unsafe {
                owner.destroy_image_view(view, None)
            });
            images.push(SwapchainImage { image, view });
        }

        Ok(Self {
            handle,
            loader,
            images,
            format: surface_format.format,
            extent,
            present_mode,
        })
    }

    pub fn image_views(&self) -> Vec<vk::ImageView> {
        self.images.iter().map(|image| image.view).collect()
    }

    /// Acquire the next presentable image; `semaphore` is signaled once the
    /// presentation engine is done with it.
    pub fn acquire_next_image(&self, timeout: u64, semaphore: vk::Semaphore) -> Result<u32> {
        let result = unsafe {
            self.loader
                .acquire_next_image(self.handle, timeout, semaphore, vk::Fence::null())
        };

        match result {
            Ok((index, suboptimal)) => {
                if suboptimal {
                    log::warn!("Swapchain is suboptimal for the surface");
                }
                Ok(index)
            }
            Err(e) => Err(RendererError::AcquireFailed(e)),
        }
    }

    /// Queue `image_index` for presentation once `wait_semaphores` signal.
    pub fn present(
        &self,
        queue: vk::Queue,
        image_index: u32,
        wait_semaphores: &[vk::Semaphore],
    ) -> Result<()> {
        let swapchains = [self.handle];
        let image_indices = [image_index];

        let present_info = vk::PresentInfoKHR::builder()
            .wait_semaphores(wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        let result = unsafe { self.loader.queue_present(queue, &present_info) };

        match result {
            Ok(suboptimal) => {
                if suboptimal {
                    log::warn!("Presented to a suboptimal swapchain");
                }
                Ok(())
            }
            Err(result) => Err(RendererError::PresentFailed {
                image_index,
                result,
            }),
        }
    }
}

/// 2D color view: identity swizzle, one mip level, one layer.
fn create_image_view(
    device: &ash::Device,
    image: vk::Image,
    format: vk::Format,
) -> std::result::Result<vk::ImageView, vk::Result> {
    let create_info = vk::ImageViewCreateInfo::builder()
        .image(image)
        .view_type(vk::ImageViewType::TYPE_2D)
        .format(format)
        .components(vk::ComponentMapping {
            r: vk::ComponentSwizzle::IDENTITY,
            g: vk::ComponentSwizzle::IDENTITY,
            b: vk::ComponentSwizzle::IDENTITY,
            a: vk::ComponentSwizzle::IDENTITY,
        })
        .subresource_range(vk::ImageSubresourceRange {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        });

    unsafe { device.create_image_view(&create_info, None) }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn format(format: vk::Format, color_space: vk::ColorSpaceKHR) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR {
            format,
            color_space,
        }
    }

    #[test]
    fn test_choose_surface_format_undefined_gives_default() {
        let formats = [format(vk::Format::UNDEFINED, vk::ColorSpaceKHR::SRGB_NONLINEAR)];
        let chosen = choose_surface_format(&formats);
        assert_eq!(chosen.format, vk::Format::R8G8B8A8_UNORM);
        assert_eq!(chosen.color_space, vk::ColorSpaceKHR::SRGB_NONLINEAR);
    }

    #[test]
    fn test_choose_surface_format_prefers_srgb_anywhere() {
        let formats = [
            format(vk::Format::R16G16B16A16_SFLOAT, vk::ColorSpaceKHR::EXTENDED_SRGB_LINEAR_EXT),
            format(vk::Format::A2B10G10R10_UNORM_PACK32, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            format(vk::Format::B8G8R8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
        ];
        assert_eq!(choose_surface_format(&formats).format, vk::Format::B8G8R8A8_UNORM);

        let formats = [
            format(vk::Format::R8G8B8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            format(vk::Format::R16G16B16A16_SFLOAT, vk::ColorSpaceKHR::EXTENDED_SRGB_LINEAR_EXT),
        ];
        assert_eq!(choose_surface_format(&formats).format, vk::Format::R8G8B8A8_UNORM);
    }

    #[test]
    fn test_choose_surface_format_wrong_color_space_is_not_preferred() {
        let formats = [
            format(vk::Format::A2B10G10R10_UNORM_PACK32, vk::ColorSpaceKHR::HDR10_ST2084_EXT),
            format(vk::Format::B8G8R8A8_UNORM, vk::ColorSpaceKHR::DISPLAY_P3_NONLINEAR_EXT),
        ];
        // No preferred entry: first reported wins.
        assert_eq!(
            choose_surface_format(&formats).format,
            vk::Format::A2B10G10R10_UNORM_PACK32
        );
    }

    #[test]
    fn test_choose_present_mode_prefers_mailbox() {
        let modes = [vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX];
        assert_eq!(
            choose_present_mode(&modes, vk::PresentModeKHR::MAILBOX),
            vk::PresentModeKHR::MAILBOX
        );
    }

    #[test]
    fn test_choose_present_mode_fallback_to_fifo() {
        let modes = [vk::PresentModeKHR::FIFO, vk::PresentModeKHR::IMMEDIATE];
        assert_eq!(
            choose_present_mode(&modes, vk::PresentModeKHR::MAILBOX),
            vk::PresentModeKHR::FIFO
        );
        assert_eq!(
            choose_present_mode(&[], vk::PresentModeKHR::MAILBOX),
            vk::PresentModeKHR::FIFO
        );
    }

    #[test]
    fn test_choose_extent_uses_current() {
        let capabilities = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: 1920,
                height: 1080,
            },
            ..Default::default()
        };
        let extent = choose_extent(&capabilities, 800, 600);
        assert_eq!((extent.width, extent.height), (1920, 1080));
    }

    #[test]
    fn test_choose_extent_clamps_each_axis() {
        let capabilities = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: u32::MAX,
                height: u32::MAX,
            },
            min_image_extent: vk::Extent2D {
                width: 100,
                height: 100,
            },
            max_image_extent: vk::Extent2D {
                width: 2000,
                height: 2000,
            },
            ..Default::default()
        };

        let extent = choose_extent(&capabilities, 3000, 10);
        assert_eq!((extent.width, extent.height), (2000, 100));

        let extent = choose_extent(&capabilities, 800, 600);
        assert_eq!((extent.width, extent.height), (800, 600));
    }

    #[test]
    fn test_determine_image_count() {
        let capped = vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 2,
            ..Default::default()
        };
        assert_eq!(determine_image_count(&capped), 2);

        let roomy = vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 8,
            ..Default::default()
        };
        assert_eq!(determine_image_count(&roomy), 3);

        let unlimited = vk::SurfaceCapabilitiesKHR {
            min_image_count: 3,
            max_image_count: 0,
            ..Default::default()
        };
        assert_eq!(determine_image_count(&unlimited), 4);
    }

    #[test]
    fn test_sharing_mode() {
        let shared = QueueFamilyIndices {
            graphics_family: Some(0),
            presentation_family: Some(0),
        };
        assert_eq!(sharing_mode(&shared), (vk::SharingMode::EXCLUSIVE, vec![]));

        let split = QueueFamilyIndices {
            graphics_family: Some(0),
            presentation_family: Some(3),
        };
        assert_eq!(sharing_mode(&split), (vk::SharingMode::CONCURRENT, vec![0, 3]));
    }

    #[test]
    fn test_support_details_is_adequate() {
        let adequate = SwapchainSupportDetails {
            capabilities: vk::SurfaceCapabilitiesKHR::default(),
            formats: vec![vk::SurfaceFormatKHR::default()],
            present_modes: vec![vk::PresentModeKHR::FIFO],
        };
        assert!(adequate.is_adequate());

        let no_formats = SwapchainSupportDetails {
            formats: vec![],
            ..adequate.clone()
        };
        assert!(!no_formats.is_adequate());

        let no_modes = SwapchainSupportDetails {
            present_modes: vec![],
            ..adequate
        };
        assert!(!no_modes.is_adequate());
    }
}
