// Vulkan Device - GPU selection and logical device
//
// Responsibilities:
// - Enumerate physical devices and gather what selection needs
// - Filter: complete queue families, swapchain extension, non-empty
//   surface formats and present modes
// - Score the survivors (prefer discrete GPU, then larger max 2D image)
// - Logical device with one queue per distinct family

use super::instance::first_missing_extension;
use super::swapchain::SwapchainSupportDetails;
use super::teardown::TeardownStack;
use crate::error::{RendererError, Result};
use ash::extensions::khr;
use ash::vk;
use std::collections::BTreeSet;
use std::ffi::{c_char, CStr};

/// Device extensions every candidate must offer.
pub const REQUIRED_DEVICE_EXTENSIONS: &[&CStr] = &[c"VK_KHR_swapchain"];

static QUEUE_PRIORITIES: [f32; 1] = [1.0];

/// Queue family indices for graphics and presentation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    pub graphics_family: Option<u32>,
    pub presentation_family: Option<u32>,
}

impl QueueFamilyIndices {
    /// First family with graphics support, first family that can present.
    ///
    /// Families reporting zero queues are skipped. `supports_present` is
    /// asked about each family index in order until one answers yes.
    pub fn discover<F>(families: &[vk::QueueFamilyProperties], mut supports_present: F) -> Result<Self>
    where
        F: FnMut(u32) -> Result<bool>,
    {
        let mut indices = Self::default();

        for (index, family) in families.iter().enumerate() {
            if family.queue_count == 0 {
                continue;
            }
            let index = index as u32;

            if indices.graphics_family.is_none()
                && family.queue_flags.contains(vk::QueueFlags::GRAPHICS)
            {
                indices.graphics_family = Some(index);
            }
            if indices.presentation_family.is_none() && supports_present(index)? {
                indices.presentation_family = Some(index);
            }
            if indices.is_valid() {
                break;
            }
        }

        Ok(indices)
    }

    /// Both families are known.
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.graphics_family.is_some() && self.presentation_family.is_some()
    }

    /// Distinct known family indices, ascending.
    pub fn unique_families(&self) -> Vec<u32> {
        let set: BTreeSet<u32> = self
            .graphics_family
            .into_iter()
            .chain(self.presentation_family)
            .collect();
        set.into_iter().collect()
    }

    /// Graphics and presentation live in different families.
    pub fn is_split(&self) -> bool {
        self.is_valid() && self.graphics_family != self.presentation_family
    }
}

/// Everything selection looks at for one physical device.
#[derive(Clone, Debug)]
pub struct DeviceCandidate {
    pub handle: vk::PhysicalDevice,
    pub name: String,
    pub device_type: vk::PhysicalDeviceType,
    pub max_image_dimension_2d: u32,
    pub queue_families: QueueFamilyIndices,
    pub extensions_supported: bool,
    pub swapchain_support: SwapchainSupportDetails,
}

impl DeviceCandidate {
    pub fn is_suitable(&self) -> bool {
        self.queue_families.is_valid()
            && self.extensions_supported
            && self.swapchain_support.is_adequate()
    }

    pub fn score(&self) -> u64 {
        let type_bonus = match self.device_type {
            vk::PhysicalDeviceType::DISCRETE_GPU => 1000,
            _ => 0,
        };
        type_bonus + u64::from(self.max_image_dimension_2d)
    }
}

/// Highest-scoring suitable candidate; earlier candidates win ties.
pub fn pick_best(candidates: Vec<DeviceCandidate>) -> Result<DeviceCandidate> {
    if candidates.is_empty() {
        return Err(RendererError::NoAcceleratorFound);
    }
    let total = candidates.len();

    let mut best: Option<DeviceCandidate> = None;
    for candidate in candidates {
        if !candidate.is_suitable() {
            log::debug!("Rejected GPU {} (unsuitable)", candidate.name);
            continue;
        }
        log::debug!("GPU {} scores {}", candidate.name, candidate.score());
        let better = match &best {
            Some(current) => candidate.score() > current.score(),
            None => true,
        };
        if better {
            best = Some(candidate);
        }
    }

    best.ok_or(RendererError::NoSuitableAccelerator(total))
}

/// Surface details are only queried for devices that can present to the
/// surface and offer the swapchain extension; others get empty details.
fn swapchain_support_if_presentable<F>(
    queue_families: &QueueFamilyIndices,
    extensions_supported: bool,
    query: F,
) -> Result<SwapchainSupportDetails>
where
    F: FnOnce() -> Result<SwapchainSupportDetails>,
{
    if queue_families.is_valid() && extensions_supported {
        query()
    } else {
        Ok(SwapchainSupportDetails::default())
    }
}

fn query_candidate(
    instance: &ash::Instance,
    surface_loader: &khr::Surface,
    surface: vk::SurfaceKHR,
    device: vk::PhysicalDevice,
) -> Result<DeviceCandidate> {
    let props = unsafe { instance.get_physical_device_properties(device) };
    let name = unsafe { CStr::from_ptr(props.device_name.as_ptr()) }
        .to_string_lossy()
        .into_owned();

    let families = unsafe { instance.get_physical_device_queue_family_properties(device) };
    let queue_families = QueueFamilyIndices::discover(&families, |index| {
        let supported =
            unsafe { surface_loader.get_physical_device_surface_support(device, index, surface) };
        supported.map_err(|result| RendererError::DeviceQueryFailed {
            what: "surface presentation support",
            result,
        })
    })?;

    let extensions = unsafe { instance.enumerate_device_extension_properties(device) }
        .map_err(|result| RendererError::DeviceQueryFailed {
            what: "device extensions",
            result,
        })?;
    let extensions_supported = !extensions.is_empty()
        && first_missing_extension(&extensions, REQUIRED_DEVICE_EXTENSIONS).is_none();

    let swapchain_support = swapchain_support_if_presentable(
        &queue_families,
        extensions_supported,
        || SwapchainSupportDetails::query(surface_loader, device, surface),
    )?;

    Ok(DeviceCandidate {
        handle: device,
        name,
        device_type: props.device_type,
        max_image_dimension_2d: props.limits.max_image_dimension2_d,
        queue_families,
        extensions_supported,
        swapchain_support,
    })
}

/// Query every device and pick the best. A device whose queries fail is
/// skipped as unsuitable rather than failing selection.
pub fn select_from<F>(devices: &[vk::PhysicalDevice], mut query: F) -> Result<DeviceCandidate>
where
    F: FnMut(vk::PhysicalDevice) -> Result<DeviceCandidate>,
{
    if devices.is_empty() {
        return Err(RendererError::NoAcceleratorFound);
    }

    let candidates: Vec<DeviceCandidate> = devices
        .iter()
        .filter_map(|&device| match query(device) {
            Ok(candidate) => Some(candidate),
            Err(e) => {
                log::warn!("Skipping GPU {:?}: {}", device, e);
                None
            }
        })
        .collect();

    pick_best(candidates).map_err(|e| match e {
        RendererError::NoAcceleratorFound | RendererError::NoSuitableAccelerator(_) => {
            RendererError::NoSuitableAccelerator(devices.len())
        }
        other => other,
    })
}

/// Pick the physical device to render with. Read-only: nothing is created.
pub fn select_device(
    instance: &ash::Instance,
    surface_loader: &khr::Surface,
    surface: vk::SurfaceKHR,
) -> Result<DeviceCandidate> {
    let devices = unsafe { instance.enumerate_physical_devices() }.map_err(|result| {
        RendererError::DeviceQueryFailed {
            what: "physical devices",
            result,
        }
    })?;
    log::info!("Found {} Vulkan device(s)", devices.len());

    let chosen = select_from(&devices, |device| {
        query_candidate(instance, surface_loader, surface, device)
    })?;
    log::info!(
        "Selected GPU: {} ({:?}, graphics family {:?}, presentation family {:?})",
        chosen.name,
        chosen.device_type,
        chosen.queue_families.graphics_family,
        chosen.queue_families.presentation_family
    );
    Ok(chosen)
}

/// One queue (priority 1.0) per distinct family.
pub fn queue_create_infos(indices: &QueueFamilyIndices) -> Vec<vk::DeviceQueueCreateInfo> {
    indices
        .unique_families()
        .into_iter()
        .map(|family| {
            vk::DeviceQueueCreateInfo::builder()
                .queue_family_index(family)
                .queue_priorities(&QUEUE_PRIORITIES)
                .build()
        })
        .collect()
}

/// Logical device plus the queues the renderer submits and presents on.
pub struct LogicalDevice {
    pub device: ash::Device,
    pub graphics_queue: vk::Queue,
    pub presentation_queue: vk::Queue,
    pub queue_families: QueueFamilyIndices,
}

impl LogicalDevice {
    pub fn new(
        instance: &ash::Instance,
        candidate: &DeviceCandidate,
        required_extensions: &[&CStr],
        teardown: &mut TeardownStack,
    ) -> Result<Self> {
        let indices = candidate.queue_families;
        let (graphics_family, presentation_family) =
            match (indices.graphics_family, indices.presentation_family) {
                (Some(g), Some(p)) => (g, p),
                _ => return Err(RendererError::NoSuitableAccelerator(1)),
            };

        let queue_infos = queue_create_infos(&indices);
        let extension_ptrs: Vec<*const c_char> =
            required_extensions.iter().map(|e| e.as_ptr()).collect();
        let features = vk::PhysicalDeviceFeatures::default();

        let create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(&queue_infos)
            .enabled_extension_names(&extension_ptrs)
            .enabled_features(&features);

        let device = unsafe { instance.create_device(candidate.handle, &create_info, None) }
            .map_err(RendererError::DeviceCreationFailed)?;

        let handle = device.clone();
        teardown.push("logical device", move || unsafe { handle.destroy_device(None) });

        let graphics_queue = unsafe { device.get_device_queue(graphics_family, 0) };
        let presentation_queue = unsafe { device.get_device_queue(presentation_family, 0) };

        log::info!(
            "Created logical device with {} queue family(ies)",
            queue_infos.len()
        );

        Ok(Self {
            device,
            graphics_queue,
            presentation_queue,
            queue_families: indices,
        })
    }

    /// Wait for device to be idle (e.g., before cleanup)
    pub fn wait_idle(&self) -> Result<()> {
        let result = unsafe { self.device.device_wait_idle() };
        result.map_err(|result| RendererError::DeviceQueryFailed {
            what: "device idle",
            result,
        })
    }
}
