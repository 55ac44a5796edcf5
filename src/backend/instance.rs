// Vulkan instance - the root of every other handle
//
// Responsibilities:
// - Validation layer availability check
// - Instance extension check (window-system surface + debug utils)
// - Instance creation, with the debug messenger chained in so that
//   instance creation itself is validated
// - Standalone debug messenger for the rest of the instance's life

use super::teardown::TeardownStack;
use crate::error::{RendererError, Result};
use ash::extensions::ext::DebugUtils;
use ash::{vk, Entry};
use std::ffi::{c_char, CStr, CString};

pub const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

const ENGINE_NAME: &CStr = c"triangle-renderer";

/// Exact comparison of a fixed-size, NUL-terminated Vulkan name buffer.
pub fn name_matches(raw: &[c_char], name: &CStr) -> bool {
    raw.iter()
        .map(|&c| c as u8)
        .take_while(|&b| b != 0)
        .eq(name.to_bytes().iter().copied())
}

/// First entry of `required` that `available` does not list, if any.
pub fn first_missing_extension<'a>(
    available: &[vk::ExtensionProperties],
    required: &[&'a CStr],
) -> Option<&'a CStr> {
    required.iter().copied().find(|name| {
        !available
            .iter()
            .any(|ext| name_matches(&ext.extension_name, name))
    })
}

fn has_layer(available: &[vk::LayerProperties], name: &CStr) -> bool {
    available.iter().any(|layer| name_matches(&layer.layer_name, name))
}

fn debug_messenger_info() -> vk::DebugUtilsMessengerCreateInfoEXTBuilder<'static> {
    vk::DebugUtilsMessengerCreateInfoEXT::builder()
        .message_severity(
            vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
        )
        .message_type(
            vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
        )
        .pfn_user_callback(Some(debug_callback))
}

/// Create the instance and register it for teardown.
///
/// `surface_extensions` come from the window system in use
/// (see `surface::required_surface_extensions`).
pub fn create_instance(
    entry: &Entry,
    app_name: &str,
    surface_extensions: &[&'static CStr],
    enable_validation: bool,
    teardown: &mut TeardownStack,
) -> Result<ash::Instance> {
    if enable_validation {
        let layers = entry
            .enumerate_instance_layer_properties()
            .map_err(|result| RendererError::DeviceQueryFailed {
                what: "instance layers",
                result,
            })?;
        if !has_layer(&layers, VALIDATION_LAYER) {
            return Err(RendererError::ValidationLayersUnavailable(
                VALIDATION_LAYER.to_string_lossy().into_owned(),
            ));
        }
    }

    let mut extensions: Vec<&CStr> = surface_extensions.to_vec();
    if enable_validation {
        extensions.push(DebugUtils::name());
    }

    let available = entry
        .enumerate_instance_extension_properties(None)
        .map_err(|result| RendererError::DeviceQueryFailed {
            what: "instance extensions",
            result,
        })?;
    if let Some(missing) = first_missing_extension(&available, &extensions) {
        return Err(RendererError::MissingInstanceExtension(
            missing.to_string_lossy().into_owned(),
        ));
    }

    // Interior NULs cannot come from a sane title; strip them rather than fail.
    let app_name_cstr = CString::new(app_name.replace('\0', "")).unwrap_or_default();
    let app_info = vk::ApplicationInfo::builder()
        .application_name(&app_name_cstr)
        .application_version(vk::make_api_version(0, 1, 0, 0))
        .engine_name(ENGINE_NAME)
        .engine_version(vk::make_api_version(0, 1, 0, 0))
        .api_version(vk::API_VERSION_1_3);

    let extension_ptrs: Vec<*const c_char> = extensions.iter().map(|e| e.as_ptr()).collect();
    let layer_ptrs: Vec<*const c_char> = if enable_validation {
        vec![VALIDATION_LAYER.as_ptr()]
    } else {
        vec![]
    };

    let mut instance_debug_info = debug_messenger_info();
    let mut create_info = vk::InstanceCreateInfo::builder()
        .application_info(&app_info)
        .enabled_extension_names(&extension_ptrs)
        .enabled_layer_names(&layer_ptrs);
    if enable_validation {
        create_info = create_info.push_next(&mut instance_debug_info);
    }

    let instance = unsafe { entry.create_instance(&create_info, None) }
        .map_err(RendererError::InstanceCreationFailed)?;

    let handle = instance.clone();
    teardown.push("instance", move || unsafe { handle.destroy_instance(None) });

    log::info!(
        "Created Vulkan instance ({} extension(s), validation {})",
        extensions.len(),
        if enable_validation { "on" } else { "off" }
    );
    Ok(instance)
}

/// Install the validation message callback for the instance's lifetime.
pub fn setup_debug_messenger(
    entry: &Entry,
    instance: &ash::Instance,
    teardown: &mut TeardownStack,
) -> Result<()> {
    let debug_utils = DebugUtils::new(entry, instance);
    let create_info = debug_messenger_info();

    let messenger = unsafe { debug_utils.create_debug_utils_messenger(&create_info, None) }
        .map_err(RendererError::DebugMessengerCreationFailed)?;

    teardown.push("debug messenger", move || unsafe {
        debug_utils.destroy_debug_utils_messenger(messenger, None)
    });
    Ok(())
}

// Debug callback for validation layers
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    _message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _p_user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    if p_callback_data.is_null() || (*p_callback_data).p_message.is_null() {
        return vk::FALSE;
    }
    let message = CStr::from_ptr((*p_callback_data).p_message);

    match message_severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => {
            log::error!("[Vulkan] {}", message.to_string_lossy());
        }
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => {
            log::warn!("[Vulkan] {}", message.to_string_lossy());
        }
        _ => {
            log::debug!("[Vulkan] {}", message.to_string_lossy());
        }
    }

    vk::FALSE
}

#[cfg(test)]
pub(crate) fn extension(name: &CStr) -> vk::ExtensionProperties {
    let mut props = vk::ExtensionProperties::default();
    for (dst, &src) in props.extension_name.iter_mut().zip(name.to_bytes()) {
        *dst = src as c_char;
    }
    props
}
