// Window surface - the seam between the windowing library and Vulkan
//
// The renderer never creates windows or pumps events. It only needs raw
// handles (for the native surface) and the current framebuffer size (for
// the swapchain extent), both supplied through `RenderWindow`.

use super::teardown::TeardownStack;
use crate::error::{RendererError, Result};
use ash::extensions::khr;
use ash::{vk, Entry};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle, RawDisplayHandle, RawWindowHandle};
use std::ffi::CStr;

/// What the renderer needs from the embedding window.
pub trait RenderWindow: HasWindowHandle + HasDisplayHandle {
    /// Current framebuffer size in pixels.
    fn framebuffer_size(&self) -> (u32, u32);
}

impl RenderWindow for winit::window::Window {
    fn framebuffer_size(&self) -> (u32, u32) {
        let size = self.inner_size();
        (size.width, size.height)
    }
}

/// Instance extensions needed to present on this display.
pub fn required_surface_extensions(display: RawDisplayHandle) -> Result<Vec<&'static CStr>> {
    let platform = match display {
        RawDisplayHandle::Windows(_) => khr::Win32Surface::name(),
        RawDisplayHandle::Xlib(_) => khr::XlibSurface::name(),
        RawDisplayHandle::Xcb(_) => khr::XcbSurface::name(),
        RawDisplayHandle::Wayland(_) => khr::WaylandSurface::name(),
        other => return Err(RendererError::UnsupportedPlatform(format!("{:?}", other))),
    };
    Ok(vec![khr::Surface::name(), platform])
}

/// Raw display handle of the window, mapped into our error type.
pub fn display_handle(window: &impl RenderWindow) -> Result<RawDisplayHandle> {
    window
        .display_handle()
        .map(|handle| handle.as_raw())
        .map_err(|e| RendererError::UnsupportedPlatform(e.to_string()))
}

/// Surface plus the loader needed to query and destroy it.
pub struct Surface {
    pub handle: vk::SurfaceKHR,
    pub loader: khr::Surface,
}

impl Surface {
    pub fn new(
        entry: &Entry,
        instance: &ash::Instance,
        window: &impl RenderWindow,
        teardown: &mut TeardownStack,
    ) -> Result<Self> {
        let window_handle = window
            .window_handle()
            .map_err(|e| RendererError::UnsupportedPlatform(e.to_string()))?
            .as_raw();
        let display = display_handle(window)?;

        let handle = unsafe { create_native_surface(entry, instance, display, window_handle)? };

        let loader = khr::Surface::new(entry, instance);
        let release = loader.clone();
        teardown.push("surface", move || unsafe { release.destroy_surface(handle, None) });

        Ok(Self { handle, loader })
    }
}

unsafe fn create_native_surface(
    entry: &Entry,
    instance: &ash::Instance,
    display: RawDisplayHandle,
    window: RawWindowHandle,
) -> Result<vk::SurfaceKHR> {
    let surface = match (display, window) {
        (RawDisplayHandle::Windows(_), RawWindowHandle::Win32(handle)) => {
            let hinstance = handle.hinstance.map(|h| h.get()).unwrap_or(0) as *const std::ffi::c_void;
            let hwnd = handle.hwnd.get() as *const std::ffi::c_void;
            let create_info = vk::Win32SurfaceCreateInfoKHR::builder()
                .hinstance(hinstance)
                .hwnd(hwnd);
            khr::Win32Surface::new(entry, instance).create_win32_surface(&create_info, None)
        }
        (RawDisplayHandle::Xlib(display), RawWindowHandle::Xlib(handle)) => {
            let dpy = display
                .display
                .map(|d| d.as_ptr())
                .unwrap_or(std::ptr::null_mut());
            let create_info = vk::XlibSurfaceCreateInfoKHR::builder()
                .dpy(dpy.cast())
                .window(handle.window);
            khr::XlibSurface::new(entry, instance).create_xlib_surface(&create_info, None)
        }
        (RawDisplayHandle::Xcb(display), RawWindowHandle::Xcb(handle)) => {
            let connection = display
                .connection
                .map(|c| c.as_ptr())
                .unwrap_or(std::ptr::null_mut());
            let create_info = vk::XcbSurfaceCreateInfoKHR::builder()
                .connection(connection.cast())
                .window(handle.window.get());
            khr::XcbSurface::new(entry, instance).create_xcb_surface(&create_info, None)
        }
        (RawDisplayHandle::Wayland(display), RawWindowHandle::Wayland(handle)) => {
            let create_info = vk::WaylandSurfaceCreateInfoKHR::builder()
                .display(display.display.as_ptr().cast())
                .surface(handle.surface.as_ptr().cast());
            khr::WaylandSurface::new(entry, instance).create_wayland_surface(&create_info, None)
        }
        (display, window) => {
            return Err(RendererError::UnsupportedPlatform(format!(
                "{:?} / {:?}",
                display, window
            )))
        }
    };

    surface.map_err(RendererError::SurfaceCreationFailed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use raw_window_handle::{WaylandDisplayHandle, WindowsDisplayHandle};
    use std::ptr::NonNull;

    #[test]
    fn test_surface_extensions_per_platform() {
        let windows = RawDisplayHandle::Windows(WindowsDisplayHandle::new());
        let names = required_surface_extensions(windows).unwrap();
        assert_eq!(names, vec![khr::Surface::name(), khr::Win32Surface::name()]);

        let mut dummy = 0u8;
        let wayland = RawDisplayHandle::Wayland(WaylandDisplayHandle::new(
            NonNull::from(&mut dummy).cast(),
        ));
        let names = required_surface_extensions(wayland).unwrap();
        assert_eq!(names[1], khr::WaylandSurface::name());
    }

    #[test]
    fn test_unknown_platform_is_rejected() {
        let web = RawDisplayHandle::Web(raw_window_handle::WebDisplayHandle::new());
        assert!(matches!(
            required_surface_extensions(web),
            Err(RendererError::UnsupportedPlatform(_))
        ));
    }
}
