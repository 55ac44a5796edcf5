// Backend module - Vulkan objects the renderer is built from
//
// Each constructor takes the `TeardownStack` and registers what it creates,
// so ownership is a single ordered list released in reverse.

pub mod command;
pub mod device;
pub mod framebuffer;
pub mod instance;
pub mod pipeline;
pub mod shader;
pub mod surface;
pub mod swapchain;
pub mod sync;
pub mod teardown;

pub use device::LogicalDevice;
pub use pipeline::GraphicsPipeline;
pub use surface::{RenderWindow, Surface};
pub use swapchain::Swapchain;
pub use sync::FrameSlot;
pub use teardown::TeardownStack;
