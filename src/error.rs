// Error taxonomy for the renderer
//
// Every fallible construction step and every draw-time call maps onto one
// variant here. Nothing is retried: the first error ends the attempt.

use ash::vk;
use std::path::PathBuf;
use thiserror::Error;

/// Coarse classification used by the embedder to decide how to report a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Instance/device/surface/swapchain/pipeline/... creation failed.
    Initialization,
    /// Submit or present failed inside `draw()`.
    RuntimeDraw,
    /// No accelerator, or nothing the surface supports.
    ResourceUnavailable,
}

#[derive(Error, Debug)]
pub enum RendererError {
    #[error("Failed to load Vulkan library: {0}")]
    LoaderUnavailable(#[from] ash::LoadingError),

    #[error("Failed to create Vulkan instance: {0}")]
    InstanceCreationFailed(vk::Result),

    #[error("Validation layers requested, but {0} is not available")]
    ValidationLayersUnavailable(String),

    #[error("Instance does not support required extension {0}")]
    MissingInstanceExtension(String),

    #[error("Failed to set up debug messenger: {0}")]
    DebugMessengerCreationFailed(vk::Result),

    #[error("Failed to create window surface: {0}")]
    SurfaceCreationFailed(vk::Result),

    #[error("Unsupported window system: {0}")]
    UnsupportedPlatform(String),

    #[error("Failed to query {what}: {result}")]
    DeviceQueryFailed { what: &'static str, result: vk::Result },

    #[error("No Vulkan-capable GPU found")]
    NoAcceleratorFound,

    #[error("None of the {0} GPU(s) found is suitable for presenting to this surface")]
    NoSuitableAccelerator(usize),

    #[error("Failed to create logical device: {0}")]
    DeviceCreationFailed(vk::Result),

    #[error("Failed to create swapchain: {0}")]
    SwapchainCreationFailed(vk::Result),

    #[error("Failed to create image view {index}: {result}")]
    ImageViewCreationFailed { index: usize, result: vk::Result },

    #[error("Cannot read shader bytecode {path:?}: {source}")]
    ShaderBytecodeUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Shader compiler failed on {path:?}: {reason}")]
    ShaderCompilationFailed { path: PathBuf, reason: String },

    #[error("Failed to create shader module from {path:?}: {reason}")]
    ShaderModuleCreationFailed { path: PathBuf, reason: String },

    #[error("Failed to create render pass: {0}")]
    RenderPassCreationFailed(vk::Result),

    #[error("Failed to create {stage}: {result}")]
    PipelineCreationFailed { stage: &'static str, result: vk::Result },

    #[error("Failed to create framebuffer {index}: {result}")]
    FramebufferCreationFailed { index: usize, result: vk::Result },

    #[error("Failed to create graphics command pool: {0}")]
    CommandPoolCreationFailed(vk::Result),

    #[error("Failed to allocate command buffers: {0}")]
    CommandBufferAllocationFailed(vk::Result),

    #[error("Failed to record command buffer {index}: {result}")]
    CommandBufferRecordingFailed { index: usize, result: vk::Result },

    #[error("Failed to create {what} for frame slot {slot}: {result}")]
    SyncObjectCreationFailed {
        what: &'static str,
        slot: usize,
        result: vk::Result,
    },

    #[error("Failed waiting on fence for frame slot {slot}: {result}")]
    FenceWaitFailed { slot: usize, result: vk::Result },

    #[error("Failed to reset fence for frame slot {slot}: {result}")]
    FenceResetFailed { slot: usize, result: vk::Result },

    #[error("Failed to acquire swapchain image: {0}")]
    AcquireFailed(vk::Result),

    #[error("Failed to submit command buffer to graphics queue: {0}")]
    QueueSubmitFailed(vk::Result),

    #[error("Failed to present image {image_index}: {result}")]
    PresentFailed { image_index: u32, result: vk::Result },
}

impl RendererError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NoAcceleratorFound | Self::NoSuitableAccelerator(_) => {
                ErrorKind::ResourceUnavailable
            }
            Self::ValidationLayersUnavailable(_)
            | Self::MissingInstanceExtension(_)
            | Self::UnsupportedPlatform(_) => ErrorKind::ResourceUnavailable,
            Self::FenceWaitFailed { .. }
            | Self::FenceResetFailed { .. }
            | Self::AcquireFailed(_)
            | Self::QueueSubmitFailed(_)
            | Self::PresentFailed { .. } => ErrorKind::RuntimeDraw,
            _ => ErrorKind::Initialization,
        }
    }
}

pub type Result<T> = std::result::Result<T, RendererError>;
