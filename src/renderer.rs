// Renderer - owns every Vulkan object and drives one frame per `draw()`
//
// Construction order (each step consumes handles from the ones before it):
//   1. Load the Vulkan library
//   2. Instance (+ validation layer, debug messenger)
//   3. Window surface
//   4. Physical device selection
//   5. Logical device and queues
//   6. Swapchain and image views
//   7. Render pass and graphics pipeline
//   8. Framebuffers
//   9. Command pool, command buffers, recording
//  10. Per-frame synchronization objects
//
// Every step registers what it creates on the `TeardownStack` as soon as
// it exists. If a step fails, the stack is dropped and releases exactly
// what was created so far, newest first.

use crate::backend::command::{self, TriangleRecording};
use crate::backend::device::{self, REQUIRED_DEVICE_EXTENSIONS};
use crate::backend::framebuffer::create_framebuffers;
use crate::backend::instance;
use crate::backend::shader::{ShaderCompiler, ShaderStage};
use crate::backend::surface::{self, RenderWindow, Surface};
use crate::backend::sync::{self, FrameSlot};
use crate::backend::{GraphicsPipeline, LogicalDevice, Swapchain, TeardownStack};
use crate::config::Config;
use crate::error::{RendererError, Result};
use crate::frame::{FrameDriver, FrameSynchronizer};
use ash::{vk, Entry};
use std::path::PathBuf;
use std::process::ExitCode;

/// Outcome of construction, as the embedder sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitResult {
    Success,
    Failure,
}

impl InitResult {
    /// Classify a construction outcome, logging the failure if there is one.
    pub fn of<T>(outcome: &Result<T>) -> Self {
        match outcome {
            Ok(_) => InitResult::Success,
            Err(e) => {
                log::error!("Renderer initialization failed ({:?}): {}", e.kind(), e);
                InitResult::Failure
            }
        }
    }

    pub fn is_success(self) -> bool {
        self == InitResult::Success
    }

    pub fn exit_code(self) -> ExitCode {
        match self {
            InitResult::Success => ExitCode::SUCCESS,
            InitResult::Failure => ExitCode::FAILURE,
        }
    }
}

pub struct Renderer {
    frames: FrameSynchronizer,
    slots: Vec<FrameSlot>,
    command_buffers: Vec<vk::CommandBuffer>,
    pipeline: GraphicsPipeline,
    swapchain: Swapchain,
    device: LogicalDevice,
    init_result: InitResult,
    teardown: TeardownStack,
    // The loaded library must outlive every function pointer above.
    _entry: Entry,
}

impl Renderer {
    /// Build everything needed to draw into `window`.
    pub fn construct(window: &impl RenderWindow, config: &Config) -> Result<Self> {
        let entry = unsafe { Entry::load()? };
        let mut teardown = TeardownStack::new();

        let enable_validation = config.validation_enabled();
        let surface_extensions =
            surface::required_surface_extensions(surface::display_handle(window)?)?;
        let instance = instance::create_instance(
            &entry,
            &config.window.title,
            &surface_extensions,
            enable_validation,
            &mut teardown,
        )?;
        if enable_validation {
            instance::setup_debug_messenger(&entry, &instance, &mut teardown)?;
        }

        let surface = Surface::new(&entry, &instance, window, &mut teardown)?;

        let candidate = device::select_device(&instance, &surface.loader, surface.handle)?;
        let device = LogicalDevice::new(
            &instance,
            &candidate,
            REQUIRED_DEVICE_EXTENSIONS,
            &mut teardown,
        )?;

        let swapchain = Swapchain::new(
            &instance,
            &device,
            candidate.handle,
            &surface,
            window.framebuffer_size(),
            config.preferred_present_mode(),
            &mut teardown,
        )?;

        let (vertex_path, fragment_path) = shader_paths(config)?;
        let pipeline = GraphicsPipeline::new(
            &device.device,
            &vertex_path,
            &fragment_path,
            &config.shaders.entry_point,
            swapchain.extent,
            swapchain.format,
            &mut teardown,
        )?;

        let framebuffers = create_framebuffers(
            &device.device,
            &swapchain.image_views(),
            pipeline.render_pass,
            swapchain.extent,
            &mut teardown,
        )?;

        let graphics_family = device
            .queue_families
            .graphics_family
            .ok_or(RendererError::NoSuitableAccelerator(1))?;
        let pool = command::create_command_pool(&device.device, graphics_family, &mut teardown)?;
        let command_buffers = command::allocate_command_buffers(
            &device.device,
            pool,
            framebuffers.len(),
            &mut teardown,
        )?;
        command::record_triangle_commands(
            &device.device,
            &command_buffers,
            &TriangleRecording {
                render_pass: pipeline.render_pass,
                pipeline: pipeline.pipeline,
                framebuffers: &framebuffers,
                extent: swapchain.extent,
                clear_color: config.graphics.clear_color,
            },
        )?;

        let frame_draws = config.frame_draws();
        let slots = sync::create_frame_slots(&device.device, frame_draws, &mut teardown)?;

        log::info!(
            "Renderer ready: {} resource(s), {} frame(s) in flight",
            teardown.len(),
            frame_draws
        );

        Ok(Self {
            frames: FrameSynchronizer::new(frame_draws, config.graphics.fence_timeout_ns),
            slots,
            command_buffers,
            pipeline,
            swapchain,
            device,
            init_result: InitResult::Success,
            teardown,
            _entry: entry,
        })
    }

    /// Outcome of construction. Only a constructed renderer can be asked,
    /// so failures are reported through `InitResult::of` instead.
    pub fn init_result(&self) -> InitResult {
        self.init_result
    }

    /// Render and present one frame.
    pub fn draw(&mut self) -> Result<()> {
        let mut driver = QueueDriver {
            device: &self.device,
            swapchain: &self.swapchain,
            slots: &self.slots,
            command_buffers: &self.command_buffers,
        };
        self.frames.draw(&mut driver)?;
        Ok(())
    }

    pub fn current_frame(&self) -> usize {
        self.frames.current_frame()
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.swapchain.extent
    }

    pub fn pipeline(&self) -> vk::Pipeline {
        self.pipeline.pipeline
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        log::info!("Shutting down renderer...");
        if let Err(e) = self.device.wait_idle() {
            log::error!("Device did not go idle before teardown: {}", e);
        }
        self.teardown.unwind();
        log::info!("Renderer shut down");
    }
}

/// Bytecode paths to build the pipeline from, compiling first if configured.
fn shader_paths(config: &Config) -> Result<(PathBuf, PathBuf)> {
    match &config.shaders.compiler {
        Some(compiler_config) => {
            let compiler = ShaderCompiler::new(compiler_config);
            let vertex = compiler.compile(&compiler_config.vertex_source, ShaderStage::Vertex)?;
            let fragment =
                compiler.compile(&compiler_config.fragment_source, ShaderStage::Fragment)?;
            Ok((vertex, fragment))
        }
        None => Ok((config.shaders.vertex.clone(), config.shaders.fragment.clone())),
    }
}

/// `FrameDriver` over the real device, swapchain and queues.
struct QueueDriver<'a> {
    device: &'a LogicalDevice,
    swapchain: &'a Swapchain,
    slots: &'a [FrameSlot],
    command_buffers: &'a [vk::CommandBuffer],
}

impl FrameDriver for QueueDriver<'_> {
    fn wait_for_slot(&mut self, slot: usize, timeout: u64) -> Result<()> {
        let fences = [self.slots[slot].in_flight_fence];
        let result = unsafe { self.device.device.wait_for_fences(&fences, true, timeout) };
        result.map_err(|result| RendererError::FenceWaitFailed { slot, result })
    }

    fn reset_slot(&mut self, slot: usize) -> Result<()> {
        let fences = [self.slots[slot].in_flight_fence];
        let result = unsafe { self.device.device.reset_fences(&fences) };
        result.map_err(|result| RendererError::FenceResetFailed { slot, result })
    }

    fn acquire_image(&mut self, slot: usize, timeout: u64) -> Result<u32> {
        self.swapchain
            .acquire_next_image(timeout, self.slots[slot].image_available)
    }

    fn submit(&mut self, slot: usize, image_index: u32) -> Result<()> {
        let frame = self.slots[slot];
        let wait_semaphores = [frame.image_available];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let signal_semaphores = [frame.render_finished];
        let command_buffers = [self.command_buffers[image_index as usize]];

        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores)
            .build();

        let result = unsafe {
            self.device.device.queue_submit(
                self.device.graphics_queue,
                &[submit_info],
                frame.in_flight_fence,
            )
        };
        result.map_err(RendererError::QueueSubmitFailed)
    }

    fn present(&mut self, slot: usize, image_index: u32) -> Result<()> {
        self.swapchain.present(
            self.device.presentation_queue,
            image_index,
            &[self.slots[slot].render_finished],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_result_success() {
        let outcome: Result<()> = Ok(());
        let result = InitResult::of(&outcome);
        assert_eq!(result, InitResult::Success);
        assert!(result.is_success());
    }

    // Construction itself needs a Vulkan loader; this covers how an empty
    // device list is classified and reported.
    #[test]
    fn test_empty_device_list_classifies_as_failure() {
        let outcome = device::select_from(&[], |_| unreachable!()).map(|_| ());
        assert!(matches!(outcome, Err(RendererError::NoAcceleratorFound)));
        assert_eq!(InitResult::of(&outcome), InitResult::Failure);
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(InitResult::Success.exit_code(), ExitCode::SUCCESS);
        assert_eq!(InitResult::Failure.exit_code(), ExitCode::FAILURE);
    }

    #[test]
    fn test_shader_paths_without_compiler() {
        let config = Config::default();
        let (vertex, fragment) = shader_paths(&config).unwrap();
        assert_eq!(vertex, PathBuf::from("shaders/triangle.vert.spv"));
        assert_eq!(fragment, PathBuf::from("shaders/triangle.frag.spv"));
    }
}
