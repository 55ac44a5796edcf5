// Frame pacing
//
// Up to `max_frame_draws` frames may be in flight at once, each owning one
// slot of synchronization objects. Every draw runs the same fixed sequence
// against the slot for the current frame:
//
//   wait(fence) -> reset(fence) -> acquire -> submit -> present -> advance
//
// The wait must come first: it is the only point where the CPU learns that
// the GPU is finished with the slot's previous submission. The sequence is
// written against `FrameDriver` so it can be exercised without a GPU.

use crate::error::Result;

/// The per-frame GPU calls, addressed by frame slot.
pub trait FrameDriver {
    /// Block until the slot's in-flight fence signals.
    fn wait_for_slot(&mut self, slot: usize, timeout: u64) -> Result<()>;
    /// Return the slot's fence to unsignaled.
    fn reset_slot(&mut self, slot: usize) -> Result<()>;
    /// Acquire a presentable image, signaling the slot's image-available semaphore.
    fn acquire_image(&mut self, slot: usize, timeout: u64) -> Result<u32>;
    /// Submit the buffer recorded for `image_index`, signaling the slot's
    /// render-finished semaphore and fence.
    fn submit(&mut self, slot: usize, image_index: u32) -> Result<()>;
    /// Present `image_index` once the slot's render-finished semaphore signals.
    fn present(&mut self, slot: usize, image_index: u32) -> Result<()>;
}

#[derive(Debug)]
pub struct FrameSynchronizer {
    current_frame: usize,
    max_frame_draws: usize,
    timeout: u64,
}

impl FrameSynchronizer {
    /// `max_frame_draws` is clamped to at least one.
    pub fn new(max_frame_draws: usize, timeout: u64) -> Self {
        Self {
            current_frame: 0,
            max_frame_draws: max_frame_draws.max(1),
            timeout,
        }
    }

    pub fn current_frame(&self) -> usize {
        self.current_frame
    }

    pub fn max_frame_draws(&self) -> usize {
        self.max_frame_draws
    }

    /// Run one frame and return the presented image index.
    ///
    /// On error the frame index is left where it was; nothing after the
    /// failing call is issued.
    pub fn draw(&mut self, driver: &mut impl FrameDriver) -> Result<u32> {
        let slot = self.current_frame;

        driver.wait_for_slot(slot, self.timeout)?;
        driver.reset_slot(slot)?;
        let image_index = driver.acquire_image(slot, self.timeout)?;
        driver.submit(slot, image_index)?;
        driver.present(slot, image_index)?;

        self.current_frame = (self.current_frame + 1) % self.max_frame_draws;
        Ok(image_index)
    }
}
