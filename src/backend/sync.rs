// Synchronization primitives
//
// One slot per frame that may be in flight at once. Semaphores order GPU
// work (acquire -> render -> present); the fence lets the CPU wait until a
// slot's previous submission has finished before reusing it.

use super::teardown::TeardownStack;
use crate::error::{RendererError, Result};
use ash::vk;

/// Synchronization objects for one frame slot.
#[derive(Clone, Copy, Debug)]
pub struct FrameSlot {
    pub image_available: vk::Semaphore,
    pub render_finished: vk::Semaphore,
    pub in_flight_fence: vk::Fence,
}

// Start signaled so the first wait on every slot returns immediately.
fn fence_info() -> vk::FenceCreateInfo {
    vk::FenceCreateInfo::builder()
        .flags(vk::FenceCreateFlags::SIGNALED)
        .build()
}

fn create_semaphore(
    device: &ash::Device,
    what: &'static str,
    slot: usize,
    teardown: &mut TeardownStack,
) -> Result<vk::Semaphore> {
    let info = vk::SemaphoreCreateInfo::builder();
    let semaphore = unsafe { device.create_semaphore(&info, None) }
        .map_err(|result| RendererError::SyncObjectCreationFailed { what, slot, result })?;

    let owner = device.clone();
    teardown.push(what, move || unsafe { owner.destroy_semaphore(semaphore, None) });
    Ok(semaphore)
}

pub fn create_frame_slots(
    device: &ash::Device,
    count: usize,
    teardown: &mut TeardownStack,
) -> Result<Vec<FrameSlot>> {
    let mut slots = Vec::with_capacity(count);

    for slot in 0..count {
        let image_available = create_semaphore(device, "image available semaphore", slot, teardown)?;
        let render_finished = create_semaphore(device, "render finished semaphore", slot, teardown)?;

        let in_flight_fence = unsafe { device.create_fence(&fence_info(), None) }.map_err(
            |result| RendererError::SyncObjectCreationFailed {
                what: "draw fence",
                slot,
                result,
            },
        )?;
        let owner = device.clone();
        teardown.push("draw fence", move || unsafe {
            owner.destroy_fence(in_flight_fence, None)
        });

        slots.push(FrameSlot {
            image_available,
            render_finished,
            in_flight_fence,
        });
    }

    log::info!("Created synchronization objects for {} frame slot(s)", count);
    Ok(slots)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fences_start_signaled() {
        assert!(fence_info().flags.contains(vk::FenceCreateFlags::SIGNALED));
    }
}
