// Teardown stack - explicit ownership tree for raw Vulkan handles
//
// Every handle the renderer creates is registered here right after the
// create call succeeds. Releasing walks the stack from the top, so handles
// always go away in exactly the reverse of their creation order: views
// before the swapchain, the swapchain before the device, the device before
// the instance. Dropping a half-built stack (construction failed part way)
// releases whatever was registered so far.

use std::fmt;

type Release = Box<dyn FnOnce()>;

pub struct TeardownStack {
    entries: Vec<(&'static str, Release)>,
}

impl TeardownStack {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Register the release action for a handle that was just created.
    pub fn push(&mut self, label: &'static str, release: impl FnOnce() + 'static) {
        log::debug!("Created {}", label);
        self.entries.push((label, Box::new(release)));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Labels in creation order.
    pub fn labels(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.iter().map(|(label, _)| *label)
    }

    /// Release everything, newest first.
    ///
    /// The caller must make sure the GPU no longer uses any of the handles
    /// (`device_wait_idle`) before calling this on a live renderer.
    pub fn unwind(&mut self) {
        while let Some((label, release)) = self.entries.pop() {
            log::debug!("Destroying {}", label);
            release();
        }
    }
}

impl Default for TeardownStack {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TeardownStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.labels()).finish()
    }
}

impl Drop for TeardownStack {
    fn drop(&mut self) {
        if !self.entries.is_empty() {
            log::debug!("Releasing {} handle(s)", self.entries.len());
        }
        self.unwind();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    type Log = Rc<RefCell<Vec<&'static str>>>;

    // Labels registered by `Renderer::construct` with two swapchain images
    // and two frames in flight.
    const SEQUENCE: &[&str] = &[
        "instance",
        "debug messenger",
        "surface",
        "logical device",
        "swapchain",
        "swapchain image view",
        "swapchain image view",
        "render pass",
        "pipeline layout",
        "graphics pipeline",
        "framebuffer",
        "framebuffer",
        "command pool",
        "command buffers",
        "image available semaphore",
        "render finished semaphore",
        "draw fence",
        "image available semaphore",
        "render finished semaphore",
        "draw fence",
    ];

    fn register(stack: &mut TeardownStack, log: &Log, label: &'static str) {
        let log = Rc::clone(log);
        stack.push(label, move || log.borrow_mut().push(label));
    }

    /// Runs the sequence, failing when step `fail_at` is reached.
    fn build(log: &Log, fail_at: Option<usize>) -> Result<TeardownStack, usize> {
        let mut stack = TeardownStack::new();
        for (step, label) in SEQUENCE.iter().enumerate() {
            if fail_at == Some(step) {
                return Err(step);
            }
            register(&mut stack, log, label);
        }
        Ok(stack)
    }

    #[test]
    fn test_unwind_is_reverse_of_creation() {
        let log = Log::default();
        let mut stack = build(&log, None).unwrap();
        assert_eq!(stack.labels().collect::<Vec<_>>(), SEQUENCE);

        stack.unwind();

        let expected: Vec<_> = SEQUENCE.iter().rev().copied().collect();
        assert_eq!(*log.borrow(), expected);
        assert!(stack.is_empty());
    }

    #[test]
    fn test_drop_releases_remaining() {
        let log = Log::default();
        let stack = build(&log, None).unwrap();
        drop(stack);
        assert_eq!(log.borrow().len(), SEQUENCE.len());
        assert_eq!(log.borrow()[0], "draw fence");
        assert_eq!(*log.borrow().last().unwrap(), "instance");
    }

    #[test]
    fn test_failure_at_every_step_leaks_nothing() {
        for fail_at in 0..SEQUENCE.len() {
            let log = Log::default();
            let result = build(&log, Some(fail_at));
            assert_eq!(result.err(), Some(fail_at));

            // Exactly the handles created before the failing step, newest first.
            let expected: Vec<_> = SEQUENCE[..fail_at].iter().rev().copied().collect();
            assert_eq!(*log.borrow(), expected, "failure at step {}", fail_at);
        }
    }

    #[test]
    fn test_unwind_twice_releases_once() {
        let log = Log::default();
        let mut stack = TeardownStack::new();
        register(&mut stack, &log, "fence");
        stack.unwind();
        stack.unwind();
        drop(stack);
        assert_eq!(*log.borrow(), vec!["fence"]);
    }
}
