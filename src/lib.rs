//! A minimal Vulkan renderer: one pre-recorded triangle, presented to a
//! window surface with a fixed number of frames in flight.
//!
//! The embedding application owns the window and event loop, constructs a
//! [`Renderer`] once and calls [`Renderer::draw`] every iteration.

pub mod backend;
pub mod config;
pub mod error;
pub mod frame;
pub mod logging;
pub mod renderer;

pub use backend::RenderWindow;
pub use config::Config;
pub use error::{ErrorKind, RendererError, Result};
pub use renderer::{InitResult, Renderer};
