// =============================================================================
// CONFIGURATION - Load settings from renderer.toml
// =============================================================================
//
// Everything the renderer would otherwise hardcode (shader paths, compiler
// binary, frames in flight, present mode preference) lives here and is
// handed to `Renderer::construct`. Missing keys fall back to the defaults.

use anyhow::{Context, Result};
use ash::vk;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Default file name looked up in the working directory.
pub const CONFIG_FILE: &str = "renderer.toml";

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub window: WindowConfig,
    pub graphics: GraphicsConfig,
    pub shaders: ShaderConfig,
    pub debug: DebugConfig,
}

/// Window settings (consumed by the embedding loop)
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "Triangle Renderer".to_string(),
            width: 800,
            height: 600,
        }
    }
}

/// Graphics settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GraphicsConfig {
    pub clear_color: [f32; 4],
    /// Frames that may be in flight at once (one FrameSlot each).
    pub max_frame_draws: usize,
    /// Upper bound for the per-frame fence wait, in nanoseconds.
    pub fence_timeout_ns: u64,
    pub preferred_present_mode: String,
}

impl Default for GraphicsConfig {
    fn default() -> Self {
        Self {
            clear_color: [0.0, 0.0, 0.0, 1.0],
            max_frame_draws: 2,
            fence_timeout_ns: u64::MAX,
            preferred_present_mode: "mailbox".to_string(),
        }
    }
}

/// Shader bytecode locations and the optional external compile step
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ShaderConfig {
    pub vertex: PathBuf,
    pub fragment: PathBuf,
    pub entry_point: String,
    pub compiler: Option<ShaderCompilerConfig>,
}

impl Default for ShaderConfig {
    fn default() -> Self {
        Self {
            vertex: PathBuf::from("shaders/triangle.vert.spv"),
            fragment: PathBuf::from("shaders/triangle.frag.spv"),
            entry_point: "main".to_string(),
            compiler: None,
        }
    }
}

/// When present, GLSL sources are compiled to SPIR-V before pipeline creation.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ShaderCompilerConfig {
    pub program: PathBuf,
    pub output_dir: PathBuf,
    pub vertex_source: PathBuf,
    pub fragment_source: PathBuf,
}

impl Default for ShaderCompilerConfig {
    fn default() -> Self {
        Self {
            program: PathBuf::from("glslc"),
            output_dir: PathBuf::from("shaders/cache"),
            vertex_source: PathBuf::from("shaders/triangle.vert"),
            fragment_source: PathBuf::from("shaders/triangle.frag"),
        }
    }
}

/// Debug settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    /// Only honoured in debug builds.
    pub validation_layers: bool,
    pub log_level: String,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            validation_layers: true,
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from file, falling back to defaults if not found
    pub fn load() -> Self {
        Self::load_from_path(CONFIG_FILE).unwrap_or_else(|e| {
            log::warn!("Failed to load {}: {:#}. Using defaults.", CONFIG_FILE, e);
            Config::default()
        })
    }

    /// Load configuration from a specific path
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            log::info!("Config file not found at {:?}, using defaults", path);
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        log::info!("Loaded configuration from {:?}", path);
        log::debug!("Config: {:?}", config);

        Ok(config)
    }

    /// Validation layers are a debug-build feature only.
    pub fn validation_enabled(&self) -> bool {
        cfg!(debug_assertions) && self.debug.validation_layers
    }

    /// Frames in flight, never less than one.
    pub fn frame_draws(&self) -> usize {
        if self.graphics.max_frame_draws == 0 {
            log::warn!("max_frame_draws = 0 is not usable, using 1");
            1
        } else {
            self.graphics.max_frame_draws
        }
    }

    /// Get preferred present mode as Vulkan enum
    pub fn preferred_present_mode(&self) -> vk::PresentModeKHR {
        match self.graphics.preferred_present_mode.to_lowercase().as_str() {
            "mailbox" => vk::PresentModeKHR::MAILBOX,
            "immediate" => vk::PresentModeKHR::IMMEDIATE,
            "fifo" => vk::PresentModeKHR::FIFO,
            "fifo_relaxed" => vk::PresentModeKHR::FIFO_RELAXED,
            _ => {
                log::warn!(
                    "Unknown present mode '{}', defaulting to MAILBOX",
                    self.graphics.preferred_present_mode
                );
                vk::PresentModeKHR::MAILBOX
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.graphics.max_frame_draws, 2);
        assert_eq!(config.graphics.fence_timeout_ns, u64::MAX);
        assert_eq!(config.preferred_present_mode(), vk::PresentModeKHR::MAILBOX);
        assert_eq!(config.shaders.entry_point, "main");
        assert!(config.shaders.compiler.is_none());
        assert_eq!(config.shaders.vertex, PathBuf::from("shaders/triangle.vert.spv"));
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config: Config = toml::from_str(
            r#"
            [graphics]
            max_frame_draws = 3
            preferred_present_mode = "FIFO"

            [shaders.compiler]
            program = "/opt/vulkan/bin/glslc"
            "#,
        )
        .unwrap();

        assert_eq!(config.graphics.max_frame_draws, 3);
        assert_eq!(config.graphics.clear_color, [0.0, 0.0, 0.0, 1.0]);
        assert_eq!(config.preferred_present_mode(), vk::PresentModeKHR::FIFO);
        assert_eq!(config.window.width, 800);

        let compiler = config.shaders.compiler.unwrap();
        assert_eq!(compiler.program, PathBuf::from("/opt/vulkan/bin/glslc"));
        assert_eq!(compiler.output_dir, PathBuf::from("shaders/cache"));
    }

    #[test]
    fn test_unknown_present_mode_falls_back() {
        let mut config = Config::default();
        config.graphics.preferred_present_mode = "vsync-please".into();
        assert_eq!(config.preferred_present_mode(), vk::PresentModeKHR::MAILBOX);
    }

    #[test]
    fn test_zero_frame_draws_is_clamped() {
        let mut config = Config::default();
        config.graphics.max_frame_draws = 0;
        assert_eq!(config.frame_draws(), 1);
    }

    #[test]
    fn test_load_from_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[window]\ntitle = \"demo\"\nwidth = 1024").unwrap();

        let config = Config::load_from_path(file.path()).unwrap();
        assert_eq!(config.window.title, "demo");
        assert_eq!(config.window.width, 1024);
        assert_eq!(config.window.height, 600);
    }

    #[test]
    fn test_load_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from_path(dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.window.title, "Triangle Renderer");
    }

    #[test]
    fn test_load_malformed_file_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[graphics\nmax_frame_draws = ").unwrap();
        assert!(Config::load_from_path(file.path()).is_err());
    }
}
