// Shader module loading
//
// Vulkan consumes SPIR-V bytecode. Bytecode is read from disk at startup,
// optionally after running an external GLSL compiler over the sources.
// Shader modules only live until the pipeline that embeds them is built.

use crate::config::ShaderCompilerConfig;
use crate::error::{RendererError, Result};
use ash::vk;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::process::Command;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl ShaderStage {
    fn suffix(self) -> &'static str {
        match self {
            ShaderStage::Vertex => "vert",
            ShaderStage::Fragment => "frag",
        }
    }

    pub fn flags(self) -> vk::ShaderStageFlags {
        match self {
            ShaderStage::Vertex => vk::ShaderStageFlags::VERTEX,
            ShaderStage::Fragment => vk::ShaderStageFlags::FRAGMENT,
        }
    }
}

/// Read a SPIR-V file into 32-bit words.
///
/// An unopenable path is `ShaderBytecodeUnreadable`; a file that is not
/// SPIR-V (bad length or magic number) is `ShaderModuleCreationFailed`.
pub fn read_bytecode(path: &Path) -> Result<Vec<u32>> {
    let bytes = std::fs::read(path).map_err(|source| RendererError::ShaderBytecodeUnreadable {
        path: path.to_path_buf(),
        source,
    })?;

    ash::util::read_spv(&mut Cursor::new(bytes)).map_err(|e| {
        RendererError::ShaderModuleCreationFailed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        }
    })
}

/// A shader module destroyed when it goes out of scope.
pub struct ShaderModule<'a> {
    device: &'a ash::Device,
    pub handle: vk::ShaderModule,
    pub stage: ShaderStage,
}

impl<'a> ShaderModule<'a> {
    pub fn load(device: &'a ash::Device, path: &Path, stage: ShaderStage) -> Result<Self> {
        let code = read_bytecode(path)?;
        let create_info = vk::ShaderModuleCreateInfo::builder().code(&code);

        let handle = unsafe { device.create_shader_module(&create_info, None) }.map_err(|e| {
            RendererError::ShaderModuleCreationFailed {
                path: path.to_path_buf(),
                reason: e.to_string(),
            }
        })?;

        log::debug!("Loaded {:?} shader from {:?} ({} words)", stage, path, code.len());
        Ok(Self {
            device,
            handle,
            stage,
        })
    }
}

impl Drop for ShaderModule<'_> {
    fn drop(&mut self) {
        unsafe { self.device.destroy_shader_module(self.handle, None) };
    }
}

/// Runs an external GLSL -> SPIR-V compiler (glslc-compatible command line).
pub struct ShaderCompiler<'a> {
    config: &'a ShaderCompilerConfig,
}

impl<'a> ShaderCompiler<'a> {
    pub fn new(config: &'a ShaderCompilerConfig) -> Self {
        Self { config }
    }

    /// Where the bytecode for `source` ends up: `<output_dir>/<stem>.<stage>.spv`.
    pub fn output_path(&self, source: &Path, stage: ShaderStage) -> PathBuf {
        let stem = source
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "shader".to_string());
        self.config
            .output_dir
            .join(format!("{}.{}.spv", stem, stage.suffix()))
    }

    /// Compile one source file, returning the bytecode path.
    ///
    /// The compiler runs in the source's directory so relative `#include`s
    /// resolve; the output path is made absolute first for that reason.
    pub fn compile(&self, source: &Path, stage: ShaderStage) -> Result<PathBuf> {
        let failed = |reason: String| RendererError::ShaderCompilationFailed {
            path: source.to_path_buf(),
            reason,
        };

        std::fs::create_dir_all(&self.config.output_dir)
            .map_err(|e| failed(format!("cannot create {:?}: {}", self.config.output_dir, e)))?;

        let output = absolutize(&self.output_path(source, stage)).map_err(|e| failed(e.to_string()))?;
        let source_abs = absolutize(source).map_err(|e| failed(e.to_string()))?;
        let workdir = source_abs.parent().unwrap_or_else(|| Path::new("."));

        log::info!("Compiling {:?} -> {:?}", source, output);
        let result = Command::new(&self.config.program)
            .current_dir(workdir)
            .arg(format!("-fshader-stage={}", stage.suffix()))
            .arg(&source_abs)
            .arg("-o")
            .arg(&output)
            .output()
            .map_err(|e| failed(format!("cannot run {:?}: {}", self.config.program, e)))?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(failed(format!("{} ({})", stderr.trim(), result.status)));
        }

        Ok(output)
    }
}

fn absolutize(path: &Path) -> std::io::Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SPIRV_MAGIC: u32 = 0x0723_0203;

    #[test]
    fn test_read_bytecode_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_bytecode(&dir.path().join("nope.spv")).unwrap_err();
        assert!(matches!(err, RendererError::ShaderBytecodeUnreadable { .. }));
    }

    #[test]
    fn test_read_bytecode_rejects_truncated() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&[0x03, 0x02, 0x23]).unwrap();
        let err = read_bytecode(file.path()).unwrap_err();
        assert!(matches!(err, RendererError::ShaderModuleCreationFailed { .. }));
    }

    #[test]
    fn test_read_bytecode_rejects_bad_magic() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&0xdead_beef_u32.to_le_bytes()).unwrap();
        file.write_all(&[0u8; 4]).unwrap();
        let err = read_bytecode(file.path()).unwrap_err();
        assert!(matches!(err, RendererError::ShaderModuleCreationFailed { .. }));
    }

    #[test]
    fn test_read_bytecode_words() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        for word in [SPIRV_MAGIC, 0x0001_0000, 7, 42] {
            file.write_all(&word.to_le_bytes()).unwrap();
        }
        let words = read_bytecode(file.path()).unwrap();
        assert_eq!(words, vec![SPIRV_MAGIC, 0x0001_0000, 7, 42]);
    }

    #[test]
    fn test_output_path() {
        let config = ShaderCompilerConfig {
            output_dir: PathBuf::from("cache"),
            ..Default::default()
        };
        let compiler = ShaderCompiler::new(&config);
        assert_eq!(
            compiler.output_path(Path::new("shaders/triangle.vert"), ShaderStage::Vertex),
            PathBuf::from("cache/triangle.vert.spv")
        );
        assert_eq!(
            compiler.output_path(Path::new("lit.glsl"), ShaderStage::Fragment),
            PathBuf::from("cache/lit.frag.spv")
        );
    }

    #[test]
    fn test_compile_with_missing_program_fails() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("triangle.vert");
        std::fs::write(&source, "#version 450\nvoid main() {}\n").unwrap();

        let config = ShaderCompilerConfig {
            program: dir.path().join("no-such-compiler"),
            output_dir: dir.path().join("out"),
            ..Default::default()
        };
        let err = ShaderCompiler::new(&config)
            .compile(&source, ShaderStage::Vertex)
            .unwrap_err();
        assert!(matches!(err, RendererError::ShaderCompilationFailed { .. }));
        assert!(dir.path().join("out").is_dir());
    }

    #[test]
    fn test_stage_flags() {
        assert_eq!(ShaderStage::Vertex.flags(), vk::ShaderStageFlags::VERTEX);
        assert_eq!(ShaderStage::Fragment.flags(), vk::ShaderStageFlags::FRAGMENT);
    }
}
