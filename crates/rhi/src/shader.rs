//! Shader module loading.
//!
//! Shaders are consumed as precompiled SPIR-V blobs; see `shaders/compile.sh`
//! for the GLSL sources and how they are compiled.

use std::ffi::CString;
use std::path::Path;
use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// Shader pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaderStage {
    /// Vertex shader.
    Vertex,
    /// Fragment shader.
    Fragment,
}

impl ShaderStage {
    /// Converts to the Vulkan stage flag.
    pub fn to_vk(self) -> vk::ShaderStageFlags {
        match self {
            Self::Vertex => vk::ShaderStageFlags::VERTEX,
            Self::Fragment => vk::ShaderStageFlags::FRAGMENT,
        }
    }
}

impl std::fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Vertex => write!(f, "vertex"),
            Self::Fragment => write!(f, "fragment"),
        }
    }
}

/// RAII wrapper around a shader module.
pub struct Shader {
    device: Arc<Device>,
    module: vk::ShaderModule,
    stage: ShaderStage,
    entry_point: CString,
}

impl Shader {
    /// Loads a SPIR-V shader module from a file.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::ShaderError`] when the file cannot be read or the
    /// blob is not valid SPIR-V.
    pub fn from_spirv_file(
        device: Arc<Device>,
        path: &Path,
        stage: ShaderStage,
        entry_point: &str,
    ) -> RhiResult<Self> {
        let bytes = std::fs::read(path).map_err(|e| {
            RhiError::ShaderError(format!("failed to read {}: {e}", path.display()))
        })?;
        debug!("Loaded {} shader: {} ({} bytes)", stage, path.display(), bytes.len());
        Self::from_spirv_bytes(device, &bytes, stage, entry_point)
    }

    /// Creates a shader module from SPIR-V bytes.
    pub fn from_spirv_bytes(
        device: Arc<Device>,
        bytes: &[u8],
        stage: ShaderStage,
        entry_point: &str,
    ) -> RhiResult<Self> {
        if bytes.is_empty() || !bytes.len().is_multiple_of(4) {
            return Err(RhiError::ShaderError(format!(
                "SPIR-V blob has invalid length {}",
                bytes.len()
            )));
        }

        let words: Vec<u32> = bytes
            .chunks_exact(4)
            .map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect();

        let create_info = vk::ShaderModuleCreateInfo::default().code(&words);

        // SAFETY: the word buffer is live for the call and length-validated.
        let module = unsafe { device.handle().create_shader_module(&create_info, None)? };

        let entry_point = CString::new(entry_point)
            .map_err(|_| RhiError::ShaderError("entry point contains a NUL byte".into()))?;

        Ok(Self {
            device,
            module,
            stage,
            entry_point,
        })
    }

    /// Returns the pipeline stage this shader runs at.
    pub fn stage(&self) -> ShaderStage {
        self.stage
    }

    /// Returns the stage create info for pipeline construction.
    ///
    /// Valid as long as this `Shader` is alive.
    pub fn stage_create_info(&self) -> vk::PipelineShaderStageCreateInfo<'_> {
        vk::PipelineShaderStageCreateInfo::default()
            .stage(self.stage.to_vk())
            .module(self.module)
            .name(&self.entry_point)
    }
}

impl Drop for Shader {
    fn drop(&mut self) {
        // SAFETY: destroyed exactly once; the device outlives this wrapper.
        unsafe {
            self.device.handle().destroy_shader_module(self.module, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_to_vk() {
        assert_eq!(ShaderStage::Vertex.to_vk(), vk::ShaderStageFlags::VERTEX);
        assert_eq!(
            ShaderStage::Fragment.to_vk(),
            vk::ShaderStageFlags::FRAGMENT
        );
    }

    #[test]
    fn test_stage_display() {
        assert_eq!(ShaderStage::Vertex.to_string(), "vertex");
        assert_eq!(ShaderStage::Fragment.to_string(), "fragment");
    }
}
