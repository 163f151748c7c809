//! SPIR-V shader module loading
//!
//! Shader modules are loaded from `.spv` files on disk and cached by the
//! renderer keyed on source path and modification time, so editing a compiled
//! shader file triggers recompilation on the next draw call.

use ash::{vk, Device};
use std::fs;
use std::path::Path;
use crate::error::{DrawError, DrawResult};

/// Shader module wrapper with RAII cleanup
pub struct ShaderModule {
    device: Device,
    module: vk::ShaderModule,
}

impl ShaderModule {
    /// Create a shader module from SPIR-V bytecode
    pub fn from_bytes(device: Device, bytes: &[u8]) -> DrawResult<Self> {
        // SPIR-V words are u32-aligned; reject truncated or misaligned files
        let (prefix, code, suffix) = unsafe { bytes.align_to::<u32>() };
        if !prefix.is_empty() || !suffix.is_empty() {
            return Err(DrawError::InitializationFailed(
                "SPIR-V bytecode is not u32-aligned".to_string(),
            ));
        }

        let create_info = vk::ShaderModuleCreateInfo::builder().code(code);

        let module = unsafe {
            device
                .create_shader_module(&create_info, None)
                .map_err(DrawError::Api)?
        };

        Ok(Self { device, module })
    }

    /// Load a shader module from a SPIR-V file
    pub fn from_file<P: AsRef<Path>>(device: Device, path: P) -> DrawResult<Self> {
        let path = path.as_ref();
        let bytes = fs::read(path).map_err(|source| DrawError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        Self::from_bytes(device, &bytes)
    }

    /// Get the shader module handle
    pub fn handle(&self) -> vk::ShaderModule {
        self.module
    }
}

impl Drop for ShaderModule {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_shader_module(self.module, None);
        }
    }
}
