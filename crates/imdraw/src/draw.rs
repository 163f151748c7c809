//! Caller-facing draw call description
//!
//! A [`DrawCall`] is ephemeral: it describes one draw for one frame and is
//! fully consumed by `Renderer::draw`. Shader and texture paths are resolved
//! through the renderer's caches, so editing a file on disk takes effect on
//! the next draw call that references it.

use ash::vk;
use std::path::PathBuf;
use crate::texture::SamplerDesc;

/// One shader stage sourced from a SPIR-V file
#[derive(Debug, Clone)]
pub struct StageDesc {
    /// Path to the compiled SPIR-V code
    pub path: PathBuf,
    /// Pipeline stage to bind the module to
    pub stage: vk::ShaderStageFlags,
    /// Entry point symbol, "main" for almost everything
    pub entry_point: String,
}

impl StageDesc {
    /// Stage with the conventional "main" entry point
    pub fn new(path: impl Into<PathBuf>, stage: vk::ShaderStageFlags) -> Self {
        Self {
            path: path.into(),
            stage,
            entry_point: "main".to_string(),
        }
    }
}

/// One vertex attribute within a binding
#[derive(Debug, Clone, Copy)]
pub struct VertexAttributeDesc {
    /// Shader input location
    pub location: u32,
    /// Component format
    pub format: vk::Format,
    /// Byte offset within one element
    pub offset: u32,
}

/// One vertex buffer binding with its element layout
#[derive(Debug, Clone)]
pub struct VertexBindingDesc<'a> {
    /// Raw element data, uploaded fresh each draw call
    pub bytes: &'a [u8],
    /// Bytes between consecutive elements
    pub stride: u32,
    /// Per-vertex or per-instance stepping
    pub input_rate: vk::VertexInputRate,
    /// Attributes read from this binding
    pub attributes: Vec<VertexAttributeDesc>,
}

/// One texture reference with its sampling parameters
#[derive(Debug, Clone)]
pub struct ImageDesc {
    /// Path to the image file
    pub path: PathBuf,
    /// Sampler built fresh for this draw call
    pub sampler: SamplerDesc,
}

impl ImageDesc {
    /// Image sampled with the default linear/repeat parameters
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            sampler: SamplerDesc::default(),
        }
    }
}

/// Description of a single draw, consumed by `Renderer::draw`
#[derive(Debug, Clone, Default)]
pub struct DrawCall<'a> {
    /// Build and cache GPU objects without recording commands or consuming
    /// uniform space; used to pre-warm caches outside the frame loop
    pub prepare_only: bool,
    /// Ordered shader stages
    pub stages: Vec<StageDesc>,
    /// Ordered vertex buffer bindings
    pub vertex_bindings: Vec<VertexBindingDesc<'a>>,
    /// Textures bound after the uniform buffer, in order
    pub images: Vec<ImageDesc>,
    /// Uniform blob copied into the frame's arena
    pub uniform_bytes: &'a [u8],
    /// Non-indexed vertex count
    pub vertex_count: u32,
}
