//! Error types for the immediate-mode renderer
//!
//! All fatal failure modes funnel into [`DrawError`]. Recoverable swapchain
//! conditions (out-of-date, suboptimal) never surface here; they are consumed
//! internally by discarding the view.

use ash::vk;
use std::path::PathBuf;
use thiserror::Error;

/// Renderer error types
#[derive(Error, Debug)]
pub enum DrawError {
    /// Unexpected Vulkan API result
    #[error("Vulkan API error: {0:?}")]
    Api(vk::Result),

    /// Renderer construction failed (no GPU, no queue family, no surface format...)
    #[error("Initialization failed: {0}")]
    InitializationFailed(String),

    /// A required shader or texture file could not be read
    #[error("Failed to read {path:?}: {source}")]
    Io {
        /// Path of the file that could not be read
        path: PathBuf,
        /// Underlying filesystem error
        source: std::io::Error,
    },

    /// A texture file could not be decoded
    #[error("Failed to decode image {path:?}: {source}")]
    Decode {
        /// Path of the image that could not be decoded
        path: PathBuf,
        /// Underlying decoder error
        source: image::ImageError,
    },

    /// The per-frame uniform arena ran out of space
    #[error("Uniform arena full: requested {requested} bytes, {remaining} remaining")]
    UniformArenaFull {
        /// Aligned size the draw call asked for
        requested: usize,
        /// Bytes left in the arena
        remaining: usize,
    },

    /// No suitable memory type found for an allocation
    #[error("No suitable memory type found")]
    NoSuitableMemoryType,
}

/// Result type for renderer operations
pub type DrawResult<T> = Result<T, DrawError>;

impl From<vk::Result> for DrawError {
    fn from(result: vk::Result) -> Self {
        DrawError::Api(result)
    }
}
