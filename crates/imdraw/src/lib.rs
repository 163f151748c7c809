//! # imdraw
//!
//! An immediate-mode Vulkan rendering layer. Callers describe each draw with
//! shader file paths, vertex bytes, texture paths, and a uniform blob; the
//! renderer owns pipelines, descriptor pools, texture uploads, and the
//! swapchain lifecycle behind a three-call frame protocol.
//!
//! ## Features
//!
//! - **Frame protocol**: `wait_frame` / `draw`* / `submit`, once per frame
//! - **Hot reloading**: shaders and textures re-resolve by file mtime on
//!   every draw call
//! - **Signature-keyed caching**: descriptor pools and graphics pipelines are
//!   created once per structural shape and reused
//! - **Per-frame uniform arena**: a bump allocator reset at the start of each
//!   frame for that image
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ash::vk;
//! use imdraw::{DrawCall, GpuContext, Renderer, StageDesc, VulkanInstance};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // The windowing layer supplies the extensions and the surface
//!     let instance = VulkanInstance::new(&[], "demo", true)?;
//!     # let surface = vk::SurfaceKHR::null();
//!     let context = GpuContext::new(instance, surface)?;
//!     let mut renderer = Renderer::new(context)?;
//!
//!     let extent = vk::Extent2D { width: 800, height: 600 };
//!     if renderer.wait_frame(extent)? {
//!         let call = DrawCall {
//!             stages: vec![
//!                 StageDesc::new("shaders/quad.vert.spv", vk::ShaderStageFlags::VERTEX),
//!                 StageDesc::new("shaders/quad.frag.spv", vk::ShaderStageFlags::FRAGMENT),
//!             ],
//!             vertex_count: 4,
//!             ..Default::default()
//!         };
//!         renderer.draw(&call)?;
//!         renderer.submit()?;
//!     }
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]

pub mod buffer;
pub mod cache;
pub mod context;
pub mod descriptor;
pub mod draw;
pub mod error;
pub mod frame;
pub mod pipeline;
pub mod renderer;
pub mod shader;
pub mod sync;
pub mod texture;
pub mod uniform;
pub mod view;

pub use context::{GpuContext, VulkanInstance};
pub use draw::{DrawCall, ImageDesc, StageDesc, VertexAttributeDesc, VertexBindingDesc};
pub use error::{DrawError, DrawResult};
pub use renderer::Renderer;
pub use texture::SamplerDesc;
