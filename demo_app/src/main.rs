//! Demo: a tinted quad driven by the immediate-mode renderer
//!
//! Edit the shaders under `resources/shaders` and recompile them (or touch
//! the `.spv` files) while the demo runs to see hot reloading in action.

mod window;

use ash::vk;
use bytemuck::{Pod, Zeroable};
use imdraw::{DrawCall, GpuContext, Renderer, StageDesc, VertexAttributeDesc, VertexBindingDesc, VulkanInstance};
use window::Window;

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct Vertex {
    position: [f32; 2],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct QuadUniforms {
    tint: [f32; 4],
    time: f32,
    _pad: [f32; 3],
}

// Triangle strip order
const QUAD: [Vertex; 4] = [
    Vertex { position: [-0.5, -0.5] },
    Vertex { position: [0.5, -0.5] },
    Vertex { position: [-0.5, 0.5] },
    Vertex { position: [0.5, 0.5] },
];

fn shader_path(name: &str) -> String {
    format!("{}/resources/shaders/{}", env!("CARGO_MANIFEST_DIR"), name)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut window = Window::new("imdraw quad demo", 800, 600)?;

    let extensions = window.get_required_instance_extensions()?;
    let instance = VulkanInstance::new(&extensions, "quad_demo", true)?;
    let surface = window.create_vulkan_surface(instance.instance.handle())?;
    let context = GpuContext::new(instance, surface)?;
    let mut renderer = Renderer::new(context)?;

    log::info!("renderer ready, entering frame loop");

    while !window.should_close() {
        window.poll_events();
        let mut close = false;
        for (_, event) in window.flush_events() {
            if let glfw::WindowEvent::Key(glfw::Key::Escape, _, glfw::Action::Press, _) = event {
                close = true;
            }
        }
        if close {
            window.set_should_close(true);
        }

        let (width, height) = window.get_framebuffer_size();
        if width == 0 || height == 0 {
            // Minimized; nothing to present
            continue;
        }

        let extent = vk::Extent2D { width, height };
        if !renderer.wait_frame(extent)? {
            // Swapchain was invalidated; retry next iteration
            continue;
        }

        let time = window.time() as f32;
        let uniforms = QuadUniforms {
            tint: [
                0.5 + 0.5 * time.sin(),
                0.3,
                0.5 + 0.5 * time.cos(),
                1.0,
            ],
            time,
            _pad: [0.0; 3],
        };

        let call = DrawCall {
            stages: vec![
                StageDesc::new(shader_path("quad.vert.spv"), vk::ShaderStageFlags::VERTEX),
                StageDesc::new(shader_path("quad.frag.spv"), vk::ShaderStageFlags::FRAGMENT),
            ],
            vertex_bindings: vec![VertexBindingDesc {
                bytes: bytemuck::cast_slice(&QUAD),
                stride: std::mem::size_of::<Vertex>() as u32,
                input_rate: vk::VertexInputRate::VERTEX,
                attributes: vec![VertexAttributeDesc {
                    location: 0,
                    format: vk::Format::R32G32_SFLOAT,
                    offset: 0,
                }],
            }],
            uniform_bytes: bytemuck::bytes_of(&uniforms),
            vertex_count: QUAD.len() as u32,
            ..Default::default()
        };

        renderer.draw(&call)?;
        renderer.submit()?;
    }

    Ok(())
}
