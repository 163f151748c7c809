//! Per-swapchain-image frame state
//!
//! Each swapchain image owns a command buffer, its sync primitives, a
//! framebuffer, and the transient GPU objects produced by the draw calls of
//! its current frame. Exactly one frame may be in flight per image index;
//! the fence wait in [`FrameImage::begin`] is the backpressure that enforces
//! it.

use ash::{vk, Device};
use std::sync::Arc;
use crate::buffer::Buffer;
use crate::descriptor::DescriptorSet;
use crate::error::{DrawError, DrawResult};
use crate::pipeline::Pipeline;
use crate::sync::{Fence, Semaphore};
use crate::texture::{Sampler, Texture};
use crate::uniform::UniformArena;

/// Mutable state tied to one swapchain image
pub struct FrameImage {
    device: Device,
    command_pool: vk::CommandPool,
    command_buffer: vk::CommandBuffer,
    image_view: vk::ImageView,
    framebuffer: vk::Framebuffer,
    /// Signaled when this image's commands finish on the GPU
    pub render_finished: Semaphore,
    /// Signaled at submit completion, waited on before reuse
    pub in_flight: Fence,
    /// Uniform arena, allocated on the first draw that needs it
    pub uniforms: Option<UniformArena>,
    /// Pipelines referenced by this frame's draw calls
    pub pipelines: Vec<Arc<Pipeline>>,
    /// Samplers created for this frame's draw calls
    pub samplers: Vec<Sampler>,
    /// Descriptor sets allocated for this frame's draw calls
    pub descriptor_sets: Vec<DescriptorSet>,
    /// Textures referenced by this frame, kept alive past cache invalidation
    pub textures: Vec<Arc<Texture>>,
    /// Vertex buffers uploaded for this frame's draw calls
    pub vertex_buffers: Vec<Buffer>,
}

impl FrameImage {
    /// Build the state for one swapchain image: image view, framebuffer,
    /// command buffer, semaphore, and a fence created signaled so the first
    /// wait passes immediately
    pub fn new(
        device: Device,
        command_pool: vk::CommandPool,
        render_pass: vk::RenderPass,
        image: vk::Image,
        format: vk::Format,
        extent: vk::Extent2D,
    ) -> DrawResult<Self> {
        let view_info = vk::ImageViewCreateInfo::builder()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .components(vk::ComponentMapping {
                r: vk::ComponentSwizzle::IDENTITY,
                g: vk::ComponentSwizzle::IDENTITY,
                b: vk::ComponentSwizzle::IDENTITY,
                a: vk::ComponentSwizzle::IDENTITY,
            })
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            });

        let image_view = unsafe {
            device
                .create_image_view(&view_info, None)
                .map_err(DrawError::Api)?
        };

        let attachments = [image_view];
        let framebuffer_info = vk::FramebufferCreateInfo::builder()
            .render_pass(render_pass)
            .attachments(&attachments)
            .width(extent.width)
            .height(extent.height)
            .layers(1);

        let framebuffer = unsafe {
            device
                .create_framebuffer(&framebuffer_info, None)
                .map_err(|e| {
                    device.destroy_image_view(image_view, None);
                    DrawError::Api(e)
                })?
        };

        let alloc_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);

        let command_buffer = unsafe {
            device
                .allocate_command_buffers(&alloc_info)
                .map_err(|e| {
                    device.destroy_framebuffer(framebuffer, None);
                    device.destroy_image_view(image_view, None);
                    DrawError::Api(e)
                })?[0]
        };

        let render_finished = Semaphore::new(device.clone())?;
        let in_flight = Fence::new(device.clone(), true)?;

        Ok(Self {
            device,
            command_pool,
            command_buffer,
            image_view,
            framebuffer,
            render_finished,
            in_flight,
            uniforms: None,
            pipelines: Vec::new(),
            samplers: Vec::new(),
            descriptor_sets: Vec::new(),
            textures: Vec::new(),
            vertex_buffers: Vec::new(),
        })
    }

    /// Block until the previous frame on this image has finished, then reset
    /// everything the new frame will overwrite and begin recording
    pub fn begin(&mut self, render_pass: vk::RenderPass, extent: vk::Extent2D) -> DrawResult<()> {
        self.in_flight.wait()?;
        self.in_flight.reset()?;

        unsafe {
            self.device
                .reset_command_buffer(self.command_buffer, vk::CommandBufferResetFlags::empty())
                .map_err(DrawError::Api)?;
        }

        // Transients from the completed frame are safe to release now
        self.pipelines.clear();
        self.samplers.clear();
        self.descriptor_sets.clear();
        self.textures.clear();
        self.vertex_buffers.clear();
        if let Some(uniforms) = &mut self.uniforms {
            uniforms.reset();
        }

        let begin_info = vk::CommandBufferBeginInfo::builder();
        unsafe {
            self.device
                .begin_command_buffer(self.command_buffer, &begin_info)
                .map_err(DrawError::Api)?;
        }

        let clear_values = [vk::ClearValue {
            color: vk::ClearColorValue {
                float32: [0.0, 0.0, 0.0, 1.0],
            },
        }];

        let render_pass_info = vk::RenderPassBeginInfo::builder()
            .render_pass(render_pass)
            .framebuffer(self.framebuffer)
            .render_area(vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent,
            })
            .clear_values(&clear_values);

        unsafe {
            self.device.cmd_begin_render_pass(
                self.command_buffer,
                &render_pass_info,
                vk::SubpassContents::INLINE,
            );
        }

        Ok(())
    }

    /// End the render pass and close the command buffer
    pub fn end(&self) -> DrawResult<()> {
        unsafe {
            self.device.cmd_end_render_pass(self.command_buffer);
            self.device
                .end_command_buffer(self.command_buffer)
                .map_err(DrawError::Api)?;
        }
        Ok(())
    }

    /// Get the command buffer recording this frame
    pub fn command_buffer(&self) -> vk::CommandBuffer {
        self.command_buffer
    }
}

impl Drop for FrameImage {
    fn drop(&mut self) {
        unsafe {
            self.device
                .free_command_buffers(self.command_pool, &[self.command_buffer]);
            self.device.destroy_framebuffer(self.framebuffer, None);
            self.device.destroy_image_view(self.image_view, None);
        }
    }
}
