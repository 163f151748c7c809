//! Renderer root and the frame protocol
//!
//! The [`Renderer`] owns the device context, the resource caches, the
//! descriptor pool registry, the pipeline cache, and the current [`View`].
//! Callers drive it once per frame with the three-call protocol:
//! [`Renderer::wait_frame`], zero or more [`Renderer::draw`] calls, then
//! [`Renderer::submit`]. Calling `draw` or `submit` without a preceding
//! successful `wait_frame` is a no-op returning `false`, not an error.

use ash::{vk, Device};
use std::collections::HashMap;
use std::sync::Arc;
use crate::buffer::Buffer;
use crate::context::GpuContext;
use crate::descriptor::{DescriptorPool, PoolRegistry, PoolSignature, MAX_DRAWS_PER_FRAME};
use crate::draw::DrawCall;
use crate::error::{DrawError, DrawResult};
use crate::frame::FrameImage;
use crate::pipeline::{PipelineCache, PipelineKey, StageKey, VertexBindingKey};
use crate::shader::ShaderModule;
use crate::sync::Semaphore;
use crate::texture::{Sampler, Texture};
use crate::uniform::UniformArena;
use crate::view::{Acquired, View};

pub use crate::uniform::UNIFORM_RANGE;

/// Descriptor pool signature for a draw with `image_count` sampled textures:
/// one uniform buffer, then one combined image sampler per texture
fn binding_signature(image_count: u32) -> PoolSignature {
    let mut sizes = vec![(vk::DescriptorType::UNIFORM_BUFFER, 1)];
    for _ in 0..image_count {
        sizes.push((vk::DescriptorType::COMBINED_IMAGE_SAMPLER, 1));
    }
    PoolSignature::new(&sizes)
}

/// Descriptor set and pipeline layouts for one binding shape.
///
/// Created once per distinct texture count and shared by every draw call with
/// that shape; there is no other per-call layout variation.
struct FixedLayout {
    device: Device,
    set_layout: vk::DescriptorSetLayout,
    pipeline_layout: vk::PipelineLayout,
}

impl FixedLayout {
    fn new(device: Device, image_count: u32) -> DrawResult<Self> {
        let mut bindings = vec![vk::DescriptorSetLayoutBinding::builder()
            .binding(0)
            .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
            .descriptor_count(1)
            .stage_flags(vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT)
            .build()];

        for i in 0..image_count {
            bindings.push(
                vk::DescriptorSetLayoutBinding::builder()
                    .binding(1 + i)
                    .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                    .descriptor_count(1)
                    .stage_flags(vk::ShaderStageFlags::FRAGMENT)
                    .build(),
            );
        }

        let layout_info = vk::DescriptorSetLayoutCreateInfo::builder().bindings(&bindings);

        let set_layout = unsafe {
            device
                .create_descriptor_set_layout(&layout_info, None)
                .map_err(DrawError::Api)?
        };

        let set_layouts = [set_layout];
        let pipeline_layout_info =
            vk::PipelineLayoutCreateInfo::builder().set_layouts(&set_layouts);

        let pipeline_layout = unsafe {
            device
                .create_pipeline_layout(&pipeline_layout_info, None)
                .map_err(|e| {
                    device.destroy_descriptor_set_layout(set_layout, None);
                    DrawError::Api(e)
                })?
        };

        Ok(Self {
            device,
            set_layout,
            pipeline_layout,
        })
    }
}

impl Drop for FixedLayout {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_pipeline_layout(self.pipeline_layout, None);
            self.device.destroy_descriptor_set_layout(self.set_layout, None);
        }
    }
}

/// Single-subpass render pass clearing to a solid color and ending in the
/// present layout
fn create_render_pass(device: &Device, format: vk::Format) -> DrawResult<vk::RenderPass> {
    let color_attachment = vk::AttachmentDescription::builder()
        .format(format)
        .samples(vk::SampleCountFlags::TYPE_1)
        .load_op(vk::AttachmentLoadOp::CLEAR)
        .store_op(vk::AttachmentStoreOp::STORE)
        .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
        .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
        .initial_layout(vk::ImageLayout::UNDEFINED)
        .final_layout(vk::ImageLayout::PRESENT_SRC_KHR)
        .build();

    let color_attachment_ref = vk::AttachmentReference::builder()
        .attachment(0)
        .layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
        .build();

    let color_attachment_refs = [color_attachment_ref];
    let subpass = vk::SubpassDescription::builder()
        .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
        .color_attachments(&color_attachment_refs)
        .build();

    let dependency = vk::SubpassDependency::builder()
        .src_subpass(vk::SUBPASS_EXTERNAL)
        .dst_subpass(0)
        .src_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
        .src_access_mask(vk::AccessFlags::empty())
        .dst_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
        .dst_access_mask(vk::AccessFlags::COLOR_ATTACHMENT_WRITE)
        .build();

    let attachments = [color_attachment];
    let subpasses = [subpass];
    let dependencies = [dependency];
    let render_pass_info = vk::RenderPassCreateInfo::builder()
        .attachments(&attachments)
        .subpasses(&subpasses)
        .dependencies(&dependencies);

    unsafe {
        device
            .create_render_pass(&render_pass_info, None)
            .map_err(DrawError::Api)
    }
}

/// Drop the view and every per-view state with it: the recording marker and
/// the pipeline cache, whose entries bake the old extent in. Shader and
/// texture caches track files, not the swapchain, and survive untouched.
fn clear_view_state<V, P>(
    view: &mut Option<V>,
    recording: &mut Option<u32>,
    pipelines: &mut PipelineCache<P>,
) {
    *recording = None;
    pipelines.clear();
    *view = None;
}

/// Immediate-mode renderer owning every cache and the frame protocol
pub struct Renderer {
    shader_cache: crate::cache::FileCache<ShaderModule>,
    texture_cache: crate::cache::FileCache<Arc<Texture>>,
    pool_registry: PoolRegistry<DescriptorPool>,
    pipeline_cache: PipelineCache,
    layouts: HashMap<u32, FixedLayout>,
    view: Option<View>,
    render_pass: Option<vk::RenderPass>,
    image_ready: Semaphore,
    command_pool: vk::CommandPool,
    /// Image index currently recording, `None` outside wait_frame..submit
    recording: Option<u32>,
    min_uniform_alignment: usize,
    context: GpuContext,
}

impl Renderer {
    /// Build a renderer over an initialized GPU context
    pub fn new(context: GpuContext) -> DrawResult<Self> {
        let device = context.raw_device();

        let pool_info = vk::CommandPoolCreateInfo::builder()
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
            .queue_family_index(context.device.graphics_family);

        let command_pool = unsafe {
            device
                .create_command_pool(&pool_info, None)
                .map_err(DrawError::Api)?
        };

        let image_ready = Semaphore::new(device)?;

        let min_uniform_alignment =
            context.physical_device.min_uniform_alignment().max(1) as usize;

        Ok(Self {
            shader_cache: crate::cache::FileCache::new(),
            texture_cache: crate::cache::FileCache::new(),
            pool_registry: PoolRegistry::new(),
            pipeline_cache: PipelineCache::new(),
            layouts: HashMap::new(),
            view: None,
            render_pass: None,
            image_ready,
            command_pool,
            recording: None,
            min_uniform_alignment,
            context,
        })
    }

    /// Begin a frame: rebuild the view if it was discarded, acquire the next
    /// image, wait out the previous frame on that image, and start recording.
    ///
    /// Returns `Ok(false)` when no frame is available this call because the
    /// surface changed; the next call rebuilds the swapchain transparently.
    pub fn wait_frame(&mut self, desired_extent: vk::Extent2D) -> DrawResult<bool> {
        self.recording = None;

        if self.view.is_none() {
            let view = View::new(&self.context, desired_extent)?;
            if self.render_pass.is_none() {
                self.render_pass = Some(create_render_pass(
                    &self.context.device.device,
                    view.format().format,
                )?);
            }
            self.view = Some(view);
        }

        let Some(render_pass) = self.render_pass else {
            return Ok(false);
        };

        let index = {
            let Some(view) = self.view.as_ref() else {
                return Ok(false);
            };
            match view.acquire(self.image_ready.handle())? {
                Acquired::Image(index) => index,
                Acquired::Invalidated => {
                    self.discard_view()?;
                    return Ok(false);
                }
            }
        };

        let device = self.context.raw_device();
        let Some(view) = self.view.as_mut() else {
            return Ok(false);
        };

        let image = view.image(index);
        let format = view.format().format;
        let extent = view.extent();

        if view.frames[index as usize].is_none() {
            view.frames[index as usize] = Some(FrameImage::new(
                device,
                self.command_pool,
                render_pass,
                image,
                format,
                extent,
            )?);
        }

        let Some(frame) = view.frames[index as usize].as_mut() else {
            return Ok(false);
        };
        frame.begin(render_pass, extent)?;

        self.recording = Some(index);
        Ok(true)
    }

    /// Record one draw call against the current frame.
    ///
    /// Returns `Ok(false)` when no frame is recording. A `prepare_only` call
    /// warms the shader, texture, pipeline, and pool caches without recording
    /// commands or consuming uniform space; it works whenever a view exists.
    pub fn draw(&mut self, call: &DrawCall) -> DrawResult<bool> {
        if !call.prepare_only && self.recording.is_none() {
            return Ok(false);
        }

        let Self {
            shader_cache,
            texture_cache,
            pool_registry,
            pipeline_cache,
            layouts,
            view,
            render_pass,
            recording,
            command_pool,
            min_uniform_alignment,
            context,
            ..
        } = self;

        let (Some(view), Some(render_pass)) = (view.as_mut(), *render_pass) else {
            return Ok(false);
        };

        let device = context.raw_device();
        let memory_properties = &context.physical_device.memory_properties;

        // Shader stages, recompiled when their files changed on disk. A
        // recompile destroys the old module, so pipelines keyed on its handle
        // are evicted before the handle can be reused.
        let mut stage_keys = Vec::with_capacity(call.stages.len());
        for stage in &call.stages {
            let previous = shader_cache.get(&stage.path).map(|module| module.handle());
            let module = shader_cache.resolve(&stage.path, |path| {
                ShaderModule::from_file(device.clone(), path)
            })?;
            let handle = module.handle();
            if let Some(previous) = previous {
                if previous != handle {
                    pipeline_cache.evict_stage(previous);
                }
            }
            stage_keys.push(StageKey {
                module: handle,
                stage: stage.stage,
                entry_point: stage.entry_point.clone(),
            });
        }

        // Textures, re-decoded when their files changed on disk. The Arc
        // clones keep an invalidated texture alive while a frame still
        // references it.
        let mut textures = Vec::with_capacity(call.images.len());
        for image in &call.images {
            let texture = texture_cache.resolve(&image.path, |path| {
                Texture::from_file(
                    device.clone(),
                    memory_properties,
                    *command_pool,
                    context.device.graphics_queue,
                    path,
                )
                .map(Arc::new)
            })?;
            textures.push(Arc::clone(texture));
        }

        let image_count = call.images.len() as u32;
        if !layouts.contains_key(&image_count) {
            layouts.insert(image_count, FixedLayout::new(device.clone(), image_count)?);
        }
        let layout = &layouts[&image_count];

        let key = PipelineKey {
            stages: stage_keys,
            vertex_layout: call
                .vertex_bindings
                .iter()
                .map(|binding| VertexBindingKey {
                    stride: binding.stride,
                    input_rate: binding.input_rate,
                    attributes: binding
                        .attributes
                        .iter()
                        .map(|attr| (attr.location, attr.format, attr.offset))
                        .collect(),
                })
                .collect(),
        };

        let pipeline = pipeline_cache.get_or_create(
            &device,
            render_pass,
            layout.pipeline_layout,
            view.extent(),
            &key,
        )?;

        let signature = binding_signature(image_count);
        let max_sets = view.image_count() * MAX_DRAWS_PER_FRAME;
        let pool = pool_registry.get_or_create_with(&signature, |signature| {
            DescriptorPool::new(device.clone(), signature, max_sets)
        })?;

        if call.prepare_only {
            return Ok(true);
        }

        let Some(index) = *recording else {
            return Ok(false);
        };
        let Some(frame) = view.frames[index as usize].as_mut() else {
            return Ok(false);
        };

        if frame.uniforms.is_none() {
            frame.uniforms = Some(UniformArena::new(
                device.clone(),
                memory_properties,
                *min_uniform_alignment,
            )?);
        }
        let (uniform_buffer, uniform_offset) = match frame.uniforms.as_ref() {
            Some(uniforms) => (uniforms.handle(), uniforms.peek_offset()),
            None => return Ok(false),
        };

        // Samplers are per-call, never cached
        let mut sampler_handles = Vec::with_capacity(call.images.len());
        for image in &call.images {
            let sampler = Sampler::new(device.clone(), &image.sampler)?;
            sampler_handles.push(sampler.handle());
            frame.samplers.push(sampler);
        }

        let set = pool.allocate(layout.set_layout)?;

        // The descriptor binds the arena range this call's uniforms will
        // occupy; the copy itself happens below
        let buffer_infos = [vk::DescriptorBufferInfo::builder()
            .buffer(uniform_buffer)
            .offset(uniform_offset as u64)
            .range(UNIFORM_RANGE as u64)
            .build()];

        let image_infos: Vec<[vk::DescriptorImageInfo; 1]> = textures
            .iter()
            .zip(&sampler_handles)
            .map(|(texture, &sampler)| {
                [vk::DescriptorImageInfo::builder()
                    .image_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
                    .image_view(texture.image_view())
                    .sampler(sampler)
                    .build()]
            })
            .collect();

        let mut writes = vec![vk::WriteDescriptorSet::builder()
            .dst_set(set.handle())
            .dst_binding(0)
            .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
            .buffer_info(&buffer_infos)
            .build()];

        for (i, info) in image_infos.iter().enumerate() {
            writes.push(
                vk::WriteDescriptorSet::builder()
                    .dst_set(set.handle())
                    .dst_binding(1 + i as u32)
                    .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                    .image_info(info)
                    .build(),
            );
        }

        unsafe {
            device.update_descriptor_sets(&writes, &[]);
        }

        // Vertex data is uploaded fresh each call into host-visible buffers
        // owned by the frame
        let mut vertex_handles = Vec::with_capacity(call.vertex_bindings.len());
        for binding in &call.vertex_bindings {
            let buffer = Buffer::new(
                device.clone(),
                memory_properties,
                binding.bytes.len().max(1) as vk::DeviceSize,
                vk::BufferUsageFlags::VERTEX_BUFFER,
                vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
            )?;
            buffer.write_bytes(0, binding.bytes)?;
            vertex_handles.push(buffer.handle());
            frame.vertex_buffers.push(buffer);
        }

        let cmd = frame.command_buffer();
        unsafe {
            device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, pipeline.handle());
            if !vertex_handles.is_empty() {
                let offsets = vec![0; vertex_handles.len()];
                device.cmd_bind_vertex_buffers(cmd, 0, &vertex_handles, &offsets);
            }
            device.cmd_bind_descriptor_sets(
                cmd,
                vk::PipelineBindPoint::GRAPHICS,
                layout.pipeline_layout,
                0,
                &[set.handle()],
                &[],
            );
            device.cmd_draw(cmd, call.vertex_count, 1, 0, 0);
        }

        if let Some(uniforms) = frame.uniforms.as_mut() {
            uniforms.push(call.uniform_bytes)?;
        }

        frame.pipelines.push(pipeline);
        frame.descriptor_sets.push(set);
        frame.textures.extend(textures);

        Ok(true)
    }

    /// End recording, submit the frame to the graphics queue, and present it.
    ///
    /// Returns `Ok(false)` when no frame is recording. An out-of-date or
    /// suboptimal present discards the view and is otherwise swallowed.
    pub fn submit(&mut self) -> DrawResult<bool> {
        let Some(index) = self.recording.take() else {
            return Ok(false);
        };

        let invalidated = {
            let Some(view) = self.view.as_ref() else {
                return Ok(false);
            };
            let Some(frame) = view.frames[index as usize].as_ref() else {
                return Ok(false);
            };

            frame.end()?;

            let wait_semaphores = [self.image_ready.handle()];
            let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
            let command_buffers = [frame.command_buffer()];
            let signal_semaphores = [frame.render_finished.handle()];

            let submit_info = vk::SubmitInfo::builder()
                .wait_semaphores(&wait_semaphores)
                .wait_dst_stage_mask(&wait_stages)
                .command_buffers(&command_buffers)
                .signal_semaphores(&signal_semaphores)
                .build();

            unsafe {
                self.context
                    .device
                    .device
                    .queue_submit(
                        self.context.device.graphics_queue,
                        &[submit_info],
                        frame.in_flight.handle(),
                    )
                    .map_err(DrawError::Api)?;
            }

            matches!(
                view.present(
                    self.context.device.present_queue,
                    index,
                    frame.render_finished.handle(),
                )?,
                Acquired::Invalidated
            )
        };

        if invalidated {
            self.discard_view()?;
        }

        Ok(true)
    }

    /// Get the current swapchain extent, if a view exists
    pub fn extent(&self) -> Option<vk::Extent2D> {
        self.view.as_ref().map(|view| view.extent())
    }

    /// Get the current swapchain image count, if a view exists
    pub fn image_count(&self) -> Option<u32> {
        self.view.as_ref().map(|view| view.image_count())
    }

    /// Tear down the view so the next `wait_frame` rebuilds it. Pipelines
    /// bake the extent in, so the pipeline cache goes with it.
    fn discard_view(&mut self) -> DrawResult<()> {
        unsafe {
            self.context
                .device
                .device
                .device_wait_idle()
                .map_err(DrawError::Api)?;
        }
        clear_view_state(
            &mut self.view,
            &mut self.recording,
            &mut self.pipeline_cache,
        );
        log::info!("swapchain invalidated, view discarded");
        Ok(())
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        unsafe {
            let _ = self.context.device.device.device_wait_idle();
        }
        // Frames reference the render pass through their framebuffers
        self.view = None;
        unsafe {
            if let Some(render_pass) = self.render_pass.take() {
                self.context
                    .device
                    .device
                    .destroy_render_pass(render_pass, None);
            }
            self.context
                .device
                .device
                .destroy_command_pool(self.command_pool, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_binding_signature_shapes() {
        assert_eq!(binding_signature(0), binding_signature(0));
        assert_eq!(binding_signature(2), binding_signature(2));
        assert_ne!(binding_signature(0), binding_signature(1));
    }

    #[test]
    fn test_uniform_range_fits_arena() {
        assert!(UNIFORM_RANGE <= crate::uniform::UNIFORM_ARENA_CAPACITY);
    }

    #[test]
    fn test_discarding_view_drops_per_view_state_only() {
        use std::fs;
        use std::path::PathBuf;

        let key = PipelineKey {
            stages: vec![StageKey {
                module: vk::ShaderModule::null(),
                stage: vk::ShaderStageFlags::VERTEX,
                entry_point: "main".to_string(),
            }],
            vertex_layout: Vec::new(),
        };

        let mut view = Some(7u32);
        let mut recording = Some(0u32);
        let mut pipelines: PipelineCache<u32> = PipelineCache::new();
        pipelines.get_or_create_with(&key, |_| Ok(1)).unwrap();

        let path: PathBuf = std::env::temp_dir().join("imdraw-renderer-test-discard");
        fs::write(&path, b"contents").unwrap();
        let mut shaders = crate::cache::FileCache::new();
        shaders.resolve(&path, |_| Ok(42u32)).unwrap();

        clear_view_state(&mut view, &mut recording, &mut pipelines);

        assert!(view.is_none());
        assert!(recording.is_none());
        assert!(pipelines.is_empty());
        // File-backed caches outlive the view
        assert_eq!(shaders.get(&path), Some(&42));
        fs::remove_file(&path).unwrap();
    }
}
