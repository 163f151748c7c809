//! Texture decoding and GPU upload
//!
//! Texture files are decoded to RGBA8 with the `image` crate, then uploaded
//! through a staging buffer on a one-shot command buffer: transition to
//! TRANSFER_DST, copy, transition to SHADER_READ_ONLY. Uploaded textures are
//! cached by the renderer and shared with in-flight frames through `Arc`, so
//! a hot-reload never destroys a texture the GPU is still sampling.

use ash::{vk, Device};
use std::path::Path;
use crate::buffer::{find_memory_type, Buffer};
use crate::error::{DrawError, DrawResult};

/// Decoded image data ready for GPU upload
pub struct ImageData {
    /// Raw RGBA pixel data
    pub data: Vec<u8>,
    /// Image width in pixels
    pub width: u32,
    /// Image height in pixels
    pub height: u32,
}

impl ImageData {
    /// Decode an image file to RGBA8
    pub fn from_file<P: AsRef<Path>>(path: P) -> DrawResult<Self> {
        let path = path.as_ref();

        let img = image::open(path).map_err(|source| DrawError::Decode {
            path: path.to_path_buf(),
            source,
        })?;

        let rgba = img.to_rgba8();
        let (width, height) = rgba.dimensions();

        log::debug!("decoded image {}x{} from {:?}", width, height, path);

        Ok(Self {
            data: rgba.into_raw(),
            width,
            height,
        })
    }
}

/// Sampled GPU texture with RAII cleanup
pub struct Texture {
    device: Device,
    image: vk::Image,
    image_view: vk::ImageView,
    memory: vk::DeviceMemory,
    extent: vk::Extent2D,
}

impl Texture {
    /// Decode `path` and upload it as a sampled 2D texture
    pub fn from_file(
        device: Device,
        memory_properties: &vk::PhysicalDeviceMemoryProperties,
        command_pool: vk::CommandPool,
        graphics_queue: vk::Queue,
        path: &Path,
    ) -> DrawResult<Self> {
        let image_data = ImageData::from_file(path)?;
        Self::from_image_data(
            device,
            memory_properties,
            command_pool,
            graphics_queue,
            &image_data,
        )
    }

    /// Upload decoded pixel data as a sampled 2D texture
    pub fn from_image_data(
        device: Device,
        memory_properties: &vk::PhysicalDeviceMemoryProperties,
        command_pool: vk::CommandPool,
        graphics_queue: vk::Queue,
        image_data: &ImageData,
    ) -> DrawResult<Self> {
        let extent = vk::Extent2D {
            width: image_data.width,
            height: image_data.height,
        };
        let format = vk::Format::R8G8B8A8_UNORM;

        let image_create_info = vk::ImageCreateInfo::builder()
            .image_type(vk::ImageType::TYPE_2D)
            .extent(vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .format(format)
            .tiling(vk::ImageTiling::OPTIMAL)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .usage(vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::SAMPLED)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .samples(vk::SampleCountFlags::TYPE_1);

        let image = unsafe {
            device
                .create_image(&image_create_info, None)
                .map_err(DrawError::Api)?
        };

        let memory_requirements = unsafe { device.get_image_memory_requirements(image) };
        let memory_type_index = find_memory_type(
            memory_properties,
            memory_requirements.memory_type_bits,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        )?;

        let allocate_info = vk::MemoryAllocateInfo::builder()
            .allocation_size(memory_requirements.size)
            .memory_type_index(memory_type_index);

        let memory = unsafe {
            device
                .allocate_memory(&allocate_info, None)
                .map_err(DrawError::Api)?
        };

        unsafe {
            device
                .bind_image_memory(image, memory, 0)
                .map_err(DrawError::Api)?;
        }

        // Stage the pixels and copy on a one-shot command buffer
        let staging = Buffer::new(
            device.clone(),
            memory_properties,
            image_data.data.len() as vk::DeviceSize,
            vk::BufferUsageFlags::TRANSFER_SRC,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )?;
        staging.write_bytes(0, &image_data.data)?;

        copy_buffer_to_image(
            &device,
            command_pool,
            graphics_queue,
            staging.handle(),
            image,
            extent,
        )?;

        let view_create_info = vk::ImageViewCreateInfo::builder()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            });

        let image_view = unsafe {
            device
                .create_image_view(&view_create_info, None)
                .map_err(DrawError::Api)?
        };

        Ok(Self {
            device,
            image,
            image_view,
            memory,
            extent,
        })
    }

    /// Get the image view handle
    pub fn image_view(&self) -> vk::ImageView {
        self.image_view
    }

    /// Get the texture extent
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }
}

impl Drop for Texture {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_image_view(self.image_view, None);
            self.device.destroy_image(self.image, None);
            self.device.free_memory(self.memory, None);
        }
    }
}

/// Caller-supplied sampler parameters for one draw call
#[derive(Debug, Clone, Copy)]
pub struct SamplerDesc {
    /// Magnification filter
    pub mag_filter: vk::Filter,
    /// Minification filter
    pub min_filter: vk::Filter,
    /// Address mode applied to all three coordinates
    pub address_mode: vk::SamplerAddressMode,
}

impl Default for SamplerDesc {
    fn default() -> Self {
        Self {
            mag_filter: vk::Filter::LINEAR,
            min_filter: vk::Filter::LINEAR,
            address_mode: vk::SamplerAddressMode::REPEAT,
        }
    }
}

/// Sampler created per draw call from caller parameters, not cached
pub struct Sampler {
    device: Device,
    sampler: vk::Sampler,
}

impl Sampler {
    /// Create a sampler from the draw call's parameters
    pub fn new(device: Device, desc: &SamplerDesc) -> DrawResult<Self> {
        let create_info = vk::SamplerCreateInfo::builder()
            .mag_filter(desc.mag_filter)
            .min_filter(desc.min_filter)
            .mipmap_mode(vk::SamplerMipmapMode::LINEAR)
            .address_mode_u(desc.address_mode)
            .address_mode_v(desc.address_mode)
            .address_mode_w(desc.address_mode)
            .anisotropy_enable(false)
            .min_lod(0.0)
            .max_lod(vk::LOD_CLAMP_NONE);

        let sampler = unsafe {
            device
                .create_sampler(&create_info, None)
                .map_err(DrawError::Api)?
        };

        Ok(Self { device, sampler })
    }

    /// Get the sampler handle
    pub fn handle(&self) -> vk::Sampler {
        self.sampler
    }
}

impl Drop for Sampler {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_sampler(self.sampler, None);
        }
    }
}

/// Copy staged pixels into the image with the required layout transitions
fn copy_buffer_to_image(
    device: &Device,
    command_pool: vk::CommandPool,
    graphics_queue: vk::Queue,
    buffer: vk::Buffer,
    image: vk::Image,
    extent: vk::Extent2D,
) -> DrawResult<()> {
    let allocate_info = vk::CommandBufferAllocateInfo::builder()
        .level(vk::CommandBufferLevel::PRIMARY)
        .command_pool(command_pool)
        .command_buffer_count(1);

    let command_buffer = unsafe {
        device
            .allocate_command_buffers(&allocate_info)
            .map_err(DrawError::Api)?[0]
    };

    let begin_info =
        vk::CommandBufferBeginInfo::builder().flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);

    let subresource_range = vk::ImageSubresourceRange {
        aspect_mask: vk::ImageAspectFlags::COLOR,
        base_mip_level: 0,
        level_count: 1,
        base_array_layer: 0,
        layer_count: 1,
    };

    unsafe {
        device
            .begin_command_buffer(command_buffer, &begin_info)
            .map_err(DrawError::Api)?;

        let to_transfer = vk::ImageMemoryBarrier::builder()
            .old_layout(vk::ImageLayout::UNDEFINED)
            .new_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(image)
            .subresource_range(subresource_range)
            .src_access_mask(vk::AccessFlags::empty())
            .dst_access_mask(vk::AccessFlags::TRANSFER_WRITE);

        device.cmd_pipeline_barrier(
            command_buffer,
            vk::PipelineStageFlags::TOP_OF_PIPE,
            vk::PipelineStageFlags::TRANSFER,
            vk::DependencyFlags::empty(),
            &[],
            &[],
            &[to_transfer.build()],
        );

        let region = vk::BufferImageCopy::builder()
            .buffer_offset(0)
            .buffer_row_length(0)
            .buffer_image_height(0)
            .image_subresource(vk::ImageSubresourceLayers {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                mip_level: 0,
                base_array_layer: 0,
                layer_count: 1,
            })
            .image_offset(vk::Offset3D { x: 0, y: 0, z: 0 })
            .image_extent(vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            });

        device.cmd_copy_buffer_to_image(
            command_buffer,
            buffer,
            image,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            &[region.build()],
        );

        let to_sampled = vk::ImageMemoryBarrier::builder()
            .old_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
            .new_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(image)
            .subresource_range(subresource_range)
            .src_access_mask(vk::AccessFlags::TRANSFER_WRITE)
            .dst_access_mask(vk::AccessFlags::SHADER_READ);

        device.cmd_pipeline_barrier(
            command_buffer,
            vk::PipelineStageFlags::TRANSFER,
            vk::PipelineStageFlags::FRAGMENT_SHADER,
            vk::DependencyFlags::empty(),
            &[],
            &[],
            &[to_sampled.build()],
        );

        device
            .end_command_buffer(command_buffer)
            .map_err(DrawError::Api)?;

        let command_buffers = [command_buffer];
        let submit_info = vk::SubmitInfo::builder().command_buffers(&command_buffers);

        device
            .queue_submit(graphics_queue, &[submit_info.build()], vk::Fence::null())
            .map_err(DrawError::Api)?;
        device
            .queue_wait_idle(graphics_queue)
            .map_err(DrawError::Api)?;

        device.free_command_buffers(command_pool, &command_buffers);
    }

    Ok(())
}
