//! Swapchain view management
//!
//! A [`View`] is all-or-nothing: either the swapchain and every per-image
//! frame slot exist, or the view is absent and the next `wait_frame` rebuilds
//! it from scratch. There are no partial rebuilds; an out-of-date or
//! suboptimal result discards the whole view.

use ash::vk;
use ash::extensions::khr::Swapchain as SwapchainLoader;
use crate::context::GpuContext;
use crate::error::{DrawError, DrawResult};
use crate::frame::FrameImage;

/// Swapchain plus one frame-state slot per image
pub struct View {
    swapchain_loader: SwapchainLoader,
    swapchain: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    format: vk::SurfaceFormatKHR,
    extent: vk::Extent2D,
    /// Frame state per image index, built lazily on first acquisition
    pub frames: Vec<Option<FrameImage>>,
}

/// Result of acquiring the next swapchain image
pub enum Acquired {
    /// Image index to record against
    Image(u32),
    /// Surface changed; the caller must discard the view and skip this frame
    Invalidated,
}

impl View {
    /// Create a swapchain for the surface's current state.
    ///
    /// Requests the lesser of 3 and the surface's maximum image count, never
    /// below its minimum. FIFO presentation, concurrent sharing between the
    /// graphics and present families when they differ.
    pub fn new(context: &GpuContext, desired_extent: vk::Extent2D) -> DrawResult<Self> {
        let physical = &context.physical_device;
        let surface = context.surface;
        let surface_loader = &context.surface_loader;
        let swapchain_loader = context.device.swapchain_loader.clone();

        let surface_caps = unsafe {
            surface_loader
                .get_physical_device_surface_capabilities(physical.device, surface)
                .map_err(DrawError::Api)?
        };

        let surface_formats = unsafe {
            surface_loader
                .get_physical_device_surface_formats(physical.device, surface)
                .map_err(DrawError::Api)?
        };

        let format = surface_formats
            .iter()
            .find(|sf| {
                sf.format == vk::Format::B8G8R8A8_SRGB
                    && sf.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
            })
            .cloned()
            .or_else(|| surface_formats.first().cloned())
            .ok_or_else(|| {
                DrawError::InitializationFailed("No surface formats available".to_string())
            })?;

        let extent = if surface_caps.current_extent.width != u32::MAX {
            surface_caps.current_extent
        } else {
            vk::Extent2D {
                width: desired_extent.width.clamp(
                    surface_caps.min_image_extent.width,
                    surface_caps.max_image_extent.width,
                ),
                height: desired_extent.height.clamp(
                    surface_caps.min_image_extent.height,
                    surface_caps.max_image_extent.height,
                ),
            }
        };

        // max_image_count of 0 means unbounded
        let image_ceiling = if surface_caps.max_image_count > 0 {
            surface_caps.max_image_count.min(3)
        } else {
            3
        };
        let image_count = image_ceiling.max(surface_caps.min_image_count);

        let queue_families = [
            context.device.graphics_family,
            context.device.present_family,
        ];
        let concurrent = queue_families[0] != queue_families[1];

        let mut swapchain_create_info = vk::SwapchainCreateInfoKHR::builder()
            .surface(surface)
            .min_image_count(image_count)
            .image_format(format.format)
            .image_color_space(format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .pre_transform(surface_caps.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(vk::PresentModeKHR::FIFO)
            .clipped(true)
            .old_swapchain(vk::SwapchainKHR::null());

        swapchain_create_info = if concurrent {
            swapchain_create_info
                .image_sharing_mode(vk::SharingMode::CONCURRENT)
                .queue_family_indices(&queue_families)
        } else {
            swapchain_create_info.image_sharing_mode(vk::SharingMode::EXCLUSIVE)
        };

        let swapchain = unsafe {
            swapchain_loader
                .create_swapchain(&swapchain_create_info, None)
                .map_err(DrawError::Api)?
        };

        let images = unsafe {
            swapchain_loader
                .get_swapchain_images(swapchain)
                .map_err(DrawError::Api)?
        };

        log::debug!(
            "created swapchain: {} images, {}x{}, {:?}",
            images.len(),
            extent.width,
            extent.height,
            format.format
        );

        let mut frames = Vec::with_capacity(images.len());
        frames.resize_with(images.len(), || None);

        Ok(Self {
            swapchain_loader,
            swapchain,
            images,
            format,
            extent,
            frames,
        })
    }

    /// Acquire the next presentable image, signaling `image_ready` once the
    /// image can be rendered to. Out-of-date and suboptimal results are not
    /// errors; they tell the caller to discard this view.
    pub fn acquire(&self, image_ready: vk::Semaphore) -> DrawResult<Acquired> {
        let result = unsafe {
            self.swapchain_loader.acquire_next_image(
                self.swapchain,
                u64::MAX,
                image_ready,
                vk::Fence::null(),
            )
        };

        match result {
            Ok((index, false)) => Ok(Acquired::Image(index)),
            Ok((_, true)) | Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(Acquired::Invalidated),
            Err(err) => Err(DrawError::Api(err)),
        }
    }

    /// Present image `index` once `wait` signals. Returns `Invalidated` when
    /// the surface reports out-of-date or suboptimal, which the caller handles
    /// exactly like an invalidated acquire.
    pub fn present(
        &self,
        queue: vk::Queue,
        index: u32,
        wait: vk::Semaphore,
    ) -> DrawResult<Acquired> {
        let wait_semaphores = [wait];
        let swapchains = [self.swapchain];
        let indices = [index];

        let present_info = vk::PresentInfoKHR::builder()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&indices);

        let result = unsafe { self.swapchain_loader.queue_present(queue, &present_info) };

        match result {
            Ok(false) => Ok(Acquired::Image(index)),
            Ok(true) | Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(Acquired::Invalidated),
            Err(err) => Err(DrawError::Api(err)),
        }
    }

    /// Get the image at `index`
    pub fn image(&self, index: u32) -> vk::Image {
        self.images[index as usize]
    }

    /// Get the number of swapchain images
    pub fn image_count(&self) -> u32 {
        self.images.len() as u32
    }

    /// Get the swapchain extent
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    /// Get the surface format
    pub fn format(&self) -> vk::SurfaceFormatKHR {
        self.format
    }

    /// Get the swapchain handle
    pub fn handle(&self) -> vk::SwapchainKHR {
        self.swapchain
    }
}

impl Drop for View {
    fn drop(&mut self) {
        // Frame slots hold views and framebuffers onto the swapchain images,
        // so they go first
        self.frames.clear();
        unsafe {
            self.swapchain_loader.destroy_swapchain(self.swapchain, None);
        }
    }
}
