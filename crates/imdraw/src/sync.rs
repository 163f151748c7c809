//! Synchronization primitives with RAII cleanup
//!
//! Thin wrappers around `vk::Semaphore` and `vk::Fence`. One semaphore/fence
//! pair lives on each frame image and is reused every frame for that image
//! index; the renderer additionally owns a shared image-ready semaphore.

use ash::{vk, Device};
use crate::error::{DrawError, DrawResult};

/// Binary semaphore for GPU-GPU synchronization
pub struct Semaphore {
    device: Device,
    semaphore: vk::Semaphore,
}

impl Semaphore {
    /// Create a new unsignaled semaphore
    pub fn new(device: Device) -> DrawResult<Self> {
        let create_info = vk::SemaphoreCreateInfo::builder();
        let semaphore = unsafe {
            device
                .create_semaphore(&create_info, None)
                .map_err(DrawError::Api)?
        };
        Ok(Self { device, semaphore })
    }

    /// Get the semaphore handle
    pub fn handle(&self) -> vk::Semaphore {
        self.semaphore
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_semaphore(self.semaphore, None);
        }
    }
}

/// Fence for CPU-GPU synchronization
pub struct Fence {
    device: Device,
    fence: vk::Fence,
}

impl Fence {
    /// Create a new fence, optionally in the signaled state
    pub fn new(device: Device, signaled: bool) -> DrawResult<Self> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };
        let create_info = vk::FenceCreateInfo::builder().flags(flags);
        let fence = unsafe {
            device
                .create_fence(&create_info, None)
                .map_err(DrawError::Api)?
        };
        Ok(Self { device, fence })
    }

    /// Block the calling thread until the fence signals
    pub fn wait(&self) -> DrawResult<()> {
        unsafe {
            self.device
                .wait_for_fences(&[self.fence], true, u64::MAX)
                .map_err(DrawError::Api)
        }
    }

    /// Reset the fence to the unsignaled state
    pub fn reset(&self) -> DrawResult<()> {
        unsafe {
            self.device
                .reset_fences(&[self.fence])
                .map_err(DrawError::Api)
        }
    }

    /// Get the fence handle
    pub fn handle(&self) -> vk::Fence {
        self.fence
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_fence(self.fence, None);
        }
    }
}
