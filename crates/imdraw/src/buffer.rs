//! GPU buffer management with manual memory allocation
//!
//! Each buffer owns its `vk::DeviceMemory` and cleans up on drop. Memory type
//! selection follows the standard Vulkan pattern: create the buffer, query its
//! requirements, scan the physical device memory types for a compatible one.

use ash::{vk, Device};
use crate::error::{DrawError, DrawResult};

/// GPU buffer wrapper with automatic memory management
pub struct Buffer {
    device: Device,
    buffer: vk::Buffer,
    memory: vk::DeviceMemory,
    size: vk::DeviceSize,
}

impl Buffer {
    /// Create a new buffer with memory allocated from a compatible type
    pub fn new(
        device: Device,
        memory_properties: &vk::PhysicalDeviceMemoryProperties,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        properties: vk::MemoryPropertyFlags,
    ) -> DrawResult<Self> {
        let buffer_info = vk::BufferCreateInfo::builder()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe {
            device
                .create_buffer(&buffer_info, None)
                .map_err(DrawError::Api)?
        };

        let mem_requirements = unsafe { device.get_buffer_memory_requirements(buffer) };

        let memory_type_index = find_memory_type(
            memory_properties,
            mem_requirements.memory_type_bits,
            properties,
        );
        let memory_type_index = match memory_type_index {
            Ok(index) => index,
            Err(err) => {
                unsafe { device.destroy_buffer(buffer, None) };
                return Err(err);
            }
        };

        let alloc_info = vk::MemoryAllocateInfo::builder()
            .allocation_size(mem_requirements.size)
            .memory_type_index(memory_type_index);

        let memory = unsafe {
            match device.allocate_memory(&alloc_info, None) {
                Ok(memory) => memory,
                Err(err) => {
                    device.destroy_buffer(buffer, None);
                    return Err(DrawError::Api(err));
                }
            }
        };

        unsafe {
            if let Err(err) = device.bind_buffer_memory(buffer, memory, 0) {
                device.destroy_buffer(buffer, None);
                device.free_memory(memory, None);
                return Err(DrawError::Api(err));
            }
        }

        Ok(Self {
            device,
            buffer,
            memory,
            size,
        })
    }

    /// Map the whole buffer for writing
    pub fn map_memory(&self) -> DrawResult<*mut std::ffi::c_void> {
        unsafe {
            self.device
                .map_memory(self.memory, 0, self.size, vk::MemoryMapFlags::empty())
                .map_err(DrawError::Api)
        }
    }

    /// Unmap previously mapped memory
    pub fn unmap_memory(&self) {
        unsafe {
            self.device.unmap_memory(self.memory);
        }
    }

    /// Copy a byte slice into the buffer at the given offset
    pub fn write_bytes(&self, offset: usize, bytes: &[u8]) -> DrawResult<()> {
        let data_ptr = self.map_memory()? as *mut u8;
        unsafe {
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), data_ptr.add(offset), bytes.len());
        }
        self.unmap_memory();
        Ok(())
    }

    /// Get the buffer handle
    pub fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    /// Get the buffer size in bytes
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_buffer(self.buffer, None);
            self.device.free_memory(self.memory, None);
        }
    }
}

/// Find a memory type satisfying both the type filter and the property flags
pub fn find_memory_type(
    memory_properties: &vk::PhysicalDeviceMemoryProperties,
    type_filter: u32,
    properties: vk::MemoryPropertyFlags,
) -> DrawResult<u32> {
    for i in 0..memory_properties.memory_type_count {
        if (type_filter & (1 << i)) != 0
            && (memory_properties.memory_types[i as usize].property_flags & properties)
                == properties
        {
            return Ok(i);
        }
    }

    Err(DrawError::NoSuitableMemoryType)
}
