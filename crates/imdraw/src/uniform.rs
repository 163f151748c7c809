//! Per-frame uniform bump arena
//!
//! Each frame image owns one fixed-capacity host-visible buffer. Draw calls
//! take sub-ranges from a cursor that only moves forward; `reset` returns the
//! cursor to zero at the start of the image's next frame without reallocating.
//! Offsets are rounded up to the device's minimum uniform-buffer offset
//! alignment, and a zero-length blob still consumes one alignment quantum.

use ash::{vk, Device};
use crate::buffer::Buffer;
use crate::error::{DrawError, DrawResult};

/// Fixed capacity of every frame image's uniform arena
pub const UNIFORM_ARENA_CAPACITY: usize = 1024 * 1024;

/// Byte range each draw call's descriptor binds from the arena
///
/// Every allocation reserves at least this much, so a descriptor bound at any
/// returned offset never reaches past the buffer even when the device's
/// offset alignment is smaller.
pub const UNIFORM_RANGE: usize = 128;

/// Round `size` up to the next multiple of `alignment`
pub fn align_up(size: usize, alignment: usize) -> usize {
    debug_assert!(alignment > 0);
    alignment * ((size + alignment - 1) / alignment)
}

/// Forward-only allocation cursor over a fixed capacity
///
/// Separated from the GPU buffer so the offset arithmetic is testable on its
/// own.
#[derive(Debug)]
pub struct BumpCursor {
    offset: usize,
    capacity: usize,
    alignment: usize,
}

impl BumpCursor {
    /// Create a cursor over `capacity` bytes with the given offset alignment
    pub fn new(capacity: usize, alignment: usize) -> Self {
        Self {
            offset: 0,
            capacity,
            alignment,
        }
    }

    /// Reserve `size` bytes, returning the assigned offset
    ///
    /// The cursor advances by `size` rounded up to the alignment, with a
    /// one-byte floor so a zero-length request still consumes a quantum and
    /// an [`UNIFORM_RANGE`] floor so a descriptor bound at the returned
    /// offset stays inside capacity even with a small alignment.
    /// Exceeding capacity is a defined failure, never silent wraparound.
    pub fn alloc(&mut self, size: usize) -> DrawResult<usize> {
        let aligned = align_up(size.max(1), self.alignment).max(UNIFORM_RANGE);
        let remaining = self.capacity - self.offset;
        if aligned > remaining {
            return Err(DrawError::UniformArenaFull {
                requested: aligned,
                remaining,
            });
        }
        let offset = self.offset;
        self.offset += aligned;
        Ok(offset)
    }

    /// Return the cursor to offset zero
    pub fn reset(&mut self) {
        self.offset = 0;
    }

    /// Current cursor position
    pub fn offset(&self) -> usize {
        self.offset
    }
}

/// Persistently mapped uniform buffer with bump allocation
pub struct UniformArena {
    buffer: Buffer,
    mapped: *mut u8,
    cursor: BumpCursor,
}

impl UniformArena {
    /// Allocate the arena buffer and map it for the renderer's lifetime
    pub fn new(
        device: Device,
        memory_properties: &vk::PhysicalDeviceMemoryProperties,
        alignment: usize,
    ) -> DrawResult<Self> {
        let buffer = Buffer::new(
            device,
            memory_properties,
            UNIFORM_ARENA_CAPACITY as vk::DeviceSize,
            vk::BufferUsageFlags::UNIFORM_BUFFER,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )?;

        let mapped = buffer.map_memory()? as *mut u8;

        Ok(Self {
            buffer,
            mapped,
            cursor: BumpCursor::new(UNIFORM_ARENA_CAPACITY, alignment),
        })
    }

    /// Copy `bytes` into the arena, returning the offset they were placed at
    pub fn push(&mut self, bytes: &[u8]) -> DrawResult<usize> {
        let offset = self.cursor.alloc(bytes.len())?;
        unsafe {
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), self.mapped.add(offset), bytes.len());
        }
        Ok(offset)
    }

    /// Reserve space without writing, used by prepare-only draw calls sizing
    /// the descriptor range
    pub fn peek_offset(&self) -> usize {
        self.cursor.offset()
    }

    /// Reset the cursor for the image's next frame; the buffer is reused
    pub fn reset(&mut self) {
        self.cursor.reset();
    }

    /// Get the underlying buffer handle
    pub fn handle(&self) -> vk::Buffer {
        self.buffer.handle()
    }
}

impl Drop for UniformArena {
    fn drop(&mut self) {
        self.buffer.unmap_memory();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_align_up_exact_multiple() {
        assert_eq!(align_up(256, 256), 256);
        assert_eq!(align_up(512, 256), 512);
    }

    #[test]
    fn test_align_up_rounds_upward() {
        assert_eq!(align_up(1, 256), 256);
        assert_eq!(align_up(257, 256), 512);
        assert_eq!(align_up(4, 64), 64);
    }

    #[test]
    fn test_cursor_offsets_are_prefix_sums_of_aligned_sizes() {
        let mut cursor = BumpCursor::new(4096, 256);
        let sizes = [4usize, 300, 256, 1];

        let mut expected = 0;
        for &size in &sizes {
            let offset = cursor.alloc(size).unwrap();
            assert_eq!(offset, expected);
            expected += align_up(size, 256);
        }
        assert_eq!(cursor.offset(), expected);
    }

    #[test]
    fn test_zero_size_consumes_one_quantum() {
        let mut cursor = BumpCursor::new(1024, 256);
        assert_eq!(cursor.alloc(0).unwrap(), 0);
        assert_eq!(cursor.alloc(0).unwrap(), 256);
    }

    #[test]
    fn test_small_alignment_still_reserves_descriptor_range() {
        let mut cursor = BumpCursor::new(UNIFORM_RANGE * 2, 64);

        // A 4-byte request aligns to 64 but must reserve the full bound
        // range, so the next allocation starts one range later.
        assert_eq!(cursor.alloc(4).unwrap(), 0);
        assert_eq!(cursor.alloc(4).unwrap(), UNIFORM_RANGE);

        // A third allocation would leave the descriptor hanging past the
        // end of the buffer, so it fails instead.
        assert!(matches!(
            cursor.alloc(4),
            Err(DrawError::UniformArenaFull { .. })
        ));
    }

    #[test]
    fn test_capacity_overflow_is_defined_failure() {
        let mut cursor = BumpCursor::new(512, 256);
        cursor.alloc(256).unwrap();
        cursor.alloc(256).unwrap();

        match cursor.alloc(1) {
            Err(DrawError::UniformArenaFull {
                requested,
                remaining,
            }) => {
                assert_eq!(requested, 256);
                assert_eq!(remaining, 0);
            }
            other => panic!("expected UniformArenaFull, got {:?}", other.map(|_| ())),
        }
        // A failed allocation must not move the cursor
        assert_eq!(cursor.offset(), 512);
    }

    #[test]
    fn test_reset_returns_cursor_to_zero() {
        let mut cursor = BumpCursor::new(1024, 256);
        cursor.alloc(4).unwrap();
        cursor.alloc(4).unwrap();
        cursor.reset();

        // Second frame's first draw lands at offset 0, not carried over
        assert_eq!(cursor.alloc(4).unwrap(), 0);
    }
}
