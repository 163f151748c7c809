//! Descriptor pool registry keyed by structural binding signatures
//!
//! Every draw call needs one descriptor set of a particular shape. Pools are
//! created lazily, one per distinct shape, each sized for a fixed ceiling of
//! sets. The key is an explicit ordered list of (type, count) pairs compared
//! field-wise; two shapes share a pool only when they are structurally equal.

use ash::{vk, Device};
use std::collections::HashMap;
use crate::error::{DrawError, DrawResult};

/// Upper bound on descriptor sets allocated per signature, per swapchain image
///
/// Exceeding it fails the allocation; pools never grow.
pub const MAX_DRAWS_PER_FRAME: u32 = 1024;

/// Ordered list of (descriptor type, count) pairs identifying a pool shape
///
/// Equality and hashing are structural over the full list, so distinct shapes
/// can never alias each other.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PoolSignature(Vec<(vk::DescriptorType, u32)>);

impl PoolSignature {
    /// Build a signature from the binding shape of one draw call
    pub fn new(sizes: &[(vk::DescriptorType, u32)]) -> Self {
        Self(sizes.to_vec())
    }

    /// The pool sizes this signature describes
    pub fn pool_sizes(&self) -> Vec<vk::DescriptorPoolSize> {
        self.0
            .iter()
            .map(|&(ty, count)| {
                vk::DescriptorPoolSize::builder()
                    .ty(ty)
                    .descriptor_count(count)
                    .build()
            })
            .collect()
    }
}

/// Lazily-populated map from signature to pool
///
/// Generic over the pool type so the one-pool-per-signature behavior is
/// testable without a device.
pub struct PoolRegistry<P> {
    pools: HashMap<PoolSignature, P>,
}

impl<P> PoolRegistry<P> {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            pools: HashMap::new(),
        }
    }

    /// Get the pool for `signature`, creating it on first sight
    pub fn get_or_create_with<F>(&mut self, signature: &PoolSignature, create: F) -> DrawResult<&P>
    where
        F: FnOnce(&PoolSignature) -> DrawResult<P>,
    {
        if !self.pools.contains_key(signature) {
            let pool = create(signature)?;
            self.pools.insert(signature.clone(), pool);
        }
        Ok(&self.pools[signature])
    }

    /// Number of distinct pools created so far
    pub fn len(&self) -> usize {
        self.pools.len()
    }

    /// Whether no pool has been created yet
    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }
}

impl<P> Default for PoolRegistry<P> {
    fn default() -> Self {
        Self::new()
    }
}

/// Descriptor pool with RAII cleanup
pub struct DescriptorPool {
    device: Device,
    pool: vk::DescriptorPool,
}

impl DescriptorPool {
    /// Create a pool for `signature` sized for `max_sets` allocations
    pub fn new(device: Device, signature: &PoolSignature, max_sets: u32) -> DrawResult<Self> {
        // Pool sizes are totals across the whole pool, so each per-set count
        // scales by the set ceiling
        let mut pool_sizes = signature.pool_sizes();
        for size in &mut pool_sizes {
            size.descriptor_count = size.descriptor_count.saturating_mul(max_sets);
        }
        let pool_info = vk::DescriptorPoolCreateInfo::builder()
            .flags(vk::DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET)
            .max_sets(max_sets)
            .pool_sizes(&pool_sizes);

        let pool = unsafe {
            device
                .create_descriptor_pool(&pool_info, None)
                .map_err(DrawError::Api)?
        };

        Ok(Self { device, pool })
    }

    /// Allocate one descriptor set with the given layout
    pub fn allocate(&self, layout: vk::DescriptorSetLayout) -> DrawResult<DescriptorSet> {
        let layouts = [layout];
        let alloc_info = vk::DescriptorSetAllocateInfo::builder()
            .descriptor_pool(self.pool)
            .set_layouts(&layouts);

        let set = unsafe {
            self.device
                .allocate_descriptor_sets(&alloc_info)
                .map_err(DrawError::Api)?[0]
        };

        Ok(DescriptorSet {
            device: self.device.clone(),
            pool: self.pool,
            set,
        })
    }

    /// Get the pool handle
    pub fn handle(&self) -> vk::DescriptorPool {
        self.pool
    }
}

impl Drop for DescriptorPool {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_descriptor_pool(self.pool, None);
        }
    }
}

/// Descriptor set returned to its pool on drop
///
/// Frame images keep these in a transient vector that is cleared at the start
/// of the image's next frame, once the fence proves the GPU is done with them.
pub struct DescriptorSet {
    device: Device,
    pool: vk::DescriptorPool,
    set: vk::DescriptorSet,
}

impl DescriptorSet {
    /// Get the descriptor set handle
    pub fn handle(&self) -> vk::DescriptorSet {
        self.set
    }
}

impl Drop for DescriptorSet {
    fn drop(&mut self) {
        unsafe {
            // Pools are created with FREE_DESCRIPTOR_SET; ignore the result,
            // the pool itself outlives every set allocated from it
            let _ = self.device.free_descriptor_sets(self.pool, &[self.set]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uniform_and_sampler() -> PoolSignature {
        PoolSignature::new(&[
            (vk::DescriptorType::UNIFORM_BUFFER, 1),
            (vk::DescriptorType::COMBINED_IMAGE_SAMPLER, 1),
        ])
    }

    #[test]
    fn test_equal_shapes_are_equal() {
        assert_eq!(uniform_and_sampler(), uniform_and_sampler());
    }

    #[test]
    fn test_differing_count_is_distinct() {
        let two_samplers = PoolSignature::new(&[
            (vk::DescriptorType::UNIFORM_BUFFER, 1),
            (vk::DescriptorType::COMBINED_IMAGE_SAMPLER, 2),
        ]);
        assert_ne!(uniform_and_sampler(), two_samplers);
    }

    #[test]
    fn test_differing_type_is_distinct() {
        let storage = PoolSignature::new(&[
            (vk::DescriptorType::STORAGE_BUFFER, 1),
            (vk::DescriptorType::COMBINED_IMAGE_SAMPLER, 1),
        ]);
        assert_ne!(uniform_and_sampler(), storage);
    }

    #[test]
    fn test_signature_is_order_sensitive() {
        let reversed = PoolSignature::new(&[
            (vk::DescriptorType::COMBINED_IMAGE_SAMPLER, 1),
            (vk::DescriptorType::UNIFORM_BUFFER, 1),
        ]);
        assert_ne!(uniform_and_sampler(), reversed);
    }

    #[test]
    fn test_registry_creates_one_pool_per_signature() {
        let mut registry: PoolRegistry<u32> = PoolRegistry::new();
        let mut created = 0;

        let sig_a = uniform_and_sampler();
        let sig_b = PoolSignature::new(&[(vk::DescriptorType::UNIFORM_BUFFER, 1)]);

        for _ in 0..3 {
            registry
                .get_or_create_with(&sig_a, |_| {
                    created += 1;
                    Ok(created)
                })
                .unwrap();
        }
        registry
            .get_or_create_with(&sig_b, |_| {
                created += 1;
                Ok(created)
            })
            .unwrap();

        assert_eq!(created, 2);
        assert_eq!(registry.len(), 2);
        // Repeated lookups return the pool created first
        let pool = registry.get_or_create_with(&sig_a, |_| Ok(99)).unwrap();
        assert_eq!(*pool, 1);
    }
}
