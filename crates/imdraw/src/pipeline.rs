//! Graphics pipeline construction and caching
//!
//! Pipelines are cached by the structural signature of everything that feeds
//! their creation: shader stage modules (with entry points) and the vertex
//! binding layout. The remaining state is fixed per the draw surface: triangle
//! strip topology, viewport equal to the swapchain extent, single-sample
//! rasterization, one color attachment with blending disabled.
//!
//! Cached pipelines bake in the extent, so the renderer clears this cache
//! whenever the view is discarded. A recompiled shader produces a fresh module
//! handle and therefore a fresh cache entry; old entries stay alive for frames
//! still in flight.

use ash::{vk, Device};
use std::collections::HashMap;
use std::ffi::CString;
use std::sync::Arc;
use crate::error::{DrawError, DrawResult};

/// One shader stage as it enters the pipeline key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StageKey {
    /// Cached shader module handle
    pub module: vk::ShaderModule,
    /// Pipeline stage the module is bound to
    pub stage: vk::ShaderStageFlags,
    /// Entry point symbol
    pub entry_point: String,
}

/// One vertex binding as it enters the pipeline key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VertexBindingKey {
    /// Bytes between consecutive elements
    pub stride: u32,
    /// Per-vertex or per-instance stepping
    pub input_rate: vk::VertexInputRate,
    /// (location, format, offset) per attribute
    pub attributes: Vec<(u32, vk::Format, u32)>,
}

/// Structural signature of a graphics pipeline
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PipelineKey {
    /// Ordered shader stages
    pub stages: Vec<StageKey>,
    /// Ordered vertex bindings
    pub vertex_layout: Vec<VertexBindingKey>,
}

/// Graphics pipeline with RAII cleanup
pub struct Pipeline {
    device: Device,
    pipeline: vk::Pipeline,
}

impl Pipeline {
    /// Build a pipeline for `key` against the fixed draw-surface state
    pub fn new(
        device: Device,
        render_pass: vk::RenderPass,
        layout: vk::PipelineLayout,
        extent: vk::Extent2D,
        key: &PipelineKey,
    ) -> DrawResult<Self> {
        // Entry point strings must outlive the create infos
        let entry_points: Vec<CString> = key
            .stages
            .iter()
            .map(|stage| CString::new(stage.entry_point.as_str()).unwrap_or_default())
            .collect();

        let shader_stages: Vec<vk::PipelineShaderStageCreateInfo> = key
            .stages
            .iter()
            .zip(&entry_points)
            .map(|(stage, entry)| {
                vk::PipelineShaderStageCreateInfo::builder()
                    .stage(stage.stage)
                    .module(stage.module)
                    .name(entry)
                    .build()
            })
            .collect();

        let binding_descriptions: Vec<vk::VertexInputBindingDescription> = key
            .vertex_layout
            .iter()
            .enumerate()
            .map(|(binding, layout)| {
                vk::VertexInputBindingDescription::builder()
                    .binding(binding as u32)
                    .stride(layout.stride)
                    .input_rate(layout.input_rate)
                    .build()
            })
            .collect();

        let attribute_descriptions: Vec<vk::VertexInputAttributeDescription> = key
            .vertex_layout
            .iter()
            .enumerate()
            .flat_map(|(binding, layout)| {
                layout.attributes.iter().map(
                    move |&(location, format, offset)| {
                        vk::VertexInputAttributeDescription::builder()
                            .binding(binding as u32)
                            .location(location)
                            .format(format)
                            .offset(offset)
                            .build()
                    },
                )
            })
            .collect();

        let vertex_input = vk::PipelineVertexInputStateCreateInfo::builder()
            .vertex_binding_descriptions(&binding_descriptions)
            .vertex_attribute_descriptions(&attribute_descriptions);

        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::builder()
            .topology(vk::PrimitiveTopology::TRIANGLE_STRIP)
            .primitive_restart_enable(false);

        let viewport = vk::Viewport::builder()
            .x(0.0)
            .y(0.0)
            .width(extent.width as f32)
            .height(extent.height as f32)
            .min_depth(0.0)
            .max_depth(1.0)
            .build();

        let scissor = vk::Rect2D::builder()
            .offset(vk::Offset2D { x: 0, y: 0 })
            .extent(extent)
            .build();

        let viewports = [viewport];
        let scissors = [scissor];
        let viewport_state = vk::PipelineViewportStateCreateInfo::builder()
            .viewports(&viewports)
            .scissors(&scissors);

        let rasterizer = vk::PipelineRasterizationStateCreateInfo::builder()
            .polygon_mode(vk::PolygonMode::FILL)
            // required even when not drawing lines
            .line_width(1.0);

        let multisampling = vk::PipelineMultisampleStateCreateInfo::builder()
            .rasterization_samples(vk::SampleCountFlags::TYPE_1);

        let color_blend_attachment = vk::PipelineColorBlendAttachmentState::builder()
            .color_write_mask(vk::ColorComponentFlags::RGBA)
            .blend_enable(false)
            .build();

        let color_blend_attachments = [color_blend_attachment];
        let color_blending = vk::PipelineColorBlendStateCreateInfo::builder()
            .attachments(&color_blend_attachments);

        let pipeline_info = vk::GraphicsPipelineCreateInfo::builder()
            .stages(&shader_stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterizer)
            .multisample_state(&multisampling)
            .color_blend_state(&color_blending)
            .layout(layout)
            .render_pass(render_pass)
            .subpass(0);

        let pipelines = unsafe {
            device
                .create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info.build()], None)
                .map_err(|(_, err)| DrawError::Api(err))?
        };

        Ok(Self {
            device,
            pipeline: pipelines[0],
        })
    }

    /// Get the pipeline handle
    pub fn handle(&self) -> vk::Pipeline {
        self.pipeline
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_pipeline(self.pipeline, None);
        }
    }
}

/// Cache of graphics pipelines keyed by structural signature
///
/// Generic over the pipeline type so the keying and eviction behavior is
/// testable without a device.
pub struct PipelineCache<P = Pipeline> {
    pipelines: HashMap<PipelineKey, Arc<P>>,
}

impl<P> PipelineCache<P> {
    /// Create an empty cache
    pub fn new() -> Self {
        Self {
            pipelines: HashMap::new(),
        }
    }

    /// Get the entry for `key`, building it on first sight
    pub fn get_or_create_with<F>(&mut self, key: &PipelineKey, create: F) -> DrawResult<Arc<P>>
    where
        F: FnOnce(&PipelineKey) -> DrawResult<P>,
    {
        if !self.pipelines.contains_key(key) {
            let pipeline = create(key)?;
            self.pipelines.insert(key.clone(), Arc::new(pipeline));
        }
        Ok(Arc::clone(&self.pipelines[key]))
    }

    /// Drop every cached pipeline; called when the view is discarded because
    /// the baked extent is no longer valid
    pub fn clear(&mut self) {
        self.pipelines.clear();
    }

    /// Drop every entry referencing `module`.
    ///
    /// Called when a shader reload replaces a module: the old handle is
    /// destroyed, and a driver recycling its value must not alias the stale
    /// pipeline onto the new module.
    pub fn evict_stage(&mut self, module: vk::ShaderModule) {
        self.pipelines
            .retain(|key, _| !key.stages.iter().any(|stage| stage.module == module));
    }

    /// Number of cached pipelines
    pub fn len(&self) -> usize {
        self.pipelines.len()
    }

    /// Whether the cache is empty
    pub fn is_empty(&self) -> bool {
        self.pipelines.is_empty()
    }
}

impl PipelineCache<Pipeline> {
    /// Get the pipeline for `key`, building it on first sight
    pub fn get_or_create(
        &mut self,
        device: &Device,
        render_pass: vk::RenderPass,
        layout: vk::PipelineLayout,
        extent: vk::Extent2D,
        key: &PipelineKey,
    ) -> DrawResult<Arc<Pipeline>> {
        self.get_or_create_with(key, |key| {
            let pipeline = Pipeline::new(device.clone(), render_pass, layout, extent, key)?;
            log::debug!(
                "built pipeline ({} stages, {} vertex bindings)",
                key.stages.len(),
                key.vertex_layout.len()
            );
            Ok(pipeline)
        })
    }
}

impl<P> Default for PipelineCache<P> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_key() -> PipelineKey {
        PipelineKey {
            stages: vec![
                StageKey {
                    module: vk::ShaderModule::null(),
                    stage: vk::ShaderStageFlags::VERTEX,
                    entry_point: "main".to_string(),
                },
                StageKey {
                    module: vk::ShaderModule::null(),
                    stage: vk::ShaderStageFlags::FRAGMENT,
                    entry_point: "main".to_string(),
                },
            ],
            vertex_layout: vec![VertexBindingKey {
                stride: 16,
                input_rate: vk::VertexInputRate::VERTEX,
                attributes: vec![(0, vk::Format::R32G32B32A32_SFLOAT, 0)],
            }],
        }
    }

    #[test]
    fn test_identical_keys_are_equal() {
        assert_eq!(sample_key(), sample_key());
    }

    #[test]
    fn test_entry_point_differentiates_keys() {
        let mut other = sample_key();
        other.stages[0].entry_point = "vs_main".to_string();
        assert_ne!(sample_key(), other);
    }

    #[test]
    fn test_vertex_layout_differentiates_keys() {
        let mut other = sample_key();
        other.vertex_layout[0].stride = 32;
        assert_ne!(sample_key(), other);

        let mut other = sample_key();
        other.vertex_layout[0].input_rate = vk::VertexInputRate::INSTANCE;
        assert_ne!(sample_key(), other);

        let mut other = sample_key();
        other.vertex_layout[0].attributes[0].1 = vk::Format::R32G32_SFLOAT;
        assert_ne!(sample_key(), other);
    }

    #[test]
    fn test_stage_order_differentiates_keys() {
        let mut other = sample_key();
        other.stages.reverse();
        assert_ne!(sample_key(), other);
    }

    #[test]
    fn test_cache_builds_once_per_key() {
        let mut cache: PipelineCache<u32> = PipelineCache::new();
        let mut built = 0;

        for _ in 0..3 {
            cache
                .get_or_create_with(&sample_key(), |_| {
                    built += 1;
                    Ok(built)
                })
                .unwrap();
        }

        assert_eq!(built, 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_evict_stage_removes_entries_for_replaced_module() {
        use ash::vk::Handle;

        let old_module = vk::ShaderModule::from_raw(1);
        let new_module = vk::ShaderModule::from_raw(2);

        let mut with_old = sample_key();
        with_old.stages[0].module = old_module;
        let mut with_new = sample_key();
        with_new.stages[0].module = new_module;

        let mut cache: PipelineCache<u32> = PipelineCache::new();
        cache.get_or_create_with(&with_old, |_| Ok(1)).unwrap();
        cache.get_or_create_with(&with_new, |_| Ok(2)).unwrap();

        cache.evict_stage(old_module);

        assert_eq!(cache.len(), 1);
        // The surviving entry is the one keyed by the replacement module
        let remaining = cache.get_or_create_with(&with_new, |_| Ok(99)).unwrap();
        assert_eq!(*remaining, 2);
    }
}
