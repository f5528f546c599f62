//! C2: resource factory (§4.2). Creation calls allocate the `VkXxx` object,
//! bind memory through C1, and — for buffers/textures — submit an internal
//! barrier command buffer transitioning the resource from `Undefined` into
//! its default usage mode (§4.3) before handing the container back to the
//! caller. Debug names are forwarded via `VK_EXT_debug_utils` when the
//! instance enabled it (SPEC_FULL §3.1), mirroring the teacher's
//! `InstanceShared::debug_utils` wrapper.

use std::sync::atomic::{AtomicBool, AtomicUsize};
use std::sync::Arc;

use arrayvec::ArrayVec;
use ash::vk;
use parking_lot::RwLock;

use super::cache;
use super::cache::{ColorAttachmentKey, DepthStencilAttachmentKey, PipelineLayoutKey, RenderPassKey};
use super::descriptor::{DescriptorLayoutKey, DescriptorSetLayout};
use super::{
    Buffer, BufferContainer, ComputePipeline, Device, DeviceShared, GraphicsPipeline, ResourceLayout, Sampler,
    ShaderModule, Subresource, Texture, TextureContainer,
};
use crate::error::DeviceError;
use gput::{
    BufferKind, BufferUsage, Extent3d, LoadOp, SampleCount, ShaderResourceCounts, ShaderStage, StoreOp,
    TextureFormat, TextureUsage,
};

/// Parameters for `Device::create_buffer` (§4.2, §6). `size` is the
/// requested byte length; the suballocator may round it up internally but
/// never reports a smaller usable size than requested.
pub struct BufferCreateInfo<'a> {
    pub kind: BufferKind,
    pub usage: BufferUsage,
    pub size: u64,
    pub debug_name: Option<&'a str>,
}

pub struct TextureCreateInfo<'a> {
    pub format: TextureFormat,
    pub usage: TextureUsage,
    pub extent: Extent3d,
    pub layer_count: u32,
    pub level_count: u32,
    pub debug_name: Option<&'a str>,
}

pub struct SamplerCreateInfo {
    pub mag_filter: vk::Filter,
    pub min_filter: vk::Filter,
    pub mipmap_mode: vk::SamplerMipmapMode,
    pub address_mode_u: vk::SamplerAddressMode,
    pub address_mode_v: vk::SamplerAddressMode,
    pub address_mode_w: vk::SamplerAddressMode,
    pub max_anisotropy: Option<f32>,
    pub compare_op: Option<gput::CompareOp>,
}

pub struct ShaderCreateInfo<'a> {
    pub stage: ShaderStage,
    pub spirv: &'a [u8],
    pub entry_point: &'a std::ffi::CStr,
    pub resources: ShaderResourceCounts,
}

/// One color target's blend configuration (§4.5). `write_mask` is the RGBA
/// component mask in the low 4 bits, matching `vk::ColorComponentFlags`
/// bit order.
#[derive(Debug, Clone, Copy)]
pub struct ColorTargetBlendState {
    pub enabled: bool,
    pub src_color_blend_factor: gput::BlendFactor,
    pub dst_color_blend_factor: gput::BlendFactor,
    pub color_blend_op: gput::BlendOp,
    pub src_alpha_blend_factor: gput::BlendFactor,
    pub dst_alpha_blend_factor: gput::BlendFactor,
    pub alpha_blend_op: gput::BlendOp,
    pub write_mask: u8,
}

#[derive(Debug, Clone, Copy)]
pub struct ColorTargetDescription {
    pub format: TextureFormat,
    pub blend: ColorTargetBlendState,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StencilFaceState {
    pub fail_op: gput::StencilOp,
    pub pass_op: gput::StencilOp,
    pub depth_fail_op: gput::StencilOp,
    pub compare_op: gput::CompareOp,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DepthStencilState {
    pub format: Option<TextureFormat>,
    pub depth_test_enable: bool,
    pub depth_write_enable: bool,
    pub compare_op: gput::CompareOp,
    pub stencil_test_enable: bool,
    pub front: StencilFaceState,
    pub back: StencilFaceState,
    pub compare_mask: u8,
    pub write_mask: u8,
}

#[derive(Debug, Clone, Copy)]
pub struct VertexBufferDescription {
    pub slot: u32,
    pub pitch: u32,
    pub instanced: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct VertexAttribute {
    pub location: u32,
    pub buffer_slot: u32,
    pub format: gput::VertexElementFormat,
    pub offset: u32,
}

/// `CreateGraphicsPipeline` (§4.5): vertex and fragment shaders are
/// supplied as already-created `ShaderModule`s, matching SDL_GPU's split
/// between `CreateShader` and `CreateGraphicsPipeline`.
pub struct GraphicsPipelineCreateInfo<'a> {
    pub vertex_shader: &'a ShaderModule,
    pub vertex_entry_point: &'a std::ffi::CStr,
    pub vertex_resources: ShaderResourceCounts,
    pub fragment_shader: &'a ShaderModule,
    pub fragment_entry_point: &'a std::ffi::CStr,
    pub fragment_resources: ShaderResourceCounts,
    pub vertex_buffers: &'a [VertexBufferDescription],
    pub vertex_attributes: &'a [VertexAttribute],
    pub primitive_type: gput::PrimitiveType,
    pub color_targets: &'a [ColorTargetDescription],
    pub depth_stencil: DepthStencilState,
    pub sample_count: SampleCount,
    pub debug_name: Option<&'a str>,
}

pub struct ComputePipelineCreateInfo<'a> {
    pub shader: &'a ShaderModule,
    pub entry_point: &'a std::ffi::CStr,
    pub resources: ShaderResourceCounts,
    /// Compute-write storage texture count for descriptor-set slot 1
    /// (§3 "compute: {0: read-only, 1: read-write, 2: uniforms}"). Not part
    /// of `gput::ShaderResourceCounts`, which only models the read-only
    /// graphics/compute binding counts shared with vertex/fragment shaders.
    pub write_storage_textures: u32,
    pub write_storage_buffers: u32,
    pub debug_name: Option<&'a str>,
}

impl Device {
    /// `CreateBuffer` (§4.2): bind via C1, then submit an internal
    /// barrier-only command buffer transitioning `Undefined → defaultMode`
    /// before returning (§4.3 "every buffer leaves creation already in its
    /// default usage mode").
    pub unsafe fn create_buffer(&self, info: &BufferCreateInfo) -> Result<BufferContainer, DeviceError> {
        crate::validate::non_zero_size("buffer", info.size).map_err(|_| DeviceError::Unknown)?;
        let mode = info.usage.default_mode().ok_or(DeviceError::Unknown)?;

        let buffer = unsafe { self.shared.create_buffer_instance(info.kind, info.usage, info.size) }?;
        let raw = buffer.raw;
        self.set_debug_name(vk::ObjectType::BUFFER, raw.as_raw(), info.debug_name);

        unsafe { self.transition_buffer_from_default(raw, info.size, mode) }?;

        Ok(BufferContainer {
            instances: RwLock::new(vec![buffer]),
            active: AtomicUsize::new(0),
            kind: info.kind,
            usage: info.usage,
            size: info.size,
            debug_name: info.debug_name.map(str::to_owned),
        })
    }

    unsafe fn transition_buffer_from_default(&self, raw: vk::Buffer, size: u64, mode: gput::UsageMode) -> Result<(), DeviceError> {
        let mut cmd = self.shared.command_pools.acquire(&self.shared, self.shared.queue_family_index)?;
        let barrier = super::state::buffer_barrier_from_default(mode, raw, 0, size);
        let dst = super::state::mode_info(mode);
        unsafe {
            self.shared.raw.cmd_pipeline_barrier(
                cmd.raw,
                vk::PipelineStageFlags::TOP_OF_PIPE,
                dst.stage,
                vk::DependencyFlags::empty(),
                &[],
                &[barrier],
                &[],
            );
            self.shared.raw.end_command_buffer(cmd.raw)?;
        }
        let fence = super::fence::acquire(&self.shared.raw, &mut self.shared.fence_pool.lock())?;
        unsafe {
            self.shared
                .raw
                .queue_submit(self.shared.raw_queue, &[vk::SubmitInfo::builder().command_buffers(&[cmd.raw]).build()], fence.raw())?;
            self.shared.raw.wait_for_fences(&[fence.raw()], true, u64::MAX)?;
        }
        super::fence::recycle(&mut self.shared.fence_pool.lock(), fence);
        self.shared.command_pools.release({
            cmd.is_defrag = false;
            cmd
        });
        Ok(())
    }

    fn set_debug_name(&self, object_type: vk::ObjectType, handle: u64, name: Option<&str>) {
        let Some(name) = name else { return };
        let Some(debug_utils) = &self.shared.instance.debug_utils else { return };
        let Ok(c_name) = std::ffi::CString::new(name) else { return };
        let info = vk::DebugUtilsObjectNameInfoEXT::builder()
            .object_type(object_type)
            .object_handle(handle)
            .object_name(&c_name)
            .build();
        unsafe {
            let _ = debug_utils.extension.set_debug_utils_object_name(self.shared.raw.handle(), &info);
        }
    }

    /// `CreateTexture` (§4.2). Subresource views are created lazily the
    /// first time a subresource is bound as a render target / storage image
    /// (§4.2 "Lazy subresource view creation"); only the full sampled/read
    /// view across all layers/levels is created eagerly here, and only when
    /// usage implies it can ever be sampled or read.
    pub unsafe fn create_texture(&self, info: &TextureCreateInfo) -> Result<TextureContainer, DeviceError> {
        crate::validate::non_zero_size("texture width", info.extent.width as u64).map_err(|_| DeviceError::Unknown)?;
        crate::validate::non_zero_size("texture height", info.extent.height as u64).map_err(|_| DeviceError::Unknown)?;
        let mode = info.usage.default_mode().ok_or(DeviceError::Unknown)?;
        let texture = unsafe { self.shared.create_texture_instance(info) }?;
        self.set_debug_name(vk::ObjectType::IMAGE, texture.raw.as_raw(), info.debug_name);
        unsafe { self.transition_texture_from_default(&texture, mode) }?;

        Ok(TextureContainer {
            instances: RwLock::new(vec![texture]),
            active: AtomicUsize::new(0),
            format: info.format,
            usage: info.usage,
            extent: info.extent,
            layer_count: info.layer_count,
            level_count: info.level_count,
            cycleable: true,
            debug_name: info.debug_name.map(str::to_owned),
        })
    }

    unsafe fn transition_texture_from_default(&self, texture: &Texture, mode: gput::UsageMode) -> Result<(), DeviceError> {
        let mut cmd = self.shared.command_pools.acquire(&self.shared, self.shared.queue_family_index)?;
        let range = vk::ImageSubresourceRange {
            aspect_mask: aspect_mask(texture.format),
            base_mip_level: 0,
            level_count: texture.level_count,
            base_array_layer: 0,
            layer_count: texture.layer_count,
        };
        let (src_stage, dst_stage, barrier) = super::state::image_barrier_from_default(mode, texture.raw, range);
        unsafe {
            self.shared.raw.cmd_pipeline_barrier(
                cmd.raw,
                src_stage,
                dst_stage,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &[barrier],
            );
            self.shared.raw.end_command_buffer(cmd.raw)?;
        }
        let fence = super::fence::acquire(&self.shared.raw, &mut self.shared.fence_pool.lock())?;
        unsafe {
            self.shared
                .raw
                .queue_submit(self.shared.raw_queue, &[vk::SubmitInfo::builder().command_buffers(&[cmd.raw]).build()], fence.raw())?;
            self.shared.raw.wait_for_fences(&[fence.raw()], true, u64::MAX)?;
        }
        super::fence::recycle(&mut self.shared.fence_pool.lock(), fence);
        self.shared.command_pools.release(cmd);
        Ok(())
    }

    pub unsafe fn create_sampler(&self, info: &SamplerCreateInfo, debug_name: Option<&str>) -> Result<Sampler, DeviceError> {
        let mut builder = vk::SamplerCreateInfo::builder()
            .mag_filter(info.mag_filter)
            .min_filter(info.min_filter)
            .mipmap_mode(info.mipmap_mode)
            .address_mode_u(info.address_mode_u)
            .address_mode_v(info.address_mode_v)
            .address_mode_w(info.address_mode_w)
            .min_lod(0.0)
            .max_lod(vk::LOD_CLAMP_NONE);
        if let Some(max_anisotropy) = info.max_anisotropy {
            builder = builder.anisotropy_enable(true).max_anisotropy(max_anisotropy);
        }
        if let Some(op) = info.compare_op {
            builder = builder.compare_enable(true).compare_op(super::conv::compare_op(op));
        }
        let raw = unsafe { self.shared.raw.create_sampler(&builder.build(), None) }?;
        self.set_debug_name(vk::ObjectType::SAMPLER, raw.as_raw(), debug_name);
        Ok(Sampler { raw })
    }

    pub unsafe fn create_shader_module(&self, info: &ShaderCreateInfo, debug_name: Option<&str>) -> Result<ShaderModule, DeviceError> {
        if info.spirv.len() % 4 != 0 {
            return Err(DeviceError::Unknown);
        }
        let words: Vec<u32> = info
            .spirv
            .chunks_exact(4)
            .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        let create_info = vk::ShaderModuleCreateInfo::builder().code(&words).build();
        let raw = unsafe { self.shared.raw.create_shader_module(&create_info, None) }?;
        self.set_debug_name(vk::ObjectType::SHADER_MODULE, raw.as_raw(), debug_name);
        Ok(ShaderModule::Raw(raw))
    }

    /// Look up or build the three-set compute `ResourceLayout`, in the fixed
    /// slot order §3 mandates: `{0: read-only, 1: read-write, 2: uniforms}`.
    /// `write_storage_textures`/`write_storage_buffers` size slot 1; they are
    /// not part of `gput::ShaderResourceCounts` since no other stage has a
    /// write-storage binding class.
    pub(crate) fn resource_layout_for(
        &self,
        stage: vk::ShaderStageFlags,
        counts: ShaderResourceCounts,
        write_storage_textures: u32,
        write_storage_buffers: u32,
    ) -> Result<Arc<ResourceLayout>, DeviceError> {
        let key = PipelineLayoutKey {
            stage,
            samplers: counts.samplers,
            storage_textures: counts.storage_textures,
            storage_buffers: counts.storage_buffers,
            write_storage_textures,
            write_storage_buffers,
            uniform_buffers: counts.uniform_buffers,
        };

        if let Some(existing) = self.shared.pipeline_layouts.lock().get(&key) {
            return Ok(existing.clone());
        }

        let read_only_key = DescriptorLayoutKey {
            stage,
            samplers: counts.samplers,
            storage_textures: counts.storage_textures,
            storage_buffers: counts.storage_buffers,
            write_storage_textures: 0,
            write_storage_buffers: 0,
            uniform_buffers: 0,
        };
        let read_write_key = DescriptorLayoutKey {
            stage,
            samplers: 0,
            storage_textures: 0,
            storage_buffers: 0,
            write_storage_textures,
            write_storage_buffers,
            uniform_buffers: 0,
        };
        let uniforms_key = DescriptorLayoutKey {
            stage,
            samplers: 0,
            storage_textures: 0,
            storage_buffers: 0,
            write_storage_textures: 0,
            write_storage_buffers: 0,
            uniform_buffers: counts.uniform_buffers,
        };

        let mut set_layouts: ArrayVec<Arc<super::descriptor::DescriptorSetLayout>, 4> = ArrayVec::new();
        {
            let mut table = self.shared.descriptor_layouts.lock();
            set_layouts.push(table.get_or_create(&self.shared.raw, read_only_key)?);
            set_layouts.push(table.get_or_create(&self.shared.raw, read_write_key)?);
            set_layouts.push(table.get_or_create(&self.shared.raw, uniforms_key)?);
        }
        let raw_layouts: Vec<vk::DescriptorSetLayout> = set_layouts.iter().map(|l| l.raw).collect();

        let info = vk::PipelineLayoutCreateInfo::builder().set_layouts(&raw_layouts).build();
        let pipeline_layout = unsafe { self.shared.raw.create_pipeline_layout(&info, None) }?;

        let layout = Arc::new(ResourceLayout { set_layouts, pipeline_layout });
        self.shared.pipeline_layouts.lock().insert(key, layout.clone());
        Ok(layout)
    }

    /// Four-set `ResourceLayout` for a graphics pipeline, in the fixed slot
    /// order §3 mandates: `{0: vertex read-resources, 1: vertex uniforms,
    /// 2: fragment read-resources, 3: fragment uniforms}`. Read-resources
    /// (samplers, storage textures, storage buffers) and uniform buffers are
    /// split into separate sets per stage even when one of the two is empty,
    /// so the slot order stays fixed regardless of what a given shader pair
    /// actually binds. Unlike `resource_layout_for`, the combined
    /// `VkPipelineLayout` is built fresh each call: only the four
    /// `DescriptorSetLayout`s (C4) are interned.
    fn graphics_resource_layout(
        &self,
        vertex: ShaderResourceCounts,
        fragment: ShaderResourceCounts,
    ) -> Result<Arc<ResourceLayout>, DeviceError> {
        fn read_resources_key(stage: vk::ShaderStageFlags, counts: ShaderResourceCounts) -> DescriptorLayoutKey {
            DescriptorLayoutKey {
                stage,
                samplers: counts.samplers,
                storage_textures: counts.storage_textures,
                storage_buffers: counts.storage_buffers,
                write_storage_textures: 0,
                write_storage_buffers: 0,
                uniform_buffers: 0,
            }
        }
        fn uniforms_key(stage: vk::ShaderStageFlags, counts: ShaderResourceCounts) -> DescriptorLayoutKey {
            DescriptorLayoutKey {
                stage,
                samplers: 0,
                storage_textures: 0,
                storage_buffers: 0,
                write_storage_textures: 0,
                write_storage_buffers: 0,
                uniform_buffers: counts.uniform_buffers,
            }
        }

        let mut set_layouts: ArrayVec<Arc<DescriptorSetLayout>, 4> = ArrayVec::new();
        {
            let mut table = self.shared.descriptor_layouts.lock();
            set_layouts.push(table.get_or_create(&self.shared.raw, read_resources_key(vk::ShaderStageFlags::VERTEX, vertex))?);
            set_layouts.push(table.get_or_create(&self.shared.raw, uniforms_key(vk::ShaderStageFlags::VERTEX, vertex))?);
            set_layouts.push(table.get_or_create(&self.shared.raw, read_resources_key(vk::ShaderStageFlags::FRAGMENT, fragment))?);
            set_layouts.push(table.get_or_create(&self.shared.raw, uniforms_key(vk::ShaderStageFlags::FRAGMENT, fragment))?);
        }
        let raw_layouts: Vec<vk::DescriptorSetLayout> = set_layouts.iter().map(|l| l.raw).collect();
        let info = vk::PipelineLayoutCreateInfo::builder().set_layouts(&raw_layouts).build();
        let pipeline_layout = unsafe { self.shared.raw.create_pipeline_layout(&info, None) }?;

        Ok(Arc::new(ResourceLayout { set_layouts, pipeline_layout }))
    }

    /// `CreateGraphicsPipeline` (§4.5). Builds a render pass compatible with
    /// `info.color_targets`/`info.depth_stencil` (cached, C5), the combined
    /// vertex+fragment `ResourceLayout` (C4/C5), and a single `VkPipeline`
    /// with dynamic viewport/scissor (SDL_GPU sets these per-pass, not at
    /// pipeline-creation time).
    pub unsafe fn create_graphics_pipeline(&self, info: &GraphicsPipelineCreateInfo) -> Result<GraphicsPipeline, DeviceError> {
        let layout = self.graphics_resource_layout(info.vertex_resources, info.fragment_resources)?;

        let vertex_module = match info.vertex_shader {
            ShaderModule::Raw(raw) => *raw,
        };
        let fragment_module = match info.fragment_shader {
            ShaderModule::Raw(raw) => *raw,
        };
        let stages = [
            vk::PipelineShaderStageCreateInfo::builder()
                .stage(vk::ShaderStageFlags::VERTEX)
                .module(vertex_module)
                .name(info.vertex_entry_point)
                .build(),
            vk::PipelineShaderStageCreateInfo::builder()
                .stage(vk::ShaderStageFlags::FRAGMENT)
                .module(fragment_module)
                .name(info.fragment_entry_point)
                .build(),
        ];

        let bindings: Vec<vk::VertexInputBindingDescription> = info
            .vertex_buffers
            .iter()
            .map(|b| vk::VertexInputBindingDescription {
                binding: b.slot,
                stride: b.pitch,
                input_rate: if b.instanced { vk::VertexInputRate::INSTANCE } else { vk::VertexInputRate::VERTEX },
            })
            .collect();
        let attributes: Vec<vk::VertexInputAttributeDescription> = info
            .vertex_attributes
            .iter()
            .map(|a| vk::VertexInputAttributeDescription {
                location: a.location,
                binding: a.buffer_slot,
                format: super::conv::vertex_element_format(a.format),
                offset: a.offset,
            })
            .collect();
        let vertex_input = vk::PipelineVertexInputStateCreateInfo::builder()
            .vertex_binding_descriptions(&bindings)
            .vertex_attribute_descriptions(&attributes)
            .build();

        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::builder()
            .topology(super::conv::primitive_topology(info.primitive_type))
            .build();

        let viewport_state = vk::PipelineViewportStateCreateInfo::builder().viewport_count(1).scissor_count(1).build();

        let rasterization = vk::PipelineRasterizationStateCreateInfo::builder()
            .polygon_mode(vk::PolygonMode::FILL)
            .cull_mode(vk::CullModeFlags::NONE)
            .front_face(vk::FrontFace::COUNTER_CLOCKWISE)
            .line_width(1.0)
            .build();

        let samples = super::conv::sample_count(info.sample_count);
        let multisample = vk::PipelineMultisampleStateCreateInfo::builder().rasterization_samples(samples).build();

        let front = stencil_op_state(&info.depth_stencil.front, info.depth_stencil.compare_mask, info.depth_stencil.write_mask);
        let back = stencil_op_state(&info.depth_stencil.back, info.depth_stencil.compare_mask, info.depth_stencil.write_mask);
        let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::builder()
            .depth_test_enable(info.depth_stencil.depth_test_enable)
            .depth_write_enable(info.depth_stencil.depth_write_enable)
            .depth_compare_op(super::conv::compare_op(info.depth_stencil.compare_op))
            .stencil_test_enable(info.depth_stencil.stencil_test_enable)
            .front(front)
            .back(back)
            .build();

        let blend_attachments: Vec<vk::PipelineColorBlendAttachmentState> = info
            .color_targets
            .iter()
            .map(|target| {
                let blend = &target.blend;
                vk::PipelineColorBlendAttachmentState::builder()
                    .blend_enable(blend.enabled)
                    .src_color_blend_factor(super::conv::blend_factor(blend.src_color_blend_factor))
                    .dst_color_blend_factor(super::conv::blend_factor(blend.dst_color_blend_factor))
                    .color_blend_op(super::conv::blend_op(blend.color_blend_op))
                    .src_alpha_blend_factor(super::conv::blend_factor(blend.src_alpha_blend_factor))
                    .dst_alpha_blend_factor(super::conv::blend_factor(blend.dst_alpha_blend_factor))
                    .alpha_blend_op(super::conv::blend_op(blend.alpha_blend_op))
                    .color_write_mask(vk::ColorComponentFlags::from_raw(blend.write_mask as u32))
                    .build()
            })
            .collect();
        let color_blend = vk::PipelineColorBlendStateCreateInfo::builder().attachments(&blend_attachments).build();

        let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic_state = vk::PipelineDynamicStateCreateInfo::builder().dynamic_states(&dynamic_states).build();

        let render_pass = self.shared.render_pass_for(RenderPassKey {
            colors: info.color_targets.iter().map(|t| ColorAttachmentKey {
                format: t.format,
                load_op: LoadOp::DontCare,
                store_op: StoreOp::Store,
            }).collect(),
            resolve_formats: ArrayVec::new(),
            depth_stencil: info.depth_stencil.format.map(|format| DepthStencilAttachmentKey {
                format,
                load_op: LoadOp::DontCare,
                store_op: StoreOp::Store,
                stencil_load_op: LoadOp::DontCare,
                stencil_store_op: StoreOp::Store,
            }),
            samples: info.sample_count,
        })?;

        let create_info = vk::GraphicsPipelineCreateInfo::builder()
            .stages(&stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterization)
            .multisample_state(&multisample)
            .depth_stencil_state(&depth_stencil)
            .color_blend_state(&color_blend)
            .dynamic_state(&dynamic_state)
            .layout(layout.pipeline_layout)
            .render_pass(render_pass)
            .subpass(0)
            .build();

        let raw = unsafe {
            self.shared
                .raw
                .create_graphics_pipelines(vk::PipelineCache::null(), &[create_info], None)
                .map_err(|(_, err)| err)
        }?[0];
        self.set_debug_name(vk::ObjectType::PIPELINE, raw.as_raw(), info.debug_name);

        Ok(GraphicsPipeline { raw, layout })
    }

    /// `CreateComputePipeline` (§4.5): the three-set compute layout.
    pub unsafe fn create_compute_pipeline(&self, info: &ComputePipelineCreateInfo) -> Result<ComputePipeline, DeviceError> {
        let layout = self.resource_layout_for(
            vk::ShaderStageFlags::COMPUTE,
            info.resources,
            info.write_storage_textures,
            info.write_storage_buffers,
        )?;
        let module = match info.shader {
            ShaderModule::Raw(raw) => *raw,
        };
        let stage = vk::PipelineShaderStageCreateInfo::builder()
            .stage(vk::ShaderStageFlags::COMPUTE)
            .module(module)
            .name(info.entry_point)
            .build();
        let create_info = vk::ComputePipelineCreateInfo::builder()
            .stage(stage)
            .layout(layout.pipeline_layout)
            .build();
        let raw = unsafe {
            self.shared
                .raw
                .create_compute_pipelines(vk::PipelineCache::null(), &[create_info], None)
                .map_err(|(_, err)| err)
        }?[0];
        self.set_debug_name(vk::ObjectType::PIPELINE, raw.as_raw(), info.debug_name);

        Ok(ComputePipeline { raw, layout })
    }
}

impl DeviceShared {
    pub(crate) fn adapter_memory_properties(&self) -> vk::PhysicalDeviceMemoryProperties {
        unsafe { self.instance.raw.get_physical_device_memory_properties(self.physical_device) }
    }

    /// Allocates and binds a bare `VkBuffer` in its default (unbarriered)
    /// state. Lives on `DeviceShared` so the command encoder's cycling path
    /// (§4.6 "Cycling") can create a fresh instance mid-recording without a
    /// blocking transition submit — the in-progress operation's own barrier
    /// placement handles the transition from `Undefined` in-band.
    pub(crate) unsafe fn create_buffer_instance(&self, kind: BufferKind, usage: BufferUsage, size: u64) -> Result<Buffer, DeviceError> {
        let vk_usage = buffer_usage_bits(usage)
            | vk::BufferUsageFlags::TRANSFER_SRC
            | vk::BufferUsageFlags::TRANSFER_DST;
        let create_info = vk::BufferCreateInfo::builder()
            .size(size)
            .usage(vk_usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .build();
        let raw = unsafe { self.raw.create_buffer(&create_info, None) }?;
        let requirements = unsafe { self.raw.get_buffer_memory_requirements(raw) };

        let request = match kind {
            BufferKind::Gpu => super::alloc::MemoryTypeRequest::gpu_buffer(),
            BufferKind::Uniform => super::alloc::MemoryTypeRequest::uniform_buffer(),
            BufferKind::Transfer => super::alloc::MemoryTypeRequest::transfer_buffer(),
        };
        let memory_type_index = super::alloc::select_memory_type(&self.adapter_memory_properties(), requirements.memory_type_bits, request)
            .ok_or(DeviceError::OutOfMemory)?;

        let region = {
            let _lock = self.memory_locks[memory_type_index as usize].lock();
            let mut allocator = self.allocators[memory_type_index as usize].lock();
            allocator.bind(&self.raw, requirements, size, false)?
        };

        unsafe { self.raw.bind_buffer_memory(raw, region.memory(), region.offset()) }?;

        Ok(Buffer {
            raw,
            region: Some(region),
            kind,
            usage,
            size,
            refcount: Arc::new(AtomicUsize::new(0)),
            transitioned: std::sync::atomic::AtomicBool::new(false),
            marked_for_destroy: AtomicBool::new(false),
        })
    }

    /// Allocates and binds a bare `VkImage`, eagerly creating the full
    /// sampled/read view when usage implies it can ever be sampled or read
    /// (§4.2 "Lazy subresource view creation"). Left at `Undefined` state,
    /// same rationale as `create_buffer_instance`.
    pub(crate) unsafe fn create_texture_instance(&self, info: &TextureCreateInfo) -> Result<Texture, DeviceError> {
        let format = super::conv::texture_format(info.format);
        let is_3d = info.extent.depth > 1;
        let create_info = vk::ImageCreateInfo::builder()
            .image_type(if is_3d { vk::ImageType::TYPE_3D } else { vk::ImageType::TYPE_2D })
            // 3D color targets need a 2D view per depth slice (§4.2); that
            // requires the image to opt into 2D-array aliasing up front.
            .flags(if is_3d { vk::ImageCreateFlags::TYPE_2D_ARRAY_COMPATIBLE } else { vk::ImageCreateFlags::empty() })
            .format(format)
            .extent(vk::Extent3D {
                width: info.extent.width,
                height: info.extent.height,
                depth: if is_3d { info.extent.depth } else { 1 },
            })
            .mip_levels(info.level_count)
            .array_layers(if is_3d { 1 } else { info.layer_count.max(1) })
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(texture_usage_bits(info.usage, info.format))
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .build();
        let raw = unsafe { self.raw.create_image(&create_info, None) }?;
        let requirements = unsafe { self.raw.get_image_memory_requirements(raw) };

        let memory_type_index =
            super::alloc::select_memory_type(&self.adapter_memory_properties(), requirements.memory_type_bits, super::alloc::MemoryTypeRequest::texture())
                .ok_or(DeviceError::OutOfMemory)?;

        let region = {
            let _lock = self.memory_locks[memory_type_index as usize].lock();
            let mut allocator = self.allocators[memory_type_index as usize].lock();
            allocator.bind(&self.raw, requirements, requirements.size, true)?
        };
        unsafe { self.raw.bind_image_memory(raw, region.memory(), region.offset()) }?;

        let layer_count = if is_3d { 1 } else { info.layer_count.max(1) };
        let subresource_count = (layer_count as usize) * (info.level_count as usize);

        let full_view = if info.usage.intersects(
            TextureUsage::SAMPLER | TextureUsage::GRAPHICS_STORAGE_READ | TextureUsage::COMPUTE_STORAGE_READ,
        ) {
            Some(unsafe {
                self.create_image_view(
                    raw,
                    format,
                    aspect_mask(info.format),
                    0,
                    info.level_count,
                    0,
                    layer_count,
                    if is_3d { vk::ImageViewType::TYPE_3D } else { vk::ImageViewType::TYPE_2D_ARRAY },
                )
            }?)
        } else {
            None
        };

        Ok(Texture {
            raw,
            region: Some(region),
            format: info.format,
            usage: info.usage,
            layer_count,
            level_count: info.level_count,
            depth: info.extent.depth.max(1),
            extent: info.extent,
            subresources: (0..subresource_count).map(|_| Subresource::default()).collect(),
            full_view,
            refcount: Arc::new(AtomicUsize::new(0)),
            marked_for_destroy: AtomicBool::new(false),
            driver_owned: false,
        })
    }

    pub(crate) unsafe fn create_image_view(
        &self,
        image: vk::Image,
        format: vk::Format,
        aspect_mask: vk::ImageAspectFlags,
        base_level: u32,
        level_count: u32,
        base_layer: u32,
        layer_count: u32,
        view_type: vk::ImageViewType,
    ) -> Result<vk::ImageView, DeviceError> {
        let info = vk::ImageViewCreateInfo::builder()
            .image(image)
            .view_type(view_type)
            .format(format)
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask,
                base_mip_level: base_level,
                level_count,
                base_array_layer: base_layer,
                layer_count,
            })
            .build();
        Ok(unsafe { self.raw.create_image_view(&info, None) }?)
    }

    /// Looks up or builds the `VkRenderPass` compatible with `key` (§4.5).
    /// Render passes are never evicted: a driver only ever sees a bounded
    /// number of distinct attachment-format/load-store/sample-count
    /// combinations over its lifetime. Lives on `DeviceShared` rather than
    /// `Device` so the command encoder (C6), which only holds a
    /// `Arc<DeviceShared>`, can build framebuffers during `BeginRenderPass`
    /// without going through the full `Device` wrapper.
    pub(crate) fn render_pass_for(&self, key: RenderPassKey) -> Result<vk::RenderPass, DeviceError> {
        if let Some(existing) = self.render_passes.lock().get(&key) {
            return Ok(*existing);
        }
        let raw = unsafe { self.create_render_pass(&key) }?;
        self.render_passes.lock().insert(key, raw);
        Ok(raw)
    }

    unsafe fn create_render_pass(&self, key: &RenderPassKey) -> Result<vk::RenderPass, DeviceError> {
        let samples = super::conv::sample_count(key.samples);
        let mut attachments = Vec::with_capacity(key.colors.len() + 1);
        let mut color_refs = Vec::with_capacity(key.colors.len());

        for color in &key.colors {
            let attachment_index = attachments.len() as u32;
            attachments.push(
                vk::AttachmentDescription::builder()
                    .format(super::conv::texture_format(color.format))
                    .samples(samples)
                    .load_op(super::conv::load_op(color.load_op))
                    .store_op(super::conv::store_op(color.store_op))
                    .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
                    .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
                    .initial_layout(vk::ImageLayout::UNDEFINED)
                    .final_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
                    .build(),
            );
            color_refs.push(vk::AttachmentReference {
                attachment: attachment_index,
                layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            });
        }

        let depth_ref = key.depth_stencil.map(|ds| {
            let attachment_index = attachments.len() as u32;
            attachments.push(
                vk::AttachmentDescription::builder()
                    .format(super::conv::texture_format(ds.format))
                    .samples(samples)
                    .load_op(super::conv::load_op(ds.load_op))
                    .store_op(super::conv::store_op(ds.store_op))
                    .stencil_load_op(super::conv::load_op(ds.stencil_load_op))
                    .stencil_store_op(super::conv::store_op(ds.stencil_store_op))
                    .initial_layout(vk::ImageLayout::UNDEFINED)
                    .final_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL)
                    .build(),
            );
            vk::AttachmentReference {
                attachment: attachment_index,
                layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
            }
        });

        let mut subpass_builder = vk::SubpassDescription::builder()
            .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
            .color_attachments(&color_refs);
        if let Some(depth_ref) = depth_ref.as_ref() {
            subpass_builder = subpass_builder.depth_stencil_attachment(depth_ref);
        }
        let subpass = subpass_builder.build();

        let info = vk::RenderPassCreateInfo::builder()
            .attachments(&attachments)
            .subpasses(std::slice::from_ref(&subpass))
            .build();
        Ok(unsafe { self.raw.create_render_pass(&info, None) }?)
    }

    /// Looks up or builds the `VkFramebuffer` for `key`, creating one
    /// compatible with `render_pass` on a cache miss (§4.5). Used by C6's
    /// `begin_render_pass`.
    pub(crate) fn framebuffer_for(
        &self,
        render_pass: vk::RenderPass,
        key: cache::FramebufferKey,
    ) -> Result<vk::Framebuffer, DeviceError> {
        let raw = &self.raw;
        self.framebuffers.lock().get_or_insert_with(key.clone(), || {
            let info = vk::FramebufferCreateInfo::builder()
                .render_pass(render_pass)
                .attachments(&key.attachments)
                .width(key.width)
                .height(key.height)
                .layers(1)
                .build();
            Ok(unsafe { raw.create_framebuffer(&info, None) }?)
        })
    }
}

fn stencil_op_state(face: &StencilFaceState, compare_mask: u8, write_mask: u8) -> vk::StencilOpState {
    vk::StencilOpState {
        fail_op: super::conv::stencil_op(face.fail_op),
        pass_op: super::conv::stencil_op(face.pass_op),
        depth_fail_op: super::conv::stencil_op(face.depth_fail_op),
        compare_op: super::conv::compare_op(face.compare_op),
        compare_mask: compare_mask as u32,
        write_mask: write_mask as u32,
        reference: 0,
    }
}

pub(crate) fn aspect_mask(format: TextureFormat) -> vk::ImageAspectFlags {
    let aspect = format.aspect();
    let mut mask = vk::ImageAspectFlags::empty();
    if aspect.contains(gput::FormatAspect::COLOR) {
        mask |= vk::ImageAspectFlags::COLOR;
    }
    if aspect.contains(gput::FormatAspect::DEPTH) {
        mask |= vk::ImageAspectFlags::DEPTH;
    }
    // §3: "fullView mask excludes stencil". The full sampled/read view never
    // includes the stencil aspect even for combined depth-stencil formats;
    // per-subresource depth-stencil views add it separately.
    mask
}

fn buffer_usage_bits(usage: BufferUsage) -> vk::BufferUsageFlags {
    let mut bits = vk::BufferUsageFlags::empty();
    if usage.contains(BufferUsage::VERTEX) {
        bits |= vk::BufferUsageFlags::VERTEX_BUFFER;
    }
    if usage.contains(BufferUsage::INDEX) {
        bits |= vk::BufferUsageFlags::INDEX_BUFFER;
    }
    if usage.contains(BufferUsage::INDIRECT) {
        bits |= vk::BufferUsageFlags::INDIRECT_BUFFER;
    }
    if usage.intersects(BufferUsage::GRAPHICS_STORAGE_READ | BufferUsage::COMPUTE_STORAGE_READ | BufferUsage::COMPUTE_STORAGE_WRITE) {
        bits |= vk::BufferUsageFlags::STORAGE_BUFFER;
    }
    if usage.contains(BufferUsage::UNIFORM) {
        bits |= vk::BufferUsageFlags::UNIFORM_BUFFER;
    }
    bits
}

fn texture_usage_bits(usage: TextureUsage, format: TextureFormat) -> vk::ImageUsageFlags {
    let mut bits = vk::ImageUsageFlags::TRANSFER_SRC | vk::ImageUsageFlags::TRANSFER_DST;
    if usage.contains(TextureUsage::SAMPLER) || usage.intersects(TextureUsage::GRAPHICS_STORAGE_READ | TextureUsage::COMPUTE_STORAGE_READ) {
        bits |= vk::ImageUsageFlags::SAMPLED;
    }
    if usage.contains(TextureUsage::COLOR_TARGET) {
        bits |= vk::ImageUsageFlags::COLOR_ATTACHMENT;
    }
    if usage.contains(TextureUsage::DEPTH_STENCIL_TARGET) {
        let _ = format;
        bits |= vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT;
    }
    if usage.intersects(TextureUsage::COMPUTE_STORAGE_WRITE | TextureUsage::COMPUTE_SIMULTANEOUS_READ_WRITE) {
        bits |= vk::ImageUsageFlags::STORAGE;
    }
    bits
}

impl crate::Device for Device {
    type A = super::Api;

    unsafe fn create_fence(&self) -> Result<super::FenceHandle, DeviceError> {
        super::fence::acquire(&self.shared.raw, &mut self.shared.fence_pool.lock())
    }

    unsafe fn wait_for_fences(&self, fences: &[&super::FenceHandle], wait_all: bool, timeout_ns: u64) -> Result<bool, DeviceError> {
        let raw: Vec<vk::Fence> = fences.iter().map(|f| f.raw()).collect();
        match unsafe { self.shared.raw.wait_for_fences(&raw, wait_all, timeout_ns) } {
            Ok(()) => Ok(true),
            Err(vk::Result::TIMEOUT) => Ok(false),
            Err(other) => Err(DeviceError::from(other)),
        }
    }

    fn query_fence(&self, fence: &super::FenceHandle) -> bool {
        super::fence::query(&self.shared.raw, fence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_usage_storage_bit_covers_all_three_storage_kinds() {
        let bits = buffer_usage_bits(BufferUsage::COMPUTE_STORAGE_WRITE);
        assert!(bits.contains(vk::BufferUsageFlags::STORAGE_BUFFER));
    }

    #[test]
    fn texture_usage_always_carries_transfer_bits_for_defrag() {
        let bits = texture_usage_bits(TextureUsage::SAMPLER, TextureFormat::R8G8B8A8Unorm);
        assert!(bits.contains(vk::ImageUsageFlags::TRANSFER_SRC));
        assert!(bits.contains(vk::ImageUsageFlags::TRANSFER_DST));
    }
}
