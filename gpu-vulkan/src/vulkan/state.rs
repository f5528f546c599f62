//! C3: state tracker. Maps [`UsageMode`] to the `(stageMask, accessMask,
//! imageLayout)` triple Vulkan needs for a barrier, and emits the pairwise
//! `transitionFromDefault`/`transitionToDefault` barriers described in §4.3.
//!
//! Pipeline barriers are never issued inside a render pass; callers that
//! need an in-pass transition (compute read-write attachments) must end the
//! pass first. This module only computes barrier parameters — placement
//! (at `BeginRenderPass`/`EndRenderPass`/around a copy/at compute-pass
//! boundaries) is the command encoder's responsibility (`command.rs`).

use ash::vk;
use gput::UsageMode;

/// `(stageMask, accessMask, imageLayout)` for one usage mode. `layout` is
/// meaningless for buffers; callers building buffer barriers ignore it.
#[derive(Debug, Clone, Copy)]
pub struct ModeInfo {
    pub stage: vk::PipelineStageFlags,
    pub access: vk::AccessFlags,
    pub layout: vk::ImageLayout,
}

pub fn mode_info(mode: UsageMode) -> ModeInfo {
    use vk::AccessFlags as A;
    use vk::ImageLayout as L;
    use vk::PipelineStageFlags as S;
    match mode {
        UsageMode::Undefined => ModeInfo {
            stage: S::TOP_OF_PIPE,
            access: A::empty(),
            layout: L::UNDEFINED,
        },
        UsageMode::VertexBuffer => ModeInfo {
            stage: S::VERTEX_INPUT,
            access: A::VERTEX_ATTRIBUTE_READ,
            layout: L::UNDEFINED,
        },
        UsageMode::IndexBuffer => ModeInfo {
            stage: S::VERTEX_INPUT,
            access: A::INDEX_READ,
            layout: L::UNDEFINED,
        },
        UsageMode::IndirectBuffer => ModeInfo {
            stage: S::DRAW_INDIRECT,
            access: A::INDIRECT_COMMAND_READ,
            layout: L::UNDEFINED,
        },
        UsageMode::GraphicsStorageRead => ModeInfo {
            stage: S::VERTEX_SHADER | S::FRAGMENT_SHADER,
            access: A::SHADER_READ,
            layout: L::SHADER_READ_ONLY_OPTIMAL,
        },
        UsageMode::ComputeStorageRead => ModeInfo {
            stage: S::COMPUTE_SHADER,
            access: A::SHADER_READ,
            layout: L::SHADER_READ_ONLY_OPTIMAL,
        },
        UsageMode::ComputeStorageReadWrite => ModeInfo {
            stage: S::COMPUTE_SHADER,
            access: A::SHADER_READ | A::SHADER_WRITE,
            layout: L::GENERAL,
        },
        UsageMode::ComputeSimultaneousReadWrite => ModeInfo {
            stage: S::COMPUTE_SHADER,
            access: A::SHADER_READ | A::SHADER_WRITE,
            layout: L::GENERAL,
        },
        UsageMode::TransferSource => ModeInfo {
            stage: S::TRANSFER,
            access: A::TRANSFER_READ,
            layout: L::TRANSFER_SRC_OPTIMAL,
        },
        UsageMode::TransferDestination => ModeInfo {
            stage: S::TRANSFER,
            access: A::TRANSFER_WRITE,
            layout: L::TRANSFER_DST_OPTIMAL,
        },
        UsageMode::Sampler => ModeInfo {
            stage: S::VERTEX_SHADER | S::FRAGMENT_SHADER | S::COMPUTE_SHADER,
            access: A::SHADER_READ,
            layout: L::SHADER_READ_ONLY_OPTIMAL,
        },
        UsageMode::ColorAttachment => ModeInfo {
            stage: S::COLOR_ATTACHMENT_OUTPUT,
            access: A::COLOR_ATTACHMENT_READ | A::COLOR_ATTACHMENT_WRITE,
            layout: L::COLOR_ATTACHMENT_OPTIMAL,
        },
        UsageMode::DepthStencilAttachment => ModeInfo {
            stage: S::EARLY_FRAGMENT_TESTS | S::LATE_FRAGMENT_TESTS,
            access: A::DEPTH_STENCIL_ATTACHMENT_READ | A::DEPTH_STENCIL_ATTACHMENT_WRITE,
            layout: L::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        },
        UsageMode::ComputeStorageReadTexture => ModeInfo {
            stage: S::COMPUTE_SHADER,
            access: A::SHADER_READ,
            layout: L::SHADER_READ_ONLY_OPTIMAL,
        },
        UsageMode::ComputeStorageReadWriteTexture => ModeInfo {
            stage: S::COMPUTE_SHADER,
            access: A::SHADER_READ | A::SHADER_WRITE,
            layout: L::GENERAL,
        },
        UsageMode::Present => ModeInfo {
            stage: S::BOTTOM_OF_PIPE,
            access: A::empty(),
            layout: L::PRESENT_SRC_KHR,
        },
    }
}

/// Build the barrier for `Undefined → mode` ("transitionFromDefault", i.e.
/// from the resource's resting state into active use).
pub fn buffer_barrier_from_default(mode: UsageMode, buffer: vk::Buffer, offset: u64, size: u64) -> vk::BufferMemoryBarrier {
    let dst = mode_info(mode);
    vk::BufferMemoryBarrier::builder()
        .src_access_mask(vk::AccessFlags::empty())
        .dst_access_mask(dst.access)
        .buffer(buffer)
        .offset(offset)
        .size(size)
        .build()
}

pub fn buffer_barrier_to_default(mode: UsageMode, buffer: vk::Buffer, offset: u64, size: u64) -> vk::BufferMemoryBarrier {
    let src = mode_info(mode);
    vk::BufferMemoryBarrier::builder()
        .src_access_mask(src.access)
        .dst_access_mask(vk::AccessFlags::empty())
        .buffer(buffer)
        .offset(offset)
        .size(size)
        .build()
}

/// Build a buffer barrier transitioning between two modes directly. Used by
/// the command encoder (C6) to barrier a resource out of its steady-state
/// default mode for the duration of one use (e.g. a copy) and back again,
/// as opposed to `buffer_barrier_from_default`/`_to_default`, which always
/// pair with `Undefined` and are only correct for the one-time creation
/// transition.
pub fn buffer_barrier(
    src_mode: UsageMode,
    dst_mode: UsageMode,
    buffer: vk::Buffer,
    offset: u64,
    size: u64,
) -> (vk::PipelineStageFlags, vk::PipelineStageFlags, vk::BufferMemoryBarrier) {
    let src = mode_info(src_mode);
    let dst = mode_info(dst_mode);
    let barrier = vk::BufferMemoryBarrier::builder()
        .src_access_mask(src.access)
        .dst_access_mask(dst.access)
        .buffer(buffer)
        .offset(offset)
        .size(size)
        .build();
    (src.stage, dst.stage, barrier)
}

/// Build an image barrier transitioning between two modes directly (used by
/// swapchain acquire, which barriers `Undefined`/`Present → ColorAttachment`
/// in one step rather than through two pairwise calls).
pub fn image_barrier(
    src_mode: UsageMode,
    dst_mode: UsageMode,
    image: vk::Image,
    range: vk::ImageSubresourceRange,
) -> (vk::PipelineStageFlags, vk::PipelineStageFlags, vk::ImageMemoryBarrier) {
    let src = mode_info(src_mode);
    let dst = mode_info(dst_mode);
    let barrier = vk::ImageMemoryBarrier::builder()
        .src_access_mask(src.access)
        .dst_access_mask(dst.access)
        .old_layout(src.layout)
        .new_layout(dst.layout)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .image(image)
        .subresource_range(range)
        .build();
    (src.stage, dst.stage, barrier)
}

pub fn image_barrier_from_default(
    mode: UsageMode,
    image: vk::Image,
    range: vk::ImageSubresourceRange,
) -> (vk::PipelineStageFlags, vk::PipelineStageFlags, vk::ImageMemoryBarrier) {
    image_barrier(UsageMode::Undefined, mode, image, range)
}

pub fn image_barrier_to_default(
    mode: UsageMode,
    image: vk::Image,
    range: vk::ImageSubresourceRange,
) -> (vk::PipelineStageFlags, vk::PipelineStageFlags, vk::ImageMemoryBarrier) {
    image_barrier(mode, UsageMode::Undefined, image, range)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn color_attachment_uses_color_attachment_optimal_layout() {
        let info = mode_info(UsageMode::ColorAttachment);
        assert_eq!(info.layout, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
        assert!(info.access.contains(vk::AccessFlags::COLOR_ATTACHMENT_WRITE));
    }

    #[test]
    fn sampler_mode_is_read_only_across_all_shader_stages() {
        let info = mode_info(UsageMode::Sampler);
        assert!(info.stage.contains(vk::PipelineStageFlags::FRAGMENT_SHADER));
        assert_eq!(info.access, vk::AccessFlags::SHADER_READ);
    }

    #[test]
    fn undefined_has_no_access_and_top_of_pipe_stage() {
        let info = mode_info(UsageMode::Undefined);
        assert_eq!(info.access, vk::AccessFlags::empty());
        assert_eq!(info.stage, vk::PipelineStageFlags::TOP_OF_PIPE);
    }
}
