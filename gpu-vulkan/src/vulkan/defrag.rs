//! C8: defragmenter (§4.8). Execution runs as a regular submitted command
//! buffer with `is_defrag` set; at most one allocation is defragged per
//! submission. Trigger logic lives in `alloc::SubAllocator::maybe_mark_defrag`,
//! called from `bind` on a page-allocation miss (§4.1).

use ash::vk;

use super::alloc::SubAllocator;
use crate::error::DeviceError;

/// One unit of defrag work: move every live region out of the allocation
/// currently marked `Defragging` into fresh allocations, skipping
/// resources already marked for destroy (§4.8).
pub struct DefragPlan {
    pub allocation_index: usize,
}

/// Find the allocation to defrag this submission, if any (§4.8
/// "At most one allocation is defragged per submission").
pub fn plan(allocator: &SubAllocator) -> Option<DefragPlan> {
    allocator.defragging_allocation().map(|allocation_index| DefragPlan { allocation_index })
}

/// Buffer-copy step of a defrag plan: create a same-size/usage/kind buffer,
/// optionally copy the old contents via a transfer barrier pair +
/// `vkCmdCopyBuffer` (only needed if the source had already been
/// transitioned away from its default mode), and return the new buffer so
/// the caller can repoint the owning container (§4.8).
///
/// # Safety
/// `command_buffer` must be in the recording state and not inside a render
/// pass (barriers cannot be issued there).
pub unsafe fn copy_buffer(
    device: &ash::Device,
    command_buffer: vk::CommandBuffer,
    src: vk::Buffer,
    dst: vk::Buffer,
    size: u64,
    needs_copy: bool,
) -> Result<(), DeviceError> {
    if !needs_copy {
        return Ok(());
    }
    let src_barrier = vk::BufferMemoryBarrier::builder()
        .src_access_mask(vk::AccessFlags::MEMORY_WRITE)
        .dst_access_mask(vk::AccessFlags::TRANSFER_READ)
        .buffer(src)
        .size(size)
        .build();
    let dst_barrier = vk::BufferMemoryBarrier::builder()
        .src_access_mask(vk::AccessFlags::empty())
        .dst_access_mask(vk::AccessFlags::TRANSFER_WRITE)
        .buffer(dst)
        .size(size)
        .build();
    unsafe {
        device.cmd_pipeline_barrier(
            command_buffer,
            vk::PipelineStageFlags::ALL_COMMANDS,
            vk::PipelineStageFlags::TRANSFER,
            vk::DependencyFlags::empty(),
            &[],
            &[src_barrier, dst_barrier],
            &[],
        );
        let region = vk::BufferCopy::builder().size(size).build();
        device.cmd_copy_buffer(command_buffer, src, dst, &[region]);
    }
    Ok(())
}

/// Texture-copy step: barrier both images to the transfer layouts and copy
/// the full mip extent per subresource (§4.8).
///
/// # Safety
/// `command_buffer` must be in the recording state and not inside a render
/// pass.
pub unsafe fn copy_texture(
    device: &ash::Device,
    command_buffer: vk::CommandBuffer,
    src: vk::Image,
    dst: vk::Image,
    range: vk::ImageSubresourceRange,
    extent: vk::Extent3D,
) {
    let src_barrier = vk::ImageMemoryBarrier::builder()
        .src_access_mask(vk::AccessFlags::MEMORY_WRITE)
        .dst_access_mask(vk::AccessFlags::TRANSFER_READ)
        .old_layout(vk::ImageLayout::GENERAL)
        .new_layout(vk::ImageLayout::TRANSFER_SRC_OPTIMAL)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .image(src)
        .subresource_range(range)
        .build();
    let dst_barrier = vk::ImageMemoryBarrier::builder()
        .src_access_mask(vk::AccessFlags::empty())
        .dst_access_mask(vk::AccessFlags::TRANSFER_WRITE)
        .old_layout(vk::ImageLayout::UNDEFINED)
        .new_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .image(dst)
        .subresource_range(range)
        .build();
    unsafe {
        device.cmd_pipeline_barrier(
            command_buffer,
            vk::PipelineStageFlags::ALL_COMMANDS,
            vk::PipelineStageFlags::TRANSFER,
            vk::DependencyFlags::empty(),
            &[],
            &[],
            &[src_barrier, dst_barrier],
        );
        let copy = vk::ImageCopy::builder()
            .src_subresource(vk::ImageSubresourceLayers {
                aspect_mask: range.aspect_mask,
                mip_level: range.base_mip_level,
                base_array_layer: range.base_array_layer,
                layer_count: range.layer_count,
            })
            .dst_subresource(vk::ImageSubresourceLayers {
                aspect_mask: range.aspect_mask,
                mip_level: range.base_mip_level,
                base_array_layer: range.base_array_layer,
                layer_count: range.layer_count,
            })
            .extent(extent)
            .build();
        device.cmd_copy_image(
            command_buffer,
            src,
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            dst,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            &[copy],
        );
    }
}
