use ash::vk;

use crate::{commands::barrier::GfxImageBarrier, pipelines::rendering_info::GfxRenderingInfo};

/// 录制命令的抽象
///
/// render target 状态机只通过这个 trait 发出命令：
/// - [`crate::commands::command_buffer::GfxCommandBuffer`]：真实的 Vulkan command buffer
/// - [`crate::commands::recording::GfxRecordingCommandStream`]：只记录命令，用于测试与 trace
///
/// 所有方法都是 `&self`，与 `vk::CommandBuffer` 的使用方式一致
pub trait GfxCommandStream {
    /// 一次 `vkCmdPipelineBarrier2`，barriers 为空时不应该调用
    fn cmd_image_barriers(&self, dependency_flags: vk::DependencyFlags, barriers: &[GfxImageBarrier]);

    fn cmd_begin_rendering(&self, rendering_info: &GfxRenderingInfo);
    fn cmd_end_rendering(&self);

    fn cmd_set_viewport(&self, first_viewport: u32, viewports: &[vk::Viewport]);
    fn cmd_set_scissor(&self, first_scissor: u32, scissors: &[vk::Rect2D]);

    // core 1.3 dynamic state
    fn cmd_set_cull_mode(&self, cull_mode: vk::CullModeFlags);
    fn cmd_set_front_face(&self, front_face: vk::FrontFace);
    fn cmd_set_primitive_topology(&self, topology: vk::PrimitiveTopology);
    fn cmd_set_depth_test_enable(&self, enable: bool);
    fn cmd_set_depth_write_enable(&self, enable: bool);
    fn cmd_set_depth_compare_op(&self, compare_op: vk::CompareOp);
    fn cmd_set_stencil_test_enable(&self, enable: bool);

    // VK_EXT_extended_dynamic_state3，调用方负责检查设备能力
    fn cmd_set_color_blend_enable(&self, first_attachment: u32, enables: &[bool]);
    fn cmd_set_color_write_mask(&self, first_attachment: u32, masks: &[vk::ColorComponentFlags]);
    fn cmd_set_polygon_mode(&self, polygon_mode: vk::PolygonMode);
    fn cmd_set_rasterization_samples(&self, samples: vk::SampleCountFlags);

    fn cmd_copy_image(
        &self,
        src: vk::Image,
        src_layout: vk::ImageLayout,
        dst: vk::Image,
        dst_layout: vk::ImageLayout,
        regions: &[vk::ImageCopy2<'_>],
    );
    /// 格式不同的 image 之间的拷贝
    fn cmd_blit_image(
        &self,
        src: vk::Image,
        src_layout: vk::ImageLayout,
        dst: vk::Image,
        dst_layout: vk::ImageLayout,
        regions: &[vk::ImageBlit2<'_>],
        filter: vk::Filter,
    );

    fn begin_label(&self, label_name: &str, label_color: glam::Vec4);
    fn end_label(&self);
}
