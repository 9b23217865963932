use ash::vk;
use itertools::Itertools;

use crate::{
    commands::{barrier::GfxImageBarrier, command_stream::GfxCommandStream},
    foundation::device::GfxDevice,
    pipelines::rendering_info::GfxRenderingInfo,
};

/// 命令缓冲封装
///
/// 不负责 command buffer 的分配、begin 与 submit，这些由宿主的帧循环完成；
/// 这里只是把 [`GfxCommandStream`] 的命令录制到已经处于 recording 状态的 command buffer 中。
#[derive(Clone)]
pub struct GfxCommandBuffer {
    vk_handle: vk::CommandBuffer,
    device: GfxDevice,
}
// new & init
impl GfxCommandBuffer {
    pub fn new(device: &GfxDevice, vk_handle: vk::CommandBuffer) -> Self {
        Self {
            vk_handle,
            device: device.clone(),
        }
    }
}
// getters
impl GfxCommandBuffer {
    /// getter
    #[inline]
    pub fn vk_handle(&self) -> vk::CommandBuffer {
        self.vk_handle
    }

    #[inline]
    fn eds3(&self) -> &ash::ext::extended_dynamic_state3::Device {
        // 调用方在录制前已经检查过 GfxDeviceCaps
        match self.device.eds3() {
            Some(eds3) => eds3,
            None => panic!("VK_EXT_extended_dynamic_state3 is not loaded"),
        }
    }
}
// 同步相关命令
impl GfxCommandBuffer {
    /// - command type: synchronize
    /// - supported queue types: graphics, compute, transfer
    #[inline]
    fn image_memory_barrier(&self, dependency_flags: vk::DependencyFlags, barriers: &[GfxImageBarrier]) {
        let barriers = barriers.iter().map(|b| *b.inner()).collect_vec();
        let dependency_info =
            vk::DependencyInfo::default().image_memory_barriers(&barriers).dependency_flags(dependency_flags);
        unsafe {
            self.device.ash_device().cmd_pipeline_barrier2(self.vk_handle, &dependency_info);
        }
    }
}
impl GfxCommandStream for GfxCommandBuffer {
    fn cmd_image_barriers(&self, dependency_flags: vk::DependencyFlags, barriers: &[GfxImageBarrier]) {
        self.image_memory_barrier(dependency_flags, barriers);
    }

    /// - command type: action, state
    /// - supported queue types: graphics
    #[inline]
    fn cmd_begin_rendering(&self, rendering_info: &GfxRenderingInfo) {
        let rendering_info = rendering_info.rendering_info();
        unsafe {
            self.device.ash_device().cmd_begin_rendering(self.vk_handle, &rendering_info);
        }
    }

    /// - command type: action, state
    /// - supported queue types: graphics
    #[inline]
    fn cmd_end_rendering(&self) {
        unsafe {
            self.device.ash_device().cmd_end_rendering(self.vk_handle);
        }
    }

    /// - command type: state
    /// - supported queue types: graphics
    #[inline]
    fn cmd_set_viewport(&self, first_viewport: u32, viewports: &[vk::Viewport]) {
        unsafe {
            self.device.ash_device().cmd_set_viewport(self.vk_handle, first_viewport, viewports);
        }
    }

    /// - command type: state
    /// - supported queue types: graphics
    #[inline]
    fn cmd_set_scissor(&self, first_scissor: u32, scissors: &[vk::Rect2D]) {
        unsafe {
            self.device.ash_device().cmd_set_scissor(self.vk_handle, first_scissor, scissors);
        }
    }

    /// - command type: state
    /// - supported queue types: graphics
    #[inline]
    fn cmd_set_cull_mode(&self, cull_mode: vk::CullModeFlags) {
        unsafe {
            self.device.ash_device().cmd_set_cull_mode(self.vk_handle, cull_mode);
        }
    }

    #[inline]
    fn cmd_set_front_face(&self, front_face: vk::FrontFace) {
        unsafe {
            self.device.ash_device().cmd_set_front_face(self.vk_handle, front_face);
        }
    }

    #[inline]
    fn cmd_set_primitive_topology(&self, topology: vk::PrimitiveTopology) {
        unsafe {
            self.device.ash_device().cmd_set_primitive_topology(self.vk_handle, topology);
        }
    }

    #[inline]
    fn cmd_set_depth_test_enable(&self, enable: bool) {
        unsafe {
            self.device.ash_device().cmd_set_depth_test_enable(self.vk_handle, enable);
        }
    }

    #[inline]
    fn cmd_set_depth_write_enable(&self, enable: bool) {
        unsafe {
            self.device.ash_device().cmd_set_depth_write_enable(self.vk_handle, enable);
        }
    }

    #[inline]
    fn cmd_set_depth_compare_op(&self, compare_op: vk::CompareOp) {
        unsafe {
            self.device.ash_device().cmd_set_depth_compare_op(self.vk_handle, compare_op);
        }
    }

    #[inline]
    fn cmd_set_stencil_test_enable(&self, enable: bool) {
        unsafe {
            self.device.ash_device().cmd_set_stencil_test_enable(self.vk_handle, enable);
        }
    }

    /// - command type: state
    /// - supported queue types: graphics
    /// - 需要 extendedDynamicState3ColorBlendEnable
    #[inline]
    fn cmd_set_color_blend_enable(&self, first_attachment: u32, enables: &[bool]) {
        let enables = enables.iter().map(|&e| vk::Bool32::from(e)).collect_vec();
        unsafe {
            self.eds3().cmd_set_color_blend_enable(self.vk_handle, first_attachment, &enables);
        }
    }

    /// - 需要 extendedDynamicState3ColorWriteMask
    #[inline]
    fn cmd_set_color_write_mask(&self, first_attachment: u32, masks: &[vk::ColorComponentFlags]) {
        unsafe {
            self.eds3().cmd_set_color_write_mask(self.vk_handle, first_attachment, masks);
        }
    }

    /// - 需要 extendedDynamicState3PolygonMode
    #[inline]
    fn cmd_set_polygon_mode(&self, polygon_mode: vk::PolygonMode) {
        unsafe {
            self.eds3().cmd_set_polygon_mode(self.vk_handle, polygon_mode);
        }
    }

    /// - 需要 extendedDynamicState3RasterizationSamples
    #[inline]
    fn cmd_set_rasterization_samples(&self, samples: vk::SampleCountFlags) {
        unsafe {
            self.eds3().cmd_set_rasterization_samples(self.vk_handle, samples);
        }
    }

    /// - command type: action
    /// - supported queue types: transfer, graphics, compute
    #[inline]
    fn cmd_copy_image(
        &self,
        src: vk::Image,
        src_layout: vk::ImageLayout,
        dst: vk::Image,
        dst_layout: vk::ImageLayout,
        regions: &[vk::ImageCopy2<'_>],
    ) {
        let copy_info = vk::CopyImageInfo2::default()
            .src_image(src)
            .src_image_layout(src_layout)
            .dst_image(dst)
            .dst_image_layout(dst_layout)
            .regions(regions);
        unsafe {
            self.device.ash_device().cmd_copy_image2(self.vk_handle, &copy_info);
        }
    }

    /// - command type: action
    /// - supported queue types: graphics
    #[inline]
    fn cmd_blit_image(
        &self,
        src: vk::Image,
        src_layout: vk::ImageLayout,
        dst: vk::Image,
        dst_layout: vk::ImageLayout,
        regions: &[vk::ImageBlit2<'_>],
        filter: vk::Filter,
    ) {
        let blit_info = vk::BlitImageInfo2::default()
            .src_image(src)
            .src_image_layout(src_layout)
            .dst_image(dst)
            .dst_image_layout(dst_layout)
            .regions(regions)
            .filter(filter);
        unsafe {
            self.device.ash_device().cmd_blit_image2(self.vk_handle, &blit_info);
        }
    }

    /// - command type: state, action
    /// - supported queue type: graphics, compute
    ///
    /// 没有加载 debug utils 时什么也不做
    #[inline]
    fn begin_label(&self, label_name: &str, label_color: glam::Vec4) {
        let Some(debug_utils) = self.device.debug_utils() else {
            return;
        };
        let name = std::ffi::CString::new(label_name).unwrap_or_default();
        unsafe {
            debug_utils.cmd_begin_debug_utils_label(
                self.vk_handle,
                &vk::DebugUtilsLabelEXT::default().label_name(name.as_c_str()).color(label_color.into()),
            );
        }
    }

    /// - command type: state, action
    /// - supported queue type: graphics, compute
    #[inline]
    fn end_label(&self) {
        if let Some(debug_utils) = self.device.debug_utils() {
            unsafe {
                debug_utils.cmd_end_debug_utils_label(self.vk_handle);
            }
        }
    }
}
