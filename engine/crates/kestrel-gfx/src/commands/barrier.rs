use ash::vk;

use crate::commands::stage_access::{GfxStageAccess, stage_access_for_layout};

/// 便捷创建 image memory barrier 的结构体
#[derive(Clone, Copy, Debug)]
pub struct GfxImageBarrier {
    inner: vk::ImageMemoryBarrier2<'static>,
}

impl Default for GfxImageBarrier {
    fn default() -> Self {
        Self {
            inner: vk::ImageMemoryBarrier2 {
                old_layout: vk::ImageLayout::UNDEFINED,
                new_layout: vk::ImageLayout::UNDEFINED,
                src_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
                dst_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
                subresource_range: vk::ImageSubresourceRange {
                    aspect_mask: vk::ImageAspectFlags::empty(),
                    base_array_layer: 0,
                    layer_count: 1,
                    base_mip_level: 0,
                    level_count: 1,
                },
                ..Default::default()
            },
        }
    }
}

// new & init
impl GfxImageBarrier {
    pub fn new() -> Self {
        Self::default()
    }

    /// 根据新旧 layout 查表得到 src/dst mask 的 layout 转换
    ///
    /// src 只保留写操作的 access；dst 使用目标 layout 的完整 access
    pub fn layout_transition(
        image: vk::Image,
        aspect_mask: vk::ImageAspectFlags,
        old_layout: vk::ImageLayout,
        new_layout: vk::ImageLayout,
    ) -> Self {
        let src = stage_access_for_layout(old_layout);
        let dst = stage_access_for_layout(new_layout);
        Self::new()
            .image(image)
            .image_aspect_flag(aspect_mask)
            .layout_transfer(old_layout, new_layout)
            .src_mask(src.stage, src.src_access())
            .dst_mask(dst.stage, dst.access)
    }
}

// builder
impl GfxImageBarrier {
    /// builder
    #[inline]
    pub fn layout_transfer(mut self, old_layout: vk::ImageLayout, new_layout: vk::ImageLayout) -> Self {
        self.inner.old_layout = old_layout;
        self.inner.new_layout = new_layout;
        self
    }

    /// builder
    #[inline]
    pub fn src_mask(mut self, src_stage_mask: vk::PipelineStageFlags2, src_access_mask: vk::AccessFlags2) -> Self {
        self.inner.src_stage_mask = src_stage_mask;
        self.inner.src_access_mask = src_access_mask;
        self
    }

    /// builder
    #[inline]
    pub fn dst_mask(mut self, dst_stage_mask: vk::PipelineStageFlags2, dst_access_mask: vk::AccessFlags2) -> Self {
        self.inner.dst_stage_mask = dst_stage_mask;
        self.inner.dst_access_mask = dst_access_mask;
        self
    }

    /// builder
    ///
    /// 使用指定的 stage/access 覆盖 dst mask
    #[inline]
    pub fn dst_stage_access(self, dst: GfxStageAccess) -> Self {
        self.dst_mask(dst.stage, dst.access)
    }

    /// builder
    /// layer 使用默认值
    #[inline]
    pub fn image_aspect_flag(mut self, aspect_mask: vk::ImageAspectFlags) -> Self {
        self.inner.subresource_range.aspect_mask = aspect_mask;
        self
    }

    /// builder
    #[inline]
    pub fn mip_range(mut self, base_mip_level: u32, level_count: u32) -> Self {
        self.inner.subresource_range.base_mip_level = base_mip_level;
        self.inner.subresource_range.level_count = level_count;
        self
    }

    /// builder
    #[inline]
    pub fn image(mut self, image: vk::Image) -> Self {
        self.inner.image = image;
        self
    }
}

// getters
impl GfxImageBarrier {
    #[inline]
    pub fn inner(&self) -> &vk::ImageMemoryBarrier2<'_> {
        &self.inner
    }

    #[inline]
    pub fn vk_image(&self) -> vk::Image {
        self.inner.image
    }

    #[inline]
    pub fn old_layout(&self) -> vk::ImageLayout {
        self.inner.old_layout
    }

    #[inline]
    pub fn new_layout(&self) -> vk::ImageLayout {
        self.inner.new_layout
    }

    #[inline]
    pub fn subresource_range(&self) -> vk::ImageSubresourceRange {
        self.inner.subresource_range
    }

    #[inline]
    pub fn src(&self) -> GfxStageAccess {
        GfxStageAccess::new(self.inner.src_stage_mask, self.inner.src_access_mask)
    }

    #[inline]
    pub fn dst(&self) -> GfxStageAccess {
        GfxStageAccess::new(self.inner.dst_stage_mask, self.inner.dst_access_mask)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    #[test]
    fn test_layout_transition_masks() {
        let image = vk::Image::from_raw(7);
        let barrier = GfxImageBarrier::layout_transition(
            image,
            vk::ImageAspectFlags::COLOR,
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        );

        assert_eq!(barrier.vk_image(), image);
        assert_eq!(barrier.src().stage, vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT);
        // src 只需要写操作
        assert_eq!(barrier.src().access, vk::AccessFlags2::COLOR_ATTACHMENT_WRITE);
        assert_eq!(barrier.dst(), GfxStageAccess::SHADER_READ);
        assert_eq!(barrier.inner().src_queue_family_index, vk::QUEUE_FAMILY_IGNORED);
    }

    #[test]
    fn test_from_undefined_has_empty_src_access() {
        let barrier = GfxImageBarrier::layout_transition(
            vk::Image::from_raw(1),
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL,
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        );
        assert_eq!(barrier.src().stage, vk::PipelineStageFlags2::TOP_OF_PIPE);
        assert!(barrier.src().access.is_empty());
        assert_eq!(barrier.dst(), GfxStageAccess::DEPTH_ATTACHMENT);
        assert_eq!(
            barrier.subresource_range().aspect_mask,
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        );
    }

    #[test]
    fn test_mip_range_and_dst_override() {
        let compute_read =
            GfxStageAccess::new(vk::PipelineStageFlags2::COMPUTE_SHADER, vk::AccessFlags2::SHADER_SAMPLED_READ);
        let barrier = GfxImageBarrier::layout_transition(
            vk::Image::from_raw(3),
            vk::ImageAspectFlags::COLOR,
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        )
        .mip_range(2, 1)
        .dst_stage_access(compute_read);

        assert_eq!(barrier.subresource_range().base_mip_level, 2);
        assert_eq!(barrier.subresource_range().level_count, 1);
        assert_eq!(barrier.dst(), compute_read);
    }
}
