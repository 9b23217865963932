//! 不需要 GPU 的设备与分配器，供测试与 `frame-trace` 使用

use std::{cell::RefCell, collections::HashMap};

use ash::vk::{self, Handle};

use crate::{
    error::GfxError,
    foundation::format::GfxFormatQuery,
    resources::image::{GfxImage, GfxImageAllocator, GfxImageDesc, ImageSource},
};

/// 除了被显式移除的格式以外，支持所有格式的所有常用 feature
#[derive(Clone, Debug, Default)]
pub struct GfxHeadlessDevice {
    unsupported: Vec<vk::Format>,
}
// new & init
impl GfxHeadlessDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// builder
    pub fn without_format(mut self, format: vk::Format) -> Self {
        self.unsupported.push(format);
        self
    }
}
impl GfxFormatQuery for GfxHeadlessDevice {
    fn format_properties(&self, format: vk::Format) -> vk::FormatProperties {
        if self.unsupported.contains(&format) {
            return vk::FormatProperties::default();
        }
        let features = vk::FormatFeatureFlags::SAMPLED_IMAGE
            | vk::FormatFeatureFlags::COLOR_ATTACHMENT
            | vk::FormatFeatureFlags::COLOR_ATTACHMENT_BLEND
            | vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT
            | vk::FormatFeatureFlags::TRANSFER_SRC
            | vk::FormatFeatureFlags::TRANSFER_DST;
        vk::FormatProperties {
            linear_tiling_features: features,
            optimal_tiling_features: features,
            buffer_features: vk::FormatFeatureFlags::empty(),
        }
    }
}

#[derive(Default)]
struct HeadlessAllocState {
    next_handle: u64,
    live: HashMap<vk::Image, (String, GfxImageDesc)>,
    created: usize,
    destroyed: usize,
    fail_on: Option<String>,
}
impl HeadlessAllocState {
    fn next_raw(&mut self) -> u64 {
        // 0 是 null handle
        self.next_handle += 1;
        self.next_handle
    }
}

/// 分配合成的 handle，并记录每个 image 的生命周期
#[derive(Default)]
pub struct GfxHeadlessImageAllocator {
    state: RefCell<HeadlessAllocState>,
}
// new & init
impl GfxHeadlessImageAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// 名字包含 `pattern` 的 image 创建失败，用于测试错误处理
    pub fn fail_on(&self, pattern: impl Into<String>) {
        self.state.borrow_mut().fail_on = Some(pattern.into());
    }
}
// getters
impl GfxHeadlessImageAllocator {
    pub fn live_count(&self) -> usize {
        self.state.borrow().live.len()
    }

    pub fn created_count(&self) -> usize {
        self.state.borrow().created
    }

    pub fn destroyed_count(&self) -> usize {
        self.state.borrow().destroyed
    }

    /// 所有存活 image 的名字，已排序
    pub fn live_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.state.borrow().live.values().map(|(name, _)| name.clone()).collect();
        names.sort();
        names
    }

    /// 存活 image 中名字为 `name` 的描述
    pub fn live_desc(&self, name: &str) -> Option<GfxImageDesc> {
        self.state.borrow().live.values().find(|(n, _)| n == name).map(|(_, desc)| *desc)
    }
}
impl GfxImageAllocator for GfxHeadlessImageAllocator {
    fn create_image(&self, desc: &GfxImageDesc, name: &str) -> Result<GfxImage, GfxError> {
        let mut state = self.state.borrow_mut();
        if state.fail_on.as_deref().is_some_and(|pattern| name.contains(pattern)) {
            return Err(GfxError::Vk {
                call: "vmaCreateImage",
                result: vk::Result::ERROR_OUT_OF_DEVICE_MEMORY,
            });
        }

        let handle = vk::Image::from_raw(state.next_raw());
        let view = vk::ImageView::from_raw(state.next_raw());
        let mip_views = if desc.mip_levels > 1 {
            (0..desc.mip_levels).map(|_| vk::ImageView::from_raw(state.next_raw())).collect()
        } else {
            Vec::new()
        };
        let sampled_view = desc.is_depth_stencil().then(|| vk::ImageView::from_raw(state.next_raw()));

        state.live.insert(handle, (name.to_string(), *desc));
        state.created += 1;

        Ok(GfxImage::new(handle, view, mip_views, sampled_view, ImageSource::Headless, *desc, name))
    }

    fn destroy_image(&self, image: GfxImage) {
        let mut state = self.state.borrow_mut();
        let removed = state.live.remove(&image.handle());
        assert!(removed.is_some(), "double destroy of image: {}", image.name());
        state.destroyed += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn color_desc(mips: u32) -> GfxImageDesc {
        GfxImageDesc::new_2d(
            vk::Extent2D { width: 16, height: 16 },
            vk::Format::R16G16B16A16_SFLOAT,
            vk::ImageUsageFlags::COLOR_ATTACHMENT,
        )
        .mip_levels(mips)
    }

    #[test]
    fn test_lifecycle_counts() {
        let allocator = GfxHeadlessImageAllocator::new();
        let a = allocator.create_image(&color_desc(1), "a").unwrap();
        let b = allocator.create_image(&color_desc(3), "b").unwrap();

        assert_ne!(a.handle(), b.handle());
        assert_eq!(b.all_views().count(), 4);
        assert_eq!(allocator.live_names(), vec!["a".to_string(), "b".to_string()]);

        allocator.destroy_image(a);
        assert_eq!(allocator.live_count(), 1);
        assert_eq!(allocator.created_count(), 2);
        assert_eq!(allocator.destroyed_count(), 1);
        assert_eq!(allocator.live_desc("b").map(|d| d.mip_levels), Some(3));
        allocator.destroy_image(b);
    }

    #[test]
    fn test_fail_on() {
        let allocator = GfxHeadlessImageAllocator::new();
        allocator.fail_on("bloom");
        let result = allocator.create_image(&color_desc(1), "bloom-0");
        assert!(matches!(
            result,
            Err(GfxError::Vk {
                result: vk::Result::ERROR_OUT_OF_DEVICE_MEMORY,
                ..
            })
        ));
        assert_eq!(allocator.live_count(), 0);
    }

    #[test]
    fn test_headless_format_query() {
        let device = GfxHeadlessDevice::new().without_format(vk::Format::D16_UNORM);
        assert!(
            device
                .format_properties(vk::Format::D32_SFLOAT)
                .optimal_tiling_features
                .contains(vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT)
        );
        assert!(device.format_properties(vk::Format::D16_UNORM).optimal_tiling_features.is_empty());
    }
}
