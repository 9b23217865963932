use std::rc::Rc;

use ash::vk;
use vk_mem::Alloc;

use crate::{error::GfxError, foundation::device::GfxDevice, foundation::format::infer_image_aspect};

/// 2D image 的描述
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GfxImageDesc {
    pub extent: vk::Extent2D,
    pub format: vk::Format,
    pub usage: vk::ImageUsageFlags,
    pub mip_levels: u32,
    pub aspect: vk::ImageAspectFlags,
}
// new & init
impl GfxImageDesc {
    /// 单个 mip，aspect 由 format 推断
    pub fn new_2d(extent: vk::Extent2D, format: vk::Format, usage: vk::ImageUsageFlags) -> Self {
        Self {
            extent,
            format,
            usage,
            mip_levels: 1,
            aspect: infer_image_aspect(format),
        }
    }

    /// builder
    #[inline]
    pub fn mip_levels(mut self, mip_levels: u32) -> Self {
        self.mip_levels = mip_levels.max(1);
        self
    }

    /// 是否同时包含 depth 与 stencil
    #[inline]
    pub fn is_depth_stencil(&self) -> bool {
        self.aspect.contains(vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL)
    }

    fn as_info(&self) -> vk::ImageCreateInfo<'static> {
        vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(self.format)
            .extent(vk::Extent3D {
                width: self.extent.width,
                height: self.extent.height,
                depth: 1,
            })
            .mip_levels(self.mip_levels)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(self.usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED)
    }
}

pub enum ImageSource {
    /// 通过 VMA 分配
    Allocated(vk_mem::Allocation),

    /// 不对应任何显存，headless 环境使用
    Headless,
}

/// image 以及它的 view
///
/// - `view`：覆盖所有 mip 与 aspect，作为 attachment 使用
/// - `mip_views`：每个 mip 一个 view，只在多 mip 时存在
/// - `sampled_view`：depth-stencil 格式下只包含 depth aspect 的 view，供 shader 采样
///
/// 不实现 Drop，必须交还给创建它的 [`GfxImageAllocator`] 销毁
pub struct GfxImage {
    handle: vk::Image,
    view: vk::ImageView,
    mip_views: Vec<vk::ImageView>,
    sampled_view: Option<vk::ImageView>,

    source: ImageSource,
    desc: GfxImageDesc,

    name: String,
}
// new & init
impl GfxImage {
    pub fn new(
        handle: vk::Image,
        view: vk::ImageView,
        mip_views: Vec<vk::ImageView>,
        sampled_view: Option<vk::ImageView>,
        source: ImageSource,
        desc: GfxImageDesc,
        name: impl Into<String>,
    ) -> Self {
        Self {
            handle,
            view,
            mip_views,
            sampled_view,
            source,
            desc,
            name: name.into(),
        }
    }
}
// getters
impl GfxImage {
    #[inline]
    pub fn handle(&self) -> vk::Image {
        self.handle
    }

    #[inline]
    pub fn view(&self) -> vk::ImageView {
        self.view
    }

    /// 单个 mip 的 view；只有一个 mip 时返回完整的 view
    pub fn view_for_mip(&self, mip: u32) -> vk::ImageView {
        if self.mip_views.is_empty() {
            debug_assert_eq!(mip, 0);
            return self.view;
        }
        self.mip_views[mip as usize]
    }

    /// 供 shader 采样的 view，只有 depth-stencil 格式才与 [`Self::view`] 不同
    #[inline]
    pub fn sampled_view(&self) -> vk::ImageView {
        self.sampled_view.unwrap_or(self.view)
    }

    /// 所有 view，销毁时使用
    pub fn all_views(&self) -> impl Iterator<Item = vk::ImageView> + '_ {
        std::iter::once(self.view).chain(self.mip_views.iter().copied()).chain(self.sampled_view)
    }

    #[inline]
    pub fn desc(&self) -> &GfxImageDesc {
        &self.desc
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.desc.format
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.desc.extent
    }

    #[inline]
    pub fn mip_levels(&self) -> u32 {
        self.desc.mip_levels
    }

    #[inline]
    pub fn aspect(&self) -> vk::ImageAspectFlags {
        self.desc.aspect
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// image 的创建与销毁
///
/// render target 只依赖这个 trait，真实环境使用 [`GfxVmaImageAllocator`]
pub trait GfxImageAllocator {
    /// 创建 image 以及它的所有 view
    fn create_image(&self, desc: &GfxImageDesc, name: &str) -> Result<GfxImage, GfxError>;

    /// 销毁 image 以及它的所有 view，调用方需要保证 GPU 不再使用
    fn destroy_image(&self, image: GfxImage);
}

/// 基于 VMA 的 image 分配器
pub struct GfxVmaImageAllocator {
    device: ash::Device,
    allocator: Rc<vk_mem::Allocator>,
}
// new & init
impl GfxVmaImageAllocator {
    pub fn new(device: &GfxDevice, allocator: Rc<vk_mem::Allocator>) -> Self {
        Self {
            device: device.ash_device().clone(),
            allocator,
        }
    }
}
// tools
impl GfxVmaImageAllocator {
    fn create_view(
        &self,
        image: vk::Image,
        format: vk::Format,
        aspect: vk::ImageAspectFlags,
        base_mip: u32,
        mip_count: u32,
    ) -> Result<vk::ImageView, GfxError> {
        let info = vk::ImageViewCreateInfo::default()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: aspect,
                base_mip_level: base_mip,
                level_count: mip_count,
                base_array_layer: 0,
                layer_count: 1,
            });
        unsafe { self.device.create_image_view(&info, None) }.map_err(GfxError::vk("vkCreateImageView"))
    }

    fn destroy_views(&self, views: impl IntoIterator<Item = vk::ImageView>) {
        for view in views {
            unsafe { self.device.destroy_image_view(view, None) };
        }
    }

    /// 创建所有 view，失败时销毁已经创建的 view
    fn create_views(
        &self,
        image: vk::Image,
        desc: &GfxImageDesc,
    ) -> Result<(vk::ImageView, Vec<vk::ImageView>, Option<vk::ImageView>), GfxError> {
        let mut created = Vec::new();
        let result = (|| {
            let view = self.create_view(image, desc.format, desc.aspect, 0, desc.mip_levels)?;
            created.push(view);

            let mut mip_views = Vec::new();
            if desc.mip_levels > 1 {
                for mip in 0..desc.mip_levels {
                    let mip_view = self.create_view(image, desc.format, desc.aspect, mip, 1)?;
                    created.push(mip_view);
                    mip_views.push(mip_view);
                }
            }

            // 采样 depth-stencil 时只能绑定一个 aspect
            let sampled_view = if desc.is_depth_stencil() {
                let sampled = self.create_view(image, desc.format, vk::ImageAspectFlags::DEPTH, 0, desc.mip_levels)?;
                created.push(sampled);
                Some(sampled)
            } else {
                None
            };

            Ok((view, mip_views, sampled_view))
        })();

        if result.is_err() {
            self.destroy_views(created);
        }
        result
    }
}
impl GfxImageAllocator for GfxVmaImageAllocator {
    fn create_image(&self, desc: &GfxImageDesc, name: &str) -> Result<GfxImage, GfxError> {
        let alloc_info = vk_mem::AllocationCreateInfo {
            usage: vk_mem::MemoryUsage::AutoPreferDevice,
            ..Default::default()
        };
        let (image, mut allocation) = unsafe { self.allocator.create_image(&desc.as_info(), &alloc_info) }
            .map_err(GfxError::vk("vmaCreateImage"))?;

        let (view, mip_views, sampled_view) = match self.create_views(image, desc) {
            Ok(views) => views,
            Err(e) => {
                unsafe { self.allocator.destroy_image(image, &mut allocation) };
                return Err(e);
            }
        };

        log::debug!("created image {}: {:?} {:?}", name, desc.format, desc.extent);
        Ok(GfxImage::new(image, view, mip_views, sampled_view, ImageSource::Allocated(allocation), *desc, name))
    }

    fn destroy_image(&self, image: GfxImage) {
        log::debug!("destroying image: {}", image.name);

        self.destroy_views(image.all_views().collect::<Vec<_>>());
        let handle = image.handle;
        match image.source {
            ImageSource::Allocated(mut allocation) => unsafe { self.allocator.destroy_image(handle, &mut allocation) },
            ImageSource::Headless => log::warn!("headless image passed to the VMA allocator: {}", image.name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    #[test]
    fn test_desc_aspect_inference() {
        let extent = vk::Extent2D { width: 8, height: 8 };
        let depth = GfxImageDesc::new_2d(
            extent,
            vk::Format::D24_UNORM_S8_UINT,
            vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
        );
        assert!(depth.is_depth_stencil());

        let color = GfxImageDesc::new_2d(extent, vk::Format::R8G8_UNORM, vk::ImageUsageFlags::SAMPLED).mip_levels(0);
        assert_eq!(color.aspect, vk::ImageAspectFlags::COLOR);
        assert_eq!(color.mip_levels, 1);
    }

    #[test]
    fn test_views() {
        let desc = GfxImageDesc::new_2d(
            vk::Extent2D { width: 8, height: 8 },
            vk::Format::R16G16B16A16_SFLOAT,
            vk::ImageUsageFlags::COLOR_ATTACHMENT,
        )
        .mip_levels(2);
        let image = GfxImage::new(
            vk::Image::from_raw(1),
            vk::ImageView::from_raw(10),
            vec![vk::ImageView::from_raw(11), vk::ImageView::from_raw(12)],
            None,
            ImageSource::Headless,
            desc,
            "bloom",
        );
        assert_eq!(image.view_for_mip(1), vk::ImageView::from_raw(12));
        assert_eq!(image.sampled_view(), vk::ImageView::from_raw(10));
        assert_eq!(image.all_views().count(), 3);
    }
}
