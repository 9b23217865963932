//! 所有 render target 的物理资源，以及它们唯一的 layout 表
//!
//! 任何组件想知道某个 image 当前的 layout，都必须通过 [`RenderTargetResources::current_layout`] 查询；
//! 所有 layout 的改变都通过 [`RenderTargetResources::transition`] 发出 barrier 并同时更新表。

use std::{collections::BTreeMap, fmt, rc::Rc};

use ash::vk;
use itertools::Itertools;
use kestrel_gfx::{
    commands::{
        barrier::GfxImageBarrier,
        command_stream::GfxCommandStream,
        stage_access::{GfxStageAccess, is_catch_all},
    },
    foundation::{
        device_caps::GfxDeviceCaps,
        format::{GfxFormatQuery, find_supported_format, format_has_stencil},
    },
    resources::image::{GfxImage, GfxImageAllocator, GfxImageDesc},
};

use crate::{config::RenderTargetConfig, deferred_release::DeferredReleaseQueue, error::RenderTargetError};

pub const GBUFFER_COUNT: usize = 5;
pub const GBUFFER_EMISSIVE_INDEX: u8 = 4;
pub const BLOOM_PING_PONG_COUNT: u8 = 2;

pub const GBUFFER_FORMAT: vk::Format = vk::Format::R16G16B16A16_SFLOAT;
pub const SCENE_HDR_FORMAT: vk::Format = vk::Format::R16G16B16A16_SFLOAT;
pub const BLOOM_FORMAT: vk::Format = vk::Format::R16G16B16A16_SFLOAT;
pub const POST_LDR_FORMAT: vk::Format = vk::Format::B8G8R8A8_UNORM;
pub const POST_LUMINANCE_FORMAT: vk::Format = vk::Format::B8G8R8A8_UNORM;
pub const SMAA_EDGES_FORMAT: vk::Format = vk::Format::R8G8_UNORM;
pub const SMAA_BLEND_FORMAT: vk::Format = vk::Format::R8G8B8A8_UNORM;
pub const SMAA_OUTPUT_FORMAT: vk::Format = vk::Format::B8G8R8A8_UNORM;

/// 系统会给资源赋予的所有 layout，都必须在 stage/access 表中有明确的条目
pub const ASSIGNED_LAYOUTS: [vk::ImageLayout; 10] = [
    vk::ImageLayout::UNDEFINED,
    vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
    vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL,
    vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
    vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
    vk::ImageLayout::DEPTH_READ_ONLY_OPTIMAL,
    vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL,
    vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
    vk::ImageLayout::PRESENT_SRC_KHR,
];

/// 物理资源的标识
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RtImageId {
    MainDepth,
    /// 座舱使用的独立深度
    CockpitDepth,
    /// 0 color, 1 normal, 2 position, 3 specular, 4 emissive
    GBuffer(u8),
    SceneHdr,
    /// SceneHdr 的拷贝，作为后处理的输入
    SceneEffect,
    /// ping-pong 中的一个
    Bloom(u8),
    PostLdr,
    PostLuminance,
    SmaaEdges,
    SmaaBlend,
    SmaaOutput,
    /// 每个 swapchain image 一个
    SceneColorCapture(u32),
    /// image 属于 swapchain，这里只追踪 layout
    Swapchain(u32),
}
impl RtImageId {
    #[inline]
    pub fn is_depth(&self) -> bool {
        matches!(self, Self::MainDepth | Self::CockpitDepth)
    }

    #[inline]
    pub fn is_swapchain(&self) -> bool {
        matches!(self, Self::Swapchain(_))
    }

    /// 跟随主分辨率重建的资源
    fn resolution_dependent() -> Vec<Self> {
        let mut ids = vec![Self::MainDepth, Self::CockpitDepth];
        ids.extend((0..GBUFFER_COUNT as u8).map(Self::GBuffer));
        ids.extend([Self::SceneHdr, Self::SceneEffect]);
        ids.extend((0..BLOOM_PING_PONG_COUNT).map(Self::Bloom));
        ids.extend([Self::PostLdr, Self::PostLuminance, Self::SmaaEdges, Self::SmaaBlend, Self::SmaaOutput]);
        ids
    }
}
impl fmt::Display for RtImageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MainDepth => write!(f, "main-depth"),
            Self::CockpitDepth => write!(f, "cockpit-depth"),
            Self::GBuffer(i) => write!(f, "gbuffer-{i}"),
            Self::SceneHdr => write!(f, "scene-hdr"),
            Self::SceneEffect => write!(f, "scene-effect"),
            Self::Bloom(i) => write!(f, "bloom-{i}"),
            Self::PostLdr => write!(f, "post-ldr"),
            Self::PostLuminance => write!(f, "post-luminance"),
            Self::SmaaEdges => write!(f, "smaa-edges"),
            Self::SmaaBlend => write!(f, "smaa-blend"),
            Self::SmaaOutput => write!(f, "smaa-output"),
            Self::SceneColorCapture(i) => write!(f, "scene-color-capture-{i}"),
            Self::Swapchain(i) => write!(f, "swapchain-{i}"),
        }
    }
}

/// layout 追踪的单位：一个 image 的一个 mip
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RtSubresource {
    pub image: RtImageId,
    pub mip: u32,
}
impl RtSubresource {
    #[inline]
    pub const fn new(image: RtImageId, mip: u32) -> Self {
        Self { image, mip }
    }
}
impl From<RtImageId> for RtSubresource {
    #[inline]
    fn from(image: RtImageId) -> Self {
        Self::new(image, 0)
    }
}

/// 一次 layout 转换请求
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LayoutRequest {
    pub target: RtSubresource,
    pub layout: vk::ImageLayout,
    /// 覆盖查表得到的 dst stage/access，目前只用于 upscaler
    pub dst_override: Option<GfxStageAccess>,
}
impl LayoutRequest {
    #[inline]
    pub fn new(target: impl Into<RtSubresource>, layout: vk::ImageLayout) -> Self {
        Self {
            target: target.into(),
            layout,
            dst_override: None,
        }
    }

    /// builder
    #[inline]
    pub fn with_dst(mut self, dst: GfxStageAccess) -> Self {
        self.dst_override = Some(dst);
        self
    }
}

/// 由选定的深度格式推导出的所有信息，只计算一次
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DepthFormatInfo {
    pub format: vk::Format,
    pub has_stencil: bool,
    pub attachment_layout: vk::ImageLayout,
    pub read_layout: vk::ImageLayout,
    pub aspect: vk::ImageAspectFlags,
}
impl DepthFormatInfo {
    pub fn from_format(format: vk::Format) -> Self {
        if format_has_stencil(format) {
            Self {
                format,
                has_stencil: true,
                attachment_layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
                read_layout: vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL,
                aspect: vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL,
            }
        } else {
            Self {
                format,
                has_stencil: false,
                attachment_layout: vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL,
                read_layout: vk::ImageLayout::DEPTH_READ_ONLY_OPTIMAL,
                aspect: vk::ImageAspectFlags::DEPTH,
            }
        }
    }
}

/// 唯一的 layout 表
#[derive(Debug, Default)]
pub struct LayoutTable {
    layouts: BTreeMap<RtSubresource, vk::ImageLayout>,
}
impl LayoutTable {
    /// 注册 image 的所有 mip，初始为 UNDEFINED
    fn register(&mut self, image: RtImageId, mip_levels: u32) {
        for mip in 0..mip_levels {
            self.layouts.insert(RtSubresource::new(image, mip), vk::ImageLayout::UNDEFINED);
        }
    }

    fn unregister(&mut self, image: RtImageId) {
        self.layouts.retain(|sub, _| sub.image != image);
    }

    pub fn get(&self, sub: RtSubresource) -> vk::ImageLayout {
        match self.layouts.get(&sub) {
            Some(layout) => *layout,
            None => panic!("layout of untracked subresource requested: {} mip {}", sub.image, sub.mip),
        }
    }

    fn set(&mut self, sub: RtSubresource, layout: vk::ImageLayout) {
        match self.layouts.get_mut(&sub) {
            Some(entry) => *entry = layout,
            None => panic!("layout of untracked subresource set: {} mip {}", sub.image, sub.mip),
        }
    }

    fn reset_all(&mut self) {
        self.layouts.values_mut().for_each(|layout| *layout = vk::ImageLayout::UNDEFINED);
    }

    pub fn iter(&self) -> impl Iterator<Item = (RtSubresource, vk::ImageLayout)> + '_ {
        self.layouts.iter().map(|(sub, layout)| (*sub, *layout))
    }

    pub fn len(&self) -> usize {
        self.layouts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layouts.is_empty()
    }
}

/// 呈现模块提供的 swapchain image
#[derive(Clone, Debug)]
pub struct SwapchainImages {
    pub images: Vec<vk::Image>,
    pub views: Vec<vk::ImageView>,
    pub format: vk::Format,
    pub extent: vk::Extent2D,
    /// swapchain 每次重建都会增加
    pub generation: u64,
}

/// 所有 render target 的物理资源
pub struct RenderTargetResources {
    allocator: Rc<dyn GfxImageAllocator>,

    extent: vk::Extent2D,
    depth: DepthFormatInfo,

    /// 配置中要求的 bloom mip 数量
    requested_bloom_mips: u32,
    /// 实际的 bloom mip 数量
    bloom_mip_levels: u32,
    scene_color_capture: bool,

    images: BTreeMap<RtImageId, GfxImage>,
    swapchain: Option<SwapchainImages>,

    layouts: LayoutTable,

    destroyed: bool,
}
// new & init
impl RenderTargetResources {
    /// 选择深度格式并创建所有跟随分辨率的资源
    ///
    /// swapchain 相关的资源在 [`Self::set_swapchain`] 时创建
    pub fn create(
        extent: vk::Extent2D,
        config: &RenderTargetConfig,
        format_query: &dyn GfxFormatQuery,
        caps: &GfxDeviceCaps,
        allocator: Rc<dyn GfxImageAllocator>,
    ) -> Result<Self, RenderTargetError> {
        config.validate()?;
        if let Some(feature) = caps.missing_core_feature() {
            return Err(RenderTargetError::MissingDeviceFeature(feature));
        }

        let candidates = config.depth_formats();
        let depth_format = find_supported_format(
            format_query,
            &candidates,
            vk::ImageTiling::OPTIMAL,
            vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT | vk::FormatFeatureFlags::SAMPLED_IMAGE,
        )
        .ok_or(RenderTargetError::NoDepthFormat { candidates })?;
        let depth = DepthFormatInfo::from_format(depth_format);
        log::info!("render target depth format: {:?} (stencil: {})", depth.format, depth.has_stencil);

        let mut resources = Self {
            allocator,
            extent,
            depth,
            requested_bloom_mips: config.bloom_mip_levels,
            bloom_mip_levels: Self::clamp_bloom_mips(extent, config.bloom_mip_levels),
            scene_color_capture: config.scene_color_capture,
            images: BTreeMap::new(),
            swapchain: None,
            layouts: LayoutTable::default(),
            destroyed: false,
        };
        resources.create_resolution_images()?;

        log::info!(
            "render targets created: {}x{}, {} images, bloom mips {}",
            extent.width,
            extent.height,
            resources.images.len(),
            resources.bloom_mip_levels
        );
        Ok(resources)
    }

    fn create_resolution_images(&mut self) -> Result<(), RenderTargetError> {
        let mut created = Vec::new();
        for id in RtImageId::resolution_dependent() {
            let desc = self.image_desc(id);
            match self.allocator.create_image(&desc, &id.to_string()) {
                Ok(image) => created.push((id, image)),
                Err(source) => {
                    // 不存在部分可用的状态
                    for (_, image) in created {
                        self.allocator.destroy_image(image);
                    }
                    return Err(RenderTargetError::Allocation {
                        resource: id.to_string(),
                        source,
                    });
                }
            }
        }

        for (id, image) in created {
            self.layouts.register(id, image.mip_levels());
            self.images.insert(id, image);
        }
        Ok(())
    }

    fn create_capture_images(&mut self) -> Result<(), RenderTargetError> {
        let Some(swapchain) = &self.swapchain else {
            return Ok(());
        };
        if !self.scene_color_capture {
            return Ok(());
        }

        let desc = GfxImageDesc::new_2d(
            swapchain.extent,
            swapchain.format,
            vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::TRANSFER_SRC | vk::ImageUsageFlags::SAMPLED,
        );
        let mut created = Vec::new();
        for index in 0..swapchain.images.len() as u32 {
            let id = RtImageId::SceneColorCapture(index);
            match self.allocator.create_image(&desc, &id.to_string()) {
                Ok(image) => created.push((id, image)),
                Err(source) => {
                    for (_, image) in created {
                        self.allocator.destroy_image(image);
                    }
                    return Err(RenderTargetError::Allocation {
                        resource: id.to_string(),
                        source,
                    });
                }
            }
        }

        for (id, image) in created {
            self.layouts.register(id, 1);
            self.images.insert(id, image);
        }
        Ok(())
    }

    /// 半分辨率下最多能容纳的 mip 数量
    fn clamp_bloom_mips(extent: vk::Extent2D, requested: u32) -> u32 {
        let base = (extent.width >> 1).max(extent.height >> 1).max(1);
        let max_mips = u32::BITS - base.leading_zeros();
        requested.clamp(1, max_mips)
    }

    fn image_desc(&self, id: RtImageId) -> GfxImageDesc {
        let color_usage = vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::SAMPLED;
        match id {
            RtImageId::MainDepth | RtImageId::CockpitDepth => GfxImageDesc::new_2d(
                self.extent,
                self.depth.format,
                vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT
                    | vk::ImageUsageFlags::SAMPLED
                    | vk::ImageUsageFlags::TRANSFER_SRC
                    | vk::ImageUsageFlags::TRANSFER_DST,
            ),
            // emissive 可以由 scene color 预先填充
            RtImageId::GBuffer(GBUFFER_EMISSIVE_INDEX) => GfxImageDesc::new_2d(
                self.extent,
                GBUFFER_FORMAT,
                color_usage | vk::ImageUsageFlags::TRANSFER_DST,
            ),
            RtImageId::GBuffer(_) => GfxImageDesc::new_2d(self.extent, GBUFFER_FORMAT, color_usage),
            RtImageId::SceneHdr => GfxImageDesc::new_2d(
                self.extent,
                SCENE_HDR_FORMAT,
                color_usage | vk::ImageUsageFlags::TRANSFER_SRC,
            ),
            RtImageId::SceneEffect => GfxImageDesc::new_2d(
                self.extent,
                SCENE_HDR_FORMAT,
                color_usage | vk::ImageUsageFlags::TRANSFER_DST,
            ),
            RtImageId::Bloom(_) => GfxImageDesc::new_2d(self.bloom_base_extent(), BLOOM_FORMAT, color_usage)
                .mip_levels(self.bloom_mip_levels),
            RtImageId::PostLdr => GfxImageDesc::new_2d(self.extent, POST_LDR_FORMAT, color_usage),
            RtImageId::PostLuminance => GfxImageDesc::new_2d(self.extent, POST_LUMINANCE_FORMAT, color_usage),
            RtImageId::SmaaEdges => GfxImageDesc::new_2d(self.extent, SMAA_EDGES_FORMAT, color_usage),
            RtImageId::SmaaBlend => GfxImageDesc::new_2d(self.extent, SMAA_BLEND_FORMAT, color_usage),
            RtImageId::SmaaOutput => GfxImageDesc::new_2d(self.extent, SMAA_OUTPUT_FORMAT, color_usage),
            RtImageId::SceneColorCapture(_) | RtImageId::Swapchain(_) => {
                panic!("{id} is not a resolution dependent image")
            }
        }
    }

    #[inline]
    fn bloom_base_extent(&self) -> vk::Extent2D {
        vk::Extent2D {
            width: (self.extent.width >> 1).max(1),
            height: (self.extent.height >> 1).max(1),
        }
    }
}
// swapchain
impl RenderTargetResources {
    /// 登记呈现模块的 swapchain image
    ///
    /// generation 变化时所有 swapchain layout 回到 UNDEFINED，并重建 scene color capture
    pub fn set_swapchain(
        &mut self,
        swapchain: SwapchainImages,
        retire_serial: u64,
        release_queue: &mut DeferredReleaseQueue,
    ) -> Result<(), RenderTargetError> {
        assert_eq!(swapchain.images.len(), swapchain.views.len(), "swapchain images and views mismatch");

        if let Some(old) = &self.swapchain
            && old.generation == swapchain.generation
        {
            assert_eq!(old.images.len(), swapchain.images.len(), "swapchain changed without a new generation");
            self.swapchain = Some(swapchain);
            return Ok(());
        }

        if let Some(old) = self.swapchain.take() {
            for index in 0..old.images.len() as u32 {
                self.layouts.unregister(RtImageId::Swapchain(index));
                self.retire(RtImageId::SceneColorCapture(index), retire_serial, release_queue);
            }
        }

        log::info!(
            "swapchain generation {}: {} images, {:?}, {}x{}",
            swapchain.generation,
            swapchain.images.len(),
            swapchain.format,
            swapchain.extent.width,
            swapchain.extent.height
        );
        for index in 0..swapchain.images.len() as u32 {
            self.layouts.register(RtImageId::Swapchain(index), 1);
        }
        self.swapchain = Some(swapchain);
        self.create_capture_images()
    }
}
// resize & destroy
impl RenderTargetResources {
    /// 重建所有跟随分辨率的资源，旧资源交给延迟释放队列
    ///
    /// 所有被追踪的 layout（包括 swapchain）都会回到 UNDEFINED
    pub fn resize(
        &mut self,
        extent: vk::Extent2D,
        retire_serial: u64,
        release_queue: &mut DeferredReleaseQueue,
    ) -> Result<(), RenderTargetError> {
        assert!(!self.destroyed, "resize after destroy");

        for id in RtImageId::resolution_dependent() {
            self.retire(id, retire_serial, release_queue);
        }
        self.layouts.reset_all();

        self.extent = extent;
        self.bloom_mip_levels = Self::clamp_bloom_mips(extent, self.requested_bloom_mips);
        self.create_resolution_images()?;

        log::info!(
            "render targets resized to {}x{}, old images retire at serial {}",
            extent.width,
            extent.height,
            retire_serial
        );
        Ok(())
    }

    /// 把所有资源交给延迟释放队列
    pub fn destroy(&mut self, retire_serial: u64, release_queue: &mut DeferredReleaseQueue) {
        let ids = self.images.keys().copied().collect_vec();
        for id in ids {
            self.retire(id, retire_serial, release_queue);
        }
        self.layouts = LayoutTable::default();
        self.swapchain = None;
        self.destroyed = true;
        log::info!("render targets destroyed, retire at serial {}", retire_serial);
    }

    fn retire(&mut self, id: RtImageId, retire_serial: u64, release_queue: &mut DeferredReleaseQueue) {
        self.layouts.unregister(id);
        if let Some(image) = self.images.remove(&id) {
            let allocator = self.allocator.clone();
            release_queue.enqueue(retire_serial, move || allocator.destroy_image(image));
        }
    }

    /// 丢弃的帧之后，实际的 layout 无法确定，全部视为 UNDEFINED
    pub fn reset_all_layouts(&mut self) {
        self.layouts.reset_all();
    }
}
impl Drop for RenderTargetResources {
    fn drop(&mut self) {
        if !self.destroyed && !self.images.is_empty() {
            log::error!("RenderTargetResources dropped without destroy, {} images leaked", self.images.len());
        }
    }
}
// layout
impl RenderTargetResources {
    #[inline]
    pub fn current_layout(&self, sub: impl Into<RtSubresource>) -> vk::ImageLayout {
        self.layouts.get(sub.into())
    }

    /// 直接修改记录的 layout，不发出 barrier
    ///
    /// 用于外部已经通过其他方式（例如 render pass 的 final layout）改变了 layout 的情况
    #[inline]
    pub fn set_layout(&mut self, sub: impl Into<RtSubresource>, layout: vk::ImageLayout) {
        self.layouts.set(sub.into(), layout);
    }

    #[inline]
    pub fn layouts(&self) -> &LayoutTable {
        &self.layouts
    }

    /// 唯一发出 layout barrier 的入口
    ///
    /// 已经处于目标 layout 的 subresource 会被跳过，其余的合并为一次 `cmd_image_barriers`。
    /// 返回发出的 barrier 数量
    pub fn transition(&mut self, cmd: &dyn GfxCommandStream, requests: &[LayoutRequest]) -> usize {
        debug_assert!(
            requests.iter().map(|r| r.target).all_unique(),
            "one subresource requested twice in one transition"
        );

        let mut barriers = Vec::with_capacity(requests.len());
        for request in requests {
            let old_layout = self.layouts.get(request.target);
            if old_layout == request.layout {
                continue;
            }
            debug_assert!(!is_catch_all(request.layout), "unexpected layout {:?}", request.layout);

            let image = request.target.image;
            let mut barrier = GfxImageBarrier::layout_transition(
                self.vk_image(image),
                self.aspect(image),
                old_layout,
                request.layout,
            )
            .mip_range(request.target.mip, 1);

            // 与 acquire semaphore 的 wait stage 相连
            if image.is_swapchain()
                && matches!(old_layout, vk::ImageLayout::UNDEFINED | vk::ImageLayout::PRESENT_SRC_KHR)
            {
                barrier = barrier.src_mask(vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT, vk::AccessFlags2::NONE);
            }
            if let Some(dst) = request.dst_override {
                barrier = barrier.dst_stage_access(dst);
            }

            log::trace!("barrier {} mip {}: {:?} -> {:?}", image, request.target.mip, old_layout, request.layout);
            self.layouts.set(request.target, request.layout);
            barriers.push(barrier);
        }

        if !barriers.is_empty() {
            cmd.cmd_image_barriers(vk::DependencyFlags::empty(), &barriers);
        }
        barriers.len()
    }
}
// getters
impl RenderTargetResources {
    fn allocated(&self, id: RtImageId) -> &GfxImage {
        match self.images.get(&id) {
            Some(image) => image,
            None => panic!("render target {id} does not exist"),
        }
    }

    fn swapchain_images(&self) -> &SwapchainImages {
        match &self.swapchain {
            Some(swapchain) => swapchain,
            None => panic!("swapchain images are not registered"),
        }
    }

    pub fn vk_image(&self, id: RtImageId) -> vk::Image {
        match id {
            RtImageId::Swapchain(index) => self.swapchain_images().images[index as usize],
            _ => self.allocated(id).handle(),
        }
    }

    /// attachment 使用的 view；多 mip 的 image 返回对应 mip 的 view
    pub fn view(&self, sub: impl Into<RtSubresource>) -> vk::ImageView {
        let sub = sub.into();
        match sub.image {
            RtImageId::Swapchain(index) => self.swapchain_images().views[index as usize],
            id => self.allocated(id).view_for_mip(sub.mip),
        }
    }

    /// shader 采样使用的 view，depth-stencil 格式下只包含 depth
    pub fn sampled_view(&self, id: RtImageId) -> vk::ImageView {
        match id {
            RtImageId::Swapchain(index) => self.swapchain_images().views[index as usize],
            _ => self.allocated(id).sampled_view(),
        }
    }

    pub fn format(&self, id: RtImageId) -> vk::Format {
        match id {
            RtImageId::MainDepth | RtImageId::CockpitDepth => self.depth.format,
            RtImageId::Swapchain(_) => self.swapchain_images().format,
            _ => self.allocated(id).format(),
        }
    }

    pub fn aspect(&self, id: RtImageId) -> vk::ImageAspectFlags {
        if id.is_depth() { self.depth.aspect } else { vk::ImageAspectFlags::COLOR }
    }

    pub fn extent(&self, sub: impl Into<RtSubresource>) -> vk::Extent2D {
        let sub = sub.into();
        let base = match sub.image {
            RtImageId::Swapchain(_) => self.swapchain_images().extent,
            id => self.allocated(id).extent(),
        };
        vk::Extent2D {
            width: (base.width >> sub.mip).max(1),
            height: (base.height >> sub.mip).max(1),
        }
    }

    pub fn mip_levels(&self, id: RtImageId) -> u32 {
        match id {
            RtImageId::Swapchain(_) => 1,
            _ => self.allocated(id).mip_levels(),
        }
    }

    pub fn contains(&self, id: RtImageId) -> bool {
        match id {
            RtImageId::Swapchain(index) => {
                self.swapchain.as_ref().is_some_and(|swapchain| (index as usize) < swapchain.images.len())
            }
            _ => self.images.contains_key(&id),
        }
    }

    #[inline]
    pub fn main_extent(&self) -> vk::Extent2D {
        self.extent
    }

    #[inline]
    pub fn bloom_mip_levels(&self) -> u32 {
        self.bloom_mip_levels
    }

    #[inline]
    pub fn depth_info(&self) -> &DepthFormatInfo {
        &self.depth
    }

    #[inline]
    pub fn depth_has_stencil(&self) -> bool {
        self.depth.has_stencil
    }

    #[inline]
    pub fn depth_attachment_layout(&self) -> vk::ImageLayout {
        self.depth.attachment_layout
    }

    #[inline]
    pub fn depth_read_layout(&self) -> vk::ImageLayout {
        self.depth.read_layout
    }

    #[inline]
    pub fn depth_aspect_mask(&self) -> vk::ImageAspectFlags {
        self.depth.aspect
    }

    pub fn swapchain_image_count(&self) -> u32 {
        self.swapchain.as_ref().map_or(0, |swapchain| swapchain.images.len() as u32)
    }

    pub fn swapchain_generation(&self) -> Option<u64> {
        self.swapchain.as_ref().map(|swapchain| swapchain.generation)
    }

    #[inline]
    pub fn has_scene_color_capture(&self) -> bool {
        self.scene_color_capture
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use ash::vk::Handle;
    use kestrel_gfx::{
        commands::{recording::GfxRecordingCommandStream, stage_access::stage_access_for_layout},
        foundation::headless::{GfxHeadlessDevice, GfxHeadlessImageAllocator},
    };

    pub(crate) const EXTENT_1080P: vk::Extent2D = vk::Extent2D {
        width: 1920,
        height: 1080,
    };

    pub(crate) fn swapchain_images(count: u32, generation: u64, extent: vk::Extent2D) -> SwapchainImages {
        SwapchainImages {
            images: (0..count).map(|i| vk::Image::from_raw(0xF000 + generation * 16 + i as u64)).collect(),
            views: (0..count).map(|i| vk::ImageView::from_raw(0xE000 + generation * 16 + i as u64)).collect(),
            format: vk::Format::B8G8R8A8_SRGB,
            extent,
            generation,
        }
    }

    /// 创建带 swapchain 的资源
    pub(crate) fn headless_resources(
        device: &GfxHeadlessDevice,
        allocator: &Rc<GfxHeadlessImageAllocator>,
    ) -> RenderTargetResources {
        let mut queue = DeferredReleaseQueue::new();
        let mut resources = RenderTargetResources::create(
            EXTENT_1080P,
            &RenderTargetConfig::default(),
            device,
            &GfxDeviceCaps::full(),
            allocator.clone(),
        )
        .unwrap();
        resources.set_swapchain(swapchain_images(3, 1, EXTENT_1080P), 0, &mut queue).unwrap();
        assert!(queue.is_empty());
        resources
    }

    fn destroy_all(mut resources: RenderTargetResources) {
        let mut queue = DeferredReleaseQueue::new();
        resources.destroy(1, &mut queue);
        queue.clear();
    }

    #[test]
    fn test_assigned_layouts_never_hit_catch_all() {
        for layout in ASSIGNED_LAYOUTS {
            assert!(!is_catch_all(layout), "{layout:?} falls into the catch-all entry");
        }

        // 两种深度格式推导出的 layout 也必须在列表中
        for format in [vk::Format::D32_SFLOAT_S8_UINT, vk::Format::D32_SFLOAT] {
            let info = DepthFormatInfo::from_format(format);
            assert!(ASSIGNED_LAYOUTS.contains(&info.attachment_layout));
            assert!(ASSIGNED_LAYOUTS.contains(&info.read_layout));
        }
    }

    #[test]
    fn test_depth_format_probe_and_helpers() {
        crate::tests::init();
        let allocator = Rc::new(GfxHeadlessImageAllocator::new());
        let device = GfxHeadlessDevice::new().without_format(vk::Format::D32_SFLOAT_S8_UINT);
        let resources = headless_resources(&device, &allocator);

        assert_eq!(resources.format(RtImageId::MainDepth), vk::Format::D24_UNORM_S8_UINT);
        assert!(resources.depth_has_stencil());
        assert_eq!(resources.depth_attachment_layout(), vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL);
        assert_eq!(resources.depth_read_layout(), vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL);
        assert_eq!(
            resources.depth_aspect_mask(),
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        );
        // depth-stencil 的采样 view 与 attachment view 不同
        assert_ne!(resources.sampled_view(RtImageId::MainDepth), resources.view(RtImageId::MainDepth));
        destroy_all(resources);

        let depth_only = DepthFormatInfo::from_format(vk::Format::D32_SFLOAT);
        assert!(!depth_only.has_stencil);
        assert_eq!(depth_only.aspect, vk::ImageAspectFlags::DEPTH);
        assert_eq!(depth_only.read_layout, vk::ImageLayout::DEPTH_READ_ONLY_OPTIMAL);
    }

    #[test]
    fn test_no_depth_format_is_fatal() {
        let allocator = Rc::new(GfxHeadlessImageAllocator::new());
        let device = GfxHeadlessDevice::new()
            .without_format(vk::Format::D32_SFLOAT_S8_UINT)
            .without_format(vk::Format::D24_UNORM_S8_UINT)
            .without_format(vk::Format::D32_SFLOAT);
        let result = RenderTargetResources::create(
            EXTENT_1080P,
            &RenderTargetConfig::default(),
            &device,
            &GfxDeviceCaps::full(),
            allocator.clone(),
        );
        assert!(matches!(result, Err(RenderTargetError::NoDepthFormat { ref candidates }) if candidates.len() == 3));
        assert_eq!(allocator.created_count(), 0);
    }

    #[test]
    fn test_missing_feature_is_fatal() {
        let allocator = Rc::new(GfxHeadlessImageAllocator::new());
        let caps = GfxDeviceCaps {
            synchronization2: false,
            ..GfxDeviceCaps::full()
        };
        let result = RenderTargetResources::create(
            EXTENT_1080P,
            &RenderTargetConfig::default(),
            &GfxHeadlessDevice::new(),
            &caps,
            allocator,
        );
        assert!(matches!(result, Err(RenderTargetError::MissingDeviceFeature("synchronization2"))));
    }

    #[test]
    fn test_allocation_failure_leaves_nothing_alive() {
        let allocator = Rc::new(GfxHeadlessImageAllocator::new());
        allocator.fail_on("bloom-1");
        let result = RenderTargetResources::create(
            EXTENT_1080P,
            &RenderTargetConfig::default(),
            &GfxHeadlessDevice::new(),
            &GfxDeviceCaps::full(),
            allocator.clone(),
        );
        match result {
            Err(RenderTargetError::Allocation { resource, .. }) => assert_eq!(resource, "bloom-1"),
            Err(e) => panic!("unexpected error: {e}"),
            Ok(_) => panic!("allocation failure was swallowed"),
        }
        assert!(allocator.created_count() > 0);
        assert_eq!(allocator.live_count(), 0);
    }

    #[test]
    fn test_formats_and_bloom_extents() {
        let allocator = Rc::new(GfxHeadlessImageAllocator::new());
        let resources = headless_resources(&GfxHeadlessDevice::new(), &allocator);

        assert_eq!(resources.format(RtImageId::GBuffer(3)), GBUFFER_FORMAT);
        assert_eq!(resources.format(RtImageId::SmaaEdges), vk::Format::R8G8_UNORM);
        assert_eq!(resources.format(RtImageId::SceneColorCapture(2)), vk::Format::B8G8R8A8_SRGB);
        assert_eq!(resources.format(RtImageId::Swapchain(0)), vk::Format::B8G8R8A8_SRGB);

        assert_eq!(resources.bloom_mip_levels(), 4);
        assert_eq!(resources.mip_levels(RtImageId::Bloom(1)), 4);
        assert_eq!(
            resources.extent(RtSubresource::new(RtImageId::Bloom(0), 0)),
            vk::Extent2D { width: 960, height: 540 }
        );
        assert_eq!(
            resources.extent(RtSubresource::new(RtImageId::Bloom(0), 3)),
            vk::Extent2D { width: 120, height: 67 }
        );
        assert_ne!(
            resources.view(RtSubresource::new(RtImageId::Bloom(0), 1)),
            resources.view(RtSubresource::new(RtImageId::Bloom(0), 2))
        );

        // 16 个跟随分辨率的资源 + 3 个 capture
        assert_eq!(allocator.live_count(), 19);
        destroy_all(resources);
        assert_eq!(allocator.live_count(), 0);
    }

    #[test]
    fn test_bloom_mips_clamped_for_tiny_extent() {
        let allocator = Rc::new(GfxHeadlessImageAllocator::new());
        let config = RenderTargetConfig {
            bloom_mip_levels: 10,
            ..Default::default()
        };
        let resources = RenderTargetResources::create(
            vk::Extent2D { width: 8, height: 4 },
            &config,
            &GfxHeadlessDevice::new(),
            &GfxDeviceCaps::full(),
            allocator.clone(),
        )
        .unwrap();
        // 半分辨率 4x2：4, 2, 1
        assert_eq!(resources.bloom_mip_levels(), 3);
        assert_eq!(
            resources.extent(RtSubresource::new(RtImageId::Bloom(1), 2)),
            vk::Extent2D { width: 1, height: 1 }
        );
        destroy_all(resources);
    }

    #[test]
    fn test_transition_skips_same_layout_and_batches() {
        let allocator = Rc::new(GfxHeadlessImageAllocator::new());
        let mut resources = headless_resources(&GfxHeadlessDevice::new(), &allocator);
        let cmd = GfxRecordingCommandStream::new();

        resources.set_layout(RtImageId::SceneHdr, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
        let emitted = resources.transition(
            &cmd,
            &[
                LayoutRequest::new(RtImageId::SceneHdr, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL),
                LayoutRequest::new(RtImageId::PostLdr, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL),
                LayoutRequest::new(RtImageId::MainDepth, vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL),
            ],
        );
        assert_eq!(emitted, 2);
        let batches = cmd.barrier_batches();
        assert_eq!(batches.len(), 1);
        assert!(batches[0].iter().all(|b| b.image != resources.vk_image(RtImageId::SceneHdr)));

        // 全部已经就绪：不发出任何命令
        let emitted = resources.transition(
            &cmd,
            &[LayoutRequest::new(RtImageId::PostLdr, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)],
        );
        assert_eq!(emitted, 0);
        assert_eq!(cmd.barrier_batches().len(), 1);
        destroy_all(resources);
    }

    #[test]
    fn test_every_assigned_layout_has_exact_table_masks() {
        let allocator = Rc::new(GfxHeadlessImageAllocator::new());
        let mut resources = headless_resources(&GfxHeadlessDevice::new(), &allocator);
        let cmd = GfxRecordingCommandStream::new();

        let mut previous = vk::ImageLayout::UNDEFINED;
        for layout in [
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        ] {
            cmd.clear();
            resources.transition(&cmd, &[LayoutRequest::new(RtImageId::SceneHdr, layout)]);
            let barrier = cmd.barriers()[0];
            assert_eq!(barrier.old_layout, previous);
            assert_eq!(barrier.dst_stage, stage_access_for_layout(layout).stage);
            assert_eq!(barrier.dst_access, stage_access_for_layout(layout).access);
            assert_eq!(barrier.src_access, stage_access_for_layout(previous).src_access());
            previous = layout;
        }
        destroy_all(resources);
    }

    #[test]
    fn test_swapchain_barrier_waits_on_color_output() {
        let allocator = Rc::new(GfxHeadlessImageAllocator::new());
        let mut resources = headless_resources(&GfxHeadlessDevice::new(), &allocator);
        let cmd = GfxRecordingCommandStream::new();

        resources.transition(
            &cmd,
            &[LayoutRequest::new(RtImageId::Swapchain(1), vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)],
        );
        let barrier = cmd.barriers()[0];
        assert_eq!(barrier.image, resources.vk_image(RtImageId::Swapchain(1)));
        assert_eq!(barrier.src_stage, vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT);
        assert!(barrier.src_access.is_empty());
        destroy_all(resources);
    }

    #[test]
    fn test_resize_resets_every_layout_and_defers_release() {
        let allocator = Rc::new(GfxHeadlessImageAllocator::new());
        let mut resources = headless_resources(&GfxHeadlessDevice::new(), &allocator);
        let cmd = GfxRecordingCommandStream::new();
        let old_depth = resources.vk_image(RtImageId::MainDepth);

        resources.transition(
            &cmd,
            &[
                LayoutRequest::new(RtImageId::Swapchain(0), vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL),
                LayoutRequest::new(RtImageId::MainDepth, vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL),
                LayoutRequest::new(RtImageId::SceneColorCapture(0), vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL),
            ],
        );

        let mut queue = DeferredReleaseQueue::new();
        resources
            .resize(vk::Extent2D { width: 2560, height: 1440 }, 7, &mut queue)
            .unwrap();

        assert!(resources.layouts().iter().all(|(_, layout)| layout == vk::ImageLayout::UNDEFINED));
        assert_ne!(resources.vk_image(RtImageId::MainDepth), old_depth);
        assert_eq!(resources.extent(RtImageId::SceneHdr), vk::Extent2D { width: 2560, height: 1440 });

        // 旧资源在 serial 7 完成之前不会释放
        let live_before = allocator.live_count();
        assert_eq!(queue.collect(6), 0);
        assert_eq!(queue.collect(7), 16);
        assert_eq!(allocator.live_count(), live_before - 16);

        destroy_all(resources);
    }

    #[test]
    fn test_swapchain_generation_change() {
        let allocator = Rc::new(GfxHeadlessImageAllocator::new());
        let mut resources = headless_resources(&GfxHeadlessDevice::new(), &allocator);
        let cmd = GfxRecordingCommandStream::new();
        let mut queue = DeferredReleaseQueue::new();

        resources.transition(
            &cmd,
            &[LayoutRequest::new(RtImageId::Swapchain(2), vk::ImageLayout::PRESENT_SRC_KHR)],
        );

        // 同一个 generation：什么都不变
        resources.set_swapchain(swapchain_images(3, 1, EXTENT_1080P), 3, &mut queue).unwrap();
        assert_eq!(resources.current_layout(RtImageId::Swapchain(2)), vk::ImageLayout::PRESENT_SRC_KHR);
        assert!(queue.is_empty());

        // 新的 generation，image 数量也变了
        resources.set_swapchain(swapchain_images(2, 2, EXTENT_1080P), 4, &mut queue).unwrap();
        assert_eq!(resources.swapchain_generation(), Some(2));
        assert_eq!(resources.swapchain_image_count(), 2);
        assert_eq!(resources.current_layout(RtImageId::Swapchain(1)), vk::ImageLayout::UNDEFINED);
        assert!(!resources.contains(RtImageId::Swapchain(2)));
        assert!(!resources.contains(RtImageId::SceneColorCapture(2)));
        assert!(resources.contains(RtImageId::SceneColorCapture(1)));
        assert_eq!(queue.len(), 3);

        queue.clear();
        destroy_all(resources);
        assert_eq!(allocator.live_count(), 0);
    }
}
