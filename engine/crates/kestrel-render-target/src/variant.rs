//! 所有可选择的 attachment 组合
//!
//! 每个 variant 的 attachment 列表都是固定的，运行时只有 load op 与少数子索引（mip、ping-pong slot、深度来源）会变化。

use std::fmt;

use ash::vk;

use crate::{
    contract::AttachmentContract,
    resources::{
        BLOOM_PING_PONG_COUNT, DepthFormatInfo, GBUFFER_COUNT, GBUFFER_EMISSIVE_INDEX, RenderTargetResources,
        RtImageId, RtSubresource,
    },
};

/// 带深度的 variant 绑定哪一张深度
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DepthSource {
    Main,
    Cockpit,
}
impl DepthSource {
    #[inline]
    pub fn image(self) -> RtImageId {
        match self {
            Self::Main => RtImageId::MainDepth,
            Self::Cockpit => RtImageId::CockpitDepth,
        }
    }
}

/// 证明深度已经被转换为只读，只能由 [`crate::depth_sampling::DepthSamplingScope`] 创建
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DepthReadOnly {
    _private: (),
}
impl DepthReadOnly {
    #[inline]
    pub(crate) fn new() -> Self {
        Self { _private: () }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RenderTargetVariant {
    /// 默认的呈现目标
    SwapchainWithDepth { depth: DepthSource },
    /// 延迟光照会覆盖每个像素，颜色默认 DONT_CARE
    SwapchainNoDepth,
    SceneHdrWithDepth { depth: DepthSource },
    SceneHdrNoDepth,
    /// 5 个 G-buffer + 主深度
    DeferredGBuffer,
    /// 与 DeferredGBuffer 相同的颜色，主深度只读
    DecalGBuffer(DepthReadOnly),
    GBufferEmissive,
    PostLdr,
    PostLuminance,
    SmaaEdges,
    SmaaBlend,
    SmaaOutput,
    BloomMip { slot: u8, mip: u32 },
}
impl Default for RenderTargetVariant {
    fn default() -> Self {
        Self::SwapchainWithDepth {
            depth: DepthSource::Main,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ColorAttachmentSlot {
    pub target: RtSubresource,
    /// 选中之后第一次打开且没有 pending clear 时使用的 load op，重新打开总是 LOAD
    /// 没有 pending clear 时使用的 load op
    pub default_load_op: vk::AttachmentLoadOp,
    pub store_op: vk::AttachmentStoreOp,
}
impl ColorAttachmentSlot {
    #[inline]
    fn load(target: impl Into<RtSubresource>) -> Self {
        Self {
            target: target.into(),
            default_load_op: vk::AttachmentLoadOp::LOAD,
            store_op: vk::AttachmentStoreOp::STORE,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DepthAttachmentSlot {
    pub target: RtSubresource,
    pub layout: vk::ImageLayout,
    /// 只读时永远 LOAD，不写回
    pub read_only: bool,
    pub store_op: vk::AttachmentStoreOp,
}

/// 一个 variant 展开后的 attachment 列表
#[derive(Clone, Debug, PartialEq)]
pub struct VariantAttachments {
    pub colors: Vec<ColorAttachmentSlot>,
    pub depth: Option<DepthAttachmentSlot>,
    /// 覆盖 session 的 clear color
    pub clear_color: Option<glam::Vec4>,
}
// attachments
impl RenderTargetVariant {
    /// 展开 attachment 列表
    ///
    /// `swapchain_index` 为当前帧获取的 swapchain image
    pub fn attachments(&self, depth: &DepthFormatInfo, swapchain_index: u32) -> VariantAttachments {
        let writable_depth = |source: DepthSource| DepthAttachmentSlot {
            target: source.image().into(),
            layout: depth.attachment_layout,
            read_only: false,
            store_op: vk::AttachmentStoreOp::STORE,
        };
        let gbuffers = || {
            (0..GBUFFER_COUNT as u8)
                .map(|i| ColorAttachmentSlot::load(RtImageId::GBuffer(i)))
                .collect::<Vec<_>>()
        };
        let single = |id: RtImageId| VariantAttachments {
            colors: vec![ColorAttachmentSlot::load(id)],
            depth: None,
            clear_color: None,
        };

        match *self {
            Self::SwapchainWithDepth { depth: source } => VariantAttachments {
                colors: vec![ColorAttachmentSlot::load(RtImageId::Swapchain(swapchain_index))],
                depth: Some(writable_depth(source)),
                clear_color: None,
            },
            Self::SwapchainNoDepth => VariantAttachments {
                colors: vec![ColorAttachmentSlot {
                    default_load_op: vk::AttachmentLoadOp::DONT_CARE,
                    ..ColorAttachmentSlot::load(RtImageId::Swapchain(swapchain_index))
                }],
                depth: None,
                clear_color: None,
            },
            Self::SceneHdrWithDepth { depth: source } => VariantAttachments {
                colors: vec![ColorAttachmentSlot::load(RtImageId::SceneHdr)],
                depth: Some(writable_depth(source)),
                clear_color: None,
            },
            Self::SceneHdrNoDepth => single(RtImageId::SceneHdr),
            Self::DeferredGBuffer => VariantAttachments {
                colors: gbuffers(),
                depth: Some(writable_depth(DepthSource::Main)),
                clear_color: Some(glam::Vec4::ZERO),
            },
            Self::DecalGBuffer(_) => VariantAttachments {
                colors: gbuffers(),
                depth: Some(DepthAttachmentSlot {
                    target: RtImageId::MainDepth.into(),
                    layout: depth.read_layout,
                    read_only: true,
                    store_op: vk::AttachmentStoreOp::NONE,
                }),
                clear_color: Some(glam::Vec4::ZERO),
            },
            Self::GBufferEmissive => single(RtImageId::GBuffer(GBUFFER_EMISSIVE_INDEX)),
            Self::PostLdr => single(RtImageId::PostLdr),
            Self::PostLuminance => single(RtImageId::PostLuminance),
            Self::SmaaEdges => single(RtImageId::SmaaEdges),
            Self::SmaaBlend => single(RtImageId::SmaaBlend),
            Self::SmaaOutput => single(RtImageId::SmaaOutput),
            Self::BloomMip { slot, mip } => {
                debug_assert!(slot < BLOOM_PING_PONG_COUNT, "bloom slot {slot} out of range");
                VariantAttachments {
                    colors: vec![ColorAttachmentSlot::load(RtSubresource::new(RtImageId::Bloom(slot), mip))],
                    depth: None,
                    clear_color: None,
                }
            }
        }
    }

    /// pipeline 兼容性 key
    pub fn contract(&self, resources: &RenderTargetResources, swapchain_index: u32) -> AttachmentContract {
        let attachments = self.attachments(resources.depth_info(), swapchain_index);
        AttachmentContract {
            color_format: resources.format(attachments.colors[0].target.image),
            color_attachment_count: attachments.colors.len() as u32,
            depth_format: attachments
                .depth
                .map_or(vk::Format::UNDEFINED, |depth| resources.format(depth.target.image)),
        }
    }
}
// queries
impl RenderTargetVariant {
    pub fn name(&self) -> &'static str {
        match self {
            Self::SwapchainWithDepth { .. } => "swapchain-with-depth",
            Self::SwapchainNoDepth => "swapchain-no-depth",
            Self::SceneHdrWithDepth { .. } => "scene-hdr-with-depth",
            Self::SceneHdrNoDepth => "scene-hdr-no-depth",
            Self::DeferredGBuffer => "deferred-gbuffer",
            Self::DecalGBuffer(_) => "decal-gbuffer",
            Self::GBufferEmissive => "gbuffer-emissive",
            Self::PostLdr => "post-ldr",
            Self::PostLuminance => "post-luminance",
            Self::SmaaEdges => "smaa-edges",
            Self::SmaaBlend => "smaa-blend",
            Self::SmaaOutput => "smaa-output",
            Self::BloomMip { .. } => "bloom-mip",
        }
    }

    #[inline]
    pub fn is_swapchain_like(&self) -> bool {
        matches!(self, Self::SwapchainWithDepth { .. } | Self::SwapchainNoDepth)
    }

    #[inline]
    pub fn is_scene_hdr_like(&self) -> bool {
        matches!(self, Self::SceneHdrWithDepth { .. } | Self::SceneHdrNoDepth)
    }

    #[inline]
    pub fn has_depth(&self) -> bool {
        matches!(
            self,
            Self::SwapchainWithDepth { .. }
                | Self::SceneHdrWithDepth { .. }
                | Self::DeferredGBuffer
                | Self::DecalGBuffer(_)
        )
    }

    /// 可切换深度来源的 variant 当前绑定的深度
    pub fn depth_source(&self) -> Option<DepthSource> {
        match self {
            Self::SwapchainWithDepth { depth } | Self::SceneHdrWithDepth { depth } => Some(*depth),
            _ => None,
        }
    }

    /// 替换深度来源，不支持切换的 variant 原样返回
    pub fn with_depth_source(self, source: DepthSource) -> Self {
        match self {
            Self::SwapchainWithDepth { .. } => Self::SwapchainWithDepth { depth: source },
            Self::SceneHdrWithDepth { .. } => Self::SceneHdrWithDepth { depth: source },
            other => other,
        }
    }
}
impl fmt::Display for RenderTargetVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SwapchainWithDepth { depth } | Self::SceneHdrWithDepth { depth } => {
                write!(f, "{}({:?})", self.name(), depth)
            }
            Self::BloomMip { slot, mip } => write!(f, "{}[{}][{}]", self.name(), slot, mip),
            _ => f.write_str(self.name()),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// 除 DecalGBuffer 外的所有 variant
    pub(crate) fn selectable_variants() -> Vec<RenderTargetVariant> {
        vec![
            RenderTargetVariant::SwapchainWithDepth {
                depth: DepthSource::Main,
            },
            RenderTargetVariant::SwapchainWithDepth {
                depth: DepthSource::Cockpit,
            },
            RenderTargetVariant::SwapchainNoDepth,
            RenderTargetVariant::SceneHdrWithDepth {
                depth: DepthSource::Main,
            },
            RenderTargetVariant::SceneHdrNoDepth,
            RenderTargetVariant::DeferredGBuffer,
            RenderTargetVariant::GBufferEmissive,
            RenderTargetVariant::PostLdr,
            RenderTargetVariant::PostLuminance,
            RenderTargetVariant::SmaaEdges,
            RenderTargetVariant::SmaaBlend,
            RenderTargetVariant::SmaaOutput,
            RenderTargetVariant::BloomMip { slot: 1, mip: 2 },
        ]
    }

    #[test]
    fn test_every_variant_has_a_color_attachment() {
        let depth = DepthFormatInfo::from_format(vk::Format::D32_SFLOAT_S8_UINT);
        let mut variants = selectable_variants();
        variants.push(RenderTargetVariant::DecalGBuffer(DepthReadOnly::new()));

        for variant in variants {
            let attachments = variant.attachments(&depth, 0);
            assert!(!attachments.colors.is_empty(), "{variant}");
            assert_eq!(attachments.depth.is_some(), variant.has_depth(), "{variant}");
        }
    }

    #[test]
    fn test_decal_shares_gbuffer_colors_with_read_only_depth() {
        let depth = DepthFormatInfo::from_format(vk::Format::D24_UNORM_S8_UINT);
        let deferred = RenderTargetVariant::DeferredGBuffer.attachments(&depth, 0);
        let decal = RenderTargetVariant::DecalGBuffer(DepthReadOnly::new()).attachments(&depth, 0);

        assert_eq!(deferred.colors, decal.colors);
        assert_eq!(deferred.colors.len(), GBUFFER_COUNT);

        let decal_depth = decal.depth.unwrap();
        assert!(decal_depth.read_only);
        assert_eq!(decal_depth.layout, vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL);
        assert_eq!(decal_depth.target.image, RtImageId::MainDepth);
        assert_eq!(deferred.depth.unwrap().layout, vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL);
    }

    #[test]
    fn test_swapchain_no_depth_defaults_to_dont_care() {
        let depth = DepthFormatInfo::from_format(vk::Format::D32_SFLOAT);
        let attachments = RenderTargetVariant::SwapchainNoDepth.attachments(&depth, 2);
        assert_eq!(attachments.colors[0].target.image, RtImageId::Swapchain(2));
        assert_eq!(attachments.colors[0].default_load_op, vk::AttachmentLoadOp::DONT_CARE);
    }

    #[test]
    fn test_queries() {
        let main = RenderTargetVariant::default();
        assert!(main.is_swapchain_like());
        assert!(!main.is_scene_hdr_like());
        assert_eq!(main.depth_source(), Some(DepthSource::Main));

        let cockpit = main.with_depth_source(DepthSource::Cockpit);
        assert_eq!(cockpit.to_string(), "swapchain-with-depth(Cockpit)");
        assert_eq!(RenderTargetVariant::PostLdr.with_depth_source(DepthSource::Cockpit), RenderTargetVariant::PostLdr);

        assert!(RenderTargetVariant::SceneHdrNoDepth.is_scene_hdr_like());
        assert_eq!(RenderTargetVariant::BloomMip { slot: 0, mip: 3 }.to_string(), "bloom-mip[0][3]");
    }
}
