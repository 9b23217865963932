//! 一帧之内的 render target 状态机
//!
//! `Idle -> VariantSelected -> PassActive`，切换 variant 只改变状态，真正的 layout 转换与
//! begin rendering 推迟到第一次 [`RenderingSession::ensure_active`]。

use ash::vk;
use itertools::Itertools;
use kestrel_gfx::{
    basic::color::LabelColor,
    commands::{command_stream::GfxCommandStream, stage_access::GfxStageAccess},
    foundation::device_caps::{GfxDeviceCaps, GfxExtendedDynamicState3Caps},
    pipelines::rendering_info::GfxRenderingInfo,
};

use crate::{
    config::RenderTargetConfig,
    contract::AttachmentContract,
    deferred_release::DeferredReleaseQueue,
    depth_sampling::{DeferredGeometryPass, DepthMode},
    error::RenderTargetError,
    pass_guard::ActivePassGuard,
    resources::{
        BLOOM_PING_PONG_COUNT, GBUFFER_COUNT, GBUFFER_EMISSIVE_INDEX, LayoutRequest, RenderTargetResources, RtImageId, RtSubresource,
        SwapchainImages,
    },
    variant::{DepthSource, RenderTargetVariant},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    /// 帧之外
    Idle,
    VariantSelected,
    PassActive,
}

/// 下一次 begin rendering 时需要 clear 的 attachment，只生效一次
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct PendingClear {
    /// 按 color attachment 的下标
    colors: u32,
    depth: bool,
    stencil: bool,
}
impl PendingClear {
    const NONE: Self = Self {
        colors: 0,
        depth: false,
        stencil: false,
    };
    const ALL: Self = Self {
        colors: u32::MAX,
        depth: true,
        stencil: true,
    };

    #[inline]
    fn color(&self, index: usize) -> bool {
        self.colors & (1 << index) != 0
    }
}

/// 调用方可以修改的光栅化状态
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RasterState {
    pub cull_mode: vk::CullModeFlags,
    pub depth_test: bool,
    pub depth_write: bool,
}

/// 打开的 pass 中决定 dynamic state 的部分
#[derive(Clone, Copy, Debug)]
struct PassGeometry {
    extent: vk::Extent2D,
    color_count: u32,
    depth_bound: bool,
    depth_read_only: bool,
}

struct ActivePass<C: GfxCommandStream> {
    guard: ActivePassGuard<C>,
    contract: AttachmentContract,
    geometry: PassGeometry,
}

/// render target 的选择与 dynamic rendering 的生命周期
///
/// 同一时刻最多只有一个打开的 pass，由 [`ActivePassGuard`] 保证结束恰好一次
pub struct RenderingSession<C: GfxCommandStream + Clone> {
    resources: RenderTargetResources,
    eds3: GfxExtendedDynamicState3Caps,

    /// 当前帧获取的 swapchain image，`None` 表示在帧之外
    frame: Option<u32>,
    current_variant: RenderTargetVariant,
    /// swapchain / scene-hdr 目标使用的深度
    depth_source: DepthSource,
    active: Option<ActivePass<C>>,

    pending_clear: PendingClear,
    /// 当前 variant 选中之后还没有打开过 pass，attachment 可以使用 variant 默认的 load op
    fresh_selection: bool,
    clear_color: glam::Vec4,
    clear_depth: f32,

    raster: RasterState,
    /// 下一次 ensure_active 需要重新设置 dynamic state
    dynamic_dirty: bool,
    depth_mode: DepthMode,
}
// new & init
impl<C: GfxCommandStream + Clone> RenderingSession<C> {
    pub fn new(resources: RenderTargetResources, caps: &GfxDeviceCaps, config: &RenderTargetConfig) -> Self {
        Self {
            resources,
            eds3: caps.eds3,
            frame: None,
            current_variant: RenderTargetVariant::default(),
            depth_source: DepthSource::Main,
            active: None,
            pending_clear: PendingClear::NONE,
            fresh_selection: true,
            clear_color: config.clear_color(),
            clear_depth: config.clear_depth,
            raster: RasterState {
                cull_mode: config.default_cull_mode.vk_flags(),
                depth_test: true,
                depth_write: true,
            },
            dynamic_dirty: true,
            depth_mode: DepthMode::Writable,
        }
    }
}
// frame
impl<C: GfxCommandStream + Clone> RenderingSession<C> {
    /// 选择默认的 swapchain + 主深度目标，并要求第一个 pass clear 所有 attachment
    ///
    /// 不录制任何命令
    pub fn begin_frame(&mut self, swapchain_index: u32) {
        assert!(self.active.is_none(), "begin_frame called while a rendering pass is still open");
        assert!(
            self.resources.contains(RtImageId::Swapchain(swapchain_index)),
            "swapchain image {swapchain_index} is not registered"
        );
        debug_assert_eq!(self.depth_mode, DepthMode::Writable);

        self.frame = Some(swapchain_index);
        self.current_variant = RenderTargetVariant::default();
        self.depth_source = DepthSource::Main;
        self.pending_clear = PendingClear::ALL;
        self.fresh_selection = true;
        self.dynamic_dirty = true;
        log::debug!("begin frame, swapchain image {}", swapchain_index);
    }

    /// 把本帧的 swapchain image 转换为 PRESENT_SRC
    ///
    /// 打开的 pass 必须先 [`Self::suspend`]；返回发出的 barrier 数量
    pub fn end_frame(&mut self, cmd: &C) -> usize {
        assert!(self.active.is_none(), "end_frame called while a rendering pass is still open");
        let Some(swapchain_index) = self.frame.take() else {
            panic!("end_frame called outside of a frame");
        };

        let count = self.resources.transition(
            cmd,
            &[LayoutRequest::new(RtImageId::Swapchain(swapchain_index), vk::ImageLayout::PRESENT_SRC_KHR)],
        );
        self.pending_clear = PendingClear::NONE;
        log::debug!("end frame, swapchain image {}", swapchain_index);
        count
    }

    /// 录制失败，整个 command buffer 被丢弃之后调用
    ///
    /// 不录制任何命令；所有 layout 回到 UNDEFINED，下一帧从头开始
    pub fn reset_after_abandoned_frame(&mut self) {
        if let Some(active) = self.active.take() {
            active.guard.discard();
        }
        self.resources.reset_all_layouts();
        self.frame = None;
        self.current_variant = RenderTargetVariant::default();
        self.depth_source = DepthSource::Main;
        self.pending_clear = PendingClear::NONE;
        self.fresh_selection = true;
        self.dynamic_dirty = true;
        self.depth_mode = DepthMode::Writable;
        log::warn!("frame abandoned, all render target layouts reset to UNDEFINED");
    }
}
// variant selection
impl<C: GfxCommandStream + Clone> RenderingSession<C> {
    /// 选择下一个 pass 的目标，与当前相同时什么都不做
    ///
    /// decal 目标只能通过 [`DeferredGeometryPass::begin_depth_sampling`] 获得
    pub fn select_variant(&mut self, variant: RenderTargetVariant) {
        assert!(
            !matches!(variant, RenderTargetVariant::DecalGBuffer(_)),
            "decal-gbuffer is only reachable through begin_depth_sampling"
        );
        if let RenderTargetVariant::BloomMip { slot, mip } = variant {
            assert!(slot < BLOOM_PING_PONG_COUNT, "bloom slot {slot} out of range");
            assert!(mip < self.resources.bloom_mip_levels(), "bloom mip {mip} out of range");
        }
        self.select_variant_inner(variant);
    }

    pub(crate) fn select_variant_inner(&mut self, variant: RenderTargetVariant) {
        assert!(self.frame.is_some(), "render target selected outside of a frame");
        if variant == self.current_variant {
            return;
        }

        self.suspend();
        log::debug!("render target: {} -> {}", self.current_variant, variant);
        self.current_variant = variant;
        // pending clear 只属于被替换掉的目标
        self.pending_clear = PendingClear::NONE;
        self.fresh_selection = true;
    }

    pub fn request_swapchain_target(&mut self) {
        self.select_variant(RenderTargetVariant::SwapchainWithDepth {
            depth: self.depth_source,
        });
    }

    /// 每次重新选中时不保留 swapchain 之前的内容，同一次选中内 suspend 之后再打开会 LOAD
    pub fn request_swapchain_no_depth_target(&mut self) {
        self.select_variant(RenderTargetVariant::SwapchainNoDepth);
    }

    pub fn request_scene_hdr_target(&mut self) {
        self.select_variant(RenderTargetVariant::SceneHdrWithDepth {
            depth: self.depth_source,
        });
    }

    pub fn request_scene_hdr_no_depth_target(&mut self) {
        self.select_variant(RenderTargetVariant::SceneHdrNoDepth);
    }

    pub fn request_emissive_target(&mut self) {
        self.select_variant(RenderTargetVariant::GBufferEmissive);
    }

    pub fn request_post_ldr_target(&mut self) {
        self.select_variant(RenderTargetVariant::PostLdr);
    }

    pub fn request_post_luminance_target(&mut self) {
        self.select_variant(RenderTargetVariant::PostLuminance);
    }

    pub fn request_smaa_edges_target(&mut self) {
        self.select_variant(RenderTargetVariant::SmaaEdges);
    }

    pub fn request_smaa_blend_target(&mut self) {
        self.select_variant(RenderTargetVariant::SmaaBlend);
    }

    pub fn request_smaa_output_target(&mut self) {
        self.select_variant(RenderTargetVariant::SmaaOutput);
    }

    pub fn request_bloom_mip_target(&mut self, slot: u8, mip: u32) {
        self.select_variant(RenderTargetVariant::BloomMip { slot, mip });
    }

    /// 开始 G-buffer 几何 pass
    ///
    /// `clear_non_color` 为 true 时，除第 0 个 G-buffer 之外的颜色以及深度、stencil 都会被 clear。
    /// `preserve_emissive` 保留预先写入 emissive G-buffer 的内容，参见 [`Self::copy_scene_hdr_to_emissive`]
    pub fn begin_deferred_pass(
        &mut self,
        clear_non_color: bool,
        preserve_emissive: bool,
    ) -> DeferredGeometryPass<'_, C> {
        // 已经打开的 G-buffer pass 不会再应用 clear
        self.suspend();
        self.select_variant_inner(RenderTargetVariant::DeferredGBuffer);
        if clear_non_color {
            let mut colors = ((1 << GBUFFER_COUNT) - 1) & !1;
            if preserve_emissive {
                colors &= !(1 << GBUFFER_EMISSIVE_INDEX);
            }
            self.pending_clear.colors |= colors;
            self.pending_clear.depth = true;
            self.pending_clear.stencil = true;
        }
        DeferredGeometryPass::new(self)
    }

    /// 座舱深度
    pub fn use_cockpit_depth(&mut self) {
        self.use_depth_source(DepthSource::Cockpit);
    }

    pub fn use_main_depth(&mut self) {
        self.use_depth_source(DepthSource::Main);
    }

    fn use_depth_source(&mut self, source: DepthSource) {
        if self.depth_source == source {
            return;
        }
        self.depth_source = source;
        if self.current_variant.depth_source().is_some() {
            self.select_variant_inner(self.current_variant.with_depth_source(source));
        }
    }
}
// pass
impl<C: GfxCommandStream + Clone> RenderingSession<C> {
    /// 保证有一个以当前 variant 为目标的 pass 处于打开状态
    ///
    /// 已经打开时只在光栅化状态变化后重新设置 dynamic state。
    /// 否则把所有 attachment 转换到 attachment layout，begin rendering，并设置全部 dynamic state
    pub fn ensure_active(&mut self, cmd: &C) -> AttachmentContract {
        let Some(swapchain_index) = self.frame else {
            panic!("ensure_active called outside of a frame");
        };

        if let Some(active) = &self.active {
            let (contract, geometry) = (active.contract, active.geometry);
            if self.dynamic_dirty {
                self.apply_dynamic_state(cmd, geometry);
            }
            return contract;
        }

        let depth_info = *self.resources.depth_info();
        let attachments = self.current_variant.attachments(&depth_info, swapchain_index);
        if let Some(depth) = &attachments.depth {
            assert!(
                depth.read_only || self.depth_mode == DepthMode::Writable,
                "{} writes depth while depth is read-only for sampling",
                self.current_variant
            );
        }

        let mut requests = attachments
            .colors
            .iter()
            .map(|color| LayoutRequest::new(color.target, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL))
            .collect_vec();
        if let Some(depth) = &attachments.depth {
            requests.push(LayoutRequest::new(depth.target, depth.layout));
        }
        self.resources.transition(cmd, &requests);

        let extent = self.resources.extent(attachments.colors[0].target);
        let clear_color = attachments.clear_color.unwrap_or(self.clear_color);
        let pending = std::mem::replace(&mut self.pending_clear, PendingClear::NONE);
        // 同一个 variant 重新打开时必须保留之前的内容
        let fresh = std::mem::replace(&mut self.fresh_selection, false);

        let mut rendering_info = GfxRenderingInfo::new(extent);
        for (index, color) in attachments.colors.iter().enumerate() {
            let load_op = match (pending.color(index), fresh) {
                (true, _) => vk::AttachmentLoadOp::CLEAR,
                (false, true) => color.default_load_op,
                (false, false) => vk::AttachmentLoadOp::LOAD,
            };
            rendering_info = rendering_info.color_attachment(
                self.resources.view(color.target),
                vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
                load_op,
                color.store_op,
                clear_color,
            );
        }
        if let Some(depth) = &attachments.depth {
            let view = self.resources.view(depth.target);
            // 只读深度永远 LOAD
            let load_op = |clear: bool| {
                if clear && !depth.read_only { vk::AttachmentLoadOp::CLEAR } else { vk::AttachmentLoadOp::LOAD }
            };
            rendering_info =
                rendering_info.depth_attachment(view, depth.layout, load_op(pending.depth), depth.store_op, self.clear_depth);
            if depth_info.has_stencil {
                rendering_info =
                    rendering_info.stencil_attachment(view, depth.layout, load_op(pending.stencil), depth.store_op);
            }
        }

        let contract = self.current_variant.contract(&self.resources, swapchain_index);
        let geometry = PassGeometry {
            extent,
            color_count: attachments.colors.len() as u32,
            depth_bound: attachments.depth.is_some(),
            depth_read_only: attachments.depth.is_some_and(|depth| depth.read_only),
        };

        log::debug!("begin rendering {}: {}x{}", self.current_variant, extent.width, extent.height);
        let guard = ActivePassGuard::begin(cmd.clone(), &rendering_info, self.current_variant.name());
        self.active = Some(ActivePass {
            guard,
            contract,
            geometry,
        });
        self.apply_dynamic_state(cmd, geometry);
        contract
    }

    /// 结束打开的 pass，没有打开的 pass 时什么都不做
    ///
    /// variant 保持不变，下一次 ensure_active 会以 LOAD 重新打开
    pub fn suspend(&mut self) {
        if let Some(active) = self.active.take() {
            log::debug!("end rendering {}", self.current_variant);
            active.guard.end();
        }
    }

    /// 需要打开的 pass 的操作（例如 draw）调用，没有打开的 pass 时 panic
    pub fn require_active(&self) -> AttachmentContract {
        match &self.active {
            Some(active) => active.contract,
            None => panic!("draw recorded while no rendering pass is open"),
        }
    }

    fn apply_dynamic_state(&mut self, cmd: &C, geometry: PassGeometry) {
        let width = geometry.extent.width as f32;
        let height = geometry.extent.height as f32;
        // y 轴翻转
        cmd.cmd_set_viewport(
            0,
            &[vk::Viewport {
                x: 0.0,
                y: height,
                width,
                height: -height,
                min_depth: 0.0,
                max_depth: 1.0,
            }],
        );
        cmd.cmd_set_scissor(
            0,
            &[vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent: geometry.extent,
            }],
        );

        cmd.cmd_set_cull_mode(self.raster.cull_mode);
        cmd.cmd_set_front_face(vk::FrontFace::CLOCKWISE);
        cmd.cmd_set_primitive_topology(vk::PrimitiveTopology::TRIANGLE_LIST);

        let depth_test = geometry.depth_bound && self.raster.depth_test;
        let depth_write = depth_test && !geometry.depth_read_only && self.raster.depth_write;
        cmd.cmd_set_depth_test_enable(depth_test);
        cmd.cmd_set_depth_write_enable(depth_write);
        cmd.cmd_set_depth_compare_op(if depth_test { vk::CompareOp::LESS_OR_EQUAL } else { vk::CompareOp::ALWAYS });
        cmd.cmd_set_stencil_test_enable(false);

        let color_count = geometry.color_count as usize;
        if self.eds3.color_blend_enable {
            cmd.cmd_set_color_blend_enable(0, &vec![false; color_count]);
        }
        if self.eds3.color_write_mask {
            cmd.cmd_set_color_write_mask(0, &vec![vk::ColorComponentFlags::RGBA; color_count]);
        }
        if self.eds3.polygon_mode {
            cmd.cmd_set_polygon_mode(vk::PolygonMode::FILL);
        }
        if self.eds3.rasterization_samples {
            cmd.cmd_set_rasterization_samples(vk::SampleCountFlags::TYPE_1);
        }

        self.dynamic_dirty = false;
    }
}
// raster & clear
impl<C: GfxCommandStream + Clone> RenderingSession<C> {
    pub fn set_cull_mode(&mut self, cull_mode: vk::CullModeFlags) {
        if self.raster.cull_mode != cull_mode {
            self.raster.cull_mode = cull_mode;
            self.dynamic_dirty = true;
        }
    }

    pub fn set_depth_test(&mut self, enable: bool) {
        if self.raster.depth_test != enable {
            self.raster.depth_test = enable;
            self.dynamic_dirty = true;
        }
    }

    pub fn set_depth_write(&mut self, enable: bool) {
        if self.raster.depth_write != enable {
            self.raster.depth_write = enable;
            self.dynamic_dirty = true;
        }
    }

    /// 下一次 begin rendering 时 clear 所有 attachment
    ///
    /// 对已经打开的 pass 没有影响
    pub fn request_clear(&mut self) {
        self.pending_clear = PendingClear::ALL;
    }

    pub fn request_depth_clear(&mut self) {
        self.pending_clear.depth = true;
        self.pending_clear.stencil = true;
    }

    pub fn set_clear_color(&mut self, clear_color: glam::Vec4) {
        self.clear_color = clear_color;
    }

    pub fn set_clear_depth(&mut self, clear_depth: f32) {
        self.clear_depth = clear_depth;
    }
}
// explicit transitions
impl<C: GfxCommandStream + Clone> RenderingSession<C> {
    /// 把一张 render target 的所有 mip 转换为 shader 可读
    ///
    /// 深度使用只读的 depth-stencil layout；返回发出的 barrier 数量
    pub fn transition_to_shader_read(&mut self, cmd: &C, image: RtImageId) -> usize {
        assert!(!image.is_swapchain(), "swapchain images are never sampled");
        self.suspend();

        let layout =
            if image.is_depth() { self.resources.depth_read_layout() } else { vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL };
        let requests = (0..self.resources.mip_levels(image))
            .map(|mip| LayoutRequest::new(RtSubresource::new(image, mip), layout))
            .collect_vec();
        self.resources.transition(cmd, &requests)
    }

    pub fn transition_scene_hdr_to_shader_read(&mut self, cmd: &C) -> usize {
        self.transition_to_shader_read(cmd, RtImageId::SceneHdr)
    }

    pub fn transition_post_ldr_to_shader_read(&mut self, cmd: &C) -> usize {
        self.transition_to_shader_read(cmd, RtImageId::PostLdr)
    }

    pub fn transition_post_luminance_to_shader_read(&mut self, cmd: &C) -> usize {
        self.transition_to_shader_read(cmd, RtImageId::PostLuminance)
    }

    pub fn transition_bloom_to_shader_read(&mut self, cmd: &C, slot: u8) -> usize {
        assert!(slot < BLOOM_PING_PONG_COUNT, "bloom slot {slot} out of range");
        self.transition_to_shader_read(cmd, RtImageId::Bloom(slot))
    }

    pub fn transition_smaa_edges_to_shader_read(&mut self, cmd: &C) -> usize {
        self.transition_to_shader_read(cmd, RtImageId::SmaaEdges)
    }

    pub fn transition_smaa_blend_to_shader_read(&mut self, cmd: &C) -> usize {
        self.transition_to_shader_read(cmd, RtImageId::SmaaBlend)
    }

    pub fn transition_smaa_output_to_shader_read(&mut self, cmd: &C) -> usize {
        self.transition_to_shader_read(cmd, RtImageId::SmaaOutput)
    }

    pub fn transition_main_depth_to_shader_read(&mut self, cmd: &C) -> usize {
        self.transition_to_shader_read(cmd, RtImageId::MainDepth)
    }

    pub fn transition_cockpit_depth_to_shader_read(&mut self, cmd: &C) -> usize {
        self.transition_to_shader_read(cmd, RtImageId::CockpitDepth)
    }

    /// 交给 upscaler 读取，等待的 stage/access 由调用方决定
    pub fn transition_for_upscaler(
        &mut self,
        cmd: &C,
        image: RtImageId,
        dst_stage: vk::PipelineStageFlags2,
        dst_access: vk::AccessFlags2,
    ) -> usize {
        assert!(!image.is_swapchain(), "swapchain images are never read by the upscaler");
        self.suspend();

        let layout =
            if image.is_depth() { self.resources.depth_read_layout() } else { vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL };
        self.resources.transition(
            cmd,
            &[LayoutRequest::new(image, layout).with_dst(GfxStageAccess::new(dst_stage, dst_access))],
        )
    }
}
// copies
impl<C: GfxCommandStream + Clone> RenderingSession<C> {
    /// SceneHdr 拷贝到 SceneEffect，之后 SceneEffect 可被采样
    pub fn copy_scene_hdr_to_effect(&mut self, cmd: &C) {
        self.copy_image(
            cmd,
            RtImageId::SceneHdr,
            RtImageId::SceneEffect,
            None,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        );
    }

    /// 把当前 swapchain image 的内容保存到对应的 capture image
    pub fn capture_swapchain_color(&mut self, cmd: &C) {
        let Some(swapchain_index) = self.frame else {
            panic!("capture_swapchain_color called outside of a frame");
        };
        assert!(self.resources.has_scene_color_capture(), "scene color capture is disabled");
        self.copy_image(
            cmd,
            RtImageId::Swapchain(swapchain_index),
            RtImageId::SceneColorCapture(swapchain_index),
            None,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        );
    }

    /// SceneHdr 预先写入 emissive G-buffer，随后的 G-buffer pass 需要 `preserve_emissive`
    pub fn copy_scene_hdr_to_emissive(&mut self, cmd: &C) {
        self.copy_image(
            cmd,
            RtImageId::SceneHdr,
            RtImageId::GBuffer(GBUFFER_EMISSIVE_INDEX),
            Some(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL),
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        );
    }

    /// 本帧 capture 的 swapchain 颜色写入 emissive G-buffer
    ///
    /// 需要先 [`Self::capture_swapchain_color`]；格式不同，使用 blit
    pub fn copy_scene_color_capture_to_emissive(&mut self, cmd: &C) {
        let Some(swapchain_index) = self.frame else {
            panic!("copy_scene_color_capture_to_emissive called outside of a frame");
        };
        assert!(self.resources.has_scene_color_capture(), "scene color capture is disabled");
        self.copy_image(
            cmd,
            RtImageId::SceneColorCapture(swapchain_index),
            RtImageId::GBuffer(GBUFFER_EMISSIVE_INDEX),
            Some(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL),
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        );
    }

    /// 两张深度在拷贝之后都回到 attachment layout
    pub fn copy_main_depth_to_cockpit(&mut self, cmd: &C) {
        let layout = self.resources.depth_attachment_layout();
        self.copy_image(cmd, RtImageId::MainDepth, RtImageId::CockpitDepth, Some(layout), layout);
    }

    pub fn copy_cockpit_depth_to_main(&mut self, cmd: &C) {
        let layout = self.resources.depth_attachment_layout();
        self.copy_image(cmd, RtImageId::CockpitDepth, RtImageId::MainDepth, Some(layout), layout);
    }

    fn copy_image(
        &mut self,
        cmd: &C,
        src: RtImageId,
        dst: RtImageId,
        src_final: Option<vk::ImageLayout>,
        dst_final: vk::ImageLayout,
    ) {
        self.suspend();
        self.resources.transition(
            cmd,
            &[
                LayoutRequest::new(src, vk::ImageLayout::TRANSFER_SRC_OPTIMAL),
                LayoutRequest::new(dst, vk::ImageLayout::TRANSFER_DST_OPTIMAL),
            ],
        );

        let (src_extent, dst_extent) = (self.resources.extent(src), self.resources.extent(dst));
        let layers = vk::ImageSubresourceLayers {
            aspect_mask: self.resources.aspect(src),
            mip_level: 0,
            base_array_layer: 0,
            layer_count: 1,
        };

        cmd.begin_label(&format!("copy {src} -> {dst}"), LabelColor::COLOR_COPY);
        if self.resources.format(src) == self.resources.format(dst) && src_extent == dst_extent {
            let region = vk::ImageCopy2::default().src_subresource(layers).dst_subresource(layers).extent(vk::Extent3D {
                width: src_extent.width,
                height: src_extent.height,
                depth: 1,
            });
            cmd.cmd_copy_image(
                self.resources.vk_image(src),
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                self.resources.vk_image(dst),
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                std::slice::from_ref(&region),
            );
        } else {
            // 格式或尺寸不同，只支持颜色
            debug_assert_eq!(layers.aspect_mask, vk::ImageAspectFlags::COLOR, "blit between {src} and {dst}");
            let corners = |extent: vk::Extent2D| {
                [
                    vk::Offset3D::default(),
                    vk::Offset3D {
                        x: extent.width as i32,
                        y: extent.height as i32,
                        z: 1,
                    },
                ]
            };
            let region = vk::ImageBlit2::default()
                .src_subresource(layers)
                .src_offsets(corners(src_extent))
                .dst_subresource(layers)
                .dst_offsets(corners(dst_extent));
            cmd.cmd_blit_image(
                self.resources.vk_image(src),
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                self.resources.vk_image(dst),
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                std::slice::from_ref(&region),
                vk::Filter::LINEAR,
            );
        }
        cmd.end_label();

        let mut requests = vec![LayoutRequest::new(dst, dst_final)];
        if let Some(src_final) = src_final {
            requests.push(LayoutRequest::new(src, src_final));
        }
        self.resources.transition(cmd, &requests);
    }
}
// resources
impl<C: GfxCommandStream + Clone> RenderingSession<C> {
    /// 只能在没有打开的 pass 时调用
    ///
    /// 帧内的 variant 回到默认目标，旧的 variant 可能引用已经不存在的 bloom mip
    pub fn resize(
        &mut self,
        extent: vk::Extent2D,
        retire_serial: u64,
        release_queue: &mut DeferredReleaseQueue,
    ) -> Result<(), RenderTargetError> {
        assert!(self.active.is_none(), "resize while a rendering pass is open");
        self.resources.resize(extent, retire_serial, release_queue)?;

        let default = RenderTargetVariant::default();
        if self.current_variant != default {
            log::debug!("render target: {} -> {} (resize)", self.current_variant, default);
            self.current_variant = default;
            self.pending_clear = PendingClear::NONE;
        }
        self.depth_source = DepthSource::Main;
        self.fresh_selection = true;
        self.dynamic_dirty = true;
        Ok(())
    }

    pub fn set_swapchain(
        &mut self,
        swapchain: SwapchainImages,
        retire_serial: u64,
        release_queue: &mut DeferredReleaseQueue,
    ) -> Result<(), RenderTargetError> {
        assert!(self.active.is_none(), "swapchain replaced while a rendering pass is open");
        self.resources.set_swapchain(swapchain, retire_serial, release_queue)
    }

    pub fn destroy(&mut self, retire_serial: u64, release_queue: &mut DeferredReleaseQueue) {
        assert!(self.active.is_none(), "destroy while a rendering pass is open");
        self.frame = None;
        self.resources.destroy(retire_serial, release_queue);
    }
}
// getters
impl<C: GfxCommandStream + Clone> RenderingSession<C> {
    pub fn state(&self) -> SessionState {
        if self.active.is_some() {
            SessionState::PassActive
        } else if self.frame.is_some() {
            SessionState::VariantSelected
        } else {
            SessionState::Idle
        }
    }

    #[inline]
    pub fn current_variant(&self) -> RenderTargetVariant {
        self.current_variant
    }

    pub fn variant_name(&self) -> String {
        self.current_variant.to_string()
    }

    #[inline]
    pub fn target_is_swapchain(&self) -> bool {
        self.current_variant.is_swapchain_like()
    }

    #[inline]
    pub fn target_is_scene_hdr(&self) -> bool {
        self.current_variant.is_scene_hdr_like()
    }

    #[inline]
    pub fn rendering_active(&self) -> bool {
        self.active.is_some()
    }

    #[inline]
    pub fn swapchain_index(&self) -> Option<u32> {
        self.frame
    }

    #[inline]
    pub fn raster_state(&self) -> RasterState {
        self.raster
    }

    #[inline]
    pub fn depth_mode(&self) -> DepthMode {
        self.depth_mode
    }

    #[inline]
    pub fn resources(&self) -> &RenderTargetResources {
        &self.resources
    }

    #[inline]
    pub(crate) fn resources_mut(&mut self) -> &mut RenderTargetResources {
        &mut self.resources
    }

    #[inline]
    pub(crate) fn set_depth_mode(&mut self, depth_mode: DepthMode) {
        self.depth_mode = depth_mode;
    }
}
