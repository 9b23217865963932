//! 不依赖 GPU 的命令流：只把命令记录下来
//!
//! 用于单元测试以及 `frame-trace` 工具，记录的内容足以还原每个 barrier 和每个 pass 的 attachment。

use std::{cell::RefCell, rc::Rc};

use ash::vk;

use crate::{
    commands::{barrier::GfxImageBarrier, command_stream::GfxCommandStream},
    pipelines::rendering_info::GfxRenderingInfo,
};

/// 一条被记录的 image barrier
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GfxRecordedBarrier {
    pub image: vk::Image,
    pub old_layout: vk::ImageLayout,
    pub new_layout: vk::ImageLayout,
    pub aspect: vk::ImageAspectFlags,
    pub base_mip: u32,
    pub mip_count: u32,
    pub src_stage: vk::PipelineStageFlags2,
    pub src_access: vk::AccessFlags2,
    pub dst_stage: vk::PipelineStageFlags2,
    pub dst_access: vk::AccessFlags2,
}
impl From<&GfxImageBarrier> for GfxRecordedBarrier {
    fn from(barrier: &GfxImageBarrier) -> Self {
        let range = barrier.subresource_range();
        Self {
            image: barrier.vk_image(),
            old_layout: barrier.old_layout(),
            new_layout: barrier.new_layout(),
            aspect: range.aspect_mask,
            base_mip: range.base_mip_level,
            mip_count: range.level_count,
            src_stage: barrier.src().stage,
            src_access: barrier.src().access,
            dst_stage: barrier.dst().stage,
            dst_access: barrier.dst().access,
        }
    }
}

/// 一个被记录的 attachment
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GfxRecordedAttachment {
    pub view: vk::ImageView,
    pub layout: vk::ImageLayout,
    pub load_op: vk::AttachmentLoadOp,
    pub store_op: vk::AttachmentStoreOp,
}
impl From<&vk::RenderingAttachmentInfo<'_>> for GfxRecordedAttachment {
    fn from(info: &vk::RenderingAttachmentInfo<'_>) -> Self {
        Self {
            view: info.image_view,
            layout: info.image_layout,
            load_op: info.load_op,
            store_op: info.store_op,
        }
    }
}

/// 一次被记录的 begin rendering
#[derive(Clone, Debug, PartialEq)]
pub struct GfxRecordedRendering {
    pub extent: vk::Extent2D,
    pub colors: Vec<GfxRecordedAttachment>,
    pub depth: Option<GfxRecordedAttachment>,
    pub stencil: Option<GfxRecordedAttachment>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum GfxRecordedCmd {
    ImageBarriers(Vec<GfxRecordedBarrier>),
    BeginRendering(GfxRecordedRendering),
    EndRendering,
    SetViewport { x: f32, y: f32, width: f32, height: f32 },
    /// (x, y, width, height)
    SetScissor(i32, i32, u32, u32),
    SetCullMode(vk::CullModeFlags),
    SetFrontFace(vk::FrontFace),
    SetPrimitiveTopology(vk::PrimitiveTopology),
    SetDepthTestEnable(bool),
    SetDepthWriteEnable(bool),
    SetDepthCompareOp(vk::CompareOp),
    SetStencilTestEnable(bool),
    SetColorBlendEnable(Vec<bool>),
    SetColorWriteMask(Vec<vk::ColorComponentFlags>),
    SetPolygonMode(vk::PolygonMode),
    SetRasterizationSamples(vk::SampleCountFlags),
    CopyImage {
        src: vk::Image,
        src_layout: vk::ImageLayout,
        dst: vk::Image,
        dst_layout: vk::ImageLayout,
    },
    BlitImage {
        src: vk::Image,
        src_layout: vk::ImageLayout,
        dst: vk::Image,
        dst_layout: vk::ImageLayout,
        filter: vk::Filter,
    },
    BeginLabel(String),
    EndLabel,
}

/// 记录命令的命令流
///
/// clone 出来的实例共享同一个命令列表
#[derive(Clone, Default)]
pub struct GfxRecordingCommandStream {
    cmds: Rc<RefCell<Vec<GfxRecordedCmd>>>,

    /// 每条命令同时以 info 级别输出
    echo: bool,
}
// new & init
impl GfxRecordingCommandStream {
    pub fn new() -> Self {
        Self::default()
    }

    /// 记录的同时把每条命令输出到日志
    pub fn new_echo() -> Self {
        Self {
            cmds: Default::default(),
            echo: true,
        }
    }

    fn push(&self, cmd: GfxRecordedCmd) {
        if self.echo {
            log::info!("{cmd:?}");
        } else {
            log::trace!("{cmd:?}");
        }
        self.cmds.borrow_mut().push(cmd);
    }
}
// getters
impl GfxRecordingCommandStream {
    /// 当前记录的所有命令的拷贝
    pub fn commands(&self) -> Vec<GfxRecordedCmd> {
        self.cmds.borrow().clone()
    }

    /// 取出所有命令并清空
    pub fn take(&self) -> Vec<GfxRecordedCmd> {
        std::mem::take(&mut *self.cmds.borrow_mut())
    }

    pub fn clear(&self) {
        self.cmds.borrow_mut().clear();
    }

    pub fn len(&self) -> usize {
        self.cmds.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.cmds.borrow().is_empty()
    }

    /// 每次 `cmd_image_barriers` 调用对应一个 batch
    pub fn barrier_batches(&self) -> Vec<Vec<GfxRecordedBarrier>> {
        self.cmds
            .borrow()
            .iter()
            .filter_map(|cmd| match cmd {
                GfxRecordedCmd::ImageBarriers(batch) => Some(batch.clone()),
                _ => None,
            })
            .collect()
    }

    /// 所有 barrier 展开后的列表
    pub fn barriers(&self) -> Vec<GfxRecordedBarrier> {
        self.barrier_batches().into_iter().flatten().collect()
    }

    pub fn renderings(&self) -> Vec<GfxRecordedRendering> {
        self.cmds
            .borrow()
            .iter()
            .filter_map(|cmd| match cmd {
                GfxRecordedCmd::BeginRendering(rendering) => Some(rendering.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn begin_rendering_count(&self) -> usize {
        self.count(|cmd| matches!(cmd, GfxRecordedCmd::BeginRendering(_)))
    }

    pub fn end_rendering_count(&self) -> usize {
        self.count(|cmd| matches!(cmd, GfxRecordedCmd::EndRendering))
    }

    pub fn count(&self, pred: impl Fn(&GfxRecordedCmd) -> bool) -> usize {
        self.cmds.borrow().iter().filter(|cmd| pred(cmd)).count()
    }
}
impl GfxCommandStream for GfxRecordingCommandStream {
    fn cmd_image_barriers(&self, _dependency_flags: vk::DependencyFlags, barriers: &[GfxImageBarrier]) {
        self.push(GfxRecordedCmd::ImageBarriers(barriers.iter().map(GfxRecordedBarrier::from).collect()));
    }

    fn cmd_begin_rendering(&self, rendering_info: &GfxRenderingInfo) {
        self.push(GfxRecordedCmd::BeginRendering(GfxRecordedRendering {
            extent: rendering_info.extent(),
            colors: rendering_info.color_attachments().iter().map(GfxRecordedAttachment::from).collect(),
            depth: rendering_info.depth().map(GfxRecordedAttachment::from),
            stencil: rendering_info.stencil().map(GfxRecordedAttachment::from),
        }));
    }

    fn cmd_end_rendering(&self) {
        self.push(GfxRecordedCmd::EndRendering);
    }

    fn cmd_set_viewport(&self, _first_viewport: u32, viewports: &[vk::Viewport]) {
        for vp in viewports {
            self.push(GfxRecordedCmd::SetViewport {
                x: vp.x,
                y: vp.y,
                width: vp.width,
                height: vp.height,
            });
        }
    }

    fn cmd_set_scissor(&self, _first_scissor: u32, scissors: &[vk::Rect2D]) {
        for scissor in scissors {
            self.push(GfxRecordedCmd::SetScissor(
                scissor.offset.x,
                scissor.offset.y,
                scissor.extent.width,
                scissor.extent.height,
            ));
        }
    }

    fn cmd_set_cull_mode(&self, cull_mode: vk::CullModeFlags) {
        self.push(GfxRecordedCmd::SetCullMode(cull_mode));
    }

    fn cmd_set_front_face(&self, front_face: vk::FrontFace) {
        self.push(GfxRecordedCmd::SetFrontFace(front_face));
    }

    fn cmd_set_primitive_topology(&self, topology: vk::PrimitiveTopology) {
        self.push(GfxRecordedCmd::SetPrimitiveTopology(topology));
    }

    fn cmd_set_depth_test_enable(&self, enable: bool) {
        self.push(GfxRecordedCmd::SetDepthTestEnable(enable));
    }

    fn cmd_set_depth_write_enable(&self, enable: bool) {
        self.push(GfxRecordedCmd::SetDepthWriteEnable(enable));
    }

    fn cmd_set_depth_compare_op(&self, compare_op: vk::CompareOp) {
        self.push(GfxRecordedCmd::SetDepthCompareOp(compare_op));
    }

    fn cmd_set_stencil_test_enable(&self, enable: bool) {
        self.push(GfxRecordedCmd::SetStencilTestEnable(enable));
    }

    fn cmd_set_color_blend_enable(&self, _first_attachment: u32, enables: &[bool]) {
        self.push(GfxRecordedCmd::SetColorBlendEnable(enables.to_vec()));
    }

    fn cmd_set_color_write_mask(&self, _first_attachment: u32, masks: &[vk::ColorComponentFlags]) {
        self.push(GfxRecordedCmd::SetColorWriteMask(masks.to_vec()));
    }

    fn cmd_set_polygon_mode(&self, polygon_mode: vk::PolygonMode) {
        self.push(GfxRecordedCmd::SetPolygonMode(polygon_mode));
    }

    fn cmd_set_rasterization_samples(&self, samples: vk::SampleCountFlags) {
        self.push(GfxRecordedCmd::SetRasterizationSamples(samples));
    }

    fn cmd_copy_image(
        &self,
        src: vk::Image,
        src_layout: vk::ImageLayout,
        dst: vk::Image,
        dst_layout: vk::ImageLayout,
        _regions: &[vk::ImageCopy2<'_>],
    ) {
        self.push(GfxRecordedCmd::CopyImage {
            src,
            src_layout,
            dst,
            dst_layout,
        });
    }

    fn cmd_blit_image(
        &self,
        src: vk::Image,
        src_layout: vk::ImageLayout,
        dst: vk::Image,
        dst_layout: vk::ImageLayout,
        _regions: &[vk::ImageBlit2<'_>],
        filter: vk::Filter,
    ) {
        self.push(GfxRecordedCmd::BlitImage {
            src,
            src_layout,
            dst,
            dst_layout,
            filter,
        });
    }

    fn begin_label(&self, label_name: &str, _label_color: glam::Vec4) {
        self.push(GfxRecordedCmd::BeginLabel(label_name.to_string()));
    }

    fn end_label(&self) {
        self.push(GfxRecordedCmd::EndLabel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    #[test]
    fn test_clones_share_commands() {
        let stream = GfxRecordingCommandStream::new();
        let other = stream.clone();

        other.cmd_set_cull_mode(vk::CullModeFlags::BACK);
        stream.cmd_end_rendering();

        assert_eq!(stream.len(), 2);
        assert_eq!(
            stream.commands(),
            vec![GfxRecordedCmd::SetCullMode(vk::CullModeFlags::BACK), GfxRecordedCmd::EndRendering]
        );
        assert_eq!(other.end_rendering_count(), 1);

        let taken = stream.take();
        assert_eq!(taken.len(), 2);
        assert!(other.is_empty());
    }

    #[test]
    fn test_barrier_batches_keep_call_boundaries() {
        let stream = GfxRecordingCommandStream::new();
        let make = |raw: u64| {
            GfxImageBarrier::layout_transition(
                vk::Image::from_raw(raw),
                vk::ImageAspectFlags::COLOR,
                vk::ImageLayout::UNDEFINED,
                vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            )
        };

        stream.cmd_image_barriers(vk::DependencyFlags::empty(), &[make(1), make(2)]);
        stream.cmd_image_barriers(vk::DependencyFlags::empty(), &[make(3)]);

        let batches = stream.barrier_batches();
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].len(), 2);
        assert_eq!(batches[1][0].image, vk::Image::from_raw(3));
        assert_eq!(stream.barriers().len(), 3);
    }

    #[test]
    fn test_begin_rendering_records_attachments() {
        let stream = GfxRecordingCommandStream::new();
        let info = GfxRenderingInfo::new(vk::Extent2D { width: 4, height: 2 }).color_attachment(
            vk::ImageView::from_raw(9),
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            vk::AttachmentLoadOp::DONT_CARE,
            vk::AttachmentStoreOp::STORE,
            glam::Vec4::ZERO,
        );
        stream.cmd_begin_rendering(&info);

        let renderings = stream.renderings();
        assert_eq!(renderings.len(), 1);
        assert_eq!(renderings[0].extent, vk::Extent2D { width: 4, height: 2 });
        assert_eq!(renderings[0].colors[0].view, vk::ImageView::from_raw(9));
        assert_eq!(renderings[0].colors[0].load_op, vk::AttachmentLoadOp::DONT_CARE);
        assert!(renderings[0].depth.is_none());
    }
}
