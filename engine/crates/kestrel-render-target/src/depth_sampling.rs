//! G-buffer pass 中深度在 "可写 attachment" 与 "只读采样" 之间的切换
//!
//! 只有 [`DeferredGeometryPass::begin_depth_sampling`] 能把主深度转换为只读，
//! [`DepthSamplingScope`] 结束（或 drop）时执行完全对称的反向转换。

use ash::vk;
use itertools::Itertools;
use kestrel_gfx::{basic::color::LabelColor, commands::command_stream::GfxCommandStream};

use crate::{
    contract::AttachmentContract,
    resources::{GBUFFER_COUNT, LayoutRequest, RtImageId},
    session::RenderingSession,
    variant::{DepthReadOnly, RenderTargetVariant},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DepthMode {
    Writable,
    ReadOnlyForSampling,
}

/// 以 G-buffer 为目标的几何 pass
///
/// 由 [`RenderingSession::begin_deferred_pass`] 创建
pub struct DeferredGeometryPass<'a, C: GfxCommandStream + Clone> {
    session: &'a mut RenderingSession<C>,
}
// new & init
impl<'a, C: GfxCommandStream + Clone> DeferredGeometryPass<'a, C> {
    #[inline]
    pub(crate) fn new(session: &'a mut RenderingSession<C>) -> Self {
        Self { session }
    }
}
// pass
impl<C: GfxCommandStream + Clone> DeferredGeometryPass<'_, C> {
    #[inline]
    pub fn ensure_active(&mut self, cmd: &C) -> AttachmentContract {
        self.session.ensure_active(cmd)
    }

    #[inline]
    pub fn suspend(&mut self) {
        self.session.suspend();
    }

    #[inline]
    pub fn rendering_active(&self) -> bool {
        self.session.rendering_active()
    }

    #[inline]
    pub fn request_clear(&mut self) {
        self.session.request_clear();
    }

    #[inline]
    pub fn set_cull_mode(&mut self, cull_mode: vk::CullModeFlags) {
        self.session.set_cull_mode(cull_mode);
    }

    #[inline]
    pub fn set_depth_test(&mut self, enable: bool) {
        self.session.set_depth_test(enable);
    }

    #[inline]
    pub fn set_depth_write(&mut self, enable: bool) {
        self.session.set_depth_write(enable);
    }

    /// 结束写深度的 pass，把主深度转换为只读，并以只读深度打开 decal 目标
    pub fn begin_depth_sampling(&mut self, cmd: &C) -> DepthSamplingScope<'_, C> {
        DepthSamplingScope::begin(self.session, cmd.clone())
    }

    /// 结束几何阶段：所有 G-buffer 与主深度转换为可采样，目标切换到没有深度的 swapchain
    pub fn end_geometry(self, cmd: &C) {
        let session = self.session;
        session.suspend();

        let read_layout = session.resources().depth_read_layout();
        let mut requests = (0..GBUFFER_COUNT as u8)
            .map(|index| LayoutRequest::new(RtImageId::GBuffer(index), vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL))
            .collect_vec();
        requests.push(LayoutRequest::new(RtImageId::MainDepth, read_layout));
        session.resources_mut().transition(cmd, &requests);

        session.select_variant_inner(RenderTargetVariant::SwapchainNoDepth);
    }
}

/// 主深度处于只读采样状态的区间
///
/// 区间内的目标是 decal G-buffer：颜色与 G-buffer pass 相同，深度只读且永远 LOAD
pub struct DepthSamplingScope<'a, C: GfxCommandStream + Clone> {
    session: &'a mut RenderingSession<C>,
    cmd: C,
    ended: bool,
}
// new & init
impl<'a, C: GfxCommandStream + Clone> DepthSamplingScope<'a, C> {
    fn begin(session: &'a mut RenderingSession<C>, cmd: C) -> Self {
        assert_eq!(
            session.current_variant(),
            RenderTargetVariant::DeferredGBuffer,
            "depth sampling must start from the deferred G-buffer target"
        );
        assert_eq!(session.depth_mode(), DepthMode::Writable, "depth is already read-only");

        session.suspend();
        cmd.begin_label("depth-sampling", LabelColor::COLOR_DEPTH_SAMPLING);

        // 只转换深度，颜色保持 attachment layout
        let read_layout = session.resources().depth_read_layout();
        session.resources_mut().transition(&cmd, &[LayoutRequest::new(RtImageId::MainDepth, read_layout)]);
        session.set_depth_mode(DepthMode::ReadOnlyForSampling);
        session.select_variant_inner(RenderTargetVariant::DecalGBuffer(DepthReadOnly::new()));

        log::debug!("main depth -> {:?} for sampling", read_layout);
        Self {
            session,
            cmd,
            ended: false,
        }
    }
}
// pass
impl<C: GfxCommandStream + Clone> DepthSamplingScope<'_, C> {
    #[inline]
    pub fn ensure_active(&mut self) -> AttachmentContract {
        self.session.ensure_active(&self.cmd)
    }

    #[inline]
    pub fn suspend(&mut self) {
        self.session.suspend();
    }

    #[inline]
    pub fn rendering_active(&self) -> bool {
        self.session.rendering_active()
    }

    #[inline]
    pub fn set_cull_mode(&mut self, cull_mode: vk::CullModeFlags) {
        self.session.set_cull_mode(cull_mode);
    }

    #[inline]
    pub fn set_depth_test(&mut self, enable: bool) {
        self.session.set_depth_test(enable);
    }

    /// 深度恢复为可写，目标回到 G-buffer
    pub fn end(mut self) {
        self.finish();
    }

    fn finish(&mut self) {
        if self.ended {
            return;
        }
        self.ended = true;

        self.session.suspend();
        let attachment_layout = self.session.resources().depth_attachment_layout();
        self.session
            .resources_mut()
            .transition(&self.cmd, &[LayoutRequest::new(RtImageId::MainDepth, attachment_layout)]);
        self.session.set_depth_mode(DepthMode::Writable);
        self.session.select_variant_inner(RenderTargetVariant::DeferredGBuffer);
        self.cmd.end_label();

        log::debug!("main depth -> {:?}", attachment_layout);
    }
}
impl<C: GfxCommandStream + Clone> Drop for DepthSamplingScope<'_, C> {
    fn drop(&mut self) {
        // unwind 中不再录制，由 reset_after_abandoned_frame 恢复
        if !std::thread::panicking() {
            self.finish();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    use kestrel_gfx::{
        commands::recording::{GfxRecordedCmd, GfxRecordingCommandStream},
        foundation::{
            device_caps::GfxDeviceCaps,
            headless::{GfxHeadlessDevice, GfxHeadlessImageAllocator},
        },
    };

    use crate::{
        config::RenderTargetConfig, deferred_release::DeferredReleaseQueue, resources::tests::headless_resources,
    };

    type Session = RenderingSession<GfxRecordingCommandStream>;

    fn session() -> (Session, GfxRecordingCommandStream) {
        crate::tests::init();
        let device = GfxHeadlessDevice::new();
        let allocator = Rc::new(GfxHeadlessImageAllocator::new());
        let resources = headless_resources(&device, &allocator);
        let mut session = RenderingSession::new(resources, &GfxDeviceCaps::full(), &RenderTargetConfig::default());
        session.begin_frame(0);
        (session, GfxRecordingCommandStream::new())
    }

    fn teardown(mut session: Session) {
        let mut queue = DeferredReleaseQueue::new();
        session.destroy(1, &mut queue);
        queue.clear();
    }

    #[test]
    fn test_scope_touches_only_depth() {
        let (mut session, cmd) = session();
        let mut pass = session.begin_deferred_pass(false, false);
        pass.ensure_active(&cmd);
        cmd.clear();

        let scope = pass.begin_depth_sampling(&cmd);
        assert!(!scope.rendering_active());
        drop(scope);

        let batches = cmd.barrier_batches();
        assert_eq!(batches.len(), 2);
        assert!(batches.iter().all(|batch| batch.len() == 1));
        assert_eq!(cmd.end_rendering_count(), 1);
        assert_eq!(cmd.begin_rendering_count(), 0);

        assert_eq!(session.current_variant(), RenderTargetVariant::DeferredGBuffer);
        assert_eq!(session.depth_mode(), DepthMode::Writable);
        assert_eq!(
            session.resources().current_layout(RtImageId::MainDepth),
            session.resources().depth_attachment_layout()
        );
        teardown(session);
    }

    #[test]
    fn test_decal_target_reads_depth() {
        let (mut session, cmd) = session();
        let mut pass = session.begin_deferred_pass(false, false);
        pass.ensure_active(&cmd);

        let mut scope = pass.begin_depth_sampling(&cmd);
        // clear 请求不会让只读深度被 clear
        scope.session.request_clear();
        scope.ensure_active();
        assert_eq!(scope.session.depth_mode(), DepthMode::ReadOnlyForSampling);
        assert_eq!(scope.session.variant_name(), "decal-gbuffer");
        scope.end();

        let decal = cmd.renderings().pop().unwrap();
        assert_eq!(decal.depth.unwrap().load_op, vk::AttachmentLoadOp::LOAD);
        assert_eq!(decal.depth.unwrap().store_op, vk::AttachmentStoreOp::NONE);
        assert_eq!(decal.stencil.unwrap().load_op, vk::AttachmentLoadOp::LOAD);
        assert!(decal.colors.iter().all(|color| color.load_op == vk::AttachmentLoadOp::CLEAR));
        assert_eq!(cmd.commands().last(), Some(&GfxRecordedCmd::EndLabel));
        teardown(session);
    }

    #[test]
    #[should_panic(expected = "while depth is read-only")]
    fn test_writing_depth_during_sampling_panics() {
        let (mut session, cmd) = session();
        let mut pass = session.begin_deferred_pass(false, false);
        let scope = pass.begin_depth_sampling(&cmd);

        // 绕过 scope 直接切换到写深度的目标
        scope.session.select_variant_inner(RenderTargetVariant::DeferredGBuffer);
        scope.session.ensure_active(&cmd);
    }

    #[test]
    fn test_end_geometry_makes_gbuffer_sampleable() {
        let (mut session, cmd) = session();
        let mut pass = session.begin_deferred_pass(true, false);
        pass.ensure_active(&cmd);
        cmd.clear();
        pass.end_geometry(&cmd);

        assert_eq!(cmd.barrier_batches().len(), 1);
        assert_eq!(cmd.barriers().len(), GBUFFER_COUNT + 1);
        for index in 0..GBUFFER_COUNT as u8 {
            assert_eq!(
                session.resources().current_layout(RtImageId::GBuffer(index)),
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL
            );
        }
        assert_eq!(
            session.resources().current_layout(RtImageId::MainDepth),
            session.resources().depth_read_layout()
        );
        assert_eq!(session.current_variant(), RenderTargetVariant::SwapchainNoDepth);

        // 延迟光照覆盖每个像素
        session.ensure_active(&cmd);
        let lighting = cmd.renderings().pop().unwrap();
        assert_eq!(lighting.colors[0].load_op, vk::AttachmentLoadOp::DONT_CARE);
        assert!(lighting.depth.is_none());

        session.suspend();
        session.end_frame(&cmd);
        teardown(session);
    }
}
