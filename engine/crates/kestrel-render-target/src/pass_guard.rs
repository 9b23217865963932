use kestrel_gfx::{
    basic::color::LabelColor, commands::command_stream::GfxCommandStream,
    pipelines::rendering_info::GfxRenderingInfo,
};

/// 一个已经开始的 dynamic rendering scope
///
/// 构造时 begin rendering，`end` 或 drop 时 end rendering，保证恰好一次。
/// 不实现 Clone：复制会导致同一个 scope 被结束两次。
pub struct ActivePassGuard<C: GfxCommandStream> {
    cmd: Option<C>,
}
// new & init
impl<C: GfxCommandStream> ActivePassGuard<C> {
    pub fn begin(cmd: C, rendering_info: &GfxRenderingInfo, label: &str) -> Self {
        cmd.begin_label(label, LabelColor::COLOR_PASS);
        cmd.cmd_begin_rendering(rendering_info);
        Self { cmd: Some(cmd) }
    }
}
// end
impl<C: GfxCommandStream> ActivePassGuard<C> {
    /// 结束 scope
    pub fn end(mut self) {
        self.end_once();
    }

    /// 丢弃 guard，不录制任何命令
    ///
    /// 只用于整个 command buffer 都会被丢弃的情况
    pub(crate) fn discard(mut self) {
        self.cmd = None;
    }

    fn end_once(&mut self) {
        if let Some(cmd) = self.cmd.take() {
            cmd.cmd_end_rendering();
            cmd.end_label();
        }
    }
}
impl<C: GfxCommandStream> Drop for ActivePassGuard<C> {
    fn drop(&mut self) {
        self.end_once();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk;
    use kestrel_gfx::commands::recording::{GfxRecordedCmd, GfxRecordingCommandStream};

    fn rendering_info() -> GfxRenderingInfo {
        GfxRenderingInfo::new(vk::Extent2D { width: 4, height: 4 })
    }

    #[test]
    fn test_end_is_recorded_once() {
        let cmd = GfxRecordingCommandStream::new();
        let guard = ActivePassGuard::begin(cmd.clone(), &rendering_info(), "pass");
        guard.end();

        assert_eq!(cmd.begin_rendering_count(), 1);
        assert_eq!(cmd.end_rendering_count(), 1);
        assert_eq!(cmd.commands().last(), Some(&GfxRecordedCmd::EndLabel));
    }

    #[test]
    fn test_drop_ends_scope_on_early_return() {
        fn record(cmd: &GfxRecordingCommandStream, fail: bool) -> Result<(), &'static str> {
            let _guard = ActivePassGuard::begin(cmd.clone(), &rendering_info(), "pass");
            if fail {
                return Err("draw failed");
            }
            Ok(())
        }

        let cmd = GfxRecordingCommandStream::new();
        assert!(record(&cmd, true).is_err());
        assert!(record(&cmd, false).is_ok());
        assert_eq!(cmd.begin_rendering_count(), 2);
        assert_eq!(cmd.end_rendering_count(), 2);
    }

    #[test]
    fn test_drop_ends_scope_on_panic() {
        let cmd = GfxRecordingCommandStream::new();
        let cmd_in = cmd.clone();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || {
            let _guard = ActivePassGuard::begin(cmd_in, &rendering_info(), "pass");
            panic!("draw panicked");
        }));
        assert!(result.is_err());
        assert_eq!(cmd.end_rendering_count(), 1);
    }

    #[test]
    fn test_discard_records_nothing() {
        let cmd = GfxRecordingCommandStream::new();
        let guard = ActivePassGuard::begin(cmd.clone(), &rendering_info(), "pass");
        guard.discard();
        assert_eq!(cmd.end_rendering_count(), 0);
    }
}
