use std::collections::VecDeque;

/// 延迟释放队列
///
/// 资源在 retire serial 对应的 GPU 工作完成之后才会被释放。
/// 队列本身从不等待 GPU，由帧驱动在得知完成的 serial 之后调用 [`Self::collect`]。
#[derive(Default)]
pub struct DeferredReleaseQueue {
    entries: VecDeque<(u64, Box<dyn FnOnce()>)>,
}
// new & init
impl DeferredReleaseQueue {
    pub fn new() -> Self {
        Self::default()
    }
}
// tools
impl DeferredReleaseQueue {
    /// `retire_serial` 之前提交的命令可能还在使用资源
    pub fn enqueue(&mut self, retire_serial: u64, release: impl FnOnce() + 'static) {
        self.entries.push_back((retire_serial, Box::new(release)));
    }

    /// 按入队顺序执行所有 `retire_serial <= completed_serial` 的释放操作
    ///
    /// 返回执行的数量
    pub fn collect(&mut self, completed_serial: u64) -> usize {
        let (ready, pending): (VecDeque<_>, VecDeque<_>) =
            std::mem::take(&mut self.entries).into_iter().partition(|(serial, _)| *serial <= completed_serial);
        self.entries = pending;

        let count = ready.len();
        for (_, release) in ready {
            release();
        }
        if count > 0 {
            log::debug!("released {} deferred resources (completed serial {})", count, completed_serial);
        }
        count
    }

    /// 设备 idle 之后释放所有资源
    pub fn clear(&mut self) {
        for (_, release) in std::mem::take(&mut self.entries) {
            release();
        }
    }
}
// getters
impl DeferredReleaseQueue {
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
impl Drop for DeferredReleaseQueue {
    fn drop(&mut self) {
        if !self.entries.is_empty() {
            log::warn!("deferred release queue dropped with {} pending entries", self.entries.len());
        }
    }
}
