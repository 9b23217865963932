//! Render target 与 dynamic rendering 状态机
//!
//! - [`resources`]: 所有 render target 的物理资源，以及唯一的 layout 表
//! - [`variant`]: 封闭的 attachment 组合集合
//! - [`session`]: 选择目标、打开/挂起/结束 pass、显式的 layout 转换与拷贝
//! - [`depth_sampling`]: G-buffer pass 中深度在可写与只读采样之间的切换
//!
//! 所有命令都通过 [`kestrel_gfx::commands::command_stream::GfxCommandStream`] 录制。

pub mod config;
pub mod contract;
pub mod deferred_release;
pub mod depth_sampling;
pub mod error;
pub mod pass_guard;
pub mod resources;
pub mod session;
pub mod variant;

pub use config::RenderTargetConfig;
pub use contract::AttachmentContract;
pub use deferred_release::DeferredReleaseQueue;
pub use depth_sampling::{DeferredGeometryPass, DepthMode, DepthSamplingScope};
pub use error::RenderTargetError;
pub use resources::{RenderTargetResources, RtImageId, RtSubresource, SwapchainImages};
pub use session::{RasterState, RenderingSession, SessionState};
pub use variant::{DepthSource, RenderTargetVariant};

#[cfg(test)]
pub(crate) mod tests {
    pub(crate) fn init() {
        kestrel_crate_tools::init_log::init_test_log();
    }
}
