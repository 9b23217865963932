use ash::vk;
use kestrel_gfx::error::GfxError;

/// render target 的致命错误
///
/// 都会直接交给帧驱动处理，这一层不做任何重试
#[derive(Debug, thiserror::Error)]
pub enum RenderTargetError {
    /// 没有任何候选深度格式同时支持 depth attachment 与 sampled image
    #[error("no depth format among {candidates:?} supports depth attachment and sampled image")]
    NoDepthFormat { candidates: Vec<vk::Format> },

    /// 缺少 synchronization2 / dynamic rendering 等必须的 feature
    #[error("required device feature missing: {0}")]
    MissingDeviceFeature(&'static str),

    /// 某个 render target 分配失败
    #[error("failed to allocate render target `{resource}`")]
    Allocation {
        resource: String,
        #[source]
        source: GfxError,
    },

    #[error("invalid render target config: {0}")]
    Config(String),
}
