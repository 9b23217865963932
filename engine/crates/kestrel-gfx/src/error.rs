use ash::vk;

/// Gfx 层的错误
#[derive(Debug, thiserror::Error)]
pub enum GfxError {
    /// Vulkan 调用返回了错误码
    #[error("vulkan call `{call}` failed: {result}")]
    Vk { call: &'static str, result: vk::Result },

    #[error("failed to load the vulkan library: {0}")]
    Loading(#[from] ash::LoadingError),

    /// 没有支持 Vulkan 1.3 且带 graphics queue 的物理设备
    #[error("no vulkan 1.3 device with a graphics queue")]
    NoSuitableDevice,
}

impl GfxError {
    /// 用于 `map_err`
    #[inline]
    pub fn vk(call: &'static str) -> impl FnOnce(vk::Result) -> Self {
        move |result| Self::Vk { call, result }
    }
}
