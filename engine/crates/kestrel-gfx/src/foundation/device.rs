use ash::vk;

use crate::foundation::device_caps::GfxDeviceCaps;

/// 逻辑设备以及需要用到的扩展函数表
///
/// 设备本身由宿主创建，这里只负责加载扩展函数
#[derive(Clone)]
pub struct GfxDevice {
    device: ash::Device,

    /// VK_EXT_extended_dynamic_state3，设备不支持时为 None
    eds3: Option<ash::ext::extended_dynamic_state3::Device>,

    /// VK_EXT_debug_utils，未开启 validation 时为 None
    debug_utils: Option<ash::ext::debug_utils::Device>,
}
// new & init
impl GfxDevice {
    pub fn new(instance: &ash::Instance, device: ash::Device, caps: &GfxDeviceCaps, enable_debug_utils: bool) -> Self {
        let eds3 = caps
            .eds3
            .any()
            .then(|| ash::ext::extended_dynamic_state3::Device::new(instance, &device));
        let debug_utils = enable_debug_utils.then(|| ash::ext::debug_utils::Device::new(instance, &device));

        log::info!(
            "gfx device loaded: eds3 = {}, debug_utils = {}",
            eds3.is_some(),
            debug_utils.is_some()
        );

        Self {
            device,
            eds3,
            debug_utils,
        }
    }
}
// getters
impl GfxDevice {
    #[inline]
    pub fn ash_device(&self) -> &ash::Device {
        &self.device
    }

    #[inline]
    pub fn vk_handle(&self) -> vk::Device {
        self.device.handle()
    }

    #[inline]
    pub fn eds3(&self) -> Option<&ash::ext::extended_dynamic_state3::Device> {
        self.eds3.as_ref()
    }

    #[inline]
    pub fn debug_utils(&self) -> Option<&ash::ext::debug_utils::Device> {
        self.debug_utils.as_ref()
    }
}
