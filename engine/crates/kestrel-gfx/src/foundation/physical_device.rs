use std::ffi::CStr;

use ash::vk;

use crate::foundation::{
    device_caps::{GfxDeviceCaps, GfxExtendedDynamicState3Caps},
    format::GfxFormatQuery,
};

/// 表示一张物理显卡
///
/// 只用于查询，不持有任何需要销毁的资源
#[derive(Clone)]
pub struct GfxPhysicalDevice {
    instance: ash::Instance,
    vk_handle: vk::PhysicalDevice,
    api_version: u32,
}
// new & init
impl GfxPhysicalDevice {
    pub fn new(instance: &ash::Instance, vk_handle: vk::PhysicalDevice) -> Self {
        let props = unsafe { instance.get_physical_device_properties(vk_handle) };
        let name = unsafe { CStr::from_ptr(props.device_name.as_ptr()) };
        log::info!("found gpu: {:?}", name);

        Self {
            instance: instance.clone(),
            vk_handle,
            api_version: props.api_version,
        }
    }
}
// getters
impl GfxPhysicalDevice {
    #[inline]
    pub fn vk_handle(&self) -> vk::PhysicalDevice {
        self.vk_handle
    }

    #[inline]
    pub fn api_version(&self) -> u32 {
        self.api_version
    }
}
// tools
impl GfxPhysicalDevice {
    pub fn supports_extension(&self, name: &CStr) -> bool {
        let props = unsafe { self.instance.enumerate_device_extension_properties(self.vk_handle) };
        props.unwrap_or_default().iter().any(|ext| unsafe { CStr::from_ptr(ext.extension_name.as_ptr()) } == name)
    }

    /// 查询 render target 需要的 feature
    pub fn query_caps(&self) -> GfxDeviceCaps {
        let mut features13 = vk::PhysicalDeviceVulkan13Features::default();
        let mut eds = vk::PhysicalDeviceExtendedDynamicStateFeaturesEXT::default();
        let mut eds3 = vk::PhysicalDeviceExtendedDynamicState3FeaturesEXT::default();
        {
            let mut features2 = vk::PhysicalDeviceFeatures2::default()
                .push_next(&mut features13)
                .push_next(&mut eds)
                .push_next(&mut eds3);
            unsafe {
                self.instance.get_physical_device_features2(self.vk_handle, &mut features2);
            }
        }

        let caps = GfxDeviceCaps {
            synchronization2: features13.synchronization2 == vk::TRUE,
            dynamic_rendering: features13.dynamic_rendering == vk::TRUE,
            // extended dynamic state 在 1.3 中已经是 core
            extended_dynamic_state: self.api_version >= vk::API_VERSION_1_3
                || eds.extended_dynamic_state == vk::TRUE,
            eds3: GfxExtendedDynamicState3Caps {
                color_blend_enable: eds3.extended_dynamic_state3_color_blend_enable == vk::TRUE,
                color_write_mask: eds3.extended_dynamic_state3_color_write_mask == vk::TRUE,
                polygon_mode: eds3.extended_dynamic_state3_polygon_mode == vk::TRUE,
                rasterization_samples: eds3.extended_dynamic_state3_rasterization_samples == vk::TRUE,
            },
        };
        log::info!("physical device caps: {:#?}", caps);
        caps
    }
}
impl GfxFormatQuery for GfxPhysicalDevice {
    fn format_properties(&self, format: vk::Format) -> vk::FormatProperties {
        unsafe { self.instance.get_physical_device_format_properties(self.vk_handle, format) }
    }
}
