/// VK_EXT_extended_dynamic_state3 中用到的几个 feature
///
/// 每一项独立检测，不支持的项在录制时直接跳过
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GfxExtendedDynamicState3Caps {
    pub color_blend_enable: bool,
    pub color_write_mask: bool,
    pub polygon_mode: bool,
    pub rasterization_samples: bool,
}
impl GfxExtendedDynamicState3Caps {
    pub const ALL: Self = Self {
        color_blend_enable: true,
        color_write_mask: true,
        polygon_mode: true,
        rasterization_samples: true,
    };

    /// 是否至少支持一项
    #[inline]
    pub fn any(&self) -> bool {
        self.color_blend_enable || self.color_write_mask || self.polygon_mode || self.rasterization_samples
    }
}

/// 设备能力，在创建 render target 之前查询一次
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GfxDeviceCaps {
    pub synchronization2: bool,
    pub dynamic_rendering: bool,
    pub extended_dynamic_state: bool,
    pub eds3: GfxExtendedDynamicState3Caps,
}
// new & init
impl GfxDeviceCaps {
    /// 支持所有用到的 feature
    pub const fn full() -> Self {
        Self {
            synchronization2: true,
            dynamic_rendering: true,
            extended_dynamic_state: true,
            eds3: GfxExtendedDynamicState3Caps::ALL,
        }
    }

    /// 只有 core 1.3 的能力，没有 EDS3
    pub const fn core_only() -> Self {
        Self {
            synchronization2: true,
            dynamic_rendering: true,
            extended_dynamic_state: true,
            eds3: GfxExtendedDynamicState3Caps {
                color_blend_enable: false,
                color_write_mask: false,
                polygon_mode: false,
                rasterization_samples: false,
            },
        }
    }
}
// tools
impl GfxDeviceCaps {
    /// 第一个缺失的必须 feature：synchronization2, dynamic rendering, extended dynamic state
    pub fn missing_core_feature(&self) -> Option<&'static str> {
        if !self.synchronization2 {
            Some("synchronization2")
        } else if !self.dynamic_rendering {
            Some("dynamicRendering")
        } else if !self.extended_dynamic_state {
            Some("extendedDynamicState")
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_core_feature() {
        assert_eq!(GfxDeviceCaps::full().missing_core_feature(), None);
        assert_eq!(GfxDeviceCaps::core_only().missing_core_feature(), None);

        let caps = GfxDeviceCaps {
            dynamic_rendering: false,
            ..GfxDeviceCaps::full()
        };
        assert_eq!(caps.missing_core_feature(), Some("dynamicRendering"));
    }

    #[test]
    fn test_eds3_any() {
        assert!(GfxExtendedDynamicState3Caps::ALL.any());
        assert!(!GfxExtendedDynamicState3Caps::default().any());
        assert!(!GfxDeviceCaps::core_only().eds3.any());
    }
}
