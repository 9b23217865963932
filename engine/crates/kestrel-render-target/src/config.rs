use std::path::Path;

use ash::vk;
use serde::{Deserialize, Serialize};

use crate::error::RenderTargetError;

/// 深度格式候选项
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DepthFormatCandidate {
    D32SfloatS8Uint,
    D24UnormS8Uint,
    D32Sfloat,
    D16Unorm,
}
impl DepthFormatCandidate {
    #[inline]
    pub fn vk_format(self) -> vk::Format {
        match self {
            Self::D32SfloatS8Uint => vk::Format::D32_SFLOAT_S8_UINT,
            Self::D24UnormS8Uint => vk::Format::D24_UNORM_S8_UINT,
            Self::D32Sfloat => vk::Format::D32_SFLOAT,
            Self::D16Unorm => vk::Format::D16_UNORM,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CullMode {
    None,
    Front,
    Back,
}
impl CullMode {
    #[inline]
    pub fn vk_flags(self) -> vk::CullModeFlags {
        match self {
            Self::None => vk::CullModeFlags::NONE,
            Self::Front => vk::CullModeFlags::FRONT,
            Self::Back => vk::CullModeFlags::BACK,
        }
    }
}

/// render target 的配置，从 TOML 加载，缺失的字段使用默认值
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderTargetConfig {
    /// 按优先级排列
    pub depth_format_candidates: Vec<DepthFormatCandidate>,

    /// bloom ping-pong image 的 mip 数量，超过半分辨率能容纳的数量时会被截断
    pub bloom_mip_levels: u32,

    pub clear_color: [f32; 4],
    pub clear_depth: f32,

    pub default_cull_mode: CullMode,

    /// 是否为每个 swapchain image 创建 scene color capture
    pub scene_color_capture: bool,
}
impl Default for RenderTargetConfig {
    fn default() -> Self {
        Self {
            depth_format_candidates: vec![
                DepthFormatCandidate::D32SfloatS8Uint,
                DepthFormatCandidate::D24UnormS8Uint,
                DepthFormatCandidate::D32Sfloat,
            ],
            bloom_mip_levels: 4,
            clear_color: [0.0, 0.0, 0.0, 1.0],
            clear_depth: 1.0,
            default_cull_mode: CullMode::Back,
            scene_color_capture: true,
        }
    }
}
// new & init
impl RenderTargetConfig {
    /// 从 TOML 文件加载并校验
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let config: Self = kestrel_crate_tools::config::load_toml(path.as_ref())?;
        config.validate()?;
        log::info!("render target config loaded from {:?}", path.as_ref());
        Ok(config)
    }
}
// tools
impl RenderTargetConfig {
    pub fn validate(&self) -> Result<(), RenderTargetError> {
        if self.depth_format_candidates.is_empty() {
            return Err(RenderTargetError::Config("depth_format_candidates is empty".to_string()));
        }
        if self.bloom_mip_levels == 0 {
            return Err(RenderTargetError::Config("bloom_mip_levels must be at least 1".to_string()));
        }
        if !(0.0..=1.0).contains(&self.clear_depth) {
            return Err(RenderTargetError::Config(format!("clear_depth {} is outside [0, 1]", self.clear_depth)));
        }
        Ok(())
    }

    pub fn depth_formats(&self) -> Vec<vk::Format> {
        self.depth_format_candidates.iter().map(|c| c.vk_format()).collect()
    }

    #[inline]
    pub fn clear_color(&self) -> glam::Vec4 {
        glam::Vec4::from_array(self.clear_color)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kestrel_crate_tools::config::{parse_toml, save_toml};

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: RenderTargetConfig = parse_toml(
            r#"
            depth_format_candidates = ["D24_UNORM_S8_UINT", "D32_SFLOAT"]
            default_cull_mode = "none"
            "#,
        )
        .unwrap();

        assert_eq!(config.depth_formats(), vec![vk::Format::D24_UNORM_S8_UINT, vk::Format::D32_SFLOAT]);
        assert_eq!(config.default_cull_mode.vk_flags(), vk::CullModeFlags::NONE);
        assert_eq!(config.bloom_mip_levels, 4);
        assert_eq!(config.clear_color(), glam::vec4(0.0, 0.0, 0.0, 1.0));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let config = RenderTargetConfig {
            depth_format_candidates: Vec::new(),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(RenderTargetError::Config(_))));

        let config = RenderTargetConfig {
            clear_depth: 2.0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(RenderTargetError::Config(_))));
    }

    #[test]
    fn test_load_roundtrip_and_invalid_file() {
        let dir = std::env::temp_dir().join(format!("kestrel-rt-config-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();

        let path = dir.join("render_target.toml");
        let config = RenderTargetConfig {
            bloom_mip_levels: 6,
            scene_color_capture: false,
            ..Default::default()
        };
        save_toml(&config, &path).unwrap();
        assert_eq!(RenderTargetConfig::load(&path).unwrap(), config);

        let bad_path = dir.join("bad.toml");
        std::fs::write(&bad_path, "bloom_mip_levels = 0").unwrap();
        let err = RenderTargetConfig::load(&bad_path).unwrap_err();
        assert!(err.downcast_ref::<RenderTargetError>().is_some());

        std::fs::remove_dir_all(&dir).ok();
    }
}
