use anyhow::Context;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs;
use std::path::Path;

/// 从 TOML 文件加载配置
pub fn load_toml<T: DeserializeOwned, P: AsRef<Path>>(path: P) -> anyhow::Result<T> {
    let content =
        fs::read_to_string(path.as_ref()).with_context(|| format!("读取配置文件失败: {:?}", path.as_ref()))?;

    parse_toml(&content).with_context(|| format!("解析 TOML 配置失败: {:?}", path.as_ref()))
}

/// 从 TOML 字符串解析配置
pub fn parse_toml<T: DeserializeOwned>(content: &str) -> anyhow::Result<T> {
    let config = toml::from_str(content)?;
    Ok(config)
}

/// 保存配置到 TOML 文件
pub fn save_toml<T: Serialize, P: AsRef<Path>>(config: &T, path: P) -> anyhow::Result<()> {
    let content = toml::to_string_pretty(config).context("序列化配置失败")?;

    fs::write(path.as_ref(), content).with_context(|| format!("写入配置文件失败: {:?}", path.as_ref()))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
    #[serde(default)]
    struct Sample {
        name: String,
        levels: u32,
    }

    #[test]
    fn test_parse_partial_toml() {
        let sample: Sample = parse_toml("levels = 3").unwrap();
        assert_eq!(sample, Sample { name: String::new(), levels: 3 });
    }

    #[test]
    fn test_load_missing_file_has_context() {
        let err = load_toml::<Sample, _>("/definitely/not/here.toml").unwrap_err();
        assert!(format!("{err:#}").contains("读取配置文件失败"));
    }

    #[test]
    fn test_save_then_load() {
        let path = std::env::temp_dir().join(format!("kestrel-config-{}.toml", std::process::id()));
        let sample = Sample { name: "bloom".to_string(), levels: 5 };
        save_toml(&sample, &path).unwrap();
        let loaded: Sample = load_toml(&path).unwrap();
        let _ = fs::remove_file(&path);
        assert_eq!(loaded, sample);
    }
}
