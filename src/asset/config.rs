//! # 资源加载配置
//!
//! ## 设计思路
//!
//! 下载、读取、解码阶段所有可调阈值集中在 `AssetConfig`，
//! `Default` 提供移动端可用的生产配置。单次加载使用同一份配置快照。

use std::num::NonZeroUsize;
use std::path::PathBuf;

/// 资源加载配置。
#[derive(Debug, Clone)]
pub struct AssetConfig {
    /// 下载/读取原始字节时允许的最大体积（字节）。
    pub max_file_size: u64,
    /// TCP/TLS 握手超时（秒）。连接建立后的读取不设超时。
    pub connect_timeout: u64,
    /// 最大重定向次数。
    pub max_redirects: usize,
    /// 单张图片允许的最大像素数，按图片头里的宽高计算。
    pub max_decoded_pixels: u64,
    /// 展开为 RGBA8 后的内存上限（字节）。
    pub max_decoded_bytes: u64,
    /// 内置资源根目录，`AssetRef::Bundled` 相对于此目录解析。
    pub bundle_dir: PathBuf,
    /// 内置资源解码结果的 LRU 缓存容量。
    pub bundle_cache_capacity: NonZeroUsize,
}

impl Default for AssetConfig {
    fn default() -> Self {
        Self {
            max_file_size: 30 * 1024 * 1024,
            connect_timeout: 8,
            max_redirects: 5,
            max_decoded_pixels: 24_000_000,
            max_decoded_bytes: 96 * 1024 * 1024,
            bundle_dir: PathBuf::from("assets"),
            bundle_cache_capacity: NonZeroUsize::new(16).unwrap_or(NonZeroUsize::MIN),
        }
    }
}

impl AssetConfig {
    /// 校验阈值组合是否合理，由服务层在替换配置时调用。
    pub fn validate(&self) -> Result<(), String> {
        if self.max_file_size < 64 * 1024 {
            return Err("max_file_size 不能小于 64KB".to_string());
        }
        if !(1..=120).contains(&self.connect_timeout) {
            return Err("connect_timeout 必须在 1~120 秒之间".to_string());
        }
        if self.max_redirects > 10 {
            return Err("max_redirects 不能超过 10".to_string());
        }
        if !(1_000_000..=100_000_000).contains(&self.max_decoded_pixels) {
            return Err("max_decoded_pixels 必须在 100 万~1 亿之间".to_string());
        }
        if self.max_decoded_bytes < 8 * 1024 * 1024 {
            return Err("max_decoded_bytes 不能小于 8MB".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(AssetConfig::default().validate().is_ok());
    }

    #[test]
    fn validate_rejects_out_of_range_values() {
        let mut config = AssetConfig::default();
        config.connect_timeout = 0;
        assert!(config.validate().is_err());

        let mut config = AssetConfig::default();
        config.max_redirects = 50;
        assert!(config.validate().is_err());

        let mut config = AssetConfig::default();
        config.max_decoded_pixels = 0;
        assert!(config.validate().is_err());

        let mut config = AssetConfig::default();
        config.max_decoded_pixels = u64::MAX;
        assert!(config.validate().is_err());
    }
}
