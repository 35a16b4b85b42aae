//! # 运行配置
//!
//! ## 设计思路
//!
//! - `TryonConfig` 聚合资源加载配置与导出编码档位，`Default` 即生产配置。
//! - `EncodeProfile` 面向产品语义（画质 / 平衡 / 速度），由服务层在运行时切换，
//!   映射为具体的 PNG 压缩与滤波参数。

use image::codecs::png::{CompressionType, FilterType};
use serde::{Deserialize, Serialize};

use crate::asset::AssetConfig;
use crate::error::TryonError;

/// crate 级配置。
#[derive(Debug, Clone, Default)]
pub struct TryonConfig {
    pub asset: AssetConfig,
    pub encode: EncodeProfile,
}

/// 合成结果编码档位。
///
/// - `Quality`：最高压缩率，体积最小
/// - `Balanced`：默认
/// - `Speed`：编码最快，适合频繁换装预览
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EncodeProfile {
    Quality,
    #[default]
    Balanced,
    Speed,
}

impl EncodeProfile {
    /// 从外部字符串解析档位。
    ///
    /// # 示例
    /// ```rust
    /// use tryon_compositor::EncodeProfile;
    ///
    /// let p = EncodeProfile::from_str("Speed")?;
    /// assert_eq!(p.as_str(), "speed");
    /// # Ok::<(), tryon_compositor::TryonError>(())
    /// ```
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(profile: &str) -> Result<Self, TryonError> {
        match profile.trim().to_lowercase().as_str() {
            "quality" => Ok(Self::Quality),
            "balanced" => Ok(Self::Balanced),
            "speed" => Ok(Self::Speed),
            other => Err(TryonError::Encode(format!(
                "未知编码档位：{}（可选：quality / balanced / speed）",
                other
            ))),
        }
    }

    /// 稳定字符串，供上层展示与持久化。
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Quality => "quality",
            Self::Balanced => "balanced",
            Self::Speed => "speed",
        }
    }

    pub(crate) fn png_settings(self) -> (CompressionType, FilterType) {
        match self {
            Self::Quality => (CompressionType::Best, FilterType::Adaptive),
            Self::Balanced => (CompressionType::Default, FilterType::Adaptive),
            Self::Speed => (CompressionType::Fast, FilterType::NoFilter),
        }
    }
}
