//! # 资源错误模型
//!
//! ## 设计思路
//!
//! 资源加载链路（下载 / 读取 / 解码）中的所有失败统一收敛到 `ImageError`。
//! 上层（编排器）只关心“该区域的资源不可用”，因此会将其包装为
//! `TryonError::AssetUnavailable`，但保留原始分支用于诊断日志。

/// 资源加载统一错误类型。
#[derive(Debug, thiserror::Error)]
pub enum ImageError {
    #[error("下载失败：{0}")]
    Network(String),

    #[error("图片解码失败：{0}")]
    Decode(String),

    #[error("不是可用的图片：{0}")]
    InvalidFormat(String),

    #[error("读取本地图片失败：{0}")]
    FileSystem(String),

    #[error("加载超时：{0}")]
    Timeout(String),

    #[error("超出加载限制：{0}")]
    ResourceLimit(String),
}

impl ImageError {
    /// 稳定错误码，供日志聚合与上层 IPC 使用。
    pub fn code(&self) -> &'static str {
        match self {
            Self::Network(_) => "E_NETWORK",
            Self::Decode(_) => "E_DECODE",
            Self::InvalidFormat(_) => "E_INVALID_FORMAT",
            Self::FileSystem(_) => "E_FILE_SYSTEM",
            Self::Timeout(_) => "E_TIMEOUT",
            Self::ResourceLimit(_) => "E_RESOURCE_LIMIT",
        }
    }

    /// 出错阶段：`load` 表示取字节阶段，`decode` 表示解码阶段。
    pub fn stage(&self) -> &'static str {
        match self {
            Self::Network(_) | Self::FileSystem(_) | Self::Timeout(_) => "load",
            Self::Decode(_) => "decode",
            Self::InvalidFormat(_) | Self::ResourceLimit(_) => "validate",
        }
    }
}
