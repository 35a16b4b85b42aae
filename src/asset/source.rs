//! # 资源引用与中间模型
//!
//! ## 设计思路
//!
//! 将“外部资源引用”和“加载阶段产物”解耦：
//! - `AssetRef` 表示图片来自哪里（远程 URL / 内置资源 / 本地文件 / Base64 / 内存字节）
//! - `RawImageData` 表示已取得但尚未解码的字节

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// 图片资源引用。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum AssetRef {
    /// 远程地址（服务端生成的试穿图、身体照片、遮罩）。内容可变，永不缓存。
    Url(String),
    /// 随应用打包的资源名，相对于 `AssetConfig::bundle_dir` 解析。内容不可变，可缓存。
    Bundled(String),
    /// 本地文件路径。
    FilePath(String),
    /// Base64（支持 Data URL 与纯 Base64 字符串）。
    Base64(String),
    /// 已在内存中的编码字节（PNG/JPEG 等）。
    #[serde(skip)]
    Bytes(Bytes),
}

impl AssetRef {
    /// 将 API 返回的字符串引用归类。
    ///
    /// 服务端与本地存储混用多种写法：`http(s)://`、`file://`、`data:image/...`、
    /// `bundle://`，其余一律视为本地路径。
    pub fn parse(reference: &str) -> Self {
        let trimmed = reference.trim();
        let lower = trimmed.to_ascii_lowercase();

        if lower.starts_with("http://") || lower.starts_with("https://") {
            Self::Url(trimmed.to_string())
        } else if lower.starts_with("data:image/") {
            Self::Base64(trimmed.to_string())
        } else if let Some(name) = trimmed.strip_prefix("bundle://") {
            Self::Bundled(name.to_string())
        } else if let Some(path) = trimmed.strip_prefix("file://") {
            Self::FilePath(path.to_string())
        } else {
            Self::FilePath(trimmed.to_string())
        }
    }

    /// 日志用的来源标识。
    pub(crate) fn hint(&self) -> &'static str {
        match self {
            Self::Url(_) => "url",
            Self::Bundled(_) => "bundle",
            Self::FilePath(_) => "file",
            Self::Base64(_) => "base64",
            Self::Bytes(_) => "bytes",
        }
    }
}

/// 加载阶段输出：原始字节与来源标识。
pub(crate) struct RawImageData {
    /// 原始图片字节。
    pub(crate) bytes: Bytes,
    /// 来源提示（用于日志与诊断）。
    pub(crate) source_hint: &'static str,
}
