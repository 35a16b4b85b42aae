//! # 本地来源
//!
//! Base64、本地文件、内置资源与内存字节的取字节逻辑，以及所有来源共用的
//! magic bytes 签名校验。远程下载见 `fetch.rs`。

use base64::{Engine as _, engine::general_purpose};
use bytes::Bytes;
use std::fs::File;
use std::io::Read;
use std::path::{Component, Path};

use super::source::RawImageData;
use super::{AssetConfig, AssetLoader, ImageError};

/// 下载时签名探测窗口：超过这个长度仍认不出图片类型就放弃。
pub(super) const SIGNATURE_PROBE_BYTES: usize = 4096;

impl AssetLoader {
    pub(super) fn load_from_base64(data: &str, config: &AssetConfig) -> Result<RawImageData, ImageError> {
        let bytes = decode_base64_payload(data, config.max_file_size)?;
        require_image_signature(&bytes)?;

        Ok(RawImageData {
            bytes: Bytes::from(bytes),
            source_hint: "base64",
        })
    }

    pub(super) fn load_from_file(path: &Path, config: &AssetConfig) -> Result<RawImageData, ImageError> {
        log::debug!("📁 读取本地图片 - {}", path.display());

        let bytes = read_capped_file(path, config.max_file_size)?;
        Ok(RawImageData {
            bytes: Bytes::from(bytes),
            source_hint: "file",
        })
    }

    /// 内置资源名只能是 `bundle_dir` 下的相对路径。
    pub(super) fn load_from_bundle(name: &str, config: &AssetConfig) -> Result<RawImageData, ImageError> {
        let relative = Path::new(name);
        let stays_inside = relative
            .components()
            .all(|part| matches!(part, Component::Normal(_) | Component::CurDir));
        if name.trim().is_empty() || !stays_inside {
            return Err(ImageError::InvalidFormat(format!("内置资源名不合法：{}", name)));
        }

        let bytes = read_capped_file(&config.bundle_dir.join(relative), config.max_file_size)?;
        Ok(RawImageData {
            bytes: Bytes::from(bytes),
            source_hint: "bundle",
        })
    }

    pub(super) fn load_from_bytes(bytes: Bytes, config: &AssetConfig) -> Result<RawImageData, ImageError> {
        ensure_within(bytes.len() as u64, config.max_file_size, "内存图片")?;
        require_image_signature(&bytes)?;

        Ok(RawImageData {
            bytes,
            source_hint: "bytes",
        })
    }
}

fn ensure_within(len: u64, limit: u64, what: &str) -> Result<(), ImageError> {
    if len > limit {
        return Err(ImageError::ResourceLimit(format!(
            "{} {:.1} MB 超过上限 {:.1} MB",
            what,
            len as f64 / 1024.0 / 1024.0,
            limit as f64 / 1024.0 / 1024.0
        )));
    }
    Ok(())
}

/// 先看 metadata 再读；读取时同样限长，防止文件在两步之间被替换变大。
fn read_capped_file(path: &Path, limit: u64) -> Result<Vec<u8>, ImageError> {
    let file = File::open(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => ImageError::FileSystem(format!("找不到图片：{}", path.display())),
        _ => ImageError::FileSystem(format!("打开 {} 失败：{}", path.display(), e)),
    })?;

    let metadata = file
        .metadata()
        .map_err(|e| ImageError::FileSystem(format!("读取 {} 元数据失败：{}", path.display(), e)))?;
    if !metadata.is_file() {
        return Err(ImageError::FileSystem(format!("{} 不是普通文件", path.display())));
    }
    ensure_within(metadata.len(), limit, "图片文件")?;

    let mut bytes = Vec::with_capacity(usize::try_from(metadata.len()).unwrap_or(0));
    file.take(limit.saturating_add(1))
        .read_to_end(&mut bytes)
        .map_err(|e| ImageError::FileSystem(format!("读取 {} 失败：{}", path.display(), e)))?;
    ensure_within(bytes.len() as u64, limit, "图片文件")?;

    require_image_signature(&bytes)?;
    Ok(bytes)
}

/// 接受 `data:image/...;base64,` 前缀或裸 Base64。解码前按长度估算上限。
fn decode_base64_payload(data: &str, limit: u64) -> Result<Vec<u8>, ImageError> {
    let trimmed = data.trim();
    let payload = match trimmed.strip_prefix("data:") {
        Some(rest) => {
            let (media, body) = rest
                .split_once(',')
                .ok_or_else(|| ImageError::InvalidFormat("Data URL 缺少逗号分隔".to_string()))?;
            if !media.ends_with(";base64") {
                return Err(ImageError::InvalidFormat(format!("Data URL 不是 base64 编码：{}", media)));
            }
            body
        }
        None => trimmed,
    };

    let estimated = (payload.len() as u64).div_ceil(4).saturating_mul(3);
    ensure_within(estimated, limit, "Base64 图片")?;

    let bytes = general_purpose::STANDARD
        .decode(payload)
        .map_err(|e| ImageError::Decode(format!("Base64 内容无效：{}", e)))?;
    ensure_within(bytes.len() as u64, limit, "Base64 图片")?;
    Ok(bytes)
}

/// 完整字节的签名校验：必须能被识别为图片。
pub(super) fn require_image_signature(bytes: &[u8]) -> Result<(), ImageError> {
    match infer::get(bytes) {
        Some(kind) if kind.matcher_type() == infer::MatcherType::Image => Ok(()),
        Some(kind) => Err(ImageError::InvalidFormat(format!("内容是 {}，不是图片", kind.mime_type()))),
        None if bytes.is_empty() => Err(ImageError::InvalidFormat("图片内容为空".to_string())),
        None => Err(ImageError::InvalidFormat("无法从文件头识别图片类型".to_string())),
    }
}

/// 下载中途的签名探测：`Ok(true)` 已确认是图片，`Ok(false)` 字节还不够判断。
pub(super) fn probe_image_signature(prefix: &[u8], window: usize) -> Result<bool, ImageError> {
    match infer::get(prefix) {
        Some(kind) if kind.matcher_type() == infer::MatcherType::Image => Ok(true),
        Some(kind) => Err(ImageError::InvalidFormat(format!("下载内容是 {}，不是图片", kind.mime_type()))),
        None if prefix.len() >= window => Err(ImageError::InvalidFormat(format!(
            "前 {} 字节内无法识别图片类型",
            window
        ))),
        None => Ok(false),
    }
}
