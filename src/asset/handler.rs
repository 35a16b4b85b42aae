//! # 资源加载器
//!
//! ## 设计思路
//!
//! `AssetLoader` 只负责“引用 → 位图”，不感知区域、遮罩或合成顺序。
//! 处理链路固定为：
//! 1. 读取配置快照
//! 2. 按来源取得原始字节（含安全与体积校验）
//! 3. 在阻塞线程池中解码为 RGBA8
//!
//! ## 实现思路
//!
//! - 配置与按它构建的 `reqwest::Client` 一起放在 `LoaderProfile` 里，
//!   `set_config` 整体替换；单次加载持有同一份 profile，连接池在多次下载间复用。
//! - 远程内容（服务端试穿图）随 try-on id 变化，**从不缓存**；
//!   内置资源不可变，解码结果放入 `lru::LruCache`。
//! - 记录 `load/decode/total` 阶段耗时，便于性能诊断。

use lru::LruCache;
use std::path::Path;
use std::sync::{Arc, Mutex, OnceLock, RwLock};
use std::time::Instant;

use super::fetch::build_http_client;
use super::source::AssetRef;
use super::{AssetConfig, ImageError};
use crate::bitmap::Bitmap;

/// 一份配置及其 HTTP 客户端。客户端首次下载时才构建。
pub(super) struct LoaderProfile {
    pub(super) config: AssetConfig,
    http: OnceLock<reqwest::Client>,
}

impl LoaderProfile {
    fn new(config: AssetConfig) -> Self {
        Self {
            config,
            http: OnceLock::new(),
        }
    }

    pub(super) fn http_client(&self) -> Result<reqwest::Client, ImageError> {
        if let Some(client) = self.http.get() {
            return Ok(client.clone());
        }
        let client = build_http_client(&self.config)?;
        Ok(self.http.get_or_init(|| client).clone())
    }
}

/// 图片资源加载器。
pub struct AssetLoader {
    profile: RwLock<Arc<LoaderProfile>>,
    bundle_cache: Mutex<LruCache<String, Arc<Bitmap>>>,
}

impl AssetLoader {
    /// 根据初始配置创建加载器。
    ///
    /// # 示例
    /// ```rust
    /// use tryon_compositor::asset::{AssetConfig, AssetLoader};
    ///
    /// let loader = AssetLoader::new(AssetConfig::default());
    /// assert_eq!(loader.cached_bundles(), 0);
    /// ```
    pub fn new(config: AssetConfig) -> Self {
        let capacity = config.bundle_cache_capacity;
        Self {
            profile: RwLock::new(Arc::new(LoaderProfile::new(config))),
            bundle_cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    fn profile(&self) -> Result<Arc<LoaderProfile>, ImageError> {
        self.profile
            .read()
            .map(|profile| profile.clone())
            .map_err(|_| ImageError::ResourceLimit("配置读取锁已中毒".to_string()))
    }

    /// 当前配置的副本。
    pub fn config_snapshot(&self) -> Result<AssetConfig, ImageError> {
        Ok(self.profile()?.config.clone())
    }

    /// 替换加载配置。非法阈值组合会被拒绝，原配置保持不变。
    ///
    /// HTTP 客户端随配置一起重建；内置资源目录变化时缓存清空。
    pub fn set_config(&self, config: AssetConfig) -> Result<(), ImageError> {
        config.validate().map_err(ImageError::InvalidFormat)?;

        let capacity = config.bundle_cache_capacity;
        let bundle_dir_changed = {
            let mut guard = self
                .profile
                .write()
                .map_err(|_| ImageError::ResourceLimit("配置写入锁已中毒".to_string()))?;
            let changed = guard.config.bundle_dir != config.bundle_dir;
            *guard = Arc::new(LoaderProfile::new(config));
            changed
        };

        let mut cache = self
            .bundle_cache
            .lock()
            .map_err(|_| ImageError::ResourceLimit("内置资源缓存锁已中毒".to_string()))?;
        if bundle_dir_changed {
            log::debug!("📦 内置资源目录已变更，清空 {} 条缓存", cache.len());
            cache.clear();
        }
        cache.resize(capacity);

        Ok(())
    }

    /// 当前缓存的内置资源数量。
    pub fn cached_bundles(&self) -> usize {
        self.bundle_cache.lock().map(|cache| cache.len()).unwrap_or(0)
    }

    /// 加载主入口：将任意来源解析为位图。
    ///
    /// # 示例
    /// ```rust,no_run
    /// use tryon_compositor::asset::{AssetConfig, AssetLoader, AssetRef};
    ///
    /// # async fn demo() -> Result<(), tryon_compositor::asset::ImageError> {
    /// let loader = AssetLoader::new(AssetConfig::default());
    /// let body = loader
    ///     .load(&AssetRef::Url("https://example.com/body.png".into()))
    ///     .await?;
    /// println!("{}x{}", body.width(), body.height());
    /// # Ok(())
    /// # }
    /// ```
    pub async fn load(&self, reference: &AssetRef) -> Result<Bitmap, ImageError> {
        if let AssetRef::Bundled(name) = reference {
            if let Some(hit) = self.cached_bundle(name) {
                log::debug!("📦 内置资源命中缓存: {}", name);
                return Ok(hit.as_ref().clone());
            }
        }

        let profile = self.profile()?;
        let config = profile.config.clone();
        let total_start = Instant::now();

        let load_start = Instant::now();
        let raw = match reference {
            AssetRef::Url(url) => Self::load_from_url(url, &profile).await?,
            AssetRef::Base64(data) => Self::load_from_base64(data, &config)?,
            AssetRef::FilePath(path) => Self::load_from_file(Path::new(path), &config)?,
            AssetRef::Bundled(name) => Self::load_from_bundle(name, &config)?,
            AssetRef::Bytes(bytes) => Self::load_from_bytes(bytes.clone(), &config)?,
        };
        let load_elapsed = load_start.elapsed();

        let decode_start = Instant::now();
        let bitmap = tokio::task::spawn_blocking(move || Self::decode_bitmap(&raw, &config))
            .await
            .map_err(|e| ImageError::Decode(format!("解码任务异常退出：{}", e)))??;
        let decode_elapsed = decode_start.elapsed();

        if let AssetRef::Bundled(name) = reference {
            self.store_bundle(name, &bitmap);
        }

        log::info!(
            "✅ 资源加载完成 - 来源: {} 尺寸: {}x{} load={}ms decode={}ms total={}ms",
            reference.hint(),
            bitmap.width(),
            bitmap.height(),
            load_elapsed.as_millis(),
            decode_elapsed.as_millis(),
            total_start.elapsed().as_millis()
        );

        Ok(bitmap)
    }

    fn cached_bundle(&self, name: &str) -> Option<Arc<Bitmap>> {
        let mut cache = self.bundle_cache.lock().ok()?;
        cache.get(name).cloned()
    }

    fn store_bundle(&self, name: &str, bitmap: &Bitmap) {
        let mut cache = match self.bundle_cache.lock() {
            Ok(guard) => guard,
            Err(_) => return,
        };
        cache.put(name.to_string(), Arc::new(bitmap.clone()));
    }
}
