//! # 合成编排器（orchestrator）
//!
//! ## 设计思路
//!
//! 当前合成结果是 `(PreparedBody, Selection)` 的派生状态，由编排器单写：
//!
//! 1. 为本次重算分配递增代数（`AtomicU64`）
//! 2. 按规划并发加载所有试穿图，**全部完成后**才合成，结果与完成顺序无关
//! 3. 单张试穿图失败只跳过该区域
//! 4. 在阻塞线程池中合成并编码 PNG
//! 5. 仅当没有更新的请求时发布；否则返回 `StaleGeneration`，当前显示结果不变
//!
//! 选择变化时调用方先 `supersede`：代数前移，正在进行的重算随之过期，
//! 即使它的加载稍后完成也不会发布。
//!
//! ## 子模块
//!
//! - `body`：身体图与遮罩预处理（每个身体一次）
//! - `plan`：图层规划与纯函数合成
//! - `store`：`watch` 通道发布结果

mod body;
mod plan;
mod store;

pub use body::{PreparedBody, prepare_body};
pub use plan::{PlannedLayer, compose, plan_layers};
pub use store::CompositeResult;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Instant;

use tokio::sync::watch;
use tokio::task::JoinSet;

use crate::asset::AssetLoader;
use crate::bitmap::Bitmap;
use crate::config::EncodeProfile;
use crate::error::TryonError;
use crate::export;
use crate::selection::Selection;
use crate::tryon::Region;
use store::ResultStore;

/// 编排器状态。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrchestratorState {
    Idle,
    Computing { generation: u64 },
}

pub struct Orchestrator {
    loader: Arc<AssetLoader>,
    encode: RwLock<EncodeProfile>,
    latest_requested: AtomicU64,
    latest_settled: AtomicU64,
    store: ResultStore,
}

/// 无论成功、过期还是失败，退出时都记录该代数已结束。
struct Settle<'a> {
    settled: &'a AtomicU64,
    generation: u64,
}

impl Drop for Settle<'_> {
    fn drop(&mut self) {
        self.settled.fetch_max(self.generation, Ordering::SeqCst);
    }
}

impl Orchestrator {
    pub fn new(loader: Arc<AssetLoader>, encode: EncodeProfile) -> Self {
        Self {
            loader,
            encode: RwLock::new(encode),
            latest_requested: AtomicU64::new(0),
            latest_settled: AtomicU64::new(0),
            store: ResultStore::new(),
        }
    }

    pub fn state(&self) -> OrchestratorState {
        let requested = self.latest_requested.load(Ordering::SeqCst);
        if requested > self.latest_settled.load(Ordering::SeqCst) {
            OrchestratorState::Computing { generation: requested }
        } else {
            OrchestratorState::Idle
        }
    }

    /// 最近一次已发布的结果。
    pub fn current(&self) -> Option<Arc<CompositeResult>> {
        self.store.current()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<CompositeResult>>> {
        self.store.subscribe()
    }

    pub fn encode_profile(&self) -> Result<EncodeProfile, TryonError> {
        self.encode
            .read()
            .map(|p| *p)
            .map_err(|_| TryonError::State("编码档位读取锁已中毒".to_string()))
    }

    pub fn set_encode_profile(&self, profile: EncodeProfile) -> Result<(), TryonError> {
        let mut guard = self
            .encode
            .write()
            .map_err(|_| TryonError::State("编码档位写入锁已中毒".to_string()))?;
        *guard = profile;
        Ok(())
    }

    /// 分配下一个代数。调用方需在读取选择的同一临界区内调用，
    /// 保证代数与选择快照一一对应。
    pub fn next_generation(&self) -> u64 {
        self.latest_requested.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// 选择已变化：让所有进行中的重算过期。
    ///
    /// 占用的代数立即记为已结束，不会有对应的重算。
    pub fn supersede(&self) -> u64 {
        let generation = self.next_generation();
        self.latest_settled.fetch_max(generation, Ordering::SeqCst);
        log::debug!("🔀 选择已变化，第 {} 代之前的合成作废", generation);
        generation
    }

    /// 重新合成并发布。
    ///
    /// 返回 `StaleGeneration` 表示期间有更新的重算请求，本次结果已丢弃。
    pub async fn recompute(
        &self,
        body: Arc<PreparedBody>,
        selection: &Selection,
    ) -> Result<Arc<CompositeResult>, TryonError> {
        let generation = self.next_generation();
        self.recompute_as(generation, body, selection).await
    }

    /// 以预先分配的代数重算。
    pub async fn recompute_as(
        &self,
        generation: u64,
        body: Arc<PreparedBody>,
        selection: &Selection,
    ) -> Result<Arc<CompositeResult>, TryonError> {
        let _settle = Settle {
            settled: &self.latest_settled,
            generation,
        };
        let profile = self.encode_profile()?;
        let total_start = Instant::now();

        let plan = plan_layers(selection, &body);
        log::debug!(
            "🧩 第 {} 代合成开始 - 图层: {:?}",
            generation,
            plan.iter().map(|l| l.region.as_str()).collect::<Vec<_>>()
        );

        let load_start = Instant::now();
        let layers = self.load_layers(&plan).await;
        let load_elapsed = load_start.elapsed();

        self.ensure_current(generation)?;

        let applied: Vec<String> = layers.iter().map(|(_, id, _)| id.clone()).collect();
        let layers: Vec<(Region, Bitmap)> = layers
            .into_iter()
            .map(|(region, _, bitmap)| (region, bitmap))
            .collect();

        let compose_start = Instant::now();
        let (bitmap, png) = tokio::task::spawn_blocking(move || {
            let bitmap = compose(&body, &layers);
            export::encode_png(&bitmap, profile).map(|png| (bitmap, png))
        })
        .await
        .map_err(|e| TryonError::State(format!("合成任务异常退出：{}", e)))??;
        let compose_elapsed = compose_start.elapsed();

        self.ensure_current(generation)?;

        let result = Arc::new(CompositeResult {
            generation,
            width: bitmap.width(),
            height: bitmap.height(),
            bitmap,
            png,
            applied,
        });

        let published = self
            .store
            .publish(result.clone(), || self.latest_requested.load(Ordering::SeqCst) == generation);
        if !published {
            return Err(self.stale(generation));
        }

        log::info!(
            "✅ 第 {} 代合成已发布 - 图层: {:?} load={}ms compose+encode={}ms total={}ms",
            generation,
            result.applied,
            load_elapsed.as_millis(),
            compose_elapsed.as_millis(),
            total_start.elapsed().as_millis()
        );

        Ok(result)
    }

    /// 并发加载全部图层，按规划顺序返回成功的部分。
    async fn load_layers(&self, plan: &[PlannedLayer]) -> Vec<(Region, String, Bitmap)> {
        let mut tasks = JoinSet::new();
        for (index, layer) in plan.iter().cloned().enumerate() {
            let loader = self.loader.clone();
            tasks.spawn(async move {
                let result = loader.load(&layer.output).await;
                (index, layer, result)
            });
        }

        let mut loaded = Vec::with_capacity(plan.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, layer, Ok(bitmap))) => loaded.push((index, layer.region, layer.render_id, bitmap)),
                Ok((_, layer, Err(e))) => {
                    let err = TryonError::asset(format!("{} 试穿图 {}", layer.region.as_str(), layer.render_id), e);
                    log::warn!("⚠️ 跳过区域：{}", err);
                }
                Err(e) => log::warn!("⚠️ 试穿图加载任务异常退出：{}", e),
            }
        }

        loaded.sort_by_key(|(index, ..)| *index);
        loaded
            .into_iter()
            .map(|(_, region, id, bitmap)| (region, id, bitmap))
            .collect()
    }

    fn ensure_current(&self, generation: u64) -> Result<(), TryonError> {
        if self.latest_requested.load(Ordering::SeqCst) > generation {
            return Err(self.stale(generation));
        }
        Ok(())
    }

    fn stale(&self, generation: u64) -> TryonError {
        let latest = self.latest_requested.load(Ordering::SeqCst);
        log::debug!("⏭️ 第 {} 代合成已过期（最新 {} 代），丢弃", generation, latest);
        TryonError::StaleGeneration { generation, latest }
    }
}
