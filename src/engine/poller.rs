//! 后台轮询器 (Poller)
//!
//! 进程级常驻任务：按固定间隔刷新全部站点，同时接收 API 发来的定向刷新请求。
//! 每轮刷新在独立任务中执行，失败或 panic 只记录日志，循环继续。
//! 正在刷新的站点不会被重复调度。

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use flume::{Receiver, Sender};
use tokio::task::{AbortHandle, Id, JoinHandle, JoinSet};
use tokio::time::{MissedTickBehavior, interval, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::core::model::TrackedSite;
use crate::store::Store;

use super::pipeline::{FetchPipeline, RefreshSummary};

pub enum PollerMsg {
    /// 刷新指定站点；`None` 表示全部站点
    Refresh(Option<Vec<String>>),
}

/// 刷新执行者
#[async_trait]
pub trait SiteRefresher: Send + Sync + 'static {
    async fn refresh(&self, sites: &[TrackedSite]) -> RefreshSummary;
}

#[async_trait]
impl SiteRefresher for FetchPipeline {
    async fn refresh(&self, sites: &[TrackedSite]) -> RefreshSummary {
        FetchPipeline::refresh(self, sites).await
    }
}

/// 轮询器句柄，由进程生命周期持有
pub struct PollerHandle {
    tx: Sender<PollerMsg>,
    shutdown: CancellationToken,
    handle: JoinHandle<()>,
}

impl PollerHandle {
    /// 请求刷新，不等待结果
    pub fn request_refresh(&self, site_ids: Option<Vec<String>>) {
        request_refresh(&self.tx, site_ids);
    }

    pub fn sender(&self) -> Sender<PollerMsg> {
        self.tx.clone()
    }

    /// 取消轮询 (包括进行中的刷新)，最多等待 `grace`
    pub async fn stop(self, grace: Duration) {
        self.shutdown.cancel();
        match timeout(grace, self.handle).await {
            Ok(Ok(())) => info!("轮询器已停止"),
            Ok(Err(e)) => error!("轮询器异常退出: {}", e),
            Err(_) => warn!("轮询器未在 {:?} 内停止", grace),
        }
    }
}

/// 通过发送端请求刷新，不等待结果
pub fn request_refresh(tx: &Sender<PollerMsg>, site_ids: Option<Vec<String>>) {
    if let Err(e) = tx.send(PollerMsg::Refresh(site_ids)) {
        warn!("轮询器已关闭，刷新请求被丢弃: {}", e);
    }
}

/// 进行中的刷新任务及其站点
#[derive(Default)]
struct InFlight {
    tasks: HashMap<Id, Vec<String>>,
    sites: HashSet<String>,
}

impl InFlight {
    fn is_busy(&self, site_id: &str) -> bool {
        self.sites.contains(site_id)
    }

    fn start(&mut self, task: Id, site_ids: Vec<String>) {
        self.sites.extend(site_ids.iter().cloned());
        self.tasks.insert(task, site_ids);
    }

    fn finish(&mut self, task: Id) {
        if let Some(site_ids) = self.tasks.remove(&task) {
            for id in site_ids {
                self.sites.remove(&id);
            }
        }
    }
}

pub struct Poller {
    rx: Receiver<PollerMsg>,
    store: Arc<Store>,
    refresher: Arc<dyn SiteRefresher>,
    period: Duration,
    shutdown: CancellationToken,
}

impl Poller {
    pub fn start(store: Arc<Store>, refresher: Arc<dyn SiteRefresher>, period: Duration) -> PollerHandle {
        let (tx, rx) = flume::unbounded();
        let shutdown = CancellationToken::new();

        let actor = Poller {
            rx,
            store,
            refresher,
            period,
            shutdown: shutdown.clone(),
        };
        let handle = tokio::spawn(async move {
            actor.run().await;
        });
        info!("轮询器已启动 (间隔 {:?})", period);

        PollerHandle { tx, shutdown, handle }
    }

    async fn run(self) {
        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut tasks: JoinSet<()> = JoinSet::new();
        let mut in_flight = InFlight::default();
        let mut current_tick: Option<AbortHandle> = None;
        let mut inbox_open = true;

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,

                _ = ticker.tick() => {
                    if current_tick.as_ref().is_some_and(|t| !t.is_finished()) {
                        debug!("上一轮刷新仍在进行，跳过本次");
                        continue;
                    }
                    let sites = self.store.sites();
                    current_tick = self.spawn_refresh(&mut tasks, &mut in_flight, sites);
                }

                msg = self.rx.recv_async(), if inbox_open => match msg {
                    Ok(PollerMsg::Refresh(ids)) => {
                        let sites = self.select_sites(ids);
                        self.spawn_refresh(&mut tasks, &mut in_flight, sites);
                    }
                    Err(_) => inbox_open = false,
                },

                Some(res) = tasks.join_next_with_id(), if !tasks.is_empty() => match res {
                    Ok((id, ())) => in_flight.finish(id),
                    Err(e) => {
                        in_flight.finish(e.id());
                        if e.is_panic() {
                            error!("刷新任务 panic，将在下一轮重试: {}", e);
                        }
                    }
                },
            }
        }

        // 进行中的刷新直接取消，不等待其完成
        tasks.abort_all();
        while tasks.join_next().await.is_some() {}
    }

    fn select_sites(&self, ids: Option<Vec<String>>) -> Vec<TrackedSite> {
        let sites = self.store.sites();
        match ids {
            None => sites,
            Some(ids) => sites.into_iter().filter(|s| ids.contains(&s.id)).collect(),
        }
    }

    /// 跳过正在刷新的站点；无可刷新站点时不创建任务
    fn spawn_refresh(
        &self,
        tasks: &mut JoinSet<()>,
        in_flight: &mut InFlight,
        sites: Vec<TrackedSite>,
    ) -> Option<AbortHandle> {
        let requested = sites.len();
        let sites: Vec<TrackedSite> = sites.into_iter().filter(|s| !in_flight.is_busy(&s.id)).collect();
        if sites.len() < requested {
            debug!("{} 个站点正在刷新，本次跳过", requested - sites.len());
        }
        if sites.is_empty() {
            return None;
        }

        let site_ids = sites.iter().map(|s| s.id.clone()).collect();
        let refresher = self.refresher.clone();
        let handle = tasks.spawn(async move {
            let summary = refresher.refresh(&sites).await;
            debug!("刷新 {} 个站点: {:?}", sites.len(), summary);
        });
        in_flight.start(handle.id(), site_ids);
        Some(handle)
    }
}
