//! 站点与作品存储 (Site/Series Store)
//!
//! 内存中按插入顺序维护站点与追踪作品，并以 JSON 数组形式持久化到数据目录。
//! 站点 URL 变更或删除时同步清理快照缓存。

pub mod snapshot;

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

use crate::core::error::{Result, TrackerError};
use crate::core::model::{Pagination, StoredCookie, TrackedSeries, TrackedSite};
use crate::text::canonical_token;
use crate::utils::{normalize_host, save_file};

pub use snapshot::{RecordOutcome, Snapshot, SnapshotCache};

const SITES_FILE: &str = "sites.json";
const SERIES_FILE: &str = "series.json";

/// 新建站点请求
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewSite {
    pub label: String,
    pub url: String,
    /// 任意形状，入库时统一校验为 [`Pagination`]
    #[serde(default)]
    pub pagination: Option<Value>,
    #[serde(default)]
    pub series_url_template: Option<String>,
    #[serde(default)]
    pub chapter_url_template: Option<String>,
}

/// 站点局部更新
///
/// 双层 `Option`：外层 `None` 表示未提供，`Some(None)` 表示显式置空。
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SiteUpdate {
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub pagination: Option<Option<Value>>,
    #[serde(default, deserialize_with = "double_option")]
    pub series_url_template: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub chapter_url_template: Option<Option<String>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewSeries {
    pub title: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub site_names: HashMap<String, String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SeriesUpdate {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub aliases: Option<Vec<String>>,
    #[serde(default)]
    pub site_names: Option<HashMap<String, String>>,
}

fn double_option<'de, T, D>(deserializer: D) -> std::result::Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[derive(Debug, Default)]
struct StoreState {
    sites: IndexMap<String, TrackedSite>,
    series: IndexMap<String, TrackedSeries>,
}

/// 持久化存储
pub struct Store {
    data_dir: PathBuf,
    state: RwLock<StoreState>,
    snapshots: Arc<SnapshotCache>,
    /// 串行化落盘，保证文件内容与最后一次修改一致
    persist_lock: Mutex<()>,
}

impl Store {
    /// 打开数据目录并加载已有记录
    pub async fn open(data_dir: impl AsRef<Path>) -> Result<Self> {
        let data_dir = data_dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&data_dir).await?;

        let mut state = StoreState::default();
        for site in load_records::<TrackedSite>(&data_dir.join(SITES_FILE)).await? {
            if site.id.trim().is_empty() {
                warn!("跳过缺少 id 的站点记录: {}", site.url);
                continue;
            }
            state.sites.insert(site.id.clone(), site);
        }
        for series in load_records::<TrackedSeries>(&data_dir.join(SERIES_FILE)).await? {
            if series.id.trim().is_empty() || series.title.trim().is_empty() {
                warn!("跳过无效的作品记录: {:?}", series.title);
                continue;
            }
            state.series.insert(series.id.clone(), series);
        }

        info!(
            "数据加载完成: {} 个站点, {} 部作品 ({})",
            state.sites.len(),
            state.series.len(),
            data_dir.display()
        );

        Ok(Self {
            data_dir,
            state: RwLock::new(state),
            snapshots: Arc::new(SnapshotCache::new()),
            persist_lock: Mutex::new(()),
        })
    }

    pub fn snapshots(&self) -> Arc<SnapshotCache> {
        self.snapshots.clone()
    }

    // =========================================================================
    // Sites
    // =========================================================================

    pub fn sites(&self) -> Vec<TrackedSite> {
        self.state.read().sites.values().cloned().collect()
    }

    pub fn site(&self, site_id: &str) -> Result<TrackedSite> {
        self.state
            .read()
            .sites
            .get(site_id)
            .cloned()
            .ok_or_else(|| site_not_found(site_id))
    }

    pub async fn add_site(&self, input: NewSite) -> Result<TrackedSite> {
        let url = validate_url(&input.url)?;
        let site = TrackedSite {
            id: Uuid::new_v4().to_string(),
            label: input.label.trim().to_string(),
            url,
            pagination: input.pagination.as_ref().map(Pagination::from_value).unwrap_or_default(),
            series_url_template: clean_optional(input.series_url_template),
            chapter_url_template: clean_optional(input.chapter_url_template),
            cookies: Vec::new(),
            reauthenticated_at: None,
        };

        let _guard = self.persist_lock.lock().await;
        let mut sites = self.state.read().sites.clone();
        ensure_unique_host(&sites, &site.url, None)?;
        sites.insert(site.id.clone(), site.clone());
        self.commit_sites(sites).await?;

        info!("新增站点: {} ({})", site.source_label(), site.url);
        Ok(site)
    }

    pub async fn update_site(&self, site_id: &str, update: SiteUpdate) -> Result<TrackedSite> {
        let new_url = update.url.as_deref().map(validate_url).transpose()?;

        let _guard = self.persist_lock.lock().await;
        let mut sites = self.state.read().sites.clone();
        if let Some(url) = &new_url {
            if sites.contains_key(site_id) {
                ensure_unique_host(&sites, url, Some(site_id))?;
            }
        }
        let Some(site) = sites.get_mut(site_id) else {
            return Err(site_not_found(site_id));
        };

        if let Some(label) = update.label {
            site.label = label.trim().to_string();
        }
        let url_changed = match new_url {
            Some(url) if url != site.url => {
                site.url = url;
                true
            }
            _ => false,
        };
        if let Some(pagination) = update.pagination {
            site.pagination = pagination.as_ref().map(Pagination::from_value).unwrap_or_default();
        }
        if let Some(template) = update.series_url_template {
            site.series_url_template = clean_optional(template);
        }
        if let Some(template) = update.chapter_url_template {
            site.chapter_url_template = clean_optional(template);
        }
        let site = site.clone();

        self.commit_sites(sites).await?;
        if url_changed && self.snapshots.remove(site_id).is_some() {
            debug!("站点 URL 已变更，清除旧快照: {}", site_id);
        }
        Ok(site)
    }

    pub async fn remove_site(&self, site_id: &str) -> Result<()> {
        let _guard = self.persist_lock.lock().await;
        let mut sites = self.state.read().sites.clone();
        if sites.shift_remove(site_id).is_none() {
            return Err(site_not_found(site_id));
        }
        self.commit_sites(sites).await?;

        self.snapshots.remove(site_id);
        info!("已删除站点: {}", site_id);
        Ok(())
    }

    /// 写入捕获到的 Cookie 并记录重新认证时间
    pub async fn record_cookies(
        &self,
        site_id: &str,
        cookies: Vec<StoredCookie>,
        at: DateTime<Utc>,
    ) -> Result<TrackedSite> {
        let _guard = self.persist_lock.lock().await;
        let mut sites = self.state.read().sites.clone();
        let Some(site) = sites.get_mut(site_id) else {
            return Err(site_not_found(site_id));
        };
        site.cookies = cookies;
        site.reauthenticated_at = Some(at);
        let site = site.clone();

        self.commit_sites(sites).await?;
        Ok(site)
    }

    // =========================================================================
    // Series
    // =========================================================================

    pub fn series(&self) -> Vec<TrackedSeries> {
        self.state.read().series.values().cloned().collect()
    }

    pub async fn add_series(&self, input: NewSeries) -> Result<TrackedSeries> {
        let title = require_title(&input.title)?;
        let record = TrackedSeries {
            id: Uuid::new_v4().to_string(),
            aliases: clean_aliases(&title, input.aliases),
            site_names: clean_site_names(input.site_names),
            title,
        };

        let _guard = self.persist_lock.lock().await;
        let mut series = self.state.read().series.clone();
        ensure_unique_series(&series, &record, None)?;
        series.insert(record.id.clone(), record.clone());
        self.commit_series(series).await?;

        info!("新增追踪作品: {}", record.title);
        Ok(record)
    }

    pub async fn update_series(&self, series_id: &str, update: SeriesUpdate) -> Result<TrackedSeries> {
        let title = update.title.as_deref().map(require_title).transpose()?;

        let _guard = self.persist_lock.lock().await;
        let mut series = self.state.read().series.clone();
        let Some(existing) = series.get(series_id) else {
            return Err(series_not_found(series_id));
        };

        let mut record = existing.clone();
        if let Some(title) = title {
            record.title = title;
        }
        if let Some(aliases) = update.aliases {
            record.aliases = aliases;
        }
        record.aliases = clean_aliases(&record.title, std::mem::take(&mut record.aliases));
        if let Some(site_names) = update.site_names {
            record.site_names = clean_site_names(site_names);
        }

        ensure_unique_series(&series, &record, Some(series_id))?;
        series.insert(series_id.to_string(), record.clone());
        self.commit_series(series).await?;
        Ok(record)
    }

    pub async fn remove_series(&self, series_id: &str) -> Result<()> {
        let _guard = self.persist_lock.lock().await;
        let mut series = self.state.read().series.clone();
        if series.shift_remove(series_id).is_none() {
            return Err(series_not_found(series_id));
        }
        self.commit_series(series).await
    }

    // 先落盘，成功后才替换内存状态；调用方须持有 `persist_lock`
    async fn commit_sites(&self, sites: IndexMap<String, TrackedSite>) -> Result<()> {
        self.write(SITES_FILE, to_json(sites.values())?).await?;
        self.state.write().sites = sites;
        Ok(())
    }

    async fn commit_series(&self, series: IndexMap<String, TrackedSeries>) -> Result<()> {
        self.write(SERIES_FILE, to_json(series.values())?).await?;
        self.state.write().series = series;
        Ok(())
    }

    async fn write(&self, file: &str, payload: Vec<u8>) -> Result<()> {
        save_file(self.data_dir.join(file), &payload).await?;
        Ok(())
    }
}

/// 逐条解析记录文件，无效记录仅告警跳过
async fn load_records<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let raw = match tokio::fs::read_to_string(path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }

    let values = match serde_json::from_str::<Value>(&raw) {
        Ok(Value::Array(values)) => values,
        Ok(_) => {
            warn!("{} 不是 JSON 数组，已忽略", path.display());
            return Ok(Vec::new());
        }
        Err(e) => {
            warn!("无法解析 {}: {}", path.display(), e);
            return Ok(Vec::new());
        }
    };

    let mut records = Vec::with_capacity(values.len());
    for value in values {
        match serde_json::from_value::<T>(value.clone()) {
            Ok(record) => records.push(record),
            Err(e) => warn!("跳过无效记录 {}: {}", value, e),
        }
    }
    Ok(records)
}

fn to_json<'a, T: Serialize + 'a>(records: impl Iterator<Item = &'a T>) -> Result<Vec<u8>> {
    let records: Vec<&T> = records.collect();
    Ok(serde_json::to_vec_pretty(&records)?)
}

fn validate_url(raw: &str) -> Result<String> {
    let raw = raw.trim();
    let parsed = Url::parse(raw).map_err(|e| TrackerError::Invalid(format!("invalid url '{}': {}", raw, e)))?;
    if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
        return Err(TrackerError::Invalid(format!("url must be http(s) with a host: {}", raw)));
    }
    Ok(raw.to_string())
}

fn ensure_unique_host(sites: &IndexMap<String, TrackedSite>, url: &str, except: Option<&str>) -> Result<()> {
    let host = normalize_host(url);
    let taken = sites
        .values()
        .filter(|site| Some(site.id.as_str()) != except)
        .any(|site| site.host() == host);
    if taken {
        return Err(TrackerError::Conflict(format!("Website already tracked: {}", host)));
    }
    Ok(())
}

fn series_keys(record: &TrackedSeries) -> HashSet<String> {
    std::iter::once(&record.title)
        .chain(record.aliases.iter())
        .map(|name| canonical_token(name))
        .filter(|key| !key.is_empty())
        .collect()
}

fn ensure_unique_series(
    series: &IndexMap<String, TrackedSeries>,
    record: &TrackedSeries,
    except: Option<&str>,
) -> Result<()> {
    let keys = series_keys(record);
    let clash = series
        .values()
        .filter(|other| Some(other.id.as_str()) != except)
        .find(|other| !series_keys(other).is_disjoint(&keys));
    match clash {
        Some(other) => Err(TrackerError::Conflict(format!(
            "Series already tracked: {}",
            other.title
        ))),
        None => Ok(()),
    }
}

fn require_title(raw: &str) -> Result<String> {
    let title = raw.trim();
    if canonical_token(title).is_empty() {
        return Err(TrackerError::Invalid("series title must not be blank".into()));
    }
    Ok(title.to_string())
}

/// 去除空白别名，并按规范化 token 去重 (含与标题重复者)
fn clean_aliases(title: &str, aliases: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::from([canonical_token(title)]);
    aliases
        .into_iter()
        .map(|alias| alias.trim().to_string())
        .filter(|alias| {
            let key = canonical_token(alias);
            !key.is_empty() && seen.insert(key)
        })
        .collect()
}

fn clean_site_names(names: HashMap<String, String>) -> HashMap<String, String> {
    names
        .into_iter()
        .map(|(site, name)| (site, name.trim().to_string()))
        .filter(|(site, name)| !site.trim().is_empty() && !name.is_empty())
        .collect()
}

fn clean_optional(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn site_not_found(site_id: &str) -> TrackerError {
    TrackerError::NotFound(format!("Website not found: {}", site_id))
}

fn series_not_found(series_id: &str) -> TrackerError {
    TrackerError::NotFound(format!("Series not found: {}", series_id))
}
