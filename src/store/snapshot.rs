use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

/// 某站点某一时刻的页面内容
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub body: Arc<str>,
    pub captured_at: DateTime<Utc>,
}

/// 条件写入的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    Cached,
    Purged,
    /// 抓取期间站点已变更或删除，本次结果被丢弃
    Stale,
}

#[derive(Debug, Default)]
struct CacheState {
    entries: HashMap<String, Snapshot>,
    /// 每次失效递增；抓取开始时取得的代数不一致则不再写入
    generations: HashMap<String, u64>,
}

/// 快照缓存 (Snapshot Cache)
///
/// 抓取管线写入、匹配引擎读取。每次写入整体替换条目，读者只会看到完整快照或没有快照。
#[derive(Debug, Default)]
pub struct SnapshotCache {
    state: RwLock<CacheState>,
}

impl SnapshotCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// 写入快照；空内容会清除该站点的条目。返回写入后是否存在快照
    pub fn record(&self, site_id: &str, body: String, captured_at: DateTime<Utc>) -> bool {
        let mut state = self.state.write();
        store_entry(&mut state, site_id, body, captured_at)
    }

    /// 当前失效代数，抓取开始前读取
    pub fn generation(&self, site_id: &str) -> u64 {
        self.state.read().generations.get(site_id).copied().unwrap_or(0)
    }

    /// 仅当站点自 `generation` 以来未失效时写入
    pub fn record_at_generation(
        &self,
        site_id: &str,
        body: String,
        captured_at: DateTime<Utc>,
        generation: u64,
    ) -> RecordOutcome {
        let mut state = self.state.write();
        if state.generations.get(site_id).copied().unwrap_or(0) != generation {
            return RecordOutcome::Stale;
        }
        if store_entry(&mut state, site_id, body, captured_at) {
            RecordOutcome::Cached
        } else {
            RecordOutcome::Purged
        }
    }

    pub fn get(&self, site_id: &str) -> Option<Snapshot> {
        self.state.read().entries.get(site_id).cloned()
    }

    /// 站点 URL 变更或删除时调用：清除快照，并使进行中的抓取结果失效
    pub fn remove(&self, site_id: &str) -> Option<Snapshot> {
        let mut state = self.state.write();
        *state.generations.entry(site_id.to_string()).or_insert(0) += 1;
        state.entries.remove(site_id)
    }

    pub fn contains(&self, site_id: &str) -> bool {
        self.state.read().entries.contains_key(site_id)
    }

    pub fn len(&self) -> usize {
        self.state.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.read().entries.is_empty()
    }
}

fn store_entry(state: &mut CacheState, site_id: &str, body: String, captured_at: DateTime<Utc>) -> bool {
    if body.is_empty() {
        state.entries.remove(site_id);
        return false;
    }
    let snapshot = Snapshot {
        body: Arc::from(body),
        captured_at,
    };
    state.entries.insert(site_id.to_string(), snapshot);
    true
}
