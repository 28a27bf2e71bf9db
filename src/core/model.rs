use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::utils::normalize_host;

/// 持久化的认证 Cookie
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredCookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    #[serde(default = "default_cookie_path")]
    pub path: String,
    #[serde(default)]
    pub secure: bool,
    #[serde(default)]
    pub http_only: bool,
    /// Unix 秒；会话 Cookie 为空
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires: Option<f64>,
}

fn default_cookie_path() -> String {
    "/".to_string()
}

impl StoredCookie {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires
            .is_some_and(|exp| exp > 0.0 && exp < now.timestamp() as f64)
    }
}

/// 分页策略 (Pagination Strategy)
///
/// 由 [`Pagination::from_value`] 从宽松输入一次性构建，下游只处理这三种形态。
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "strategy")]
pub enum Pagination {
    #[default]
    #[serde(rename = "none")]
    Unpaginated,
    /// 改写基础 URL 上的某个查询参数
    #[serde(rename = "query")]
    Query {
        parameter: String,
        start: u32,
        pages: u32,
    },
    /// 替换模板中的 `{page}`
    #[serde(rename = "path")]
    Path {
        template: String,
        start: u32,
        pages: u32,
    },
}

pub const PAGE_PLACEHOLDER: &str = "{page}";

impl Pagination {
    /// 校验嵌套对象；字段缺失或格式错误时降级为 `Unpaginated`
    pub fn from_value(value: &Value) -> Self {
        let map = match value {
            Value::Null => return Pagination::Unpaginated,
            Value::Object(map) => map,
            other => {
                warn!("忽略无法识别的分页配置: {}", other);
                return Pagination::Unpaginated;
            }
        };

        let text = |key: &str| {
            map.get(key)
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };
        let number = |key: &str, fallback: u32| match map.get(key) {
            Some(Value::Number(n)) => n.as_u64().map(|n| n.min(u32::MAX as u64) as u32),
            Some(Value::String(s)) => s.trim().parse::<u32>().ok(),
            Some(Value::Null) | None => Some(fallback),
            Some(_) => None,
        };

        let (Some(start), Some(pages)) = (number("start", 1), number("pages", 1)) else {
            warn!("分页配置的 start/pages 不是数字，已忽略: {}", value);
            return Pagination::Unpaginated;
        };
        let pages = pages.max(1);

        match text("strategy").as_deref().unwrap_or("query") {
            "query" => match text("parameter") {
                Some(parameter) => Pagination::Query {
                    parameter,
                    start,
                    pages,
                },
                None => {
                    warn!("查询分页缺少参数名，仅使用基础 URL");
                    Pagination::Unpaginated
                }
            },
            "path" => match text("template") {
                Some(template) if template.contains(PAGE_PLACEHOLDER) => Pagination::Path {
                    template,
                    start,
                    pages,
                },
                _ => {
                    warn!("路径分页缺少 {{page}} 模板，仅使用基础 URL");
                    Pagination::Unpaginated
                }
            },
            "none" => Pagination::Unpaginated,
            other => {
                warn!("未知分页策略 '{}'，仅使用基础 URL", other);
                Pagination::Unpaginated
            }
        }
    }

    pub fn is_paginated(&self) -> bool {
        !matches!(self, Pagination::Unpaginated)
    }
}

pub fn deserialize_pagination<'de, D>(deserializer: D) -> Result<Pagination, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(Pagination::from_value(&value))
}

/// 追踪站点
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedSite {
    pub id: String,
    pub label: String,
    pub url: String,
    #[serde(default, deserialize_with = "deserialize_pagination")]
    pub pagination: Pagination,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub series_url_template: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chapter_url_template: Option<String>,
    #[serde(default)]
    pub cookies: Vec<StoredCookie>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reauthenticated_at: Option<DateTime<Utc>>,
}

impl TrackedSite {
    pub fn host(&self) -> String {
        normalize_host(&self.url)
    }

    /// 匹配结果中展示的站点名；标签为空时使用主机名
    pub fn source_label(&self) -> String {
        let label = self.label.trim();
        if label.is_empty() {
            self.host()
        } else {
            label.to_string()
        }
    }
}

/// 追踪作品
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedSeries {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    /// 站点 id → 该站点上的作品名
    #[serde(default)]
    pub site_names: HashMap<String, String>,
}

impl TrackedSeries {
    /// 作品在 `site_id` 上可能使用的全部名称
    pub fn names_for_site<'a>(&'a self, site_id: &str) -> impl Iterator<Item = &'a str> {
        std::iter::once(self.title.as_str())
            .chain(self.aliases.iter().map(String::as_str))
            .chain(self.site_names.get(site_id).map(String::as_str))
    }

    pub fn all_names(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.title.as_str())
            .chain(self.aliases.iter().map(String::as_str))
            .chain(self.site_names.values().map(String::as_str))
    }
}

/// 某站点上某作品的一条章节记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChapterListing {
    pub label: String,
    pub number: Option<f64>,
    pub link: Option<String>,
    pub detected_at: DateTime<Utc>,
}

/// 单个站点对单部作品的匹配结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceHit {
    pub site: String,
    pub site_id: String,
    pub link: Option<String>,
    pub latest_chapter: Option<String>,
    pub latest_chapter_number: Option<f64>,
    #[serde(default)]
    pub chapters: Vec<ChapterListing>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub series_url_template: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chapter_url_template: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Match {
    pub series_id: String,
    pub title: String,
    pub sources: Vec<SourceHit>,
}
