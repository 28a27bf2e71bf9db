//! 分页 URL 构建 (Page URL Builder)
//!
//! 将一个站点配置展开为一个或多个页面 URL。分页只是增强手段，
//! 任何无法使用的配置都回退到站点基础 URL。

use tracing::warn;
use url::Url;

use crate::core::model::{PAGE_PLACEHOLDER, Pagination, TrackedSite};

pub fn build_page_urls(site: &TrackedSite) -> Vec<String> {
    page_urls(&site.url, &site.pagination)
}

/// 按 `pagination` 生成 `pages` 个 URL，页码从 `start` 开始
pub fn page_urls(base_url: &str, pagination: &Pagination) -> Vec<String> {
    match pagination {
        Pagination::Unpaginated => vec![base_url.to_string()],
        Pagination::Query {
            parameter,
            start,
            pages,
        } => {
            let Ok(base) = Url::parse(base_url) else {
                warn!("无法解析基础 URL，跳过分页: {}", base_url);
                return vec![base_url.to_string()];
            };
            page_numbers(*start, *pages)
                .map(|page| with_query_page(&base, parameter, page))
                .collect()
        }
        Pagination::Path {
            template,
            start,
            pages,
        } => {
            if !template.contains(PAGE_PLACEHOLDER) {
                return vec![base_url.to_string()];
            }
            page_numbers(*start, *pages)
                .map(|page| template.replace(PAGE_PLACEHOLDER, &page.to_string()))
                .collect()
        }
    }
}

fn page_numbers(start: u32, pages: u32) -> impl Iterator<Item = u64> {
    let start = u64::from(start);
    start..start + u64::from(pages.max(1))
}

/// 设置查询参数：保留其余参数，目标参数只保留一个值
fn with_query_page(base: &Url, parameter: &str, page: u64) -> String {
    let page = page.to_string();
    let mut replaced = false;
    let mut pairs: Vec<(String, String)> = Vec::new();
    for (key, value) in base.query_pairs() {
        if key == parameter {
            if !replaced {
                pairs.push((key.into_owned(), page.clone()));
                replaced = true;
            }
        } else {
            pairs.push((key.into_owned(), value.into_owned()));
        }
    }
    if !replaced {
        pairs.push((parameter.to_string(), page));
    }

    let mut url = base.clone();
    url.query_pairs_mut().clear().extend_pairs(pairs);
    url.to_string()
}
