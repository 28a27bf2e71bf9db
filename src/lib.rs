//! 漫画更新追踪核心 (Manga Tracker Core)
//!
//! 周期性抓取已配置站点并缓存快照，查询时从快照中抽取候选文本，
//! 与追踪作品做结构化模糊匹配，汇总各站点的最新章节。

pub mod api;
pub mod core;
pub mod engine;
pub mod matching;
pub mod network;
pub mod store;
pub mod text;
pub mod utils;

pub use crate::core::config::AppConfig;
pub use crate::core::error::{CaptureError, Result, TrackerError};
