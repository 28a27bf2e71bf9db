pub mod pages;
pub mod pipeline;
pub mod poller;

pub use pages::build_page_urls;
pub use pipeline::{FetchPipeline, PAGE_SEPARATOR, RefreshSummary};
pub use poller::{Poller, PollerHandle, PollerMsg, SiteRefresher};
