pub mod browser;
pub mod bus;
pub mod cookies;
pub mod middleware;
pub mod service;

pub use browser::BrowserCapture;
pub use cookies::{CaptureRequest, CookieJar, CookieSource, ManualCookies};
pub use service::HttpService;
