use std::path::Path;

use tokio::fs;
use url::Url;

/// 将相对链接转换为绝对链接
pub fn to_absolute_url(base: &Url, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() {
        return None;
    }

    if let Some(path_without_slashes) = href.strip_prefix("//") {
        return Some(format!("{}://{}", base.scheme(), path_without_slashes));
    }

    if href.starts_with("http://") || href.starts_with("https://") {
        return Some(href.to_string());
    }

    base.join(href).ok().map(|u| u.to_string())
}

/// 小写主机名并去除 `www.` 前缀；无法解析为 URL 时使用原始输入
pub fn normalize_host(value: &str) -> String {
    let host = Url::parse(value.trim())
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_else(|| value.trim().to_string())
        .to_lowercase();
    match host.strip_prefix("www.") {
        Some(rest) => rest.to_string(),
        None => host,
    }
}

/// 先写临时文件再重命名
pub async fn save_file(path: impl AsRef<Path>, data: &[u8]) -> std::io::Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, data).await?;
    fs::rename(&tmp, path).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_normalization_ignores_case_and_www() {
        assert_eq!(normalize_host("https://WWW.MangaDex.org/titles"), "mangadex.org");
        assert_eq!(normalize_host("http://mangadex.org"), "mangadex.org");
        assert_eq!(normalize_host("not a url"), "not a url");
    }

    #[test]
    fn relative_links_resolve_against_base() {
        let base = Url::parse("https://reader.example/latest/").unwrap();
        assert_eq!(
            to_absolute_url(&base, "/series/one-piece").as_deref(),
            Some("https://reader.example/series/one-piece")
        );
        assert_eq!(
            to_absolute_url(&base, "//cdn.example/x").as_deref(),
            Some("https://cdn.example/x")
        );
        assert_eq!(to_absolute_url(&base, "  "), None);
    }
}
