//! 会话总线引导 (Session Bus Bootstrap)
//!
//! POSIX 桌面环境下浏览器读取 Cookie 存储 (密钥环) 依赖 D-Bus 会话总线。
//! 若当前进程没有可用总线，尝试通过 `dbus-launch` 启动一个并解析其输出。

use std::future::Future;

use tokio::process::Command;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::core::error::CaptureError;

pub const BUS_ADDRESS_VAR: &str = "DBUS_SESSION_BUS_ADDRESS";
pub const BUS_PID_VAR: &str = "DBUS_SESSION_BUS_PID";

/// 解析 `KEY=VALUE` 形式的输出行，忽略空行与非法行
pub fn parse_env_lines(output: &str) -> Vec<(String, String)> {
    output
        .lines()
        .map(str::trim)
        .filter_map(|line| line.split_once('='))
        .map(|(key, value)| (key.trim(), value.trim().trim_end_matches(';').trim_matches(['\'', '"'])))
        .filter(|(key, _)| !key.is_empty() && key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'))
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect()
}

/// 本进程启动的会话总线；整个进程生命周期内复用
static LAUNCHED_BUS: OnceCell<Vec<(String, String)>> = OnceCell::const_new();

/// 确保有可用的会话总线，返回需注入浏览器进程的环境变量
///
/// 已存在总线时返回空列表；非 POSIX 平台无需总线。
pub async fn ensure_session_bus() -> Result<Vec<(String, String)>, CaptureError> {
    if !cfg!(unix) {
        return Ok(Vec::new());
    }
    if std::env::var_os(BUS_ADDRESS_VAR).is_some_and(|v| !v.is_empty()) {
        debug!("已检测到会话总线");
        return Ok(Vec::new());
    }
    reuse_or_launch(&LAUNCHED_BUS, launch_session_bus).await
}

/// 已启动过则直接返回缓存的变量；启动失败不缓存，下次调用会重试
pub async fn reuse_or_launch<F, Fut>(
    cell: &OnceCell<Vec<(String, String)>>,
    launch: F,
) -> Result<Vec<(String, String)>, CaptureError>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Vec<(String, String)>, CaptureError>>,
{
    if cell.initialized() {
        debug!("复用已启动的会话总线");
    }
    cell.get_or_try_init(launch).await.cloned()
}

async fn launch_session_bus() -> Result<Vec<(String, String)>, CaptureError> {
    info!("未检测到会话总线，正在尝试 dbus-launch...");
    let output = Command::new("dbus-launch")
        .output()
        .await
        .map_err(|e| CaptureError::Unavailable(format!("no session bus and dbus-launch failed: {}", e)))?;

    if !output.status.success() {
        return Err(CaptureError::Unavailable(format!(
            "dbus-launch exited with {}",
            output.status
        )));
    }

    let vars = parse_env_lines(&String::from_utf8_lossy(&output.stdout));
    if !vars.iter().any(|(key, _)| key == BUS_ADDRESS_VAR) {
        return Err(CaptureError::Unavailable(
            "dbus-launch did not report a session bus address".into(),
        ));
    }
    let pid = vars
        .iter()
        .find(|(key, _)| key == BUS_PID_VAR)
        .map(|(_, value)| value.as_str())
        .unwrap_or("?");
    info!("会话总线已启动 (pid {})，后续捕获将复用", pid);
    Ok(vars)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn parses_dbus_launch_output() {
        let out = "DBUS_SESSION_BUS_ADDRESS=unix:path=/tmp/dbus-abc,guid=123\nDBUS_SESSION_BUS_PID=4242\n\nnoise line\n";
        let vars = parse_env_lines(out);
        assert_eq!(
            vars,
            vec![
                (BUS_ADDRESS_VAR.to_string(), "unix:path=/tmp/dbus-abc,guid=123".to_string()),
                ("DBUS_SESSION_BUS_PID".to_string(), "4242".to_string()),
            ]
        );
    }

    #[test]
    fn parses_shell_syntax_output() {
        let out = "DBUS_SESSION_BUS_ADDRESS='unix:abstract=/tmp/x';\nexport DBUS_SESSION_BUS_ADDRESS;";
        let vars = parse_env_lines(out);
        assert_eq!(vars.len(), 1);
        assert_eq!(vars[0].1, "unix:abstract=/tmp/x");
    }

    #[tokio::test]
    async fn launched_bus_is_reused() {
        let cell = OnceCell::new();
        let counter = AtomicUsize::new(0);
        let launches = &counter;
        let launch = move || async move {
            launches.fetch_add(1, Ordering::SeqCst);
            Ok(vec![(BUS_ADDRESS_VAR.to_string(), "unix:path=/tmp/bus".to_string())])
        };

        let first = reuse_or_launch(&cell, launch).await.unwrap();
        let second = reuse_or_launch(&cell, launch).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_launch_is_retried() {
        let cell = OnceCell::new();
        let err = reuse_or_launch(&cell, || async {
            Err(CaptureError::Unavailable("dbus-launch missing".into()))
        })
        .await
        .unwrap_err();
        assert!(matches!(err, CaptureError::Unavailable(_)));
        assert!(!cell.initialized());

        let vars = reuse_or_launch(&cell, || async { Ok(vec![(BUS_PID_VAR.to_string(), "7".to_string())]) })
            .await
            .unwrap();
        assert_eq!(vars.len(), 1);
    }
}
