//! # Logging 模块
//!
//! 初始化 `tracing` 日志输出。

use tracing::level_filters::LevelFilter;
use tracing::warn;

use crate::config::LogConfig;

/// 安装 fmt 订阅者
///
/// 日志写到 stderr，stdout 留给 `--json` 等机器可读输出。
/// 已经安装过订阅者时返回 `false`（测试中可以重复调用）。
pub fn init(config: &LogConfig) -> bool {
    let (level, unknown) = match config.level.parse::<LevelFilter>() {
        Ok(level) => (level, false),
        Err(_) => (LevelFilter::INFO, true),
    };

    let installed = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_ansi(config.ansi)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .is_ok();

    if installed && unknown {
        warn!(level = %config.level, "未知的日志级别，使用 info");
    }
    installed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_repeatable() {
        let config = LogConfig {
            level: "nonsense".to_string(),
            ansi: false,
        };
        init(&config);
        assert!(!init(&config));
    }
}
