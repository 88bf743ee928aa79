//! 日志初始化
//!
//! 基于 `tracing-subscriber`。过滤规则优先级：显式 `filter` > `RUST_LOG` > `level`。

use anyhow::Context;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tracing::Level;
use tracing_subscriber::EnvFilter;

use crate::config::Environment;

/// 无法识别的日志配置
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid log format '{0}', expected compact, full, json or pretty")]
pub struct InvalidLogFormat(String);

/// 输出格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Compact,
    Full,
    Json,
    /// 多行，适合开发
    Pretty,
}

impl FromStr for LogFormat {
    type Err = InvalidLogFormat;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(LogFormat::Compact),
            "full" => Ok(LogFormat::Full),
            "json" => Ok(LogFormat::Json),
            "pretty" => Ok(LogFormat::Pretty),
            _ => Err(InvalidLogFormat(s.to_string())),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LogFormat::Compact => "compact",
            LogFormat::Full => "full",
            LogFormat::Json => "json",
            LogFormat::Pretty => "pretty",
        })
    }
}

/// 日志配置
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: Level,
    pub format: LogFormat,
    pub show_target: bool,
    pub show_thread_ids: bool,
    pub show_thread_names: bool,
    /// `EnvFilter` 语法，例如 `gantry_core=debug,hyper=warn`
    pub filter: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            format: LogFormat::Compact,
            show_target: true,
            show_thread_ids: false,
            show_thread_names: false,
            filter: None,
        }
    }
}

impl LoggingConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    pub fn format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn show_target(mut self, show: bool) -> Self {
        self.show_target = show;
        self
    }

    pub fn show_threads(mut self, show: bool) -> Self {
        self.show_thread_ids = show;
        self.show_thread_names = show;
        self
    }

    pub fn filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    /// 读取 `LOG_LEVEL`、`LOG_FORMAT`，`RUST_LOG` 在初始化时生效
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(level) = std::env::var("LOG_LEVEL").ok().and_then(|v| v.parse().ok()) {
            config.level = level;
        }
        if let Some(format) = std::env::var("LOG_FORMAT").ok().and_then(|v| v.parse().ok()) {
            config.format = format;
        }
        config
    }

    /// 读取 `logging.*` 配置项
    pub fn from_environment(environment: &Environment) -> anyhow::Result<Self> {
        let mut config = Self::default();

        if let Some(level) = environment.get_string("logging.level") {
            config.level = level
                .parse()
                .map_err(|_| anyhow::anyhow!("Invalid logging.level '{level}'"))?;
        }
        if let Some(format) = environment.get_parsed::<LogFormat>("logging.format")? {
            config.format = format;
        }
        config.filter = environment.get_string("logging.filter");
        config.show_target = environment.get_bool_or("logging.show-target", config.show_target);
        config = config.show_threads(environment.get_bool_or("logging.show-threads", false));

        Ok(config)
    }

    pub fn env_filter(&self) -> anyhow::Result<EnvFilter> {
        match &self.filter {
            Some(filter) => EnvFilter::try_new(filter)
                .with_context(|| format!("Invalid log filter '{filter}'")),
            None => Ok(EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(self.level.as_str().to_ascii_lowercase()))),
        }
    }

    /// 安装全局订阅者，只能调用一次
    pub fn init(self) -> anyhow::Result<()> {
        let filter = self.env_filter()?;
        let builder = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(self.show_target)
            .with_thread_ids(self.show_thread_ids)
            .with_thread_names(self.show_thread_names);

        let installed = match self.format {
            LogFormat::Compact => builder.compact().try_init(),
            LogFormat::Full => builder.try_init(),
            LogFormat::Json => builder.json().try_init(),
            LogFormat::Pretty => builder.pretty().try_init(),
        };
        installed.map_err(|e| anyhow::anyhow!("Failed to install tracing subscriber: {e}"))?;

        tracing::debug!(level = %self.level, format = %self.format, "Logging initialized");
        Ok(())
    }
}
