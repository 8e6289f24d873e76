//! 日志系统模块
//!
//! 基于 tracing 生态为宿主进程配置日志输出：
//!
//! - 多级别日志与 `RUST_LOG` 过滤
//! - 结构化日志（JSON 格式输出）
//! - 文件日志输出（异步非阻塞，按时间轮转）
//!
//! 扩展模块面向用户的消息经由 [`Host`](crate::api::host::Host) 协作者输出，
//! 默认实现 [`TracingHost`](crate::api::host::TracingHost) 最终也落到这里配置的订阅者上。
//!
//! # 示例
//!
//! ```rust,no_run
//! use addon_host::utils::logger::{Logger, LoggerConfig, RotationStrategy};
//!
//! let _guard = Logger::init(
//!     LoggerConfig::builder()
//!         .level("debug")
//!         .file_output("./logs")
//!         .rotation(RotationStrategy::Hourly)
//!         .build(),
//! )
//! .unwrap();
//!
//! tracing::info!(module = "Economy", version = "1.2.0", "模块已启用");
//! ```

use crate::core::config::LogConfig;
use crate::utils::{CoreError, Result};
use std::io;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::OnceLock;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer, Registry};

/// 默认日志文件前缀
const DEFAULT_FILE_PREFIX: &str = "addon-host";

// ============================================================================
// 日志轮转策略
// ============================================================================

/// 日志轮转策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RotationStrategy {
    /// 不轮转（单个日志文件）
    Never,
    /// 每小时轮转
    Hourly,
    /// 每天轮转（默认）
    #[default]
    Daily,
}

impl RotationStrategy {
    fn to_rotation(self) -> Rotation {
        match self {
            RotationStrategy::Never => Rotation::NEVER,
            RotationStrategy::Hourly => Rotation::HOURLY,
            RotationStrategy::Daily => Rotation::DAILY,
        }
    }
}

impl FromStr for RotationStrategy {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "never" | "none" => Ok(RotationStrategy::Never),
            "hourly" | "hour" => Ok(RotationStrategy::Hourly),
            "daily" | "day" => Ok(RotationStrategy::Daily),
            other => Err(CoreError::InvalidConfigValue {
                key: "logging.rotation".to_string(),
                reason: format!("未知的轮转策略 '{}'", other),
            }),
        }
    }
}

impl std::fmt::Display for RotationStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RotationStrategy::Never => write!(f, "never"),
            RotationStrategy::Hourly => write!(f, "hourly"),
            RotationStrategy::Daily => write!(f, "daily"),
        }
    }
}

// ============================================================================
// 日志配置
// ============================================================================

/// 日志系统配置
#[derive(Debug, Clone)]
pub struct LoggerConfig {
    /// 默认日志级别（例如 "trace", "debug", "info", "warn", "error"）
    pub level: String,

    /// 是否使用 JSON 格式输出
    pub json_format: bool,

    /// 是否输出到控制台
    pub console_output: bool,

    /// 文件输出目录（None 表示不输出到文件）
    pub file_output: Option<PathBuf>,

    /// 日志文件名前缀
    pub file_prefix: String,

    /// 日志轮转策略
    pub rotation: RotationStrategy,

    /// 保留的日志文件数，0 表示不清理
    pub max_files: usize,

    /// 是否显示目标模块
    pub show_target: bool,

    /// 是否启用 ANSI 颜色（控制台输出）
    pub ansi_colors: bool,

    /// 自定义过滤指令（EnvFilter 格式），例如 "addon_host::module=debug"
    pub filter_directives: Option<String>,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
            console_output: true,
            file_output: None,
            file_prefix: DEFAULT_FILE_PREFIX.to_string(),
            rotation: RotationStrategy::Daily,
            max_files: 0,
            show_target: true,
            ansi_colors: true,
            filter_directives: None,
        }
    }
}

impl LoggerConfig {
    /// 创建配置构建器
    pub fn builder() -> LoggerConfigBuilder {
        LoggerConfigBuilder::default()
    }

    /// 从宿主配置中的 [`LogConfig`] 创建
    ///
    /// 无法识别的轮转策略回退为按天轮转
    pub fn from_log_config(log_config: &LogConfig) -> Self {
        Self {
            level: log_config.level.clone(),
            json_format: log_config.json_format,
            file_output: if log_config.file_output {
                log_config.log_dir.clone()
            } else {
                None
            },
            rotation: log_config.rotation.parse().unwrap_or_default(),
            max_files: log_config.max_files,
            ..Default::default()
        }
    }

    fn env_filter(&self) -> Result<EnvFilter> {
        if let Ok(filter) = EnvFilter::try_from_default_env() {
            return Ok(filter);
        }

        let mut directives = self.level.clone();
        if let Some(ref extra) = self.filter_directives {
            directives.push(',');
            directives.push_str(extra);
        }

        EnvFilter::try_new(&directives).map_err(|e| CoreError::InvalidConfigValue {
            key: "logging.level".to_string(),
            reason: e.to_string(),
        })
    }
}

/// 日志配置构建器
#[derive(Debug, Default)]
pub struct LoggerConfigBuilder {
    config: LoggerConfig,
}

impl LoggerConfigBuilder {
    /// 设置日志级别
    pub fn level(mut self, level: impl Into<String>) -> Self {
        self.config.level = level.into();
        self
    }

    /// 启用 JSON 格式输出
    pub fn json_format(mut self, enable: bool) -> Self {
        self.config.json_format = enable;
        self
    }

    /// 设置控制台输出
    pub fn console_output(mut self, enable: bool) -> Self {
        self.config.console_output = enable;
        self
    }

    /// 设置文件输出目录
    pub fn file_output(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.file_output = Some(dir.into());
        self
    }

    /// 设置日志文件前缀
    pub fn file_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.file_prefix = prefix.into();
        self
    }

    /// 设置轮转策略
    pub fn rotation(mut self, strategy: RotationStrategy) -> Self {
        self.config.rotation = strategy;
        self
    }

    /// 设置保留的日志文件数
    pub fn max_files(mut self, count: usize) -> Self {
        self.config.max_files = count;
        self
    }

    /// 显示目标模块
    pub fn show_target(mut self, enable: bool) -> Self {
        self.config.show_target = enable;
        self
    }

    /// 启用 ANSI 颜色
    pub fn ansi_colors(mut self, enable: bool) -> Self {
        self.config.ansi_colors = enable;
        self
    }

    /// 设置过滤指令
    pub fn filter_directives(mut self, directives: impl Into<String>) -> Self {
        self.config.filter_directives = Some(directives.into());
        self
    }

    /// 构建配置
    pub fn build(self) -> LoggerConfig {
        self.config
    }
}

// ============================================================================
// 日志守卫
// ============================================================================

/// 日志系统守卫
///
/// 持有非阻塞写入器的 WorkerGuard，丢弃时会等待挂起的日志写入完成。
#[derive(Default)]
pub struct LogGuard {
    _guards: Vec<WorkerGuard>,
}

impl LogGuard {
    /// 守卫是否持有写入器（重复初始化时返回的守卫为空）
    pub fn is_active(&self) -> bool {
        !self._guards.is_empty()
    }
}

// ============================================================================
// 日志系统
// ============================================================================

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// 日志系统
pub struct Logger;

impl Logger {
    /// 初始化日志系统
    ///
    /// # Arguments
    ///
    /// * `config` - 日志配置
    ///
    /// # Returns
    ///
    /// 返回 `LogGuard`，必须保持活动状态直到程序退出
    ///
    /// # Errors
    ///
    /// 日志系统已初始化或过滤指令无效时返回错误
    pub fn init(config: LoggerConfig) -> Result<LogGuard> {
        if LOGGER_INITIALIZED.get().is_some() {
            return Err(CoreError::Internal(
                "日志系统已初始化，不能重复初始化".to_string(),
            ));
        }

        let env_filter = config.env_filter()?;
        let mut guard = LogGuard::default();
        let mut layers: Vec<BoxedLayer> = Vec::new();

        if config.console_output {
            let (writer, console_guard) = tracing_appender::non_blocking(io::stdout());
            guard._guards.push(console_guard);
            layers.push(Self::layer(&config, writer, config.ansi_colors));
        }

        if let Some(ref log_dir) = config.file_output {
            let mut builder = RollingFileAppender::builder()
                .rotation(config.rotation.to_rotation())
                .filename_prefix(&config.file_prefix)
                .filename_suffix("log");
            if config.max_files > 0 {
                builder = builder.max_log_files(config.max_files);
            }
            let appender = builder.build(log_dir).map_err(|e| {
                CoreError::ConfigLoadFailed(format!("无法创建日志文件 {}: {}", log_dir.display(), e))
            })?;
            let (writer, file_guard) = tracing_appender::non_blocking(appender);
            guard._guards.push(file_guard);
            layers.push(Self::layer(&config, writer, false));
        }

        tracing_subscriber::registry()
            .with(layers)
            .with(env_filter)
            .try_init()
            .map_err(|e| CoreError::Internal(format!("日志系统初始化失败: {}", e)))?;

        let _ = LOGGER_INITIALIZED.set(());
        Ok(guard)
    }

    /// 尝试初始化日志系统（不会失败）
    ///
    /// 已初始化时返回空守卫，适用于测试或多次调用初始化的场景。
    pub fn try_init(config: LoggerConfig) -> LogGuard {
        Self::init(config).unwrap_or_default()
    }

    fn layer(
        config: &LoggerConfig,
        writer: tracing_appender::non_blocking::NonBlocking,
        ansi: bool,
    ) -> BoxedLayer {
        if config.json_format {
            fmt::layer()
                .json()
                .with_writer(writer)
                .with_target(config.show_target)
                .with_ansi(false)
                .boxed()
        } else {
            fmt::layer()
                .with_writer(writer)
                .with_target(config.show_target)
                .with_ansi(ansi)
                .boxed()
        }
    }
}

// ============================================================================
// 结构化日志字段定义
// ============================================================================

/// 标准日志字段名称
pub mod fields {
    /// 模块名字段
    pub const MODULE: &str = "module";
    /// 模块版本字段
    pub const VERSION: &str = "version";
    /// 入口点字段
    pub const ENTRY_POINT: &str = "entry_point";
    /// 归档路径字段
    pub const ARCHIVE: &str = "archive";
    /// 模块状态字段
    pub const STATE: &str = "state";
    /// 生命周期钩子字段
    pub const HOOK: &str = "hook";
    /// 符号名字段
    pub const SYMBOL: &str = "symbol";
    /// 事件原因字段
    pub const REASON: &str = "reason";
    /// 错误码字段
    pub const ERROR_CODE: &str = "error_code";
    /// 耗时字段（毫秒）
    pub const DURATION_MS: &str = "duration_ms";
}

/// 创建带模块上下文的 span
///
/// ```rust,ignore
/// let span = addon_host::module_span!("Economy", "onEnable");
/// let _enter = span.enter();
/// ```
#[macro_export]
macro_rules! module_span {
    ($module:expr, $hook:expr) => {
        tracing::info_span!("module_hook", module = %$module, hook = %$hook)
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rotation_strategy_parse() {
        assert_eq!("daily".parse::<RotationStrategy>().unwrap(), RotationStrategy::Daily);
        assert_eq!("HOUR".parse::<RotationStrategy>().unwrap(), RotationStrategy::Hourly);
        assert_eq!("none".parse::<RotationStrategy>().unwrap(), RotationStrategy::Never);
        assert!("weekly".parse::<RotationStrategy>().is_err());
        assert_eq!(RotationStrategy::Hourly.to_string(), "hourly");
    }

    #[test]
    fn test_from_log_config() {
        let log_config = LogConfig {
            level: "debug".to_string(),
            file_output: true,
            log_dir: Some(PathBuf::from("/tmp/addon-logs")),
            json_format: true,
            rotation: "weekly".to_string(),
            max_files: 3,
        };

        let config = LoggerConfig::from_log_config(&log_config);
        assert_eq!(config.level, "debug");
        assert!(config.json_format);
        assert_eq!(config.file_output, Some(PathBuf::from("/tmp/addon-logs")));
        assert_eq!(config.rotation, RotationStrategy::Daily);
        assert_eq!(config.file_prefix, DEFAULT_FILE_PREFIX);
        assert_eq!(config.max_files, 3);
    }

    #[test]
    fn test_file_output_ignored_when_disabled() {
        let log_config = LogConfig {
            log_dir: Some(PathBuf::from("/tmp/unused")),
            ..Default::default()
        };
        assert!(LoggerConfig::from_log_config(&log_config).file_output.is_none());
    }

    #[test]
    fn test_builder() {
        let config = LoggerConfig::builder()
            .level("warn")
            .json_format(true)
            .console_output(false)
            .file_prefix("host")
            .filter_directives("addon_host::module=trace")
            .build();

        assert_eq!(config.level, "warn");
        assert!(config.json_format);
        assert!(!config.console_output);
        assert_eq!(config.file_prefix, "host");
        assert!(config.env_filter().is_ok());
    }

    #[test]
    fn test_try_init_twice() {
        let config = LoggerConfig::builder().console_output(false).build();
        let _first = Logger::try_init(config.clone());
        let second = Logger::try_init(config);
        assert!(!second.is_active());
    }
}
