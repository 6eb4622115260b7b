//! 日志系统模块
//!
//! 提供结构化日志配置和初始化功能

use log::LevelFilter;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, OnceLock};
use tracing_subscriber::{fmt, prelude::*, registry, EnvFilter, Layer};

/// 全局日志初始化状态
#[derive(Debug, Default)]
struct GlobalLoggingState {
    /// 是否已初始化
    initialized: bool,
    /// 初始化失败时的错误信息
    init_error: Option<String>,
    /// 当前配置
    current_config: Option<LogConfig>,
}

/// 全局日志状态管理器
static GLOBAL_LOGGING_STATE: OnceLock<Mutex<GlobalLoggingState>> = OnceLock::new();

/// 日志配置结构
#[derive(Debug, Clone, PartialEq)]
pub struct LogConfig {
    /// 日志级别
    pub level: LevelFilter,
    /// 是否使用JSON格式
    pub json_format: bool,
    /// 模块级别日志控制
    pub module_levels: HashMap<String, LevelFilter>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LevelFilter::Info,
            json_format: false,
            module_levels: HashMap::new(),
        }
    }
}

/// 日志系统管理器
pub struct LoggingSystem;

impl LoggingSystem {
    /// 初始化日志系统
    ///
    /// 重复调用不会重复安装订阅器，之前的初始化结果会被复用。
    pub fn setup_logging(config: LogConfig) -> anyhow::Result<()> {
        Self::setup_logging_with_options(config, false)
    }

    /// 初始化日志系统（带选项）
    ///
    /// # 参数
    /// * `config` - 日志配置
    /// * `force_reinit` - 是否强制重新初始化（主要用于测试）
    pub fn setup_logging_with_options(config: LogConfig, force_reinit: bool) -> anyhow::Result<()> {
        {
            let state = Self::state();
            if state.initialized && !force_reinit {
                return match &state.init_error {
                    None => Ok(()),
                    Some(e) => Err(anyhow::anyhow!("日志系统之前初始化失败: {}", e)),
                };
            }
        }

        let result = Self::perform_initialization(&config);

        let mut state = Self::state();
        state.initialized = true;
        state.current_config = Some(config);
        state.init_error = result.as_ref().err().map(|e| e.to_string());
        result
    }

    /// 检查日志系统是否已初始化
    pub fn is_initialized() -> bool {
        Self::state().initialized
    }

    /// 获取当前日志配置（如果已初始化）
    pub fn current_config() -> Option<LogConfig> {
        Self::state().current_config.clone()
    }

    /// 重置日志系统状态（主要用于测试）
    #[cfg(test)]
    pub fn reset_for_testing() {
        let mut state = Self::state();
        *state = GlobalLoggingState::default();
    }

    fn state() -> MutexGuard<'static, GlobalLoggingState> {
        GLOBAL_LOGGING_STATE
            .get_or_init(|| Mutex::new(GlobalLoggingState::default()))
            .lock()
            .unwrap_or_else(|e| e.into_inner())
    }

    fn perform_initialization(config: &LogConfig) -> anyhow::Result<()> {
        Self::bridge_log_records(config.level);
        Self::init_tracing_subscriber(config)
    }

    /// 把 `log` 记录转发到 tracing，宿主已经安装了 logger 时沿用宿主的
    fn bridge_log_records(level: LevelFilter) {
        if let Err(e) = tracing_log::LogTracer::builder().with_max_level(level).init() {
            tracing::debug!("log 记录桥接已存在: {}", e);
        }
    }

    /// 初始化 tracing subscriber
    fn init_tracing_subscriber(config: &LogConfig) -> anyhow::Result<()> {
        let mut env_filter = EnvFilter::from_default_env().add_directive(
            Self::level_to_string(config.level)
                .parse()
                .map_err(|e| anyhow::anyhow!("无效的日志级别指令: {}", e))?,
        );

        // 添加模块级别过滤
        for (module, level) in &config.module_levels {
            let directive = format!("{}={}", module, Self::level_to_string(*level))
                .parse()
                .map_err(|e| anyhow::anyhow!("无效的模块日志指令 {}: {}", module, e))?;
            env_filter = env_filter.add_directive(directive);
        }

        let fmt_layer = if config.json_format {
            fmt::layer()
                .json()
                .with_timer(fmt::time::ChronoUtc::rfc_3339())
                .with_file(true)
                .with_line_number(true)
                .boxed()
        } else {
            fmt::layer()
                .with_timer(fmt::time::ChronoUtc::rfc_3339())
                .with_ansi(true)
                .with_file(true)
                .with_line_number(true)
                .with_thread_names(true)
                .boxed()
        };

        match registry().with(env_filter).with(fmt_layer).try_init() {
            Ok(()) => {
                tracing::info!("日志系统初始化完成");
                tracing::debug!("日志配置: {:?}", config);
                Ok(())
            }
            Err(e) => {
                let error_msg = e.to_string();
                if error_msg.contains("a global default trace dispatcher has already been set")
                    || error_msg.contains(
                        "attempted to set a logger after the logging system was already initialized",
                    )
                {
                    // 已经由宿主或之前的调用安装过订阅器
                    tracing::debug!("日志系统已经初始化过了");
                    Ok(())
                } else {
                    Err(anyhow::anyhow!("tracing subscriber初始化失败: {}", error_msg))
                }
            }
        }
    }

    /// 将 log::LevelFilter 转换为字符串
    fn level_to_string(level: LevelFilter) -> &'static str {
        match level {
            LevelFilter::Off => "off",
            LevelFilter::Error => "error",
            LevelFilter::Warn => "warn",
            LevelFilter::Info => "info",
            LevelFilter::Debug => "debug",
            LevelFilter::Trace => "trace",
        }
    }
}
