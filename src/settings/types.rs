//! 服务配置数据结构定义
//!
//! 定义服务配置结构体和验证逻辑

use crate::config::cache::EvictionPolicy;
use crate::error::SettingsError;
use crate::logging::LogConfig;
use log::LevelFilter;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// 主配置结构
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceSettings {
    /// 解析器缓存配置
    pub parser_cache: ParserCacheSettings,
    /// 诊断输出配置
    pub diagnostics: DiagnosticsSettings,
    /// 日志配置
    pub logging: LoggingSettings,
}

/// 解析器缓存配置
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserCacheSettings {
    /// 淘汰策略
    pub eviction: EvictionPolicy,
}

/// 诊断输出配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiagnosticsSettings {
    /// 是否为非预期失败输出醒目的诊断块
    pub report_unexpected: bool,
    /// 诊断块中提示的维护者联系方式
    pub maintainer_contact: String,
}

impl Default for DiagnosticsSettings {
    fn default() -> Self {
        Self {
            report_unexpected: true,
            maintainer_contact: default_maintainer_contact(),
        }
    }
}

/// 日志配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// 日志级别
    pub level: String,
    /// 是否使用JSON格式
    pub json_format: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json_format: false,
        }
    }
}

impl LoggingSettings {
    /// 转换为日志系统配置
    pub fn to_log_config(&self) -> Result<LogConfig, SettingsError> {
        let level = LevelFilter::from_str(&self.level)
            .map_err(|_| SettingsError::ValidationError(format!("无效的日志级别: {}", self.level)))?;

        Ok(LogConfig {
            level,
            json_format: self.json_format,
            ..LogConfig::default()
        })
    }
}

// 默认值函数
fn default_log_level() -> String {
    "info".to_string()
}

fn default_maintainer_contact() -> String {
    "filter-config maintainers <https://github.com/flyGetHu/filter-config/issues>".to_string()
}

/// 配置验证函数
///
/// # 参数
/// * `settings` - 要验证的配置
///
/// # 返回
/// * `Result<(), String>` - 验证结果
pub fn validate_settings(settings: &ServiceSettings) -> Result<(), String> {
    if let EvictionPolicy::Lru { capacity } = settings.parser_cache.eviction {
        if capacity == 0 {
            return Err("LRU 解析器缓存容量必须大于0".to_string());
        }
    }

    let valid_levels = ["off", "error", "warn", "info", "debug", "trace"];
    if !valid_levels.contains(&settings.logging.level.to_lowercase().as_str()) {
        return Err(format!(
            "无效的日志级别: {}，有效值: {:?}",
            settings.logging.level, valid_levels
        ));
    }

    if settings.diagnostics.report_unexpected && settings.diagnostics.maintainer_contact.trim().is_empty() {
        return Err("启用诊断输出时必须提供维护者联系方式".to_string());
    }

    Ok(())
}
