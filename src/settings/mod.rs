//! 服务配置模块
//!
//! 提供配置订阅服务自身配置的解析与验证功能

pub mod loader;
pub mod types;

// 重新导出主要类型
pub use loader::SettingsLoader;
pub use types::{
    validate_settings, DiagnosticsSettings, LoggingSettings, ParserCacheSettings, ServiceSettings,
};
