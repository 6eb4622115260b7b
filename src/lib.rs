//! Filter Config - 过滤器配置订阅与热重载服务
//!
//! 请求处理流水线中的过滤器通过本服务订阅命名的配置资源：
//! - 订阅时立即收到一次初始配置
//! - 资源变化后收到新的配置
//! - 按目标类型缓存并复用解析器
//! - 向状态汇报器上报每个过滤器的加载结果
//! - 配置错误只影响对应的订阅，不会中断宿主进程

pub mod config;
pub mod error;
pub mod logging;
pub mod settings;
pub mod status;

// 重新导出主要类型
pub use config::{
    ChangeRouter, ConfigurationService, ResourceResolver, UpdateListener, UpdateManager,
};
pub use error::{ConfigServiceError, FailureKind, LoadError, UpdateFailed};
pub use settings::ServiceSettings;
pub use status::{ConfigurationInformation, ReportingSink};

/// 应用程序版本信息
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// 应用程序名称
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
