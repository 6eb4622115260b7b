//! 配置订阅模块
//!
//! 提供解析器缓存、配置加载流水线、订阅管理和热重载路由功能

pub mod cache;
pub mod listener;
pub mod parser;
pub mod pipeline;
pub mod resource;
pub mod service;
pub mod update;

#[cfg(test)]
pub(crate) mod testing;

// 重新导出主要类型
pub use cache::{EvictionPolicy, ParserCache};
pub use listener::{ListenerId, SharedListener, UpdateListener};
pub use parser::{
    parser_fn, ConfigurationParser, ConfigurationType, DocumentFormat, ParserFactory, SchemaSource,
    SerdeParser, SerdeParserFactory, SharedParser,
};
pub use pipeline::{load_config, LoadContext, Subscription, FAILED_LOADING_FILE};
pub use resource::{
    ConfigurationResource, ResourceHandle, ResourceResolver, StaticResolver, StaticResource,
};
pub use service::{ConfigurationService, ConfigurationServiceBuilder, SubscriptionRequest};
pub use update::{
    BoundSubscription, ChangeRouter, ResourceChanged, SharedWatch, UpdateManager,
    WatchedSubscription,
};
