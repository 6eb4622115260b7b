//! 配置资源抽象
//!
//! 资源的定位方式（文件系统、类路径、URL）由解析器实现决定，本模块只定义接口，
//! 另外提供一个纯内存实现供宿主直接注入配置内容。

use crate::error::ResolutionError;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

/// 可读取、可监控的配置资源
pub trait ConfigurationResource: Send + Sync + fmt::Debug {
    /// 资源名称，同一个名称总是解析为同一个资源
    fn name(&self) -> &str;

    /// 读取资源当前的内容
    fn read(&self) -> std::io::Result<Vec<u8>>;
}

/// 共享的资源句柄
pub type ResourceHandle = Arc<dyn ConfigurationResource>;

/// 将配置名称映射为资源句柄
pub trait ResourceResolver: Send + Sync {
    fn resolve(&self, name: &str) -> Result<ResourceHandle, ResolutionError>;
}

/// 内容保存在内存中的配置资源
#[derive(Debug)]
pub struct StaticResource {
    name: String,
    content: RwLock<Option<Vec<u8>>>,
}

impl StaticResource {
    pub fn new(name: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            content: RwLock::new(Some(content.into())),
        }
    }

    /// 替换资源内容
    pub fn set_content(&self, content: impl Into<Vec<u8>>) {
        let mut guard = self.content.write().unwrap_or_else(|e| e.into_inner());
        *guard = Some(content.into());
    }

    /// 移除资源内容，之后的读取会返回 NotFound
    pub fn remove(&self) {
        let mut guard = self.content.write().unwrap_or_else(|e| e.into_inner());
        *guard = None;
    }
}

impl ConfigurationResource for StaticResource {
    fn name(&self) -> &str {
        &self.name
    }

    fn read(&self) -> std::io::Result<Vec<u8>> {
        let guard = self.content.read().unwrap_or_else(|e| e.into_inner());
        guard.clone().ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{} (资源内容不存在)", self.name),
            )
        })
    }
}

/// 基于内存表的资源解析器
#[derive(Debug, Default)]
pub struct StaticResolver {
    resources: RwLock<HashMap<String, Arc<StaticResource>>>,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册（或替换）一个资源，返回资源本身以便后续修改内容
    pub fn insert(&self, name: impl Into<String>, content: impl Into<Vec<u8>>) -> Arc<StaticResource> {
        let name = name.into();
        let resource = Arc::new(StaticResource::new(name.clone(), content));
        let mut resources = self.resources.write().unwrap_or_else(|e| e.into_inner());
        resources.insert(name, Arc::clone(&resource));
        resource
    }

    pub fn get(&self, name: &str) -> Option<Arc<StaticResource>> {
        let resources = self.resources.read().unwrap_or_else(|e| e.into_inner());
        resources.get(name).cloned()
    }
}

impl ResourceResolver for StaticResolver {
    fn resolve(&self, name: &str) -> Result<ResourceHandle, ResolutionError> {
        if name.trim().is_empty() {
            return Err(ResolutionError::Invalid {
                name: name.to_string(),
                reason: "配置名称为空".to_string(),
            });
        }

        let resources = self.resources.read().unwrap_or_else(|e| e.into_inner());
        resources
            .get(name)
            .map(|resource| Arc::clone(resource) as ResourceHandle)
            .ok_or_else(|| ResolutionError::NotFound {
                name: name.to_string(),
            })
    }
}
