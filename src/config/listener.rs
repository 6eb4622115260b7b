//! 配置更新监听器

use crate::error::UpdateFailed;
use std::fmt;
use std::sync::Arc;

/// 配置更新监听器
///
/// 每次资源解析成功后都会调用 `on_update`。`is_ready` 表示组件是否已完成首次初始化，
/// 用于决定向状态汇报器上报成功还是失败。
pub trait UpdateListener<T>: Send + Sync {
    /// 接收新解析出的配置，返回 `UpdateFailed` 表示拒绝本次更新
    fn on_update(&self, value: T) -> Result<(), UpdateFailed>;

    /// 是否已完成首次初始化
    fn is_ready(&self) -> bool;
}

/// 共享的监听器
pub type SharedListener<T> = Arc<dyn UpdateListener<T>>;

/// 监听器标识，取自监听器 `Arc` 的地址
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(usize);

impl ListenerId {
    pub fn of<T>(listener: &SharedListener<T>) -> Self {
        ListenerId(Arc::as_ptr(listener) as *const () as usize)
    }
}

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener@{:#x}", self.0)
    }
}
