//! 配置加载状态模块
//!
//! 记录每个过滤器的配置加载结果，供管理和诊断接口查询

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::debug;

use crate::config::resource::ConfigurationResource;

/// 状态汇报器
///
/// 每次上报相互独立，核心逻辑不会在汇报器外部加锁。
pub trait ReportingSink: Send + Sync {
    /// 上报加载成功
    fn report_success(&self, filter_name: &str, ready: bool, resource: &dyn ConfigurationResource);

    /// 上报加载失败
    fn report_failure(&self, filter_name: &str, resource: &dyn ConfigurationResource, reason: &str);
}

/// 单个过滤器的加载状态
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterLoadStatus {
    /// 过滤器名称
    pub filter_name: String,
    /// 最近一次加载的配置资源
    pub resource: String,
    /// 是否已就绪
    pub ready: bool,
    /// 最近一次失败原因，成功后清空
    pub failure_reason: Option<String>,
    /// 最后更新时间
    pub last_updated: DateTime<Utc>,
    /// 成功次数
    pub success_count: u64,
    /// 失败次数
    pub failure_count: u64,
}

/// 加载状态汇总
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadSummary {
    /// 过滤器总数
    pub total_filters: usize,
    /// 已就绪的过滤器数
    pub ready_filters: usize,
    /// 最近一次加载失败的过滤器数
    pub failed_filters: usize,
}

/// 配置加载信息表
#[derive(Debug, Clone, Default)]
pub struct ConfigurationInformation {
    /// 过滤器状态映射
    filters: Arc<RwLock<HashMap<String, FilterLoadStatus>>>,
}

impl ConfigurationInformation {
    /// 创建新的加载信息表
    pub fn new() -> Self {
        Self::default()
    }

    /// 获取单个过滤器的状态
    pub fn filter_status(&self, filter_name: &str) -> Option<FilterLoadStatus> {
        let filters = self.filters.read().unwrap_or_else(|e| e.into_inner());
        filters.get(filter_name).cloned()
    }

    /// 获取所有过滤器的状态，按名称排序
    pub fn snapshot(&self) -> Vec<FilterLoadStatus> {
        let filters = self.filters.read().unwrap_or_else(|e| e.into_inner());
        let mut statuses: Vec<FilterLoadStatus> = filters.values().cloned().collect();
        statuses.sort_by(|a, b| a.filter_name.cmp(&b.filter_name));
        statuses
    }

    /// 获取状态汇总
    pub fn summary(&self) -> LoadSummary {
        let filters = self.filters.read().unwrap_or_else(|e| e.into_inner());
        LoadSummary {
            total_filters: filters.len(),
            ready_filters: filters.values().filter(|s| s.ready).count(),
            failed_filters: filters
                .values()
                .filter(|s| s.failure_reason.is_some())
                .count(),
        }
    }

    /// 移除过滤器状态
    pub fn remove_filter(&self, filter_name: &str) -> Option<FilterLoadStatus> {
        let mut filters = self.filters.write().unwrap_or_else(|e| e.into_inner());
        filters.remove(filter_name)
    }

    fn update<F>(&self, filter_name: &str, resource: &dyn ConfigurationResource, apply: F)
    where
        F: FnOnce(&mut FilterLoadStatus),
    {
        let mut filters = self.filters.write().unwrap_or_else(|e| e.into_inner());
        let status = filters
            .entry(filter_name.to_string())
            .or_insert_with(|| FilterLoadStatus {
                filter_name: filter_name.to_string(),
                resource: resource.name().to_string(),
                ready: false,
                failure_reason: None,
                last_updated: Utc::now(),
                success_count: 0,
                failure_count: 0,
            });

        status.resource = resource.name().to_string();
        status.last_updated = Utc::now();
        apply(status);
    }
}

impl ReportingSink for ConfigurationInformation {
    fn report_success(&self, filter_name: &str, ready: bool, resource: &dyn ConfigurationResource) {
        debug!(filter = filter_name, resource = resource.name(), ready, "记录配置加载成功");
        self.update(filter_name, resource, |status| {
            status.ready = ready;
            status.failure_reason = None;
            status.success_count += 1;
        });
    }

    fn report_failure(&self, filter_name: &str, resource: &dyn ConfigurationResource, reason: &str) {
        debug!(filter = filter_name, resource = resource.name(), reason, "记录配置加载失败");
        self.update(filter_name, resource, |status| {
            status.ready = false;
            status.failure_reason = Some(reason.to_string());
            status.failure_count += 1;
        });
    }
}
