//! 单元测试共用的假协作组件

use crate::config::listener::UpdateListener;
use crate::config::resource::ConfigurationResource;
use crate::error::UpdateFailed;
use crate::status::ReportingSink;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Report {
    Success {
        filter: String,
        ready: bool,
        resource: String,
    },
    Failure {
        filter: String,
        resource: String,
        reason: String,
    },
}

/// 记录所有上报
#[derive(Default)]
pub struct RecordingSink {
    reports: Mutex<Vec<Report>>,
}

impl RecordingSink {
    pub fn reports(&self) -> Vec<Report> {
        self.reports.lock().unwrap().clone()
    }

    pub fn failures(&self) -> Vec<String> {
        self.reports()
            .into_iter()
            .filter_map(|report| match report {
                Report::Failure { reason, .. } => Some(reason),
                Report::Success { .. } => None,
            })
            .collect()
    }
}

impl ReportingSink for RecordingSink {
    fn report_success(&self, filter_name: &str, ready: bool, resource: &dyn ConfigurationResource) {
        self.reports.lock().unwrap().push(Report::Success {
            filter: filter_name.to_string(),
            ready,
            resource: resource.name().to_string(),
        });
    }

    fn report_failure(&self, filter_name: &str, resource: &dyn ConfigurationResource, reason: &str) {
        self.reports.lock().unwrap().push(Report::Failure {
            filter: filter_name.to_string(),
            resource: resource.name().to_string(),
            reason: reason.to_string(),
        });
    }
}

/// 记录收到的配置
pub struct RecordingListener<T> {
    updates: Mutex<Vec<T>>,
    ready: AtomicBool,
    becomes_ready: bool,
    reject: Option<UpdateFailed>,
}

impl<T: Clone> RecordingListener<T> {
    /// 第一次更新后就绪
    pub fn ready_after_update() -> Self {
        Self::build(true, None)
    }

    /// 永远不会就绪
    pub fn never_ready() -> Self {
        Self::build(false, None)
    }

    /// 拒绝所有更新
    pub fn rejecting(reason: UpdateFailed) -> Self {
        Self::build(false, Some(reason))
    }

    fn build(becomes_ready: bool, reject: Option<UpdateFailed>) -> Self {
        Self {
            updates: Mutex::new(Vec::new()),
            ready: AtomicBool::new(false),
            becomes_ready,
            reject,
        }
    }

    pub fn updates(&self) -> Vec<T> {
        self.updates.lock().unwrap().clone()
    }
}

impl<T: Clone + Send> UpdateListener<T> for RecordingListener<T> {
    fn on_update(&self, value: T) -> Result<(), UpdateFailed> {
        if let Some(reason) = &self.reject {
            return Err(reason.clone());
        }
        self.updates.lock().unwrap().push(value);
        if self.becomes_ready {
            self.ready.store(true, Ordering::SeqCst);
        }
        Ok(())
    }

    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }
}
