//! 配置加载流水线
//!
//! 对一个订阅执行一次同步的 读取 → 解析 → 通知监听器 → 上报结果 → 失败分类。
//! 流水线从不向外返回错误：单个资源出错不能中断监控循环，也不能影响其他订阅。

use crate::config::listener::{ListenerId, SharedListener};
use crate::config::parser::SharedParser;
use crate::config::resource::ResourceHandle;
use crate::error::LoadError;
use crate::settings::DiagnosticsSettings;
use crate::status::ReportingSink;
use std::any::Any;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, error, trace, warn};

/// 监听器未就绪时上报的固定失败原因
pub const FAILED_LOADING_FILE: &str = "failed loading file";

const DIAGNOSTIC_BANNER: &str =
    "<><><><><><><><><><><><><><><><><><><><><><><><><><><><><><><><><><><><><><><><>";

/// 监听器、资源与解析器的绑定
pub struct Subscription<T> {
    filter_name: Option<String>,
    configuration_name: String,
    listener: SharedListener<T>,
    parser: SharedParser<T>,
    resource: ResourceHandle,
}

impl<T> Subscription<T> {
    /// 创建订阅，空的过滤器名称视为未提供
    pub fn new(
        filter_name: Option<String>,
        configuration_name: impl Into<String>,
        listener: SharedListener<T>,
        parser: SharedParser<T>,
        resource: ResourceHandle,
    ) -> Self {
        Self {
            filter_name: filter_name.filter(|name| !name.is_empty()),
            configuration_name: configuration_name.into(),
            listener,
            parser,
            resource,
        }
    }

    pub fn filter_name(&self) -> Option<&str> {
        self.filter_name.as_deref()
    }

    pub fn configuration_name(&self) -> &str {
        &self.configuration_name
    }

    pub fn listener(&self) -> &SharedListener<T> {
        &self.listener
    }

    pub fn listener_id(&self) -> ListenerId {
        ListenerId::of(&self.listener)
    }

    pub fn parser(&self) -> &SharedParser<T> {
        &self.parser
    }

    pub fn resource(&self) -> &ResourceHandle {
        &self.resource
    }
}

impl<T> Clone for Subscription<T> {
    fn clone(&self) -> Self {
        Self {
            filter_name: self.filter_name.clone(),
            configuration_name: self.configuration_name.clone(),
            listener: Arc::clone(&self.listener),
            parser: Arc::clone(&self.parser),
            resource: Arc::clone(&self.resource),
        }
    }
}

impl<T> fmt::Debug for Subscription<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("filter_name", &self.filter_name)
            .field("configuration_name", &self.configuration_name)
            .field("listener", &self.listener_id())
            .field("resource", &self.resource.name())
            .finish()
    }
}

/// 流水线需要的协作组件
#[derive(Clone)]
pub struct LoadContext {
    /// 状态汇报器
    pub sink: Arc<dyn ReportingSink>,
    /// 诊断输出设置
    pub diagnostics: DiagnosticsSettings,
}

impl LoadContext {
    pub fn new(sink: Arc<dyn ReportingSink>, diagnostics: DiagnosticsSettings) -> Self {
        Self { sink, diagnostics }
    }
}

/// 单次加载的结果，只在流水线内部使用
#[derive(Debug)]
pub(crate) enum LoadOutcome {
    /// 解析与分发成功
    Success,
    /// 分发成功但监听器仍未就绪
    NotReady,
    /// 解析或分发失败
    Failure(LoadError),
}

/// 对订阅执行一次加载
pub fn load_config<T>(subscription: &Subscription<T>, context: &LoadContext) {
    let outcome = execute(subscription);
    report(subscription, context, &outcome);
}

/// 读取、解析并分发，不产生任何上报
pub(crate) fn execute<T>(subscription: &Subscription<T>) -> LoadOutcome {
    let resource = subscription.resource.as_ref();

    let value = match catch_unwind(AssertUnwindSafe(|| subscription.parser.read(resource))) {
        Ok(Ok(value)) => value,
        Ok(Err(err)) => return LoadOutcome::Failure(err),
        Err(payload) => {
            return LoadOutcome::Failure(LoadError::unexpected(format!(
                "解析配置资源 {} 时发生panic: {}",
                resource.name(),
                panic_message(payload.as_ref())
            )))
        }
    };

    match catch_unwind(AssertUnwindSafe(|| subscription.listener.on_update(value))) {
        Ok(Ok(())) => {}
        Ok(Err(failed)) => return LoadOutcome::Failure(failed.into()),
        Err(payload) => {
            return LoadOutcome::Failure(LoadError::unexpected(format!(
                "监听器处理配置 {} 时发生panic: {}",
                resource.name(),
                panic_message(payload.as_ref())
            )))
        }
    }

    debug!(resource = resource.name(), "配置已更新");

    if subscription.filter_name.is_none() {
        return LoadOutcome::Success;
    }

    let ready = catch_unwind(AssertUnwindSafe(|| subscription.listener.is_ready())).unwrap_or(false);
    if ready {
        LoadOutcome::Success
    } else {
        LoadOutcome::NotReady
    }
}

fn report<T>(subscription: &Subscription<T>, context: &LoadContext, outcome: &LoadOutcome) {
    let resource = subscription.resource.as_ref();
    let filter_name = subscription.filter_name();

    match outcome {
        LoadOutcome::Success => {
            if let Some(filter) = filter_name {
                context.sink.report_success(filter, true, resource);
            }
        }
        LoadOutcome::NotReady => {
            if let Some(filter) = filter_name {
                warn!(
                    filter,
                    config = subscription.configuration_name(),
                    "配置已分发但过滤器仍未就绪"
                );
                context.sink.report_failure(filter, resource, FAILED_LOADING_FILE);
            }
        }
        LoadOutcome::Failure(err) => handle_failure(subscription, context, err),
    }
}

fn handle_failure<T>(subscription: &Subscription<T>, context: &LoadContext, err: &LoadError) {
    let configuration_name = subscription.configuration_name();

    if let Some(filter) = subscription.filter_name() {
        context
            .sink
            .report_failure(filter, subscription.resource.as_ref(), &err.to_string());
    }

    if err.is_resource_not_found() {
        error!(
            config = configuration_name,
            filter = subscription.filter_name(),
            "处理配置资源 {} 时发生I/O错误，该资源被系统模型中声明的过滤器引用 - 原因: {}",
            configuration_name,
            err.root_cause_message()
        );
    } else {
        error!(config = configuration_name, kind = %err.kind, "配置更新错误。原因: {}", err);
        trace!(config = configuration_name, chain = ?err.chain(), "配置更新错误详情");
    }

    if !err.kind.is_expected() && context.diagnostics.report_unexpected {
        log_unexpected(err, &context.diagnostics.maintainer_contact);
    }
}

/// 非预期失败的醒目诊断块
fn log_unexpected(err: &LoadError, maintainer_contact: &str) {
    error!("{}", DIAGNOSTIC_BANNER);
    error!("请将以下堆栈信息发送给维护者: {}", maintainer_contact);
    error!("<STACK_TRACE>");
    for (depth, cause) in err.chain().iter().enumerate() {
        error!("  #{} {}", depth, cause);
    }
    error!("</STACK_TRACE>");
    error!("{}", DIAGNOSTIC_BANNER);
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "未知panic".to_string()
    }
}
