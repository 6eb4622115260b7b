//! 更新管理
//!
//! 定义更新管理器接口，以及一个内存中的路由实现：宿主的监控机制（轮询或事件驱动）
//! 发现资源变化后调用 `resource_changed`，路由器对该资源上的每个订阅重新执行加载流水线。

use crate::config::listener::ListenerId;
use crate::config::pipeline::{load_config, LoadContext, Subscription};
use crate::config::resource::ResourceHandle;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// 注册到更新管理器的订阅
pub trait WatchedSubscription: Send + Sync {
    fn listener_id(&self) -> ListenerId;

    fn resource(&self) -> &ResourceHandle;

    fn filter_name(&self) -> Option<&str>;

    fn configuration_name(&self) -> &str;

    /// 资源变化后重新加载
    fn reload(&self);
}

/// 共享的已注册订阅
pub type SharedWatch = Arc<dyn WatchedSubscription>;

/// 更新管理器
pub trait UpdateManager: Send + Sync {
    /// 注册订阅，之后资源的每次变化都会触发 `reload`
    fn register_listener(&self, subscription: SharedWatch);

    /// 取消注册，未注册时什么也不做
    fn unregister_listener(&self, listener: ListenerId, resource: &ResourceHandle) -> bool;

    /// 释放所有监控
    fn destroy(&self);
}

/// 订阅与其加载上下文的绑定
pub struct BoundSubscription<T> {
    subscription: Subscription<T>,
    context: Arc<LoadContext>,
}

impl<T> BoundSubscription<T> {
    pub fn new(subscription: Subscription<T>, context: Arc<LoadContext>) -> Self {
        Self {
            subscription,
            context,
        }
    }

    pub fn subscription(&self) -> &Subscription<T> {
        &self.subscription
    }
}

impl<T: 'static> WatchedSubscription for BoundSubscription<T> {
    fn listener_id(&self) -> ListenerId {
        self.subscription.listener_id()
    }

    fn resource(&self) -> &ResourceHandle {
        self.subscription.resource()
    }

    fn filter_name(&self) -> Option<&str> {
        self.subscription.filter_name()
    }

    fn configuration_name(&self) -> &str {
        self.subscription.configuration_name()
    }

    fn reload(&self) {
        load_config(&self.subscription, &self.context);
    }
}

/// 资源变化事件
#[derive(Debug, Clone)]
pub struct ResourceChanged {
    /// 资源名称
    pub resource_name: String,
    /// 发现变化的时间
    pub detected_at: Instant,
}

impl ResourceChanged {
    pub fn new(resource_name: impl Into<String>) -> Self {
        Self {
            resource_name: resource_name.into(),
            detected_at: Instant::now(),
        }
    }

    /// 从发现变化到现在经过的时间
    pub fn elapsed(&self) -> Duration {
        self.detected_at.elapsed()
    }
}

#[derive(Default)]
struct RouterState {
    /// 资源名称 -> 订阅列表
    registrations: RwLock<HashMap<String, Vec<SharedWatch>>>,
    destroyed: AtomicBool,
}

/// 内存中的更新路由器
#[derive(Clone, Default)]
pub struct ChangeRouter {
    state: Arc<RouterState>,
}

impl ChangeRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// 资源发生变化，重新加载该资源上的所有订阅
    ///
    /// # 返回
    /// * `usize` - 触发的订阅数量
    pub fn resource_changed(&self, resource_name: &str) -> usize {
        if self.is_destroyed() {
            debug!(resource = resource_name, "更新路由器已销毁，忽略资源变化");
            return 0;
        }

        // 复制一份列表后释放锁，加载过程中允许并发订阅和取消订阅
        let watches: Vec<SharedWatch> = {
            let registrations = self.read();
            registrations.get(resource_name).cloned().unwrap_or_default()
        };

        debug!(resource = resource_name, subscriptions = watches.len(), "检测到资源变化");
        for watch in &watches {
            watch.reload();
        }
        watches.len()
    }

    /// 在后台任务中转发广播通道里的资源变化事件
    pub fn spawn_forwarder(&self, mut receiver: broadcast::Receiver<ResourceChanged>) -> JoinHandle<()> {
        let router = self.clone();

        tokio::spawn(async move {
            info!("资源变化转发任务已启动");
            loop {
                match receiver.recv().await {
                    Ok(event) => {
                        if router.is_destroyed() {
                            break;
                        }
                        let target = router.clone();
                        let name = event.resource_name.clone();
                        let result =
                            tokio::task::spawn_blocking(move || target.resource_changed(&name)).await;
                        match result {
                            Ok(reloaded) => debug!(
                                resource = %event.resource_name,
                                reloaded,
                                latency_ms = event.elapsed().as_millis() as u64,
                                "资源变化已处理"
                            ),
                            Err(e) => {
                                error!(resource = %event.resource_name, "处理资源变化失败: {}", e)
                            }
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "资源变化事件积压，部分事件被跳过");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            info!("资源变化转发任务已停止");
        })
    }

    /// 已注册的订阅总数
    pub fn registration_count(&self) -> usize {
        self.read().values().map(Vec::len).sum()
    }

    /// 某个资源上的订阅数量
    pub fn subscriptions_for(&self, resource_name: &str) -> usize {
        self.read().get(resource_name).map_or(0, Vec::len)
    }

    pub fn is_destroyed(&self) -> bool {
        self.state.destroyed.load(Ordering::SeqCst)
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, Vec<SharedWatch>>> {
        self.state
            .registrations
            .read()
            .unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, Vec<SharedWatch>>> {
        self.state
            .registrations
            .write()
            .unwrap_or_else(|e| e.into_inner())
    }
}

impl UpdateManager for ChangeRouter {
    fn register_listener(&self, subscription: SharedWatch) {
        if self.is_destroyed() {
            warn!(
                config = subscription.configuration_name(),
                "更新路由器已销毁，忽略订阅注册"
            );
            return;
        }

        let resource_name = subscription.resource().name().to_string();
        let listener = subscription.listener_id();
        let mut registrations = self.write();
        let watches = registrations.entry(resource_name.clone()).or_default();

        // 同一个监听器重复订阅同一个资源时替换旧的注册
        watches.retain(|existing| existing.listener_id() != listener);
        watches.push(subscription);
        debug!(resource = %resource_name, %listener, "订阅已注册");
    }

    fn unregister_listener(&self, listener: ListenerId, resource: &ResourceHandle) -> bool {
        let mut registrations = self.write();
        let Some(watches) = registrations.get_mut(resource.name()) else {
            return false;
        };

        let before = watches.len();
        watches.retain(|existing| existing.listener_id() != listener);
        let removed = watches.len() != before;
        if watches.is_empty() {
            registrations.remove(resource.name());
        }

        if removed {
            debug!(resource = resource.name(), %listener, "订阅已取消");
        }
        removed
    }

    fn destroy(&self) {
        self.state.destroyed.store(true, Ordering::SeqCst);
        let mut registrations = self.write();
        let count: usize = registrations.values().map(Vec::len).sum();
        registrations.clear();
        info!(count, "更新路由器已销毁，所有订阅已释放");
    }
}
