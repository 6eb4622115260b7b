//! 配置订阅服务
//!
//! 对外提供订阅与取消订阅操作，负责首次加载，并把订阅注册到更新管理器，
//! 之后的资源变化由更新管理器重新触发加载流水线。

use crate::config::cache::ParserCache;
use crate::config::listener::{ListenerId, SharedListener};
use crate::config::parser::{
    ConfigurationType, ParserFactory, SchemaSource, SerdeParserFactory, SharedParser,
};
use crate::config::pipeline::{load_config, LoadContext, Subscription};
use crate::config::resource::{ResourceHandle, ResourceResolver};
use crate::config::update::{BoundSubscription, UpdateManager};
use crate::error::{ConfigServiceError, Result, SettingsError};
use crate::settings::{validate_settings, ServiceSettings};
use crate::status::ReportingSink;
use std::sync::{Arc, RwLock};
use tracing::{debug, info, warn};

/// 配置订阅服务
pub struct ConfigurationService<F = SerdeParserFactory> {
    resolver: Arc<dyn ResourceResolver>,
    update_manager: Arc<dyn UpdateManager>,
    parser_cache: ParserCache<F>,
    context: Arc<LoadContext>,
    settings: ServiceSettings,
    /// 是否已销毁；注册与首次加载期间持有读锁，销毁时持有写锁
    destroyed: RwLock<bool>,
}

impl ConfigurationService<SerdeParserFactory> {
    /// 创建服务构建器
    pub fn builder() -> ConfigurationServiceBuilder<SerdeParserFactory> {
        ConfigurationServiceBuilder::new()
    }
}

impl<F: ParserFactory> ConfigurationService<F> {
    /// 订阅配置，通过构建器补充过滤器名称、schema、自定义解析器等选项
    pub fn subscription<T: ConfigurationType>(
        &self,
        configuration_name: impl Into<String>,
        listener: SharedListener<T>,
    ) -> SubscriptionRequest<'_, T, F> {
        SubscriptionRequest {
            service: self,
            configuration_name: configuration_name.into(),
            listener,
            filter_name: None,
            schema: None,
            parser: None,
            send_notification_now: true,
        }
    }

    /// 按类型订阅配置
    pub fn subscribe_to<T: ConfigurationType>(
        &self,
        configuration_name: &str,
        listener: SharedListener<T>,
    ) -> Result<()> {
        self.subscription(configuration_name, listener).register()
    }

    /// 以过滤器身份按类型订阅配置，加载结果会上报到状态汇报器
    pub fn subscribe_filter_to<T: ConfigurationType>(
        &self,
        filter_name: &str,
        configuration_name: &str,
        listener: SharedListener<T>,
    ) -> Result<()> {
        self.subscription(configuration_name, listener)
            .filter(filter_name)
            .register()
    }

    /// 按类型订阅配置，缓存未命中时使用给定的 schema 创建解析器
    pub fn subscribe_with_schema<T: ConfigurationType>(
        &self,
        configuration_name: &str,
        schema: SchemaSource,
        listener: SharedListener<T>,
    ) -> Result<()> {
        self.subscription(configuration_name, listener)
            .schema(schema)
            .register()
    }

    /// 以过滤器身份按类型订阅配置，并指定 schema
    pub fn subscribe_filter_with_schema<T: ConfigurationType>(
        &self,
        filter_name: &str,
        configuration_name: &str,
        schema: SchemaSource,
        listener: SharedListener<T>,
    ) -> Result<()> {
        self.subscription(configuration_name, listener)
            .filter(filter_name)
            .schema(schema)
            .register()
    }

    /// 使用自定义解析器订阅配置，并立即加载一次
    pub fn subscribe_with_parser<T: 'static>(
        &self,
        filter_name: &str,
        configuration_name: &str,
        listener: SharedListener<T>,
        parser: SharedParser<T>,
    ) -> Result<()> {
        self.subscribe_with_parser_now(Some(filter_name), configuration_name, listener, parser, true)
    }

    /// 订阅的基本操作，其他订阅方法最终都走到这里
    ///
    /// 资源解析失败时直接返回错误，不会注册订阅也不会执行加载。
    pub fn subscribe_with_parser_now<T: 'static>(
        &self,
        filter_name: Option<&str>,
        configuration_name: &str,
        listener: SharedListener<T>,
        parser: SharedParser<T>,
        send_notification_now: bool,
    ) -> Result<()> {
        self.ensure_active()?;
        let resource = self.resolve(configuration_name)?;
        self.attach(
            Subscription::new(
                filter_name.map(str::to_string),
                configuration_name,
                listener,
                parser,
                resource,
            ),
            send_notification_now,
        )
    }

    /// 取消订阅
    ///
    /// # 返回
    /// * `Result<bool>` - 是否确实移除了一个注册
    pub fn unsubscribe_from<T>(&self, configuration_name: &str, listener: &SharedListener<T>) -> Result<bool> {
        let resource = self.resolve(configuration_name)?;
        let listener_id = ListenerId::of(listener);
        let removed = self.update_manager.unregister_listener(listener_id, &resource);

        if removed {
            info!(config = configuration_name, listener = %listener_id, "已取消配置订阅");
        } else {
            debug!(config = configuration_name, listener = %listener_id, "监听器未订阅该配置，忽略");
        }
        Ok(removed)
    }

    /// 获取或创建解析器
    pub fn get_or_create_parser<T: ConfigurationType>(
        &self,
        schema: Option<&SchemaSource>,
    ) -> Result<SharedParser<T>> {
        Ok(self.parser_cache.get_or_create::<T>(schema)?)
    }

    /// 销毁服务：清空解析器缓存，并释放更新管理器中的所有监控
    ///
    /// 会等待正在进行的注册和首次加载结束，因此不能在首次加载的监听器回调中调用。
    pub fn destroy(&self) {
        {
            let mut destroyed = self.destroyed.write().unwrap_or_else(|e| e.into_inner());
            if *destroyed {
                return;
            }
            *destroyed = true;
        }
        self.parser_cache.clear();
        self.update_manager.destroy();
        info!("配置订阅服务已销毁");
    }

    pub fn is_destroyed(&self) -> bool {
        *self.destroyed.read().unwrap_or_else(|e| e.into_inner())
    }

    pub fn resolver(&self) -> &Arc<dyn ResourceResolver> {
        &self.resolver
    }

    pub fn reporting_sink(&self) -> &Arc<dyn ReportingSink> {
        &self.context.sink
    }

    pub fn parser_cache(&self) -> &ParserCache<F> {
        &self.parser_cache
    }

    pub fn settings(&self) -> &ServiceSettings {
        &self.settings
    }

    fn ensure_active(&self) -> Result<()> {
        if self.is_destroyed() {
            return Err(ConfigServiceError::Destroyed);
        }
        Ok(())
    }

    fn resolve(&self, configuration_name: &str) -> Result<ResourceHandle> {
        self.resolver.resolve(configuration_name).map_err(|e| {
            warn!(config = configuration_name, error = %e, "配置资源解析失败");
            ConfigServiceError::from(e)
        })
    }

    fn attach<T: 'static>(
        &self,
        subscription: Subscription<T>,
        send_notification_now: bool,
    ) -> Result<()> {
        // 解析资源和创建解析器期间服务可能已被销毁
        let destroyed = self.destroyed.read().unwrap_or_else(|e| e.into_inner());
        if *destroyed {
            debug!(config = subscription.configuration_name(), "配置订阅服务已销毁，放弃订阅");
            return Err(ConfigServiceError::Destroyed);
        }

        self.update_manager.register_listener(Arc::new(BoundSubscription::new(
            subscription.clone(),
            Arc::clone(&self.context),
        )));

        info!(
            filter = subscription.filter_name(),
            config = subscription.configuration_name(),
            listener = %subscription.listener_id(),
            "已订阅配置"
        );

        if send_notification_now {
            // 首次加载
            load_config(&subscription, &self.context);
        }
        Ok(())
    }
}

/// 订阅请求构建器
pub struct SubscriptionRequest<'a, T, F> {
    service: &'a ConfigurationService<F>,
    configuration_name: String,
    listener: SharedListener<T>,
    filter_name: Option<String>,
    schema: Option<SchemaSource>,
    parser: Option<SharedParser<T>>,
    send_notification_now: bool,
}

impl<'a, T: ConfigurationType, F: ParserFactory> SubscriptionRequest<'a, T, F> {
    /// 订阅方的过滤器名称
    pub fn filter(mut self, filter_name: impl Into<String>) -> Self {
        self.filter_name = Some(filter_name.into());
        self
    }

    /// 缓存未命中时使用的 schema
    pub fn schema(mut self, schema: SchemaSource) -> Self {
        self.schema = Some(schema);
        self
    }

    /// 使用自定义解析器，不经过解析器缓存
    pub fn parser(mut self, parser: SharedParser<T>) -> Self {
        self.parser = Some(parser);
        self
    }

    /// 是否在返回前立即加载一次，默认是
    pub fn send_notification_now(mut self, send: bool) -> Self {
        self.send_notification_now = send;
        self
    }

    /// 执行订阅
    pub fn register(self) -> Result<()> {
        let service = self.service;
        service.ensure_active()?;

        let resource = service.resolve(&self.configuration_name)?;
        let parser = match self.parser {
            Some(parser) => parser,
            None => service.get_or_create_parser::<T>(self.schema.as_ref())?,
        };

        service.attach(
            Subscription::new(
                self.filter_name,
                self.configuration_name,
                self.listener,
                parser,
                resource,
            ),
            self.send_notification_now,
        )
    }
}

/// 服务构建器
pub struct ConfigurationServiceBuilder<F> {
    resolver: Option<Arc<dyn ResourceResolver>>,
    update_manager: Option<Arc<dyn UpdateManager>>,
    sink: Option<Arc<dyn ReportingSink>>,
    factory: F,
    settings: ServiceSettings,
}

impl ConfigurationServiceBuilder<SerdeParserFactory> {
    pub fn new() -> Self {
        Self {
            resolver: None,
            update_manager: None,
            sink: None,
            factory: SerdeParserFactory::new(),
            settings: ServiceSettings::default(),
        }
    }
}

impl Default for ConfigurationServiceBuilder<SerdeParserFactory> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F: ParserFactory> ConfigurationServiceBuilder<F> {
    pub fn resolver(mut self, resolver: Arc<dyn ResourceResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn update_manager(mut self, update_manager: Arc<dyn UpdateManager>) -> Self {
        self.update_manager = Some(update_manager);
        self
    }

    pub fn reporting_sink(mut self, sink: Arc<dyn ReportingSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn settings(mut self, settings: ServiceSettings) -> Self {
        self.settings = settings;
        self
    }

    /// 替换解析器工厂
    pub fn parser_factory<G: ParserFactory>(self, factory: G) -> ConfigurationServiceBuilder<G> {
        ConfigurationServiceBuilder {
            resolver: self.resolver,
            update_manager: self.update_manager,
            sink: self.sink,
            factory,
            settings: self.settings,
        }
    }

    pub fn build(self) -> Result<ConfigurationService<F>> {
        validate_settings(&self.settings).map_err(SettingsError::ValidationError)?;

        let resolver = self
            .resolver
            .ok_or(ConfigServiceError::MissingCollaborator("resource resolver"))?;
        let update_manager = self
            .update_manager
            .ok_or(ConfigServiceError::MissingCollaborator("update manager"))?;
        let sink = self
            .sink
            .ok_or(ConfigServiceError::MissingCollaborator("reporting sink"))?;

        let context = Arc::new(LoadContext::new(sink, self.settings.diagnostics.clone()));
        let parser_cache = ParserCache::new(self.factory, self.settings.parser_cache.eviction);

        info!(
            version = crate::VERSION,
            eviction = ?self.settings.parser_cache.eviction,
            "配置订阅服务已创建"
        );

        Ok(ConfigurationService {
            resolver,
            update_manager,
            parser_cache,
            context,
            settings: self.settings,
            destroyed: RwLock::new(false),
        })
    }
}
