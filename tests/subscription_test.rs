//! 配置订阅集成测试
//!
//! 通过公开接口测试订阅、首次加载、热重载和状态上报

use filter_config::config::{
    ChangeRouter, ConfigurationService, DocumentFormat, ResourceChanged, SerdeParserFactory,
    SharedListener, StaticResolver, UpdateListener,
};
use filter_config::error::{ConfigServiceError, ResolutionError, UpdateFailed};
use filter_config::status::ConfigurationInformation;
use serde::Deserialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;

#[derive(Debug, Clone, Deserialize, PartialEq)]
struct AuthConfig {
    realm: String,
    #[serde(default)]
    delegating: bool,
}

/// 第一次收到配置后进入就绪状态的过滤器
#[derive(Default)]
struct AuthFilter {
    configs: Mutex<Vec<AuthConfig>>,
    initialized: AtomicBool,
}

impl AuthFilter {
    fn configs(&self) -> Vec<AuthConfig> {
        self.configs.lock().unwrap().clone()
    }
}

impl UpdateListener<AuthConfig> for AuthFilter {
    fn on_update(&self, value: AuthConfig) -> Result<(), UpdateFailed> {
        self.configs.lock().unwrap().push(value);
        self.initialized.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_ready(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }
}

struct Harness {
    resolver: Arc<StaticResolver>,
    router: ChangeRouter,
    information: ConfigurationInformation,
    service: ConfigurationService<SerdeParserFactory>,
}

fn harness() -> Harness {
    let resolver = Arc::new(StaticResolver::new());
    let router = ChangeRouter::new();
    let information = ConfigurationInformation::new();

    let service = ConfigurationService::builder()
        .resolver(resolver.clone())
        .update_manager(Arc::new(router.clone()))
        .reporting_sink(Arc::new(information.clone()))
        .parser_factory(SerdeParserFactory::with_format(DocumentFormat::Json))
        .build()
        .unwrap();

    Harness {
        resolver,
        router,
        information,
        service,
    }
}

#[test]
fn test_auth_filter_receives_initial_config() {
    let h = harness();
    h.resolver
        .insert("auth.cfg.xml", r#"{"realm": "internal", "delegating": true}"#);
    let filter = Arc::new(AuthFilter::default());

    h.service
        .subscribe_filter_to::<AuthConfig>("auth", "auth.cfg.xml", filter.clone())
        .unwrap();

    // 返回前已经完成首次加载
    assert_eq!(
        filter.configs(),
        vec![AuthConfig {
            realm: "internal".to_string(),
            delegating: true,
        }]
    );

    let status = h.information.filter_status("auth").unwrap();
    assert!(status.ready);
    assert_eq!(status.resource, "auth.cfg.xml");
    assert_eq!(status.success_count, 1);
    assert_eq!(status.failure_count, 0);
}

#[test]
fn test_missing_resource_fails_synchronously() {
    let h = harness();
    let filter = Arc::new(AuthFilter::default());

    let result = h
        .service
        .subscribe_filter_to::<AuthConfig>("auth", "missing.cfg.xml", filter.clone());

    match result {
        Err(ConfigServiceError::Resolution(ResolutionError::NotFound { name })) => {
            assert_eq!(name, "missing.cfg.xml");
        }
        other => panic!("expected resolution error, got {:?}", other.err()),
    }
    assert_eq!(h.router.registration_count(), 0);
    assert!(filter.configs().is_empty());
    assert!(h.information.filter_status("auth").is_none());
}

#[test]
fn test_malformed_document_is_reported_and_recovers() {
    let h = harness();
    let resource = h.resolver.insert("auth.cfg.xml", r#"{"realm": "#);
    let filter = Arc::new(AuthFilter::default());

    h.service
        .subscribe_filter_to::<AuthConfig>("auth", "auth.cfg.xml", filter.clone())
        .unwrap();

    assert!(filter.configs().is_empty());
    let status = h.information.filter_status("auth").unwrap();
    assert!(!status.ready);
    assert!(status.failure_reason.unwrap().contains("JSON解析失败"));

    // 订阅仍然有效，修复后的内容会被重新加载
    resource.set_content(r#"{"realm": "fixed"}"#);
    assert_eq!(h.router.resource_changed("auth.cfg.xml"), 1);

    assert_eq!(filter.configs().len(), 1);
    let status = h.information.filter_status("auth").unwrap();
    assert!(status.ready);
    assert!(status.failure_reason.is_none());
}

#[test]
fn test_wrong_shape_does_not_affect_sibling_subscription() {
    let h = harness();
    h.resolver.insert("auth.cfg.xml", r#"{"realm": "internal"}"#);
    h.resolver.insert("other.cfg.xml", r#"{"limit": 10}"#);
    let good = Arc::new(AuthFilter::default());
    let bad = Arc::new(AuthFilter::default());

    h.service
        .subscribe_filter_to::<AuthConfig>("auth", "auth.cfg.xml", good.clone())
        .unwrap();
    h.service
        .subscribe_filter_to::<AuthConfig>("other", "other.cfg.xml", bad.clone())
        .unwrap();

    assert_eq!(good.configs().len(), 1);
    assert!(bad.configs().is_empty());

    let summary = h.information.summary();
    assert_eq!(summary.total_filters, 2);
    assert_eq!(summary.ready_filters, 1);
    assert_eq!(summary.failed_filters, 1);
}

#[test]
fn test_unsubscribed_listener_is_not_notified() {
    let h = harness();
    let resource = h.resolver.insert("auth.cfg.xml", r#"{"realm": "a"}"#);
    let filter = Arc::new(AuthFilter::default());
    let listener: SharedListener<AuthConfig> = filter.clone();

    h.service
        .subscribe_filter_to("auth", "auth.cfg.xml", listener.clone())
        .unwrap();
    assert!(h.service.unsubscribe_from("auth.cfg.xml", &listener).unwrap());

    resource.set_content(r#"{"realm": "b"}"#);
    h.router.resource_changed("auth.cfg.xml");

    assert_eq!(
        filter.configs(),
        vec![AuthConfig {
            realm: "a".to_string(),
            delegating: false,
        }]
    );
}

#[tokio::test]
async fn test_broadcast_change_events_trigger_reload() {
    let h = harness();
    let resource = h.resolver.insert("auth.cfg.xml", r#"{"realm": "v1"}"#);
    let filter = Arc::new(AuthFilter::default());

    h.service
        .subscribe_filter_to::<AuthConfig>("auth", "auth.cfg.xml", filter.clone())
        .unwrap();

    let (sender, receiver) = broadcast::channel(16);
    let forwarder = h.router.spawn_forwarder(receiver);

    resource.set_content(r#"{"realm": "v2"}"#);
    sender.send(ResourceChanged::new("auth.cfg.xml")).unwrap();
    drop(sender);

    tokio::time::timeout(Duration::from_secs(5), forwarder)
        .await
        .expect("forwarder did not finish")
        .unwrap();

    let realms: Vec<String> = filter.configs().into_iter().map(|c| c.realm).collect();
    assert_eq!(realms, vec!["v1".to_string(), "v2".to_string()]);
    assert_eq!(h.information.filter_status("auth").unwrap().success_count, 2);
}

#[test]
fn test_destroy_stops_future_loads() {
    let h = harness();
    let resource = h.resolver.insert("auth.cfg.xml", r#"{"realm": "a"}"#);
    let filter = Arc::new(AuthFilter::default());

    h.service
        .subscribe_filter_to::<AuthConfig>("auth", "auth.cfg.xml", filter.clone())
        .unwrap();
    h.service.destroy();

    resource.set_content(r#"{"realm": "b"}"#);
    assert_eq!(h.router.resource_changed("auth.cfg.xml"), 0);
    assert_eq!(filter.configs().len(), 1);
}

#[test]
fn test_parser_shared_between_subscriptions_of_same_type() {
    let h = harness();
    h.resolver.insert("auth.cfg.xml", r#"{"realm": "a"}"#);
    h.resolver.insert("auth-backup.cfg.xml", r#"{"realm": "b"}"#);
    let first = Arc::new(AuthFilter::default());
    let second = Arc::new(AuthFilter::default());

    h.service
        .subscribe_filter_to::<AuthConfig>("auth", "auth.cfg.xml", first.clone())
        .unwrap();
    h.service
        .subscribe_filter_to::<AuthConfig>("auth-backup", "auth-backup.cfg.xml", second.clone())
        .unwrap();

    let p1 = h.service.get_or_create_parser::<AuthConfig>(None).unwrap();
    let p2 = h.service.get_or_create_parser::<AuthConfig>(None).unwrap();
    assert!(Arc::ptr_eq(&p1, &p2));
    assert_eq!(h.service.parser_cache().len(), 1);
    assert_eq!(h.router.registration_count(), 2);
}
