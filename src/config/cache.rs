//! 解析器缓存
//!
//! 按目标类型缓存解析器实例。缓存项是可回收的：`Weak` 策略下，当没有订阅再持有
//! 解析器时缓存项自动失效；`Lru` 策略下，超过容量时淘汰最久未使用的类型。
//! 回收时机不确定，调用方不能依赖缓存命中。

use crate::config::parser::{
    ConfigurationParser, ConfigurationType, ParserFactory, SchemaSource, SharedParser,
};
use crate::error::ParserConstructionError;
use serde::{Deserialize, Serialize};
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tracing::{debug, trace, warn};

/// 缓存淘汰策略
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "lowercase")]
pub enum EvictionPolicy {
    /// 只保留弱引用，解析器不再被使用时即可回收
    #[default]
    Weak,
    /// 保留强引用，按最近使用顺序淘汰
    Lru { capacity: usize },
}

/// 类型擦除后的缓存值
enum CachedParser {
    Weak(Box<dyn ErasedWeak>),
    /// `SharedParser<T>`
    Strong(Box<dyn Any + Send + Sync>),
}

struct CacheEntry {
    type_name: &'static str,
    parser: CachedParser,
    last_used: u64,
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<TypeId, CacheEntry>,
    clock: u64,
}

impl CacheState {
    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }
}

/// 解析器缓存
///
/// 同一类型最多缓存一个解析器。并发构建同一类型时，最后写入的解析器留在缓存中，
/// 每个调用方都拿到自己构建（或命中）的完整解析器。
pub struct ParserCache<F> {
    factory: F,
    policy: EvictionPolicy,
    state: Mutex<CacheState>,
}

impl<F: ParserFactory> ParserCache<F> {
    pub fn new(factory: F, policy: EvictionPolicy) -> Self {
        Self {
            factory,
            policy,
            state: Mutex::new(CacheState::default()),
        }
    }

    /// 获取或创建解析器
    ///
    /// 命中时忽略 `schema`，以第一次创建时的 schema 为准。
    pub fn get_or_create<T: ConfigurationType>(
        &self,
        schema: Option<&SchemaSource>,
    ) -> Result<SharedParser<T>, ParserConstructionError> {
        let type_name = std::any::type_name::<T>();

        if let Some(parser) = self.lookup::<T>() {
            trace!(type_name, "解析器缓存命中");
            return Ok(parser);
        }

        // 构建期间不持有锁，构建失败不会留下任何缓存项
        let parser = self.factory.build::<T>(schema).map_err(|e| {
            warn!(type_name, error = %e, "创建配置解析器失败");
            e
        })?;

        self.store::<T>(&parser);
        debug!(type_name, policy = ?self.policy, "解析器已缓存");
        Ok(parser)
    }

    /// 是否缓存了可用的解析器
    pub fn contains<T: ConfigurationType>(&self) -> bool {
        let mut state = self.lock();
        Self::live_parser::<T>(&mut state).is_some()
    }

    /// 主动回收某个类型的解析器
    pub fn reclaim<T: ConfigurationType>(&self) -> bool {
        let removed = self.lock().entries.remove(&TypeId::of::<T>());
        if let Some(entry) = &removed {
            debug!(type_name = entry.type_name, "解析器已回收");
        }
        removed.is_some()
    }

    /// 可用缓存项数量
    pub fn len(&self) -> usize {
        let mut state = self.lock();
        state.entries.retain(|_, entry| match &entry.parser {
            CachedParser::Weak(weak) => weak.is_alive(),
            CachedParser::Strong(_) => true,
        });
        state.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 清空缓存
    pub fn clear(&self) {
        let mut state = self.lock();
        let count = state.entries.len();
        state.entries.clear();
        debug!(count, "解析器缓存已清空");
    }

    pub fn policy(&self) -> EvictionPolicy {
        self.policy
    }

    pub fn factory(&self) -> &F {
        &self.factory
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lookup<T: ConfigurationType>(&self) -> Option<SharedParser<T>> {
        let mut state = self.lock();
        let parser = Self::live_parser::<T>(&mut state)?;
        let now = state.tick();
        if let Some(entry) = state.entries.get_mut(&TypeId::of::<T>()) {
            entry.last_used = now;
        }
        Some(parser)
    }

    /// 取出仍然存活的解析器，已回收的缓存项会被移除
    fn live_parser<T: ConfigurationType>(state: &mut CacheState) -> Option<SharedParser<T>> {
        let key = TypeId::of::<T>();
        let parser = match &state.entries.get(&key)?.parser {
            CachedParser::Weak(weak) => weak
                .as_any()
                .downcast_ref::<Weak<dyn ConfigurationParser<T>>>()
                .and_then(Weak::upgrade),
            CachedParser::Strong(strong) => strong.downcast_ref::<SharedParser<T>>().cloned(),
        };

        if parser.is_none() {
            state.entries.remove(&key);
        }
        parser
    }

    fn store<T: ConfigurationType>(&self, parser: &SharedParser<T>) {
        let cached = match self.policy {
            EvictionPolicy::Weak => {
                let weak: Weak<dyn ConfigurationParser<T>> = Arc::downgrade(parser);
                CachedParser::Weak(Box::new(weak))
            }
            EvictionPolicy::Lru { .. } => CachedParser::Strong(Box::new(parser.clone())),
        };

        let mut state = self.lock();
        let now = state.tick();
        state.entries.insert(
            TypeId::of::<T>(),
            CacheEntry {
                type_name: std::any::type_name::<T>(),
                parser: cached,
                last_used: now,
            },
        );

        if let EvictionPolicy::Lru { capacity } = self.policy {
            while state.entries.len() > capacity.max(1) {
                let oldest = state
                    .entries
                    .iter()
                    .min_by_key(|(_, entry)| entry.last_used)
                    .map(|(key, _)| *key);
                match oldest.and_then(|key| state.entries.remove(&key)) {
                    Some(evicted) => debug!(type_name = evicted.type_name, "淘汰最久未使用的解析器"),
                    None => break,
                }
            }
        }
    }
}

/// 类型擦除后的弱引用
trait ErasedWeak: Send + Sync {
    fn is_alive(&self) -> bool;
    fn as_any(&self) -> &dyn Any;
}

impl<T: 'static> ErasedWeak for Weak<dyn ConfigurationParser<T>> {
    fn is_alive(&self) -> bool {
        self.strong_count() > 0
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
