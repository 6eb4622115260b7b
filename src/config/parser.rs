//! 配置解析器
//!
//! 定义解析器接口、解析器工厂接口，以及基于 serde 的默认实现

use crate::config::resource::ConfigurationResource;
use crate::error::{LoadError, ParserConstructionError};
use serde::de::DeserializeOwned;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::debug;

/// 将资源内容转换为目标类型的解析器
///
/// 解析器对资源是无状态的，同一个实例可以被同类型的所有订阅共享。
pub trait ConfigurationParser<T>: Send + Sync {
    /// 读取并解析资源
    fn read(&self, resource: &dyn ConfigurationResource) -> Result<T, LoadError>;

    /// 构建解析器时使用的 schema 来源
    fn schema(&self) -> Option<&SchemaSource> {
        None
    }
}

/// 共享的解析器实例
pub type SharedParser<T> = Arc<dyn ConfigurationParser<T>>;

/// 可以作为订阅目标的配置类型
pub trait ConfigurationType: DeserializeOwned + Send + 'static {}

impl<T: DeserializeOwned + Send + 'static> ConfigurationType for T {}

/// 按目标类型构建解析器
pub trait ParserFactory: Send + Sync {
    fn build<T: ConfigurationType>(
        &self,
        schema: Option<&SchemaSource>,
    ) -> Result<SharedParser<T>, ParserConstructionError>;
}

/// schema 来源，只在解析器缓存未命中时使用
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SchemaSource {
    location: String,
}

impl SchemaSource {
    pub fn new(location: impl Into<String>) -> Self {
        Self {
            location: location.into(),
        }
    }

    pub fn location(&self) -> &str {
        &self.location
    }
}

impl fmt::Display for SchemaSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.location)
    }
}

/// 支持的文档格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Json,
    Toml,
}

impl DocumentFormat {
    /// 根据名称的扩展名推断格式
    pub fn from_name(name: &str) -> Option<Self> {
        let (_, extension) = name.rsplit_once('.')?;
        match extension.to_ascii_lowercase().as_str() {
            "json" => Some(DocumentFormat::Json),
            "toml" => Some(DocumentFormat::Toml),
            _ => None,
        }
    }
}

/// 基于 serde 的解析器
pub struct SerdeParser<T> {
    format: Option<DocumentFormat>,
    schema: Option<SchemaSource>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: ConfigurationType> SerdeParser<T> {
    /// 创建解析器，`format` 为空时按资源名称推断格式
    pub fn new(format: Option<DocumentFormat>, schema: Option<SchemaSource>) -> Self {
        Self {
            format,
            schema,
            _marker: PhantomData,
        }
    }

    fn parse_json(&self, text: &str) -> Result<T, LoadError> {
        // 先检查语法，再检查结构，区分两种失败
        let value: serde_json::Value = serde_json::from_str(text)
            .map_err(|e| LoadError::parse(format!("JSON解析失败: {}", e)).with_source(e))?;

        serde_json::from_value(value).map_err(|e| {
            LoadError::schema_mismatch(format!(
                "配置内容与 {} 不匹配: {}",
                std::any::type_name::<T>(),
                e
            ))
            .with_source(e)
        })
    }

    fn parse_toml(&self, text: &str) -> Result<T, LoadError> {
        toml::from_str::<toml::Table>(text)
            .map_err(|e| LoadError::parse(format!("TOML解析失败: {}", e)).with_source(e))?;

        toml::from_str::<T>(text).map_err(|e| {
            LoadError::schema_mismatch(format!(
                "配置内容与 {} 不匹配: {}",
                std::any::type_name::<T>(),
                e
            ))
            .with_source(e)
        })
    }
}

impl<T: ConfigurationType> ConfigurationParser<T> for SerdeParser<T> {
    fn read(&self, resource: &dyn ConfigurationResource) -> Result<T, LoadError> {
        let name = resource.name();

        let bytes = resource.read().map_err(|e| {
            LoadError::resolution(format!("读取配置资源 {} 失败: {}", name, e)).with_source(e)
        })?;

        let format = self
            .format
            .or_else(|| DocumentFormat::from_name(name))
            .ok_or_else(|| LoadError::parse(format!("无法识别配置资源 {} 的文档格式", name)))?;

        let text = std::str::from_utf8(&bytes).map_err(|e| {
            LoadError::parse(format!("配置资源 {} 不是有效的UTF-8文本", name)).with_source(e)
        })?;

        match format {
            DocumentFormat::Json => self.parse_json(text),
            DocumentFormat::Toml => self.parse_toml(text),
        }
    }

    fn schema(&self) -> Option<&SchemaSource> {
        self.schema.as_ref()
    }
}

/// 默认的解析器工厂
///
/// 文档格式的确定顺序：schema 扩展名、工厂默认格式、资源名称扩展名。
#[derive(Debug, Clone, Default)]
pub struct SerdeParserFactory {
    default_format: Option<DocumentFormat>,
}

impl SerdeParserFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// 所有解析器都使用固定的文档格式
    pub fn with_format(format: DocumentFormat) -> Self {
        Self {
            default_format: Some(format),
        }
    }
}

impl ParserFactory for SerdeParserFactory {
    fn build<T: ConfigurationType>(
        &self,
        schema: Option<&SchemaSource>,
    ) -> Result<SharedParser<T>, ParserConstructionError> {
        let type_name = std::any::type_name::<T>();

        let format = match schema {
            Some(source) => Some(DocumentFormat::from_name(source.location()).ok_or_else(|| {
                ParserConstructionError::new(
                    type_name,
                    format!("无法从 schema {} 推断文档格式", source),
                )
            })?),
            None => self.default_format,
        };

        debug!(type_name, ?format, schema = ?schema, "创建配置解析器");
        Ok(Arc::new(SerdeParser::<T>::new(format, schema.cloned())))
    }
}

/// 由闭包实现的自定义解析器
pub struct FnParser<T, F> {
    read_fn: F,
    _marker: PhantomData<fn() -> T>,
}

impl<T, F> FnParser<T, F>
where
    F: Fn(&dyn ConfigurationResource) -> Result<T, LoadError> + Send + Sync,
{
    pub fn new(read_fn: F) -> Self {
        Self {
            read_fn,
            _marker: PhantomData,
        }
    }
}

impl<T, F> ConfigurationParser<T> for FnParser<T, F>
where
    F: Fn(&dyn ConfigurationResource) -> Result<T, LoadError> + Send + Sync,
{
    fn read(&self, resource: &dyn ConfigurationResource) -> Result<T, LoadError> {
        (self.read_fn)(resource)
    }
}

/// 将闭包包装为共享解析器
pub fn parser_fn<T, F>(read_fn: F) -> SharedParser<T>
where
    T: 'static,
    F: Fn(&dyn ConfigurationResource) -> Result<T, LoadError> + Send + Sync + 'static,
{
    Arc::new(FnParser::new(read_fn))
}
