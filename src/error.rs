//! 错误处理模块
//!
//! 定义配置订阅服务的统一错误类型

use std::error::Error as StdError;
use std::fmt;
use thiserror::Error;

/// 装箱的底层错误
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// 配置订阅服务的主要错误类型
///
/// 只有资源解析错误和解析器构建错误会同步返回给 `subscribe_to` 的调用方，
/// 其余的加载错误都在加载流水线内部被记录和上报。
#[derive(Error, Debug)]
pub enum ConfigServiceError {
    /// 资源解析错误
    #[error("资源解析错误: {0}")]
    Resolution(#[from] ResolutionError),

    /// 解析器构建错误
    #[error("解析器构建错误: {0}")]
    ParserConstruction(#[from] ParserConstructionError),

    /// 服务自身配置错误
    #[error("服务配置错误: {0}")]
    Settings(#[from] SettingsError),

    /// 构建服务时缺少协作组件
    #[error("缺少协作组件: {0}")]
    MissingCollaborator(&'static str),

    /// 服务已销毁
    #[error("配置服务已销毁")]
    Destroyed,
}

/// 资源解析错误类型
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolutionError {
    /// 配置名称找不到对应的资源
    #[error("配置资源不存在: {name}")]
    NotFound { name: String },

    /// 配置名称无法映射为资源
    #[error("无法解析配置资源 {name}: {reason}")]
    Invalid { name: String, reason: String },
}

impl ResolutionError {
    /// 资源是否不存在
    pub fn is_not_found(&self) -> bool {
        matches!(self, ResolutionError::NotFound { .. })
    }
}

/// 解析器构建错误
#[derive(Error, Debug)]
#[error("无法为 {type_name} 创建配置解析器: {reason}")]
pub struct ParserConstructionError {
    /// 目标类型名称
    pub type_name: &'static str,
    /// 失败原因
    pub reason: String,
    /// 底层错误
    #[source]
    pub source: Option<BoxError>,
}

impl ParserConstructionError {
    pub fn new(type_name: &'static str, reason: impl Into<String>) -> Self {
        Self {
            type_name,
            reason: reason.into(),
            source: None,
        }
    }

    pub fn with_source(mut self, source: impl Into<BoxError>) -> Self {
        self.source = Some(source.into());
        self
    }
}

/// 服务配置错误类型
#[derive(Error, Debug)]
pub enum SettingsError {
    /// 配置文件解析错误
    #[error("配置文件解析失败: {0}")]
    ParseError(String),

    /// 配置验证错误
    #[error("配置验证失败: {0}")]
    ValidationError(String),

    /// 配置文件不存在
    #[error("配置文件不存在: {path}")]
    FileNotFound { path: String },

    /// 环境变量替换错误
    #[error("环境变量替换失败: {var}")]
    EnvVarError { var: String },
}

/// 加载失败分类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// 资源读取失败
    Resolution,
    /// 内容格式错误
    Parse,
    /// 内容格式正确但与目标类型不匹配
    SchemaMismatch,
    /// 监听器主动拒绝更新
    Rejected,
    /// 未分类的错误
    Unexpected,
}

impl FailureKind {
    /// 是否属于预期内的失败
    ///
    /// 只有监听器声明的更新失败和类型不匹配是预期内的，其余失败都会输出维护者诊断信息。
    pub fn is_expected(self) -> bool {
        matches!(self, FailureKind::Rejected | FailureKind::SchemaMismatch)
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureKind::Resolution => "resolution",
            FailureKind::Parse => "parse",
            FailureKind::SchemaMismatch => "schema-mismatch",
            FailureKind::Rejected => "rejected",
            FailureKind::Unexpected => "unexpected",
        };
        f.write_str(name)
    }
}

/// 单次配置加载的失败原因
#[derive(Error, Debug)]
#[error("{message}")]
pub struct LoadError {
    /// 失败分类
    pub kind: FailureKind,
    /// 错误信息
    pub message: String,
    /// 底层错误
    #[source]
    pub source: Option<BoxError>,
}

impl LoadError {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    pub fn resolution(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Resolution, message)
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Parse, message)
    }

    pub fn schema_mismatch(message: impl Into<String>) -> Self {
        Self::new(FailureKind::SchemaMismatch, message)
    }

    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Unexpected, message)
    }

    pub fn with_source(mut self, source: impl Into<BoxError>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// 错误链中是否包含"资源不存在"
    pub fn is_resource_not_found(&self) -> bool {
        let mut current: Option<&(dyn StdError + 'static)> = self.source();
        while let Some(err) = current {
            if let Some(resolution) = err.downcast_ref::<ResolutionError>() {
                if resolution.is_not_found() {
                    return true;
                }
            }
            if let Some(io) = err.downcast_ref::<std::io::Error>() {
                if io.kind() == std::io::ErrorKind::NotFound {
                    return true;
                }
            }
            current = err.source();
        }
        false
    }

    /// 错误链中最内层错误的信息
    pub fn root_cause_message(&self) -> String {
        let mut current: &(dyn StdError + 'static) = self;
        while let Some(next) = current.source() {
            current = next;
        }
        current.to_string()
    }

    /// 完整的错误链，用于 trace 级别日志
    pub fn chain(&self) -> Vec<String> {
        let mut chain = Vec::new();
        let mut current: Option<&(dyn StdError + 'static)> = Some(self);
        while let Some(err) = current {
            chain.push(err.to_string());
            current = err.source();
        }
        chain
    }
}

impl From<UpdateFailed> for LoadError {
    fn from(err: UpdateFailed) -> Self {
        LoadError::new(FailureKind::Rejected, err.to_string()).with_source(err)
    }
}

/// 监听器声明的更新失败
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("配置更新失败: {reason}")]
pub struct UpdateFailed {
    pub reason: String,
}

impl UpdateFailed {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// 结果类型别名
pub type Result<T> = std::result::Result<T, ConfigServiceError>;
