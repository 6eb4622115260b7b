//! 服务配置加载器实现
//!
//! 提供TOML配置解析、环境变量替换和错误处理功能

use crate::error::SettingsError;
use crate::settings::types::{validate_settings, ServiceSettings};
use regex::{Captures, Regex};
use std::path::Path;
use std::sync::OnceLock;
use tracing::{debug, info};

/// TOML服务配置加载器
#[derive(Debug, Clone)]
pub struct SettingsLoader {
    /// 是否启用环境变量替换
    enable_env_substitution: bool,
}

impl Default for SettingsLoader {
    fn default() -> Self {
        Self::new(true)
    }
}

impl SettingsLoader {
    /// 创建新的配置加载器
    ///
    /// # 参数
    /// * `enable_env_substitution` - 是否启用环境变量替换
    pub fn new(enable_env_substitution: bool) -> Self {
        Self {
            enable_env_substitution,
        }
    }

    /// 从文件加载配置
    pub fn load_from_file<P: AsRef<Path>>(&self, path: P) -> Result<ServiceSettings, SettingsError> {
        let path = path.as_ref();

        // 检查文件是否存在
        if !path.exists() {
            return Err(SettingsError::FileNotFound {
                path: path.to_string_lossy().to_string(),
            });
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| SettingsError::ParseError(format!("读取文件失败: {}", e)))?;

        let settings = self.load_from_string(&content)?;
        info!("成功加载服务配置文件: {}", path.display());
        Ok(settings)
    }

    /// 从字符串加载配置
    pub fn load_from_string(&self, content: &str) -> Result<ServiceSettings, SettingsError> {
        let processed = self.substitute_env_vars(content)?;

        let settings: ServiceSettings = toml::from_str(&processed)
            .map_err(|e| SettingsError::ParseError(format!("TOML解析失败: {}", e)))?;

        validate_settings(&settings).map_err(SettingsError::ValidationError)?;

        debug!("服务配置内容: {:?}", settings);
        Ok(settings)
    }

    /// 把 `${VAR}` 占位符替换为环境变量的值，遇到未定义的变量时返回错误
    fn substitute_env_vars(&self, content: &str) -> Result<String, SettingsError> {
        if !self.enable_env_substitution {
            return Ok(content.to_string());
        }

        let mut missing: Option<String> = None;
        let substituted = env_var_pattern().replace_all(content, |captures: &Captures<'_>| {
            let var_name = &captures[1];
            std::env::var(var_name).unwrap_or_else(|_| {
                missing.get_or_insert_with(|| var_name.to_string());
                String::new()
            })
        });

        match missing {
            Some(var) => Err(SettingsError::EnvVarError { var }),
            None => Ok(substituted.into_owned()),
        }
    }
}

/// `${VAR_NAME}` 占位符
fn env_var_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("占位符正则表达式是常量，必然合法")
    })
}
