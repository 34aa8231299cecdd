//! 组件总线配置管理系统
//!
//! 支持YAML（或TOML）配置文件驱动的总线行为

use crate::{BusError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// 总线配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusConfig {
    /// 标识符生成
    #[serde(default)]
    pub identity: IdentityConfig,
    /// 路由发现
    #[serde(default)]
    pub routing: RoutingConfig,
    /// 广播
    #[serde(default)]
    pub broadcast: BroadcastConfig,
    /// 日志
    #[serde(default)]
    pub logging: LoggingConfig,
    /// 是否启用指标收集
    #[serde(default = "default_true")]
    pub enable_metrics: bool,
}

fn default_true() -> bool {
    true
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            identity: IdentityConfig::default(),
            routing: RoutingConfig::default(),
            broadcast: BroadcastConfig::default(),
            logging: LoggingConfig::default(),
            enable_metrics: true,
        }
    }
}

impl BusConfig {
    /// 验证总线能否按此配置运行
    pub fn validate(&self) -> Result<()> {
        let suffix_length = self.identity.suffix_length;
        if !(MIN_SUFFIX_LENGTH..=MAX_SUFFIX_LENGTH).contains(&suffix_length) {
            return Err(BusError::config(&format!(
                "Identifier suffix length must be between {} and {}, got {}",
                MIN_SUFFIX_LENGTH, MAX_SUFFIX_LENGTH, suffix_length
            )));
        }
        Ok(())
    }
}

/// 随机后缀长度下限，过短会耗尽后缀空间
pub const MIN_SUFFIX_LENGTH: usize = 4;
pub const MAX_SUFFIX_LENGTH: usize = 32;

/// 标识符生成配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentityConfig {
    /// 随机后缀长度
    pub suffix_length: usize,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self { suffix_length: 9 }
    }
}

/// 路由配置
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoutingConfig {
    /// 祖先分支的路由编码方式
    #[serde(default)]
    pub ancestor_encoding: AncestorRouteEncoding,
}

/// 目标是源的祖先时的路由编码
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AncestorRouteEncoding {
    /// 只返回目标标识符（单跳编码）
    #[default]
    TargetOnly,
    /// 返回从父节点到目标的完整链
    FullChain,
}

/// 广播配置
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BroadcastConfig {
    #[serde(default)]
    pub mode: BroadcastMode,
}

/// 广播投递模式
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BroadcastMode {
    /// 深度优先，逐个等待，父先于子
    #[default]
    Sequential,
    /// 同一节点的子节点并发投递，父仍先于子
    ///
    /// 处理器失败不会中止同组兄弟的投递，只阻止继续下降；需要“失败即止”时使用 `Sequential`
    Concurrent,
}

/// 日志配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// 日志级别
    pub level: LogLevel,
    /// 是否启用详细日志
    pub verbose: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            verbose: false,
        }
    }
}

/// 日志级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

/// 配置管理器
#[derive(Debug)]
pub struct ConfigManager {
    config: BusConfig,
}

impl ConfigManager {
    /// 从文件加载配置，`.toml` 扩展名按TOML解析，其余按YAML解析
    pub async fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await
            .map_err(|e| BusError::config(&format!("Failed to read config file: {}", e)))?;

        let config: BusConfig = if is_toml(path) {
            toml::from_str(&content)?
        } else {
            serde_yaml::from_str(&content)?
        };

        Ok(Self { config })
    }

    /// 创建默认配置
    pub fn new_default() -> Self {
        Self {
            config: BusConfig::default(),
        }
    }

    /// 保存配置到文件
    pub async fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let content = if is_toml(path) {
            toml::to_string(&self.config)
                .map_err(|e| BusError::config(&format!("Failed to serialize config: {}", e)))?
        } else {
            serde_yaml::to_string(&self.config)?
        };

        tokio::fs::write(path, content).await?;
        Ok(())
    }

    pub fn get_config(&self) -> &BusConfig {
        &self.config
    }

    pub fn get_config_mut(&mut self) -> &mut BusConfig {
        &mut self.config
    }

    /// 验证配置有效性
    pub fn validate(&self) -> Result<()> {
        self.config.validate()?;

        tracing::info!("Configuration validation passed");
        Ok(())
    }
}

fn is_toml(path: &Path) -> bool {
    path.extension().map(|ext| ext == "toml").unwrap_or(false)
}

/// 生成默认配置文件
pub async fn generate_default_config_file<P: AsRef<Path>>(path: P) -> Result<()> {
    let config_manager = ConfigManager::new_default();
    config_manager.save_to_file(path).await?;
    Ok(())
}
