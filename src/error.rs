//! 组件总线错误处理系统
//!
//! 统一的错误类型。总线本身不包装处理器返回的错误，处理器错误原样向调用方传播。

use crate::types::ComponentId;
use thiserror::Error;

/// 总线统一错误类型
#[derive(Error, Debug)]
pub enum BusError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid component name: {message}")]
    InvalidName { message: String },

    #[error("Component destroyed: {component}")]
    ComponentDestroyed { component: ComponentId },

    #[error("Unknown command: {command}")]
    UnknownCommand { command: String },

    #[error("Handler error in {component}: {message}")]
    Handler { component: ComponentId, message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl BusError {
    /// 创建组件名称错误
    pub fn invalid_name(message: &str) -> Self {
        Self::InvalidName {
            message: message.to_string(),
        }
    }

    /// 创建处理器错误，供组件实现返回
    pub fn handler(component: &ComponentId, message: &str) -> Self {
        Self::Handler {
            component: component.clone(),
            message: message.to_string(),
        }
    }

    /// 创建配置相关错误
    pub fn config(message: &str) -> Self {
        Self::Config {
            message: message.to_string(),
        }
    }
}

/// 结果类型别名
pub type Result<T> = std::result::Result<T, BusError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let error = BusError::config("suffix too short");
        assert!(matches!(error, BusError::Config { .. }));
        assert_eq!(error.to_string(), "Configuration error: suffix too short");
    }

    #[test]
    fn test_handler_error_names_component() {
        let id = ComponentId::from("editor_ab12cd34e");
        let error = BusError::handler(&id, "buffer locked");
        assert_eq!(error.to_string(), "Handler error in editor_ab12cd34e: buffer locked");
    }

    #[test]
    fn test_error_from_io() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "File not found");
        let bus_error = BusError::from(io_error);
        assert!(matches!(bus_error, BusError::Io(_)));
    }
}
