//! ComponentBus - 层级组件消息总线
//!
//! 让独立创建的组件互相发现并通信：按标识符直接寻址、按角色多目标寻址、
//! 全树广播，并在可变的父子树上计算任意两节点之间的路由。
//!
//! # 架构分层
//!
//! - **组件基础层**: 组件契约、挂载与生命周期、按消息类型分派
//! - **核心层**: 标识注册表、组件树、消息总线、命令转发
//! - **基础设施**: 配置、错误类型、日志
//!
//! # 特性
//!
//! - **显式注入**: 总线是普通对象，测试可以创建相互隔离的实例
//! - **确定顺序**: 多目标与广播严格串行，父先于子，兄弟按注册顺序
//! - **透明路由**: 处理器错误原样传播，总线不重试不超时

pub mod types;
pub mod error;
pub mod core;
pub mod component;
pub mod config;

// 重新导出核心类型
pub use types::*;
pub use error::*;
pub use core::*;
pub use component::*;
pub use config::{BusConfig, ConfigManager};

/// 框架信息
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const FRAMEWORK_NAME: &str = "ComponentBus";

/// 初始化日志系统，重复调用无副作用
pub fn initialize(config: &BusConfig) {
    let level: tracing::Level = config.logging.level.into();
    let _ = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(config.logging.verbose)
        .try_init();

    tracing::info!("Initializing {} v{}", FRAMEWORK_NAME, VERSION);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_framework_info() {
        assert_eq!(FRAMEWORK_NAME, "ComponentBus");
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_initialize_is_idempotent() {
        let config = BusConfig::default();
        initialize(&config);
        initialize(&config);
    }
}
