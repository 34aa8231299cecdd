//! 核心基础层模块
//!
//! 标识注册表、组件树、消息总线与命令转发

pub mod identity;
pub mod tree;
pub mod metrics;
pub mod bus;
pub mod forwarder;

// 重新导出核心组件
pub use identity::*;
pub use tree::*;
pub use metrics::BusMetrics;
pub use bus::*;
pub use forwarder::*;
