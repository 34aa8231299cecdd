//! 组件基础层
//!
//! 每个参与者都通过这里的契约使用总线：构造时取得标识符、登记到组件树、
//! 注册唯一的寻址处理器；入站消息先由总线投递到组件，再由组件按消息类型分派。

pub mod mounted;

pub use mounted::*;

use crate::core::{IncludeFn, MessageBus};
use crate::types::{ComponentId, Envelope, Message, Response, Route, TargetSpec};
use crate::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::fmt::Debug;

/// 组件能理解的消息类型集合，通常是一个枚举
pub trait MessageKind: Sized + Copy + Debug + Send + Sync + 'static {
    /// 从线上消息类型解析，未知类型返回 None
    fn parse(message_type: &str) -> Option<Self>;

    fn as_str(&self) -> &'static str;
}

/// 总线上的组件
#[async_trait]
pub trait Component: Send + Sync + 'static {
    type Message: MessageKind;

    /// 逻辑类名，挂载时登记为角色
    fn class_name(&self) -> &'static str;

    /// 处理已识别的消息
    async fn on_message(
        &self,
        ctx: &ComponentContext,
        message: Self::Message,
        envelope: &Envelope,
    ) -> Result<Value>;

    /// 生命周期状态变更通知
    fn on_state_change(&self, _id: &ComponentId, _state: ComponentState) {}
}

/// 组件生命周期状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentState {
    /// 已取得标识符
    Constructed,
    /// 寻址处理器已注册
    Registered,
    /// 正在应答消息
    Active,
    /// 终态，三处注册均已移除
    Destroyed,
}

/// 组件运行时上下文：自身标识与总线句柄
#[derive(Clone)]
pub struct ComponentContext {
    id: ComponentId,
    bus: MessageBus,
}

impl ComponentContext {
    pub fn new(id: ComponentId, bus: MessageBus) -> Self {
        Self { id, bus }
    }

    pub fn id(&self) -> &ComponentId {
        &self.id
    }

    pub fn bus(&self) -> &MessageBus {
        &self.bus
    }

    pub fn parent(&self) -> Option<ComponentId> {
        self.bus.parent(&self.id)
    }

    pub async fn send(&self, target: impl Into<TargetSpec>, message_type: &str, data: Value) -> Result<bool> {
        self.bus.send_message(target, message_type, data, &self.id).await
    }

    pub async fn request(&self, target: impl Into<TargetSpec>, message_type: &str, data: Value) -> Result<Response> {
        self.bus.send_request(target, message_type, data, &self.id).await
    }

    /// 全树广播
    pub async fn broadcast(&self, message: &Message) -> Result<usize> {
        self.bus.broadcast(&self.id, message).await
    }

    /// 只广播到自己的子树
    pub async fn broadcast_subtree(&self, message: &Message, include: Option<&IncludeFn<'_>>) -> Result<usize> {
        self.bus.broadcast_up(Some(&self.id), message, include).await
    }

    pub fn route_to(&self, target: &ComponentId) -> Option<Route> {
        self.bus.find_route(&self.id, target)
    }

    pub async fn send_via_route(&self, route: &Route, message: &Message) -> Result<bool> {
        self.bus.send_via_route(&self.id, route, message).await
    }

    /// 转发给某角色的所有存活实例
    pub async fn forward_to_class(&self, class_name: &str, message: &Message) -> Result<Response> {
        self.bus
            .send_request(TargetSpec::class(class_name), &message.message_type, message.data.clone(), &self.id)
            .await
    }
}
