//! 组件挂载与生命周期管理

use super::{Component, ComponentContext, ComponentState, MessageKind};
use crate::core::{AddressedHandler, HandlerRegistration, IncludeFn, MessageBus, WeakBus};
use crate::types::{ComponentId, Envelope, Message, Response, Route, TargetSpec};
use crate::{BusError, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// 寻址处理器适配器：总线 -> 组件 -> 按消息类型分派
struct Dispatcher<C: Component> {
    id: ComponentId,
    component: Arc<C>,
    bus: WeakBus,
}

#[async_trait]
impl<C: Component> AddressedHandler for Dispatcher<C> {
    async fn handle(&self, message_type: &str, envelope: &Envelope, _sender: &ComponentId) -> Result<Value> {
        let Some(message) = <C::Message as MessageKind>::parse(message_type) else {
            debug!("Component '{}' ({}) has no handler for '{}'", self.id, self.component.class_name(), message_type);
            return Ok(Value::Bool(false));
        };
        let Some(bus) = self.bus.upgrade() else {
            return Err(BusError::ComponentDestroyed { component: self.id.clone() });
        };

        let ctx = ComponentContext::new(self.id.clone(), bus);
        self.component.on_message(&ctx, message, envelope).await
    }

    fn name(&self) -> &str {
        self.component.class_name()
    }
}

/// 已挂载到总线上的组件
pub struct Mounted<C: Component> {
    context: ComponentContext,
    component: Arc<C>,
    name: String,
    state: ComponentState,
    registration: Option<HandlerRegistration>,
}

/// 挂载组件：取得标识符，登记实例与组件树，注册寻址处理器和角色
pub fn mount<C: Component>(
    bus: &MessageBus,
    name: &str,
    parent: Option<&ComponentId>,
    component: C,
) -> Result<Mounted<C>> {
    let id = bus.generate_identifier(name)?;
    let mut mounted = Mounted {
        context: ComponentContext::new(id.clone(), bus.clone()),
        component: Arc::new(component),
        name: name.to_string(),
        state: ComponentState::Constructed,
        registration: None,
    };
    mounted.component.on_state_change(&id, ComponentState::Constructed);

    bus.register_instance(&id, mounted.component.clone());
    bus.register_in_tree(&id, parent);

    let dispatcher = Dispatcher {
        id: id.clone(),
        component: mounted.component.clone(),
        bus: bus.downgrade(),
    };
    mounted.registration = Some(bus.register_addressed_handler(&id, Arc::new(dispatcher)));
    mounted.transition(ComponentState::Registered);

    bus.register_role(&id, mounted.component.class_name());
    bus.register_role(&id, name);
    mounted.transition(ComponentState::Active);

    info!("Component '{}' ({}) active", id, mounted.component.class_name());
    Ok(mounted)
}

impl<C: Component> Mounted<C> {
    pub fn id(&self) -> &ComponentId {
        self.context.id()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn component(&self) -> &Arc<C> {
        &self.component
    }

    pub fn state(&self) -> ComponentState {
        self.state
    }

    fn transition(&mut self, state: ComponentState) {
        debug!("Component '{}' {:?} -> {:?}", self.id(), self.state, state);
        self.state = state;
        self.component.on_state_change(self.context.id(), state);
    }

    fn active(&self) -> Result<&ComponentContext> {
        match self.state {
            ComponentState::Destroyed => Err(BusError::ComponentDestroyed {
                component: self.id().clone(),
            }),
            _ => Ok(&self.context),
        }
    }

    pub fn context(&self) -> Result<&ComponentContext> {
        self.active()
    }

    pub async fn send(&self, target: impl Into<TargetSpec>, message_type: &str, data: Value) -> Result<bool> {
        self.active()?.send(target, message_type, data).await
    }

    pub async fn request(&self, target: impl Into<TargetSpec>, message_type: &str, data: Value) -> Result<Response> {
        self.active()?.request(target, message_type, data).await
    }

    pub async fn broadcast(&self, message: &Message) -> Result<usize> {
        self.active()?.broadcast(message).await
    }

    pub async fn broadcast_subtree(&self, message: &Message, include: Option<&IncludeFn<'_>>) -> Result<usize> {
        self.active()?.broadcast_subtree(message, include).await
    }

    pub fn route_to(&self, target: &ComponentId) -> Result<Option<Route>> {
        Ok(self.active()?.route_to(target))
    }

    pub async fn send_via_route(&self, route: &Route, message: &Message) -> Result<bool> {
        self.active()?.send_via_route(route, message).await
    }

    /// 按顺序注销寻址处理器、组件树与标识注册表；不级联到子组件
    pub fn destroy(&mut self) -> Result<()> {
        let id = self.active()?.id().clone();
        let bus = self.context.bus().clone();

        let owned = self.registration.take().map(|registration| registration.unregister()).unwrap_or(false);
        if !owned && bus.unregister_addressed_handler(&id) {
            warn!("Component '{}' handler was replaced after mount; removed replacement on destroy", id);
        }
        bus.unregister_roles(&id);
        bus.unregister_component(&id);
        bus.unregister_instance(&id);

        self.transition(ComponentState::Destroyed);
        info!("Component '{}' destroyed", id);
        Ok(())
    }
}
