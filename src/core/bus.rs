//! 层级消息总线
//!
//! 进程内路由器：按标识符直接投递、按角色多目标投递、全树/子树广播，
//! 以及在可变父子树上计算任意两节点之间的路由。
//!
//! 处理器在调用期间可以重入总线（发送、注册、注销）。所有内部锁都是短暂的同步锁，
//! 绝不跨越处理器的 `.await` 持有。多目标发送与广播严格串行，每次调用完成后才开始下一次。

use super::identity::{IdentityRegistry, InstanceRef};
use super::metrics::{BusMetrics, MetricsRecorder};
use super::tree::ComponentTree;
use crate::config::{AncestorRouteEncoding, BroadcastMode, BusConfig};
use crate::types::{is_truthy, ComponentId, Envelope, Message, Response, Route, TargetSpec};
use crate::Result;
use async_trait::async_trait;
use futures::future::join_all;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Weak};
use tracing::{debug, info, warn};

/// 寻址处理器：总线向某个组件投递任何消息时调用的唯一入口
#[async_trait]
pub trait AddressedHandler: Send + Sync {
    /// 处理消息，返回值用作请求响应；对即发即弃语义，真值表示已处理
    async fn handle(&self, message_type: &str, envelope: &Envelope, sender: &ComponentId) -> Result<Value>;

    /// 处理器名称
    fn name(&self) -> &str {
        "anonymous"
    }
}

/// 闭包处理器包装器
pub struct FnHandler<F> {
    name: String,
    handler_fn: F,
}

impl<F> FnHandler<F> {
    pub fn new(name: &str, handler_fn: F) -> Self
    where
        F: Fn(&str, &Envelope, &ComponentId) -> Result<Value> + Send + Sync + 'static,
    {
        Self {
            name: name.to_string(),
            handler_fn,
        }
    }
}

#[async_trait]
impl<F> AddressedHandler for FnHandler<F>
where
    F: Fn(&str, &Envelope, &ComponentId) -> Result<Value> + Send + Sync + 'static,
{
    async fn handle(&self, message_type: &str, envelope: &Envelope, sender: &ComponentId) -> Result<Value> {
        (self.handler_fn)(message_type, envelope, sender)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// 广播包含谓词
pub type IncludeFn<'a> = dyn Fn(&ComponentId) -> bool + Send + Sync + 'a;

struct HandlerEntry {
    handler: Arc<dyn AddressedHandler>,
    /// 注册序号，决定按角色扫描时的发现顺序
    sequence: u64,
}

#[derive(Default)]
struct BusState {
    tree: ComponentTree,
    handlers: HashMap<ComponentId, HandlerEntry>,
    roles: HashMap<ComponentId, Vec<String>>,
    root: Option<ComponentId>,
    next_sequence: u64,
}

struct BusInner {
    config: BusConfig,
    identity: IdentityRegistry,
    state: RwLock<BusState>,
    metrics: MetricsRecorder,
}

/// 消息总线句柄，克隆开销很小，显式注入到每个组件
#[derive(Clone)]
pub struct MessageBus {
    inner: Arc<BusInner>,
}

/// 总线弱引用，组件处理器持有它以避免与处理器表形成引用环
#[derive(Clone)]
pub struct WeakBus {
    inner: Weak<BusInner>,
}

impl WeakBus {
    pub fn upgrade(&self) -> Option<MessageBus> {
        self.inner.upgrade().map(|inner| MessageBus { inner })
    }
}

/// 寻址处理器注册凭证
///
/// `unregister` 只移除本次注册的条目；同一标识符重新注册后旧凭证失效。
#[derive(Debug)]
pub struct HandlerRegistration {
    bus: Weak<BusInner>,
    id: ComponentId,
    sequence: u64,
}

impl HandlerRegistration {
    pub fn id(&self) -> &ComponentId {
        &self.id
    }

    /// 注销处理器，返回是否实际移除
    pub fn unregister(self) -> bool {
        let Some(inner) = self.bus.upgrade() else {
            return false;
        };
        let mut state = inner.state.write();
        let owned = state.handlers.get(&self.id).map(|entry| entry.sequence == self.sequence).unwrap_or(false);
        if owned {
            state.handlers.remove(&self.id);
            debug!("Addressed handler for '{}' unregistered", self.id);
        }
        owned
    }
}

impl MessageBus {
    /// 创建新的消息总线，配置无效时拒绝
    pub fn new(config: BusConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::with_valid_config(config))
    }

    fn with_valid_config(config: BusConfig) -> Self {
        let identity = IdentityRegistry::new(config.identity.suffix_length);
        let metrics = MetricsRecorder::new(config.enable_metrics);
        Self {
            inner: Arc::new(BusInner {
                config,
                identity,
                state: RwLock::new(BusState::default()),
                metrics,
            }),
        }
    }

    pub fn downgrade(&self) -> WeakBus {
        WeakBus {
            inner: Arc::downgrade(&self.inner),
        }
    }

    pub fn config(&self) -> &BusConfig {
        &self.inner.config
    }

    pub fn metrics(&self) -> BusMetrics {
        self.inner.metrics.snapshot()
    }

    // === 标识注册 ===

    pub fn identity(&self) -> &IdentityRegistry {
        &self.inner.identity
    }

    pub fn generate_identifier(&self, name: &str) -> Result<ComponentId> {
        self.inner.identity.generate_identifier(name)
    }

    pub fn register_instance(&self, id: &ComponentId, instance: InstanceRef) {
        self.inner.identity.register_instance(id, instance);
    }

    pub fn unregister_instance(&self, id: &ComponentId) {
        self.inner.identity.unregister_instance(id);
    }

    pub fn lookup(&self, id: &ComponentId) -> Option<InstanceRef> {
        self.inner.identity.lookup(id)
    }

    // === 组件树 ===

    /// 注册到组件树；无父节点且尚未指定根时成为根
    pub fn register_in_tree(&self, id: &ComponentId, parent: Option<&ComponentId>) {
        let mut state = self.inner.state.write();
        state.tree.register(id, parent);
        if parent.is_none() && state.root.is_none() {
            state.root = Some(id.clone());
            info!("Component '{}' designated as root", id);
        }
        drop(state);

        self.inner.metrics.component_registered();
        debug!("Component '{}' registered in tree under {:?}", id, parent.map(|p| p.as_str()));
    }

    /// 从组件树注销，不级联到子节点
    pub fn unregister_component(&self, id: &ComponentId) {
        let mut state = self.inner.state.write();
        state.tree.unregister(id);
        if state.root.as_ref() == Some(id) {
            state.root = None;
            info!("Root component '{}' unregistered", id);
        }
        debug!("Component '{}' removed from tree", id);
    }

    pub fn designate_root(&self, id: &ComponentId) {
        self.inner.state.write().root = Some(id.clone());
        info!("Component '{}' designated as root", id);
    }

    pub fn root(&self) -> Option<ComponentId> {
        self.inner.state.read().root.clone()
    }

    pub fn parent(&self, id: &ComponentId) -> Option<ComponentId> {
        self.inner.state.read().tree.parent(id).cloned()
    }

    /// 子节点快照
    pub fn children(&self, id: &ComponentId) -> Vec<ComponentId> {
        self.inner.state.read().tree.children(id)
    }

    pub fn in_tree(&self, id: &ComponentId) -> bool {
        self.inner.state.read().tree.contains(id)
    }

    // === 寻址处理器与角色 ===

    /// 注册寻址处理器，同一标识符至多一个条目，重复注册会替换
    pub fn register_addressed_handler(&self, id: &ComponentId, handler: Arc<dyn AddressedHandler>) -> HandlerRegistration {
        let handler_name = handler.name().to_string();
        let sequence = {
            let mut state = self.inner.state.write();
            let sequence = state.next_sequence;
            state.next_sequence += 1;
            state.handlers.insert(id.clone(), HandlerEntry { handler, sequence });
            sequence
        };

        info!("Registered addressed handler '{}' for component '{}'", handler_name, id);
        HandlerRegistration {
            bus: Arc::downgrade(&self.inner),
            id: id.clone(),
            sequence,
        }
    }

    pub fn unregister_addressed_handler(&self, id: &ComponentId) -> bool {
        let removed = self.inner.state.write().handlers.remove(id).is_some();
        if removed {
            debug!("Addressed handler for '{}' unregistered", id);
        }
        removed
    }

    pub fn has_handler(&self, id: &ComponentId) -> bool {
        self.inner.state.read().handlers.contains_key(id)
    }

    /// 显式登记角色名，供 `class:` 目标解析
    pub fn register_role(&self, id: &ComponentId, role: &str) {
        let mut state = self.inner.state.write();
        let roles = state.roles.entry(id.clone()).or_default();
        if !roles.iter().any(|r| r == role) {
            roles.push(role.to_string());
        }
    }

    pub fn unregister_roles(&self, id: &ComponentId) {
        self.inner.state.write().roles.remove(id);
    }

    pub fn roles(&self, id: &ComponentId) -> Vec<String> {
        self.inner.state.read().roles.get(id).cloned().unwrap_or_default()
    }

    /// 扫描处理器表，按注册顺序返回拥有该角色的所有组件
    pub fn get_components_by_class_name(&self, name: &str) -> Vec<ComponentId> {
        let state = self.inner.state.read();
        let mut matches: Vec<(&ComponentId, u64)> = state
            .handlers
            .iter()
            .filter(|(id, _)| {
                state.roles.get(*id).map(|roles| roles.iter().any(|r| r == name)).unwrap_or(false)
            })
            .map(|(id, entry)| (id, entry.sequence))
            .collect();
        matches.sort_by_key(|(_, sequence)| *sequence);
        matches.into_iter().map(|(id, _)| id.clone()).collect()
    }

    /// 完整注销：处理器、组件树、标识注册表，按此顺序
    pub fn teardown(&self, id: &ComponentId) {
        self.unregister_addressed_handler(id);
        self.unregister_roles(id);
        self.unregister_component(id);
        self.unregister_instance(id);
        info!("Component '{}' torn down", id);
    }

    // === 目标解析与投递 ===

    pub fn resolve_target(&self, target: &TargetSpec) -> Vec<ComponentId> {
        match target {
            TargetSpec::Id(id) => vec![id.clone()],
            TargetSpec::Class(name) => self.get_components_by_class_name(name),
            TargetSpec::Root => self.root().into_iter().collect(),
        }
    }

    /// 调用单个组件的处理器；未注册处理器时返回 None
    async fn invoke(&self, id: &ComponentId, envelope: &Envelope) -> Result<Option<Value>> {
        let handler = {
            let state = self.inner.state.read();
            state.handlers.get(id).map(|entry| entry.handler.clone())
        };

        let Some(handler) = handler else {
            debug!("No addressed handler for '{}', skipping", id);
            return Ok(None);
        };

        debug!("Delivering '{}' from '{}' to '{}'", envelope.message_type, envelope.sender, id);
        let result = handler.handle(&envelope.message_type, envelope, &envelope.sender).await?;
        self.inner.metrics.delivery();
        Ok(Some(result))
    }

    async fn dispatch(&self, target: &TargetSpec, envelope: &Envelope) -> Result<Response> {
        let targets = self.resolve_target(target);
        match targets.as_slice() {
            [] => Ok(Response::TargetNotFound),
            [only] => Ok(match self.invoke(only, envelope).await? {
                Some(result) => Response::Single(result),
                None => Response::TargetNotFound,
            }),
            many => {
                let mut results = Vec::with_capacity(many.len());
                for id in many {
                    if let Some(result) = self.invoke(id, envelope).await? {
                        results.push(result);
                    }
                }
                Ok(Response::Many(results))
            }
        }
    }

    /// 即发即弃发送
    ///
    /// 单目标返回处理器结果的真值；多目标只要调用了至少一个处理器即返回 true；
    /// 目标不存在返回 false。处理器错误原样传播。
    pub async fn send_message(
        &self,
        target: impl Into<TargetSpec>,
        message_type: &str,
        data: Value,
        sender: &ComponentId,
    ) -> Result<bool> {
        let target = target.into();
        let envelope = Envelope::new(message_type, data, sender);
        self.inner.metrics.message_sent();

        let delivered = match self.dispatch(&target, &envelope).await? {
            Response::TargetNotFound => {
                self.inner.metrics.target_not_found();
                warn!("Message '{}' from '{}': target '{}' not found", message_type, sender, target);
                false
            }
            Response::Single(result) => is_truthy(&result),
            Response::Many(results) => !results.is_empty(),
        };
        Ok(delivered)
    }

    /// 请求/响应发送；总线本身不设超时
    pub async fn send_request(
        &self,
        target: impl Into<TargetSpec>,
        message_type: &str,
        data: Value,
        sender: &ComponentId,
    ) -> Result<Response> {
        let target = target.into();
        let envelope = Envelope::new(message_type, data, sender);
        self.inner.metrics.request_sent();

        let response = self.dispatch(&target, &envelope).await?;
        if response.is_not_found() {
            self.inner.metrics.target_not_found();
            warn!("Request '{}' from '{}': target '{}' not found", message_type, sender, target);
        }
        Ok(response)
    }

    // === 广播 ===

    /// 向整棵树（从根开始）除发送者以外的每个节点投递，返回投递数
    pub async fn broadcast(&self, from: &ComponentId, message: &Message) -> Result<usize> {
        let Some(root) = self.root() else {
            debug!("Broadcast from '{}' skipped: no root designated", from);
            return Ok(0);
        };
        let not_sender = |id: &ComponentId| id != from;
        self.walk(&root, from, message, &not_sender).await
    }

    /// 向 `from`（默认根）的子树投递，`include` 默认为“不是起点”；
    /// 无论当前节点是否投递，总会继续遍历其子节点
    pub async fn broadcast_up(
        &self,
        from: Option<&ComponentId>,
        message: &Message,
        include: Option<&IncludeFn<'_>>,
    ) -> Result<usize> {
        let origin = match from {
            Some(id) => id.clone(),
            None => match self.root() {
                Some(root) => root,
                None => return Ok(0),
            },
        };

        let not_origin = |id: &ComponentId| id != &origin;
        let include: &IncludeFn<'_> = match include {
            Some(predicate) => predicate,
            None => &not_origin,
        };
        self.walk(&origin, &origin, message, include).await
    }

    async fn walk(
        &self,
        start: &ComponentId,
        sender: &ComponentId,
        message: &Message,
        include: &IncludeFn<'_>,
    ) -> Result<usize> {
        let envelope = Envelope::new(&message.message_type, message.data.clone(), sender);
        self.inner.metrics.broadcast();

        let delivered = match self.inner.config.broadcast.mode {
            BroadcastMode::Sequential => self.walk_sequential(start, &envelope, include).await?,
            BroadcastMode::Concurrent => self.walk_concurrent(start, &envelope, include).await?,
        };
        debug!("Broadcast '{}' from '{}' delivered to {} components", message.message_type, sender, delivered);
        Ok(delivered)
    }

    /// 前序深度优先；每个节点的子列表在访问该节点时取快照
    async fn walk_sequential(&self, start: &ComponentId, envelope: &Envelope, include: &IncludeFn<'_>) -> Result<usize> {
        let mut delivered = 0;
        let mut visited = HashSet::new();
        let mut stack = vec![start.clone()];

        while let Some(node) = stack.pop() {
            if !visited.insert(node.clone()) {
                continue;
            }
            if include(&node) && self.invoke(&node, envelope).await?.is_some() {
                delivered += 1;
            }
            stack.extend(self.children(&node).into_iter().rev());
        }
        Ok(delivered)
    }

    /// 同一父节点下的兄弟节点并发投递，父节点仍先于子节点
    ///
    /// 某个兄弟失败时，同组其余兄弟已经一并投递；错误在整组完成后返回，
    /// 之后不再下降到任何子树。
    async fn walk_concurrent(&self, start: &ComponentId, envelope: &Envelope, include: &IncludeFn<'_>) -> Result<usize> {
        let mut delivered = 0;
        let mut visited = HashSet::new();
        let mut groups = vec![vec![start.clone()]];

        while let Some(group) = groups.pop() {
            let group: Vec<ComponentId> = group.into_iter().filter(|id| visited.insert(id.clone())).collect();

            let deliveries = group
                .iter()
                .filter(|id| include(*id))
                .map(|id| self.invoke(id, envelope));
            for outcome in join_all(deliveries).await {
                if outcome?.is_some() {
                    delivered += 1;
                }
            }

            for node in group.iter().rev() {
                let children = self.children(node);
                if !children.is_empty() {
                    groups.push(children);
                }
            }
        }
        Ok(delivered)
    }

    // === 路由 ===

    /// 计算 source 到 target 的路由；两节点不连通时返回 None
    pub fn find_route(&self, source: &ComponentId, target: &ComponentId) -> Option<Route> {
        if source == target {
            return Some(Route::empty());
        }

        let state = self.inner.state.read();
        let tree = &state.tree;

        if let Some(path) = tree.find_descendant_path(source, target) {
            return Some(Route::from_hops(path));
        }

        let ancestors = tree.ancestors(source);
        if let Some(position) = ancestors.iter().position(|a| a == target) {
            let route = match self.inner.config.routing.ancestor_encoding {
                AncestorRouteEncoding::TargetOnly => Route::from_hops(vec![target.clone()]),
                AncestorRouteEncoding::FullChain => Route::from_hops(ancestors[..=position].to_vec()),
            };
            return Some(route);
        }

        let source_path = tree.path_to_root(source);
        let target_path = tree.path_to_root(target);
        let Some(down_end) = source_path.iter().position(|id| target_path.contains(id)) else {
            debug!("No common ancestor between '{}' and '{}'", source, target);
            return None;
        };
        let common = &source_path[down_end];
        let up_start = target_path.iter().position(|id| id == common)?;

        let down = Route::from_hops(source_path[1..=down_end].to_vec());
        let up = Route::from_hops(target_path[..up_start].iter().rev().cloned().collect());
        Some(down.join(up))
    }

    /// 按路由发送：只投递给路由的最后一跳，不经中间节点转发
    pub async fn send_via_route(&self, from: &ComponentId, route: &Route, message: &Message) -> Result<bool> {
        let Some(target) = route.last() else {
            warn!("Route send from '{}' ignored: empty route", from);
            return Ok(false);
        };

        let envelope = Envelope::new(&message.message_type, message.data.clone(), from).with_route(route.clone());
        self.inner.metrics.route_send();

        match self.invoke(target, &envelope).await? {
            Some(result) => Ok(is_truthy(&result)),
            None => {
                self.inner.metrics.target_not_found();
                warn!("Route send from '{}': final hop '{}' not found", from, target);
                Ok(false)
            }
        }
    }
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::with_valid_config(BusConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BusError;
    use parking_lot::Mutex;
    use serde_json::json;

    fn id(s: &str) -> ComponentId {
        ComponentId::from(s)
    }

    /// 记录投递顺序的处理器
    fn recorder(bus: &MessageBus, component: &str, log: &Arc<Mutex<Vec<String>>>) {
        let log = log.clone();
        let name = component.to_string();
        bus.register_addressed_handler(
            &id(component),
            Arc::new(FnHandler::new(component, move |message_type, _envelope, _sender| {
                log.lock().push(format!("{}:{}", name, message_type));
                Ok(json!(true))
            })),
        );
    }

    /// R -> (A -> C), B，全部带处理器
    fn sample_bus(config: BusConfig) -> (MessageBus, Arc<Mutex<Vec<String>>>) {
        let bus = MessageBus::new(config).unwrap();
        let log = Arc::new(Mutex::new(Vec::new()));
        bus.register_in_tree(&id("R"), None);
        bus.register_in_tree(&id("A"), Some(&id("R")));
        bus.register_in_tree(&id("B"), Some(&id("R")));
        bus.register_in_tree(&id("C"), Some(&id("A")));
        for name in ["R", "A", "B", "C"] {
            recorder(&bus, name, &log);
        }
        (bus, log)
    }

    #[tokio::test]
    async fn test_first_parentless_component_is_root() {
        let (bus, _) = sample_bus(BusConfig::default());
        assert_eq!(bus.root(), Some(id("R")));
        assert_eq!(bus.resolve_target(&TargetSpec::Root), vec![id("R")]);

        bus.register_in_tree(&id("floating"), None);
        assert_eq!(bus.root(), Some(id("R")));

        bus.unregister_component(&id("R"));
        assert_eq!(bus.root(), None);
        assert!(bus.resolve_target(&TargetSpec::Root).is_empty());
    }

    #[tokio::test]
    async fn test_direct_send_and_request() {
        let (bus, log) = sample_bus(BusConfig::default());
        assert!(bus.send_message("A", "ping", json!({}), &id("R")).await.unwrap());
        assert_eq!(bus.send_request("id:B", "ping", json!({}), &id("R")).await.unwrap(), Response::Single(json!(true)));
        assert_eq!(bus.send_request("root", "ping", json!({}), &id("C")).await.unwrap(), Response::Single(json!(true)));
        assert_eq!(*log.lock(), vec!["A:ping", "B:ping", "R:ping"]);
    }

    #[tokio::test]
    async fn test_falsy_handler_result() {
        let bus = MessageBus::default();
        bus.register_addressed_handler(&id("X"), Arc::new(FnHandler::new("x", |_, _, _| Ok(json!(false)))));
        assert!(!bus.send_message("X", "anything", json!(null), &id("Y")).await.unwrap());
        assert_eq!(bus.metrics().targets_not_found, 0);
    }

    #[tokio::test]
    async fn test_missing_target() {
        let bus = MessageBus::default();
        assert!(!bus.send_message("nonexistent-id", "ping", json!({}), &id("S")).await.unwrap());
        let response = bus.send_request("nonexistent-id", "ping", json!({}), &id("S")).await.unwrap();
        assert_eq!(response.into_value(), json!({"error": "Target not found."}));
        assert_eq!(bus.metrics().targets_not_found, 2);
    }

    #[tokio::test]
    async fn test_class_resolution_in_registration_order() {
        let bus = MessageBus::default();
        for (name, answer) in [("second", 2), ("first", 1)] {
            bus.register_addressed_handler(
                &id(name),
                Arc::new(FnHandler::new(name, move |_, _, _| Ok(json!(answer)))),
            );
            bus.register_role(&id(name), "Foo");
        }
        // 有角色但无处理器的组件不参与解析
        bus.register_role(&id("ghost"), "Foo");

        assert_eq!(bus.get_components_by_class_name("Foo"), vec![id("second"), id("first")]);
        let response = bus.send_request("class:Foo", "query", json!({}), &id("S")).await.unwrap();
        assert_eq!(response, Response::Many(vec![json!(2), json!(1)]));
        assert!(bus.send_message("class:Foo", "query", json!({}), &id("S")).await.unwrap());
        assert!(!bus.send_message("class:Bar", "query", json!({}), &id("S")).await.unwrap());
    }

    #[tokio::test]
    async fn test_handler_error_propagates_unchanged() {
        let bus = MessageBus::default();
        bus.register_addressed_handler(
            &id("broken"),
            Arc::new(FnHandler::new("broken", |_, _, _| Err(BusError::handler(&ComponentId::from("broken"), "boom")))),
        );
        let err = bus.send_request("broken", "ping", json!({}), &id("S")).await.unwrap_err();
        assert_eq!(err.to_string(), "Handler error in broken: boom");
    }

    #[tokio::test]
    async fn test_stale_registration_token() {
        let bus = MessageBus::default();
        let first = bus.register_addressed_handler(&id("X"), Arc::new(FnHandler::new("v1", |_, _, _| Ok(json!(1)))));
        let second = bus.register_addressed_handler(&id("X"), Arc::new(FnHandler::new("v2", |_, _, _| Ok(json!(2)))));

        assert!(!first.unregister());
        assert_eq!(bus.send_request("X", "v", json!({}), &id("S")).await.unwrap(), Response::Single(json!(2)));
        assert!(second.unregister());
        assert!(!bus.has_handler(&id("X")));
    }

    #[tokio::test]
    async fn test_broadcast_order_and_count() {
        let (bus, log) = sample_bus(BusConfig::default());
        let delivered = bus.broadcast(&id("R"), &Message::new("refresh", json!({}))).await.unwrap();
        assert_eq!(delivered, 3);
        assert_eq!(*log.lock(), vec!["A:refresh", "C:refresh", "B:refresh"]);
    }

    #[tokio::test]
    async fn test_broadcast_from_leaf_reaches_root() {
        let (bus, log) = sample_bus(BusConfig::default());
        let delivered = bus.broadcast(&id("C"), &Message::new("saved", json!({}))).await.unwrap();
        assert_eq!(delivered, 3);
        assert_eq!(*log.lock(), vec!["R:saved", "A:saved", "B:saved"]);
    }

    #[tokio::test]
    async fn test_broadcast_up_subtree_with_predicate() {
        let (bus, log) = sample_bus(BusConfig::default());

        let delivered = bus.broadcast_up(Some(&id("A")), &Message::new("resize", json!({})), None).await.unwrap();
        assert_eq!(delivered, 1);
        assert_eq!(*log.lock(), vec!["C:resize"]);

        log.lock().clear();
        let only_b = |node: &ComponentId| node.as_str() == "B";
        let delivered = bus.broadcast_up(None, &Message::new("focus", json!({})), Some(&only_b)).await.unwrap();
        assert_eq!(delivered, 1);
        assert_eq!(*log.lock(), vec!["B:focus"]);
    }

    #[tokio::test]
    async fn test_concurrent_broadcast_keeps_parent_first() {
        let mut config = BusConfig::default();
        config.broadcast.mode = BroadcastMode::Concurrent;
        let (bus, log) = sample_bus(config);

        let delivered = bus.broadcast(&id("R"), &Message::new("refresh", json!({}))).await.unwrap();
        assert_eq!(delivered, 3);
        let log = log.lock();
        let position = |entry: &str| log.iter().position(|e| e == entry).unwrap();
        assert!(position("A:refresh") < position("C:refresh"));
    }

    #[tokio::test]
    async fn test_broadcast_aborts_on_handler_error() {
        let (bus, log) = sample_bus(BusConfig::default());
        bus.register_addressed_handler(
            &id("A"),
            Arc::new(FnHandler::new("A", |_, _, _| Err(BusError::handler(&ComponentId::from("A"), "failed")))),
        );
        assert!(bus.broadcast(&id("R"), &Message::new("refresh", json!({}))).await.is_err());
        assert!(log.lock().is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_broadcast_failure_still_reaches_siblings() {
        let mut config = BusConfig::default();
        config.broadcast.mode = BroadcastMode::Concurrent;
        let (bus, log) = sample_bus(config);
        bus.register_addressed_handler(
            &id("A"),
            Arc::new(FnHandler::new("A", |_, _, _| Err(BusError::handler(&ComponentId::from("A"), "failed")))),
        );

        let result = bus.broadcast(&id("R"), &Message::new("refresh", json!({}))).await;
        assert!(matches!(result, Err(BusError::Handler { .. })));
        // 同组兄弟 B 已投递，失败节点的子树 C 不再访问
        assert_eq!(*log.lock(), vec!["B:refresh"]);
    }

    #[test]
    fn test_new_rejects_invalid_suffix_length() {
        for suffix_length in [0, 3, 33] {
            let mut config = BusConfig::default();
            config.identity.suffix_length = suffix_length;
            assert!(matches!(MessageBus::new(config), Err(BusError::Config { .. })));
        }

        let mut config = BusConfig::default();
        config.identity.suffix_length = 4;
        let bus = MessageBus::new(config).unwrap();
        assert!(bus.generate_identifier("x").is_ok());
    }

    #[tokio::test]
    async fn test_routes() {
        let (bus, _) = sample_bus(BusConfig::default());
        assert_eq!(bus.find_route(&id("A"), &id("A")).unwrap().to_string(), "");
        assert_eq!(bus.find_route(&id("R"), &id("C")).unwrap().to_string(), "A:C");
        assert_eq!(bus.find_route(&id("A"), &id("C")).unwrap().to_string(), "C");
        assert_eq!(bus.find_route(&id("C"), &id("A")).unwrap().to_string(), "A");
        // 多跳祖先路由只返回目标本身
        assert_eq!(bus.find_route(&id("C"), &id("R")).unwrap().to_string(), "R");
        assert_eq!(bus.find_route(&id("C"), &id("B")).unwrap().to_string(), "A:R:B");
        assert_eq!(bus.find_route(&id("B"), &id("C")).unwrap().to_string(), "R:A:C");
    }

    #[tokio::test]
    async fn test_full_chain_ancestor_encoding() {
        let mut config = BusConfig::default();
        config.routing.ancestor_encoding = AncestorRouteEncoding::FullChain;
        let (bus, _) = sample_bus(config);
        assert_eq!(bus.find_route(&id("C"), &id("R")).unwrap().to_string(), "A:R");
        assert_eq!(bus.find_route(&id("C"), &id("A")).unwrap().to_string(), "A");
    }

    #[tokio::test]
    async fn test_disconnected_route_is_none() {
        let (bus, _) = sample_bus(BusConfig::default());
        bus.register_in_tree(&id("island"), None);
        assert!(bus.find_route(&id("C"), &id("island")).is_none());
        assert!(bus.find_route(&id("nowhere"), &id("C")).is_none());
    }

    #[tokio::test]
    async fn test_send_via_route_targets_final_hop_only() {
        let bus = MessageBus::default();
        let seen = Arc::new(Mutex::new(Vec::new()));
        for name in ["A", "R", "B"] {
            let seen = seen.clone();
            bus.register_addressed_handler(
                &id(name),
                Arc::new(FnHandler::new(name, move |_, envelope, _| {
                    seen.lock().push((
                        envelope.route.as_ref().map(|r| r.to_string()),
                        envelope.direction,
                    ));
                    Ok(json!(true))
                })),
            );
        }

        let route: Route = "A:R:B".parse().unwrap();
        assert!(bus.send_via_route(&id("C"), &route, &Message::new("open", json!({}))).await.unwrap());
        let single: Route = "B".parse().unwrap();
        assert!(bus.send_via_route(&id("C"), &single, &Message::new("open", json!({}))).await.unwrap());
        assert!(!bus.send_via_route(&id("C"), &Route::empty(), &Message::new("open", json!({}))).await.unwrap());

        let seen = seen.lock();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0], (Some("A:R:B".to_string()), Some(crate::types::RouteDirection::Route)));
        assert_eq!(seen[1], (Some("B".to_string()), Some(crate::types::RouteDirection::Direct)));
    }

    #[tokio::test]
    async fn test_teardown_behaves_like_missing_target() {
        let (bus, _) = sample_bus(BusConfig::default());
        bus.register_instance(&id("B"), Arc::new(()));
        bus.register_role(&id("B"), "Panel");

        bus.teardown(&id("B"));
        assert!(bus.lookup(&id("B")).is_none());
        assert_eq!(bus.children(&id("R")), vec![id("A")]);
        assert!(!bus.has_handler(&id("B")));
        assert!(bus.get_components_by_class_name("Panel").is_empty());
        assert!(!bus.send_message("B", "ping", json!({}), &id("R")).await.unwrap());
        assert!(bus.send_request("B", "ping", json!({}), &id("R")).await.unwrap().is_not_found());
    }
}
