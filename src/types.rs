//! 组件总线核心数据类型
//!
//! 组件标识、目标描述、消息信封、路由与请求响应

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::convert::Infallible;
use std::fmt::{self, Display};
use std::str::FromStr;
use uuid::Uuid;

/// 纳秒时间戳
pub type TimestampNs = i64;

/// 路由分隔符
pub const ROUTE_SEPARATOR: char = ':';

/// 未找到目标时请求返回的错误文本
pub const TARGET_NOT_FOUND: &str = "Target not found.";

/// 组件标识符，进程生命周期内唯一
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ComponentId(String);

impl ComponentId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ComponentId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for ComponentId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl AsRef<str> for ComponentId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// 符号化目标
///
/// 语法区分大小写：`<id>` | `id:<id>` | `class:<name>` | `root`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TargetSpec {
    /// 直接标识符
    Id(ComponentId),
    /// 按角色/类名寻址，可能解析为多个组件
    Class(String),
    /// 指定的根组件
    Root,
}

impl TargetSpec {
    pub fn class(name: &str) -> Self {
        Self::Class(name.to_string())
    }
}

impl FromStr for TargetSpec {
    type Err = Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        if s == "root" {
            return Ok(Self::Root);
        }
        if let Some(name) = s.strip_prefix("class:") {
            return Ok(Self::Class(name.to_string()));
        }
        if let Some(id) = s.strip_prefix("id:") {
            return Ok(Self::Id(ComponentId::from(id)));
        }
        Ok(Self::Id(ComponentId::from(s)))
    }
}

impl From<&str> for TargetSpec {
    fn from(value: &str) -> Self {
        match value.parse() {
            Ok(spec) => spec,
            Err(never) => match never {},
        }
    }
}

impl From<ComponentId> for TargetSpec {
    fn from(value: ComponentId) -> Self {
        Self::Id(value)
    }
}

impl From<&ComponentId> for TargetSpec {
    fn from(value: &ComponentId) -> Self {
        Self::Id(value.clone())
    }
}

impl Display for TargetSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetSpec::Id(id) => write!(f, "{}", id),
            TargetSpec::Class(name) => write!(f, "class:{}", name),
            TargetSpec::Root => f.write_str("root"),
        }
    }
}

/// 路由方向标记
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RouteDirection {
    /// 单跳
    Direct,
    /// 多跳
    Route,
}

/// 树上两节点之间的路由，按跳序排列
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Route(Vec<ComponentId>);

impl Route {
    /// 零跳路由（源与目标相同）
    pub fn empty() -> Self {
        Self(Vec::new())
    }

    pub fn from_hops(hops: Vec<ComponentId>) -> Self {
        Self(hops)
    }

    pub fn hops(&self) -> &[ComponentId] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// 最终目标
    pub fn last(&self) -> Option<&ComponentId> {
        self.0.last()
    }

    pub fn direction(&self) -> RouteDirection {
        if self.0.len() == 1 {
            RouteDirection::Direct
        } else {
            RouteDirection::Route
        }
    }

    /// 拼接两段路由
    pub fn join(mut self, other: Route) -> Self {
        self.0.extend(other.0);
        self
    }
}

impl Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, hop) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, "{}", ROUTE_SEPARATOR)?;
            }
            write!(f, "{}", hop)?;
        }
        Ok(())
    }
}

impl FromStr for Route {
    type Err = Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        if s.is_empty() {
            return Ok(Self::empty());
        }
        Ok(Self(s.split(ROUTE_SEPARATOR).map(ComponentId::from).collect()))
    }
}

impl Serialize for Route {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Route {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        match raw.parse() {
            Ok(route) => Ok(route),
            Err(never) => match never {},
        }
    }
}

/// 广播及按路由发送时携带的消息体
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub message_type: String,
    pub data: Value,
}

impl Message {
    pub fn new(message_type: &str, data: Value) -> Self {
        Self {
            message_type: message_type.to_string(),
            data,
        }
    }
}

/// 消息信封，每次逻辑发送一个，不做持久化
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    /// 信封ID
    pub id: Uuid,
    /// 消息类型
    pub message_type: String,
    /// 消息负载
    pub data: Value,
    /// 发送者
    pub sender: ComponentId,
    /// 创建时间
    pub timestamp_ns: TimestampNs,
    /// 按路由发送时的完整路由
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route: Option<Route>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direction: Option<RouteDirection>,
}

impl Envelope {
    pub fn new(message_type: &str, data: Value, sender: &ComponentId) -> Self {
        Self {
            id: Uuid::new_v4(),
            message_type: message_type.to_string(),
            data,
            sender: sender.clone(),
            timestamp_ns: chrono::Utc::now().timestamp_nanos_opt().unwrap_or(0),
            route: None,
            direction: None,
        }
    }

    /// 附加路由元数据
    pub fn with_route(mut self, route: Route) -> Self {
        self.direction = Some(route.direction());
        self.route = Some(route);
        self
    }
}

/// 请求结果
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    /// 单一目标的结果
    Single(Value),
    /// 多目标结果，按发现顺序排列
    Many(Vec<Value>),
    /// 唯一目标不存在
    TargetNotFound,
}

impl Response {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Response::TargetNotFound)
    }

    /// 转换为线上格式
    pub fn into_value(self) -> Value {
        match self {
            Response::Single(value) => value,
            Response::Many(values) => Value::Array(values),
            Response::TargetNotFound => serde_json::json!({ "error": TARGET_NOT_FOUND }),
        }
    }
}

/// 处理器返回值的真值判断，语义与 JSON 宿主一致
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0 && !f.is_nan()).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}
