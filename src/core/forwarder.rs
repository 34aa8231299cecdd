//! 命令转发表
//!
//! 由命令名列表一次性构建：命令名到通用调用方式的静态映射，
//! 每次调用都以命令名作为消息类型经总线转发给同一目标。

use super::bus::MessageBus;
use crate::types::{ComponentId, Response, TargetSpec};
use crate::{BusError, Result};
use serde_json::Value;
use std::collections::HashMap;
use tracing::debug;

/// 命令调用方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandMode {
    /// 请求/响应
    Request,
    /// 即发即弃，响应为是否投递成功
    Notify,
}

/// 命令转发器
pub struct CommandForwarder {
    bus: MessageBus,
    target: TargetSpec,
    commands: HashMap<String, CommandMode>,
}

impl CommandForwarder {
    /// 以请求方式转发全部命令
    pub fn new(bus: MessageBus, target: impl Into<TargetSpec>, commands: &[&str]) -> Self {
        let table = commands.iter().map(|name| (name.to_string(), CommandMode::Request));
        Self::with_modes(bus, target, table)
    }

    pub fn with_modes(
        bus: MessageBus,
        target: impl Into<TargetSpec>,
        commands: impl IntoIterator<Item = (String, CommandMode)>,
    ) -> Self {
        Self {
            bus,
            target: target.into(),
            commands: commands.into_iter().collect(),
        }
    }

    pub fn target(&self) -> &TargetSpec {
        &self.target
    }

    pub fn supports(&self, command: &str) -> bool {
        self.commands.contains_key(command)
    }

    /// 已知命令，按名称排序
    pub fn commands(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.commands.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// 转发命令
    pub async fn invoke(&self, command: &str, data: Value, sender: &ComponentId) -> Result<Response> {
        let mode = *self.commands.get(command).ok_or_else(|| BusError::UnknownCommand {
            command: command.to_string(),
        })?;

        debug!("Forwarding command '{}' to '{}' ({:?})", command, self.target, mode);
        match mode {
            CommandMode::Request => self.bus.send_request(self.target.clone(), command, data, sender).await,
            CommandMode::Notify => {
                let delivered = self.bus.send_message(self.target.clone(), command, data, sender).await?;
                Ok(Response::Single(Value::Bool(delivered)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::bus::FnHandler;
    use serde_json::json;
    use std::sync::Arc;

    fn server_bus() -> MessageBus {
        let bus = MessageBus::default();
        bus.register_addressed_handler(
            &ComponentId::from("server"),
            Arc::new(FnHandler::new("server", |message_type, envelope, _| {
                Ok(json!({ "command": message_type, "args": envelope.data.clone() }))
            })),
        );
        bus
    }

    #[tokio::test]
    async fn test_forwards_known_command() {
        let forwarder = CommandForwarder::new(server_bus(), "server", &["openFile", "saveFile"]);
        assert_eq!(forwarder.commands(), vec!["openFile", "saveFile"]);

        let response = forwarder
            .invoke("openFile", json!({"path": "main.rs"}), &ComponentId::from("editor"))
            .await
            .unwrap();
        assert_eq!(response, Response::Single(json!({"command": "openFile", "args": {"path": "main.rs"}})));
    }

    #[tokio::test]
    async fn test_unknown_command_rejected() {
        let forwarder = CommandForwarder::new(server_bus(), "server", &["openFile"]);
        let err = forwarder.invoke("format", json!({}), &ComponentId::from("editor")).await.unwrap_err();
        assert!(matches!(err, BusError::UnknownCommand { .. }));
    }

    #[tokio::test]
    async fn test_notify_mode_and_missing_target() {
        let forwarder = CommandForwarder::with_modes(
            server_bus(),
            "server",
            vec![("ping".to_string(), CommandMode::Notify)],
        );
        let response = forwarder.invoke("ping", json!(null), &ComponentId::from("editor")).await.unwrap();
        assert_eq!(response, Response::Single(json!(true)));

        let orphan = CommandForwarder::new(MessageBus::default(), "server", &["openFile"]);
        let response = orphan.invoke("openFile", json!({}), &ComponentId::from("editor")).await.unwrap();
        assert!(response.is_not_found());
    }
}
