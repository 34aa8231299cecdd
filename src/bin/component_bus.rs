//! ComponentBus 主程序 - 配置驱动的演示
//!
//! 按配置创建总线，挂载一棵小型编辑器组件树，演示广播、按角色请求与按路由发送

use async_trait::async_trait;
use component_bus::{
    config::generate_default_config_file, mount, BusConfig, Component, ComponentContext, ConfigManager, Envelope,
    Message, MessageBus, MessageKind, Result,
};
use serde_json::{json, Value};
use std::env;
use std::path::Path;

/// 程序入口点
#[tokio::main]
async fn main() {
    let args: Vec<String> = env::args().collect();
    match run_main(&args).await {
        Ok(_) => {}
        Err(e) => {
            // 配置加载失败时日志系统尚未初始化
            eprintln!("Run failed: {}", e);
            std::process::exit(1);
        }
    }
}

async fn run_main(args: &[String]) -> Result<()> {
    match args.get(1).map(String::as_str) {
        None => run_demo(ConfigManager::new_default()).await,
        Some("init") => {
            let path = args.get(2).map(String::as_str).unwrap_or("component_bus.yaml");
            generate_default_config_file(path).await?;
            println!("Default configuration written to {}", path);
            Ok(())
        }
        Some("--help") | Some("-h") => {
            print_usage();
            Ok(())
        }
        Some(path) => {
            if !Path::new(path).exists() {
                eprintln!("Config file not found: {} (use 'component_bus init' to create one)", path);
                return Ok(());
            }
            run_demo(ConfigManager::load_from_file(path).await?).await
        }
    }
}

fn print_usage() {
    println!("Usage:");
    println!("  component_bus                 run the demo with default configuration");
    println!("  component_bus init [path]     write a default configuration file");
    println!("  component_bus <config>        run the demo with a YAML/TOML configuration");
}

#[derive(Debug, Clone, Copy)]
enum PanelMessage {
    ThemeChanged,
    GetContent,
    Open,
}

impl MessageKind for PanelMessage {
    fn parse(message_type: &str) -> Option<Self> {
        match message_type {
            "themeChanged" => Some(Self::ThemeChanged),
            "getContent" => Some(Self::GetContent),
            "open" => Some(Self::Open),
            _ => None,
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            Self::ThemeChanged => "themeChanged",
            Self::GetContent => "getContent",
            Self::Open => "open",
        }
    }
}

/// 演示面板：编辑器、状态栏、工作区共用
struct Panel {
    class_name: &'static str,
    content: String,
}

impl Panel {
    fn new(class_name: &'static str, content: &str) -> Self {
        Self {
            class_name,
            content: content.to_string(),
        }
    }
}

#[async_trait]
impl Component for Panel {
    type Message = PanelMessage;

    fn class_name(&self) -> &'static str {
        self.class_name
    }

    async fn on_message(&self, ctx: &ComponentContext, message: PanelMessage, envelope: &Envelope) -> Result<Value> {
        tracing::info!("{} received '{}' from {}", ctx.id(), message.as_str(), envelope.sender);
        match message {
            PanelMessage::ThemeChanged | PanelMessage::Open => Ok(json!(true)),
            PanelMessage::GetContent => Ok(json!({ "id": ctx.id(), "content": self.content })),
        }
    }
}

async fn run_demo(config_manager: ConfigManager) -> Result<()> {
    config_manager.validate()?;
    let config: BusConfig = config_manager.get_config().clone();
    component_bus::initialize(&config);

    let bus = MessageBus::new(config)?;
    let mut workspace = mount(&bus, "workspace", None, Panel::new("Workspace", ""))?;
    let mut left = mount(&bus, "editor", Some(workspace.id()), Panel::new("Editor", "fn main() {}"))?;
    let mut right = mount(&bus, "editor", Some(workspace.id()), Panel::new("Editor", "# notes"))?;
    let mut tab = mount(&bus, "tab", Some(left.id()), Panel::new("Tab", "main.rs"))?;
    let mut status = mount(&bus, "status", Some(workspace.id()), Panel::new("StatusBar", "ready"))?;

    let delivered = workspace.broadcast(&Message::new("themeChanged", json!({ "theme": "dark" }))).await?;
    tracing::info!("Theme broadcast delivered to {} components", delivered);

    let contents = workspace.request("class:Editor", "getContent", json!({})).await?;
    tracing::info!("Editor contents: {}", contents.into_value());

    if let Some(route) = tab.route_to(status.id())? {
        tracing::info!("Route {} -> {}: '{}'", tab.id(), status.id(), route);
        tab.send_via_route(&route, &Message::new("open", json!({ "file": "main.rs" }))).await?;
    }

    for component in [&mut tab, &mut left, &mut right, &mut status] {
        component.destroy()?;
    }
    workspace.destroy()?;

    let metrics = bus.metrics();
    tracing::info!(
        "Bus metrics: sent={}, requests={}, broadcasts={}, deliveries={}",
        metrics.messages_sent, metrics.requests_sent, metrics.broadcasts, metrics.deliveries
    );
    Ok(())
}
