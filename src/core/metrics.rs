//! 总线统计信息

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// 总线统计快照
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusMetrics {
    pub messages_sent: u64,
    pub requests_sent: u64,
    pub broadcasts: u64,
    pub route_sends: u64,
    /// 实际调用处理器的次数
    pub deliveries: u64,
    pub targets_not_found: u64,
    pub components_registered: u64,
}

/// 原子计数器，enabled 为 false 时所有记录均为空操作
#[derive(Debug, Default)]
pub(crate) struct MetricsRecorder {
    enabled: bool,
    messages_sent: AtomicU64,
    requests_sent: AtomicU64,
    broadcasts: AtomicU64,
    route_sends: AtomicU64,
    deliveries: AtomicU64,
    targets_not_found: AtomicU64,
    components_registered: AtomicU64,
}

impl MetricsRecorder {
    pub(crate) fn new(enabled: bool) -> Self {
        Self {
            enabled,
            ..Self::default()
        }
    }

    fn bump(&self, counter: &AtomicU64) {
        if self.enabled {
            counter.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn message_sent(&self) {
        self.bump(&self.messages_sent);
    }

    pub(crate) fn request_sent(&self) {
        self.bump(&self.requests_sent);
    }

    pub(crate) fn broadcast(&self) {
        self.bump(&self.broadcasts);
    }

    pub(crate) fn route_send(&self) {
        self.bump(&self.route_sends);
    }

    pub(crate) fn delivery(&self) {
        self.bump(&self.deliveries);
    }

    pub(crate) fn target_not_found(&self) {
        self.bump(&self.targets_not_found);
    }

    pub(crate) fn component_registered(&self) {
        self.bump(&self.components_registered);
    }

    pub(crate) fn snapshot(&self) -> BusMetrics {
        BusMetrics {
            messages_sent: self.messages_sent.load(Ordering::Relaxed),
            requests_sent: self.requests_sent.load(Ordering::Relaxed),
            broadcasts: self.broadcasts.load(Ordering::Relaxed),
            route_sends: self.route_sends.load(Ordering::Relaxed),
            deliveries: self.deliveries.load(Ordering::Relaxed),
            targets_not_found: self.targets_not_found.load(Ordering::Relaxed),
            components_registered: self.components_registered.load(Ordering::Relaxed),
        }
    }
}
