//! 组件标识注册表
//!
//! 生成进程内不重复的组件标识符，并提供标识符到存活实例的 O(1) 查找。
//! 已签发的标识符永久记录，组件销毁后也不会复用。

use crate::types::ComponentId;
use crate::{BusError, Result};
use dashmap::{DashMap, DashSet};
use rand::Rng;
use std::any::Any;
use std::sync::Arc;
use tracing::{debug, warn};

/// 后缀字符集，均匀抽样
const SUFFIX_CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// 单次生成的最大尝试次数，超过即视为后缀空间耗尽
const MAX_ATTEMPTS: usize = 64;

/// 存活实例引用
pub type InstanceRef = Arc<dyn Any + Send + Sync>;

/// 标识注册表
pub struct IdentityRegistry {
    /// 所有签发过的标识符
    issued: DashSet<ComponentId>,
    /// 存活实例
    instances: DashMap<ComponentId, InstanceRef>,
    /// 随机后缀长度
    suffix_length: usize,
}

impl IdentityRegistry {
    pub fn new(suffix_length: usize) -> Self {
        Self {
            issued: DashSet::new(),
            instances: DashMap::new(),
            suffix_length,
        }
    }

    /// 生成 `name_后缀` 形式的标识符，后缀冲突时重试，重试有上限
    pub fn generate_identifier(&self, name: &str) -> Result<ComponentId> {
        if name.is_empty() {
            return Err(BusError::invalid_name("component name must not be empty"));
        }

        for _ in 0..MAX_ATTEMPTS {
            let candidate = ComponentId::new(format!("{}_{}", name, self.random_suffix()));
            // insert 返回 false 表示已签发过
            if self.issued.insert(candidate.clone()) {
                debug!("Issued component identifier '{}'", candidate);
                return Ok(candidate);
            }
        }

        warn!("Identifier space for '{}' exhausted after {} attempts", name, MAX_ATTEMPTS);
        Err(BusError::config(&format!(
            "no unused identifier for '{}' after {} attempts (suffix length {})",
            name, MAX_ATTEMPTS, self.suffix_length
        )))
    }

    fn random_suffix(&self) -> String {
        let mut rng = rand::thread_rng();
        (0..self.suffix_length)
            .map(|_| char::from(SUFFIX_CHARSET[rng.gen_range(0..SUFFIX_CHARSET.len())]))
            .collect()
    }

    /// 标识符是否签发过（包括已销毁的组件）
    pub fn was_issued(&self, id: &ComponentId) -> bool {
        self.issued.contains(id)
    }

    pub fn issued_count(&self) -> usize {
        self.issued.len()
    }

    pub fn register_instance(&self, id: &ComponentId, instance: InstanceRef) {
        self.instances.insert(id.clone(), instance);
    }

    pub fn unregister_instance(&self, id: &ComponentId) -> Option<InstanceRef> {
        self.instances.remove(id).map(|(_, instance)| instance)
    }

    /// 查找存活实例，未知或已注销返回 None
    pub fn lookup(&self, id: &ComponentId) -> Option<InstanceRef> {
        self.instances.get(id).map(|entry| entry.value().clone())
    }

    /// 按具体类型查找
    pub fn lookup_as<T: Any + Send + Sync>(&self, id: &ComponentId) -> Option<Arc<T>> {
        self.lookup(id)?.downcast::<T>().ok()
    }

    pub fn live_count(&self) -> usize {
        self.instances.len()
    }
}

impl Default for IdentityRegistry {
    fn default() -> Self {
        Self::new(9)
    }
}
