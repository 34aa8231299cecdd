//! 组件树
//!
//! 维护父子拓扑，供广播和路由发现使用。不做环检测，也不级联注销子节点。

use crate::types::ComponentId;
use std::collections::{HashMap, HashSet};

/// 树节点
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TreeNode {
    /// 父节点，只有根为 None
    pub parent: Option<ComponentId>,
    /// 子节点，按注册顺序
    pub children: Vec<ComponentId>,
}

/// 组件树
#[derive(Debug, Default)]
pub struct ComponentTree {
    nodes: HashMap<ComponentId, TreeNode>,
}

impl ComponentTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册节点；父节点存在时追加到其子列表
    pub fn register(&mut self, id: &ComponentId, parent: Option<&ComponentId>) {
        self.nodes.insert(id.clone(), TreeNode {
            parent: parent.cloned(),
            children: Vec::new(),
        });

        if let Some(parent_id) = parent {
            if let Some(parent_node) = self.nodes.get_mut(parent_id) {
                parent_node.children.push(id.clone());
            }
        }
    }

    /// 从父节点的子列表中移除并删除节点本身，子节点保持悬空
    pub fn unregister(&mut self, id: &ComponentId) -> Option<TreeNode> {
        let parent = self.nodes.get(id)?.parent.clone();
        if let Some(parent_id) = parent {
            if let Some(parent_node) = self.nodes.get_mut(&parent_id) {
                parent_node.children.retain(|child| child != id);
            }
        }
        self.nodes.remove(id)
    }

    pub fn contains(&self, id: &ComponentId) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn node(&self, id: &ComponentId) -> Option<&TreeNode> {
        self.nodes.get(id)
    }

    pub fn parent(&self, id: &ComponentId) -> Option<&ComponentId> {
        self.nodes.get(id)?.parent.as_ref()
    }

    /// 子节点快照
    pub fn children(&self, id: &ComponentId) -> Vec<ComponentId> {
        self.nodes.get(id).map(|node| node.children.clone()).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// 从节点自身到根的路径（含两端）
    pub fn path_to_root(&self, id: &ComponentId) -> Vec<ComponentId> {
        let mut path = vec![id.clone()];
        let mut visited: HashSet<&ComponentId> = HashSet::new();
        visited.insert(id);

        let mut current = self.parent(id);
        while let Some(parent) = current {
            if !visited.insert(parent) {
                break;
            }
            path.push(parent.clone());
            current = self.parent(parent);
        }
        path
    }

    /// 祖先链，从父节点开始
    pub fn ancestors(&self, id: &ComponentId) -> Vec<ComponentId> {
        let mut path = self.path_to_root(id);
        path.remove(0);
        path
    }

    pub fn is_ancestor(&self, ancestor: &ComponentId, id: &ComponentId) -> bool {
        self.ancestors(id).iter().any(|a| a == ancestor)
    }

    /// 深度优先查找后代，返回从 source 下第一跳到 target 的路径
    pub fn find_descendant_path(&self, source: &ComponentId, target: &ComponentId) -> Option<Vec<ComponentId>> {
        let mut visited = HashSet::new();
        let mut path = Vec::new();
        if self.search_descendants(source, target, &mut visited, &mut path) {
            Some(path)
        } else {
            None
        }
    }

    fn search_descendants<'a>(
        &'a self,
        current: &'a ComponentId,
        target: &ComponentId,
        visited: &mut HashSet<&'a ComponentId>,
        path: &mut Vec<ComponentId>,
    ) -> bool {
        if !visited.insert(current) {
            return false;
        }
        let Some(node) = self.nodes.get(current) else {
            return false;
        };

        for child in &node.children {
            path.push(child.clone());
            if child == target || self.search_descendants(child, target, visited, path) {
                return true;
            }
            path.pop();
        }
        false
    }

    /// 前序遍历的所有后代（不含自身）
    pub fn descendants(&self, id: &ComponentId) -> Vec<ComponentId> {
        let mut out = Vec::new();
        let mut visited = HashSet::new();
        visited.insert(id.clone());
        let mut stack: Vec<ComponentId> = self.children(id).into_iter().rev().collect();
        while let Some(current) = stack.pop() {
            if !visited.insert(current.clone()) {
                continue;
            }
            stack.extend(self.children(&current).into_iter().rev());
            out.push(current);
        }
        out
    }
}
