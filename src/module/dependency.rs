//! 模块依赖管理
//!
//! 本模块提供模块依赖关系图以及加载顺序的计算。
//!
//! # 主要组件
//!
//! - [`DependencyGraph`] - 依赖关系图，节点保持发现顺序，边区分硬依赖与软依赖
//! - [`LoadOrder`] - 加载顺序计算结果：排好序的模块、被剔除的缺失依赖模块、循环依赖模块
//!
//! # 排序规则
//!
//! 1. 硬依赖不存在的模块直接剔除（不级联剔除依赖它的模块）
//! 2. 没有任何依赖的模块按发现顺序放在最前
//! 3. 其余模块按发现顺序反复扫描，直到没有新模块可以加入；
//!    一个模块可以加入，当且仅当它在候选集中的所有依赖都已排好
//! 4. 某一轮扫描没有进展时，放行第一个只剩软依赖未满足的模块；
//!    仍然无法放行的模块处于硬依赖环中
//!
//! # 示例
//!
//! ```rust
//! use addon_host::module::dependency::{DependencyGraph, DependencyKind};
//!
//! let mut graph = DependencyGraph::new();
//! graph.add_module("A");
//! graph.add_module("B");
//! graph.add_module("C");
//! graph.add_dependency("A", "B", DependencyKind::Hard);
//! graph.add_dependency("B", "C", DependencyKind::Hard);
//!
//! assert_eq!(graph.load_order().order, vec!["C", "B", "A"]);
//! ```

use std::collections::{HashMap, HashSet};

use crate::module::metadata::ModuleDescriptor;

/// 依赖类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DependencyKind {
    /// 硬依赖：必须存在
    Hard,
    /// 软依赖：只影响顺序
    Soft,
}

/// 依赖边
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyEdge {
    /// 被依赖的模块名（保留声明时的写法）
    pub target: String,
    /// 依赖类型
    pub kind: DependencyKind,
}

/// 加载顺序计算结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadOrder {
    /// 排好序的模块名
    pub order: Vec<String>,
    /// 因硬依赖缺失被剔除的模块：(模块名, 缺失的依赖名)
    pub missing: Vec<(String, String)>,
    /// 处于硬依赖环中的模块
    pub cyclic: Vec<String>,
}

/// 模块依赖关系图
///
/// 名称比较不区分大小写，节点保持加入顺序。
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    /// 节点：小写键，按加入顺序
    nodes: Vec<String>,
    /// 小写键 -> 显示名
    names: HashMap<String, String>,
    /// 正向边：小写键 -> 依赖列表
    edges: HashMap<String, Vec<DependencyEdge>>,
}

fn key(name: &str) -> String {
    name.to_lowercase()
}

impl DependencyGraph {
    /// 创建一个空的依赖图
    pub fn new() -> Self {
        Self::default()
    }

    /// 按发现顺序从模块描述构建依赖图
    pub fn from_descriptors<'a, I>(descriptors: I) -> Self
    where
        I: IntoIterator<Item = &'a ModuleDescriptor>,
    {
        let mut graph = Self::new();
        let descriptors: Vec<&ModuleDescriptor> = descriptors.into_iter().collect();
        for descriptor in &descriptors {
            graph.add_module(&descriptor.name);
        }
        for descriptor in &descriptors {
            for dep in &descriptor.dependencies {
                graph.add_dependency(&descriptor.name, dep, DependencyKind::Hard);
            }
            for dep in &descriptor.soft_dependencies {
                graph.add_dependency(&descriptor.name, dep, DependencyKind::Soft);
            }
        }
        graph
    }

    /// 添加模块节点，已存在时忽略
    pub fn add_module(&mut self, name: &str) {
        let k = key(name);
        if !self.names.contains_key(&k) {
            self.nodes.push(k.clone());
            self.names.insert(k.clone(), name.to_string());
            self.edges.insert(k, Vec::new());
        }
    }

    /// 添加依赖边
    ///
    /// 模块节点不存在时会自动加入；被依赖方不会自动加入，
    /// 因为缺失的依赖正是排序需要识别的情况。
    /// 同一对模块同时声明硬依赖和软依赖时，以硬依赖为准。
    pub fn add_dependency(&mut self, module: &str, dependency: &str, kind: DependencyKind) {
        self.add_module(module);
        let Some(edges) = self.edges.get_mut(&key(module)) else {
            return;
        };

        if let Some(existing) = edges
            .iter_mut()
            .find(|e| e.target.eq_ignore_ascii_case(dependency))
        {
            if kind == DependencyKind::Hard {
                existing.kind = DependencyKind::Hard;
            }
            return;
        }

        edges.push(DependencyEdge {
            target: dependency.to_string(),
            kind,
        });
    }

    /// 移除模块节点及其出边
    pub fn remove_module(&mut self, name: &str) {
        let k = key(name);
        self.nodes.retain(|n| n != &k);
        self.names.remove(&k);
        self.edges.remove(&k);
    }

    /// 是否包含模块
    pub fn contains_module(&self, name: &str) -> bool {
        self.names.contains_key(&key(name))
    }

    /// 模块数量
    pub fn module_count(&self) -> usize {
        self.nodes.len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// 模块的依赖边
    pub fn get_dependencies(&self, name: &str) -> &[DependencyEdge] {
        self.edges.get(&key(name)).map(Vec::as_slice).unwrap_or(&[])
    }

    /// 依赖指定模块的模块（按发现顺序）
    pub fn get_dependents(&self, name: &str) -> Vec<String> {
        self.nodes
            .iter()
            .filter(|n| {
                self.edges[n.as_str()]
                    .iter()
                    .any(|e| e.target.eq_ignore_ascii_case(name))
            })
            .map(|n| self.display(n))
            .collect()
    }

    /// 第一个不存在于图中的硬依赖
    pub fn missing_hard_dependency(&self, name: &str) -> Option<&str> {
        self.get_dependencies(name)
            .iter()
            .find(|e| e.kind == DependencyKind::Hard && !self.contains_module(&e.target))
            .map(|e| e.target.as_str())
    }

    fn display(&self, k: &str) -> String {
        self.names.get(k).cloned().unwrap_or_else(|| k.to_string())
    }

    /// 查找硬依赖环
    ///
    /// # Returns
    ///
    /// 存在环时返回环路径（首尾相同），否则返回 `None`
    pub fn find_cycle(&self) -> Option<Vec<String>> {
        let mut visited = HashSet::new();
        let mut path = Vec::new();

        for node in &self.nodes {
            if let Some(cycle) = self.find_cycle_from(node, &mut visited, &mut path) {
                return Some(cycle.iter().map(|k| self.display(k)).collect());
            }
        }
        None
    }

    fn find_cycle_from(
        &self,
        node: &str,
        visited: &mut HashSet<String>,
        path: &mut Vec<String>,
    ) -> Option<Vec<String>> {
        if let Some(start) = path.iter().position(|n| n == node) {
            let mut cycle = path[start..].to_vec();
            cycle.push(node.to_string());
            return Some(cycle);
        }
        if !visited.insert(node.to_string()) {
            return None;
        }

        path.push(node.to_string());
        for edge in self.get_dependencies(node) {
            if edge.kind != DependencyKind::Hard {
                continue;
            }
            let target = key(&edge.target);
            if !self.names.contains_key(&target) {
                continue;
            }
            if let Some(cycle) = self.find_cycle_from(&target, visited, path) {
                return Some(cycle);
            }
        }
        path.pop();
        None
    }

    /// 计算加载顺序
    pub fn load_order(&self) -> LoadOrder {
        let mut result = LoadOrder::default();

        // 1. 剔除硬依赖缺失的模块
        let mut candidates: Vec<&str> = Vec::with_capacity(self.nodes.len());
        for node in &self.nodes {
            match self.missing_hard_dependency(node) {
                Some(dep) => result.missing.push((self.display(node), dep.to_string())),
                None => candidates.push(node),
            }
        }
        let candidate_set: HashSet<&str> = candidates.iter().copied().collect();

        let mut ordered: Vec<&str> = Vec::with_capacity(candidates.len());
        let mut ordered_set: HashSet<&str> = HashSet::new();

        // 候选集中尚未排好的依赖
        let outstanding = |node: &str, ordered_set: &HashSet<&str>| -> Vec<DependencyKind> {
            self.get_dependencies(node)
                .iter()
                .filter_map(|e| {
                    let target = key(&e.target);
                    let pending = candidate_set.contains(target.as_str())
                        && !ordered_set.contains(target.as_str());
                    pending.then_some(e.kind)
                })
                .collect()
        };

        // 2. 无依赖的模块
        for node in &candidates {
            if self.get_dependencies(node).is_empty() {
                ordered.push(node);
                ordered_set.insert(node);
            }
        }

        // 3. 反复扫描直到不动点
        let mut remaining: Vec<&str> = candidates
            .iter()
            .copied()
            .filter(|n| !ordered_set.contains(n))
            .collect();

        while !remaining.is_empty() {
            let mut progressed = false;
            let mut blocked = Vec::with_capacity(remaining.len());

            for node in remaining {
                if outstanding(node, &ordered_set).is_empty() {
                    ordered.push(node);
                    ordered_set.insert(node);
                    progressed = true;
                } else {
                    blocked.push(node);
                }
            }
            remaining = blocked;

            if progressed {
                continue;
            }

            // 4. 放行第一个只剩软依赖的模块
            let relaxed = remaining.iter().position(|n| {
                outstanding(n, &ordered_set)
                    .iter()
                    .all(|kind| *kind == DependencyKind::Soft)
            });
            match relaxed {
                Some(index) => {
                    let node = remaining.remove(index);
                    ordered.push(node);
                    ordered_set.insert(node);
                }
                None => {
                    result.cyclic = remaining.iter().map(|n| self.display(n)).collect();
                    break;
                }
            }
        }

        result.order = ordered.iter().map(|n| self.display(n)).collect();
        result
    }
}
