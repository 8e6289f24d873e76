//! 模块注册表
//!
//! 保存已注册的模块（按加载顺序）、每个模块的监听器订阅以及跨模块符号表。
//! 注册表只做簿记：生命周期钩子由 [`ModuleManager`](super::manager::ModuleManager)
//! 驱动，调用钩子前总是先取出 `Arc` 快照，从不在持锁期间调用模块代码。

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use super::instance::ModuleHandle;
use super::loader::{Symbol, SymbolTable};
use super::metadata::{ModuleDescriptor, ModuleInfo, ModuleState};
use crate::utils::{CoreError, Result};

/// 模块注册表
///
/// 管理所有已注册的模块，包括：
/// - 模块列表（顺序即加载顺序）
/// - 每个模块的监听器订阅
/// - 跨模块符号表
#[derive(Debug)]
pub struct ModuleRegistry {
    /// 已注册的模块
    modules: RwLock<Vec<Arc<ModuleHandle>>>,

    /// 监听器订阅：小写模块名 -> 订阅 ID 列表
    listeners: RwLock<HashMap<String, Vec<String>>>,

    /// 跨模块符号表
    symbols: Arc<SymbolTable>,
}

impl ModuleRegistry {
    /// 创建空的模块注册表
    pub fn new() -> Self {
        Self {
            modules: RwLock::new(Vec::new()),
            listeners: RwLock::new(HashMap::new()),
            symbols: SymbolTable::new(),
        }
    }

    /// 跨模块符号表
    pub fn symbols(&self) -> &Arc<SymbolTable> {
        &self.symbols
    }

    /// 注册模块
    ///
    /// # Errors
    ///
    /// 已存在同名或同入口点的模块时返回 `ModuleAlreadyLoaded`
    pub async fn register(&self, module: Arc<ModuleHandle>) -> Result<()> {
        let mut modules = self.modules.write().await;
        if let Some(existing) = find_duplicate(&modules, module.descriptor()) {
            return Err(CoreError::ModuleAlreadyLoaded(existing.name().to_string()));
        }

        tracing::debug!(module = %module.name(), "模块已注册");
        modules.push(module);
        Ok(())
    }

    /// 查找与给定描述重复（同名或同入口点）的已注册模块
    pub async fn find_duplicate(&self, descriptor: &ModuleDescriptor) -> Option<Arc<ModuleHandle>> {
        let modules = self.modules.read().await;
        find_duplicate(&modules, descriptor).cloned()
    }

    /// 移除模块
    ///
    /// # Returns
    ///
    /// 被移除的模块（如果存在）
    pub async fn remove(&self, name: &str) -> Option<Arc<ModuleHandle>> {
        let mut modules = self.modules.write().await;
        let index = modules.iter().position(|m| m.descriptor().is_named(name))?;
        Some(modules.remove(index))
    }

    /// 按名称查找模块（不区分大小写，返回第一个匹配）
    pub async fn lookup_by_name(&self, name: &str) -> Option<Arc<ModuleHandle>> {
        let modules = self.modules.read().await;
        modules
            .iter()
            .find(|m| m.descriptor().is_named(name))
            .cloned()
    }

    /// 按入口点查找模块（不区分大小写，返回第一个匹配）
    pub async fn lookup_by_entry_point(&self, entry_point: &str) -> Option<Arc<ModuleHandle>> {
        let modules = self.modules.read().await;
        modules
            .iter()
            .find(|m| m.descriptor().main.eq_ignore_ascii_case(entry_point))
            .cloned()
    }

    /// 在跨模块符号表中解析符号
    pub async fn lookup_symbol(&self, name: &str) -> Option<Arc<Symbol>> {
        self.symbols.lookup(name).await
    }

    /// 所有模块的快照（按加载顺序）
    pub async fn list(&self) -> Vec<Arc<ModuleHandle>> {
        self.modules.read().await.clone()
    }

    /// 处于指定状态的模块（按加载顺序）
    pub async fn with_state(&self, state: ModuleState) -> Vec<Arc<ModuleHandle>> {
        let mut matched = Vec::new();
        for module in self.list().await {
            if module.state().await == state {
                matched.push(module);
            }
        }
        matched
    }

    /// 所有模块的运行时信息
    pub async fn infos(&self) -> Vec<ModuleInfo> {
        let mut infos = Vec::new();
        for module in self.list().await {
            infos.push(module.info().await);
        }
        infos
    }

    /// 已注册模块数量
    pub async fn count(&self) -> usize {
        self.modules.read().await.len()
    }

    /// 按名称重新排列模块
    ///
    /// 名单中的模块按名单顺序排在前面，未出现在名单中的模块保持原有相对顺序排在后面。
    pub async fn reorder(&self, order: &[String]) {
        let mut modules = self.modules.write().await;
        let mut remaining: Vec<Arc<ModuleHandle>> = modules.drain(..).collect();
        let mut sorted = Vec::with_capacity(remaining.len());

        for name in order {
            if let Some(index) = remaining.iter().position(|m| m.descriptor().is_named(name)) {
                sorted.push(remaining.remove(index));
            }
        }
        sorted.extend(remaining);
        *modules = sorted;
    }

    // ==================== 监听器 ====================

    /// 记录模块的监听器订阅
    pub async fn track_listener(&self, module: &str, subscription_id: impl Into<String>) {
        self.listeners
            .write()
            .await
            .entry(module.to_lowercase())
            .or_default()
            .push(subscription_id.into());
    }

    /// 模块的监听器订阅
    pub async fn listeners_of(&self, module: &str) -> Vec<String> {
        self.listeners
            .read()
            .await
            .get(&module.to_lowercase())
            .cloned()
            .unwrap_or_default()
    }

    /// 取出模块的全部监听器订阅，之后该模块不再有记录
    pub async fn take_listeners(&self, module: &str) -> Vec<String> {
        self.listeners
            .write()
            .await
            .remove(&module.to_lowercase())
            .unwrap_or_default()
    }

    /// 取出所有模块的监听器订阅
    pub async fn take_all_listeners(&self) -> Vec<String> {
        let mut listeners = self.listeners.write().await;
        listeners.drain().flat_map(|(_, ids)| ids).collect()
    }

    /// 清空注册表：模块列表、监听器记录与符号表
    pub async fn clear(&self) {
        self.modules.write().await.clear();
        self.listeners.write().await.clear();
        self.symbols.clear().await;
        tracing::debug!("注册表已清空");
    }
}

impl Default for ModuleRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn find_duplicate<'a>(
    modules: &'a [Arc<ModuleHandle>],
    descriptor: &ModuleDescriptor,
) -> Option<&'a Arc<ModuleHandle>> {
    modules.iter().find(|m| {
        m.descriptor().main.eq_ignore_ascii_case(&descriptor.main)
            || m.descriptor().is_named(&descriptor.name)
    })
}
