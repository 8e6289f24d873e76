//! 动态加载单元
//!
//! 每个嵌入式模块拥有一个 [`LoadingUnit`]，它绑定模块自己的归档，
//! 负责把符号名解析为归档中的符号。解析严格按三级顺序进行：
//!
//! 1. 单元私有缓存
//! 2. 调用方允许时，查询注册表的跨模块符号表 [`SymbolTable`]
//! 3. 单元自己的归档内容
//!
//! 从归档解析到的符号会发布到跨模块符号表（先发布者生效），
//! 之后其它模块解析同名符号时无需再次扫描归档。
//! 保留前缀下的名字一律返回"未找到"，不会落到下一级。

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use tokio::sync::RwLock;
use tracing::{debug, trace};

use super::archive::ModuleArchive;

/// 解析得到的符号
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    name: String,
    origin: String,
    data: Arc<[u8]>,
}

impl Symbol {
    /// 创建符号
    ///
    /// # Arguments
    ///
    /// * `name` - 完整符号名
    /// * `origin` - 定义该符号的模块名；宿主命名空间中的符号为空串
    /// * `data` - 符号内容
    pub fn new(name: impl Into<String>, origin: impl Into<String>, data: impl Into<Arc<[u8]>>) -> Self {
        Self {
            name: name.into(),
            origin: origin.into(),
            data: data.into(),
        }
    }

    /// 符号名
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 定义该符号的模块
    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// 符号内容
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// 是否来自宿主命名空间
    pub fn is_host_symbol(&self) -> bool {
        self.origin.is_empty()
    }
}

/// 动态加载单元
///
/// 私有缓存只增不减，生命周期与单元一致。
/// 对跨模块符号表只持有弱引用，从不拥有注册表。
#[derive(Debug)]
pub struct LoadingUnit {
    module: String,
    archive: Arc<ModuleArchive>,
    reserved_prefix: String,
    cache: RwLock<HashMap<String, Arc<Symbol>>>,
    table: Weak<SymbolTable>,
}

impl LoadingUnit {
    /// 创建加载单元
    pub fn new(
        module: impl Into<String>,
        archive: Arc<ModuleArchive>,
        reserved_prefix: impl Into<String>,
        table: Weak<SymbolTable>,
    ) -> Self {
        Self {
            module: module.into(),
            archive,
            reserved_prefix: reserved_prefix.into(),
            cache: RwLock::new(HashMap::new()),
            table,
        }
    }

    /// 所属模块名
    pub fn module(&self) -> &str {
        &self.module
    }

    /// 绑定的归档
    pub fn archive(&self) -> &Arc<ModuleArchive> {
        &self.archive
    }

    /// 是否属于宿主保留命名空间
    pub fn is_reserved(&self, name: &str) -> bool {
        !self.reserved_prefix.is_empty() && name.starts_with(&self.reserved_prefix)
    }

    /// 解析符号
    ///
    /// # Arguments
    ///
    /// * `name` - 符号名
    /// * `check_global` - 是否允许查询跨模块符号表
    ///
    /// # Returns
    ///
    /// 找不到时返回 `None`，这是正常结果而不是错误
    pub async fn find_symbol(&self, name: &str, check_global: bool) -> Option<Arc<Symbol>> {
        if self.is_reserved(name) {
            trace!(module = %self.module, symbol = %name, "拒绝解析保留前缀下的符号");
            return None;
        }

        if let Some(symbol) = self.cache.read().await.get(name) {
            return Some(symbol.clone());
        }

        if check_global {
            if let Some(table) = self.table.upgrade() {
                if let Some(symbol) = table.lookup(name).await {
                    let mut cache = self.cache.write().await;
                    return Some(cache.entry(name.to_string()).or_insert(symbol).clone());
                }
            }
        }

        self.find_local(name).await
    }

    /// 只在本单元（缓存与归档）中解析，不查询跨模块符号表
    ///
    /// 归档命中的符号会写入缓存并发布到跨模块符号表
    pub async fn find_local(&self, name: &str) -> Option<Arc<Symbol>> {
        if self.is_reserved(name) {
            return None;
        }

        if let Some(symbol) = self.cache.read().await.get(name) {
            return Some(symbol.clone());
        }

        let data = self.archive.symbol(name)?;
        let symbol = {
            let mut cache = self.cache.write().await;
            cache
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(Symbol::new(name, self.module.clone(), data.to_vec())))
                .clone()
        };

        debug!(module = %self.module, symbol = %name, "从归档解析符号");

        if let Some(table) = self.table.upgrade() {
            table.publish(symbol.clone()).await;
        }

        Some(symbol)
    }

    /// 归档中是否定义了该符号（不解析、不发布）
    pub fn defines(&self, name: &str) -> bool {
        !self.is_reserved(name) && self.archive.symbol(name).is_some()
    }

    /// 已缓存的符号名
    pub async fn cached_symbols(&self) -> Vec<String> {
        let mut names: Vec<String> = self.cache.read().await.keys().cloned().collect();
        names.sort();
        names
    }
}

/// 跨模块符号表
///
/// 由注册表拥有，记录已发布的符号和所有挂接的加载单元。
#[derive(Debug, Default)]
pub struct SymbolTable {
    symbols: RwLock<HashMap<String, Arc<Symbol>>>,
    units: RwLock<Vec<Arc<LoadingUnit>>>,
}

impl SymbolTable {
    /// 创建空符号表
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// 挂接加载单元，之后全局查找会探测它的归档
    pub async fn attach(&self, unit: Arc<LoadingUnit>) {
        let mut units = self.units.write().await;
        if !units.iter().any(|u| Arc::ptr_eq(u, &unit)) {
            units.push(unit);
        }
    }

    /// 发布符号，已存在同名符号时保留先发布者
    pub async fn publish(&self, symbol: Arc<Symbol>) {
        let mut symbols = self.symbols.write().await;
        symbols.entry(symbol.name().to_string()).or_insert(symbol);
    }

    /// 全局查找
    ///
    /// 先查已发布的符号；未命中时按挂接顺序探测每个单元自己的归档
    pub async fn lookup(&self, name: &str) -> Option<Arc<Symbol>> {
        if let Some(symbol) = self.symbols.read().await.get(name) {
            return Some(symbol.clone());
        }

        let units: Vec<Arc<LoadingUnit>> = self.units.read().await.clone();
        for unit in units {
            if let Some(symbol) = unit.find_local(name).await {
                return Some(symbol);
            }
        }
        None
    }

    /// 是否已发布该符号
    pub async fn contains(&self, name: &str) -> bool {
        self.symbols.read().await.contains_key(name)
    }

    /// 已发布的符号数量
    pub async fn len(&self) -> usize {
        self.symbols.read().await.len()
    }

    /// 是否没有任何已发布的符号
    pub async fn is_empty(&self) -> bool {
        self.symbols.read().await.is_empty()
    }

    /// 清除某个单元：摘除单元并删除其发布的符号
    ///
    /// # Returns
    ///
    /// 被删除的符号数量
    pub async fn purge(&self, unit: &LoadingUnit) -> usize {
        self.units
            .write()
            .await
            .retain(|u| !std::ptr::eq(Arc::as_ptr(u), unit));

        let mut symbols = self.symbols.write().await;
        let before = symbols.len();
        symbols.retain(|_, s| s.origin() != unit.module());
        let removed = before - symbols.len();

        debug!(module = %unit.module(), removed, "已清除模块符号");
        removed
    }

    /// 清空符号表
    pub async fn clear(&self) {
        self.units.write().await.clear();
        self.symbols.write().await.clear();
    }
}
