//! 模块运行时目录
//!
//! 模块的编译代码以工厂的形式登记在 [`ModuleCatalog`] 中，以入口点为键。
//! 归档负责提供描述与符号，目录负责把入口点实例化为 [`Module`]。
//! 目录同时保存宿主原生扩展的工厂和宿主自己命名空间中的符号。

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use super::loader::{LoadingUnit, Symbol};
use super::lifecycle::Module;

/// 嵌入式模块工厂
pub type ModuleFactory = Arc<dyn Fn() -> Box<dyn Module> + Send + Sync>;

/// 宿主原生扩展工厂，参数为扩展所在的归档路径
pub type HostExtensionFactory = Arc<dyn Fn(&Path) -> Arc<dyn HostExtension> + Send + Sync>;

/// 宿主原生扩展
///
/// 这类模块本身也能被宿主直接加载，生命周期的最终停用由宿主负责。
pub trait HostExtension: Send + Sync {
    /// 创建扩展承载的模块实例
    fn create_module(&self) -> Box<dyn Module>;

    /// 通知宿主扩展已被标记为启用
    fn mark_enabled(&self) {}

    /// 请求宿主停用该扩展
    fn deactivate(&self);
}

/// 可加载单元
///
/// 在发现阶段按归档是否满足宿主扩展契约选择其一，
/// 嵌入式加载是通用的回退方式。
#[derive(Clone)]
pub enum LoadableUnit {
    /// 宿主原生扩展：停用委托给宿主
    HostManaged(Arc<dyn HostExtension>),
    /// 嵌入式模块：生命周期完全由运行时管理
    Embedded(Arc<LoadingUnit>),
}

impl LoadableUnit {
    /// 是否为宿主原生扩展
    pub fn is_host_managed(&self) -> bool {
        matches!(self, LoadableUnit::HostManaged(_))
    }

    /// 嵌入式模块的加载单元
    pub fn loading_unit(&self) -> Option<&Arc<LoadingUnit>> {
        match self {
            LoadableUnit::Embedded(unit) => Some(unit),
            LoadableUnit::HostManaged(_) => None,
        }
    }
}

impl fmt::Debug for LoadableUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadableUnit::HostManaged(_) => f.write_str("HostManaged"),
            LoadableUnit::Embedded(unit) => f.debug_tuple("Embedded").field(&unit.module()).finish(),
        }
    }
}

/// 模块目录
#[derive(Default, Clone)]
pub struct ModuleCatalog {
    modules: HashMap<String, ModuleFactory>,
    extensions: HashMap<String, HostExtensionFactory>,
    host_symbols: HashMap<String, Arc<Symbol>>,
}

impl ModuleCatalog {
    /// 创建空目录
    pub fn new() -> Self {
        Self::default()
    }

    /// 登记嵌入式模块
    pub fn register_module<F>(&mut self, entry_point: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn() -> Box<dyn Module> + Send + Sync + 'static,
    {
        self.modules.insert(entry_point.into(), Arc::new(factory));
        self
    }

    /// 登记宿主原生扩展
    pub fn register_extension<F>(&mut self, entry_point: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn(&Path) -> Arc<dyn HostExtension> + Send + Sync + 'static,
    {
        self.extensions.insert(entry_point.into(), Arc::new(factory));
        self
    }

    /// 登记宿主命名空间中的符号
    pub fn register_host_symbol(&mut self, name: impl Into<String>, data: impl Into<Vec<u8>>) -> &mut Self {
        let name = name.into();
        let data: Vec<u8> = data.into();
        let symbol = Arc::new(Symbol::new(name.clone(), "", data));
        self.host_symbols.insert(name, symbol);
        self
    }

    /// 查找嵌入式模块工厂
    pub fn module_factory(&self, entry_point: &str) -> Option<ModuleFactory> {
        self.modules.get(entry_point).cloned()
    }

    /// 查找宿主原生扩展工厂
    pub fn extension_factory(&self, entry_point: &str) -> Option<HostExtensionFactory> {
        self.extensions.get(entry_point).cloned()
    }

    /// 查找宿主命名空间中的符号
    pub fn host_symbol(&self, name: &str) -> Option<Arc<Symbol>> {
        self.host_symbols.get(name).cloned()
    }

    /// 已登记的入口点
    pub fn entry_points(&self) -> Vec<String> {
        let mut entries: Vec<String> = self
            .modules
            .keys()
            .chain(self.extensions.keys())
            .cloned()
            .collect();
        entries.sort();
        entries.dedup();
        entries
    }
}

impl fmt::Debug for ModuleCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleCatalog")
            .field("entry_points", &self.entry_points())
            .field("host_symbols", &self.host_symbols.len())
            .finish()
    }
}
