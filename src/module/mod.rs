//! 模块管理模块
//!
//! 包含模块管理系统的核心组件：
//! - 模块描述定义与解析
//! - 归档读取与动态加载单元
//! - 生命周期钩子与状态机
//! - 依赖排序
//! - 注册表与管理器

pub mod archive;
pub mod context;
pub mod dependency;
pub mod instance;
pub mod lifecycle;
pub mod loader;
pub mod manager;
pub mod metadata;
pub mod parser;
pub mod registry;
pub mod request;
pub mod runtime;

// 重导出常用类型
pub use archive::ModuleArchive;
pub use context::ModuleContext;
pub use dependency::{DependencyGraph, DependencyKind, LoadOrder};
pub use instance::ModuleHandle;
pub use lifecycle::{Hook, HookError, HookResult, LinkError, Module};
pub use loader::{LoadingUnit, Symbol, SymbolTable};
pub use manager::ModuleManager;
pub use metadata::{
    ApiVersion, Icon, ModuleDescriptor, ModuleInfo, ModuleState, PermissionDefault,
    PermissionNode,
};
pub use parser::ModuleParser;
pub use registry::ModuleRegistry;
pub use request::{FnRequestHandler, ModuleRequest, RequestHandler};
pub use runtime::{HostExtension, LoadableUnit, ModuleCatalog};
