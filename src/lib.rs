//! # Addon Host - 扩展模块宿主
//!
//! 为长期运行的宿主应用提供可扩展的模块运行时，核心功能：
//!
//! - **模块发现**: 扫描扩展目录中的归档并解析 addon.yml 描述
//! - **动态加载单元**: 每个模块独立的符号命名空间，支持跨模块符号解析
//! - **生命周期状态机**: 加载、启用、禁用、重载，失败被隔离在单个模块内
//! - **依赖排序**: 硬依赖与软依赖的确定性拓扑排序
//! - **生命周期事件**: 可追踪、可撤销的模块监听器
//!
//! ## 快速开始
//!
//! ```rust,no_run
//! use addon_host::{AddonHost, CoreConfig, ModuleCatalog};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = CoreConfig::default();
//!     let mut host = AddonHost::with_tracing_host(config, ModuleCatalog::new())?;
//!
//!     // 加载并启用所有模块
//!     host.start().await?;
//!
//!     host.shutdown().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## 模块结构
//!
//! - `module` - 模块管理相关类型
//! - `events` - 生命周期事件
//! - `utils` - 工具函数和错误类型
//! - `core` - 宿主配置
//! - `api` - 宿主协作接口与 SDK

#![warn(rustdoc::missing_crate_level_docs)]

pub mod api;
pub mod core;
pub mod events;
pub mod module;
pub mod utils;

// 重导出常用类型，方便使用
pub use module::{
    Hook, HookError, HookResult, HostExtension, LinkError, Module, ModuleCatalog,
    ModuleContext, ModuleDescriptor, ModuleHandle, ModuleInfo, ModuleManager, ModuleState,
};

pub use events::{EventChannel, ModuleEvent, ModuleListener, Reason};

pub use utils::{error_code, generate_uuid, subscription_id, CoreError, Result};
pub use utils::logger::{fields, LogGuard, Logger, LoggerConfig, LoggerConfigBuilder, RotationStrategy};

pub use core::config::{CoreConfig, CoreConfigBuilder, LogConfig, ModuleConfig};
pub use api::host::{Command, Host, TracingHost};
pub use api::sdk::{AddonHost, HealthInfo, HostState};

/// 库版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// 宿主提供的模块 API 版本
pub const API_VERSION: &str = "1.0";
