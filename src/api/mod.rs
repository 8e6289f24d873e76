//! API 模块
//!
//! 包含宿主协作接口与对外提供的 SDK。
//!
//! # 模块概览
//!
//! - `host`: 运行时对宿主应用的依赖（日志、配置、命令、权限、事件）
//! - `sdk`: AddonHost 主接口，组装并驱动模块管理器
//! - `testing`: 记录调用的宿主实现等测试辅助
//!
//! # 示例
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use addon_host::api::host::TracingHost;
//! use addon_host::{AddonHost, CoreConfig, ModuleCatalog};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = CoreConfig::default();
//!     let host = Arc::new(TracingHost::new(config.clone()));
//!
//!     let mut addons = AddonHost::new(config, host, ModuleCatalog::new())?;
//!     addons.start().await?;
//!     addons.shutdown().await?;
//!     Ok(())
//! }
//! ```

pub mod host;
pub mod sdk;
pub mod testing;

// 重导出主要类型
pub use host::{Command, Host, RegisteredPermission, TracingHost};
pub use sdk::{AddonHost, HealthInfo, HostState};
