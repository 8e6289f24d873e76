//! AddonHost SDK
//!
//! 扩展宿主的主要对外接口。把模块管理器、事件通道和宿主协作接口组装在一起，
//! 提供统一的启动与关闭流程：
//!
//! - 启动：加载全部模块、启用、通知整批加载完成
//! - 关闭：逆序禁用并彻底清空注册表
//! - 重载：关闭后重新加载并启用
//!
//! # 示例
//!
//! ```rust,no_run
//! use addon_host::{AddonHost, CoreConfig, ModuleCatalog};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = CoreConfig::builder()
//!         .data_dir("./data")
//!         .log_level("info")
//!         .build();
//!
//!     let mut host = AddonHost::with_tracing_host(config, ModuleCatalog::new())?;
//!     host.start().await?;
//!
//!     for info in host.list_modules().await {
//!         println!("{} {} {}", info.name(), info.version(), info.state);
//!     }
//!
//!     host.shutdown().await?;
//!     Ok(())
//! }
//! ```

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::host::{Host, TracingHost};
use crate::core::config::CoreConfig;
use crate::events::{ModuleListener, Reason};
use crate::module::{ModuleCatalog, ModuleHandle, ModuleInfo, ModuleManager, ModuleState};
use crate::utils::{CoreError, Result};

// ============================================================================
// 宿主状态
// ============================================================================

/// 扩展宿主状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostState {
    /// 已初始化
    Initialized,
    /// 运行中
    Running,
    /// 正在关闭
    ShuttingDown,
    /// 已关闭
    Shutdown,
}

impl HostState {
    /// 检查是否可以启动
    pub fn can_start(&self) -> bool {
        matches!(self, HostState::Initialized | HostState::Shutdown)
    }

    /// 检查是否可以关闭
    pub fn can_shutdown(&self) -> bool {
        matches!(self, HostState::Running)
    }

    /// 检查是否正在运行
    pub fn is_running(&self) -> bool {
        matches!(self, HostState::Running)
    }
}

// ============================================================================
// AddonHost 主结构体
// ============================================================================

/// 扩展宿主主结构体
///
/// # 生命周期
///
/// 1. `new()` - 校验配置并创建模块管理器
/// 2. `start()` - 加载、启用所有模块并通知整批加载完成
/// 3. `shutdown()` - 禁用所有模块
///
/// 关闭之后可以再次 `start()`，模块实例会被重新创建。
pub struct AddonHost {
    /// 宿主配置
    config: CoreConfig,

    /// 宿主状态
    state: Arc<RwLock<HostState>>,

    /// 模块管理器
    manager: Arc<ModuleManager>,

    /// 启动时间
    started_at: Option<Instant>,
}

impl std::fmt::Debug for AddonHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AddonHost")
            .field("data_dir", &self.config.data_dir)
            .field("manager", &self.manager)
            .finish_non_exhaustive()
    }
}

impl AddonHost {
    /// 创建扩展宿主
    ///
    /// # Arguments
    ///
    /// * `config` - 宿主配置
    /// * `host` - 宿主协作接口
    /// * `catalog` - 模块目录
    ///
    /// # Errors
    ///
    /// 配置校验失败时返回错误
    pub fn new(config: CoreConfig, host: Arc<dyn Host>, catalog: ModuleCatalog) -> Result<Self> {
        info!("初始化扩展宿主 v{}", crate::VERSION);
        config.validate()?;

        let manager = Arc::new(ModuleManager::from_config(&config, host, catalog));
        debug!(addons_dir = %manager.addons_dir().display(), "模块管理器初始化完成");

        Ok(Self {
            config,
            state: Arc::new(RwLock::new(HostState::Initialized)),
            manager,
            started_at: None,
        })
    }

    /// 使用 [`TracingHost`] 创建扩展宿主
    pub fn with_tracing_host(config: CoreConfig, catalog: ModuleCatalog) -> Result<Self> {
        let host = Arc::new(TracingHost::new(config.clone()));
        Self::new(config, host, catalog)
    }

    /// 启动宿主
    ///
    /// 依次执行 `load_all`、`enable_all`、`notify_all_loaded`。
    /// 单个模块的失败不会让启动失败。
    ///
    /// # Errors
    ///
    /// 宿主当前状态不允许启动时返回 `Internal`
    pub async fn start(&mut self) -> Result<()> {
        let mut state = self.state.write().await;
        if !state.can_start() {
            return Err(CoreError::Internal(format!(
                "宿主当前状态 {:?} 不允许启动",
                *state
            )));
        }

        info!("启动扩展宿主...");
        self.manager.load_all().await;
        self.manager.enable_all().await;
        self.manager.notify_all_loaded().await;

        *state = HostState::Running;
        self.started_at = Some(Instant::now());

        info!(
            enabled = self.manager.enabled_modules().await.len(),
            "扩展宿主已启动"
        );
        Ok(())
    }

    /// 关闭宿主
    ///
    /// 未运行时静默返回
    pub async fn shutdown(&mut self) -> Result<()> {
        let mut state = self.state.write().await;
        if !state.can_shutdown() {
            return Ok(());
        }

        info!("正在关闭扩展宿主...");
        *state = HostState::ShuttingDown;

        self.manager.disable_all().await;
        debug!("所有模块已禁用");

        *state = HostState::Shutdown;
        self.started_at = None;
        info!("扩展宿主已关闭");
        Ok(())
    }

    /// 重载所有模块
    ///
    /// 模块实例被重建，内存中的状态不会保留
    ///
    /// # Errors
    ///
    /// 宿主未运行时返回 `Internal`
    pub async fn reload(&self) -> Result<()> {
        if !self.is_running().await {
            return Err(CoreError::Internal("宿主未运行".to_string()));
        }

        info!("重载所有模块...");
        self.manager.reload_all().await;
        Ok(())
    }

    // ========================================================================
    // 模块访问
    // ========================================================================

    /// 所有模块的运行时信息
    pub async fn list_modules(&self) -> Vec<ModuleInfo> {
        self.manager.module_infos().await
    }

    /// 按名称查找模块
    pub async fn get_module(&self, name: &str) -> Option<Arc<ModuleHandle>> {
        self.manager.lookup_by_name(name).await
    }

    /// 为模块注册生命周期事件监听器
    ///
    /// # Errors
    ///
    /// 模块不存在时返回 `ModuleNotFound`
    pub async fn register_listener(
        &self,
        module: &str,
        reason: Option<Reason>,
        listener: ModuleListener,
    ) -> Result<String> {
        self.manager.register_listener(module, reason, listener).await
    }

    /// 调用已启用模块的 `on_reload`
    pub async fn reload_module(&self, name: &str) -> Result<()> {
        self.manager.reload_module(name).await
    }

    // ========================================================================
    // 状态和访问器
    // ========================================================================

    /// 当前状态
    pub async fn state(&self) -> HostState {
        *self.state.read().await
    }

    /// 宿主配置
    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    /// 模块管理器
    pub fn manager(&self) -> &Arc<ModuleManager> {
        &self.manager
    }

    /// 运行时长
    pub fn uptime(&self) -> Option<std::time::Duration> {
        self.started_at.map(|t| t.elapsed())
    }

    /// 是否正在运行
    pub async fn is_running(&self) -> bool {
        self.state.read().await.is_running()
    }

    /// 健康信息
    pub async fn health(&self) -> HealthInfo {
        let infos = self.manager.module_infos().await;
        let count = |state: ModuleState| infos.iter().filter(|i| i.state == state).count();

        HealthInfo {
            state: self.state().await,
            version: crate::VERSION.to_string(),
            api_version: crate::API_VERSION.to_string(),
            uptime_secs: self.uptime().map(|d| d.as_secs()).unwrap_or(0),
            total_modules: infos.len(),
            enabled_modules: count(ModuleState::Enabled),
            failed_modules: infos.iter().filter(|i| i.state.is_failed()).count(),
        }
    }
}

// ============================================================================
// 健康信息
// ============================================================================

/// 宿主健康信息
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthInfo {
    /// 宿主状态
    pub state: HostState,
    /// 库版本
    pub version: String,
    /// 宿主提供的 API 版本
    pub api_version: String,
    /// 运行时长（秒）
    pub uptime_secs: u64,
    /// 已注册模块数
    pub total_modules: usize,
    /// 已启用模块数
    pub enabled_modules: usize,
    /// 处于失败状态的模块数
    pub failed_modules: usize,
}

// ============================================================================
// 测试
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::testing::RecordingHost;
    use tempfile::TempDir;

    fn create_host(dir: &TempDir) -> (AddonHost, Arc<RecordingHost>) {
        let config = CoreConfig::builder().data_dir(dir.path()).build();
        let recorder = Arc::new(RecordingHost::new());
        let host = AddonHost::new(config, recorder.clone(), ModuleCatalog::new()).unwrap();
        (host, recorder)
    }

    #[tokio::test]
    async fn test_host_creation() {
        let dir = TempDir::new().unwrap();
        let (host, _) = create_host(&dir);

        assert_eq!(host.state().await, HostState::Initialized);
        assert!(!host.is_running().await);
        assert!(host.uptime().is_none());
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected() {
        let config = CoreConfig::builder().language("").build();
        let result = AddonHost::new(config, Arc::new(RecordingHost::new()), ModuleCatalog::new());
        assert!(matches!(result, Err(CoreError::InvalidConfigValue { .. })));
    }

    #[tokio::test]
    async fn test_start_and_shutdown() {
        let dir = TempDir::new().unwrap();
        let (mut host, recorder) = create_host(&dir);

        host.start().await.unwrap();
        assert!(host.is_running().await);
        assert!(dir.path().join("addons").is_dir());
        assert!(recorder.contains("Loaded 0 addons."));

        assert!(host.start().await.is_err());

        host.shutdown().await.unwrap();
        assert_eq!(host.state().await, HostState::Shutdown);

        // 重复关闭是安全的
        host.shutdown().await.unwrap();
        assert_eq!(host.state().await, HostState::Shutdown);

        // 关闭后可以再次启动
        host.start().await.unwrap();
        assert!(host.is_running().await);
    }

    #[tokio::test]
    async fn test_reload_requires_running() {
        let dir = TempDir::new().unwrap();
        let (mut host, _) = create_host(&dir);

        assert!(host.reload().await.is_err());
        host.start().await.unwrap();
        host.reload().await.unwrap();
    }

    #[tokio::test]
    async fn test_health() {
        let dir = TempDir::new().unwrap();
        let (mut host, _) = create_host(&dir);
        host.start().await.unwrap();

        let health = host.health().await;
        assert_eq!(health.state, HostState::Running);
        assert_eq!(health.api_version, crate::API_VERSION);
        assert_eq!(health.total_modules, 0);
        assert_eq!(health.failed_modules, 0);
    }
}
