//! 模块管理器
//!
//! 整合模块管理系统的所有组件，驱动模块的整个生命周期：
//!
//! 1. `load_all` - 扫描扩展目录、解析描述、选择加载方式、按依赖排序、调用 `on_load`
//! 2. `enable_all` - 按依赖顺序启用模块，然后注册权限
//! 3. `notify_all_loaded` - 通知已启用模块整批加载完成
//! 4. `disable_all` - 逆序禁用模块并彻底清空注册表
//!
//! 所有钩子在调用方任务上逐个 await，任何单个模块的失败只影响它自己。
//! 面向宿主的日志通过 [`Host`] 输出，内部诊断使用 `tracing`。

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, error, info, instrument, warn};

use super::archive::ModuleArchive;
use super::context::ModuleContext;
use super::dependency::DependencyGraph;
use super::instance::ModuleHandle;
use super::lifecycle::{self, Hook, HookError};
use super::loader::{LoadingUnit, Symbol};
use super::metadata::{ApiVersion, ModuleDescriptor, ModuleInfo, ModuleState, PermissionDefault};
use super::parser::ModuleParser;
use super::registry::ModuleRegistry;
use super::runtime::{HostExtension, LoadableUnit, ModuleCatalog};
use crate::api::host::Host;
use crate::core::config::{CoreConfig, ModuleConfig};
use crate::events::{EventChannel, ModuleEvent, ModuleListener, Reason};
use crate::utils::{CoreError, Result};

/// 模块管理器
///
/// 负责模块的整个生命周期管理，包括：
/// - 扩展目录扫描与重复检测
/// - 宿主原生扩展与嵌入式模块的选择
/// - 依赖排序
/// - 启用、禁用、重载
/// - 失败隔离
pub struct ModuleManager {
    /// 模块配置
    config: ModuleConfig,
    /// 扩展目录
    addons_dir: PathBuf,
    /// 宿主提供的 API 版本
    api_version: Option<ApiVersion>,
    /// 宿主
    host: Arc<dyn Host>,
    /// 模块目录（入口点 -> 工厂）
    catalog: Arc<ModuleCatalog>,
    /// 模块注册表
    registry: Arc<ModuleRegistry>,
    /// 生命周期事件通道
    events: Arc<EventChannel>,
}

impl std::fmt::Debug for ModuleManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleManager")
            .field("addons_dir", &self.addons_dir)
            .field("api_version", &self.config.api_version)
            .finish_non_exhaustive()
    }
}

impl ModuleManager {
    /// 创建模块管理器
    ///
    /// # Arguments
    ///
    /// * `config` - 模块配置
    /// * `addons_dir` - 扩展目录
    /// * `host` - 宿主
    /// * `catalog` - 模块目录
    pub fn new(
        config: ModuleConfig,
        addons_dir: impl Into<PathBuf>,
        host: Arc<dyn Host>,
        catalog: ModuleCatalog,
    ) -> Self {
        let api_version = config.host_api_version();
        if api_version.is_none() && !config.api_version.trim().is_empty() {
            warn!(api_version = %config.api_version, "宿主 API 版本无效，跳过兼容性检查");
        }

        Self {
            config,
            addons_dir: addons_dir.into(),
            api_version,
            host,
            catalog: Arc::new(catalog),
            registry: Arc::new(ModuleRegistry::new()),
            events: Arc::new(EventChannel::new()),
        }
    }

    /// 使用内核配置创建模块管理器
    pub fn from_config(config: &CoreConfig, host: Arc<dyn Host>, catalog: ModuleCatalog) -> Self {
        Self::new(config.modules.clone(), config.addons_dir(), host, catalog)
    }

    /// 扩展目录
    pub fn addons_dir(&self) -> &Path {
        &self.addons_dir
    }

    /// 模块注册表
    pub fn registry(&self) -> &Arc<ModuleRegistry> {
        &self.registry
    }

    /// 生命周期事件通道
    pub fn events(&self) -> &Arc<EventChannel> {
        &self.events
    }

    /// 宿主
    pub fn host(&self) -> &Arc<dyn Host> {
        &self.host
    }

    // ==================== 加载 ====================

    /// 加载扩展目录中的所有模块
    ///
    /// 非递归扫描扩展目录，只处理扩展名匹配的文件。单个归档的任何失败
    /// 只会被记录并跳过该归档，不会中断整批加载。
    #[instrument(skip_all, fields(addons_dir = %self.addons_dir.display()))]
    pub async fn load_all(&self) {
        self.host.log_info("Loading addons...");

        if let Err(e) = tokio::fs::create_dir_all(&self.addons_dir).await {
            error!(error = %e, "无法创建扩展目录");
            self.host.log_error("Cannot create addons folder!");
            return;
        }

        let archives = match self.scan().await {
            Ok(archives) => archives,
            Err(e) => {
                self.host
                    .log_error(&format!("Cannot read addons folder: {}", e));
                return;
            }
        };
        debug!(count = archives.len(), "扫描到归档");

        let mut discovered = Vec::new();
        for path in archives {
            match self.discover(&path).await {
                Ok(Some(module)) => discovered.push(module),
                Ok(None) => {}
                Err(e) => {
                    let file = path
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_default();
                    warn!(archive = %path.display(), error_code = e.error_code(), "归档加载失败: {}", e);
                    self.host.log_error(&format!(
                        "Could not load addon '{}'. Error is: {}",
                        file, e
                    ));
                    self.host.log_stacktrace(&e);
                }
            }
        }

        self.sort().await;

        for module in self.registry.list().await {
            if discovered.iter().any(|d| Arc::ptr_eq(d, &module)) {
                self.initialize(&module).await;
            }
        }

        let loaded = self.loaded_modules().await.len();
        info!(loaded, "模块加载完成");
        self.host.log_info(&format!("Loaded {} addons.", loaded));
    }

    /// 列出扩展目录中的归档，保持文件系统的列举顺序
    async fn scan(&self) -> Result<Vec<PathBuf>> {
        let mut entries = tokio::fs::read_dir(&self.addons_dir).await?;
        let mut archives = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let is_file = entry.file_type().await.map(|t| t.is_file()).unwrap_or(false);
            let matches = path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| self.config.is_archive_extension(e))
                .unwrap_or(false);

            if is_file && matches {
                archives.push(path);
            } else {
                debug!(path = %path.display(), "跳过非归档文件");
            }
        }

        Ok(archives)
    }

    /// 发现单个归档并注册
    ///
    /// # Returns
    ///
    /// - `Ok(Some(module))` - 已注册，等待初始化
    /// - `Ok(None)` - 重复模块，已记录并跳过
    /// - `Err(e)` - 归档、描述或入口点无效
    #[instrument(skip(self), fields(archive = %path.display()))]
    async fn discover(&self, path: &Path) -> Result<Option<Arc<ModuleHandle>>> {
        let archive = Arc::new(ModuleArchive::open(path).await?);
        let manifest = archive.manifest(&self.config.manifest_file)?;
        let descriptor = ModuleParser::parse_str(manifest, self.host.as_ref())?;

        if let Some(existing) = self.registry.find_duplicate(&descriptor).await {
            warn!(module = %descriptor.name, "重复的模块");
            self.host.log_error(&format!(
                "Duplicate addon! Addon {} {} has already been loaded!",
                existing.name(),
                existing.version()
            ));
            self.host.log_error("Remove the duplicate and restart!");
            return Ok(None);
        }

        let (unit, instance) = match self.load_host_extension(&archive, &descriptor) {
            Some(loaded) => loaded,
            None => self.load_embedded(&archive, &descriptor).await?,
        };

        let data_dir = path
            .parent()
            .unwrap_or(&self.addons_dir)
            .join(&descriptor.name);
        let module = Arc::new(ModuleHandle::new(descriptor, archive, data_dir, unit, instance));
        self.registry.register(module.clone()).await?;

        debug!(
            module = %module.name(),
            version = %module.version(),
            host_managed = module.is_host_managed(),
            "模块已发现"
        );
        Ok(Some(module))
    }

    /// 尝试按宿主原生扩展加载
    ///
    /// 归档带有宿主描述文件且目录中登记了对应扩展时成功；否则返回 `None`，
    /// 由调用方回退到嵌入式加载
    fn load_host_extension(
        &self,
        archive: &Arc<ModuleArchive>,
        descriptor: &ModuleDescriptor,
    ) -> Option<(LoadableUnit, Box<dyn super::lifecycle::Module>)> {
        if !archive.contains(&self.config.host_manifest_file) {
            return None;
        }

        let created = self.catalog.extension_factory(&descriptor.main).and_then(|factory| {
            catch_unwind(AssertUnwindSafe(|| {
                let extension = factory(archive.path());
                let module = extension.create_module();
                (extension, module)
            }))
            .ok()
        });

        match created {
            Some((extension, module)) => {
                extension.mark_enabled();
                debug!(module = %descriptor.name, "按宿主原生扩展加载");
                Some((LoadableUnit::HostManaged(extension), module))
            }
            None => {
                self.host.log_info(&format!(
                    "Failed to load {}, trying to load it as an addon",
                    archive.file_name()
                ));
                None
            }
        }
    }

    /// 按嵌入式模块加载
    async fn load_embedded(
        &self,
        archive: &Arc<ModuleArchive>,
        descriptor: &ModuleDescriptor,
    ) -> Result<(LoadableUnit, Box<dyn super::lifecycle::Module>)> {
        let unit = Arc::new(LoadingUnit::new(
            descriptor.name.clone(),
            archive.clone(),
            self.config.reserved_prefix.clone(),
            Arc::downgrade(self.registry.symbols()),
        ));

        if unit.is_reserved(&descriptor.main) {
            return Err(CoreError::InvalidFormat(format!(
                "入口点 '{}' 位于宿主保留命名空间",
                descriptor.main
            )));
        }
        if !unit.defines(&descriptor.main) {
            return Err(CoreError::InvalidFormat(format!(
                "归档 {} 中找不到入口点 '{}'",
                archive.file_name(),
                descriptor.main
            )));
        }

        let factory = self
            .catalog
            .module_factory(&descriptor.main)
            .ok_or_else(|| CoreError::InvalidInheritance(descriptor.main.clone()))?;
        let instance = catch_unwind(AssertUnwindSafe(|| factory())).map_err(|payload| {
            CoreError::ModuleLoadFailed {
                module_id: descriptor.name.clone(),
                reason: format!("实例化 panic: {}", lifecycle::panic_message(payload.as_ref())),
            }
        })?;

        unit.find_local(&descriptor.main).await;
        self.registry.symbols().attach(unit.clone()).await;
        Ok((LoadableUnit::Embedded(unit), instance))
    }

    /// 按依赖关系排序注册表
    ///
    /// 硬依赖缺失或处于硬依赖环中的模块被释放并标记为 MISSING_DEPENDENCY
    async fn sort(&self) {
        let modules = self.registry.list().await;
        let graph = DependencyGraph::from_descriptors(modules.iter().map(|m| m.descriptor()));
        let order = graph.load_order();

        for (name, dependency) in &order.missing {
            let message = format!(
                "{} has dependency on {} that does not exist. Addon will not load!",
                name, dependency
            );
            self.host.log_error(&message);
            self.release(name, &message).await;
        }

        if !order.cyclic.is_empty() {
            let cycle = graph
                .find_cycle()
                .map(|c| c.join(" -> "))
                .unwrap_or_else(|| order.cyclic.join(", "));
            let err = CoreError::CircularDependency(cycle);
            error!(error_code = err.error_code(), "{}", err);
            self.host.log_error(&format!(
                "Circular dependency between {}. These addons will not load!",
                order.cyclic.join(", ")
            ));
            for name in &order.cyclic {
                self.release(name, &err.to_string()).await;
            }
        }

        self.registry.reorder(&order.order).await;
        debug!(order = ?order.order, "模块排序完成");
    }

    /// 释放无法加载的模块
    async fn release(&self, name: &str, reason: &str) {
        if let Some(module) = self.registry.lookup_by_name(name).await {
            self.disable(&module).await;
            module.set_error(ModuleState::MissingDependency, reason).await;
        }
    }

    /// 初始化模块：LOAD 事件、兼容性检查、`on_load`
    async fn initialize(&self, module: &Arc<ModuleHandle>) {
        self.fire(module, Reason::Load).await;

        if let Err(e) = self.check_compatibility(module.descriptor()) {
            warn!(module = %module.name(), error_code = e.error_code(), "{}", e);
            if let CoreError::Incompatible { required, .. } = &e {
                self.host.log_error(&format!(
                    "Cannot load {} because it requires host API version {} or greater.",
                    module.name(),
                    required
                ));
            }
            self.host.log_error("NOTE: Please update the host.");
            module.set_error(ModuleState::Incompatible, e.to_string()).await;
            return;
        }

        module.set_state(ModuleState::Loaded).await;
        if let Err(e) = self.call(module, Hook::Load).await {
            self.handle_failure(module, Hook::Load, e).await;
        }
    }

    /// 检查模块要求的宿主 API 版本
    fn check_compatibility(&self, descriptor: &ModuleDescriptor) -> Result<()> {
        let (Some(required), Some(available)) = (descriptor.parsed_api_version(), &self.api_version)
        else {
            return Ok(());
        };

        if required.is_satisfied_by(available) {
            Ok(())
        } else {
            Err(CoreError::Incompatible {
                module: descriptor.name.clone(),
                required: required.to_string(),
                available: available.to_string(),
            })
        }
    }

    /// 注册一个已被宿主加载的原生扩展
    ///
    /// 用于整批加载之后由宿主主动登记的扩展：解析描述、注册、重新排序并初始化。
    /// 启用仍由 [`enable_all`](Self::enable_all) 完成。
    #[instrument(skip_all, fields(archive = %archive.path().display()))]
    pub async fn register_extension(
        &self,
        archive: ModuleArchive,
        extension: Arc<dyn HostExtension>,
    ) -> Result<Arc<ModuleHandle>> {
        self.host
            .log_info(&format!("Registering {}", archive.file_name()));

        let archive = Arc::new(archive);
        let descriptor = archive
            .manifest(&self.config.manifest_file)
            .and_then(|manifest| ModuleParser::parse_str(manifest, self.host.as_ref()))
            .map_err(|e| {
                self.host
                    .log_error(&format!("Failed to register addon: {}", e));
                e
            })?;

        if let Some(existing) = self.registry.find_duplicate(&descriptor).await {
            self.host.log_error(&format!(
                "Failed to register addon: {} {} has already been loaded",
                existing.name(),
                existing.version()
            ));
            return Err(CoreError::ModuleAlreadyLoaded(existing.name().to_string()));
        }

        let instance = extension.create_module();
        let data_dir = archive
            .path()
            .parent()
            .unwrap_or(&self.addons_dir)
            .join(&descriptor.name);
        let module = Arc::new(ModuleHandle::new(
            descriptor,
            archive,
            data_dir,
            LoadableUnit::HostManaged(extension),
            instance,
        ));
        self.registry.register(module.clone()).await?;

        self.sort().await;
        if self.registry.lookup_by_name(module.name()).await.is_some() {
            self.initialize(&module).await;
        }
        Ok(module)
    }

    // ==================== 启用 ====================

    /// 启用所有 LOADED 模块，然后为已启用的模块注册权限
    #[instrument(skip_all)]
    pub async fn enable_all(&self) {
        let loaded = self.loaded_modules().await;
        if loaded.is_empty() {
            return;
        }

        self.host.log_info("Enabling addons...");
        for module in &loaded {
            self.enable(module).await;
        }

        for module in self.enabled_modules().await {
            self.register_permissions(&module);
        }
        self.host.log_info("Addons successfully enabled.");
    }

    /// 启用单个模块
    async fn enable(&self, module: &Arc<ModuleHandle>) {
        if module.state().await != ModuleState::Loaded {
            return;
        }

        for dependency in &module.descriptor().dependencies {
            let enabled = match self.registry.lookup_by_name(dependency).await {
                Some(dep) => dep.is_enabled().await,
                None => false,
            };
            if !enabled {
                let err = CoreError::MissingDependency {
                    module: module.name().to_string(),
                    dependency: dependency.clone(),
                };
                warn!(module = %module.name(), error_code = err.error_code(), "{}", err);
                self.host.log_error(&format!(
                    "Cannot enable {} because its dependency {} is not enabled.",
                    module.name(),
                    dependency
                ));
                module.set_error(ModuleState::MissingDependency, err.to_string()).await;
                return;
            }
        }

        self.host.log_info(&format!(
            "Enabling {} ({})...",
            module.name(),
            module.version()
        ));

        match self.call(module, Hook::Enable).await {
            Ok(()) => {
                if module.state().await == ModuleState::Disabled {
                    self.host.log_info(&format!("{} is disabled.", module.name()));
                    return;
                }
                self.fire(module, Reason::Enable).await;
                module.set_state(ModuleState::Enabled).await;
                info!(module = %module.name(), version = %module.version(), "模块已启用");
            }
            Err(e) => self.handle_failure(module, Hook::Enable, e).await,
        }
    }

    /// 注册模块的权限树
    ///
    /// 每个权限独立处理，单个权限失败只记录错误
    fn register_permissions(&self, module: &ModuleHandle) {
        for node in module.descriptor().permissions.iter().filter(|n| n.is_registrable()) {
            let raw = node.default.as_deref().unwrap_or_default();
            let description = node.description.as_deref().unwrap_or_default();

            let Some(default) = PermissionDefault::from_name(raw) else {
                self.host.log_error(&format!(
                    "Addon {}: Permission default is invalid in addon.yml: {}.default",
                    module.name(),
                    node.name
                ));
                continue;
            };

            if let Err(e) = self
                .host
                .register_permission_default(&node.name, description, default)
            {
                debug!(module = %module.name(), permission = %node.name, error = %e, "权限注册失败");
                self.host
                    .log_error(&format!("Addon {}: {}", module.name(), e));
            }
        }
    }

    /// 通知所有已启用模块整批加载完成
    ///
    /// 钩子失败的模块会被记录并彻底禁用
    #[instrument(skip_all)]
    pub async fn notify_all_loaded(&self) {
        for module in self.enabled_modules().await {
            if let Err(e) = self.call(&module, Hook::AllLoaded).await {
                self.handle_failure(&module, Hook::AllLoaded, e).await;
                self.disable(&module).await;
            }
        }
    }

    /// 调用已启用模块的 `on_reload`
    ///
    /// # Errors
    ///
    /// - 模块不存在时返回 `ModuleNotFound`
    /// - 模块未启用时返回 `InvalidState`
    /// - 钩子失败时返回对应的钩子错误，模块保持启用
    #[instrument(skip(self))]
    pub async fn reload_module(&self, name: &str) -> Result<()> {
        let module = self
            .registry
            .lookup_by_name(name)
            .await
            .ok_or_else(|| CoreError::ModuleNotFound(name.to_string()))?;

        let state = module.state().await;
        if state != ModuleState::Enabled {
            return Err(CoreError::InvalidState {
                module: module.name().to_string(),
                state: state.to_string(),
            });
        }

        self.call(&module, Hook::Reload).await.map_err(|e| {
            let err = e.into_core_error(module.descriptor(), Hook::Reload);
            self.host.log_error(&format!(
                "Error occurred when reloading addon {}",
                module.name()
            ));
            self.host.log_stacktrace(&err);
            err
        })
    }

    // ==================== 禁用 ====================

    /// 禁用所有模块并清空注册表
    ///
    /// 已启用的模块按依赖顺序的逆序禁用，宿主原生扩展由宿主自己停用。
    /// 之后注销所有命令、撤销所有监听器、清空符号表与模块列表。
    /// 重复调用是安全的，第二次调用什么也不做。
    #[instrument(skip_all)]
    pub async fn disable_all(&self) {
        let enabled = self.enabled_modules().await;
        if !enabled.is_empty() {
            self.host.log_info("Disabling addons...");
            for module in enabled.iter().rev().filter(|m| !m.is_host_managed()) {
                self.disable(module).await;
            }
            self.host.log_info("Addons successfully disabled.");
        }

        for module in self.registry.list().await {
            module.unload_commands(self.host.as_ref()).await;
        }
        for id in self.registry.take_all_listeners().await {
            self.events.unsubscribe(&id).await;
        }
        self.registry.clear().await;
    }

    /// 禁用单个模块并从注册表移除
    async fn disable(&self, module: &Arc<ModuleHandle>) {
        for id in self.registry.take_listeners(module.name()).await {
            self.events.unsubscribe(&id).await;
        }
        module.unload_commands(self.host.as_ref()).await;

        if module.is_enabled().await {
            self.host.log_info(&format!("Disabling {}...", module.name()));
            if let Err(e) = self.call(module, Hook::Disable).await {
                let err = e.into_core_error(module.descriptor(), Hook::Disable);
                warn!(module = %module.name(), error_code = err.error_code(), "{}", err);
                self.host.log_error(&format!(
                    "Error occurred when disabling addon {}",
                    module.name()
                ));
                self.host.log_error("Report this to the addon's author(s)");
                for author in &module.descriptor().authors {
                    self.host.log_error(author);
                }
                self.host.log_stacktrace(&err);
            }
            self.fire(module, Reason::Disable).await;
        }

        match module.unit() {
            LoadableUnit::Embedded(unit) => {
                self.registry.symbols().purge(unit).await;
            }
            LoadableUnit::HostManaged(extension) => extension.deactivate(),
        }

        module.set_state(ModuleState::Disabled).await;
        self.registry.remove(module.name()).await;
        debug!(module = %module.name(), "模块已禁用");
    }

    /// 重载所有模块：禁用、重新加载、启用
    ///
    /// 模块实例被重建，内存中的状态不会保留
    #[instrument(skip_all)]
    pub async fn reload_all(&self) {
        self.disable_all().await;
        self.load_all().await;
        self.enable_all().await;
    }

    // ==================== 监听器 ====================

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
        let module = self
            .registry
            .lookup_by_name(module)
            .await
            .ok_or_else(|| CoreError::ModuleNotFound(module.to_string()))?;

        let id = self.events.subscribe(module.name(), reason, listener).await;
        self.registry.track_listener(module.name(), id.clone()).await;
        Ok(id)
    }

    // ==================== 查询 ====================

    /// 按名称查找模块（不区分大小写）
    pub async fn lookup_by_name(&self, name: &str) -> Option<Arc<ModuleHandle>> {
        self.registry.lookup_by_name(name).await
    }

    /// 按入口点查找模块（不区分大小写）
    pub async fn lookup_by_entry_point(&self, entry_point: &str) -> Option<Arc<ModuleHandle>> {
        self.registry.lookup_by_entry_point(entry_point).await
    }

    /// 在跨模块符号表中解析符号
    pub async fn lookup_symbol(&self, name: &str) -> Option<Arc<Symbol>> {
        self.registry.lookup_symbol(name).await
    }

    /// 所有已注册模块（按加载顺序）
    pub async fn modules(&self) -> Vec<Arc<ModuleHandle>> {
        self.registry.list().await
    }

    /// LOADED 状态的模块
    pub async fn loaded_modules(&self) -> Vec<Arc<ModuleHandle>> {
        self.registry.with_state(ModuleState::Loaded).await
    }

    /// ENABLED 状态的模块
    pub async fn enabled_modules(&self) -> Vec<Arc<ModuleHandle>> {
        self.registry.with_state(ModuleState::Enabled).await
    }

    /// 所有模块的运行时信息
    pub async fn module_infos(&self) -> Vec<ModuleInfo> {
        self.registry.infos().await
    }

    // ==================== 内部 ====================

    fn context(&self, module: &Arc<ModuleHandle>) -> ModuleContext {
        ModuleContext::new(
            module.clone(),
            self.registry.clone(),
            self.events.clone(),
            self.host.clone(),
            self.catalog.clone(),
            self.config.reserved_prefix.clone(),
        )
    }

    async fn call(&self, module: &Arc<ModuleHandle>, hook: Hook) -> std::result::Result<(), HookError> {
        let ctx = self.context(module);
        lifecycle::invoke(module, hook, &ctx).await
    }

    /// 发布生命周期事件：先分发给模块监听器，再交给宿主
    async fn fire(&self, module: &Arc<ModuleHandle>, reason: Reason) {
        let mut event = ModuleEvent::new(module.clone(), reason);
        self.events.publish(&mut event).await;
        self.host.publish_event(&mut event);
    }

    /// 处理钩子失败
    ///
    /// 链接错误使模块进入 INCOMPATIBLE，其它错误进入 ERROR，两者都会提示作者
    async fn handle_failure(&self, module: &Arc<ModuleHandle>, hook: Hook, e: HookError) {
        let err = e.into_core_error(module.descriptor(), hook);
        let authors = module.descriptor().authors_display();
        error!(
            module = %module.name(),
            hook = %hook,
            error_code = err.error_code(),
            "{}",
            err
        );

        if err.is_incompatibility() {
            module.set_error(ModuleState::Incompatible, err.to_string()).await;
            self.host.log_warning(&format!(
                "Skipping {} as it is incompatible with the current version of the host...",
                module.name()
            ));
            self.host
                .log_warning("NOTE: The addon is referring to no longer existing symbols.");
            self.host
                .log_warning("NOTE: DO NOT report this as a bug from the host.");
        } else {
            module.set_error(ModuleState::Error, err.to_string()).await;
            self.host.log_error(&format!(
                "Skipping {} due to an unhandled exception...",
                module.name()
            ));
        }

        self.host.log_error(&format!(
            "Please report this stack trace to the addon's author(s): {}",
            authors
        ));
        self.host.log_stacktrace(&err);
    }
}
