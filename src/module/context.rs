//! 模块上下文
//!
//! 钩子通过 [`ModuleContext`] 使用宿主与注册表提供的服务：带前缀的日志、
//! 符号解析、命令/监听器/请求处理器注册、跨模块查询以及归档资源。
//! 上下文在每次调用钩子时由管理器构造，钩子返回后即丢弃。

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use super::instance::ModuleHandle;
use super::lifecycle::{HookError, LinkError};
use super::loader::Symbol;
use super::metadata::{ModuleDescriptor, ModuleState};
use super::registry::ModuleRegistry;
use super::request::RequestHandler;
use super::runtime::{LoadableUnit, ModuleCatalog};
use crate::api::host::{Command, Host};
use crate::events::{EventChannel, ModuleListener, Reason};
use crate::utils::{CoreError, Result};

/// 模块数据目录下的配置文件名
pub const CONFIG_FILE: &str = "config.yml";

/// 模块数据目录下的语言目录名
pub const LANG_DIR: &str = "lang";

/// 钩子可用的服务
#[derive(Clone)]
pub struct ModuleContext {
    module: Arc<ModuleHandle>,
    registry: Arc<ModuleRegistry>,
    events: Arc<EventChannel>,
    host: Arc<dyn Host>,
    catalog: Arc<ModuleCatalog>,
    reserved_prefix: String,
}

impl std::fmt::Debug for ModuleContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleContext")
            .field("module", &self.module.name())
            .finish_non_exhaustive()
    }
}

impl ModuleContext {
    pub(crate) fn new(
        module: Arc<ModuleHandle>,
        registry: Arc<ModuleRegistry>,
        events: Arc<EventChannel>,
        host: Arc<dyn Host>,
        catalog: Arc<ModuleCatalog>,
        reserved_prefix: impl Into<String>,
    ) -> Self {
        Self {
            module,
            registry,
            events,
            host,
            catalog,
            reserved_prefix: reserved_prefix.into(),
        }
    }

    /// 当前模块
    pub fn module_handle(&self) -> &Arc<ModuleHandle> {
        &self.module
    }

    /// 模块描述
    pub fn descriptor(&self) -> &ModuleDescriptor {
        self.module.descriptor()
    }

    /// 模块名
    pub fn name(&self) -> &str {
        self.module.name()
    }

    /// 数据目录
    pub fn data_dir(&self) -> &Path {
        self.module.data_dir()
    }

    /// 宿主
    pub fn host(&self) -> &Arc<dyn Host> {
        &self.host
    }

    // ==================== 日志 ====================

    pub fn log_info(&self, message: impl AsRef<str>) {
        self.host.log_info(&self.prefixed(message.as_ref()));
    }

    pub fn log_warning(&self, message: impl AsRef<str>) {
        self.host.log_warning(&self.prefixed(message.as_ref()));
    }

    pub fn log_error(&self, message: impl AsRef<str>) {
        self.host.log_error(&self.prefixed(message.as_ref()));
    }

    fn prefixed(&self, message: &str) -> String {
        format!("[{}] {}", self.module.name(), message)
    }

    /// 权限前缀：小写模块名加点号
    pub fn permission_prefix(&self) -> String {
        self.descriptor().permission_prefix()
    }

    /// 宿主配置的语言
    pub fn language(&self) -> String {
        self.host.configured_language()
    }

    /// 读取宿主配置值
    pub fn config_value(&self, key: &str) -> Option<Value> {
        self.host.config_value(key)
    }

    // ==================== 符号 ====================

    /// 解析符号
    ///
    /// 保留前缀下的名称只从宿主命名空间解析；其余名称先走模块自己的加载单元
    /// （私有缓存、跨模块符号表、本归档），找不到时再回落到宿主命名空间。
    pub async fn resolve(&self, name: &str) -> Option<Arc<Symbol>> {
        if !self.reserved_prefix.is_empty() && name.starts_with(&self.reserved_prefix) {
            return self.catalog.host_symbol(name);
        }

        let found = match self.module.unit() {
            LoadableUnit::Embedded(unit) => unit.find_symbol(name, true).await,
            LoadableUnit::HostManaged(_) => self.registry.lookup_symbol(name).await,
        };

        match found {
            Some(symbol) => Some(symbol),
            None => self.catalog.host_symbol(name),
        }
    }

    /// 解析符号，找不到时返回链接错误
    ///
    /// 在钩子中用 `?` 传播，模块会因此进入 INCOMPATIBLE
    pub async fn require(&self, name: &str) -> std::result::Result<Arc<Symbol>, HookError> {
        self.resolve(name)
            .await
            .ok_or_else(|| HookError::Link(LinkError::MissingSymbol(name.to_string())))
    }

    // ==================== 注册 ====================

    /// 注册命令，模块禁用时自动注销
    pub async fn register_command(&self, command: Arc<dyn Command>) {
        self.module.register_command(command, self.host.as_ref()).await;
    }

    /// 注册生命周期事件监听器，模块禁用时自动撤销
    ///
    /// # Returns
    ///
    /// 订阅 ID
    pub async fn register_listener(&self, reason: Option<Reason>, listener: ModuleListener) -> String {
        let id = self.events.subscribe(self.name(), reason, listener).await;
        self.registry.track_listener(self.name(), id.clone()).await;
        id
    }

    /// 注册请求处理器
    pub async fn register_request_handler(&self, handler: Arc<dyn RequestHandler>) {
        self.module.register_request_handler(handler).await;
    }

    // ==================== 跨模块 ====================

    /// 按名称查找其它模块
    pub async fn module(&self, name: &str) -> Option<Arc<ModuleHandle>> {
        self.registry.lookup_by_name(name).await
    }

    /// 向其它模块发送请求
    ///
    /// 模块不存在或没有对应处理器时返回 `None`
    pub async fn request(&self, module: &str, label: &str, meta: &HashMap<String, Value>) -> Option<Value> {
        let target = self.registry.lookup_by_name(module).await?;
        target.request(label, meta).await
    }

    /// 让模块保持 DISABLED
    ///
    /// 在 `on_enable` 中调用后，模块不会进入 ENABLED，也不会触发 ENABLE 事件
    pub async fn disable_self(&self) {
        debug!(module = %self.name(), "模块请求保持禁用");
        self.module.set_state(ModuleState::Disabled).await;
    }

    // ==================== 资源 ====================

    /// 读取归档中的资源
    pub fn resource(&self, path: &str) -> Option<&[u8]> {
        self.module.archive().entry(&normalize(path)?)
    }

    /// 把归档中的资源复制到数据目录
    ///
    /// # Arguments
    ///
    /// * `path` - 资源在归档中的路径
    /// * `replace` - 目标文件已存在时是否覆盖
    ///
    /// # Returns
    ///
    /// 目标文件路径
    pub async fn save_resource(&self, path: &str, replace: bool) -> Result<PathBuf> {
        let path = normalize(path).ok_or_else(|| outside_data_dir(path))?;
        self.copy_resource(&path, self.data_dir().join(&path), replace).await
    }

    /// 解析归档中的 YAML 资源，资源不存在时返回空映射
    pub fn yaml_resource(&self, path: &str) -> Result<serde_yaml::Value> {
        match self.resource(path) {
            Some(data) => Ok(serde_yaml::from_slice(data)?),
            None => Ok(serde_yaml::Value::Mapping(serde_yaml::Mapping::new())),
        }
    }

    /// 读取数据目录下的 `config.yml`
    ///
    /// 文件不存在时返回 `None`；格式错误会被记录并返回 `None`
    pub async fn load_config(&self) -> Option<serde_yaml::Value> {
        let path = self.data_dir().join(CONFIG_FILE);
        let content = tokio::fs::read_to_string(&path).await.ok()?;
        match serde_yaml::from_str(&content) {
            Ok(value) => Some(value),
            Err(e) => {
                self.log_error(format!("无法加载 {}: {}", CONFIG_FILE, e));
                None
            }
        }
    }

    /// 保存语言文件
    ///
    /// 把归档中的 `<lang_dir>/<language>.yml` 复制到数据目录的 `lang/<language>.yml`；
    /// 找不到宿主语言对应的文件时记录错误并改用 `<lang_dir>/<default>.yml`。
    ///
    /// # Returns
    ///
    /// 语言文件路径
    pub async fn save_lang(&self, lang_dir: &str, default_language: &str) -> Result<PathBuf> {
        let language = self.language();
        let lang_dir = normalize(lang_dir).ok_or_else(|| outside_data_dir(lang_dir))?;
        let lang_dir = lang_dir.trim_end_matches('/');
        let target = self.data_dir().join(LANG_DIR).join(format!("{}.yml", language));

        let wanted = format!("{}/{}.yml", lang_dir, language);
        if self.resource(&wanted).is_some() {
            return self.copy_resource(&wanted, target, false).await;
        }

        self.host.log_error(&format!(
            "Couldn't find the [{}] path for {} lang.",
            lang_dir, language
        ));
        self.host.log_error("Loading default..");
        let fallback = format!("{}/{}.yml", lang_dir, default_language);
        self.copy_resource(&fallback, target, false).await
    }

    async fn copy_resource(&self, entry: &str, target: PathBuf, replace: bool) -> Result<PathBuf> {
        if entry.is_empty() {
            return Err(CoreError::ResourceNotFound("资源路径不能为空".to_string()));
        }
        let data = self.resource(entry).ok_or_else(|| {
            CoreError::ResourceNotFound(format!("{} 不在 {} 中", entry, self.module.archive().file_name()))
        })?;

        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        if replace || !tokio::fs::try_exists(&target).await.unwrap_or(false) {
            tokio::fs::write(&target, data).await?;
            debug!(module = %self.name(), resource = %entry, target = %target.display(), "资源已保存");
        }
        Ok(target)
    }
}

/// 统一分隔符并去掉开头的 `/`
///
/// 含 `..` 或盘符的路径返回 `None`，结果总是落在数据目录之内
fn normalize(path: &str) -> Option<String> {
    let path = path.replace('\\', "/");
    let path = path.trim_start_matches('/');
    Path::new(path)
        .components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
        .then(|| path.to_string())
}

fn outside_data_dir(path: &str) -> CoreError {
    CoreError::ResourceNotFound(format!("资源路径 {} 超出模块数据目录", path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::testing::{NoopModule, RecordingHost};
    use crate::module::archive::ModuleArchive;
    use crate::module::loader::LoadingUnit;
    use crate::module::request::FnRequestHandler;
    use serde_json::json;
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        host: Arc<RecordingHost>,
        registry: Arc<ModuleRegistry>,
        events: Arc<EventChannel>,
        catalog: Arc<ModuleCatalog>,
    }

    impl Fixture {
        fn new(host: RecordingHost) -> Self {
            let mut catalog = ModuleCatalog::new();
            catalog.register_host_symbol("addon_host.api.Host", b"host".to_vec());
            catalog.register_host_symbol("shared.Util", b"host util".to_vec());
            Self {
                _dir: TempDir::new().unwrap(),
                host: Arc::new(host),
                registry: Arc::new(ModuleRegistry::new()),
                events: Arc::new(EventChannel::new()),
                catalog: Arc::new(catalog),
            }
        }

        async fn module(&self, name: &str, entries: Vec<(String, Vec<u8>)>) -> Arc<ModuleHandle> {
            let archive = Arc::new(ModuleArchive::from_entries(format!("{}.jar", name), entries));
            let unit = Arc::new(LoadingUnit::new(
                name,
                archive.clone(),
                "addon_host.",
                Arc::downgrade(self.registry.symbols()),
            ));
            self.registry.symbols().attach(unit.clone()).await;
            let handle = Arc::new(ModuleHandle::new(
                ModuleDescriptor::new(format!("addons.{}", name), name, "1.0"),
                archive,
                self._dir.path().join(name),
                LoadableUnit::Embedded(unit),
                Box::new(NoopModule),
            ));
            self.registry.register(handle.clone()).await.unwrap();
            handle
        }

        fn context(&self, module: Arc<ModuleHandle>) -> ModuleContext {
            ModuleContext::new(
                module,
                self.registry.clone(),
                self.events.clone(),
                self.host.clone(),
                self.catalog.clone(),
                "addon_host.",
            )
        }
    }

    fn sym(name: &str) -> (String, Vec<u8>) {
        (ModuleArchive::symbol_entry(name), name.as_bytes().to_vec())
    }

    #[tokio::test]
    async fn test_prefixed_logging() {
        let fixture = Fixture::new(RecordingHost::new());
        let ctx = fixture.context(fixture.module("Level", vec![]).await);

        ctx.log_info("ready");
        ctx.log_warning("slow");
        ctx.log_error("broken");

        assert_eq!(fixture.host.infos(), vec!["[Level] ready"]);
        assert_eq!(fixture.host.warnings(), vec!["[Level] slow"]);
        assert_eq!(fixture.host.errors(), vec!["[Level] broken"]);
        assert_eq!(ctx.permission_prefix(), "level.");
    }

    #[tokio::test]
    async fn test_resolve_across_modules() {
        let fixture = Fixture::new(RecordingHost::new());
        let bank = fixture.module("Bank", vec![sym("bank.Account")]).await;
        let shop = fixture.module("Shop", vec![sym("shop.Cart")]).await;
        let ctx = fixture.context(shop);

        let own = ctx.resolve("shop.Cart").await.unwrap();
        assert_eq!(own.origin(), "Shop");

        let foreign = ctx.resolve("bank.Account").await.unwrap();
        assert_eq!(foreign.origin(), "Bank");
        assert!(fixture.registry.symbols().contains("bank.Account").await);
        drop(bank);

        assert!(ctx.resolve("nobody.Ghost").await.is_none());
        assert!(matches!(
            ctx.require("nobody.Ghost").await,
            Err(HookError::Link(LinkError::MissingSymbol(_)))
        ));
    }

    #[tokio::test]
    async fn test_reserved_names_come_from_host() {
        let fixture = Fixture::new(RecordingHost::new());
        let rogue = fixture
            .module("Rogue", vec![sym("addon_host.api.Host"), sym("addon_host.api.Secret")])
            .await;
        let ctx = fixture.context(rogue);

        let host_symbol = ctx.resolve("addon_host.api.Host").await.unwrap();
        assert!(host_symbol.is_host_symbol());
        assert_eq!(host_symbol.data(), b"host");

        // 归档里有，但保留前缀下只看宿主命名空间
        assert!(ctx.resolve("addon_host.api.Secret").await.is_none());
    }

    #[tokio::test]
    async fn test_host_namespace_fallback() {
        let fixture = Fixture::new(RecordingHost::new());
        let ctx = fixture.context(fixture.module("Level", vec![]).await);

        let util = ctx.resolve("shared.Util").await.unwrap();
        assert!(util.is_host_symbol());
    }

    #[tokio::test]
    async fn test_listener_is_tracked() {
        let fixture = Fixture::new(RecordingHost::new());
        let ctx = fixture.context(fixture.module("Level", vec![]).await);

        let id = ctx
            .register_listener(Some(Reason::Enable), Arc::new(|_event: &mut crate::events::ModuleEvent| {}))
            .await;

        assert_eq!(fixture.registry.listeners_of("Level").await, vec![id]);
        assert_eq!(fixture.events.listener_count().await, 1);
    }

    #[tokio::test]
    async fn test_request_between_modules() {
        let fixture = Fixture::new(RecordingHost::new());
        let level = fixture.module("Level", vec![]).await;
        let warps = fixture.module("Warps", vec![]).await;

        fixture
            .context(level)
            .register_request_handler(Arc::new(FnRequestHandler::new(
                "island-level",
                |_meta: &HashMap<String, Value>| Some(json!(42)),
            )))
            .await;

        let ctx = fixture.context(warps);
        let meta = HashMap::new();
        assert_eq!(ctx.request("level", "ISLAND-LEVEL", &meta).await, Some(json!(42)));
        assert_eq!(ctx.request("level", "top-ten", &meta).await, None);
        assert_eq!(ctx.request("nobody", "island-level", &meta).await, None);
        assert!(ctx.module("LEVEL").await.is_some());
    }

    #[tokio::test]
    async fn test_disable_self() {
        let fixture = Fixture::new(RecordingHost::new());
        let module = fixture.module("Level", vec![]).await;
        module.set_state(ModuleState::Loaded).await;

        fixture.context(module.clone()).disable_self().await;
        assert_eq!(module.state().await, ModuleState::Disabled);
    }

    #[tokio::test]
    async fn test_save_resource() {
        let fixture = Fixture::new(RecordingHost::new());
        let module = fixture
            .module(
                "Level",
                vec![("config.yml".to_string(), b"top-ten: 10\n".to_vec())],
            )
            .await;
        let ctx = fixture.context(module);

        let saved = ctx.save_resource("config.yml", false).await.unwrap();
        assert_eq!(tokio::fs::read_to_string(&saved).await.unwrap(), "top-ten: 10\n");

        // 不覆盖已存在的文件
        tokio::fs::write(&saved, "top-ten: 5\n").await.unwrap();
        ctx.save_resource("config.yml", false).await.unwrap();
        assert_eq!(tokio::fs::read_to_string(&saved).await.unwrap(), "top-ten: 5\n");

        ctx.save_resource("config.yml", true).await.unwrap();
        assert_eq!(tokio::fs::read_to_string(&saved).await.unwrap(), "top-ten: 10\n");

        let config = ctx.load_config().await.unwrap();
        assert_eq!(config["top-ten"].as_i64(), Some(10));

        assert!(matches!(
            ctx.save_resource("missing.yml", false).await,
            Err(CoreError::ResourceNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_save_resource_stays_in_data_dir() {
        let fixture = Fixture::new(RecordingHost::new());
        let module = fixture
            .module(
                "Level",
                vec![
                    ("../../x".to_string(), b"escaped".to_vec()),
                    ("lang/../config.yml".to_string(), b"top-ten: 10\n".to_vec()),
                ],
            )
            .await;
        let ctx = fixture.context(module);

        for path in ["../../x", "lang/../config.yml", "/../x", "..\\..\\x"] {
            assert!(
                matches!(ctx.save_resource(path, true).await, Err(CoreError::ResourceNotFound(_))),
                "{} 不应被保存",
                path
            );
        }
        assert!(ctx.resource("../../x").is_none());
        assert!(matches!(
            ctx.save_lang("../locales", "en-US").await,
            Err(CoreError::ResourceNotFound(_))
        ));

        // 什么都没有写出
        assert_eq!(std::fs::read_dir(fixture._dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_yaml_resource() {
        let fixture = Fixture::new(RecordingHost::new());
        let module = fixture
            .module("Level", vec![("blocks.yml".to_string(), b"diamond: 100\n".to_vec())])
            .await;
        let ctx = fixture.context(module);

        assert_eq!(ctx.yaml_resource("blocks.yml").unwrap()["diamond"].as_i64(), Some(100));
        assert!(ctx.yaml_resource("absent.yml").unwrap().as_mapping().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_save_lang_falls_back_to_default() {
        let fixture = Fixture::new(RecordingHost::new().with_language("tr-TR"));
        let module = fixture
            .module(
                "Level",
                vec![("locales/en-US.yml".to_string(), b"hello: Hello\n".to_vec())],
            )
            .await;
        let ctx = fixture.context(module);

        let saved = ctx.save_lang("locales", "en-US").await.unwrap();
        assert!(saved.ends_with("lang/tr-TR.yml"));
        assert_eq!(tokio::fs::read_to_string(&saved).await.unwrap(), "hello: Hello\n");
        assert_eq!(fixture.host.errors().len(), 2);
    }

    #[tokio::test]
    async fn test_save_lang_uses_configured_language() {
        let fixture = Fixture::new(RecordingHost::new().with_language("tr-TR"));
        let module = fixture
            .module(
                "Level",
                vec![
                    ("locales/en-US.yml".to_string(), b"hello: Hello\n".to_vec()),
                    ("locales/tr-TR.yml".to_string(), b"hello: Merhaba\n".to_vec()),
                ],
            )
            .await;
        let ctx = fixture.context(module);

        let saved = ctx.save_lang("locales/", "en-US").await.unwrap();
        assert_eq!(tokio::fs::read_to_string(&saved).await.unwrap(), "hello: Merhaba\n");
        assert!(fixture.host.errors().is_empty());
    }
}
