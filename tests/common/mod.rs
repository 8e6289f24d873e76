//! 集成测试辅助
//!
//! - [`ArchiveBuilder`] 用 zip 写出真实的模块归档
//! - [`Journal`] 按顺序记录钩子调用
//! - [`ScriptedModule`] 按 [`Script`] 在指定钩子失败、panic、链接失败或注册服务

#![allow(dead_code)]

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use addon_host::api::host::Command;
use addon_host::api::testing::RecordingHost;
use addon_host::events::ModuleEvent;
use addon_host::module::{
    Hook, HookError, HookResult, LinkError, Module, ModuleArchive, ModuleCatalog, ModuleContext,
    ModuleManager,
};
use addon_host::ModuleConfig;
use async_trait::async_trait;
use zip::write::SimpleFileOptions;

pub const AUTHORS: &str = "alice, bob";

// ============================================================================
// 归档
// ============================================================================

/// 模块归档构建器
#[derive(Debug, Clone)]
pub struct ArchiveBuilder {
    main: String,
    name: String,
    version: String,
    depend: Vec<String>,
    softdepend: Vec<String>,
    extra: Vec<String>,
    raw_manifest: Option<String>,
    symbols: Vec<String>,
    resources: Vec<(String, Vec<u8>)>,
    host_manifest: bool,
}

impl ArchiveBuilder {
    /// 带入口符号的标准归档
    pub fn new(main: &str, name: &str) -> Self {
        Self {
            main: main.to_string(),
            name: name.to_string(),
            version: "1.0".to_string(),
            depend: Vec::new(),
            softdepend: Vec::new(),
            extra: Vec::new(),
            raw_manifest: None,
            symbols: vec![main.to_string()],
            resources: Vec::new(),
            host_manifest: false,
        }
    }

    /// 使用原样的描述文件内容，不带任何符号
    pub fn raw(manifest: &str) -> Self {
        let mut builder = Self::new("", "");
        builder.raw_manifest = Some(manifest.to_string());
        builder.symbols.clear();
        builder
    }

    pub fn version(mut self, version: &str) -> Self {
        self.version = version.to_string();
        self
    }

    pub fn depend(mut self, name: &str) -> Self {
        self.depend.push(name.to_string());
        self
    }

    pub fn soft_depend(mut self, name: &str) -> Self {
        self.softdepend.push(name.to_string());
        self
    }

    /// 追加一行（或多行）YAML
    pub fn line(mut self, yaml: &str) -> Self {
        self.extra.push(yaml.to_string());
        self
    }

    pub fn symbol(mut self, name: &str) -> Self {
        self.symbols.push(name.to_string());
        self
    }

    pub fn without_main_symbol(mut self) -> Self {
        let main = self.main.clone();
        self.symbols.retain(|s| *s != main);
        self
    }

    pub fn resource(mut self, path: &str, content: &[u8]) -> Self {
        self.resources.push((path.to_string(), content.to_vec()));
        self
    }

    /// 标记为宿主原生扩展
    pub fn host_manifest(mut self) -> Self {
        self.host_manifest = true;
        self
    }

    fn manifest(&self) -> String {
        if let Some(ref raw) = self.raw_manifest {
            return raw.clone();
        }

        let mut manifest = format!(
            "main: {}\nname: {}\nversion: '{}'\nauthors: [alice, bob]\n",
            self.main, self.name, self.version
        );
        if !self.depend.is_empty() {
            manifest.push_str(&format!("depend: {}\n", self.depend.join(", ")));
        }
        if !self.softdepend.is_empty() {
            manifest.push_str(&format!("softdepend: {}\n", self.softdepend.join(", ")));
        }
        for line in &self.extra {
            manifest.push_str(line);
            manifest.push('\n');
        }
        manifest
    }

    /// 写入 `dir/file`
    pub fn write(&self, dir: &Path, file: &str) -> PathBuf {
        std::fs::create_dir_all(dir).unwrap();
        let path = dir.join(file);
        std::fs::write(&path, self.to_bytes()).unwrap();
        path
    }

    /// 归档的字节内容
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut zip = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default();

        zip.start_file("addon.yml", options).unwrap();
        zip.write_all(self.manifest().as_bytes()).unwrap();

        if self.host_manifest {
            zip.start_file("host.yml", options).unwrap();
            zip.write_all(format!("name: {}\n", self.name).as_bytes()).unwrap();
        }
        for symbol in &self.symbols {
            zip.start_file(ModuleArchive::symbol_entry(symbol), options).unwrap();
            zip.write_all(symbol.as_bytes()).unwrap();
        }
        for (path, content) in &self.resources {
            zip.start_file(path.as_str(), options).unwrap();
            zip.write_all(content).unwrap();
        }

        zip.finish().unwrap().into_inner()
    }
}

// ============================================================================
// 调用记录
// ============================================================================

/// 按顺序记录的调用日志
#[derive(Debug, Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, entry: impl Into<String>) {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn contains(&self, entry: &str) -> bool {
        self.entries().iter().any(|e| e == entry)
    }

    pub fn count(&self, entry: &str) -> usize {
        self.entries().iter().filter(|e| *e == entry).count()
    }

    /// 第一次出现的位置
    pub fn position(&self, entry: &str) -> Option<usize> {
        self.entries().iter().position(|e| e == entry)
    }

    /// 以指定后缀结尾的记录，去掉后缀
    pub fn with_suffix(&self, suffix: &str) -> Vec<String> {
        self.entries()
            .iter()
            .filter_map(|e| e.strip_suffix(suffix).map(str::to_string))
            .collect()
    }
}

// ============================================================================
// 脚本化模块
// ============================================================================

/// 模块在各钩子中的行为
#[derive(Debug, Clone, Default)]
pub struct Script {
    pub fail_on: Option<Hook>,
    pub panic_on: Option<Hook>,
    pub link_error_on: Option<Hook>,
    /// `on_enable` 中必须解析到的符号
    pub require: Vec<String>,
    /// `on_enable` 耗时
    pub sleep: Option<Duration>,
    /// `on_enable` 中保持禁用
    pub disable_self: bool,
    /// `on_enable` 中注册的命令
    pub command: Option<String>,
    /// `on_enable` 中注册记录所有事件的监听器
    pub listen: bool,
}

impl Script {
    pub fn fail_on(hook: Hook) -> Self {
        Self {
            fail_on: Some(hook),
            ..Default::default()
        }
    }

    pub fn panic_on(hook: Hook) -> Self {
        Self {
            panic_on: Some(hook),
            ..Default::default()
        }
    }

    pub fn link_error_on(hook: Hook) -> Self {
        Self {
            link_error_on: Some(hook),
            ..Default::default()
        }
    }

    pub fn command(name: &str) -> Self {
        Self {
            command: Some(name.to_string()),
            ..Default::default()
        }
    }
}

/// 测试命令
pub struct TestCommand(pub String);

impl Command for TestCommand {
    fn name(&self) -> &str {
        &self.0
    }

    fn execute(&self, _args: &[String]) -> anyhow::Result<()> {
        Ok(())
    }
}

/// 按脚本运行的模块，每次钩子调用记录为 `name:hook`
pub struct ScriptedModule {
    name: String,
    journal: Journal,
    script: Script,
}

impl ScriptedModule {
    pub fn new(name: &str, journal: &Journal, script: Script) -> Self {
        Self {
            name: name.to_string(),
            journal: journal.clone(),
            script,
        }
    }

    async fn run(&mut self, hook: Hook, ctx: &ModuleContext) -> HookResult {
        self.journal.record(format!("{}:{}", self.name, hook));

        if self.script.panic_on == Some(hook) {
            panic!("{} exploded in {}", self.name, hook);
        }
        if self.script.link_error_on == Some(hook) {
            return Err(LinkError::MissingMethod("Island.getOwner".to_string()).into());
        }
        if self.script.fail_on == Some(hook) {
            return Err(HookError::Failed(anyhow::anyhow!("{} failed in {}", self.name, hook)));
        }

        if hook == Hook::Enable {
            for symbol in &self.script.require {
                ctx.require(symbol).await?;
            }
            if let Some(duration) = self.script.sleep {
                tokio::time::sleep(duration).await;
            }
            if let Some(ref command) = self.script.command {
                ctx.register_command(Arc::new(TestCommand(command.clone()))).await;
            }
            if self.script.listen {
                let journal = self.journal.clone();
                let name = self.name.clone();
                ctx.register_listener(
                    None,
                    Arc::new(move |event: &mut ModuleEvent| {
                        journal.record(format!("{} saw {} {}", name, event.reason, event.module_name()));
                    }),
                )
                .await;
            }
            if self.script.disable_self {
                ctx.disable_self().await;
            }
            self.journal.record(format!("{}:{}:done", self.name, hook));
        }
        Ok(())
    }
}

#[async_trait]
impl Module for ScriptedModule {
    async fn on_load(&mut self, ctx: &ModuleContext) -> HookResult {
        self.run(Hook::Load, ctx).await
    }

    async fn on_enable(&mut self, ctx: &ModuleContext) -> HookResult {
        self.run(Hook::Enable, ctx).await
    }

    async fn on_disable(&mut self, ctx: &ModuleContext) -> HookResult {
        self.run(Hook::Disable, ctx).await
    }

    async fn on_reload(&mut self, ctx: &ModuleContext) -> HookResult {
        self.run(Hook::Reload, ctx).await
    }

    async fn all_loaded(&mut self, ctx: &ModuleContext) -> HookResult {
        self.run(Hook::AllLoaded, ctx).await
    }
}

/// 登记一个脚本化模块
pub fn scripted(catalog: &mut ModuleCatalog, main: &str, name: &str, journal: &Journal, script: Script) {
    let name = name.to_string();
    let journal = journal.clone();
    catalog.register_module(main, move || -> Box<dyn Module> {
        Box::new(ScriptedModule {
            name: name.clone(),
            journal: journal.clone(),
            script: script.clone(),
        })
    });
}

/// 登记一个行为正常的脚本化模块
pub fn well_behaved(catalog: &mut ModuleCatalog, main: &str, name: &str, journal: &Journal) {
    scripted(catalog, main, name, journal, Script::default());
}

// ============================================================================
// 管理器
// ============================================================================

/// 以 `dir` 为扩展目录、默认配置创建管理器
pub fn manager(dir: &Path, host: &Arc<RecordingHost>, catalog: ModuleCatalog) -> ModuleManager {
    ModuleManager::new(ModuleConfig::default(), dir, host.clone(), catalog)
}

/// 指定宿主 API 版本创建管理器
pub fn manager_with_api(
    dir: &Path,
    host: &Arc<RecordingHost>,
    catalog: ModuleCatalog,
    api_version: &str,
) -> ModuleManager {
    let config = ModuleConfig {
        api_version: api_version.to_string(),
        ..Default::default()
    };
    ModuleManager::new(config, dir, host.clone(), catalog)
}

/// 目录中的文件名，按文件系统列举顺序
pub fn listing_order(dir: &Path) -> Vec<String> {
    std::fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect()
}

/// 已注册模块名（按加载顺序）
pub async fn module_names(manager: &ModuleManager) -> Vec<String> {
    manager
        .modules()
        .await
        .iter()
        .map(|m| m.name().to_string())
        .collect()
}
