//! 已注册模块的运行时记录
//!
//! [`ModuleHandle`] 由注册表独占持有，保存描述、状态、数据目录、
//! 归档、加载方式以及模块注册的命令和请求处理器。

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::{Mutex, RwLock};

use super::archive::ModuleArchive;
use super::lifecycle::Module;
use super::metadata::{ModuleDescriptor, ModuleInfo, ModuleState};
use super::request::RequestHandler;
use super::runtime::LoadableUnit;
use crate::api::host::{Command, Host};

#[derive(Debug, Default)]
struct Status {
    state: ModuleState,
    loaded_at: Option<DateTime<Utc>>,
    enabled_at: Option<DateTime<Utc>>,
    last_error: Option<String>,
}

/// 已注册的模块
pub struct ModuleHandle {
    descriptor: Arc<ModuleDescriptor>,
    archive: Arc<ModuleArchive>,
    data_dir: PathBuf,
    unit: LoadableUnit,
    instance: Mutex<Box<dyn Module>>,
    status: RwLock<Status>,
    commands: Mutex<Vec<Arc<dyn Command>>>,
    request_handlers: RwLock<HashMap<String, Arc<dyn RequestHandler>>>,
}

impl std::fmt::Debug for ModuleHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleHandle")
            .field("name", &self.descriptor.name)
            .field("version", &self.descriptor.version)
            .field("archive", &self.archive.path())
            .field("host_managed", &self.is_host_managed())
            .finish_non_exhaustive()
    }
}

impl ModuleHandle {
    /// 创建模块记录，初始状态为 DISABLED
    pub fn new(
        descriptor: ModuleDescriptor,
        archive: Arc<ModuleArchive>,
        data_dir: impl Into<PathBuf>,
        unit: LoadableUnit,
        instance: Box<dyn Module>,
    ) -> Self {
        Self {
            descriptor: Arc::new(descriptor),
            archive,
            data_dir: data_dir.into(),
            unit,
            instance: Mutex::new(instance),
            status: RwLock::new(Status::default()),
            commands: Mutex::new(Vec::new()),
            request_handlers: RwLock::new(HashMap::new()),
        }
    }

    /// 模块描述
    pub fn descriptor(&self) -> &ModuleDescriptor {
        &self.descriptor
    }

    /// 模块名
    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    /// 模块版本
    pub fn version(&self) -> &str {
        &self.descriptor.version
    }

    /// 模块归档
    pub fn archive(&self) -> &Arc<ModuleArchive> {
        &self.archive
    }

    /// 数据目录
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// 加载方式
    pub fn unit(&self) -> &LoadableUnit {
        &self.unit
    }

    /// 是否为宿主原生扩展
    pub fn is_host_managed(&self) -> bool {
        self.unit.is_host_managed()
    }

    pub(crate) fn instance(&self) -> &Mutex<Box<dyn Module>> {
        &self.instance
    }

    /// 当前状态
    pub async fn state(&self) -> ModuleState {
        self.status.read().await.state
    }

    /// 是否已启用
    pub async fn is_enabled(&self) -> bool {
        self.state().await == ModuleState::Enabled
    }

    /// 设置状态，并记录加载/启用时间
    pub async fn set_state(&self, state: ModuleState) {
        let mut status = self.status.write().await;
        match state {
            ModuleState::Loaded => status.loaded_at = Some(Utc::now()),
            ModuleState::Enabled => status.enabled_at = Some(Utc::now()),
            ModuleState::Disabled => status.enabled_at = None,
            _ => {}
        }
        status.state = state;
    }

    /// 记录失败原因
    pub async fn set_error(&self, state: ModuleState, message: impl Into<String>) {
        let mut status = self.status.write().await;
        status.state = state;
        status.last_error = Some(message.into());
    }

    /// 最后一次失败原因
    pub async fn last_error(&self) -> Option<String> {
        self.status.read().await.last_error.clone()
    }

    /// 运行时信息快照
    pub async fn info(&self) -> ModuleInfo {
        let status = self.status.read().await;
        ModuleInfo {
            descriptor: (*self.descriptor).clone(),
            state: status.state,
            archive: self.archive.path().to_path_buf(),
            data_dir: self.data_dir.clone(),
            host_managed: self.is_host_managed(),
            loaded_at: status.loaded_at,
            enabled_at: status.enabled_at,
            last_error: status.last_error.clone(),
        }
    }

    // ==================== 命令 ====================

    /// 注册命令到宿主，并记录在模块的命令列表中
    pub async fn register_command(&self, command: Arc<dyn Command>, host: &dyn Host) {
        host.register_command(command.clone());
        self.commands.lock().await.push(command);
    }

    /// 模块已注册的命令名
    pub async fn command_names(&self) -> Vec<String> {
        self.commands
            .lock()
            .await
            .iter()
            .map(|c| c.name().to_string())
            .collect()
    }

    /// 从宿主注销全部命令并清空命令列表
    ///
    /// # Returns
    ///
    /// 注销的命令数量；再次调用返回 0
    pub async fn unload_commands(&self, host: &dyn Host) -> usize {
        let commands: Vec<Arc<dyn Command>> = self.commands.lock().await.drain(..).collect();
        for command in &commands {
            host.unregister_command(command);
        }
        commands.len()
    }

    // ==================== 请求处理器 ====================

    /// 注册请求处理器，按小写标签去重，后注册的覆盖先注册的
    pub async fn register_request_handler(&self, handler: Arc<dyn RequestHandler>) {
        let label = handler.label().to_lowercase();
        self.request_handlers.write().await.insert(label, handler);
    }

    /// 处理来自其它模块的请求
    ///
    /// 没有对应标签的处理器时返回 `None`
    pub async fn request(&self, label: &str, meta: &HashMap<String, Value>) -> Option<Value> {
        let handler = self
            .request_handlers
            .read()
            .await
            .get(&label.to_lowercase())
            .cloned()?;
        handler.handle(meta)
    }

    /// 已注册的请求标签
    pub async fn request_labels(&self) -> Vec<String> {
        let mut labels: Vec<String> = self.request_handlers.read().await.keys().cloned().collect();
        labels.sort();
        labels
    }
}
