//! 测试辅助
//!
//! [`RecordingHost`] 记录运行时对宿主的所有调用，便于断言日志内容、
//! 命令注册次数、权限与事件。[`detached_module`] 创建一个不属于任何
//! 注册表的模块记录。

use std::collections::HashSet;
use std::error::Error as StdError;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use async_trait::async_trait;
use serde_json::{Map, Value};

use super::host::{Command, Host};
use crate::events::{ModuleEvent, Reason};
use crate::module::archive::ModuleArchive;
use crate::module::context::ModuleContext;
use crate::module::instance::ModuleHandle;
use crate::module::lifecycle::{HookResult, Module};
use crate::module::loader::LoadingUnit;
use crate::module::metadata::{ModuleDescriptor, PermissionDefault};
use crate::module::runtime::LoadableUnit;
use crate::utils::{CoreError, Result};

/// 日志级别
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Warning,
    Error,
}

#[derive(Default)]
struct Records {
    logs: Vec<(LogLevel, String)>,
    stacktraces: Vec<String>,
    commands: Vec<Arc<dyn Command>>,
    command_registrations: usize,
    command_unregistrations: usize,
    permissions: Vec<(String, String, PermissionDefault)>,
    rejected_permissions: HashSet<String>,
    events: Vec<(String, Reason, Map<String, Value>)>,
}

/// 记录所有调用的宿主
pub struct RecordingHost {
    language: String,
    config: Map<String, Value>,
    records: Mutex<Records>,
}

impl Default for RecordingHost {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for RecordingHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordingHost")
            .field("language", &self.language)
            .finish_non_exhaustive()
    }
}

impl RecordingHost {
    pub fn new() -> Self {
        Self {
            language: "en-US".to_string(),
            config: Map::new(),
            records: Mutex::new(Records::default()),
        }
    }

    /// 设置宿主语言
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    /// 设置配置值
    pub fn with_config(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.config.insert(key.into(), value.into());
        self
    }

    /// 让指定权限注册失败
    pub fn reject_permission(self, name: impl Into<String>) -> Self {
        self.records().rejected_permissions.insert(name.into());
        self
    }

    fn records(&self) -> MutexGuard<'_, Records> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn logs_at(&self, level: LogLevel) -> Vec<String> {
        self.records()
            .logs
            .iter()
            .filter(|(l, _)| *l == level)
            .map(|(_, m)| m.clone())
            .collect()
    }

    /// 全部日志（按记录顺序）
    pub fn logs(&self) -> Vec<(LogLevel, String)> {
        self.records().logs.clone()
    }

    pub fn infos(&self) -> Vec<String> {
        self.logs_at(LogLevel::Info)
    }

    pub fn warnings(&self) -> Vec<String> {
        self.logs_at(LogLevel::Warning)
    }

    pub fn errors(&self) -> Vec<String> {
        self.logs_at(LogLevel::Error)
    }

    pub fn stacktraces(&self) -> Vec<String> {
        self.records().stacktraces.clone()
    }

    /// 包含指定片段的日志行数（所有级别）
    pub fn count_containing(&self, fragment: &str) -> usize {
        self.records()
            .logs
            .iter()
            .filter(|(_, m)| m.contains(fragment))
            .count()
    }

    /// 是否有日志行包含指定片段
    pub fn contains(&self, fragment: &str) -> bool {
        self.count_containing(fragment) > 0
    }

    /// 当前已注册的命令名
    pub fn command_names(&self) -> Vec<String> {
        self.records()
            .commands
            .iter()
            .map(|c| c.name().to_string())
            .collect()
    }

    /// 命令注册调用次数
    pub fn command_registrations(&self) -> usize {
        self.records().command_registrations
    }

    /// 命令注销调用次数
    pub fn command_unregistrations(&self) -> usize {
        self.records().command_unregistrations
    }

    /// 已注册的权限：(名称, 说明, 默认级别)
    pub fn permissions(&self) -> Vec<(String, String, PermissionDefault)> {
        self.records().permissions.clone()
    }

    /// 已注册的权限名
    pub fn permission_names(&self) -> Vec<String> {
        self.records()
            .permissions
            .iter()
            .map(|(name, _, _)| name.clone())
            .collect()
    }

    /// 收到的事件：(模块名, 原因)
    pub fn events(&self) -> Vec<(String, Reason)> {
        self.records()
            .events
            .iter()
            .map(|(module, reason, _)| (module.clone(), *reason))
            .collect()
    }

    /// 收到的事件载荷
    pub fn event_payloads(&self) -> Vec<Map<String, Value>> {
        self.records()
            .events
            .iter()
            .map(|(_, _, values)| values.clone())
            .collect()
    }
}

impl Host for RecordingHost {
    fn log_info(&self, message: &str) {
        self.records().logs.push((LogLevel::Info, message.to_string()));
    }

    fn log_warning(&self, message: &str) {
        self.records().logs.push((LogLevel::Warning, message.to_string()));
    }

    fn log_error(&self, message: &str) {
        self.records().logs.push((LogLevel::Error, message.to_string()));
    }

    fn log_stacktrace(&self, error: &(dyn StdError + 'static)) {
        self.records().stacktraces.push(error.to_string());
    }

    fn configured_language(&self) -> String {
        self.language.clone()
    }

    fn config_value(&self, key: &str) -> Option<Value> {
        self.config.get(key).cloned()
    }

    fn register_command(&self, command: Arc<dyn Command>) {
        let mut records = self.records();
        records.command_registrations += 1;
        records.commands.push(command);
    }

    fn unregister_command(&self, command: &Arc<dyn Command>) {
        let mut records = self.records();
        records.command_unregistrations += 1;
        records.commands.retain(|c| !Arc::ptr_eq(c, command));
    }

    fn register_permission_default(
        &self,
        name: &str,
        description: &str,
        default: PermissionDefault,
    ) -> Result<()> {
        let mut records = self.records();
        if records.rejected_permissions.contains(name) {
            return Err(CoreError::Internal(format!("权限 {} 被拒绝", name)));
        }
        records
            .permissions
            .push((name.to_string(), description.to_string(), default));
        Ok(())
    }

    fn publish_event(&self, event: &mut ModuleEvent) {
        self.records().events.push((
            event.module_name().to_string(),
            event.reason,
            event.key_values.clone(),
        ));
    }
}

/// 什么也不做的模块
#[derive(Debug, Default)]
pub struct NoopModule;

#[async_trait]
impl Module for NoopModule {
    async fn on_enable(&mut self, _ctx: &ModuleContext) -> HookResult {
        Ok(())
    }

    async fn on_disable(&mut self, _ctx: &ModuleContext) -> HookResult {
        Ok(())
    }
}

/// 创建不属于任何注册表的嵌入式模块记录
pub fn detached_module(main: &str, name: &str) -> Arc<ModuleHandle> {
    let archive = Arc::new(ModuleArchive::from_entries(
        format!("{}.jar", name),
        [(ModuleArchive::symbol_entry(main), b"main".to_vec())],
    ));
    let unit = LoadingUnit::new(name, archive.clone(), "", Weak::new());
    Arc::new(ModuleHandle::new(
        ModuleDescriptor::new(main, name, "1.0"),
        archive,
        name,
        LoadableUnit::Embedded(Arc::new(unit)),
        Box::new(NoopModule),
    ))
}
