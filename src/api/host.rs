//! 宿主协作接口
//!
//! 运行时对宿主应用的全部依赖都通过 [`Host`] 注入：日志、配置读取、
//! 命令注册、权限注册和事件发布。[`TracingHost`] 是默认实现，
//! 把日志转发给 `tracing`，命令与权限保存在内存中。

use std::collections::BTreeMap;
use std::error::Error as StdError;
use std::sync::{Arc, Mutex, PoisonError};

use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::core::config::CoreConfig;
use crate::events::ModuleEvent;
use crate::module::metadata::PermissionDefault;
use crate::utils::{CoreError, Result};

/// 用户可调用的命令对象
pub trait Command: Send + Sync {
    /// 命令名
    fn name(&self) -> &str;

    /// 命令说明
    fn description(&self) -> &str {
        ""
    }

    /// 执行命令
    fn execute(&self, args: &[String]) -> anyhow::Result<()>;
}

/// 宿主应用
pub trait Host: Send + Sync {
    /// 记录信息日志
    fn log_info(&self, message: &str);

    /// 记录警告日志
    fn log_warning(&self, message: &str);

    /// 记录错误日志
    fn log_error(&self, message: &str);

    /// 记录错误及其来源链
    fn log_stacktrace(&self, error: &(dyn StdError + 'static));

    /// 宿主配置的语言，例如 `en-US`
    fn configured_language(&self) -> String;

    /// 读取已校验的配置值
    fn config_value(&self, key: &str) -> Option<Value>;

    /// 注册命令
    fn register_command(&self, command: Arc<dyn Command>);

    /// 注销命令
    fn unregister_command(&self, command: &Arc<dyn Command>);

    /// 注册权限默认值与说明
    ///
    /// # Errors
    ///
    /// 宿主拒绝该权限（例如已存在同名权限）时返回错误
    fn register_permission_default(
        &self,
        name: &str,
        description: &str,
        default: PermissionDefault,
    ) -> Result<()>;

    /// 向宿主侧监听器发布生命周期事件
    fn publish_event(&self, event: &mut ModuleEvent);
}

/// 已注册的权限
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisteredPermission {
    /// 权限说明
    pub description: String,
    /// 默认授予级别
    pub default: PermissionDefault,
}

/// 基于 tracing 的默认宿主实现
pub struct TracingHost {
    config: CoreConfig,
    commands: Mutex<Vec<Arc<dyn Command>>>,
    permissions: Mutex<BTreeMap<String, RegisteredPermission>>,
}

impl std::fmt::Debug for TracingHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TracingHost")
            .field("language", &self.config.language)
            .field("commands", &self.command_names())
            .finish_non_exhaustive()
    }
}

impl TracingHost {
    /// 使用内核配置创建宿主
    pub fn new(config: CoreConfig) -> Self {
        Self {
            config,
            commands: Mutex::new(Vec::new()),
            permissions: Mutex::new(BTreeMap::new()),
        }
    }

    /// 已注册的命令名
    pub fn command_names(&self) -> Vec<String> {
        self.commands
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|c| c.name().to_string())
            .collect()
    }

    /// 执行已注册的命令
    ///
    /// # Errors
    ///
    /// 命令不存在或执行失败时返回错误
    pub fn execute(&self, name: &str, args: &[String]) -> Result<()> {
        let command = self
            .commands
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|c| c.name().eq_ignore_ascii_case(name))
            .cloned()
            .ok_or_else(|| CoreError::Internal(format!("未知命令: {}", name)))?;
        command.execute(args).map_err(CoreError::Other)
    }

    /// 查询已注册的权限
    pub fn permission(&self, name: &str) -> Option<RegisteredPermission> {
        self.permissions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// 已注册的权限数量
    pub fn permission_count(&self) -> usize {
        self.permissions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl Host for TracingHost {
    fn log_info(&self, message: &str) {
        info!(target: "addon_host::host", "{}", message);
    }

    fn log_warning(&self, message: &str) {
        warn!(target: "addon_host::host", "{}", message);
    }

    fn log_error(&self, message: &str) {
        error!(target: "addon_host::host", "{}", message);
    }

    fn log_stacktrace(&self, err: &(dyn StdError + 'static)) {
        let mut chain = vec![err.to_string()];
        let mut source = err.source();
        while let Some(cause) = source {
            chain.push(cause.to_string());
            source = cause.source();
        }
        error!(target: "addon_host::host", causes = ?chain, "{}", err);
    }

    fn configured_language(&self) -> String {
        self.config.language.clone()
    }

    fn config_value(&self, key: &str) -> Option<Value> {
        self.config.value(key)
    }

    fn register_command(&self, command: Arc<dyn Command>) {
        debug!(command = %command.name(), "注册命令");
        self.commands
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(command);
    }

    fn unregister_command(&self, command: &Arc<dyn Command>) {
        debug!(command = %command.name(), "注销命令");
        self.commands
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|c| !Arc::ptr_eq(c, command));
    }

    fn register_permission_default(
        &self,
        name: &str,
        description: &str,
        default: PermissionDefault,
    ) -> Result<()> {
        let mut permissions = self
            .permissions
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if permissions.contains_key(name) {
            return Err(CoreError::Internal(format!("权限 {} 已存在", name)));
        }
        permissions.insert(
            name.to_string(),
            RegisteredPermission {
                description: description.to_string(),
                default,
            },
        );
        Ok(())
    }

    fn publish_event(&self, event: &mut ModuleEvent) {
        debug!(
            event_id = %event.event_id,
            module = %event.module_name(),
            reason = %event.reason,
            "生命周期事件"
        );
    }
}
