//! 模块生命周期契约
//!
//! 定义模块必须实现的 [`Module`] trait、钩子错误分类，
//! 以及带 panic 隔离的钩子调用。钩子按顺序逐个 await，
//! 调用期间不持有任何注册表锁，因此钩子可以重入查询注册表。

use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::time::Instant;

use async_trait::async_trait;
use futures::FutureExt;
use thiserror::Error;
use tracing::{debug, Instrument};

use super::context::ModuleContext;
use super::instance::ModuleHandle;
use super::metadata::ModuleDescriptor;
use crate::utils::CoreError;

/// 生命周期钩子
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Hook {
    /// 加载
    Load,
    /// 启用
    Enable,
    /// 禁用
    Disable,
    /// 重载配置
    Reload,
    /// 全部加载完成后的通知
    AllLoaded,
}

impl fmt::Display for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Hook::Load => "onLoad",
            Hook::Enable => "onEnable",
            Hook::Disable => "onDisable",
            Hook::Reload => "onReload",
            Hook::AllLoaded => "allLoaded",
        };
        f.write_str(name)
    }
}

/// 链接错误：钩子运行时引用了不存在的符号
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LinkError {
    /// 找不到符号
    #[error("找不到符号 '{0}'")]
    MissingSymbol(String),

    /// 找不到方法
    #[error("找不到方法 '{0}'")]
    MissingMethod(String),

    /// 找不到字段
    #[error("找不到字段 '{0}'")]
    MissingField(String),
}

/// 钩子错误
#[derive(Error, Debug)]
pub enum HookError {
    /// 链接错误，模块会进入 INCOMPATIBLE
    #[error(transparent)]
    Link(#[from] LinkError),

    /// 其它失败，模块会进入 ERROR
    #[error(transparent)]
    Failed(#[from] anyhow::Error),

    /// 钩子 panic
    #[error("panic: {0}")]
    Panicked(String),
}

impl HookError {
    /// 转换为运行时错误，附带模块与作者信息
    pub fn into_core_error(self, descriptor: &ModuleDescriptor, hook: Hook) -> CoreError {
        match self {
            HookError::Link(source) => CoreError::BinaryIncompatibility {
                module: descriptor.name.clone(),
                authors: descriptor.authors.clone(),
                source,
            },
            HookError::Failed(e) => CoreError::UnhandledHook {
                module: descriptor.name.clone(),
                hook,
                reason: format!("{:#}", e),
            },
            HookError::Panicked(message) => CoreError::UnhandledHook {
                module: descriptor.name.clone(),
                hook,
                reason: format!("panic: {}", message),
            },
        }
    }
}

/// 钩子返回值
pub type HookResult = std::result::Result<(), HookError>;

/// 扩展模块
///
/// `on_enable` 与 `on_disable` 必须实现，其余钩子默认什么也不做。
/// 钩子通过 [`ModuleContext`] 访问宿主与注册表服务。
///
/// # Example
///
/// ```rust
/// use addon_host::module::{HookResult, Module, ModuleContext};
/// use async_trait::async_trait;
///
/// struct Warps;
///
/// #[async_trait]
/// impl Module for Warps {
///     async fn on_enable(&mut self, ctx: &ModuleContext) -> HookResult {
///         ctx.log_info("warp signs ready");
///         Ok(())
///     }
///
///     async fn on_disable(&mut self, _ctx: &ModuleContext) -> HookResult {
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait Module: Send + Sync {
    /// 加载时调用（宿主 API 版本检查通过之后）
    async fn on_load(&mut self, _ctx: &ModuleContext) -> HookResult {
        Ok(())
    }

    /// 启用时调用
    ///
    /// 调用 [`ModuleContext::disable_self`] 可让模块保持 DISABLED
    async fn on_enable(&mut self, ctx: &ModuleContext) -> HookResult;

    /// 禁用时调用，失败只会被记录
    async fn on_disable(&mut self, ctx: &ModuleContext) -> HookResult;

    /// 重载配置时调用
    async fn on_reload(&mut self, _ctx: &ModuleContext) -> HookResult {
        Ok(())
    }

    /// 整批模块加载并启用完成后调用
    async fn all_loaded(&mut self, _ctx: &ModuleContext) -> HookResult {
        Ok(())
    }
}

/// 提取 panic 消息
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "未知 panic".to_string()
    }
}

/// 调用模块钩子，panic 被捕获为 [`HookError::Panicked`]
pub(crate) async fn invoke(
    handle: &ModuleHandle,
    hook: Hook,
    ctx: &ModuleContext,
) -> HookResult {
    let span = crate::module_span!(handle.name(), hook);
    let started = Instant::now();

    let result = async {
        let mut instance = handle.instance().lock().await;
        let call = match hook {
            Hook::Load => instance.on_load(ctx),
            Hook::Enable => instance.on_enable(ctx),
            Hook::Disable => instance.on_disable(ctx),
            Hook::Reload => instance.on_reload(ctx),
            Hook::AllLoaded => instance.all_loaded(ctx),
        };

        match AssertUnwindSafe(call).catch_unwind().await {
            Ok(result) => result,
            Err(payload) => Err(HookError::Panicked(panic_message(payload.as_ref()))),
        }
    }
    .instrument(span)
    .await;

    debug!(
        module = %handle.name(),
        hook = %hook,
        duration_ms = started.elapsed().as_millis() as u64,
        ok = result.is_ok(),
        "钩子调用结束"
    );
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hook_names() {
        assert_eq!(Hook::Load.to_string(), "onLoad");
        assert_eq!(Hook::AllLoaded.to_string(), "allLoaded");
    }

    #[test]
    fn test_classification() {
        let descriptor =
            ModuleDescriptor::new("a.Shop", "Shop", "1.0").with_authors(["alice", "bob"]);

        let link = HookError::from(LinkError::MissingMethod("Bank.deposit".to_string()))
            .into_core_error(&descriptor, Hook::Enable);
        assert!(link.is_incompatibility());
        assert!(link.to_string().contains("alice, bob"));

        let failed = HookError::from(anyhow::anyhow!("database offline"))
            .into_core_error(&descriptor, Hook::Load);
        assert!(matches!(failed, CoreError::UnhandledHook { hook: Hook::Load, .. }));
        assert!(failed.to_string().contains("database offline"));

        let panicked = HookError::Panicked("index out of bounds".to_string())
            .into_core_error(&descriptor, Hook::Enable);
        assert!(!panicked.is_incompatibility());
    }

    #[test]
    fn test_panic_message() {
        let payload = std::panic::catch_unwind(|| panic!("static message")).unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "static message");

        let payload = std::panic::catch_unwind(|| panic!("formatted {}", 42)).unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "formatted 42");
    }
}
