//! 跨模块请求
//!
//! 模块可以按标签注册 [`RequestHandler`]，其它模块通过
//! [`ModuleRequest`] 按模块名与标签查询数据。标签不区分大小写。

use std::collections::HashMap;
use std::fmt;

use serde_json::Value;

use super::registry::ModuleRegistry;
use crate::utils::{CoreError, Result};

/// 请求处理器
pub trait RequestHandler: Send + Sync {
    /// 处理器标签（注册时按小写比较）
    fn label(&self) -> &str;

    /// 处理请求，无结果时返回 `None`
    fn handle(&self, meta: &HashMap<String, Value>) -> Option<Value>;
}

/// 基于闭包的请求处理器
pub struct FnRequestHandler<F> {
    label: String,
    handler: F,
}

impl<F> FnRequestHandler<F>
where
    F: Fn(&HashMap<String, Value>) -> Option<Value> + Send + Sync,
{
    /// 创建处理器，标签会被转为小写
    pub fn new(label: impl AsRef<str>, handler: F) -> Self {
        Self {
            label: label.as_ref().to_lowercase(),
            handler,
        }
    }
}

impl<F> RequestHandler for FnRequestHandler<F>
where
    F: Fn(&HashMap<String, Value>) -> Option<Value> + Send + Sync,
{
    fn label(&self) -> &str {
        &self.label
    }

    fn handle(&self, meta: &HashMap<String, Value>) -> Option<Value> {
        (self.handler)(meta)
    }
}

impl<F> fmt::Debug for FnRequestHandler<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnRequestHandler")
            .field("label", &self.label)
            .finish()
    }
}

/// 发往其它模块的请求
#[derive(Debug, Clone, PartialEq)]
pub struct ModuleRequest {
    module: String,
    label: String,
    meta: HashMap<String, Value>,
}

impl ModuleRequest {
    /// 创建请求构建器
    pub fn builder() -> ModuleRequestBuilder {
        ModuleRequestBuilder::default()
    }

    /// 目标模块名
    pub fn module(&self) -> &str {
        &self.module
    }

    /// 请求标签（小写）
    pub fn label(&self) -> &str {
        &self.label
    }

    /// 请求元数据
    pub fn meta(&self) -> &HashMap<String, Value> {
        &self.meta
    }

    /// 发送请求
    ///
    /// 目标模块不存在或没有对应处理器时返回 `None`
    pub async fn send(&self, registry: &ModuleRegistry) -> Option<Value> {
        let module = registry.lookup_by_name(&self.module).await?;
        module.request(&self.label, &self.meta).await
    }
}

/// 请求构建器
#[derive(Debug, Default)]
pub struct ModuleRequestBuilder {
    module: Option<String>,
    label: Option<String>,
    meta: HashMap<String, Value>,
}

impl ModuleRequestBuilder {
    /// 设置目标模块
    pub fn module(mut self, name: impl Into<String>) -> Self {
        self.module = Some(name.into());
        self
    }

    /// 设置标签
    pub fn label(mut self, label: impl AsRef<str>) -> Self {
        self.label = Some(label.as_ref().to_lowercase());
        self
    }

    /// 添加一项元数据
    pub fn meta(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.meta.insert(key.into(), value.into());
        self
    }

    /// 构建请求
    ///
    /// # Errors
    ///
    /// 未设置目标模块或标签时返回 `RequestFailed`
    pub fn build(self) -> Result<ModuleRequest> {
        let module = self
            .module
            .filter(|m| !m.trim().is_empty())
            .ok_or_else(|| CoreError::RequestFailed("请求缺少目标模块".to_string()))?;
        let label = self
            .label
            .filter(|l| !l.trim().is_empty())
            .ok_or_else(|| CoreError::RequestFailed("请求缺少标签".to_string()))?;

        Ok(ModuleRequest {
            module,
            label,
            meta: self.meta,
        })
    }

    /// 构建并发送请求
    pub async fn send(self, registry: &ModuleRegistry) -> Result<Option<Value>> {
        let request = self.build()?;
        Ok(request.send(registry).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_fn_handler_lowercases_label() {
        let handler = FnRequestHandler::new("Island-Level", |meta: &HashMap<String, Value>| {
            meta.get("player").map(|p| json!({ "player": p, "level": 42 }))
        });

        assert_eq!(handler.label(), "island-level");

        let mut meta = HashMap::new();
        meta.insert("player".to_string(), json!("alice"));
        assert_eq!(handler.handle(&meta).unwrap()["level"], 42);
        assert!(handler.handle(&HashMap::new()).is_none());
    }

    #[test]
    fn test_builder_requires_module_and_label() {
        let missing_module = ModuleRequest::builder().label("top").build();
        assert!(matches!(missing_module, Err(CoreError::RequestFailed(_))));

        let missing_label = ModuleRequest::builder().module("Level").build();
        assert!(matches!(missing_label, Err(CoreError::RequestFailed(_))));

        let request = ModuleRequest::builder()
            .module("Level")
            .label("TOP-Ten")
            .meta("world", "bskyblock_world")
            .build()
            .unwrap();
        assert_eq!(request.module(), "Level");
        assert_eq!(request.label(), "top-ten");
        assert_eq!(request.meta()["world"], json!("bskyblock_world"));
    }

    #[tokio::test]
    async fn test_send_to_unknown_module() {
        let registry = ModuleRegistry::new();
        let result = ModuleRequest::builder()
            .module("Nobody")
            .label("anything")
            .send(&registry)
            .await
            .unwrap();
        assert!(result.is_none());
    }
}
