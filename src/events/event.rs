//! 生命周期事件
//!
//! 模块在 LOAD / ENABLE / DISABLE 时发布 [`ModuleEvent`]，携带一个可被监听器
//! 读写的键值载荷。载荷通过显式的 [`ModuleEvent::to_map`] / [`ModuleEvent::from_map`]
//! 与外部交换，只有 `keyValues` 可写，其余字段只读。

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::module::instance::ModuleHandle;
use crate::utils::generate_uuid;

/// 载荷中模块名的键
pub const KEY_MODULE: &str = "module";
/// 载荷中原因的键
pub const KEY_REASON: &str = "reason";
/// 载荷中事件 ID 的键
pub const KEY_EVENT_ID: &str = "eventId";
/// 载荷中时间戳的键
pub const KEY_TIMESTAMP: &str = "timestamp";
/// 载荷中可写键值的键
pub const KEY_VALUES: &str = "keyValues";

/// 事件原因
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Reason {
    /// 模块加载
    Load,
    /// 模块启用
    Enable,
    /// 模块禁用
    Disable,
    /// 其它
    #[default]
    Unknown,
}

impl Reason {
    /// 从名称解析（不区分大小写），无法识别时为 `Unknown`
    pub fn from_name(name: &str) -> Self {
        match name.to_ascii_uppercase().as_str() {
            "LOAD" => Reason::Load,
            "ENABLE" => Reason::Enable,
            "DISABLE" => Reason::Disable,
            _ => Reason::Unknown,
        }
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Reason::Load => "LOAD",
            Reason::Enable => "ENABLE",
            Reason::Disable => "DISABLE",
            Reason::Unknown => "UNKNOWN",
        };
        f.write_str(name)
    }
}

/// 模块生命周期事件
///
/// 同步构造、同步发布，分发给所有监听器后即丢弃。
#[derive(Debug, Clone)]
pub struct ModuleEvent {
    /// 事件唯一标识
    pub event_id: String,

    /// 触发事件的模块
    pub module: Arc<ModuleHandle>,

    /// 事件原因
    pub reason: Reason,

    /// 可读写的键值载荷
    pub key_values: Map<String, Value>,

    /// 替代本事件的新事件
    pub deprecated_by: Option<Box<ModuleEvent>>,

    /// 事件时间戳
    pub timestamp: DateTime<Utc>,
}

impl ModuleEvent {
    /// 创建事件
    pub fn new(module: Arc<ModuleHandle>, reason: Reason) -> Self {
        Self {
            event_id: generate_uuid(),
            module,
            reason,
            key_values: Map::new(),
            deprecated_by: None,
            timestamp: Utc::now(),
        }
    }

    /// 使用 Builder 模式构建事件
    pub fn builder(module: Arc<ModuleHandle>) -> ModuleEventBuilder {
        ModuleEventBuilder::new(module)
    }

    /// 触发事件的模块名
    pub fn module_name(&self) -> &str {
        self.module.name()
    }

    /// 读取载荷中的值
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.key_values.get(key)
    }

    /// 写入载荷，返回旧值
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.key_values.insert(key.into(), value.into())
    }

    /// 标记本事件已被新事件取代
    pub fn set_deprecated_by(&mut self, newer: ModuleEvent) {
        self.deprecated_by = Some(Box::new(newer));
    }

    /// 取代本事件的新事件
    pub fn newer_event(&self) -> Option<&ModuleEvent> {
        self.deprecated_by.as_deref()
    }

    /// 导出事件内容
    ///
    /// 包含只读的 `module` / `reason` / `eventId` / `timestamp`
    /// 以及可写的 `keyValues`
    pub fn to_map(&self) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert(KEY_MODULE.to_string(), Value::String(self.module.name().to_string()));
        map.insert(KEY_REASON.to_string(), Value::String(self.reason.to_string()));
        map.insert(KEY_EVENT_ID.to_string(), Value::String(self.event_id.clone()));
        map.insert(KEY_TIMESTAMP.to_string(), Value::String(self.timestamp.to_rfc3339()));
        map.insert(KEY_VALUES.to_string(), Value::Object(self.key_values.clone()));
        map
    }

    /// 回写事件内容
    ///
    /// 只处理 `keyValues`：其中的每个键覆盖载荷中的同名键，值为 `null` 时删除该键。
    /// 只读字段和未知键被忽略。
    ///
    /// # Returns
    ///
    /// 被写入或删除的键数量
    pub fn from_map(&mut self, map: &Map<String, Value>) -> usize {
        let Some(Value::Object(values)) = map.get(KEY_VALUES) else {
            return 0;
        };

        for (key, value) in values {
            if value.is_null() {
                self.key_values.remove(key);
            } else {
                self.key_values.insert(key.clone(), value.clone());
            }
        }
        values.len()
    }
}

/// 事件构建器
#[derive(Debug)]
pub struct ModuleEventBuilder {
    module: Arc<ModuleHandle>,
    reason: Reason,
    key_values: Map<String, Value>,
}

impl ModuleEventBuilder {
    pub fn new(module: Arc<ModuleHandle>) -> Self {
        Self {
            module,
            reason: Reason::Unknown,
            key_values: Map::new(),
        }
    }

    pub fn reason(mut self, reason: Reason) -> Self {
        self.reason = reason;
        self
    }

    pub fn key_value(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.key_values.insert(key.into(), value.into());
        self
    }

    pub fn key_values(mut self, key_values: Map<String, Value>) -> Self {
        self.key_values = key_values;
        self
    }

    pub fn build(self) -> ModuleEvent {
        let mut event = ModuleEvent::new(self.module, self.reason);
        event.key_values = self.key_values;
        event
    }
}
