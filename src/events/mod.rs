//! 生命周期事件
//!
//! - [`event`] - 事件数据结构与显式键值载荷
//! - [`bus`] - 按模块追踪订阅的同步事件通道

pub mod bus;
pub mod event;

pub use bus::{EventChannel, ModuleListener};
pub use event::{ModuleEvent, ModuleEventBuilder, Reason};
