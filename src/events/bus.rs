//! 生命周期事件通道
//!
//! 监听器按订阅顺序同步地接收 [`ModuleEvent`]，可以读写事件载荷。
//! 每个订阅记录所属模块，禁用模块时按订阅 ID 精确撤销。
//! 单个监听器 panic 不影响其它监听器。

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, trace, warn};

use super::event::{ModuleEvent, Reason};
use crate::module::lifecycle::panic_message;
use crate::utils::{owner_of, subscription_id};

/// 事件监听器
pub type ModuleListener = Arc<dyn Fn(&mut ModuleEvent) + Send + Sync>;

/// 内部订阅条目
#[derive(Clone)]
struct Subscription {
    /// 订阅唯一标识
    id: String,

    /// 只接收指定原因的事件，`None` 表示全部
    reason: Option<Reason>,

    /// 回调
    listener: ModuleListener,
}

impl Subscription {
    fn matches(&self, event: &ModuleEvent) -> bool {
        self.reason.map_or(true, |r| r == event.reason)
    }
}

/// 事件通道
#[derive(Default)]
pub struct EventChannel {
    subscriptions: RwLock<Vec<Subscription>>,
}

impl std::fmt::Debug for EventChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventChannel").finish_non_exhaustive()
    }
}

impl EventChannel {
    /// 创建事件通道
    pub fn new() -> Self {
        Self::default()
    }

    /// 订阅事件
    ///
    /// # Arguments
    ///
    /// * `owner` - 订阅者模块名
    /// * `reason` - 只接收指定原因的事件，`None` 表示全部
    /// * `listener` - 回调
    ///
    /// # Returns
    ///
    /// 订阅 ID，形如 `<owner>#<token>`
    pub async fn subscribe(&self, owner: &str, reason: Option<Reason>, listener: ModuleListener) -> String {
        let id = subscription_id(owner);
        self.subscriptions.write().await.push(Subscription {
            id: id.clone(),
            reason,
            listener,
        });

        debug!(subscription_id = %id, owner = %owner, reason = ?reason, "事件订阅成功");
        id
    }

    /// 取消订阅
    ///
    /// # Returns
    ///
    /// 订阅存在并被移除时返回 `true`；重复取消返回 `false`
    pub async fn unsubscribe(&self, id: &str) -> bool {
        let mut subscriptions = self.subscriptions.write().await;
        let before = subscriptions.len();
        subscriptions.retain(|s| s.id != id);
        let removed = subscriptions.len() != before;

        if removed {
            debug!(subscription_id = %id, "取消订阅成功");
        }
        removed
    }

    /// 取消某个模块的所有订阅
    ///
    /// # Returns
    ///
    /// 取消的订阅数量
    pub async fn unsubscribe_all(&self, owner: &str) -> usize {
        let owner = owner.to_lowercase();
        let mut subscriptions = self.subscriptions.write().await;
        let before = subscriptions.len();
        subscriptions.retain(|s| owner_of(&s.id) != Some(owner.as_str()));
        before - subscriptions.len()
    }

    /// 当前订阅数量
    pub async fn listener_count(&self) -> usize {
        self.subscriptions.read().await.len()
    }

    /// 清空所有订阅
    pub async fn clear(&self) {
        self.subscriptions.write().await.clear();
    }

    /// 同步发布事件
    ///
    /// 监听器按订阅顺序依次调用，后面的监听器能看到前面监听器对载荷的修改。
    /// 分发前先取快照，因此监听器在回调中增删订阅不会影响本次分发。
    ///
    /// # Returns
    ///
    /// 成功处理事件的监听器数量
    pub async fn publish(&self, event: &mut ModuleEvent) -> usize {
        let matching: Vec<Subscription> = self
            .subscriptions
            .read()
            .await
            .iter()
            .filter(|s| s.matches(event))
            .cloned()
            .collect();

        trace!(
            event_id = %event.event_id,
            module = %event.module_name(),
            reason = %event.reason,
            listeners = matching.len(),
            "发布事件"
        );

        let mut delivered = 0;
        for subscription in matching {
            let listener = subscription.listener.clone();
            match catch_unwind(AssertUnwindSafe(|| listener(event))) {
                Ok(()) => delivered += 1,
                Err(payload) => warn!(
                    subscription_id = %subscription.id,
                    event_id = %event.event_id,
                    "监听器处理事件时 panic: {}",
                    panic_message(payload.as_ref())
                ),
            }
        }
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::testing::detached_module;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_subscribe_and_publish() {
        let channel = EventChannel::new();
        let counter = Arc::new(AtomicUsize::new(0));

        let c = counter.clone();
        let id = channel
            .subscribe("Level", None, Arc::new(move |_event: &mut ModuleEvent| {
                c.fetch_add(1, Ordering::SeqCst);
            }))
            .await;
        assert!(id.starts_with("level#"));

        let mut event = ModuleEvent::new(detached_module("a.Warps", "Warps"), Reason::Enable);
        assert_eq!(channel.publish(&mut event).await, 1);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_reason_filter() {
        let channel = EventChannel::new();
        let counter = Arc::new(AtomicUsize::new(0));

        let c = counter.clone();
        channel
            .subscribe("Level", Some(Reason::Disable), Arc::new(move |_event: &mut ModuleEvent| {
                c.fetch_add(1, Ordering::SeqCst);
            }))
            .await;

        let module = detached_module("a.Warps", "Warps");
        channel.publish(&mut ModuleEvent::new(module.clone(), Reason::Enable)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 0);

        channel.publish(&mut ModuleEvent::new(module, Reason::Disable)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_listeners_mutate_payload_in_order() {
        let channel = EventChannel::new();
        channel
            .subscribe("A", None, Arc::new(|event: &mut ModuleEvent| {
                event.set("count", 1);
            }))
            .await;
        channel
            .subscribe("B", None, Arc::new(|event: &mut ModuleEvent| {
                let count = event.get("count").and_then(|v| v.as_i64()).unwrap_or(0);
                event.set("count", count + 1);
            }))
            .await;

        let mut event = ModuleEvent::new(detached_module("a.Warps", "Warps"), Reason::Load);
        channel.publish(&mut event).await;
        assert_eq!(event.get("count"), Some(&json!(2)));
    }

    #[tokio::test]
    async fn test_panicking_listener_is_isolated() {
        let channel = EventChannel::new();
        let counter = Arc::new(AtomicUsize::new(0));

        channel
            .subscribe("Broken", None, Arc::new(|_event: &mut ModuleEvent| {
                panic!("listener exploded");
            }))
            .await;
        let c = counter.clone();
        channel
            .subscribe("Healthy", None, Arc::new(move |_event: &mut ModuleEvent| {
                c.fetch_add(1, Ordering::SeqCst);
            }))
            .await;

        let mut event = ModuleEvent::new(detached_module("a.Warps", "Warps"), Reason::Enable);
        assert_eq!(channel.publish(&mut event).await, 1);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unsubscribe() {
        let channel = EventChannel::new();
        let noop: ModuleListener = Arc::new(|_event: &mut ModuleEvent| {});

        let first = channel.subscribe("Level", None, noop.clone()).await;
        channel.subscribe("level", None, noop.clone()).await;
        channel.subscribe("Warps", None, noop).await;
        assert_eq!(channel.listener_count().await, 3);

        assert!(channel.unsubscribe(&first).await);
        assert!(!channel.unsubscribe(&first).await);
        assert_eq!(channel.unsubscribe_all("LEVEL").await, 1);
        assert_eq!(channel.listener_count().await, 1);

        channel.clear().await;
        assert_eq!(channel.listener_count().await, 0);
    }
}
