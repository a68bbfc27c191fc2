//! 内存消息存储
//!
//! 追加写、按房间分区，向订阅者推送最近 N 条的完整窗口。
//! 支持故障注入（临时故障 / 永久拒绝）、写入延迟和延迟解析服务端时间戳，
//! 用于测试与本地演示。

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::{debug, instrument};
use ulid::Ulid;

use crate::domain::model::{ConfirmedMessage, OutgoingMessage, RoomId, StoreId};
use crate::domain::repository::{Clock, MessageStore, SnapshotSubscription};
use crate::error::StoreError;

struct Subscriber {
    limit: usize,
    sender: watch::Sender<Arc<Vec<ConfirmedMessage>>>,
}

#[derive(Default)]
struct StoreInner {
    rooms: HashMap<RoomId, Vec<ConfirmedMessage>>,
    subscribers: HashMap<RoomId, Vec<Subscriber>>,
    faults: VecDeque<StoreError>,
    append_latency: Option<Duration>,
    defer_timestamps: bool,
}

pub struct InMemoryMessageStore {
    public_room_id: RoomId,
    clock: Arc<dyn Clock>,
    inner: Mutex<StoreInner>,
    append_calls: AtomicU64,
}

impl InMemoryMessageStore {
    pub fn new(public_room_id: impl Into<String>, clock: Arc<dyn Clock>) -> Self {
        Self {
            public_room_id: RoomId::new(public_room_id),
            clock,
            inner: Mutex::new(StoreInner::default()),
            append_calls: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, StoreInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 下一次 append 返回指定错误
    pub fn fail_next(&self, error: StoreError) {
        self.lock().faults.push_back(error);
    }

    /// 接下来 `count` 次 append 均返回指定错误
    pub fn fail_next_n(&self, count: usize, error: StoreError) {
        let mut inner = self.lock();
        for _ in 0..count {
            inner.faults.push_back(error.clone());
        }
    }

    /// 每次 append 在写入前等待的时长
    pub fn set_append_latency(&self, latency: Option<Duration>) {
        self.lock().append_latency = latency;
    }

    /// 开启后新写入的消息 `confirmed_at` 为空，直到 `resolve_timestamps`
    pub fn set_defer_timestamps(&self, defer: bool) {
        self.lock().defer_timestamps = defer;
    }

    /// 解析房间内所有未解析的服务端时间戳并推送
    pub fn resolve_timestamps(&self, room_id: &RoomId) {
        let now = self.clock.now();
        let mut inner = self.lock();
        if let Some(messages) = inner.rooms.get_mut(room_id) {
            for message in messages.iter_mut().filter(|m| m.confirmed_at.is_none()) {
                message.confirmed_at = Some(now);
            }
        }
        Self::publish(&mut inner, room_id);
    }

    /// 绕过故障注入直接写入（模拟其他会话的写入）
    pub fn seed_message(&self, room_id: &RoomId, message: OutgoingMessage) -> StoreId {
        let mut inner = self.lock();
        self.write(&mut inner, room_id, message)
    }

    /// 房间内全部消息（写入顺序）
    pub fn messages(&self, room_id: &RoomId) -> Vec<ConfirmedMessage> {
        self.lock().rooms.get(room_id).cloned().unwrap_or_default()
    }

    /// 累计 append 调用次数
    pub fn append_calls(&self) -> u64 {
        self.append_calls.load(Ordering::SeqCst)
    }

    /// 当前存活的订阅数
    pub fn subscriber_count(&self, room_id: &RoomId) -> usize {
        let mut inner = self.lock();
        match inner.subscribers.get_mut(room_id) {
            Some(subscribers) => {
                subscribers.retain(|s| !s.sender.is_closed());
                subscribers.len()
            }
            None => 0,
        }
    }

    fn validate(&self, room_id: &RoomId, message: &OutgoingMessage) -> Result<(), StoreError> {
        if message.text.trim().is_empty() {
            return Err(StoreError::Rejected("message text is empty".to_string()));
        }
        if room_id != &self.public_room_id && message.room_id.as_ref() != Some(room_id) {
            return Err(StoreError::Rejected(format!(
                "direct room {room_id} requires a matching room_id in the payload"
            )));
        }
        Ok(())
    }

    fn write(&self, inner: &mut StoreInner, room_id: &RoomId, message: OutgoingMessage) -> StoreId {
        let store_id = StoreId::new(Ulid::new().to_string());
        let confirmed_at = if inner.defer_timestamps {
            None
        } else {
            Some(self.clock.now())
        };

        inner
            .rooms
            .entry(room_id.clone())
            .or_default()
            .push(ConfirmedMessage {
                store_id: store_id.clone(),
                room_id: room_id.clone(),
                text: message.text,
                sender_id: message.sender_id,
                avatar_ref: message.avatar_ref,
                confirmed_at,
            });

        Self::publish(inner, room_id);
        store_id
    }

    fn window(messages: &[ConfirmedMessage], limit: usize) -> Vec<ConfirmedMessage> {
        let start = messages.len().saturating_sub(limit);
        messages[start..].to_vec()
    }

    fn publish(inner: &mut StoreInner, room_id: &RoomId) {
        let messages = inner.rooms.get(room_id).cloned().unwrap_or_default();
        if let Some(subscribers) = inner.subscribers.get_mut(room_id) {
            // 接收端已关闭的订阅直接清理
            subscribers.retain(|s| {
                s.sender
                    .send(Arc::new(Self::window(&messages, s.limit)))
                    .is_ok()
            });
        }
    }
}

#[async_trait]
impl MessageStore for InMemoryMessageStore {
    #[instrument(skip(self, message), fields(room_id = %room_id, sender_id = %message.sender_id))]
    async fn append(
        &self,
        room_id: &RoomId,
        message: OutgoingMessage,
    ) -> Result<StoreId, StoreError> {
        self.append_calls.fetch_add(1, Ordering::SeqCst);

        let latency = self.lock().append_latency;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let mut inner = self.lock();
        if let Some(fault) = inner.faults.pop_front() {
            debug!(error = %fault, "Injected store fault");
            return Err(fault);
        }
        self.validate(room_id, &message)?;

        let store_id = self.write(&mut inner, room_id, message);
        debug!(store_id = %store_id, "Message appended");
        Ok(store_id)
    }

    async fn subscribe(
        &self,
        room_id: &RoomId,
        limit: usize,
    ) -> Result<SnapshotSubscription, StoreError> {
        if limit == 0 {
            return Err(StoreError::Rejected("subscription limit must be positive".to_string()));
        }

        let mut inner = self.lock();
        let messages = inner.rooms.get(room_id).cloned().unwrap_or_default();
        let (sender, receiver) = watch::channel(Arc::new(Self::window(&messages, limit)));
        inner
            .subscribers
            .entry(room_id.clone())
            .or_default()
            .push(Subscriber { limit, sender });

        debug!(room_id = %room_id, limit, "Room subscription opened");
        Ok(SnapshotSubscription::new(room_id.clone(), receiver))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::SystemClock;
    use chrono::Utc;

    fn store() -> InMemoryMessageStore {
        InMemoryMessageStore::new("messages", Arc::new(SystemClock))
    }

    fn outgoing(sender: &str, text: &str, room_id: Option<&str>) -> OutgoingMessage {
        OutgoingMessage {
            text: text.to_string(),
            sender_id: sender.to_string(),
            avatar_ref: None,
            created_at_hint: Utc::now(),
            room_id: room_id.map(RoomId::new),
        }
    }

    #[tokio::test]
    async fn test_append_and_window_limit() {
        let store = store();
        let room = RoomId::new("messages");
        for i in 0..5 {
            store.append(&room, outgoing("u1", &format!("m{i}"), None)).await.unwrap();
        }

        let mut subscription = store.subscribe(&room, 3).await.unwrap();
        let snapshot = subscription.next().await.unwrap();
        let texts: Vec<_> = snapshot.messages.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, vec!["m2", "m3", "m4"]);

        store.append(&room, outgoing("u2", "m5", None)).await.unwrap();
        let snapshot = subscription.next().await.unwrap();
        let texts: Vec<_> = snapshot.messages.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, vec!["m3", "m4", "m5"]);
    }

    #[tokio::test]
    async fn test_direct_room_requires_room_id() {
        let store = store();
        let room = RoomId::new("alice_bob");

        let missing = store.append(&room, outgoing("alice", "hi", None)).await;
        assert!(matches!(missing, Err(StoreError::Rejected(_))));

        let wrong = store.append(&room, outgoing("alice", "hi", Some("alice_carol"))).await;
        assert!(matches!(wrong, Err(StoreError::Rejected(_))));

        let ok = store.append(&room, outgoing("alice", "hi", Some("alice_bob"))).await;
        assert!(ok.is_ok());
        assert_eq!(store.messages(&room).len(), 1);
    }

    #[tokio::test]
    async fn test_fault_injection_is_consumed_in_order() {
        let store = store();
        let room = RoomId::new("messages");
        store.fail_next(StoreError::Transient("timeout".to_string()));
        store.fail_next(StoreError::Rejected("denied".to_string()));

        let first = store.append(&room, outgoing("u1", "hi", None)).await;
        let second = store.append(&room, outgoing("u1", "hi", None)).await;
        let third = store.append(&room, outgoing("u1", "hi", None)).await;

        assert_eq!(first, Err(StoreError::Transient("timeout".to_string())));
        assert_eq!(second, Err(StoreError::Rejected("denied".to_string())));
        assert!(third.is_ok());
        assert_eq!(store.append_calls(), 3);
    }

    #[tokio::test]
    async fn test_deferred_timestamps_resolve_later() {
        let store = store();
        let room = RoomId::new("messages");
        store.set_defer_timestamps(true);
        store.append(&room, outgoing("u1", "hi", None)).await.unwrap();
        assert!(store.messages(&room)[0].confirmed_at.is_none());

        store.resolve_timestamps(&room);
        assert!(store.messages(&room)[0].confirmed_at.is_some());
    }

    #[tokio::test]
    async fn test_closed_subscriptions_are_pruned() {
        let store = store();
        let room = RoomId::new("messages");
        let subscription = store.subscribe(&room, 25).await.unwrap();
        assert_eq!(store.subscriber_count(&room), 1);

        subscription.unsubscribe();
        assert_eq!(store.subscriber_count(&room), 0);
    }
}
