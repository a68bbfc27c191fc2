//! 房间快照订阅
//!
//! 订阅对象持有 watch 接收端：存储侧总是发布完整窗口，
//! 慢消费者只会看到最新快照，不会积压旧窗口。

use std::sync::Arc;

use tokio::sync::watch;

use crate::domain::model::{ConfirmedMessage, RoomId};

/// 单次推送的完整窗口
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomSnapshot {
    pub room_id: RoomId,
    pub messages: Arc<Vec<ConfirmedMessage>>,
}

/// 可取消的快照订阅
#[derive(Debug)]
pub struct SnapshotSubscription {
    room_id: RoomId,
    receiver: watch::Receiver<Arc<Vec<ConfirmedMessage>>>,
    initial_delivered: bool,
}

impl SnapshotSubscription {
    pub fn new(room_id: RoomId, receiver: watch::Receiver<Arc<Vec<ConfirmedMessage>>>) -> Self {
        Self {
            room_id,
            receiver,
            initial_delivered: false,
        }
    }

    pub fn room_id(&self) -> &RoomId {
        &self.room_id
    }

    /// 等待下一次快照；首次调用立即返回订阅时的窗口。发布端关闭后返回 None
    pub async fn next(&mut self) -> Option<RoomSnapshot> {
        if self.initial_delivered {
            self.receiver.changed().await.ok()?;
        } else {
            self.initial_delivered = true;
        }

        let messages = self.receiver.borrow_and_update().clone();
        Some(RoomSnapshot {
            room_id: self.room_id.clone(),
            messages,
        })
    }

    /// 显式取消订阅
    pub fn unsubscribe(self) {
        tracing::debug!(room_id = %self.room_id, "Snapshot subscription cancelled");
        drop(self.receiver);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_initial_window_then_updates() {
        let (tx, rx) = watch::channel(Arc::new(Vec::new()));
        let mut subscription = SnapshotSubscription::new(RoomId::new("messages"), rx);

        let first = subscription.next().await.unwrap();
        assert!(first.messages.is_empty());

        let msg = ConfirmedMessage {
            store_id: crate::domain::model::StoreId::new("m1"),
            room_id: RoomId::new("messages"),
            text: "hi".to_string(),
            sender_id: "u1".to_string(),
            avatar_ref: None,
            confirmed_at: None,
        };
        tx.send(Arc::new(vec![msg])).unwrap();

        let second = subscription.next().await.unwrap();
        assert_eq!(second.messages.len(), 1);

        drop(tx);
        assert!(subscription.next().await.is_none());
    }

    #[tokio::test]
    async fn test_unsubscribe_closes_publisher() {
        let (tx, rx) = watch::channel(Arc::new(Vec::new()));
        let subscription = SnapshotSubscription::new(RoomId::new("messages"), rx);

        subscription.unsubscribe();
        assert!(tx.is_closed());
    }
}
