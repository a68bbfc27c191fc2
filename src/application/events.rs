//! 客户端事件
//!
//! 发送管线与快照泵通过广播通道通知展示层重新渲染。

use serde::Serialize;
use tokio::sync::broadcast;

use crate::domain::model::{LocalId, RoomId, StoreId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatEvent {
    /// 乐观消息已入队
    Enqueued { room_id: RoomId, local_id: LocalId },
    /// 持久化失败，已安排自动重试
    RetryScheduled {
        room_id: RoomId,
        local_id: LocalId,
        next_attempt: u32,
        delay_ms: u64,
    },
    /// 存储已确认（append 返回）
    Persisted {
        room_id: RoomId,
        local_id: LocalId,
        store_id: StoreId,
    },
    /// 消息进入失败状态
    Failed {
        room_id: RoomId,
        local_id: LocalId,
        error: String,
    },
    /// 收到并处理了一次快照
    SnapshotApplied {
        room_id: RoomId,
        confirmed: usize,
        retired: Vec<LocalId>,
    },
    /// 用户撤回了未确认的消息
    Retracted { room_id: RoomId, local_id: LocalId },
}

impl ChatEvent {
    pub fn room_id(&self) -> &RoomId {
        match self {
            ChatEvent::Enqueued { room_id, .. }
            | ChatEvent::RetryScheduled { room_id, .. }
            | ChatEvent::Persisted { room_id, .. }
            | ChatEvent::Failed { room_id, .. }
            | ChatEvent::SnapshotApplied { room_id, .. }
            | ChatEvent::Retracted { room_id, .. } => room_id,
        }
    }
}

/// 事件广播
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<ChatEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChatEvent> {
        self.sender.subscribe()
    }

    /// 没有订阅者时丢弃事件
    pub fn emit(&self, event: ChatEvent) {
        let _ = self.sender.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_emit_without_subscribers_is_silent() {
        let bus = EventBus::new(4);
        bus.emit(ChatEvent::Enqueued {
            room_id: RoomId::new("messages"),
            local_id: LocalId::new("temp-1"),
        });

        let mut receiver = bus.subscribe();
        bus.emit(ChatEvent::Retracted {
            room_id: RoomId::new("messages"),
            local_id: LocalId::new("temp-1"),
        });
        let event = receiver.recv().await.unwrap();
        assert_eq!(event.room_id(), &RoomId::new("messages"));
    }

    #[test]
    fn test_event_serializes_with_type_tag() {
        let event = ChatEvent::Failed {
            room_id: RoomId::new("messages"),
            local_id: LocalId::new("temp-1"),
            error: "store unavailable: timeout".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "failed");
        assert_eq!(json["local_id"], "temp-1");
    }
}
