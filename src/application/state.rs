//! 会话内共享状态
//!
//! 每个房间独立维护待确认队列、最近一次快照与核销台账。
//! 所有修改都在 `SharedChatState::with` 的同步闭包内完成，锁不会跨越 await。

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use crate::domain::model::{ConfirmedMessage, LocalId, RoomDescriptor, RoomId};
use crate::domain::service::{ConfirmationLedger, PendingQueue};

/// 单个房间的状态
#[derive(Debug, Clone)]
pub struct RoomState {
    pub descriptor: RoomDescriptor,
    pub queue: PendingQueue,
    /// 最近一次推送的完整窗口
    pub confirmed: Arc<Vec<ConfirmedMessage>>,
    pub ledger: ConfirmationLedger,
    /// 本房间最近一次发送失败的错误（在本房间提交新消息时清除）
    pub send_error: Option<String>,
}

impl RoomState {
    pub fn new(descriptor: RoomDescriptor) -> Self {
        Self {
            descriptor,
            queue: PendingQueue::new(),
            confirmed: Arc::new(Vec::new()),
            ledger: ConfirmationLedger::default(),
            send_error: None,
        }
    }
}

#[derive(Debug, Default)]
pub struct ChatState {
    rooms: HashMap<RoomId, RoomState>,
    active: Option<RoomId>,
}

impl ChatState {
    /// 获取房间状态，不存在时创建
    pub fn room_entry(&mut self, descriptor: &RoomDescriptor) -> &mut RoomState {
        self.rooms
            .entry(descriptor.room_id.clone())
            .or_insert_with(|| RoomState::new(descriptor.clone()))
    }

    pub fn room(&self, room_id: &RoomId) -> Option<&RoomState> {
        self.rooms.get(room_id)
    }

    pub fn room_mut(&mut self, room_id: &RoomId) -> Option<&mut RoomState> {
        self.rooms.get_mut(room_id)
    }

    /// 查找持有该乐观消息的房间
    pub fn locate(&self, local_id: &LocalId) -> Option<&RoomState> {
        self.rooms.values().find(|room| room.queue.contains(local_id))
    }

    pub fn active_room(&self) -> Option<&RoomState> {
        self.active.as_ref().and_then(|room_id| self.rooms.get(room_id))
    }

    pub fn set_active(&mut self, room_id: Option<RoomId>) {
        self.active = room_id;
    }

    /// 当前房间的发送错误提示；其他房间的失败不会显示在这里
    pub fn send_error(&self) -> Option<&str> {
        self.active_room()
            .and_then(|room| room.send_error.as_deref())
    }

    /// 所有房间的待确认消息总数
    pub fn pending_total(&self) -> usize {
        self.rooms.values().map(|room| room.queue.len()).sum()
    }
}

/// 跨任务共享的会话状态
#[derive(Debug, Clone, Default)]
pub struct SharedChatState {
    inner: Arc<Mutex<ChatState>>,
}

impl SharedChatState {
    pub fn new() -> Self {
        Self::default()
    }

    /// 在锁内执行同步闭包
    pub fn with<R>(&self, f: impl FnOnce(&mut ChatState) -> R) -> R {
        let mut state = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut state)
    }
}
