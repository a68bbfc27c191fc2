//! 展示序列条目

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::message::{Message, PendingStatus};

/// 投影后的单条展示消息
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DisplayEntry {
    /// 渲染键：已确认消息用 store_id，乐观消息用 local_id
    pub key: String,
    pub message: Message,
    /// 是否为当前会话用户发送（sent / received）
    pub is_own: bool,
}

impl DisplayEntry {
    pub fn is_pending(&self) -> bool {
        matches!(self.message, Message::Optimistic(_))
    }

    pub fn pending_status(&self) -> Option<PendingStatus> {
        match &self.message {
            Message::Optimistic(m) => Some(m.status),
            Message::Confirmed(_) => None,
        }
    }

    pub fn last_error(&self) -> Option<&str> {
        match &self.message {
            Message::Optimistic(m) => m.last_error.as_deref(),
            Message::Confirmed(_) => None,
        }
    }

    /// 展示时间；服务端时间戳尚未解析时为 None
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        match &self.message {
            Message::Confirmed(m) => m.confirmed_at,
            Message::Optimistic(m) => Some(m.created_at),
        }
    }
}
