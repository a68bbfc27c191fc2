//! 消息领域模型
//!
//! 客户端可见的消息分为两类：
//! - Confirmed：存储服务已持久化，通过实时订阅推送回来的消息（只读）
//! - Optimistic：本地提交后立即展示、尚未被确认的消息（由发送管线原地修改）

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::room::RoomId;

/// 本地临时消息ID（会话内唯一，永不复用）
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LocalId(String);

impl LocalId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LocalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 存储服务分配的消息ID（房间内全局唯一）
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StoreId(String);

impl StoreId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StoreId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 当前会话的发送者身份
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SenderIdentity {
    pub sender_id: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub avatar_ref: Option<String>,
}

impl SenderIdentity {
    pub fn new(sender_id: impl Into<String>) -> Self {
        Self {
            sender_id: sender_id.into(),
            display_name: None,
            avatar_ref: None,
        }
    }

    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = Some(display_name.into());
        self
    }

    pub fn with_avatar(mut self, avatar_ref: impl Into<String>) -> Self {
        self.avatar_ref = Some(avatar_ref.into());
        self
    }
}

/// 已确认消息
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmedMessage {
    pub store_id: StoreId,
    pub room_id: RoomId,
    pub text: String,
    pub sender_id: String,
    #[serde(default)]
    pub avatar_ref: Option<String>,
    /// 服务端时间戳，刚写入时可能尚未解析
    #[serde(default)]
    pub confirmed_at: Option<DateTime<Utc>>,
}

/// 乐观消息状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PendingStatus {
    /// 发送中
    Sending,
    /// 发送失败（等待手动重试）
    Failed,
}

impl PendingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PendingStatus::Sending => "sending",
            PendingStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for PendingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 乐观消息
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptimisticMessage {
    pub local_id: LocalId,
    pub room_id: RoomId,
    pub text: String,
    pub sender_id: String,
    #[serde(default)]
    pub avatar_ref: Option<String>,
    /// 本地提交时间
    pub created_at: DateTime<Utc>,
    pub status: PendingStatus,
    /// 已发起的持久化次数
    pub attempt: u32,
    #[serde(default)]
    pub last_error: Option<String>,
}

impl OptimisticMessage {
    /// 创建新的乐观消息（初始状态为 Sending，attempt = 0）
    pub fn new(
        local_id: LocalId,
        room_id: RoomId,
        text: impl Into<String>,
        sender: &SenderIdentity,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            local_id,
            room_id,
            text: text.into(),
            sender_id: sender.sender_id.clone(),
            avatar_ref: sender.avatar_ref.clone(),
            created_at,
            status: PendingStatus::Sending,
            attempt: 0,
            last_error: None,
        }
    }

    /// 原地应用补丁
    pub fn apply(&mut self, patch: &OptimisticPatch) {
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(attempt) = patch.attempt {
            self.attempt = attempt;
        }
        if let Some(last_error) = &patch.last_error {
            self.last_error = last_error.clone();
        }
    }
}

/// 乐观消息的部分更新
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OptimisticPatch {
    pub status: Option<PendingStatus>,
    pub attempt: Option<u32>,
    /// `Some(None)` 表示清除错误
    pub last_error: Option<Option<String>>,
}

impl OptimisticPatch {
    /// 记录新一次持久化尝试
    pub fn attempt(attempt: u32) -> Self {
        Self {
            attempt: Some(attempt),
            ..Self::default()
        }
    }

    /// Sending -> Failed
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: Some(PendingStatus::Failed),
            last_error: Some(Some(error.into())),
            ..Self::default()
        }
    }

    /// Failed -> Sending（手动重试，attempt 重置为 1）
    pub fn resend() -> Self {
        Self {
            status: Some(PendingStatus::Sending),
            attempt: Some(1),
            last_error: Some(None),
        }
    }
}

/// 提交给存储服务的消息负载
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingMessage {
    pub text: String,
    pub sender_id: String,
    #[serde(default)]
    pub avatar_ref: Option<String>,
    pub created_at_hint: DateTime<Utc>,
    /// 私聊房间必须携带房间ID，供存储端做访问控制
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room_id: Option<RoomId>,
}

/// 消息联合类型
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Message {
    Confirmed(ConfirmedMessage),
    Optimistic(OptimisticMessage),
}

impl Message {
    pub fn text(&self) -> &str {
        match self {
            Message::Confirmed(m) => &m.text,
            Message::Optimistic(m) => &m.text,
        }
    }

    pub fn sender_id(&self) -> &str {
        match self {
            Message::Confirmed(m) => &m.sender_id,
            Message::Optimistic(m) => &m.sender_id,
        }
    }
}
