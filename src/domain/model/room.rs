//! 聊天室领域模型

use serde::{Deserialize, Serialize};
use std::fmt;

/// 房间ID
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(String);

impl RoomId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 房间类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomKind {
    /// 公共聊天室
    Public,
    /// 双人私聊
    Direct,
}

/// 会话目标房间（由展示层选择）
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomTarget {
    Public,
    Direct { peer_id: String },
}

/// 已解析的房间描述
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoomDescriptor {
    pub room_id: RoomId,
    pub kind: RoomKind,
    pub title: String,
}

impl RoomDescriptor {
    pub fn is_direct(&self) -> bool {
        self.kind == RoomKind::Direct
    }
}

/// 用户资料（联系人列表、私聊对象）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub avatar_ref: Option<String>,
    #[serde(default)]
    pub last_seen: Option<chrono::DateTime<chrono::Utc>>,
}
