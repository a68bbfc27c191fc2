//! 房间选择
//!
//! 公共房间使用固定ID；私聊房间ID由双方用户ID排序后拼接，
//! 保证双方无论谁发起都得到同一个房间。
//! 用户ID中的 `%` 与 `_` 会被转义，拼接结果中只有一个分隔符。

use std::borrow::Cow;

use crate::domain::model::{RoomDescriptor, RoomId, RoomKind, RoomTarget, SenderIdentity};
use crate::domain::repository::UserDirectory;
use crate::error::{ChatError, ChatResult};

/// 私聊房间ID分隔符
pub const DIRECT_ROOM_SEPARATOR: &str = "_";

/// 计算双人私聊房间ID（与参数顺序无关）
pub fn room_id_for(a: &str, b: &str) -> RoomId {
    let (first, second) = if a <= b { (a, b) } else { (b, a) };
    RoomId::new(format!(
        "{}{DIRECT_ROOM_SEPARATOR}{}",
        escape_participant(first),
        escape_participant(second)
    ))
}

fn escape_participant(user_id: &str) -> Cow<'_, str> {
    if !user_id.contains(['%', '_']) {
        return Cow::Borrowed(user_id);
    }
    Cow::Owned(user_id.replace('%', "%25").replace('_', "%5F"))
}

#[derive(Debug, Clone)]
pub struct RoomSelector {
    public_room_id: RoomId,
    public_title: String,
}

impl RoomSelector {
    pub fn new(public_room_id: impl Into<String>, public_title: impl Into<String>) -> Self {
        Self {
            public_room_id: RoomId::new(public_room_id),
            public_title: public_title.into(),
        }
    }

    pub fn public_room(&self) -> RoomDescriptor {
        RoomDescriptor {
            room_id: self.public_room_id.clone(),
            kind: RoomKind::Public,
            title: self.public_title.clone(),
        }
    }

    /// 解析目标房间；私聊对象需在用户目录中存在
    pub async fn resolve(
        &self,
        me: &SenderIdentity,
        target: &RoomTarget,
        directory: &dyn UserDirectory,
    ) -> ChatResult<RoomDescriptor> {
        match target {
            RoomTarget::Public => Ok(self.public_room()),
            RoomTarget::Direct { peer_id } => {
                if peer_id == &me.sender_id {
                    return Err(ChatError::Validation(
                        "cannot open a direct room with yourself".to_string(),
                    ));
                }

                let recipient = directory
                    .find_user(peer_id)
                    .await?
                    .ok_or_else(|| ChatError::RecipientNotFound(peer_id.clone()))?;

                let name = recipient
                    .display_name
                    .as_deref()
                    .filter(|name| !name.is_empty())
                    .unwrap_or("Unknown User");

                Ok(RoomDescriptor {
                    room_id: room_id_for(&me.sender_id, &recipient.user_id),
                    kind: RoomKind::Direct,
                    title: format!("DM with {name}"),
                })
            }
        }
    }
}
