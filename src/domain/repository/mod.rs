//! 外部协作方接口
//!
//! 引擎只依赖这些边界 trait：消息存储、身份提供方、用户目录与时钟。

mod subscription;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::model::{OutgoingMessage, RoomId, SenderIdentity, StoreId, UserProfile};
use crate::error::StoreError;

pub use subscription::{RoomSnapshot, SnapshotSubscription};

/// 消息存储（追加写 + 最近 N 条实时订阅）
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// 追加一条消息，返回存储分配的ID
    async fn append(
        &self,
        room_id: &RoomId,
        message: OutgoingMessage,
    ) -> Result<StoreId, StoreError>;

    /// 订阅房间最近 `limit` 条消息，每次推送完整窗口
    async fn subscribe(
        &self,
        room_id: &RoomId,
        limit: usize,
    ) -> Result<SnapshotSubscription, StoreError>;
}

/// 身份提供方；返回 None 表示未登录
pub trait IdentityProvider: Send + Sync {
    fn current_identity(&self) -> Option<SenderIdentity>;
}

/// 用户目录
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// 查询用户资料
    async fn find_user(&self, user_id: &str) -> Result<Option<UserProfile>, StoreError>;

    /// 联系人列表（不含自己），按 user_id 升序、last_seen 降序
    async fn contacts(&self, exclude_user_id: &str) -> Result<Vec<UserProfile>, StoreError>;
}

/// 本地时钟
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}
