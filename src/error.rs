//! Flare IM Client 错误类型定义
//!
//! - `StoreError`：消息存储边界错误，区分临时故障与永久拒绝
//! - `ChatError`：客户端引擎统一对外错误

use thiserror::Error;

use crate::domain::model::{LocalId, PendingStatus};

/// 消息存储错误
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// 临时故障（网络、服务不可用），可重试
    #[error("store unavailable: {0}")]
    Transient(String),

    /// 永久拒绝（校验、权限），不可重试
    #[error("store rejected message: {0}")]
    Rejected(String),
}

impl StoreError {
    /// 是否可以自动重试
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Transient(_))
    }

    /// 指标标签
    pub fn kind_label(&self) -> &'static str {
        match self {
            StoreError::Transient(_) => "transient",
            StoreError::Rejected(_) => "rejected",
        }
    }
}

/// 聊天客户端错误类型
#[derive(Debug, Error)]
pub enum ChatError {
    /// 输入校验失败（空消息、未登录）
    #[error("Validation error: {0}")]
    Validation(String),

    /// 存储错误
    #[error(transparent)]
    Store(#[from] StoreError),

    /// 待发送队列中不存在该消息
    #[error("Unknown pending message: {0}")]
    UnknownMessage(LocalId),

    /// 消息仍在发送中，不能手动重试
    #[error("Message {local_id} is {status}, only failed messages can be retried")]
    NotRetryable {
        local_id: LocalId,
        status: PendingStatus,
    },

    /// 未选择聊天室
    #[error("No room selected")]
    NoActiveRoom,

    /// 私聊对象不存在
    #[error("Recipient not found: {0}")]
    RecipientNotFound(String),

    /// 配置错误
    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// 聊天客户端结果类型
pub type ChatResult<T> = Result<T, ChatError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_classification() {
        let transient = StoreError::Transient("connection reset".to_string());
        let rejected = StoreError::Rejected("permission denied".to_string());

        assert!(transient.is_retryable());
        assert!(!rejected.is_retryable());
        assert_eq!(transient.kind_label(), "transient");
        assert_eq!(rejected.kind_label(), "rejected");
    }

    #[test]
    fn test_chat_error_wraps_store_error() {
        let err: ChatError = StoreError::Rejected("room mismatch".to_string()).into();
        assert_eq!(err.to_string(), "store rejected message: room mismatch");
    }
}
