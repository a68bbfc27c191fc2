//! Flare IM Client 聊天客户端核心库
//!
//! 乐观发送、快照对账与展示投影：
//! - 提交消息后立即以 Sending 状态展示，后台持久化并有限次重试
//! - 每次收到房间最近 N 条的完整快照时，淘汰已被确认的乐观消息
//! - 已确认消息在前、待确认消息在后投影为单一展示序列

pub mod application;
pub mod config;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod metrics;
pub mod tracing;
pub mod utils;

pub use application::{ChatEvent, ChatSession, RetryPolicy, SendPipeline};
pub use config::{
    ChatClientConfig, ConfigManager, LoggingConfig, load_config, load_config_with_validation,
};
pub use domain::model::{
    ConfirmedMessage, DisplayEntry, LocalId, Message, OptimisticMessage, OutgoingMessage,
    PendingStatus, RoomDescriptor, RoomId, RoomKind, RoomTarget, SenderIdentity, StoreId,
    UserProfile,
};
pub use domain::service::{
    ConfirmationLedger, MatchWindows, PendingQueue, Reconciler, RoomSelector, ViewProjector,
    room_id_for,
};
pub use error::{ChatError, ChatResult, StoreError};
