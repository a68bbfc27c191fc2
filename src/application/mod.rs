//! 应用层：发送管线、快照订阅与会话编排

pub mod events;
pub mod retry;
pub mod send_pipeline;
pub mod session;
pub mod state;

pub use events::{ChatEvent, EventBus};
pub use retry::RetryPolicy;
pub use send_pipeline::SendPipeline;
pub use session::ChatSession;
pub use state::{ChatState, RoomState, SharedChatState};
