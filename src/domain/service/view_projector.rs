//! 展示投影
//!
//! 纯函数：已确认消息（存储顺序）在前，剩余乐观消息（提交顺序）在后。

use crate::domain::model::{ConfirmedMessage, DisplayEntry, Message, OptimisticMessage};

#[derive(Debug, Clone, Default)]
pub struct ViewProjector {
    viewer_id: Option<String>,
}

impl ViewProjector {
    /// `viewer_id` 用于区分 sent / received
    pub fn new(viewer_id: Option<String>) -> Self {
        Self { viewer_id }
    }

    pub fn project(
        &self,
        confirmed: &[ConfirmedMessage],
        pending: &[OptimisticMessage],
    ) -> Vec<DisplayEntry> {
        let mut entries = Vec::with_capacity(confirmed.len() + pending.len());

        entries.extend(confirmed.iter().map(|m| DisplayEntry {
            key: m.store_id.to_string(),
            is_own: self.is_own(&m.sender_id),
            message: Message::Confirmed(m.clone()),
        }));

        entries.extend(pending.iter().map(|m| DisplayEntry {
            key: m.local_id.to_string(),
            is_own: self.is_own(&m.sender_id),
            message: Message::Optimistic(m.clone()),
        }));

        entries
    }

    fn is_own(&self, sender_id: &str) -> bool {
        self.viewer_id.as_deref() == Some(sender_id)
    }
}
