//! 本地临时ID分配
//!
//! 格式：`temp-{会话ULID}-{序号}`，序号单调递增，会话内永不复用。

use std::sync::atomic::{AtomicU64, Ordering};

use ulid::Ulid;

use crate::domain::model::LocalId;

#[derive(Debug)]
pub struct LocalIdAllocator {
    session: Ulid,
    next: AtomicU64,
}

impl LocalIdAllocator {
    pub fn new() -> Self {
        Self {
            session: Ulid::new(),
            next: AtomicU64::new(0),
        }
    }

    pub fn allocate(&self) -> LocalId {
        let seq = self.next.fetch_add(1, Ordering::Relaxed) + 1;
        LocalId::new(format!("temp-{}-{}", self.session, seq))
    }
}

impl Default for LocalIdAllocator {
    fn default() -> Self {
        Self::new()
    }
}
