//! 待确认队列
//!
//! 按提交顺序保存本地发出、尚未被存储确认的乐观消息。
//! 所有操作都是同步的，只在单一控制流中调用。

use crate::domain::model::{LocalId, OptimisticMessage, OptimisticPatch};

#[derive(Debug, Clone, Default)]
pub struct PendingQueue {
    entries: Vec<OptimisticMessage>,
}

impl PendingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加到队尾；local_id 已存在时拒绝并返回 false
    pub fn append(&mut self, entry: OptimisticMessage) -> bool {
        if self.contains(&entry.local_id) {
            tracing::warn!(local_id = %entry.local_id, "Duplicate local id rejected");
            return false;
        }
        self.entries.push(entry);
        true
    }

    /// 原地更新；条目不存在时为 no-op（可能已被对账移除）
    pub fn update(&mut self, local_id: &LocalId, patch: &OptimisticPatch) -> bool {
        match self.entries.iter_mut().find(|e| &e.local_id == local_id) {
            Some(entry) => {
                entry.apply(patch);
                true
            }
            None => false,
        }
    }

    pub fn remove(&mut self, local_id: &LocalId) -> Option<OptimisticMessage> {
        let index = self.entries.iter().position(|e| &e.local_id == local_id)?;
        Some(self.entries.remove(index))
    }

    /// 移除所有满足条件的条目，按原顺序返回
    pub fn remove_where<F>(&mut self, mut predicate: F) -> Vec<OptimisticMessage>
    where
        F: FnMut(&OptimisticMessage) -> bool,
    {
        let mut removed = Vec::new();
        let mut kept = Vec::with_capacity(self.entries.len());
        for entry in self.entries.drain(..) {
            if predicate(&entry) {
                removed.push(entry);
            } else {
                kept.push(entry);
            }
        }
        self.entries = kept;
        removed
    }

    pub fn get(&self, local_id: &LocalId) -> Option<&OptimisticMessage> {
        self.entries.iter().find(|e| &e.local_id == local_id)
    }

    pub fn contains(&self, local_id: &LocalId) -> bool {
        self.get(local_id).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &OptimisticMessage> {
        self.entries.iter()
    }

    /// 当前有序快照
    pub fn snapshot(&self) -> Vec<OptimisticMessage> {
        self.entries.clone()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::{PendingStatus, RoomId, SenderIdentity};
    use chrono::Utc;

    fn entry(id: &str, text: &str) -> OptimisticMessage {
        OptimisticMessage::new(
            LocalId::new(id),
            RoomId::new("messages"),
            text,
            &SenderIdentity::new("u1"),
            Utc::now(),
        )
    }

    #[test]
    fn test_append_preserves_submission_order() {
        let mut queue = PendingQueue::new();
        assert!(queue.append(entry("a", "one")));
        assert!(queue.append(entry("b", "two")));
        assert!(queue.append(entry("c", "three")));

        let ids: Vec<_> = queue.snapshot().into_iter().map(|e| e.local_id).collect();
        assert_eq!(ids, vec![LocalId::new("a"), LocalId::new("b"), LocalId::new("c")]);
    }

    #[test]
    fn test_append_rejects_duplicate_local_id() {
        let mut queue = PendingQueue::new();
        assert!(queue.append(entry("a", "one")));
        assert!(!queue.append(entry("a", "again")));
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.get(&LocalId::new("a")).unwrap().text, "one");
    }

    #[test]
    fn test_update_missing_entry_is_noop() {
        let mut queue = PendingQueue::new();
        queue.append(entry("a", "one"));

        assert!(!queue.update(&LocalId::new("zzz"), &OptimisticPatch::failed("boom")));
        assert!(queue.update(&LocalId::new("a"), &OptimisticPatch::failed("boom")));
        assert_eq!(
            queue.get(&LocalId::new("a")).unwrap().status,
            PendingStatus::Failed
        );
    }

    #[test]
    fn test_remove_and_remove_where() {
        let mut queue = PendingQueue::new();
        queue.append(entry("a", "hi"));
        queue.append(entry("b", "bye"));
        queue.append(entry("c", "hi"));

        let removed = queue.remove_where(|e| e.text == "hi");
        assert_eq!(removed.len(), 2);
        assert_eq!(removed[0].local_id, LocalId::new("a"));
        assert_eq!(removed[1].local_id, LocalId::new("c"));
        assert_eq!(queue.len(), 1);

        assert!(queue.remove(&LocalId::new("b")).is_some());
        assert!(queue.remove(&LocalId::new("b")).is_none());
        assert!(queue.is_empty());
    }
}
