//! 乐观消息对账
//!
//! 每次收到存储快照时，用完整窗口重新计算匹配关系（无 diff），
//! 将已被确认的乐观消息从待确认队列移除。
//!
//! 匹配规则：sender_id 与 text 相同，且
//! - 服务端时间戳已解析：|confirmed_at - created_at| < match_window
//! - 服务端时间戳未解析：now - created_at < fresh_window
//!
//! 一条已确认消息最多淘汰一条乐观消息（created_at 最早者优先）。
//! 已经"用过"的 store_id 记录在 `ConfirmationLedger` 中，保证重复对账幂等。

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::domain::model::{ConfirmedMessage, LocalId, OptimisticMessage, StoreId};
use crate::domain::service::PendingQueue;
use crate::utils::elapsed_millis;

/// 默认匹配窗口（毫秒）
pub const DEFAULT_MATCH_WINDOW_MS: i64 = 15_000;
/// 默认新鲜窗口（毫秒）
pub const DEFAULT_FRESH_WINDOW_MS: i64 = 30_000;

/// 时间窗口参数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchWindows {
    pub match_window_ms: i64,
    pub fresh_window_ms: i64,
}

impl Default for MatchWindows {
    fn default() -> Self {
        Self {
            match_window_ms: DEFAULT_MATCH_WINDOW_MS,
            fresh_window_ms: DEFAULT_FRESH_WINDOW_MS,
        }
    }
}

/// 台账中未在快照里出现过的 ID 的保留时长（毫秒）
pub const DEFAULT_LEDGER_RETENTION_MS: i64 = 60_000;

/// 已核销的 store_id 台账
///
/// 来源有两种：发送成功时存储返回的 ID，以及对账时已淘汰过乐观消息的 ID。
/// 这些 ID 不再参与匹配。出现过的 ID 滑出窗口后被清理；
/// 从未出现在快照中的 ID（例如房间已取消订阅）超过保留时长后被清理。
#[derive(Debug, Clone)]
pub struct ConfirmationLedger {
    entries: HashMap<StoreId, LedgerEntry>,
    retention_ms: i64,
}

#[derive(Debug, Clone, Copy)]
struct LedgerEntry {
    acknowledged_at: DateTime<Utc>,
    /// 是否已在快照中出现过
    seen: bool,
}

impl Default for ConfirmationLedger {
    fn default() -> Self {
        Self::with_retention(DEFAULT_LEDGER_RETENTION_MS)
    }
}

impl ConfirmationLedger {
    pub fn with_retention(retention_ms: i64) -> Self {
        Self {
            entries: HashMap::new(),
            retention_ms,
        }
    }

    pub fn acknowledge(&mut self, store_id: StoreId, now: DateTime<Utc>) {
        self.prune_expired(now);
        self.entries.entry(store_id).or_insert(LedgerEntry {
            acknowledged_at: now,
            seen: false,
        });
    }

    pub fn contains(&self, store_id: &StoreId) -> bool {
        self.entries.contains_key(store_id)
    }

    /// 根据最新窗口更新：出现过、但已不在窗口中的 ID 被清理
    pub fn observe_window(&mut self, window: &[ConfirmedMessage], now: DateTime<Utc>) {
        let retention_ms = self.retention_ms;
        self.entries.retain(|store_id, entry| {
            if window.iter().any(|m| &m.store_id == store_id) {
                entry.seen = true;
                return true;
            }
            !entry.seen && elapsed_millis(entry.acknowledged_at, now) < retention_ms
        });
    }

    fn prune_expired(&mut self, now: DateTime<Utc>) {
        let retention_ms = self.retention_ms;
        self.entries.retain(|_, entry| {
            entry.seen || elapsed_millis(entry.acknowledged_at, now) < retention_ms
        });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// 单次对账结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileOutcome {
    /// 被淘汰的乐观消息及其对应的已确认消息
    pub retired: Vec<(LocalId, StoreId)>,
}

impl ReconcileOutcome {
    pub fn retired_ids(&self) -> Vec<LocalId> {
        self.retired.iter().map(|(local_id, _)| local_id.clone()).collect()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Reconciler {
    windows: MatchWindows,
}

impl Reconciler {
    pub fn new(windows: MatchWindows) -> Self {
        Self { windows }
    }

    /// 判断已确认消息是否对应某条乐观消息
    pub fn matches(
        &self,
        confirmed: &ConfirmedMessage,
        pending: &OptimisticMessage,
        now: DateTime<Utc>,
    ) -> bool {
        if confirmed.room_id != pending.room_id
            || confirmed.sender_id != pending.sender_id
            || confirmed.text != pending.text
        {
            return false;
        }

        match confirmed.confirmed_at {
            Some(confirmed_at) => {
                elapsed_millis(pending.created_at, confirmed_at).abs() < self.windows.match_window_ms
            }
            None => elapsed_millis(pending.created_at, now) < self.windows.fresh_window_ms,
        }
    }

    /// 用完整快照对账，返回本次淘汰的条目
    pub fn reconcile(
        &self,
        queue: &mut PendingQueue,
        ledger: &mut ConfirmationLedger,
        snapshot: &[ConfirmedMessage],
        now: DateTime<Utc>,
    ) -> ReconcileOutcome {
        let mut outcome = ReconcileOutcome::default();

        for confirmed in snapshot {
            if queue.is_empty() {
                break;
            }
            if ledger.contains(&confirmed.store_id) {
                continue;
            }

            // 同一 created_at 时保持队列顺序（min_by 返回第一个最小值）
            let candidate = queue
                .iter()
                .filter(|pending| self.matches(confirmed, pending, now))
                .min_by_key(|pending| pending.created_at)
                .map(|pending| pending.local_id.clone());

            if let Some(local_id) = candidate {
                queue.remove(&local_id);
                ledger.acknowledge(confirmed.store_id.clone(), now);
                debug!(
                    local_id = %local_id,
                    store_id = %confirmed.store_id,
                    room_id = %confirmed.room_id,
                    "Optimistic message reconciled"
                );
                outcome.retired.push((local_id, confirmed.store_id.clone()));
            }
        }

        ledger.observe_window(snapshot, now);
        outcome
    }
}
