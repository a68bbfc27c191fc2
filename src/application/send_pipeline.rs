//! 发送管线
//!
//! `submit` 同步入队乐观消息并立即返回 local_id，随后在后台任务中持久化：
//! 临时故障按线性退避自动重试，重试次数耗尽或被永久拒绝后标记为 Failed。
//! 后台任务每次尝试前都会重新查找条目，条目已被对账或撤回时直接结束。

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, instrument, warn};

use crate::application::events::{ChatEvent, EventBus};
use crate::application::retry::RetryPolicy;
use crate::application::state::SharedChatState;
use crate::domain::model::{
    LocalId, OptimisticMessage, OptimisticPatch, OutgoingMessage, PendingStatus, RoomDescriptor,
    SenderIdentity,
};
use crate::domain::repository::{Clock, MessageStore};
use crate::domain::service::LocalIdAllocator;
use crate::error::{ChatError, ChatResult, StoreError};
use crate::metrics::ChatClientMetrics;

#[derive(Clone)]
pub struct SendPipeline {
    state: SharedChatState,
    store: Arc<dyn MessageStore>,
    clock: Arc<dyn Clock>,
    ids: Arc<LocalIdAllocator>,
    policy: RetryPolicy,
    events: EventBus,
    metrics: Arc<ChatClientMetrics>,
}

impl SendPipeline {
    pub fn new(
        state: SharedChatState,
        store: Arc<dyn MessageStore>,
        clock: Arc<dyn Clock>,
        policy: RetryPolicy,
        events: EventBus,
        metrics: Arc<ChatClientMetrics>,
    ) -> Self {
        Self {
            state,
            store,
            clock,
            ids: Arc::new(LocalIdAllocator::new()),
            policy,
            events,
            metrics,
        }
    }

    /// 提交消息：校验、入队并调度首次持久化
    #[instrument(skip(self, text, sender), fields(room_id = %room.room_id))]
    pub fn submit(
        &self,
        room: &RoomDescriptor,
        text: &str,
        sender: Option<&SenderIdentity>,
    ) -> ChatResult<LocalId> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ChatError::Validation("message text is empty".to_string()));
        }
        let sender =
            sender.ok_or_else(|| ChatError::Validation("no signed-in sender".to_string()))?;

        let local_id = self.ids.allocate();
        let entry = OptimisticMessage::new(
            local_id.clone(),
            room.room_id.clone(),
            text,
            sender,
            self.clock.now(),
        );

        let depth = self.state.with(|state| {
            let room_state = state.room_entry(room);
            room_state.send_error = None;
            room_state.queue.append(entry);
            state.pending_total()
        });

        self.metrics.messages_submitted_total.inc();
        self.metrics.pending_queue_depth.set(depth as i64);
        debug!(local_id = %local_id, sender_id = %sender.sender_id, "Optimistic message enqueued");
        self.events.emit(ChatEvent::Enqueued {
            room_id: room.room_id.clone(),
            local_id: local_id.clone(),
        });

        self.spawn_persist(room.clone(), local_id.clone(), 1);
        Ok(local_id)
    }

    /// 手动重试失败的消息（重置为 Sending，attempt = 1）
    pub fn retry(&self, local_id: &LocalId) -> ChatResult<()> {
        let room = self.state.with(|state| -> ChatResult<RoomDescriptor> {
            let room = state
                .locate(local_id)
                .ok_or_else(|| ChatError::UnknownMessage(local_id.clone()))?;
            let status = room
                .queue
                .get(local_id)
                .map(|entry| entry.status)
                .ok_or_else(|| ChatError::UnknownMessage(local_id.clone()))?;
            if status != PendingStatus::Failed {
                return Err(ChatError::NotRetryable {
                    local_id: local_id.clone(),
                    status,
                });
            }

            let descriptor = room.descriptor.clone();
            if let Some(room) = state.room_mut(&descriptor.room_id) {
                room.queue.update(local_id, &OptimisticPatch::resend());
            }
            Ok(descriptor)
        })?;

        info!(local_id = %local_id, room_id = %room.room_id, "Manual retry requested");
        self.spawn_persist(room, local_id.clone(), 1);
        Ok(())
    }

    /// 撤回尚未确认的消息；进行中的持久化任务在下一次查找时结束
    pub fn retract(&self, local_id: &LocalId) -> ChatResult<OptimisticMessage> {
        let (removed, depth) = self.state.with(|state| -> ChatResult<(OptimisticMessage, usize)> {
            let room_id = state
                .locate(local_id)
                .map(|room| room.descriptor.room_id.clone())
                .ok_or_else(|| ChatError::UnknownMessage(local_id.clone()))?;
            let removed = state
                .room_mut(&room_id)
                .and_then(|room| room.queue.remove(local_id))
                .ok_or_else(|| ChatError::UnknownMessage(local_id.clone()))?;
            Ok((removed, state.pending_total()))
        })?;

        self.metrics.pending_queue_depth.set(depth as i64);
        info!(local_id = %local_id, room_id = %removed.room_id, "Pending message retracted");
        self.events.emit(ChatEvent::Retracted {
            room_id: removed.room_id.clone(),
            local_id: local_id.clone(),
        });
        Ok(removed)
    }

    fn spawn_persist(&self, room: RoomDescriptor, local_id: LocalId, attempt: u32) {
        let pipeline = self.clone();
        tokio::spawn(async move {
            pipeline.attempt_persist(room, local_id, attempt).await;
        });
    }

    /// 持久化一条乐观消息，直到成功、失败或条目消失
    #[instrument(skip(self, room), fields(room_id = %room.room_id))]
    pub async fn attempt_persist(&self, room: RoomDescriptor, local_id: LocalId, attempt: u32) {
        let mut attempt = attempt;

        loop {
            let payload = self.state.with(|state| {
                let queue = &mut state.room_mut(&room.room_id)?.queue;
                // 只持久化 Sending 状态的条目
                if queue.get(&local_id)?.status != PendingStatus::Sending {
                    return None;
                }
                if !queue.update(&local_id, &OptimisticPatch::attempt(attempt)) {
                    return None;
                }
                queue.get(&local_id).map(|entry| OutgoingMessage {
                    text: entry.text.clone(),
                    sender_id: entry.sender_id.clone(),
                    avatar_ref: entry.avatar_ref.clone(),
                    created_at_hint: entry.created_at,
                    room_id: room.is_direct().then(|| room.room_id.clone()),
                })
            });

            let Some(payload) = payload else {
                debug!(local_id = %local_id, attempt, "Entry no longer pending, skipping persist");
                return;
            };

            self.metrics.persist_attempts_total.inc();
            let start = Instant::now();
            let result = self.store.append(&room.room_id, payload).await;
            self.metrics
                .persist_duration_seconds
                .observe(start.elapsed().as_secs_f64());

            match result {
                Ok(store_id) => {
                    let now = self.clock.now();
                    let (removed, depth) = self.state.with(|state| {
                        let removed = match state.room_mut(&room.room_id) {
                            Some(room_state) => {
                                room_state.ledger.acknowledge(store_id.clone(), now);
                                room_state.queue.remove(&local_id).is_some()
                            }
                            None => false,
                        };
                        (removed, state.pending_total())
                    });

                    self.metrics.pending_queue_depth.set(depth as i64);
                    info!(
                        local_id = %local_id,
                        store_id = %store_id,
                        attempt,
                        already_reconciled = !removed,
                        "Message persisted"
                    );
                    self.events.emit(ChatEvent::Persisted {
                        room_id: room.room_id.clone(),
                        local_id: local_id.clone(),
                        store_id,
                    });
                    return;
                }
                Err(error) if self.policy.should_retry(attempt, &error) => {
                    let delay = self.policy.calculate_delay(attempt);
                    warn!(
                        local_id = %local_id,
                        attempt,
                        max_attempts = self.policy.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "Persist failed, retrying"
                    );
                    self.metrics.persist_retries_total.inc();
                    self.events.emit(ChatEvent::RetryScheduled {
                        room_id: room.room_id.clone(),
                        local_id: local_id.clone(),
                        next_attempt: attempt + 1,
                        delay_ms: delay.as_millis() as u64,
                    });

                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(error) => {
                    self.mark_failed(&room, &local_id, attempt, &error);
                    return;
                }
            }
        }
    }

    fn mark_failed(
        &self,
        room: &RoomDescriptor,
        local_id: &LocalId,
        attempt: u32,
        error: &StoreError,
    ) {
        let message = error.to_string();
        let marked = self.state.with(|state| {
            let Some(room_state) = state.room_mut(&room.room_id) else {
                return false;
            };
            let marked = room_state
                .queue
                .update(local_id, &OptimisticPatch::failed(message.clone()));
            if marked {
                room_state.send_error = Some(message.clone());
            }
            marked
        });

        if !marked {
            debug!(local_id = %local_id, "Entry removed before failure was recorded");
            return;
        }

        self.metrics
            .persist_failures_total
            .with_label_values(&[error.kind_label()])
            .inc();
        warn!(
            local_id = %local_id,
            attempt,
            retryable = error.is_retryable(),
            error = %error,
            "Message marked as failed"
        );
        self.events.emit(ChatEvent::Failed {
            room_id: room.room_id.clone(),
            local_id: local_id.clone(),
            error: message,
        });
    }
}
