//! 聊天会话
//!
//! 组合发送管线、对账器、展示投影与房间选择，对展示层提供统一入口。
//! 同一时刻只订阅一个房间：切换房间时先取消旧订阅，再订阅新房间。

use std::sync::Arc;

use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::application::events::{ChatEvent, EventBus};
use crate::application::retry::RetryPolicy;
use crate::application::send_pipeline::SendPipeline;
use crate::application::state::SharedChatState;
use crate::config::ChatClientConfig;
use crate::domain::model::{
    DisplayEntry, LocalId, OptimisticMessage, RoomDescriptor, RoomId, RoomTarget, UserProfile,
};
use crate::domain::repository::{
    Clock, IdentityProvider, MessageStore, RoomSnapshot, SnapshotSubscription, UserDirectory,
};
use crate::domain::service::{Reconciler, RoomSelector, ViewProjector};
use crate::error::{ChatError, ChatResult};
use crate::metrics::ChatClientMetrics;

/// 快照处理：保存窗口并对账
#[derive(Clone)]
struct SnapshotApplier {
    state: SharedChatState,
    reconciler: Reconciler,
    clock: Arc<dyn Clock>,
    events: EventBus,
    metrics: Arc<ChatClientMetrics>,
}

impl SnapshotApplier {
    fn apply(&self, snapshot: RoomSnapshot) {
        let now = self.clock.now();
        let applied = self.state.with(|state| {
            let room = state.room_mut(&snapshot.room_id)?;
            room.confirmed = snapshot.messages.clone();
            let outcome =
                self.reconciler
                    .reconcile(&mut room.queue, &mut room.ledger, &snapshot.messages, now);
            Some((outcome, state.pending_total()))
        });

        let Some((outcome, depth)) = applied else {
            debug!(room_id = %snapshot.room_id, "Snapshot for unknown room dropped");
            return;
        };

        if !outcome.retired.is_empty() {
            self.metrics
                .pending_reconciled_total
                .inc_by(outcome.retired.len() as u64);
        }
        self.metrics.pending_queue_depth.set(depth as i64);
        self.events.emit(ChatEvent::SnapshotApplied {
            room_id: snapshot.room_id.clone(),
            confirmed: snapshot.messages.len(),
            retired: outcome.retired_ids(),
        });
    }
}

/// 当前房间的订阅任务
struct RoomPump {
    room_id: RoomId,
    cancel: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

async fn run_pump(
    mut subscription: SnapshotSubscription,
    mut cancel: oneshot::Receiver<()>,
    applier: SnapshotApplier,
) {
    loop {
        let next = tokio::select! {
            _ = &mut cancel => None,
            snapshot = subscription.next() => Some(snapshot),
        };

        match next {
            Some(Some(snapshot)) => applier.apply(snapshot),
            Some(None) => {
                warn!(room_id = %subscription.room_id(), "Subscription closed by store");
                return;
            }
            None => {
                subscription.unsubscribe();
                return;
            }
        }
    }
}

pub struct ChatSession {
    config: ChatClientConfig,
    store: Arc<dyn MessageStore>,
    identity: Arc<dyn IdentityProvider>,
    directory: Arc<dyn UserDirectory>,
    state: SharedChatState,
    pipeline: SendPipeline,
    selector: RoomSelector,
    applier: SnapshotApplier,
    events: EventBus,
    pump: Option<RoomPump>,
}

impl ChatSession {
    pub fn new(
        config: ChatClientConfig,
        store: Arc<dyn MessageStore>,
        identity: Arc<dyn IdentityProvider>,
        directory: Arc<dyn UserDirectory>,
        clock: Arc<dyn Clock>,
    ) -> ChatResult<Self> {
        config.validate()?;

        let state = SharedChatState::new();
        let events = EventBus::new(config.events.channel_capacity);
        let metrics = Arc::new(ChatClientMetrics::new());

        let pipeline = SendPipeline::new(
            state.clone(),
            store.clone(),
            clock.clone(),
            RetryPolicy::from_config(&config.send),
            events.clone(),
            metrics.clone(),
        );
        let applier = SnapshotApplier {
            state: state.clone(),
            reconciler: Reconciler::new(config.match_windows()),
            clock,
            events: events.clone(),
            metrics,
        };
        let selector = RoomSelector::new(
            config.room.public_room_id.clone(),
            config.room.public_title.clone(),
        );

        Ok(Self {
            config,
            store,
            identity,
            directory,
            state,
            pipeline,
            selector,
            applier,
            events,
            pump: None,
        })
    }

    /// 打开房间：解析目标、取消旧订阅、订阅新房间并应用首个窗口
    #[instrument(skip(self))]
    pub async fn open_room(&mut self, target: RoomTarget) -> ChatResult<RoomDescriptor> {
        let descriptor = match &target {
            RoomTarget::Public => self.selector.public_room(),
            RoomTarget::Direct { .. } => {
                let me = self
                    .identity
                    .current_identity()
                    .ok_or_else(|| ChatError::Validation("no signed-in user".to_string()))?;
                self.selector
                    .resolve(&me, &target, self.directory.as_ref())
                    .await?
            }
        };

        self.close_room().await;

        let mut subscription = self
            .store
            .subscribe(&descriptor.room_id, self.config.room.window_limit)
            .await?;

        self.state.with(|state| {
            state.room_entry(&descriptor);
            state.set_active(Some(descriptor.room_id.clone()));
        });

        if let Some(initial) = subscription.next().await {
            self.applier.apply(initial);
        }

        let (cancel, cancel_rx) = oneshot::channel();
        let handle = tokio::spawn(run_pump(subscription, cancel_rx, self.applier.clone()));
        self.pump = Some(RoomPump {
            room_id: descriptor.room_id.clone(),
            cancel,
            handle,
        });

        info!(room_id = %descriptor.room_id, title = %descriptor.title, "Room opened");
        Ok(descriptor)
    }

    /// 关闭当前房间订阅（待确认消息保留，后台持久化继续）
    pub async fn close_room(&mut self) {
        if let Some(pump) = self.pump.take() {
            let _ = pump.cancel.send(());
            if let Err(e) = pump.handle.await {
                warn!(room_id = %pump.room_id, error = %e, "Room pump terminated abnormally");
            }
            debug!(room_id = %pump.room_id, "Room closed");
        }
        self.state.with(|state| state.set_active(None));
    }

    pub fn active_room(&self) -> Option<RoomDescriptor> {
        self.state
            .with(|state| state.active_room().map(|room| room.descriptor.clone()))
    }

    /// 在当前房间发送消息
    pub fn send(&self, text: &str) -> ChatResult<LocalId> {
        let room = self.active_room().ok_or(ChatError::NoActiveRoom)?;
        let sender = self.identity.current_identity();
        self.pipeline.submit(&room, text, sender.as_ref())
    }

    pub fn retry(&self, local_id: &LocalId) -> ChatResult<()> {
        self.pipeline.retry(local_id)
    }

    pub fn retract(&self, local_id: &LocalId) -> ChatResult<OptimisticMessage> {
        self.pipeline.retract(local_id)
    }

    /// 当前房间的展示序列
    pub fn render(&self) -> Vec<DisplayEntry> {
        let projector = ViewProjector::new(
            self.identity
                .current_identity()
                .map(|identity| identity.sender_id),
        );
        self.state.with(|state| match state.active_room() {
            Some(room) => projector.project(&room.confirmed, &room.queue.snapshot()),
            None => Vec::new(),
        })
    }

    /// 当前房间的待确认消息
    pub fn pending(&self) -> Vec<OptimisticMessage> {
        self.state.with(|state| {
            state
                .active_room()
                .map(|room| room.queue.snapshot())
                .unwrap_or_default()
        })
    }

    /// 最近一次发送失败的错误提示
    pub fn send_error(&self) -> Option<String> {
        self.state
            .with(|state| state.send_error().map(str::to_string))
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ChatEvent> {
        self.events.subscribe()
    }

    /// 联系人列表（不含自己）
    pub async fn contacts(&self) -> ChatResult<Vec<UserProfile>> {
        let me = self
            .identity
            .current_identity()
            .ok_or_else(|| ChatError::Validation("no signed-in user".to_string()))?;
        Ok(self.directory.contacts(&me.sender_id).await?)
    }

    pub async fn shutdown(mut self) {
        self.close_room().await;
    }
}

impl Drop for ChatSession {
    fn drop(&mut self) {
        if let Some(pump) = self.pump.take() {
            pump.handle.abort();
        }
    }
}
