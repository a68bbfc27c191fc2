// 会话级集成测试 - 通过 ChatSession 驱动发送、重试、对账与房间切换
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::{TimeZone, Utc};
use flare_im_client::domain::repository::{Clock, IdentityProvider, MessageStore, UserDirectory};
use flare_im_client::infrastructure::{
    InMemoryMessageStore, InMemoryUserDirectory, ManualClock, StaticIdentityProvider, SystemClock,
};
use flare_im_client::{
    ChatClientConfig, ChatError, ChatEvent, ChatSession, OutgoingMessage, PendingStatus, RoomId,
    RoomTarget, SenderIdentity, StoreError, UserProfile, room_id_for,
};
use tokio::sync::broadcast::Receiver;

struct Harness {
    session: ChatSession,
    store: Arc<InMemoryMessageStore>,
    events: Receiver<ChatEvent>,
}

fn directory() -> Arc<InMemoryUserDirectory> {
    let directory = Arc::new(InMemoryUserDirectory::new());
    for (id, name) in [("u1", Some("User One")), ("bob", Some("Bob")), ("ghost", None)] {
        directory.upsert(UserProfile {
            user_id: id.to_string(),
            display_name: name.map(str::to_string),
            avatar_ref: None,
            last_seen: None,
        });
    }
    directory
}

async fn harness_with_clock(clock: Arc<dyn Clock>) -> Result<Harness> {
    let _ = tracing_subscriber::fmt::try_init();

    let store = Arc::new(InMemoryMessageStore::new("messages", clock.clone()));
    let identity: Arc<dyn IdentityProvider> = Arc::new(StaticIdentityProvider::new(Some(
        SenderIdentity::new("u1").with_display_name("User One"),
    )));
    let mut session = ChatSession::new(
        ChatClientConfig::default(),
        store.clone() as Arc<dyn MessageStore>,
        identity,
        directory() as Arc<dyn UserDirectory>,
        clock,
    )?;
    let events = session.subscribe_events();
    session.open_room(RoomTarget::Public).await?;

    Ok(Harness {
        session,
        store,
        events,
    })
}

async fn harness() -> Result<Harness> {
    harness_with_clock(Arc::new(SystemClock)).await
}

/// 等待满足条件的事件，返回期间收到的全部事件（含匹配的那一条）
async fn wait_for<F>(events: &mut Receiver<ChatEvent>, predicate: F) -> Vec<ChatEvent>
where
    F: Fn(&ChatEvent) -> bool,
{
    let collect = async {
        let mut seen = Vec::new();
        loop {
            let event = events.recv().await.expect("event stream closed");
            let done = predicate(&event);
            seen.push(event);
            if done {
                return seen;
            }
        }
    };
    tokio::time::timeout(Duration::from_secs(300), collect)
        .await
        .expect("timed out waiting for event")
}

/// 轮询直到条件成立（快照泵在独立任务中运行）
async fn settle_until<F>(condition: F)
where
    F: Fn() -> bool,
{
    for _ in 0..1000 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached");
}

fn outgoing(sender: &str, text: &str) -> OutgoingMessage {
    OutgoingMessage {
        text: text.to_string(),
        sender_id: sender.to_string(),
        avatar_ref: None,
        created_at_hint: Utc::now(),
        room_id: None,
    }
}

#[tokio::test(start_paused = true)]
async fn test_transient_failure_then_success() -> Result<()> {
    let mut h = harness().await?;
    h.store.fail_next(StoreError::Transient("timeout".to_string()));

    let local_id = h.session.send("hi")?;
    let pending = h.session.pending();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].status, PendingStatus::Sending);

    let seen = wait_for(&mut h.events, |e| matches!(e, ChatEvent::Persisted { .. })).await;
    assert!(seen.iter().any(|e| matches!(e, ChatEvent::RetryScheduled { next_attempt: 2, .. })));
    assert!(!seen.iter().any(|e| matches!(e, ChatEvent::Failed { .. })));

    assert!(h.session.pending().is_empty());
    assert_eq!(h.store.append_calls(), 2);
    assert!(h.session.send_error().is_none());

    // 等待快照推送后展示序列只有一条已确认消息
    settle_until(|| h.session.render().iter().any(|entry| !entry.is_pending())).await;
    let view = h.session.render();
    assert_eq!(view.len(), 1);
    assert!(!view[0].is_pending());
    assert!(view[0].is_own);
    assert_ne!(view[0].key, local_id.to_string());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_retries_then_manual_retry() -> Result<()> {
    let mut h = harness().await?;
    h.store
        .fail_next_n(4, StoreError::Transient("store offline".to_string()));

    let local_id = h.session.send("hi")?;
    wait_for(&mut h.events, |e| matches!(e, ChatEvent::Failed { .. })).await;

    let pending = h.session.pending();
    assert_eq!(pending[0].status, PendingStatus::Failed);
    assert_eq!(pending[0].attempt, 2);
    assert!(pending[0].last_error.as_deref().unwrap().contains("store offline"));
    assert!(h.session.send_error().is_some());
    assert_eq!(h.store.append_calls(), 2);

    // 不再有自动重试
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(h.store.append_calls(), 2);

    h.session.retry(&local_id)?;
    let pending = h.session.pending();
    assert_eq!(pending[0].status, PendingStatus::Sending);
    assert_eq!(pending[0].attempt, 1);
    assert_eq!(pending[0].last_error, None);

    wait_for(&mut h.events, |e| matches!(e, ChatEvent::Failed { .. })).await;
    assert_eq!(h.store.append_calls(), 4);

    // 存储恢复后再次手动重试成功
    h.session.retry(&local_id)?;
    wait_for(&mut h.events, |e| matches!(e, ChatEvent::Persisted { .. })).await;
    assert!(h.session.pending().is_empty());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_rejected_message_is_not_retried() -> Result<()> {
    let mut h = harness().await?;
    h.store
        .fail_next(StoreError::Rejected("permission denied".to_string()));

    let local_id = h.session.send("hi")?;
    wait_for(&mut h.events, |e| matches!(e, ChatEvent::Failed { .. })).await;
    assert_eq!(h.store.append_calls(), 1);

    let view = h.session.render();
    assert_eq!(view.len(), 1);
    assert_eq!(view[0].pending_status(), Some(PendingStatus::Failed));
    assert!(view[0].last_error().unwrap().contains("permission denied"));

    // 提交新消息清除错误提示，失败消息不阻塞后续发送
    h.session.send("second")?;
    assert!(h.session.send_error().is_none());
    wait_for(&mut h.events, |e| matches!(e, ChatEvent::Persisted { .. })).await;

    let retracted = h.session.retract(&local_id)?;
    assert_eq!(retracted.text, "hi");
    assert!(h.session.pending().is_empty());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_snapshot_confirms_before_append_returns() -> Result<()> {
    let mut h = harness().await?;
    h.store.set_append_latency(Some(Duration::from_millis(200)));

    let local_id = h.session.send("hi")?;

    // 另一个会话先写入了同样的内容
    let room = RoomId::new("messages");
    h.store.seed_message(&room, outgoing("u1", "hi"));

    let seen = wait_for(&mut h.events, |e| {
        matches!(e, ChatEvent::SnapshotApplied { retired, .. } if !retired.is_empty())
    })
    .await;
    match seen.last() {
        Some(ChatEvent::SnapshotApplied { retired, .. }) => assert_eq!(retired, &vec![local_id.clone()]),
        other => panic!("unexpected event: {other:?}"),
    }
    assert!(h.session.pending().is_empty());

    // append 成功回调找不到条目，不做任何修改
    wait_for(&mut h.events, |e| matches!(e, ChatEvent::Persisted { .. })).await;
    assert!(h.session.pending().is_empty());
    assert_eq!(h.store.append_calls(), 1);

    settle_until(|| h.session.render().len() == 2).await;
    let view = h.session.render();
    assert!(view.iter().all(|entry| !entry.is_pending()));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_double_send_is_retired_one_by_one() -> Result<()> {
    let mut h = harness().await?;
    h.store.set_append_latency(Some(Duration::from_secs(5)));

    let first = h.session.send("hi")?;
    let second = h.session.send("hi")?;

    let room = RoomId::new("messages");
    h.store.seed_message(&room, outgoing("u1", "hi"));
    wait_for(&mut h.events, |e| {
        matches!(e, ChatEvent::SnapshotApplied { retired, .. } if !retired.is_empty())
    })
    .await;

    let pending = h.session.pending();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].local_id, second);
    assert_ne!(pending[0].local_id, first);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_unresolved_timestamp_within_fresh_window() -> Result<()> {
    let start = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
    let clock = Arc::new(ManualClock::new(start));
    let mut h = harness_with_clock(clock.clone()).await?;
    h.store.set_append_latency(Some(Duration::from_secs(60)));
    h.store.set_defer_timestamps(true);

    let room = RoomId::new("messages");

    // 超过新鲜窗口：不淘汰
    h.session.send("late")?;
    clock.advance(chrono::Duration::seconds(31));
    h.store.seed_message(&room, outgoing("u1", "late"));
    wait_for(&mut h.events, |e| matches!(e, ChatEvent::SnapshotApplied { confirmed: 1, .. })).await;
    assert_eq!(h.session.pending().len(), 1);

    let view = h.session.render();
    assert_eq!(view[0].timestamp(), None);

    // 新鲜窗口内：淘汰
    h.session.send("fresh")?;
    clock.advance(chrono::Duration::seconds(5));
    h.store.seed_message(&room, outgoing("u1", "fresh"));
    wait_for(&mut h.events, |e| matches!(e, ChatEvent::SnapshotApplied { confirmed: 2, .. })).await;

    let pending = h.session.pending();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].text, "late");
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_room_switch_keeps_rooms_isolated() -> Result<()> {
    let mut h = harness().await?;
    h.store.set_append_latency(Some(Duration::from_secs(1)));
    let public = RoomId::new("messages");

    h.session.send("hello public")?;
    let dm = h
        .session
        .open_room(RoomTarget::Direct {
            peer_id: "bob".to_string(),
        })
        .await?;

    assert_eq!(dm.title, "DM with Bob");
    assert_eq!(dm.room_id, room_id_for("u1", "bob"));
    assert_eq!(h.store.subscriber_count(&public), 0);
    assert!(h.session.render().is_empty());

    // 公共房间的发送在后台继续完成
    wait_for(&mut h.events, |e| {
        matches!(e, ChatEvent::Persisted { room_id, .. } if room_id == &public)
    })
    .await;
    assert_eq!(h.store.messages(&public).len(), 1);

    // 私聊消息携带房间ID，通过存储端校验
    h.session.send("hi bob")?;
    wait_for(&mut h.events, |e| {
        matches!(e, ChatEvent::Persisted { room_id, .. } if room_id == &dm.room_id)
    })
    .await;
    assert_eq!(h.store.messages(&dm.room_id).len(), 1);

    h.session.open_room(RoomTarget::Public).await?;
    let view = h.session.render();
    assert_eq!(view.len(), 1);
    assert_eq!(view[0].message.text(), "hello public");
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_send_error_stays_with_its_room() -> Result<()> {
    let mut h = harness().await?;
    h.store.set_append_latency(Some(Duration::from_secs(1)));
    h.store
        .fail_next(StoreError::Rejected("permission denied".to_string()));

    h.session.send("hello public")?;
    h.session
        .open_room(RoomTarget::Direct {
            peer_id: "bob".to_string(),
        })
        .await?;

    // 公共房间的失败在后台发生，私聊房间不显示该错误
    wait_for(&mut h.events, |e| matches!(e, ChatEvent::Failed { .. })).await;
    assert!(h.session.send_error().is_none());

    h.session.open_room(RoomTarget::Public).await?;
    let banner = h.session.send_error();
    assert!(banner.as_deref().unwrap().contains("permission denied"));
    Ok(())
}

#[tokio::test]
async fn test_direct_room_resolution_errors() -> Result<()> {
    let mut h = harness().await?;

    let unknown = h
        .session
        .open_room(RoomTarget::Direct {
            peer_id: "nobody".to_string(),
        })
        .await;
    assert!(matches!(unknown, Err(ChatError::RecipientNotFound(_))));

    let myself = h
        .session
        .open_room(RoomTarget::Direct {
            peer_id: "u1".to_string(),
        })
        .await;
    assert!(matches!(myself, Err(ChatError::Validation(_))));

    // 解析失败不影响当前房间
    assert_eq!(
        h.session.active_room().map(|room| room.title),
        Some("Public Chat".to_string())
    );

    let ghost = h
        .session
        .open_room(RoomTarget::Direct {
            peer_id: "ghost".to_string(),
        })
        .await?;
    assert_eq!(ghost.title, "DM with Unknown User");

    let contacts = h.session.contacts().await?;
    let ids: Vec<_> = contacts.iter().map(|c| c.user_id.as_str()).collect();
    assert_eq!(ids, vec!["bob", "ghost"]);
    Ok(())
}

#[tokio::test]
async fn test_blank_message_never_enqueued() -> Result<()> {
    let h = harness().await?;
    assert!(matches!(h.session.send("   \n"), Err(ChatError::Validation(_))));
    assert!(h.session.pending().is_empty());
    assert_eq!(h.store.append_calls(), 0);
    Ok(())
}
