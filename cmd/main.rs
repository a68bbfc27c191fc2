//! # flare-chat 终端聊天客户端
//!
//! 基于内存消息存储的交互式客户端，演示乐观发送、自动重试与快照对账。
//!
//! ## 使用方法
//!
//! ```bash
//! # 指定用户ID
//! cargo run --bin flare-chat -- alice
//!
//! # 使用环境变量
//! USER_ID=alice DISPLAY_NAME=Alice cargo run --bin flare-chat
//!
//! # 模拟存储故障：前 3 次写入返回临时错误
//! FLARE_CHAT_FAIL_FIRST=3 cargo run --bin flare-chat -- alice
//! ```
//!
//! 输入文本后回车发送；`/help` 查看命令。

use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use flare_im_client::domain::repository::{Clock, IdentityProvider, MessageStore, UserDirectory};
use flare_im_client::infrastructure::{
    InMemoryMessageStore, InMemoryUserDirectory, StaticIdentityProvider, SystemClock,
};
use flare_im_client::metrics::gather_text;
use flare_im_client::tracing::init_tracing_from_config;
use flare_im_client::utils::format_clock_time;
use flare_im_client::{
    ChatEvent, ChatSession, DisplayEntry, LocalId, OutgoingMessage, PendingStatus, RoomId,
    RoomTarget, SenderIdentity, StoreError, UserProfile, load_config_with_validation,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

const DEMO_USERS: &[(&str, &str)] = &[("alice", "Alice"), ("bob", "Bob"), ("carol", "Carol")];

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::var("FLARE_CHAT_CONFIG").ok();
    let config = load_config_with_validation(config_path.as_deref())?;
    init_tracing_from_config(Some(&config.logging));

    let user_id = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("USER_ID").ok())
        .unwrap_or_else(|| format!("user-{}", std::process::id()));
    let display_name = std::env::var("DISPLAY_NAME").unwrap_or_else(|_| user_id.clone());
    let me = SenderIdentity::new(user_id.clone()).with_display_name(display_name.clone());

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let store = Arc::new(InMemoryMessageStore::new(
        config.room.public_room_id.clone(),
        clock.clone(),
    ));
    if let Some(count) = std::env::var("FLARE_CHAT_FAIL_FIRST")
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
    {
        warn!(count, "Simulating store outage for the first appends");
        store.fail_next_n(count, StoreError::Transient("simulated outage".to_string()));
    }

    let directory = Arc::new(InMemoryUserDirectory::new());
    seed_directory(&directory, &me);
    store.seed_message(
        &RoomId::new(config.room.public_room_id.clone()),
        OutgoingMessage {
            text: format!("Welcome to {}!", config.room.public_title),
            sender_id: "flare-bot".to_string(),
            avatar_ref: None,
            created_at_hint: Utc::now(),
            room_id: None,
        },
    );

    let identity: Arc<dyn IdentityProvider> = Arc::new(StaticIdentityProvider::new(Some(me)));
    let mut session = ChatSession::new(
        config,
        store.clone() as Arc<dyn MessageStore>,
        identity,
        directory.clone() as Arc<dyn UserDirectory>,
        clock,
    )?;
    let mut events = session.subscribe_events();

    session.open_room(RoomTarget::Public).await?;
    info!(%user_id, "flare-chat started");
    print_help();
    render(&session);

    let stdin = tokio::io::stdin();
    let mut reader = BufReader::new(stdin);
    let mut line = String::new();

    loop {
        tokio::select! {
            read = reader.read_line(&mut line) => {
                match read {
                    Ok(0) => {
                        info!("输入结束，退出客户端");
                        break;
                    }
                    Ok(_) => {
                        let input = line.trim().to_string();
                        line.clear();
                        if input.is_empty() {
                            continue;
                        }
                        if !handle_input(&mut session, &input).await {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "Failed to read stdin");
                        break;
                    }
                }
            }
            event = events.recv() => {
                match event {
                    Ok(event) => {
                        let visible = session
                            .active_room()
                            .is_some_and(|room| &room.room_id == event.room_id());
                        if visible && !matches!(event, ChatEvent::Enqueued { .. }) {
                            render(&session);
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Event stream lagged");
                        render(&session);
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }
    }

    session.shutdown().await;
    Ok(())
}

/// 处理一行输入；返回 false 表示退出
async fn handle_input(session: &mut ChatSession, input: &str) -> bool {
    let (command, arg) = match input.split_once(' ') {
        Some((command, arg)) => (command, arg.trim()),
        None => (input, ""),
    };

    match command {
        "quit" | "exit" => return false,
        "/help" => print_help(),
        "/public" => open(session, RoomTarget::Public).await,
        "/dm" if !arg.is_empty() => {
            open(
                session,
                RoomTarget::Direct {
                    peer_id: arg.to_string(),
                },
            )
            .await
        }
        "/contacts" => match session.contacts().await {
            Ok(contacts) => print_contacts(&contacts),
            Err(e) => println!("! {e}"),
        },
        "/retry" => match resolve_pending(session, arg) {
            Some(local_id) => {
                if let Err(e) = session.retry(&local_id) {
                    println!("! {e}");
                }
            }
            None => println!("! no such pending message: {arg}"),
        },
        "/retract" => match resolve_pending(session, arg) {
            Some(local_id) => match session.retract(&local_id) {
                Ok(_) => render(session),
                Err(e) => println!("! {e}"),
            },
            None => println!("! no such pending message: {arg}"),
        },
        "/metrics" => print!("{}", gather_text()),
        "/json" => match serde_json::to_string_pretty(&session.render()) {
            Ok(json) => println!("{json}"),
            Err(e) => println!("! {e}"),
        },
        _ if command.starts_with('/') => println!("! unknown command, try /help"),
        _ => match session.send(input) {
            Ok(_) => render(session),
            Err(e) => println!("! {e}"),
        },
    }
    true
}

async fn open(session: &mut ChatSession, target: RoomTarget) {
    match session.open_room(target).await {
        Ok(_) => render(session),
        Err(e) => println!("! {e}"),
    }
}

/// 支持完整 local_id 或待确认列表中的序号（从 1 开始）
fn resolve_pending(session: &ChatSession, arg: &str) -> Option<LocalId> {
    let pending = session.pending();
    if let Ok(index) = arg.parse::<usize>() {
        return index
            .checked_sub(1)
            .and_then(|i| pending.get(i))
            .map(|entry| entry.local_id.clone());
    }
    pending
        .into_iter()
        .find(|entry| entry.local_id.as_str() == arg)
        .map(|entry| entry.local_id)
}

fn seed_directory(directory: &InMemoryUserDirectory, me: &SenderIdentity) {
    for (user_id, name) in DEMO_USERS {
        directory.upsert(UserProfile {
            user_id: user_id.to_string(),
            display_name: Some(name.to_string()),
            avatar_ref: None,
            last_seen: None,
        });
    }
    directory.upsert(UserProfile {
        user_id: me.sender_id.clone(),
        display_name: me.display_name.clone(),
        avatar_ref: me.avatar_ref.clone(),
        last_seen: Some(Utc::now()),
    });
}

fn render(session: &ChatSession) {
    let Some(room) = session.active_room() else {
        return;
    };

    println!();
    println!("=== {} ===", room.title);
    let view = session.render();
    if view.is_empty() {
        println!("  (no messages yet)");
    }

    let mut pending_index = 0;
    for entry in &view {
        if entry.is_pending() {
            pending_index += 1;
        }
        println!("{}", format_entry(entry, pending_index));
    }

    if let Some(error) = session.send_error() {
        println!("! send failed: {error}");
    }
}

fn format_entry(entry: &DisplayEntry, pending_index: usize) -> String {
    let time = entry
        .timestamp()
        .map(format_clock_time)
        .unwrap_or_else(|| "--:--".to_string());
    let who = if entry.is_own {
        "me".to_string()
    } else {
        entry.message.sender_id().to_string()
    };

    let mut line = format!("[{time}] {who}: {}", entry.message.text());
    match entry.pending_status() {
        Some(PendingStatus::Sending) => line.push_str(&format!("  (sending #{pending_index})")),
        Some(PendingStatus::Failed) => line.push_str(&format!(
            "  (failed #{pending_index}: {}; /retry {pending_index})",
            entry.last_error().unwrap_or("unknown error")
        )),
        None => {}
    }
    line
}

fn print_contacts(contacts: &[UserProfile]) {
    println!("Contacts:");
    for contact in contacts {
        println!(
            "  {} ({})",
            contact.user_id,
            contact.display_name.as_deref().unwrap_or("Unknown User")
        );
    }
}

fn print_help() {
    println!("Commands:");
    println!("  <text>            send a message to the current room");
    println!("  /public           open the public room");
    println!("  /dm <user_id>     open a direct room");
    println!("  /contacts         list other users");
    println!("  /retry <n|id>     resend a failed message");
    println!("  /retract <n|id>   drop a pending message");
    println!("  /metrics          dump client metrics");
    println!("  /json             dump the current view as JSON");
    println!("  quit | exit       leave");
}
