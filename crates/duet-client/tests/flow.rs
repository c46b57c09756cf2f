use std::sync::{Arc, Mutex};
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as B64;

use duet_api::channel::MessageChannel;
use duet_client::overlay::OptimisticOverlay;
use duet_client::session::ReceiverSession;
use duet_client::view::ConversationView;
use duet_db::Database;
use duet_gateway::dispatcher::Dispatcher;
use duet_media::bridge::{BridgeCredentials, LocalAccounts, StorageBridge};
use duet_media::local::LocalMedia;
use duet_media::resolver::MediaResolver;
use duet_media::signer::HmacSigner;
use duet_media::storage::ObjectStorage;
use duet_types::identity::build_conversation_id;
use duet_types::models::{Identity, MediaKind, Message, MessageKind, MessagePayload, MessageStatus};

fn channel() -> MessageChannel {
    MessageChannel::new(Arc::new(Database::open_in_memory().unwrap()), Dispatcher::new())
}

/// Make every status write fail until [`release_status_writes`].
fn hold_status_writes(db: &Database) {
    db.with_conn(|conn| {
        conn.execute_batch(
            "CREATE TRIGGER hold_status BEFORE UPDATE ON messages
             BEGIN SELECT RAISE(ABORT, 'status writes held'); END;",
        )?;
        Ok(())
    })
    .unwrap();
}

fn release_status_writes(db: &Database) {
    db.with_conn(|conn| {
        conn.execute_batch("DROP TRIGGER hold_status;")?;
        Ok(())
    })
    .unwrap();
}

/// Poll the history until a message satisfies `pred`.
async fn wait_for<F>(channel: &MessageChannel, conversation_id: &str, pred: F) -> Message
where
    F: Fn(&Message) -> bool,
{
    for _ in 0..200 {
        let history = channel.history(conversation_id).await.unwrap();
        if let Some(found) = history.into_iter().find(|m| pred(m)) {
            return found;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition never held in {conversation_id}");
}

#[tokio::test]
async fn test_send_receive_view() {
    let channel = channel();
    let cid = build_conversation_id("u1", "u2");

    let sent = channel
        .send(&cid, MessagePayload::text("hi"), &Identity::new("u1"), None)
        .await
        .unwrap();
    assert_eq!(sent.status, MessageStatus::Delivered);

    // u2 comes online: the message is marked sent
    let mut session = ReceiverSession::new(channel.clone(), Identity::new("u2"));
    session.watch(&cid);
    let on_device = wait_for(&channel, &cid, |m| m.status == MessageStatus::Sent).await;
    assert_eq!(on_device.delivered_at, sent.delivered_at);
    assert!(on_device.sent_at.is_some());
    assert_eq!(session.attempted_len(), 1);

    // u2 opens the conversation: it is marked seen
    let rendered = Arc::new(Mutex::new(Vec::new()));
    let sink = rendered.clone();
    let view = session.open(&cid, move |snapshot| sink.lock().unwrap().push(snapshot));
    let seen = wait_for(&channel, &cid, |m| m.status == MessageStatus::Seen).await;
    assert_eq!(seen.delivered_at, sent.delivered_at);
    assert_eq!(seen.sent_at, on_device.sent_at);
    assert!(seen.seen_at.is_some());
    assert!(!rendered.lock().unwrap().is_empty());
    view.close();

    // Nothing moves it back afterwards
    assert!(!channel.mark_sent(&cid, &sent.id, &Identity::new("u2")).await.unwrap());
    let history = channel.history(&cid).await.unwrap();
    assert_eq!(history[0].status, MessageStatus::Seen);
}

#[tokio::test]
async fn test_sender_session_leaves_own_messages() {
    let channel = channel();
    let mut session = ReceiverSession::new(channel.clone(), Identity::new("u1"));
    session.watch("u1__u2");

    channel
        .send("u1__u2", MessagePayload::text("hi"), &Identity::new("u1"), None)
        .await
        .unwrap();
    // Give the live query time to emit
    tokio::time::sleep(Duration::from_millis(100)).await;

    let history = channel.history("u1__u2").await.unwrap();
    assert_eq!(history[0].status, MessageStatus::Delivered);
    assert_eq!(session.attempted_len(), 0);
}

#[tokio::test]
async fn test_messages_arriving_while_watching() {
    let channel = channel();
    let mut session = ReceiverSession::new(channel.clone(), Identity::new("u2"));
    session.watch("u1__u2");

    for text in ["one", "two", "three"] {
        channel
            .send("u1__u2", MessagePayload::text(text), &Identity::new("u1"), None)
            .await
            .unwrap();
    }
    for _ in 0..200 {
        let history = channel.history("u1__u2").await.unwrap();
        if history.iter().all(|m| m.status == MessageStatus::Sent) {
            let texts: Vec<_> = history.iter().map(|m| m.content.clone().unwrap()).collect();
            assert_eq!(texts, ["one", "two", "three"]);
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("messages were never marked sent");
}

#[tokio::test]
async fn test_optimistic_send_then_stream() {
    let channel = channel();
    let overlay = OptimisticOverlay::new(channel.clone(), Identity::new("u1"));

    let msg = overlay.submit("u1__u2", MessagePayload::text("hi")).await.unwrap();
    let snapshot = channel.history("u1__u2").await.unwrap();
    assert_eq!(overlay.view("u1__u2", &snapshot), vec![msg]);
}

#[tokio::test]
async fn test_video_upload_and_resolve() {
    let dir = std::env::temp_dir().join(format!("duet_flow_{}", uuid::Uuid::new_v4()));
    let storage = Arc::new(ObjectStorage::new(dir).await.unwrap());
    let signer = HmacSigner::new("flow-secret", "http://localhost:3000");
    let accounts = Arc::new(LocalAccounts::new());
    let backend = LocalMedia::new(storage.clone(), signer.clone(), accounts.clone());
    let bridge = StorageBridge::new(
        accounts,
        BridgeCredentials {
            login: "u1@duet".into(),
            secret: "pw".into(),
        },
    );
    let resolver = MediaResolver::new(backend, bridge);

    let local = format!("data:video/mp4;base64,{}", B64.encode([0u8, 0, 0, 24]));
    let path = resolver.upload(&local, MediaKind::Video, "u1__u2", "u1").await.unwrap();
    assert!(path.starts_with("u1__u2/u1/videos/"));
    assert!(path.ends_with(".mp4"));
    assert!(storage.exists(&path).await.unwrap());

    let channel = channel();
    let msg = channel
        .send("u1__u2", MessagePayload::media(MediaKind::Video, &path), &Identity::new("u1"), None)
        .await
        .unwrap();
    assert_eq!(msg.kind, MessageKind::Video);
    assert_eq!(msg.content, None);
    assert_eq!(msg.media_url.as_deref(), Some(path.as_str()));
    let convo = channel.store().get("u1__u2").await.unwrap().unwrap();
    assert_eq!(convo.last_message, "[Video]");

    let url = resolver.resolve(&path).await.unwrap();
    assert_eq!(resolver.resolve(&path).await.unwrap(), url);
    let query = url.split_once('?').unwrap().1;
    let mut expires = 0;
    let mut sig = "";
    for kv in query.split('&') {
        match kv.split_once('=') {
            Some(("expires", v)) => expires = v.parse().unwrap(),
            Some(("sig", v)) => sig = v,
            _ => {}
        }
    }
    signer.verify(&path, expires, sig, chrono::Utc::now()).unwrap();
}

#[tokio::test]
async fn test_failed_sent_write_is_retried_on_next_snapshot() {
    let db = Arc::new(Database::open_in_memory().unwrap());
    let channel = MessageChannel::new(db.clone(), Dispatcher::new());
    let msg = channel
        .send("u1__u2", MessagePayload::text("hi"), &Identity::new("u1"), None)
        .await
        .unwrap();

    hold_status_writes(&db);
    let mut session = ReceiverSession::new(channel.clone(), Identity::new("u2"));
    session.watch("u1__u2");
    tokio::time::sleep(Duration::from_millis(200)).await;

    // The attempt failed and was forgotten
    assert_eq!(channel.history("u1__u2").await.unwrap()[0].status, MessageStatus::Delivered);
    assert_eq!(session.attempted_len(), 0);

    release_status_writes(&db);
    channel.live().dispatcher().notify("u1__u2");
    let sent = wait_for(&channel, "u1__u2", |m| m.status == MessageStatus::Sent).await;
    assert_eq!(sent.id, msg.id);
    assert_eq!(session.attempted_len(), 1);
}

#[tokio::test]
async fn test_failed_seen_write_is_retried_on_next_snapshot() {
    let db = Arc::new(Database::open_in_memory().unwrap());
    let channel = MessageChannel::new(db.clone(), Dispatcher::new());
    channel
        .send("u1__u2", MessagePayload::text("hi"), &Identity::new("u1"), None)
        .await
        .unwrap();

    hold_status_writes(&db);
    let view = ConversationView::open(&channel, Identity::new("u2"), "u1__u2", |_| {});
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(channel.history("u1__u2").await.unwrap()[0].status, MessageStatus::Delivered);

    release_status_writes(&db);
    channel.live().dispatcher().notify("u1__u2");
    let seen = wait_for(&channel, "u1__u2", |m| m.status == MessageStatus::Seen).await;
    assert!(seen.sent_at.is_none());
    assert!(seen.seen_at.is_some());
    view.close();
}
