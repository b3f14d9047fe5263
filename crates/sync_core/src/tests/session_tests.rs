use std::sync::Arc;

use super::*;
use crate::{
    backend::MessagingBackend,
    fixtures::{at, contact, memory_context, message, private_channel, user, with_messages},
    memory::{InMemoryBackend, InMemoryContacts},
    scroll::ScrollAction,
};
use shared::domain::MessageId;

struct Started {
    ann: ChatUser,
    bo: ChatUser,
    backend: Arc<InMemoryBackend>,
    session: ChatSession,
    events: broadcast::Receiver<SessionEvent>,
}

fn x() -> Cid {
    Cid::messaging("x")
}

fn y() -> Cid {
    Cid::messaging("y")
}

fn director() -> ChatUser {
    user("me", "Me Director", UserRole::CastingDirector)
}

/// Channel `x` with Ann is the most recent, `y` with Bo the older one.
fn seeded(me: &ChatUser) -> (ChatUser, ChatUser, Arc<InMemoryBackend>, SessionContext) {
    let ann = user("ann", "Ann Actor", UserRole::Actor);
    let bo = user("bo", "Bo Actor", UserRole::Actor);
    let (backend, ctx) = memory_context(me);
    backend.insert_channel(with_messages(
        private_channel("x", me, &ann),
        vec![message("x1", &ann, "hello", at(5))],
    ));
    backend.insert_channel(with_messages(
        private_channel("y", me, &bo),
        vec![message("y1", &bo, "hey", at(1))],
    ));
    (ann, bo, backend, ctx)
}

async fn started() -> Started {
    let (ann, bo, backend, ctx) = seeded(&director());
    let mut session = ChatSession::new(ctx);
    let events = session.subscribe();
    session.start().await;
    session.process_pending().await;
    Started {
        ann,
        bo,
        backend,
        session,
        events,
    }
}

fn drain_events(events: &mut broadcast::Receiver<SessionEvent>) -> Vec<SessionEvent> {
    std::iter::from_fn(|| events.try_recv().ok()).collect()
}

fn order(session: &ChatSession) -> Vec<String> {
    session
        .directory
        .cids()
        .iter()
        .map(|cid| cid.id.to_string())
        .collect()
}

#[test]
fn profile_patch_carries_only_differences() {
    let mut stored = director();
    stored.custom_id = Some("c-1".into());
    let profile = LoginProfile {
        name: "Me Director".into(),
        image: None,
        role: UserRole::CastingDirector,
        custom_id: Some("c-1".into()),
        custom_gender_pronoun: None,
        is_minor: false,
    };
    assert!(profile_patch(&stored, &profile).is_empty());

    let profile = LoginProfile {
        name: "Me Renamed".into(),
        image: Some("https://img.local/me.png".into()),
        role: UserRole::Agent,
        ..profile
    };
    let patch = profile_patch(&stored, &profile);
    assert_eq!(patch.name.as_deref(), Some("Me Renamed"));
    assert_eq!(patch.image.as_deref(), Some("https://img.local/me.png"));
    assert_eq!(patch.role, Some(UserRole::Agent));
    assert_eq!(patch.custom_id, None);
}

#[tokio::test]
async fn login_syncs_a_stale_profile_and_opens_the_latest_channel() {
    let stale = user("me", "Me", UserRole::default());
    let (_, _, backend, ctx) = seeded(&stale);
    let profile = LoginProfile {
        name: "Me Director".into(),
        role: UserRole::CastingDirector,
        ..LoginProfile::default()
    };

    let session = ChatSession::login(ctx, &profile).await.expect("login");

    assert_eq!(session.ctx().user().name, "Me Director");
    assert_eq!(session.ctx().user().role, UserRole::CastingDirector);
    assert_eq!(session.active_cid(), Some(&x()));
    let calls = backend.calls();
    assert_eq!(calls[0], "current_user");
    assert_eq!(calls[1], "partial_update_user me");
    assert_eq!(calls[2], "query_channels offset=0 limit=20");
    assert_eq!(calls[3], "watch_channel messaging:x");
}

#[tokio::test]
async fn login_with_current_profile_skips_the_update() {
    let me = director();
    let (_, _, backend, ctx) = seeded(&me);
    let profile = LoginProfile {
        name: me.name.clone(),
        role: me.role,
        is_minor: true,
        ..LoginProfile::default()
    };

    let session = ChatSession::login(ctx, &profile).await.expect("login");

    assert_eq!(backend.calls_named("partial_update_user"), 0);
    assert!(session.ctx().is_minor());
}

#[tokio::test]
async fn start_reports_directory_then_active_channel() {
    let (_, _, _, ctx) = seeded(&director());
    let mut session = ChatSession::new(ctx);
    let mut events = session.subscribe();

    session.start().await;

    assert_eq!(
        drain_events(&mut events),
        vec![
            SessionEvent::DirectoryChanged,
            SessionEvent::ActiveChannelChanged(Some(x())),
            SessionEvent::TimelineChanged(x()),
            SessionEvent::Scroll(ScrollAction::ScrollToBottom),
        ]
    );
    assert_eq!(order(&session), vec!["x", "y"]);
}

#[tokio::test]
async fn background_message_reorders_and_lights_the_badge() {
    let mut started = started().await;
    drain_events(&mut started.events);
    assert!(!started.session.has_unread());

    started
        .backend
        .receive(&y(), message("y2", &started.bo, "ping", at(10)));
    started.session.process_pending().await;

    assert_eq!(order(&started.session), vec!["y", "x"]);
    assert!(started.session.has_unread());
    let events = drain_events(&mut started.events);
    assert!(events.contains(&SessionEvent::UnreadBadgeChanged(true)));
    assert!(events.contains(&SessionEvent::DirectoryChanged));
    assert!(!events.contains(&SessionEvent::TimelineChanged(y())));
    assert_eq!(
        started
            .session
            .directory
            .find(&y())
            .map(|entry| entry.unread_count()),
        Some(1)
    );
}

#[tokio::test]
async fn opening_an_unread_channel_recounts_it_after_mark_read() {
    let mut started = started().await;
    started
        .backend
        .receive(&y(), message("y2", &started.bo, "ping", at(10)));
    started.session.process_pending().await;

    started.session.activate(y()).await;
    started.session.settle().await;

    let entry = started.session.directory.find(&y()).expect("entry");
    assert_eq!(entry.unread_count(), 0);
    assert!(!started.session.has_unread());
    assert!(started.backend.calls_named("count_unread") >= 1);
}

#[tokio::test]
async fn active_channel_message_updates_the_timeline() {
    let mut started = started().await;
    drain_events(&mut started.events);

    started
        .backend
        .receive(&x(), message("x2", &started.ann, "there?", at(11)));
    started.session.process_pending().await;

    let texts: Vec<Option<String>> = started
        .session
        .view
        .timeline
        .messages()
        .iter()
        .map(|message| message.text.clone())
        .collect();
    assert_eq!(texts.last(), Some(&Some("there?".to_string())));
    let events = drain_events(&mut started.events);
    assert!(events.contains(&SessionEvent::TimelineChanged(x())));
    assert!(events.contains(&SessionEvent::Scroll(ScrollAction::ScrollToBottom)));
}

#[tokio::test]
async fn next_handles_one_queued_delivery() {
    let mut started = started().await;
    started
        .backend
        .receive(&y(), message("y2", &started.bo, "ping", at(10)));

    started.session.next().await;
    started.session.process_pending().await;

    assert_eq!(order(&started.session), vec!["y", "x"]);
}

#[tokio::test]
async fn externally_deleted_active_channel_closes_the_view() {
    let mut started = started().await;
    drain_events(&mut started.events);

    started
        .backend
        .delete_channel(&x())
        .await
        .expect("delete");
    started.session.process_pending().await;

    assert_eq!(started.session.active_cid(), None);
    assert_eq!(order(&started.session), vec!["y"]);
    assert!(drain_events(&mut started.events)
        .contains(&SessionEvent::ActiveChannelChanged(None)));
}

#[tokio::test]
async fn deleting_the_active_channel_closes_it_first() {
    let mut started = started().await;

    assert!(started.session.delete_channel(&x()).await);
    started.session.process_pending().await;

    assert_eq!(started.session.active_cid(), None);
    assert_eq!(order(&started.session), vec!["y"]);
}

#[tokio::test]
async fn leaving_the_active_channel_removes_it_from_the_directory() {
    let mut started = started().await;

    assert!(started.session.leave_channel(&x()).await);
    started.session.process_pending().await;

    assert_eq!(started.session.active_cid(), None);
    assert_eq!(order(&started.session), vec!["y"]);
}

#[tokio::test]
async fn deleting_a_summary_message_reloads_softly() {
    let mut started = started().await;
    started.backend.clear_calls();

    started
        .backend
        .delete_message(&MessageId::new("y1"))
        .await
        .expect("delete");
    started.session.process_pending().await;

    assert_eq!(started.backend.calls_named("query_channels"), 1);
    assert_eq!(started.backend.calls_named("watch_channel"), 0);
    assert_eq!(started.session.active_cid(), Some(&x()));
}

#[tokio::test]
async fn failed_action_raises_a_channel_action_notice() {
    let mut started = started().await;
    drain_events(&mut started.events);
    started.backend.fail("delete_channel");

    assert!(!started.session.delete_channel(&y()).await);

    let notices: Vec<NoticeContext> = drain_events(&mut started.events)
        .into_iter()
        .filter_map(|event| match event {
            SessionEvent::Notice(notice) => Some(notice.context()),
            _ => None,
        })
        .collect();
    assert_eq!(notices, vec![NoticeContext::ChannelAction]);
}

#[tokio::test]
async fn draft_conversation_becomes_a_channel_on_first_message() {
    let me = user("me", "Me Actor", UserRole::Actor);
    let cam = user("cam", "Cam Friend", UserRole::Actor);
    let friend = contact("a-cam", &cam);
    let (backend, ctx) = memory_context(&me);
    backend.add_user(cam.clone());
    let ctx = ctx.with_contacts(Arc::new(InMemoryContacts {
        actors: Vec::new(),
        friends: vec![friend.clone()],
    }));
    let mut session = ChatSession::new(ctx);
    let mut events = session.subscribe();
    session.start().await;

    session
        .select_search_result(SearchResult::Contact(friend.clone()))
        .await;
    assert_eq!(session.directory.draft(), Some(&friend));
    assert!(drain_events(&mut events).contains(&SessionEvent::DraftOpened(friend.clone())));

    assert!(session.send_first_message("hi Cam", &[]).await);
    session.process_pending().await;

    let cid = Cid::messaging("!members-cam-me");
    assert_eq!(session.active_cid(), Some(&cid));
    assert!(session.directory.draft().is_none());
    assert_eq!(order(&session), vec!["!members-cam-me"]);
    let texts: Vec<String> = session
        .view
        .timeline
        .messages()
        .iter()
        .filter_map(|message| message.text.clone())
        .collect();
    assert_eq!(texts, vec!["Private chat created".to_string(), "hi Cam".to_string()]);
}

#[tokio::test]
async fn failed_first_message_keeps_the_draft() {
    let me = user("me", "Me Actor", UserRole::Actor);
    let cam = user("cam", "Cam Friend", UserRole::Actor);
    let friend = contact("a-cam", &cam);
    let (backend, ctx) = memory_context(&me);
    let ctx = ctx.with_contacts(Arc::new(InMemoryContacts {
        actors: Vec::new(),
        friends: vec![friend.clone()],
    }));
    let mut session = ChatSession::new(ctx);
    session.start().await;
    session
        .select_search_result(SearchResult::Contact(friend.clone()))
        .await;
    backend.fail("create_channel");

    assert!(!session.send_first_message("hi Cam", &[]).await);
    assert_eq!(session.directory.draft(), Some(&friend));
    assert_eq!(session.active_cid(), None);
}

#[tokio::test]
async fn new_group_is_opened_and_listed() {
    let mut started = started().await;

    assert!(
        started
            .session
            .create_group(GroupDetails {
                name: "Spring Shoot".into(),
                description: String::new(),
                image: None,
            })
            .await
    );
    started.session.process_pending().await;

    let active = started.session.active_cid().cloned().expect("group open");
    assert_eq!(started.session.directory.cids()[0], &active);
    assert!(started
        .session
        .view
        .channel()
        .is_some_and(|channel| channel.is_group()));
}

#[tokio::test]
async fn recount_outliving_the_session_finishes_quietly() {
    let mut started = started().await;
    started
        .backend
        .receive(&y(), message("y2", &started.bo, "ping", at(10)));
    started.session.process_pending().await;
    started.session.activate(y()).await;
    started.session.process_pending().await;
    let backend = started.backend.clone();

    drop(started);
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;

    assert!(backend.calls_named("count_unread") >= 1);
}

#[tokio::test]
async fn logout_releases_every_subscription() {
    let started = started().await;
    let bus = started.session.ctx().bus.clone();
    assert!(bus.subscription_count() > 0);

    started.session.logout();

    assert_eq!(bus.subscription_count(), 0);
}
