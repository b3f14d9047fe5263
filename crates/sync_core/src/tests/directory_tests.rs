use std::sync::Arc;

use super::*;
use crate::{
    context::SessionEvent,
    fixtures::{at, contact, group_channel, memory_context, message, private_channel, user, with_messages},
    memory::InMemoryBackend,
    MessagingBackend,
};
use shared::{
    domain::{MemberRole, MessageId, UserRole},
    protocol::{ChannelMembership, ChannelPatch, ChatUser, MessagePatch},
};

struct World {
    me: ChatUser,
    ann: ChatUser,
    bo: ChatUser,
    backend: Arc<InMemoryBackend>,
    ctx: SessionContext,
}

fn x() -> Cid {
    Cid::messaging("x")
}

fn y() -> Cid {
    Cid::messaging("y")
}

/// `x` with Ann (latest activity), then `y` with Bo.
fn world(channels_fetch_limit: u32) -> World {
    let me = user("me", "Me Director", UserRole::CastingDirector);
    let ann = user("ann", "Ann Actor", UserRole::Actor);
    let bo = user("bo", "Bo Actor", UserRole::Actor);
    let (backend, mut ctx) = memory_context(&me);
    ctx.settings.channels_fetch_limit = channels_fetch_limit;
    backend.insert_channel(with_messages(
        private_channel("x", &me, &ann),
        vec![message("x1", &ann, "hello", at(5))],
    ));
    backend.insert_channel(with_messages(
        private_channel("y", &me, &bo),
        vec![message("y1", &bo, "hey", at(1))],
    ));
    World {
        me,
        ann,
        bo,
        backend,
        ctx,
    }
}

async fn loaded(world: &World) -> ChannelDirectory {
    let mut directory = ChannelDirectory::new(&world.ctx);
    directory.mount();
    directory.load_first_page(&world.ctx, None).await;
    directory
}

async fn drain(
    directory: &mut ChannelDirectory,
    ctx: &SessionContext,
    active: Option<&Cid>,
    near_bottom: bool,
) -> Vec<DirectoryOutcome> {
    let mut outcomes = Vec::new();
    while let Some(delivery) = directory.try_next() {
        let state = ActiveState {
            cid: active,
            near_bottom,
        };
        outcomes.push(directory.handle(ctx, &delivery, state).await);
    }
    outcomes
}

fn order(directory: &ChannelDirectory) -> Vec<String> {
    directory.cids().iter().map(|cid| cid.id.to_string()).collect()
}

fn effects(outcomes: Vec<DirectoryOutcome>) -> Vec<DirectoryEffect> {
    outcomes.into_iter().flat_map(|outcome| outcome.effects).collect()
}

#[tokio::test]
async fn first_page_auto_selects_the_most_recent_channel() {
    let world = world(20);
    let mut directory = ChannelDirectory::new(&world.ctx);
    directory.mount();
    assert!(directory.is_loading());

    let selected = directory.load_first_page(&world.ctx, None).await;

    assert_eq!(selected, Some(x()));
    assert_eq!(order(&directory), vec!["x", "y"]);
    assert!(!directory.is_loading());
    assert!(!directory.has_next_page());
    assert!(directory.entries().iter().all(DirectoryEntry::is_listening));
}

#[tokio::test]
async fn draft_or_active_channel_suppresses_auto_select() {
    let world = world(20);
    let mut directory = ChannelDirectory::new(&world.ctx);
    directory.mount();
    assert_eq!(directory.load_first_page(&world.ctx, Some(&y())).await, None);

    directory.open_draft(contact("a-ann", &world.ann));
    assert_eq!(directory.reload(&world.ctx, true, None).await, None);
    assert!(directory.clear_draft().is_some());
}

#[tokio::test]
async fn failed_soft_reload_keeps_the_list_and_raises_a_notice() {
    let world = world(20);
    let mut directory = loaded(&world).await;
    let mut notices = world.ctx.subscribe();

    world.backend.fail("query_channels");
    assert_eq!(directory.reload(&world.ctx, false, None).await, None);

    assert_eq!(order(&directory), vec!["x", "y"]);
    assert!(!directory.is_loading());
    match notices.try_recv() {
        Ok(SessionEvent::Notice(notice)) => {
            assert_eq!(notice.context(), NoticeContext::LoadChannels)
        }
        other => panic!("expected a notice, got {other:?}"),
    }
}

#[tokio::test]
async fn hard_reload_starts_from_an_empty_list() {
    let world = world(20);
    let mut directory = loaded(&world).await;
    let mut notices = world.ctx.subscribe();

    world.backend.fail("query_channels");
    assert_eq!(directory.reload(&world.ctx, true, None).await, None);

    assert!(directory.entries().is_empty());
    assert!(!directory.is_loading());
    assert!(matches!(notices.try_recv(), Ok(SessionEvent::Notice(_))));

    world.backend.receive(&y(), message("y2", &world.bo, "ping", at(10)));
    drain(&mut directory, &world.ctx, None, true).await;
    assert!(directory.find(&x()).is_none());

    world.backend.recover("query_channels");
    assert_eq!(directory.reload(&world.ctx, true, None).await, Some(y()));
    assert_eq!(order(&directory), vec!["y", "x"]);
}

#[tokio::test]
async fn activity_moves_a_known_channel_to_the_front_without_requerying() {
    let world = world(20);
    let mut directory = loaded(&world).await;
    world.backend.clear_calls();

    world
        .backend
        .receive(&y(), message("y2", &world.bo, "ping", at(10)));
    let outcomes = drain(&mut directory, &world.ctx, None, true).await;

    assert!(outcomes.iter().any(|outcome| outcome.changed));
    assert_eq!(order(&directory), vec!["y", "x"]);
    assert_eq!(world.backend.calls_named("query_channels"), 0);
    let entry = directory.find(&y()).expect("entry");
    assert_eq!(entry.last_message().map(|m| m.id.as_str()), Some("y2"));
    assert_eq!(entry.unread_count(), 1);
}

#[tokio::test]
async fn replayed_activity_converges() {
    let world = world(20);
    let mut directory = loaded(&world).await;
    let ping = message("y2", &world.bo, "ping", at(10));
    let event = ChatEvent::for_channel(EventKind::MessageNew, y()).with_message(ping);

    world.backend.publish(event.clone());
    drain(&mut directory, &world.ctx, None, true).await;
    world.backend.publish(event);
    drain(&mut directory, &world.ctx, None, true).await;

    assert_eq!(order(&directory), vec!["y", "x"]);
    let entry = directory.find(&y()).expect("entry");
    assert_eq!(entry.unread_count(), 1);
    assert_eq!(entry.channel.state.unread_count, 1);
}

#[tokio::test]
async fn open_channel_at_bottom_keeps_its_displayed_count() {
    let world = world(20);
    let mut directory = loaded(&world).await;

    world
        .backend
        .receive(&x(), message("x2", &world.ann, "there?", at(11)));
    drain(&mut directory, &world.ctx, Some(&x()), true).await;

    let entry = directory.find(&x()).expect("entry");
    assert_eq!(entry.unread_count(), 0);
    assert_eq!(entry.channel.state.unread_count, 1);
    assert_eq!(entry.last_message().map(|m| m.id.as_str()), Some("x2"));
}

#[tokio::test]
async fn unknown_channel_activity_is_looked_up_and_prepended() {
    let world = world(20);
    let mut directory = loaded(&world).await;
    let cy = user("cy", "Cy Actor", UserRole::Actor);
    world
        .backend
        .insert_channel(private_channel("z", &world.me, &cy));
    world.backend.clear_calls();

    world
        .backend
        .receive(&Cid::messaging("z"), message("z1", &cy, "hi", at(12)));
    drain(&mut directory, &world.ctx, None, true).await;

    assert_eq!(order(&directory), vec!["z", "x", "y"]);
    assert_eq!(world.backend.calls_named("query_channels"), 1);
    assert!(directory
        .find(&Cid::messaging("z"))
        .is_some_and(DirectoryEntry::is_listening));
}

#[tokio::test]
async fn added_to_channel_prepends_it_once() {
    let world = world(20);
    let mut directory = loaded(&world).await;
    let crew = group_channel("crew", "Crew", &[&world.me, &world.ann]);
    world.backend.insert_channel(crew.clone());
    let added = ChatEvent::for_channel(EventKind::NotificationAddedToChannel, crew.cid.clone())
        .with_channel(crew);

    world.backend.publish(added.clone());
    world.backend.publish(added);
    drain(&mut directory, &world.ctx, None, true).await;

    assert_eq!(order(&directory), vec!["crew", "x", "y"]);
}

#[tokio::test]
async fn mark_read_asks_for_a_delayed_recount() {
    let world = world(20);
    let mut directory = loaded(&world).await;
    world
        .backend
        .receive(&x(), message("x2", &world.ann, "there?", at(11)));
    drain(&mut directory, &world.ctx, None, true).await;
    assert_eq!(directory.find(&x()).map(DirectoryEntry::unread_count), Some(1));

    world.backend.mark_read(&x()).await.expect("mark read");
    let effects = effects(drain(&mut directory, &world.ctx, None, true).await);

    assert_eq!(
        effects,
        vec![DirectoryEffect::RecountUnread {
            cid: x(),
            delay: world.ctx.settings.mark_read_settle_delay(),
        }]
    );
    assert!(directory.apply_recount(&x(), 0));
    assert!(!directory.apply_recount(&x(), 0));
    assert_eq!(directory.find(&x()).map(DirectoryEntry::unread_count), Some(0));
}

#[tokio::test]
async fn deleting_the_last_message_asks_for_a_soft_reload() {
    let world = world(20);
    let mut directory = loaded(&world).await;

    world
        .backend
        .delete_message(&MessageId::new("x1"))
        .await
        .expect("delete");
    let effects = effects(drain(&mut directory, &world.ctx, None, true).await);

    assert_eq!(effects, vec![DirectoryEffect::Reload { hard: false }]);
}

#[tokio::test]
async fn editing_the_last_message_replaces_the_summary() {
    let world = world(20);
    let mut directory = loaded(&world).await;

    world
        .backend
        .partial_update_message(
            &MessageId::new("y1"),
            MessagePatch {
                text: Some("edited".into()),
                ..Default::default()
            },
        )
        .await
        .expect("edit");
    drain(&mut directory, &world.ctx, None, true).await;

    let last = directory.find(&y()).and_then(DirectoryEntry::last_message);
    assert_eq!(last.and_then(|m| m.text.as_deref()), Some("edited"));
}

#[tokio::test]
async fn deleted_active_channel_is_evicted_and_cleared() {
    let world = world(20);
    let mut directory = loaded(&world).await;
    let before = world.ctx.bus.subscription_count();

    world.backend.delete_channel(&x()).await.expect("delete");
    let outcomes = drain(&mut directory, &world.ctx, Some(&x()), true).await;

    assert_eq!(order(&directory), vec!["y"]);
    assert_eq!(effects(outcomes), vec![DirectoryEffect::ActiveCleared]);
    assert_eq!(world.ctx.bus.subscription_count(), before - 5);
}

#[tokio::test]
async fn viewer_removed_from_a_channel_stops_listening_to_it() {
    let world = world(20);
    let mut directory = loaded(&world).await;
    let viewer = ChannelMembership::new(world.me.clone(), MemberRole::Member);
    let companion = ChannelMembership::new(world.bo.clone(), MemberRole::Member);

    world.backend.publish(
        ChatEvent::for_channel(EventKind::MemberRemoved, y()).with_member(companion),
    );
    drain(&mut directory, &world.ctx, None, true).await;
    assert!(directory.find(&y()).is_some_and(DirectoryEntry::is_listening));

    world
        .backend
        .publish(ChatEvent::for_channel(EventKind::MemberRemoved, y()).with_member(viewer));
    drain(&mut directory, &world.ctx, None, true).await;

    let entry = directory.find(&y()).expect("entry kept");
    assert!(!entry.is_listening());
    assert_eq!(entry.unread_count(), 0);
}

#[tokio::test]
async fn channel_updates_and_presence_refresh_entries() {
    let world = world(20);
    let mut directory = loaded(&world).await;
    let tick = directory.render_tick();

    world
        .backend
        .update_channel_partial(
            &x(),
            ChannelPatch {
                name: Some("Renamed".into()),
                ..ChannelPatch::default()
            },
        )
        .await
        .expect("update");
    let mut online = world.ann.clone();
    online.online = true;
    world
        .backend
        .publish(ChatEvent::new(EventKind::UserPresenceChanged).with_user(online));
    drain(&mut directory, &world.ctx, None, true).await;

    let entry = directory.find(&x()).expect("entry");
    assert_eq!(entry.channel.data.name, "Renamed");
    assert!(entry.channel.state.members[&world.ann.id].user.online);
    assert_eq!(directory.render_tick(), tick + 2);
}

#[tokio::test]
async fn next_page_appends_at_current_length() {
    let world = world(1);
    let mut directory = loaded(&world).await;
    assert_eq!(order(&directory), vec!["x"]);
    assert!(directory.has_next_page());

    assert!(directory.load_next_page(&world.ctx).await);
    assert!(directory.load_next_page(&world.ctx).await);
    assert!(!directory.load_next_page(&world.ctx).await);

    assert_eq!(order(&directory), vec!["x", "y"]);
    assert!(!directory.has_next_page());
    assert_eq!(
        world.backend.calls(),
        vec![
            "query_channels offset=0 limit=1".to_string(),
            "query_channels offset=1 limit=1".to_string(),
            "query_channels offset=2 limit=1".to_string(),
        ]
    );
}

#[tokio::test]
async fn unmount_drops_every_subscription() {
    let world = world(20);
    let mut directory = loaded(&world).await;
    assert!(world.ctx.bus.subscription_count() > 0);
    directory.unmount();
    assert_eq!(world.ctx.bus.subscription_count(), 0);
    assert!(!directory.entries().iter().any(DirectoryEntry::is_listening));
}
