use std::sync::Arc;

use serde_json::json;

use super::*;
use crate::{
    backend::MessagingBackend,
    context::SessionEvent,
    fixtures::{at, group_channel, memory_context, message, private_channel, user, with_messages},
    memory::{InMemoryBackend, RecordingAnalytics},
};
use shared::{
    domain::{AttachmentKind, MessageCustomType, UserRole},
    protocol::ChatUser,
};

fn director() -> ChatUser {
    user("me", "Me Director", UserRole::CastingDirector)
}

fn ann() -> ChatUser {
    user("ann", "Ann Actor", UserRole::Actor)
}

fn file(name: &str) -> Attachment {
    Attachment::uploaded(
        AttachmentKind::File,
        format!("https://files.local/{name}"),
        name,
        4,
    )
}

fn png(name: &str) -> FileUpload {
    let mut bytes = b"\x89PNG\r\n\x1a\n".to_vec();
    bytes.extend_from_slice(&[0; 16]);
    FileUpload::new(name, bytes)
}

fn recording(ctx: SessionContext) -> (Arc<RecordingAnalytics>, SessionContext) {
    let analytics = Arc::new(RecordingAnalytics::default());
    let ctx = ctx.with_analytics(analytics.clone());
    (analytics, ctx)
}

fn stored(backend: &InMemoryBackend, cid: &Cid) -> Channel {
    backend.channel(cid).expect("channel stored")
}

#[tokio::test]
async fn send_with_failed_upload_still_sends_the_text() {
    let me = director();
    let (backend, ctx) = memory_context(&me);
    backend.insert_channel(private_channel("p1", &me, &ann()));
    let channel = stored(&backend, &Cid::messaging("p1"));
    let mut events = ctx.subscribe();
    backend.fail("send_image");

    let sent = send_message(&ctx, &channel, "hello", &[png("head.png")], None)
        .await
        .expect("send")
        .expect("message");

    assert_eq!(sent.text.as_deref(), Some("hello"));
    assert!(sent.attachments.is_empty());
    match events.try_recv() {
        Ok(SessionEvent::Notice(notice)) => assert_eq!(notice.context(), NoticeContext::Upload),
        other => panic!("expected an upload notice, got {other:?}"),
    }
}

#[tokio::test]
async fn send_with_nothing_left_is_skipped() {
    let me = director();
    let (backend, ctx) = memory_context(&me);
    backend.insert_channel(private_channel("p1", &me, &ann()));
    let channel = stored(&backend, &Cid::messaging("p1"));

    assert!(send_message(&ctx, &channel, "", &[], None)
        .await
        .expect("noop")
        .is_none());
    assert!(backend.calls().is_empty());

    backend.fail("send_image");
    assert!(send_message(&ctx, &channel, "", &[png("head.png")], None)
        .await
        .expect("upload failure is not a send failure")
        .is_none());
    assert_eq!(backend.calls_named("send_message"), 0);
}

#[tokio::test]
async fn send_keeps_the_correlation_id_and_records_analytics() {
    let me = director();
    let (backend, ctx) = memory_context(&me);
    let (analytics, ctx) = recording(ctx);
    backend.insert_channel(private_channel("p1", &me, &ann()));
    let channel = stored(&backend, &Cid::messaging("p1"));

    let sent = send_message(
        &ctx,
        &channel,
        "hi",
        &[png("head.png")],
        Some(MessageId::new("local-1")),
    )
    .await
    .expect("send")
    .expect("message");

    assert_eq!(sent.id, MessageId::new("local-1"));
    assert_eq!(
        sent.attachments[0].image_url(),
        Some("https://images.local/p1/head.png")
    );
    assert_eq!(
        analytics.events(),
        vec![(
            AnalyticsEvent::ChatMessageSent,
            json!({ "channelId": "p1", "memberId": "me", "type": "private" })
        )]
    );
}

#[test]
fn link_previews_are_never_removed() {
    let me = director();
    let mut original = message("m1", &me, "see", at(0));
    let preview = Attachment {
        title_link: Some("https://example.org".into()),
        ..Attachment::default()
    };
    original.attachments = vec![file("a"), preview, file("b")];

    assert_eq!(removed_attachments(&original, &[file("a")]), vec![file("b")]);
}

#[tokio::test]
async fn edit_deletes_dropped_files_and_appends_new_ones() {
    let me = director();
    let (backend, ctx) = memory_context(&me);
    let mut original = message("m1", &me, "old", at(0));
    original.attachments = vec![file("a"), file("b"), file("c")];
    backend.insert_channel(with_messages(
        group_channel("c1", "Crew", &[&me]),
        vec![original.clone()],
    ));
    let cid = Cid::messaging("c1");

    let edited = edit_message(
        &ctx,
        &cid,
        &original,
        "new",
        &[FileUpload::new("d.pdf", b"%PDF".to_vec())],
        &[file("a"), file("c")],
    )
    .await
    .expect("edit");

    assert_eq!(
        backend.calls(),
        vec![
            "send_file messaging:c1 d.pdf".to_string(),
            "delete_file messaging:c1 https://files.local/b".to_string(),
            "partial_update_message m1".to_string(),
        ]
    );
    let urls: Vec<&str> = edited
        .attachments
        .iter()
        .filter_map(Attachment::asset_url)
        .collect();
    assert_eq!(
        urls,
        vec![
            "https://files.local/a",
            "https://files.local/c",
            "https://files.local/c1/d.pdf",
        ]
    );
    assert!(edited.edited);
    assert_eq!(edited.text.as_deref(), Some("new"));
}

#[tokio::test]
async fn delete_removes_attachments_first() {
    let me = director();
    let (backend, ctx) = memory_context(&me);
    let mut doomed = message("m1", &me, "bye", at(0));
    doomed.attachments = vec![file("a")];
    backend.insert_channel(with_messages(
        group_channel("c1", "Crew", &[&me]),
        vec![doomed.clone()],
    ));
    backend.fail("delete_file");

    let deleted = delete_message(&ctx, &Cid::messaging("c1"), &doomed)
        .await
        .expect("delete despite attachment failure");

    assert!(deleted.is_deleted());
    assert_eq!(
        backend.calls(),
        vec![
            "delete_file messaging:c1 https://files.local/a".to_string(),
            "delete_message m1".to_string(),
        ]
    );
}

#[tokio::test]
async fn pin_toggle_keeps_at_most_one_pinned_message() {
    let me = director();
    let (backend, ctx) = memory_context(&me);
    let cid = Cid::messaging("c1");
    backend.insert_channel(with_messages(
        group_channel("c1", "Crew", &[&me]),
        vec![message("n", &me, "n", at(0)), message("m", &me, "m", at(1))],
    ));
    backend.pin_message(&MessageId::new("n")).await.expect("pin n");
    backend.clear_calls();

    let channel = stored(&backend, &cid);
    let m = channel.state.messages[1].clone();
    toggle_pin(&ctx, &channel, &m).await.expect("pin m");
    assert_eq!(
        backend.calls(),
        vec!["unpin_message n".to_string(), "pin_message m".to_string()]
    );

    let channel = stored(&backend, &cid);
    let pinned: Vec<&str> = channel
        .state
        .pinned_messages
        .iter()
        .map(|message| message.id.as_str())
        .collect();
    assert_eq!(pinned, vec!["m"]);

    let m = channel.state.messages[1].clone();
    toggle_pin(&ctx, &channel, &m).await.expect("unpin m");
    assert!(stored(&backend, &cid).state.pinned_messages.is_empty());
}

#[tokio::test]
async fn availability_toggle_sets_role_then_flag() {
    let me = director();
    let ann = ann();
    let (backend, ctx) = memory_context(&me);
    let cid = Cid::messaging("p1");
    backend.insert_channel(private_channel("p1", &me, &ann));

    toggle_availability(&ctx, &stored(&backend, &cid))
        .await
        .expect("disable");
    assert_eq!(
        backend.calls(),
        vec![
            "update_member_role messaging:p1 ann channel_member_disabled_actor".to_string(),
            "update_channel_partial messaging:p1".to_string(),
        ]
    );
    let channel = stored(&backend, &cid);
    assert!(channel.data.unavailable_for_actors);
    assert!(!presence::is_channel_enabled_for_actors(&channel, &me.id));

    toggle_availability(&ctx, &channel).await.expect("enable");
    let channel = stored(&backend, &cid);
    assert!(!channel.data.unavailable_for_actors);
    assert_eq!(channel.state.members[&ann.id].channel_role, MemberRole::Member);
}

#[tokio::test]
async fn availability_toggle_issues_both_calls_when_the_first_fails() {
    let me = director();
    let (backend, ctx) = memory_context(&me);
    let cid = Cid::messaging("p1");
    backend.insert_channel(private_channel("p1", &me, &ann()));
    backend.fail("update_member_role");

    let result = toggle_availability(&ctx, &stored(&backend, &cid)).await;

    assert!(result.is_err());
    assert_eq!(backend.calls_named("update_channel_partial"), 1);
    assert!(stored(&backend, &cid).data.unavailable_for_actors);
}

#[tokio::test]
async fn availability_toggle_needs_a_companion() {
    let me = director();
    let (backend, ctx) = memory_context(&me);
    backend.insert_channel(group_channel("crew", "Crew", &[&me, &ann()]));

    let result = toggle_availability(&ctx, &stored(&backend, &Cid::messaging("crew"))).await;
    assert!(result.is_err());
    assert!(backend.calls().is_empty());
}

#[tokio::test]
async fn group_creation_posts_notice_and_promotes_creator() {
    let me = director();
    let (backend, ctx) = memory_context(&me);
    let (analytics, ctx) = recording(ctx);

    let channel = create_group_channel(
        &ctx,
        GroupDetails {
            name: "Spring Shoot".into(),
            description: "Callbacks".into(),
            image: None,
        },
    )
    .await
    .expect("create");

    let calls: Vec<String> = backend
        .calls()
        .iter()
        .map(|call| call.split(' ').next().unwrap_or_default().to_string())
        .collect();
    assert_eq!(
        calls,
        vec![
            "create_channel",
            "watch_channel",
            "send_message",
            "add_moderators"
        ]
    );
    let stored = stored(&backend, &channel.cid);
    assert!(stored.is_group());
    assert_eq!(stored.data.name, "Spring Shoot");
    assert_eq!(stored.state.members[&me.id].channel_role, MemberRole::Moderator);
    let notice = stored.last_message().expect("creation notice");
    assert_eq!(notice.text.as_deref(), Some(GROUP_CREATED_TEXT));
    assert_eq!(notice.custom_type, MessageCustomType::System);
    assert_eq!(
        analytics.events(),
        vec![(
            AnalyticsEvent::ChatCreated,
            json!({ "channelId": channel.cid.id, "creatorId": "me", "type": "group" })
        )]
    );
}

#[tokio::test]
async fn private_creation_derives_the_id_from_members() {
    let me = director();
    let ann = ann();
    let (backend, ctx) = memory_context(&me);
    backend.add_user(ann.clone());
    let (analytics, ctx) = recording(ctx);

    let channel = create_private_channel(&ctx, &ann.id).await.expect("create");

    assert_eq!(channel.cid, Cid::messaging("!members-ann-me"));
    assert!(!channel.is_group());
    assert!(!channel.data.unavailable_for_actors);
    let last = stored(&backend, &channel.cid);
    let notice = last.last_message().expect("creation notice");
    assert_eq!(notice.text.as_deref(), Some(PRIVATE_CREATED_TEXT));
    assert_eq!(analytics.events()[0].1["type"], json!("private"));
}

#[tokio::test]
async fn leaving_posts_a_farewell_and_removes_the_viewer() {
    let me = director();
    let (backend, ctx) = memory_context(&me);
    let (analytics, ctx) = recording(ctx);
    let cid = Cid::messaging("crew");
    backend.insert_channel(group_channel("crew", "Crew", &[&me, &ann()]));

    leave_channel(&ctx, &cid).await.expect("leave");

    let channel = stored(&backend, &cid);
    assert!(!channel.state.members.contains_key(&me.id));
    assert_eq!(
        channel.last_message().and_then(|m| m.text.as_deref()),
        Some("Me Director left the channel")
    );
    assert_eq!(analytics.events()[0].0, AnalyticsEvent::ChatLeft);
    assert_eq!(analytics.events()[0].1["memberId"], json!("me"));
}

#[tokio::test]
async fn moderators_can_be_added_and_demoted() {
    let me = director();
    let ann = ann();
    let (backend, ctx) = memory_context(&me);
    let cid = Cid::messaging("crew");
    backend.insert_channel(group_channel("crew", "Crew", &[&me, &ann]));

    add_moderators(&ctx, &cid, &[ann.id.clone()]).await.expect("promote");
    assert!(stored(&backend, &cid).state.members[&ann.id].is_moderator);

    demote_moderators(&ctx, &cid, &[ann.id.clone()]).await.expect("demote");
    assert!(!stored(&backend, &cid).state.members[&ann.id].is_moderator);
}
