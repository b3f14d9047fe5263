//! Replays scripted backend traffic against a logged-in session and checks
//! that the directory, the open timeline and the badge converge.

use std::sync::Arc;

use shared::{
    domain::{Cid, MessageId, UserRole},
    event::{ChatEvent, EventKind},
    protocol::ChatUser,
};
use sync_core::{
    fixtures::{at, group_channel, memory_context, message, private_channel, user, with_messages},
    ChatSession, InMemoryBackend, MessagingBackend, NoticeContext, SessionEvent,
};
use tokio::sync::broadcast;

enum Step {
    Receive {
        cid: &'static str,
        id: &'static str,
        from: &'static str,
        minute: i64,
    },
    Open(&'static str),
}

struct Expect {
    order: &'static [&'static str],
    unread: &'static [(&'static str, u32)],
    badge: bool,
}

struct World {
    users: Vec<ChatUser>,
    backend: Arc<InMemoryBackend>,
    session: ChatSession,
    events: broadcast::Receiver<SessionEvent>,
}

impl World {
    fn user(&self, id: &str) -> &ChatUser {
        self.users
            .iter()
            .find(|user| user.id.as_str() == id)
            .expect("known user")
    }

    fn order(&self) -> Vec<String> {
        self.session
            .directory
            .cids()
            .iter()
            .map(|cid| cid.id.to_string())
            .collect()
    }

    fn unread(&self, id: &str) -> Option<u32> {
        self.session
            .directory
            .find(&Cid::messaging(id))
            .map(|entry| entry.unread_count())
    }

    fn timeline_ids(&self) -> Vec<String> {
        self.session
            .view
            .timeline
            .messages()
            .iter()
            .map(|message| message.id.to_string())
            .collect()
    }

    fn notices(&mut self) -> Vec<NoticeContext> {
        std::iter::from_fn(|| self.events.try_recv().ok())
            .filter_map(|event| match event {
                SessionEvent::Notice(notice) => Some(notice.context()),
                _ => None,
            })
            .collect()
    }

    async fn play(&mut self, step: &Step) {
        match step {
            Step::Receive {
                cid,
                id,
                from,
                minute,
            } => {
                let author = self.user(from).clone();
                self.backend.receive(
                    &Cid::messaging(*cid),
                    message(id, &author, &format!("{id} from {from}"), at(*minute)),
                );
            }
            Step::Open(cid) => self.session.activate(Cid::messaging(*cid)).await,
        }
        self.session.settle().await;
    }
}

/// `x` with Ann, `y` with Bo and the `z` group with both, newest first.
async fn world() -> World {
    let me = user("me", "Me Director", UserRole::CastingDirector);
    let ann = user("ann", "Ann Actor", UserRole::Actor);
    let bo = user("bo", "Bo Actor", UserRole::Actor);
    let (backend, ctx) = memory_context(&me);
    backend.insert_channel(with_messages(
        private_channel("x", &me, &ann),
        vec![message("x1", &ann, "hello", at(5))],
    ));
    backend.insert_channel(with_messages(
        private_channel("y", &me, &bo),
        vec![message("y1", &bo, "hey", at(1))],
    ));
    backend.insert_channel(with_messages(
        group_channel("z", "Callbacks", &[&me, &ann, &bo]),
        vec![message("z1", &me, "welcome", at(0))],
    ));

    let mut session = ChatSession::new(ctx);
    let events = session.subscribe();
    session.start().await;
    session.settle().await;
    World {
        users: vec![me, ann, bo],
        backend,
        session,
        events,
    }
}

#[tokio::test]
async fn scripted_traffic_converges_step_by_step() {
    let mut world = world().await;
    assert_eq!(world.order(), vec!["x", "y", "z"]);

    let script = [
        (
            Step::Receive { cid: "y", id: "y2", from: "bo", minute: 10 },
            Expect { order: &["y", "x", "z"], unread: &[("y", 1), ("x", 0)], badge: true },
        ),
        (
            Step::Receive { cid: "z", id: "z2", from: "ann", minute: 11 },
            Expect { order: &["z", "y", "x"], unread: &[("z", 1), ("y", 1)], badge: true },
        ),
        (
            Step::Receive { cid: "x", id: "x2", from: "ann", minute: 12 },
            Expect { order: &["x", "z", "y"], unread: &[("x", 0), ("z", 1)], badge: true },
        ),
        (
            Step::Open("y"),
            Expect { order: &["x", "z", "y"], unread: &[("y", 0), ("z", 1)], badge: true },
        ),
        (
            Step::Open("z"),
            Expect { order: &["x", "z", "y"], unread: &[("z", 0), ("y", 0)], badge: false },
        ),
    ];

    for (index, (step, expect)) in script.iter().enumerate() {
        world.play(step).await;
        assert_eq!(world.order(), expect.order, "order after step {index}");
        for (cid, count) in expect.unread {
            assert_eq!(world.unread(cid), Some(*count), "{cid} unread after step {index}");
        }
        assert_eq!(world.session.has_unread(), expect.badge, "badge after step {index}");
    }
    assert_eq!(world.timeline_ids(), vec!["z1", "z2"]);
}

#[tokio::test]
async fn redelivered_events_do_not_duplicate_the_timeline() {
    let mut world = world().await;
    let ann = world.user("ann").clone();
    let late = message("x2", &ann, "again", at(9));
    let event =
        ChatEvent::for_channel(EventKind::MessageNew, Cid::messaging("x")).with_message(late);

    world.backend.publish(event.clone());
    world.backend.publish(event);
    world.session.settle().await;

    assert_eq!(world.timeline_ids(), vec!["x1", "x2"]);
    assert_eq!(world.order(), vec!["x", "y", "z"]);
}

#[tokio::test]
async fn outage_during_reload_keeps_the_list_and_recovers() {
    let mut world = world().await;
    world.notices();
    world.backend.fail("query_channels");

    world
        .backend
        .delete_message(&MessageId::new("y1"))
        .await
        .expect("delete summary message");
    world.session.settle().await;

    assert_eq!(world.order(), vec!["x", "y", "z"]);
    assert_eq!(world.notices(), vec![NoticeContext::LoadChannels]);

    world.backend.recover("query_channels");
    world.play(&Step::Receive { cid: "z", id: "z2", from: "bo", minute: 20 }).await;

    assert_eq!(world.order(), vec!["z", "x", "y"]);
    assert!(world.notices().is_empty());
}
