use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use shared::{
    domain::{Cid, UserRole},
    protocol::ChatUser,
};
use sync_core::{
    fixtures::{at, group_channel, message, private_channel, user, with_messages},
    load_settings,
    presence::{channel_description, channel_display_name},
    search::SearchResult,
    separators::TimelineEntry,
    spawn_event_feed, ChatSession, EventBus, HttpMessagingBackend, InMemoryBackend, LoginProfile,
    MessagingBackend, SessionContext, SessionEvent,
};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::mpsc,
};
use tokio_stream::{wrappers::BroadcastStream, StreamExt};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Role {
    Director,
    Producer,
    Agent,
    Actor,
}

impl From<Role> for UserRole {
    fn from(role: Role) -> Self {
        match role {
            Role::Director => UserRole::CastingDirector,
            Role::Producer => UserRole::Producer,
            Role::Agent => UserRole::Agent,
            Role::Actor => UserRole::Actor,
        }
    }
}

#[derive(Parser, Debug)]
struct Args {
    /// Falls back to `server_url` from the settings file.
    #[arg(long)]
    server_url: Option<String>,
    #[arg(long)]
    user_id: String,
    #[arg(long)]
    name: String,
    #[arg(long, value_enum, default_value = "director")]
    role: Role,
    #[arg(long)]
    minor: bool,
    /// Run against a seeded in-memory backend instead of a server.
    #[arg(long)]
    offline: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    let args = Args::parse();
    let settings = load_settings()?;
    let viewer = ChatUser::new(args.user_id.as_str(), args.name.as_str(), args.role.into());
    let bus = EventBus::new();

    let backend: Arc<dyn MessagingBackend> = if args.offline {
        Arc::new(demo_backend(&viewer, bus.clone()))
    } else {
        let server_url = args
            .server_url
            .clone()
            .or_else(|| settings.server_url.clone())
            .context("--server-url is required unless --offline is set")?;
        let backend = HttpMessagingBackend::new(&server_url, viewer.id.clone())?;
        spawn_event_feed(backend.server_url(), &viewer.id, bus.clone()).await?;
        Arc::new(backend)
    };

    let profile = LoginProfile {
        name: args.name.clone(),
        role: args.role.into(),
        is_minor: args.minor,
        ..LoginProfile::default()
    };
    let ctx = SessionContext::new(viewer, backend, settings, bus);
    let mut events = BroadcastStream::new(ctx.subscribe());
    let mut session = ChatSession::login(ctx, &profile).await?;
    print_directory(&session);
    print_timeline(&session);

    let mut commands = spawn_stdin_reader();
    let mut poll = tokio::time::interval(Duration::from_millis(50));
    loop {
        tokio::select! {
            Some(line) = commands.recv() => {
                if !run_command(&mut session, line.trim()).await {
                    break;
                }
            }
            Some(event) = events.next() => match event {
                Ok(event) => report(&session, event),
                Err(err) => warn!(error = %err, "console: session events lagged"),
            },
            _ = poll.tick() => {}
            _ = tokio::signal::ctrl_c() => break,
        }
        session.process_pending().await;
    }

    session.logout();
    Ok(())
}

fn spawn_stdin_reader() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}

async fn run_command(session: &mut ChatSession, line: &str) -> bool {
    let (command, rest) = line.split_once(' ').unwrap_or((line, ""));
    match command {
        "" => {}
        "/quit" => return false,
        "/list" => print_directory(session),
        "/show" => print_timeline(session),
        "/more" => session.load_more_channels().await,
        "/open" => session.activate(Cid::messaging(rest.trim())).await,
        "/older" => session.load_older().await,
        "/pinned" => session.seek_pinned().await,
        "/search" => {
            session.set_search_text(rest.trim()).await;
            print_search(session);
        }
        "/pick" => {
            let picked = rest
                .trim()
                .parse::<usize>()
                .ok()
                .and_then(|index| session.directory.search.results().into_iter().nth(index));
            match picked {
                Some(result) => session.select_search_result(result).await,
                None => println!("no such search result"),
            }
        }
        "/typing" => session.set_typing(rest.trim() != "off").await,
        _ if command.starts_with('/') => {
            println!("commands: /list /show /more /open <id> /older /pinned /search <text> /pick <n> /typing [off] /quit");
        }
        _ => {
            if session.directory.draft().is_some() {
                session.send_first_message(line, &[]).await;
            } else {
                let outcome = session.submit(line, &[], &[]).await;
                info!(?outcome, "console: submitted");
            }
        }
    }
    true
}

fn report(session: &ChatSession, event: SessionEvent) {
    match event {
        SessionEvent::DirectoryChanged => print_directory(session),
        SessionEvent::ActiveChannelChanged(Some(cid)) => println!("== opened {cid}"),
        SessionEvent::ActiveChannelChanged(None) => println!("== no channel open"),
        SessionEvent::DraftOpened(contact) => {
            println!("== new conversation with {}", contact.full_name());
        }
        SessionEvent::TimelineChanged(_) => print_timeline(session),
        SessionEvent::UnreadBadgeChanged(unread) => {
            println!("== unread badge {}", if unread { "on" } else { "off" });
        }
        SessionEvent::Scroll(action) => info!(?action, "console: scroll"),
        SessionEvent::SearchChanged => {}
        SessionEvent::Notice(notice) => println!("!! {notice}"),
    }
}

fn print_directory(session: &ChatSession) {
    let viewer = session.ctx().user();
    let active = session.active_cid();
    println!("-- channels --");
    for entry in session.directory.entries() {
        let marker = if Some(entry.cid()) == active { '>' } else { ' ' };
        let unread = match entry.unread_count() {
            0 => String::new(),
            count => format!(" ({count})"),
        };
        let preview = entry
            .last_message()
            .and_then(|message| message.text.clone())
            .unwrap_or_default();
        println!(
            "{marker} {:<12} {}{unread}  {preview}",
            entry.cid().id.as_str(),
            channel_display_name(&entry.channel, &viewer.id)
        );
    }
    if session.directory.has_next_page() {
        println!("  … /more for older channels");
    }
}

fn print_timeline(session: &ChatSession) {
    let Some(channel) = session.view.channel() else {
        return;
    };
    let viewer = &session.ctx().user().id;
    println!(
        "-- {} · {} --",
        channel_display_name(channel, viewer),
        channel_description(channel, viewer)
    );
    for entry in session.view.entries() {
        match entry {
            TimelineEntry::DateSeparator { date, .. } => {
                println!("   ---- {} ----", date.format("%A, %B %e"));
            }
            TimelineEntry::UnreadSeparator { .. } => println!("   ---- new messages ----"),
            TimelineEntry::Message(message) => {
                let pin = if message.pinned { "*" } else { " " };
                println!(
                    "{pin} [{}] {}: {}",
                    message.created_at.format("%H:%M"),
                    message.user.name,
                    message.text.as_deref().unwrap_or_default()
                );
            }
        }
    }
}

fn print_search(session: &ChatSession) {
    let viewer = session.ctx().user();
    for (index, result) in session.directory.search.results().iter().enumerate() {
        match result {
            SearchResult::Channel(channel) => {
                println!("{index}: channel {}", channel_display_name(channel, &viewer.id));
            }
            SearchResult::Contact(contact) => println!("{index}: contact {}", contact.full_name()),
        }
    }
}

fn demo_backend(viewer: &ChatUser, bus: EventBus) -> InMemoryBackend {
    let ann = user("ann", "Ann Actor", UserRole::Actor);
    let bo = user("bo", "Bo Agent", UserRole::Agent);
    let backend = InMemoryBackend::new(viewer.clone()).with_bus(bus);
    backend.insert_channel(with_messages(
        private_channel("ann", viewer, &ann),
        vec![
            message("a1", &ann, "Thanks for the callback!", at(-1500)),
            message("a2", viewer, "See you Thursday.", at(-1490)),
            message("a3", &ann, "Is the sides packet final?", at(30)),
        ],
    ));
    backend.insert_channel(with_messages(
        group_channel("callbacks", "Callbacks", &[viewer, &ann, &bo]),
        vec![message("g1", &bo, "Schedule attached.", at(10))],
    ));
    backend.set_unread(&Cid::messaging("ann"), 1);
    backend
}
