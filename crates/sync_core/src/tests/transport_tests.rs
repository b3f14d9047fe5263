use std::{collections::HashMap, sync::Arc};

use super::*;
use crate::event_bus::{EventFilter, EventSource};
use axum::{
    body::Bytes,
    extract::{
        ws::{Message as WsMessage, WebSocketUpgrade},
        Path, Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use shared::{domain::UserRole, error::ErrorCode, event::EventKind};
use tokio::{net::TcpListener, sync::Mutex};

type Seen = Arc<Mutex<Vec<(String, Value)>>>;

#[derive(Clone)]
struct ServerState {
    seen: Seen,
}

impl ServerState {
    async fn record(&self, what: impl Into<String>, body: Value) {
        self.seen.lock().await.push((what.into(), body));
    }
}

async fn current_user(Query(query): Query<HashMap<String, String>>) -> Json<ChatUser> {
    let id = query.get("user_id").cloned().unwrap_or_default();
    Json(ChatUser::new(id, "Me Director", UserRole::CastingDirector))
}

async fn query_channels(State(state): State<ServerState>, Json(body): Json<Value>) -> Json<Value> {
    state.record("query_channels", body).await;
    Json(json!([]))
}

async fn watch_channel(Path((kind, id)): Path<(String, String)>) -> Response {
    let body = json!({ "code": "not_found", "message": format!("no channel {kind}:{id}") });
    (StatusCode::NOT_FOUND, Json(body)).into_response()
}

async fn query_messages(
    State(state): State<ServerState>,
    Query(query): Query<HashMap<String, String>>,
) -> Json<Value> {
    state.record("query_messages", json!(query)).await;
    Json(json!([]))
}

async fn count_unread() -> Json<Value> {
    Json(json!({ "unread_count": 4 }))
}

async fn member_role(
    State(state): State<ServerState>,
    Path((_, _, user)): Path<(String, String, String)>,
    Json(body): Json<Value>,
) -> StatusCode {
    state.record(format!("member_role {user}"), body).await;
    StatusCode::OK
}

async fn send_image(
    State(state): State<ServerState>,
    Path((_, id)): Path<(String, String)>,
    Query(query): Query<HashMap<String, String>>,
    body: Bytes,
) -> Json<Value> {
    let filename = query.get("filename").cloned().unwrap_or_default();
    state
        .record("send_image", json!({ "query": query, "size": body.len() }))
        .await;
    Json(json!({ "file": format!("https://cdn.local/{id}/{filename}") }))
}

async fn rate_limited() -> StatusCode {
    StatusCode::TOO_MANY_REQUESTS
}

async fn events(
    State(state): State<ServerState>,
    Query(query): Query<HashMap<String, String>>,
    ws: WebSocketUpgrade,
) -> Response {
    state.record("events", json!(query)).await;
    ws.on_upgrade(|mut socket| async move {
        let event = ChatEvent::for_channel(EventKind::MessageNew, Cid::messaging("c1"));
        if let Ok(text) = serde_json::to_string(&event) {
            let _ = socket.send(WsMessage::Text(text)).await;
        }
        let _ = socket.send(WsMessage::Text("not an event".into())).await;
        let _ = socket.send(WsMessage::Close(None)).await;
    })
}

async fn spawn_chat_server() -> anyhow::Result<(String, Seen)> {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let seen: Seen = Arc::new(Mutex::new(Vec::new()));
    let state = ServerState { seen: seen.clone() };
    let app = Router::new()
        .route("/users/me", get(current_user))
        .route("/channels/query", post(query_channels))
        .route("/channels/:kind/:id/watch", post(watch_channel))
        .route("/channels/:kind/:id/messages", get(query_messages))
        .route("/channels/:kind/:id/unread", get(count_unread))
        .route("/channels/:kind/:id/members/:user/role", post(member_role))
        .route("/channels/:kind/:id/image", post(send_image))
        .route("/channels/:kind/:id/read", post(rate_limited))
        .route("/events", get(events))
        .with_state(state);
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok((format!("http://{addr}"), seen))
}

async fn backend() -> (HttpMessagingBackend, Seen) {
    let (server_url, seen) = spawn_chat_server().await.expect("spawn server");
    let backend = HttpMessagingBackend::new(&server_url, UserId::new("me")).expect("backend");
    (backend, seen)
}

#[test]
fn feed_url_follows_the_server_scheme() {
    let me = UserId::new("me");
    assert_eq!(
        event_feed_url("http://localhost:8443/", &me).expect("url"),
        "ws://localhost:8443/events?user_id=me"
    );
    assert_eq!(
        event_feed_url("https://chat.example.com", &me).expect("url"),
        "wss://chat.example.com/events?user_id=me"
    );
    let err = event_feed_url("ftp://chat.example.com", &me).expect_err("rejected");
    assert_eq!(err.category(), NoticeCategory::Validation);
}

#[test]
fn backend_rejects_non_http_urls() {
    let err = HttpMessagingBackend::new("ws://localhost:1", UserId::new("me"))
        .err()
        .expect("rejected");
    assert!(matches!(
        err.downcast_ref::<TransportError>(),
        Some(TransportError::InvalidUrl(_))
    ));
    assert!(HttpMessagingBackend::new("not a url", UserId::new("me")).is_err());
}

#[tokio::test]
async fn every_request_names_the_user() {
    let (backend, _) = backend().await;
    let me = backend.current_user().await.expect("current user");
    assert_eq!(me.id, UserId::new("me"));
}

#[tokio::test]
async fn channel_query_flattens_options_next_to_filters() {
    let (backend, seen) = backend().await;
    let filters = ChannelFilters::member_of(&UserId::new("me"));

    let channels = backend
        .query_channels(&filters, &ChannelSort::default(), &ChannelOptions::watched_page(20, 40))
        .await
        .expect("query");

    assert!(channels.is_empty());
    let seen = seen.lock().await;
    let (what, body) = &seen[0];
    assert_eq!(what, "query_channels");
    assert_eq!(body["limit"], json!(20));
    assert_eq!(body["offset"], json!(40));
    assert_eq!(body["watch"], json!(true));
    assert!(body["filter_conditions"].is_object());
    assert!(body["sort"].is_object());
}

#[tokio::test]
async fn history_pagination_travels_as_query_parameters() {
    let (backend, seen) = backend().await;

    backend
        .query_messages(
            &Cid::messaging("c1"),
            &MessagePagination::older_than(20, Some(MessageId::new("m9"))),
        )
        .await
        .expect("messages");

    let seen = seen.lock().await;
    assert_eq!(
        seen[0].1,
        json!({ "user_id": "me", "limit": "20", "id_lt": "m9" })
    );
}

#[tokio::test]
async fn structured_error_bodies_become_api_errors() {
    let (backend, _) = backend().await;

    let err = backend
        .watch_channel(&Cid::messaging("gone"))
        .await
        .expect_err("not found");

    let api = err.downcast_ref::<ApiError>().expect("api error");
    assert_eq!(api.code, ErrorCode::NotFound);
    assert_eq!(api.message, "no channel messaging:gone");
}

#[tokio::test]
async fn bare_status_falls_back_to_its_code() {
    let (backend, _) = backend().await;

    let err = backend
        .mark_read(&Cid::messaging("c1"))
        .await
        .expect_err("rate limited");

    assert_eq!(
        err.downcast_ref::<ApiError>().map(|api| api.code),
        Some(ErrorCode::RateLimited)
    );
}

#[tokio::test]
async fn unread_count_and_member_role_round_trip() {
    let (backend, seen) = backend().await;
    let cid = Cid::messaging("c1");

    assert_eq!(backend.count_unread(&cid).await.expect("count"), 4);
    backend
        .update_member_role(&cid, &UserId::new("ann"), MemberRole::DisabledActor)
        .await
        .expect("role");

    let seen = seen.lock().await;
    assert_eq!(seen[0].0, "member_role ann");
    assert_eq!(
        seen[0].1,
        json!({ "channel_role": "channel_member_disabled_actor" })
    );
}

#[tokio::test]
async fn image_upload_sends_raw_bytes_with_name_and_type() {
    let (backend, seen) = backend().await;
    let mut file = FileUpload::new("head.png", vec![1, 2, 3]);
    file.content_type = Some("image/png".into());

    let uploaded = backend
        .send_image(&Cid::messaging("c1"), &file)
        .await
        .expect("upload");

    assert_eq!(uploaded.file, "https://cdn.local/c1/head.png");
    let seen = seen.lock().await;
    assert_eq!(seen[0].1["query"]["content_type"], json!("image/png"));
    assert_eq!(seen[0].1["size"], json!(3));
}

#[tokio::test]
async fn event_feed_republishes_decoded_frames_until_close() {
    let (server_url, seen) = spawn_chat_server().await.expect("spawn server");
    let bus = EventBus::new();
    let mut scope = bus.scope();
    scope.subscribe(EventSource::Global, EventFilter::All);

    let feed = spawn_event_feed(&server_url, &UserId::new("me"), bus)
        .await
        .expect("connect");
    feed.await.expect("feed task");

    let delivery = scope.try_recv().expect("decoded event");
    assert_eq!(delivery.event.kind, EventKind::MessageNew);
    assert_eq!(delivery.event.target_cid(), Some(Cid::messaging("c1")));
    assert!(scope.try_recv().is_none());
    assert_eq!(seen.lock().await[0].1, json!({ "user_id": "me" }));
}

#[tokio::test]
async fn unreachable_feed_is_a_connect_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);

    let err = spawn_event_feed(&format!("http://{addr}"), &UserId::new("me"), EventBus::new())
        .await
        .expect_err("refused");

    let transport = err.downcast_ref::<TransportError>().expect("transport error");
    assert!(matches!(transport, TransportError::Connect { .. }));
    assert_eq!(transport.category(), NoticeCategory::Transport);
}
