//! End-to-end tests for the live WebSocket endpoint.
//!
//! Each test binds the full router on a loopback port and talks to it with a
//! real WebSocket client.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::USER_AGENT;
use tokio_tungstenite::tungstenite::http::{HeaderValue, StatusCode};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use planning_poker::adapters::{
    api_router, BroadcastNotifier, InMemorySessionStore, RandomNicknameGenerator,
    UserAgentBotDetector,
};
use planning_poker::application::{
    CoordinatorConfig, CreateSessionCommand, CreateSessionResult, JoinSessionCommand,
    SessionCoordinator, SubmitVoteCommand,
};
use planning_poker::domain::foundation::SessionId;
use planning_poker::domain::foundation::Timestamp;
use planning_poker::domain::session::{self, Card, Operation, Session};
use planning_poker::ports::{
    ChangeNotifier, NotifyError, Subscription, SubscriptionEvent, SubscriptionSink,
    SubscriptionStatus,
};

// =============================================================================
// Test Infrastructure
// =============================================================================

const BROWSER: &str = "Mozilla/5.0 (X11; Linux x86_64) Firefox/121.0";

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Notifier whose subscriptions are fed by hand.
#[derive(Default)]
struct ManualNotifier {
    sinks: Mutex<Vec<SubscriptionSink>>,
}

impl ManualNotifier {
    fn sink(&self, index: usize) -> SubscriptionSink {
        self.sinks.lock().unwrap()[index].clone()
    }
}

#[async_trait]
impl ChangeNotifier for ManualNotifier {
    async fn publish(&self, _session: &Session) -> Result<(), NotifyError> {
        Ok(())
    }

    async fn subscribe(&self, session_id: &SessionId) -> Result<Subscription, NotifyError> {
        let (sink, subscription) = Subscription::channel(session_id.clone());
        self.sinks.lock().unwrap().push(sink);
        Ok(subscription)
    }
}

fn coordinator_with(notifier: Arc<dyn ChangeNotifier>) -> Arc<SessionCoordinator> {
    Arc::new(SessionCoordinator::new(
        Arc::new(InMemorySessionStore::new()),
        notifier,
        Arc::new(RandomNicknameGenerator::new()),
        CoordinatorConfig::default(),
    ))
}

fn coordinator() -> Arc<SessionCoordinator> {
    coordinator_with(Arc::new(BroadcastNotifier::default()))
}

async fn serve(coordinator: Arc<SessionCoordinator>) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = api_router(coordinator, Arc::new(UserAgentBotDetector::new()));
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("ws://{}", addr)
}

async fn create(coordinator: &SessionCoordinator) -> CreateSessionResult {
    coordinator
        .create_session(CreateSessionCommand {
            nickname: Some("Host".to_string()),
        })
        .await
        .unwrap()
}

fn live_url(base: &str, session_id: &str, participant_id: Option<&str>) -> String {
    let mut url = format!("{}/api/session/{}/live", base, session_id);
    if let Some(id) = participant_id {
        url.push_str(&format!("?participantId={}", id));
    }
    url
}

async fn open(url: &str, user_agent: Option<&'static str>) -> Result<Socket, WsError> {
    let mut request = url.into_client_request().unwrap();
    if let Some(ua) = user_agent {
        request.headers_mut().insert(USER_AGENT, HeaderValue::from_static(ua));
    }
    connect_async(request).await.map(|(socket, _)| socket)
}

async fn connect(base: &str, session_id: &SessionId, participant_id: Option<&str>) -> Socket {
    open(&live_url(base, session_id.as_str(), participant_id), Some(BROWSER))
        .await
        .unwrap()
}

/// Status of a refused upgrade.
async fn refused(url: &str, user_agent: Option<&'static str>) -> StatusCode {
    match open(url, user_agent).await {
        Err(WsError::Http(response)) => response.status(),
        Err(other) => panic!("unexpected error {:?}", other),
        Ok(_) => panic!("upgrade to {} was accepted", url),
    }
}

async fn next_frame(socket: &mut Socket) -> Option<Message> {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(2), socket.next())
            .await
            .expect("timed out waiting for a frame");
        match frame {
            Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
            Some(Ok(message)) => return Some(message),
            Some(Err(_)) | None => return None,
        }
    }
}

async fn next_json(socket: &mut Socket) -> Value {
    match next_frame(socket).await {
        Some(Message::Text(text)) => serde_json::from_str(&text).unwrap(),
        other => panic!("expected a text frame, got {:?}", other),
    }
}

/// Skips messages until one of type `kind` arrives.
async fn next_of_type(socket: &mut Socket, kind: &str) -> Value {
    for _ in 0..20 {
        let message = next_json(socket).await;
        if message["type"] == kind {
            return message;
        }
    }
    panic!("no {} message arrived", kind);
}

async fn send_json(socket: &mut Socket, value: Value) {
    socket.send(Message::Text(value.to_string())).await.unwrap();
}

/// Reads the opening `connected`, `session.snapshot`, `presence.sync` trio.
async fn handshake(socket: &mut Socket) -> (Value, Value, Value) {
    let connected = next_json(socket).await;
    let snapshot = next_json(socket).await;
    let sync = next_json(socket).await;
    (connected, snapshot, sync)
}

// =============================================================================
// Tests
// =============================================================================

#[tokio::test]
async fn socket_opens_with_snapshot_and_presence_then_streams_updates() {
    let coordinator = coordinator();
    let base = serve(Arc::clone(&coordinator)).await;
    let created = create(&coordinator).await;
    let host = created.participant_id.to_string();

    let mut socket = connect(&base, &created.session_id, Some(&host)).await;
    let (connected, snapshot, sync) = handshake(&mut socket).await;

    assert_eq!(connected["type"], "connected");
    assert_eq!(connected["sessionId"], created.session_id.as_str());
    assert_eq!(snapshot["type"], "session.snapshot");
    assert_eq!(snapshot["session"]["id"], created.session_id.as_str());
    assert_eq!(sync["type"], "presence.sync");
    assert_eq!(sync["presences"][0]["participantId"], host.as_str());
    assert_eq!(sync["presences"][0]["nickname"], "Host");
    assert_eq!(sync["presences"][0]["online"], true);

    coordinator
        .submit_vote(SubmitVoteCommand {
            session_id: created.session_id.clone(),
            participant_id: created.participant_id.clone(),
            vote: "8".to_string(),
        })
        .await
        .unwrap();

    let updated = next_json(&mut socket).await;
    assert_eq!(updated["type"], "session.updated");
    assert_eq!(updated["session"]["participants"][host.as_str()]["vote"], "8");
    assert_eq!(updated["session"]["revision"], 1);
}

#[tokio::test]
async fn ping_and_state_requests_are_answered() {
    let coordinator = coordinator();
    let base = serve(Arc::clone(&coordinator)).await;
    let created = create(&coordinator).await;
    let mut socket = connect(&base, &created.session_id, None).await;
    handshake(&mut socket).await;

    send_json(&mut socket, json!({"type": "ping"})).await;
    assert_eq!(next_json(&mut socket).await["type"], "pong");

    send_json(&mut socket, json!({"type": "request.state"})).await;
    let snapshot = next_json(&mut socket).await;
    assert_eq!(snapshot["type"], "session.snapshot");
    assert_eq!(snapshot["session"]["current_round"], 1);

    // Unknown messages are ignored, the socket stays usable.
    send_json(&mut socket, json!({"type": "vote", "card": "5"})).await;
    send_json(&mut socket, json!({"type": "ping"})).await;
    assert_eq!(next_json(&mut socket).await["type"], "pong");
}

#[tokio::test]
async fn observers_see_presence_but_are_not_listed() {
    let coordinator = coordinator();
    let base = serve(Arc::clone(&coordinator)).await;
    let created = create(&coordinator).await;

    let mut socket = connect(&base, &created.session_id, None).await;
    let (_, _, sync) = handshake(&mut socket).await;

    assert_eq!(sync["presences"], json!([]));
}

#[tokio::test]
async fn presence_follows_participants_in_and_out() {
    let coordinator = coordinator();
    let base = serve(Arc::clone(&coordinator)).await;
    let created = create(&coordinator).await;
    let host = created.participant_id.to_string();
    let mut host_socket = connect(&base, &created.session_id, Some(&host)).await;
    handshake(&mut host_socket).await;

    let guest = coordinator
        .join_session(JoinSessionCommand {
            session_id: created.session_id.clone(),
            nickname: Some("Guest".to_string()),
        })
        .await
        .unwrap()
        .participant_id
        .to_string();
    let mut guest_socket = connect(&base, &created.session_id, Some(&guest)).await;
    let (_, _, sync) = handshake(&mut guest_socket).await;
    assert_eq!(sync["presences"].as_array().unwrap().len(), 2);

    let joined = next_of_type(&mut host_socket, "presence.join").await;
    assert_eq!(joined["presence"]["participantId"], guest.as_str());
    assert_eq!(joined["presence"]["nickname"], "Guest");
    assert_eq!(joined["presence"]["online"], true);

    guest_socket.close(None).await.unwrap();
    drop(guest_socket);

    let left = next_of_type(&mut host_socket, "presence.leave").await;
    assert_eq!(left["presence"]["participantId"], guest.as_str());
    assert_eq!(left["presence"]["online"], false);
    assert!(left["presence"]["lastSeen"].is_string());
}

#[tokio::test]
async fn bad_requests_are_refused_before_upgrade() {
    let coordinator = coordinator();
    let base = serve(Arc::clone(&coordinator)).await;
    let created = create(&coordinator).await;
    let session = created.session_id.as_str();

    assert_eq!(
        refused(&live_url(&base, session, Some("0123456789abcdef")), Some(BROWSER)).await,
        StatusCode::FORBIDDEN
    );
    assert_eq!(
        refused(&live_url(&base, session, Some("short")), Some(BROWSER)).await,
        StatusCode::BAD_REQUEST
    );
    assert_eq!(
        refused(&live_url(&base, &SessionId::generate().to_string(), None), Some(BROWSER)).await,
        StatusCode::NOT_FOUND
    );
    assert_eq!(
        refused(&live_url(&base, session, None), None).await,
        StatusCode::FORBIDDEN
    );
}

#[tokio::test]
async fn subscription_failure_sends_error_then_closes() {
    let notifier = Arc::new(ManualNotifier::default());
    let coordinator = coordinator_with(notifier.clone());
    let base = serve(Arc::clone(&coordinator)).await;
    let created = create(&coordinator).await;
    let mut socket = connect(&base, &created.session_id, None).await;
    handshake(&mut socket).await;

    let sink = notifier.sink(0);
    assert!(sink.send(SubscriptionEvent::Status(SubscriptionStatus::Subscribed)).await);
    assert!(
        sink.send(SubscriptionEvent::Status(SubscriptionStatus::ChannelError(
            "redis went away".to_string()
        )))
        .await
    );

    let error = next_json(&mut socket).await;
    assert_eq!(error["type"], "error");
    assert_eq!(error["code"], "SUBSCRIPTION_LOST");
    assert!(matches!(next_frame(&mut socket).await, Some(Message::Close(_)) | None));
}

#[tokio::test]
async fn pushes_older_than_the_snapshot_are_not_forwarded() {
    let notifier = Arc::new(ManualNotifier::default());
    let coordinator = coordinator_with(notifier.clone());
    let base = serve(Arc::clone(&coordinator)).await;
    let created = create(&coordinator).await;
    let mut socket = connect(&base, &created.session_id, None).await;
    handshake(&mut socket).await;

    // The creation record is what the snapshot already carried.
    let voted = session::apply(
        &created.session,
        Operation::Vote {
            participant_id: created.participant_id.clone(),
            card: Card::Five,
        },
        Timestamp::now(),
    )
    .unwrap()
    .session;
    let sink = notifier.sink(0);
    sink.send(SubscriptionEvent::Snapshot(created.session.clone())).await;
    sink.send(SubscriptionEvent::Snapshot(voted)).await;

    let updated = next_json(&mut socket).await;
    assert_eq!(updated["type"], "session.updated");
    assert_eq!(updated["session"]["revision"], 1);
}
